#![forbid(unsafe_code)]

use thiserror::Error;

pub type Result<T> = std::result::Result<T, TreatmentError>;

/// A backend round-trip failed.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("backend returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("backend rejected request: {message}")]
    Rejected { message: String },

    #[error("mutation worker disconnected before responding")]
    Disconnected,
}

impl BackendError {
    #[must_use]
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected {
            message: message.into(),
        }
    }

    /// HTTP status when the backend answered with a non-success code.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

/// A mutation was attempted without a required scope value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScopeError {
    #[error("treatment plan id must be set before {operation}")]
    MissingTreatmentPlan { operation: &'static str },

    #[error("project area id must be set before {operation}")]
    MissingProjectArea { operation: &'static str },
}

/// A scope getter was called before the value was ever set.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PreconditionError {
    #[error("treatment plan id was read before it was set")]
    TreatmentPlanIdUnset,

    #[error("scenario id was read before it was set")]
    ScenarioIdUnset,
}

#[derive(Debug, Error)]
pub enum TreatmentError {
    #[error(transparent)]
    Scope(#[from] ScopeError),

    #[error(transparent)]
    Precondition(#[from] PreconditionError),

    #[error("network error: {0}")]
    Network(#[from] BackendError),

    #[error("{operation} needs at least one stand id")]
    EmptyStandIds { operation: &'static str },

    #[error("another treatment mutation is still in flight")]
    MutationInFlight,
}

impl TreatmentError {
    /// Scope and precondition failures point at a wiring bug, not at
    /// anything the user did.
    #[must_use]
    pub fn is_programmer_error(&self) -> bool {
        matches!(self, Self::Scope(_) | Self::Precondition(_))
    }

    /// Errors worth showing to the user as a dismissible notice.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::MutationInFlight)
    }
}

/// A dismissible user-facing notification built from a failed operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub message: String,
    pub dismissed: bool,
}

impl Notice {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            dismissed: false,
        }
    }

    /// Notice for a failed assign/remove; the map has already been reverted.
    #[must_use]
    pub fn from_error(error: &TreatmentError) -> Self {
        let message = match error {
            TreatmentError::Network(_) => {
                format!("Treatments could not be saved and were reverted: {error}")
            }
            TreatmentError::MutationInFlight => {
                "Please wait for the previous change to finish saving.".to_string()
            }
            other => other.to_string(),
        };
        Self::new(message)
    }

    pub fn dismiss(&mut self) {
        self.dismissed = true;
    }
}
