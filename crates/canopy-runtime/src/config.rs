#![forbid(unsafe_code)]

//! Runtime configuration loaded from TOML or JSON.
//!
//! ```toml
//! # canopy.toml
//! [backend]
//! base_url = "https://planscape.example/planscape-backend"
//! request_timeout_ms = 15000
//!
//! [selection]
//! history_depth = 25
//!
//! [mutations]
//! policy = "queued"
//!
//! [map]
//! stand_layer_ids = ["stands-fill", "stands-outline"]
//! ```
//!
//! Every section and field has a default, so a partial file only overrides
//! what it names.

use std::path::Path;

use canopy_core::{HistoryConfig, PrescriptionCatalog};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::mutation::MutationPolicy;

/// Top-level configuration for one Canopy deployment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct CanopyConfig {
    pub backend: BackendConfig,
    pub selection: SelectionConfig,
    pub mutations: MutationConfig,
    pub map: MapConfig,
    pub logging: LoggingConfig,
    pub prescriptions: PrescriptionConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub base_url: String,
    /// Bearer token; empty or absent means unauthenticated.
    pub auth_token: Option<String>,
    pub connect_timeout_ms: u64,
    pub request_timeout_ms: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000/planscape-backend".to_string(),
            auth_token: None,
            connect_timeout_ms: 2_000,
            request_timeout_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionConfig {
    /// Maximum number of `clear()` snapshots kept for undo.
    pub history_depth: usize,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            history_depth: HistoryConfig::default().max_depth,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct MutationConfig {
    pub policy: MutationPolicy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapConfig {
    /// Rendered layers whose features are stands.
    pub stand_layer_ids: Vec<String>,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            stand_layer_ids: vec!["stands".to_string()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing` filter used when `RUST_LOG` is not set.
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info,canopy_runtime=info,canopy_core=warn".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PrescriptionConfig {
    /// Actions always treated as multi-step, even before a summary says so.
    pub sequence_actions: Vec<String>,
}

impl CanopyConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.checked()
    }

    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&content)
    }

    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(s)?;
        config.checked()
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&content)
    }

    /// Every range problem in the configuration. Empty means valid.
    #[must_use]
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        let base = &self.backend.base_url;
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            errors.push(format!("backend.base_url must be http(s), got {base:?}"));
        }
        if self.backend.connect_timeout_ms == 0 {
            errors.push("backend.connect_timeout_ms must be > 0".to_string());
        }
        if self.backend.request_timeout_ms == 0 {
            errors.push("backend.request_timeout_ms must be > 0".to_string());
        }
        if self.selection.history_depth == 0 {
            errors.push("selection.history_depth must be > 0".to_string());
        }
        if self.map.stand_layer_ids.iter().any(|l| l.trim().is_empty()) {
            errors.push("map.stand_layer_ids must not contain blank layer ids".to_string());
        }

        errors
    }

    fn checked(self) -> Result<Self, ConfigError> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(self)
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    #[must_use]
    pub fn history_config(&self) -> HistoryConfig {
        HistoryConfig::new(self.selection.history_depth)
    }

    #[must_use]
    pub fn prescription_catalog(&self) -> PrescriptionCatalog {
        PrescriptionCatalog::with_sequences(self.prescriptions.sequence_actions.iter().cloned())
    }
}

/// Errors that can occur when loading a configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("validation errors: {}", .0.join("; "))]
    Validation(Vec<String>),
}
