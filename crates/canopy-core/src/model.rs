#![forbid(unsafe_code)]

//! Identifiers and the treated-stand record shared by every store.
//!
//! All ids are thin `Copy` newtypes over the backend's integer keys and
//! serialize transparently, so they can be dropped straight into the JSON
//! payloads the treatment backend expects.

use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! integer_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl $name {
            /// Raw backend key.
            #[must_use]
            pub const fn get(self) -> i64 {
                self.0
            }
        }

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

integer_id!(
    /// A stand: the smallest spatial unit a prescription can be assigned to.
    ///
    /// Unique within a treatment plan. Geometry lives in the map tile source.
    StandId
);

integer_id!(
    /// The treatment plan grouping all stands and assignments of one run.
    TreatmentPlanId
);

integer_id!(
    /// A project area, the sub-region every mutation is scoped to.
    ProjectAreaId
);

integer_id!(
    /// The scenario a treatment plan was derived from.
    ScenarioId
);

/// A named treatment prescription, single-step or a multi-step sequence.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Action(String);

impl Action {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Action {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for Action {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One assignment: `stand` carries `action`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TreatedStand {
    pub id: StandId,
    pub action: Action,
}

impl TreatedStand {
    #[must_use]
    pub fn new(id: StandId, action: impl Into<Action>) -> Self {
        Self {
            id,
            action: action.into(),
        }
    }
}

/// Pair every id in `ids` with the same `action`.
#[must_use]
pub fn assignments_for(action: &Action, ids: &[StandId]) -> Vec<TreatedStand> {
    ids.iter()
        .map(|id| TreatedStand {
            id: *id,
            action: action.clone(),
        })
        .collect()
}

/// Convenience for tests and fixtures: build stand ids from raw keys.
#[must_use]
pub fn stand_ids(raw: &[i64]) -> Vec<StandId> {
    raw.iter().copied().map(StandId).collect()
}
