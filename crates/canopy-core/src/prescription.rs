#![forbid(unsafe_code)]

//! Single-step vs multi-step prescriptions.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::model::Action;

/// Kind of a prescription as reported in the summary `type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PrescriptionKind {
    #[default]
    Single,
    Sequence,
}

/// Knows which actions are multi-step sequences.
///
/// Seeded from configuration and extended from every loaded summary.
/// Unknown actions are treated as single-step.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrescriptionCatalog {
    sequences: BTreeSet<Action>,
}

impl PrescriptionCatalog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalogue that already knows `actions` as sequences.
    #[must_use]
    pub fn with_sequences<I, A>(actions: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<Action>,
    {
        Self {
            sequences: actions.into_iter().map(Into::into).collect(),
        }
    }

    /// Record the kind of `action`. Returns `true` if the catalogue changed.
    pub fn record(&mut self, action: &Action, kind: PrescriptionKind) -> bool {
        match kind {
            PrescriptionKind::Sequence => self.sequences.insert(action.clone()),
            PrescriptionKind::Single => false,
        }
    }

    #[must_use]
    pub fn kind_of(&self, action: &Action) -> PrescriptionKind {
        if self.sequences.contains(action) {
            PrescriptionKind::Sequence
        } else {
            PrescriptionKind::Single
        }
    }

    #[must_use]
    pub fn is_sequence(&self, action: &Action) -> bool {
        self.kind_of(action) == PrescriptionKind::Sequence
    }

    #[must_use]
    pub fn sequence_count(&self) -> usize {
        self.sequences.len()
    }
}
