#![forbid(unsafe_code)]

//! Authoritative cache of stand → action assignments.
//!
//! [`TreatedStandRegistry`] keeps an insertion-ordered list so legend and
//! fill rendering stay stable across merges. It is a cheap-clone handle over
//! an [`Observable`], like the selection store.
//!
//! # Invariants
//!
//! 1. A stand id appears at most once.
//! 2. `merge` replaces existing entries in place and appends new ids.
//! 3. `restore(snapshot)` makes the registry deep-equal to `snapshot`.

use std::collections::{BTreeSet, HashMap};

use tracing::debug;

use crate::model::{Action, StandId, TreatedStand};
use crate::prescription::PrescriptionCatalog;
use crate::reactive::{Observable, Subscription};

/// Owned copy of the registry contents, used for optimistic rollback.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RegistrySnapshot(Vec<TreatedStand>);

impl RegistrySnapshot {
    #[must_use]
    pub fn entries(&self) -> &[TreatedStand] {
        &self.0
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Observable stand → action map with upsert semantics.
#[derive(Clone, Debug, Default)]
pub struct TreatedStandRegistry {
    entries: Observable<Vec<TreatedStand>>,
}

impl TreatedStandRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace everything. Duplicate ids collapse, the last one wins.
    pub fn set_all(&self, assignments: impl IntoIterator<Item = TreatedStand>) {
        let mut next = Vec::new();
        upsert_into(&mut next, assignments);
        let count = next.len();
        self.entries.set(next);
        debug!(count, "registry replaced");
    }

    /// Upsert by id. Entries not named in `assignments` are untouched.
    pub fn merge(&self, assignments: impl IntoIterator<Item = TreatedStand>) {
        let incoming: Vec<TreatedStand> = assignments.into_iter().collect();
        if incoming.is_empty() {
            return;
        }
        let count = incoming.len();
        self.entries.update(|entries| upsert_into(entries, incoming));
        debug!(count, "registry merged");
    }

    /// Delete every entry whose id is in `ids`; unknown ids are ignored.
    pub fn remove_by_ids(&self, ids: &[StandId]) {
        let doomed: BTreeSet<StandId> = ids.iter().copied().collect();
        let changed = self
            .entries
            .update(|entries| entries.retain(|e| !doomed.contains(&e.id)));
        if changed {
            debug!(requested = ids.len(), "registry entries removed");
        }
    }

    /// Full current list.
    #[must_use]
    pub fn all(&self) -> Vec<TreatedStand> {
        self.entries.get()
    }

    #[must_use]
    pub fn action_for(&self, id: StandId) -> Option<Action> {
        self.entries
            .with(|entries| entries.iter().find(|e| e.id == id).map(|e| e.action.clone()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.with(Vec::len)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.with(Vec::is_empty)
    }

    /// Distinct actions in first-seen order, for the legend.
    #[must_use]
    pub fn distinct_actions(&self) -> Vec<Action> {
        self.entries.with(|entries| {
            let mut seen = BTreeSet::new();
            let mut actions = Vec::new();
            for entry in entries {
                if seen.insert(&entry.action) {
                    actions.push(entry.action.clone());
                }
            }
            actions
        })
    }

    /// Ids whose action is a multi-step sequence, for icon selection.
    #[must_use]
    pub fn sequence_stand_ids(&self, catalog: &PrescriptionCatalog) -> Vec<StandId> {
        self.entries.with(|entries| {
            entries
                .iter()
                .filter(|e| catalog.is_sequence(&e.action))
                .map(|e| e.id)
                .collect()
        })
    }

    #[must_use]
    pub fn snapshot(&self) -> RegistrySnapshot {
        RegistrySnapshot(self.entries.get())
    }

    /// Put the registry back exactly as it was when `snapshot` was taken.
    pub fn restore(&self, snapshot: RegistrySnapshot) {
        debug!(count = snapshot.len(), "registry restored from snapshot");
        self.entries.set(snapshot.0);
    }

    #[must_use]
    pub fn version(&self) -> u64 {
        self.entries.version()
    }

    /// Called synchronously with the full list after every change.
    pub fn subscribe(&self, callback: impl Fn(&[TreatedStand]) + 'static) -> Subscription {
        self.entries.subscribe(move |entries: &Vec<TreatedStand>| callback(entries))
    }

    /// Empty the registry (session teardown).
    pub fn clear(&self) {
        self.entries.set(Vec::new());
    }
}

fn upsert_into(entries: &mut Vec<TreatedStand>, incoming: impl IntoIterator<Item = TreatedStand>) {
    let mut index: HashMap<StandId, usize> = entries
        .iter()
        .enumerate()
        .map(|(i, e)| (e.id, i))
        .collect();
    for stand in incoming {
        match index.get(&stand.id) {
            Some(&i) => entries[i] = stand,
            None => {
                index.insert(stand.id, entries.len());
                entries.push(stand);
            }
        }
    }
}
