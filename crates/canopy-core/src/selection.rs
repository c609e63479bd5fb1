#![forbid(unsafe_code)]

//! Which stands are currently selected on the map.
//!
//! [`StandSelectionStore`] is a cheap-clone handle: every clone sees the same
//! selection, history, backup slot and drag state. One store exists per
//! treatment-plan view.
//!
//! Two ways of emptying the selection exist and they never interact:
//!
//! - [`clear`](StandSelectionStore::clear) / [`undo`](StandSelectionStore::undo)
//!   go through the bounded [`History`] (user-visible undo).
//! - [`backup_and_clear`](StandSelectionStore::backup_and_clear) /
//!   [`restore`](StandSelectionStore::restore) park the selection in a single
//!   slot for temporary clears such as a base-layer switch.
//!
//! A drag gesture computes its additive result against the selection that
//! existed when the drag began, so shrinking the rectangle mid-gesture never
//! drops stands that were selected before the drag.

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::rc::Rc;

use tracing::debug;

use crate::history::{History, HistoryConfig};
use crate::model::StandId;
use crate::reactive::{Observable, Subscription};

/// A set of selected stand ids.
pub type Selection = BTreeSet<StandId>;

#[derive(Debug, Default)]
struct SelectionState {
    history: History<Selection>,
    backup: Option<Selection>,
    drag_base: Option<Selection>,
}

/// Observable set of selected stands with undo and backup/restore.
#[derive(Clone, Debug)]
pub struct StandSelectionStore {
    selected: Observable<Selection>,
    state: Rc<RefCell<SelectionState>>,
}

impl Default for StandSelectionStore {
    fn default() -> Self {
        Self::new(HistoryConfig::default())
    }
}

impl StandSelectionStore {
    #[must_use]
    pub fn new(history: HistoryConfig) -> Self {
        Self {
            selected: Observable::new(Selection::new()),
            state: Rc::new(RefCell::new(SelectionState {
                history: History::new(history),
                backup: None,
                drag_base: None,
            })),
        }
    }

    // ====================================================================
    // Queries
    // ====================================================================

    /// Snapshot of the current selection.
    #[must_use]
    pub fn selected(&self) -> Selection {
        self.selected.get()
    }

    /// Current selection as a sorted id list.
    #[must_use]
    pub fn selected_ids(&self) -> Vec<StandId> {
        self.selected.with(|s| s.iter().copied().collect())
    }

    #[must_use]
    pub fn is_selected(&self, id: StandId) -> bool {
        self.selected.with(|s| s.contains(&id))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.selected.with(BTreeSet::len)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.selected.with(BTreeSet::is_empty)
    }

    #[must_use]
    pub fn can_undo(&self) -> bool {
        !self.state.borrow().history.is_empty()
    }

    #[must_use]
    pub fn history_depth(&self) -> usize {
        self.state.borrow().history.depth()
    }

    #[must_use]
    pub fn has_backup(&self) -> bool {
        self.state.borrow().backup.is_some()
    }

    #[must_use]
    pub fn is_dragging(&self) -> bool {
        self.state.borrow().drag_base.is_some()
    }

    /// Bumped on every actual change of the selection.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.selected.version()
    }

    /// Called synchronously with the new selection after every change.
    pub fn subscribe(&self, callback: impl Fn(&Selection) + 'static) -> Subscription {
        self.selected.subscribe(callback)
    }

    // ====================================================================
    // Mutations
    // ====================================================================

    /// Set the selection verbatim. Idempotent.
    pub fn replace_selection(&self, ids: impl IntoIterator<Item = StandId>) {
        let next: Selection = ids.into_iter().collect();
        let count = next.len();
        if self.selected.set(next) {
            debug!(count, "selection replaced");
        }
    }

    /// Add `id` if absent, remove it if present. Returns whether `id` is
    /// selected afterwards.
    pub fn toggle(&self, id: StandId) -> bool {
        let mut now_selected = false;
        self.selected.update(|s| {
            if !s.remove(&id) {
                s.insert(id);
                now_selected = true;
            }
        });
        debug!(stand = %id, selected = now_selected, "selection toggled");
        now_selected
    }

    /// Add every id in `ids`, keeping what is already selected.
    pub fn select_many(&self, ids: impl IntoIterator<Item = StandId>) {
        self.selected.update(|s| s.extend(ids));
    }

    /// Push the current selection onto the undo history, then empty it.
    pub fn clear(&self) {
        let current = self.selected.get();
        let depth = {
            let mut state = self.state.borrow_mut();
            state.history.push(current);
            state.history.depth()
        };
        self.selected.set(Selection::new());
        debug!(history_depth = depth, "selection cleared");
    }

    /// Restore the selection saved by the most recent `clear()`.
    ///
    /// Returns `false` (and changes nothing) when the history is empty.
    pub fn undo(&self) -> bool {
        let previous = self.state.borrow_mut().history.pop();
        match previous {
            Some(previous) => {
                debug!(count = previous.len(), "selection undo");
                self.selected.set(previous);
                true
            }
            None => false,
        }
    }

    /// Park the current selection aside and empty it without touching the
    /// undo history. A second call overwrites the earlier backup.
    pub fn backup_and_clear(&self) {
        let current = self.selected.get();
        debug!(count = current.len(), "selection backed up");
        self.state.borrow_mut().backup = Some(current);
        self.selected.set(Selection::new());
    }

    /// Reinstate the parked selection. No-op without a backup.
    pub fn restore(&self) -> bool {
        let backup = self.state.borrow_mut().backup.take();
        match backup {
            Some(backup) => {
                debug!(count = backup.len(), "selection restored");
                self.selected.set(backup);
                true
            }
            None => false,
        }
    }

    // ====================================================================
    // Drag selection
    // ====================================================================

    /// Start an additive drag gesture; the live selection becomes the base.
    pub fn begin_drag(&self) {
        let base = self.selected.get();
        self.state.borrow_mut().drag_base = Some(base);
    }

    /// Set the selection to `base ∪ ids_in_box`.
    ///
    /// Without a prior `begin_drag` the live selection is used as base.
    pub fn update_drag(&self, ids_in_box: impl IntoIterator<Item = StandId>) {
        let base = {
            let state = self.state.borrow();
            state.drag_base.clone()
        };
        let mut next = base.unwrap_or_else(|| self.selected.get());
        next.extend(ids_in_box);
        self.selected.set(next);
    }

    /// Finish the gesture, keeping the last computed selection.
    pub fn end_drag(&self) {
        self.state.borrow_mut().drag_base = None;
    }

    /// Abort the gesture and return to the pre-drag selection.
    pub fn cancel_drag(&self) {
        let base = self.state.borrow_mut().drag_base.take();
        if let Some(base) = base {
            self.selected.set(base);
        }
    }

    /// Drop selection, history, backup and drag state (session teardown).
    pub fn reset(&self) {
        {
            let mut state = self.state.borrow_mut();
            state.history.clear();
            state.backup = None;
            state.drag_base = None;
        }
        self.selected.set(Selection::new());
    }
}
