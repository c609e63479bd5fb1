#![forbid(unsafe_code)]

//! Bounded LIFO stack of prior states.
//!
//! [`History`] backs the selection store's `clear()`/`undo()` pair. Every
//! `push` stores an owned snapshot; once `max_depth` is exceeded the oldest
//! snapshot is evicted from the front.
//!
//! ```text
//! push(s3) with max_depth = 3
//! ┌──────────────────────────────┐
//! │ [s0, s1, s2] -> [s1, s2, s3] │   s0 evicted
//! └──────────────────────────────┘
//! pop() -> s3
//! ┌──────────────────────────────┐
//! │ [s1, s2]                     │
//! └──────────────────────────────┘
//! ```
//!
//! # Invariants
//!
//! 1. `depth() <= config.max_depth` after any operation.
//! 2. `pop()` returns snapshots in exact reverse push order (LIFO).
//! 3. `pop()` on an empty history returns `None` and changes nothing.

use std::collections::VecDeque;
use std::fmt;

/// Configuration for a [`History`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryConfig {
    /// Maximum number of snapshots retained. `0` disables history.
    pub max_depth: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self { max_depth: 50 }
    }
}

impl HistoryConfig {
    #[must_use]
    pub fn new(max_depth: usize) -> Self {
        Self { max_depth }
    }

    /// Keep every snapshot (for testing).
    #[must_use]
    pub fn unlimited() -> Self {
        Self {
            max_depth: usize::MAX,
        }
    }
}

/// A depth-bounded undo stack of owned snapshots.
pub struct History<T> {
    stack: VecDeque<T>,
    config: HistoryConfig,
    evicted: u64,
}

impl<T> fmt::Debug for History<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("History")
            .field("depth", &self.stack.len())
            .field("evicted", &self.evicted)
            .field("config", &self.config)
            .finish()
    }
}

impl<T> Default for History<T> {
    fn default() -> Self {
        Self::new(HistoryConfig::default())
    }
}

impl<T> History<T> {
    #[must_use]
    pub fn new(config: HistoryConfig) -> Self {
        Self {
            stack: VecDeque::new(),
            config,
            evicted: 0,
        }
    }

    /// Push a snapshot, evicting the oldest ones beyond `max_depth`.
    pub fn push(&mut self, snapshot: T) {
        self.stack.push_back(snapshot);
        while self.stack.len() > self.config.max_depth {
            self.stack.pop_front();
            self.evicted += 1;
        }
    }

    /// Pop the most recent snapshot.
    pub fn pop(&mut self) -> Option<T> {
        self.stack.pop_back()
    }

    /// Most recent snapshot without removing it.
    #[must_use]
    pub fn peek(&self) -> Option<&T> {
        self.stack.back()
    }

    #[must_use]
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    /// Snapshots dropped by the depth bound since creation.
    #[must_use]
    pub fn evicted(&self) -> u64 {
        self.evicted
    }

    #[must_use]
    pub fn config(&self) -> &HistoryConfig {
        &self.config
    }

    pub fn clear(&mut self) {
        self.stack.clear();
    }
}
