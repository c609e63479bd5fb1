#![forbid(unsafe_code)]

//! Shared value cell with synchronous change notification.
//!
//! # Design
//!
//! [`Observable<T>`] keeps a value of type `T` in shared, reference-counted
//! storage (`Rc<RefCell<..>>`). When the value changes (by `PartialEq`), all
//! live subscribers are called in registration order before the mutating
//! call returns.
//!
//! Stores in this crate wrap an `Observable` and hand out cheap clones of
//! themselves, so a session, its orchestrator and its map adapter can all
//! hold the same selection without any global.
//!
//! # Failure Modes
//!
//! - **Subscriber leak**: a [`Subscription`] kept alive forever keeps its
//!   callback alive forever. Dead weak references are pruned lazily in
//!   `emit()`.
//! - **Re-entrancy**: subscribers may read or even write the observable; no
//!   borrow is held while callbacks run.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use tracing::{debug, debug_span};
use web_time::Instant;

type CallbackRc<T> = Rc<dyn Fn(&T)>;
type CallbackWeak<T> = Weak<dyn Fn(&T)>;

struct ObservableInner<T> {
    value: T,
    version: u64,
    /// Weak so that dropping a [`Subscription`] is enough to unsubscribe.
    subscribers: Vec<CallbackWeak<T>>,
}

/// A shared, version-tracked value with change notification.
///
/// Cloning an `Observable` creates a new handle to the **same** state.
///
/// # Invariants
///
/// 1. `version` increments by exactly 1 on each value-changing mutation.
/// 2. `set(v)` where `v == current` is a no-op (no version bump, no emit).
/// 3. Subscribers are notified in registration order.
pub struct Observable<T> {
    inner: Rc<RefCell<ObservableInner<T>>>,
}

impl<T> Clone for Observable<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Observable<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("Observable")
            .field("value", &inner.value)
            .field("version", &inner.version)
            .field("subscriber_count", &inner.subscribers.len())
            .finish()
    }
}

impl<T: Default + Clone + PartialEq + 'static> Default for Observable<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: Clone + PartialEq + 'static> Observable<T> {
    #[must_use]
    pub fn new(value: T) -> Self {
        Self {
            inner: Rc::new(RefCell::new(ObservableInner {
                value,
                version: 0,
                subscribers: Vec::new(),
            })),
        }
    }

    /// Clone of the current value.
    #[must_use]
    pub fn get(&self) -> T {
        self.inner.borrow().value.clone()
    }

    /// Borrow the current value for the duration of `f`.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.borrow().value)
    }

    /// Replace the value; emits only if it differs from the current one.
    ///
    /// Returns whether subscribers were notified.
    pub fn set(&self, value: T) -> bool {
        {
            let mut inner = self.inner.borrow_mut();
            if inner.value == value {
                return false;
            }
            inner.value = value;
            inner.version += 1;
        }
        self.emit();
        true
    }

    /// Mutate in place; emits only if the value ends up different.
    ///
    /// Returns whether subscribers were notified.
    pub fn update(&self, f: impl FnOnce(&mut T)) -> bool {
        let changed = {
            let mut inner = self.inner.borrow_mut();
            let old = inner.value.clone();
            f(&mut inner.value);
            if inner.value != old {
                inner.version += 1;
                true
            } else {
                false
            }
        };
        if changed {
            self.emit();
        }
        changed
    }

    /// Register `callback` for every future change.
    ///
    /// The callback stays registered for as long as the returned
    /// [`Subscription`] is alive.
    pub fn subscribe(&self, callback: impl Fn(&T) + 'static) -> Subscription {
        let strong: CallbackRc<T> = Rc::new(callback);
        self.inner
            .borrow_mut()
            .subscribers
            .push(Rc::downgrade(&strong));
        Subscription {
            _guard: Box::new(strong),
        }
    }

    #[must_use]
    pub fn version(&self) -> u64 {
        self.inner.borrow().version
    }

    /// Registered subscribers, including dead ones not yet pruned.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner.borrow().subscribers.len()
    }

    /// Notify live subscribers with the current value and prune dead ones.
    pub fn emit(&self) {
        let (callbacks, value) = {
            let mut inner = self.inner.borrow_mut();
            inner.subscribers.retain(|w| w.strong_count() > 0);
            let callbacks: Vec<CallbackRc<T>> = inner
                .subscribers
                .iter()
                .filter_map(Weak::upgrade)
                .collect();
            (callbacks, inner.value.clone())
        };

        if callbacks.is_empty() {
            return;
        }

        let started = Instant::now();
        let _span = debug_span!("canopy.observable.emit", subscribers = callbacks.len()).entered();
        for cb in &callbacks {
            cb(&value);
        }
        debug!(
            duration_us = started.elapsed().as_micros() as u64,
            "observable subscribers notified"
        );
    }
}

/// Unsubscribe handle returned by [`Observable::subscribe`].
///
/// Dropping it (or calling [`unsubscribe`](Self::unsubscribe)) detaches the
/// callback; it will not be called again.
#[must_use = "dropping a Subscription immediately unsubscribes"]
pub struct Subscription {
    _guard: Box<dyn std::any::Any>,
}

impl Subscription {
    /// Explicitly detach the callback.
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").finish_non_exhaustive()
    }
}
