#![forbid(unsafe_code)]

//! Optimistic update with rollback.
//!
//! Apply a local change first, run the remote call, and put the exact prior
//! state back if the call fails. [`optimistic_mutate`] is the one-shot form;
//! [`Pending`] splits it so the remote call can complete later, on another
//! thread.

use canopy_core::{RegistrySnapshot, TreatedStandRegistry};
use tracing::{debug, warn};

/// State that can be copied out and put back verbatim.
pub trait Snapshotting {
    type Snapshot;

    fn snapshot(&self) -> Self::Snapshot;
    fn restore(&self, snapshot: Self::Snapshot);
}

impl Snapshotting for TreatedStandRegistry {
    type Snapshot = RegistrySnapshot;

    fn snapshot(&self) -> RegistrySnapshot {
        TreatedStandRegistry::snapshot(self)
    }

    fn restore(&self, snapshot: RegistrySnapshot) {
        TreatedStandRegistry::restore(self, snapshot);
    }
}

/// An optimistic change that has been applied locally but not confirmed.
#[derive(Debug)]
#[must_use = "an unresolved optimistic change can never be rolled back"]
pub struct Pending<S> {
    snapshot: S,
}

impl<S> Pending<S> {
    /// Snapshot `target`, then apply the local change.
    pub fn begin<T>(target: &T, apply: impl FnOnce(&T)) -> Self
    where
        T: Snapshotting<Snapshot = S>,
    {
        let snapshot = target.snapshot();
        apply(target);
        Self { snapshot }
    }

    /// Keep the change on success; restore the snapshot on failure.
    pub fn resolve<T, R, E>(self, target: &T, outcome: Result<R, E>) -> Result<R, E>
    where
        T: Snapshotting<Snapshot = S>,
    {
        match outcome {
            Ok(value) => {
                debug!("optimistic change confirmed");
                Ok(value)
            }
            Err(err) => {
                target.restore(self.snapshot);
                warn!("optimistic change rolled back");
                Err(err)
            }
        }
    }

    /// Like [`resolve`](Self::resolve), but on failure restore `fallback`
    /// instead of the snapshot taken at [`begin`](Self::begin).
    pub fn resolve_onto<T, R, E>(
        self,
        target: &T,
        fallback: S,
        outcome: Result<R, E>,
    ) -> Result<R, E>
    where
        T: Snapshotting<Snapshot = S>,
    {
        match outcome {
            Ok(value) => {
                debug!("optimistic change confirmed");
                Ok(value)
            }
            Err(err) => {
                target.restore(fallback);
                warn!("optimistic change rolled back onto pending state");
                Err(err)
            }
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> &S {
        &self.snapshot
    }
}

/// Apply `apply` to `target`, run `request`, and roll back if it fails.
pub fn optimistic_mutate<T, R, E>(
    target: &T,
    apply: impl FnOnce(&T),
    request: impl FnOnce() -> Result<R, E>,
) -> Result<R, E>
where
    T: Snapshotting,
{
    let pending = Pending::begin(target, apply);
    pending.resolve(target, request())
}

#[cfg(test)]
mod tests {
    use super::*;
    use canopy_core::{StandId, TreatedStand, stand_ids};

    fn seeded() -> TreatedStandRegistry {
        let registry = TreatedStandRegistry::new();
        registry.set_all([
            TreatedStand::new(StandId(1), "cut"),
            TreatedStand::new(StandId(2), "cut"),
        ]);
        registry
    }

    #[test]
    fn success_keeps_local_change() {
        let registry = seeded();
        let result: Result<u8, &str> =
            optimistic_mutate(&registry, |r| r.remove_by_ids(&stand_ids(&[2])), || Ok(7));
        assert_eq!(result, Ok(7));
        assert_eq!(registry.all(), vec![TreatedStand::new(StandId(1), "cut")]);
    }

    #[test]
    fn failure_restores_exact_snapshot() {
        let registry = seeded();
        let before = registry.snapshot();
        let result: Result<(), &str> = optimistic_mutate(
            &registry,
            |r| r.merge([TreatedStand::new(StandId(1), "burn")]),
            || Err("offline"),
        );
        assert_eq!(result, Err("offline"));
        assert_eq!(registry.snapshot(), before);
    }

    #[test]
    fn local_change_is_visible_before_request_runs() {
        let registry = seeded();
        let _: Result<(), ()> = optimistic_mutate(
            &registry,
            |r| r.merge([TreatedStand::new(StandId(9), "burn")]),
            || {
                assert_eq!(registry.len(), 3);
                Ok(())
            },
        );
    }

    #[test]
    fn split_phase_resolves_later() {
        let registry = seeded();
        let pending = Pending::begin(&registry, |r| r.clear());
        assert!(registry.is_empty());
        assert_eq!(pending.snapshot().len(), 2);
        let outcome: Result<(), &str> = pending.resolve(&registry, Err("timeout"));
        assert!(outcome.is_err());
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn resolve_onto_restores_the_given_state() {
        let registry = seeded();
        let pending = Pending::begin(&registry, |r| r.remove_by_ids(&stand_ids(&[1])));
        let fallback = {
            let scratch = TreatedStandRegistry::new();
            scratch.set_all([TreatedStand::new(StandId(7), "thin")]);
            scratch.snapshot()
        };
        let outcome: Result<(), &str> =
            pending.resolve_onto(&registry, fallback.clone(), Err("busy"));
        assert!(outcome.is_err());
        assert_eq!(registry.snapshot(), fallback);
    }
}
