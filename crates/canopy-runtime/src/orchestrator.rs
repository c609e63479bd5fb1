#![forbid(unsafe_code)]

//! Treatment orchestration: scope, summary loading and optimistic mutations.
//!
//! # Lifecycle
//!
//! ```text
//! Unscoped ──set_treatment_plan_id──▶ ScopedNoSummary ──load_summary──▶ Ready
//!                                                                      │  ▲
//!                                                          submit/assign  settle
//!                                                                      ▼  │
//!                                                                    Mutating
//! ```
//!
//! Mutations come in two forms:
//!
//! - **Blocking**: [`TreatmentOrchestrator::assign`] and
//!   [`TreatmentOrchestrator::remove`] apply, call the backend on the current
//!   thread and settle before returning.
//! - **Split-phase**: [`submit`](TreatmentOrchestrator::submit) validates,
//!   applies the optimistic change and queues,
//!   [`next_dispatch`](TreatmentOrchestrator::next_dispatch) hands out the
//!   next request the policy releases, and
//!   [`settle`](TreatmentOrchestrator::settle) keeps or reverts it once the
//!   backend answers. The backend call itself can run anywhere, typically on
//!   a [`MutationDispatcher`](crate::dispatcher::MutationDispatcher) worker.
//!
//! # Invariants
//!
//! 1. No backend call is made for a mutation that fails scope validation.
//! 2. Every submitted mutation is visible in the registry until it settles.
//! 3. Under [`MutationPolicy::Queued`] the registry always equals the
//!    confirmed state with the unsettled mutations replayed in ticket order,
//!    so a failure drops exactly its own effect. Under
//!    [`MutationPolicy::Concurrent`] a failure restores the registry as it was
//!    when that mutation was submitted.
//! 4. Settling an unknown ticket changes nothing.

use std::sync::Arc;

use canopy_core::{
    Action, PlanSummary, PrescriptionCatalog, ProjectAreaId, RegistrySnapshot, ScenarioId,
    StandId, StandSelectionStore, TreatedStandRegistry, TreatmentPlan, TreatmentPlanId,
};
use tracing::{debug, field, info, info_span, warn};

use crate::backend::{MutationRequest, TreatmentBackend};
use crate::error::{BackendError, PreconditionError, Result, ScopeError, TreatmentError};
use crate::map::MapViewport;
use crate::mutation::{Dispatch, Mutation, MutationPolicy, MutationQueue, Ticket};
use crate::optimistic::Pending;

/// Coarse lifecycle state, for enabling and disabling controls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrchestratorState {
    Unscoped,
    ScopedNoSummary,
    Ready,
    Mutating,
}

/// How a settled mutation ended when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    /// The backend accepted the change; the optimistic state stands.
    Confirmed(Ticket),
    /// The ticket is no longer tracked (e.g. `reset()` ran meanwhile).
    Stale(Ticket),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Scope {
    treatment_plan: Option<TreatmentPlanId>,
    project_area: Option<ProjectAreaId>,
    scenario: Option<ScenarioId>,
}

#[derive(Debug)]
struct CachedSummary {
    plan: TreatmentPlanId,
    summary: PlanSummary,
}

/// Coordinates scope, the treated-stand registry and backend mutations for
/// one treatment-plan view.
pub struct TreatmentOrchestrator<B> {
    backend: Arc<B>,
    registry: TreatedStandRegistry,
    selection: StandSelectionStore,
    viewport: Option<Box<dyn MapViewport>>,
    catalog: PrescriptionCatalog,
    catalog_seed: PrescriptionCatalog,
    scope: Scope,
    summary: Option<CachedSummary>,
    plan_details: Option<TreatmentPlan>,
    queue: MutationQueue,
    /// Registry contents with only confirmed mutations applied; `Some` while
    /// the queue has work.
    confirmed: Option<RegistrySnapshot>,
}

impl<B: TreatmentBackend> TreatmentOrchestrator<B> {
    #[must_use]
    pub fn new(
        backend: Arc<B>,
        registry: TreatedStandRegistry,
        selection: StandSelectionStore,
    ) -> Self {
        Self {
            backend,
            registry,
            selection,
            viewport: None,
            catalog: PrescriptionCatalog::new(),
            catalog_seed: PrescriptionCatalog::new(),
            scope: Scope::default(),
            summary: None,
            plan_details: None,
            queue: MutationQueue::default(),
            confirmed: None,
        }
    }

    /// Recenter `viewport` whenever a summary loads.
    #[must_use]
    pub fn with_viewport(mut self, viewport: impl MapViewport + 'static) -> Self {
        self.viewport = Some(Box::new(viewport));
        self
    }

    #[must_use]
    pub fn with_catalog(mut self, catalog: PrescriptionCatalog) -> Self {
        self.catalog_seed = catalog.clone();
        self.catalog = catalog;
        self
    }

    /// Ignored, with a warning, while mutations are queued or in flight.
    #[must_use]
    pub fn with_policy(mut self, policy: MutationPolicy) -> Self {
        if self.queue.is_idle() {
            self.queue = MutationQueue::new(policy);
        } else {
            warn!(
                requested = ?policy,
                current = ?self.queue.policy(),
                "mutation policy unchanged while mutations are outstanding"
            );
        }
        self
    }

    // -- scope ---------------------------------------------------------

    pub fn set_treatment_plan_id(&mut self, id: TreatmentPlanId) {
        self.scope.treatment_plan = Some(id);
    }

    /// `None` widens back to the whole plan.
    pub fn set_project_area_id(&mut self, id: Option<ProjectAreaId>) {
        self.scope.project_area = id;
    }

    pub fn set_scenario_id(&mut self, id: ScenarioId) {
        self.scope.scenario = Some(id);
    }

    pub fn treatment_plan_id(&self) -> std::result::Result<TreatmentPlanId, PreconditionError> {
        self.scope
            .treatment_plan
            .ok_or(PreconditionError::TreatmentPlanIdUnset)
    }

    pub fn scenario_id(&self) -> std::result::Result<ScenarioId, PreconditionError> {
        self.scope.scenario.ok_or(PreconditionError::ScenarioIdUnset)
    }

    #[must_use]
    pub fn project_area_id(&self) -> Option<ProjectAreaId> {
        self.scope.project_area
    }

    // -- queries -------------------------------------------------------

    #[must_use]
    pub fn state(&self) -> OrchestratorState {
        if self.queue.is_busy() {
            return OrchestratorState::Mutating;
        }
        match self.scope.treatment_plan {
            None => OrchestratorState::Unscoped,
            Some(plan) if self.summary.as_ref().is_some_and(|c| c.plan == plan) => {
                OrchestratorState::Ready
            }
            Some(_) => OrchestratorState::ScopedNoSummary,
        }
    }

    /// `true` while any mutation awaits its backend response.
    #[must_use]
    pub fn is_mutating(&self) -> bool {
        self.queue.is_busy()
    }

    #[must_use]
    pub fn queued_count(&self) -> usize {
        self.queue.queued_count()
    }

    #[must_use]
    pub fn in_flight_count(&self) -> usize {
        self.queue.in_flight_count()
    }

    #[must_use]
    pub fn policy(&self) -> MutationPolicy {
        self.queue.policy()
    }

    #[must_use]
    pub fn summary(&self) -> Option<&PlanSummary> {
        self.summary.as_ref().map(|c| &c.summary)
    }

    #[must_use]
    pub fn treatment_plan(&self) -> Option<&TreatmentPlan> {
        self.plan_details.as_ref()
    }

    #[must_use]
    pub fn catalog(&self) -> &PrescriptionCatalog {
        &self.catalog
    }

    #[must_use]
    pub fn registry(&self) -> &TreatedStandRegistry {
        &self.registry
    }

    #[must_use]
    pub fn selection(&self) -> &StandSelectionStore {
        &self.selection
    }

    #[must_use]
    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    /// Stands whose prescription is a multi-step sequence.
    #[must_use]
    pub fn sequence_stand_ids(&self) -> Vec<StandId> {
        self.registry.sequence_stand_ids(&self.catalog)
    }

    // -- loading -------------------------------------------------------

    /// Fetch the plan summary and replace the registry with it.
    ///
    /// A cached summary for the same plan is reused unless a project area is
    /// scoped.
    pub fn load_summary(&mut self) -> Result<()> {
        let plan = self.scope.treatment_plan.ok_or(ScopeError::MissingTreatmentPlan {
            operation: "load_summary",
        })?;
        let area = self.scope.project_area;
        let _span = info_span!(
            "treatment.load_summary",
            plan = plan.get(),
            project_area = area.map(ProjectAreaId::get)
        )
        .entered();

        if area.is_none() && self.summary.as_ref().is_some_and(|c| c.plan == plan) {
            debug!("summary already cached");
            return Ok(());
        }

        let summary = self.backend.summary(plan)?;
        let assignments = summary.stand_assignments();
        let stand_count = assignments.len();
        self.registry.set_all(assignments);
        summary.record_kinds(&mut self.catalog);

        if let Some(extent) = summary.extent_for(area) {
            if let Some(viewport) = self.viewport.as_mut() {
                viewport.fit_bounds(extent);
            }
        }

        info!(
            stand_count,
            project_areas = summary.project_areas.len(),
            "summary loaded"
        );
        self.summary = Some(CachedSummary { plan, summary });
        Ok(())
    }

    /// Fetch and cache the plan's descriptive details.
    pub fn load_treatment_plan(&mut self) -> Result<&TreatmentPlan> {
        let plan = self.scope.treatment_plan.ok_or(ScopeError::MissingTreatmentPlan {
            operation: "load_treatment_plan",
        })?;
        let details = self.backend.treatment_plan(plan)?;
        debug!(plan = plan.get(), status = %details.status, "treatment plan loaded");
        Ok(&*self.plan_details.insert(details))
    }

    // -- mutations -----------------------------------------------------

    /// Assign `action` to `stand_ids` and wait for the backend.
    ///
    /// The registry shows the new assignments immediately and reverts if the
    /// backend call fails.
    pub fn assign(&mut self, action: impl Into<Action>, stand_ids: &[StandId]) -> Result<()> {
        self.run(Mutation::assign(action, stand_ids))
    }

    /// Remove any assignment from `stand_ids` and wait for the backend.
    pub fn remove(&mut self, stand_ids: &[StandId]) -> Result<()> {
        self.run(Mutation::remove(stand_ids))
    }

    fn run(&mut self, mutation: Mutation) -> Result<()> {
        let request = self.request_for(&mutation)?;
        if self.queue.policy() == MutationPolicy::Queued && !self.queue.is_idle() {
            return Err(TreatmentError::MutationInFlight);
        }
        let ticket = self.enqueue(request);
        let Some(dispatch) = self.queue.take_waiting(ticket) else {
            return Err(TreatmentError::MutationInFlight);
        };
        debug!(%ticket, "treatment mutation dispatched");
        let outcome = self.backend.execute(&dispatch.request);
        self.settle(ticket, outcome).map(|_| ())
    }

    /// Validate a mutation, apply it to the registry and queue it.
    ///
    /// The change is visible immediately and the selection is cleared
    /// (undoably). Nothing is sent until [`next_dispatch`](Self::next_dispatch)
    /// hands the request out.
    pub fn submit(&mut self, mutation: Mutation) -> Result<Ticket> {
        let request = self.request_for(&mutation)?;
        Ok(self.enqueue(request))
    }

    /// Hand out the next queued mutation for execution.
    ///
    /// Returns `None` when nothing is waiting, or when the policy holds the
    /// next request back until the in-flight one settles.
    pub fn next_dispatch(&mut self) -> Option<Dispatch> {
        let dispatch = self.queue.pop_ready()?;
        debug!(ticket = %dispatch.ticket, "treatment mutation dispatched");
        Some(dispatch)
    }

    /// Record the backend's answer for `ticket`.
    ///
    /// On failure the mutation's effect is reverted and the error is returned
    /// as [`TreatmentError::Network`].
    pub fn settle(
        &mut self,
        ticket: Ticket,
        outcome: std::result::Result<(), BackendError>,
    ) -> Result<Settlement> {
        let Some(flight) = self.queue.take_in_flight(ticket) else {
            debug!(%ticket, "ignoring response for untracked mutation");
            return Ok(Settlement::Stale(ticket));
        };

        let span = info_span!(
            "treatment.mutation",
            ticket = ticket.0,
            kind = flight.request.kind(),
            stand_count = flight.request.stand_ids().len(),
            outcome = field::Empty
        );
        let _guard = span.enter();

        let resolved = match self.queue.policy() {
            MutationPolicy::Concurrent => flight.pending.resolve(&self.registry, outcome),
            MutationPolicy::Queued => match outcome {
                Ok(()) => {
                    self.confirmed = self
                        .confirmed
                        .take()
                        .map(|base| replay(base, [&flight.request]));
                    flight.pending.resolve(&self.registry, Ok(()))
                }
                Err(err) => match self.confirmed.clone() {
                    Some(base) => {
                        let rebuilt = replay(base, self.queue.outstanding());
                        flight.pending.resolve_onto(&self.registry, rebuilt, Err(err))
                    }
                    None => flight.pending.resolve(&self.registry, Err(err)),
                },
            },
        };
        if self.queue.is_idle() {
            self.confirmed = None;
        }

        match resolved {
            Ok(()) => {
                span.record("outcome", "confirmed");
                info!("treatment mutation saved");
                Ok(Settlement::Confirmed(ticket))
            }
            Err(err) => {
                span.record("outcome", "rolled_back");
                warn!(error = %err, "treatment mutation failed, registry reverted");
                Err(TreatmentError::Network(err))
            }
        }
    }

    /// Drop the summary, plan details, registry contents, scope and any
    /// queued or in-flight mutations, and put the catalog back to its
    /// configured seed. Late responses settle as stale.
    pub fn reset(&mut self) {
        let dropped = self.queue.queued_count() + self.queue.in_flight_count();
        self.queue.clear();
        self.confirmed = None;
        self.catalog = self.catalog_seed.clone();
        self.summary = None;
        self.plan_details = None;
        self.scope = Scope::default();
        self.registry.clear();
        info!(dropped_mutations = dropped, "treatment orchestrator reset");
    }

    fn request_for(&self, mutation: &Mutation) -> Result<MutationRequest> {
        let operation = mutation.operation();
        if mutation.stand_ids().is_empty() {
            return Err(TreatmentError::EmptyStandIds { operation });
        }
        let plan = self
            .scope
            .treatment_plan
            .ok_or(ScopeError::MissingTreatmentPlan { operation })?;
        let project_area = self
            .scope
            .project_area
            .ok_or(ScopeError::MissingProjectArea { operation })?;

        Ok(match mutation {
            Mutation::Assign { action, stand_ids } => MutationRequest::SetTreatments {
                plan,
                project_area,
                action: action.clone(),
                stand_ids: stand_ids.clone(),
            },
            Mutation::Remove { stand_ids } => MutationRequest::RemoveTreatments {
                plan,
                stand_ids: stand_ids.clone(),
            },
        })
    }

    fn enqueue(&mut self, request: MutationRequest) -> Ticket {
        if self.queue.is_idle() {
            self.confirmed = Some(self.registry.snapshot());
        }
        let pending = Pending::begin(&self.registry, |registry| request.apply_to(registry));
        self.selection.clear();
        let kind = request.kind();
        let ticket = self.queue.enqueue(request, pending);
        debug!(%ticket, kind, "treatment mutation queued");
        ticket
    }
}

/// `base` with `requests` applied in order, computed off the live registry so
/// subscribers only see the result.
fn replay<'a>(
    base: RegistrySnapshot,
    requests: impl IntoIterator<Item = &'a MutationRequest>,
) -> RegistrySnapshot {
    let scratch = TreatedStandRegistry::new();
    scratch.restore(base);
    for request in requests {
        request.apply_to(&scratch);
    }
    scratch.snapshot()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{BackendCall, RecordingViewport, ScriptedBackend, single_area_summary};
    use canopy_core::{TreatedStand, stand_ids};

    const PLAN: TreatmentPlanId = TreatmentPlanId(7);
    const AREA: ProjectAreaId = ProjectAreaId(3);

    fn scenario_a() -> (
        TreatmentOrchestrator<ScriptedBackend>,
        Arc<ScriptedBackend>,
        StandSelectionStore,
    ) {
        let backend =
            Arc::new(ScriptedBackend::new().with_summary(single_area_summary(PLAN, AREA, "cut", &[1, 2, 3])));
        let selection = StandSelectionStore::default();
        let mut orchestrator = TreatmentOrchestrator::new(
            Arc::clone(&backend),
            TreatedStandRegistry::new(),
            selection.clone(),
        );
        orchestrator.set_treatment_plan_id(PLAN);
        orchestrator.load_summary().unwrap();
        orchestrator.set_project_area_id(Some(AREA));
        (orchestrator, backend, selection)
    }

    fn cut(ids: &[i64]) -> Vec<TreatedStand> {
        ids.iter()
            .map(|id| TreatedStand::new(StandId(*id), "cut"))
            .collect()
    }

    #[test]
    fn summary_flattens_into_registry() {
        let (orchestrator, _, _) = scenario_a();
        assert_eq!(orchestrator.registry().all(), cut(&[1, 2, 3]));
        assert_eq!(orchestrator.state(), OrchestratorState::Ready);
    }

    #[test]
    fn assign_merges_and_clears_selection() {
        let (mut orchestrator, backend, selection) = scenario_a();
        selection.toggle(StandId(4));
        selection.toggle(StandId(5));

        let ids = selection.selected_ids();
        orchestrator.assign("burn", &ids).unwrap();

        let mut expected = cut(&[1, 2, 3]);
        expected.push(TreatedStand::new(StandId(4), "burn"));
        expected.push(TreatedStand::new(StandId(5), "burn"));
        assert_eq!(orchestrator.registry().all(), expected);
        assert!(selection.is_empty());
        assert!(selection.can_undo());
        assert_eq!(
            backend.calls().last(),
            Some(&BackendCall::SetTreatments {
                plan: PLAN,
                project_area: AREA,
                action: Action::from("burn"),
                stand_ids: stand_ids(&[4, 5]),
            })
        );
    }

    #[test]
    fn failed_assign_reverts_to_summary_state() {
        let (mut orchestrator, backend, _) = scenario_a();
        backend.fail_mutations(true);

        let err = orchestrator.assign("burn", &stand_ids(&[4, 5])).unwrap_err();
        assert!(matches!(err, TreatmentError::Network(_)));
        assert_eq!(orchestrator.registry().all(), cut(&[1, 2, 3]));
        assert_eq!(orchestrator.state(), OrchestratorState::Ready);
    }

    #[test]
    fn remove_keeps_on_success_and_reverts_on_failure() {
        let (mut orchestrator, backend, _) = scenario_a();
        orchestrator.remove(&stand_ids(&[2, 3])).unwrap();
        assert_eq!(orchestrator.registry().all(), cut(&[1]));

        let (mut orchestrator, backend2, _) = scenario_a();
        backend2.fail_mutations(true);
        assert!(orchestrator.remove(&stand_ids(&[2, 3])).is_err());
        assert_eq!(orchestrator.registry().all(), cut(&[1, 2, 3]));
        assert_eq!(backend.mutation_calls(), 1);
    }

    #[test]
    fn missing_project_area_fails_before_network() {
        let (mut orchestrator, backend, selection) = scenario_a();
        orchestrator.set_project_area_id(None);
        selection.toggle(StandId(9));

        let err = orchestrator.assign("burn", &stand_ids(&[9])).unwrap_err();
        assert!(err.is_programmer_error());
        assert!(matches!(
            err,
            TreatmentError::Scope(ScopeError::MissingProjectArea { operation: "assign" })
        ));
        assert!(orchestrator.remove(&stand_ids(&[1])).is_err());
        assert_eq!(backend.mutation_calls(), 0);
        assert!(selection.is_selected(StandId(9)));
    }

    #[test]
    fn empty_stand_ids_are_rejected() {
        let (mut orchestrator, backend, _) = scenario_a();
        let err = orchestrator.remove(&[]).unwrap_err();
        assert!(matches!(err, TreatmentError::EmptyStandIds { operation: "remove" }));
        assert_eq!(backend.mutation_calls(), 0);
    }

    #[test]
    fn getters_fail_before_scope_is_set() {
        let orchestrator = TreatmentOrchestrator::new(
            Arc::new(ScriptedBackend::new()),
            TreatedStandRegistry::new(),
            StandSelectionStore::default(),
        );
        assert_eq!(
            orchestrator.treatment_plan_id(),
            Err(PreconditionError::TreatmentPlanIdUnset)
        );
        assert_eq!(
            orchestrator.scenario_id(),
            Err(PreconditionError::ScenarioIdUnset)
        );
        assert_eq!(orchestrator.state(), OrchestratorState::Unscoped);
    }

    #[test]
    fn cached_summary_is_reused_until_area_is_scoped() {
        let (mut orchestrator, backend, _) = scenario_a();
        orchestrator.set_project_area_id(None);
        orchestrator.load_summary().unwrap();
        assert_eq!(backend.summary_calls(), 1);

        orchestrator.set_project_area_id(Some(AREA));
        orchestrator.load_summary().unwrap();
        assert_eq!(backend.summary_calls(), 2);
    }

    #[test]
    fn viewport_fits_project_area_extent_when_scoped() {
        let backend =
            Arc::new(ScriptedBackend::new().with_summary(single_area_summary(PLAN, AREA, "cut", &[1])));
        let viewport = RecordingViewport::new();
        let mut orchestrator = TreatmentOrchestrator::new(
            backend,
            TreatedStandRegistry::new(),
            StandSelectionStore::default(),
        )
        .with_viewport(viewport.clone());

        orchestrator.set_treatment_plan_id(PLAN);
        orchestrator.load_summary().unwrap();
        orchestrator.set_project_area_id(Some(AREA));
        orchestrator.load_summary().unwrap();

        let fitted = viewport.fitted();
        assert_eq!(fitted.len(), 2);
        let summary = orchestrator.summary().unwrap();
        assert_eq!(Some(fitted[0]), summary.extent);
        assert_eq!(Some(fitted[1]), summary.project_area(AREA).and_then(|a| a.extent));
    }

    #[test]
    fn split_phase_applies_at_submit_and_settles_later() {
        let (mut orchestrator, _, _) = scenario_a();
        let ticket = orchestrator
            .submit(Mutation::assign("burn", stand_ids(&[4])))
            .unwrap();
        assert_eq!(orchestrator.registry().len(), 4);
        assert!(!orchestrator.is_mutating());

        let dispatch = orchestrator.next_dispatch().unwrap();
        assert_eq!(dispatch.ticket, ticket);
        assert!(orchestrator.is_mutating());
        assert_eq!(orchestrator.state(), OrchestratorState::Mutating);

        let settled = orchestrator.settle(ticket, Ok(())).unwrap();
        assert_eq!(settled, Settlement::Confirmed(ticket));
        assert!(!orchestrator.is_mutating());
    }

    #[test]
    fn queued_failure_keeps_confirmed_effects() {
        let (mut orchestrator, _, _) = scenario_a();
        let first = orchestrator
            .submit(Mutation::assign("burn", stand_ids(&[4])))
            .unwrap();
        let second = orchestrator.submit(Mutation::remove(stand_ids(&[1]))).unwrap();
        assert_eq!(orchestrator.registry().action_for(StandId(1)), None);

        let d1 = orchestrator.next_dispatch().unwrap();
        assert!(orchestrator.next_dispatch().is_none());
        orchestrator.settle(d1.ticket, Ok(())).unwrap();

        let d2 = orchestrator.next_dispatch().unwrap();
        assert_eq!((d1.ticket, d2.ticket), (first, second));
        orchestrator
            .settle(second, Err(BackendError::rejected("locked")))
            .unwrap_err();

        // The confirmed assign survives the second mutation's rollback.
        let mut expected = cut(&[1, 2, 3]);
        expected.push(TreatedStand::new(StandId(4), "burn"));
        assert_eq!(orchestrator.registry().all(), expected);
    }

    #[test]
    fn second_submit_is_visible_while_first_is_in_flight() {
        let (mut orchestrator, _, selection) = scenario_a();
        let first = orchestrator
            .submit(Mutation::assign("burn", stand_ids(&[4])))
            .unwrap();
        orchestrator.next_dispatch().unwrap();

        selection.toggle(StandId(5));
        let ids = selection.selected_ids();
        let second = orchestrator.submit(Mutation::assign("thin", ids)).unwrap();
        assert!(selection.is_empty());
        assert_eq!(
            orchestrator.registry().action_for(StandId(5)),
            Some(Action::from("thin"))
        );

        // The first failing drops only its own stand.
        orchestrator
            .settle(first, Err(BackendError::rejected("locked")))
            .unwrap_err();
        let mut expected = cut(&[1, 2, 3]);
        expected.push(TreatedStand::new(StandId(5), "thin"));
        assert_eq!(orchestrator.registry().all(), expected);

        assert_eq!(orchestrator.next_dispatch().unwrap().ticket, second);
        orchestrator.settle(second, Ok(())).unwrap();
        assert_eq!(orchestrator.registry().all(), expected);
    }

    #[test]
    fn queued_failure_replays_later_submissions_in_order() {
        let (mut orchestrator, _, _) = scenario_a();
        let first = orchestrator
            .submit(Mutation::assign("burn", stand_ids(&[1, 4])))
            .unwrap();
        orchestrator.submit(Mutation::remove(stand_ids(&[4]))).unwrap();
        orchestrator
            .submit(Mutation::assign("thin", stand_ids(&[2])))
            .unwrap();
        orchestrator.next_dispatch().unwrap();

        orchestrator
            .settle(first, Err(BackendError::rejected("locked")))
            .unwrap_err();
        assert_eq!(
            orchestrator.registry().all(),
            vec![
                TreatedStand::new(StandId(1), "cut"),
                TreatedStand::new(StandId(2), "thin"),
                TreatedStand::new(StandId(3), "cut"),
            ]
        );
        assert_eq!(orchestrator.queued_count(), 2);
    }

    #[test]
    fn blocking_call_refuses_while_queue_is_busy() {
        let (mut orchestrator, backend, _) = scenario_a();
        orchestrator.submit(Mutation::remove(stand_ids(&[1]))).unwrap();
        let err = orchestrator.assign("burn", &stand_ids(&[5])).unwrap_err();
        assert!(matches!(err, TreatmentError::MutationInFlight));
        assert_eq!(backend.mutation_calls(), 0);
    }

    #[test]
    fn concurrent_policy_lets_last_failure_win() {
        let (orchestrator, _, _) = scenario_a();
        let mut orchestrator = orchestrator.with_policy(MutationPolicy::Concurrent);
        let a = orchestrator.submit(Mutation::assign("burn", stand_ids(&[4]))).unwrap();
        let b = orchestrator.submit(Mutation::assign("thin", stand_ids(&[5]))).unwrap();
        orchestrator.next_dispatch().unwrap();
        orchestrator.next_dispatch().unwrap();
        assert_eq!(orchestrator.in_flight_count(), 2);

        orchestrator.settle(b, Ok(())).unwrap();
        orchestrator
            .settle(a, Err(BackendError::rejected("conflict")))
            .unwrap_err();

        // `a` snapshotted before `b` was applied, so its rollback drops both.
        assert_eq!(orchestrator.registry().all(), cut(&[1, 2, 3]));
    }

    #[test]
    fn reset_makes_late_responses_stale() {
        let (mut orchestrator, _, _) = scenario_a();
        let ticket = orchestrator.submit(Mutation::remove(stand_ids(&[1]))).unwrap();
        orchestrator.next_dispatch().unwrap();
        orchestrator.reset();

        assert!(orchestrator.registry().is_empty());
        assert_eq!(orchestrator.state(), OrchestratorState::Unscoped);
        assert!(orchestrator.summary().is_none());
        assert_eq!(orchestrator.project_area_id(), None);

        let settled = orchestrator
            .settle(ticket, Err(BackendError::Disconnected))
            .unwrap();
        assert_eq!(settled, Settlement::Stale(ticket));
        assert!(orchestrator.registry().is_empty());
    }

    #[test]
    fn treatment_plan_details_are_cached_and_cleared() {
        let (mut orchestrator, _, _) = scenario_a();
        let name = orchestrator.load_treatment_plan().unwrap().name.clone();
        assert_eq!(name, "Treatment plan 7");
        assert!(orchestrator.treatment_plan().is_some());
        orchestrator.reset();
        assert!(orchestrator.treatment_plan().is_none());
    }

    #[test]
    fn reset_restores_the_configured_catalog() {
        let mut summary = single_area_summary(PLAN, AREA, "thin_burn", &[8]);
        summary.project_areas[0].prescriptions[0].kind = canopy_core::PrescriptionKind::Sequence;
        let seed = PrescriptionCatalog::with_sequences(["cut_burn"]);
        let mut orchestrator = TreatmentOrchestrator::new(
            Arc::new(ScriptedBackend::new().with_summary(summary)),
            TreatedStandRegistry::new(),
            StandSelectionStore::default(),
        )
        .with_catalog(seed.clone());
        orchestrator.set_treatment_plan_id(PLAN);
        orchestrator.load_summary().unwrap();
        assert!(orchestrator.catalog().is_sequence(&Action::from("thin_burn")));

        orchestrator.reset();
        assert_eq!(orchestrator.catalog(), &seed);
        assert!(!orchestrator.catalog().is_sequence(&Action::from("thin_burn")));
    }

    #[test]
    fn policy_change_is_ignored_while_busy() {
        let (mut orchestrator, _, _) = scenario_a();
        orchestrator.submit(Mutation::remove(stand_ids(&[1]))).unwrap();
        let orchestrator = orchestrator.with_policy(MutationPolicy::Concurrent);
        assert_eq!(orchestrator.policy(), MutationPolicy::Queued);
        assert_eq!(orchestrator.queued_count(), 1);
    }

    #[test]
    fn sequence_prescriptions_feed_the_catalog() {
        let mut summary = single_area_summary(PLAN, AREA, "thin_burn", &[8, 9]);
        summary.project_areas[0].prescriptions[0].kind = canopy_core::PrescriptionKind::Sequence;
        let mut orchestrator = TreatmentOrchestrator::new(
            Arc::new(ScriptedBackend::new().with_summary(summary)),
            TreatedStandRegistry::new(),
            StandSelectionStore::default(),
        );
        orchestrator.set_treatment_plan_id(PLAN);
        orchestrator.load_summary().unwrap();
        assert_eq!(orchestrator.sequence_stand_ids(), stand_ids(&[8, 9]));
    }
}
