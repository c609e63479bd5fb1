#![forbid(unsafe_code)]

//! One treatment-plan view, wired together.
//!
//! A [`TreatmentSession`] owns the selection store, the registry, the
//! orchestrator, the map adapter and a background dispatcher. Nothing is
//! global: open one per view and [`close`](TreatmentSession::close) it when
//! the view goes away.

use std::sync::Arc;
use std::time::Duration;

use canopy_core::{
    Action, ProjectAreaId, StandSelectionStore, TreatedStandRegistry, TreatmentPlanId,
};
use tracing::{error, info};

use crate::backend::TreatmentBackend;
use crate::config::CanopyConfig;
use crate::dispatcher::MutationDispatcher;
use crate::error::{Notice, Result};
use crate::map::{FeatureQuery, MapSelectionAdapter, MapViewport};
use crate::mutation::{Mutation, Ticket};
use crate::orchestrator::{Settlement, TreatmentOrchestrator};

pub struct TreatmentSession<B, Q> {
    selection: StandSelectionStore,
    registry: TreatedStandRegistry,
    orchestrator: TreatmentOrchestrator<B>,
    map: MapSelectionAdapter<Q>,
    dispatcher: MutationDispatcher<B>,
    notice: Option<Notice>,
}

impl<B, Q> TreatmentSession<B, Q>
where
    B: TreatmentBackend + 'static,
    Q: FeatureQuery,
{
    /// Build every store for `plan` and scope the orchestrator to it.
    pub fn open(
        plan: TreatmentPlanId,
        backend: Arc<B>,
        features: Q,
        viewport: impl MapViewport + 'static,
        config: &CanopyConfig,
    ) -> Self {
        let selection = StandSelectionStore::new(config.history_config());
        let registry = TreatedStandRegistry::new();

        let mut orchestrator =
            TreatmentOrchestrator::new(Arc::clone(&backend), registry.clone(), selection.clone())
                .with_viewport(viewport)
                .with_catalog(config.prescription_catalog())
                .with_policy(config.mutations.policy);
        orchestrator.set_treatment_plan_id(plan);

        let map = MapSelectionAdapter::new(
            features,
            config.map.stand_layer_ids.clone(),
            selection.clone(),
        );

        info!(plan = plan.get(), policy = ?config.mutations.policy, "treatment session opened");
        Self {
            selection,
            registry,
            orchestrator,
            map,
            dispatcher: MutationDispatcher::new(backend),
            notice: None,
        }
    }

    /// Load the plan summary (and details) into the registry.
    pub fn load(&mut self) -> Result<()> {
        let loaded = self
            .orchestrator
            .load_summary()
            .and_then(|()| self.orchestrator.load_treatment_plan().map(|_| ()));
        self.observe(loaded)
    }

    /// Narrow to one project area and refetch.
    pub fn focus_project_area(&mut self, area: Option<ProjectAreaId>) -> Result<()> {
        self.orchestrator.set_project_area_id(area);
        let loaded = self.orchestrator.load_summary();
        self.observe(loaded)
    }

    /// Assign `action` to the current selection and wait for the backend.
    pub fn apply(&mut self, action: impl Into<Action>) -> Result<()> {
        let ids = self.selection.selected_ids();
        let outcome = self.orchestrator.assign(action, &ids);
        self.observe(outcome)
    }

    /// Remove treatments from the current selection and wait for the backend.
    pub fn remove_selected(&mut self) -> Result<()> {
        let ids = self.selection.selected_ids();
        let outcome = self.orchestrator.remove(&ids);
        self.observe(outcome)
    }

    /// Assign to the current selection without blocking; see [`Self::poll`].
    pub fn apply_in_background(&mut self, action: impl Into<Action>) -> Result<Ticket> {
        let mutation = Mutation::assign(action, self.selection.selected_ids());
        self.submit(mutation)
    }

    pub fn remove_selected_in_background(&mut self) -> Result<Ticket> {
        let mutation = Mutation::remove(self.selection.selected_ids());
        self.submit(mutation)
    }

    fn submit(&mut self, mutation: Mutation) -> Result<Ticket> {
        let submitted = self.orchestrator.submit(mutation);
        let ticket = self.observe(submitted)?;
        self.dispatcher.dispatch_ready(&mut self.orchestrator);
        Ok(ticket)
    }

    /// Settle background completions that have arrived.
    ///
    /// Returns how many were confirmed; failures become the current notice.
    pub fn poll(&mut self) -> usize {
        let settled = self.dispatcher.settle_ready(&mut self.orchestrator);
        self.absorb(settled)
    }

    /// Block until every background mutation has settled or `timeout`
    /// passes without progress.
    pub fn wait_idle(&mut self, timeout: Duration) -> usize {
        let settled = self
            .dispatcher
            .run_until_idle(&mut self.orchestrator, timeout);
        self.absorb(settled)
    }

    fn absorb(&mut self, settled: Vec<Result<Settlement>>) -> usize {
        let mut confirmed = 0;
        for result in settled {
            match self.observe(result) {
                Ok(Settlement::Confirmed(_)) => confirmed += 1,
                Ok(Settlement::Stale(_)) | Err(_) => {}
            }
        }
        confirmed
    }

    fn observe<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(err) = &result {
            if err.is_programmer_error() {
                error!(error = %err, "treatment session used out of order");
            }
            self.notice = Some(Notice::from_error(err));
        }
        result
    }

    /// The current undismissed notice, if any.
    #[must_use]
    pub fn notice(&self) -> Option<&Notice> {
        self.notice.as_ref().filter(|n| !n.dismissed)
    }

    pub fn dismiss_notice(&mut self) {
        if let Some(notice) = self.notice.as_mut() {
            notice.dismiss();
        }
    }

    #[must_use]
    pub fn selection(&self) -> &StandSelectionStore {
        &self.selection
    }

    #[must_use]
    pub fn registry(&self) -> &TreatedStandRegistry {
        &self.registry
    }

    #[must_use]
    pub fn orchestrator(&self) -> &TreatmentOrchestrator<B> {
        &self.orchestrator
    }

    pub fn orchestrator_mut(&mut self) -> &mut TreatmentOrchestrator<B> {
        &mut self.orchestrator
    }

    #[must_use]
    pub fn map(&self) -> &MapSelectionAdapter<Q> {
        &self.map
    }

    pub fn map_mut(&mut self) -> &mut MapSelectionAdapter<Q> {
        &mut self.map
    }

    /// `true` while the apply control should stay disabled.
    #[must_use]
    pub fn is_saving(&self) -> bool {
        self.orchestrator.is_mutating() || self.orchestrator.queued_count() > 0
    }

    /// Tear down: reset the orchestrator and discard the selection.
    ///
    /// Background requests still running are not cancelled; their answers
    /// are dropped with the dispatcher.
    pub fn close(mut self) {
        self.orchestrator.reset();
        self.selection.reset();
        info!(
            outstanding = self.dispatcher.outstanding(),
            "treatment session closed"
        );
    }
}

impl<B, Q> std::fmt::Debug for TreatmentSession<B, Q> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TreatmentSession")
            .field("selected", &self.selection.len())
            .field("treated", &self.registry.len())
            .field("notice", &self.notice)
            .finish_non_exhaustive()
    }
}
