#![forbid(unsafe_code)]

//! Treatment backend contract.
//!
//! [`TreatmentBackend`] is the seam between the orchestrator and the
//! network. Calls block the calling thread; run them through a
//! [`MutationDispatcher`](crate::dispatcher::MutationDispatcher) to keep the
//! owning thread responsive.

use canopy_core::{
    Action, PlanSummary, ProjectAreaId, StandId, TreatedStand, TreatedStandRegistry, TreatmentPlan,
    TreatmentPlanId, assignments_for,
};

use crate::error::BackendError;

/// Summary retrieval and mutation endpoints of the treatment service.
pub trait TreatmentBackend: Send + Sync {
    /// `GET summary(treatmentPlanId)`.
    fn summary(&self, plan: TreatmentPlanId) -> Result<PlanSummary, BackendError>;

    /// `POST setTreatments(treatmentPlanId, projectAreaId, action, standIds)`.
    fn set_treatments(
        &self,
        plan: TreatmentPlanId,
        project_area: ProjectAreaId,
        action: &Action,
        stand_ids: &[StandId],
    ) -> Result<(), BackendError>;

    /// `POST removeTreatments(treatmentPlanId, standIds)`.
    fn remove_treatments(
        &self,
        plan: TreatmentPlanId,
        stand_ids: &[StandId],
    ) -> Result<(), BackendError>;

    /// `GET treatmentPlan(treatmentPlanId)`.
    fn treatment_plan(&self, plan: TreatmentPlanId) -> Result<TreatmentPlan, BackendError>;

    /// Send a prepared mutation to the matching endpoint.
    fn execute(&self, request: &MutationRequest) -> Result<(), BackendError> {
        match request {
            MutationRequest::SetTreatments {
                plan,
                project_area,
                action,
                stand_ids,
            } => self.set_treatments(*plan, *project_area, action, stand_ids),
            MutationRequest::RemoveTreatments { plan, stand_ids } => {
                self.remove_treatments(*plan, stand_ids)
            }
        }
    }
}

/// A fully scoped mutation, ready to be sent.
///
/// Scope values are captured when the mutation is submitted, so a later
/// scope change never retargets a queued request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationRequest {
    SetTreatments {
        plan: TreatmentPlanId,
        project_area: ProjectAreaId,
        action: Action,
        stand_ids: Vec<StandId>,
    },
    RemoveTreatments {
        plan: TreatmentPlanId,
        stand_ids: Vec<StandId>,
    },
}

impl MutationRequest {
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SetTreatments { .. } => "assign",
            Self::RemoveTreatments { .. } => "remove",
        }
    }

    #[must_use]
    pub fn plan(&self) -> TreatmentPlanId {
        match self {
            Self::SetTreatments { plan, .. } | Self::RemoveTreatments { plan, .. } => *plan,
        }
    }

    #[must_use]
    pub fn stand_ids(&self) -> &[StandId] {
        match self {
            Self::SetTreatments { stand_ids, .. } | Self::RemoveTreatments { stand_ids, .. } => {
                stand_ids
            }
        }
    }

    /// Assignments an assign request will produce; empty for removals.
    #[must_use]
    pub fn assignments(&self) -> Vec<TreatedStand> {
        match self {
            Self::SetTreatments {
                action, stand_ids, ..
            } => assignments_for(action, stand_ids),
            Self::RemoveTreatments { .. } => Vec::new(),
        }
    }

    /// Apply the optimistic local effect of this request.
    pub fn apply_to(&self, registry: &TreatedStandRegistry) {
        match self {
            Self::SetTreatments { .. } => registry.merge(self.assignments()),
            Self::RemoveTreatments { stand_ids, .. } => registry.remove_by_ids(stand_ids),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use canopy_core::stand_ids;

    #[test]
    fn assign_request_merges_locally() {
        let registry = TreatedStandRegistry::new();
        registry.set_all([TreatedStand::new(StandId(1), "cut")]);
        let request = MutationRequest::SetTreatments {
            plan: TreatmentPlanId(1),
            project_area: ProjectAreaId(2),
            action: Action::from("burn"),
            stand_ids: stand_ids(&[1, 4]),
        };
        request.apply_to(&registry);

        assert_eq!(
            registry.all(),
            vec![
                TreatedStand::new(StandId(1), "burn"),
                TreatedStand::new(StandId(4), "burn"),
            ]
        );
        assert_eq!(request.kind(), "assign");
    }

    #[test]
    fn remove_request_has_no_assignments() {
        let request = MutationRequest::RemoveTreatments {
            plan: TreatmentPlanId(1),
            stand_ids: stand_ids(&[3]),
        };
        assert!(request.assignments().is_empty());
        assert_eq!(request.stand_ids(), &[StandId(3)]);
        assert_eq!(request.plan(), TreatmentPlanId(1));
    }
}
