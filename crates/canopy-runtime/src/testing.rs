#![forbid(unsafe_code)]

//! In-memory collaborators for tests and demos.
//!
//! [`ScriptedBackend`] answers from a canned summary and records every call;
//! [`StaticFeatures`] hit-tests against fixed screen positions;
//! [`RecordingViewport`] remembers every `fit_bounds`.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::{Mutex, MutexGuard, PoisonError};

use canopy_core::{
    Action, Extent, PlanSummary, PrescriptionKind, PrescriptionSummary, ProjectAreaId,
    ProjectAreaSummary, StandId, TreatmentPlan, TreatmentPlanId,
};

use crate::backend::TreatmentBackend;
use crate::error::BackendError;
use crate::map::{FeatureQuery, MapViewport, QueryTarget, RenderedFeature, ScreenPoint};

/// One call observed by [`ScriptedBackend`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendCall {
    Summary(TreatmentPlanId),
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
    TreatmentPlan(TreatmentPlanId),
}

impl BackendCall {
    #[must_use]
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            Self::SetTreatments { .. } | Self::RemoveTreatments { .. }
        )
    }
}

#[derive(Debug, Default)]
struct Script {
    summary: PlanSummary,
    plan: Option<TreatmentPlan>,
    fail_mutations: bool,
    fail_reads: bool,
    calls: Vec<BackendCall>,
}

/// A [`TreatmentBackend`] that never touches the network.
#[derive(Debug, Default)]
pub struct ScriptedBackend {
    script: Mutex<Script>,
}

impl ScriptedBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_summary(self, summary: PlanSummary) -> Self {
        self.lock().summary = summary;
        self
    }

    #[must_use]
    pub fn with_plan(self, plan: TreatmentPlan) -> Self {
        self.lock().plan = Some(plan);
        self
    }

    /// Make every subsequent assign/remove fail.
    pub fn fail_mutations(&self, fail: bool) {
        self.lock().fail_mutations = fail;
    }

    /// Make every subsequent summary/plan read fail.
    pub fn fail_reads(&self, fail: bool) {
        self.lock().fail_reads = fail;
    }

    pub fn set_summary(&self, summary: PlanSummary) {
        self.lock().summary = summary;
    }

    #[must_use]
    pub fn calls(&self) -> Vec<BackendCall> {
        self.lock().calls.clone()
    }

    #[must_use]
    pub fn mutation_calls(&self) -> usize {
        self.lock().calls.iter().filter(|c| c.is_mutation()).count()
    }

    #[must_use]
    pub fn summary_calls(&self) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|c| matches!(c, BackendCall::Summary(_)))
            .count()
    }

    fn lock(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record_mutation(&self, call: BackendCall) -> Result<(), BackendError> {
        let mut script = self.lock();
        script.calls.push(call);
        if script.fail_mutations {
            Err(BackendError::rejected("scripted mutation failure"))
        } else {
            Ok(())
        }
    }
}

impl TreatmentBackend for ScriptedBackend {
    fn summary(&self, plan: TreatmentPlanId) -> Result<PlanSummary, BackendError> {
        let mut script = self.lock();
        script.calls.push(BackendCall::Summary(plan));
        if script.fail_reads {
            return Err(BackendError::Status {
                status: 503,
                body: "scripted summary failure".into(),
            });
        }
        Ok(script.summary.clone())
    }

    fn set_treatments(
        &self,
        plan: TreatmentPlanId,
        project_area: ProjectAreaId,
        action: &Action,
        stand_ids: &[StandId],
    ) -> Result<(), BackendError> {
        self.record_mutation(BackendCall::SetTreatments {
            plan,
            project_area,
            action: action.clone(),
            stand_ids: stand_ids.to_vec(),
        })
    }

    fn remove_treatments(
        &self,
        plan: TreatmentPlanId,
        stand_ids: &[StandId],
    ) -> Result<(), BackendError> {
        self.record_mutation(BackendCall::RemoveTreatments {
            plan,
            stand_ids: stand_ids.to_vec(),
        })
    }

    fn treatment_plan(&self, plan: TreatmentPlanId) -> Result<TreatmentPlan, BackendError> {
        let mut script = self.lock();
        script.calls.push(BackendCall::TreatmentPlan(plan));
        if script.fail_reads {
            return Err(BackendError::Status {
                status: 404,
                body: "scripted plan failure".into(),
            });
        }
        Ok(script.plan.clone().unwrap_or_else(|| TreatmentPlan {
            id: plan,
            name: format!("Treatment plan {plan}"),
            status: "DRAFT".into(),
            created_at: None,
            creator_name: None,
        }))
    }
}

/// Summary with one project area holding a single prescription.
#[must_use]
pub fn single_area_summary(
    plan: TreatmentPlanId,
    area: ProjectAreaId,
    action: &str,
    stand_ids: &[i64],
) -> PlanSummary {
    PlanSummary {
        treatment_plan_id: Some(plan),
        treatment_plan_name: Some("Sample plan".into()),
        extent: Some(Extent::new(-120.5, 38.0, -119.5, 39.0)),
        project_areas: vec![ProjectAreaSummary {
            project_area_id: area,
            project_area_name: format!("Area {area}"),
            total_stand_count: 100,
            extent: Some(Extent::new(-120.2, 38.2, -120.0, 38.4)),
            prescriptions: vec![PrescriptionSummary {
                action: Action::from(action),
                area_acres: 12.5,
                treated_stand_count: stand_ids.len() as u64,
                kind: PrescriptionKind::Single,
                stand_ids: canopy_core::stand_ids(stand_ids),
            }],
        }],
        ..PlanSummary::default()
    }
}

#[derive(Debug, Clone)]
struct PlacedFeature {
    id: Option<i64>,
    at: ScreenPoint,
}

/// Features pinned at fixed screen points on a single layer.
#[derive(Debug, Clone)]
pub struct StaticFeatures {
    layer: String,
    features: Vec<PlacedFeature>,
}

impl StaticFeatures {
    #[must_use]
    pub fn new(layer: impl Into<String>) -> Self {
        Self {
            layer: layer.into(),
            features: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_stand(mut self, id: i64, at: ScreenPoint) -> Self {
        self.features.push(PlacedFeature { id: Some(id), at });
        self
    }

    /// A feature with no numeric id, e.g. a label.
    #[must_use]
    pub fn with_unlabelled(mut self, at: ScreenPoint) -> Self {
        self.features.push(PlacedFeature { id: None, at });
        self
    }
}

const HIT_RADIUS: f64 = 0.5;

impl FeatureQuery for StaticFeatures {
    fn query_rendered_features(
        &self,
        target: QueryTarget,
        layers: &[String],
    ) -> Vec<RenderedFeature> {
        if !layers.iter().any(|l| *l == self.layer) {
            return Vec::new();
        }
        // Last placed is drawn on top.
        self.features
            .iter()
            .rev()
            .filter(|f| match target {
                QueryTarget::Point(p) => {
                    (f.at.x - p.x).abs() <= HIT_RADIUS && (f.at.y - p.y).abs() <= HIT_RADIUS
                }
                QueryTarget::Box(b) => b.contains(f.at),
            })
            .map(|f| RenderedFeature {
                id: f.id,
                layer: self.layer.clone(),
            })
            .collect()
    }
}

/// Viewport that records every extent it was asked to fit.
#[derive(Debug, Clone, Default)]
pub struct RecordingViewport {
    fitted: Rc<RefCell<Vec<Extent>>>,
}

impl RecordingViewport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn fitted(&self) -> Vec<Extent> {
        self.fitted.borrow().clone()
    }

    #[must_use]
    pub fn last(&self) -> Option<Extent> {
        self.fitted.borrow().last().copied()
    }
}

impl MapViewport for RecordingViewport {
    fn fit_bounds(&mut self, extent: Extent) {
        self.fitted.borrow_mut().push(extent);
    }
}
