#![forbid(unsafe_code)]

//! Treatment-plan summary and details as returned by the backend.
//!
//! Unknown JSON fields are ignored and optional ones default, so older and
//! newer backends both deserialize.

use serde::{Deserialize, Serialize};

use crate::model::{Action, ProjectAreaId, StandId, TreatedStand, TreatmentPlanId};
use crate::prescription::{PrescriptionCatalog, PrescriptionKind};

/// Bounding box `[min_x, min_y, max_x, max_y]` in map coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Extent(pub [f64; 4]);

impl Extent {
    #[must_use]
    pub const fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self([min_x, min_y, max_x, max_y])
    }

    #[must_use]
    pub fn min_x(&self) -> f64 {
        self.0[0]
    }

    #[must_use]
    pub fn min_y(&self) -> f64 {
        self.0[1]
    }

    #[must_use]
    pub fn max_x(&self) -> f64 {
        self.0[2]
    }

    #[must_use]
    pub fn max_y(&self) -> f64 {
        self.0[3]
    }

    #[must_use]
    pub fn center(&self) -> (f64, f64) {
        (
            (self.min_x() + self.max_x()) / 2.0,
            (self.min_y() + self.max_y()) / 2.0,
        )
    }
}

/// One prescription inside a project area.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrescriptionSummary {
    pub action: Action,
    #[serde(default)]
    pub area_acres: f64,
    #[serde(default)]
    pub treated_stand_count: u64,
    #[serde(rename = "type", default)]
    pub kind: PrescriptionKind,
    #[serde(default)]
    pub stand_ids: Vec<StandId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectAreaSummary {
    pub project_area_id: ProjectAreaId,
    #[serde(default)]
    pub project_area_name: String,
    #[serde(default)]
    pub total_stand_count: u64,
    #[serde(default)]
    pub extent: Option<Extent>,
    #[serde(default)]
    pub prescriptions: Vec<PrescriptionSummary>,
}

/// Response of `GET summary(treatmentPlanId)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct PlanSummary {
    #[serde(default)]
    pub project_id: Option<i64>,
    #[serde(default)]
    pub project_name: Option<String>,
    #[serde(default)]
    pub treatment_plan_id: Option<TreatmentPlanId>,
    #[serde(default)]
    pub treatment_plan_name: Option<String>,
    #[serde(default)]
    pub extent: Option<Extent>,
    #[serde(default)]
    pub project_areas: Vec<ProjectAreaSummary>,
}

impl PlanSummary {
    /// Flatten `project_areas[].prescriptions[].stand_ids` into one
    /// assignment per stand id, in summary order.
    #[must_use]
    pub fn stand_assignments(&self) -> Vec<TreatedStand> {
        self.project_areas
            .iter()
            .flat_map(|area| area.prescriptions.iter())
            .flat_map(|rx| {
                rx.stand_ids
                    .iter()
                    .map(move |id| TreatedStand::new(*id, rx.action.clone()))
            })
            .collect()
    }

    #[must_use]
    pub fn project_area(&self, id: ProjectAreaId) -> Option<&ProjectAreaSummary> {
        self.project_areas.iter().find(|a| a.project_area_id == id)
    }

    /// Extent of the scoped project area if it has one, else the plan's.
    #[must_use]
    pub fn extent_for(&self, area: Option<ProjectAreaId>) -> Option<Extent> {
        area.and_then(|id| self.project_area(id))
            .and_then(|a| a.extent)
            .or(self.extent)
    }

    /// Sum of treated stand counts over every prescription.
    #[must_use]
    pub fn treated_stand_count(&self) -> u64 {
        self.project_areas
            .iter()
            .flat_map(|a| a.prescriptions.iter())
            .map(|rx| rx.treated_stand_count)
            .sum()
    }

    /// Actions reported as multi-step sequences.
    #[must_use]
    pub fn sequence_actions(&self) -> Vec<Action> {
        let mut catalog = PrescriptionCatalog::new();
        let mut actions = Vec::new();
        for rx in self.project_areas.iter().flat_map(|a| a.prescriptions.iter()) {
            if catalog.record(&rx.action, rx.kind) {
                actions.push(rx.action.clone());
            }
        }
        actions
    }

    /// Teach `catalog` every prescription kind this summary mentions.
    pub fn record_kinds(&self, catalog: &mut PrescriptionCatalog) {
        for rx in self.project_areas.iter().flat_map(|a| a.prescriptions.iter()) {
            catalog.record(&rx.action, rx.kind);
        }
    }
}

/// Response of `GET treatmentPlan(treatmentPlanId)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreatmentPlan {
    pub id: TreatmentPlanId,
    pub name: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub creator_name: Option<String>,
}
