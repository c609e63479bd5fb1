#![forbid(unsafe_code)]

//! Canopy Core
//!
//! Synchronous, single-threaded state for assigning forest-treatment
//! prescriptions to map stands.
//!
//! # Key Components
//!
//! - [`StandSelectionStore`] - selected stand ids with undo and backup/restore
//! - [`TreatedStandRegistry`] - stand → action cache with upsert merge
//! - [`Observable`] - push-based change notification shared by both stores
//! - [`PlanSummary`] - backend plan summary and its flattening into assignments
//! - [`PrescriptionCatalog`] - single-step vs multi-step prescriptions
//!
//! # Role in Canopy
//! `canopy-core` holds the data; `canopy-runtime` owns scope, talks to the
//! backend and applies optimistic mutations against these stores.

pub mod history;
pub mod model;
pub mod plan;
pub mod prescription;
pub mod reactive;
pub mod registry;
pub mod selection;

pub use history::{History, HistoryConfig};
pub use model::{
    Action, ProjectAreaId, ScenarioId, StandId, TreatedStand, TreatmentPlanId, assignments_for,
    stand_ids,
};
pub use plan::{Extent, PlanSummary, PrescriptionSummary, ProjectAreaSummary, TreatmentPlan};
pub use prescription::{PrescriptionCatalog, PrescriptionKind};
pub use reactive::{Observable, Subscription};
pub use registry::{RegistrySnapshot, TreatedStandRegistry};
pub use selection::{Selection, StandSelectionStore};
