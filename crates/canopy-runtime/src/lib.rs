#![forbid(unsafe_code)]

//! Canopy Runtime
//!
//! Scope, backend access and optimistic treatment mutations on top of the
//! `canopy-core` stores.
//!
//! # Key Components
//!
//! - [`TreatmentOrchestrator`] - scope, summary loading, assign/remove with rollback
//! - [`TreatmentBackend`] - backend seam; [`HttpTreatmentBackend`] speaks JSON/HTTP
//! - [`MutationDispatcher`] - runs backend calls on worker threads
//! - [`MapSelectionAdapter`] - click and drag gestures → stand selection
//! - [`TreatmentSession`] - everything for one treatment-plan view
//! - [`CanopyConfig`] - TOML/JSON configuration
//!
//! # Role in Canopy
//! `canopy-runtime` is the orchestrator. UI events go through the map
//! adapter into the selection store; "apply" goes through the orchestrator,
//! which updates the registry optimistically and reverts it if the backend
//! refuses.
//!
//! # Threading
//! The stores are `!Send` and stay on the thread that created them. Backend
//! calls may run elsewhere: only [`Dispatch`] requests and [`Completion`]
//! results cross threads.

pub mod backend;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod http;
pub mod logging;
pub mod map;
pub mod mutation;
pub mod optimistic;
pub mod orchestrator;
pub mod session;
pub mod testing;

pub use backend::{MutationRequest, TreatmentBackend};
pub use config::{
    BackendConfig, CanopyConfig, ConfigError, LoggingConfig, MapConfig, MutationConfig,
    PrescriptionConfig, SelectionConfig,
};
pub use dispatcher::{Completion, MutationDispatcher};
pub use error::{BackendError, Notice, PreconditionError, Result, ScopeError, TreatmentError};
pub use http::HttpTreatmentBackend;
pub use map::{
    FeatureQuery, MapSelectionAdapter, MapViewport, QueryTarget, RenderedFeature, ScreenBox,
    ScreenPoint,
};
pub use mutation::{Dispatch, Mutation, MutationPolicy, MutationQueue, Ticket};
pub use optimistic::{Pending, Snapshotting, optimistic_mutate};
pub use orchestrator::{OrchestratorState, Settlement, TreatmentOrchestrator};
pub use session::TreatmentSession;
