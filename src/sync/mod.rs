//! Synchronization engine.
//!
//! The pieces compose bottom-up:
//! - `retry` and `circuit_breaker` guard every call into the content source
//! - `progress_tracker` and `events` publish operation progress to listeners
//! - `health` keeps a bounded sync history and answers liveness probes
//! - `dependency` computes a safe order over the entity types
//! - `page_validation`, `batch`, `reconcile` and `worker` turn fetched pages into local records
//! - `integrity` checks the local store once a run is over
//! - `orchestrator` ties them together for a run, `scheduler` triggers runs on an interval

pub mod batch;
pub mod circuit_breaker;
pub mod dependency;
pub mod entities;
pub mod events;
pub mod health;
pub mod integrity;
pub(crate) mod locks;
pub mod orchestrator;
pub mod page_validation;
pub mod progress_tracker;
pub mod reconcile;
pub mod retry;
pub mod scheduler;
pub mod session;
pub mod types;
pub mod validation;
pub mod worker;

pub use circuit_breaker::{CircuitBreakers, CircuitStatus};
pub use dependency::{DependencyAnalyzer, entity_dependencies};
pub use health::{HealthMonitor, HealthReport, HealthStatus};
pub use integrity::{IntegrityChecker, IntegrityReport};
pub use orchestrator::{RunReport, SkippedEntity, StatusReport, SyncOrchestrator};
pub use progress_tracker::{OperationStatus, ProgressTracker, SyncOperation};
pub use scheduler::SyncScheduler;
pub use types::*;
pub use worker::EntitySyncWorker;
