//! Content synchronization engine for a wrestling-promotion record keeper.
//!
//! The engine pulls entity pages from an external, rate-limited content workspace and reconciles
//! them into local records across a dozen interdependent entity types. The crate is split into:
//!
//! - `source`: the raw page adapter, the content-source client trait and its HTTP implementation.
//! - `store`: local entity records and the repository traits the engine persists through.
//! - `sync`: retry, circuit breaking, progress, health, ordering, batching, reconciliation and
//!   the orchestrator that ties them together.
//! - `config`: configuration loaded once at startup.

/// Configuration loading and validation
pub mod config;
/// Content-source client and raw page adapter
pub mod source;
/// Local records and repositories
pub mod store;
/// The synchronization engine
pub mod sync;

pub use config::SyncConfig;
pub use sync::{RunReport, SyncError, SyncOrchestrator, SyncResult};
