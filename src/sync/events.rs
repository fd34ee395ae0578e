//! Progress event publishing.
//!
//! The progress tracker publishes an event for every state change of a sync operation. Events
//! are delivered synchronously, in emission order, to every registered listener. A failing
//! listener is logged and skipped; it never prevents delivery to the others or affects the sync.

use super::locks::{read, write};
use super::progress_tracker::{LogLevel, SyncOperation};
use super::types::SyncError;
use std::sync::{Arc, RwLock};
use tracing::{debug, error, info, warn};

/// Events emitted by the progress tracker
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// An operation moved to InProgress
    Started(SyncOperation),
    /// An operation's current step or message changed
    ProgressUpdated(SyncOperation),
    /// An operation reached a terminal state
    Completed(SyncOperation),
    /// A log line was attached to a known operation
    LogMessage {
        operation_id: String,
        level: LogLevel,
        message: String,
    },
}

impl ProgressEvent {
    pub fn operation_id(&self) -> &str {
        match self {
            ProgressEvent::Started(op)
            | ProgressEvent::ProgressUpdated(op)
            | ProgressEvent::Completed(op) => &op.id,
            ProgressEvent::LogMessage { operation_id, .. } => operation_id,
        }
    }
}

/// Trait for observing progress events.
///
/// Implementors are called on the thread that emitted the event and should return quickly.
pub trait ProgressListener: Send + Sync {
    /// Handle a progress event.
    fn handle(&self, event: &ProgressEvent) -> Result<(), SyncError>;

    /// Get the name of this listener for logging and diagnostics.
    fn name(&self) -> &'static str;
}

/// Event dispatcher that manages multiple listeners.
#[derive(Default)]
pub struct EventDispatcher {
    listeners: RwLock<Vec<Arc<dyn ProgressListener>>>,
}

impl EventDispatcher {
    /// Create a new, empty event dispatcher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new listener.
    ///
    /// Listeners are called in the order they are registered.
    pub fn register(&self, listener: Arc<dyn ProgressListener>) {
        debug!("Registered progress listener {}", listener.name());
        write(&self.listeners).push(listener);
    }

    pub fn listener_count(&self) -> usize {
        read(&self.listeners).len()
    }

    /// Dispatch an event to all registered listeners.
    ///
    /// Errors from listeners are logged, but do not stop other listeners from running.
    pub fn dispatch(&self, event: &ProgressEvent) {
        let listeners = read(&self.listeners).clone();
        for listener in listeners {
            if let Err(e) = listener.handle(event) {
                error!("Listener {} failed to process event: {}", listener.name(), e);
            }
        }
    }
}

/// Forwards progress events to the tracing log
pub struct TracingListener;

impl ProgressListener for TracingListener {
    fn handle(&self, event: &ProgressEvent) -> Result<(), SyncError> {
        match event {
            ProgressEvent::Started(op) => {
                info!("Started {} ({} steps)", op.label, op.total_steps)
            }
            ProgressEvent::ProgressUpdated(op) => debug!(
                "{}: step {}/{} ({:.0}%)",
                op.label,
                op.current_step,
                op.total_steps,
                op.progress_percentage() * 100.0
            ),
            ProgressEvent::Completed(op) => info!(
                "{}: {} - {}",
                op.label,
                op.status_string(),
                op.result_message.as_deref().unwrap_or("")
            ),
            ProgressEvent::LogMessage {
                operation_id,
                level,
                message,
            } => match level {
                LogLevel::Info => info!("[{}] {}", operation_id, message),
                LogLevel::Warn => warn!("[{}] {}", operation_id, message),
                LogLevel::Error => error!("[{}] {}", operation_id, message),
            },
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "tracing"
    }
}
