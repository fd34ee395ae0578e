//! Progress tracking for sync operations.
//!
//! This module provides the `ProgressTracker`, which records the state of every named multi-step
//! sync operation and publishes progress events to registered listeners. Operations move
//! Pending -> InProgress -> (Succeeded | Failed); terminal operations ignore further updates.
//!
//! The tracker is shared by the orchestrator, the entity workers and the batch processor. A
//! cancelled operation stays cancelled: it cannot be started again, and the batch processor checks
//! for it before starting each batch.

use super::events::{EventDispatcher, ProgressEvent, ProgressListener};
use super::locks::guard;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OperationStatus {
    Pending,
    InProgress,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    pub at: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
}

/// A named multi-step operation
#[derive(Debug, Clone, Serialize)]
pub struct SyncOperation {
    pub id: String,
    pub label: String,
    pub total_steps: u32,
    pub current_step: u32,
    pub status: OperationStatus,
    pub current_message: Option<String>,
    pub result_message: Option<String>,
    pub items_processed: usize,
    pub log: Vec<LogEntry>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Set by an operator; a cancelled operation is never restarted
    pub cancelled: bool,
    #[serde(skip)]
    sequence: u64,
}

impl SyncOperation {
    fn new(id: &str, label: &str, total_steps: u32, sequence: u64) -> Self {
        Self {
            id: id.to_string(),
            label: label.to_string(),
            total_steps,
            current_step: 0,
            status: OperationStatus::Pending,
            current_message: None,
            result_message: None,
            items_processed: 0,
            log: Vec::new(),
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            cancelled: false,
            sequence,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.status,
            OperationStatus::Succeeded | OperationStatus::Failed
        )
    }

    /// Fraction of steps done, in `0.0..=1.0`
    pub fn progress_percentage(&self) -> f64 {
        if self.total_steps == 0 {
            return if self.status == OperationStatus::Succeeded {
                1.0
            } else {
                0.0
            };
        }
        f64::from(self.current_step) / f64::from(self.total_steps)
    }

    pub fn status_string(&self) -> String {
        match self.status {
            OperationStatus::Pending => "Pending".to_string(),
            OperationStatus::InProgress => {
                format!("In Progress ({}/{})", self.current_step, self.total_steps)
            }
            OperationStatus::Succeeded => "Completed Successfully".to_string(),
            OperationStatus::Failed => "Failed".to_string(),
        }
    }

    /// Extrapolated from elapsed time and progress; `None` before any progress or once terminal.
    pub fn estimated_time_remaining(&self) -> Option<Duration> {
        if self.status != OperationStatus::InProgress {
            return None;
        }
        let progress = self.progress_percentage();
        if progress <= 0.0 || progress >= 1.0 {
            return None;
        }
        let elapsed = (Utc::now() - self.started_at?).to_std().ok()?;
        Some(elapsed.mul_f64((1.0 - progress) / progress))
    }
}

/// Tracks sync operations and publishes their progress
#[derive(Default)]
pub struct ProgressTracker {
    operations: Mutex<HashMap<String, SyncOperation>>,
    dispatcher: EventDispatcher,
    next_sequence: AtomicU64,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_sequence(&self) -> u64 {
        self.next_sequence.fetch_add(1, Ordering::Relaxed)
    }

    pub fn register_listener(&self, listener: Arc<dyn ProgressListener>) {
        self.dispatcher.register(listener);
    }

    /// Register an operation in the Pending state without starting it.
    pub fn prepare_operation(&self, id: &str, label: &str, total_steps: u32) {
        guard(&self.operations)
            .entry(id.to_string())
            .or_insert_with(|| SyncOperation::new(id, label, total_steps, self.next_sequence()));
    }

    /// Move an operation to InProgress, creating it if needed. Restarting a terminal operation
    /// resets it, which is what a retried worker does.
    ///
    /// Returns `false` and leaves the operation untouched when it has been cancelled.
    pub fn start_operation(&self, id: &str, label: &str, total_steps: u32) -> bool {
        let snapshot = {
            let mut operations = guard(&self.operations);
            let op = operations
                .entry(id.to_string())
                .or_insert_with(|| SyncOperation::new(id, label, total_steps, self.next_sequence()));
            if op.cancelled {
                debug!("Refusing to start cancelled operation {}", id);
                return false;
            }
            op.label = label.to_string();
            op.total_steps = total_steps;
            op.current_step = 0;
            op.status = OperationStatus::InProgress;
            op.result_message = None;
            op.current_message = None;
            op.items_processed = 0;
            op.started_at = Some(Utc::now());
            op.completed_at = None;
            op.clone()
        };
        self.dispatcher.dispatch(&ProgressEvent::Started(snapshot));
        true
    }

    /// Set the current step, clamped to the total, and publish an update.
    pub fn update_progress(&self, id: &str, step: u32, message: &str) {
        let snapshot = {
            let mut operations = guard(&self.operations);
            let Some(op) = operations.get_mut(id) else {
                debug!("Ignoring progress for unknown operation {}", id);
                return;
            };
            if op.is_terminal() {
                return;
            }
            op.current_step = step.min(op.total_steps);
            op.current_message = Some(message.to_string());
            op.clone()
        };
        self.dispatcher
            .dispatch(&ProgressEvent::ProgressUpdated(snapshot));
    }

    /// Attach a log line to an operation. Lines for unknown operations are dropped.
    pub fn log_message(&self, id: &str, level: LogLevel, message: &str) {
        {
            let mut operations = guard(&self.operations);
            let Some(op) = operations.get_mut(id) else {
                debug!("Dropping log line for unknown operation {}", id);
                return;
            };
            op.log.push(LogEntry {
                at: Utc::now(),
                level,
                message: message.to_string(),
            });
        }
        self.dispatcher.dispatch(&ProgressEvent::LogMessage {
            operation_id: id.to_string(),
            level,
            message: message.to_string(),
        });
    }

    /// Finish an operation. Success forces the current step to the total.
    pub fn complete_operation(&self, id: &str, success: bool, message: &str, items_processed: usize) {
        let snapshot = {
            let mut operations = guard(&self.operations);
            let Some(op) = operations.get_mut(id) else {
                debug!("Ignoring completion of unknown operation {}", id);
                return;
            };
            if op.is_terminal() {
                return;
            }
            op.status = if success {
                op.current_step = op.total_steps;
                OperationStatus::Succeeded
            } else {
                OperationStatus::Failed
            };
            op.result_message = Some(message.to_string());
            op.items_processed = items_processed;
            op.completed_at = Some(Utc::now());
            op.clone()
        };
        self.dispatcher.dispatch(&ProgressEvent::Completed(snapshot));
    }

    pub fn fail_operation(&self, id: &str, message: &str) {
        self.complete_operation(id, false, message, 0);
    }

    pub fn operation(&self, id: &str) -> Option<SyncOperation> {
        guard(&self.operations).get(id).cloned()
    }

    /// Mark an operation cancelled, failing it when it is still running.
    ///
    /// Returns `false` for unknown operations and for operations already cancelled.
    pub fn cancel_operation(&self, id: &str, message: &str) -> bool {
        let running = {
            let mut operations = guard(&self.operations);
            let Some(op) = operations.get_mut(id) else {
                return false;
            };
            if op.cancelled {
                return false;
            }
            op.cancelled = true;
            !op.is_terminal()
        };
        if running {
            self.fail_operation(id, message);
        }
        true
    }

    pub fn is_cancelled(&self, id: &str) -> bool {
        guard(&self.operations)
            .get(id)
            .is_some_and(|op| op.cancelled)
    }

    /// Pending and in-progress operations, oldest first
    pub fn active_operations(&self) -> Vec<SyncOperation> {
        let mut active: Vec<_> = guard(&self.operations)
            .values()
            .filter(|op| !op.is_terminal())
            .cloned()
            .collect();
        active.sort_by_key(|op| op.sequence);
        active
    }

    pub fn has_active_operations(&self) -> bool {
        guard(&self.operations).values().any(|op| !op.is_terminal())
    }

    /// Drop an operation that never started
    pub fn discard_operation(&self, id: &str) {
        let mut operations = guard(&self.operations);
        if operations
            .get(id)
            .is_some_and(|op| op.status == OperationStatus::Pending)
        {
            operations.remove(id);
        }
    }

    /// Forget terminal operations that completed more than `max_age` ago
    pub fn prune_completed(&self, max_age: Duration) -> usize {
        let Ok(max_age) = chrono::Duration::from_std(max_age) else {
            return 0;
        };
        let cutoff = Utc::now() - max_age;
        let mut operations = guard(&self.operations);
        let before = operations.len();
        operations.retain(|_, op| op.completed_at.is_none_or(|at| at > cutoff));
        before - operations.len()
    }
}
