//! Core traits for mirrorcp operations
//!
//! Subscribers register a [`ProgressReporter`] with the synchronizer instead of
//! listening on a global event bus. All methods have empty defaults so an
//! observer only implements what it cares about.

use crate::{Error, ProcessedInfo, RunStatistics};

/// Observer for per-item and per-run notifications
pub trait ProgressReporter: Send + Sync {
    /// An item was evaluated and handled (copied, skipped, purged or failed)
    fn report_item(&self, _info: &ProcessedInfo) {}

    /// Running percentage of the transfer currently in flight
    fn report_copy_progress(&self, _info: &ProcessedInfo, _percent: f64) {}

    /// A per-item command failed; the run continues
    fn report_error(&self, _error: &Error) {}

    /// The run finished (completely or after cancellation)
    fn report_completion(&self, _stats: &RunStatistics) {}
}

/// Reporter that ignores every notification
#[derive(Debug, Default, Clone, Copy)]
pub struct NullReporter;

impl ProgressReporter for NullReporter {}

/// Trait for operation cancellation
pub trait Cancellable {
    /// Cancel the operation
    fn cancel(&self);

    /// Check if the operation is cancelled
    fn is_cancelled(&self) -> bool;
}
