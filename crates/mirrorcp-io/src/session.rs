//! Per-transfer session state

use std::path::PathBuf;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Lifecycle of one transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    /// No transfer has started on this engine
    Idle,
    /// Preconditions passed, no bytes moved yet
    Started,
    /// Bytes are moving
    Running,
    /// Held by a pause request
    Paused,
    /// Finished successfully
    Copied,
    /// Finished with an error
    Failed,
    /// Stopped by cancellation
    Cancelled,
}

impl TransferState {
    /// Check if the state is terminal
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Copied | Self::Failed | Self::Cancelled)
    }

    /// Check if a transfer is in flight
    pub fn is_active(self) -> bool {
        matches!(self, Self::Started | Self::Running | Self::Paused)
    }
}

/// Mutable state of the transfer an engine is running
#[derive(Debug, Clone)]
pub struct TransferSession {
    /// Unique transfer identifier
    pub id: Uuid,
    /// Source path
    pub source: PathBuf,
    /// Destination path
    pub destination: PathBuf,
    /// Current state
    pub state: TransferState,
    /// Percent complete, 0 to 100
    pub progress_percent: f64,
    /// Bytes written so far
    pub bytes_transferred: u64,
    /// Bytes to write
    pub total_bytes: u64,
    /// Start time
    pub start_time: Option<Instant>,
    /// End time
    pub end_time: Option<Instant>,
    /// Last error message
    pub last_error: Option<String>,
}

impl Default for TransferSession {
    fn default() -> Self {
        Self {
            id: Uuid::nil(),
            source: PathBuf::new(),
            destination: PathBuf::new(),
            state: TransferState::Idle,
            progress_percent: 0.0,
            bytes_transferred: 0,
            total_bytes: 0,
            start_time: None,
            end_time: None,
            last_error: None,
        }
    }
}

impl TransferSession {
    /// Start a new session, replacing whatever the previous one held
    pub fn begin(source: PathBuf, destination: PathBuf, total_bytes: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            source,
            destination,
            state: TransferState::Started,
            total_bytes,
            start_time: Some(Instant::now()),
            ..Self::default()
        }
    }

    /// Whether the session is in flight
    pub fn is_running(&self) -> bool {
        self.state.is_active()
    }

    /// Whether the session is paused
    pub fn is_paused(&self) -> bool {
        self.state == TransferState::Paused
    }

    /// Whether the session ended by cancellation
    pub fn was_cancelled(&self) -> bool {
        self.state == TransferState::Cancelled
    }

    /// Record sampled progress
    pub fn record_progress(&mut self, bytes_transferred: u64) {
        self.bytes_transferred = bytes_transferred;
        self.progress_percent = percent(bytes_transferred, self.total_bytes);
        if self.state == TransferState::Started {
            self.state = TransferState::Running;
        }
    }

    /// Mark the session paused
    pub fn pause(&mut self) {
        if matches!(self.state, TransferState::Started | TransferState::Running) {
            self.state = TransferState::Paused;
        }
    }

    /// Mark the session running again
    pub fn resume(&mut self) {
        if self.state == TransferState::Paused {
            self.state = TransferState::Running;
        }
    }

    /// Mark the session finished
    pub fn complete(&mut self) {
        self.state = TransferState::Copied;
        self.bytes_transferred = self.total_bytes;
        self.progress_percent = 100.0;
        self.end_time = Some(Instant::now());
    }

    /// Mark the session failed
    pub fn fail(&mut self, error: String) {
        self.state = TransferState::Failed;
        self.last_error = Some(error);
        self.end_time = Some(Instant::now());
    }

    /// Mark the session cancelled
    pub fn cancel(&mut self) {
        self.state = TransferState::Cancelled;
        self.end_time = Some(Instant::now());
    }

    /// Elapsed time, up to now for a live session
    pub fn duration(&self) -> Option<Duration> {
        match (self.start_time, self.end_time) {
            (Some(start), Some(end)) => Some(end.duration_since(start)),
            (Some(start), None) => Some(start.elapsed()),
            _ => None,
        }
    }
}

/// Percent of `total` covered by `transferred`, clamped to 100; 0 when total is 0
pub fn percent(transferred: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (transferred as f64 * 100.0 / total as f64).min(100.0)
}
