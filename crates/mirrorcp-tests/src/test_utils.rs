//! Unified test utilities for mirrorcp integration tests

use filetime::FileTime;
use mirrorcp_types::{Error, ProcessedInfo, ProgressReporter, RunStatistics};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, Once};
use std::time::{Duration, SystemTime};

static TRACING: Once = Once::new();

/// Install a test-friendly tracing subscriber once per process
///
/// Honours `RUST_LOG`; output goes through the test harness writer so it only
/// shows for failing tests.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

/// Write `size` bytes of a repeating pattern to `path`, creating parents
pub fn create_test_file(path: &Path, size: usize) -> PathBuf {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("Failed to create parent directory");
    }
    let content: Vec<u8> = (0..size).map(|i| ((i * 7 + 13) % 256) as u8).collect();
    fs::write(path, content).expect("Failed to write test file");
    path.to_path_buf()
}

/// Create every `(relative path, size)` file under `root`
pub fn create_tree(root: &Path, files: &[(&str, usize)]) -> Vec<PathBuf> {
    fs::create_dir_all(root).expect("Failed to create tree root");
    files
        .iter()
        .map(|(relative, size)| create_test_file(&root.join(relative), *size))
        .collect()
}

/// Set the last-write time of `path` to `seconds` after the epoch
pub fn set_modified(path: &Path, seconds: i64) {
    filetime::set_file_mtime(path, FileTime::from_unix_time(seconds, 0))
        .expect("Failed to set modification time");
}

/// Last-write time of `path`
pub fn modified(path: &Path) -> SystemTime {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .expect("Failed to read modification time")
}

/// Whether two timestamps agree within `tolerance`
pub fn times_match(a: SystemTime, b: SystemTime, tolerance: Duration) -> bool {
    let difference = a
        .duration_since(b)
        .unwrap_or_else(|e| e.duration());
    difference <= tolerance
}

/// Reporter that records every notification
#[derive(Debug, Default)]
pub struct RecordingReporter {
    /// Items in the order they were reported
    pub items: Mutex<Vec<ProcessedInfo>>,
    /// `(display name, percent)` progress reports in the order they arrived
    pub progress: Mutex<Vec<(String, f64)>>,
    /// Error messages
    pub errors: Mutex<Vec<String>>,
    /// Statistics from the completion notification
    pub completion: Mutex<Option<RunStatistics>>,
}

impl RecordingReporter {
    /// Snapshot of the reported items
    pub fn items(&self) -> Vec<ProcessedInfo> {
        self.items.lock().expect("reporter lock poisoned").clone()
    }

    /// Snapshot of the progress reports
    pub fn progress(&self) -> Vec<(String, f64)> {
        self.progress.lock().expect("reporter lock poisoned").clone()
    }

    /// Snapshot of the reported error messages
    pub fn errors(&self) -> Vec<String> {
        self.errors.lock().expect("reporter lock poisoned").clone()
    }
}

impl ProgressReporter for RecordingReporter {
    fn report_item(&self, info: &ProcessedInfo) {
        self.items.lock().expect("reporter lock poisoned").push(info.clone());
    }

    fn report_copy_progress(&self, info: &ProcessedInfo, percent: f64) {
        self.progress
            .lock()
            .expect("reporter lock poisoned")
            .push((info.display_name.clone(), percent));
    }

    fn report_error(&self, error: &Error) {
        self.errors
            .lock()
            .expect("reporter lock poisoned")
            .push(error.to_string());
    }

    fn report_completion(&self, stats: &RunStatistics) {
        *self.completion.lock().expect("reporter lock poisoned") = Some(stats.clone());
    }
}
