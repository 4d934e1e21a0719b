//! Single-file transfer engine
//!
//! [`TransferEngine`] copies or moves one [`FilePair`] at a time with progress
//! sampling, cooperative cancellation and, under the native strategy,
//! pause/resume. Starting a second transfer while one is in flight fails with
//! `InvalidOperation`.
//!
//! Cancellation is strategy-specific:
//!
//! - **Buffered**: the partially written destination is deleted.
//! - **Native**: the partial destination is kept so a later restartable call
//!   can resume from it.
//!
//! While a native transfer is paused the destination handle is closed and the
//! file is not guarded against outside modification; the resumed call trusts
//! whatever bytes it finds.

use crate::fs::{EntryMetadata, FileSystem, LocalFileSystem};
use crate::native::{
    is_cross_device, map_io_error, map_native_code, NativeCopy, NativeCopyOptions, NativeStatus,
    ProgressAction, Side, StdNativeCopy,
};
use crate::pair::FilePair;
use crate::session::{percent, TransferSession};
use crate::stream::{stream_copy, StreamOutcome};
use mirrorcp_types::{Error, Result, TransferStrategy};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Lower bound for the progress sampling interval
pub const MIN_PROGRESS_INTERVAL: Duration = Duration::from_millis(25);

/// Transfer tuning
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferOptions {
    /// Strategy used for copies and cross-volume moves
    pub strategy: TransferStrategy,
    /// Progress sampling interval (floored at 25 ms)
    pub progress_interval: Duration,
    /// Poll interval while paused
    pub pause_poll_interval: Duration,
    /// Chunk size
    pub buffer_size: usize,
    /// Copy last-write and last-access times onto the destination
    pub preserve_timestamps: bool,
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self {
            strategy: TransferStrategy::Native,
            progress_interval: Duration::from_millis(100),
            pause_poll_interval: Duration::from_millis(100),
            buffer_size: 1024 * 1024, // 1MB
            preserve_timestamps: true,
        }
    }
}

impl TransferOptions {
    /// Options for the given strategy with default tuning
    pub fn with_strategy(strategy: TransferStrategy) -> Self {
        Self {
            strategy,
            ..Self::default()
        }
    }

    fn sampling_interval(&self) -> Duration {
        self.progress_interval.max(MIN_PROGRESS_INTERVAL)
    }
}

/// Notification published to subscribers
#[derive(Debug, Clone, PartialEq)]
pub enum TransferEvent {
    /// Preconditions passed
    Started {
        /// Transfer identifier
        id: Uuid,
        /// Source path
        source: PathBuf,
        /// Destination path
        destination: PathBuf,
        /// Bytes to transfer
        total_bytes: u64,
    },
    /// Sampled progress
    Progress {
        /// Transfer identifier
        id: Uuid,
        /// Bytes written so far
        bytes_transferred: u64,
        /// Bytes to transfer
        total_bytes: u64,
        /// Percent complete
        percent: f64,
    },
    /// Pause took effect
    Paused {
        /// Transfer identifier
        id: Uuid,
    },
    /// Transfer resumed after a pause
    Resumed {
        /// Transfer identifier
        id: Uuid,
    },
    /// Transfer finished
    Completed {
        /// Transfer identifier
        id: Uuid,
        /// Bytes transferred
        bytes: u64,
    },
    /// Transfer failed
    Failed {
        /// Transfer identifier
        id: Uuid,
        /// Error message
        error: String,
    },
    /// Transfer was cancelled
    Cancelled {
        /// Transfer identifier
        id: Uuid,
    },
}

/// How a transfer ended when it did not fail
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOutcome {
    /// Bytes were copied to the destination
    Copied {
        /// Bytes transferred
        bytes: u64,
        /// Destination metadata after the transfer
        destination: Option<EntryMetadata>,
    },
    /// The source was moved to the destination
    Moved {
        /// Bytes transferred
        bytes: u64,
        /// Whether a single rename did the work
        renamed: bool,
        /// Destination metadata after the transfer
        destination: Option<EntryMetadata>,
    },
    /// The transfer stopped on cancellation
    Cancelled,
}

impl TransferOutcome {
    /// Bytes transferred, 0 when cancelled
    pub fn bytes(&self) -> u64 {
        match self {
            Self::Copied { bytes, .. } | Self::Moved { bytes, .. } => *bytes,
            Self::Cancelled => 0,
        }
    }

    /// Whether the transfer was cancelled
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Copy,
    Move,
}

enum Transferred {
    Done { renamed: bool },
    Cancelled,
}

#[derive(Debug, Clone, Default)]
struct EventSink {
    subscribers: Arc<Mutex<Vec<UnboundedSender<TransferEvent>>>>,
}

impl EventSink {
    fn subscribe(&self) -> UnboundedReceiver<TransferEvent> {
        let (tx, rx) = unbounded_channel();
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        rx
    }

    fn publish(&self, event: TransferEvent) {
        let mut subscribers = self.subscribers.lock().unwrap_or_else(PoisonError::into_inner);
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}

struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Copies or moves one file at a time
pub struct TransferEngine {
    options: TransferOptions,
    native: Arc<dyn NativeCopy>,
    parent: CancellationToken,
    current: Mutex<CancellationToken>,
    paused: Arc<AtomicBool>,
    running: AtomicBool,
    session: Arc<Mutex<TransferSession>>,
    events: EventSink,
}

impl TransferEngine {
    /// Create an engine using the bundled native primitive
    pub fn new(options: TransferOptions) -> Self {
        let parent = CancellationToken::new();
        Self {
            options,
            native: Arc::new(StdNativeCopy::new()),
            current: Mutex::new(parent.child_token()),
            parent,
            paused: Arc::new(AtomicBool::new(false)),
            running: AtomicBool::new(false),
            session: Arc::new(Mutex::new(TransferSession::default())),
            events: EventSink::default(),
        }
    }

    /// Use a different native primitive
    pub fn with_native(mut self, native: Arc<dyn NativeCopy>) -> Self {
        self.native = native;
        self
    }

    /// Tie every transfer to an outer cancellation signal
    pub fn with_parent_token(mut self, token: CancellationToken) -> Self {
        self.current = Mutex::new(token.child_token());
        self.parent = token;
        self
    }

    /// Engine options
    pub fn options(&self) -> &TransferOptions {
        &self.options
    }

    /// Receive events for every following transfer
    pub fn subscribe(&self) -> UnboundedReceiver<TransferEvent> {
        self.events.subscribe()
    }

    /// Snapshot of the current or last session
    pub fn session(&self) -> TransferSession {
        self.session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Whether a transfer is in flight
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Whether a pause is requested
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    /// Cancel the transfer in flight
    pub fn cancel(&self) {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .cancel();
    }

    /// Hold transfers at the next progress callback. Native strategy only.
    pub fn pause(&self) -> Result<()> {
        self.require_native("pause")?;
        if !self.paused.swap(true, Ordering::AcqRel) {
            let id = self.update_session(|session| {
                session.pause();
                session.id
            });
            debug!("Transfer pause requested");
            self.events.publish(TransferEvent::Paused { id });
        }
        Ok(())
    }

    /// Let paused transfers continue. Native strategy only.
    pub fn resume(&self) -> Result<()> {
        self.require_native("resume")?;
        if self.paused.swap(false, Ordering::AcqRel) {
            let id = self.update_session(|session| {
                session.resume();
                session.id
            });
            debug!("Transfer resumed");
            self.events.publish(TransferEvent::Resumed { id });
        }
        Ok(())
    }

    /// Copy the source of `pair` onto its destination
    pub async fn copy(&self, pair: &FilePair, overwrite: bool) -> Result<TransferOutcome> {
        self.transfer(pair, overwrite, Mode::Copy).await
    }

    /// Move the source of `pair` onto its destination
    ///
    /// On the same volume this is a rename. Across volumes the data is copied
    /// and the source removed only after the copy completed.
    pub async fn move_file(&self, pair: &FilePair, overwrite: bool) -> Result<TransferOutcome> {
        self.transfer(pair, overwrite, Mode::Move).await
    }

    fn require_native(&self, operation: &str) -> Result<()> {
        if self.options.strategy == TransferStrategy::Native {
            Ok(())
        } else {
            Err(Error::invalid_operation(format!(
                "Cannot {} a {:?} transfer",
                operation, self.options.strategy
            )))
        }
    }

    fn update_session<R>(&self, f: impl FnOnce(&mut TransferSession) -> R) -> R {
        f(&mut self.session.lock().unwrap_or_else(PoisonError::into_inner))
    }

    async fn transfer(&self, pair: &FilePair, overwrite: bool, mode: Mode) -> Result<TransferOutcome> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(Error::invalid_operation(
                "A transfer is already running on this engine",
            ));
        }
        let _guard = RunningGuard(&self.running);

        let source = pair.source();
        let destination = pair.destination();

        // Preconditions are checked before anything is written
        let source_metadata = match tokio::fs::metadata(source).await {
            Ok(metadata) if metadata.is_dir() => {
                return Err(Error::invalid_argument(format!(
                    "{} is a directory",
                    source.display()
                )))
            }
            Ok(metadata) => metadata,
            Err(e) => return Err(map_io_error(&e, Side::Source, source, destination)),
        };
        if !overwrite && tokio::fs::symlink_metadata(destination).await.is_ok() {
            return Err(Error::DestinationExists {
                path: destination.to_path_buf(),
            });
        }

        let total = source_metadata.len();
        let token = self.parent.child_token();
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = token.clone();

        let session = TransferSession::begin(source.to_path_buf(), destination.to_path_buf(), total);
        let id = session.id;
        self.update_session(|current| *current = session);
        if self.is_paused() {
            self.update_session(TransferSession::pause);
        }
        self.events.publish(TransferEvent::Started {
            id,
            source: source.to_path_buf(),
            destination: destination.to_path_buf(),
            total_bytes: total,
        });
        info!(
            "Starting {:?}: {} -> {}",
            mode,
            source.display(),
            destination.display()
        );

        let counter = Arc::new(AtomicU64::new(0));
        let stop = token.child_token();
        let sampler = self.spawn_sampler(id, total, Arc::clone(&counter), stop.clone());

        let result = if token.is_cancelled() {
            Ok(Transferred::Cancelled)
        } else {
            self.run_strategy(source, destination, total, overwrite, mode, &counter, &token)
                .await
        };

        stop.cancel();
        if let Err(e) = sampler.await {
            warn!("Progress sampler ended abnormally: {}", e);
        }

        match result {
            Ok(Transferred::Done { renamed }) => {
                if self.options.preserve_timestamps && !renamed {
                    if let Err(e) = preserve_timestamps(&source_metadata, destination) {
                        return Err(self.record_failure(id, source, e));
                    }
                }
                counter.store(total, Ordering::Release);
                self.events.publish(TransferEvent::Progress {
                    id,
                    bytes_transferred: total,
                    total_bytes: total,
                    percent: 100.0,
                });

                let refreshed = LocalFileSystem::new().metadata(destination);
                self.update_session(TransferSession::complete);
                self.events.publish(TransferEvent::Completed { id, bytes: total });
                info!("Transfer completed: {} bytes", total);

                Ok(match mode {
                    Mode::Copy => TransferOutcome::Copied {
                        bytes: total,
                        destination: refreshed,
                    },
                    Mode::Move => TransferOutcome::Moved {
                        bytes: total,
                        renamed,
                        destination: refreshed,
                    },
                })
            }
            Ok(Transferred::Cancelled) => {
                self.update_session(TransferSession::cancel);
                self.events.publish(TransferEvent::Cancelled { id });
                info!("Transfer cancelled: {}", source.display());
                Ok(TransferOutcome::Cancelled)
            }
            Err(e) => Err(self.record_failure(id, source, e)),
        }
    }

    fn record_failure(&self, id: Uuid, source: &Path, error: Error) -> Error {
        self.update_session(|session| session.fail(error.to_string()));
        self.events.publish(TransferEvent::Failed {
            id,
            error: error.to_string(),
        });
        warn!("Transfer failed: {} ({})", source.display(), error);
        error
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_strategy(
        &self,
        source: &Path,
        destination: &Path,
        total: u64,
        overwrite: bool,
        mode: Mode,
        counter: &Arc<AtomicU64>,
        token: &CancellationToken,
    ) -> Result<Transferred> {
        if let Some(parent) = destination.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| map_io_error(&e, Side::Destination, source, destination))?;
            }
        }

        if mode == Mode::Move && is_same_volume(source, destination) {
            match tokio::fs::rename(source, destination).await {
                Ok(()) => {
                    counter.store(total, Ordering::Release);
                    return Ok(Transferred::Done { renamed: true });
                }
                Err(e) if is_cross_device(&e) => {
                    debug!("Rename crossed devices, falling back to copy and delete");
                }
                Err(e) => return Err(map_io_error(&e, Side::Destination, source, destination)),
            }
        }

        match self.options.strategy {
            TransferStrategy::Native => {
                self.native_transfer(source, destination, overwrite, mode, counter, token)
                    .await
            }
            TransferStrategy::Buffered => {
                let progress = Arc::clone(counter);
                let outcome = stream_copy(
                    source,
                    destination,
                    self.options.buffer_size,
                    token,
                    &mut |copied| progress.store(copied, Ordering::Release),
                )
                .await?;
                match outcome {
                    StreamOutcome::Completed(_) if mode == Mode::Move => {
                        tokio::fs::remove_file(source)
                            .await
                            .map_err(|e| map_io_error(&e, Side::Source, source, destination))?;
                        Ok(Transferred::Done { renamed: false })
                    }
                    StreamOutcome::Completed(_) => Ok(Transferred::Done { renamed: false }),
                    StreamOutcome::Cancelled => Ok(Transferred::Cancelled),
                }
            }
        }
    }

    async fn native_transfer(
        &self,
        source: &Path,
        destination: &Path,
        overwrite: bool,
        mode: Mode,
        counter: &Arc<AtomicU64>,
        token: &CancellationToken,
    ) -> Result<Transferred> {
        let mut restartable = false;
        loop {
            let options = NativeCopyOptions {
                restartable,
                fail_if_exists: !overwrite,
                chunk_size: self.options.buffer_size,
            };
            let status = self
                .call_native(source, destination, options, mode, counter, token)
                .await?;

            match status {
                NativeStatus::Completed => return Ok(Transferred::Done { renamed: false }),
                NativeStatus::Cancelled => return Ok(Transferred::Cancelled),
                NativeStatus::Failed { code, side } => {
                    return Err(map_native_code(code, side, source, destination))
                }
                NativeStatus::Stopped => {
                    debug!("Native transfer stopped for pause: {}", source.display());
                    if !self.wait_while_paused(token).await {
                        return Ok(Transferred::Cancelled);
                    }
                    // The partial destination is ours now; resume from it
                    restartable = true;
                }
            }
        }
    }

    async fn call_native(
        &self,
        source: &Path,
        destination: &Path,
        options: NativeCopyOptions,
        mode: Mode,
        counter: &Arc<AtomicU64>,
        token: &CancellationToken,
    ) -> Result<NativeStatus> {
        let native = Arc::clone(&self.native);
        let counter = Arc::clone(counter);
        let cancel = token.clone();
        let paused = Arc::clone(&self.paused);
        let source_path = source.to_path_buf();
        let destination_path = destination.to_path_buf();

        tokio::task::spawn_blocking(move || {
            let mut callback = move |_total: u64, transferred: u64| {
                counter.store(transferred, Ordering::Release);
                if cancel.is_cancelled() {
                    ProgressAction::Cancel
                } else if paused.load(Ordering::Acquire) {
                    ProgressAction::Stop
                } else {
                    ProgressAction::Continue
                }
            };
            match mode {
                Mode::Copy => native.copy_with_progress(
                    &source_path,
                    &destination_path,
                    &options,
                    Some(&mut callback),
                ),
                Mode::Move => native.move_with_progress(
                    &source_path,
                    &destination_path,
                    &options,
                    Some(&mut callback),
                ),
            }
        })
        .await
        .map_err(|e| Error::io(format!("Native transfer task failed: {}", e)))
    }

    /// Poll until resumed; false if cancelled meanwhile
    async fn wait_while_paused(&self, token: &CancellationToken) -> bool {
        let poll = self.options.pause_poll_interval.max(Duration::from_millis(1));
        while self.is_paused() {
            tokio::select! {
                () = token.cancelled() => return false,
                () = tokio::time::sleep(poll) => {}
            }
        }
        !token.is_cancelled()
    }

    fn spawn_sampler(
        &self,
        id: Uuid,
        total: u64,
        counter: Arc<AtomicU64>,
        stop: CancellationToken,
    ) -> JoinHandle<()> {
        let interval = self.options.sampling_interval();
        let session = Arc::clone(&self.session);
        let events = self.events.clone();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    () = stop.cancelled() => break,
                    _ = ticker.tick() => {
                        let bytes = counter.load(Ordering::Acquire);
                        session
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .record_progress(bytes);
                        events.publish(TransferEvent::Progress {
                            id,
                            bytes_transferred: bytes,
                            total_bytes: total,
                            percent: percent(bytes, total),
                        });
                    }
                }
            }
        })
    }
}

impl std::fmt::Debug for TransferEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransferEngine")
            .field("options", &self.options)
            .field("running", &self.is_running())
            .field("paused", &self.is_paused())
            .finish()
    }
}

fn is_same_volume(source: &Path, destination: &Path) -> bool {
    crate::pair::is_on_same_volume(source, destination)
}

fn preserve_timestamps(source: &std::fs::Metadata, destination: &Path) -> Result<()> {
    let modified = filetime::FileTime::from_last_modification_time(source);
    let accessed = filetime::FileTime::from_last_access_time(source);
    filetime::set_file_times(destination, accessed, modified)
        .map_err(|e| Error::io(format!("Failed to set file times: {}", e)))
}
