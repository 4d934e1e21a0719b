//! Tree synchronizer
//!
//! [`MirrorEngine`] walks a [`DirectoryPair`] depth first, files before
//! subdirectories, and for every pair asks the [`PairEvaluator`] whether to
//! copy, skip or purge. Transfers go through one shared [`TransferEngine`], so
//! at most one file is in flight at any time and statistics follow traversal
//! order.

use crate::selection::{CompiledRules, PairEvaluator};
use futures::future::{BoxFuture, FutureExt};
use mirrorcp_config::{Config, ConfigBuilder};
use mirrorcp_io::{
    map_io_error, DirectoryPair, FilePair, FileSystem, LocalFileSystem, NativeCopy, Side,
    TransferEngine, TransferEvent, TransferOptions,
};
use mirrorcp_types::{
    Cancellable, Classification, Error, NullReporter, ProcessedInfo, ProgressReporter, Result,
    RunStatistics,
};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Directories skipped when the source is the root of a volume
const RESERVED_ROOT_DIRECTORIES: &[&str] =
    &["System Volume Information", "$RECYCLE.BIN", "RECYCLER"];

/// Outcome of one synchronization run
#[derive(Debug, Clone)]
pub struct SyncResult {
    /// Run identifier
    pub run_id: uuid::Uuid,
    /// Statistics gathered up to the end of the run
    pub statistics: RunStatistics,
    /// Whether the run stopped on cancellation
    pub cancelled: bool,
    /// Wall-clock duration
    pub duration: Duration,
}

impl SyncResult {
    /// Whether every item was handled without error and the run was not cancelled
    pub fn is_success(&self) -> bool {
        !self.cancelled && !self.statistics.has_failures()
    }
}

/// State owned by one run
struct RunState {
    evaluator: PairEvaluator,
    statistics: RunStatistics,
    events: UnboundedReceiver<TransferEvent>,
}

/// Files, bytes and directories found under a tree
#[derive(Debug, Default, Clone, Copy)]
struct TreeCount {
    files: u64,
    bytes: u64,
    directories: u64,
}

impl TreeCount {
    fn walk(root: &Path) -> Self {
        let mut count = Self::default();
        for entry in WalkDir::new(root).into_iter().filter_map(|e| e.ok()) {
            if entry.file_type().is_dir() {
                count.directories += 1;
            } else {
                count.files += 1;
                count.bytes += entry.metadata().map_or(0, |m| m.len());
            }
        }
        count
    }
}

/// Mirrors a source directory tree onto a destination
pub struct MirrorEngine {
    config: Config,
    fs: Arc<dyn FileSystem>,
    reporter: Arc<dyn ProgressReporter>,
    token: CancellationToken,
    transfer: Arc<TransferEngine>,
}

impl MirrorEngine {
    /// Create an engine from a configuration snapshot
    ///
    /// The configuration is validated and the selection rules compiled once
    /// so that invalid patterns fail here rather than mid-run.
    pub fn new(config: Config) -> Result<Self> {
        ConfigBuilder::validate(&config)?;
        CompiledRules::compile(&config.selection, &config.mirror)?;

        let token = CancellationToken::new();
        let transfer = Arc::new(
            TransferEngine::new(transfer_options(&config)).with_parent_token(token.clone()),
        );

        Ok(Self {
            config,
            fs: Arc::new(LocalFileSystem::new()),
            reporter: Arc::new(NullReporter),
            token,
            transfer,
        })
    }

    /// Read metadata through a different provider
    pub fn with_file_system(mut self, fs: Arc<dyn FileSystem>) -> Self {
        self.fs = fs;
        self
    }

    /// Deliver per-item and per-run notifications to `reporter`
    pub fn with_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Transfer files through a different native primitive
    pub fn with_native(mut self, native: Arc<dyn NativeCopy>) -> Self {
        self.transfer = Arc::new(
            TransferEngine::new(transfer_options(&self.config))
                .with_parent_token(self.token.clone())
                .with_native(native),
        );
        self
    }

    /// Configuration the engine runs with
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Token cancelling the engine; a cancelled engine stays cancelled
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Stop the run at the next file or directory boundary and cancel the
    /// transfer in flight
    pub fn cancel(&self) {
        info!("Mirror run cancellation requested");
        self.token.cancel();
    }

    /// Whether cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Pause the transfer in flight. Native strategy only.
    pub fn pause(&self) -> Result<()> {
        self.transfer.pause()
    }

    /// Resume a paused transfer. Native strategy only.
    pub fn resume(&self) -> Result<()> {
        self.transfer.resume()
    }

    /// Mirror `source` onto `destination`
    pub async fn run<P: AsRef<Path>, Q: AsRef<Path>>(
        &self,
        source: P,
        destination: Q,
    ) -> Result<SyncResult> {
        let start_time = Instant::now();
        let run_id = uuid::Uuid::new_v4();
        let source = source.as_ref();
        let destination = destination.as_ref();
        let mirror = &self.config.mirror;

        let root = DirectoryPair::new(source, destination, Arc::clone(&self.fs))?;
        let root_state = root.state();
        match &root_state.source {
            None => {
                return Err(Error::SourceNotFound {
                    path: source.to_path_buf(),
                })
            }
            Some(metadata) if !metadata.is_dir() => {
                return Err(Error::invalid_argument(format!(
                    "Source is not a directory: {}",
                    source.display()
                )))
            }
            Some(_) => {}
        }

        // Age cutoffs are taken relative to the start of this run
        let rules = CompiledRules::compile(&self.config.selection, mirror)?;

        info!(
            "Starting mirror run {}: {} -> {}",
            run_id,
            source.display(),
            destination.display()
        );

        let mut run = RunState {
            evaluator: PairEvaluator::new(Arc::new(rules)),
            statistics: RunStatistics::new(),
            events: self.transfer.subscribe(),
        };

        let root_info = if root_state.destination_exists() {
            run.statistics.directories.skipped += 1;
            ProcessedInfo::directory(Classification::ExistingDir, source.to_string_lossy())
        } else {
            if !mirror.list_only {
                tokio::fs::create_dir_all(destination)
                    .await
                    .map_err(|e| map_io_error(&e, Side::Destination, source, destination))?;
            }
            run.statistics.directories.copied += 1;
            ProcessedInfo::directory(Classification::NewDir, source.to_string_lossy())
        };
        run.statistics.directories.total += 1;
        self.reporter.report_item(&root_info);

        self.process_directory(&mut run, &root, 1, true).await;

        let cancelled = self.is_cancelled();
        let duration = start_time.elapsed();
        run.statistics.duration = duration;
        self.reporter.report_completion(&run.statistics);

        if cancelled {
            info!("Mirror run {} cancelled after {:?}", run_id, duration);
        } else {
            info!(
                "Mirror run {} completed: {} files copied, {} bytes in {:?}",
                run_id, run.statistics.files.copied, run.statistics.bytes.copied, duration
            );
        }

        Ok(SyncResult {
            run_id,
            statistics: run.statistics,
            cancelled,
            duration,
        })
    }

    /// Drive `transfer` while relaying its sampled progress to the reporter,
    /// tagged with `info`
    ///
    /// Events still queued when the transfer returns, the final 100 % report
    /// among them, are drained before the next item starts.
    async fn relay_progress<T>(
        &self,
        events: &mut UnboundedReceiver<TransferEvent>,
        info: &ProcessedInfo,
        transfer: impl Future<Output = T>,
    ) -> T {
        tokio::pin!(transfer);
        let result = loop {
            tokio::select! {
                result = &mut transfer => break result,
                Some(event) = events.recv() => self.forward_event(info, &event),
            }
        };
        while let Ok(event) = events.try_recv() {
            self.forward_event(info, &event);
        }
        result
    }

    fn forward_event(&self, info: &ProcessedInfo, event: &TransferEvent) {
        if let TransferEvent::Progress { percent, .. } = event {
            self.reporter.report_copy_progress(info, *percent);
        }
    }

    fn process_directory<'a>(
        &'a self,
        run: &'a mut RunState,
        pair: &'a DirectoryPair,
        depth: u32,
        is_root: bool,
    ) -> BoxFuture<'a, ()> {
        async move {
            let files = pair.child_file_pairs();
            for file in files.iter() {
                if self.is_cancelled() {
                    return;
                }
                if !run.evaluator.passes_name_filter(&file.name()) {
                    continue;
                }
                self.process_file(run, file).await;
            }

            if run.evaluator.rules().descends_below(depth) {
                let skip_reserved = is_root && pair.source().parent().is_none();
                let children = pair.child_directory_pairs();
                for child in children.iter() {
                    if self.is_cancelled() {
                        return;
                    }
                    if skip_reserved && is_reserved(&child.name()) {
                        debug!("Skipping reserved directory {}", child.source().display());
                        continue;
                    }
                    if self.process_child_directory(run, child).await {
                        self.process_directory(run, child, depth + 1, false).await;
                    }
                }
            }

            let mirror = &self.config.mirror;
            if !is_root && mirror.move_files_and_dirs && !mirror.list_only && !self.is_cancelled()
            {
                remove_if_empty(pair.source()).await;
            }
        }
        .boxed()
    }

    async fn process_file(&self, run: &mut RunState, pair: &FilePair) {
        let state = pair.state(self.fs.as_ref());
        let decision = run.evaluator.evaluate_file(pair, &state);
        let size = decision.info.size_in_bytes;
        let mirror = &self.config.mirror;

        if !state.source_exists() {
            run.statistics.files.extras += 1;
            run.statistics.bytes.extras += size;
            if decision.should_purge {
                self.purge_file(run, pair.destination(), size).await;
            }
            self.reporter.report_item(&decision.info);
            return;
        }

        if decision.should_copy && !mirror.create_tree_only {
            if !mirror.list_only {
                let transfer = async {
                    if mirror.moves_files() {
                        self.transfer.move_file(pair, true).await
                    } else {
                        self.transfer.copy(pair, true).await
                    }
                };
                let result = self
                    .relay_progress(&mut run.events, &decision.info, transfer)
                    .await;

                match result {
                    Ok(outcome) if outcome.is_cancelled() => {
                        debug!("Transfer of {} cancelled", pair);
                        return;
                    }
                    Ok(_) => {}
                    Err(e) if e.is_cancellation() => return,
                    Err(e) => {
                        warn!("Failed to transfer {}: {}", pair, e);
                        run.statistics.files.total += 1;
                        run.statistics.files.failed += 1;
                        run.statistics.bytes.total += size;
                        run.statistics.bytes.failed += size;
                        self.reporter.report_error(&e);
                        self.reporter.report_item(&decision.info);
                        return;
                    }
                }
            }
            debug!("{} {}", decision.info.classification, pair);
            run.statistics.files.copied += 1;
            run.statistics.bytes.copied += size;
        } else {
            run.statistics.files.skipped += 1;
            run.statistics.bytes.skipped += size;
        }

        run.statistics.files.total += 1;
        run.statistics.bytes.total += size;
        self.reporter.report_item(&decision.info);
    }

    /// Handle a child directory; returns whether to descend into it
    async fn process_child_directory(&self, run: &mut RunState, pair: &DirectoryPair) -> bool {
        let state = pair.state();
        let decision = run.evaluator.evaluate_directory(pair, &state);
        let mirror = &self.config.mirror;

        if state.is_extra() {
            run.statistics.directories.extras += 1;
            if decision.should_purge {
                self.purge_directory(run, pair.destination()).await;
            }
            self.reporter.report_item(&decision.info);
            return false;
        }

        let recurse = match decision.info.classification {
            Classification::NewDir => {
                if self.can_quick_move(run, pair) && self.quick_move(run, pair).await {
                    self.reporter.report_item(&decision.info);
                    return false;
                }
                if !mirror.list_only {
                    if let Err(e) = tokio::fs::create_dir_all(pair.destination()).await {
                        let error =
                            map_io_error(&e, Side::Destination, pair.source(), pair.destination());
                        warn!("Failed to create {}: {}", pair.destination().display(), error);
                        run.statistics.directories.total += 1;
                        run.statistics.directories.failed += 1;
                        self.reporter.report_error(&error);
                        self.reporter.report_item(&decision.info);
                        return false;
                    }
                }
                run.statistics.directories.copied += 1;
                decision.should_recurse
            }
            _ => {
                run.statistics.directories.skipped += 1;
                decision.should_recurse
            }
        };

        run.statistics.directories.total += 1;
        self.reporter.report_item(&decision.info);
        recurse
    }

    fn can_quick_move(&self, run: &RunState, pair: &DirectoryPair) -> bool {
        let mirror = &self.config.mirror;
        mirror.move_files_and_dirs
            && mirror.quick_move
            && !mirror.list_only
            && !mirror.create_tree_only
            && pair.is_on_same_volume()
            && run.evaluator.rules().selects_everything()
    }

    /// Rename a whole new subtree in one step; returns false when the rename
    /// failed and the subtree has to be processed item by item
    async fn quick_move(&self, run: &mut RunState, pair: &DirectoryPair) -> bool {
        if let Err(e) = tokio::fs::rename(pair.source(), pair.destination()).await {
            debug!(
                "Quick move of {} failed, moving item by item: {}",
                pair.source().display(),
                e
            );
            return false;
        }

        let moved = TreeCount::walk(pair.destination());
        debug!(
            "Quick moved {} ({} files, {} bytes)",
            pair.source().display(),
            moved.files,
            moved.bytes
        );
        let stats = &mut run.statistics;
        stats.directories.total += moved.directories;
        stats.directories.copied += moved.directories;
        stats.files.total += moved.files;
        stats.files.copied += moved.files;
        stats.bytes.total += moved.bytes;
        stats.bytes.copied += moved.bytes;
        true
    }

    async fn purge_file(&self, run: &mut RunState, path: &Path, size: u64) {
        if !self.config.mirror.list_only {
            if let Err(e) = tokio::fs::remove_file(path).await {
                let error = map_io_error(&e, Side::Destination, path, path);
                warn!("Failed to purge {}: {}", path.display(), error);
                run.statistics.files.failed += 1;
                self.reporter.report_error(&error);
                return;
            }
        }
        debug!("Purged {}", path.display());
        run.statistics.files.purged += 1;
        run.statistics.bytes.purged += size;
    }

    /// Delete an extra destination subtree, one file at a time unless quick
    /// purge is enabled
    async fn purge_directory(&self, run: &mut RunState, destination: &Path) {
        let mirror = &self.config.mirror;

        if mirror.list_only || mirror.quick_purge {
            let count = TreeCount::walk(destination);
            if !mirror.list_only {
                if let Err(e) = tokio::fs::remove_dir_all(destination).await {
                    let error = map_io_error(&e, Side::Destination, destination, destination);
                    warn!("Failed to purge {}: {}", destination.display(), error);
                    run.statistics.directories.failed += 1;
                    self.reporter.report_error(&error);
                    return;
                }
            }
            let stats = &mut run.statistics;
            stats.directories.purged += count.directories;
            stats.files.purged += count.files;
            stats.bytes.purged += count.bytes;
            return;
        }

        let entries: Vec<(PathBuf, bool, u64)> = WalkDir::new(destination)
            .contents_first(true)
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(entry) => {
                    let len = entry.metadata().map_or(0, |m| m.len());
                    Some((entry.path().to_path_buf(), entry.file_type().is_dir(), len))
                }
                Err(e) => {
                    warn!("Failed to list {} for purge: {}", destination.display(), e);
                    None
                }
            })
            .collect();

        for (path, is_dir, len) in entries {
            if is_dir {
                match tokio::fs::remove_dir(&path).await {
                    Ok(()) => run.statistics.directories.purged += 1,
                    Err(e) => {
                        let error = map_io_error(&e, Side::Destination, &path, &path);
                        warn!("Failed to purge {}: {}", path.display(), error);
                        run.statistics.directories.failed += 1;
                        self.reporter.report_error(&error);
                    }
                }
            } else {
                self.purge_file(run, &path, len).await;
                if self.is_cancelled() {
                    return;
                }
            }
        }
    }
}

impl Cancellable for MirrorEngine {
    fn cancel(&self) {
        MirrorEngine::cancel(self);
    }

    fn is_cancelled(&self) -> bool {
        MirrorEngine::is_cancelled(self)
    }
}

impl std::fmt::Debug for MirrorEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MirrorEngine")
            .field("config", &self.config)
            .field("cancelled", &self.is_cancelled())
            .field("transfer", &self.transfer)
            .finish_non_exhaustive()
    }
}

fn transfer_options(config: &Config) -> TransferOptions {
    let transfer = &config.transfer;
    TransferOptions {
        strategy: transfer.strategy,
        progress_interval: transfer.progress_interval(),
        pause_poll_interval: transfer.pause_poll_interval(),
        buffer_size: transfer.buffer_size,
        preserve_timestamps: transfer.preserve_timestamps,
    }
}

fn is_reserved(name: &str) -> bool {
    RESERVED_ROOT_DIRECTORIES
        .iter()
        .any(|reserved| reserved.eq_ignore_ascii_case(name))
}

async fn remove_if_empty(directory: &Path) {
    let is_empty = match tokio::fs::read_dir(directory).await {
        Ok(mut entries) => matches!(entries.next_entry().await, Ok(None)),
        Err(_) => false,
    };
    if !is_empty {
        return;
    }
    match tokio::fs::remove_dir(directory).await {
        Ok(()) => debug!("Removed emptied source directory {}", directory.display()),
        Err(e) => warn!(
            "Failed to remove emptied source directory {}: {}",
            directory.display(),
            e
        ),
    }
}
