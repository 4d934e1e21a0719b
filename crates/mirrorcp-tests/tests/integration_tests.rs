//! Integration tests for mirrorcp
//!
//! These tests drive the pair model, the evaluator, the transfer engine and
//! the tree synchronizer together against real temporary directories.

use proptest::prelude::*;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::time::timeout;
use tracing::info;

use mirrorcp_config::{Config, ConfigLoader, MirrorOptions, SelectionRules};
use mirrorcp_io::{
    DirectoryPair, FilePair, FileSystem, LocalFileSystem, TransferEngine, TransferOptions,
    TransferOutcome,
};
use mirrorcp_sync::{CompiledRules, MirrorEngine, PairEvaluator};
use mirrorcp_tests::test_utils::{
    create_test_file, create_tree, init_tracing, modified, set_modified, times_match,
    RecordingReporter,
};
use mirrorcp_types::{Classification, Error, TransferStrategy};

const TIMESTAMP_TOLERANCE: Duration = Duration::from_secs(2);

fn buffered(selection: SelectionRules, mirror: MirrorOptions) -> Config {
    let mut config = Config {
        selection,
        mirror,
        ..Config::default()
    };
    config.transfer.strategy = TransferStrategy::Buffered;
    config
}

fn evaluator(selection: &SelectionRules, mirror: &MirrorOptions) -> PairEvaluator {
    PairEvaluator::new(Arc::new(
        CompiledRules::compile(selection, mirror).expect("rules compile"),
    ))
}

#[tokio::test]
async fn test_new_file_is_copied_with_timestamp() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let temp_dir = TempDir::new()?;
    let source = create_test_file(&temp_dir.path().join("src").join("A"), 100);
    let destination = temp_dir.path().join("dst").join("A");
    set_modified(&source, 1_700_000_000);

    let pair = FilePair::new(&source, &destination)?;
    let state = pair.state(&LocalFileSystem::new());
    let decision = evaluator(&SelectionRules::default(), &MirrorOptions::default())
        .evaluate_file(&pair, &state);
    assert_eq!(decision.info.classification, Classification::NewFile);
    assert!(decision.should_copy);

    for strategy in [TransferStrategy::Native, TransferStrategy::Buffered] {
        let _ = fs::remove_file(&destination);
        let engine = TransferEngine::new(TransferOptions::with_strategy(strategy));
        let outcome = engine.copy(&pair, false).await?;

        assert_eq!(outcome.bytes(), 100);
        assert_eq!(fs::metadata(&destination)?.len(), 100);
        assert!(times_match(
            modified(&source),
            modified(&destination),
            TIMESTAMP_TOLERANCE
        ));
        info!("{:?} copy preserved the timestamp", strategy);
    }

    Ok(())
}

#[tokio::test]
async fn test_existing_destination_without_overwrite_is_untouched() {
    let temp_dir = TempDir::new().unwrap();
    let source = create_test_file(&temp_dir.path().join("a.bin"), 64);
    let destination = temp_dir.path().join("b.bin");
    fs::write(&destination, b"keep").unwrap();

    let engine = TransferEngine::new(TransferOptions::default());
    let pair = FilePair::new(&source, &destination).unwrap();
    let result = engine.copy(&pair, false).await;

    assert!(matches!(result, Err(Error::DestinationExists { .. })));
    assert_eq!(fs::read(&destination).unwrap(), b"keep");
}

#[tokio::test]
async fn test_extra_file_is_purged_in_mirror_mode() {
    init_tracing();
    let temp_dir = TempDir::new().unwrap();
    let source = temp_dir.path().join("src");
    let destination = temp_dir.path().join("dst");
    create_tree(&source, &[("kept.txt", 10)]);
    create_tree(&destination, &[("B", 20)]);

    let selection = SelectionRules {
        exclude_extra: true,
        ..SelectionRules::default()
    };
    let pair = FilePair::new(source.join("B"), destination.join("B")).unwrap();
    let decision = evaluator(&selection, &MirrorOptions::mirror())
        .evaluate_file(&pair, &pair.state(&LocalFileSystem::new()));
    assert_eq!(decision.info.classification, Classification::ExtraFile);
    assert!(decision.should_purge);

    let engine = MirrorEngine::new(buffered(selection, MirrorOptions::mirror())).unwrap();
    let result = engine.run(&source, &destination).await.unwrap();

    assert!(!destination.join("B").exists());
    assert!(destination.join("kept.txt").exists());
    assert_eq!(result.statistics.files.purged, 1);
    assert_eq!(result.statistics.bytes.purged, 20);
}

#[tokio::test]
async fn test_same_file_is_skipped() {
    let temp_dir = TempDir::new().unwrap();
    let source = temp_dir.path().join("src");
    let destination = temp_dir.path().join("dst");
    let source_file = create_tree(&source, &[("C", 30)]).remove(0);
    let destination_file = create_tree(&destination, &[("C", 30)]).remove(0);
    set_modified(&source_file, 1_600_000_000);
    set_modified(&destination_file, 1_600_000_000);

    let engine =
        MirrorEngine::new(buffered(SelectionRules::default(), MirrorOptions::default())).unwrap();
    let result = engine.run(&source, &destination).await.unwrap();

    assert_eq!(result.statistics.files.skipped, 1);
    assert_eq!(result.statistics.files.copied, 0);
}

#[tokio::test]
async fn test_small_newer_file_is_excluded_by_min_size() {
    let temp_dir = TempDir::new().unwrap();
    let source = temp_dir.path().join("src");
    let destination = temp_dir.path().join("dst");
    let source_file = create_tree(&source, &[("D", 500)]).remove(0);
    let destination_file = create_tree(&destination, &[("D", 10)]).remove(0);
    set_modified(&source_file, 1_600_000_100);
    set_modified(&destination_file, 1_600_000_000);

    let selection = SelectionRules {
        min_file_size: Some(1000),
        ..SelectionRules::default()
    };
    let recorder = Arc::new(RecordingReporter::default());
    let engine = MirrorEngine::new(buffered(selection, MirrorOptions::default()))
        .unwrap()
        .with_reporter(recorder.clone());
    let result = engine.run(&source, &destination).await.unwrap();

    assert_eq!(fs::metadata(&destination_file).unwrap().len(), 10);
    assert_eq!(result.statistics.files.copied, 0);
    assert!(recorder
        .items()
        .iter()
        .any(|item| item.classification == Classification::MinSizeExclusion));
}

#[tokio::test]
async fn test_second_run_copies_nothing() {
    init_tracing();
    let temp_dir = TempDir::new().unwrap();
    let source = temp_dir.path().join("src");
    let destination = temp_dir.path().join("dst");
    let files = create_tree(
        &source,
        &[
            ("small.txt", 1024),
            ("medium.txt", 64 * 1024),
            ("subdir1/file1.txt", 2048),
            ("subdir1/nested/file3.txt", 8192),
            ("subdir2/file2.txt", 4096),
        ],
    );

    let engine = MirrorEngine::new(Config::default()).unwrap();
    let first = engine.run(&source, &destination).await.unwrap();
    assert_eq!(first.statistics.files.copied, files.len() as u64);
    assert!(first.is_success());

    let second = engine.run(&source, &destination).await.unwrap();
    assert_eq!(second.statistics.files.copied, 0);
    assert_eq!(second.statistics.files.skipped, files.len() as u64);
    assert_eq!(second.statistics.bytes.copied, 0);
}

#[tokio::test]
async fn test_buffered_cancellation_leaves_no_partial_file() {
    init_tracing();
    let temp_dir = TempDir::new().unwrap();
    let source = create_test_file(&temp_dir.path().join("big.bin"), 32 * 1024 * 1024);
    let destination = temp_dir.path().join("copy.bin");

    let engine = Arc::new(TransferEngine::new(TransferOptions {
        buffer_size: 4096,
        ..TransferOptions::with_strategy(TransferStrategy::Buffered)
    }));
    let pair = FilePair::new(&source, &destination).unwrap();

    let worker = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move { engine.copy(&pair, true).await })
    };
    timeout(Duration::from_secs(10), async {
        loop {
            let session = engine.session();
            if session.is_running() || session.state.is_terminal() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .expect("transfer never started");
    engine.cancel();

    let outcome = worker.await.unwrap().unwrap();
    match outcome {
        TransferOutcome::Cancelled => assert!(!destination.exists()),
        // Finished before the signal landed: a complete copy is a success
        other => {
            assert_eq!(other.bytes(), 32 * 1024 * 1024);
            assert_eq!(fs::metadata(&destination).unwrap().len(), 32 * 1024 * 1024);
        }
    }
}

#[tokio::test]
async fn test_move_file_removes_source() {
    let temp_dir = TempDir::new().unwrap();
    let source = create_test_file(&temp_dir.path().join("from").join("m.bin"), 2048);
    let destination = temp_dir.path().join("to").join("m.bin");

    let engine = TransferEngine::new(TransferOptions::default());
    let outcome = engine
        .move_file(&FilePair::new(&source, &destination).unwrap(), false)
        .await
        .unwrap();

    assert!(matches!(outcome, TransferOutcome::Moved { renamed: true, .. }));
    assert!(!source.exists());
    assert_eq!(fs::metadata(&destination).unwrap().len(), 2048);
}

#[tokio::test]
async fn test_move_run_empties_source_tree() {
    let temp_dir = TempDir::new().unwrap();
    let source = temp_dir.path().join("src");
    let destination = temp_dir.path().join("dst");
    create_tree(&source, &[("a", 10), ("x/b", 20), ("x/y/c", 30)]);

    let mirror = MirrorOptions {
        move_files_and_dirs: true,
        ..MirrorOptions::default()
    };
    let engine = MirrorEngine::new(buffered(SelectionRules::default(), mirror)).unwrap();
    let result = engine.run(&source, &destination).await.unwrap();

    assert_eq!(result.statistics.files.copied, 3);
    assert!(source.exists());
    assert_eq!(fs::read_dir(&source).unwrap().count(), 0);
    assert_eq!(fs::metadata(destination.join("x/y/c")).unwrap().len(), 30);
}

#[test]
fn test_cached_children_are_stable_across_iterations() {
    let temp_dir = TempDir::new().unwrap();
    let source = temp_dir.path().join("src");
    let destination = temp_dir.path().join("dst");
    create_tree(&source, &[("one", 1), ("two", 2), ("three", 3)]);
    create_tree(&destination, &[("two", 2), ("extra", 4)]);

    let fs_provider: Arc<dyn FileSystem> = Arc::new(LocalFileSystem::new());
    let pair = DirectoryPair::new(&source, &destination, fs_provider).unwrap();
    let children = pair.child_file_pairs();

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let children = Arc::clone(&children);
            std::thread::spawn(move || children.to_vec())
        })
        .collect();
    let listings: Vec<Vec<FilePair>> = readers.into_iter().map(|r| r.join().unwrap()).collect();

    let first = children.to_vec();
    assert_eq!(first.len(), 4);
    assert_eq!(first, children.to_vec());
    for listing in listings {
        assert_eq!(listing, first);
    }

    // Destination-only entries appear once, after the source-side entries
    let extras: Vec<&FilePair> = first
        .iter()
        .filter(|p| p.destination().ends_with("extra"))
        .collect();
    assert_eq!(extras.len(), 1);
    assert_eq!(first.last().map(|p| p.name()), Some("extra".to_string()));
    assert!(Arc::ptr_eq(&children, &pair.child_file_pairs()));
}

#[tokio::test]
async fn test_config_file_drives_mirror_run() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("mirrorcp.yaml");
    fs::write(
        &config_path,
        "selection:\n  exclude_extra: true\n  exclude_file_patterns: ['*.log']\nmirror:\n  mirror: true\ntransfer:\n  strategy: Buffered\n",
    )
    .unwrap();
    let config = ConfigLoader::load_from_file(&config_path).unwrap();
    assert!(config.mirror.mirror);

    let source = temp_dir.path().join("src");
    let destination = temp_dir.path().join("dst");
    create_tree(&source, &[("keep.txt", 5), ("noise.log", 5)]);
    create_tree(&destination, &[("stale.txt", 5)]);

    let engine = MirrorEngine::new(config).unwrap();
    let result = engine.run(&source, &destination).await.unwrap();

    assert!(destination.join("keep.txt").exists());
    assert!(!destination.join("noise.log").exists());
    assert!(!destination.join("stale.txt").exists());
    assert_eq!(result.statistics.files.copied, 1);
    assert_eq!(result.statistics.files.purged, 1);
}

#[tokio::test]
async fn test_reporter_sees_every_item_and_completion() {
    let temp_dir = TempDir::new().unwrap();
    let source = temp_dir.path().join("src");
    let destination = temp_dir.path().join("dst");
    create_tree(&source, &[("a", 1), ("d/b", 2)]);

    let recorder = Arc::new(RecordingReporter::default());
    let engine = MirrorEngine::new(Config::default())
        .unwrap()
        .with_reporter(recorder.clone());
    let result = engine.run(&source, &destination).await.unwrap();

    let items = recorder.items();
    assert_eq!(items.len(), 4);
    assert!(recorder.errors().is_empty());

    // Each transferred file ends with its own 100 % report
    let progress = recorder.progress();
    for name in ["a", "b"] {
        let last = progress.iter().rev().find(|(item, _)| item == name);
        assert_eq!(last.map(|(_, percent)| *percent), Some(100.0), "{:?}", progress);
    }
    let completion = recorder.completion.lock().unwrap().clone();
    assert_eq!(completion, Some(result.statistics));
}

#[tokio::test]
async fn test_unreadable_destination_parent_is_reported_not_fatal() {
    let temp_dir = TempDir::new().unwrap();
    let source = temp_dir.path().join("src");
    let destination = temp_dir.path().join("dst");
    create_tree(&source, &[("ok.txt", 3), ("blocked/inner.txt", 3)]);
    // A file where the destination directory should go
    create_tree(&destination, &[("blocked", 1)]);
    set_modified(&destination.join("blocked"), 1_000);

    let recorder = Arc::new(RecordingReporter::default());
    let engine = MirrorEngine::new(buffered(SelectionRules::default(), MirrorOptions::default()))
        .unwrap()
        .with_reporter(recorder.clone());
    let result = engine.run(&source, &destination).await.unwrap();

    assert!(destination.join("ok.txt").exists());
    assert!(result.statistics.has_failures());
    assert!(!recorder.errors().is_empty());
    assert!(!result.cancelled);
}

#[tokio::test]
async fn test_missing_source_fails_fast() {
    let temp_dir = TempDir::new().unwrap();
    let engine = MirrorEngine::new(Config::default()).unwrap();

    let result = engine
        .run(temp_dir.path().join("nope"), temp_dir.path().join("dst"))
        .await;

    assert!(matches!(result, Err(Error::SourceNotFound { .. })));
    assert!(!Path::new(&temp_dir.path().join("dst")).exists());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(8))]

    #[test]
    fn test_mirror_reproduces_any_flat_tree(
        files in prop::collection::btree_map("[a-z]{1,8}", 0usize..4096, 1..6)
    ) {
        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("src");
        let destination = temp_dir.path().join("dst");
        let entries: Vec<(&str, usize)> = files.iter().map(|(n, s)| (n.as_str(), *s)).collect();
        create_tree(&source, &entries);

        let runtime = tokio::runtime::Runtime::new().unwrap();
        let engine =
            MirrorEngine::new(buffered(SelectionRules::default(), MirrorOptions::mirror())).unwrap();
        let first = runtime.block_on(engine.run(&source, &destination)).unwrap();
        let second = runtime.block_on(engine.run(&source, &destination)).unwrap();

        let copied: BTreeMap<String, usize> = fs::read_dir(&destination)
            .unwrap()
            .map(|entry| {
                let entry = entry.unwrap();
                let len = entry.metadata().unwrap().len() as usize;
                (entry.file_name().to_string_lossy().into_owned(), len)
            })
            .collect();
        prop_assert_eq!(&copied, &files);
        prop_assert_eq!(first.statistics.files.copied, files.len() as u64);
        prop_assert_eq!(second.statistics.files.copied, 0);
    }
}
