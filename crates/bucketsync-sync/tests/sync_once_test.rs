//! Integration tests: one-shot reconciliation against an in-memory bucket
//!
//! Drives the full enumerate -> plan -> execute flow through
//! `SyncEngine::sync_once` with a real temp directory.

mod common;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bucketsync_core::domain::{
    OperationKind, PlanOptions, SyncDirection, SyncEvent, SyncResult, TaskState,
};
use bucketsync_sync::enumerator::{TreeEnumerator, DEFAULT_REMOTE_HASH_THRESHOLD};
use bucketsync_sync::filesystem::LocalFileSystemAdapter;
use bucketsync_sync::planner::plan;
use chrono::{Duration as ChronoDuration, Utc};
use common::{drain, Fixture, RecordingStore, StoreCall, BUCKET};

fn counts(uploaded: u64, downloaded: u64, deleted: u64, skipped: u64) -> SyncResult {
    SyncResult {
        uploaded,
        downloaded,
        deleted,
        skipped,
    }
}

// ============================================================================
// Basic reconciliation
// ============================================================================

#[tokio::test]
async fn test_upload_into_empty_prefix() {
    let fx = Fixture::new();
    fx.write_local("a.txt", "X");

    let report = fx
        .engine()
        .sync_once(&fx.target(), SyncDirection::LocalToRemote)
        .await
        .unwrap();

    assert_eq!(report.result, counts(1, 0, 0, 0));
    assert_eq!(fx.remote("a.txt").as_deref(), Some("X"));
}

#[tokio::test]
async fn test_identical_content_is_skipped() {
    let fx = Fixture::new();
    fx.write_local("a.txt", "X");
    fx.store.insert(BUCKET, "a.txt", "X");

    let report = fx
        .engine()
        .sync_once(&fx.target(), SyncDirection::LocalToRemote)
        .await
        .unwrap();

    assert_eq!(report.result, counts(0, 0, 0, 1));
}

#[tokio::test]
async fn test_changed_content_overwrites_remote() {
    let fx = Fixture::new();
    fx.write_local("a.txt", "X");
    fx.store.insert(BUCKET, "a.txt", "Y");

    let report = fx
        .engine()
        .sync_once(&fx.target(), SyncDirection::LocalToRemote)
        .await
        .unwrap();

    assert_eq!(report.result, counts(1, 0, 0, 0));
    assert_eq!(fx.remote("a.txt").as_deref(), Some("X"));
}

#[tokio::test]
async fn test_download_under_prefix_creates_directories() {
    let fx = Fixture::new();
    fx.store.insert(BUCKET, "photos/2024/trip/img.jpg", "JPEG");
    fx.store.insert(BUCKET, "photos/readme.md", "hi");
    fx.store.insert(BUCKET, "other/skip.txt", "no");

    let report = fx
        .engine()
        .sync_once(&common::target(fx.dir.path(), "photos"), SyncDirection::RemoteToLocal)
        .await
        .unwrap();

    assert_eq!(report.result, counts(0, 2, 0, 0));
    assert_eq!(fx.read_local("2024/trip/img.jpg").as_deref(), Some("JPEG"));
    assert_eq!(fx.read_local("readme.md").as_deref(), Some("hi"));
    assert!(fx.read_local("skip.txt").is_none());
}

#[tokio::test]
async fn test_bidirectional_newer_side_wins() {
    let fx = Fixture::new();
    fx.write_local("local_only.txt", "L");
    fx.write_local("shared.txt", "local version");
    fx.store.insert(BUCKET, "remote_only.txt", "R");
    // Remote copy is clearly newer than the file just written
    fx.store.insert_with_modified(
        BUCKET,
        "shared.txt",
        "remote version",
        Utc::now() + ChronoDuration::hours(1),
    );

    let report = fx
        .engine()
        .sync_once(&fx.target(), SyncDirection::Bidirectional)
        .await
        .unwrap();

    assert_eq!(report.result, counts(1, 2, 0, 0));
    assert_eq!(fx.remote("local_only.txt").as_deref(), Some("L"));
    assert_eq!(fx.read_local("remote_only.txt").as_deref(), Some("R"));
    assert_eq!(fx.read_local("shared.txt").as_deref(), Some("remote version"));
    assert!(report.conflicts.is_empty());
}

#[tokio::test]
async fn test_orphans_deleted_only_when_requested() {
    let fx = Fixture::new();
    fx.write_local("keep.txt", "K");
    fx.store.insert(BUCKET, "keep.txt", "K");
    fx.store.insert(BUCKET, "orphan.txt", "O");
    let engine = fx.engine();

    let report = engine
        .sync_once(&fx.target(), SyncDirection::LocalToRemote)
        .await
        .unwrap();
    assert_eq!(report.result, counts(0, 0, 0, 2));
    assert!(fx.remote("orphan.txt").is_some());

    let report = engine
        .sync_once_with(
            &fx.target(),
            PlanOptions::new(SyncDirection::LocalToRemote).with_delete_orphans(true),
        )
        .await
        .unwrap();
    assert_eq!(report.result, counts(0, 0, 1, 1));
    assert!(fx.remote("orphan.txt").is_none());
}

// ============================================================================
// Properties
// ============================================================================

#[tokio::test]
async fn test_second_run_only_skips() {
    let fx = Fixture::new();
    fx.write_local("a.txt", "A");
    fx.write_local("dir/b.txt", "B");
    fx.store.insert(BUCKET, "c.txt", "C");
    let engine = fx.engine();

    let first = engine
        .sync_once(&fx.target(), SyncDirection::Bidirectional)
        .await
        .unwrap();
    assert_eq!(first.result.changed(), 3);

    let second = engine
        .sync_once(&fx.target(), SyncDirection::Bidirectional)
        .await
        .unwrap();
    assert_eq!(second.result, counts(0, 0, 0, 3));
}

#[tokio::test]
async fn test_planning_same_snapshots_is_deterministic() {
    let fx = Fixture::new();
    for i in 0..25 {
        fx.write_local(&format!("d{}/f{i}.txt", i % 4), &format!("local {i}"));
    }
    for i in 10..40 {
        fx.store
            .insert(BUCKET, &format!("d{}/f{i}.txt", i % 4), format!("remote {i}"));
    }

    let enumerator = TreeEnumerator::new(
        Arc::new(LocalFileSystemAdapter::new()),
        DEFAULT_REMOTE_HASH_THRESHOLD,
    );
    let target = fx.target();
    let local = enumerator.enumerate_local(&target.local_root).await.unwrap();
    let remote = enumerator
        .enumerate_remote(fx.store.as_ref(), BUCKET, &target.prefix)
        .await
        .unwrap();

    for direction in [
        SyncDirection::LocalToRemote,
        SyncDirection::RemoteToLocal,
        SyncDirection::Bidirectional,
    ] {
        let options = PlanOptions::new(direction).with_delete_orphans(true);
        let first = plan(&local.mapping, &remote.mapping, options);
        let second = plan(&local.mapping, &remote.mapping, options);
        assert_eq!(first, second, "{direction} plan differs between runs");
    }
}

#[tokio::test]
async fn test_each_operation_runs_exactly_once_under_cap() {
    let store = Arc::new(RecordingStore::new(Duration::from_millis(5)));
    let fx = Fixture::new();
    for i in 0..30 {
        fx.write_local(&format!("f{i:02}.txt"), &format!("{i}"));
    }
    let engine = common::engine(store.clone(), 4);
    let mut rx = engine.subscribe();

    let report = engine
        .sync_once(&fx.target(), SyncDirection::LocalToRemote)
        .await
        .unwrap();
    assert_eq!(report.result.uploaded, 30);

    let mut running: HashMap<String, usize> = HashMap::new();
    let mut terminal: HashMap<String, usize> = HashMap::new();
    for event in drain(&mut rx) {
        if let SyncEvent::Progress(progress) = event {
            let path = progress.current_path.to_string();
            match progress.task_state {
                TaskState::Running => *running.entry(path).or_default() += 1,
                state if state.is_terminal() => *terminal.entry(path).or_default() += 1,
                _ => {}
            }
        }
    }
    assert_eq!(running.len(), 30);
    assert!(running.values().all(|&n| n == 1));
    assert_eq!(terminal.len(), 30);
    assert!(terminal.values().all(|&n| n == 1));

    // Never more than four puts in flight, each key written once
    let mut in_flight = 0usize;
    let mut peak = 0usize;
    let mut puts: HashMap<String, usize> = HashMap::new();
    for call in store.calls() {
        match call {
            StoreCall::PutStarted(key) => {
                in_flight += 1;
                peak = peak.max(in_flight);
                *puts.entry(key).or_default() += 1;
            }
            StoreCall::PutFinished(_) => in_flight -= 1,
            _ => {}
        }
    }
    assert!(peak <= 4, "peak concurrency {peak} exceeded the cap");
    assert!(puts.values().all(|&n| n == 1));
}

#[tokio::test]
async fn test_deletes_wait_for_every_transfer_even_failed_ones() {
    let store = Arc::new(RecordingStore::new(Duration::from_millis(50)));
    store.inner.insert(BUCKET, "orphan.txt", "O");
    let fx = Fixture::new();
    fx.write_local("fail.txt", "F");
    fx.write_local("ok.txt", "K");
    let engine = common::engine(store.clone(), 4);

    let report = engine
        .sync_once_with(
            &fx.target(),
            PlanOptions::new(SyncDirection::LocalToRemote).with_delete_orphans(true),
        )
        .await
        .unwrap();

    assert_eq!(report.result, counts(1, 0, 1, 0));
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].path.as_str(), "fail.txt");
    assert_eq!(report.failures[0].operation, OperationKind::Upload);
    assert!(report.failures[0].message.contains("simulated outage"));
    assert!(store.inner.get(BUCKET, "orphan.txt").is_none());

    let calls = store.calls();
    let delete_started = calls
        .iter()
        .position(|c| matches!(c, StoreCall::DeleteStarted(_)))
        .unwrap();
    let last_put_finished = calls
        .iter()
        .rposition(|c| matches!(c, StoreCall::PutFinished(_)))
        .unwrap();
    assert!(last_put_finished < delete_started);
}

#[tokio::test]
async fn test_completion_event_matches_report() {
    let fx = Fixture::new();
    fx.write_local("a.txt", "A");
    fx.write_local("b.txt", "B");
    let engine = fx.engine();
    let mut rx = engine.subscribe();

    let report = engine
        .sync_once(&fx.target(), SyncDirection::LocalToRemote)
        .await
        .unwrap();

    let events = drain(&mut rx);
    let terminal: Vec<&SyncEvent> = events.iter().filter(|e| e.is_terminal()).collect();
    assert_eq!(terminal.len(), 1);
    match terminal[0] {
        SyncEvent::Completed(completed) => {
            assert_eq!(completed.origin.batch_id, report.batch_id);
            assert_eq!(completed.result, report.result);
            assert!(completed.failures.is_empty());
        }
        other => panic!("expected Completed, got {other:?}"),
    }
    // Terminal event comes last
    assert!(events.last().is_some_and(SyncEvent::is_terminal));
}
