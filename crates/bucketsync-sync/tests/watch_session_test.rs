//! Integration tests: watch sessions driven by real file-system events

mod common;

use std::time::Duration;

use bucketsync_core::domain::{CompletedEvent, SyncEvent};
use bucketsync_sync::registry::SessionRegistry;
use bucketsync_sync::session::WatchOptions;
use common::{drain, Fixture};
use tokio::sync::broadcast;

fn watch_options() -> WatchOptions {
    WatchOptions {
        initial_sync: false,
        ..WatchOptions::default()
    }
}

async fn next_completed(rx: &mut broadcast::Receiver<SyncEvent>) -> CompletedEvent {
    let wait = async {
        loop {
            match rx.recv().await {
                Ok(SyncEvent::Completed(completed)) => return completed,
                Ok(_) => continue,
                Err(e) => panic!("event stream ended: {e}"),
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(5), wait)
        .await
        .expect("no completion event within 5s")
}

#[tokio::test]
async fn test_new_file_in_watched_folder_is_uploaded_once() {
    let fx = Fixture::new();
    let registry = SessionRegistry::new(fx.engine(), watch_options());
    let mut rx = registry.engine().subscribe();

    let id = registry.start_watch(fx.target()).await.unwrap();
    fx.write_local("b.txt", "B");

    let completed = next_completed(&mut rx).await;
    assert_eq!(completed.result.uploaded, 1);
    assert_eq!(completed.origin.session_id, Some(id));
    assert_eq!(fx.remote("b.txt").as_deref(), Some("B"));

    // Nothing else happens once the change is reconciled
    tokio::time::sleep(Duration::from_millis(800)).await;
    assert!(!drain(&mut rx).iter().any(SyncEvent::is_terminal));

    registry.stop_watch(id).await.unwrap();
}

#[tokio::test]
async fn test_repeated_writes_within_window_coalesce() {
    let fx = Fixture::new();
    let registry = SessionRegistry::new(fx.engine(), watch_options());
    let mut rx = registry.engine().subscribe();

    let id = registry.start_watch(fx.target()).await.unwrap();
    for i in 0..8 {
        fx.write_local("notes.txt", &format!("draft {i}"));
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    let completed = next_completed(&mut rx).await;
    assert_eq!(completed.result.uploaded, 1);
    assert_eq!(fx.remote("notes.txt").as_deref(), Some("draft 7"));

    tokio::time::sleep(Duration::from_millis(800)).await;
    assert!(!drain(&mut rx).iter().any(SyncEvent::is_terminal));

    registry.stop_watch(id).await.unwrap();
}

#[tokio::test]
async fn test_stopped_session_ignores_later_changes() {
    let fx = Fixture::new();
    let registry = SessionRegistry::new(fx.engine(), watch_options());
    let mut rx = registry.engine().subscribe();

    let id = registry.start_watch(fx.target()).await.unwrap();
    registry.stop_watch(id).await.unwrap();
    assert!(registry.list_active_sessions().await.is_empty());

    fx.write_local("late.txt", "L");
    tokio::time::sleep(Duration::from_millis(600)).await;

    let events = drain(&mut rx);
    assert!(!events.iter().any(SyncEvent::is_terminal));
    assert!(matches!(events.last(), Some(SyncEvent::SessionStopped { session_id }) if *session_id == id));
    assert!(fx.remote("late.txt").is_none());
}

#[tokio::test]
async fn test_sessions_on_different_roots_run_independently() {
    let first = Fixture::new();
    let second = Fixture::new();
    // Both roots sync into the same bucket under different prefixes
    let engine = first.engine();
    let registry = SessionRegistry::new(engine, watch_options());
    let mut rx = registry.engine().subscribe();

    let a = registry
        .start_watch(common::target(first.dir.path(), "first"))
        .await
        .unwrap();
    let b = registry
        .start_watch(common::target(second.dir.path(), "second"))
        .await
        .unwrap();
    assert_eq!(registry.list_active_sessions().await.len(), 2);

    first.write_local("one.txt", "1");
    second.write_local("two.txt", "2");

    let mut origins = vec![
        next_completed(&mut rx).await.origin.session_id,
        next_completed(&mut rx).await.origin.session_id,
    ];
    origins.sort_by_key(|id| id.map(|id| id.to_string()));
    let mut expected = vec![Some(a), Some(b)];
    expected.sort_by_key(|id| id.map(|id| id.to_string()));
    assert_eq!(origins, expected);

    assert_eq!(first.remote("first/one.txt").as_deref(), Some("1"));
    assert_eq!(first.remote("second/two.txt").as_deref(), Some("2"));

    registry.shutdown().await;
    assert!(registry.list_active_sessions().await.is_empty());
}
