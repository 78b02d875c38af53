//! Replay loader integration tests: load paths and deletion detection

mod helpers;

use std::sync::Arc;
use std::time::Duration;

use sqlx::SqlitePool;
use uuid::Uuid;

use wshd_common::db::sessions;
use wshd_engine::replay::{ReplayErrorKind, ReplayService, ReplayState};
use wshd_engine::sync::RemoteClient;

use helpers::{seed_completed_session, test_pool, MockRemote};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

async fn service_with_mock(pool: &SqlitePool) -> (MockRemote, ReplayService) {
    let (mock, base_url) = MockRemote::spawn().await;
    let remote = Arc::new(RemoteClient::new(base_url, 2_000).unwrap());
    let service = ReplayService::new(pool.clone(), remote, POLL_INTERVAL);
    (mock, service)
}

/// Mark a local session synced against a given remote id and seed the mock
/// so existence checks go to the remote store.
async fn sync_session(pool: &SqlitePool, mock: &MockRemote, id: i64) -> Uuid {
    let remote_id = Uuid::new_v4();
    sessions::mark_synced(pool, id, remote_id, "user-1").await.unwrap();
    mock.sessions
        .lock()
        .unwrap()
        .insert(remote_id, serde_json::json!({ "client_ref": id }));
    remote_id
}

#[tokio::test]
async fn test_load_by_id_returns_session_and_ordered_events() {
    let (_dir, pool) = test_pool().await;
    let id = seed_completed_session(&pool, 5).await;
    let (_mock, service) = service_with_mock(&pool).await;

    match service.load(Some(id)).await {
        ReplayState::Success { session, events } => {
            assert_eq!(session.id, id);
            assert_eq!(events.len(), 5);
            let timestamps: Vec<i64> = events.iter().map(|e| e.timestamp_ms).collect();
            let mut sorted = timestamps.clone();
            sorted.sort_unstable();
            assert_eq!(timestamps, sorted);
        }
        other => panic!("Expected success, got {:?}", other),
    }
}

#[tokio::test]
async fn test_load_latest_picks_most_recently_completed() {
    let (_dir, pool) = test_pool().await;
    seed_completed_session(&pool, 1).await;
    let newest = seed_completed_session(&pool, 1).await;
    let (_mock, service) = service_with_mock(&pool).await;

    match service.load(None).await {
        ReplayState::Success { session, .. } => assert_eq!(session.id, newest),
        other => panic!("Expected success, got {:?}", other),
    }
}

#[tokio::test]
async fn test_load_unknown_id_is_not_found() {
    let (_dir, pool) = test_pool().await;
    let (_mock, service) = service_with_mock(&pool).await;

    match service.load(Some(42)).await {
        ReplayState::Error { kind, .. } => assert_eq!(kind, ReplayErrorKind::NotFound),
        other => panic!("Expected not-found error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_load_latest_with_empty_history_is_no_history() {
    // Empty store is a distinct condition from a bad id: the user has simply
    // never recorded anything.
    let (_dir, pool) = test_pool().await;
    let (_mock, service) = service_with_mock(&pool).await;

    match service.load(None).await {
        ReplayState::Error { kind, .. } => assert_eq!(kind, ReplayErrorKind::NoHistory),
        other => panic!("Expected no-history error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_store_failure_is_load_failed() {
    let (_dir, pool) = test_pool().await;
    let (_mock, service) = service_with_mock(&pool).await;
    pool.close().await;

    match service.load(Some(1)).await {
        ReplayState::Error { kind, .. } => assert_eq!(kind, ReplayErrorKind::LoadFailed),
        other => panic!("Expected load-failed error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_remote_deletion_mid_read_transitions_to_deleted() {
    let (_dir, pool) = test_pool().await;
    let id = seed_completed_session(&pool, 2).await;
    let (mock, service) = service_with_mock(&pool).await;
    let remote_id = sync_session(&pool, &mock, id).await;

    assert!(matches!(service.load(Some(id)).await, ReplayState::Success { .. }));

    mock.delete_session(remote_id);
    tokio::time::sleep(POLL_INTERVAL * 4).await;

    match service.state().await {
        ReplayState::Deleted { session_id, message } => {
            assert_eq!(session_id, id);
            assert!(message.contains("deleted"));
        }
        other => panic!("Expected deleted state, got {:?}", other),
    }
}

#[tokio::test]
async fn test_local_deletion_mid_read_transitions_to_deleted() {
    // Guest sessions have no remote record; deletion is detected locally
    let (_dir, pool) = test_pool().await;
    let id = seed_completed_session(&pool, 2).await;
    let (_mock, service) = service_with_mock(&pool).await;

    assert!(matches!(service.load(Some(id)).await, ReplayState::Success { .. }));

    sqlx::query("DELETE FROM practice_sessions WHERE id = ?")
        .bind(id)
        .execute(&pool)
        .await
        .unwrap();
    tokio::time::sleep(POLL_INTERVAL * 4).await;

    assert!(matches!(service.state().await, ReplayState::Deleted { .. }));
}

#[tokio::test]
async fn test_surviving_session_stays_loaded() {
    let (_dir, pool) = test_pool().await;
    let id = seed_completed_session(&pool, 2).await;
    let (mock, service) = service_with_mock(&pool).await;
    sync_session(&pool, &mock, id).await;

    service.load(Some(id)).await;
    tokio::time::sleep(POLL_INTERVAL * 4).await;

    assert!(matches!(service.state().await, ReplayState::Success { .. }));
}

#[tokio::test]
async fn test_new_load_cancels_previous_deletion_poller() {
    let (_dir, pool) = test_pool().await;
    let first = seed_completed_session(&pool, 1).await;
    let second = seed_completed_session(&pool, 1).await;
    let (mock, service) = service_with_mock(&pool).await;
    let first_remote = sync_session(&pool, &mock, first).await;
    sync_session(&pool, &mock, second).await;

    service.load(Some(first)).await;
    service.load(Some(second)).await;

    // Deleting the first session must not disturb the second load
    mock.delete_session(first_remote);
    tokio::time::sleep(POLL_INTERVAL * 4).await;

    match service.state().await {
        ReplayState::Success { session, .. } => assert_eq!(session.id, second),
        other => panic!("Expected second session still loaded, got {:?}", other),
    }
}

#[tokio::test]
async fn test_slow_stale_check_cannot_mark_newer_load_deleted() {
    // An existence check already in flight when a new load cancels the old
    // poller must not flip the new load to deleted, even when it comes back
    // negative for the old session.
    let (_dir, pool) = test_pool().await;
    let first = seed_completed_session(&pool, 1).await;
    let second = seed_completed_session(&pool, 1).await;
    let (mock, service) = service_with_mock(&pool).await;
    let first_remote = sync_session(&pool, &mock, first).await;

    mock.delete_session(first_remote);
    mock.set_exists_delay(200);

    service.load(Some(first)).await;
    // Let the poller commit to a check that will answer slowly
    tokio::time::sleep(POLL_INTERVAL + Duration::from_millis(20)).await;
    service.load(Some(second)).await;

    // Wait for the slow negative answer for the first session to land
    tokio::time::sleep(Duration::from_millis(400)).await;

    match service.state().await {
        ReplayState::Success { session, .. } => assert_eq!(session.id, second),
        other => panic!("Expected second session still loaded, got {:?}", other),
    }
}

#[tokio::test]
async fn test_unload_returns_to_idle_and_stops_polling() {
    let (_dir, pool) = test_pool().await;
    let id = seed_completed_session(&pool, 1).await;
    let (mock, service) = service_with_mock(&pool).await;
    let remote_id = sync_session(&pool, &mock, id).await;

    service.load(Some(id)).await;
    service.unload().await;
    assert!(matches!(service.state().await, ReplayState::Idle));

    // A deletion after unload must not resurrect any state transition
    mock.delete_session(remote_id);
    tokio::time::sleep(POLL_INTERVAL * 4).await;
    assert!(matches!(service.state().await, ReplayState::Idle));
}
