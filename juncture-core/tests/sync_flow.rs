//! End-to-end sync flows against a mock provider server.

use std::time::Duration;

use mockito::Matcher;

use juncture_core::{
    CreateEventRequest, GrantStore, JunctureError, ProviderClient, SessionState, SyncSession,
};

fn session_with_grant(server: &mockito::ServerGuard, dir: &std::path::Path) -> SyncSession {
    let grants = GrantStore::new(dir);
    grants.save("grant-test").unwrap();
    let client = ProviderClient::new(&server.url()).unwrap();
    SyncSession::new(client, grants)
}

/// Run one poll, waiting out any in-flight poll instead of treating the
/// skip as a result.
async fn poll_until_run(
    session: &SyncSession,
) -> Result<juncture_core::ApplyStats, JunctureError> {
    loop {
        match session.poll_now().await? {
            Some(stats) => return Ok(stats),
            None => tokio::time::sleep(Duration::from_millis(10)).await,
        }
    }
}

#[tokio::test]
async fn test_snapshot_delta_error_sequence() {
    let mut server = mockito::Server::new_async().await;
    let dir = tempfile::tempdir().unwrap();
    let session = session_with_grant(&server, dir.path());

    // First poll, empty cursor: full snapshot as a bare array. The mock is
    // in place before start() so the immediate first timer tick hits it.
    let snapshot_mock = server
        .mock("GET", "/nylas/list-events")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"[
                {"id": "a", "title": "Alpha", "when": {"start_time": 1700000000, "end_time": 1700003600}},
                {"id": "b", "title": "Beta", "when": {"all_day": true, "start_date": "2024-11-17"}}
            ]"#,
        )
        .create_async()
        .await;

    assert!(session.start().await.unwrap());

    let mut rx = session.subscribe();
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if rx.borrow_and_update().events.len() == 2 {
                break;
            }
            rx.changed().await.unwrap();
        }
    })
    .await
    .expect("first poll never merged the snapshot");
    snapshot_mock.assert_async().await;

    // Drive the remaining polls by hand.
    session.stop();
    server.reset_async().await;

    // Second poll: delta tombstones "a" and issues a cursor.
    server
        .mock("GET", "/nylas/list-events")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"events": [{"id": "a", "deleted": true}], "sync_token": "tok-1"}"#)
        .create_async()
        .await;

    let stats = poll_until_run(&session).await.unwrap();
    assert_eq!(stats.deleted, 1);
    let events = session.events().await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].id, "b");
    assert_eq!(
        session.state().await,
        SessionState::Connected {
            cursor: Some("tok-1".to_string())
        }
    );
    server.reset_async().await;

    // Third poll fails: prior view and cursor are retained.
    server
        .mock("GET", "/nylas/list-events")
        .with_status(500)
        .create_async()
        .await;

    match poll_until_run(&session).await {
        Err(JunctureError::ProviderUnreachable(_)) => {}
        other => panic!("Expected ProviderUnreachable, got {:?}", other),
    }
    assert_eq!(session.events().await.len(), 1, "failed poll must not clear the view");
    assert_eq!(
        session.state().await,
        SessionState::Connected {
            cursor: Some("tok-1".to_string())
        }
    );
    server.reset_async().await;

    // Fourth poll: the cursor is sent, and a token-less response keeps it.
    let cursor_mock = server
        .mock("GET", "/nylas/list-events")
        .match_query(Matcher::UrlEncoded("sync_token".into(), "tok-1".into()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"events": []}"#)
        .create_async()
        .await;

    poll_until_run(&session).await.unwrap();
    cursor_mock.assert_async().await;
    assert_eq!(
        session.state().await,
        SessionState::Connected {
            cursor: Some("tok-1".to_string())
        }
    );

    // Logout clears everything.
    session.logout().await.unwrap();
    assert_eq!(session.state().await, SessionState::LoggedOut);
    assert!(session.events().await.is_empty());
    assert_eq!(GrantStore::new(dir.path()).load().unwrap(), None);
}

#[tokio::test]
async fn test_poll_timer_fetches_after_start() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/nylas/list-events")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"[{"id": "a", "title": "Alpha"}]"#)
        .create_async()
        .await;

    let dir = tempfile::tempdir().unwrap();
    let session = session_with_grant(&server, dir.path());
    let mut rx = session.subscribe();

    assert!(session.start().await.unwrap());

    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if !rx.borrow_and_update().events.is_empty() {
                break;
            }
            rx.changed().await.unwrap();
        }
    })
    .await
    .expect("timer never merged the snapshot");

    session.stop();
}

#[tokio::test]
async fn test_complete_auth_exchanges_and_persists_grant() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/oauth/exchange")
        .match_query(Matcher::UrlEncoded("code".into(), "abc123".into()))
        .with_status(200)
        .with_body("grant-xyz")
        .create_async()
        .await;
    server
        .mock("GET", "/nylas/list-events")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body("[]")
        .create_async()
        .await;

    let dir = tempfile::tempdir().unwrap();
    let grants = GrantStore::new(dir.path());
    let client = ProviderClient::new(&server.url()).unwrap();
    let session = SyncSession::new(client, grants.clone());

    session
        .complete_auth("myapp://oauth/exchange?code=abc123")
        .await
        .unwrap();

    assert!(session.state().await.is_connected());
    assert_eq!(grants.load().unwrap(), Some("grant-xyz".to_string()));
    session.stop();
}

#[tokio::test]
async fn test_failed_exchange_leaves_session_logged_out() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/oauth/exchange")
        .match_query(Matcher::Any)
        .with_status(400)
        .create_async()
        .await;

    let dir = tempfile::tempdir().unwrap();
    let grants = GrantStore::new(dir.path());
    let client = ProviderClient::new(&server.url()).unwrap();
    let session = SyncSession::new(client, grants.clone());

    let result = session.complete_auth("myapp://oauth/exchange?code=bad").await;
    assert!(matches!(result, Err(JunctureError::ExchangeFailed(_))));
    assert_eq!(session.state().await, SessionState::LoggedOut);
    assert_eq!(grants.load().unwrap(), None);
}

#[tokio::test]
async fn test_unpersistable_grant_leaves_session_logged_out() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/oauth/exchange")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body("grant-xyz")
        .create_async()
        .await;

    // A regular file where the grant directory should be makes save fail
    // after a successful exchange.
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("not-a-dir");
    std::fs::write(&blocker, b"").unwrap();

    let client = ProviderClient::new(&server.url()).unwrap();
    let session = SyncSession::new(client, GrantStore::new(blocker));

    let result = session.complete_auth("myapp://oauth/exchange?code=abc").await;
    assert!(matches!(result, Err(JunctureError::Io(_))));
    assert_eq!(session.state().await, SessionState::LoggedOut);
}

#[tokio::test]
async fn test_primary_calendar_and_create_event() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/nylas/primary-calendar")
        .with_status(200)
        .with_body("cal-primary")
        .create_async()
        .await;
    server
        .mock("POST", "/nylas/create-event")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"{"id": "new-1", "title": "Standup",
                "when": {"start_time": 1700000000, "end_time": 1700003600}}"#,
        )
        .create_async()
        .await;

    let client = ProviderClient::new(&server.url()).unwrap();

    assert_eq!(client.primary_calendar().await.unwrap(), "cal-primary");

    let created = client
        .create_event(&CreateEventRequest {
            title: "Standup".into(),
            start_time: 1700000000,
            end_time: 1700003600,
            participants: None,
            location: None,
            description: None,
        })
        .await
        .unwrap();
    assert_eq!(created.id, "new-1");
    assert!(created.when.is_some());
}

#[tokio::test]
async fn test_create_event_error_body_is_surfaced() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/nylas/create-event")
        .with_status(422)
        .with_header("content-type", "application/json")
        .with_body(r#"{"error": "end_time before start_time"}"#)
        .create_async()
        .await;

    let client = ProviderClient::new(&server.url()).unwrap();
    let result = client
        .create_event(&CreateEventRequest {
            title: "Backwards".into(),
            start_time: 1700003600,
            end_time: 1700000000,
            participants: None,
            location: None,
            description: None,
        })
        .await;

    match result {
        Err(JunctureError::ProviderUnreachable(message)) => {
            assert_eq!(message, "end_time before start_time");
        }
        other => panic!("Expected provider error, got {:?}", other),
    }
}
