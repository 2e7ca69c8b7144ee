//! Credential exchange against a real HTTP endpoint on an ephemeral port.

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use mockview_session::{
    loopback, CredentialRequest, HttpTokenIssuer, InterviewConfig, InterviewOrchestrator,
    SessionConnector, SessionError, SessionNotice, SessionStatus, TokenIssuer,
};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;

#[derive(Clone, Default)]
struct Endpoint {
    seen: Arc<Mutex<Vec<CredentialRequest>>>,
}

async fn issue_token(
    State(endpoint): State<Endpoint>,
    Json(request): Json<CredentialRequest>,
) -> Json<Value> {
    let token = format!("tok-{}-{}", request.room, request.identity);
    endpoint.seen.lock().unwrap().push(request);
    Json(json!({ "token": token }))
}

async fn broken() -> (StatusCode, &'static str) {
    (StatusCode::INTERNAL_SERVER_ERROR, "boom")
}

async fn empty_token() -> Json<Value> {
    Json(json!({ "token": "" }))
}

/// Serve the token routes; returns the base URL.
async fn serve(endpoint: Endpoint) -> String {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let app = Router::new()
        .route("/livekit/token", post(issue_token))
        .route("/broken", post(broken))
        .route("/empty", post(empty_token))
        .with_state(endpoint);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

#[tokio::test]
async fn posts_room_and_identity_and_returns_token() {
    let endpoint = Endpoint::default();
    let base = serve(endpoint.clone()).await;
    let issuer =
        HttpTokenIssuer::new(format!("{}/livekit/token", base), Duration::from_secs(5)).unwrap();

    let request = CredentialRequest {
        room: "interview-1a2b3c4d".into(),
        identity: "user-5e6f7a8b".into(),
    };
    let token = issuer.issue(&request).await.unwrap();

    assert_eq!(token, "tok-interview-1a2b3c4d-user-5e6f7a8b");
    assert_eq!(*endpoint.seen.lock().unwrap(), vec![request]);
}

#[tokio::test]
async fn server_error_is_a_credential_failure() {
    let base = serve(Endpoint::default()).await;
    let issuer = HttpTokenIssuer::new(format!("{}/broken", base), Duration::from_secs(5)).unwrap();

    let err = issuer
        .issue(&CredentialRequest {
            room: "interview-x".into(),
            identity: "user-x".into(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::Credential(ref msg) if msg.contains("500")));
    assert!(err.is_setup_failure());
}

#[tokio::test]
async fn empty_token_is_rejected() {
    let base = serve(Endpoint::default()).await;
    let issuer = HttpTokenIssuer::new(format!("{}/empty", base), Duration::from_secs(5)).unwrap();

    let err = issuer
        .issue(&CredentialRequest {
            room: "interview-x".into(),
            identity: "user-x".into(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::Credential(_)));
}

#[tokio::test]
async fn orchestrator_uses_issued_token_to_connect() {
    let endpoint = Endpoint::default();
    let base = serve(endpoint.clone()).await;
    let config = InterviewConfig {
        token_endpoint: format!("{}/livekit/token", base),
        ..InterviewConfig::default()
    };

    let (transport, media, agent) = loopback();
    let issuer = Arc::new(HttpTokenIssuer::from_config(&config).unwrap());
    let connector = SessionConnector::new(&config, issuer, Arc::new(transport), Arc::new(media));
    let (handle, mut notices) = InterviewOrchestrator::spawn(config, connector);

    handle.start("ada").unwrap();
    let notice = tokio::time::timeout(Duration::from_secs(5), notices.recv())
        .await
        .unwrap()
        .unwrap();
    let SessionNotice::SessionStarted {
        room,
        participant_id,
        ..
    } = notice
    else {
        panic!("expected SessionStarted, got {notice:?}");
    };

    let seen = endpoint.seen.lock().unwrap().clone();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].room, room);
    assert_eq!(seen[0].identity, participant_id);
    assert!(room.starts_with("interview-"));
    assert!(participant_id.starts_with("user-"));
    assert_eq!(
        agent.tokens_seen(),
        vec![format!("tok-{}-{}", room, participant_id)]
    );
    assert_eq!(agent.published_tracks().len(), 1);
    assert_eq!(handle.snapshot().status, SessionStatus::Live);

    handle.shutdown().await.unwrap();
    assert_eq!(agent.disconnect_count(), 1);
}

#[tokio::test]
async fn unreachable_endpoint_fails_setup() {
    let base = serve(Endpoint::default()).await;
    let config = InterviewConfig {
        token_endpoint: format!("{}/broken", base),
        ..InterviewConfig::default()
    };

    let (transport, media, agent) = loopback();
    let issuer = Arc::new(HttpTokenIssuer::from_config(&config).unwrap());
    let connector = SessionConnector::new(&config, issuer, Arc::new(transport), Arc::new(media));
    let (handle, mut notices) = InterviewOrchestrator::spawn(config, connector);

    handle.start("ada").unwrap();
    let notice = tokio::time::timeout(Duration::from_secs(5), notices.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(
        notice,
        SessionNotice::SetupFailed { ref error, .. } if error.contains("500")
    ));
    assert_eq!(handle.snapshot().status, SessionStatus::Error);
    assert!(handle.snapshot().can_start());
    assert_eq!(agent.connect_count(), 0);
}
