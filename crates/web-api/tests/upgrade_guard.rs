mod support;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use tokio_tungstenite::tungstenite;
use tower::ServiceExt;

use support::{build_router, seeded_gateway, spawn_server, ALICE, CAROL};

fn refused_status(result: Result<support::WsStream, tungstenite::Error>) -> StatusCode {
    match result {
        Err(tungstenite::Error::Http(response)) => {
            StatusCode::from_u16(response.status().as_u16()).expect("status")
        }
        Err(other) => panic!("unexpected error {other:?}"),
        Ok(_) => panic!("handshake should have been refused"),
    }
}

#[tokio::test]
async fn health_check() {
    let router = build_router(seeded_gateway().await, Vec::new());

    let response = router
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn missing_session_is_unauthorized() {
    let server = spawn_server(Vec::new()).await;
    let result = server.connect("/ws/group/10", None, None).await;
    assert_eq!(refused_status(result), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn non_member_is_forbidden() {
    let server = spawn_server(Vec::new()).await;
    let result = server.connect("/ws/group/10", Some(CAROL), None).await;
    assert_eq!(refused_status(result), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn unknown_targets_are_not_found() {
    let server = spawn_server(Vec::new()).await;

    let result = server.connect("/ws/group/999", Some(ALICE), None).await;
    assert_eq!(refused_status(result), StatusCode::NOT_FOUND);

    let result = server.connect("/ws/user/999", Some(ALICE), None).await;
    assert_eq!(refused_status(result), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn direct_chat_with_self_is_rejected() {
    let server = spawn_server(Vec::new()).await;
    let result = server.connect("/ws/user/1", Some(ALICE), None).await;
    assert_eq!(refused_status(result), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn origin_must_be_allowed() {
    let server = spawn_server(vec!["http://localhost:3000".to_string()]).await;

    let result = server
        .connect("/ws/group/10", Some(ALICE), Some("http://evil.example"))
        .await;
    assert_eq!(refused_status(result), StatusCode::FORBIDDEN);

    let accepted = server
        .connect("/ws/group/10", Some(ALICE), Some("http://localhost:3000"))
        .await;
    assert!(accepted.is_ok());
}
