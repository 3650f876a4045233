//! HTTP surface tests driven through the router with `oneshot`.

mod common;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use bridge_service::models::{DirectoryUser, Role};
use bridge_service::services::{MockDirectoryStore, MockSecondaryAuth};
use common::{send, TestApp};
use serde_json::json;
use service_core::axum::{
    body::Body,
    http::{header, Request, StatusCode},
};

fn identity_token(claims: serde_json::Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{}.{}.signature", header, payload)
}

fn designer_app() -> TestApp {
    let designer = DirectoryUser::new("d@x.com".to_string(), "D".to_string(), Role::Designer);
    TestApp::with(
        MockDirectoryStore::new().with_user(designer),
        MockSecondaryAuth::new(),
    )
}

#[tokio::test]
async fn bootstrap_returns_session_json() {
    let app = designer_app();

    let (status, body) = app
        .post_json(
            "/bridge/session",
            json!({
                "user": { "id": "h-1", "name": "D", "email": "D@x.com" },
                "board_id": "host-board-1"
            }),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["session"]["directory_user"]["email"], "d@x.com");
    assert_eq!(body["session"]["directory_user"]["role"], "designer");
    assert_eq!(body["session"]["redirect_target"]["kind"], "dashboard");
    assert_eq!(body["session"]["redirect_path"], "/dashboard");
    assert_eq!(body["session"]["linked"], true);
    assert!(body["session"]["access_token"].is_string());
    assert_eq!(body["host_board_id"], "host-board-1");
}

#[tokio::test]
async fn bootstrap_recovers_email_from_identity_token() {
    let app = designer_app();
    let token = identity_token(json!({ "sub": "h-1", "dat": { "email": "d@x.com" } }));

    let (status, body) = app
        .post_json(
            "/bridge/session",
            json!({
                "user": { "id": "h-1", "name": "D" },
                "identity_token": token
            }),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["session"]["directory_user"]["host_user_id"], "h-1");
}

#[tokio::test]
async fn unknown_host_user_is_404_with_host_id() {
    let app = TestApp::new();

    let (status, body) = app
        .post_json(
            "/bridge/session",
            json!({ "user": { "id": "u-42", "name": "C", "email": "client@x.com" } }),
        )
        .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body.to_string().contains("u-42"));
}

#[tokio::test]
async fn email_conflict_is_409() {
    let designer = DirectoryUser::new("d@x.com".to_string(), "D".to_string(), Role::Designer);
    let app = TestApp::with(
        MockDirectoryStore::new().with_user(designer),
        MockSecondaryAuth::new().with_account("d@x.com", "not-the-derived-secret"),
    );

    let (status, _) = app
        .post_json(
            "/bridge/session",
            json!({ "user": { "id": "h-1", "name": "D", "email": "d@x.com" } }),
        )
        .await;

    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn empty_host_user_id_fails_validation() {
    let app = TestApp::new();

    let (status, body) = app
        .post_json("/bridge/session", json!({ "user": { "id": "", "name": "X" } }))
        .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["error"].as_str().unwrap().contains("Validation error"));
}

#[tokio::test]
async fn whitespace_host_user_id_is_service_unavailable() {
    // Passes length validation, but the adapter treats a blank id as no user.
    let app = TestApp::new();

    let (status, _) = app
        .post_json("/bridge/session", json!({ "user": { "id": "   ", "name": "X" } }))
        .await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn malformed_json_is_400() {
    let app = TestApp::new();
    let request = Request::builder()
        .method("POST")
        .uri("/bridge/session")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();

    let (status, _) = send(app.router(), request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn sign_out_ends_the_secondary_session() {
    let app = designer_app();
    let (_, body) = app
        .post_json(
            "/bridge/session",
            json!({ "user": { "id": "h-1", "name": "D", "email": "d@x.com" } }),
        )
        .await;
    let token = body["session"]["access_token"].as_str().unwrap().to_string();
    assert_eq!(app.auth.active_sessions(), 1);

    let request = Request::builder()
        .method("POST")
        .uri("/bridge/sign-out")
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(app.router(), request).await;

    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(app.auth.active_sessions(), 0);
}

#[tokio::test]
async fn sign_out_rejects_unknown_token() {
    let app = TestApp::new();
    let request = Request::builder()
        .method("POST")
        .uri("/bridge/sign-out")
        .header(header::AUTHORIZATION, "Bearer not-a-live-session")
        .body(Body::empty())
        .unwrap();

    let (status, _) = send(app.router(), request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn sign_out_requires_bearer_token() {
    let app = TestApp::new();
    let request = Request::builder()
        .method("POST")
        .uri("/bridge/sign-out")
        .body(Body::empty())
        .unwrap();

    let (status, body) = send(app.router(), request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Missing or invalid Authorization header");
}

#[tokio::test]
async fn responses_carry_request_id() {
    let app = TestApp::new();
    let request = Request::builder()
        .uri("/health")
        .header("x-request-id", "trace-me")
        .body(Body::empty())
        .unwrap();

    let response = tower::ServiceExt::oneshot(app.router(), request).await.unwrap();
    assert_eq!(response.headers()["x-request-id"], "trace-me");
}
