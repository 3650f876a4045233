//! Test helpers for bridge-service integration tests.
//!
//! Builds an `AppState` over the in-memory directory and auth subsystem.

#![allow(dead_code)]

use bridge_service::{
    build_router,
    config::{
        BridgeConfig, CredentialConfig, DatabaseConfig, DirectoryConfig, Environment,
        HostSdkConfig, RouteConfig, SecondaryAuthConfig, SecurityConfig, SwaggerConfig,
        SwaggerMode,
    },
    host::HostUser,
    models::HostIdentity,
    services::{MockDirectoryStore, MockSecondaryAuth},
    AppState,
};
use secrecy::Secret;
use service_core::axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use std::sync::Arc;
use tower::ServiceExt;

pub const MAIN_ADMIN_EMAIL: &str = "owner@studio.test";

pub fn test_config() -> BridgeConfig {
    BridgeConfig {
        common: service_core::config::Config::default(),
        environment: Environment::Dev,
        service_name: "bridge-service-test".to_string(),
        service_version: "0.0.0".to_string(),
        log_level: "debug".to_string(),
        otlp_endpoint: None,
        database: DatabaseConfig {
            url: Secret::new("postgres://localhost/bridge_test".to_string()),
            max_connections: 5,
            min_connections: 1,
        },
        secondary_auth: SecondaryAuthConfig {
            url: "http://localhost:9999".to_string(),
            anon_key: Secret::new("anon".to_string()),
            request_timeout_seconds: 5,
        },
        credentials: CredentialConfig {
            derivation_secret: Secret::new("integration-test-derivation-secret".to_string()),
        },
        directory: DirectoryConfig {
            main_admin_email: Some(MAIN_ADMIN_EMAIL.to_string()),
        },
        host_sdk: HostSdkConfig {
            poll_interval_ms: 5,
            timeout_ms: 100,
        },
        routes: RouteConfig::default(),
        security: SecurityConfig {
            allowed_origins: vec!["http://localhost:3000".to_string()],
        },
        swagger: SwaggerConfig {
            enabled: SwaggerMode::Disabled,
        },
    }
}

/// Application state wired to mocks the test can inspect.
pub struct TestApp {
    pub state: AppState,
    pub directory: Arc<MockDirectoryStore>,
    pub auth: Arc<MockSecondaryAuth>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with(MockDirectoryStore::new(), MockSecondaryAuth::new())
    }

    pub fn with(directory: MockDirectoryStore, auth: MockSecondaryAuth) -> Self {
        let directory = Arc::new(directory);
        let auth = Arc::new(auth);
        let state = AppState::new(test_config(), directory.clone(), auth.clone());
        Self {
            state,
            directory,
            auth,
        }
    }

    pub fn router(&self) -> Router {
        build_router(self.state.clone())
    }

    /// POST a JSON body and return the status with the parsed response.
    pub async fn post_json(&self, uri: &str, body: serde_json::Value) -> (StatusCode, serde_json::Value) {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        send(self.router(), request).await
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, serde_json::Value) {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        send(self.router(), request).await
    }
}

pub async fn send(router: Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
    let response = router.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null)
    };
    (status, body)
}

pub fn identity(host_user_id: &str, email: Option<&str>) -> HostIdentity {
    HostIdentity::new(host_user_id, "Test User", email.map(str::to_string))
}

pub fn host_user(id: &str, email: Option<&str>) -> HostUser {
    HostUser {
        id: id.to_string(),
        name: "Test User".to_string(),
        email: email.map(str::to_string),
    }
}
