pub mod config;
pub mod db;
pub mod dtos;
pub mod handlers;
pub mod host;
pub mod models;
pub mod services;
pub mod utils;

use service_core::axum::{
    extract::State,
    http::{header, HeaderValue, Method},
    middleware::from_fn,
    routing::{get, post},
    Json, Router,
};
use service_core::error::AppError;
use service_core::middleware::tracing::request_id_middleware;
use service_core::observability::REQUEST_ID_HEADER;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::config::{BridgeConfig, SwaggerMode};
use crate::services::{
    AuthBridge, CredentialDeriver, DirectoryResolver, DirectoryStore, GoTrueClient, SecondaryAuth,
    SessionBootstrapper,
};

#[derive(OpenApi)]
#[openapi(
    paths(
        health_check,
        handlers::bridge::bootstrap_session,
        handlers::bridge::sign_out,
    ),
    components(
        schemas(
            dtos::ErrorResponse,
            dtos::bridge::BootstrapRequest,
            dtos::bridge::BootstrapResponse,
            dtos::bridge::HostUserPayload,
            models::Session,
            models::DirectoryUser,
            models::Role,
            models::SecondaryAuthAccountId,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Bridge", description = "Host identity bridging and session bootstrap"),
        (name = "Observability", description = "Service health and monitoring"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: BridgeConfig,
    pub directory: Arc<dyn DirectoryStore>,
    pub secondary_auth: Arc<dyn SecondaryAuth>,
    pub bootstrapper: SessionBootstrapper,
}

impl AppState {
    /// Wire the bootstrap pipeline over the given store and auth subsystem.
    pub fn new(
        config: BridgeConfig,
        directory: Arc<dyn DirectoryStore>,
        secondary_auth: Arc<dyn SecondaryAuth>,
    ) -> Self {
        let resolver =
            DirectoryResolver::new(directory.clone(), config.directory.main_admin_email.clone());
        let bridge = AuthBridge::new(
            CredentialDeriver::new(config.credentials.derivation_secret.clone()),
            secondary_auth.clone(),
            directory.clone(),
        );
        let bootstrapper = SessionBootstrapper::new(resolver, bridge, config.routes.clone());

        Self {
            config,
            directory,
            secondary_auth,
            bootstrapper,
        }
    }

    /// Build the secondary auth client described by `config`.
    pub fn gotrue_client(config: &BridgeConfig) -> Result<GoTrueClient, AppError> {
        GoTrueClient::new(
            &config.secondary_auth.url,
            config.secondary_auth.anon_key.clone(),
            Duration::from_secs(config.secondary_auth.request_timeout_seconds),
        )
        .map_err(AppError::ConfigError)
    }
}

pub fn build_router(state: AppState) -> Router {
    let mut app = Router::new().route("/health", get(health_check));

    app = match state.config.swagger.enabled {
        SwaggerMode::Public => {
            app.merge(SwaggerUi::new("/docs").url("/.well-known/openapi.json", ApiDoc::openapi()))
        }
        SwaggerMode::Disabled => app.route(
            "/.well-known/openapi.json",
            get(|| async { Json(ApiDoc::openapi()) }),
        ),
    };

    let cors = CorsLayer::new()
        .allow_origin(
            state
                .config
                .security
                .allowed_origins
                .iter()
                .filter_map(|o| match o.parse::<HeaderValue>() {
                    Ok(value) => Some(value),
                    Err(e) => {
                        tracing::error!("Invalid CORS origin '{}': {}. Skipping.", o, e);
                        None
                    }
                })
                .collect::<Vec<HeaderValue>>(),
        )
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    app.route("/bridge/session", post(handlers::bootstrap_session))
        .route("/bridge/sign-out", post(handlers::sign_out))
        .with_state(state)
        .layer(TraceLayer::new_for_http().make_span_with(
            |request: &service_core::axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get(REQUEST_ID_HEADER)
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                    version = ?request.version(),
                )
            },
        ))
        .layer(from_fn(request_id_middleware))
        .layer(cors)
}

/// Service health check
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy"),
        (status = 500, description = "Directory store is unreachable")
    ),
    tag = "Observability"
)]
pub async fn health_check(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    state.directory.health_check().await.map_err(|e| {
        tracing::error!(error = %e, "Directory store health check failed");
        AppError::DatabaseError(anyhow::anyhow!(e))
    })?;

    Ok(Json(serde_json::json!({
        "status": "healthy",
        "service": state.config.service_name,
        "version": state.config.service_version,
        "environment": format!("{:?}", state.config.environment),
        "checks": {
            "directory": "up"
        }
    })))
}
