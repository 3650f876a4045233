use service_core::{
    axum::{extract::State, http::StatusCode, response::IntoResponse, Json},
    error::AppError,
};
use std::sync::Arc;

use crate::{
    dtos::bridge::{BootstrapRequest, BootstrapResponse},
    host::{HostIdentityAdapter, PayloadHostSdk},
    utils::{BearerToken, ValidatedJson},
    AppState,
};

/// Bootstrap a session for the acting host user
#[utoipa::path(
    post,
    path = "/bridge/session",
    request_body = BootstrapRequest,
    responses(
        (status = 200, description = "Session established", body = BootstrapResponse),
        (status = 400, description = "Invalid host identity", body = ErrorResponse),
        (status = 401, description = "Secondary auth sign-in failed", body = ErrorResponse),
        (status = 404, description = "No directory user for the host user", body = ErrorResponse),
        (status = 409, description = "Email registered with different credentials", body = ErrorResponse),
        (status = 422, description = "Validation error", body = ErrorResponse),
        (status = 503, description = "Host SDK unavailable", body = ErrorResponse)
    ),
    tag = "Bridge"
)]
pub async fn bootstrap_session(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<BootstrapRequest>,
) -> Result<impl IntoResponse, AppError> {
    let sdk = Arc::new(PayloadHostSdk::new(
        req.user.into(),
        req.identity_token,
        req.board_id,
    ));
    let adapter = HostIdentityAdapter::new(sdk, &state.config.host_sdk);

    let identity = adapter.resolve().await?;
    let session = state.bootstrapper.bootstrap_session(&identity).await?;
    let host_board_id = adapter.board_id().await;

    Ok((
        StatusCode::OK,
        Json(BootstrapResponse {
            session,
            host_board_id,
        }),
    ))
}

/// End the secondary auth session
#[utoipa::path(
    post,
    path = "/bridge/sign-out",
    responses(
        (status = 204, description = "Signed out"),
        (status = 401, description = "Missing or invalid token", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "Bridge",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn sign_out(
    State(state): State<AppState>,
    BearerToken(token): BearerToken,
) -> Result<impl IntoResponse, AppError> {
    state.bootstrapper.end_session(&token).await?;
    Ok(StatusCode::NO_CONTENT)
}
