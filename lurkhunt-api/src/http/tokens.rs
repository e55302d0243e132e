use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use serde::Serialize;

use lurkhunt_core::credentials::CredentialError;
use lurkhunt_core::models::TokenPayload;

use super::AppState;

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

fn ok() -> (StatusCode, Json<MessageResponse>) {
    (
        StatusCode::OK,
        Json(MessageResponse {
            message: "ok".to_string(),
        }),
    )
}

fn failure(status: StatusCode, detail: String) -> (StatusCode, Json<MessageResponse>) {
    (status, Json(MessageResponse { message: detail }))
}

/// Token drop-off from the OAuth servlet.
///
/// 400 when the payload fails validation, 500 when persisting it failed;
/// either way the old tokens are gone and the servlet needs re-running.
pub async fn store_token(
    State(state): State<AppState>,
    Json(payload): Json<TokenPayload>,
) -> impl IntoResponse {
    match state.credentials.ingest_from_servlet(&payload).await {
        Ok(()) => ok(),
        Err(CredentialError::Validation(e)) => {
            tracing::warn!("Token payload rejected: {e}");
            failure(StatusCode::BAD_REQUEST, format!("Validation error: {e}"))
        }
        Err(e) => {
            tracing::error!("Token update failed: {e}");
            failure(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Token update failed: Internal Server Error".to_string(),
            )
        }
    }
}

/// Operator-triggered unconditional refresh.
pub async fn force_tokens_refresh(State(state): State<AppState>) -> impl IntoResponse {
    match state.credentials.force_refresh().await {
        Ok(()) => ok(),
        Err(e) => {
            tracing::error!("Forced refresh failed: {e}");
            failure(StatusCode::BAD_GATEWAY, format!("Refresh failed: {e}"))
        }
    }
}
