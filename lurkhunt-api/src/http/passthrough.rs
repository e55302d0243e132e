//! Read-only passthroughs to the platform API, using the manager's
//! credentials. Handy for manual checks; the scanning core never calls
//! these.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use serde::Deserialize;

use lurkhunt_core::twitch::{self, StreamsQuery};

use super::AppState;

#[derive(Debug, Deserialize)]
pub struct StreamsParams {
    pub game_id: Option<String>,
    pub user_id: Option<String>,
    pub user_login: Option<String>,
}

pub async fn get_streams(
    State(state): State<AppState>,
    Query(params): Query<StreamsParams>,
) -> impl IntoResponse {
    let config = match state.credentials.api_config().await {
        Ok(config) => config,
        Err(e) => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"message": format!("No usable credentials: {e}")})),
            );
        }
    };

    let query = StreamsQuery {
        game_id: params.game_id,
        user_id: params.user_id,
        user_login: params.user_login,
        ..StreamsQuery::default()
    };

    match twitch::get_streams(&config, &query).await {
        Ok((streams, cursor)) => (
            StatusCode::OK,
            Json(serde_json::json!({"data": streams, "cursor": cursor})),
        ),
        Err(e) => {
            tracing::error!("Stream listing failed: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"message": "Failed to fetch streams"})),
            )
        }
    }
}

pub async fn get_user(
    State(state): State<AppState>,
    Path(login): Path<String>,
) -> impl IntoResponse {
    let config = match state.credentials.api_config().await {
        Ok(config) => config,
        Err(e) => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"message": format!("No usable credentials: {e}")})),
            );
        }
    };

    match twitch::get_users(&config, &[login.as_str()]).await {
        Ok(users) => match users.into_iter().next() {
            Some(user) => (StatusCode::OK, Json(serde_json::json!(user))),
            None => (
                StatusCode::NOT_FOUND,
                Json(serde_json::json!({"message": format!("No such login '{login}'")})),
            ),
        },
        Err(e) => {
            tracing::error!("User lookup failed: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"message": "Failed to fetch user"})),
            )
        }
    }
}
