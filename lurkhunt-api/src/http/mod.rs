//! HTTP admin surface.
//!
//! Three endpoints matter to the scanning core: the servlet pushes fresh
//! tokens through `/store-token`, an operator can force a refresh, and the
//! deployment probes `/healthcheck`. The read-only passthrough endpoints
//! exist for poking the platform API by hand.

pub mod health;
pub mod passthrough;
pub mod tokens;


use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use lurkhunt_core::credentials::CredentialManager;

#[derive(Clone)]
pub struct AppState {
    pub credentials: Arc<CredentialManager>,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/healthcheck", get(health::healthcheck))
        .route("/store-token", post(tokens::store_token))
        .route("/force-tokens-refresh", get(tokens::force_tokens_refresh))
        .route("/streams", get(passthrough::get_streams))
        .route("/user/{login}", get(passthrough::get_user))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
