use std::sync::Arc;

use axum::Router;
use axum::http::HeaderValue;
use axum::routing::get;
use tower_http::cors::{Any, CorsLayer};

use super::app_state::AppState;
use super::{health, oauth};
use crate::config::AUTHORIZE_PATH;

/// Build the axum router with all HTTP routes.
pub fn build_router(state: Arc<AppState>) -> Router {
    // Restrict CORS to the public origin, or allow any for localhost dev
    let public_url = &state.public_url;
    let cors = if public_url.contains("localhost")
        || public_url.contains("127.0.0.1")
        || public_url.contains("0.0.0.0")
    {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origin = public_url
            .parse::<HeaderValue>()
            .unwrap_or_else(|_| HeaderValue::from_static("https://localhost"));
        CorsLayer::new()
            .allow_origin(origin)
            .allow_methods(Any)
            .allow_headers(Any)
    };

    Router::new()
        .route(AUTHORIZE_PATH, get(oauth::authorize))
        .route("/services/discord/login", get(oauth::login))
        .route("/health", get(health::health))
        .layer(cors)
        .with_state(state)
}
