use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect, Response};
use serde::Deserialize;
use tracing::{info, warn};

use super::app_state::AppState;
use crate::auth::oauth::{authorize_link, exchange_code, fetch_user};

#[derive(Debug, Default, Deserialize)]
pub struct AuthorizeParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

/// GET /services/discord/login: send the user to Discord's consent screen.
pub async fn login(State(state): State<Arc<AppState>>) -> Response {
    Redirect::temporary(&authorize_link(&state.oauth)).into_response()
}

/// GET /services/discord/authorize: OAuth redirect target.
///
/// Always acknowledges with `200 ok`. When Discord hands back a code the
/// exchange and user lookup run before responding; their outcome is only
/// logged.
pub async fn authorize(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AuthorizeParams>,
) -> Response {
    if let Some(error) = &params.error {
        warn!(%error, "discord oauth authorization denied");
    } else if let Some(code) = &params.code {
        if state.oauth.can_exchange() {
            complete_authorization(&state, code).await;
        } else {
            warn!("received oauth code but no client credentials are configured");
        }
    }

    (StatusCode::OK, "ok").into_response()
}

async fn complete_authorization(state: &AppState, code: &str) {
    let Some(token) = exchange_code(&state.http, &state.oauth, code).await else {
        return;
    };
    match fetch_user(&state.http, &state.oauth, &token.access_token).await {
        Some(user) => info!(user_id = %user.id, username = %user.username, "discord user authorized"),
        None => warn!("token exchanged but user lookup returned nothing"),
    }
}
