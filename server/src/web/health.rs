use std::sync::Arc;

use axum::extract::State;
use axum::response::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::app_state::AppState;
use crate::engine::session::SessionStatus;

#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub status: SessionStatus,
    pub guilds: usize,
    pub guild_list: usize,
    pub channels: usize,
    pub users: usize,
    pub last_commit: Option<DateTime<Utc>>,
}

/// GET /health: session status and mirror sizes.
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthReport> {
    let mirror = &state.mirror;
    Json(HealthReport {
        status: state
            .session
            .as_ref()
            .map_or(SessionStatus::Stopped, |s| s.status()),
        guilds: mirror.guild_count(),
        guild_list: mirror.guild_list().len(),
        channels: mirror.channel_count(),
        users: mirror.user_count(),
        last_commit: mirror.last_commit(),
    })
}
