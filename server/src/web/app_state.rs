use std::sync::Arc;

use crate::auth::config::OAuthConfig;
use crate::engine::session::Session;
use crate::engine::state_mirror::StateMirror;

/// Shared state handed to every HTTP handler.
pub struct AppState {
    pub mirror: Arc<StateMirror>,
    /// Absent when the relay runs without a gateway connection.
    pub session: Option<Arc<Session>>,
    pub oauth: OAuthConfig,
    pub public_url: String,
    pub http: reqwest::Client,
}
