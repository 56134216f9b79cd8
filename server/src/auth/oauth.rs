use serde::Deserialize;
use tracing::{info, warn};

use super::config::{AUTHORIZE_URL, OAuthConfig};

/// Token payload returned by the code exchange.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: u64,
    pub refresh_token: Option<String>,
    pub scope: String,
}

/// Discord user as returned by `/oauth2/@me`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DiscordUser {
    pub id: String,
    pub username: String,
    pub global_name: Option<String>,
    pub avatar: Option<String>,
}

#[derive(Deserialize)]
struct AuthorizationInfo {
    user: Option<DiscordUser>,
}

/// Link for adding the application (bot) to a guild. Scopes are
/// comma-joined, no permissions requested.
pub fn application_authorization_link(config: &OAuthConfig) -> String {
    let scope = config
        .scopes
        .iter()
        .map(|s| urlencoding::encode(s).into_owned())
        .collect::<Vec<_>>()
        .join(",");
    format!(
        "{}?client_id={}&permissions=0&scope={}",
        AUTHORIZE_URL,
        urlencoding::encode(&config.client_id),
        scope
    )
}

/// Link for the user-login code flow. Always asks for `identify` only,
/// regardless of the configured scopes.
pub fn authorize_link(config: &OAuthConfig) -> String {
    format!(
        "{}?client_id={}&redirect_uri={}&response_type=code&scope=identify",
        AUTHORIZE_URL,
        urlencoding::encode(&config.client_id),
        urlencoding::encode(&config.redirect_uri)
    )
}

/// Trade an authorization code for an access token.
pub async fn exchange_code(
    http: &reqwest::Client,
    config: &OAuthConfig,
    code: &str,
) -> Option<TokenResponse> {
    let form = [
        ("client_id", config.client_id.as_str()),
        ("client_secret", config.client_secret.as_str()),
        ("code", code),
        ("grant_type", "authorization_code"),
        ("scope", "identify"),
        ("redirect_uri", config.redirect_uri.as_str()),
    ];

    let result = async {
        http.post(config.token_endpoint())
            .form(&form)
            .send()
            .await?
            .error_for_status()?
            .json::<TokenResponse>()
            .await
    }
    .await;

    match result {
        Ok(token) => {
            info!(scope = %token.scope, "discord oauth code exchanged");
            Some(token)
        }
        Err(e) => {
            warn!(error = %e, "discord oauth token exchange failed");
            None
        }
    }
}

/// Resolve an access token to the Discord user it belongs to.
pub async fn fetch_user(
    http: &reqwest::Client,
    config: &OAuthConfig,
    access_token: &str,
) -> Option<DiscordUser> {
    let result = async {
        http.get(config.me_endpoint())
            .header("Authorization", format!("Bearer {}", access_token))
            .send()
            .await?
            .error_for_status()?
            .json::<AuthorizationInfo>()
            .await
    }
    .await;

    match result {
        Ok(info) => info.user,
        Err(e) => {
            warn!(error = %e, "discord oauth user lookup failed");
            None
        }
    }
}
