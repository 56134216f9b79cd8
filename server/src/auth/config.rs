/// Browser-facing consent page. Unlike the token and `@me` endpoints it does
/// not live under the REST base.
pub const AUTHORIZE_URL: &str = "https://discord.com/oauth2/authorize";

/// Discord OAuth application settings.
#[derive(Clone, Debug)]
pub struct OAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    /// Where Discord sends the user back after authorizing.
    pub redirect_uri: String,
    /// Scopes requested by the application authorization link.
    pub scopes: Vec<String>,
    /// Discord REST base, e.g. `https://discord.com/api`.
    pub api_base: String,
}

impl OAuthConfig {
    /// Token exchange needs both halves of the client credential.
    pub fn can_exchange(&self) -> bool {
        !self.client_id.is_empty() && !self.client_secret.is_empty()
    }

    pub fn token_endpoint(&self) -> String {
        format!("{}/oauth2/token", self.api_base.trim_end_matches('/'))
    }

    pub fn me_endpoint(&self) -> String {
        format!("{}/oauth2/@me", self.api_base.trim_end_matches('/'))
    }
}
