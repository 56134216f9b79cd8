use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{info, warn};

use crate::auth::config::OAuthConfig;
use crate::auth::oauth::application_authorization_link;
use crate::engine::session::SessionConfig;
use crate::gateway::types::Intent;

/// Path of the OAuth redirect target served by `web::router`.
pub const AUTHORIZE_PATH: &str = "/services/discord/authorize";

/// Top-level relay configuration, loaded from relay.toml.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct ServerConfig {
    pub server: ServerSection,
    pub database: DatabaseSection,
    pub discord: DiscordSection,
    pub oauth: OAuthSection,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub host: String,
    pub port: u16,
    /// Public `host[:port]` browsers reach the relay at. Used for the OAuth
    /// redirect and the CORS origin, never for binding.
    pub authority: String,
    /// Served behind TLS; switches public links to https.
    pub tls: bool,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8080,
            authority: "localhost:8080".into(),
            tls: false,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DatabaseSection {
    pub url: String,
}

impl Default for DatabaseSection {
    fn default() -> Self {
        Self {
            url: "sqlite:relay.db?mode=rwc".into(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DiscordSection {
    /// Bot token. Without it the gateway session refuses to start.
    pub token: Option<String>,
    pub intents: Vec<Intent>,
    /// Channel ids that receive ready/error alerts.
    pub alerts: Vec<u64>,
}

impl Default for DiscordSection {
    fn default() -> Self {
        Self {
            token: None,
            intents: Intent::DEFAULTS.to_vec(),
            alerts: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct OAuthSection {
    pub client_id: String,
    pub client_secret: String,
    pub scopes: Vec<String>,
    pub api_base: String,
}

impl Default for OAuthSection {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            scopes: vec!["bot".into()],
            api_base: "https://discord.com/api".into(),
        }
    }
}

fn split_list(v: &str) -> impl Iterator<Item = &str> {
    v.split(',').map(str::trim).filter(|s| !s.is_empty())
}

impl ServerConfig {
    /// Load config from a TOML file, falling back to defaults when the file
    /// doesn't exist. Environment variables override TOML values.
    pub fn load(path: &str) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config file {path}"))?;
            toml::from_str(&contents)
                .with_context(|| format!("failed to parse config file {path}"))?
        } else {
            info!("No config file found at {}, using defaults", path);
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("RELAY_HOST") {
            self.server.host = v;
        }
        if let Ok(v) = std::env::var("RELAY_PORT")
            && let Ok(port) = v.parse()
        {
            self.server.port = port;
        }
        if let Ok(v) = std::env::var("RELAY_AUTHORITY") {
            self.server.authority = v;
        }
        if let Ok(v) = std::env::var("RELAY_TLS") {
            self.server.tls = matches!(v.to_lowercase().as_str(), "1" | "true" | "yes");
        }
        if let Ok(v) = std::env::var("DATABASE_URL") {
            self.database.url = v;
        }
        if let Ok(v) = std::env::var("DISCORD_TOKEN") {
            self.discord.token = Some(v);
        }
        if let Ok(v) = std::env::var("DISCORD_INTENTS") {
            self.discord.intents = split_list(&v)
                .filter_map(|name| {
                    let intent = Intent::parse(name);
                    if intent.is_none() {
                        warn!(intent = name, "ignoring unknown gateway intent");
                    }
                    intent
                })
                .collect();
        }
        if let Ok(v) = std::env::var("DISCORD_ALERTS") {
            self.discord.alerts = split_list(&v).filter_map(|s| s.parse().ok()).collect();
        }
        if let Ok(v) = std::env::var("DISCORD_CLIENT_ID") {
            self.oauth.client_id = v;
        }
        if let Ok(v) = std::env::var("DISCORD_CLIENT_SECRET") {
            self.oauth.client_secret = v;
        }
        if let Ok(v) = std::env::var("DISCORD_SCOPES") {
            self.oauth.scopes = split_list(&v).map(String::from).collect();
        }
        if let Ok(v) = std::env::var("DISCORD_API_BASE") {
            self.oauth.api_base = v;
        }
    }

    /// `host:port` the HTTP server binds to.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Origin the relay is reachable at from outside, e.g. `https://relay.example.com`.
    pub fn public_url(&self) -> String {
        let scheme = if self.server.tls { "https" } else { "http" };
        format!("{}://{}", scheme, self.server.authority.trim_end_matches('/'))
    }

    pub fn to_oauth_config(&self) -> OAuthConfig {
        OAuthConfig {
            client_id: self.oauth.client_id.clone(),
            client_secret: self.oauth.client_secret.clone(),
            redirect_uri: format!("{}{}", self.public_url(), AUTHORIZE_PATH),
            scopes: self.oauth.scopes.clone(),
            api_base: self.oauth.api_base.clone(),
        }
    }

    pub fn to_session_config(&self) -> SessionConfig {
        SessionConfig {
            token: self.discord.token.clone(),
            intents: self.discord.intents.clone(),
            app_authorize_url: application_authorization_link(&self.to_oauth_config()),
        }
    }
}
