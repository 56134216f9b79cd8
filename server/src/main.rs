use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use discord_relay::config::ServerConfig;
use discord_relay::db::snapshots::open_state_store;
use discord_relay::engine::alerts::AlertRelay;
use discord_relay::engine::session::Session;
use discord_relay::engine::state_mirror::StateMirror;
use discord_relay::gateway::discord::DiscordClient;
use discord_relay::web::app_state::AppState;
use discord_relay::web::router::build_router;

/// Discord relay: gateway to activity-stream bridge.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, env = "RELAY_CONFIG", default_value = "relay.toml")]
    config: String,

    /// Serve only the HTTP endpoints; do not connect to the gateway
    #[arg(long)]
    no_gateway: bool,

    /// Keep mirror snapshots in memory instead of SQLite
    #[arg(long)]
    no_database: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = ServerConfig::load(&args.config)?;

    let database_url = (!args.no_database).then_some(config.database.url.as_str());
    let store = open_state_store(database_url)
        .await
        .context("failed to open database")?;

    let mirror = Arc::new(StateMirror::new(store));
    if let Err(e) = mirror.restore().await {
        warn!(error = %e, "could not restore state mirror, starting empty");
    }

    let discord = Arc::new(DiscordClient::new());

    let session = if args.no_gateway {
        info!("gateway disabled, serving HTTP only");
        None
    } else {
        let (session, notifications) = Session::new(
            config.to_session_config(),
            discord.clone(),
            discord.clone(),
            mirror.clone(),
        );

        let alerts = AlertRelay::new(config.discord.alerts.clone(), discord.clone(), mirror.clone());
        tokio::spawn(alerts.run(notifications));

        let starting = session.clone();
        let connector = discord.clone();
        tokio::spawn(async move {
            match starting.start(connector.as_ref()).await {
                Ok(dispatch_loop) => {
                    if let Err(e) = dispatch_loop.await {
                        error!(error = %e, "dispatch loop panicked");
                    }
                }
                Err(e) => error!(error = %e, "discord session failed to start"),
            }
        });
        Some(session)
    };

    let app_state = Arc::new(AppState {
        mirror,
        session,
        oauth: config.to_oauth_config(),
        public_url: config.public_url(),
        http: reqwest::Client::new(),
    });
    let app = build_router(app_state);

    let bind = config.bind_address();
    info!("Discord relay starting, HTTP on {}", bind);
    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("failed to bind {bind}"))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await
        .context("server error")?;

    discord.shutdown().await;
    info!("Discord relay stopped");
    Ok(())
}
