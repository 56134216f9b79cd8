use thiserror::Error;

/// Failure talking to the Discord directory (cache or REST fallback).
#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("channel {0} not found")]
    ChannelNotFound(u64),
    #[error("guild {0} not found in cache")]
    GuildNotFound(u64),
    #[error("discord request failed: {0}")]
    Upstream(String),
}

/// Failure delivering a chat reply.
#[derive(Debug, Error)]
#[error("failed to send message to channel {channel_id}: {reason}")]
pub struct SendError {
    pub channel_id: u64,
    pub reason: String,
}

/// Failure persisting or loading a mirror snapshot.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("snapshot encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Directory(#[from] DirectoryError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Send(#[from] SendError),
    #[error(transparent)]
    Sync(#[from] SyncError),
}

#[derive(Debug, Error)]
pub enum SessionError {
    /// No bot token configured. Carries the link an operator should follow
    /// to add the application to a guild.
    #[error("no discord token configured; authorize the application at {authorize_url}")]
    MissingCredential { authorize_url: String },
    #[error("discord login failed: {0}")]
    Login(String),
    #[error("gateway event stream closed before ready")]
    GatewayClosed,
}
