use async_trait::async_trait;
use tokio::sync::mpsc;

use super::types::{ChannelRecord, GatewayEvent, GuildRecord, Intent, MemberRecord};
use crate::error::{DirectoryError, SendError};

/// Read access to guild/channel/member directory data.
#[async_trait]
pub trait DirectoryQuery: Send + Sync {
    /// Every guild the bot currently sees.
    async fn guilds(&self) -> Result<Vec<GuildRecord>, DirectoryError>;

    async fn guild_channels(&self, guild_id: u64) -> Result<Vec<ChannelRecord>, DirectoryError>;

    async fn channel_members(&self, channel_id: u64) -> Result<Vec<MemberRecord>, DirectoryError>;

    /// Look a channel up by id, hitting the network when it is not cached.
    async fn fetch_channel(&self, channel_id: u64) -> Result<ChannelRecord, DirectoryError>;
}

/// Posts a plain-text message into a channel.
#[async_trait]
pub trait MessageSender: Send + Sync {
    async fn send_message(&self, channel_id: u64, content: &str) -> Result<(), SendError>;
}

/// Opens the live gateway connection.
///
/// `login` returns once the connection attempt is under way; readiness and
/// later failures arrive as `GatewayEvent`s on `events`.
#[async_trait]
pub trait GatewayConnector: Send + Sync {
    async fn login(
        &self,
        token: &str,
        intents: &[Intent],
        events: mpsc::Sender<GatewayEvent>,
    ) -> Result<(), String>;
}
