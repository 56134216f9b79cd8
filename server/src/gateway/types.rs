use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Guild as mirrored from the directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuildRecord {
    pub id: u64,
    pub name: String,
    pub owner_id: u64,
    pub member_count: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    Text,
    Voice,
    Category,
    News,
    Forum,
    Direct,
    Other,
}

/// Channel as mirrored from the directory. DM channels carry neither a
/// guild nor a name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelRecord {
    pub id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guild_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub kind: ChannelKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: u64,
    pub username: String,
    pub bot: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberRecord {
    pub user: UserRecord,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nick: Option<String>,
}

/// A message as delivered by the gateway, before normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub id: u64,
    pub author: UserRecord,
    pub channel_id: u64,
    pub guild_id: Option<u64>,
    pub content: String,
    pub created: DateTime<Utc>,
}

/// Events pushed from the gateway connection into the session's dispatch loop.
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayEvent {
    Ready { username: String },
    Message(InboundMessage),
    Error(String),
}

/// Gateway sub-capabilities the connection asks for. Fixed by configuration,
/// never negotiated at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Guilds,
    GuildMessages,
    GuildMessageReactions,
    GuildMessageTyping,
    GuildPresences,
    GuildMembers,
    DirectMessages,
    DirectMessageReactions,
    DirectMessageTyping,
    MessageContent,
}

impl Intent {
    pub const DEFAULTS: [Intent; 10] = [
        Intent::Guilds,
        Intent::GuildMessages,
        Intent::GuildMessageReactions,
        Intent::GuildMessageTyping,
        Intent::DirectMessages,
        Intent::DirectMessageReactions,
        Intent::DirectMessageTyping,
        Intent::GuildPresences,
        Intent::GuildMembers,
        Intent::MessageContent,
    ];

    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "guilds" => Some(Self::Guilds),
            "guild_messages" => Some(Self::GuildMessages),
            "guild_message_reactions" => Some(Self::GuildMessageReactions),
            "guild_message_typing" => Some(Self::GuildMessageTyping),
            "guild_presences" => Some(Self::GuildPresences),
            "guild_members" => Some(Self::GuildMembers),
            "direct_messages" => Some(Self::DirectMessages),
            "direct_message_reactions" => Some(Self::DirectMessageReactions),
            "direct_message_typing" => Some(Self::DirectMessageTyping),
            "message_content" => Some(Self::MessageContent),
            _ => None,
        }
    }
}
