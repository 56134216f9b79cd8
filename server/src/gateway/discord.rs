use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serenity::cache::Cache;
use serenity::gateway::ShardManager;
use serenity::http::Http;
use serenity::model::channel::{Channel, ChannelType, GuildChannel, Message};
use serenity::model::gateway::{GatewayIntents, Ready};
use serenity::model::guild::{Guild, Member};
use serenity::model::id::{ChannelId, GuildId};
use serenity::model::user::User;
use serenity::prelude::{Client, Context, EventHandler};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use super::capabilities::{DirectoryQuery, GatewayConnector, MessageSender};
use super::types::{
    ChannelKind, ChannelRecord, GatewayEvent, GuildRecord, InboundMessage, Intent, MemberRecord,
    UserRecord,
};
use crate::error::{DirectoryError, SendError};

struct Handles {
    cache: Arc<Cache>,
    http: Arc<Http>,
    shard_manager: Arc<ShardManager>,
}

/// Discord client wrapper. Directory and send calls fail with
/// `DirectoryError::Upstream` / `SendError` until `login` has built the
/// underlying serenity client.
#[derive(Default)]
pub struct DiscordClient {
    handles: OnceLock<Handles>,
}

impl DiscordClient {
    pub fn new() -> Self {
        Self::default()
    }

    fn handles(&self) -> Result<&Handles, DirectoryError> {
        self.handles
            .get()
            .ok_or_else(|| DirectoryError::Upstream("gateway not connected".into()))
    }

    /// Close every shard. A no-op before login.
    pub async fn shutdown(&self) {
        if let Some(h) = self.handles.get() {
            info!("shutting down discord shards");
            h.shard_manager.shutdown_all().await;
        }
    }
}

pub fn gateway_intents(intents: &[Intent]) -> GatewayIntents {
    let mut bits = GatewayIntents::empty();
    for intent in intents {
        bits |= match intent {
            Intent::Guilds => GatewayIntents::GUILDS,
            Intent::GuildMessages => GatewayIntents::GUILD_MESSAGES,
            Intent::GuildMessageReactions => GatewayIntents::GUILD_MESSAGE_REACTIONS,
            Intent::GuildMessageTyping => GatewayIntents::GUILD_MESSAGE_TYPING,
            Intent::GuildPresences => GatewayIntents::GUILD_PRESENCES,
            Intent::GuildMembers => GatewayIntents::GUILD_MEMBERS,
            Intent::DirectMessages => GatewayIntents::DIRECT_MESSAGES,
            Intent::DirectMessageReactions => GatewayIntents::DIRECT_MESSAGE_REACTIONS,
            Intent::DirectMessageTyping => GatewayIntents::DIRECT_MESSAGE_TYPING,
            Intent::MessageContent => GatewayIntents::MESSAGE_CONTENT,
        };
    }
    bits
}

// ── Model conversion ────────────────────────────────────────────────

fn user_record(user: &User) -> UserRecord {
    UserRecord {
        id: user.id.get(),
        username: user.name.clone(),
        bot: user.bot,
    }
}

fn member_record(member: &Member) -> MemberRecord {
    MemberRecord {
        user: user_record(&member.user),
        nick: member.nick.clone(),
    }
}

fn guild_record(guild: &Guild) -> GuildRecord {
    GuildRecord {
        id: guild.id.get(),
        name: guild.name.clone(),
        owner_id: guild.owner_id.get(),
        member_count: guild.member_count,
    }
}

fn channel_kind(kind: ChannelType) -> ChannelKind {
    match kind {
        ChannelType::Text => ChannelKind::Text,
        ChannelType::Voice | ChannelType::Stage => ChannelKind::Voice,
        ChannelType::Category => ChannelKind::Category,
        ChannelType::News => ChannelKind::News,
        ChannelType::Forum => ChannelKind::Forum,
        ChannelType::Private => ChannelKind::Direct,
        _ => ChannelKind::Other,
    }
}

fn channel_record(channel: &GuildChannel) -> ChannelRecord {
    ChannelRecord {
        id: channel.id.get(),
        guild_id: Some(channel.guild_id.get()),
        name: Some(channel.name.clone()),
        kind: channel_kind(channel.kind),
    }
}

/// Find a guild channel by walking the cached guilds. The returned channel is
/// cloned so no cache guard outlives this call.
fn cached_guild_channel(cache: &Cache, channel_id: ChannelId) -> Option<GuildChannel> {
    cache.guilds().into_iter().find_map(|guild_id| {
        cache
            .guild(guild_id)
            .and_then(|guild| guild.channels.get(&channel_id).cloned())
    })
}

fn message_created(msg: &Message) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&msg.timestamp.to_string())
        .map(|t| t.with_timezone(&Utc))
        .ok()
        .or_else(|| DateTime::from_timestamp(msg.timestamp.unix_timestamp(), 0))
        .unwrap_or_else(Utc::now)
}

fn inbound_message(msg: &Message) -> InboundMessage {
    InboundMessage {
        id: msg.id.get(),
        author: user_record(&msg.author),
        channel_id: msg.channel_id.get(),
        guild_id: msg.guild_id.map(|g| g.get()),
        content: msg.content.clone(),
        created: message_created(msg),
    }
}

// ── Gateway ─────────────────────────────────────────────────────────

/// Forwards serenity callbacks into the session's event channel.
struct RelayHandler {
    events: mpsc::Sender<GatewayEvent>,
}

impl RelayHandler {
    async fn forward(&self, event: GatewayEvent) {
        if self.events.send(event).await.is_err() {
            debug!("session event channel closed, dropping gateway event");
        }
    }
}

#[serenity::async_trait]
impl EventHandler for RelayHandler {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        info!(user = %ready.user.name, guilds = ready.guilds.len(), "discord gateway ready");
        self.forward(GatewayEvent::Ready {
            username: ready.user.name.clone(),
        })
        .await;
    }

    async fn message(&self, _ctx: Context, msg: Message) {
        self.forward(GatewayEvent::Message(inbound_message(&msg)))
            .await;
    }
}

#[async_trait]
impl GatewayConnector for DiscordClient {
    async fn login(
        &self,
        token: &str,
        intents: &[Intent],
        events: mpsc::Sender<GatewayEvent>,
    ) -> Result<(), String> {
        let handler = RelayHandler {
            events: events.clone(),
        };
        let mut client = Client::builder(token, gateway_intents(intents))
            .event_handler(handler)
            .await
            .map_err(|e| format!("failed to create discord client: {e}"))?;

        let handles = Handles {
            cache: client.cache.clone(),
            http: client.http.clone(),
            shard_manager: client.shard_manager.clone(),
        };
        if self.handles.set(handles).is_err() {
            return Err("discord client already logged in".into());
        }

        tokio::spawn(async move {
            // Resolves only when every shard has stopped or the login was refused.
            if let Err(e) = client.start().await {
                error!(error = %e, "discord client stopped");
                let _ = events.send(GatewayEvent::Error(e.to_string())).await;
            }
        });
        Ok(())
    }
}

// ── Directory ───────────────────────────────────────────────────────

#[async_trait]
impl DirectoryQuery for DiscordClient {
    async fn guilds(&self) -> Result<Vec<GuildRecord>, DirectoryError> {
        let cache = &self.handles()?.cache;
        Ok(cache
            .guilds()
            .into_iter()
            .filter_map(|id| cache.guild(id).map(|g| guild_record(&g)))
            .collect())
    }

    async fn guild_channels(&self, guild_id: u64) -> Result<Vec<ChannelRecord>, DirectoryError> {
        let cache = &self.handles()?.cache;
        let guild = cache
            .guild(GuildId::new(guild_id))
            .ok_or(DirectoryError::GuildNotFound(guild_id))?;
        Ok(guild.channels.values().map(channel_record).collect())
    }

    async fn channel_members(&self, channel_id: u64) -> Result<Vec<MemberRecord>, DirectoryError> {
        let cache = &self.handles()?.cache;
        let channel = cached_guild_channel(cache, ChannelId::new(channel_id))
            .ok_or(DirectoryError::ChannelNotFound(channel_id))?;
        let members = channel
            .members(cache)
            .map_err(|e| DirectoryError::Upstream(e.to_string()))?;
        Ok(members.iter().map(member_record).collect())
    }

    async fn fetch_channel(&self, channel_id: u64) -> Result<ChannelRecord, DirectoryError> {
        let handles = self.handles()?;
        // to_channel consults the cache before going over HTTP.
        let channel = ChannelId::new(channel_id)
            .to_channel((&handles.cache, handles.http.as_ref()))
            .await
            .map_err(|e| DirectoryError::Upstream(e.to_string()))?;
        Ok(match channel {
            Channel::Guild(gc) => channel_record(&gc),
            Channel::Private(pc) => ChannelRecord {
                id: pc.id.get(),
                guild_id: None,
                name: None,
                kind: ChannelKind::Direct,
            },
            _ => ChannelRecord {
                id: channel_id,
                guild_id: None,
                name: None,
                kind: ChannelKind::Other,
            },
        })
    }
}

// ── Replies ─────────────────────────────────────────────────────────

#[async_trait]
impl MessageSender for DiscordClient {
    async fn send_message(&self, channel_id: u64, content: &str) -> Result<(), SendError> {
        let handles = self.handles().map_err(|e| SendError {
            channel_id,
            reason: e.to_string(),
        })?;
        ChannelId::new(channel_id)
            .say(handles.http.as_ref(), content)
            .await
            .map(|_| ())
            .map_err(|e| SendError {
                channel_id,
                reason: e.to_string(),
            })
    }
}
