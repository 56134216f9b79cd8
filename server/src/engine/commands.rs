use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use tracing::{debug, info};

use crate::error::SendError;
use crate::gateway::capabilities::MessageSender;
use crate::gateway::types::InboundMessage;

pub const HELP_TEXT: &str = "Available commands: !ping, !help, !status, !sync";
pub const STATUS_TEXT: &str = "Relay is online and forwarding messages.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Ping,
    Help,
    Status,
    Sync,
}

impl Command {
    pub fn parse(content: &str) -> Option<Self> {
        match content {
            "!ping" => Some(Self::Ping),
            "!help" => Some(Self::Help),
            "!status" => Some(Self::Status),
            "!sync" => Some(Self::Sync),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    NotACommand,
    /// A reply with this text was sent to the originating channel.
    Replied(String),
    /// The caller must run a full sync and skip activity emission.
    SyncRequested,
}

pub fn pong(now: chrono::DateTime<Utc>) -> String {
    format!("Pong! {}", now.to_rfc3339_opts(SecondsFormat::Millis, true))
}

pub struct CommandDispatcher {
    sender: Arc<dyn MessageSender>,
}

impl CommandDispatcher {
    pub fn new(sender: Arc<dyn MessageSender>) -> Self {
        Self { sender }
    }

    /// Inspect `msg` and act on a recognized command. A failed reply is
    /// returned to the caller as-is.
    pub async fn dispatch(&self, msg: &InboundMessage) -> Result<DispatchOutcome, SendError> {
        let Some(command) = Command::parse(&msg.content) else {
            return Ok(DispatchOutcome::NotACommand);
        };
        debug!(?command, channel_id = msg.channel_id, "dispatching command");

        let reply = match command {
            Command::Ping => pong(Utc::now()),
            Command::Help => HELP_TEXT.to_string(),
            Command::Status => STATUS_TEXT.to_string(),
            Command::Sync => {
                info!(user_id = msg.author.id, "sync requested from chat");
                return Ok(DispatchOutcome::SyncRequested);
            }
        };

        self.sender.send_message(msg.channel_id, &reply).await?;
        Ok(DispatchOutcome::Replied(reply))
    }
}
