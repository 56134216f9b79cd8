use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::gateway::types::InboundMessage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    Send,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    /// A guild channel.
    Room,
    /// A direct-message channel.
    Direct,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Actor {
    pub id: String,
    pub username: String,
    #[serde(rename = "ref")]
    pub reference: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActivityObject {
    pub content: String,
    pub created: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Target {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub kind: TargetKind,
    #[serde(rename = "ref")]
    pub reference: u64,
}

/// Canonical actor/object/target record emitted for every relayed message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Activity {
    #[serde(rename = "type")]
    pub kind: ActivityKind,
    pub actor: Actor,
    pub object: ActivityObject,
    pub target: Target,
}

/// Local id for a Discord user: `dc-user-{user_id}`.
pub fn actor_id(user_id: u64) -> String {
    format!("dc-user-{user_id}")
}

/// Local id for a conversation target.
///
/// - guild channels: `dc-guild-{guild_id}-{channel_id}`
/// - DM channels: `dc-dm-{channel_id}`
pub fn target_id(guild_id: Option<u64>, channel_id: u64) -> String {
    match guild_id {
        Some(gid) => format!("dc-guild-{gid}-{channel_id}"),
        None => format!("dc-dm-{channel_id}"),
    }
}

/// Build the activity for `msg`. `channel_name` is `None` for DM channels
/// and whenever the name could not be resolved.
pub fn normalize(msg: &InboundMessage, channel_name: Option<&str>) -> Activity {
    Activity {
        kind: ActivityKind::Send,
        actor: Actor {
            id: actor_id(msg.author.id),
            username: msg.author.username.clone(),
            reference: msg.author.id,
        },
        object: ActivityObject {
            content: msg.content.clone(),
            created: msg.created,
        },
        target: Target {
            id: target_id(msg.guild_id, msg.channel_id),
            name: channel_name.map(str::to_owned),
            kind: if msg.guild_id.is_some() {
                TargetKind::Room
            } else {
                TargetKind::Direct
            },
            reference: msg.channel_id,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::types::UserRecord;
    use chrono::TimeZone;

    fn message(guild_id: Option<u64>, content: &str) -> InboundMessage {
        InboundMessage {
            id: 900,
            author: UserRecord {
                id: 42,
                username: "alice".into(),
                bot: false,
            },
            channel_id: 100,
            guild_id,
            content: content.into(),
            created: Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap(),
        }
    }

    #[test]
    fn test_guild_message_keeps_content_and_refs() {
        let msg = message(Some(200), "  hello, world!  ");
        let activity = normalize(&msg, Some("general"));

        assert_eq!(activity.kind, ActivityKind::Send);
        assert_eq!(activity.object.content, "  hello, world!  ");
        assert_eq!(activity.object.created, msg.created);
        assert_eq!(activity.actor.reference, 42);
        assert_eq!(activity.actor.username, "alice");
        assert_eq!(activity.actor.id, "dc-user-42");
        assert_eq!(activity.target.reference, 100);
        assert_eq!(activity.target.id, "dc-guild-200-100");
        assert_eq!(activity.target.name.as_deref(), Some("general"));
        assert_eq!(activity.target.kind, TargetKind::Room);
    }

    #[test]
    fn test_dm_message_has_no_target_name() {
        let activity = normalize(&message(None, "psst"), None);
        assert_eq!(activity.target.name, None);
        assert_eq!(activity.target.kind, TargetKind::Direct);
        assert_eq!(activity.target.id, "dc-dm-100");

        let json = serde_json::to_value(&activity).unwrap();
        assert!(json["target"].get("name").is_none());
    }

    #[test]
    fn test_ids_are_deterministic() {
        let a = normalize(&message(Some(1), "x"), None);
        let b = normalize(&message(Some(1), "y"), None);
        assert_eq!(a.actor.id, b.actor.id);
        assert_eq!(a.target.id, b.target.id);
    }

    #[test]
    fn test_serialized_shape() {
        let json = serde_json::to_value(normalize(&message(Some(7), "hi"), Some("lobby"))).unwrap();
        assert_eq!(json["type"], "send");
        assert_eq!(json["actor"]["ref"], 42);
        assert_eq!(json["object"]["content"], "hi");
        assert_eq!(json["object"]["created"], "2024-05-01T12:30:00Z");
        assert_eq!(json["target"]["type"], "room");
        assert_eq!(json["target"]["name"], "lobby");
    }
}
