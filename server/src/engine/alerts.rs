use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::session::SessionNotification;
use super::state_mirror::StateMirror;
use crate::gateway::capabilities::MessageSender;

/// Posts session status lines into the configured alert channels.
pub struct AlertRelay {
    channels: Vec<u64>,
    sender: Arc<dyn MessageSender>,
    mirror: Arc<StateMirror>,
}

impl AlertRelay {
    pub fn new(channels: Vec<u64>, sender: Arc<dyn MessageSender>, mirror: Arc<StateMirror>) -> Self {
        Self {
            channels,
            sender,
            mirror,
        }
    }

    /// Alert text for a notification, or `None` if it is not alert-worthy.
    pub fn alert_text(&self, notification: &SessionNotification) -> Option<String> {
        match notification {
            SessionNotification::Ready { username } => Some(format!(
                "{username} connected, mirroring {} guild(s)",
                self.mirror.guild_count()
            )),
            SessionNotification::Error(e) => Some(format!("relay error: {e}")),
            SessionNotification::Activity(_) => None,
        }
    }

    /// Send `text` to every alert channel. Failures are logged and skipped.
    pub async fn broadcast(&self, text: &str) -> usize {
        let mut delivered = 0;
        for &channel_id in &self.channels {
            match self.sender.send_message(channel_id, text).await {
                Ok(()) => delivered += 1,
                Err(e) => warn!(channel_id, error = %e, "failed to deliver alert"),
            }
        }
        delivered
    }

    /// Drain session notifications until the session drops its sender.
    pub async fn run(self, mut notifications: mpsc::UnboundedReceiver<SessionNotification>) {
        while let Some(notification) = notifications.recv().await {
            if let SessionNotification::Activity(activity) = &notification {
                debug!(
                    actor = %activity.actor.id,
                    target = %activity.target.id,
                    "activity relayed"
                );
            }
            if let Some(text) = self.alert_text(&notification) {
                self.broadcast(&text).await;
            }
        }
    }
}
