use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, info};

use super::state_mirror::StateMirror;
use crate::error::SyncError;
use crate::gateway::capabilities::DirectoryQuery;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelSyncReport {
    pub guilds: usize,
    pub channels: usize,
    /// Members fetched across all channels. They are not stored.
    pub members_seen: usize,
    /// Channels dropped because the directory no longer lists them.
    pub pruned: usize,
}

/// Full-traversal reconciliation of the mirror against the directory.
/// Runs are not serialized against each other; the later commit wins.
#[derive(Clone)]
pub struct SyncOrchestrator {
    directory: Arc<dyn DirectoryQuery>,
    mirror: Arc<StateMirror>,
}

impl SyncOrchestrator {
    pub fn new(directory: Arc<dyn DirectoryQuery>, mirror: Arc<StateMirror>) -> Self {
        Self { directory, mirror }
    }

    pub fn mirror(&self) -> &Arc<StateMirror> {
        &self.mirror
    }

    /// Replace the keyed guild map with the directory's guild set, then commit.
    pub async fn sync_guilds(&self) -> Result<usize, SyncError> {
        let guilds = self.directory.guilds().await?;
        let count = guilds.len();
        self.mirror.replace_guilds(guilds);
        self.mirror.commit().await?;
        info!(count, "synced guilds");
        Ok(count)
    }

    /// Walk every channel of every guild.
    ///
    /// Channels land in the mirror one at a time as the walk proceeds, so a
    /// reader can observe a half-populated map mid-run. Stale channels are
    /// pruned and the mirror committed only once the walk finishes. A
    /// directory failure stops the walk and leaves earlier upserts in place.
    pub async fn sync_all_channels(&self) -> Result<ChannelSyncReport, SyncError> {
        let guilds = self.directory.guilds().await?;
        let mut report = ChannelSyncReport {
            guilds: guilds.len(),
            ..Default::default()
        };
        let mut seen = HashSet::new();

        for guild in &guilds {
            let channels = self.directory.guild_channels(guild.id).await?;
            for channel in channels {
                let channel_id = channel.id;
                seen.insert(channel_id);
                self.mirror.upsert_channel(channel);
                report.channels += 1;

                // TODO: persist members once the mirror grows a per-channel member index.
                let members = self.directory.channel_members(channel_id).await?;
                debug!(channel_id, members = members.len(), "fetched channel members");
                report.members_seen += members.len();
            }
        }

        report.pruned = self.mirror.retain_channels(&seen);
        self.mirror.commit().await?;
        info!(
            guilds = report.guilds,
            channels = report.channels,
            members = report.members_seen,
            pruned = report.pruned,
            "synced all channels"
        );
        Ok(report)
    }

    /// Lighter pass: replace the flat guild list, then commit.
    pub async fn sync(&self) -> Result<usize, SyncError> {
        let guilds = self.directory.guilds().await?;
        let count = guilds.len();
        self.mirror.replace_guild_list(guilds);
        self.mirror.commit().await?;
        info!(count, "synced guild list");
        Ok(count)
    }
}
