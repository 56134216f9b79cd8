use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::StoreError;
use crate::gateway::types::{ChannelRecord, GuildRecord, UserRecord};

/// Content written by `sync`, kept apart from the keyed guild map.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MirrorContent {
    pub guilds: Vec<GuildRecord>,
}

/// Point-in-time copy of the whole mirror, as persisted by `commit`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MirrorSnapshot {
    pub channels: BTreeMap<u64, ChannelRecord>,
    pub guilds: BTreeMap<u64, GuildRecord>,
    pub users: BTreeMap<u64, UserRecord>,
    pub content: MirrorContent,
}

/// Persistence capability for mirror snapshots.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn save(&self, snapshot: &MirrorSnapshot) -> Result<(), StoreError>;
    async fn load(&self) -> Result<Option<MirrorSnapshot>, StoreError>;
}

/// Keeps the last committed snapshot in memory.
#[derive(Default)]
pub struct MemoryStateStore {
    last: Mutex<Option<MirrorSnapshot>>,
    commits: Mutex<u64>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last(&self) -> Option<MirrorSnapshot> {
        self.last.lock().unwrap().clone()
    }

    pub fn commit_count(&self) -> u64 {
        *self.commits.lock().unwrap()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn save(&self, snapshot: &MirrorSnapshot) -> Result<(), StoreError> {
        *self.last.lock().unwrap() = Some(snapshot.clone());
        *self.commits.lock().unwrap() += 1;
        Ok(())
    }

    async fn load(&self) -> Result<Option<MirrorSnapshot>, StoreError> {
        Ok(self.last())
    }
}

/// Local mirror of the Discord directory: keyed guilds, channels and users
/// plus the flat guild list written by `sync`. Records are replaced whole
/// per key, never patched field by field.
pub struct StateMirror {
    /// Keyed guild map; swapped whole by `replace_guilds`.
    guilds: RwLock<HashMap<u64, GuildRecord>>,
    /// Flat guild list; swapped whole by `replace_guild_list`.
    guild_list: RwLock<Vec<GuildRecord>>,
    /// Keyed channel map; written per entry during a channel traversal.
    channels: DashMap<u64, ChannelRecord>,
    users: DashMap<u64, UserRecord>,
    last_commit: RwLock<Option<DateTime<Utc>>>,
    store: Box<dyn StateStore>,
}

impl StateMirror {
    pub fn new(store: Box<dyn StateStore>) -> Self {
        Self {
            guilds: RwLock::new(HashMap::new()),
            guild_list: RwLock::new(Vec::new()),
            channels: DashMap::new(),
            users: DashMap::new(),
            last_commit: RwLock::new(None),
            store,
        }
    }

    // ── Reads ───────────────────────────────────────────────────────

    pub fn guild(&self, id: u64) -> Option<GuildRecord> {
        self.guilds.read().unwrap().get(&id).cloned()
    }

    pub fn guilds(&self) -> Vec<GuildRecord> {
        let mut all: Vec<_> = self.guilds.read().unwrap().values().cloned().collect();
        all.sort_by_key(|g| g.id);
        all
    }

    pub fn guild_count(&self) -> usize {
        self.guilds.read().unwrap().len()
    }

    pub fn guild_list(&self) -> Vec<GuildRecord> {
        self.guild_list.read().unwrap().clone()
    }

    pub fn channel(&self, id: u64) -> Option<ChannelRecord> {
        self.channels.get(&id).map(|c| c.clone())
    }

    /// All mirrored channels, ordered by id.
    pub fn channels(&self) -> Vec<ChannelRecord> {
        let mut all: Vec<_> = self.channels.iter().map(|c| c.value().clone()).collect();
        all.sort_by_key(|c| c.id);
        all
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn user(&self, id: u64) -> Option<UserRecord> {
        self.users.get(&id).map(|u| u.clone())
    }

    /// All mirrored users, ordered by id.
    pub fn users(&self) -> Vec<UserRecord> {
        let mut all: Vec<_> = self.users.iter().map(|u| u.value().clone()).collect();
        all.sort_by_key(|u| u.id);
        all
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    pub fn last_commit(&self) -> Option<DateTime<Utc>> {
        *self.last_commit.read().unwrap()
    }

    pub fn snapshot(&self) -> MirrorSnapshot {
        MirrorSnapshot {
            channels: self
                .channels
                .iter()
                .map(|c| (*c.key(), c.value().clone()))
                .collect(),
            guilds: self
                .guilds
                .read()
                .unwrap()
                .iter()
                .map(|(id, g)| (*id, g.clone()))
                .collect(),
            users: self
                .users
                .iter()
                .map(|u| (*u.key(), u.value().clone()))
                .collect(),
            content: MirrorContent {
                guilds: self.guild_list(),
            },
        }
    }

    // ── Writes ──────────────────────────────────────────────────────

    /// Swap in a complete guild set. Guilds absent from `guilds` are gone
    /// afterwards.
    pub fn replace_guilds(&self, guilds: Vec<GuildRecord>) {
        let keyed: HashMap<u64, GuildRecord> = guilds.into_iter().map(|g| (g.id, g)).collect();
        *self.guilds.write().unwrap() = keyed;
    }

    pub fn replace_guild_list(&self, guilds: Vec<GuildRecord>) {
        *self.guild_list.write().unwrap() = guilds;
    }

    pub fn upsert_channel(&self, channel: ChannelRecord) {
        self.channels.insert(channel.id, channel);
    }

    /// Drop every channel whose id is not in `keep`. Returns how many went.
    pub fn retain_channels(&self, keep: &HashSet<u64>) -> usize {
        let before = self.channels.len();
        self.channels.retain(|id, _| keep.contains(id));
        before - self.channels.len()
    }

    pub fn upsert_user(&self, user: UserRecord) {
        self.users.insert(user.id, user);
    }

    // ── Persistence ─────────────────────────────────────────────────

    /// Persist the current in-memory state.
    pub async fn commit(&self) -> Result<(), StoreError> {
        let snapshot = self.snapshot();
        self.store.save(&snapshot).await?;
        *self.last_commit.write().unwrap() = Some(Utc::now());
        debug!(
            guilds = snapshot.guilds.len(),
            channels = snapshot.channels.len(),
            users = snapshot.users.len(),
            "state mirror committed"
        );
        Ok(())
    }

    /// Seed the mirror from the last committed snapshot, if any.
    pub async fn restore(&self) -> Result<bool, StoreError> {
        let Some(snapshot) = self.store.load().await? else {
            return Ok(false);
        };

        self.replace_guilds(snapshot.guilds.into_values().collect());
        self.replace_guild_list(snapshot.content.guilds);
        self.channels.clear();
        for (_, ch) in snapshot.channels {
            self.upsert_channel(ch);
        }
        self.users.clear();
        for (_, u) in snapshot.users {
            self.upsert_user(u);
        }

        info!(
            guilds = self.guild_count(),
            channels = self.channel_count(),
            users = self.user_count(),
            "restored state mirror from snapshot"
        );
        Ok(true)
    }
}
