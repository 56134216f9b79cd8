use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use tracing::info;

use super::pool::{create_pool, run_migrations};
use crate::engine::state_mirror::{MemoryStateStore, MirrorSnapshot, StateStore};
use crate::error::StoreError;

/// Commit log rows kept after each save; older rows are pruned.
pub const COMMIT_LOG_LIMIT: i64 = 500;

/// Stores the latest mirror snapshot as JSON in `mirror_snapshots`.
#[derive(Clone)]
pub struct SqliteStateStore {
    pool: SqlitePool,
    commit_log_limit: i64,
}

impl SqliteStateStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            commit_log_limit: COMMIT_LOG_LIMIT,
        }
    }

    pub fn with_commit_log_limit(mut self, limit: i64) -> Self {
        self.commit_log_limit = limit.max(1);
        self
    }

    /// Number of commits recorded so far.
    pub async fn commit_count(&self) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM mirror_commits")
            .fetch_one(&self.pool)
            .await
    }
}

#[async_trait]
impl StateStore for SqliteStateStore {
    async fn save(&self, snapshot: &MirrorSnapshot) -> Result<(), StoreError> {
        let content = serde_json::to_string(snapshot)?;
        let now = Utc::now().to_rfc3339();
        let guilds = snapshot.guilds.len() as i64;
        let channels = snapshot.channels.len() as i64;
        let users = snapshot.users.len() as i64;

        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO mirror_snapshots (id, content, guild_count, channel_count, user_count, committed_at)
             VALUES (1, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                content = excluded.content,
                guild_count = excluded.guild_count,
                channel_count = excluded.channel_count,
                user_count = excluded.user_count,
                committed_at = excluded.committed_at",
        )
        .bind(&content)
        .bind(guilds)
        .bind(channels)
        .bind(users)
        .bind(&now)
        .execute(&mut *tx)
        .await?;
        sqlx::query(
            "INSERT INTO mirror_commits (guild_count, channel_count, user_count, committed_at)
             VALUES (?, ?, ?, ?)",
        )
        .bind(guilds)
        .bind(channels)
        .bind(users)
        .bind(&now)
        .execute(&mut *tx)
        .await?;
        sqlx::query(
            "DELETE FROM mirror_commits WHERE id NOT IN
                (SELECT id FROM mirror_commits ORDER BY id DESC LIMIT ?)",
        )
        .bind(self.commit_log_limit)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn load(&self) -> Result<Option<MirrorSnapshot>, StoreError> {
        let content: Option<String> =
            sqlx::query_scalar("SELECT content FROM mirror_snapshots WHERE id = 1")
                .fetch_optional(&self.pool)
                .await?;
        match content {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }
}

/// Open the snapshot store for a run. `None` keeps snapshots in memory only,
/// so nothing survives a restart.
pub async fn open_state_store(
    database_url: Option<&str>,
) -> Result<Box<dyn StateStore>, sqlx::Error> {
    let Some(url) = database_url else {
        info!("database disabled, mirror snapshots kept in memory");
        return Ok(Box::new(MemoryStateStore::new()));
    };
    let pool = create_pool(url).await?;
    run_migrations(&pool).await?;
    Ok(Box::new(SqliteStateStore::new(pool)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::state_mirror::StateMirror;
    use crate::engine::state_mirror::tests::{channel, guild};
    use crate::gateway::types::UserRecord;

    async fn setup_store() -> SqliteStateStore {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        SqliteStateStore::new(pool)
    }

    #[tokio::test]
    async fn test_load_empty() {
        let store = setup_store().await;
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_replaces_previous_snapshot() {
        let store = setup_store().await;

        let mut first = MirrorSnapshot::default();
        first.guilds.insert(1, guild(1, "a"));
        store.save(&first).await.unwrap();

        let mut second = MirrorSnapshot::default();
        second.guilds.insert(2, guild(2, "b"));
        second.channels.insert(10, channel(10, 2, "general"));
        store.save(&second).await.unwrap();

        assert_eq!(store.load().await.unwrap(), Some(second));
        assert_eq!(store.commit_count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_commit_log_is_pruned_to_limit() {
        let store = setup_store().await.with_commit_log_limit(3);

        for id in 1..=5 {
            let mut snapshot = MirrorSnapshot::default();
            snapshot.guilds.insert(id, guild(id, "g"));
            store.save(&snapshot).await.unwrap();
        }

        assert_eq!(store.commit_count().await.unwrap(), 3);
        let oldest: i64 = sqlx::query_scalar("SELECT MIN(id) FROM mirror_commits")
            .fetch_one(&store.pool)
            .await
            .unwrap();
        assert_eq!(oldest, 3);
        assert_eq!(store.load().await.unwrap().unwrap().guilds.len(), 1);
    }

    #[tokio::test]
    async fn test_mirror_restores_from_sqlite() {
        let store = setup_store().await;

        let mirror = StateMirror::new(Box::new(store.clone()));
        mirror.replace_guilds(vec![guild(1, "a"), guild(2, "b")]);
        mirror.replace_guild_list(vec![guild(1, "a")]);
        mirror.upsert_channel(channel(10, 1, "general"));
        mirror.upsert_user(UserRecord {
            id: 42,
            username: "alice".into(),
            bot: false,
        });
        mirror.commit().await.unwrap();

        let restored = StateMirror::new(Box::new(store));
        assert!(restored.restore().await.unwrap());
        assert_eq!(restored.snapshot(), mirror.snapshot());
    }

    #[tokio::test]
    async fn test_open_state_store_without_database_is_in_memory() {
        let store = open_state_store(None).await.unwrap();
        assert!(store.load().await.unwrap().is_none());

        let mut snapshot = MirrorSnapshot::default();
        snapshot.guilds.insert(1, guild(1, "a"));
        store.save(&snapshot).await.unwrap();
        assert_eq!(store.load().await.unwrap(), Some(snapshot));
    }

    #[tokio::test]
    async fn test_open_state_store_with_database_runs_migrations() {
        let store = open_state_store(Some("sqlite::memory:")).await.unwrap();
        assert!(store.load().await.unwrap().is_none());
        store.save(&MirrorSnapshot::default()).await.unwrap();
        assert_eq!(store.load().await.unwrap(), Some(MirrorSnapshot::default()));
    }
}
