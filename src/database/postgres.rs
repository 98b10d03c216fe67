//! PostgreSQL storage backed by a deadpool connection pool.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use deadpool_postgres::{Config, ManagerConfig, Pool, PoolConfig, RecyclingMethod, Runtime, Timeouts};
use tokio_postgres::NoTls;
use tokio_postgres::types::Json;
use tracing::{debug, info, warn};

use super::models::{Dictionary, GuildSettings, UserVoiceProfile};
use super::schema;
use super::storage::Storage;
use crate::error::{FeedError, StorageResult};

/// Connection settings for the relational store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbConfig {
    pub host: String,
    pub port: u16,
    pub dbname: String,
    pub user: String,
    pub password: String,
    /// Maximum pool size
    pub max_size: usize,
    /// Wait/create timeout for pooled connections
    pub timeout: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            dbname: "postgres".to_string(),
            user: "postgres".to_string(),
            password: String::new(),
            max_size: 10,
            timeout: Duration::from_secs(30),
        }
    }
}

impl DbConfig {
    fn pool_config(&self) -> Config {
        let mut cfg = Config::new();
        cfg.host = Some(self.host.clone());
        cfg.port = Some(self.port);
        cfg.dbname = Some(self.dbname.clone());
        cfg.user = Some(self.user.clone());
        cfg.password = Some(self.password.clone());
        cfg.connect_timeout = Some(self.timeout);
        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });
        cfg.pool = Some(PoolConfig {
            max_size: self.max_size,
            timeouts: Timeouts {
                wait: Some(self.timeout),
                create: Some(self.timeout),
                recycle: Some(self.timeout),
            },
            ..Default::default()
        });
        cfg
    }

    /// Settings for a standalone (non-pooled) connection, used by the change feed.
    pub fn pg_config(&self) -> Result<tokio_postgres::Config, FeedError> {
        Ok(self.pool_config().get_pg_config()?)
    }

    /// Create a connection pool from this configuration.
    pub fn create_pool(&self) -> StorageResult<Pool> {
        Ok(self.pool_config().create_pool(Some(Runtime::Tokio1), NoTls)?)
    }
}

/// Database wrapper for PostgreSQL operations.
#[derive(Clone)]
pub struct Database {
    pool: Pool,
}

impl Database {
    /// Create the pool and verify that the server answers.
    ///
    /// # Errors
    /// Returns error if the pool cannot be built or the ping fails.
    pub async fn connect(config: &DbConfig) -> StorageResult<Self> {
        let pool = config.create_pool()?;

        let client = pool.get().await?;
        client.simple_query("SELECT 1").await?;

        info!(
            "Successfully connected to PostgreSQL at {}:{}/{}",
            config.host, config.port, config.dbname
        );

        Ok(Self { pool })
    }

    /// Create tables and the notification triggers for `channel`.
    pub async fn init_schema(&self, channel: &str) -> StorageResult<()> {
        let client = self.pool.get().await?;
        for statement in schema::TABLES {
            client.batch_execute(statement).await?;
        }
        client.batch_execute(&schema::notify_triggers(channel)).await?;
        info!("Database schema and notify triggers initialized (channel '{}')", channel);
        Ok(())
    }
}

/// Decode a JSON column, falling back to defaults on malformed documents.
fn decode_or_default<T: Default>(row: &tokio_postgres::Row, column: &str, entity: &str, id: i64) -> T
where
    T: serde::de::DeserializeOwned,
{
    match row.try_get::<_, Json<T>>(column) {
        Ok(Json(value)) => value,
        Err(e) => {
            warn!("Malformed {} row for {}, using defaults: {}", entity, id, e);
            T::default()
        }
    }
}

fn profile_from_row(row: &tokio_postgres::Row) -> StorageResult<UserVoiceProfile> {
    Ok(UserVoiceProfile {
        voice: row.try_get("speaker")?,
        speed: row.try_get("speed")?,
        pitch: row.try_get("pitch")?,
    })
}

#[async_trait]
impl Storage for Database {
    async fn fetch_guild_settings(&self, guild_id: i64) -> StorageResult<Option<GuildSettings>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt("SELECT settings FROM guild_settings WHERE guild_id = $1", &[&guild_id])
            .await?;
        debug!("DB get guild settings for {}: {:?}", guild_id, row.is_some());
        Ok(row.map(|row| decode_or_default(&row, "settings", "guild_settings", guild_id)))
    }

    async fn store_guild_settings(&self, guild_id: i64, settings: &GuildSettings) -> StorageResult<()> {
        let client = self.pool.get().await?;
        client
            .execute(
                "INSERT INTO guild_settings (guild_id, settings) VALUES ($1, $2)
                 ON CONFLICT (guild_id) DO UPDATE SET settings = EXCLUDED.settings",
                &[&guild_id, &Json(settings)],
            )
            .await?;
        debug!("Saved guild settings for {}", guild_id);
        Ok(())
    }

    async fn fetch_all_guild_settings(&self) -> StorageResult<Vec<(i64, GuildSettings)>> {
        let client = self.pool.get().await?;
        let rows = client
            .query("SELECT guild_id, settings FROM guild_settings", &[])
            .await?;

        let mut all = Vec::with_capacity(rows.len());
        for row in rows {
            let guild_id: i64 = row.try_get("guild_id")?;
            all.push((guild_id, decode_or_default(&row, "settings", "guild_settings", guild_id)));
        }
        Ok(all)
    }

    async fn fetch_user_profile(&self, user_id: i64) -> StorageResult<Option<UserVoiceProfile>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                "SELECT speaker, speed, pitch FROM user_settings WHERE user_id = $1",
                &[&user_id],
            )
            .await?;
        row.as_ref().map(profile_from_row).transpose()
    }

    async fn store_user_profile(&self, user_id: i64, profile: &UserVoiceProfile) -> StorageResult<()> {
        let client = self.pool.get().await?;
        client
            .execute(
                "INSERT INTO user_settings (user_id, speaker, speed, pitch) VALUES ($1, $2, $3, $4)
                 ON CONFLICT (user_id) DO UPDATE SET speaker = EXCLUDED.speaker,
                                                     speed   = EXCLUDED.speed,
                                                     pitch   = EXCLUDED.pitch",
                &[&user_id, &profile.voice, &profile.speed, &profile.pitch],
            )
            .await?;
        debug!("Saved user profile for {}", user_id);
        Ok(())
    }

    async fn fetch_all_user_profiles(&self) -> StorageResult<Vec<(i64, UserVoiceProfile)>> {
        let client = self.pool.get().await?;
        let rows = client
            .query("SELECT user_id, speaker, speed, pitch FROM user_settings", &[])
            .await?;

        rows.iter()
            .map(|row| -> StorageResult<(i64, UserVoiceProfile)> {
                Ok((row.try_get("user_id")?, profile_from_row(row)?))
            })
            .collect()
    }

    async fn fetch_dictionary(&self, owner_id: i64) -> StorageResult<Option<Dictionary>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt("SELECT dict FROM dict WHERE guild_id = $1", &[&owner_id])
            .await?;
        debug!("DB get dictionary for {}: {:?}", owner_id, row.is_some());
        Ok(row.map(|row| decode_or_default(&row, "dict", "dict", owner_id)))
    }

    async fn store_dictionary(&self, owner_id: i64, dictionary: &Dictionary) -> StorageResult<()> {
        let client = self.pool.get().await?;
        client
            .execute(
                "INSERT INTO dict (guild_id, dict) VALUES ($1, $2)
                 ON CONFLICT (guild_id) DO UPDATE SET dict = EXCLUDED.dict",
                &[&owner_id, &Json(dictionary)],
            )
            .await?;
        debug!("Saved dictionary for {} ({} entries)", owner_id, dictionary.len());
        Ok(())
    }

    async fn fetch_boost_count(&self, guild_id: i64) -> StorageResult<i64> {
        let client = self.pool.get().await?;
        let row = client
            .query_one("SELECT COUNT(*) FROM guild_boosts WHERE guild_id = $1", &[&guild_id])
            .await?;
        Ok(row.try_get(0)?)
    }

    async fn fetch_boost_counts(&self) -> StorageResult<HashMap<i64, i64>> {
        let client = self.pool.get().await?;
        let rows = client
            .query("SELECT guild_id, COUNT(*) AS count FROM guild_boosts GROUP BY guild_id", &[])
            .await?;

        rows.iter()
            .map(|row| -> StorageResult<(i64, i64)> {
                Ok((row.try_get("guild_id")?, row.try_get("count")?))
            })
            .collect()
    }

    async fn grant_boost(&self, guild_id: i64, user_id: i64) -> StorageResult<i64> {
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;
        tx.execute(
            "INSERT INTO guild_boosts (guild_id, user_id) VALUES ($1, $2)",
            &[&guild_id, &user_id],
        )
        .await?;
        let count: i64 = tx
            .query_one("SELECT COUNT(*) FROM guild_boosts WHERE guild_id = $1", &[&guild_id])
            .await?
            .try_get(0)?;
        tx.commit().await?;

        info!("User {} boosted guild {} (now {})", user_id, guild_id, count);
        Ok(count)
    }

    async fn revoke_boost(&self, guild_id: i64, user_id: i64) -> StorageResult<Option<i64>> {
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;
        let deleted = tx
            .execute(
                "DELETE FROM guild_boosts WHERE id = (
                     SELECT id FROM guild_boosts WHERE guild_id = $1 AND user_id = $2
                     LIMIT 1 FOR UPDATE
                 )",
                &[&guild_id, &user_id],
            )
            .await?;
        if deleted == 0 {
            tx.rollback().await?;
            return Ok(None);
        }
        let count: i64 = tx
            .query_one("SELECT COUNT(*) FROM guild_boosts WHERE guild_id = $1", &[&guild_id])
            .await?
            .try_get(0)?;
        tx.commit().await?;

        info!("User {} unboosted guild {} (now {})", user_id, guild_id, count);
        Ok(Some(count))
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let status = self.pool.status();
        f.debug_struct("Database")
            .field("pool_size", &status.size)
            .field("pool_available", &status.available)
            .finish()
    }
}
