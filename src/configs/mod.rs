use deadpool_redis::{Runtime, redis};
use sqlx::{PgPool, postgres::PgPoolOptions};

use crate::{api::error, constants::Env};

/// Keys fetched per SCAN round trip.
const SCAN_COUNT: usize = 500;

pub async fn connect_database(env: &Env) -> Result<PgPool, error::SystemError> {
    let pool = PgPoolOptions::new()
        .max_connections(env.database_max_connections)
        .min_connections(1)
        .acquire_slow_threshold(std::time::Duration::from_secs(3))
        .connect(&env.database_url)
        .await?;
    Ok(pool)
}

#[derive(Clone)]
pub struct RedisCache {
    pool: deadpool_redis::Pool,
}

impl RedisCache {
    pub async fn new(env: &Env) -> Result<Self, error::SystemError> {
        Self::from_url(&env.redis_url, env.redis_pool_size)
    }

    pub fn from_url(url: &str, pool_size: usize) -> Result<Self, error::SystemError> {
        let mut cfg = deadpool_redis::Config::from_url(url);
        cfg.pool = Some(deadpool_redis::PoolConfig { max_size: pool_size, ..Default::default() });
        let pool = cfg.create_pool(Some(Runtime::Tokio1))?;
        Ok(Self { pool })
    }

    pub async fn conn(&self) -> Result<deadpool_redis::Connection, error::SystemError> {
        Ok(self.pool.get().await?)
    }

    pub async fn ping(&self) -> Result<(), error::SystemError> {
        let mut conn = self.conn().await?;
        redis::cmd("PING").query_async::<String>(&mut *conn).await?;
        Ok(())
    }

    /// Enumerates every key starting with `prefix` using cursor-based SCAN.
    pub async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>, error::SystemError> {
        let mut conn = self.conn().await?;
        let pattern = format!("{prefix}*");
        let mut cursor: u64 = 0;
        let mut keys = Vec::new();

        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_COUNT)
                .query_async(&mut *conn)
                .await?;
            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }

        // SCAN may return a key more than once
        keys.sort_unstable();
        keys.dedup();
        Ok(keys)
    }

    /// Deletes every key under `prefix`, `batch_size` keys per DEL.
    /// Returns the number of keys removed.
    pub async fn wipe_prefix(
        &self,
        prefix: &str,
        batch_size: usize,
    ) -> Result<usize, error::SystemError> {
        let keys = self.scan_prefix(prefix).await?;
        if keys.is_empty() {
            return Ok(0);
        }

        let mut conn = self.conn().await?;
        let mut removed = 0usize;
        for batch in keys.chunks(batch_size.max(1)) {
            let deleted: usize = redis::cmd("DEL").arg(batch).query_async(&mut *conn).await?;
            removed += deleted;
        }

        tracing::debug!(prefix, scanned = keys.len(), removed, "namespace wiped");
        Ok(removed)
    }
}
