use std::str::FromStr;

pub const FRIEND_KEY_PREFIX: &str = "friend:";
pub const INTERACTION_KEY_PREFIX: &str = "interaction:";
pub const REPLAY_MARKER_PREFIX: &str = "dlq_replayed:";

pub const DEFAULT_MAX_SCORE: f64 = 10.0;
pub const DEFAULT_SCORE_DELTA: f64 = 0.5;
pub const DEFAULT_WIPE_BATCH: usize = 100;
pub const DEFAULT_REBUILD_CHUNK: usize = 1000;
pub const DEFAULT_REPLAY_LIMIT: i64 = 500;
pub const DEFAULT_REPLAY_MARKER_TTL: u64 = 86_400;

pub struct Env {
    pub database_url: String,
    pub database_max_connections: u32,
    pub redis_url: String,
    pub redis_pool_size: usize,
    pub ip: String,
    pub port: u16,
    pub max_score: f64,
    pub default_delta: f64,
    pub rebuild_wipe_batch: usize,
    pub rebuild_chunk_size: usize,
    pub dlq_replay_limit: i64,
    pub dlq_replay_interval_secs: u64,
    pub replay_marker_ttl_secs: u64,
}

fn var_or<T>(name: &str, default: &str) -> T
where
    T: FromStr,
{
    std::env::var(name)
        .unwrap_or_else(|_| default.to_string())
        .parse::<T>()
        .unwrap_or_else(|_| panic!("{name} must be a valid {}", std::any::type_name::<T>()))
}

impl Env {
    fn new() -> Self {
        let database_url = std::env::var("DATABASE_URL")
            .expect("DATABASE_URL must be set in .env file or environment variable");
        let redis_url = std::env::var("REDIS_URL")
            .expect("REDIS_URL must be set in .env file or environment variable");

        let ip = std::env::var("IP").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = var_or::<u16>("PORT", "8080");

        let max_score = var_or::<f64>("MAX_SCORE", &DEFAULT_MAX_SCORE.to_string());
        let default_delta = var_or::<f64>("DEFAULT_DELTA", &DEFAULT_SCORE_DELTA.to_string());
        assert!(
            max_score > 0.0 && default_delta > 0.0,
            "MAX_SCORE and DEFAULT_DELTA must be positive"
        );

        Env {
            database_url,
            database_max_connections: var_or("DATABASE_MAX_CONNECTIONS", "5"),
            redis_url,
            redis_pool_size: var_or("REDIS_POOL_SIZE", "16"),
            ip,
            port,
            max_score,
            default_delta,
            rebuild_wipe_batch: var_or("REBUILD_WIPE_BATCH", &DEFAULT_WIPE_BATCH.to_string()),
            rebuild_chunk_size: var_or("REBUILD_CHUNK_SIZE", &DEFAULT_REBUILD_CHUNK.to_string()),
            dlq_replay_limit: var_or("DLQ_REPLAY_LIMIT", &DEFAULT_REPLAY_LIMIT.to_string()),
            dlq_replay_interval_secs: var_or("DLQ_REPLAY_INTERVAL_SECS", "60"),
            replay_marker_ttl_secs: var_or(
                "REPLAY_MARKER_TTL_SECS",
                &DEFAULT_REPLAY_MARKER_TTL.to_string(),
            ),
        }
    }
}

impl Default for Env {
    fn default() -> Self {
        Self::new()
    }
}
