use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::constants::{DEFAULT_REPLAY_LIMIT, DEFAULT_REPLAY_MARKER_TTL};
use crate::modules::recovery::schema::FriendEventDlqEntity;

/// Result of an online cache mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum CacheWrite {
    Applied,
    /// The cache rejected the write; a dead-letter record will replay it.
    Queued { event_id: Uuid },
    /// Left for the next rebuild to reconcile.
    Stale,
}

#[derive(Debug, Clone, Copy)]
pub struct ReplayConfig {
    pub limit: i64,
    pub marker_ttl_secs: u64,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self { limit: DEFAULT_REPLAY_LIMIT, marker_ttl_secs: DEFAULT_REPLAY_MARKER_TTL }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReplayReport {
    pub fetched: usize,
    pub replayed: usize,
    pub failed: usize,
    /// Held back because an earlier event for the same pair failed in this run.
    pub deferred: usize,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct PendingQuery {
    #[validate(range(min = 1, max = 1000))]
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PendingResponse {
    pub total: i64,
    pub events: Vec<FriendEventDlqEntity>,
}
