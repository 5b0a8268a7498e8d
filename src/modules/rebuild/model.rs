use std::fmt;

use serde::Serialize;

use crate::constants::{DEFAULT_REBUILD_CHUNK, DEFAULT_WIPE_BATCH};

/// `Idle → Wiping → RebuildingFriendships → RebuildingScores → Idle`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RebuildPhase {
    Idle,
    Wiping,
    RebuildingFriendships,
    RebuildingScores,
}

impl fmt::Display for RebuildPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RebuildPhase::Idle => "IDLE",
            RebuildPhase::Wiping => "WIPING",
            RebuildPhase::RebuildingFriendships => "REBUILDING_FRIENDSHIPS",
            RebuildPhase::RebuildingScores => "REBUILDING_SCORES",
        };
        f.write_str(name)
    }
}

/// Relational tables that feed interaction scores, in processing order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionSource {
    PostLike,
    Comment,
    CommentLike,
}

impl InteractionSource {
    pub const ALL: [InteractionSource; 3] =
        [InteractionSource::PostLike, InteractionSource::Comment, InteractionSource::CommentLike];
}

#[derive(Debug, Clone, Copy)]
pub struct RebuildConfig {
    pub wipe_batch_size: usize,
    pub chunk_size: usize,
}

impl Default for RebuildConfig {
    fn default() -> Self {
        Self { wipe_batch_size: DEFAULT_WIPE_BATCH, chunk_size: DEFAULT_REBUILD_CHUNK }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RebuildReport {
    pub keys_wiped: usize,
    /// Dead-letter records superseded by the rebuild.
    pub dlq_discarded: u64,
    pub friend_pairs: usize,
    pub score_rows_by_source: Vec<(InteractionSource, usize)>,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RebuildStateResponse {
    pub phase: RebuildPhase,
}
