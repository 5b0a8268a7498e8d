use std::collections::HashMap;

use uuid::Uuid;

use crate::api::error;
use crate::modules::interaction::model::PairScore;

/// Mirrored per-user sorted sets of interaction scores.
#[async_trait::async_trait]
pub trait ScoreStore: Send + Sync {
    /// Capped increment of both mirrored entries as one indivisible step.
    async fn increment_score(
        &self,
        user_a: &Uuid,
        user_b: &Uuid,
        delta: f64,
        cap: f64,
    ) -> Result<PairScore, error::SystemError>;

    /// Same as [`ScoreStore::increment_score`], but claims `event_id` inside the
    /// same atomic step. Returns `None` when the event was already applied.
    async fn increment_score_once(
        &self,
        user_a: &Uuid,
        user_b: &Uuid,
        delta: f64,
        cap: f64,
        event_id: &Uuid,
        marker_ttl_secs: u64,
    ) -> Result<Option<PairScore>, error::SystemError>;

    /// Candidates without a recorded score are omitted.
    async fn batch_get_scores(
        &self,
        user_id: &Uuid,
        candidate_ids: &[Uuid],
    ) -> Result<HashMap<Uuid, f64>, error::SystemError>;

    async fn score(&self, user_a: &Uuid, user_b: &Uuid) -> Result<Option<f64>, error::SystemError>;

    async fn delete_all_for_withdrawing_user(
        &self,
        affected_user_ids: &[Uuid],
        withdrawing_user_id: &Uuid,
    ) -> Result<(), error::SystemError>;

    /// Capped, mirrored increments for a chunk of source rows in one pipelined batch.
    async fn increment_pairs(
        &self,
        rows: &[(Uuid, Uuid)],
        delta: f64,
        cap: f64,
    ) -> Result<(), error::SystemError>;

    async fn wipe(&self, batch_size: usize) -> Result<usize, error::SystemError>;
}
