use std::collections::HashMap;
use std::sync::Arc;

use uuid::Uuid;

use crate::{
    api::error,
    modules::{
        interaction::{model::ScoreConfig, repository::ScoreStore},
        recovery::{
            model::CacheWrite, repository::FriendEventDlqRepository, schema::NewFriendEvent,
            service::queue_failed_write,
        },
    },
};

/// Interaction score service
///
/// Entry point for qualifying interactions (message sent, post liked, comment
/// posted, comment liked). Each one is a plain increment request; the owning
/// domain decides what qualifies.
#[derive(Clone)]
pub struct InteractionService<S, D>
where
    S: ScoreStore + Send + Sync,
    D: FriendEventDlqRepository + Send + Sync,
{
    store: Arc<S>,
    dlq: Arc<D>,
    config: ScoreConfig,
}

impl<S, D> InteractionService<S, D>
where
    S: ScoreStore + Send + Sync,
    D: FriendEventDlqRepository + Send + Sync,
{
    pub fn with_dependencies(store: Arc<S>, dlq: Arc<D>, config: ScoreConfig) -> Self {
        InteractionService { store, dlq, config }
    }

    pub async fn increment_score(
        &self,
        user_a: Uuid,
        user_b: Uuid,
    ) -> Result<CacheWrite, error::SystemError> {
        self.increment_score_by(user_a, user_b, self.config.delta).await
    }

    pub async fn increment_score_by(
        &self,
        user_a: Uuid,
        user_b: Uuid,
        delta: f64,
    ) -> Result<CacheWrite, error::SystemError> {
        if user_a == user_b {
            return Err(error::SystemError::bad_request(
                "Cannot score an interaction with yourself",
            ));
        }
        if !(delta.is_finite() && delta > 0.0) {
            return Err(error::SystemError::bad_request("Score delta must be positive"));
        }

        match self.store.increment_score(&user_a, &user_b, delta, self.config.cap).await {
            Ok(score) => {
                tracing::trace!(
                    user_a = %user_a,
                    user_b = %user_b,
                    score = score.forward,
                    "score incremented"
                );
                Ok(CacheWrite::Applied)
            }
            Err(e) => {
                queue_failed_write(
                    self.dlq.as_ref(),
                    NewFriendEvent::score_up(user_a, user_b, delta),
                    e,
                )
                .await
            }
        }
    }

    /// Lookup failures are returned as [`error::SystemError::ReadFailure`]; reads
    /// are never queued.
    pub async fn batch_get_scores(
        &self,
        user_id: Uuid,
        candidate_ids: &[Uuid],
    ) -> Result<HashMap<Uuid, f64>, error::SystemError> {
        self.store.batch_get_scores(&user_id, candidate_ids).await.inspect_err(|e| {
            tracing::warn!(
                user_id = %user_id,
                candidates = candidate_ids.len(),
                error = %e,
                "batch score lookup failed"
            );
        })
    }

    pub async fn score(&self, user_a: Uuid, user_b: Uuid) -> Result<f64, error::SystemError> {
        Ok(self.store.score(&user_a, &user_b).await?.unwrap_or(0.0))
    }

    pub async fn delete_all_for_withdrawing_user(
        &self,
        affected_user_ids: &[Uuid],
        withdrawing_user_id: Uuid,
    ) -> Result<CacheWrite, error::SystemError> {
        match self
            .store
            .delete_all_for_withdrawing_user(affected_user_ids, &withdrawing_user_id)
            .await
        {
            Ok(()) => Ok(CacheWrite::Applied),
            Err(e) if e.is_cache_failure() => {
                tracing::warn!(
                    user_id = %withdrawing_user_id,
                    affected = affected_user_ids.len(),
                    error = %e,
                    "score cleanup for withdrawn user left stale entries"
                );
                Ok(CacheWrite::Stale)
            }
            Err(e) => Err(e),
        }
    }
}
