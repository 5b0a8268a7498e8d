use std::collections::HashSet;
use std::sync::Arc;

use uuid::Uuid;

use crate::{
    api::error,
    modules::{
        friendship::repository::FriendshipStore,
        interaction::{model::ScoreConfig, repository::ScoreStore},
        recovery::{
            model::{CacheWrite, PendingResponse, ReplayConfig, ReplayReport},
            repository::FriendEventDlqRepository,
            schema::{FriendEventDlqEntity, FriendEventType, NewFriendEvent},
        },
    },
};

/// Records a cache mutation that failed so the recovery consumer can replay it.
///
/// Errors that are not cache failures are handed back untouched.
pub async fn queue_failed_write<D>(
    dlq: &D,
    event: NewFriendEvent,
    err: error::SystemError,
) -> Result<CacheWrite, error::SystemError>
where
    D: FriendEventDlqRepository + ?Sized,
{
    if !err.is_cache_failure() {
        return Err(err);
    }

    match dlq.enqueue(&event).await {
        Ok(event_id) => {
            tracing::warn!(
                event_id = %event_id,
                event_type = ?event.event_type,
                member_id = %event.member_id,
                target_id = %event.target_id,
                error = %err,
                "cache write failed, queued for replay"
            );
            Ok(CacheWrite::Queued { event_id })
        }
        Err(dlq_err) => {
            tracing::error!(
                event_type = ?event.event_type,
                member_id = %event.member_id,
                target_id = %event.target_id,
                cache_error = %err,
                error = %dlq_err,
                "cache write failed and could not be queued"
            );
            Err(dlq_err)
        }
    }
}

/// Recovery Queue Consumer
///
/// Drains the dead-letter queue and re-applies each record against the stores.
/// Delivery is at-least-once: a record is deleted only after it was applied,
/// and a record that fails again stays queued for the next run.
#[derive(Clone)]
pub struct RecoveryService<F, S, D>
where
    F: FriendshipStore + Send + Sync,
    S: ScoreStore + Send + Sync,
    D: FriendEventDlqRepository + Send + Sync,
{
    friendships: Arc<F>,
    scores: Arc<S>,
    dlq: Arc<D>,
    score_config: ScoreConfig,
    config: ReplayConfig,
}

impl<F, S, D> RecoveryService<F, S, D>
where
    F: FriendshipStore + Send + Sync,
    S: ScoreStore + Send + Sync,
    D: FriendEventDlqRepository + Send + Sync,
{
    pub fn with_dependencies(
        friendships: Arc<F>,
        scores: Arc<S>,
        dlq: Arc<D>,
        score_config: ScoreConfig,
        config: ReplayConfig,
    ) -> Self {
        RecoveryService { friendships, scores, dlq, score_config, config }
    }

    /// Replays up to `limit` pending records in enqueue order.
    ///
    /// Once a record for a pair fails, later records for the same pair are held
    /// back so add/remove sequences are never reordered. Only one drain runs at
    /// a time, and none while a rebuild holds the queue: `ReplayInProgress`.
    pub async fn replay_pending(&self) -> Result<ReplayReport, error::SystemError> {
        let Some(_lease) = self.dlq.try_lease().await? else {
            return Err(error::SystemError::ReplayInProgress);
        };

        let events = self.dlq.find_pending(self.config.limit).await?;
        let mut report = ReplayReport { fetched: events.len(), ..Default::default() };
        if events.is_empty() {
            return Ok(report);
        }

        let mut blocked: HashSet<(Uuid, Uuid)> = HashSet::new();

        for event in &events {
            let pair = event.pair();
            if blocked.contains(&pair) {
                report.deferred += 1;
                continue;
            }

            match self.apply(event).await {
                Ok(()) => {
                    report.replayed += 1;
                    // a record that survives here is replayed again, which is harmless
                    if let Err(e) = self.dlq.delete(&event.id).await {
                        tracing::error!(
                            event_id = %event.id,
                            error = %e,
                            "replayed event could not be removed from queue"
                        );
                    }
                }
                Err(e) => {
                    report.failed += 1;
                    blocked.insert(pair);
                    tracing::warn!(
                        event_id = %event.id,
                        event_type = ?event.event_type,
                        attempts = event.attempts + 1,
                        error = %e,
                        "replay failed, event stays queued"
                    );
                    if let Err(mark_err) = self.dlq.mark_failed(&event.id, &e.to_string()).await {
                        tracing::error!(
                            event_id = %event.id,
                            error = %mark_err,
                            "could not record replay failure"
                        );
                    }
                }
            }
        }

        tracing::info!(
            fetched = report.fetched,
            replayed = report.replayed,
            failed = report.failed,
            deferred = report.deferred,
            "dead-letter replay finished"
        );
        Ok(report)
    }

    pub async fn pending(&self, limit: i64) -> Result<PendingResponse, error::SystemError> {
        let (total, events) =
            tokio::try_join!(self.dlq.count_pending(), self.dlq.find_pending(limit))?;
        Ok(PendingResponse { total, events })
    }

    async fn apply(&self, event: &FriendEventDlqEntity) -> Result<(), error::SystemError> {
        match event.event_type {
            FriendEventType::FriendAdd => {
                self.friendships.add_friend(&event.member_id, &event.target_id).await
            }
            FriendEventType::FriendRemove => {
                self.friendships.remove_friend(&event.member_id, &event.target_id).await
            }
            FriendEventType::ScoreUp => {
                let delta = event.score_delta.unwrap_or(self.score_config.delta);
                let applied = self
                    .scores
                    .increment_score_once(
                        &event.member_id,
                        &event.target_id,
                        delta,
                        self.score_config.cap,
                        &event.id,
                        self.config.marker_ttl_secs,
                    )
                    .await?;
                if applied.is_none() {
                    tracing::debug!(event_id = %event.id, "score event already applied");
                }
                Ok(())
            }
        }
    }
}
