//! Rebuild Pipeline
//!
//! Reconstructs both cache views from the relational store:
//! 1. Wipe every friend-set and interaction-set key (batched deletes)
//! 2. Re-insert mirrored friendships, one pipelined batch per page
//! 3. Re-apply interaction rows per source, one pipelined batch per page
//!
//! Scores go through the same capped, mirrored increment as the live path, so a
//! rebuild lands on exactly the state live traffic would have produced.
//! The cache must not be served while a rebuild runs.
//!
//! A run holds the dead-letter lease from start to finish. Records queued
//! before the wipe describe writes the relational store already has, so they
//! are discarded instead of being replayed on top of the rebuilt state.
use std::sync::{Arc, Mutex};
use std::time::Instant;

use uuid::Uuid;

use crate::{
    api::error,
    modules::{
        friendship::repository::FriendshipStore,
        interaction::{model::ScoreConfig, repository::ScoreStore},
        rebuild::{
            model::{InteractionSource, RebuildConfig, RebuildPhase, RebuildReport},
            repository::RebuildSource,
        },
        recovery::repository::FriendEventDlqRepository,
    },
};

#[derive(Clone)]
pub struct RebuildService<F, S, R, D>
where
    F: FriendshipStore + Send + Sync,
    S: ScoreStore + Send + Sync,
    R: RebuildSource + Send + Sync,
    D: FriendEventDlqRepository + Send + Sync,
{
    friendships: Arc<F>,
    scores: Arc<S>,
    source: Arc<R>,
    dlq: Arc<D>,
    score_config: ScoreConfig,
    config: RebuildConfig,
    phase: Arc<Mutex<RebuildPhase>>,
}

/// Returns the pipeline to `Idle` however the run ends, including cancellation.
struct RunGuard<'a> {
    phase: &'a Mutex<RebuildPhase>,
}

impl RunGuard<'_> {
    fn enter(&self, next: RebuildPhase) {
        *self.phase.lock().unwrap_or_else(|p| p.into_inner()) = next;
        tracing::info!(phase = %next, "rebuild phase started");
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        *self.phase.lock().unwrap_or_else(|p| p.into_inner()) = RebuildPhase::Idle;
    }
}

fn failed_in(phase: RebuildPhase) -> impl FnOnce(error::SystemError) -> error::SystemError {
    move |source| error::SystemError::RebuildPhaseFailure { phase, source: Box::new(source) }
}

impl<F, S, R, D> RebuildService<F, S, R, D>
where
    F: FriendshipStore + Send + Sync,
    S: ScoreStore + Send + Sync,
    R: RebuildSource + Send + Sync,
    D: FriendEventDlqRepository + Send + Sync,
{
    pub fn with_dependencies(
        friendships: Arc<F>,
        scores: Arc<S>,
        source: Arc<R>,
        dlq: Arc<D>,
        score_config: ScoreConfig,
        config: RebuildConfig,
    ) -> Self {
        RebuildService {
            friendships,
            scores,
            source,
            dlq,
            score_config,
            config,
            phase: Arc::new(Mutex::new(RebuildPhase::Idle)),
        }
    }

    pub fn state(&self) -> RebuildPhase {
        *self.phase.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn begin(&self) -> Result<RunGuard<'_>, error::SystemError> {
        let mut phase = self.phase.lock().unwrap_or_else(|p| p.into_inner());
        if *phase != RebuildPhase::Idle {
            return Err(error::SystemError::RebuildInProgress(*phase));
        }
        *phase = RebuildPhase::Wiping;
        Ok(RunGuard { phase: &self.phase })
    }

    /// Runs wipe, friendship and score phases in that order. Any failure aborts
    /// the run; re-running from the start is always safe.
    pub async fn run_rebuild(&self) -> Result<RebuildReport, error::SystemError> {
        let guard = self.begin()?;
        let started_at = Instant::now();

        let result = self.run_phases(&guard).await;
        drop(guard);

        match result {
            Ok(mut report) => {
                report.elapsed_ms = started_at.elapsed().as_millis() as u64;
                tracing::info!(
                    keys_wiped = report.keys_wiped,
                    dlq_discarded = report.dlq_discarded,
                    friend_pairs = report.friend_pairs,
                    elapsed_ms = report.elapsed_ms,
                    "cache rebuild finished"
                );
                Ok(report)
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    elapsed_ms = started_at.elapsed().as_millis() as u64,
                    "cache rebuild aborted"
                );
                Err(e)
            }
        }
    }

    async fn run_phases(&self, guard: &RunGuard<'_>) -> Result<RebuildReport, error::SystemError> {
        let mut report = RebuildReport::default();

        guard.enter(RebuildPhase::Wiping);
        // waits out a replay in flight; replays started later are refused
        let _lease = self.dlq.lease().await.map_err(failed_in(RebuildPhase::Wiping))?;
        let cutoff = chrono::Utc::now();
        report.keys_wiped = self.wipe().await.map_err(failed_in(RebuildPhase::Wiping))?;
        report.dlq_discarded = self
            .dlq
            .delete_enqueued_before(cutoff)
            .await
            .map_err(failed_in(RebuildPhase::Wiping))?;

        guard.enter(RebuildPhase::RebuildingFriendships);
        report.friend_pairs = self
            .rebuild_friendships()
            .await
            .map_err(failed_in(RebuildPhase::RebuildingFriendships))?;

        guard.enter(RebuildPhase::RebuildingScores);
        for source in InteractionSource::ALL {
            let rows = self
                .rebuild_scores(source)
                .await
                .map_err(failed_in(RebuildPhase::RebuildingScores))?;
            tracing::info!(source = ?source, rows, "interaction source replayed");
            report.score_rows_by_source.push((source, rows));
        }

        Ok(report)
    }

    async fn wipe(&self) -> Result<usize, error::SystemError> {
        let batch = self.config.wipe_batch_size;
        let friends = self.friendships.wipe(batch).await?;
        let scores = self.scores.wipe(batch).await?;
        Ok(friends + scores)
    }

    async fn rebuild_friendships(&self) -> Result<usize, error::SystemError> {
        let limit = self.config.chunk_size.max(1) as i64;
        let mut offset = 0i64;
        let mut total = 0usize;

        loop {
            let page = self.source.friend_edges(offset, limit).await?;
            let fetched = page.len();
            let pairs: Vec<(Uuid, Uuid)> = page.into_iter().filter(|(a, b)| a != b).collect();
            self.friendships.insert_pairs(&pairs).await?;
            total += pairs.len();

            if (fetched as i64) < limit {
                break;
            }
            offset += fetched as i64;
        }

        Ok(total)
    }

    async fn rebuild_scores(&self, source: InteractionSource) -> Result<usize, error::SystemError> {
        let limit = self.config.chunk_size.max(1) as i64;
        let ScoreConfig { delta, cap } = self.score_config;
        let mut offset = 0i64;
        let mut total = 0usize;

        loop {
            let page = self.source.interactions(source, offset, limit).await?;
            let fetched = page.len();
            let rows: Vec<(Uuid, Uuid)> = page.into_iter().filter(|(a, b)| a != b).collect();
            self.scores.increment_pairs(&rows, delta, cap).await?;
            total += rows.len();

            if (fetched as i64) < limit {
                break;
            }
            offset += fetched as i64;
        }

        Ok(total)
    }
}
