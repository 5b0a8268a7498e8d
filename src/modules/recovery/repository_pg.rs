use chrono::{DateTime, Utc};
use sqlx::{Postgres, Transaction};
use uuid::Uuid;

use crate::{
    api::error,
    modules::recovery::{
        repository::FriendEventDlqRepository,
        schema::{FriendEventDlqEntity, NewFriendEvent},
    },
};

/// Advisory lock key shared by every process draining `friend_event_dlq`.
const DRAIN_LOCK_KEY: i64 = 0x0064_6c71_6472_6169;

#[derive(Clone)]
pub struct FriendEventDlqRepositoryPg {
    pool: sqlx::PgPool,
}

impl FriendEventDlqRepositoryPg {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl FriendEventDlqRepository for FriendEventDlqRepositoryPg {
    // the lock is transaction scoped, so dropping the lease rolls back and releases it
    type Lease = Transaction<'static, Postgres>;

    async fn enqueue(&self, event: &NewFriendEvent) -> Result<Uuid, error::SystemError> {
        let id = Uuid::new_v7(uuid::Timestamp::now(uuid::NoContext));

        sqlx::query(
            r#"
            INSERT INTO friend_event_dlq
                (id, event_type, member_id, target_id, score_delta, enqueued_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(id)
        .bind(event.event_type)
        .bind(event.member_id)
        .bind(event.target_id)
        .bind(event.score_delta)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(id)
    }

    async fn find_pending(
        &self,
        limit: i64,
    ) -> Result<Vec<FriendEventDlqEntity>, error::SystemError> {
        let events = sqlx::query_as::<_, FriendEventDlqEntity>(
            r#"
            SELECT id, event_type, member_id, target_id, score_delta,
                   attempts, last_error, enqueued_at
            FROM friend_event_dlq
            ORDER BY enqueued_at ASC, id ASC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(events)
    }

    async fn count_pending(&self) -> Result<i64, error::SystemError> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM friend_event_dlq")
            .fetch_one(&self.pool)
            .await?;
        Ok(total)
    }

    async fn delete(&self, id: &Uuid) -> Result<(), error::SystemError> {
        sqlx::query("DELETE FROM friend_event_dlq WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn mark_failed(&self, id: &Uuid, reason: &str) -> Result<(), error::SystemError> {
        sqlx::query(
            "UPDATE friend_event_dlq SET attempts = attempts + 1, last_error = $2 WHERE id = $1",
        )
        .bind(id)
        .bind(reason)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_enqueued_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, error::SystemError> {
        let result = sqlx::query("DELETE FROM friend_event_dlq WHERE enqueued_at <= $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn try_lease(&self) -> Result<Option<Self::Lease>, error::SystemError> {
        let mut tx = self.pool.begin().await?;
        let locked: bool = sqlx::query_scalar("SELECT pg_try_advisory_xact_lock($1)")
            .bind(DRAIN_LOCK_KEY)
            .fetch_one(&mut *tx)
            .await?;
        Ok(locked.then_some(tx))
    }

    async fn lease(&self) -> Result<Self::Lease, error::SystemError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(DRAIN_LOCK_KEY)
            .execute(&mut *tx)
            .await?;
        Ok(tx)
    }
}
