use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::api::error;
use crate::modules::recovery::schema::{FriendEventDlqEntity, NewFriendEvent};

/// Durable sink for cache mutations that could not be applied.
#[async_trait::async_trait]
pub trait FriendEventDlqRepository: Send + Sync {
    /// Exclusive right to drain or discard the queue, across every process
    /// sharing it. Released on drop.
    type Lease: Send + 'static;

    async fn enqueue(&self, event: &NewFriendEvent) -> Result<Uuid, error::SystemError>;

    /// Oldest first, ties broken by id.
    async fn find_pending(
        &self,
        limit: i64,
    ) -> Result<Vec<FriendEventDlqEntity>, error::SystemError>;

    async fn count_pending(&self) -> Result<i64, error::SystemError>;

    async fn delete(&self, id: &Uuid) -> Result<(), error::SystemError>;

    async fn mark_failed(&self, id: &Uuid, reason: &str) -> Result<(), error::SystemError>;

    /// Drops every record enqueued at or before `cutoff`; returns how many.
    async fn delete_enqueued_before(&self, cutoff: DateTime<Utc>)
        -> Result<u64, error::SystemError>;

    /// `None` when another holder has the lease.
    async fn try_lease(&self) -> Result<Option<Self::Lease>, error::SystemError>;

    /// Waits until the lease is free.
    async fn lease(&self) -> Result<Self::Lease, error::SystemError>;
}
