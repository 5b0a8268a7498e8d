use std::collections::HashSet;
use std::sync::Arc;

use uuid::Uuid;

use crate::{
    api::error,
    modules::{
        friendship::repository::FriendshipStore,
        recovery::{
            model::CacheWrite,
            repository::FriendEventDlqRepository,
            schema::{FriendEventType, NewFriendEvent},
            service::queue_failed_write,
        },
    },
};

#[derive(Clone)]
pub struct FriendshipService<F, D>
where
    F: FriendshipStore + Send + Sync,
    D: FriendEventDlqRepository + Send + Sync,
{
    store: Arc<F>,
    dlq: Arc<D>,
}

impl<F, D> FriendshipService<F, D>
where
    F: FriendshipStore + Send + Sync,
    D: FriendEventDlqRepository + Send + Sync,
{
    pub fn with_dependencies(store: Arc<F>, dlq: Arc<D>) -> Self {
        FriendshipService { store, dlq }
    }

    pub async fn add_friend(
        &self,
        user_a: Uuid,
        user_b: Uuid,
    ) -> Result<CacheWrite, error::SystemError> {
        if user_a == user_b {
            return Err(error::SystemError::bad_request("Cannot befriend yourself"));
        }

        match self.store.add_friend(&user_a, &user_b).await {
            Ok(()) => Ok(CacheWrite::Applied),
            Err(e) => self.defer(FriendEventType::FriendAdd, user_a, user_b, e).await,
        }
    }

    pub async fn remove_friend(
        &self,
        user_a: Uuid,
        user_b: Uuid,
    ) -> Result<CacheWrite, error::SystemError> {
        if user_a == user_b {
            return Err(error::SystemError::bad_request("Cannot unfriend yourself"));
        }

        match self.store.remove_friend(&user_a, &user_b).await {
            Ok(()) => Ok(CacheWrite::Applied),
            Err(e) => self.defer(FriendEventType::FriendRemove, user_a, user_b, e).await,
        }
    }

    /// A failed cleanup is not queued; the rebuild that follows a withdrawal
    /// reconciles whatever mirrors were left behind.
    pub async fn remove_all_for_withdrawing_user(
        &self,
        affected_user_ids: &[Uuid],
        withdrawing_user_id: Uuid,
    ) -> Result<CacheWrite, error::SystemError> {
        match self
            .store
            .remove_all_for_withdrawing_user(affected_user_ids, &withdrawing_user_id)
            .await
        {
            Ok(()) => Ok(CacheWrite::Applied),
            Err(e) if e.is_cache_failure() => {
                tracing::warn!(
                    user_id = %withdrawing_user_id,
                    affected = affected_user_ids.len(),
                    error = %e,
                    "friend cleanup for withdrawn user left stale mirrors"
                );
                Ok(CacheWrite::Stale)
            }
            Err(e) => Err(e),
        }
    }

    pub async fn friends_of(&self, user_id: Uuid) -> Result<HashSet<Uuid>, error::SystemError> {
        self.store.friends_of(&user_id).await
    }

    pub async fn is_friend(
        &self,
        user_id: Uuid,
        friend_id: Uuid,
    ) -> Result<bool, error::SystemError> {
        self.store.is_friend(&user_id, &friend_id).await
    }

    async fn defer(
        &self,
        event_type: FriendEventType,
        user_a: Uuid,
        user_b: Uuid,
        err: error::SystemError,
    ) -> Result<CacheWrite, error::SystemError> {
        let (member_id, target_id) = match &err {
            error::SystemError::PartialMirror { member_id, target_id, .. } => {
                (*member_id, *target_id)
            }
            _ => (user_a, user_b),
        };
        let event = match event_type {
            FriendEventType::FriendRemove => NewFriendEvent::friend_remove(member_id, target_id),
            _ => NewFriendEvent::friend_add(member_id, target_id),
        };
        queue_failed_write(self.dlq.as_ref(), event, err).await
    }
}
