use std::collections::HashSet;

use uuid::Uuid;

use crate::api::error;

/// Mirrored per-user friend sets in the cache.
///
/// `add_friend`/`remove_friend` write the two sides independently. When only one
/// side fails the error is [`error::SystemError::PartialMirror`] naming that side.
#[async_trait::async_trait]
pub trait FriendshipStore: Send + Sync {
    async fn add_friend(&self, user_a: &Uuid, user_b: &Uuid) -> Result<(), error::SystemError>;

    async fn remove_friend(&self, user_a: &Uuid, user_b: &Uuid)
    -> Result<(), error::SystemError>;

    /// One pipelined batch: drop the withdrawing user's own set and remove them
    /// from each affected user's set.
    async fn remove_all_for_withdrawing_user(
        &self,
        affected_user_ids: &[Uuid],
        withdrawing_user_id: &Uuid,
    ) -> Result<(), error::SystemError>;

    async fn friends_of(&self, user_id: &Uuid) -> Result<HashSet<Uuid>, error::SystemError>;

    async fn is_friend(&self, user_a: &Uuid, user_b: &Uuid) -> Result<bool, error::SystemError>;

    /// Mirrored inserts for a whole chunk in one pipelined batch.
    async fn insert_pairs(&self, pairs: &[(Uuid, Uuid)]) -> Result<(), error::SystemError>;

    /// Deletes every friend-set key. Returns the number of keys removed.
    async fn wipe(&self, batch_size: usize) -> Result<usize, error::SystemError>;
}
