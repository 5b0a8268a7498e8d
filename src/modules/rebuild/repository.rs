use uuid::Uuid;

use crate::api::error;
use crate::modules::rebuild::model::InteractionSource;

/// Paged reads of the authoritative relational data.
///
/// Pages are stable for a fixed `(offset, limit)` while the data is unchanged.
#[async_trait::async_trait]
pub trait RebuildSource: Send + Sync {
    /// `(member_id, friend_id)` pairs, one row per friendship.
    async fn friend_edges(
        &self,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<(Uuid, Uuid)>, error::SystemError>;

    /// `(member_id, target_id)` rows: `member_id` acted on content owned by `target_id`.
    async fn interactions(
        &self,
        source: InteractionSource,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<(Uuid, Uuid)>, error::SystemError>;
}
