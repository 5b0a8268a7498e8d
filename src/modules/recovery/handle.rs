use actix_web::{get, post, web};

use crate::{
    api::{error, success},
    constants::DEFAULT_REPLAY_LIMIT,
    modules::{
        friendship::repository_redis::FriendshipStoreRedis,
        interaction::repository_redis::ScoreStoreRedis,
        recovery::{
            model::{PendingQuery, PendingResponse, ReplayReport},
            repository_pg::FriendEventDlqRepositoryPg,
            service::RecoveryService,
        },
    },
    utils::ValidatedQuery,
};

pub type RecoverySvc =
    RecoveryService<FriendshipStoreRedis, ScoreStoreRedis, FriendEventDlqRepositoryPg>;

#[post("/replay")]
pub async fn replay_pending(
    recovery_service: web::Data<RecoverySvc>,
) -> Result<success::Success<ReplayReport>, error::Error> {
    let report = recovery_service.replay_pending().await?;

    Ok(success::Success::ok(Some(report)).message("Dead-letter queue replayed"))
}

#[get("")]
pub async fn list_pending(
    recovery_service: web::Data<RecoverySvc>,
    query: ValidatedQuery<PendingQuery>,
) -> Result<success::Success<PendingResponse>, error::Error> {
    let limit = query.0.limit.unwrap_or(DEFAULT_REPLAY_LIMIT);
    let pending = recovery_service.pending(limit).await?;

    Ok(success::Success::ok(Some(pending)).message("Pending events retrieved successfully"))
}
