use actix_web::{get, post, web};

use crate::{
    api::{error, success},
    modules::{
        friendship::repository_redis::FriendshipStoreRedis,
        interaction::repository_redis::ScoreStoreRedis,
        rebuild::{
            model::{RebuildReport, RebuildStateResponse},
            repository_pg::RebuildSourcePg,
            service::RebuildService,
        },
        recovery::repository_pg::FriendEventDlqRepositoryPg,
    },
};

pub type RebuildSvc = RebuildService<
    FriendshipStoreRedis,
    ScoreStoreRedis,
    RebuildSourcePg,
    FriendEventDlqRepositoryPg,
>;

#[post("")]
pub async fn run_rebuild(
    rebuild_service: web::Data<RebuildSvc>,
) -> Result<success::Success<RebuildReport>, error::Error> {
    let report = rebuild_service.run_rebuild().await?;

    Ok(success::Success::ok(Some(report)).message("Cache rebuilt successfully"))
}

#[get("")]
pub async fn rebuild_state(
    rebuild_service: web::Data<RebuildSvc>,
) -> Result<success::Success<RebuildStateResponse>, error::Error> {
    let phase = rebuild_service.state();

    Ok(success::Success::ok(Some(RebuildStateResponse { phase })))
}
