use crate::modules::recovery::handle::*;
use actix_web::web::{ServiceConfig, scope};

pub fn configure(cfg: &mut ServiceConfig) {
    cfg.service(scope("/dlq").service(replay_pending).service(list_pending));
}
