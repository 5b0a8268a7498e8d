use crate::modules::rebuild::handle::*;
use actix_web::web::{ServiceConfig, scope};

pub fn configure(cfg: &mut ServiceConfig) {
    cfg.service(scope("/rebuild").service(run_rebuild).service(rebuild_state));
}
