use actix_web::{self, App, HttpServer, middleware::Logger, web};
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use social_cache::{
    api::error,
    configs::{RedisCache, connect_database},
    constants,
    modules::{
        friendship::repository_redis::FriendshipStoreRedis,
        interaction::{model::ScoreConfig, repository_redis::ScoreStoreRedis},
        rebuild::{
            handle::RebuildSvc, model::RebuildConfig, repository_pg::RebuildSourcePg,
            service::RebuildService,
        },
        recovery::{
            handle::RecoverySvc, model::ReplayConfig, repository_pg::FriendEventDlqRepositoryPg,
            service::RecoveryService,
        },
    },
};

pub static ENV: LazyLock<constants::Env> = LazyLock::new(|| {
    dotenvy::dotenv().ok();
    log::info!("Environment variables loaded from .env file");
    constants::Env::default()
});

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[actix_web::get("/")]
async fn health_check(cache: web::Data<RedisCache>) -> Result<&'static str, error::Error> {
    cache.ping().await?;
    Ok("Server is running")
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    init_tracing();

    let db_pool = connect_database(&ENV)
        .await
        .map_err(|_| std::io::Error::other("Database connection error"))?;
    sqlx::migrate!("./migrations").run(&db_pool).await.map_err(|e| {
        log::error!("Migration failed: {e}");
        std::io::Error::other("Database migration error")
    })?;

    let redis_cache =
        RedisCache::new(&ENV).await.map_err(|_| std::io::Error::other("Redis connection error"))?;

    let score_config = ScoreConfig { delta: ENV.default_delta, cap: ENV.max_score };
    let friendship_store = Arc::new(FriendshipStoreRedis::new(redis_cache.clone()));
    let score_store = Arc::new(ScoreStoreRedis::new(redis_cache.clone()));

    let dlq = Arc::new(FriendEventDlqRepositoryPg::new(db_pool.clone()));

    let recovery_service: RecoverySvc = RecoveryService::with_dependencies(
        friendship_store.clone(),
        score_store.clone(),
        dlq.clone(),
        score_config,
        ReplayConfig { limit: ENV.dlq_replay_limit, marker_ttl_secs: ENV.replay_marker_ttl_secs },
    );
    let rebuild_service: RebuildSvc = RebuildService::with_dependencies(
        friendship_store,
        score_store,
        Arc::new(RebuildSourcePg::new(db_pool.clone())),
        dlq,
        score_config,
        RebuildConfig {
            wipe_batch_size: ENV.rebuild_wipe_batch,
            chunk_size: ENV.rebuild_chunk_size,
        },
    );

    if ENV.dlq_replay_interval_secs > 0 {
        let recovery = recovery_service.clone();
        let period = Duration::from_secs(ENV.dlq_replay_interval_secs);
        actix_web::rt::spawn(async move {
            let mut ticker = actix_web::rt::time::interval(period);
            loop {
                ticker.tick().await;
                match recovery.replay_pending().await {
                    Ok(_) => {}
                    Err(error::SystemError::ReplayInProgress) => {
                        tracing::debug!("dead-letter queue busy, scheduled replay skipped");
                    }
                    Err(e) => tracing::error!(error = %e, "scheduled dead-letter replay failed"),
                }
            }
        });
        log::info!("Dead-letter replay scheduled every {}s", ENV.dlq_replay_interval_secs);
    }

    log::info!("Starting server at http://{}:{}", ENV.ip.as_str(), ENV.port);
    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .app_data(web::Data::new(redis_cache.clone()))
            .app_data(web::Data::new(recovery_service.clone()))
            .app_data(web::Data::new(rebuild_service.clone()))
            .service(health_check)
            .service(
                web::scope("/admin/cache")
                    .configure(social_cache::modules::rebuild::route::configure)
                    .configure(social_cache::modules::recovery::route::configure),
            )
    })
    .bind((ENV.ip.as_str(), ENV.port))?
    .workers(2)
    .run()
    .await
}
