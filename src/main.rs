use paygate::config::AppConfig;
use paygate::http::handlers::ops::InfraReadiness;
use paygate::queue::redis_queue::RedisQueue;
use paygate::repo::pg_store::PgStore;
use paygate::service::webhook_sender::ReqwestSender;
use paygate::store::MerchantStore;
use paygate::{build_router, AppState, Wiring};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cfg = AppConfig::from_env();

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&cfg.database_url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    let pg = PgStore::new(pool);
    if pg.seed_merchant(&cfg.test_merchant.to_new_merchant()).await? {
        tracing::info!(email = %cfg.test_merchant.email, "test merchant seeded");
    } else {
        tracing::info!(email = %cfg.test_merchant.email, "test merchant already exists");
    }

    let redis_queue = RedisQueue::new(&cfg.redis_url)?;

    let state = AppState::new(Wiring {
        store: Arc::new(pg.clone()),
        queue: Arc::new(redis_queue.clone()),
        policy: cfg.processing_policy(),
        sender: Arc::new(ReqwestSender::new(cfg.webhook_timeout())?),
        schedule: cfg.retry_schedule(),
        readiness: Arc::new(InfraReadiness {
            pg,
            redis: redis_queue,
        }),
        test_merchant_email: cfg.test_merchant.email.clone(),
    });

    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&cfg.bind_addr).await?;
    tracing::info!("listening on {}", cfg.bind_addr);
    axum::serve(listener, app).await?;
    Ok(())
}
