use anyhow::Result;
use paygate::config::AppConfig;
use paygate::http::handlers::ops::InfraReadiness;
use paygate::queue::redis_queue::RedisQueue;
use paygate::queue::QueueName;
use paygate::repo::pg_store::PgStore;
use paygate::service::webhook_sender::ReqwestSender;
use paygate::service::workers::{JobHandler, QueueWorker};
use paygate::{AppState, Wiring};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cfg = AppConfig::from_env();
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&cfg.database_url)
        .await?;

    let pg = PgStore::new(pool);
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
    let handler: Arc<dyn JobHandler> = Arc::new(state.job_handler());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut workers = Vec::new();
    for queue_name in QueueName::ALL {
        let worker = QueueWorker {
            queue_name,
            queue: state.queue.clone(),
            handler: handler.clone(),
            poll_interval: cfg.worker_poll_interval(),
        };
        workers.push(tokio::spawn(worker.run(shutdown_rx.clone())));
    }

    workers.push(tokio::spawn(
        state
            .recovery_sweep(cfg.recovery_grace())
            .run(cfg.recovery_interval(), shutdown_rx.clone()),
    ));

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown requested, draining workers");
    shutdown_tx.send(true)?;
    for worker in workers {
        worker.await?;
    }
    Ok(())
}
