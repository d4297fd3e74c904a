use crate::queue::redis_queue::RedisQueue;
use crate::repo::pg_store::PgStore;
use crate::AppState;
use async_trait::async_trait;
use axum::extract::State;
use axum::Json;
use chrono::Utc;
use serde::Serialize;

#[async_trait]
pub trait Readiness: Send + Sync {
    async fn database(&self) -> bool;
    async fn redis(&self) -> bool;
}

pub struct InfraReadiness {
    pub pg: PgStore,
    pub redis: RedisQueue,
}

#[async_trait]
impl Readiness for InfraReadiness {
    async fn database(&self) -> bool {
        self.pg.ping().await
    }

    async fn redis(&self) -> bool {
        self.redis.ping().await.is_ok()
    }
}

/// For in-process setups with no external dependencies.
pub struct AlwaysReady;

#[async_trait]
impl Readiness for AlwaysReady {
    async fn database(&self) -> bool {
        true
    }

    async fn redis(&self) -> bool {
        true
    }
}

#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub database: &'static str,
    pub redis: &'static str,
    pub worker: &'static str,
    pub timestamp: chrono::DateTime<Utc>,
}

fn connected(ok: bool) -> &'static str {
    if ok {
        "connected"
    } else {
        "disconnected"
    }
}

pub async fn health(State(state): State<AppState>) -> Json<HealthReport> {
    let db_ok = state.readiness.database().await;
    let redis_ok = state.readiness.redis().await;

    Json(HealthReport {
        status: "healthy",
        database: connected(db_ok),
        redis: connected(redis_ok),
        worker: "running",
        timestamp: Utc::now(),
    })
}
