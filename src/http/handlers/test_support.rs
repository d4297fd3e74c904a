use crate::domain::merchant::TestMerchantInfo;
use crate::error::{GatewayError, GatewayResult};
use crate::queue::{JobCounts, QueueName};
use crate::AppState;
use axum::extract::State;
use axum::Json;
use serde::Serialize;

pub async fn test_merchant(State(state): State<AppState>) -> GatewayResult<Json<TestMerchantInfo>> {
    state
        .store
        .find_merchant_by_email(&state.test_merchant_email)
        .await?
        .map(Json)
        .ok_or_else(|| GatewayError::NotFound("Test merchant not found".to_string()))
}

#[derive(Debug, Serialize)]
pub struct JobStatus {
    pub pending: u64,
    pub processing: u64,
    pub completed: u64,
    pub failed: u64,
    pub worker_status: &'static str,
}

pub async fn job_status(State(state): State<AppState>) -> GatewayResult<Json<JobStatus>> {
    let mut total = JobCounts::default();
    for queue in QueueName::ALL {
        total = total + state.queue.counts(queue).await?;
    }

    Ok(Json(JobStatus {
        pending: total.waiting,
        processing: total.active,
        completed: total.completed,
        failed: total.failed,
        worker_status: "running",
    }))
}
