use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

pub mod memory;
pub mod redis_queue;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueName {
    Payments,
    Refunds,
    Webhooks,
}

impl QueueName {
    pub const ALL: [QueueName; 3] = [QueueName::Payments, QueueName::Refunds, QueueName::Webhooks];

    pub fn as_str(&self) -> &'static str {
        match self {
            QueueName::Payments => "payments",
            QueueName::Refunds => "refunds",
            QueueName::Webhooks => "webhooks",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Job {
    ProcessPayment { payment_id: String },
    ProcessRefund { refund_id: String },
    DeliverWebhook { webhook_log_id: Uuid },
}

impl Job {
    pub fn queue(&self) -> QueueName {
        match self {
            Job::ProcessPayment { .. } => QueueName::Payments,
            Job::ProcessRefund { .. } => QueueName::Refunds,
            Job::DeliverWebhook { .. } => QueueName::Webhooks,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnqueueOptions {
    pub delay: Duration,
    pub max_attempts: u32,
}

impl Default for EnqueueOptions {
    fn default() -> Self {
        Self {
            delay: Duration::ZERO,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl EnqueueOptions {
    pub fn delayed(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }
}

/// A job handed to a worker. `attempts_made` counts previous failed runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedJob {
    pub id: String,
    pub job: Job,
    pub attempts_made: u32,
    pub max_attempts: u32,
}

impl QueuedJob {
    pub fn attempts_left(&self) -> bool {
        self.attempts_made + 1 < self.max_attempts
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct JobCounts {
    pub waiting: u64,
    pub active: u64,
    pub completed: u64,
    pub failed: u64,
}

impl std::ops::Add for JobCounts {
    type Output = JobCounts;

    fn add(self, rhs: JobCounts) -> JobCounts {
        JobCounts {
            waiting: self.waiting + rhs.waiting,
            active: self.active + rhs.active,
            completed: self.completed + rhs.completed,
            failed: self.failed + rhs.failed,
        }
    }
}

/// How a handler run ended when it did not succeed.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    /// Released back to the queue with backoff while attempts remain.
    #[error("retryable: {0}")]
    Retryable(anyhow::Error),

    /// Recorded as failed without another attempt.
    #[error("fatal: {0}")]
    Fatal(anyhow::Error),
}

impl From<anyhow::Error> for JobError {
    fn from(err: anyhow::Error) -> Self {
        JobError::Retryable(err)
    }
}

/// Durable delayed queue with at-least-once delivery.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Schedules `job` on its queue after `opts.delay`. Returns the job id.
    async fn enqueue(&self, job: Job, opts: EnqueueOptions) -> Result<String>;

    /// Claims the next due job on `queue`, if any.
    async fn reserve(&self, queue: QueueName) -> Result<Option<QueuedJob>>;

    async fn complete(&self, job: &QueuedJob) -> Result<()>;

    /// Puts a claimed job back with one more attempt recorded, due after `delay`.
    async fn release(&self, job: &QueuedJob, delay: Duration) -> Result<()>;

    async fn fail(&self, job: &QueuedJob, reason: &str) -> Result<()>;

    async fn counts(&self, queue: QueueName) -> Result<JobCounts>;
}

pub(crate) fn new_job_id() -> String {
    Uuid::new_v4().to_string()
}
