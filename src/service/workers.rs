use crate::queue::{Job, JobError, JobQueue, QueueName, QueuedJob};
use crate::service::payment_service::PaymentService;
use crate::service::refund_service::RefundService;
use crate::service::webhook_dispatcher::WebhookDispatcher;
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, job: &Job) -> Result<(), JobError>;
}

/// Routes each job kind to the service that owns it.
#[derive(Clone)]
pub struct GatewayJobs {
    pub payments: PaymentService,
    pub refunds: RefundService,
    pub webhooks: WebhookDispatcher,
}

#[async_trait]
impl JobHandler for GatewayJobs {
    async fn handle(&self, job: &Job) -> Result<(), JobError> {
        match job {
            Job::ProcessPayment { payment_id } => {
                self.payments.process_payment(payment_id).await?;
            }
            Job::ProcessRefund { refund_id } => {
                self.refunds.process_refund(refund_id).await?;
            }
            Job::DeliverWebhook { webhook_log_id } => {
                self.webhooks.deliver(*webhook_log_id).await?;
            }
        }
        Ok(())
    }
}

pub const MAX_JOB_BACKOFF_SECS: u64 = 300;

/// Backoff before the next attempt of a job that failed `attempts_made + 1` times.
pub fn job_backoff(attempts_made: u32) -> Duration {
    Duration::from_secs(2_u64.saturating_pow(attempts_made.saturating_add(1)).min(MAX_JOB_BACKOFF_SECS))
}

pub struct QueueWorker {
    pub queue_name: QueueName,
    pub queue: Arc<dyn JobQueue>,
    pub handler: Arc<dyn JobHandler>,
    pub poll_interval: Duration,
}

impl QueueWorker {
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(queue = self.queue_name.as_str(), "worker started");
        loop {
            if *shutdown.borrow() {
                break;
            }

            let idle = match self.tick().await {
                Ok(ran) => !ran,
                Err(err) => {
                    tracing::error!(queue = self.queue_name.as_str(), error = %err, "worker tick failed");
                    true
                }
            };

            if idle {
                tokio::select! {
                    _ = tokio::time::sleep(self.poll_interval) => {}
                    changed = shutdown.changed() => {
                        // sender dropped
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }
        }
        tracing::info!(queue = self.queue_name.as_str(), "worker stopped");
    }

    /// Runs at most one job. Returns whether a job was found.
    pub async fn tick(&self) -> Result<bool> {
        let Some(job) = self.queue.reserve(self.queue_name).await? else {
            return Ok(false);
        };

        match self.handler.handle(&job.job).await {
            Ok(()) => self.queue.complete(&job).await?,
            Err(err) => self.settle_failure(&job, err).await?,
        }
        Ok(true)
    }

    async fn settle_failure(&self, job: &QueuedJob, err: JobError) -> Result<()> {
        match err {
            JobError::Retryable(cause) if job.attempts_left() => {
                let delay = job_backoff(job.attempts_made);
                tracing::warn!(
                    queue = self.queue_name.as_str(),
                    job_id = %job.id,
                    attempt = job.attempts_made + 1,
                    delay_secs = delay.as_secs(),
                    error = %cause,
                    "job failed, retrying"
                );
                self.queue.release(job, delay).await
            }
            JobError::Retryable(cause) | JobError::Fatal(cause) => {
                self.queue.fail(job, &cause.to_string()).await
            }
        }
    }
}
