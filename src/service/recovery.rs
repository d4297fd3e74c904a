use crate::queue::{EnqueueOptions, Job, JobQueue};
use crate::store::LedgerStore;
use anyhow::Result;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

pub const DEFAULT_SWEEP_BATCH: i64 = 100;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub payments: usize,
    pub refunds: usize,
    pub webhooks: usize,
}

/// Requeues work whose job went missing: payments still pending or
/// processing, pending refunds, and pending webhook logs overdue by more than
/// `grace`. Jobs that are merely slow get queued twice; every handler
/// tolerates that.
#[derive(Clone)]
pub struct RecoverySweep {
    pub store: Arc<dyn LedgerStore>,
    pub queue: Arc<dyn JobQueue>,
    pub grace: Duration,
    pub batch: i64,
}

impl RecoverySweep {
    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        let before = now - chrono::Duration::from_std(self.grace)?;
        let mut report = SweepReport::default();

        for payment_id in self.store.stalled_payments(before, self.batch).await? {
            self.queue
                .enqueue(Job::ProcessPayment { payment_id }, EnqueueOptions::default())
                .await?;
            report.payments += 1;
        }

        for refund_id in self.store.stalled_refunds(before, self.batch).await? {
            self.queue
                .enqueue(Job::ProcessRefund { refund_id }, EnqueueOptions::default())
                .await?;
            report.refunds += 1;
        }

        for webhook_log_id in self.store.stalled_webhook_logs(before, self.batch).await? {
            self.queue
                .enqueue(Job::DeliverWebhook { webhook_log_id }, EnqueueOptions::default())
                .await?;
            report.webhooks += 1;
        }

        if report != SweepReport::default() {
            tracing::warn!(
                payments = report.payments,
                refunds = report.refunds,
                webhooks = report.webhooks,
                "requeued stalled work"
            );
        }
        Ok(report)
    }

    pub async fn run(self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(interval_secs = interval.as_secs(), "recovery sweep started");
        loop {
            if *shutdown.borrow() {
                break;
            }
            if let Err(err) = self.sweep(Utc::now()).await {
                tracing::error!(error = %err, "recovery sweep failed");
            }

            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        tracing::info!("recovery sweep stopped");
    }
}
