mod common;

use anyhow::anyhow;
use async_trait::async_trait;
use common::{create_order, harness, upi_request};
use paygate::domain::payment::PaymentStatus;
use paygate::domain::webhook::WebhookStatus;
use paygate::queue::memory::InMemoryQueue;
use paygate::queue::{EnqueueOptions, Job, JobError, JobQueue, QueueName};
use paygate::service::workers::{JobHandler, QueueWorker};
use paygate::store::WebhookLogStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

struct Always(fn() -> Result<(), JobError>);

#[async_trait]
impl JobHandler for Always {
    async fn handle(&self, _job: &Job) -> Result<(), JobError> {
        (self.0)()
    }
}

fn worker(queue: &InMemoryQueue, name: QueueName, handler: Arc<dyn JobHandler>) -> QueueWorker {
    QueueWorker {
        queue_name: name,
        queue: Arc::new(queue.clone()),
        handler,
        poll_interval: Duration::from_millis(10),
    }
}

fn payment_job() -> Job {
    Job::ProcessPayment {
        payment_id: "pay_x".to_string(),
    }
}

#[tokio::test]
async fn workers_drive_payment_to_delivered_webhooks() {
    let h = harness(true).await;
    let order = create_order(&h, 10_000).await;
    let payment = h
        .state
        .payments
        .create_payment(upi_request(&order.id), &h.merchant)
        .await
        .unwrap();

    let handler: Arc<dyn JobHandler> = Arc::new(h.state.job_handler());
    let payments = worker(&h.queue, QueueName::Payments, handler.clone());
    let webhooks = worker(&h.queue, QueueName::Webhooks, handler);

    assert!(payments.tick().await.unwrap());
    assert!(!payments.tick().await.unwrap());
    while webhooks.tick().await.unwrap() {}

    let payment = h.state.payments.get_payment(&payment.id, &h.merchant).await.unwrap();
    assert_eq!(payment.status, PaymentStatus::Success);

    let page = h.state.webhooks.list(&h.merchant, None, None).await.unwrap();
    assert_eq!(page.total, 3);
    for summary in page.data {
        let log = h.store.find_webhook_log(summary.id).await.unwrap().unwrap();
        assert_eq!(log.status, WebhookStatus::Success);
    }
    assert_eq!(h.sender.post_count().await, 3);

    let counts = h.queue.counts(QueueName::Webhooks).await.unwrap();
    assert_eq!((counts.completed, counts.failed), (3, 0));
}

fn flaky() -> Arc<dyn JobHandler> {
    Arc::new(Always(|| Err(JobError::Retryable(anyhow!("db down")))))
}

#[tokio::test]
async fn retryable_errors_are_released_with_backoff() {
    let queue = InMemoryQueue::new();
    queue.enqueue(payment_job(), EnqueueOptions::default()).await.unwrap();
    let w = worker(&queue, QueueName::Payments, flaky());

    assert!(w.tick().await.unwrap());

    let scheduled = queue.scheduled(QueueName::Payments).await;
    assert_eq!(scheduled, vec![(payment_job(), Duration::from_secs(2))]);
    let counts = queue.counts(QueueName::Payments).await.unwrap();
    assert_eq!((counts.active, counts.failed), (0, 0));
}

#[tokio::test]
async fn retryable_error_on_last_attempt_fails() {
    let queue = InMemoryQueue::new();
    queue
        .enqueue(
            payment_job(),
            EnqueueOptions {
                delay: Duration::ZERO,
                max_attempts: 1,
            },
        )
        .await
        .unwrap();
    let w = worker(&queue, QueueName::Payments, flaky());

    assert!(w.tick().await.unwrap());

    let counts = queue.counts(QueueName::Payments).await.unwrap();
    assert_eq!((counts.waiting, counts.failed), (0, 1));
}

#[tokio::test]
async fn fatal_errors_fail_immediately() {
    let queue = InMemoryQueue::new();
    queue.enqueue(payment_job(), EnqueueOptions::default()).await.unwrap();
    let w = worker(
        &queue,
        QueueName::Payments,
        Arc::new(Always(|| Err(JobError::Fatal(anyhow!("not refundable"))))),
    );

    assert!(w.tick().await.unwrap());
    let counts = queue.counts(QueueName::Payments).await.unwrap();
    assert_eq!((counts.waiting, counts.active, counts.failed), (0, 0, 1));
    assert_eq!(
        queue.failed_reasons(QueueName::Payments).await,
        vec!["not refundable".to_string()]
    );
}

#[tokio::test]
async fn run_loop_stops_on_shutdown() {
    let queue = InMemoryQueue::new();
    let w = worker(&queue, QueueName::Refunds, Arc::new(Always(|| Ok(()))));
    let (tx, rx) = watch::channel(false);

    let handle = tokio::spawn(w.run(rx));
    queue
        .enqueue(
            Job::ProcessRefund {
                refund_id: "rfnd_x".to_string(),
            },
            EnqueueOptions::default(),
        )
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    tx.send(true).unwrap();

    tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(queue.counts(QueueName::Refunds).await.unwrap().completed, 1);
}

#[tokio::test]
async fn run_loop_stops_when_shutdown_sender_is_dropped() {
    let queue = InMemoryQueue::new();
    let w = worker(&queue, QueueName::Webhooks, Arc::new(Always(|| Ok(()))));
    let (tx, rx) = watch::channel(false);

    let handle = tokio::spawn(w.run(rx));
    tokio::time::sleep(Duration::from_millis(20)).await;
    drop(tx);

    tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .unwrap()
        .unwrap();
}
