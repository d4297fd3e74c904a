#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use paygate::domain::merchant::{Merchant, NewMerchant};
use paygate::domain::order::{CreateOrderRequest, Order};
use paygate::domain::payment::{CardInput, CreatePaymentRequest, Payment};
use paygate::http::handlers::ops::AlwaysReady;
use paygate::queue::memory::InMemoryQueue;
use paygate::queue::{EnqueueOptions, Job, JobCounts, JobQueue, QueueName, QueuedJob};
use paygate::service::processing_policy::FixedProcessing;
use paygate::service::retry_schedule::RetrySchedule;
use paygate::service::webhook_sender::{SenderReply, WebhookSender};
use paygate::store::memory::InMemoryStore;
use paygate::store::MerchantStore;
use paygate::{AppState, Wiring};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use uuid::Uuid;

pub const API_KEY: &str = "key_test_abc123";
pub const API_SECRET: &str = "secret_test_xyz789";
pub const WEBHOOK_URL: &str = "http://merchant.test/webhook";
pub const WEBHOOK_SECRET: &str = "whsec_test_abc123";
pub const MERCHANT_EMAIL: &str = "test@example.com";

#[derive(Debug, Clone)]
pub struct CapturedPost {
    pub url: String,
    pub body: Vec<u8>,
    pub signature: String,
}

/// Replies from a script, then with `fallback_status` once the script runs out.
/// `None` in the script simulates a transport error.
pub struct ScriptedSender {
    script: Mutex<VecDeque<Option<u16>>>,
    fallback_status: u16,
    pub posts: Mutex<Vec<CapturedPost>>,
}

impl ScriptedSender {
    pub fn new(fallback_status: u16) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback_status,
            posts: Mutex::new(Vec::new()),
        }
    }

    pub async fn push(&self, reply: Option<u16>) {
        self.script.lock().await.push_back(reply);
    }

    pub async fn post_count(&self) -> usize {
        self.posts.lock().await.len()
    }
}

#[async_trait]
impl WebhookSender for ScriptedSender {
    async fn post(&self, url: &str, body: Vec<u8>, signature: &str) -> Result<SenderReply> {
        self.posts.lock().await.push(CapturedPost {
            url: url.to_string(),
            body,
            signature: signature.to_string(),
        });

        match self.script.lock().await.pop_front() {
            Some(Some(status)) => Ok(SenderReply {
                status,
                body: format!("status {}", status),
            }),
            Some(None) => anyhow::bail!("connection refused"),
            None => Ok(SenderReply {
                status: self.fallback_status,
                body: "ok".to_string(),
            }),
        }
    }
}

/// Delegates to an in-memory queue but can be told to reject the next few
/// webhook enqueues, the way a dropped Redis connection would.
pub struct FlakyQueue {
    pub inner: InMemoryQueue,
    failing_webhook_enqueues: AtomicUsize,
}

impl FlakyQueue {
    pub fn new(inner: InMemoryQueue) -> Self {
        Self {
            inner,
            failing_webhook_enqueues: AtomicUsize::new(0),
        }
    }

    pub fn fail_next_webhook_enqueues(&self, n: usize) {
        self.failing_webhook_enqueues.store(n, Ordering::SeqCst);
    }
}

#[async_trait]
impl JobQueue for FlakyQueue {
    async fn enqueue(&self, job: Job, opts: EnqueueOptions) -> Result<String> {
        if matches!(job, Job::DeliverWebhook { .. }) {
            let failed = self
                .failing_webhook_enqueues
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if failed {
                anyhow::bail!("redis connection reset");
            }
        }
        self.inner.enqueue(job, opts).await
    }

    async fn reserve(&self, queue: QueueName) -> Result<Option<QueuedJob>> {
        self.inner.reserve(queue).await
    }

    async fn complete(&self, job: &QueuedJob) -> Result<()> {
        self.inner.complete(job).await
    }

    async fn release(&self, job: &QueuedJob, delay: Duration) -> Result<()> {
        self.inner.release(job, delay).await
    }

    async fn fail(&self, job: &QueuedJob, reason: &str) -> Result<()> {
        self.inner.fail(job, reason).await
    }

    async fn counts(&self, queue: QueueName) -> Result<JobCounts> {
        self.inner.counts(queue).await
    }
}

pub struct Harness {
    pub store: InMemoryStore,
    pub queue: InMemoryQueue,
    pub flaky: Arc<FlakyQueue>,
    pub sender: Arc<ScriptedSender>,
    pub state: AppState,
    pub merchant: Merchant,
}

pub fn new_merchant(email: &str, api_key: &str, webhook_url: Option<&str>) -> NewMerchant {
    NewMerchant {
        id: Uuid::new_v4(),
        name: "Test Merchant".to_string(),
        email: email.to_string(),
        api_key: api_key.to_string(),
        api_secret: API_SECRET.to_string(),
        webhook_url: webhook_url.map(str::to_string),
        webhook_secret: Some(WEBHOOK_SECRET.to_string()),
    }
}

pub async fn harness(payments_succeed: bool) -> Harness {
    let store = InMemoryStore::new();
    let queue = InMemoryQueue::new();
    let sender = Arc::new(ScriptedSender::new(200));
    let flaky = Arc::new(FlakyQueue::new(queue.clone()));

    store
        .seed_merchant(&new_merchant(MERCHANT_EMAIL, API_KEY, Some(WEBHOOK_URL)))
        .await
        .unwrap();
    let merchant = store.authenticate(API_KEY, API_SECRET).await.unwrap().unwrap();

    let state = AppState::new(Wiring {
        store: Arc::new(store.clone()),
        queue: flaky.clone(),
        policy: Arc::new(FixedProcessing::instant(payments_succeed)),
        sender: sender.clone(),
        schedule: RetrySchedule::production(),
        readiness: Arc::new(AlwaysReady),
        test_merchant_email: MERCHANT_EMAIL.to_string(),
    });

    Harness {
        store,
        queue,
        flaky,
        sender,
        state,
        merchant,
    }
}

pub async fn other_merchant(h: &Harness) -> Merchant {
    h.store
        .seed_merchant(&new_merchant("other@example.com", "key_other", None))
        .await
        .unwrap();
    h.store
        .authenticate("key_other", API_SECRET)
        .await
        .unwrap()
        .unwrap()
}

pub async fn create_order(h: &Harness, amount: i64) -> Order {
    h.state
        .orders
        .create_order(
            CreateOrderRequest {
                amount,
                currency: None,
                receipt: Some("receipt_1".to_string()),
                notes: None,
            },
            &h.merchant,
        )
        .await
        .unwrap()
}

pub fn upi_request(order_id: &str) -> CreatePaymentRequest {
    CreatePaymentRequest {
        order_id: order_id.to_string(),
        method: "upi".to_string(),
        vpa: Some("user@paytm".to_string()),
        card: None,
    }
}

pub fn card_request(order_id: &str, number: &str, month: &str, year: &str) -> CreatePaymentRequest {
    CreatePaymentRequest {
        order_id: order_id.to_string(),
        method: "card".to_string(),
        vpa: None,
        card: Some(CardInput {
            number: Some(number.to_string()),
            expiry_month: Some(month.to_string()),
            expiry_year: Some(year.to_string()),
            cvv: Some("123".to_string()),
            holder_name: Some("Jane Doe".to_string()),
        }),
    }
}

/// Order of `amount`, upi payment, processed to its final state.
pub async fn settled_payment(h: &Harness, amount: i64) -> Payment {
    let order = create_order(h, amount).await;
    let payment = h
        .state
        .payments
        .create_payment(upi_request(&order.id), &h.merchant)
        .await
        .unwrap();
    h.state.payments.process_payment(&payment.id).await.unwrap();
    h.state
        .payments
        .get_payment(&payment.id, &h.merchant)
        .await
        .unwrap()
}
