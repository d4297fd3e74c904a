pub mod config;
pub mod domain {
    pub mod idempotency;
    pub mod instrument;
    pub mod merchant;
    pub mod order;
    pub mod payment;
    pub mod refund;
    pub mod webhook;
}
pub mod error;
pub mod http {
    pub mod extract;
    pub mod handlers {
        pub mod ops;
        pub mod orders;
        pub mod payments;
        pub mod refunds;
        pub mod test_support;
        pub mod webhooks;
    }
    pub mod middleware {
        pub mod merchant_auth;
    }
}
pub mod ids;
pub mod queue;
pub mod repo {
    pub mod idempotency_repo;
    pub mod merchants_repo;
    pub mod orders_repo;
    pub mod payments_repo;
    pub mod pg_store;
    pub mod refunds_repo;
    pub mod webhook_logs_repo;
}
pub mod service {
    pub mod idempotency;
    pub mod order_service;
    pub mod payment_service;
    pub mod processing_policy;
    pub mod recovery;
    pub mod refund_service;
    pub mod retry_schedule;
    pub mod signature;
    pub mod webhook_dispatcher;
    pub mod webhook_sender;
    pub mod workers;
}
pub mod store;

use axum::middleware::from_fn_with_state;
use axum::routing::{get, post};
use axum::Router;
use http::handlers::ops::Readiness;
use queue::JobQueue;
use service::idempotency::IdempotencyGuard;
use service::order_service::OrderService;
use service::payment_service::PaymentService;
use service::processing_policy::ProcessingPolicy;
use service::recovery::{RecoverySweep, DEFAULT_SWEEP_BATCH};
use service::refund_service::RefundService;
use service::retry_schedule::RetrySchedule;
use service::webhook_dispatcher::WebhookDispatcher;
use service::webhook_sender::WebhookSender;
use service::workers::GatewayJobs;
use std::sync::Arc;
use store::LedgerStore;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn LedgerStore>,
    pub queue: Arc<dyn JobQueue>,
    pub orders: OrderService,
    pub payments: PaymentService,
    pub refunds: RefundService,
    pub webhooks: WebhookDispatcher,
    pub idempotency: IdempotencyGuard,
    pub readiness: Arc<dyn Readiness>,
    pub test_merchant_email: String,
}

/// Collaborators the services are assembled from.
pub struct Wiring {
    pub store: Arc<dyn LedgerStore>,
    pub queue: Arc<dyn JobQueue>,
    pub policy: Arc<dyn ProcessingPolicy>,
    pub sender: Arc<dyn WebhookSender>,
    pub schedule: RetrySchedule,
    pub readiness: Arc<dyn Readiness>,
    pub test_merchant_email: String,
}

impl AppState {
    pub fn new(wiring: Wiring) -> Self {
        let Wiring {
            store,
            queue,
            policy,
            sender,
            schedule,
            readiness,
            test_merchant_email,
        } = wiring;

        let webhooks = WebhookDispatcher {
            store: store.clone(),
            queue: queue.clone(),
            sender,
            schedule,
        };

        Self {
            orders: OrderService {
                store: store.clone(),
            },
            payments: PaymentService {
                store: store.clone(),
                queue: queue.clone(),
                policy: policy.clone(),
                webhooks: webhooks.clone(),
            },
            refunds: RefundService {
                store: store.clone(),
                queue: queue.clone(),
                policy,
                webhooks: webhooks.clone(),
            },
            idempotency: IdempotencyGuard {
                store: store.clone(),
            },
            webhooks,
            store,
            queue,
            readiness,
            test_merchant_email,
        }
    }

    pub fn recovery_sweep(&self, grace: std::time::Duration) -> RecoverySweep {
        RecoverySweep {
            store: self.store.clone(),
            queue: self.queue.clone(),
            grace,
            batch: DEFAULT_SWEEP_BATCH,
        }
    }

    pub fn job_handler(&self) -> GatewayJobs {
        GatewayJobs {
            payments: self.payments.clone(),
            refunds: self.refunds.clone(),
            webhooks: self.webhooks.clone(),
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    use http::handlers::{ops, orders, payments, refunds, test_support, webhooks};

    let merchant_routes = Router::new()
        .route("/api/v1/orders", post(orders::create_order))
        .route("/api/v1/orders/:order_id", get(orders::get_order))
        .route(
            "/api/v1/payments",
            post(payments::create_payment).get(payments::list_payments),
        )
        .route("/api/v1/payments/:payment_id", get(payments::get_payment))
        .route(
            "/api/v1/payments/:payment_id/capture",
            post(payments::capture_payment),
        )
        .route(
            "/api/v1/payments/:payment_id/refunds",
            post(refunds::create_refund),
        )
        .route("/api/v1/refunds/:refund_id", get(refunds::get_refund))
        .route("/api/v1/webhooks", get(webhooks::list_webhooks))
        .route(
            "/api/v1/webhooks/:webhook_id/retry",
            post(webhooks::retry_webhook),
        )
        .layer(from_fn_with_state(
            state.clone(),
            http::middleware::merchant_auth::require_merchant,
        ));

    let public_routes = Router::new()
        .route("/health", get(ops::health))
        .route(
            "/api/v1/orders/:order_id/public",
            get(orders::get_public_order),
        )
        .route(
            "/api/v1/payments/public",
            post(payments::create_public_payment),
        )
        .route("/api/v1/test/merchant", get(test_support::test_merchant))
        .route("/api/v1/test/jobs/status", get(test_support::job_status));

    Router::new()
        .merge(merchant_routes)
        .merge(public_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
