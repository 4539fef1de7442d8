use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Method, Request},
    Router,
};
use buildflow_api::{
    config::AppConfig,
    db,
    errors::ServiceError,
    events::{self, EventSender},
    gateway::{GatewayError, PaymentGateway, PaymentIntentHandle, PaymentIntentRequest},
    handlers::AppServices,
    services::notifications::NotificationSender,
    AppState,
};
use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha256;
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

/// Payment gateway double. Answers from a queue of planned results and falls
/// back to generated successes, while recording every request it saw.
pub struct RecordingGateway {
    requests: Mutex<Vec<PaymentIntentRequest>>,
    plan: Mutex<VecDeque<Result<PaymentIntentHandle, GatewayError>>>,
    counter: AtomicUsize,
}

impl RecordingGateway {
    pub fn new() -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            plan: Mutex::new(VecDeque::new()),
            counter: AtomicUsize::new(0),
        }
    }

    /// Queue a result for the next intent request; once the queue drains,
    /// requests succeed with generated ids again.
    pub fn plan_next(&self, result: Result<PaymentIntentHandle, GatewayError>) {
        self.plan.lock().unwrap().push_back(result);
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<PaymentIntentRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl PaymentGateway for RecordingGateway {
    async fn create_payment_intent(
        &self,
        request: PaymentIntentRequest,
    ) -> Result<PaymentIntentHandle, GatewayError> {
        self.requests.lock().unwrap().push(request);
        if let Some(planned) = self.plan.lock().unwrap().pop_front() {
            return planned;
        }
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        Ok(PaymentIntentHandle {
            intent_id: format!("pi_test_{:04}", n),
            client_handle: Some(format!("pi_test_{:04}_secret", n)),
        })
    }
}

/// Notification double that records every welcome it was asked to send.
#[derive(Default)]
pub struct RecordingNotifier {
    welcomes: Mutex<Vec<(Uuid, String)>>,
}

impl RecordingNotifier {
    pub fn welcome_count(&self) -> usize {
        self.welcomes.lock().unwrap().len()
    }

    pub fn welcomes(&self) -> Vec<(Uuid, String)> {
        self.welcomes.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationSender for RecordingNotifier {
    async fn send_project_welcome(
        &self,
        project_id: Uuid,
        customer_email: &str,
    ) -> Result<(), ServiceError> {
        self.welcomes
            .lock()
            .unwrap()
            .push((project_id, customer_email.to_string()));
        Ok(())
    }
}

/// Helper harness for spinning up an application backed by a throwaway
/// SQLite database.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub gateway: Arc<RecordingGateway>,
    pub notifier: Arc<RecordingNotifier>,
    _event_task: tokio::task::JoinHandle<()>,
    _db_dir: tempfile::TempDir,
}

impl TestApp {
    /// Construct a new test application with fresh database state.
    pub async fn new() -> Self {
        Self::build(|_| {}).await
    }

    /// Same, with the webhook signing secret configured.
    pub async fn with_webhook_secret(secret: &str) -> Self {
        let secret = secret.to_string();
        Self::build(move |cfg| cfg.payment_webhook_secret = Some(secret)).await
    }

    async fn build(tweak: impl FnOnce(&mut AppConfig)) -> Self {
        let db_dir = tempfile::tempdir().expect("create temp dir for test database");
        let db_file = db_dir.path().join("buildflow_test.db");

        let mut cfg = AppConfig::new(
            format!("sqlite://{}?mode=rwc", db_file.display()),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        cfg.auto_migrate = true;
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;
        tweak(&mut cfg);

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let db_arc = Arc::new(pool);
        let (event_tx, event_rx) = mpsc::channel(256);
        let event_sender = Arc::new(EventSender::new(event_tx));
        let event_task = tokio::spawn(events::process_events(event_rx));

        let gateway = Arc::new(RecordingGateway::new());
        let notifier = Arc::new(RecordingNotifier::default());

        let services = AppServices::new(
            db_arc.clone(),
            Some(event_sender),
            gateway.clone(),
            notifier.clone(),
            &cfg,
        );

        let state = AppState {
            db: db_arc,
            config: cfg.clone(),
            services,
        };

        let router = Router::new()
            .nest("/api/v1", buildflow_api::api_v1_routes())
            .with_state(state.clone());

        Self {
            router,
            state,
            gateway,
            notifier,
            _event_task: event_task,
            _db_dir: db_dir,
        }
    }

    /// Send a JSON request against the router.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> axum::response::Response {
        self.request_with_headers(method, uri, body, &[]).await
    }

    pub async fn request_with_headers(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        headers: &[(&str, &str)],
    ) -> axum::response::Response {
        let mut builder = Request::builder().method(method).uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
        } else {
            Body::empty()
        };

        let request = builder.body(body).expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self._event_task.abort();
    }
}

/// Decode a response body as JSON.
pub async fn read_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read response body");
    serde_json::from_slice(&bytes).expect("response body should be JSON")
}

/// Read a JSON money field as a Decimal. SQLite hands decimals back without
/// their original scale, so amounts must be compared as numbers, never as
/// strings.
#[allow(dead_code)]
pub fn money(value: &Value) -> rust_decimal::Decimal {
    serde_json::from_value(value.clone())
        .unwrap_or_else(|e| panic!("not a money value: {} ({})", value, e))
}

/// HMAC-SHA256 over `timestamp.body`, hex encoded, matching what the payment
/// gateway puts in its signature headers.
#[allow(dead_code)]
pub fn sign_webhook(secret: &str, timestamp: &str, body: &[u8]) -> String {
    let signed = format!("{}.{}", timestamp, std::str::from_utf8(body).unwrap());
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("HMAC key");
    mac.update(signed.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// A quote creation payload whose numbers are easy to assert against:
/// subtotal 10000.00, no tax, 40/40/20 split.
#[allow(dead_code)]
pub fn sample_quote_payload() -> Value {
    serde_json::json!({
        "customer_name": "Dana Fuller",
        "customer_email": "dana@example.com",
        "project_name": "Kitchen remodel",
        "project_address": "12 Harbor Lane, Portsmouth",
        "line_items": [
            {"category": "Demolition", "description": "Tear-out and disposal", "quantity": "1", "unit_price": "2500.00"},
            {"category": "Cabinetry", "quantity": "15", "unit_price": "500.00"}
        ]
    })
}
