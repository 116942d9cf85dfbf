#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Method, Request},
    middleware, Router,
};
use careride_api::{
    auth::AuthService,
    config::AppConfig,
    db,
    events::{self, EventSender},
    handlers::AppServices,
    message_queue::InMemoryMessageQueue,
    payment_processor::{StaticPaymentProcessor, WebhookVerifier},
    AppState,
};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

/// Shared secret used to sign simulated processor callbacks.
pub const TEST_WEBHOOK_SECRET: &str = "whsec_integration_testing_only";

/// Helper harness for spinning up an application backed by a throwaway
/// SQLite database.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    token: String,
    auth_service: Arc<AuthService>,
    _event_task: tokio::task::JoinHandle<()>,
    _db_file: tempfile::NamedTempFile,
}

impl TestApp {
    /// Construct a new test application with fresh database state.
    pub async fn new() -> Self {
        // Each instance gets its own database file so parallel test
        // binaries never share state.
        let db_file = tempfile::NamedTempFile::new().expect("create temp database file");

        let mut cfg = AppConfig::new(
            format!("sqlite://{}?mode=rwc", db_file.path().display()),
            "integration-signing-key-0123456789abcdef0123456789abcdef".to_string(),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        cfg.auto_migrate = true;
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;
        cfg.processor_webhook_secret = Some(TEST_WEBHOOK_SECRET.to_string());

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let db_arc = Arc::new(pool);
        let (event_tx, event_rx) = mpsc::channel(256);
        let event_sender = EventSender::new(event_tx);
        let event_task = tokio::spawn(events::process_events(event_rx));

        let auth_service = Arc::new(AuthService::new(
            cfg.jwt_secret.clone(),
            cfg.auth_issuer.clone(),
            cfg.auth_audience.clone(),
        ));

        let services = AppServices::new(
            db_arc.clone(),
            &cfg,
            Arc::new(StaticPaymentProcessor),
            Arc::new(InMemoryMessageQueue::new()),
            Some(Arc::new(event_sender.clone())),
        );

        let webhook_verifier = cfg.processor_webhook_secret.clone().map(|secret| {
            Arc::new(WebhookVerifier::new(
                secret,
                cfg.processor_webhook_tolerance_secs,
            ))
        });

        let state = AppState {
            db: db_arc,
            config: cfg.clone(),
            services,
            webhook_verifier,
        };

        let token = auth_service
            .issue_token(
                &Uuid::new_v4().to_string(),
                Some("Test Admin".to_string()),
                vec!["admin".to_string()],
                vec![],
                chrono::Duration::hours(1),
            )
            .expect("issue admin token");

        let auth_service_for_layer = auth_service.clone();
        let api_router = careride_api::api_v1_routes().layer(middleware::from_fn_with_state(
            auth_service_for_layer,
            |axum::extract::State(auth): axum::extract::State<Arc<AuthService>>,
             mut req: Request<Body>,
             next: axum::middleware::Next| async move {
                req.extensions_mut().insert(auth);
                next.run(req).await
            },
        ));

        let router = Router::new()
            .nest("/api/v1", api_router)
            .with_state(state.clone());

        Self {
            router,
            state,
            token,
            auth_service,
            _event_task: event_task,
            _db_file: db_file,
        }
    }

    /// Bearer token for the default admin user.
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Mint a staff token with specific roles and permissions.
    pub fn issue_staff_token(&self, roles: &[&str], permissions: &[&str]) -> String {
        self.auth_service
            .issue_token(
                &Uuid::new_v4().to_string(),
                Some("Test Staff".to_string()),
                roles.iter().map(|r| r.to_string()).collect(),
                permissions.iter().map(|p| p.to_string()).collect(),
                chrono::Duration::hours(1),
            )
            .expect("issue staff token")
    }

    /// Send a request against the router with an optional bearer token.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> axum::response::Response {
        let mut builder = Request::builder().method(method).uri(uri);

        if let Some(tok) = token {
            builder = builder.header("authorization", format!("Bearer {}", tok));
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

    /// Convenience helper for authenticated JSON requests.
    pub async fn request_authenticated(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> axum::response::Response {
        self.request(method, uri, body, Some(self.token())).await
    }

    /// Unauthenticated request carrying extra headers; used for webhook
    /// callbacks.
    pub async fn request_with_headers(
        &self,
        method: Method,
        uri: &str,
        body: Vec<u8>,
        headers: &[(&str, &str)],
    ) -> axum::response::Response {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }

        let request = builder.body(Body::from(body)).expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    /// Sign a webhook body the way the processor would.
    pub fn sign_webhook(&self, body: &str) -> (String, String) {
        let verifier = WebhookVerifier::new(
            TEST_WEBHOOK_SECRET.to_string(),
            self.state.config.processor_webhook_tolerance_secs,
        );
        let timestamp = chrono::Utc::now().timestamp().to_string();
        let signature = verifier.sign(&timestamp, body);
        (timestamp, signature)
    }

    /// Create a guest booking over HTTP and return `(booking_id, access_token)`.
    pub async fn create_guest_booking(
        &self,
        email: &str,
        payment_method: &str,
    ) -> (String, String) {
        let response = self
            .request(
                Method::POST,
                "/api/v1/bookings/guest",
                Some(guest_booking_payload(email, payment_method)),
                None,
            )
            .await;
        assert_eq!(response.status(), 201, "guest booking should be created");

        let body = response_json(response).await;
        let booking_id = body["data"]["booking"]["id"]
            .as_str()
            .expect("booking id")
            .to_string();
        let access_token = body["data"]["access_token"]
            .as_str()
            .expect("access token")
            .to_string();
        (booking_id, access_token)
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self._event_task.abort();
    }
}

/// Booking request whose fare prices to the worked settlement example:
/// 8.50 base + 11.00 distance + 6.00 wheelchair + 20.50 support, no peak.
pub fn guest_booking_payload(email: &str, payment_method: &str) -> Value {
    json!({
        "contact": {
            "name": "Rhonda Marsh",
            "email": email,
            "phone": "+61 400 111 222"
        },
        "trip": trip_payload(),
        "payment_method": payment_method
    })
}

/// Tuesday 11:00 Sydney time, off peak.
pub fn trip_payload() -> Value {
    json!({
        "pickup_address": "12 Harbour St, Sydney",
        "dropoff_address": "4 Clinic Ln, Sydney",
        "distance_km": "5.00",
        "pickup_time": "2024-07-02T01:00:00Z",
        "vehicle_features": ["wheelchair_access"],
        "support_workers_count": 1,
        "booking_type": "on_demand"
    })
}

/// Read a response body as JSON.
pub async fn response_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    serde_json::from_slice(&bytes).expect("json response body")
}
