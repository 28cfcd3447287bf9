//! Common test utilities for in-process API tests.
//!
//! The fixture wires the real services to SQLite stores in a temporary
//! directory and an in-memory broker, and drives the router with `oneshot`.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use pizzeria_core::{
    Broker, Config, IntakeService, KitchenConfig, KitchenWorker, OrderStore, SqliteOrderStore,
    SqliteWorkerRegistry, TrackingService, WorkerRegistry,
};
use pizzeria_server::state::AppState;

pub use pizzeria_core::testing::fixtures;

pub const LIVENESS_WINDOW: Duration = Duration::from_secs(30);

/// Response from the test server.
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
    /// Raw body, for non-JSON endpoints.
    pub text: String,
}

/// Test fixture: a router over real services on throwaway storage.
pub struct TestFixture {
    pub router: Router,
    pub orders: Arc<dyn OrderStore>,
    pub registry: Arc<dyn WorkerRegistry>,
    pub broker: Broker,
    pub temp_dir: TempDir,
}

impl TestFixture {
    pub async fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("pizzeria.db");

        let mut config = Config::default();
        config.database.path = db_path.clone();
        config.notifier.webhook_url = Some("http://hooks.internal/secret-token".to_string());

        let orders: Arc<dyn OrderStore> =
            Arc::new(SqliteOrderStore::new(&db_path).expect("Failed to open order store"));
        let registry: Arc<dyn WorkerRegistry> = Arc::new(
            SqliteWorkerRegistry::new(&db_path).expect("Failed to open worker registry"),
        );
        let broker = Broker::in_memory();

        let intake = Arc::new(IntakeService::new(
            Arc::clone(&orders),
            broker.clone(),
            config.intake.clone(),
        ));
        let tracking = Arc::new(TrackingService::new(
            Arc::clone(&orders),
            Arc::clone(&registry),
            LIVENESS_WINDOW,
        ));

        let state = Arc::new(AppState::new(config, intake, tracking));
        let router = pizzeria_server::api::create_router(state);

        Self {
            router,
            orders,
            registry,
            broker,
            temp_dir,
        }
    }

    /// A kitchen worker on the fixture's stores with near-zero step delays.
    pub fn kitchen(&self, name: &str) -> KitchenWorker {
        let mut config = KitchenConfig::default()
            .with_worker_name(name)
            .with_timings(5, 5, 5);
        config.poll_interval_ms = 20;
        config.heartbeat_interval_ms = 1_000;

        KitchenWorker::new(
            config,
            Arc::clone(&self.orders),
            Arc::clone(&self.registry),
            self.broker.clone(),
            LIVENESS_WINDOW,
        )
    }

    /// Send a GET request to the test server.
    pub async fn get(&self, path: &str) -> TestResponse {
        self.request("GET", path, None, &[]).await
    }

    /// Send a POST request with JSON body.
    pub async fn post(&self, path: &str, body: Value) -> TestResponse {
        self.request("POST", path, Some(body), &[]).await
    }

    /// Send a POST request with JSON body and extra headers.
    pub async fn post_with_headers(
        &self,
        path: &str,
        body: Value,
        headers: &[(&str, &str)],
    ) -> TestResponse {
        self.request("POST", path, Some(body), headers).await
    }

    /// Send a DELETE request.
    pub async fn delete(&self, path: &str) -> TestResponse {
        self.request("DELETE", path, None, &[]).await
    }

    /// Send a DELETE request with JSON body.
    pub async fn delete_with_body(&self, path: &str, body: Value) -> TestResponse {
        self.request("DELETE", path, Some(body), &[]).await
    }

    /// Send a POST request with raw string body (for testing malformed JSON).
    pub async fn post_raw(&self, path: &str, body: &str) -> TestResponse {
        let request = Request::builder()
            .method("POST")
            .uri(path)
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await
    }

    async fn request(
        &self,
        method: &str,
        path: &str,
        body: Option<Value>,
        headers: &[(&str, &str)],
    ) -> TestResponse {
        let mut request_builder = Request::builder().method(method).uri(path);
        for (name, value) in headers {
            request_builder = request_builder.header(*name, *value);
        }

        let body = if let Some(json_body) = body {
            request_builder = request_builder.header("Content-Type", "application/json");
            Body::from(serde_json::to_vec(&json_body).unwrap())
        } else {
            Body::empty()
        };

        let request = request_builder.body(body).unwrap();
        self.send(request).await
    }

    async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let headers = response.headers().clone();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        let text = String::from_utf8_lossy(&body_bytes).to_string();
        let body: Value = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
        };

        TestResponse {
            status,
            headers,
            body,
            text,
        }
    }
}

/// Helper to assert a response has expected status.
#[macro_export]
macro_rules! assert_status {
    ($response:expr, $status:expr) => {
        assert_eq!(
            $response.status, $status,
            "Expected status {:?}, got {:?}. Body: {}",
            $status,
            $response.status,
            serde_json::to_string_pretty(&$response.body).unwrap_or_default()
        );
    };
}
