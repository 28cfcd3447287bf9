//! In-process API tests over real stores.

mod common;

use std::time::Duration;

use axum::http::StatusCode;
use serde_json::{json, Value};

use common::{fixtures, TestFixture};

fn dine_in_body(customer: &str, table: u32) -> Value {
    serde_json::to_value(fixtures::dine_in_request(customer, table)).unwrap()
}

async fn place(fixture: &TestFixture, body: Value) -> Value {
    let response = fixture.post("/api/v1/orders", body).await;
    assert_status!(response, StatusCode::CREATED);
    response.body
}

// =============================================================================
// Basic API Tests
// =============================================================================

#[tokio::test]
async fn test_health_endpoint() {
    let fixture = TestFixture::new().await;
    let response = fixture.get("/api/v1/health").await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["status"], "ok");
}

#[tokio::test]
async fn test_config_hides_webhook_url() {
    let fixture = TestFixture::new().await;
    let response = fixture.get("/api/v1/config").await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["notifier"]["webhook_configured"], true);
    assert!(!response.text.contains("secret-token"));
}

// =============================================================================
// Intake
// =============================================================================

#[tokio::test]
async fn test_place_dine_in_order() {
    let fixture = TestFixture::new().await;

    let body = place(&fixture, dine_in_body("Ada", 4)).await;

    assert_eq!(body["order"]["status"], "received");
    assert_eq!(body["order"]["customer_name"], "Ada");
    assert_eq!(body["order"]["destination"]["type"], "dine_in");
    assert_eq!(body["order"]["destination"]["table_number"], 4);
    assert_eq!(body["order"]["priority"], 1);
    assert_eq!(body["items"].as_array().unwrap().len(), 1);
    assert_eq!(body["history"].as_array().unwrap().len(), 1);
    assert_eq!(body["history"][0]["changed_by"], "order-service");
}

#[tokio::test]
async fn test_place_order_from_literal_json() {
    let fixture = TestFixture::new().await;

    let body = place(
        &fixture,
        json!({
            "customer_name": "  Grace  ",
            "type": "delivery",
            "address": "12 Harbour Street",
            "items": [
                {"name": "Diavola", "quantity": 2, "price": 12.5},
                {"name": "Calzone", "quantity": 1, "price": "11.00"}
            ],
            "priority": 42
        }),
    )
    .await;

    assert_eq!(body["order"]["customer_name"], "Grace");
    assert_eq!(body["order"]["destination"]["type"], "delivery");
    assert_eq!(body["order"]["priority"], 42);
    assert_eq!(body["items"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_place_order_validation_error() {
    let fixture = TestFixture::new().await;

    let response = fixture
        .post("/api/v1/orders", dine_in_body("Ada", 250))
        .await;

    assert_status!(response, StatusCode::BAD_REQUEST);
    assert_eq!(response.body["error"]["kind"], "validation");
    assert!(response.body["error"]["message"]
        .as_str()
        .unwrap()
        .contains("table_number"));

    let list = fixture.get("/api/v1/orders").await;
    assert_eq!(list.body["total"], 0);
}

#[tokio::test]
async fn test_place_order_malformed_json() {
    let fixture = TestFixture::new().await;

    let response = fixture.post_raw("/api/v1/orders", "{not json").await;

    assert_status!(response, StatusCode::BAD_REQUEST);
    assert_eq!(response.body["error"]["kind"], "validation");
}

#[tokio::test]
async fn test_place_order_missing_destination() {
    let fixture = TestFixture::new().await;

    let response = fixture
        .post(
            "/api/v1/orders",
            json!({
                "customer_name": "Ada",
                "items": [{"name": "Margherita", "quantity": 1, "price": 9.5}]
            }),
        )
        .await;

    assert_status!(response, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_request_id_is_echoed() {
    let fixture = TestFixture::new().await;

    let response = fixture
        .post_with_headers(
            "/api/v1/orders",
            dine_in_body("Ada", 4),
            &[("x-request-id", "req-pizza-1")],
        )
        .await;

    assert_status!(response, StatusCode::CREATED);
    assert_eq!(response.headers["x-request-id"], "req-pizza-1");
}

// =============================================================================
// Tracking
// =============================================================================

#[tokio::test]
async fn test_get_order_by_id_and_number() {
    let fixture = TestFixture::new().await;
    let created = place(&fixture, dine_in_body("Ada", 4)).await;
    let id = created["order"]["id"].as_i64().unwrap();
    let number = created["order"]["number"].as_i64().unwrap();

    let by_id = fixture.get(&format!("/api/v1/orders/{}", id)).await;
    assert_status!(by_id, StatusCode::OK);
    assert_eq!(by_id.body["order"]["id"], id);
    assert!(by_id.body["worker"].is_null());

    let by_number = fixture
        .get(&format!("/api/v1/orders/number/{}", number))
        .await;
    assert_status!(by_number, StatusCode::OK);
    assert_eq!(by_number.body["order"]["id"], id);
}

#[tokio::test]
async fn test_unknown_order_is_not_found() {
    let fixture = TestFixture::new().await;

    let response = fixture.get("/api/v1/orders/999").await;
    assert_status!(response, StatusCode::NOT_FOUND);
    assert_eq!(response.body["error"]["kind"], "not_found");

    let history = fixture.get("/api/v1/orders/999/history").await;
    assert_status!(history, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_list_orders_with_filters() {
    let fixture = TestFixture::new().await;
    for table in 1..=3 {
        place(&fixture, dine_in_body("Ada", table)).await;
    }
    let delivery =
        serde_json::to_value(fixtures::delivery_request("Linus", "7 Long Road, Springfield"))
            .unwrap();
    place(&fixture, delivery).await;

    let page = fixture.get("/api/v1/orders?limit=2").await;
    assert_status!(page, StatusCode::OK);
    assert_eq!(page.body["orders"].as_array().unwrap().len(), 2);
    assert_eq!(page.body["total"], 4);
    assert_eq!(page.body["limit"], 2);

    let received = fixture.get("/api/v1/orders?status=received").await;
    assert_eq!(received.body["total"], 4);

    let deliveries = fixture.get("/api/v1/orders?order_type=delivery").await;
    assert_eq!(deliveries.body["total"], 1);

    let completed = fixture.get("/api/v1/orders?status=completed").await;
    assert_eq!(completed.body["total"], 0);
}

#[tokio::test]
async fn test_list_orders_unknown_status() {
    let fixture = TestFixture::new().await;

    let response = fixture.get("/api/v1/orders?status=baking").await;
    assert_status!(response, StatusCode::BAD_REQUEST);
    assert_eq!(response.body["error"]["kind"], "validation");
}

// =============================================================================
// Cancellation
// =============================================================================

#[tokio::test]
async fn test_cancel_order() {
    let fixture = TestFixture::new().await;
    let created = place(&fixture, dine_in_body("Ada", 4)).await;
    let id = created["order"]["id"].as_i64().unwrap();

    let response = fixture
        .delete_with_body(
            &format!("/api/v1/orders/{}", id),
            json!({"reason": "changed my mind", "cancelled_by": "front-desk"}),
        )
        .await;
    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["status"], "cancelled");

    let history = fixture.get(&format!("/api/v1/orders/{}/history", id)).await;
    let entries = history.body["history"].as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[1]["status"], "cancelled");
    assert_eq!(entries[1]["changed_by"], "front-desk");
    assert_eq!(entries[1]["notes"], "changed my mind");

    // Terminal: a second cancel is refused
    let again = fixture.delete(&format!("/api/v1/orders/{}", id)).await;
    assert_status!(again, StatusCode::CONFLICT);
    assert_eq!(again.body["error"]["kind"], "invalid_transition");
}

#[tokio::test]
async fn test_cancel_unknown_order() {
    let fixture = TestFixture::new().await;

    let response = fixture.delete("/api/v1/orders/404").await;
    assert_status!(response, StatusCode::NOT_FOUND);
}

// =============================================================================
// Workers and kitchen
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_kitchen_completes_order_placed_over_http() {
    let fixture = TestFixture::new().await;
    let kitchen = fixture.kitchen("kitchen-http");
    kitchen.start().await.unwrap();

    let created = place(&fixture, dine_in_body("Ada", 4)).await;
    let id = created["order"]["id"].as_i64().unwrap();

    let mut view = Value::Null;
    for _ in 0..200 {
        view = fixture.get(&format!("/api/v1/orders/{}", id)).await.body;
        if view["order"]["status"] == "completed" {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    assert_eq!(view["order"]["status"], "completed");
    assert_eq!(view["order"]["processed_by"], "kitchen-http");
    assert!(!view["order"]["completed_at"].is_null());
    assert_eq!(view["history"].as_array().unwrap().len(), 4);
    assert_eq!(view["worker"]["name"], "kitchen-http");

    let workers = fixture.get("/api/v1/workers").await;
    assert_status!(workers, StatusCode::OK);
    assert_eq!(workers.body["workers"][0]["name"], "kitchen-http");
    assert_ne!(workers.body["workers"][0]["effective_status"], "offline");

    kitchen.stop().await;

    let workers = fixture.get("/api/v1/workers").await;
    assert_eq!(workers.body["workers"][0]["effective_status"], "offline");
}

// =============================================================================
// Metrics
// =============================================================================

#[tokio::test]
async fn test_metrics_endpoint() {
    let fixture = TestFixture::new().await;
    place(&fixture, dine_in_body("Ada", 4)).await;

    let response = fixture.get("/metrics").await;
    assert_eq!(response.status, StatusCode::OK);
    assert!(response.text.contains("pizzeria_http_requests_total"));
    assert!(response.text.contains("pizzeria_orders_by_status"));
    assert!(response.text.contains("pizzeria_orders_created_total"));
}
