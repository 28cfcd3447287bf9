//! End-to-end pipeline integration tests.
//!
//! These tests verify an order's complete lifecycle across services sharing
//! one database file:
//! received -> preparing -> ready -> (out_for_delivery) -> completed

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tempfile::TempDir;

use pizzeria_core::{
    order::validate_history,
    testing::{fixtures, RecordingNotifier},
    Broker, ClaimCoordinator, IntakeService, KitchenConfig, KitchenWorker, LivenessReaper,
    NotificationOutcome, NotificationSubscriber, OrderFilter, OrderRef, OrderStatus, OrderStore,
    SqliteOrderStore, SqliteReceiptStore, SqliteWorkerRegistry, TrackingService,
    TransitionRequest, WorkerCapabilities, WorkerRegistry, WorkerStatus,
};
use pizzeria_core::config::{BrokerBackend, BrokerConfig, IntakeConfig};

const WINDOW: Duration = Duration::from_secs(30);

/// Test helper that opens every store on one database file.
struct TestHarness {
    orders: Arc<SqliteOrderStore>,
    registry: Arc<SqliteWorkerRegistry>,
    broker: Broker,
    intake: IntakeService,
    tracking: TrackingService,
    db_path: std::path::PathBuf,
    _temp_dir: TempDir,
}

impl TestHarness {
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("pizzeria.db");

        let orders = Arc::new(SqliteOrderStore::new(&db_path).expect("Failed to open order store"));
        let registry =
            Arc::new(SqliteWorkerRegistry::new(&db_path).expect("Failed to open registry"));
        let broker_config = BrokerConfig {
            backend: BrokerBackend::Sqlite,
            poll_interval_ms: 20,
            ..BrokerConfig::default()
        };
        let broker = Broker::open(&broker_config, &db_path, Duration::from_secs(5))
            .expect("Failed to open broker");

        let intake = IntakeService::new(orders.clone(), broker.clone(), IntakeConfig::default());
        let tracking = TrackingService::new(orders.clone(), registry.clone(), WINDOW);

        Self {
            orders,
            registry,
            broker,
            intake,
            tracking,
            db_path,
            _temp_dir: temp_dir,
        }
    }

    /// A worker with its own connections, as a separate process would have.
    fn kitchen(&self, name: &str) -> KitchenWorker {
        let orders = Arc::new(SqliteOrderStore::new(&self.db_path).expect("Failed to open store"));
        let registry =
            Arc::new(SqliteWorkerRegistry::new(&self.db_path).expect("Failed to open registry"));
        let config = KitchenConfig {
            poll_interval_ms: 20,
            heartbeat_interval_ms: 50,
            ..KitchenConfig::default()
        }
        .with_worker_name(name)
        .with_timings(5, 5, 5);

        KitchenWorker::new(config, orders, registry, self.broker.clone(), WINDOW)
    }

    async fn wait_until_all_completed(&self, expected: i64) {
        let done = OrderFilter::new().with_status(OrderStatus::Completed);
        for _ in 0..500 {
            if self.orders.count(&done).unwrap() == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("orders did not complete in time");
    }
}

#[tokio::test]
async fn test_dine_in_scenario_two_workers() {
    let h = TestHarness::new();

    let placed = h
        .intake
        .place_order(fixtures::dine_in_request("Ada", 4), None)
        .await
        .unwrap();
    assert_eq!(placed.order.status, OrderStatus::Received);

    let a = ClaimCoordinator::new(h.orders.clone());
    let b = ClaimCoordinator::new(Arc::new(SqliteOrderStore::new(&h.db_path).unwrap()));
    let all = WorkerCapabilities::all();

    let claim_a = a.claim_next("kitchen-a", &all).unwrap();
    let claim_b = b.claim_next("kitchen-b", &all).unwrap();
    assert!(claim_a.is_some() ^ claim_b.is_some(), "exactly one worker wins");

    let winner = claim_a.or(claim_b).unwrap();
    let name = winner.processed_by.clone().unwrap();
    assert_eq!(winner.status, OrderStatus::Preparing);

    for next in [OrderStatus::Ready, OrderStatus::Completed] {
        h.orders
            .transition(TransitionRequest::new(winner.id, next).owned_by(name.clone()))
            .unwrap();
    }

    let view = h.tracking.get_order(OrderRef::Id(winner.id)).unwrap();
    assert_eq!(view.order.status, OrderStatus::Completed);
    assert_eq!(view.history.len(), 4);
    assert!(view.order.completed_at.is_some());
}

#[tokio::test]
async fn test_reaper_hands_order_to_another_worker() {
    let h = TestHarness::new();
    let placed = h
        .intake
        .place_order(fixtures::dine_in_request("Grace", 2), None)
        .await
        .unwrap();

    let now = Utc::now();
    h.registry
        .heartbeat_at("kitchen-a", now - chrono::Duration::seconds(31))
        .unwrap();
    let claimed = ClaimCoordinator::new(h.orders.clone())
        .claim_next("kitchen-a", &WorkerCapabilities::all())
        .unwrap()
        .unwrap();
    assert_eq!(claimed.id, placed.order.id);

    let reaper = LivenessReaper::new(
        h.orders.clone(),
        h.registry.clone(),
        h.broker.clone(),
        WINDOW,
        Duration::from_secs(5),
    );
    let report = reaper.reap_once_at(now).unwrap();
    assert_eq!(report.released.len(), 1);

    let released = h.orders.get(placed.order.id).unwrap().unwrap();
    assert_eq!(released.status, OrderStatus::Received);
    assert!(released.processed_by.is_none());

    let workers = h.tracking.list_workers().unwrap();
    assert_eq!(workers[0].effective_status, WorkerStatus::Offline);

    let taken = ClaimCoordinator::new(h.orders.clone())
        .claim_next("kitchen-b", &WorkerCapabilities::all())
        .unwrap()
        .unwrap();
    assert_eq!(taken.id, placed.order.id);
    assert_eq!(taken.processed_by.as_deref(), Some("kitchen-b"));

    let statuses: Vec<_> = h
        .orders
        .history(placed.order.id)
        .unwrap()
        .iter()
        .map(|e| e.status)
        .collect();
    assert_eq!(
        statuses,
        vec![
            OrderStatus::Received,
            OrderStatus::Preparing,
            OrderStatus::Received,
            OrderStatus::Preparing
        ]
    );
    assert!(validate_history(taken.order_type(), &statuses).is_ok());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_full_pipeline_with_competing_workers() {
    let h = TestHarness::new();

    let mut placed = Vec::new();
    for i in 0..3 {
        placed.push(
            h.intake
                .place_order(fixtures::dine_in_request("Ada", i + 1), None)
                .await
                .unwrap()
                .order,
        );
        placed.push(
            h.intake
                .place_order(
                    fixtures::delivery_request("Alan", "1 Infinite Loop, Cupertino"),
                    None,
                )
                .await
                .unwrap()
                .order,
        );
    }

    let a = h.kitchen("kitchen-a");
    let b = h.kitchen("kitchen-b");
    a.start().await.unwrap();
    b.start().await.unwrap();

    h.wait_until_all_completed(placed.len() as i64).await;
    a.stop().await;
    b.stop().await;

    let processed = a.status().await.orders_processed + b.status().await.orders_processed;
    assert_eq!(processed, placed.len() as u64);

    let mut expected_notifications = 0;
    for order in &placed {
        let view = h.tracking.get_order(OrderRef::Id(order.id)).unwrap();
        let statuses: Vec<_> = view.history.iter().map(|e| e.status).collect();
        assert!(validate_history(order.order_type(), &statuses).is_ok());
        assert_eq!(
            statuses
                .iter()
                .filter(|s| **s == OrderStatus::Preparing)
                .count(),
            1,
            "order {} claimed more than once",
            order.id
        );
        expected_notifications += statuses.len() - 1;
    }

    for name in ["kitchen-a", "kitchen-b"] {
        let record = h.registry.get(name).unwrap().unwrap();
        assert_eq!(record.status, WorkerStatus::Offline);
    }

    let notifier = Arc::new(RecordingNotifier::new());
    let receipts = Arc::new(SqliteReceiptStore::new(&h.db_path).unwrap());
    let subscriber =
        NotificationSubscriber::new(h.broker.clone(), receipts.clone(), notifier.clone(), 3);
    let outcomes = subscriber.process_available().await.unwrap();
    assert!(outcomes
        .iter()
        .all(|o| *o == NotificationOutcome::Delivered));
    assert_eq!(notifier.count(), expected_notifications);

    // A restarted subscriber resumes from the committed offset
    let restarted = NotificationSubscriber::new(h.broker.clone(), receipts, notifier.clone(), 3);
    assert!(restarted.process_available().await.unwrap().is_empty());
    assert_eq!(notifier.count(), expected_notifications);
}

#[tokio::test]
async fn test_redelivered_event_notifies_once() {
    let h = TestHarness::new();
    let placed = h
        .intake
        .place_order(fixtures::dine_in_request("Ada", 9), None)
        .await
        .unwrap();
    h.intake
        .cancel_order(placed.order.id, "customer", None, None)
        .await
        .unwrap();

    let notifier = Arc::new(RecordingNotifier::new());
    let receipts = Arc::new(SqliteReceiptStore::new(&h.db_path).unwrap());
    let subscriber =
        NotificationSubscriber::new(h.broker.clone(), receipts, notifier.clone(), 3);
    assert_eq!(
        subscriber.process_available().await.unwrap(),
        vec![NotificationOutcome::Delivered]
    );

    // Same status change published again, as an at-least-once producer may do
    let order = h.orders.get(placed.order.id).unwrap().unwrap();
    h.broker
        .publish_event(
            pizzeria_core::OrderEvent::status_changed(
                &order,
                OrderStatus::Received,
                Some("customer"),
                None,
            ),
            None,
        )
        .await
        .unwrap();

    assert_eq!(
        subscriber.process_available().await.unwrap(),
        vec![NotificationOutcome::Duplicate]
    );
    assert_eq!(notifier.count(), 1);
}
