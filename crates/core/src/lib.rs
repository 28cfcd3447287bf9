pub mod broker;
pub mod claim;
pub mod config;
mod db;
pub mod error;
pub mod intake;
pub mod kitchen;
pub mod metrics;
pub mod notify;
pub mod order;
pub mod retry;
pub mod testing;
pub mod tracking;
pub mod worker;

pub use broker::{
    topics, Broker, BrokerError, DeadLetter, Delivery, EventEnvelope, MemoryMessageLog,
    MessageLog, OrderEvent, SqliteMessageLog, StartPosition, Subscription,
};
pub use claim::{
    ClaimCoordinator, ClaimError, LivenessReaper, ReapReport, ReleaseReason, WorkerCapabilities,
};
pub use config::{
    load_config, load_config_from_env, load_config_from_str, validate_config, validate_role,
    Config, ConfigError, SanitizedConfig, ServiceRole,
};
pub use error::ErrorKind;
pub use intake::{
    IntakeError, IntakeService, PlaceOrderRequest, ValidationError, INTAKE_ACTOR,
};
pub use kitchen::{KitchenConfig, KitchenError, KitchenStatus, KitchenWorker};
pub use notify::{
    create_notifier, LogNotifier, NotificationOutcome, NotificationSubscriber, Notifier,
    NotifyError, ReceiptStore, Reservation, SqliteReceiptStore, WebhookNotifier,
};
pub use order::{
    CreateOrderRequest, Destination, NewOrderItem, Order, OrderDetails, OrderFilter, OrderItem,
    OrderStatus, OrderStore, OrderType, SqliteOrderStore, StatusChange, StatusLogEntry,
    StoreError, TransitionError, TransitionRequest,
};
pub use retry::{retry_with_backoff, RetryPolicy};
pub use tracking::{OrderPage, OrderRef, OrderView, TrackingError, TrackingService};
pub use worker::{
    SqliteWorkerRegistry, WorkerError, WorkerHealth, WorkerRecord, WorkerRegistry, WorkerStatus,
};
