//! Order intake: validate, persist, announce.

use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{info, warn};

use super::types::{
    max_item_price, IntakeError, PlaceOrderRequest, ValidationError, MAX_CUSTOMER_NAME_LEN,
    MAX_ITEMS, MAX_ITEM_NAME_LEN, MAX_PRIORITY, MAX_QUANTITY, MAX_TABLE_NUMBER, MIN_ADDRESS_LEN,
};
use crate::broker::{Broker, OrderEvent};
use crate::config::IntakeConfig;
use crate::metrics;
use crate::order::{
    CreateOrderRequest, Destination, Order, OrderDetails, OrderStatus, OrderStore, StatusChange,
    TransitionRequest,
};
use crate::retry::{retry_with_backoff, RetryPolicy};

const SERVICE: &str = "order-service";

/// Actor recorded on the initial `received` log row.
pub const INTAKE_ACTOR: &str = "order-service";

/// Check a request without touching anything.
pub fn validate_request(request: &PlaceOrderRequest) -> Result<(), ValidationError> {
    let name = request.customer_name.trim();
    if name.is_empty() {
        return Err(ValidationError::EmptyCustomerName);
    }
    if name.chars().count() > MAX_CUSTOMER_NAME_LEN {
        return Err(ValidationError::CustomerNameTooLong);
    }

    match &request.destination {
        Destination::DineIn { table_number } => {
            if !(1..=MAX_TABLE_NUMBER).contains(table_number) {
                return Err(ValidationError::TableNumberOutOfRange(*table_number));
            }
        }
        Destination::Delivery { address } => {
            if address.trim().chars().count() < MIN_ADDRESS_LEN {
                return Err(ValidationError::AddressTooShort);
            }
        }
    }

    if request.items.is_empty() || request.items.len() > MAX_ITEMS {
        return Err(ValidationError::ItemCount(request.items.len()));
    }

    let max_price = max_item_price();
    for (index, item) in request.items.iter().enumerate() {
        let item_name = item.name.trim();
        if item_name.is_empty() {
            return Err(ValidationError::EmptyItemName(index));
        }
        if item_name.chars().count() > MAX_ITEM_NAME_LEN {
            return Err(ValidationError::ItemNameTooLong(index));
        }
        if !(1..=MAX_QUANTITY).contains(&item.quantity) {
            return Err(ValidationError::QuantityOutOfRange {
                index,
                quantity: item.quantity,
            });
        }
        if item.price.is_sign_negative() || item.price > max_price {
            return Err(ValidationError::PriceOutOfRange {
                index,
                price: item.price,
            });
        }
    }

    if let Some(priority) = request.priority {
        if !(0..=MAX_PRIORITY).contains(&priority) {
            return Err(ValidationError::PriorityOutOfRange(priority));
        }
    }

    Ok(())
}

/// Sum of quantity times price over every item.
pub fn order_total(request: &PlaceOrderRequest) -> Decimal {
    request.items.iter().map(|item| item.line_total()).sum()
}

/// Priority derived from the order total: big orders go first.
pub fn priority_for_total(total: Decimal) -> i32 {
    if total > Decimal::from(100) {
        10
    } else if total >= Decimal::from(50) {
        5
    } else {
        1
    }
}

/// Accepts new orders and customer cancellations.
pub struct IntakeService {
    orders: Arc<dyn OrderStore>,
    broker: Broker,
    config: IntakeConfig,
    retry: RetryPolicy,
}

impl IntakeService {
    pub fn new(orders: Arc<dyn OrderStore>, broker: Broker, config: IntakeConfig) -> Self {
        Self {
            orders,
            broker,
            config,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn resolve_priority(&self, request: &PlaceOrderRequest, total: Decimal) -> i32 {
        request
            .priority
            .or(self.config.default_priority)
            .unwrap_or_else(|| priority_for_total(total))
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T, IntakeError>
    where
        F: FnOnce(&dyn OrderStore) -> Result<T, IntakeError> + Send + 'static,
        T: Send + 'static,
    {
        let orders = Arc::clone(&self.orders);
        tokio::task::spawn_blocking(move || f(orders.as_ref()))
            .await
            .map_err(|e| IntakeError::Internal(format!("store task failed: {}", e)))?
    }

    /// Validate and persist a new order, then publish `order.created`.
    ///
    /// The order is returned even when the event could not be published.
    pub async fn place_order(
        &self,
        request: PlaceOrderRequest,
        correlation_id: Option<String>,
    ) -> Result<OrderDetails, IntakeError> {
        if let Err(e) = validate_request(&request) {
            metrics::ORDERS_REJECTED.inc();
            info!(
                service = SERVICE,
                action = "validate",
                correlation_id = correlation_id.as_deref().unwrap_or(""),
                field = e.field(),
                "Order rejected: {}",
                e
            );
            return Err(e.into());
        }

        let total = order_total(&request);
        let create = CreateOrderRequest {
            customer_name: request.customer_name.trim().to_string(),
            destination: request.destination.clone(),
            items: request
                .items
                .iter()
                .map(|item| {
                    let mut item = item.clone();
                    item.name = item.name.trim().to_string();
                    item
                })
                .collect(),
            total_amount: total,
            priority: self.resolve_priority(&request, total),
            created_by: INTAKE_ACTOR.to_string(),
        };

        // A busy database rejects the transaction before anything is written,
        // so retrying creation cannot duplicate the order.
        let details = retry_with_backoff(
            &self.retry,
            "create_order",
            IntakeError::is_transient,
            move || {
                let create = create.clone();
                self.blocking(move |orders| orders.create(create).map_err(IntakeError::from))
            },
        )
        .await?;

        let order = &details.order;
        metrics::ORDERS_CREATED
            .with_label_values(&[order.order_type().as_str()])
            .inc();
        metrics::TRANSITIONS
            .with_label_values(&[OrderStatus::Received.as_str()])
            .inc();
        info!(
            service = SERVICE,
            action = "create",
            order_id = order.id,
            number = order.number,
            order_type = %order.order_type(),
            priority = order.priority,
            total = %order.total_amount,
            correlation_id = correlation_id.as_deref().unwrap_or(""),
            "Order received"
        );

        if let Err(e) = self
            .broker
            .publish_event(OrderEvent::created(order), correlation_id.clone())
            .await
        {
            warn!(
                service = SERVICE,
                action = "publish",
                order_id = order.id,
                correlation_id = correlation_id.as_deref().unwrap_or(""),
                "order.created not published, workers will find the order by polling: {}",
                e
            );
        }

        Ok(details)
    }

    /// Cancel an order that has not completed yet.
    pub async fn cancel_order(
        &self,
        order_id: i64,
        actor: &str,
        reason: Option<&str>,
        correlation_id: Option<String>,
    ) -> Result<Order, IntakeError> {
        let StatusChange {
            order,
            from: previous,
        } = {
            let actor = actor.to_string();
            let reason = reason.map(str::to_string);
            self.blocking(move |orders| {
                let mut request = TransitionRequest::new(order_id, OrderStatus::Cancelled).by(actor);
                if let Some(reason) = reason {
                    request = request.with_notes(reason);
                }
                Ok(orders.transition(request)?)
            })
            .await?
        };

        metrics::TRANSITIONS
            .with_label_values(&[OrderStatus::Cancelled.as_str()])
            .inc();
        info!(
            service = SERVICE,
            action = "cancel",
            order_id,
            from = %previous,
            actor,
            correlation_id = correlation_id.as_deref().unwrap_or(""),
            "Order cancelled"
        );

        let event = OrderEvent::status_changed(&order, previous, Some(actor), reason);
        if let Err(e) = self.broker.publish_event(event, correlation_id).await {
            warn!(
                service = SERVICE,
                action = "publish",
                order_id,
                "Cancellation event not published: {}",
                e
            );
        }

        Ok(order)
    }
}
