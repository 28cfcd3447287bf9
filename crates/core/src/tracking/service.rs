//! Read-only queries over orders and workers.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use super::types::{OrderPage, OrderRef, OrderView, TrackingError};
use crate::order::{
    Order, OrderDetails, OrderFilter, OrderStatus, OrderStore, StatusLogEntry,
};
use crate::worker::{WorkerHealth, WorkerRegistry};

pub struct TrackingService {
    orders: Arc<dyn OrderStore>,
    registry: Arc<dyn WorkerRegistry>,
    liveness_window: Duration,
}

impl TrackingService {
    pub fn new(
        orders: Arc<dyn OrderStore>,
        registry: Arc<dyn WorkerRegistry>,
        liveness_window: Duration,
    ) -> Self {
        Self {
            orders,
            registry,
            liveness_window,
        }
    }

    fn resolve(&self, order_ref: OrderRef) -> Result<Order, TrackingError> {
        let order = match order_ref {
            OrderRef::Id(id) => self.orders.get(id)?,
            OrderRef::Number(number) => self.orders.get_by_number(number)?,
        };
        order.ok_or(TrackingError::NotFound(order_ref))
    }

    pub fn get_order(&self, order_ref: OrderRef) -> Result<OrderView, TrackingError> {
        self.get_order_at(order_ref, Utc::now())
    }

    /// Order view with worker liveness judged as of `now`.
    pub fn get_order_at(
        &self,
        order_ref: OrderRef,
        now: DateTime<Utc>,
    ) -> Result<OrderView, TrackingError> {
        let id = self.resolve(order_ref)?.id;
        let OrderDetails {
            order,
            items,
            history,
        } = self
            .orders
            .details(id)?
            .ok_or(TrackingError::NotFound(order_ref))?;

        let worker = match order.processed_by.as_deref() {
            Some(name) => self
                .registry
                .get(name)?
                .map(|record| WorkerHealth::derive(record, now, self.liveness_window)),
            None => None,
        };

        Ok(OrderView {
            order,
            items,
            history,
            worker,
        })
    }

    pub fn history(&self, order_ref: OrderRef) -> Result<Vec<StatusLogEntry>, TrackingError> {
        let order = self.resolve(order_ref)?;
        Ok(self.orders.history(order.id)?)
    }

    pub fn list_orders(&self, filter: &OrderFilter) -> Result<OrderPage, TrackingError> {
        let orders = self.orders.list(filter)?;
        let total = self.orders.count(filter)?;
        Ok(OrderPage {
            orders,
            total,
            limit: filter.limit,
            offset: filter.offset,
        })
    }

    /// Order count for every status, in lifecycle order.
    pub fn count_by_status(&self) -> Result<Vec<(OrderStatus, i64)>, TrackingError> {
        OrderStatus::ALL
            .into_iter()
            .map(|status| {
                let count = self.orders.count(&OrderFilter::new().with_status(status))?;
                Ok((status, count))
            })
            .collect()
    }

    pub fn list_workers(&self) -> Result<Vec<WorkerHealth>, TrackingError> {
        self.list_workers_at(Utc::now())
    }

    /// Every known worker, with effective status recomputed as of `now`.
    pub fn list_workers_at(&self, now: DateTime<Utc>) -> Result<Vec<WorkerHealth>, TrackingError> {
        Ok(self
            .registry
            .list()?
            .into_iter()
            .map(|record| WorkerHealth::derive(record, now, self.liveness_window))
            .collect())
    }
}
