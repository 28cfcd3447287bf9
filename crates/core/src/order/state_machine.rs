//! Order status transition rules.
//!
//! Forward path: `received -> preparing -> ready -> completed`, with delivery
//! orders passing through `out_for_delivery` between `ready` and `completed`.
//! `cancelled` is reachable from `received` and `preparing`. A claimed order
//! can be requeued back to `received` only through a release.

use thiserror::Error;

use super::types::{OrderStatus, OrderType};

/// Rejected status change. No write is performed when this is returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("invalid transition for {order_type} order: {from} -> {to}")]
    InvalidTransition {
        from: OrderStatus,
        to: OrderStatus,
        order_type: OrderType,
    },

    #[error("order in status {0} cannot be released")]
    NotReleasable(OrderStatus),

    #[error("moving to preparing requires a claim")]
    RequiresClaim,

    #[error("status history is empty")]
    EmptyHistory,

    #[error("status history must start at received, found {0}")]
    InvalidStart(OrderStatus),
}

impl OrderStatus {
    /// Whether `next` is a legal forward step from `self` for this order type.
    pub fn can_transition_to(&self, next: OrderStatus, order_type: OrderType) -> bool {
        use OrderStatus::*;

        match (*self, next) {
            (Received, Preparing) => true,
            (Preparing, Ready) => true,
            (Ready, Completed) => order_type == OrderType::DineIn,
            (Ready, OutForDelivery) => order_type == OrderType::Delivery,
            (OutForDelivery, Completed) => order_type == OrderType::Delivery,
            (Received | Preparing, Cancelled) => true,
            _ => false,
        }
    }

    /// Whether a release may send an order in this status back to `received`.
    pub fn can_release(&self) -> bool {
        self.is_claimed()
    }
}

pub fn validate_transition(
    current: OrderStatus,
    next: OrderStatus,
    order_type: OrderType,
) -> Result<(), TransitionError> {
    if current.can_transition_to(next, order_type) {
        Ok(())
    } else {
        Err(TransitionError::InvalidTransition {
            from: current,
            to: next,
            order_type,
        })
    }
}

pub fn validate_release(current: OrderStatus) -> Result<(), TransitionError> {
    if current.can_release() {
        Ok(())
    } else {
        Err(TransitionError::NotReleasable(current))
    }
}

/// Check that a chronological status log is a path through the graph.
pub fn validate_history(
    order_type: OrderType,
    history: &[OrderStatus],
) -> Result<(), TransitionError> {
    let Some(first) = history.first() else {
        return Err(TransitionError::EmptyHistory);
    };
    if *first != OrderStatus::Received {
        return Err(TransitionError::InvalidStart(*first));
    }

    for pair in history.windows(2) {
        let (from, to) = (pair[0], pair[1]);
        let requeue = to == OrderStatus::Received && from.can_release();
        if !requeue {
            validate_transition(from, to, order_type)?;
        }
    }

    Ok(())
}

/// The next status the kitchen moves an order to, or `None` once it is done.
pub fn next_kitchen_step(current: OrderStatus, order_type: OrderType) -> Option<OrderStatus> {
    match (current, order_type) {
        (OrderStatus::Preparing, _) => Some(OrderStatus::Ready),
        (OrderStatus::Ready, OrderType::DineIn) => Some(OrderStatus::Completed),
        (OrderStatus::Ready, OrderType::Delivery) => Some(OrderStatus::OutForDelivery),
        (OrderStatus::OutForDelivery, OrderType::Delivery) => Some(OrderStatus::Completed),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use OrderStatus::*;

    #[test]
    fn test_dine_in_forward_path() {
        let t = OrderType::DineIn;
        assert!(Received.can_transition_to(Preparing, t));
        assert!(Preparing.can_transition_to(Ready, t));
        assert!(Ready.can_transition_to(Completed, t));
        assert!(!Ready.can_transition_to(OutForDelivery, t));
    }

    #[test]
    fn test_delivery_requires_out_for_delivery() {
        let t = OrderType::Delivery;
        assert!(!Ready.can_transition_to(Completed, t));
        assert!(Ready.can_transition_to(OutForDelivery, t));
        assert!(OutForDelivery.can_transition_to(Completed, t));
    }

    #[test]
    fn test_cancel_only_early() {
        for t in OrderType::ALL {
            assert!(Received.can_transition_to(Cancelled, t));
            assert!(Preparing.can_transition_to(Cancelled, t));
            assert!(!Ready.can_transition_to(Cancelled, t));
            assert!(!OutForDelivery.can_transition_to(Cancelled, t));
        }
    }

    #[test]
    fn test_terminal_states_accept_nothing() {
        for t in OrderType::ALL {
            for next in OrderStatus::ALL {
                assert!(!Completed.can_transition_to(next, t));
                assert!(!Cancelled.can_transition_to(next, t));
            }
        }
    }

    #[test]
    fn test_no_skipping_or_reversing() {
        let t = OrderType::DineIn;
        assert!(!Received.can_transition_to(Ready, t));
        assert!(!Received.can_transition_to(Completed, t));
        assert!(!Ready.can_transition_to(Preparing, t));
        assert!(!Preparing.can_transition_to(Received, t));
    }

    #[test]
    fn test_validate_transition_error() {
        let err = validate_transition(Ready, Completed, OrderType::Delivery).unwrap_err();
        assert_eq!(
            err,
            TransitionError::InvalidTransition {
                from: Ready,
                to: Completed,
                order_type: OrderType::Delivery,
            }
        );
        assert_eq!(
            err.to_string(),
            "invalid transition for delivery order: ready -> completed"
        );
    }

    #[test]
    fn test_release_from_claimed_states_only() {
        assert!(validate_release(Preparing).is_ok());
        assert!(validate_release(Ready).is_ok());
        assert!(validate_release(OutForDelivery).is_ok());
        assert_eq!(
            validate_release(Received),
            Err(TransitionError::NotReleasable(Received))
        );
        assert!(validate_release(Completed).is_err());
    }

    #[test]
    fn test_history_with_requeue_is_valid() {
        let history = [Received, Preparing, Received, Preparing, Ready, Completed];
        assert!(validate_history(OrderType::DineIn, &history).is_ok());
    }

    #[test]
    fn test_history_rejects_skips() {
        let history = [Received, Ready];
        assert!(validate_history(OrderType::DineIn, &history).is_err());
        assert_eq!(
            validate_history(OrderType::DineIn, &[Preparing]),
            Err(TransitionError::InvalidStart(Preparing))
        );
        assert_eq!(
            validate_history(OrderType::DineIn, &[]),
            Err(TransitionError::EmptyHistory)
        );
    }

    #[test]
    fn test_kitchen_steps() {
        assert_eq!(next_kitchen_step(Preparing, OrderType::DineIn), Some(Ready));
        assert_eq!(next_kitchen_step(Ready, OrderType::DineIn), Some(Completed));
        assert_eq!(
            next_kitchen_step(Ready, OrderType::Delivery),
            Some(OutForDelivery)
        );
        assert_eq!(
            next_kitchen_step(OutForDelivery, OrderType::Delivery),
            Some(Completed)
        );
        assert_eq!(next_kitchen_step(Completed, OrderType::DineIn), None);
        assert_eq!(next_kitchen_step(Received, OrderType::DineIn), None);
    }
}
