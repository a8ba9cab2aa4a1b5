//! # Notifications
//!
//! Fire-and-forget events for buyers and admins. The engine emits them
//! after the state change they describe has committed; delivery of the
//! message is the chat layer's business.

use serde::Serialize;
use tracing::{info, warn};

use vendo_core::topup::TopUpStatus;
use vendo_core::{AccountId, Money};

/// Something a buyer or admin should hear about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    /// A manual-payment order is waiting for an admin decision.
    PaymentReview {
        order_id: i64,
        account_id: AccountId,
        total: Money,
    },
    OrderCompleted {
        order_id: i64,
        account_id: AccountId,
        units: i64,
    },
    OrderFailed {
        order_id: i64,
        account_id: AccountId,
        reason: String,
        refunded: Money,
    },
    OrderRejected {
        order_id: i64,
        account_id: AccountId,
        reason: String,
        refunded: Money,
    },
    OrderExpired {
        order_id: i64,
        account_id: AccountId,
    },
    LowStock {
        pool: String,
        remaining: i64,
    },
    Restocked {
        pool: String,
        added: i64,
        size: i64,
    },
    TopUpRequested {
        request_id: i64,
        account_id: AccountId,
        amount: Money,
    },
    TopUpDecided {
        request_id: i64,
        account_id: AccountId,
        status: TopUpStatus,
    },
}

/// Receives notifications. Must not block.
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: &Notification);
}

/// Drops every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpNotifier;

impl Notifier for NoOpNotifier {
    fn notify(&self, _notification: &Notification) {}
}

/// Writes every notification to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, notification: &Notification) {
        match notification {
            Notification::LowStock { pool, remaining } => {
                warn!(pool = %pool, remaining, "Low stock")
            }
            Notification::OrderFailed {
                order_id, reason, ..
            } => warn!(order_id, reason = %reason, "Order failed"),
            other => info!(notification = ?other, "Notification"),
        }
    }
}
