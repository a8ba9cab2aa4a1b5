//! # Delivery
//!
//! Hands allocated units to the buyer. The chat layer implements
//! [`Delivery`]; the engine calls it once per settled order, after the
//! settlement transaction has committed.
//!
//! ```text
//! settle (commit) ──► deliver(account, order_id, units)
//!                        │
//!                        ├── Ok  ──► order completed
//!                        └── Err ──► order failed + refund
//! ```

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

use vendo_core::AccountId;

/// Why a delivery did not reach the buyer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct DeliveryError(pub String);

impl DeliveryError {
    pub fn new(reason: impl Into<String>) -> Self {
        DeliveryError(reason.into())
    }
}

#[async_trait]
pub trait Delivery: Send + Sync {
    /// Sends `units` for `order_id` to `account_id`.
    async fn deliver(
        &self,
        account_id: AccountId,
        order_id: i64,
        units: &[String],
    ) -> Result<(), DeliveryError>;
}

/// Delivery that only records the hand-over in the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogDelivery;

#[async_trait]
impl Delivery for LogDelivery {
    async fn deliver(
        &self,
        account_id: AccountId,
        order_id: i64,
        units: &[String],
    ) -> Result<(), DeliveryError> {
        info!(account_id, order_id, units = units.len(), "Units delivered");
        Ok(())
    }
}
