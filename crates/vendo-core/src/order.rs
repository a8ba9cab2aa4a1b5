//! # Order Types
//!
//! The order record, its lifecycle states, and the product kinds the shop
//! sells.
//!
//! ## Lifecycle
//! ```text
//!                         ┌──────────────────┐
//!    manual payment ────► │ awaiting_payment │ ◄──── balance payment
//!                         └────────┬─────────┘       (settles at once)
//!                                  │
//!        ┌──────────────┬──────────┼──────────────┬──────────────┐
//!        ▼              ▼          ▼              ▼              │
//!   ┌─────────┐   ┌──────────┐ ┌────────┐   ┌─────────┐         │
//!   │completed│   │ rejected │ │expired │   │ failed  │ ◄───────┘
//!   └─────────┘   └──────────┘ └────────┘   └─────────┘
//!
//!   Terminal states have no outgoing transitions.
//! ```
//!
//! ## Price Freezing
//! Unit price, bonus, discount and total are copied onto the order when it
//! is created. Approving an order hours later charges what the buyer was
//! quoted, even if the catalog changed in between.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ValidationError;
use crate::money::Money;
use crate::AccountId;

// =============================================================================
// Order Status
// =============================================================================

/// The lifecycle state of an order.
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Waiting for proof-of-payment and an admin decision.
    AwaitingPayment,
    /// Paid and delivered.
    Completed,
    /// Admin refused the payment proof.
    Rejected,
    /// Nobody acted before the expiry window closed.
    Expired,
    /// Settlement or delivery failed; captured funds were refunded.
    Failed,
}

impl OrderStatus {
    /// Completed, rejected, expired and failed are final.
    #[inline]
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, OrderStatus::AwaitingPayment)
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::AwaitingPayment => "awaiting_payment",
            OrderStatus::Completed => "completed",
            OrderStatus::Rejected => "rejected",
            OrderStatus::Expired => "expired",
            OrderStatus::Failed => "failed",
        }
    }
}

impl Default for OrderStatus {
    fn default() -> Self {
        OrderStatus::AwaitingPayment
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Payment Method
// =============================================================================

#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Debited from the buyer's prepaid balance.
    Balance,
    /// External transfer, verified by an admin from a payment proof.
    Manual,
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PaymentMethod::Balance => f.write_str("balance"),
            PaymentMethod::Manual => f.write_str("manual"),
        }
    }
}

// =============================================================================
// Product Kind
// =============================================================================

/// What an order buys. Each kind draws from exactly one inventory pool.
///
/// ## Text Form
/// ```text
/// Link                          ⇄ "link"               → pool "links"
/// AiLink                        ⇄ "ai_link"            → pool "ai_links"
/// Credential { product: "vpn" } ⇄ "credential:vpn"     → pool "credentials:vpn"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ProductKind {
    Link,
    AiLink,
    Credential { product: String },
}

impl ProductKind {
    /// Builds a credential kind for the given product name.
    pub fn credential(product: impl Into<String>) -> Self {
        ProductKind::Credential {
            product: product.into(),
        }
    }

    /// The inventory pool this kind is delivered from.
    pub fn pool_name(&self) -> String {
        match self {
            ProductKind::Link => "links".to_string(),
            ProductKind::AiLink => "ai_links".to_string(),
            ProductKind::Credential { product } => format!("credentials:{}", product),
        }
    }
}

impl fmt::Display for ProductKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProductKind::Link => f.write_str("link"),
            ProductKind::AiLink => f.write_str("ai_link"),
            ProductKind::Credential { product } => write!(f, "credential:{}", product),
        }
    }
}

impl FromStr for ProductKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "link" => Ok(ProductKind::Link),
            "ai_link" => Ok(ProductKind::AiLink),
            other => match other.strip_prefix("credential:") {
                Some(product) if !product.trim().is_empty() => {
                    Ok(ProductKind::credential(product.trim()))
                }
                _ => Err(ValidationError::InvalidFormat {
                    field: "product".to_string(),
                    reason: format!(
                        "unknown product '{}', expected link, ai_link or credential:<name>",
                        other
                    ),
                }),
            },
        }
    }
}

impl TryFrom<String> for ProductKind {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ProductKind> for String {
    fn from(kind: ProductKind) -> Self {
        kind.to_string()
    }
}

// =============================================================================
// Order Quote
// =============================================================================

/// Price breakdown computed before an order exists.
///
/// A quote is what the buyer confirms; the same numbers are frozen onto the
/// order at creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderQuote {
    pub product: ProductKind,
    pub quantity: i64,
    pub bonus_quantity: i64,
    pub unit_price: Money,
    pub subtotal: Money,
    pub discount: Money,
    pub total: Money,
    pub coupon_code: Option<String>,
}

impl OrderQuote {
    /// Units the buyer receives: paid units plus bonus units.
    #[inline]
    pub fn units_to_deliver(&self) -> i64 {
        self.quantity + self.bonus_quantity
    }
}

// =============================================================================
// Order
// =============================================================================

/// A purchase, from creation to its terminal state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub account_id: AccountId,
    pub product: ProductKind,
    pub quantity: i64,
    pub bonus_quantity: i64,
    pub unit_price: Money,
    pub subtotal: Money,
    pub discount: Money,
    pub total: Money,
    pub coupon_code: Option<String>,
    pub status: OrderStatus,
    pub payment_method: PaymentMethod,
    pub created_at: DateTime<Utc>,
    /// Set once, when the order reaches a terminal state.
    pub terminal_at: Option<DateTime<Utc>>,
    /// Set when stock and funds have been committed and delivery is running.
    pub settling_at: Option<DateTime<Utc>>,
    /// Units handed to the buyer (empty until settlement).
    pub units: Vec<String>,
    /// Why the order was rejected or failed.
    pub note: Option<String>,
}

impl Order {
    /// Builds a fresh order from a confirmed quote.
    pub fn from_quote(
        id: i64,
        account_id: AccountId,
        quote: &OrderQuote,
        payment_method: PaymentMethod,
        created_at: DateTime<Utc>,
    ) -> Self {
        Order {
            id,
            account_id,
            product: quote.product.clone(),
            quantity: quote.quantity,
            bonus_quantity: quote.bonus_quantity,
            unit_price: quote.unit_price,
            subtotal: quote.subtotal,
            discount: quote.discount,
            total: quote.total,
            coupon_code: quote.coupon_code.clone(),
            status: OrderStatus::AwaitingPayment,
            payment_method,
            created_at,
            terminal_at: None,
            settling_at: None,
            units: Vec::new(),
            note: None,
        }
    }

    #[inline]
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Whether settlement has been committed and delivery is in progress.
    #[inline]
    pub fn is_settling(&self) -> bool {
        self.settling_at.is_some() && !self.is_terminal()
    }

    #[inline]
    pub fn units_to_deliver(&self) -> i64 {
        self.quantity + self.bonus_quantity
    }

    /// Whether the expiry sweeper may close this order at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>, window: Duration) -> bool {
        self.status == OrderStatus::AwaitingPayment
            && self.settling_at.is_none()
            && now - self.created_at >= window
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_quote() -> OrderQuote {
        OrderQuote {
            product: ProductKind::Link,
            quantity: 150,
            bonus_quantity: 10,
            unit_price: Money::new(450),
            subtotal: Money::new(67_500),
            discount: Money::new(6_750),
            total: Money::new(60_750),
            coupon_code: Some("HEMAT10".to_string()),
        }
    }

    #[test]
    fn test_terminal_states() {
        assert!(!OrderStatus::AwaitingPayment.is_terminal());
        for status in [
            OrderStatus::Completed,
            OrderStatus::Rejected,
            OrderStatus::Expired,
            OrderStatus::Failed,
        ] {
            assert!(status.is_terminal(), "{} should be terminal", status);
        }
    }

    #[test]
    fn test_status_text_is_snake_case() {
        assert_eq!(OrderStatus::AwaitingPayment.to_string(), "awaiting_payment");
        let json = serde_json::to_string(&OrderStatus::AwaitingPayment).unwrap();
        assert_eq!(json, "\"awaiting_payment\"");
    }

    #[test]
    fn test_product_kind_text_form() {
        let vpn = ProductKind::credential("vpn");
        assert_eq!(vpn.to_string(), "credential:vpn");
        assert_eq!(vpn.pool_name(), "credentials:vpn");
        assert_eq!("credential:vpn".parse::<ProductKind>().unwrap(), vpn);

        assert_eq!("ai_link".parse::<ProductKind>().unwrap(), ProductKind::AiLink);
        assert_eq!(ProductKind::AiLink.pool_name(), "ai_links");
        assert_eq!(ProductKind::Link.pool_name(), "links");

        assert!("credential:".parse::<ProductKind>().is_err());
        assert!("sticker".parse::<ProductKind>().is_err());
    }

    #[test]
    fn test_product_kind_serde_uses_text_form() {
        let json = serde_json::to_string(&ProductKind::credential("vpn")).unwrap();
        assert_eq!(json, "\"credential:vpn\"");
        let back: ProductKind = serde_json::from_str("\"link\"").unwrap();
        assert_eq!(back, ProductKind::Link);
    }

    #[test]
    fn test_order_freezes_quote() {
        let created = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let order = Order::from_quote(42, 7, &sample_quote(), PaymentMethod::Manual, created);

        assert_eq!(order.status, OrderStatus::AwaitingPayment);
        assert_eq!(order.total, Money::new(60_750));
        assert_eq!(order.units_to_deliver(), 160);
        assert!(!order.is_settling());
    }

    #[test]
    fn test_expiry_window() {
        let created = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let mut order = Order::from_quote(1, 7, &sample_quote(), PaymentMethod::Manual, created);
        let window = Duration::minutes(30);

        assert!(!order.is_expired_at(created + Duration::minutes(29), window));
        assert!(order.is_expired_at(created + Duration::minutes(30), window));

        order.settling_at = Some(created + Duration::minutes(1));
        assert!(!order.is_expired_at(created + Duration::hours(2), window));

        order.settling_at = None;
        order.status = OrderStatus::Completed;
        assert!(!order.is_expired_at(created + Duration::hours(2), window));
    }
}
