//! # Error Types
//!
//! Domain-specific error types for vendo-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  vendo-core errors (this file)                                         │
//! │  ├── CoreError        - Ledger rule violations                         │
//! │  ├── CouponRejection  - Why a coupon cannot be used                    │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  vendo-db errors (separate crate)                                      │
//! │  └── DbError          - Database operation failures                    │
//! │                                                                         │
//! │  vendo-engine errors                                                   │
//! │  └── EngineError      - What the chat/admin layer sees                 │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → EngineError → chat message        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//! 1. Use `thiserror` for derive macros (not manual impl)
//! 2. Every message names the constraint that failed ("minimum order is 10")
//! 3. Errors are enum variants, never String
//! 4. Rejections are values: callers match on them to pick a reply

use chrono::{DateTime, Utc};
use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Core ledger errors.
///
/// These errors represent business rule violations. None of them is raised
/// after a ledger mutation: every check runs before anything is written.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// Quantity is outside `[min, max]`.
    #[error("Quantity {requested} is not allowed: order between {min} and {max}")]
    InvalidQuantity { requested: i64, min: i64, max: i64 },

    /// The product has no pricing tiers configured.
    #[error("No pricing data configured")]
    NoPricingData,

    /// The pool cannot cover the request.
    ///
    /// ## When This Occurs
    /// - Order creation with a quantity above current stock
    /// - Admin approval after the pool was drained by other orders
    ///
    /// ```text
    /// Order #41 (qty 12) awaiting approval
    ///      │
    ///      ▼
    /// Pool "links": available=5
    ///      │
    ///      ▼
    /// InsufficientStock { pool: "links", available: 5, requested: 12 }
    ///      │
    ///      ▼
    /// Order #41 → failed ("only 5 in stock")
    /// ```
    #[error("Insufficient stock in {pool}: available {available}, requested {requested}")]
    InsufficientStock {
        pool: String,
        available: i64,
        requested: i64,
    },

    /// A debit would take the balance below zero.
    #[error("Insufficient balance for account {account_id}: balance {balance}, required {required}")]
    InsufficientBalance {
        account_id: i64,
        balance: i64,
        required: i64,
    },

    /// Ledger amounts must be non-negative.
    #[error("Invalid amount {amount}: {reason}")]
    InvalidAmount { amount: i64, reason: String },

    /// The coupon cannot be used for this order.
    #[error("Coupon rejected: {0}")]
    Coupon(#[from] CouponRejection),

    /// Order id does not exist.
    #[error("Order not found: {0}")]
    OrderNotFound(i64),

    /// The delivery collaborator could not hand over the units.
    #[error("Delivery failed for order {order_id}: {reason}")]
    DeliveryFailed { order_id: i64, reason: String },

    /// The product kind is not in the catalog.
    #[error("Unknown product: {0}")]
    UnknownProduct(String),

    /// Daily claim requested inside the cool-down window.
    #[error("Daily reward already claimed; next claim at {next_claim_at}")]
    ClaimNotReady { next_claim_at: DateTime<Utc> },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Coupon Rejection
// =============================================================================

/// Reasons a coupon is refused.
///
/// The `Display` text is shown to the buyer verbatim, so it states the
/// constraint rather than a generic failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CouponRejection {
    #[error("coupon {code} does not exist")]
    NotFound { code: String },

    #[error("coupon {code} is no longer active")]
    Inactive { code: String },

    #[error("coupon {code} has expired")]
    Expired { code: String },

    #[error("coupon {code} needs a minimum order of {min}")]
    BelowMinimumOrder { code: String, min: i64 },

    #[error("coupon {code} has reached its usage limit of {max}")]
    UsageLimitReached { code: String, max: i64 },

    #[error("coupon {code} is only valid on a first order")]
    NotFirstOrder { code: String },

    #[error("coupon {code} already used")]
    AlreadyUsedByAccount { code: String },
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// Raised by the `validation` module before any business logic runs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Invalid format (e.g., a coupon code with spaces).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::InsufficientStock {
            pool: "links".to_string(),
            available: 3,
            requested: 5,
        };
        assert_eq!(
            err.to_string(),
            "Insufficient stock in links: available 3, requested 5"
        );
    }

    #[test]
    fn test_coupon_messages_name_the_constraint() {
        let err = CouponRejection::BelowMinimumOrder {
            code: "HEMAT10".to_string(),
            min: 10,
        };
        assert_eq!(err.to_string(), "coupon HEMAT10 needs a minimum order of 10");

        let err: CoreError = CouponRejection::AlreadyUsedByAccount {
            code: "HEMAT10".to_string(),
        }
        .into();
        assert_eq!(err.to_string(), "Coupon rejected: coupon HEMAT10 already used");
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let validation_err = ValidationError::Required {
            field: "code".to_string(),
        };
        let core_err: CoreError = validation_err.into();
        assert!(matches!(core_err, CoreError::Validation(_)));
    }
}
