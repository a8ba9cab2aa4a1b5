//! # Coupon Rules
//!
//! Pure evaluation of whether a coupon may be used for an order. Loading the
//! coupon and recording its use are done by the engine; this module only
//! decides.
//!
//! ## Check Order
//! ```text
//! exists? ─► active? ─► not expired? ─► qty ≥ min? ─► uses < max?
//!                                                        │
//!              already used by account? ◄─ first order? ◄┘
//! ```
//! The first failing check is reported. Order matters: a buyer with an
//! expired coupon hears "expired", not "already used".

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CouponRejection, ValidationError};
use crate::money::Money;
use crate::validation::{validate_coupon_code, ValidationResult};
use crate::AccountId;

// =============================================================================
// Coupon
// =============================================================================

/// A percentage discount code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coupon {
    /// Upper-case, unique.
    pub code: String,
    /// Whole percent, 1..=100.
    pub discount_percent: u32,
    pub min_order_quantity: i64,
    /// `None` = unlimited.
    pub max_uses: Option<i64>,
    pub used_count: i64,
    /// Accounts that redeemed this coupon (each at most once).
    pub used_by: Vec<AccountId>,
    pub expires_at: Option<DateTime<Utc>>,
    pub active: bool,
    pub first_order_only: bool,
}

/// Facts about the order a coupon is being checked against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CouponContext {
    pub account_id: AccountId,
    pub quantity: i64,
    /// Orders the account already has that are completed or settled.
    pub prior_completed_orders: i64,
    pub now: DateTime<Utc>,
}

impl Coupon {
    /// Runs every rule after the existence check.
    pub fn check(&self, ctx: &CouponContext) -> Result<(), CouponRejection> {
        let code = || self.code.clone();

        if !self.active {
            return Err(CouponRejection::Inactive { code: code() });
        }

        if self.expires_at.map_or(false, |at| ctx.now >= at) {
            return Err(CouponRejection::Expired { code: code() });
        }

        if ctx.quantity < self.min_order_quantity {
            return Err(CouponRejection::BelowMinimumOrder {
                code: code(),
                min: self.min_order_quantity,
            });
        }

        if let Some(max) = self.max_uses {
            if self.used_count >= max {
                return Err(CouponRejection::UsageLimitReached { code: code(), max });
            }
        }

        if self.first_order_only && ctx.prior_completed_orders > 0 {
            return Err(CouponRejection::NotFirstOrder { code: code() });
        }

        if self.used_by.contains(&ctx.account_id) {
            return Err(CouponRejection::AlreadyUsedByAccount { code: code() });
        }

        Ok(())
    }

    /// Splits `subtotal` into `(discount, total)`.
    ///
    /// `total = floor(subtotal × (100 − percent) / 100)`.
    pub fn apply_to(&self, subtotal: Money) -> (Money, Money) {
        let total = subtotal.percent_off(self.discount_percent);
        (subtotal - total, total)
    }

    /// Remaining redemptions, `None` when unlimited.
    pub fn remaining_uses(&self) -> Option<i64> {
        self.max_uses.map(|max| (max - self.used_count).max(0))
    }
}

/// Validates a looked-up coupon (`found` is `None` when the code is unknown).
pub fn validate<'a>(
    code: &str,
    found: Option<&'a Coupon>,
    ctx: &CouponContext,
) -> Result<&'a Coupon, CouponRejection> {
    let coupon = found.ok_or_else(|| CouponRejection::NotFound {
        code: normalize_code(code),
    })?;
    coupon.check(ctx)?;
    Ok(coupon)
}

/// Canonical form of a code: trimmed, upper-case.
pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

// =============================================================================
// New Coupon
// =============================================================================

/// Admin input for creating a coupon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCoupon {
    pub code: String,
    pub discount_percent: u32,
    #[serde(default)]
    pub min_order_quantity: i64,
    #[serde(default)]
    pub max_uses: Option<i64>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub first_order_only: bool,
}

impl NewCoupon {
    /// Checks the input and returns the coupon with its code normalized.
    pub fn validated(mut self) -> ValidationResult<NewCoupon> {
        self.code = normalize_code(&self.code);
        validate_coupon_code(&self.code)?;

        if !(1..=100).contains(&self.discount_percent) {
            return Err(ValidationError::OutOfRange {
                field: "discount_percent".to_string(),
                min: 1,
                max: 100,
            });
        }
        if self.min_order_quantity < 0 {
            return Err(ValidationError::OutOfRange {
                field: "min_order_quantity".to_string(),
                min: 0,
                max: i64::MAX,
            });
        }
        if matches!(self.max_uses, Some(max) if max < 1) {
            return Err(ValidationError::MustBePositive {
                field: "max_uses".to_string(),
            });
        }
        Ok(self)
    }

    /// The coupon as stored right after creation.
    pub fn into_coupon(self) -> Coupon {
        Coupon {
            code: self.code,
            discount_percent: self.discount_percent,
            min_order_quantity: self.min_order_quantity,
            max_uses: self.max_uses,
            used_count: 0,
            used_by: Vec::new(),
            expires_at: self.expires_at,
            active: true,
            first_order_only: self.first_order_only,
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
