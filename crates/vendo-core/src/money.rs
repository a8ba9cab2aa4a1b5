//! # Money Module
//!
//! Provides the `Money` type for prices, balances and discounts.
//!
//! ## Why Integer Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │  A 10% coupon on 67,500 computed with floats:                           │
//! │    67500 * 0.9 = 60749.99999999999  → truncates to 60749  ❌            │
//! │                                                                         │
//! │  OUR SOLUTION: Integer minor units                                      │
//! │    67500 * (100 - 10) / 100 = 60750                       ✅            │
//! │    Division happens last and always floors                              │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The shop runs a single currency, so there is no currency tag and the
//! smallest unit is the only unit.
//!
//! ## Usage
//! ```rust
//! use vendo_core::money::Money;
//!
//! let unit_price = Money::new(450);
//! let total = unit_price.checked_multiply(150).unwrap();
//! assert_eq!(total.amount(), 67_500);
//!
//! let discounted = total.percent_off(10);
//! assert_eq!(discounted.amount(), 60_750);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Sub, SubAssign};

// =============================================================================
// Money Type
// =============================================================================

/// A monetary value in the shop currency's smallest unit.
///
/// ## Design Decisions
/// - **i64 (signed)**: ledger entries record debits as negative deltas
/// - **Single field tuple struct**: Zero-cost abstraction over i64
/// - **Transparent serde**: stored and configured as a plain integer
///
/// ## Where Money is Used
/// ```text
/// ┌─────────────────────────────────────────────────────────────────────────┐
/// │  PriceTier.unit_price ──► OrderQuote.subtotal ──► coupon ──► total     │
/// │                                                                         │
/// │  Balance ◄── credit (top-up, claim, refund)                            │
/// │          ──► debit (balance-paid order)                                │
/// └─────────────────────────────────────────────────────────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from an amount in the smallest unit.
    #[inline]
    pub const fn new(amount: i64) -> Self {
        Money(amount)
    }

    /// Returns the raw amount.
    #[inline]
    pub const fn amount(&self) -> i64 {
        self.0
    }

    /// Returns zero money value.
    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    /// Checks if the value is zero.
    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Checks if the value is positive (greater than zero).
    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    /// Checks if the value is negative (less than zero).
    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Multiplies money by a quantity. `None` on overflow.
    ///
    /// ## Example
    /// ```rust
    /// use vendo_core::money::Money;
    ///
    /// let unit_price = Money::new(500);
    /// assert_eq!(unit_price.checked_multiply(3), Some(Money::new(1500)));
    /// assert_eq!(unit_price.checked_multiply(i64::MAX), None);
    /// ```
    #[inline]
    pub const fn checked_multiply(&self, qty: i64) -> Option<Self> {
        match self.0.checked_mul(qty) {
            Some(amount) => Some(Money(amount)),
            None => None,
        }
    }

    /// Returns how many whole units of `price` fit into this amount.
    ///
    /// Returns 0 for a non-positive price; callers skip free tiers before
    /// asking this question.
    #[inline]
    pub const fn units_affordable(&self, price: Money) -> i64 {
        if price.0 <= 0 || self.0 <= 0 {
            0
        } else {
            self.0 / price.0
        }
    }

    /// Applies a whole-percent discount and returns the amount still payable.
    ///
    /// ## Rounding
    /// Floors the result: `amount * (100 - percent) / 100`. The customer
    /// never pays a fraction of a unit more than the advertised discount.
    ///
    /// ## Example
    /// ```rust
    /// use vendo_core::money::Money;
    ///
    /// assert_eq!(Money::new(67_500).percent_off(10).amount(), 60_750);
    /// assert_eq!(Money::new(999).percent_off(33).amount(), 669);
    /// assert_eq!(Money::new(500).percent_off(100).amount(), 0);
    /// ```
    pub fn percent_off(&self, percent: u32) -> Money {
        let percent = percent.min(100) as i128;
        let payable = (self.0 as i128 * (100 - percent)).div_euclid(100);
        Money(payable as i64)
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Display groups thousands with commas: `67,500`.
///
/// ## Note
/// This is for logs and plain-text messages. The chat layer owns currency
/// symbols and localisation.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let digits = self.0.unsigned_abs().to_string();
        let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
        for (i, ch) in digits.chars().enumerate() {
            if i > 0 && (digits.len() - i) % 3 == 0 {
                grouped.push(',');
            }
            grouped.push(ch);
        }
        if self.0 < 0 {
            write!(f, "-{}", grouped)
        } else {
            write!(f, "{}", grouped)
        }
    }
}

impl Default for Money {
    fn default() -> Self {
        Money::zero()
    }
}

impl Add for Money {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Money(self.0 + other.0)
    }
}

impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0 - other.0)
    }
}

impl SubAssign for Money {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        self.0 -= other.0;
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_groups_thousands() {
        assert_eq!(Money::new(0).to_string(), "0");
        assert_eq!(Money::new(999).to_string(), "999");
        assert_eq!(Money::new(1_000).to_string(), "1,000");
        assert_eq!(Money::new(67_500).to_string(), "67,500");
        assert_eq!(Money::new(1_234_567).to_string(), "1,234,567");
        assert_eq!(Money::new(-60_750).to_string(), "-60,750");
    }

    #[test]
    fn test_arithmetic() {
        let a = Money::new(1000);
        let b = Money::new(500);

        assert_eq!((a + b).amount(), 1500);
        assert_eq!((a - b).amount(), 500);
        assert_eq!(a.checked_multiply(3), Some(Money::new(3000)));

        let total: Money = vec![a, b, b].into_iter().sum();
        assert_eq!(total.amount(), 2000);
    }

    #[test]
    fn test_multiply_overflow_is_detected() {
        assert_eq!(Money::new(i64::MAX / 2).checked_multiply(3), None);
        assert_eq!(Money::new(-4).checked_multiply(i64::MAX), None);
        assert_eq!(Money::zero().checked_multiply(i64::MAX), Some(Money::zero()));
    }

    #[test]
    fn test_percent_off_floors() {
        assert_eq!(Money::new(67_500).percent_off(10).amount(), 60_750);
        // 1001 * 0.85 = 850.85 → 850
        assert_eq!(Money::new(1001).percent_off(15).amount(), 850);
        assert_eq!(Money::new(1000).percent_off(0).amount(), 1000);
        assert_eq!(Money::new(1000).percent_off(100).amount(), 0);
        // Over 100% is clamped, never negative
        assert_eq!(Money::new(1000).percent_off(150).amount(), 0);
    }

    #[test]
    fn test_units_affordable() {
        assert_eq!(Money::new(1000).units_affordable(Money::new(450)), 2);
        assert_eq!(Money::new(449).units_affordable(Money::new(450)), 0);
        assert_eq!(Money::new(1000).units_affordable(Money::zero()), 0);
        assert_eq!(Money::new(-5).units_affordable(Money::new(1)), 0);
    }

    #[test]
    fn test_zero_and_checks() {
        let zero = Money::zero();
        assert!(zero.is_zero());
        assert!(!zero.is_positive());
        assert!(!zero.is_negative());

        assert!(Money::new(100).is_positive());
        assert!(Money::new(-100).is_negative());
    }

    #[test]
    fn test_serde_is_transparent() {
        let json = serde_json::to_string(&Money::new(450)).unwrap();
        assert_eq!(json, "450");
        let back: Money = serde_json::from_str("450").unwrap();
        assert_eq!(back, Money::new(450));
    }
}
