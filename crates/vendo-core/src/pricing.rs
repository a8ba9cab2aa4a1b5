//! # Pricing Module
//!
//! Tiered unit pricing: the whole order is priced at the unit price of the
//! tier its quantity falls in (not marginal pricing).
//!
//! ## Example Table
//! ```text
//! ┌──────────────┬────────────┐
//! │ Quantity     │ Unit price │
//! ├──────────────┼────────────┤
//! │ 1 – 99       │ 500        │
//! │ 100 – 199    │ 450        │
//! │ 200 – ∞      │ 400        │
//! └──────────────┴────────────┘
//!
//! 150 units → 150 × 450 = 67,500
//! ```
//!
//! ## Budget Inversion
//! Because every tier prices the whole order, dividing a budget by one tier's
//! price can land in a different tier. `max_quantity_for_budget` only keeps
//! candidates that belong to the tier whose price produced them.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Money;

// =============================================================================
// Price Tier
// =============================================================================

/// One quantity range and its unit price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceTier {
    /// Smallest quantity in this tier (inclusive).
    pub min: i64,

    /// Largest quantity in this tier (inclusive). `None` = unbounded.
    #[serde(default)]
    pub max: Option<i64>,

    /// Price of every unit when the order falls in this tier.
    pub unit_price: Money,
}

impl PriceTier {
    /// Creates a bounded tier.
    pub fn bounded(min: i64, max: i64, unit_price: i64) -> Self {
        PriceTier {
            min,
            max: Some(max),
            unit_price: Money::new(unit_price),
        }
    }

    /// Creates an open-ended tier.
    pub fn unbounded(min: i64, unit_price: i64) -> Self {
        PriceTier {
            min,
            max: None,
            unit_price: Money::new(unit_price),
        }
    }

    /// Whether `quantity` falls in this tier.
    #[inline]
    pub fn contains(&self, quantity: i64) -> bool {
        quantity >= self.min && self.max.map_or(true, |max| quantity <= max)
    }
}

// =============================================================================
// Budget Quote
// =============================================================================

/// The largest order a budget can pay for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetQuote {
    pub quantity: i64,
    pub unit_price: Money,
    pub total: Money,
}

impl BudgetQuote {
    fn nothing() -> Self {
        BudgetQuote {
            quantity: 0,
            unit_price: Money::zero(),
            total: Money::zero(),
        }
    }
}

// =============================================================================
// Pricing Table
// =============================================================================

/// Ordered set of price tiers for one product.
///
/// ## Invariants (checked by `validate`)
/// - Non-empty, first tier starts at 1
/// - Tiers are contiguous: each starts right after the previous one ends
/// - Only the last tier may be unbounded
/// - No negative prices
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PricingTable {
    tiers: Vec<PriceTier>,
}

impl PricingTable {
    /// Creates a table; tiers are sorted by their lower bound.
    pub fn new(mut tiers: Vec<PriceTier>) -> Self {
        tiers.sort_by_key(|t| t.min);
        PricingTable { tiers }
    }

    /// Returns the tiers in ascending order.
    pub fn tiers(&self) -> &[PriceTier] {
        &self.tiers
    }

    pub fn is_empty(&self) -> bool {
        self.tiers.is_empty()
    }

    /// Checks the coverage invariants.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let first = self.tiers.first().ok_or_else(|| ValidationError::Required {
            field: "pricing tiers".to_string(),
        })?;

        if first.min != 1 {
            return Err(ValidationError::InvalidFormat {
                field: "pricing tiers".to_string(),
                reason: format!("first tier must start at 1, starts at {}", first.min),
            });
        }

        for (i, tier) in self.tiers.iter().enumerate() {
            if tier.unit_price.is_negative() {
                return Err(ValidationError::InvalidFormat {
                    field: "pricing tiers".to_string(),
                    reason: format!("tier starting at {} has a negative price", tier.min),
                });
            }

            let next = self.tiers.get(i + 1);
            match (tier.max, next) {
                (Some(max), _) if max < tier.min => {
                    return Err(ValidationError::InvalidFormat {
                        field: "pricing tiers".to_string(),
                        reason: format!("tier {}-{} is empty", tier.min, max),
                    });
                }
                (Some(max), Some(next)) if next.min != max + 1 => {
                    return Err(ValidationError::InvalidFormat {
                        field: "pricing tiers".to_string(),
                        reason: format!(
                            "tier ending at {} is followed by a tier starting at {}",
                            max, next.min
                        ),
                    });
                }
                (None, Some(next)) => {
                    return Err(ValidationError::InvalidFormat {
                        field: "pricing tiers".to_string(),
                        reason: format!(
                            "unbounded tier at {} is followed by a tier starting at {}",
                            tier.min, next.min
                        ),
                    });
                }
                _ => {}
            }
        }

        Ok(())
    }

    /// Whether every quantity in `[1, max_quantity]` has a tier.
    pub fn covers(&self, max_quantity: i64) -> bool {
        self.validate().is_ok()
            && self
                .tiers
                .last()
                .map_or(false, |t| t.max.map_or(true, |max| max >= max_quantity))
    }

    /// Returns the tier for a quantity, preferring the highest lower bound.
    pub fn tier_for(&self, quantity: i64) -> Option<&PriceTier> {
        self.tiers
            .iter()
            .filter(|t| t.contains(quantity))
            .max_by_key(|t| t.min)
    }

    /// Unit price for an order of `quantity`.
    ///
    /// ## Errors
    /// - `InvalidQuantity` when quantity < 1 or > `max_quantity`
    /// - `NoPricingData` when the table is empty or has no tier for it
    pub fn unit_price(&self, quantity: i64, max_quantity: i64) -> CoreResult<Money> {
        if quantity < 1 || quantity > max_quantity {
            return Err(CoreError::InvalidQuantity {
                requested: quantity,
                min: 1,
                max: max_quantity,
            });
        }

        self.tier_for(quantity)
            .map(|t| t.unit_price)
            .ok_or(CoreError::NoPricingData)
    }

    /// Total price: `quantity × unit_price(quantity)`.
    ///
    /// `InvalidAmount` when the product does not fit in an `i64`.
    pub fn total_price(&self, quantity: i64, max_quantity: i64) -> CoreResult<Money> {
        let unit = self.unit_price(quantity, max_quantity)?;
        unit.checked_multiply(quantity).ok_or_else(|| CoreError::InvalidAmount {
            amount: unit.amount(),
            reason: format!("{} units overflow the order total", quantity),
        })
    }

    /// Largest quantity whose total fits the budget.
    ///
    /// ## Algorithm
    /// ```text
    /// for each tier:
    ///     q = floor(budget / tier.unit_price), capped at tier.max and max_quantity
    ///     keep q only if tier.contains(q)        ← self-consistency check
    /// answer = candidate with the greatest q (or zero)
    /// ```
    ///
    /// ## Example
    /// ```rust
    /// use vendo_core::money::Money;
    /// use vendo_core::pricing::{PriceTier, PricingTable};
    ///
    /// let table = PricingTable::new(vec![
    ///     PriceTier::bounded(1, 99, 500),
    ///     PriceTier::bounded(100, 199, 450),
    ///     PriceTier::unbounded(200, 400),
    /// ]);
    ///
    /// // 79,900 / 400 = 199 which is not a 400-tier quantity, so the
    /// // 450 tier answers: 177 × 450 = 79,650
    /// let quote = table.max_quantity_for_budget(Money::new(79_900), 1000).unwrap();
    /// assert_eq!(quote.quantity, 177);
    /// assert_eq!(quote.total.amount(), 79_650);
    /// ```
    pub fn max_quantity_for_budget(
        &self,
        budget: Money,
        max_quantity: i64,
    ) -> CoreResult<BudgetQuote> {
        if self.tiers.is_empty() {
            return Err(CoreError::NoPricingData);
        }

        let best = self
            .tiers
            .iter()
            .filter(|t| t.unit_price.is_positive())
            .filter_map(|tier| {
                let mut quantity = budget.units_affordable(tier.unit_price).min(max_quantity);
                if let Some(max) = tier.max {
                    quantity = quantity.min(max);
                }
                if !tier.contains(quantity) {
                    return None;
                }
                // quantity × price never exceeds the budget
                let total = tier.unit_price.checked_multiply(quantity)?;
                Some(BudgetQuote {
                    quantity,
                    unit_price: tier.unit_price,
                    total,
                })
            })
            .max_by_key(|q| q.quantity);

        Ok(best.unwrap_or_else(BudgetQuote::nothing))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const MAX: i64 = 1000;

    fn sample_table() -> PricingTable {
        PricingTable::new(vec![
            PriceTier::bounded(1, 99, 500),
            PriceTier::bounded(100, 199, 450),
            PriceTier::unbounded(200, 400),
        ])
    }

    #[test]
    fn test_scenario_quantity_150() {
        let table = sample_table();
        assert_eq!(table.unit_price(150, MAX).unwrap(), Money::new(450));
        assert_eq!(table.total_price(150, MAX).unwrap(), Money::new(67_500));
    }

    #[test]
    fn test_tier_boundaries() {
        let table = sample_table();
        assert_eq!(table.unit_price(1, MAX).unwrap().amount(), 500);
        assert_eq!(table.unit_price(99, MAX).unwrap().amount(), 500);
        assert_eq!(table.unit_price(100, MAX).unwrap().amount(), 450);
        assert_eq!(table.unit_price(199, MAX).unwrap().amount(), 450);
        assert_eq!(table.unit_price(200, MAX).unwrap().amount(), 400);
        assert_eq!(table.unit_price(MAX, MAX).unwrap().amount(), 400);
    }

    #[test]
    fn test_invalid_quantity() {
        let table = sample_table();
        assert!(matches!(
            table.unit_price(0, MAX),
            Err(CoreError::InvalidQuantity { requested: 0, .. })
        ));
        assert!(matches!(
            table.unit_price(MAX + 1, MAX),
            Err(CoreError::InvalidQuantity { max: MAX, .. })
        ));
    }

    #[test]
    fn test_empty_table_has_no_pricing_data() {
        let table = PricingTable::default();
        assert_eq!(table.unit_price(5, MAX), Err(CoreError::NoPricingData));
        assert_eq!(
            table.max_quantity_for_budget(Money::new(1000), MAX),
            Err(CoreError::NoPricingData)
        );
    }

    #[test]
    fn test_price_is_constant_and_total_increasing_within_tier() {
        let table = sample_table();
        for tier in table.tiers() {
            let upper = tier.max.unwrap_or(MAX);
            for q in tier.min..upper {
                assert_eq!(
                    table.unit_price(q, MAX).unwrap(),
                    table.unit_price(q + 1, MAX).unwrap()
                );
                assert!(table.total_price(q, MAX).unwrap() < table.total_price(q + 1, MAX).unwrap());
            }
        }
    }

    #[test]
    fn test_exactly_one_tier_per_quantity() {
        let table = sample_table();
        assert!(table.covers(MAX));
        for q in 1..=MAX {
            let matching = table.tiers().iter().filter(|t| t.contains(q)).count();
            assert_eq!(matching, 1, "quantity {} matched {} tiers", q, matching);
        }
    }

    #[test]
    fn test_validate_rejects_gaps_and_overlaps() {
        let gap = PricingTable::new(vec![
            PriceTier::bounded(1, 10, 500),
            PriceTier::unbounded(12, 400),
        ]);
        assert!(gap.validate().is_err());

        let overlap = PricingTable::new(vec![
            PriceTier::bounded(1, 10, 500),
            PriceTier::unbounded(10, 400),
        ]);
        assert!(overlap.validate().is_err());

        let late_start = PricingTable::new(vec![PriceTier::unbounded(2, 400)]);
        assert!(late_start.validate().is_err());

        let bounded_only = PricingTable::new(vec![PriceTier::bounded(1, 50, 500)]);
        assert!(bounded_only.validate().is_ok());
        assert!(!bounded_only.covers(MAX));
        assert!(bounded_only.covers(50));
    }

    #[test]
    fn test_budget_rejects_cross_tier_candidates() {
        let table = sample_table();

        // 100,000 / 500 = 200 (not a 500-tier qty), / 450 = 222 (not a
        // 450-tier qty), / 400 = 250 (a 400-tier qty)
        let quote = table.max_quantity_for_budget(Money::new(100_000), MAX).unwrap();
        assert_eq!(quote.quantity, 250);
        assert_eq!(quote.unit_price.amount(), 400);

        // The 450 tier is capped at 199 while 400 × 200 fits exactly
        let quote = table.max_quantity_for_budget(Money::new(80_000), MAX).unwrap();
        assert_eq!(quote.quantity, 200);
        assert_eq!(quote.total.amount(), 80_000);
    }

    #[test]
    fn test_budget_too_small_returns_zero() {
        let table = sample_table();
        let quote = table.max_quantity_for_budget(Money::new(499), MAX).unwrap();
        assert_eq!(quote.quantity, 0);
        assert!(quote.total.is_zero());
    }

    #[test]
    fn test_budget_inverse_is_affordable_and_maximal() {
        let table = sample_table();
        for budget in (0..=150_000).step_by(137) {
            let budget = Money::new(budget);
            let quote = table.max_quantity_for_budget(budget, MAX).unwrap();

            if quote.quantity > 0 {
                assert_eq!(table.total_price(quote.quantity, MAX).unwrap(), quote.total);
                assert!(quote.total <= budget);
            }
            if quote.quantity < MAX {
                let next = table.total_price(quote.quantity + 1, MAX).unwrap();
                assert!(next > budget, "budget {} could also buy {}", budget, quote.quantity + 1);
            }
        }
    }

    #[test]
    fn test_total_overflow_is_an_error() {
        let table = PricingTable::new(vec![PriceTier::unbounded(1, i64::MAX / 2)]);
        assert_eq!(table.total_price(2, MAX).unwrap(), Money::new(i64::MAX / 2 * 2));
        assert!(matches!(
            table.total_price(3, MAX),
            Err(CoreError::InvalidAmount { .. })
        ));
    }

    #[test]
    fn test_budget_respects_max_quantity() {
        let table = sample_table();
        let quote = table.max_quantity_for_budget(Money::new(10_000_000), MAX).unwrap();
        assert_eq!(quote.quantity, MAX);
    }

    #[test]
    fn test_toml_shape_deserializes() {
        let json = r#"[{"min":1,"max":99,"unit_price":500},{"min":100,"unit_price":450}]"#;
        let table: PricingTable = serde_json::from_str(json).unwrap();
        assert_eq!(table.tiers().len(), 2);
        assert_eq!(table.tiers()[1].max, None);
    }
}
