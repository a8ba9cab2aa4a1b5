//! # Bonus Tiers
//!
//! Free units added to larger orders. The tier with the greatest threshold
//! the quantity reaches wins; tiers are not cumulative.
//!
//! ```text
//! tiers: 10 → +2, 50 → +10
//!
//!   qty  5 ──► no tier       → +0
//!   qty 49 ──► 10-tier       → +2
//!   qty 50 ──► 50-tier       → +10   (not 2, not 12)
//! ```

use serde::{Deserialize, Serialize};

/// A quantity threshold and the bonus it unlocks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BonusTier {
    pub min_quantity: i64,
    pub bonus_quantity: i64,
    #[serde(default)]
    pub description: String,
}

impl BonusTier {
    pub fn new(min_quantity: i64, bonus_quantity: i64, description: impl Into<String>) -> Self {
        BonusTier {
            min_quantity,
            bonus_quantity,
            description: description.into(),
        }
    }
}

/// Returns the tier that applies to `quantity`, if any.
///
/// Works on unsorted input: the highest qualifying threshold is picked
/// regardless of list order.
pub fn applicable(tiers: &[BonusTier], quantity: i64) -> Option<&BonusTier> {
    tiers
        .iter()
        .filter(|t| t.min_quantity <= quantity)
        .max_by_key(|t| t.min_quantity)
}

/// Bonus units for `quantity` (0 when no tier qualifies).
pub fn resolve(tiers: &[BonusTier], quantity: i64) -> i64 {
    applicable(tiers, quantity).map_or(0, |t| t.bonus_quantity)
}
