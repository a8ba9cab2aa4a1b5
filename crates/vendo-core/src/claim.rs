//! # Daily Claim Rewards
//!
//! Streak-aware reward computed from the time since an account's last claim.
//!
//! ## Windows
//! ```text
//!  last claim
//!      │◄──── 24h ────►│◄──── 24h ────►│
//!      │  not claimable │ streak + 1    │ streak resets to day 1 ...
//!      ▼                ▼               ▼
//!  ────┼────────────────┼───────────────┼──────────────────► time
//! ```
//!
//! Reward for day `d` is `base + increment × (d - 1)`. After `reset_days`
//! the streak wraps back to day 1.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::money::Money;
use crate::AccountId;

/// The last successful claim of an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimRecord {
    pub account_id: AccountId,
    pub last_claim_at: DateTime<Utc>,
    /// Always in `[1, reset_days]`.
    pub streak_day: i64,
}

/// Reward parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimPolicy {
    pub base: Money,
    pub increment: Money,
    pub reset_days: i64,
}

impl Default for ClaimPolicy {
    fn default() -> Self {
        ClaimPolicy {
            base: Money::new(crate::DEFAULT_CLAIM_BASE),
            increment: Money::new(crate::DEFAULT_CLAIM_INCREMENT),
            reset_days: crate::DEFAULT_CLAIM_RESET_DAYS,
        }
    }
}

/// Result of evaluating a claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimDecision {
    /// A claim now would land on `day` and pay `amount`.
    Claimable { day: i64, amount: Money },
    /// Too early; the next claim opens at `next_claim_at`.
    NotYet { next_claim_at: DateTime<Utc> },
}

impl ClaimPolicy {
    /// Reward for a given streak day.
    pub fn amount_for_day(&self, day: i64) -> Money {
        self.base + Money::new(self.increment.amount() * (day - 1))
    }

    /// Evaluates whether `previous` allows a claim at `now`.
    pub fn evaluate(&self, previous: Option<&ClaimRecord>, now: DateTime<Utc>) -> ClaimDecision {
        let Some(previous) = previous else {
            return self.claimable(1);
        };

        let elapsed = now - previous.last_claim_at;
        if elapsed < Duration::hours(24) {
            return ClaimDecision::NotYet {
                next_claim_at: previous.last_claim_at + Duration::hours(24),
            };
        }

        if elapsed < Duration::hours(48) {
            let next = if previous.streak_day >= self.reset_days {
                1
            } else {
                previous.streak_day + 1
            };
            self.claimable(next)
        } else {
            self.claimable(1)
        }
    }

    fn claimable(&self, day: i64) -> ClaimDecision {
        ClaimDecision::Claimable {
            day,
            amount: self.amount_for_day(day),
        }
    }
}
