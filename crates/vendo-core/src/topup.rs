//! # Top-Up Requests
//!
//! A buyer asks to add funds, pays outside the shop, and an admin approves
//! the request once the transfer is seen.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::money::Money;
use crate::AccountId;

#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TopUpStatus {
    Pending,
    Approved,
    Rejected,
    /// No decision within the expiry window.
    Expired,
}

impl TopUpStatus {
    pub const fn is_final(&self) -> bool {
        !matches!(self, TopUpStatus::Pending)
    }
}

impl fmt::Display for TopUpStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TopUpStatus::Pending => "pending",
            TopUpStatus::Approved => "approved",
            TopUpStatus::Rejected => "rejected",
            TopUpStatus::Expired => "expired",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopUpRequest {
    pub id: i64,
    pub account_id: AccountId,
    pub amount: Money,
    pub status: TopUpStatus,
    pub created_at: DateTime<Utc>,
    pub decided_at: Option<DateTime<Utc>>,
}

impl TopUpRequest {
    /// Ledger reference used when the request is credited.
    pub fn ledger_reference(&self) -> String {
        format!("topup:{}", self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_finality() {
        assert!(!TopUpStatus::Pending.is_final());
        assert!(TopUpStatus::Approved.is_final());
        assert!(TopUpStatus::Expired.is_final());
        assert_eq!(TopUpStatus::Rejected.to_string(), "rejected");
    }

    #[test]
    fn test_ledger_reference() {
        let req = TopUpRequest {
            id: 12,
            account_id: 3,
            amount: Money::new(50_000),
            status: TopUpStatus::Pending,
            created_at: Utc::now(),
            decided_at: None,
        };
        assert_eq!(req.ledger_reference(), "topup:12");
    }
}
