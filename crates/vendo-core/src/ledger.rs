//! # Ledger Entries
//!
//! Every balance mutation leaves one append-only entry. Entries that carry a
//! `reference` are idempotent: the same reference can be written once.
//!
//! ## References
//! ```text
//! order:<id>:payment     debit when an order is paid from balance
//! refund:order:<id>      credit when a paid order fails or is rejected
//! claim:<account>:<ms>   daily claim reward
//! topup:<id>             approved top-up request
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::money::Money;
use crate::AccountId;

#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    TopUp,
    Claim,
    Purchase,
    Refund,
    /// Manual admin correction.
    Adjustment,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: i64,
    pub account_id: AccountId,
    /// Positive for credits, negative for debits.
    pub delta: Money,
    pub balance_after: Money,
    pub kind: EntryKind,
    pub reference: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Reference of the debit that paid for an order.
pub fn payment_reference(order_id: i64) -> String {
    format!("order:{}:payment", order_id)
}

/// Reference of the refund for an order.
pub fn refund_reference(order_id: i64) -> String {
    format!("refund:order:{}", order_id)
}

/// Reference of a daily claim.
pub fn claim_reference(account_id: AccountId, at: DateTime<Utc>) -> String {
    format!("claim:{}:{}", account_id, at.timestamp_millis())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_references() {
        assert_eq!(payment_reference(42), "order:42:payment");
        assert_eq!(refund_reference(42), "refund:order:42");

        let at = Utc.timestamp_millis_opt(1_700_000_000_123).unwrap();
        assert_eq!(claim_reference(9, at), "claim:9:1700000000123");
    }
}
