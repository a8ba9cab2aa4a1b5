//! # Repository Module
//!
//! Database repository implementations for Vendo.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Two Ways In                                          │
//! │                                                                         │
//! │  1. Standalone: the repository borrows a pool connection               │
//! │                                                                         │
//! │       db.orders().get(42).await?                                       │
//! │                                                                         │
//! │  2. Composed: the caller owns a transaction and passes it down         │
//! │                                                                         │
//! │       let mut tx = db.begin().await?;                                  │
//! │       let id = CounterRepository::next(&mut *tx, "order").await?;      │
//! │       OrderRepository::insert(&mut *tx, &order).await?;                │
//! │       BalanceRepository::debit(&mut *tx, ...).await?;                  │
//! │       InventoryRepository::take(&mut *tx, "links", 5).await?;          │
//! │       tx.commit().await?;     ← all or nothing                         │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Associated functions taking `&mut SqliteConnection` are the composable
//! building blocks; `&self` methods wrap them for one-shot use.
//!
//! ## Available Repositories
//!
//! - [`OrderRepository`](order::OrderRepository) - Orders and status compare-and-swap
//! - [`BalanceRepository`](balance::BalanceRepository) - Balances and ledger entries
//! - [`InventoryRepository`](inventory::InventoryRepository) - FIFO unit pools
//! - [`CouponRepository`](coupon::CouponRepository) - Coupons and redemptions
//! - [`CounterRepository`](counter::CounterRepository) - Persistent id counters
//! - [`ClaimRepository`](claim::ClaimRepository) - Daily claim records
//! - [`TopUpRepository`](topup::TopUpRepository) - Top-up requests

use chrono::{DateTime, Utc};

use crate::error::{DbError, DbResult};

pub mod balance;
pub mod claim;
pub mod counter;
pub mod coupon;
pub mod inventory;
pub mod order;
pub mod topup;

/// Stored form of a timestamp.
#[inline]
pub(crate) fn to_millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

/// Reads a stored timestamp back.
pub(crate) fn from_millis(column: &str, millis: i64) -> DbResult<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| DbError::invalid(column, format!("timestamp {} out of range", millis)))
}

/// Reads an optional stored timestamp back.
pub(crate) fn from_millis_opt(column: &str, millis: Option<i64>) -> DbResult<Option<DateTime<Utc>>> {
    millis.map(|m| from_millis(column, m)).transpose()
}
