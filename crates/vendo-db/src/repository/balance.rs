//! # Balance Repository
//!
//! Per-account balances and the append-only ledger behind them.
//!
//! ## Mutation Shape
//! ```text
//! credit / debit (one call, inside the caller's transaction or its own)
//!   │
//!   ├── 1. INSERT ledger_entries ... ON CONFLICT(reference) DO NOTHING
//!   │        └── no row? → reference already applied → Duplicate
//!   │
//!   ├── 2. credit: UPSERT balances SET balance = balance + amount
//!   │      debit:  UPDATE balances SET balance = balance - amount
//!   │                WHERE balance >= amount        ← never negative
//!   │        └── no row? → Insufficient, ledger entry removed
//!   │
//!   └── 3. UPDATE ledger_entries SET balance_after = <new balance>
//! ```
//! Step 1 is a write, so these calls may open a write transaction.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};
use tracing::debug;

use vendo_core::ledger::{EntryKind, LedgerEntry};
use vendo_core::{AccountId, Money};

use super::{from_millis, to_millis};
use crate::error::DbResult;

/// Result of a credit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreditOutcome {
    /// Applied; carries the new balance.
    Applied(Money),
    /// The reference was already used; nothing changed.
    Duplicate,
}

/// Result of a debit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebitOutcome {
    /// Applied; carries the new balance.
    Applied(Money),
    /// Balance too low; carries the current balance. Nothing changed.
    Insufficient(Money),
    /// The reference was already used; nothing changed.
    Duplicate,
}

/// A single ledger mutation request.
#[derive(Debug, Clone, Copy)]
pub struct Mutation<'a> {
    pub account_id: AccountId,
    pub amount: Money,
    pub kind: EntryKind,
    pub reference: Option<&'a str>,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct BalanceRepository {
    pool: SqlitePool,
}

impl BalanceRepository {
    pub fn new(pool: SqlitePool) -> Self {
        BalanceRepository { pool }
    }

    // =========================================================================
    // Composable operations
    // =========================================================================

    /// Balance of an account; 0 if it never held funds. Creates no row.
    pub async fn balance_in(conn: &mut SqliteConnection, account_id: AccountId) -> DbResult<Money> {
        let balance: Option<i64> =
            sqlx::query_scalar("SELECT balance FROM balances WHERE account_id = ?1")
                .bind(account_id)
                .fetch_optional(&mut *conn)
                .await?;

        Ok(Money::new(balance.unwrap_or(0)))
    }

    /// Adds `m.amount` (must be ≥ 0) to the account.
    pub async fn credit(conn: &mut SqliteConnection, m: Mutation<'_>) -> DbResult<CreditOutcome> {
        let Some(entry_id) = Self::insert_entry(conn, &m, m.amount).await? else {
            debug!(account_id = m.account_id, reference = ?m.reference, "Credit already applied");
            return Ok(CreditOutcome::Duplicate);
        };

        let balance: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO balances (account_id, balance, updated_at) VALUES (?1, ?2, ?3)
            ON CONFLICT (account_id) DO UPDATE
                SET balance = balance + excluded.balance,
                    updated_at = excluded.updated_at
            RETURNING balance
            "#,
        )
        .bind(m.account_id)
        .bind(m.amount.amount())
        .bind(to_millis(m.at))
        .fetch_one(&mut *conn)
        .await?;

        Self::set_balance_after(conn, entry_id, balance).await?;
        Ok(CreditOutcome::Applied(Money::new(balance)))
    }

    /// Subtracts `m.amount` (must be ≥ 0) when the balance covers it.
    pub async fn debit(conn: &mut SqliteConnection, m: Mutation<'_>) -> DbResult<DebitOutcome> {
        let Some(entry_id) = Self::insert_entry(conn, &m, Money::zero() - m.amount).await? else {
            debug!(account_id = m.account_id, reference = ?m.reference, "Debit already applied");
            return Ok(DebitOutcome::Duplicate);
        };

        let updated: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE balances
            SET balance = balance - ?2, updated_at = ?3
            WHERE account_id = ?1 AND balance >= ?2
            RETURNING balance
            "#,
        )
        .bind(m.account_id)
        .bind(m.amount.amount())
        .bind(to_millis(m.at))
        .fetch_optional(&mut *conn)
        .await?;

        match updated {
            Some(balance) => {
                Self::set_balance_after(conn, entry_id, balance).await?;
                Ok(DebitOutcome::Applied(Money::new(balance)))
            }
            None => {
                let current = Self::balance_in(conn, m.account_id).await?;
                if m.amount.is_zero() {
                    // Zero debit on an account without a row
                    Self::set_balance_after(conn, entry_id, current.amount()).await?;
                    return Ok(DebitOutcome::Applied(current));
                }
                sqlx::query("DELETE FROM ledger_entries WHERE id = ?1")
                    .bind(entry_id)
                    .execute(&mut *conn)
                    .await?;
                Ok(DebitOutcome::Insufficient(current))
            }
        }
    }

    /// Looks up the entry written under `reference`.
    pub async fn entry_by_reference(
        conn: &mut SqliteConnection,
        reference: &str,
    ) -> DbResult<Option<LedgerEntry>> {
        let row = sqlx::query(
            r#"
            SELECT id, account_id, delta, balance_after, kind, reference, created_at
            FROM ledger_entries WHERE reference = ?1
            "#,
        )
        .bind(reference)
        .fetch_optional(&mut *conn)
        .await?;

        row.as_ref().map(entry_from_row).transpose()
    }

    // =========================================================================
    // One-shot wrappers
    // =========================================================================

    /// Balance of an account; 0 if unknown.
    pub async fn balance_of(&self, account_id: AccountId) -> DbResult<Money> {
        let mut conn = self.pool.acquire().await?;
        Self::balance_in(&mut *conn, account_id).await
    }

    /// Credit in its own transaction.
    pub async fn credit_now(&self, m: Mutation<'_>) -> DbResult<CreditOutcome> {
        let mut tx = self.pool.begin().await?;
        let outcome = Self::credit(&mut *tx, m).await?;
        tx.commit().await?;
        Ok(outcome)
    }

    /// Most recent ledger entries of an account, newest first.
    pub async fn history(&self, account_id: AccountId, limit: i64) -> DbResult<Vec<LedgerEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT id, account_id, delta, balance_after, kind, reference, created_at
            FROM ledger_entries
            WHERE account_id = ?1
            ORDER BY id DESC
            LIMIT ?2
            "#,
        )
        .bind(account_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(entry_from_row).collect()
    }

    /// Sum of every balance (for diagnostics).
    pub async fn total_outstanding(&self) -> DbResult<Money> {
        let total: i64 = sqlx::query_scalar("SELECT COALESCE(SUM(balance), 0) FROM balances")
            .fetch_one(&self.pool)
            .await?;
        Ok(Money::new(total))
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    /// Returns the new entry id, or `None` when `reference` was used before.
    async fn insert_entry(
        conn: &mut SqliteConnection,
        m: &Mutation<'_>,
        delta: Money,
    ) -> DbResult<Option<i64>> {
        let id: Option<i64> = sqlx::query_scalar(
            r#"
            INSERT INTO ledger_entries (account_id, delta, balance_after, kind, reference, created_at)
            VALUES (?1, ?2, 0, ?3, ?4, ?5)
            ON CONFLICT (reference) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(m.account_id)
        .bind(delta.amount())
        .bind(m.kind)
        .bind(m.reference)
        .bind(to_millis(m.at))
        .fetch_optional(&mut *conn)
        .await?;

        Ok(id)
    }

    async fn set_balance_after(conn: &mut SqliteConnection, entry_id: i64, balance: i64) -> DbResult<()> {
        sqlx::query("UPDATE ledger_entries SET balance_after = ?2 WHERE id = ?1")
            .bind(entry_id)
            .bind(balance)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }
}

fn entry_from_row(row: &SqliteRow) -> DbResult<LedgerEntry> {
    Ok(LedgerEntry {
        id: row.try_get("id")?,
        account_id: row.try_get("account_id")?,
        delta: Money::new(row.try_get("delta")?),
        balance_after: Money::new(row.try_get("balance_after")?),
        kind: row.try_get("kind")?,
        reference: row.try_get("reference")?,
        created_at: from_millis("ledger_entries.created_at", row.try_get("created_at")?)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};

    fn mutation(account_id: AccountId, amount: i64, reference: Option<&str>) -> Mutation<'_> {
        Mutation {
            account_id,
            amount: Money::new(amount),
            kind: EntryKind::Adjustment,
            reference,
            at: Utc::now(),
        }
    }

    async fn debit(db: &Database, m: Mutation<'_>) -> DebitOutcome {
        let mut tx = db.begin().await.unwrap();
        let outcome = BalanceRepository::debit(&mut *tx, m).await.unwrap();
        tx.commit().await.unwrap();
        outcome
    }

    #[tokio::test]
    async fn test_unknown_account_has_zero_balance() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        assert_eq!(db.balances().balance_of(99).await.unwrap(), Money::zero());
        assert!(db.balances().history(99, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_credit_then_debit() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.balances();

        assert_eq!(
            repo.credit_now(mutation(1, 1000, None)).await.unwrap(),
            CreditOutcome::Applied(Money::new(1000))
        );
        assert_eq!(debit(&db, mutation(1, 400, None)).await, DebitOutcome::Applied(Money::new(600)));
        assert_eq!(
            debit(&db, mutation(1, 601, None)).await,
            DebitOutcome::Insufficient(Money::new(600))
        );
        assert_eq!(repo.balance_of(1).await.unwrap(), Money::new(600));

        repo.credit_now(mutation(2, 250, None)).await.unwrap();
        assert_eq!(repo.total_outstanding().await.unwrap(), Money::new(850));

        let history = repo.history(1, 10).await.unwrap();
        assert_eq!(history.len(), 2, "rejected debit leaves no entry");
        assert_eq!(history[0].delta, Money::new(-400));
        assert_eq!(history[0].balance_after, Money::new(600));
    }

    #[tokio::test]
    async fn test_reference_is_applied_once() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.balances();

        let first = repo.credit_now(mutation(1, 500, Some("refund:order:7"))).await.unwrap();
        let second = repo.credit_now(mutation(1, 500, Some("refund:order:7"))).await.unwrap();

        assert_eq!(first, CreditOutcome::Applied(Money::new(500)));
        assert_eq!(second, CreditOutcome::Duplicate);
        assert_eq!(repo.balance_of(1).await.unwrap(), Money::new(500));

        let mut conn = db.pool().acquire().await.unwrap();
        let entry = BalanceRepository::entry_by_reference(&mut conn, "refund:order:7")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(entry.delta, Money::new(500));
    }

    #[tokio::test]
    async fn test_zero_debit_on_empty_account() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        assert_eq!(debit(&db, mutation(5, 0, None)).await, DebitOutcome::Applied(Money::zero()));
        assert_eq!(db.balances().total_outstanding().await.unwrap(), Money::zero());
    }
}
