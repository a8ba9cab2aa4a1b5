//! # Balance Ledger
//!
//! Per-account balances. Every mutation appends a ledger entry; mutations
//! that carry a reference are applied at most once.
//!
//! ## Refund Lookup
//! ```text
//! refund_in(order 42)
//!   │
//!   ├── entry "order:42:payment"?  none → nothing was captured → refund 0
//!   │                              delta -60,750 → captured 60,750
//!   │
//!   └── credit 60,750 with reference "refund:order:42"
//!          └── reference already used → Duplicate → refund 0
//! ```

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use vendo_core::ledger::{payment_reference, refund_reference, EntryKind, LedgerEntry};
use vendo_core::{AccountId, CoreError, Money};
use vendo_db::{BalanceRepository, CreditOutcome, DebitOutcome, Mutation, SqliteConnection};

use crate::engine::Context;
use crate::error::EngineResult;
use crate::locks::account_key;

#[derive(Clone)]
pub struct BalanceLedger {
    ctx: Context,
}

fn check_amount(amount: Money) -> EngineResult<()> {
    if amount.is_negative() {
        return Err(CoreError::InvalidAmount {
            amount: amount.amount(),
            reason: "must not be negative".to_string(),
        }
        .into());
    }
    Ok(())
}

impl BalanceLedger {
    pub(crate) fn new(ctx: Context) -> Self {
        BalanceLedger { ctx }
    }

    /// Current balance; 0 for accounts that never held funds.
    pub async fn balance_of(&self, account_id: AccountId) -> EngineResult<Money> {
        Ok(self.ctx.db.balances().balance_of(account_id).await?)
    }

    /// Adds funds as a manual adjustment. Returns the new balance.
    pub async fn credit(&self, account_id: AccountId, amount: Money) -> EngineResult<Money> {
        check_amount(amount)?;
        let _held = self.ctx.locks.lock(account_key(account_id)).await;

        let outcome = self
            .ctx
            .db
            .balances()
            .credit_now(Mutation {
                account_id,
                amount,
                kind: EntryKind::Adjustment,
                reference: None,
                at: self.ctx.clock.now(),
            })
            .await?;

        match outcome {
            CreditOutcome::Applied(balance) => {
                info!(account_id, %amount, %balance, "Balance credited");
                Ok(balance)
            }
            // Unreferenced credits cannot collide
            CreditOutcome::Duplicate => self.balance_of(account_id).await,
        }
    }

    /// Removes funds as a manual adjustment. Returns the new balance.
    pub async fn debit(&self, account_id: AccountId, amount: Money) -> EngineResult<Money> {
        check_amount(amount)?;
        let _held = self.ctx.locks.lock(account_key(account_id)).await;

        let mut tx = self.ctx.db.begin().await?;
        let balance = Self::debit_in(
            &mut *tx,
            Mutation {
                account_id,
                amount,
                kind: EntryKind::Adjustment,
                reference: None,
                at: self.ctx.clock.now(),
            },
        )
        .await?;
        tx.commit().await?;

        info!(account_id, %amount, ?balance, "Balance debited");
        match balance {
            Some(balance) => Ok(balance),
            None => self.balance_of(account_id).await,
        }
    }

    /// Most recent ledger entries, newest first.
    pub async fn history(&self, account_id: AccountId, limit: i64) -> EngineResult<Vec<LedgerEntry>> {
        Ok(self.ctx.db.balances().history(account_id, limit.max(0)).await?)
    }

    // =========================================================================
    // Transaction-scoped operations
    // =========================================================================

    /// Debits inside the caller's transaction.
    ///
    /// Returns the new balance, or `None` if the reference was already
    /// applied. A short balance is an error and nothing is written.
    pub(crate) async fn debit_in(
        conn: &mut SqliteConnection,
        m: Mutation<'_>,
    ) -> EngineResult<Option<Money>> {
        match BalanceRepository::debit(&mut *conn, m).await? {
            DebitOutcome::Applied(balance) => Ok(Some(balance)),
            DebitOutcome::Duplicate => Ok(None),
            DebitOutcome::Insufficient(balance) => Err(CoreError::InsufficientBalance {
                account_id: m.account_id,
                balance: balance.amount(),
                required: m.amount.amount(),
            }
            .into()),
        }
    }

    /// Refunds whatever was captured for `order_id`, at most once.
    /// Returns the amount credited by this call.
    pub(crate) async fn refund_in(
        conn: &mut SqliteConnection,
        order_id: i64,
        account_id: AccountId,
        at: DateTime<Utc>,
    ) -> EngineResult<Money> {
        let payment = BalanceRepository::entry_by_reference(&mut *conn, &payment_reference(order_id)).await?;
        let captured = match payment {
            Some(entry) => Money::zero() - entry.delta,
            None => return Ok(Money::zero()),
        };
        if !captured.is_positive() {
            return Ok(Money::zero());
        }

        let reference = refund_reference(order_id);
        let outcome = BalanceRepository::credit(
            &mut *conn,
            Mutation {
                account_id,
                amount: captured,
                kind: EntryKind::Refund,
                reference: Some(&reference),
                at,
            },
        )
        .await?;

        match outcome {
            CreditOutcome::Applied(balance) => {
                info!(order_id, account_id, refunded = %captured, %balance, "Order refunded");
                Ok(captured)
            }
            CreditOutcome::Duplicate => {
                debug!(order_id, "Order already refunded");
                Ok(Money::zero())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use crate::testing::Harness;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_unknown_account_has_zero_balance() {
        let h = Harness::new().await;
        assert_eq!(h.engine.ledger().balance_of(404).await.unwrap(), Money::zero());
        assert!(h.engine.ledger().history(404, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_credit_then_debit() {
        let h = Harness::new().await;
        let ledger = h.engine.ledger();

        assert_eq!(ledger.credit(1, Money::new(1_000)).await.unwrap(), Money::new(1_000));
        assert_eq!(ledger.debit(1, Money::new(400)).await.unwrap(), Money::new(600));

        let err = ledger.debit(1, Money::new(601)).await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::Core(CoreError::InsufficientBalance {
                account_id: 1,
                balance: 600,
                required: 601
            })
        ));
        assert_eq!(ledger.balance_of(1).await.unwrap(), Money::new(600));
        assert_eq!(ledger.history(1, 10).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_negative_amounts_are_rejected() {
        let h = Harness::new().await;
        let ledger = h.engine.ledger();
        assert!(matches!(
            ledger.credit(1, Money::new(-5)).await,
            Err(EngineError::Core(CoreError::InvalidAmount { amount: -5, .. }))
        ));
        assert!(ledger.debit(1, Money::new(-5)).await.is_err());
    }

    #[tokio::test]
    async fn test_concurrent_debits_never_go_negative() {
        let h = Harness::new().await;
        let ledger = Arc::new(h.engine.ledger());
        ledger.credit(9, Money::new(1_000)).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..10 {
            let ledger = ledger.clone();
            handles.push(tokio::spawn(async move { ledger.debit(9, Money::new(300)).await }));
        }

        let mut succeeded = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                succeeded += 1;
            }
        }

        assert_eq!(succeeded, 3);
        assert_eq!(ledger.balance_of(9).await.unwrap(), Money::new(100));
    }
}
