//! # Daily Claims
//!
//! Streak rewards credited straight to the balance ledger.
//!
//! ```text
//! claim(7)
//!   ├── lock account:7
//!   ├── read claims row, evaluate policy at now
//!   │      NotYet → ClaimNotReady { next_claim_at }
//!   ├── BEGIN
//!   │     credit reward (reference claim:7:<millis>)
//!   │     upsert claims row
//!   └── COMMIT
//! ```

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::info;

use vendo_core::claim::{ClaimDecision, ClaimPolicy, ClaimRecord};
use vendo_core::ledger::{claim_reference, EntryKind};
use vendo_core::{AccountId, CoreError, Money};
use vendo_db::{BalanceRepository, ClaimRepository, CreditOutcome, Mutation};

use crate::engine::Context;
use crate::error::EngineResult;
use crate::locks::account_key;

/// What a successful claim paid out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClaimReceipt {
    pub day: i64,
    pub amount: Money,
    pub balance: Money,
    pub next_claim_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct ClaimService {
    ctx: Context,
    policy: ClaimPolicy,
}

impl ClaimService {
    pub(crate) fn new(ctx: Context, policy: ClaimPolicy) -> Self {
        ClaimService { ctx, policy }
    }

    /// What a claim right now would do, without doing it.
    pub async fn preview(&self, account_id: AccountId) -> EngineResult<ClaimDecision> {
        let record = self.ctx.db.claims().get(account_id).await?;
        Ok(self.policy.evaluate(record.as_ref(), self.ctx.clock.now()))
    }

    pub async fn claim(&self, account_id: AccountId) -> EngineResult<ClaimReceipt> {
        let _held = self.ctx.locks.lock(account_key(account_id)).await;
        let now = self.ctx.clock.now();

        let record = self.ctx.db.claims().get(account_id).await?;
        let (day, amount) = match self.policy.evaluate(record.as_ref(), now) {
            ClaimDecision::Claimable { day, amount } => (day, amount),
            ClaimDecision::NotYet { next_claim_at } => {
                return Err(CoreError::ClaimNotReady { next_claim_at }.into())
            }
        };

        let reference = claim_reference(account_id, now);
        let mut tx = self.ctx.db.begin().await?;
        let outcome = BalanceRepository::credit(
            &mut *tx,
            Mutation {
                account_id,
                amount,
                kind: EntryKind::Claim,
                reference: Some(&reference),
                at: now,
            },
        )
        .await?;

        let balance = match outcome {
            CreditOutcome::Applied(balance) => balance,
            CreditOutcome::Duplicate => {
                tx.rollback().await?;
                return Err(CoreError::ClaimNotReady {
                    next_claim_at: now + Duration::hours(24),
                }
                .into());
            }
        };

        ClaimRepository::upsert(
            &mut *tx,
            &ClaimRecord {
                account_id,
                last_claim_at: now,
                streak_day: day,
            },
        )
        .await?;
        tx.commit().await?;

        info!(account_id, day, %amount, %balance, "Daily reward claimed");
        Ok(ClaimReceipt {
            day,
            amount,
            balance,
            next_claim_at: now + Duration::hours(24),
        })
    }
}
