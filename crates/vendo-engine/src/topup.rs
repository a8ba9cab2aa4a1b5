//! # Top-Up Desk
//!
//! Buyers ask for balance, an admin checks the transfer and decides.
//!
//! ```text
//! request ──► pending ──┬── approve ──► approved   (credit "topup:<id>")
//!                       ├── reject  ──► rejected
//!                       └── sweeper ──► expired
//! ```
//! A decision is a compare-and-swap on `pending`, so a request is credited
//! at most once no matter how often it is approved.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use vendo_core::ledger::EntryKind;
use vendo_core::topup::{TopUpRequest, TopUpStatus};
use vendo_core::validation::validate_topup_amount;
use vendo_core::{AccountId, Money};
use vendo_db::{BalanceRepository, CounterRepository, Mutation, TopUpRepository, TOPUP_COUNTER};

use crate::config::TopUpSettings;
use crate::engine::Context;
use crate::error::{EngineError, EngineResult};
use crate::locks::account_key;
use crate::notify::Notification;

/// Result of deciding a top-up request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TopUpOutcome {
    Decided(TopUpRequest),
    /// Someone decided first; carries the request as it stands.
    AlreadyDecided(TopUpRequest),
}

#[derive(Clone)]
pub struct TopUpDesk {
    ctx: Context,
    settings: TopUpSettings,
}

impl TopUpDesk {
    pub(crate) fn new(ctx: Context, settings: TopUpSettings) -> Self {
        TopUpDesk { ctx, settings }
    }

    pub async fn request(&self, account_id: AccountId, amount: Money) -> EngineResult<TopUpRequest> {
        validate_topup_amount(
            amount.amount(),
            self.settings.min_amount,
            self.settings.max_amount,
        )?;
        let now = self.ctx.clock.now();

        let mut tx = self.ctx.db.begin().await?;
        let id = CounterRepository::next(&mut *tx, TOPUP_COUNTER).await?;
        let request = TopUpRequest {
            id,
            account_id,
            amount,
            status: TopUpStatus::Pending,
            created_at: now,
            decided_at: None,
        };
        TopUpRepository::insert(&mut *tx, &request).await?;
        tx.commit().await?;

        info!(request_id = id, account_id, %amount, "Top-up requested");
        self.ctx.notifier.notify(&Notification::TopUpRequested {
            request_id: id,
            account_id,
            amount,
        });
        Ok(request)
    }

    /// Credits the requested amount.
    pub async fn approve(&self, request_id: i64) -> EngineResult<TopUpOutcome> {
        self.decide(request_id, TopUpStatus::Approved).await
    }

    pub async fn reject(&self, request_id: i64) -> EngineResult<TopUpOutcome> {
        self.decide(request_id, TopUpStatus::Rejected).await
    }

    /// Expires pending requests created at or before `cutoff`. Returns how
    /// many were expired by this call.
    pub async fn expire_stale(&self, cutoff: DateTime<Utc>) -> EngineResult<usize> {
        let stale = self.ctx.db.topups().pending_before(cutoff).await?;
        let mut expired = 0;
        for request in stale {
            if let TopUpOutcome::Decided(_) = self.decide(request.id, TopUpStatus::Expired).await? {
                expired += 1;
            }
        }
        Ok(expired)
    }

    pub async fn get(&self, request_id: i64) -> EngineResult<TopUpRequest> {
        self.ctx
            .db
            .topups()
            .get(request_id)
            .await?
            .ok_or(EngineError::TopUpNotFound(request_id))
    }

    /// Requests waiting for a decision, oldest first.
    pub async fn pending(&self) -> EngineResult<Vec<TopUpRequest>> {
        Ok(self.ctx.db.topups().pending().await?)
    }

    pub async fn for_account(&self, account_id: AccountId, limit: i64) -> EngineResult<Vec<TopUpRequest>> {
        Ok(self.ctx.db.topups().for_account(account_id, limit.max(0)).await?)
    }

    async fn decide(&self, request_id: i64, to: TopUpStatus) -> EngineResult<TopUpOutcome> {
        let request = self.get(request_id).await?;
        let _held = self.ctx.locks.lock(account_key(request.account_id)).await;
        let now = self.ctx.clock.now();

        let mut tx = self.ctx.db.begin().await?;
        if !TopUpRepository::decide(&mut *tx, request_id, to, now).await? {
            tx.rollback().await?;
            debug!(request_id, "Top-up already decided");
            return Ok(TopUpOutcome::AlreadyDecided(self.get(request_id).await?));
        }

        if to == TopUpStatus::Approved {
            let reference = request.ledger_reference();
            BalanceRepository::credit(
                &mut *tx,
                Mutation {
                    account_id: request.account_id,
                    amount: request.amount,
                    kind: EntryKind::TopUp,
                    reference: Some(&reference),
                    at: now,
                },
            )
            .await?;
        }

        let decided = TopUpRepository::get_in(&mut *tx, request_id)
            .await?
            .ok_or(EngineError::TopUpNotFound(request_id))?;
        tx.commit().await?;

        info!(request_id, account_id = decided.account_id, status = ?to, "Top-up decided");
        self.ctx.notifier.notify(&Notification::TopUpDecided {
            request_id,
            account_id: decided.account_id,
            status: to,
        });
        Ok(TopUpOutcome::Decided(decided))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Harness;
    use chrono::Duration;
    use vendo_core::{CoreError, ValidationError};

    #[tokio::test]
    async fn test_request_bounds() {
        let h = Harness::new().await;
        let desk = h.engine.topups();

        let err = desk.request(1, Money::new(500)).await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::Core(CoreError::Validation(ValidationError::OutOfRange { .. }))
        ));
        assert!(desk.request(1, Money::new(-1)).await.is_err());
        assert!(desk.pending().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_approve_credits_once() {
        let h = Harness::new().await;
        let desk = h.engine.topups();

        let request = desk.request(3, Money::new(50_000)).await.unwrap();
        assert_eq!(request.status, TopUpStatus::Pending);
        assert_eq!(desk.pending().await.unwrap().len(), 1);

        let first = desk.approve(request.id).await.unwrap();
        assert!(matches!(
            first,
            TopUpOutcome::Decided(TopUpRequest {
                status: TopUpStatus::Approved,
                ..
            })
        ));
        let second = desk.approve(request.id).await.unwrap();
        assert!(matches!(second, TopUpOutcome::AlreadyDecided(_)));
        let late_reject = desk.reject(request.id).await.unwrap();
        assert!(matches!(late_reject, TopUpOutcome::AlreadyDecided(_)));

        assert_eq!(h.engine.ledger().balance_of(3).await.unwrap(), Money::new(50_000));
        let history = h.engine.ledger().history(3, 5).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].reference.as_deref(), Some("topup:1"));
    }

    #[tokio::test]
    async fn test_reject_leaves_balance_alone() {
        let h = Harness::new().await;
        let desk = h.engine.topups();
        let request = desk.request(3, Money::new(20_000)).await.unwrap();

        desk.reject(request.id).await.unwrap();
        assert_eq!(desk.get(request.id).await.unwrap().status, TopUpStatus::Rejected);
        assert_eq!(h.engine.ledger().balance_of(3).await.unwrap(), Money::zero());
        assert_eq!(desk.for_account(3, 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_expire_stale_skips_recent() {
        let h = Harness::new().await;
        let desk = h.engine.topups();
        let old = desk.request(3, Money::new(20_000)).await.unwrap();
        h.clock.advance(Duration::minutes(40));
        let fresh = desk.request(4, Money::new(20_000)).await.unwrap();

        let expired = desk.expire_stale(h.now() - Duration::minutes(30)).await.unwrap();
        assert_eq!(expired, 1);
        assert_eq!(desk.get(old.id).await.unwrap().status, TopUpStatus::Expired);
        assert_eq!(desk.get(fresh.id).await.unwrap().status, TopUpStatus::Pending);
    }

    #[tokio::test]
    async fn test_unknown_request() {
        let h = Harness::new().await;
        assert!(matches!(
            h.engine.topups().approve(99).await,
            Err(EngineError::TopUpNotFound(99))
        ));
    }
}
