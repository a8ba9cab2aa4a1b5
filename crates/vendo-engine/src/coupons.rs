//! # Coupon Service
//!
//! Admin management of coupons and the two steps of using one:
//! validation when an order is quoted, and redemption inside the
//! settlement transaction.
//!
//! ## Settlement Re-Check
//! ```text
//! quote ──► validate (no mutation)
//!             ...buyer pays, admin approves...
//! settle ─► validate_in (live data, same tx)  ─► apply_in (conditional UPDATE)
//! ```
//! A buyer racing two first orders, or two buyers racing the last use of
//! a coupon, are caught by the second step.

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use vendo_core::coupon::{self, Coupon, CouponContext, NewCoupon};
use vendo_core::validation::validate_coupon_code;
use vendo_core::{AccountId, CouponRejection, ValidationError};
use vendo_db::{CouponRepository, DbError, OrderRepository, RedeemOutcome, SqliteConnection};

use crate::engine::Context;
use crate::error::{EngineError, EngineResult};

#[derive(Clone)]
pub struct CouponService {
    ctx: Context,
}

impl CouponService {
    pub(crate) fn new(ctx: Context) -> Self {
        CouponService { ctx }
    }

    /// Creates a coupon. Codes are stored upper-case.
    pub async fn create(&self, input: NewCoupon) -> EngineResult<Coupon> {
        let coupon = input.validated()?.into_coupon();

        match self
            .ctx
            .db
            .coupons()
            .insert(&coupon, self.ctx.clock.now())
            .await
        {
            Ok(()) => {}
            Err(DbError::UniqueViolation { .. }) => {
                return Err(ValidationError::InvalidFormat {
                    field: "code".to_string(),
                    reason: format!("coupon {} already exists", coupon.code),
                }
                .into())
            }
            Err(e) => return Err(e.into()),
        }

        info!(
            code = %coupon.code,
            percent = coupon.discount_percent,
            max_uses = ?coupon.max_uses,
            "Coupon created"
        );
        Ok(coupon)
    }

    /// Stops a coupon from being used again.
    pub async fn deactivate(&self, code: &str) -> EngineResult<()> {
        let code = coupon::normalize_code(code);
        if !self.ctx.db.coupons().set_active(&code, false).await? {
            return Err(CouponRejection::NotFound { code }.into());
        }
        info!(code = %code, "Coupon deactivated");
        Ok(())
    }

    pub async fn get(&self, code: &str) -> EngineResult<Option<Coupon>> {
        Ok(self.ctx.db.coupons().get(&coupon::normalize_code(code)).await?)
    }

    pub async fn list(&self) -> EngineResult<Vec<Coupon>> {
        Ok(self.ctx.db.coupons().list().await?)
    }

    /// Checks whether `account_id` may use `code` on an order of `quantity`.
    pub async fn validate(
        &self,
        code: &str,
        account_id: AccountId,
        quantity: i64,
    ) -> EngineResult<Coupon> {
        let mut conn = self.ctx.db.pool().acquire().await?;
        Self::validate_in(&mut *conn, code, account_id, quantity, self.ctx.clock.now()).await
    }

    // =========================================================================
    // Transaction-scoped operations
    // =========================================================================

    /// Validates against whatever `conn` currently sees.
    pub(crate) async fn validate_in(
        conn: &mut SqliteConnection,
        code: &str,
        account_id: AccountId,
        quantity: i64,
        now: DateTime<Utc>,
    ) -> EngineResult<Coupon> {
        let code = coupon::normalize_code(code);
        if validate_coupon_code(&code).is_err() {
            return Err(CouponRejection::NotFound { code }.into());
        }

        let found = CouponRepository::get_in(&mut *conn, &code).await?;
        let prior_completed_orders =
            OrderRepository::prior_count(&mut *conn, account_id, None).await?;
        let ctx = CouponContext {
            account_id,
            quantity,
            prior_completed_orders,
            now,
        };

        let coupon = coupon::validate(&code, found.as_ref(), &ctx)?.clone();
        debug!(code = %coupon.code, account_id, "Coupon accepted");
        Ok(coupon)
    }

    /// Redeems `code` for an order being settled.
    ///
    /// Expiry and minimum quantity were judged when the order was quoted.
    /// The rules other buyers can change in the meantime are checked again
    /// here against live rows.
    pub(crate) async fn redeem_in(
        conn: &mut SqliteConnection,
        code: &str,
        account_id: AccountId,
        order_id: i64,
        at: DateTime<Utc>,
    ) -> EngineResult<()> {
        let coupon = CouponRepository::get_in(&mut *conn, code)
            .await?
            .ok_or_else(|| CouponRejection::NotFound {
                code: code.to_string(),
            })?;

        if coupon.first_order_only
            && OrderRepository::prior_count(&mut *conn, account_id, Some(order_id)).await? > 0
        {
            return Err(CouponRejection::NotFirstOrder { code: coupon.code }.into());
        }

        Self::apply_in(&mut *conn, &coupon, account_id, order_id, at).await
    }

    /// Records the use of `coupon` by `account_id` for `order_id`. Any
    /// rejection means the caller must roll back.
    pub(crate) async fn apply_in(
        conn: &mut SqliteConnection,
        coupon: &Coupon,
        account_id: AccountId,
        order_id: i64,
        at: DateTime<Utc>,
    ) -> EngineResult<()> {
        let code = coupon.code.clone();
        let outcome = CouponRepository::redeem(&mut *conn, &code, account_id, order_id, at).await?;

        let rejection = match outcome {
            RedeemOutcome::Redeemed => {
                debug!(code = %code, account_id, order_id, "Coupon redeemed");
                return Ok(());
            }
            RedeemOutcome::Unavailable => CouponRejection::Inactive { code },
            RedeemOutcome::LimitReached => CouponRejection::UsageLimitReached {
                code,
                max: coupon.max_uses.unwrap_or(coupon.used_count),
            },
            RedeemOutcome::AlreadyUsed => CouponRejection::AlreadyUsedByAccount { code },
        };
        Err(EngineError::from(rejection))
    }
}
