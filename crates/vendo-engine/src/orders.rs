//! # Order State Machine
//!
//! Drives an order from quote to a terminal state without moving stock or
//! money twice.
//!
//! ## Lifecycle
//! ```text
//!                ┌──────────── balance payment ──────────────┐
//!                │  one tx: debit, take, redeem coupon        │
//!   [quote] ─────┤                                            ├──► deliver ──► completed
//!                │                                            │       │
//!                └── manual ──► awaiting_payment ── approve ──┘       └─ err ─► failed + refund
//!                                   │   │
//!                          reject ──┘   └── age ≥ expiry ──► expired
//! ```
//!
//! ## Settlement
//! Stock and coupon uses are consumed in the same transaction that marks
//! the order as settling (`settling_at`). Reject and expire only touch
//! orders that are not settling, so an approval racing the sweeper has
//! exactly one winner. Delivery runs after commit; its outcome moves the
//! order to `completed` or to `failed` with a refund.
//! A delivery that never reports back is retried by the sweeper through
//! [`OrderMachine::redeliver`].

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use vendo_core::ledger::{payment_reference, EntryKind};
use vendo_core::{
    AccountId, Catalog, CoreError, Order, OrderQuote, OrderStatus, PaymentMethod, ProductKind,
};
use vendo_db::{
    CounterRepository, Mutation, OrderRepository, SettlingGuard, SqliteConnection, ORDER_COUNTER,
};

use crate::coupons::CouponService;
use crate::delivery::Delivery;
use crate::engine::Context;
use crate::error::{EngineError, EngineResult};
use crate::inventory::InventoryManager;
use crate::ledger::BalanceLedger;
use crate::locks::{account_key, coupon_key, order_key, pool_key};
use crate::notify::Notification;

/// A buyer's confirmed purchase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurchaseRequest {
    pub account_id: AccountId,
    pub product: ProductKind,
    pub quantity: i64,
    pub coupon_code: Option<String>,
    pub payment_method: PaymentMethod,
}

/// Result of an admin or sweeper action on an existing order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TransitionOutcome {
    /// This call moved the order; carries its new state.
    Applied(Order),
    /// Another actor got there first. Treat the call as a no-op.
    AlreadyResolved { order_id: i64, status: OrderStatus },
    /// The order is still inside its payment window.
    NotDue { order_id: i64 },
}

impl TransitionOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, TransitionOutcome::Applied(_))
    }
}

/// Errors during settlement that fail the order instead of aborting the call.
fn fails_settlement(err: &EngineError) -> bool {
    matches!(
        err,
        EngineError::Core(
            CoreError::InsufficientStock { .. }
                | CoreError::InsufficientBalance { .. }
                | CoreError::Coupon(_)
        )
    )
}

#[derive(Clone)]
pub struct OrderMachine {
    ctx: Context,
    catalog: Arc<Catalog>,
    delivery: Arc<dyn Delivery>,
    inventory: InventoryManager,
    expiry: Duration,
}

impl OrderMachine {
    pub(crate) fn new(
        ctx: Context,
        catalog: Arc<Catalog>,
        delivery: Arc<dyn Delivery>,
        inventory: InventoryManager,
        expiry: Duration,
    ) -> Self {
        OrderMachine {
            ctx,
            catalog,
            delivery,
            inventory,
            expiry,
        }
    }

    // =========================================================================
    // Quoting and placing
    // =========================================================================

    /// Prices an order without touching any state.
    pub async fn quote(
        &self,
        account_id: AccountId,
        product: &ProductKind,
        quantity: i64,
        coupon_code: Option<&str>,
    ) -> EngineResult<OrderQuote> {
        let plain = self.catalog.quote(product, quantity, None)?;
        let Some(code) = coupon_code else {
            return Ok(plain);
        };

        let coupon = {
            let mut conn = self.ctx.db.pool().acquire().await?;
            CouponService::validate_in(&mut *conn, code, account_id, quantity, self.ctx.clock.now())
                .await?
        };
        Ok(self.catalog.quote(product, quantity, Some(&coupon))?)
    }

    /// Creates an order.
    ///
    /// Balance orders are settled and delivered before this returns; a
    /// failed delivery leaves the order `failed`, refunds it and returns
    /// `DeliveryFailed`. Manual orders wait in `awaiting_payment`.
    pub async fn place_order(&self, request: PurchaseRequest) -> EngineResult<Order> {
        let quote = self
            .quote(
                request.account_id,
                &request.product,
                request.quantity,
                request.coupon_code.as_deref(),
            )
            .await?;

        match request.payment_method {
            PaymentMethod::Balance => self.place_paid(request.account_id, quote).await,
            PaymentMethod::Manual => self.place_manual(request.account_id, quote).await,
        }
    }

    async fn place_manual(&self, account_id: AccountId, quote: OrderQuote) -> EngineResult<Order> {
        let now = self.ctx.clock.now();

        let mut tx = self.ctx.db.begin().await?;
        let id = CounterRepository::next(&mut *tx, ORDER_COUNTER).await?;
        let order = Order::from_quote(id, account_id, &quote, PaymentMethod::Manual, now);
        OrderRepository::insert(&mut *tx, &order).await?;
        tx.commit().await?;

        info!(order_id = id, account_id, product = %order.product, total = %order.total, "Order awaiting payment");
        self.ctx.notifier.notify(&Notification::PaymentReview {
            order_id: id,
            account_id,
            total: order.total,
        });
        Ok(order)
    }

    async fn place_paid(&self, account_id: AccountId, quote: OrderQuote) -> EngineResult<Order> {
        let pool = quote.product.pool_name();
        let mut keys = vec![account_key(account_id), pool_key(&pool)];
        if let Some(code) = &quote.coupon_code {
            keys.push(coupon_key(code));
        }
        let held = self.ctx.locks.lock_all(keys).await;
        let now = self.ctx.clock.now();

        // Cheap rejections before any write
        let wanted = quote.units_to_deliver();
        let available = self.ctx.db.inventory().size(&pool).await?;
        if available < wanted {
            return Err(CoreError::InsufficientStock {
                pool,
                available,
                requested: wanted,
            }
            .into());
        }
        let balance = self.ctx.db.balances().balance_of(account_id).await?;
        if balance < quote.total {
            return Err(CoreError::InsufficientBalance {
                account_id,
                balance: balance.amount(),
                required: quote.total.amount(),
            }
            .into());
        }

        let mut tx = self.ctx.db.begin().await?;
        let id = CounterRepository::next(&mut *tx, ORDER_COUNTER).await?;
        let reference = payment_reference(id);
        BalanceLedger::debit_in(
            &mut *tx,
            Mutation {
                account_id,
                amount: quote.total,
                kind: EntryKind::Purchase,
                reference: Some(&reference),
                at: now,
            },
        )
        .await?;
        let units = InventoryManager::take_in(&mut *tx, &pool, wanted).await?;
        if let Some(code) = &quote.coupon_code {
            CouponService::redeem_in(&mut *tx, code, account_id, id, now).await?;
        }

        let mut order = Order::from_quote(id, account_id, &quote, PaymentMethod::Balance, now);
        order.settling_at = Some(now);
        order.units = units;
        OrderRepository::insert(&mut *tx, &order).await?;
        tx.commit().await?;
        drop(held);

        info!(order_id = id, account_id, total = %order.total, units = order.units.len(), "Order paid from balance");
        self.inventory.after_take(&pool).await;

        let order = self.deliver(order).await?;
        if order.status == OrderStatus::Failed {
            return Err(CoreError::DeliveryFailed {
                order_id: order.id,
                reason: order.note.clone().unwrap_or_default(),
            }
            .into());
        }
        Ok(order)
    }

    // =========================================================================
    // Admin and sweeper transitions
    // =========================================================================

    /// Accepts the payment of a manual order, settles it and delivers.
    ///
    /// When stock or the coupon no longer allow the order, it is moved to
    /// `failed` with the reason as note and returned as `Applied`.
    pub async fn approve(&self, order_id: i64) -> EngineResult<TransitionOutcome> {
        let order = self.get(order_id).await?;
        if order.is_terminal() || order.is_settling() {
            return Ok(TransitionOutcome::AlreadyResolved {
                order_id,
                status: order.status,
            });
        }

        let pool = order.product.pool_name();
        let mut keys = vec![
            order_key(order_id),
            account_key(order.account_id),
            pool_key(&pool),
        ];
        if let Some(code) = &order.coupon_code {
            keys.push(coupon_key(code));
        }
        let held = self.ctx.locks.lock_all(keys).await;
        let now = self.ctx.clock.now();

        let mut tx = self.ctx.db.begin().await?;
        if !OrderRepository::begin_settlement(&mut *tx, order_id, now).await? {
            tx.rollback().await?;
            return self.already_resolved(order_id).await;
        }

        let units = match Self::settle_in(&mut *tx, &order, now).await {
            Ok(units) => units,
            Err(e) if fails_settlement(&e) => {
                tx.rollback().await?;
                let reason = e.to_string();
                warn!(order_id, reason = %reason, "Settlement refused");
                return match self.close_as_failed(order_id, order.account_id, &reason).await? {
                    Some(failed) => Ok(TransitionOutcome::Applied(failed)),
                    None => self.already_resolved(order_id).await,
                };
            }
            Err(e) => return Err(e),
        };
        tx.commit().await?;
        drop(held);

        info!(order_id, account_id = order.account_id, units = units.len(), "Order approved");
        self.inventory.after_take(&pool).await;

        let mut settling = order;
        settling.settling_at = Some(now);
        settling.units = units;
        Ok(TransitionOutcome::Applied(self.deliver(settling).await?))
    }

    /// Refuses the payment of an order that is not being settled.
    pub async fn reject(&self, order_id: i64, reason: &str) -> EngineResult<TransitionOutcome> {
        let order = self.get(order_id).await?;
        let _held = self.ctx.locks.lock(order_key(order_id)).await;
        let now = self.ctx.clock.now();

        let mut tx = self.ctx.db.begin().await?;
        let moved = OrderRepository::transition(
            &mut *tx,
            order_id,
            OrderStatus::AwaitingPayment,
            OrderStatus::Rejected,
            SettlingGuard::Unsettled,
            now,
            Some(reason),
        )
        .await?;
        if !moved {
            tx.rollback().await?;
            return self.already_resolved(order_id).await;
        }
        let refunded = BalanceLedger::refund_in(&mut *tx, order_id, order.account_id, now).await?;
        let rejected = Self::load_in(&mut *tx, order_id).await?;
        tx.commit().await?;

        info!(order_id, reason, %refunded, "Order rejected");
        self.ctx.notifier.notify(&Notification::OrderRejected {
            order_id,
            account_id: rejected.account_id,
            reason: reason.to_string(),
            refunded,
        });
        Ok(TransitionOutcome::Applied(rejected))
    }

    /// Closes an unpaid order whose payment window has passed.
    pub async fn expire(&self, order_id: i64) -> EngineResult<TransitionOutcome> {
        let order = self.get(order_id).await?;
        if order.is_terminal() || order.is_settling() {
            return Ok(TransitionOutcome::AlreadyResolved {
                order_id,
                status: order.status,
            });
        }
        let now = self.ctx.clock.now();
        if !order.is_expired_at(now, self.expiry) {
            return Ok(TransitionOutcome::NotDue { order_id });
        }

        let _held = self.ctx.locks.lock(order_key(order_id)).await;
        let mut tx = self.ctx.db.begin().await?;
        let moved = OrderRepository::transition(
            &mut *tx,
            order_id,
            OrderStatus::AwaitingPayment,
            OrderStatus::Expired,
            SettlingGuard::Unsettled,
            now,
            None,
        )
        .await?;
        if !moved {
            tx.rollback().await?;
            return self.already_resolved(order_id).await;
        }
        let expired = Self::load_in(&mut *tx, order_id).await?;
        tx.commit().await?;

        info!(order_id, account_id = expired.account_id, "Order expired");
        self.ctx.notifier.notify(&Notification::OrderExpired {
            order_id,
            account_id: expired.account_id,
        });
        Ok(TransitionOutcome::Applied(expired))
    }

    /// Fails an order and refunds whatever was captured for it. Running it
    /// again on the same order changes nothing.
    pub async fn fail(&self, order_id: i64, reason: &str) -> EngineResult<TransitionOutcome> {
        let order = self.get(order_id).await?;
        let _held = self.ctx.locks.lock(order_key(order_id)).await;

        match self.close_as_failed(order_id, order.account_id, reason).await? {
            Some(failed) => Ok(TransitionOutcome::Applied(failed)),
            None => self.already_resolved(order_id).await,
        }
    }

    /// Hands a settled order to the delivery channel again, for settlements
    /// whose delivery never reported back (a cancelled task or a restart).
    ///
    /// The channel receives the same order id and units as the first time.
    /// Success completes the order; failure fails it and refunds. Returns
    /// `NotDue` for an order that has not been settled.
    pub async fn redeliver(&self, order_id: i64) -> EngineResult<TransitionOutcome> {
        let _held = self.ctx.locks.lock(order_key(order_id)).await;
        let order = self.get(order_id).await?;
        if order.is_terminal() {
            return Ok(TransitionOutcome::AlreadyResolved {
                order_id,
                status: order.status,
            });
        }
        if !order.is_settling() {
            return Ok(TransitionOutcome::NotDue { order_id });
        }

        warn!(
            order_id,
            account_id = order.account_id,
            units = order.units.len(),
            "Retrying delivery"
        );
        let delivered = self.deliver(order).await?;
        Ok(TransitionOutcome::Applied(delivered))
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub async fn get(&self, order_id: i64) -> EngineResult<Order> {
        self.ctx
            .db
            .orders()
            .get(order_id)
            .await?
            .ok_or_else(|| CoreError::OrderNotFound(order_id).into())
    }

    /// Most recent orders of an account, newest first.
    pub async fn orders_for(&self, account_id: AccountId, limit: i64) -> EngineResult<Vec<Order>> {
        Ok(self.ctx.db.orders().for_account(account_id, limit.max(0)).await?)
    }

    /// Orders waiting for an admin decision, oldest first.
    pub async fn pending(&self) -> EngineResult<Vec<Order>> {
        Ok(self.ctx.db.orders().awaiting_review().await?)
    }

    pub(crate) fn now(&self) -> DateTime<Utc> {
        self.ctx.clock.now()
    }

    /// Settled orders still waiting on delivery since `cutoff` or earlier.
    pub async fn stale_settlements(&self, cutoff: DateTime<Utc>) -> EngineResult<Vec<Order>> {
        Ok(self.ctx.db.orders().stale_settling(cutoff).await?)
    }

    /// Unsettled orders created at or before `now - expiry`.
    pub async fn expirable(&self, now: DateTime<Utc>) -> EngineResult<Vec<Order>> {
        Ok(self.ctx.db.orders().expirable(now - self.expiry).await?)
    }

    // =========================================================================
    // Internals
    // =========================================================================

    /// Consumes stock, the coupon use and (for balance orders) funds for an
    /// order already marked as settling in this transaction.
    async fn settle_in(
        conn: &mut SqliteConnection,
        order: &Order,
        at: DateTime<Utc>,
    ) -> EngineResult<Vec<String>> {
        let pool = order.product.pool_name();
        let units = InventoryManager::take_in(&mut *conn, &pool, order.units_to_deliver()).await?;

        if let Some(code) = &order.coupon_code {
            CouponService::redeem_in(&mut *conn, code, order.account_id, order.id, at).await?;
        }

        if order.payment_method == PaymentMethod::Balance {
            let reference = payment_reference(order.id);
            BalanceLedger::debit_in(
                &mut *conn,
                Mutation {
                    account_id: order.account_id,
                    amount: order.total,
                    kind: EntryKind::Purchase,
                    reference: Some(&reference),
                    at,
                },
            )
            .await?;
        }

        OrderRepository::set_units(&mut *conn, order.id, &units).await?;
        Ok(units)
    }

    /// Hands a settled order to the delivery channel and records the result.
    async fn deliver(&self, mut order: Order) -> EngineResult<Order> {
        if let Err(e) = self
            .delivery
            .deliver(order.account_id, order.id, &order.units)
            .await
        {
            error!(order_id = order.id, reason = %e, "Delivery failed");
            let reason = format!("delivery failed: {}", e);
            return match self.close_as_failed(order.id, order.account_id, &reason).await? {
                Some(failed) => Ok(failed),
                None => self.get(order.id).await,
            };
        }

        let now = self.ctx.clock.now();
        let moved = {
            let mut conn = self.ctx.db.pool().acquire().await?;
            OrderRepository::transition(
                &mut *conn,
                order.id,
                OrderStatus::AwaitingPayment,
                OrderStatus::Completed,
                SettlingGuard::Settling,
                now,
                None,
            )
            .await?
        };

        if !moved {
            warn!(order_id = order.id, "Order resolved elsewhere during delivery");
            return self.get(order.id).await;
        }

        order.status = OrderStatus::Completed;
        order.terminal_at = Some(now);
        info!(order_id = order.id, account_id = order.account_id, "Order completed");
        self.ctx.notifier.notify(&Notification::OrderCompleted {
            order_id: order.id,
            account_id: order.account_id,
            units: order.units.len() as i64,
        });
        Ok(order)
    }

    /// Moves an open order to `failed` and refunds it in one transaction.
    /// Returns `None` when the order was already terminal.
    async fn close_as_failed(
        &self,
        order_id: i64,
        account_id: AccountId,
        reason: &str,
    ) -> EngineResult<Option<Order>> {
        let now = self.ctx.clock.now();

        let mut tx = self.ctx.db.begin().await?;
        let moved = OrderRepository::transition(
            &mut *tx,
            order_id,
            OrderStatus::AwaitingPayment,
            OrderStatus::Failed,
            SettlingGuard::Any,
            now,
            Some(reason),
        )
        .await?;
        if !moved {
            tx.rollback().await?;
            debug!(order_id, "Order already terminal, nothing to fail");
            return Ok(None);
        }
        let refunded = BalanceLedger::refund_in(&mut *tx, order_id, account_id, now).await?;
        let failed = Self::load_in(&mut *tx, order_id).await?;
        tx.commit().await?;

        warn!(order_id, reason, %refunded, "Order failed");
        self.ctx.notifier.notify(&Notification::OrderFailed {
            order_id,
            account_id,
            reason: reason.to_string(),
            refunded,
        });
        Ok(Some(failed))
    }

    async fn load_in(conn: &mut SqliteConnection, order_id: i64) -> EngineResult<Order> {
        OrderRepository::get_in(&mut *conn, order_id)
            .await?
            .ok_or_else(|| CoreError::OrderNotFound(order_id).into())
    }

    async fn already_resolved(&self, order_id: i64) -> EngineResult<TransitionOutcome> {
        let current = self.get(order_id).await?;
        debug!(order_id, status = %current.status, "Order already resolved");
        Ok(TransitionOutcome::AlreadyResolved {
            order_id,
            status: current.status,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Harness;
    use vendo_core::coupon::NewCoupon;
    use vendo_core::{CouponRejection, Money};

    fn buy(account_id: AccountId, quantity: i64, method: PaymentMethod) -> PurchaseRequest {
        PurchaseRequest {
            account_id,
            product: ProductKind::Link,
            quantity,
            coupon_code: None,
            payment_method: method,
        }
    }

    fn with_coupon(mut request: PurchaseRequest, code: &str) -> PurchaseRequest {
        request.coupon_code = Some(code.to_string());
        request
    }

    async fn create_coupon(h: &Harness, code: &str, max_uses: Option<i64>) {
        h.engine
            .coupons()
            .create(NewCoupon {
                code: code.to_string(),
                discount_percent: 10,
                min_order_quantity: 0,
                max_uses,
                expires_at: None,
                first_order_only: false,
            })
            .await
            .unwrap();
    }

    fn status_of(outcome: &TransitionOutcome) -> OrderStatus {
        match outcome {
            TransitionOutcome::Applied(order) => order.status,
            TransitionOutcome::AlreadyResolved { status, .. } => *status,
            TransitionOutcome::NotDue { .. } => OrderStatus::AwaitingPayment,
        }
    }

    #[tokio::test]
    async fn test_tiered_order_with_coupon() {
        let h = Harness::new().await;
        h.stock("links", 200).await;
        h.fund(1, 100_000).await;
        create_coupon(&h, "HEMAT10", None).await;

        let quote = h
            .engine
            .orders()
            .quote(1, &ProductKind::Link, 150, Some("hemat10"))
            .await
            .unwrap();
        assert_eq!(quote.unit_price, Money::new(450));
        assert_eq!(quote.subtotal, Money::new(67_500));
        assert_eq!(quote.total, Money::new(60_750));
        assert_eq!(quote.bonus_quantity, 15);

        let order = h
            .engine
            .orders()
            .place_order(with_coupon(buy(1, 150, PaymentMethod::Balance), "hemat10"))
            .await
            .unwrap();

        assert_eq!(order.status, OrderStatus::Completed);
        assert_eq!(order.total, Money::new(60_750));
        assert_eq!(order.units.len(), 165);
        assert_eq!(h.engine.ledger().balance_of(1).await.unwrap(), Money::new(39_250));
        assert_eq!(h.engine.inventory().size("links").await.unwrap(), 35);

        let coupon = h.engine.coupons().get("HEMAT10").await.unwrap().unwrap();
        assert_eq!(coupon.used_count, 1);
        assert_eq!(h.delivery.delivered().len(), 1);
    }

    #[tokio::test]
    async fn test_balance_order_rejected_without_side_effects() {
        let h = Harness::new().await;
        h.stock("links", 5).await;
        h.fund(2, 1_000).await;

        let err = h
            .engine
            .orders()
            .place_order(buy(2, 3, PaymentMethod::Balance))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Core(CoreError::InsufficientBalance {
                balance: 1_000,
                required: 1_500,
                ..
            })
        ));

        let err = h
            .engine
            .orders()
            .place_order(buy(2, 6, PaymentMethod::Balance))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Core(CoreError::InsufficientStock { .. })));

        assert_eq!(h.engine.ledger().balance_of(2).await.unwrap(), Money::new(1_000));
        assert_eq!(h.engine.inventory().size("links").await.unwrap(), 5);
        assert!(h.engine.orders().orders_for(2, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_quantity_is_rejected() {
        let h = Harness::new().await;
        let err = h
            .engine
            .orders()
            .place_order(buy(1, 0, PaymentMethod::Manual))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Core(CoreError::InvalidQuantity { .. })));
    }

    #[tokio::test]
    async fn test_concurrent_orders_never_oversell() {
        let h = Harness::new().await;
        h.stock("links", 10).await;
        for account in 1..=6 {
            h.fund(account, 10_000).await;
        }

        let orders = h.engine.orders();
        let mut handles = Vec::new();
        for account in 1..=6 {
            let orders = orders.clone();
            handles.push(tokio::spawn(async move {
                orders.place_order(buy(account, 3, PaymentMethod::Balance)).await
            }));
        }

        let mut delivered = 0;
        let mut refused = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(order) => delivered += order.units.len(),
                Err(EngineError::Core(CoreError::InsufficientStock { .. })) => refused += 1,
                Err(other) => panic!("unexpected error: {:?}", other),
            }
        }

        assert_eq!(delivered, 9);
        assert_eq!(refused, 3);
        assert_eq!(h.engine.inventory().size("links").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_single_use_coupon_redeemed_once_under_contention() {
        let h = Harness::new().await;
        h.stock("links", 50).await;
        create_coupon(&h, "ONCE", Some(1)).await;
        for account in 1..=4 {
            h.fund(account, 10_000).await;
        }

        let orders = h.engine.orders();
        let mut handles = Vec::new();
        for account in 1..=4 {
            let orders = orders.clone();
            handles.push(tokio::spawn(async move {
                orders
                    .place_order(with_coupon(buy(account, 2, PaymentMethod::Balance), "ONCE"))
                    .await
            }));
        }

        let mut accepted = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => accepted += 1,
                Err(EngineError::Core(CoreError::Coupon(
                    CouponRejection::UsageLimitReached { .. },
                ))) => {}
                Err(other) => panic!("unexpected error: {:?}", other),
            }
        }

        assert_eq!(accepted, 1);
        let coupon = h.engine.coupons().get("ONCE").await.unwrap().unwrap();
        assert_eq!(coupon.used_count, 1);
        assert_eq!(coupon.used_by.len(), 1);
    }

    #[tokio::test]
    async fn test_manual_order_approval_takes_stock_at_settlement() {
        let h = Harness::new().await;
        h.stock("links", 3).await;
        let orders = h.engine.orders();

        let order = orders.place_order(buy(4, 2, PaymentMethod::Manual)).await.unwrap();
        assert_eq!(order.status, OrderStatus::AwaitingPayment);
        assert_eq!(h.engine.inventory().size("links").await.unwrap(), 3);
        assert!(h
            .notifier
            .all()
            .contains(&Notification::PaymentReview {
                order_id: order.id,
                account_id: 4,
                total: Money::new(1_000),
            }));
        assert_eq!(orders.pending().await.unwrap().len(), 1);

        let outcome = orders.approve(order.id).await.unwrap();
        assert_eq!(status_of(&outcome), OrderStatus::Completed);
        assert_eq!(h.engine.inventory().size("links").await.unwrap(), 1);
        assert!(orders.pending().await.unwrap().is_empty());

        let again = orders.approve(order.id).await.unwrap();
        assert_eq!(
            again,
            TransitionOutcome::AlreadyResolved {
                order_id: order.id,
                status: OrderStatus::Completed
            }
        );
        assert_eq!(h.delivery.delivered().len(), 1);
    }

    #[tokio::test]
    async fn test_approval_without_stock_fails_the_order() {
        let h = Harness::new().await;
        h.stock("links", 1).await;
        let orders = h.engine.orders();

        let order = orders.place_order(buy(4, 2, PaymentMethod::Manual)).await.unwrap();
        let outcome = orders.approve(order.id).await.unwrap();

        match outcome {
            TransitionOutcome::Applied(failed) => {
                assert_eq!(failed.status, OrderStatus::Failed);
                assert!(failed.note.unwrap().contains("Insufficient stock"));
                assert!(failed.terminal_at.is_some());
            }
            other => panic!("expected applied failure, got {:?}", other),
        }
        assert_eq!(h.engine.inventory().size("links").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_terminal_orders_stay_terminal() {
        let h = Harness::new().await;
        let orders = h.engine.orders();

        let order = orders.place_order(buy(4, 1, PaymentMethod::Manual)).await.unwrap();
        let rejected = orders.reject(order.id, "blurry receipt").await.unwrap();
        assert_eq!(status_of(&rejected), OrderStatus::Rejected);

        for outcome in [
            orders.approve(order.id).await.unwrap(),
            orders.reject(order.id, "again").await.unwrap(),
            orders.fail(order.id, "late").await.unwrap(),
        ] {
            assert_eq!(
                outcome,
                TransitionOutcome::AlreadyResolved {
                    order_id: order.id,
                    status: OrderStatus::Rejected
                }
            );
        }

        h.clock.advance(Duration::hours(2));
        assert!(!orders.expire(order.id).await.unwrap().is_applied());

        let stored = orders.get(order.id).await.unwrap();
        assert_eq!(stored.status, OrderStatus::Rejected);
        assert_eq!(stored.note.as_deref(), Some("blurry receipt"));
    }

    #[tokio::test]
    async fn test_delivery_failure_refunds_exactly_once() {
        let h = Harness::new().await;
        h.stock("links", 10).await;
        h.fund(6, 5_000).await;
        h.delivery.set_failing(true);

        let err = h
            .engine
            .orders()
            .place_order(buy(6, 4, PaymentMethod::Balance))
            .await
            .unwrap_err();
        let order_id = match err {
            EngineError::Core(CoreError::DeliveryFailed { order_id, .. }) => order_id,
            other => panic!("expected delivery failure, got {:?}", other),
        };

        let ledger = h.engine.ledger();
        assert_eq!(ledger.balance_of(6).await.unwrap(), Money::new(5_000));

        let retry = h.engine.orders().fail(order_id, "retry").await.unwrap();
        assert!(!retry.is_applied());
        assert_eq!(ledger.balance_of(6).await.unwrap(), Money::new(5_000));

        let order = h.engine.orders().get(order_id).await.unwrap();
        assert_eq!(order.status, OrderStatus::Failed);
        assert_eq!(order.units.len(), 4);
        assert_eq!(h.engine.inventory().size("links").await.unwrap(), 6);

        let refunds = ledger
            .history(6, 10)
            .await
            .unwrap()
            .into_iter()
            .filter(|e| e.kind == EntryKind::Refund)
            .count();
        assert_eq!(refunds, 1);
    }

    #[tokio::test]
    async fn test_expire_respects_window() {
        let h = Harness::new().await;
        let orders = h.engine.orders();
        let order = orders.place_order(buy(4, 1, PaymentMethod::Manual)).await.unwrap();

        h.clock.advance(Duration::minutes(29));
        assert_eq!(
            orders.expire(order.id).await.unwrap(),
            TransitionOutcome::NotDue { order_id: order.id }
        );

        h.clock.advance(Duration::minutes(1));
        let expired = orders.expire(order.id).await.unwrap();
        assert_eq!(status_of(&expired), OrderStatus::Expired);
        assert!(h.notifier.all().contains(&Notification::OrderExpired {
            order_id: order.id,
            account_id: 4
        }));
    }

    #[tokio::test]
    async fn test_expiry_and_approval_race_has_one_winner() {
        let h = Harness::new().await;
        h.stock("links", 20).await;
        let orders = h.engine.orders();

        let mut ids = Vec::new();
        for account in 1..=5 {
            ids.push(orders.place_order(buy(account, 1, PaymentMethod::Manual)).await.unwrap().id);
        }
        h.clock.advance(Duration::minutes(45));

        let mut handles = Vec::new();
        for id in ids.clone() {
            let approver = orders.clone();
            let sweeper = orders.clone();
            handles.push(tokio::spawn(async move { approver.approve(id).await }));
            handles.push(tokio::spawn(async move { sweeper.expire(id).await }));
        }

        let mut applied = 0;
        for handle in handles {
            if handle.await.unwrap().unwrap().is_applied() {
                applied += 1;
            }
        }
        assert_eq!(applied, ids.len());

        let mut completed = 0;
        for id in ids {
            let order = orders.get(id).await.unwrap();
            assert!(matches!(order.status, OrderStatus::Completed | OrderStatus::Expired));
            if order.status == OrderStatus::Completed {
                completed += 1;
            }
        }
        assert_eq!(h.engine.inventory().size("links").await.unwrap(), 20 - completed);
    }

    #[tokio::test]
    async fn test_first_order_coupon_counts_orders_still_delivering() {
        let h = Harness::new().await;
        h.stock("links", 20).await;
        h.fund(3, 10_000).await;
        h.fund(5, 10_000).await;
        h.engine
            .coupons()
            .create(NewCoupon {
                code: "WELCOME".to_string(),
                discount_percent: 50,
                min_order_quantity: 0,
                max_uses: None,
                expires_at: None,
                first_order_only: true,
            })
            .await
            .unwrap();
        let orders = h.engine.orders();

        // Account 5 reserves the coupon on a manual order before buying anything
        let manual = orders
            .place_order(with_coupon(buy(5, 1, PaymentMethod::Manual), "WELCOME"))
            .await
            .unwrap();

        h.delivery.hold();
        let mut running = Vec::new();
        for account in [3, 5] {
            let placing = orders.clone();
            running.push(tokio::spawn(async move {
                placing.place_order(buy(account, 1, PaymentMethod::Balance)).await
            }));
            h.delivery.wait_for_attempts(running.len()).await;
        }

        let err = orders
            .place_order(with_coupon(buy(3, 1, PaymentMethod::Balance), "WELCOME"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Core(CoreError::Coupon(CouponRejection::NotFirstOrder { .. }))
        ));

        match orders.approve(manual.id).await.unwrap() {
            TransitionOutcome::Applied(failed) => {
                assert_eq!(failed.status, OrderStatus::Failed);
                assert!(failed.note.unwrap().contains("first order"));
            }
            other => panic!("expected applied failure, got {:?}", other),
        }

        h.delivery.release();
        for task in running {
            assert_eq!(task.await.unwrap().unwrap().status, OrderStatus::Completed);
        }
        let coupon = h.engine.coupons().get("WELCOME").await.unwrap().unwrap();
        assert_eq!(coupon.used_count, 0);
        assert_eq!(h.engine.ledger().balance_of(3).await.unwrap(), Money::new(9_500));
    }

    #[tokio::test]
    async fn test_first_order_coupon_settles_on_a_first_order() {
        let h = Harness::new().await;
        h.stock("links", 5).await;
        h.engine
            .coupons()
            .create(NewCoupon {
                code: "WELCOME".to_string(),
                discount_percent: 50,
                min_order_quantity: 0,
                max_uses: None,
                expires_at: None,
                first_order_only: true,
            })
            .await
            .unwrap();
        let orders = h.engine.orders();

        let order = orders
            .place_order(with_coupon(buy(8, 2, PaymentMethod::Manual), "WELCOME"))
            .await
            .unwrap();
        let outcome = orders.approve(order.id).await.unwrap();
        assert_eq!(status_of(&outcome), OrderStatus::Completed);
        assert_eq!(h.engine.coupons().get("WELCOME").await.unwrap().unwrap().used_count, 1);
    }

    #[tokio::test]
    async fn test_unknown_order() {
        let h = Harness::new().await;
        let err = h.engine.orders().approve(77).await.unwrap_err();
        assert!(matches!(err, EngineError::Core(CoreError::OrderNotFound(77))));
    }
}
