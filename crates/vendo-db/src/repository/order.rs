//! # Order Repository
//!
//! Order rows and their status transitions.
//!
//! ## Compare-and-Swap Transitions
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Admin approves #41        Sweeper expires #41                          │
//! │       │                          │                                      │
//! │       ▼                          ▼                                      │
//! │  UPDATE orders              UPDATE orders                               │
//! │  SET settling_at = now      SET status = 'expired'                      │
//! │  WHERE id = 41              WHERE id = 41                               │
//! │    AND status = 'awaiting_payment'                                      │
//! │    AND settling_at IS NULL    AND status = 'awaiting_payment'           │
//! │                               AND settling_at IS NULL                   │
//! │       │                          │                                      │
//! │       ▼                          ▼                                      │
//! │  1 row → winner            0 rows → lost the race, no-op                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//! SQLite runs the two statements one after the other, so exactly one of
//! them matches.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};
use tracing::debug;

use vendo_core::{AccountId, Money, Order, OrderStatus};

use super::{from_millis, from_millis_opt, to_millis};
use crate::error::{DbError, DbResult};

const COLUMNS: &str = r#"
    id, account_id, product, quantity, bonus_quantity, unit_price, subtotal,
    discount, total, coupon_code, status, payment_method, created_at,
    terminal_at, settling_at, units, note
"#;

/// Which orders a status transition may touch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettlingGuard {
    /// Only orders nobody has started settling (reject, expire).
    Unsettled,
    /// Only orders whose settlement is in flight (complete, fail after delivery).
    Settling,
    /// Either.
    Any,
}

#[derive(Debug, Clone)]
pub struct OrderRepository {
    pool: SqlitePool,
}

impl OrderRepository {
    pub fn new(pool: SqlitePool) -> Self {
        OrderRepository { pool }
    }

    // =========================================================================
    // Composable operations
    // =========================================================================

    pub async fn insert(conn: &mut SqliteConnection, order: &Order) -> DbResult<()> {
        let units = serde_json::to_string(&order.units)
            .map_err(|e| DbError::invalid("orders.units", e))?;

        sqlx::query(
            r#"
            INSERT INTO orders (
                id, account_id, product, quantity, bonus_quantity, unit_price, subtotal,
                discount, total, coupon_code, status, payment_method, created_at,
                terminal_at, settling_at, units, note
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)
            "#,
        )
        .bind(order.id)
        .bind(order.account_id)
        .bind(order.product.to_string())
        .bind(order.quantity)
        .bind(order.bonus_quantity)
        .bind(order.unit_price.amount())
        .bind(order.subtotal.amount())
        .bind(order.discount.amount())
        .bind(order.total.amount())
        .bind(&order.coupon_code)
        .bind(order.status)
        .bind(order.payment_method)
        .bind(to_millis(order.created_at))
        .bind(order.terminal_at.map(to_millis))
        .bind(order.settling_at.map(to_millis))
        .bind(units)
        .bind(&order.note)
        .execute(&mut *conn)
        .await?;

        debug!(order_id = order.id, status = %order.status, "Order inserted");
        Ok(())
    }

    pub async fn get_in(conn: &mut SqliteConnection, id: i64) -> DbResult<Option<Order>> {
        let row = sqlx::query(&format!("SELECT {} FROM orders WHERE id = ?1", COLUMNS))
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;
        row.as_ref().map(order_from_row).transpose()
    }

    /// Claims an open order for settlement.
    ///
    /// Returns false when the order is terminal or already being settled.
    pub async fn begin_settlement(
        conn: &mut SqliteConnection,
        id: i64,
        at: DateTime<Utc>,
    ) -> DbResult<bool> {
        let affected = sqlx::query(
            r#"
            UPDATE orders SET settling_at = ?2
            WHERE id = ?1 AND status = 'awaiting_payment' AND settling_at IS NULL
            "#,
        )
        .bind(id)
        .bind(to_millis(at))
        .execute(&mut *conn)
        .await?
        .rows_affected();
        Ok(affected > 0)
    }

    /// Stores the units allocated to an order.
    pub async fn set_units(conn: &mut SqliteConnection, id: i64, units: &[String]) -> DbResult<()> {
        let units = serde_json::to_string(units).map_err(|e| DbError::invalid("orders.units", e))?;
        sqlx::query("UPDATE orders SET units = ?2 WHERE id = ?1")
            .bind(id)
            .bind(units)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    /// Moves an order from `from` to `to`, stamping `terminal_at` when `to`
    /// is terminal. Returns false when the order was not in `from` (or did
    /// not match `guard`).
    pub async fn transition(
        conn: &mut SqliteConnection,
        id: i64,
        from: OrderStatus,
        to: OrderStatus,
        guard: SettlingGuard,
        at: DateTime<Utc>,
        note: Option<&str>,
    ) -> DbResult<bool> {
        let guard_sql = match guard {
            SettlingGuard::Unsettled => "AND settling_at IS NULL",
            SettlingGuard::Settling => "AND settling_at IS NOT NULL",
            SettlingGuard::Any => "",
        };
        let terminal_at = to.is_terminal().then(|| to_millis(at));

        let affected = sqlx::query(&format!(
            r#"
            UPDATE orders
            SET status = ?3,
                terminal_at = COALESCE(?4, terminal_at),
                note = COALESCE(?5, note)
            WHERE id = ?1 AND status = ?2 {}
            "#,
            guard_sql
        ))
        .bind(id)
        .bind(from)
        .bind(to)
        .bind(terminal_at)
        .bind(note)
        .execute(&mut *conn)
        .await?
        .rows_affected();

        if affected > 0 {
            debug!(order_id = id, from = %from, to = %to, "Order transitioned");
        }
        Ok(affected > 0)
    }

    /// Orders of an account that already took stock: completed ones and
    /// settled ones still waiting on delivery. `excluding` leaves out the
    /// order being settled.
    pub async fn prior_count(
        conn: &mut SqliteConnection,
        account_id: AccountId,
        excluding: Option<i64>,
    ) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM orders
            WHERE account_id = ?1
              AND (?2 IS NULL OR id != ?2)
              AND (status = 'completed'
                   OR (status = 'awaiting_payment' AND settling_at IS NOT NULL))
            "#,
        )
        .bind(account_id)
        .bind(excluding)
        .fetch_one(&mut *conn)
        .await?;
        Ok(count)
    }

    // =========================================================================
    // One-shot wrappers
    // =========================================================================

    pub async fn get(&self, id: i64) -> DbResult<Option<Order>> {
        let mut conn = self.pool.acquire().await?;
        Self::get_in(&mut *conn, id).await
    }

    /// Most recent orders of an account, newest first.
    pub async fn for_account(&self, account_id: AccountId, limit: i64) -> DbResult<Vec<Order>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM orders WHERE account_id = ?1 ORDER BY id DESC LIMIT ?2",
            COLUMNS
        ))
        .bind(account_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(order_from_row).collect()
    }

    /// Open orders waiting for an admin, oldest first.
    pub async fn awaiting_review(&self) -> DbResult<Vec<Order>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {} FROM orders
            WHERE status = 'awaiting_payment' AND settling_at IS NULL
            ORDER BY created_at, id
            "#,
            COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(order_from_row).collect()
    }

    /// Open, unsettled orders created at or before `cutoff`.
    pub async fn expirable(&self, cutoff: DateTime<Utc>) -> DbResult<Vec<Order>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {} FROM orders
            WHERE status = 'awaiting_payment' AND settling_at IS NULL AND created_at <= ?1
            ORDER BY created_at, id
            "#,
            COLUMNS
        ))
        .bind(to_millis(cutoff))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(order_from_row).collect()
    }

    /// Settled orders whose delivery has not reported back since `cutoff`.
    pub async fn stale_settling(&self, cutoff: DateTime<Utc>) -> DbResult<Vec<Order>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {} FROM orders
            WHERE status = 'awaiting_payment' AND settling_at IS NOT NULL AND settling_at <= ?1
            ORDER BY settling_at, id
            "#,
            COLUMNS
        ))
        .bind(to_millis(cutoff))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(order_from_row).collect()
    }

    /// Total paid by completed orders (for diagnostics).
    pub async fn completed_revenue(&self) -> DbResult<Money> {
        let total: i64 =
            sqlx::query_scalar("SELECT COALESCE(SUM(total), 0) FROM orders WHERE status = 'completed'")
                .fetch_one(&self.pool)
                .await?;
        Ok(Money::new(total))
    }
}

fn order_from_row(row: &SqliteRow) -> DbResult<Order> {
    let product: String = row.try_get("product")?;
    let units: String = row.try_get("units")?;

    Ok(Order {
        id: row.try_get("id")?,
        account_id: row.try_get("account_id")?,
        product: product
            .parse()
            .map_err(|e| DbError::invalid("orders.product", e))?,
        quantity: row.try_get("quantity")?,
        bonus_quantity: row.try_get("bonus_quantity")?,
        unit_price: Money::new(row.try_get("unit_price")?),
        subtotal: Money::new(row.try_get("subtotal")?),
        discount: Money::new(row.try_get("discount")?),
        total: Money::new(row.try_get("total")?),
        coupon_code: row.try_get("coupon_code")?,
        status: row.try_get("status")?,
        payment_method: row.try_get("payment_method")?,
        created_at: from_millis("orders.created_at", row.try_get("created_at")?)?,
        terminal_at: from_millis_opt("orders.terminal_at", row.try_get("terminal_at")?)?,
        settling_at: from_millis_opt("orders.settling_at", row.try_get("settling_at")?)?,
        units: serde_json::from_str(&units).map_err(|e| DbError::invalid("orders.units", e))?,
        note: row.try_get("note")?,
    })
}
