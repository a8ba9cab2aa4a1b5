//! # Coupon Repository
//!
//! Coupon definitions and the per-account redemption set.
//!
//! ## Redeeming
//! ```text
//! 1. UPDATE coupons SET used_count = used_count + 1
//!    WHERE code = ? AND (max_uses IS NULL OR used_count < max_uses)
//!        └── 0 rows → LimitReached
//!
//! 2. INSERT INTO coupon_redemptions (code, account_id, ...)
//!    ON CONFLICT DO NOTHING
//!        └── 0 rows → AlreadyUsed
//! ```
//! Both run inside the order settlement transaction; a rejection makes the
//! caller roll back, undoing step 1.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};

use vendo_core::coupon::Coupon;
use vendo_core::AccountId;

use super::{from_millis_opt, to_millis};
use crate::error::{DbError, DbResult};

/// Result of recording a coupon use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedeemOutcome {
    Redeemed,
    /// The coupon is unknown or inactive.
    Unavailable,
    LimitReached,
    AlreadyUsed,
}

#[derive(Debug, Clone)]
pub struct CouponRepository {
    pool: SqlitePool,
}

impl CouponRepository {
    pub fn new(pool: SqlitePool) -> Self {
        CouponRepository { pool }
    }

    // =========================================================================
    // Composable operations
    // =========================================================================

    /// Loads a coupon with its redemption set. `code` must be normalized.
    pub async fn get_in(conn: &mut SqliteConnection, code: &str) -> DbResult<Option<Coupon>> {
        let row = sqlx::query(
            r#"
            SELECT code, discount_percent, min_order_quantity, max_uses, used_count,
                   expires_at, active, first_order_only
            FROM coupons WHERE code = ?1
            "#,
        )
        .bind(code)
        .fetch_optional(&mut *conn)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let used_by: Vec<AccountId> = sqlx::query_scalar(
            "SELECT account_id FROM coupon_redemptions WHERE code = ?1 ORDER BY rowid",
        )
        .bind(code)
        .fetch_all(&mut *conn)
        .await?;

        coupon_from_row(&row, used_by).map(Some)
    }

    /// Records one use of `code` by `account_id`.
    pub async fn redeem(
        conn: &mut SqliteConnection,
        code: &str,
        account_id: AccountId,
        order_id: i64,
        at: DateTime<Utc>,
    ) -> DbResult<RedeemOutcome> {
        let bumped = sqlx::query(
            r#"
            UPDATE coupons SET used_count = used_count + 1
            WHERE code = ?1 AND active = 1
              AND (max_uses IS NULL OR used_count < max_uses)
            "#,
        )
        .bind(code)
        .execute(&mut *conn)
        .await?
        .rows_affected();

        if bumped == 0 {
            let active: Option<bool> =
                sqlx::query_scalar("SELECT active FROM coupons WHERE code = ?1")
                    .bind(code)
                    .fetch_optional(&mut *conn)
                    .await?;
            return Ok(match active {
                Some(true) => RedeemOutcome::LimitReached,
                _ => RedeemOutcome::Unavailable,
            });
        }

        let inserted = sqlx::query(
            r#"
            INSERT INTO coupon_redemptions (code, account_id, order_id, redeemed_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT (code, account_id) DO NOTHING
            "#,
        )
        .bind(code)
        .bind(account_id)
        .bind(order_id)
        .bind(to_millis(at))
        .execute(&mut *conn)
        .await?
        .rows_affected();

        if inserted == 0 {
            return Ok(RedeemOutcome::AlreadyUsed);
        }

        Ok(RedeemOutcome::Redeemed)
    }

    // =========================================================================
    // One-shot wrappers
    // =========================================================================

    pub async fn get(&self, code: &str) -> DbResult<Option<Coupon>> {
        let mut conn = self.pool.acquire().await?;
        Self::get_in(&mut *conn, code).await
    }

    /// Inserts a new coupon; fails with `UniqueViolation` if the code exists.
    pub async fn insert(&self, coupon: &Coupon, at: DateTime<Utc>) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO coupons (
                code, discount_percent, min_order_quantity, max_uses, used_count,
                expires_at, active, first_order_only, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(&coupon.code)
        .bind(coupon.discount_percent)
        .bind(coupon.min_order_quantity)
        .bind(coupon.max_uses)
        .bind(coupon.used_count)
        .bind(coupon.expires_at.map(to_millis))
        .bind(coupon.active)
        .bind(coupon.first_order_only)
        .bind(to_millis(at))
        .execute(&self.pool)
        .await
        .map_err(|e| match DbError::from(e) {
            DbError::UniqueViolation { field, .. } => DbError::UniqueViolation {
                field,
                value: coupon.code.clone(),
            },
            other => other,
        })?;

        Ok(())
    }

    /// Turns a coupon on or off. Returns false when the code is unknown.
    pub async fn set_active(&self, code: &str, active: bool) -> DbResult<bool> {
        let affected = sqlx::query("UPDATE coupons SET active = ?2 WHERE code = ?1")
            .bind(code)
            .bind(active)
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(affected > 0)
    }

    /// All coupons, newest first, without redemption sets.
    pub async fn list(&self) -> DbResult<Vec<Coupon>> {
        let rows = sqlx::query(
            r#"
            SELECT code, discount_percent, min_order_quantity, max_uses, used_count,
                   expires_at, active, first_order_only
            FROM coupons ORDER BY created_at DESC, code
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(|row| coupon_from_row(row, Vec::new())).collect()
    }
}

fn coupon_from_row(row: &SqliteRow, used_by: Vec<AccountId>) -> DbResult<Coupon> {
    Ok(Coupon {
        code: row.try_get("code")?,
        discount_percent: row.try_get("discount_percent")?,
        min_order_quantity: row.try_get("min_order_quantity")?,
        max_uses: row.try_get("max_uses")?,
        used_count: row.try_get("used_count")?,
        used_by,
        expires_at: from_millis_opt("coupons.expires_at", row.try_get("expires_at")?)?,
        active: row.try_get("active")?,
        first_order_only: row.try_get("first_order_only")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};

    fn coupon(code: &str, max_uses: Option<i64>) -> Coupon {
        Coupon {
            code: code.to_string(),
            discount_percent: 10,
            min_order_quantity: 0,
            max_uses,
            used_count: 0,
            used_by: Vec::new(),
            expires_at: None,
            active: true,
            first_order_only: false,
        }
    }

    async fn redeem(db: &Database, code: &str, account: AccountId) -> RedeemOutcome {
        let mut tx = db.begin().await.unwrap();
        let outcome = CouponRepository::redeem(&mut *tx, code, account, 1, Utc::now())
            .await
            .unwrap();
        if outcome == RedeemOutcome::Redeemed {
            tx.commit().await.unwrap();
        }
        outcome
    }

    #[tokio::test]
    async fn test_insert_get_and_duplicate() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.coupons();
        repo.insert(&coupon("HEMAT10", Some(3)), Utc::now()).await.unwrap();

        let loaded = repo.get("HEMAT10").await.unwrap().unwrap();
        assert_eq!(loaded, coupon("HEMAT10", Some(3)));

        let err = repo.insert(&coupon("HEMAT10", None), Utc::now()).await.unwrap_err();
        assert!(err.is_unique_violation());
        assert!(repo.get("NOPE").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_redeem_respects_limit_and_account() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.coupons().insert(&coupon("ONCE", Some(2)), Utc::now()).await.unwrap();

        assert_eq!(redeem(&db, "ONCE", 1).await, RedeemOutcome::Redeemed);
        assert_eq!(redeem(&db, "ONCE", 1).await, RedeemOutcome::AlreadyUsed);
        assert_eq!(redeem(&db, "ONCE", 2).await, RedeemOutcome::Redeemed);
        assert_eq!(redeem(&db, "ONCE", 3).await, RedeemOutcome::LimitReached);

        let loaded = db.coupons().get("ONCE").await.unwrap().unwrap();
        assert_eq!(loaded.used_count, 2);
        assert_eq!(loaded.used_by, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_inactive_coupon_is_unavailable() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.coupons().insert(&coupon("OFF", None), Utc::now()).await.unwrap();
        assert!(db.coupons().set_active("OFF", false).await.unwrap());
        assert!(!db.coupons().set_active("MISSING", false).await.unwrap());

        assert_eq!(redeem(&db, "OFF", 1).await, RedeemOutcome::Unavailable);
        assert_eq!(redeem(&db, "MISSING", 1).await, RedeemOutcome::Unavailable);
        assert_eq!(db.coupons().list().await.unwrap().len(), 1);
    }
}
