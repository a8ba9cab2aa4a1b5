//! # Top-Up Repository
//!
//! Top-up requests move `pending → approved | rejected | expired` exactly
//! once; every transition is a compare-and-swap on `status = 'pending'`.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};

use vendo_core::topup::{TopUpRequest, TopUpStatus};
use vendo_core::{AccountId, Money};

use super::{from_millis, from_millis_opt, to_millis};
use crate::error::DbResult;

const COLUMNS: &str = "id, account_id, amount, status, created_at, decided_at";

#[derive(Debug, Clone)]
pub struct TopUpRepository {
    pool: SqlitePool,
}

impl TopUpRepository {
    pub fn new(pool: SqlitePool) -> Self {
        TopUpRepository { pool }
    }

    pub async fn insert(conn: &mut SqliteConnection, request: &TopUpRequest) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO topups (id, account_id, amount, status, created_at, decided_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(request.id)
        .bind(request.account_id)
        .bind(request.amount.amount())
        .bind(request.status)
        .bind(to_millis(request.created_at))
        .bind(request.decided_at.map(to_millis))
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    /// Moves a pending request to `to`. Returns false if it was not pending.
    pub async fn decide(
        conn: &mut SqliteConnection,
        id: i64,
        to: TopUpStatus,
        at: DateTime<Utc>,
    ) -> DbResult<bool> {
        let affected = sqlx::query(
            "UPDATE topups SET status = ?2, decided_at = ?3 WHERE id = ?1 AND status = 'pending'",
        )
        .bind(id)
        .bind(to)
        .bind(to_millis(at))
        .execute(&mut *conn)
        .await?
        .rows_affected();
        Ok(affected > 0)
    }

    pub async fn get_in(conn: &mut SqliteConnection, id: i64) -> DbResult<Option<TopUpRequest>> {
        let row = sqlx::query(&format!("SELECT {} FROM topups WHERE id = ?1", COLUMNS))
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;
        row.as_ref().map(topup_from_row).transpose()
    }

    pub async fn get(&self, id: i64) -> DbResult<Option<TopUpRequest>> {
        let mut conn = self.pool.acquire().await?;
        Self::get_in(&mut *conn, id).await
    }

    /// Pending requests, oldest first.
    pub async fn pending(&self) -> DbResult<Vec<TopUpRequest>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM topups WHERE status = 'pending' ORDER BY created_at, id",
            COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(topup_from_row).collect()
    }

    /// Pending requests created at or before `cutoff`.
    pub async fn pending_before(&self, cutoff: DateTime<Utc>) -> DbResult<Vec<TopUpRequest>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM topups WHERE status = 'pending' AND created_at <= ?1 ORDER BY created_at, id",
            COLUMNS
        ))
        .bind(to_millis(cutoff))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(topup_from_row).collect()
    }

    pub async fn for_account(&self, account_id: AccountId, limit: i64) -> DbResult<Vec<TopUpRequest>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM topups WHERE account_id = ?1 ORDER BY id DESC LIMIT ?2",
            COLUMNS
        ))
        .bind(account_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(topup_from_row).collect()
    }
}

fn topup_from_row(row: &SqliteRow) -> DbResult<TopUpRequest> {
    Ok(TopUpRequest {
        id: row.try_get("id")?,
        account_id: row.try_get("account_id")?,
        amount: Money::new(row.try_get("amount")?),
        status: row.try_get("status")?,
        created_at: from_millis("topups.created_at", row.try_get("created_at")?)?,
        decided_at: from_millis_opt("topups.decided_at", row.try_get("decided_at")?)?,
    })
}
