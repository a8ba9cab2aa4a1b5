//! # Claim Repository
//!
//! One row per account: when it last claimed and which streak day that was.

use sqlx::{Row, SqliteConnection, SqlitePool};

use vendo_core::claim::ClaimRecord;
use vendo_core::AccountId;

use super::{from_millis, to_millis};
use crate::error::DbResult;

#[derive(Debug, Clone)]
pub struct ClaimRepository {
    pool: SqlitePool,
}

impl ClaimRepository {
    pub fn new(pool: SqlitePool) -> Self {
        ClaimRepository { pool }
    }

    pub async fn get_in(
        conn: &mut SqliteConnection,
        account_id: AccountId,
    ) -> DbResult<Option<ClaimRecord>> {
        let row = sqlx::query(
            "SELECT account_id, last_claim_at, streak_day FROM claims WHERE account_id = ?1",
        )
        .bind(account_id)
        .fetch_optional(&mut *conn)
        .await?;

        row.map(|row| -> DbResult<ClaimRecord> {
            Ok(ClaimRecord {
                account_id: row.try_get("account_id")?,
                last_claim_at: from_millis("claims.last_claim_at", row.try_get("last_claim_at")?)?,
                streak_day: row.try_get("streak_day")?,
            })
        })
        .transpose()
    }

    /// Inserts or replaces the record of an account.
    pub async fn upsert(conn: &mut SqliteConnection, record: &ClaimRecord) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO claims (account_id, last_claim_at, streak_day) VALUES (?1, ?2, ?3)
            ON CONFLICT (account_id) DO UPDATE
                SET last_claim_at = excluded.last_claim_at,
                    streak_day = excluded.streak_day
            "#,
        )
        .bind(record.account_id)
        .bind(to_millis(record.last_claim_at))
        .bind(record.streak_day)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    pub async fn get(&self, account_id: AccountId) -> DbResult<Option<ClaimRecord>> {
        let mut conn = self.pool.acquire().await?;
        Self::get_in(&mut *conn, account_id).await
    }
}
