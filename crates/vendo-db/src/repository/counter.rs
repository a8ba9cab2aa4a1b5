//! # Counter Repository
//!
//! Named monotonic counters. Order and top-up ids come from here so that a
//! restart never hands out an id twice.

use sqlx::{SqliteConnection, SqlitePool};

use crate::error::DbResult;

/// Counter for order ids.
pub const ORDER_COUNTER: &str = "order";

/// Counter for top-up request ids.
pub const TOPUP_COUNTER: &str = "topup";

#[derive(Debug, Clone)]
pub struct CounterRepository {
    pool: SqlitePool,
}

impl CounterRepository {
    pub fn new(pool: SqlitePool) -> Self {
        CounterRepository { pool }
    }

    /// Increments `name` and returns the new value (first call returns 1).
    ///
    /// A single upsert, so it is a valid first statement of a write
    /// transaction.
    pub async fn next(conn: &mut SqliteConnection, name: &str) -> DbResult<i64> {
        let value: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO counters (name, value) VALUES (?1, 1)
            ON CONFLICT (name) DO UPDATE SET value = value + 1
            RETURNING value
            "#,
        )
        .bind(name)
        .fetch_one(&mut *conn)
        .await?;

        Ok(value)
    }

    /// Current value of `name` (0 if never incremented).
    pub async fn current(&self, name: &str) -> DbResult<i64> {
        let value: Option<i64> = sqlx::query_scalar("SELECT value FROM counters WHERE name = ?1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;

        Ok(value.unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};

    #[tokio::test]
    async fn test_counters_are_monotonic_and_independent() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mut conn = db.pool().acquire().await.unwrap();

        assert_eq!(CounterRepository::next(&mut conn, ORDER_COUNTER).await.unwrap(), 1);
        assert_eq!(CounterRepository::next(&mut conn, ORDER_COUNTER).await.unwrap(), 2);
        assert_eq!(CounterRepository::next(&mut conn, TOPUP_COUNTER).await.unwrap(), 1);
        drop(conn);

        assert_eq!(db.counters().current(ORDER_COUNTER).await.unwrap(), 2);
        assert_eq!(db.counters().current("unknown").await.unwrap(), 0);
    }
}
