//! # Inventory Repository
//!
//! Named FIFO pools of opaque units (links, credential lines).
//!
//! ## Take
//! ```text
//! pool "links":  id 11 │ id 12 │ id 15 │ id 16 │ ...
//!                 └──── take(3) ────┘
//!
//! DELETE FROM pool_units
//! WHERE id IN (SELECT id FROM pool_units WHERE pool = ? ORDER BY id LIMIT 3)
//! RETURNING id, unit
//! ```
//! The delete is one statement; a short result means the pool could not
//! cover the request and the caller rolls its transaction back.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{Row, SqliteConnection, SqlitePool};

use super::to_millis;
use crate::error::DbResult;

/// Stock figures for one pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PoolSummary {
    pub name: String,
    /// Real number of units.
    pub size: i64,
    /// What the shop front shows; the real size unless overridden.
    pub display_count: i64,
}

#[derive(Debug, Clone)]
pub struct InventoryRepository {
    pool: SqlitePool,
}

impl InventoryRepository {
    pub fn new(pool: SqlitePool) -> Self {
        InventoryRepository { pool }
    }

    // =========================================================================
    // Composable operations
    // =========================================================================

    /// Removes up to `count` units from the head of `pool_name`, oldest first.
    ///
    /// Returns fewer than `count` units when the pool is short; the caller
    /// must then roll back.
    pub async fn take(
        conn: &mut SqliteConnection,
        pool_name: &str,
        count: i64,
    ) -> DbResult<Vec<String>> {
        let rows = sqlx::query(
            r#"
            DELETE FROM pool_units
            WHERE id IN (
                SELECT id FROM pool_units WHERE pool = ?1 ORDER BY id LIMIT ?2
            )
            RETURNING id, unit
            "#,
        )
        .bind(pool_name)
        .bind(count)
        .fetch_all(&mut *conn)
        .await?;

        let mut taken = rows
            .iter()
            .map(|row| -> DbResult<(i64, String)> {
                Ok((row.try_get("id")?, row.try_get("unit")?))
            })
            .collect::<DbResult<Vec<_>>>()?;

        // RETURNING order is unspecified
        taken.sort_by_key(|(id, _)| *id);
        Ok(taken.into_iter().map(|(_, unit)| unit).collect())
    }

    /// Appends units to the tail of `pool_name`. Returns the number added.
    pub async fn add_units(
        conn: &mut SqliteConnection,
        pool_name: &str,
        units: &[String],
        at: DateTime<Utc>,
    ) -> DbResult<i64> {
        Self::ensure_pool(conn, pool_name).await?;

        for unit in units {
            sqlx::query("INSERT INTO pool_units (pool, unit, added_at) VALUES (?1, ?2, ?3)")
                .bind(pool_name)
                .bind(unit)
                .bind(to_millis(at))
                .execute(&mut *conn)
                .await?;
        }

        Ok(units.len() as i64)
    }

    /// Registers a pool so it is listed even while empty.
    pub async fn ensure_pool(conn: &mut SqliteConnection, pool_name: &str) -> DbResult<()> {
        sqlx::query("INSERT INTO pool_meta (pool, display_count) VALUES (?1, NULL) ON CONFLICT (pool) DO NOTHING")
            .bind(pool_name)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    /// Real number of units in `pool_name`.
    pub async fn size_in(conn: &mut SqliteConnection, pool_name: &str) -> DbResult<i64> {
        let size: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM pool_units WHERE pool = ?1")
            .bind(pool_name)
            .fetch_one(&mut *conn)
            .await?;
        Ok(size)
    }

    // =========================================================================
    // One-shot wrappers
    // =========================================================================

    pub async fn size(&self, pool_name: &str) -> DbResult<i64> {
        let mut conn = self.pool.acquire().await?;
        Self::size_in(&mut *conn, pool_name).await
    }

    /// Adds units in their own transaction.
    pub async fn replenish(&self, pool_name: &str, units: &[String], at: DateTime<Utc>) -> DbResult<i64> {
        let mut tx = self.pool.begin().await?;
        let added = Self::add_units(&mut *tx, pool_name, units, at).await?;
        tx.commit().await?;
        Ok(added)
    }

    /// The cosmetic count override, if one is set.
    pub async fn display_override(&self, pool_name: &str) -> DbResult<Option<i64>> {
        let value: Option<Option<i64>> =
            sqlx::query_scalar("SELECT display_count FROM pool_meta WHERE pool = ?1")
                .bind(pool_name)
                .fetch_optional(&self.pool)
                .await?;
        Ok(value.flatten())
    }

    /// Sets or clears (`None`) the cosmetic count.
    pub async fn set_display_count(&self, pool_name: &str, count: Option<i64>) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO pool_meta (pool, display_count) VALUES (?1, ?2)
            ON CONFLICT (pool) DO UPDATE SET display_count = excluded.display_count
            "#,
        )
        .bind(pool_name)
        .bind(count)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Every known pool with its real and displayed size.
    pub async fn summaries(&self) -> DbResult<Vec<PoolSummary>> {
        let rows = sqlx::query(
            r#"
            SELECT names.pool AS name,
                   (SELECT COUNT(*) FROM pool_units u WHERE u.pool = names.pool) AS size,
                   (SELECT m.display_count FROM pool_meta m WHERE m.pool = names.pool) AS display_count
            FROM (
                SELECT pool FROM pool_meta
                UNION
                SELECT DISTINCT pool FROM pool_units
            ) AS names
            ORDER BY names.pool
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> DbResult<PoolSummary> {
                let size: i64 = row.try_get("size")?;
                let display: Option<i64> = row.try_get("display_count")?;
                Ok(PoolSummary {
                    name: row.try_get("name")?,
                    size,
                    display_count: display.unwrap_or(size),
                })
            })
            .collect()
    }
}
