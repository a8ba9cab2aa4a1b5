//! # Inventory Pool Manager
//!
//! Stock operations over the named FIFO pools.
//!
//! ## Take Flow
//! ```text
//! take("links", 3)
//!   │
//!   ├── lock pool:links
//!   ├── BEGIN
//!   │     DELETE ... LIMIT 3 RETURNING unit   (short? → ROLLBACK, InsufficientStock)
//!   ├── COMMIT
//!   │
//!   └── remaining ≤ low_stock_threshold? → Notification::LowStock
//! ```

use tracing::{debug, info, warn};

use vendo_core::validation::{normalize_unit, validate_display_count, validate_pool_name};
use vendo_core::{CoreError, ValidationError};
use vendo_db::{InventoryRepository, PoolSummary, SqliteConnection};

use crate::config::InventorySettings;
use crate::engine::Context;
use crate::error::EngineResult;
use crate::locks::pool_key;
use crate::notify::Notification;

#[derive(Clone)]
pub struct InventoryManager {
    ctx: Context,
    settings: InventorySettings,
}

impl InventoryManager {
    pub(crate) fn new(ctx: Context, settings: InventorySettings) -> Self {
        InventoryManager { ctx, settings }
    }

    /// Removes the first `count` units of `pool`, or nothing at all.
    pub async fn take(&self, pool: &str, count: i64) -> EngineResult<Vec<String>> {
        validate_pool_name(pool)?;
        if count < 1 {
            return Err(ValidationError::MustBePositive {
                field: "count".to_string(),
            }
            .into());
        }

        let held = self.ctx.locks.lock(pool_key(pool)).await;
        let mut tx = self.ctx.db.begin().await?;
        let units = Self::take_in(&mut *tx, pool, count).await?;
        tx.commit().await?;
        drop(held);

        debug!(pool, count, "Units taken");
        self.after_take(pool).await;
        Ok(units)
    }

    /// Takes inside the caller's transaction. On `InsufficientStock` the
    /// caller must roll back.
    pub(crate) async fn take_in(
        conn: &mut SqliteConnection,
        pool: &str,
        count: i64,
    ) -> EngineResult<Vec<String>> {
        let units = InventoryRepository::take(&mut *conn, pool, count).await?;
        let available = units.len() as i64;
        if available < count {
            return Err(CoreError::InsufficientStock {
                pool: pool.to_string(),
                available,
                requested: count,
            }
            .into());
        }
        Ok(units)
    }

    /// Raises `LowStock` when the pool ran down. Call after commit.
    pub(crate) async fn after_take(&self, pool: &str) {
        match self.ctx.db.inventory().size(pool).await {
            Ok(remaining) if remaining <= self.settings.low_stock_threshold => {
                warn!(pool, remaining, "Pool is running low");
                self.ctx.notifier.notify(&Notification::LowStock {
                    pool: pool.to_string(),
                    remaining,
                });
            }
            Ok(_) => {}
            Err(e) => warn!(?e, pool, "Could not read pool size after take"),
        }
    }

    /// Appends units to `pool`. Blank entries are skipped; returns the
    /// number actually added.
    pub async fn replenish(&self, pool: &str, units: &[String]) -> EngineResult<i64> {
        validate_pool_name(pool)?;

        let mut clean = Vec::with_capacity(units.len());
        for unit in units {
            if let Some(unit) = normalize_unit(unit)? {
                clean.push(unit);
            }
        }

        let _held = self.ctx.locks.lock(pool_key(pool)).await;
        let added = self
            .ctx
            .db
            .inventory()
            .replenish(pool, &clean, self.ctx.clock.now())
            .await?;
        let size = self.ctx.db.inventory().size(pool).await?;

        info!(pool, added, size, "Pool replenished");
        if added > 0 && added >= self.settings.restock_announce_min {
            self.ctx.notifier.notify(&Notification::Restocked {
                pool: pool.to_string(),
                added,
                size,
            });
        }
        Ok(added)
    }

    /// Replenishes from an uploaded text block, one unit per line.
    pub async fn replenish_lines(&self, pool: &str, text: &str) -> EngineResult<i64> {
        let units: Vec<String> = text.lines().map(str::to_string).collect();
        self.replenish(pool, &units).await
    }

    /// Registers a pool so it shows up in summaries while empty.
    pub async fn register(&self, pool: &str) -> EngineResult<()> {
        validate_pool_name(pool)?;
        let mut conn = self.ctx.db.pool().acquire().await?;
        InventoryRepository::ensure_pool(&mut *conn, pool).await?;
        Ok(())
    }

    /// Real number of units.
    pub async fn size(&self, pool: &str) -> EngineResult<i64> {
        Ok(self.ctx.db.inventory().size(pool).await?)
    }

    /// What the shop front shows: the override, or the real size.
    pub async fn display_count(&self, pool: &str) -> EngineResult<i64> {
        let inventory = self.ctx.db.inventory();
        match inventory.display_override(pool).await? {
            Some(count) => Ok(count),
            None => Ok(inventory.size(pool).await?),
        }
    }

    /// Sets (or clears with `None`) the cosmetic count.
    pub async fn set_display_count(&self, pool: &str, count: Option<i64>) -> EngineResult<()> {
        validate_pool_name(pool)?;
        if let Some(count) = count {
            validate_display_count(count)?;
        }
        self.ctx.db.inventory().set_display_count(pool, count).await?;
        info!(pool, ?count, "Display count updated");
        Ok(())
    }

    /// Every pool with its real and displayed size.
    pub async fn pools(&self) -> EngineResult<Vec<PoolSummary>> {
        Ok(self.ctx.db.inventory().summaries().await?)
    }
}
