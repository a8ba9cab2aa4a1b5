//! # Engine
//!
//! Wires the database, clock, notifier and delivery channel into the
//! individual services. Services are cheap handles over one shared
//! [`Context`]; clone them freely.
//!
//! ```text
//! EngineBuilder::new(config)
//!     .with_database(db)            required
//!     .with_delivery(telegram)      default: LogDelivery
//!     .with_notifier(admin_chat)    default: TracingNotifier
//!     .with_clock(clock)            default: SystemClock
//!     .build()?
//! ```

use std::sync::Arc;

use tracing::info;

use vendo_core::Catalog;
use vendo_db::Database;

use crate::claims::ClaimService;
use crate::clock::{Clock, SystemClock};
use crate::config::ShopConfig;
use crate::coupons::CouponService;
use crate::delivery::{Delivery, LogDelivery};
use crate::error::{EngineError, EngineResult};
use crate::inventory::InventoryManager;
use crate::ledger::BalanceLedger;
use crate::locks::KeyedLocks;
use crate::notify::{Notifier, TracingNotifier};
use crate::orders::OrderMachine;
use crate::session::SessionStore;
use crate::sweeper::{ExpirySweeper, ExpirySweeperHandle};
use crate::topup::TopUpDesk;

/// State shared by every service.
#[derive(Clone)]
pub(crate) struct Context {
    pub(crate) db: Database,
    pub(crate) locks: Arc<KeyedLocks>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) notifier: Arc<dyn Notifier>,
}

#[derive(Clone)]
pub struct Engine {
    ctx: Context,
    config: Arc<ShopConfig>,
    catalog: Arc<Catalog>,
    delivery: Arc<dyn Delivery>,
    sessions: SessionStore,
}

impl Engine {
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn config(&self) -> &ShopConfig {
        &self.config
    }

    pub fn database(&self) -> &Database {
        &self.ctx.db
    }

    pub fn inventory(&self) -> InventoryManager {
        InventoryManager::new(self.ctx.clone(), self.config.inventory.clone())
    }

    pub fn ledger(&self) -> BalanceLedger {
        BalanceLedger::new(self.ctx.clone())
    }

    pub fn coupons(&self) -> CouponService {
        CouponService::new(self.ctx.clone())
    }

    pub fn claims(&self) -> ClaimService {
        ClaimService::new(self.ctx.clone(), self.config.claims.policy())
    }

    pub fn orders(&self) -> OrderMachine {
        OrderMachine::new(
            self.ctx.clone(),
            self.catalog.clone(),
            self.delivery.clone(),
            self.inventory(),
            self.config.orders.expiry(),
        )
    }

    pub fn topups(&self) -> TopUpDesk {
        TopUpDesk::new(self.ctx.clone(), self.config.topup.clone())
    }

    /// Conversation state of the chat front end.
    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Creates the background sweeper. Spawn [`ExpirySweeper::run`].
    pub fn sweeper(&self) -> (ExpirySweeper, ExpirySweeperHandle) {
        ExpirySweeper::new(self.orders(), self.topups(), self.config.orders.clone())
    }

    /// Makes sure every product's pool exists, even while empty.
    pub async fn register_pools(&self) -> EngineResult<()> {
        let inventory = self.inventory();
        for pool in self.catalog.pool_names() {
            inventory.register(&pool).await?;
        }
        Ok(())
    }
}

// =============================================================================
// Builder Pattern
// =============================================================================

/// Builder for creating an [`Engine`] with options.
pub struct EngineBuilder {
    config: ShopConfig,
    db: Option<Database>,
    delivery: Option<Arc<dyn Delivery>>,
    notifier: Option<Arc<dyn Notifier>>,
    clock: Option<Arc<dyn Clock>>,
}

impl EngineBuilder {
    pub fn new(config: ShopConfig) -> Self {
        EngineBuilder {
            config,
            db: None,
            delivery: None,
            notifier: None,
            clock: None,
        }
    }

    pub fn with_database(mut self, db: Database) -> Self {
        self.db = Some(db);
        self
    }

    pub fn with_delivery(mut self, delivery: Arc<dyn Delivery>) -> Self {
        self.delivery = Some(delivery);
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn build(self) -> EngineResult<Engine> {
        let db = self
            .db
            .ok_or_else(|| EngineError::InvalidConfig("Database required".into()))?;

        self.config.validate()?;
        let catalog = self.config.catalog()?;

        let ctx = Context {
            db,
            locks: Arc::new(KeyedLocks::new()),
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            notifier: self.notifier.unwrap_or_else(|| Arc::new(TracingNotifier)),
        };
        let sessions = SessionStore::new(ctx.clock.clone());

        info!(
            products = catalog.entries().count(),
            max_order_quantity = catalog.max_order_quantity(),
            "Engine ready"
        );

        Ok(Engine {
            ctx,
            config: Arc::new(self.config),
            catalog: Arc::new(catalog),
            delivery: self.delivery.unwrap_or_else(|| Arc::new(LogDelivery)),
            sessions,
        })
    }
}
