//! # vendo-engine: Ledger Services for Vendo
//!
//! Every operation that moves stock, money or coupon uses lives here, on
//! top of the pure rules in `vendo-core` and the repositories in
//! `vendo-db`.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                            Engine                                       │
//! │                                                                         │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐  ┌────────────┐   │
//! │  │ OrderMachine │  │ BalanceLedger│  │ CouponService│  │ ClaimServ. │   │
//! │  │ place/approve│  │ credit/debit │  │ create/valid.│  │ streaks    │   │
//! │  │ reject/expire│  │ refunds      │  │ redeem in tx │  │            │   │
//! │  └──────┬───────┘  └──────────────┘  └──────────────┘  └────────────┘   │
//! │         │                                                               │
//! │  ┌──────▼───────┐  ┌──────────────┐  ┌──────────────┐  ┌────────────┐   │
//! │  │ Inventory    │  │ TopUpDesk    │  │ ExpirySweeper│  │ Sessions   │   │
//! │  │ FIFO pools   │  │ admin credit │  │ interval loop│  │ chat flows │   │
//! │  └──────────────┘  └──────────────┘  └──────────────┘  └────────────┘   │
//! │                                                                         │
//! │  Shared Context: Database · KeyedLocks · Clock · Notifier               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Atomicity
//! Each critical section takes its keyed locks (sorted), then runs one
//! SQLite write transaction whose first statement is a write. Balance and
//! coupon limits are enforced by conditional updates, order transitions by
//! compare-and-swap on status. Notifications and delivery happen after
//! commit.
//!
//! ## Usage
//! ```rust,ignore
//! let db = Database::new(DbConfig::new(path)).await?;
//! let engine = EngineBuilder::new(ShopConfig::load(None)?)
//!     .with_database(db)
//!     .with_delivery(Arc::new(my_chat))
//!     .build()?;
//!
//! let order = engine.orders().place_order(PurchaseRequest { .. }).await?;
//! ```

pub mod claims;
pub mod clock;
pub mod config;
pub mod coupons;
pub mod delivery;
pub mod engine;
pub mod error;
pub mod inventory;
pub mod ledger;
pub mod locks;
pub mod notify;
pub mod orders;
pub mod session;
pub mod sweeper;
pub mod topup;

#[cfg(test)]
mod testing;

pub use claims::{ClaimReceipt, ClaimService};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::ShopConfig;
pub use coupons::CouponService;
pub use delivery::{Delivery, DeliveryError, LogDelivery};
pub use engine::{Engine, EngineBuilder};
pub use error::{EngineError, EngineResult};
pub use inventory::InventoryManager;
pub use ledger::BalanceLedger;
pub use notify::{NoOpNotifier, Notification, Notifier, TracingNotifier};
pub use orders::{OrderMachine, PurchaseRequest, TransitionOutcome};
pub use session::{Session, SessionStore};
pub use sweeper::{ExpirySweeper, ExpirySweeperHandle, SweepReport};
pub use topup::{TopUpDesk, TopUpOutcome};
