//! # vendo-db: Database Layer for Vendo
//!
//! This crate provides database access for the Vendo commerce ledger.
//! It uses SQLite for storage with sqlx for async operations.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Vendo Data Flow                                  │
//! │                                                                         │
//! │  vendo-engine (OrderMachine::approve)                                  │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     vendo-db (THIS CRATE)                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │   Database    │    │  Repositories │    │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │    │               │    │  (embedded)  │  │   │
//! │  │   │               │    │ OrderRepo     │    │              │  │   │
//! │  │   │ SqlitePool    │◄───│ BalanceRepo   │    │ 001_initial  │  │   │
//! │  │   │ begin() → tx  │    │ InventoryRepo │    │   _schema    │  │   │
//! │  │   │               │    │ CouponRepo .. │    │              │  │   │
//! │  │   └───────────────┘    └───────────────┘    └──────────────┘  │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     SQLite Database                             │   │
//! │  │   ~/.local/share/vendo/vendo.db                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - One repository per stored collection
//!
//! ## Usage
//!
//! ```rust,ignore
//! use vendo_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("vendo.db")).await?;
//! let balance = db.balances().balance_of(42).await?;
//! let pools = db.inventory().summaries().await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

pub use repository::balance::{BalanceRepository, CreditOutcome, DebitOutcome, Mutation};
pub use repository::claim::ClaimRepository;
pub use repository::counter::{CounterRepository, ORDER_COUNTER, TOPUP_COUNTER};
pub use repository::coupon::{CouponRepository, RedeemOutcome};
pub use repository::inventory::{InventoryRepository, PoolSummary};
pub use repository::order::{OrderRepository, SettlingGuard};
pub use repository::topup::TopUpRepository;

pub use sqlx::SqliteConnection;
