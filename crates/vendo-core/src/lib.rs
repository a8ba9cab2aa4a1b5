//! # vendo-core: Pure Business Logic for Vendo
//!
//! This crate holds the rules of the commerce ledger as pure functions with
//! zero I/O dependencies. Time is always passed in; nothing here reads a
//! clock, a file or a socket.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Vendo Architecture                             │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │               Chat layer (outside this workspace)               │   │
//! │  │    /buy ──► quote ──► confirm ──► proof upload ──► delivery     │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                vendo-engine (services, locks)                   │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ vendo-core (THIS CRATE) ★                       │   │
//! │  │                                                                 │   │
//! │  │   ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐  │   │
//! │  │   │ pricing │ │  bonus  │ │ coupon  │ │  claim  │ │  order  │  │   │
//! │  │   │  tiers  │ │  tiers  │ │  rules  │ │ streaks │ │ states  │  │   │
//! │  │   └─────────┘ └─────────┘ └─────────┘ └─────────┘ └─────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO CLOCK • PURE FUNCTIONS             │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                vendo-db (SQLite repositories)                   │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`money`] - Integer money (no floating point)
//! - [`pricing`] - Tiered unit pricing and budget inversion
//! - [`bonus`] - Bonus-quantity tiers
//! - [`catalog`] - Product kind → pricing lookup, order quotes
//! - [`coupon`] - Coupon rule evaluation
//! - [`claim`] - Daily claim streak rewards
//! - [`order`] - Order record and lifecycle states
//! - [`ledger`] - Balance ledger entries and idempotency references
//! - [`topup`] - Balance top-up requests
//! - [`validation`] - Input format rules
//! - [`error`] - Domain error types
//!
//! ## Example Usage
//!
//! ```rust
//! use vendo_core::money::Money;
//! use vendo_core::pricing::{PriceTier, PricingTable};
//!
//! let table = PricingTable::new(vec![
//!     PriceTier::bounded(1, 99, 500),
//!     PriceTier::bounded(100, 199, 450),
//!     PriceTier::unbounded(200, 400),
//! ]);
//!
//! let total = table.total_price(150, 1000).unwrap();
//! assert_eq!(total, Money::new(67_500));
//! assert_eq!(total.percent_off(10), Money::new(60_750));
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod bonus;
pub mod catalog;
pub mod claim;
pub mod coupon;
pub mod error;
pub mod ledger;
pub mod money;
pub mod order;
pub mod pricing;
pub mod topup;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use catalog::{Catalog, CatalogEntry};
pub use error::{CoreError, CoreResult, CouponRejection, ValidationError};
pub use money::Money;
pub use order::{Order, OrderQuote, OrderStatus, PaymentMethod, ProductKind};

/// Chat account identifier.
pub type AccountId = i64;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Largest quantity a single order may request.
pub const DEFAULT_MAX_ORDER_QUANTITY: i64 = 1000;

/// Minutes an unpaid manual order stays open.
pub const DEFAULT_EXPIRY_MINUTES: i64 = 30;

/// Remaining units at or below which a pool is reported as low.
pub const DEFAULT_LOW_STOCK_THRESHOLD: i64 = 10;

/// Day-1 daily claim reward.
pub const DEFAULT_CLAIM_BASE: i64 = 25;

/// Extra reward per consecutive claim day.
pub const DEFAULT_CLAIM_INCREMENT: i64 = 25;

/// Streak length before it wraps back to day 1.
pub const DEFAULT_CLAIM_RESET_DAYS: i64 = 7;
