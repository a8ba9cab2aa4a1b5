//! # Shop Configuration
//!
//! Configuration management for the ledger services.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     VENDO_DATABASE_PATH=/var/lib/vendo/vendo.db                        │
//! │     VENDO_EXPIRY_MINUTES=45                                            │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/vendo/vendo.toml (Linux)                                 │
//! │     ~/Library/Application Support/com.vendo.shop/vendo.toml (macOS)    │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     30 minute expiry, 1000 max quantity, link + ai_link catalog        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! [database]
//! path = "/var/lib/vendo/vendo.db"
//!
//! [orders]
//! expiry_minutes = 30
//! sweep_interval_secs = 60
//! max_order_quantity = 1000
//! redelivery_minutes = 10
//!
//! [inventory]
//! low_stock_threshold = 10
//! restock_announce_min = 5
//!
//! [claims]
//! base = 25
//! increment = 25
//! reset_days = 7
//!
//! [topup]
//! min_amount = 10000
//! max_amount = 10000000
//!
//! [[products]]
//! kind = "link"
//! name = "Premium link"
//! pricing = [
//!     { min = 1, max = 99, unit_price = 500 },
//!     { min = 100, max = 199, unit_price = 450 },
//!     { min = 200, unit_price = 400 },
//! ]
//! bonus = [{ min_quantity = 50, bonus_quantity = 5, description = "+5 free" }]
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use vendo_core::bonus::BonusTier;
use vendo_core::claim::ClaimPolicy;
use vendo_core::pricing::{PriceTier, PricingTable};
use vendo_core::{Catalog, CatalogEntry, Money, ProductKind};

use crate::error::{EngineError, EngineResult};

// =============================================================================
// Database Settings
// =============================================================================

/// Where the ledger lives.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// SQLite file. `None` uses `vendo.db` in the platform data directory.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl DatabaseSettings {
    /// Resolves the database file path.
    pub fn resolved_path(&self) -> PathBuf {
        self.path.clone().unwrap_or_else(|| {
            directories::ProjectDirs::from("com", "vendo", "shop")
                .map(|dirs| dirs.data_dir().join("vendo.db"))
                .unwrap_or_else(|| PathBuf::from("vendo.db"))
        })
    }
}

// =============================================================================
// Order Settings
// =============================================================================

/// Order lifecycle settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderSettings {
    /// Age after which an unpaid order expires.
    #[serde(default = "default_expiry_minutes")]
    pub expiry_minutes: i64,

    /// Interval between expiry sweeps (seconds).
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// Largest quantity a single order may request.
    #[serde(default = "default_max_order_quantity")]
    pub max_order_quantity: i64,

    /// Minutes a settled order may wait for its delivery to report back
    /// before the sweeper hands it to the delivery channel again.
    #[serde(default = "default_redelivery_minutes")]
    pub redelivery_minutes: i64,
}

fn default_expiry_minutes() -> i64 {
    vendo_core::DEFAULT_EXPIRY_MINUTES
}

fn default_sweep_interval() -> u64 {
    60
}

fn default_max_order_quantity() -> i64 {
    vendo_core::DEFAULT_MAX_ORDER_QUANTITY
}

fn default_redelivery_minutes() -> i64 {
    10
}

impl Default for OrderSettings {
    fn default() -> Self {
        OrderSettings {
            expiry_minutes: default_expiry_minutes(),
            sweep_interval_secs: default_sweep_interval(),
            max_order_quantity: default_max_order_quantity(),
            redelivery_minutes: default_redelivery_minutes(),
        }
    }
}

impl OrderSettings {
    pub fn expiry(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.expiry_minutes)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn redelivery_after(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.redelivery_minutes)
    }
}

// =============================================================================
// Inventory Settings
// =============================================================================

/// Stock alert thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventorySettings {
    /// A take that leaves this many units or fewer raises `LowStock`.
    #[serde(default = "default_low_stock_threshold")]
    pub low_stock_threshold: i64,

    /// A replenish of at least this many units raises `Restocked`.
    #[serde(default = "default_restock_announce_min")]
    pub restock_announce_min: i64,
}

fn default_low_stock_threshold() -> i64 {
    vendo_core::DEFAULT_LOW_STOCK_THRESHOLD
}

fn default_restock_announce_min() -> i64 {
    5
}

impl Default for InventorySettings {
    fn default() -> Self {
        InventorySettings {
            low_stock_threshold: default_low_stock_threshold(),
            restock_announce_min: default_restock_announce_min(),
        }
    }
}

// =============================================================================
// Claim Settings
// =============================================================================

/// Daily claim rewards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimSettings {
    #[serde(default = "default_claim_base")]
    pub base: i64,

    #[serde(default = "default_claim_increment")]
    pub increment: i64,

    /// Streak length before it wraps back to day 1.
    #[serde(default = "default_reset_days")]
    pub reset_days: i64,
}

fn default_claim_base() -> i64 {
    vendo_core::DEFAULT_CLAIM_BASE
}

fn default_claim_increment() -> i64 {
    vendo_core::DEFAULT_CLAIM_INCREMENT
}

fn default_reset_days() -> i64 {
    vendo_core::DEFAULT_CLAIM_RESET_DAYS
}

impl Default for ClaimSettings {
    fn default() -> Self {
        ClaimSettings {
            base: default_claim_base(),
            increment: default_claim_increment(),
            reset_days: default_reset_days(),
        }
    }
}

impl ClaimSettings {
    pub fn policy(&self) -> ClaimPolicy {
        ClaimPolicy {
            base: Money::new(self.base),
            increment: Money::new(self.increment),
            reset_days: self.reset_days,
        }
    }
}

// =============================================================================
// Top-Up Settings
// =============================================================================

/// Bounds on a single top-up request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopUpSettings {
    #[serde(default = "default_topup_min")]
    pub min_amount: i64,

    #[serde(default = "default_topup_max")]
    pub max_amount: i64,
}

fn default_topup_min() -> i64 {
    10_000
}

fn default_topup_max() -> i64 {
    10_000_000
}

impl Default for TopUpSettings {
    fn default() -> Self {
        TopUpSettings {
            min_amount: default_topup_min(),
            max_amount: default_topup_max(),
        }
    }
}

// =============================================================================
// Product Settings
// =============================================================================

/// One catalog entry as written in the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductSettings {
    pub kind: ProductKind,

    #[serde(default)]
    pub name: String,

    pub pricing: Vec<PriceTier>,

    #[serde(default)]
    pub bonus: Vec<BonusTier>,
}

impl ProductSettings {
    fn into_entry(self) -> CatalogEntry {
        let name = if self.name.is_empty() {
            self.kind.to_string()
        } else {
            self.name
        };
        CatalogEntry {
            kind: self.kind,
            name,
            pricing: PricingTable::new(self.pricing),
            bonus: self.bonus,
        }
    }
}

fn default_products() -> Vec<ProductSettings> {
    let tiers = |prices: [i64; 3]| {
        vec![
            PriceTier::bounded(1, 99, prices[0]),
            PriceTier::bounded(100, 199, prices[1]),
            PriceTier::unbounded(200, prices[2]),
        ]
    };

    vec![
        ProductSettings {
            kind: ProductKind::Link,
            name: "Link".to_string(),
            pricing: tiers([500, 450, 400]),
            bonus: vec![
                BonusTier::new(50, 5, "+5 free links"),
                BonusTier::new(100, 15, "+15 free links"),
            ],
        },
        ProductSettings {
            kind: ProductKind::AiLink,
            name: "AI link".to_string(),
            pricing: tiers([1_500, 1_350, 1_200]),
            bonus: vec![],
        },
    ]
}

// =============================================================================
// Main Shop Configuration
// =============================================================================

/// Complete shop configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShopConfig {
    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub orders: OrderSettings,

    #[serde(default)]
    pub inventory: InventorySettings,

    #[serde(default)]
    pub claims: ClaimSettings,

    #[serde(default)]
    pub topup: TopUpSettings,

    #[serde(default = "default_products")]
    pub products: Vec<ProductSettings>,
}

impl Default for ShopConfig {
    fn default() -> Self {
        ShopConfig {
            database: DatabaseSettings::default(),
            orders: OrderSettings::default(),
            inventory: InventorySettings::default(),
            claims: ClaimSettings::default(),
            topup: TopUpSettings::default(),
            products: default_products(),
        }
    }
}

impl ShopConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (vendo.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> EngineResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading shop config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> EngineResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| EngineError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| EngineError::ConfigSaveFailed(e.to_string()))?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents).map_err(|e| EngineError::ConfigSaveFailed(e.to_string()))?;

        info!(?path, "Shop config saved");
        Ok(())
    }

    /// Validates the configuration, including every pricing table.
    pub fn validate(&self) -> EngineResult<()> {
        if self.orders.expiry_minutes <= 0 {
            return Err(EngineError::InvalidConfig(
                "orders.expiry_minutes must be greater than 0".into(),
            ));
        }
        if self.orders.redelivery_minutes <= 0 {
            return Err(EngineError::InvalidConfig(
                "orders.redelivery_minutes must be greater than 0".into(),
            ));
        }
        if self.orders.sweep_interval_secs == 0 {
            return Err(EngineError::InvalidConfig(
                "orders.sweep_interval_secs must be greater than 0".into(),
            ));
        }
        if self.claims.reset_days < 1 {
            return Err(EngineError::InvalidConfig(
                "claims.reset_days must be at least 1".into(),
            ));
        }
        if self.claims.base < 0 || self.claims.increment < 0 {
            return Err(EngineError::InvalidConfig(
                "claims.base and claims.increment must not be negative".into(),
            ));
        }
        if self.topup.min_amount < 1 || self.topup.max_amount < self.topup.min_amount {
            return Err(EngineError::InvalidConfig(format!(
                "topup bounds are invalid: min {} max {}",
                self.topup.min_amount, self.topup.max_amount
            )));
        }
        if self.inventory.low_stock_threshold < 0 {
            return Err(EngineError::InvalidConfig(
                "inventory.low_stock_threshold must not be negative".into(),
            ));
        }

        self.catalog().map(|_| ())
    }

    /// Builds the product catalog, validating every table against the
    /// configured maximum quantity.
    pub fn catalog(&self) -> EngineResult<Catalog> {
        let entries = self
            .products
            .iter()
            .cloned()
            .map(ProductSettings::into_entry)
            .collect();
        Catalog::new(entries, self.orders.max_order_quantity)
            .map_err(|e| EngineError::InvalidConfig(e.to_string()))
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("VENDO_DATABASE_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = Some(PathBuf::from(path));
        }

        override_number("VENDO_EXPIRY_MINUTES", &mut self.orders.expiry_minutes);
        override_number("VENDO_SWEEP_INTERVAL_SECS", &mut self.orders.sweep_interval_secs);
        override_number("VENDO_MAX_ORDER_QUANTITY", &mut self.orders.max_order_quantity);
        override_number("VENDO_REDELIVERY_MINUTES", &mut self.orders.redelivery_minutes);
        override_number("VENDO_LOW_STOCK_THRESHOLD", &mut self.inventory.low_stock_threshold);
        override_number("VENDO_RESTOCK_ANNOUNCE_MIN", &mut self.inventory.restock_announce_min);
        override_number("VENDO_CLAIM_BASE", &mut self.claims.base);
        override_number("VENDO_CLAIM_INCREMENT", &mut self.claims.increment);
        override_number("VENDO_CLAIM_RESET_DAYS", &mut self.claims.reset_days);
    }

    /// Returns the default config file path.
    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "vendo", "shop")
            .map(|dirs| dirs.config_dir().join("vendo.toml"))
    }
}

fn override_number<T>(var: &str, target: &mut T)
where
    T: std::str::FromStr + std::fmt::Display,
{
    if let Ok(raw) = std::env::var(var) {
        match raw.parse::<T>() {
            Ok(value) => {
                debug!(var, %value, "Overriding setting from environment");
                *target = value;
            }
            Err(_) => warn!(var, value = %raw, "Ignoring non-numeric environment override"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = ShopConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.orders.expiry_minutes, 30);
        assert_eq!(config.orders.max_order_quantity, 1000);
        assert_eq!(config.orders.redelivery_after(), chrono::Duration::minutes(10));

        let catalog = config.catalog().unwrap();
        assert_eq!(catalog.pool_names(), vec!["links", "ai_links"]);
    }

    #[test]
    fn test_parse_products_from_toml() {
        let config: ShopConfig = toml::from_str(
            r#"
            [orders]
            expiry_minutes = 45

            [[products]]
            kind = "credential:vpn"
            name = "VPN account"
            pricing = [
                { min = 1, max = 9, unit_price = 20000 },
                { min = 10, unit_price = 18000 },
            ]
            bonus = [{ min_quantity = 10, bonus_quantity = 1 }]
            "#,
        )
        .unwrap();

        assert_eq!(config.orders.expiry_minutes, 45);
        assert_eq!(config.orders.sweep_interval_secs, 60);
        assert_eq!(config.products.len(), 1);
        assert_eq!(config.products[0].kind, ProductKind::credential("vpn"));

        let catalog = config.catalog().unwrap();
        let quote = catalog
            .quote(&ProductKind::credential("vpn"), 10, None)
            .unwrap();
        assert_eq!(quote.total, Money::new(180_000));
        assert_eq!(quote.bonus_quantity, 1);
    }

    #[test]
    fn test_validation_rejects_bad_tables() {
        let mut config = ShopConfig::default();
        config.products[0].pricing = vec![PriceTier::bounded(1, 50, 500)];
        assert!(matches!(
            config.validate(),
            Err(EngineError::InvalidConfig(_))
        ));

        let mut config = ShopConfig::default();
        config.orders.expiry_minutes = 0;
        assert!(config.validate().is_err());

        let mut config = ShopConfig::default();
        config.orders.redelivery_minutes = 0;
        assert!(config.validate().is_err());

        let mut config = ShopConfig::default();
        config.topup.max_amount = config.topup.min_amount - 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_serialization() {
        let config = ShopConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[orders]"));
        assert!(toml_str.contains("[[products]]"));

        let back: ShopConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(back.products.len(), config.products.len());
    }
}
