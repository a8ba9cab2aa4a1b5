//! # Catalog
//!
//! One lookup table from product kind to everything needed to price it.
//!
//! ```text
//! ProductKind ──► CatalogEntry { name, PricingTable, [BonusTier] }
//!                      │
//!                      ├── pool_name()  "links" / "credentials:vpn"
//!                      └── quote()      pricing + bonus + coupon
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::bonus::{self, BonusTier};
use crate::coupon::Coupon;
use crate::error::{CoreError, CoreResult, ValidationError};
use crate::order::{OrderQuote, ProductKind};
use crate::pricing::PricingTable;

/// Everything the shop knows about one product kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub kind: ProductKind,
    /// Shown to buyers.
    pub name: String,
    pub pricing: PricingTable,
    #[serde(default)]
    pub bonus: Vec<BonusTier>,
}

/// The set of products on sale.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Catalog {
    entries: BTreeMap<ProductKind, CatalogEntry>,
    max_order_quantity: i64,
}

impl Catalog {
    /// Builds a catalog, rejecting duplicate kinds and tables that do not
    /// cover every allowed quantity.
    pub fn new(entries: Vec<CatalogEntry>, max_order_quantity: i64) -> Result<Self, ValidationError> {
        if max_order_quantity < 1 {
            return Err(ValidationError::MustBePositive {
                field: "max_order_quantity".to_string(),
            });
        }

        let mut map = BTreeMap::new();
        for entry in entries {
            entry.pricing.validate()?;
            if !entry.pricing.covers(max_order_quantity) {
                return Err(ValidationError::InvalidFormat {
                    field: format!("pricing for {}", entry.kind),
                    reason: format!("must cover quantities 1 to {}", max_order_quantity),
                });
            }
            if map.contains_key(&entry.kind) {
                return Err(ValidationError::InvalidFormat {
                    field: "products".to_string(),
                    reason: format!("{} is listed twice", entry.kind),
                });
            }
            map.insert(entry.kind.clone(), entry);
        }

        Ok(Catalog {
            entries: map,
            max_order_quantity,
        })
    }

    pub fn max_order_quantity(&self) -> i64 {
        self.max_order_quantity
    }

    pub fn get(&self, kind: &ProductKind) -> CoreResult<&CatalogEntry> {
        self.entries
            .get(kind)
            .ok_or_else(|| CoreError::UnknownProduct(kind.to_string()))
    }

    pub fn entries(&self) -> impl Iterator<Item = &CatalogEntry> {
        self.entries.values()
    }

    /// Every pool the catalog sells from.
    pub fn pool_names(&self) -> Vec<String> {
        self.entries.keys().map(ProductKind::pool_name).collect()
    }

    /// Prices an order. `coupon` must already have passed validation.
    ///
    /// ## Example
    /// ```rust
    /// use vendo_core::catalog::{Catalog, CatalogEntry};
    /// use vendo_core::order::ProductKind;
    /// use vendo_core::pricing::{PriceTier, PricingTable};
    ///
    /// let catalog = Catalog::new(vec![CatalogEntry {
    ///     kind: ProductKind::Link,
    ///     name: "Premium link".to_string(),
    ///     pricing: PricingTable::new(vec![
    ///         PriceTier::bounded(1, 99, 500),
    ///         PriceTier::bounded(100, 199, 450),
    ///         PriceTier::unbounded(200, 400),
    ///     ]),
    ///     bonus: vec![],
    /// }], 1000).unwrap();
    ///
    /// let quote = catalog.quote(&ProductKind::Link, 150, None).unwrap();
    /// assert_eq!(quote.total.amount(), 67_500);
    /// ```
    pub fn quote(
        &self,
        kind: &ProductKind,
        quantity: i64,
        coupon: Option<&Coupon>,
    ) -> CoreResult<OrderQuote> {
        let entry = self.get(kind)?;
        let unit_price = entry.pricing.unit_price(quantity, self.max_order_quantity)?;
        let subtotal = entry.pricing.total_price(quantity, self.max_order_quantity)?;
        let bonus_quantity = bonus::resolve(&entry.bonus, quantity);

        let (discount, total) = match coupon {
            Some(c) => c.apply_to(subtotal),
            None => (crate::Money::zero(), subtotal),
        };

        Ok(OrderQuote {
            product: kind.clone(),
            quantity,
            bonus_quantity,
            unit_price,
            subtotal,
            discount,
            total,
            coupon_code: coupon.map(|c| c.code.clone()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pricing::PriceTier;
    use crate::Money;

    fn link_entry() -> CatalogEntry {
        CatalogEntry {
            kind: ProductKind::Link,
            name: "Premium link".to_string(),
            pricing: PricingTable::new(vec![
                PriceTier::bounded(1, 99, 500),
                PriceTier::bounded(100, 199, 450),
                PriceTier::unbounded(200, 400),
            ]),
            bonus: vec![BonusTier::new(10, 2, ""), BonusTier::new(50, 10, "")],
        }
    }

    fn ten_percent() -> Coupon {
        Coupon {
            code: "HEMAT10".to_string(),
            discount_percent: 10,
            min_order_quantity: 0,
            max_uses: None,
            used_count: 0,
            used_by: vec![],
            expires_at: None,
            active: true,
            first_order_only: false,
        }
    }

    #[test]
    fn test_quote_with_bonus_and_coupon() {
        let catalog = Catalog::new(vec![link_entry()], 1000).unwrap();
        let quote = catalog
            .quote(&ProductKind::Link, 150, Some(&ten_percent()))
            .unwrap();

        assert_eq!(quote.unit_price, Money::new(450));
        assert_eq!(quote.subtotal, Money::new(67_500));
        assert_eq!(quote.total, Money::new(60_750));
        assert_eq!(quote.discount, Money::new(6_750));
        assert_eq!(quote.bonus_quantity, 10);
        assert_eq!(quote.units_to_deliver(), 160);
        assert_eq!(quote.coupon_code.as_deref(), Some("HEMAT10"));
    }

    #[test]
    fn test_unknown_product() {
        let catalog = Catalog::new(vec![link_entry()], 1000).unwrap();
        assert_eq!(
            catalog.quote(&ProductKind::AiLink, 5, None),
            Err(CoreError::UnknownProduct("ai_link".to_string()))
        );
    }

    #[test]
    fn test_quantity_limits_come_from_catalog() {
        let catalog = Catalog::new(vec![link_entry()], 1000).unwrap();
        assert!(matches!(
            catalog.quote(&ProductKind::Link, 1001, None),
            Err(CoreError::InvalidQuantity { max: 1000, .. })
        ));
    }

    #[test]
    fn test_rejects_duplicates_and_short_tables() {
        assert!(Catalog::new(vec![link_entry(), link_entry()], 1000).is_err());

        let mut short = link_entry();
        short.pricing = PricingTable::new(vec![PriceTier::bounded(1, 99, 500)]);
        assert!(Catalog::new(vec![short], 1000).is_err());
    }

    #[test]
    fn test_pool_names() {
        let mut vpn = link_entry();
        vpn.kind = ProductKind::credential("vpn");
        let catalog = Catalog::new(vec![link_entry(), vpn], 1000).unwrap();
        let pools = catalog.pool_names();
        assert!(pools.contains(&"links".to_string()));
        assert!(pools.contains(&"credentials:vpn".to_string()));
    }
}
