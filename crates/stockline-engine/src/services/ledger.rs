//! # Stock Ledger Service
//!
//! Manual stock changes and read access to the append-only ledger.
//!
//! ```text
//!   record_adjustment ──► adjustment (±n) | restock (+n)     admin only
//!   history           ──► newest first, 1..=limit entries    read access
//!   quantity_at       ──► stock reconstructed at a moment    read access
//!   audit             ──► chain and stock consistency check  read access
//! ```
//!
//! Sale entries are written by the checkout unit only.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::StocklineConfig;
use crate::error::ServiceResult;
use stockline_core::ledger::{self, LedgerAudit};
use stockline_core::validation::{validate_history_limit, validate_notes, validate_stock_change};
use stockline_core::{
    CoreError, Identity, LedgerEntryType, Product, StockAdjustment, StockLedgerEntry,
    ValidationError,
};
use stockline_db::Database;

/// Stock adjustments, history and audit.
#[derive(Debug, Clone)]
pub struct LedgerService {
    db: Database,
    config: Arc<StocklineConfig>,
}

impl LedgerService {
    pub fn new(db: Database, config: Arc<StocklineConfig>) -> Self {
        LedgerService { db, config }
    }

    /// Applies a manual stock change and records it.
    ///
    /// ## Errors
    /// - `InvalidInput` for a `sale` type, a zero change, or a non-positive
    ///   restock
    /// - `InsufficientStock` if the result would be negative
    /// - `ProductNotFound`, `Unauthorized`
    pub async fn record_adjustment(
        &self,
        identity: &Identity,
        adjustment: StockAdjustment,
    ) -> ServiceResult<StockLedgerEntry> {
        match adjustment.entry_type {
            LedgerEntryType::Sale => {
                return Err(ValidationError::NotAllowed {
                    field: "entry_type".to_string(),
                    allowed: vec!["adjustment".to_string(), "restock".to_string()],
                }
                .into());
            }
            LedgerEntryType::Restock if adjustment.change_quantity <= 0 => {
                return Err(ValidationError::MustBePositive {
                    field: "change_quantity".to_string(),
                }
                .into());
            }
            _ => {}
        }
        validate_stock_change(adjustment.change_quantity)?;
        validate_notes("notes", adjustment.notes.as_deref())?;

        let product = self.load(&adjustment.product_id).await?;
        identity.authorize_admin(&product.store_id)?;

        let entry = self
            .db
            .ledger()
            .apply_adjustment(
                &product.id,
                &product.store_id,
                &identity.actor_id,
                adjustment.change_quantity,
                adjustment.entry_type,
                adjustment.notes.as_deref(),
            )
            .await?;

        if entry.new_quantity <= product.min_stock_level {
            warn!(
                product_id = %product.id,
                sku = %product.sku,
                stock = entry.new_quantity,
                min_stock_level = product.min_stock_level,
                "Product at or below minimum stock level"
            );
        }

        Ok(entry)
    }

    /// The most recent `limit` entries for a product, newest first.
    pub async fn history(
        &self,
        identity: &Identity,
        product_id: &str,
        limit: u32,
    ) -> ServiceResult<Vec<StockLedgerEntry>> {
        validate_history_limit(limit)?;
        let max = self.config.query.max_history_limit;
        if limit > max {
            return Err(ValidationError::OutOfRange {
                field: "limit".to_string(),
                min: 1,
                max: max as i64,
            }
            .into());
        }

        let product = self.load(product_id).await?;
        identity.authorize_read(&product.store_id)?;

        let entries = self.db.ledger().history(product_id, limit).await?;
        debug!(product_id = %product_id, limit, returned = entries.len(), "Read stock history");

        Ok(entries)
    }

    /// Stock the product had at `at`, reconstructed from the ledger.
    pub async fn quantity_at(
        &self,
        identity: &Identity,
        product_id: &str,
        at: DateTime<Utc>,
    ) -> ServiceResult<i64> {
        let (product, entries) = self.snapshot(product_id).await?;
        identity.authorize_read(&product.store_id)?;

        Ok(ledger::quantity_at(&entries, at, product.stock_quantity))
    }

    /// Checks the ledger chain of one product against its current stock.
    pub async fn audit(&self, identity: &Identity, product_id: &str) -> ServiceResult<LedgerAudit> {
        let (product, entries) = self.snapshot(product_id).await?;
        identity.authorize_read(&product.store_id)?;

        let report = ledger::audit(&product.id, &entries, product.stock_quantity);
        if !report.is_consistent() {
            warn!(
                product_id = %product.id,
                breaks = report.breaks.len(),
                "Stock ledger audit found inconsistencies"
            );
        }

        Ok(report)
    }

    async fn load(&self, product_id: &str) -> ServiceResult<Product> {
        self.db
            .products()
            .get_by_id(product_id)
            .await?
            .ok_or_else(|| CoreError::ProductNotFound(product_id.to_string()).into())
    }

    async fn snapshot(&self, product_id: &str) -> ServiceResult<(Product, Vec<StockLedgerEntry>)> {
        self.db
            .ledger()
            .snapshot(product_id)
            .await?
            .ok_or_else(|| CoreError::ProductNotFound(product_id.to_string()).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorKind, ServiceError};
    use crate::services::CheckoutRequest;
    use crate::test_support::*;
    use stockline_core::{Cart, CartLine, PaymentMethod};

    fn adjust(product_id: &str, change: i64, entry_type: LedgerEntryType) -> StockAdjustment {
        StockAdjustment {
            product_id: product_id.to_string(),
            change_quantity: change,
            entry_type,
            notes: None,
        }
    }

    #[tokio::test]
    async fn test_adjustment_below_zero_is_rejected() {
        let engine = engine().await;
        let p = add_product(&engine, STORE, "P", 100, 5).await;

        let err = engine
            .ledger()
            .record_adjustment(&admin(), adjust(&p.id, -100, LedgerEntryType::Adjustment))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::InsufficientStock);
        let stock = engine.catalog().get_product(&admin(), STORE, &p.id).await.unwrap().stock_quantity;
        assert_eq!(stock, 5);
        assert!(engine.ledger().history(&admin(), &p.id, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_restock_and_shrinkage() {
        let engine = engine().await;
        let p = add_product(&engine, STORE, "P", 100, 5).await;
        let ledger = engine.ledger();

        let restock = ledger
            .record_adjustment(&admin(), adjust(&p.id, 20, LedgerEntryType::Restock))
            .await
            .unwrap();
        assert_eq!((restock.previous_quantity, restock.new_quantity), (5, 25));
        assert_eq!(restock.actor_id, "admin-1");

        let shrink = ledger
            .record_adjustment(&admin(), adjust(&p.id, -4, LedgerEntryType::Adjustment))
            .await
            .unwrap();
        assert_eq!((shrink.previous_quantity, shrink.new_quantity), (25, 21));
    }

    #[tokio::test]
    async fn test_adjustment_input_rules() {
        let engine = engine().await;
        let p = add_product(&engine, STORE, "P", 100, 5).await;
        let ledger = engine.ledger();

        for bad in [
            adjust(&p.id, -1, LedgerEntryType::Sale),
            adjust(&p.id, 0, LedgerEntryType::Adjustment),
            adjust(&p.id, -2, LedgerEntryType::Restock),
        ] {
            let err = ledger.record_adjustment(&admin(), bad).await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidInput);
        }

        let err = ledger
            .record_adjustment(&cashier(), adjust(&p.id, 1, LedgerEntryType::Restock))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);

        let err = ledger
            .record_adjustment(&admin(), adjust("ghost", 1, LedgerEntryType::Restock))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ProductNotFound);
    }

    #[tokio::test]
    async fn test_history_limits_and_repeatability() {
        let engine = engine().await;
        let p = add_product(&engine, STORE, "P", 100, 0).await;
        let ledger = engine.ledger();
        for n in 1..=4 {
            ledger
                .record_adjustment(&admin(), adjust(&p.id, n, LedgerEntryType::Restock))
                .await
                .unwrap();
        }

        let first = ledger.history(&cashier(), &p.id, 3).await.unwrap();
        let again = ledger.history(&cashier(), &p.id, 3).await.unwrap();
        assert_eq!(first, again);
        assert_eq!(first.iter().map(|e| e.change_quantity).collect::<Vec<_>>(), vec![4, 3, 2]);

        for limit in [0, 501] {
            let err = ledger.history(&cashier(), &p.id, limit).await.unwrap_err();
            assert!(matches!(err, ServiceError::Rejected(CoreError::Validation(_))));
        }

        let outsider = Identity::cashier("c-9", OTHER_STORE);
        let err = ledger.history(&outsider, &p.id, 3).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
    }

    #[tokio::test]
    async fn test_stock_equals_initial_plus_ledger() {
        let engine = engine().await;
        let initial = 12;
        let p = add_product(&engine, STORE, "P", 250, initial).await;

        engine
            .ledger()
            .record_adjustment(&admin(), adjust(&p.id, 8, LedgerEntryType::Restock))
            .await
            .unwrap();
        let cart = Cart::new(vec![CartLine::new(&p.id, 7)]).unwrap();
        let sale = engine
            .checkout()
            .checkout(&cashier(), CheckoutRequest::new(STORE, cart, PaymentMethod::Cash))
            .await
            .unwrap();
        engine
            .ledger()
            .record_adjustment(&admin(), adjust(&p.id, -3, LedgerEntryType::Adjustment))
            .await
            .unwrap();
        engine
            .checkout()
            .cancel(&admin(), &sale.transaction.id, Some("customer left"))
            .await
            .unwrap();

        let history = engine.ledger().history(&admin(), &p.id, 500).await.unwrap();
        let net: i64 = history.iter().map(|e| e.change_quantity).sum();
        let stock = engine.catalog().get_product(&admin(), STORE, &p.id).await.unwrap().stock_quantity;
        assert_eq!(stock, initial + net);
        assert_eq!(stock, 17);

        let audit = engine.ledger().audit(&cashier(), &p.id).await.unwrap();
        assert!(audit.is_consistent(), "{:?}", audit.breaks);
        assert_eq!(audit.entries_checked, 4);
    }

    #[tokio::test]
    async fn test_quantity_at_reconstructs_past_stock() {
        let engine = engine().await;
        let p = add_product(&engine, STORE, "P", 100, 10).await;
        let before_any = Utc::now() - chrono::Duration::seconds(60);

        let entry = engine
            .ledger()
            .record_adjustment(&admin(), adjust(&p.id, 5, LedgerEntryType::Restock))
            .await
            .unwrap();

        let ledger = engine.ledger();
        assert_eq!(ledger.quantity_at(&cashier(), &p.id, before_any).await.unwrap(), 10);
        assert_eq!(ledger.quantity_at(&cashier(), &p.id, entry.created_at).await.unwrap(), 15);
        assert_eq!(ledger.quantity_at(&cashier(), &p.id, Utc::now()).await.unwrap(), 15);
    }
}
