//! # Catalog Store
//!
//! Product identity, price and per-store stock level.
//!
//! ## Access
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  get_product, list_products, low_stock   admin or cashier of the store │
//! │  create_product, update_product,         admin of the store            │
//! │  set_active                                                            │
//! │                                                                         │
//! │  None of these write stock after creation. Stock moves only through    │
//! │  checkout, refund/cancel and LedgerService::record_adjustment.         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use tracing::{debug, info};

use crate::error::{ServiceError, ServiceResult};
use stockline_core::validation::{
    validate_id, validate_price_cents, validate_product_name, validate_sku, validate_stock_level,
};
use stockline_core::{CoreError, Identity, NewProduct, Product, ProductUpdate};
use stockline_db::Database;

/// Catalog reads and admin maintenance.
#[derive(Debug, Clone)]
pub struct CatalogService {
    db: Database,
}

impl CatalogService {
    pub fn new(db: Database) -> Self {
        CatalogService { db }
    }

    /// A product of `store_id`.
    ///
    /// ## Errors
    /// - `ProductNotFound` if no product has this id
    /// - `CrossStoreReference` if it belongs to another store
    pub async fn get_product(
        &self,
        identity: &Identity,
        store_id: &str,
        product_id: &str,
    ) -> ServiceResult<Product> {
        identity.authorize_read(store_id)?;

        let product = self.load(product_id).await?;
        if product.store_id != store_id {
            return Err(CoreError::cross_store(product_id, store_id).into());
        }

        Ok(product)
    }

    /// A store's products ordered by name.
    pub async fn list_products(
        &self,
        identity: &Identity,
        store_id: &str,
        include_inactive: bool,
    ) -> ServiceResult<Vec<Product>> {
        identity.authorize_read(store_id)?;
        Ok(self.db.products().list_by_store(store_id, include_inactive).await?)
    }

    /// Creates a product with its opening stock.
    ///
    /// Opening stock is not a ledger entry; the ledger records changes
    /// from there on.
    pub async fn create_product(
        &self,
        identity: &Identity,
        new: NewProduct,
    ) -> ServiceResult<Product> {
        validate_id("store_id", &new.store_id)?;
        validate_sku(&new.sku)?;
        validate_product_name(&new.name)?;
        validate_price_cents(new.price_cents)?;
        validate_stock_level("initial_stock", new.initial_stock)?;
        validate_stock_level("min_stock_level", new.min_stock_level)?;

        identity.authorize_admin(&new.store_id)?;

        let sku = new.sku.trim();
        if self.db.products().get_by_sku(&new.store_id, sku).await?.is_some() {
            return Err(ServiceError::Duplicate {
                field: "sku".to_string(),
                value: sku.to_string(),
            });
        }

        // the unique index still decides if two creates race
        let product = self.db.products().insert(&new).await?;

        info!(
            product_id = %product.id,
            store_id = %product.store_id,
            sku = %product.sku,
            stock = product.stock_quantity,
            actor_id = %identity.actor_id,
            "Product created"
        );

        Ok(product)
    }

    /// Changes name, price or minimum level. Absent fields stay as they are.
    pub async fn update_product(
        &self,
        identity: &Identity,
        product_id: &str,
        changes: ProductUpdate,
    ) -> ServiceResult<Product> {
        if let Some(name) = &changes.name {
            validate_product_name(name)?;
        }
        if let Some(price) = changes.price_cents {
            validate_price_cents(price)?;
        }
        if let Some(level) = changes.min_stock_level {
            validate_stock_level("min_stock_level", level)?;
        }

        let current = self.load(product_id).await?;
        identity.authorize_admin(&current.store_id)?;

        let product = self.db.products().update(product_id, &changes).await?;

        info!(
            product_id = %product.id,
            price_cents = product.price_cents,
            actor_id = %identity.actor_id,
            "Product updated"
        );

        Ok(product)
    }

    /// Soft-deletes (`false`) or restores (`true`) a product.
    pub async fn set_active(
        &self,
        identity: &Identity,
        product_id: &str,
        active: bool,
    ) -> ServiceResult<Product> {
        let current = self.load(product_id).await?;
        identity.authorize_admin(&current.store_id)?;

        if current.is_active == active {
            debug!(product_id = %product_id, active, "Active flag unchanged");
            return Ok(current);
        }

        let product = self.db.products().set_active(product_id, active).await?;
        info!(product_id = %product_id, active, actor_id = %identity.actor_id, "Product active flag set");

        Ok(product)
    }

    /// Active products at or below their minimum stock level.
    pub async fn low_stock(&self, identity: &Identity, store_id: &str) -> ServiceResult<Vec<Product>> {
        identity.authorize_read(store_id)?;
        Ok(self.db.products().low_stock(store_id).await?)
    }

    async fn load(&self, product_id: &str) -> ServiceResult<Product> {
        self.db
            .products()
            .get_by_id(product_id)
            .await?
            .ok_or_else(|| CoreError::ProductNotFound(product_id.to_string()).into())
    }
}
