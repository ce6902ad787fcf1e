//! # Product Repository
//!
//! Catalog Store persistence: per-store products with their stock level.
//!
//! ## Stock Ownership
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  products.stock_quantity is the single source of truth for stock.      │
//! │                                                                         │
//! │  ✅ Written by                        ❌ Never written by               │
//! │  ─────────────────────────────        ─────────────────────────────     │
//! │  • insert (opening stock)             • update (name/price/min level)  │
//! │  • TransactionRepository (sale,       • set_active                     │
//! │    refund/cancel restock)                                              │
//! │  • LedgerRepository (adjustment)                                       │
//! │                                                                         │
//! │  Every post-insert change is a conditional UPDATE paired with a        │
//! │  stock_ledger row in the same database transaction.                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use stockline_core::{NewProduct, Product, ProductUpdate};

/// Repository for product database operations.
///
/// ## Usage
/// ```rust,ignore
/// let repo = db.products();
/// let product = repo.get_by_id("uuid-here").await?;
/// let shelf = repo.list_by_store("store-1", false).await?;
/// ```
#[derive(Debug, Clone)]
pub struct ProductRepository {
    pool: SqlitePool,
}

impl ProductRepository {
    /// Creates a new ProductRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ProductRepository { pool }
    }

    /// Gets a product by its ID, in any store and any active state.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Product>> {
        let product = sqlx::query_as::<_, Product>(
            r#"
            SELECT
                id, store_id, sku, name, price_cents, stock_quantity,
                min_stock_level, is_active, created_at, updated_at
            FROM products
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(product)
    }

    /// Gets a product by SKU within a store.
    pub async fn get_by_sku(&self, store_id: &str, sku: &str) -> DbResult<Option<Product>> {
        let product = sqlx::query_as::<_, Product>(
            r#"
            SELECT
                id, store_id, sku, name, price_cents, stock_quantity,
                min_stock_level, is_active, created_at, updated_at
            FROM products
            WHERE store_id = ?1 AND sku = ?2
            "#,
        )
        .bind(store_id)
        .bind(sku)
        .fetch_optional(&self.pool)
        .await?;

        Ok(product)
    }

    /// Lists a store's products ordered by name.
    pub async fn list_by_store(
        &self,
        store_id: &str,
        include_inactive: bool,
    ) -> DbResult<Vec<Product>> {
        let products = sqlx::query_as::<_, Product>(
            r#"
            SELECT
                id, store_id, sku, name, price_cents, stock_quantity,
                min_stock_level, is_active, created_at, updated_at
            FROM products
            WHERE store_id = ?1 AND (?2 OR is_active = 1)
            ORDER BY name, sku
            "#,
        )
        .bind(store_id)
        .bind(include_inactive)
        .fetch_all(&self.pool)
        .await?;

        Ok(products)
    }

    /// Active products at or below their reorder threshold, emptiest first.
    pub async fn low_stock(&self, store_id: &str) -> DbResult<Vec<Product>> {
        let products = sqlx::query_as::<_, Product>(
            r#"
            SELECT
                id, store_id, sku, name, price_cents, stock_quantity,
                min_stock_level, is_active, created_at, updated_at
            FROM products
            WHERE store_id = ?1 AND is_active = 1 AND stock_quantity <= min_stock_level
            ORDER BY stock_quantity, name
            "#,
        )
        .bind(store_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(products)
    }

    /// Inserts a new product with its opening stock.
    ///
    /// ## Returns
    /// * `Ok(Product)` - Inserted product
    /// * `Err(DbError::UniqueViolation)` - SKU already exists in the store
    pub async fn insert(&self, new: &NewProduct) -> DbResult<Product> {
        debug!(store_id = %new.store_id, sku = %new.sku, "Inserting product");

        let now = Utc::now();
        let product = Product {
            id: generate_product_id(),
            store_id: new.store_id.clone(),
            sku: new.sku.trim().to_string(),
            name: new.name.trim().to_string(),
            price_cents: new.price_cents,
            stock_quantity: new.initial_stock,
            min_stock_level: new.min_stock_level,
            is_active: true,
            created_at: now,
            updated_at: now,
        };

        sqlx::query(
            r#"
            INSERT INTO products (
                id, store_id, sku, name, price_cents, stock_quantity,
                min_stock_level, is_active, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(&product.id)
        .bind(&product.store_id)
        .bind(&product.sku)
        .bind(&product.name)
        .bind(product.price_cents)
        .bind(product.stock_quantity)
        .bind(product.min_stock_level)
        .bind(product.is_active)
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match DbError::from(e) {
            DbError::UniqueViolation { .. } => DbError::duplicate("sku", &product.sku),
            other => other,
        })?;

        Ok(product)
    }

    /// Applies catalog changes. Stock is untouched.
    ///
    /// ## Returns
    /// * `Ok(Product)` - Product after the update
    /// * `Err(DbError::NotFound)` - Product doesn't exist
    pub async fn update(&self, id: &str, changes: &ProductUpdate) -> DbResult<Product> {
        debug!(id = %id, "Updating product");

        let product = sqlx::query_as::<_, Product>(
            r#"
            UPDATE products SET
                name = COALESCE(?2, name),
                price_cents = COALESCE(?3, price_cents),
                min_stock_level = COALESCE(?4, min_stock_level),
                updated_at = ?5
            WHERE id = ?1
            RETURNING
                id, store_id, sku, name, price_cents, stock_quantity,
                min_stock_level, is_active, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(changes.name.as_deref().map(str::trim))
        .bind(changes.price_cents)
        .bind(changes.min_stock_level)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await?;

        product.ok_or_else(|| DbError::not_found("Product", id))
    }

    /// Soft-deletes (`false`) or restores (`true`) a product.
    ///
    /// Products are never hard-deleted; past line items and ledger entries
    /// keep referencing them.
    pub async fn set_active(&self, id: &str, active: bool) -> DbResult<Product> {
        debug!(id = %id, active, "Setting product active flag");

        let product = sqlx::query_as::<_, Product>(
            r#"
            UPDATE products SET is_active = ?2, updated_at = ?3
            WHERE id = ?1
            RETURNING
                id, store_id, sku, name, price_cents, stock_quantity,
                min_stock_level, is_active, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(active)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await?;

        product.ok_or_else(|| DbError::not_found("Product", id))
    }
}

// =============================================================================
// In-transaction helpers
// =============================================================================
//
// These take a borrowed connection so they run inside the caller's
// database transaction (`&mut *tx`). Never call the pool-level methods
// above while holding a transaction: with a single-connection pool that
// waits on itself.

/// Stock row returned by a conditional stock update.
#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct StockRow {
    pub stock_quantity: i64,
    pub price_cents: i64,
    pub sku: String,
    pub name: String,
    pub min_stock_level: i64,
}

/// Atomically applies `change` to a product's stock if the result stays
/// non-negative. `None` means no row matched; see [`explain_stock_miss`].
///
/// `require_active` restricts the update to sellable products.
pub(crate) async fn apply_stock_change(
    conn: &mut SqliteConnection,
    product_id: &str,
    store_id: &str,
    change: i64,
    require_active: bool,
) -> DbResult<Option<StockRow>> {
    let row = sqlx::query_as::<_, StockRow>(
        r#"
        UPDATE products
        SET stock_quantity = stock_quantity + ?3, updated_at = ?4
        WHERE id = ?1
          AND store_id = ?2
          AND (is_active = 1 OR NOT ?5)
          AND stock_quantity + ?3 >= 0
        RETURNING stock_quantity, price_cents, sku, name, min_stock_level
        "#,
    )
    .bind(product_id)
    .bind(store_id)
    .bind(change)
    .bind(Utc::now())
    .bind(require_active)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(row)
}

/// Works out why [`apply_stock_change`] matched no row.
pub(crate) async fn explain_stock_miss(
    conn: &mut SqliteConnection,
    product_id: &str,
    store_id: &str,
    change: i64,
    require_active: bool,
) -> DbResult<DbError> {
    let row: Option<(String, bool, i64, String)> = sqlx::query_as(
        "SELECT store_id, is_active, stock_quantity, sku FROM products WHERE id = ?1",
    )
    .bind(product_id)
    .fetch_optional(&mut *conn)
    .await?;

    let err = match row {
        None => stockline_core::CoreError::ProductNotFound(product_id.to_string()),
        Some((owner, _, _, _)) if owner != store_id => {
            stockline_core::CoreError::cross_store(product_id, store_id)
        }
        Some((_, false, _, _)) if require_active => {
            stockline_core::CoreError::ProductInactive(product_id.to_string())
        }
        Some((_, _, available, sku)) => stockline_core::CoreError::InsufficientStock {
            product_id: product_id.to_string(),
            sku,
            available,
            requested: -change,
        },
    };

    Ok(DbError::Domain(err))
}

/// Helper to generate a new product ID.
pub fn generate_product_id() -> String {
    Uuid::new_v4().to_string()
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};

    fn new_product(store: &str, sku: &str, stock: i64) -> NewProduct {
        NewProduct {
            store_id: store.to_string(),
            sku: sku.to_string(),
            name: format!("Product {}", sku),
            price_cents: 1000,
            initial_stock: stock,
            min_stock_level: 2,
        }
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.products();

        let product = repo.insert(&new_product("s1", "COLA", 5)).await.unwrap();
        let fetched = repo.get_by_id(&product.id).await.unwrap().unwrap();

        assert_eq!(fetched.sku, "COLA");
        assert_eq!(fetched.stock_quantity, 5);
        assert!(fetched.is_active);
        assert!(repo.get_by_sku("s1", "COLA").await.unwrap().is_some());
        assert!(repo.get_by_sku("s2", "COLA").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_sku_per_store() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.products();

        repo.insert(&new_product("s1", "COLA", 5)).await.unwrap();
        let err = repo.insert(&new_product("s1", "COLA", 1)).await.unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { .. }));

        // same SKU in another store is fine
        repo.insert(&new_product("s2", "COLA", 1)).await.unwrap();
    }

    #[tokio::test]
    async fn test_update_never_touches_stock() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.products();
        let product = repo.insert(&new_product("s1", "COLA", 5)).await.unwrap();

        let updated = repo
            .update(
                &product.id,
                &ProductUpdate {
                    name: Some("Cola Zero".to_string()),
                    price_cents: Some(1250),
                    min_stock_level: None,
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.name, "Cola Zero");
        assert_eq!(updated.price_cents, 1250);
        assert_eq!(updated.min_stock_level, 2);
        assert_eq!(updated.stock_quantity, 5);

        let missing = repo.update("nope", &ProductUpdate::default()).await;
        assert!(matches!(missing.unwrap_err(), DbError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_soft_delete_and_listing() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.products();
        let a = repo.insert(&new_product("s1", "A", 5)).await.unwrap();
        repo.insert(&new_product("s1", "B", 1)).await.unwrap();

        repo.set_active(&a.id, false).await.unwrap();

        assert_eq!(repo.list_by_store("s1", false).await.unwrap().len(), 1);
        assert_eq!(repo.list_by_store("s1", true).await.unwrap().len(), 2);

        // B has 1 unit against a threshold of 2
        let low = repo.low_stock("s1").await.unwrap();
        assert_eq!(low.len(), 1);
        assert_eq!(low[0].sku, "B");
    }

    #[tokio::test]
    async fn test_conditional_stock_change() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let product = db.products().insert(&new_product("s1", "A", 3)).await.unwrap();

        let mut conn = db.pool().acquire().await.unwrap();
        let row = apply_stock_change(&mut conn, &product.id, "s1", -3, true)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.stock_quantity, 0);

        assert!(apply_stock_change(&mut conn, &product.id, "s1", -1, true)
            .await
            .unwrap()
            .is_none());
        let why = explain_stock_miss(&mut conn, &product.id, "s1", -1, true).await.unwrap();
        assert!(matches!(
            why,
            DbError::Domain(stockline_core::CoreError::InsufficientStock { available: 0, .. })
        ));

        let why = explain_stock_miss(&mut conn, &product.id, "s2", -1, true).await.unwrap();
        assert!(matches!(
            why,
            DbError::Domain(stockline_core::CoreError::CrossStoreReference { .. })
        ));
    }
}
