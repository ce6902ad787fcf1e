//! # Stock Ledger Repository
//!
//! Append-only history of stock changes.
//!
//! ## Entry Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  commit_checkout ───► sale        (−q, transaction_id = sale)          │
//! │  reverse         ───► restock     (+q, transaction_id = reversed sale) │
//! │  apply_adjustment ──► adjustment  (±n)                                 │
//! │                   └─► restock     (+n, goods received)                 │
//! │                                                                         │
//! │  Every entry is written in the same database transaction as the       │
//! │  stock change it records. UPDATE/DELETE on stock_ledger are refused    │
//! │  by triggers.                                                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};

use crate::error::DbResult;
use crate::repository::product::{apply_stock_change, explain_stock_miss};
use stockline_core::{LedgerEntryType, Product, StockLedgerEntry};

/// Fields of a ledger row before the database assigns id and timestamp.
#[derive(Debug, Clone)]
pub(crate) struct NewLedgerEntry<'a> {
    pub product_id: &'a str,
    pub store_id: &'a str,
    pub transaction_id: Option<&'a str>,
    pub entry_type: LedgerEntryType,
    pub previous_quantity: i64,
    pub change_quantity: i64,
    pub notes: Option<&'a str>,
    pub actor_id: &'a str,
    pub created_at: DateTime<Utc>,
}

/// Repository for stock ledger operations.
#[derive(Debug, Clone)]
pub struct LedgerRepository {
    pool: SqlitePool,
}

impl LedgerRepository {
    /// Creates a new LedgerRepository.
    pub fn new(pool: SqlitePool) -> Self {
        LedgerRepository { pool }
    }

    /// Changes a product's stock by `change` and records it, atomically.
    ///
    /// ## Errors
    /// - `Domain(InsufficientStock)` if the result would be negative
    /// - `Domain(ProductNotFound)` / `Domain(CrossStoreReference)` if the
    ///   product is missing or belongs to another store
    pub async fn apply_adjustment(
        &self,
        product_id: &str,
        store_id: &str,
        actor_id: &str,
        change: i64,
        entry_type: LedgerEntryType,
        notes: Option<&str>,
    ) -> DbResult<StockLedgerEntry> {
        debug!(product_id = %product_id, change, entry_type = %entry_type, "Applying stock adjustment");

        let mut tx = self.pool.begin().await?;

        let row = match apply_stock_change(&mut tx, product_id, store_id, change, false).await? {
            Some(row) => row,
            None => {
                let err = explain_stock_miss(&mut tx, product_id, store_id, change, false).await?;
                // dropping `tx` rolls back
                return Err(err);
            }
        };

        let entry = append(
            &mut tx,
            NewLedgerEntry {
                product_id,
                store_id,
                transaction_id: None,
                entry_type,
                previous_quantity: row.stock_quantity - change,
                change_quantity: change,
                notes,
                actor_id,
                created_at: Utc::now(),
            },
        )
        .await?;

        tx.commit().await?;

        info!(
            product_id = %product_id,
            sku = %row.sku,
            previous = entry.previous_quantity,
            new = entry.new_quantity,
            entry_type = %entry_type,
            "Stock adjusted"
        );

        Ok(entry)
    }

    /// The newest `limit` entries for a product, newest first.
    pub async fn history(&self, product_id: &str, limit: u32) -> DbResult<Vec<StockLedgerEntry>> {
        let entries = sqlx::query_as::<_, StockLedgerEntry>(
            r#"
            SELECT
                id, product_id, store_id, transaction_id, entry_type,
                previous_quantity, change_quantity, new_quantity,
                notes, actor_id, created_at
            FROM stock_ledger
            WHERE product_id = ?1
            ORDER BY id DESC
            LIMIT ?2
            "#,
        )
        .bind(product_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    /// Entries written for one transaction (sale and any restocks).
    pub async fn entries_for_transaction(
        &self,
        transaction_id: &str,
    ) -> DbResult<Vec<StockLedgerEntry>> {
        let entries = sqlx::query_as::<_, StockLedgerEntry>(
            r#"
            SELECT
                id, product_id, store_id, transaction_id, entry_type,
                previous_quantity, change_quantity, new_quantity,
                notes, actor_id, created_at
            FROM stock_ledger
            WHERE transaction_id = ?1
            ORDER BY id
            "#,
        )
        .bind(transaction_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    /// A product and its whole ledger, read from one snapshot so a
    /// concurrent checkout cannot land between the two reads.
    pub async fn snapshot(
        &self,
        product_id: &str,
    ) -> DbResult<Option<(Product, Vec<StockLedgerEntry>)>> {
        let mut tx = self.pool.begin().await?;

        let product = sqlx::query_as::<_, Product>(
            r#"
            SELECT
                id, store_id, sku, name, price_cents, stock_quantity,
                min_stock_level, is_active, created_at, updated_at
            FROM products
            WHERE id = ?1
            "#,
        )
        .bind(product_id)
        .fetch_optional(&mut *tx)
        .await?;

        let product = match product {
            Some(p) => p,
            None => return Ok(None),
        };

        let entries = sqlx::query_as::<_, StockLedgerEntry>(
            r#"
            SELECT
                id, product_id, store_id, transaction_id, entry_type,
                previous_quantity, change_quantity, new_quantity,
                notes, actor_id, created_at
            FROM stock_ledger
            WHERE product_id = ?1
            ORDER BY id
            "#,
        )
        .bind(product_id)
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(Some((product, entries)))
    }

}

/// Appends one entry on the caller's connection and returns the stored row.
pub(crate) async fn append(
    conn: &mut SqliteConnection,
    entry: NewLedgerEntry<'_>,
) -> DbResult<StockLedgerEntry> {
    let stored = sqlx::query_as::<_, StockLedgerEntry>(
        r#"
        INSERT INTO stock_ledger (
            product_id, store_id, transaction_id, entry_type,
            previous_quantity, change_quantity, new_quantity,
            notes, actor_id, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
        RETURNING
            id, product_id, store_id, transaction_id, entry_type,
            previous_quantity, change_quantity, new_quantity,
            notes, actor_id, created_at
        "#,
    )
    .bind(entry.product_id)
    .bind(entry.store_id)
    .bind(entry.transaction_id)
    .bind(entry.entry_type)
    .bind(entry.previous_quantity)
    .bind(entry.change_quantity)
    .bind(entry.previous_quantity + entry.change_quantity)
    .bind(entry.notes)
    .bind(entry.actor_id)
    .bind(entry.created_at)
    .fetch_one(&mut *conn)
    .await?;

    Ok(stored)
}

// =============================================================================
// Unit Tests
// =============================================================================
