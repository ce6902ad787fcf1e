//! # Transaction Repository
//!
//! Sales persistence: the atomic checkout unit, refunds/cancellations and
//! the paginated transaction listing.
//!
//! ## Checkout Unit
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  BEGIN                                                                  │
//! │   │                                                                     │
//! │   ├── for each cart line (cart order):                                 │
//! │   │     UPDATE products SET stock = stock − q                          │
//! │   │      WHERE id = ? AND store = ? AND active AND stock − q >= 0      │
//! │   │      RETURNING stock, price, sku, name                             │
//! │   │        │                                                            │
//! │   │        ├── row    → snapshot price, new stock                      │
//! │   │        └── no row → diagnose → ROLLBACK                            │
//! │   │                     (InsufficientStock / ProductNotFound / ...)    │
//! │   │                                                                     │
//! │   ├── price lines from snapshot prices                                 │
//! │   ├── allocate TRX-YYYYMMDD-NNNNNN                                      │
//! │   ├── INSERT transactions            (status = completed)              │
//! │   ├── INSERT transaction_items       (one per line)                    │
//! │   └── INSERT stock_ledger            (sale, −q, one per line)          │
//! │                                                                         │
//! │  COMMIT  ── nothing above is visible to other connections before this  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The first statement is a write, so the unit holds SQLite's write lock
//! from its first step; the stock check and the decrement are one
//! statement evaluated under that lock. Two checkouts racing for the last
//! unit serialize on it and the second one's UPDATE matches no row.

use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use std::future::Future;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::repository::ledger::{append, NewLedgerEntry};
use crate::repository::product::{apply_stock_change, explain_stock_miss};
use stockline_core::pricing::{price_lines, PriceLine, PricedCart};
use stockline_core::{
    Cart, CoreError, Discount, LedgerEntryType, Money, Page, PaymentMethod, StockLedgerEntry, TaxRate,
    Transaction, TransactionDetail, TransactionFilter, TransactionLineItem, TransactionStatus,
    TRANSACTION_NUMBER_PREFIX,
};

/// Everything the checkout unit needs, already authorized and validated.
#[derive(Debug, Clone)]
pub struct CheckoutDraft {
    pub store_id: String,
    pub cashier_id: String,
    pub cashier_name: Option<String>,
    pub customer_name: Option<String>,
    pub cart: Cart,
    pub payment_method: PaymentMethod,
    pub discount: Option<Discount>,
    pub tax_rate: TaxRate,
    pub notes: Option<String>,
}

/// A product left at or below its reorder threshold by a sale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LowStockAlert {
    pub product_id: String,
    pub sku: String,
    pub stock_quantity: i64,
    pub min_stock_level: i64,
}

/// Result of a committed checkout.
#[derive(Debug, Clone)]
pub struct CommittedCheckout {
    pub detail: TransactionDetail,
    pub ledger_entries: Vec<StockLedgerEntry>,
    pub low_stock: Vec<LowStockAlert>,
}

/// Result of a committed refund or cancellation.
#[derive(Debug, Clone)]
pub struct CommittedReversal {
    pub transaction: Transaction,
    pub ledger_entries: Vec<StockLedgerEntry>,
}

/// Repository for transaction database operations.
#[derive(Debug, Clone)]
pub struct TransactionRepository {
    pool: SqlitePool,
}

impl TransactionRepository {
    /// Creates a new TransactionRepository.
    pub fn new(pool: SqlitePool) -> Self {
        TransactionRepository { pool }
    }

    /// Runs the checkout unit. Commits everything or nothing.
    ///
    /// With a `deadline`, the unit is abandoned and rolled back if it has not
    /// reached `COMMIT` in time. Once `COMMIT` is issued it always runs to
    /// completion, so `DeadlineExceeded` means nothing was written.
    ///
    /// ## Errors
    /// - `Domain(InsufficientStock)` when a line's stock ran short, including
    ///   a race lost to a concurrent checkout
    /// - `Domain(ProductNotFound | ProductInactive | CrossStoreReference)`
    ///   when the catalog changed since the caller's pre-check
    /// - `Domain(InvalidDiscount | InvalidCart)` when the discount exceeds the
    ///   subtotal at snapshot prices or an amount overflows
    /// - `DeadlineExceeded` when `deadline` passed before `COMMIT`
    /// - `Busy` / `PoolExhausted` under write contention
    pub async fn commit_checkout(
        &self,
        draft: &CheckoutDraft,
        deadline: Option<Instant>,
    ) -> DbResult<CommittedCheckout> {
        debug!(
            store_id = %draft.store_id,
            lines = draft.cart.len(),
            "Starting checkout unit"
        );

        let mut tx = before_deadline(deadline, async { Ok(self.pool.begin().await?) }).await?;
        let staged = before_deadline(deadline, stage_checkout(&mut tx, draft)).await?;

        // not cancellable from here on
        tx.commit().await?;

        let transaction = &staged.detail.transaction;
        info!(
            transaction_id = %transaction.id,
            transaction_number = %transaction.transaction_number,
            total_cents = transaction.total_cents,
            lines = staged.detail.items.len(),
            "Checkout committed"
        );

        Ok(staged)
    }

    /// Moves a completed transaction to `refunded` or `cancelled` and puts
    /// every line's quantity back on the shelf, atomically.
    ///
    /// ## Errors
    /// - `Domain(TransactionNotFound)` for an unknown id
    /// - `Domain(InvalidTransactionStatus)` unless the transaction is
    ///   `completed`
    pub async fn reverse(
        &self,
        transaction_id: &str,
        new_status: TransactionStatus,
        actor_id: &str,
        reason: Option<&str>,
        deadline: Option<Instant>,
    ) -> DbResult<CommittedReversal> {
        debug!(transaction_id = %transaction_id, status = %new_status, "Starting reversal unit");

        if !TransactionStatus::Completed.can_transition_to(new_status) {
            return Err(CoreError::InvalidTransactionStatus {
                transaction_id: transaction_id.to_string(),
                current_status: TransactionStatus::Completed.to_string(),
            }
            .into());
        }

        let mut tx = before_deadline(deadline, async { Ok(self.pool.begin().await?) }).await?;
        let staged = before_deadline(
            deadline,
            stage_reversal(&mut tx, transaction_id, new_status, actor_id, reason),
        )
        .await?;

        // not cancellable from here on
        tx.commit().await?;

        info!(
            transaction_id = %staged.transaction.id,
            transaction_number = %staged.transaction.transaction_number,
            status = %new_status,
            restocked_lines = staged.ledger_entries.len(),
            "Transaction reversed"
        );

        Ok(staged)
    }

    /// Gets a store's transaction header by ID.
    ///
    /// A transaction belonging to another store is reported as absent.
    pub async fn get(&self, store_id: &str, id: &str) -> DbResult<Option<Transaction>> {
        let transaction = sqlx::query_as::<_, Transaction>(
            r#"
            SELECT
                id, store_id, transaction_number, cashier_id, cashier_name,
                customer_name, subtotal_cents, tax_cents, discount_cents,
                total_cents, payment_method, status, notes, created_at, updated_at
            FROM transactions
            WHERE id = ?1 AND store_id = ?2
            "#,
        )
        .bind(id)
        .bind(store_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(transaction)
    }

    /// Gets a store's transaction with its line items in cart order.
    pub async fn get_detail(
        &self,
        store_id: &str,
        id: &str,
    ) -> DbResult<Option<TransactionDetail>> {
        let transaction = match self.get(store_id, id).await? {
            Some(t) => t,
            None => return Ok(None),
        };
        let mut conn = self.pool.acquire().await?;
        let items = fetch_items(&mut conn, id).await?;
        Ok(Some(TransactionDetail { transaction, items }))
    }

    /// One page of a store's transactions, newest first.
    ///
    /// `page` is 1-based; callers validate `page` and `page_size`.
    pub async fn list(
        &self,
        store_id: &str,
        filter: &TransactionFilter,
        page: u32,
        page_size: u32,
    ) -> DbResult<Page<Transaction>> {
        let mut count_query: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT COUNT(*) FROM transactions");
        push_filters(&mut count_query, store_id, filter);
        let total: i64 = count_query
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await?;

        let mut select: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT id, store_id, transaction_number, cashier_id, cashier_name, \
             customer_name, subtotal_cents, tax_cents, discount_cents, \
             total_cents, payment_method, status, notes, created_at, updated_at \
             FROM transactions",
        );
        push_filters(&mut select, store_id, filter);
        select.push(" ORDER BY created_at DESC, id DESC LIMIT ");
        select.push_bind(page_size as i64);
        select.push(" OFFSET ");
        select.push_bind((page as i64 - 1) * page_size as i64);

        let items = select
            .build_query_as::<Transaction>()
            .fetch_all(&self.pool)
            .await?;

        debug!(store_id = %store_id, total, page, returned = items.len(), "Listed transactions");

        Ok(Page::new(items, total, page, page_size))
    }
}

// =============================================================================
// Atomic units
// =============================================================================
//
// Everything up to, but not including, COMMIT. Each stage runs on the
// caller's open transaction; dropping it mid-way leaves that transaction
// to roll back.

/// Awaits `step` unless `deadline` passes first.
async fn before_deadline<T, F>(deadline: Option<Instant>, step: F) -> DbResult<T>
where
    F: Future<Output = DbResult<T>>,
{
    match deadline {
        None => step.await,
        Some(at) if Instant::now() >= at => Err(DbError::DeadlineExceeded),
        Some(at) => tokio::time::timeout_at(at, step)
            .await
            .map_err(|_| DbError::DeadlineExceeded)?,
    }
}

async fn stage_checkout(
    conn: &mut SqliteConnection,
    draft: &CheckoutDraft,
) -> DbResult<CommittedCheckout> {
    let now = Utc::now();

    let mut price_input = Vec::with_capacity(draft.cart.len());
    let mut stock_after = Vec::with_capacity(draft.cart.len());

    for line in draft.cart.lines() {
        let change = -line.quantity;
        let row = match apply_stock_change(&mut *conn, &line.product_id, &draft.store_id, change, true)
            .await?
        {
            Some(row) => row,
            None => {
                let err =
                    explain_stock_miss(&mut *conn, &line.product_id, &draft.store_id, change, true)
                        .await?;
                debug!(product_id = %line.product_id, error = %err, "Checkout unit rolled back");
                return Err(err);
            }
        };

        price_input.push(PriceLine {
            product_id: line.product_id.clone(),
            sku: row.sku.clone(),
            name: row.name.clone(),
            unit_price: Money::from_cents(row.price_cents),
            quantity: line.quantity,
        });
        stock_after.push(row);
    }

    let priced = price_lines(&price_input, draft.tax_rate, draft.discount)?;

    let number = next_transaction_number(&mut *conn, now).await?;
    let transaction = Transaction {
        id: Uuid::new_v4().to_string(),
        store_id: draft.store_id.clone(),
        transaction_number: number,
        cashier_id: draft.cashier_id.clone(),
        cashier_name: draft.cashier_name.clone(),
        customer_name: draft.customer_name.clone(),
        subtotal_cents: priced.subtotal.cents(),
        tax_cents: priced.tax.cents(),
        discount_cents: priced.discount.cents(),
        total_cents: priced.total.cents(),
        payment_method: draft.payment_method,
        status: TransactionStatus::Completed,
        notes: draft.notes.clone(),
        created_at: now,
        updated_at: now,
    };
    insert_transaction(&mut *conn, &transaction).await?;

    let items = line_items(&transaction.id, &priced);
    for item in &items {
        insert_line_item(&mut *conn, item).await?;
    }

    let mut ledger_entries = Vec::with_capacity(items.len());
    let mut low_stock = Vec::new();
    for (item, row) in items.iter().zip(&stock_after) {
        let entry = append(
            &mut *conn,
            NewLedgerEntry {
                product_id: &item.product_id,
                store_id: &draft.store_id,
                transaction_id: Some(&transaction.id),
                entry_type: LedgerEntryType::Sale,
                previous_quantity: row.stock_quantity + item.quantity,
                change_quantity: -item.quantity,
                notes: None,
                actor_id: &draft.cashier_id,
                created_at: now,
            },
        )
        .await?;
        ledger_entries.push(entry);

        if row.stock_quantity <= row.min_stock_level {
            low_stock.push(LowStockAlert {
                product_id: item.product_id.clone(),
                sku: row.sku.clone(),
                stock_quantity: row.stock_quantity,
                min_stock_level: row.min_stock_level,
            });
        }
    }

    Ok(CommittedCheckout {
        detail: TransactionDetail { transaction, items },
        ledger_entries,
        low_stock,
    })
}

async fn stage_reversal(
    conn: &mut SqliteConnection,
    transaction_id: &str,
    new_status: TransactionStatus,
    actor_id: &str,
    reason: Option<&str>,
) -> DbResult<CommittedReversal> {
    let now = Utc::now();

    let transaction = sqlx::query_as::<_, Transaction>(
        r#"
        UPDATE transactions SET status = ?2, updated_at = ?3
        WHERE id = ?1 AND status = ?4
        RETURNING
            id, store_id, transaction_number, cashier_id, cashier_name,
            customer_name, subtotal_cents, tax_cents, discount_cents,
            total_cents, payment_method, status, notes, created_at, updated_at
        "#,
    )
    .bind(transaction_id)
    .bind(new_status)
    .bind(now)
    .bind(TransactionStatus::Completed)
    .fetch_optional(&mut *conn)
    .await?;

    let transaction = match transaction {
        Some(t) => t,
        None => {
            let current: Option<TransactionStatus> =
                sqlx::query_scalar("SELECT status FROM transactions WHERE id = ?1")
                    .bind(transaction_id)
                    .fetch_optional(&mut *conn)
                    .await?;
            let err = match current {
                None => CoreError::TransactionNotFound(transaction_id.to_string()),
                Some(status) => CoreError::InvalidTransactionStatus {
                    transaction_id: transaction_id.to_string(),
                    current_status: status.to_string(),
                },
            };
            return Err(err.into());
        }
    };

    let items = fetch_items(&mut *conn, transaction_id).await?;
    let notes = reason
        .map(|r| format!("{} {}: {}", new_status, transaction.transaction_number, r))
        .unwrap_or_else(|| format!("{} {}", new_status, transaction.transaction_number));

    let mut ledger_entries = Vec::with_capacity(items.len());
    for item in &items {
        let row = apply_stock_change(
            &mut *conn,
            &item.product_id,
            &transaction.store_id,
            item.quantity,
            false,
        )
        .await?
        .ok_or_else(|| DbError::not_found("Product", &item.product_id))?;

        let entry = append(
            &mut *conn,
            NewLedgerEntry {
                product_id: &item.product_id,
                store_id: &transaction.store_id,
                transaction_id: Some(&transaction.id),
                entry_type: LedgerEntryType::Restock,
                previous_quantity: row.stock_quantity - item.quantity,
                change_quantity: item.quantity,
                notes: Some(&notes),
                actor_id,
                created_at: now,
            },
        )
        .await?;
        ledger_entries.push(entry);
    }

    Ok(CommittedReversal {
        transaction,
        ledger_entries,
    })
}

// =============================================================================
// Helpers
// =============================================================================

fn push_filters(query: &mut QueryBuilder<'_, Sqlite>, store_id: &str, filter: &TransactionFilter) {
    query.push(" WHERE store_id = ");
    query.push_bind(store_id.to_string());

    if let Some(from) = filter.date_range.from {
        query.push(" AND created_at >= ");
        query.push_bind(from);
    }
    if let Some(to) = filter.date_range.to {
        query.push(" AND created_at < ");
        query.push_bind(to);
    }
    if let Some(cashier_id) = &filter.cashier_id {
        query.push(" AND cashier_id = ");
        query.push_bind(cashier_id.clone());
    }
    if let Some(method) = filter.payment_method {
        query.push(" AND payment_method = ");
        query.push_bind(method);
    }
    if let Some(status) = filter.status {
        query.push(" AND status = ");
        query.push_bind(status);
    }
}

/// Allocates the next `TRX-YYYYMMDD-NNNNNN` for the UTC day of `now`.
///
/// Must run inside the write transaction so the counter cannot be read by
/// two writers at once.
async fn next_transaction_number(
    conn: &mut SqliteConnection,
    now: DateTime<Utc>,
) -> DbResult<String> {
    let day_prefix = format!("{}-{}-", TRANSACTION_NUMBER_PREFIX, now.format("%Y%m%d"));

    let last: Option<String> = sqlx::query_scalar(
        "SELECT MAX(transaction_number) FROM transactions WHERE transaction_number LIKE ?1",
    )
    .bind(format!("{}%", day_prefix))
    .fetch_one(&mut *conn)
    .await?;

    let next = match last {
        Some(number) => {
            let seq = number
                .strip_prefix(&day_prefix)
                .and_then(|s| s.parse::<u32>().ok())
                .ok_or_else(|| {
                    DbError::Internal(format!("malformed transaction number: {}", number))
                })?;
            seq + 1
        }
        None => 1,
    };

    if next > 999_999 {
        warn!(day = %day_prefix, "Daily transaction counter overflowed six digits");
    }

    Ok(format!("{}{:06}", day_prefix, next))
}

fn line_items(transaction_id: &str, priced: &PricedCart) -> Vec<TransactionLineItem> {
    priced
        .lines
        .iter()
        .enumerate()
        .map(|(i, line)| TransactionLineItem {
            id: Uuid::new_v4().to_string(),
            transaction_id: transaction_id.to_string(),
            line_no: i as i64 + 1,
            product_id: line.product_id.clone(),
            sku_snapshot: line.sku.clone(),
            name_snapshot: line.name.clone(),
            quantity: line.quantity,
            unit_price_cents: line.unit_price.cents(),
            subtotal_cents: line.subtotal.cents(),
            tax_cents: line.tax.cents(),
            discount_cents: line.discount.cents(),
            total_cents: line.total.cents(),
        })
        .collect()
}

async fn insert_transaction(conn: &mut SqliteConnection, t: &Transaction) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO transactions (
            id, store_id, transaction_number, cashier_id, cashier_name,
            customer_name, subtotal_cents, tax_cents, discount_cents,
            total_cents, payment_method, status, notes, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
        "#,
    )
    .bind(&t.id)
    .bind(&t.store_id)
    .bind(&t.transaction_number)
    .bind(&t.cashier_id)
    .bind(&t.cashier_name)
    .bind(&t.customer_name)
    .bind(t.subtotal_cents)
    .bind(t.tax_cents)
    .bind(t.discount_cents)
    .bind(t.total_cents)
    .bind(t.payment_method)
    .bind(t.status)
    .bind(&t.notes)
    .bind(t.created_at)
    .bind(t.updated_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

async fn insert_line_item(conn: &mut SqliteConnection, item: &TransactionLineItem) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO transaction_items (
            id, transaction_id, line_no, product_id, sku_snapshot, name_snapshot,
            quantity, unit_price_cents, subtotal_cents, tax_cents,
            discount_cents, total_cents
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
        "#,
    )
    .bind(&item.id)
    .bind(&item.transaction_id)
    .bind(item.line_no)
    .bind(&item.product_id)
    .bind(&item.sku_snapshot)
    .bind(&item.name_snapshot)
    .bind(item.quantity)
    .bind(item.unit_price_cents)
    .bind(item.subtotal_cents)
    .bind(item.tax_cents)
    .bind(item.discount_cents)
    .bind(item.total_cents)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

async fn fetch_items(
    conn: &mut SqliteConnection,
    transaction_id: &str,
) -> DbResult<Vec<TransactionLineItem>> {
    let items = sqlx::query_as::<_, TransactionLineItem>(
        r#"
        SELECT
            id, transaction_id, line_no, product_id, sku_snapshot, name_snapshot,
            quantity, unit_price_cents, subtotal_cents, tax_cents,
            discount_cents, total_cents
        FROM transaction_items
        WHERE transaction_id = ?1
        ORDER BY line_no
        "#,
    )
    .bind(transaction_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(items)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};
    use stockline_core::{CartLine, NewProduct, Product};

    async fn product(db: &Database, store: &str, sku: &str, price: i64, stock: i64) -> Product {
        db.products()
            .insert(&NewProduct {
                store_id: store.to_string(),
                sku: sku.to_string(),
                name: format!("Product {}", sku),
                price_cents: price,
                initial_stock: stock,
                min_stock_level: 1,
            })
            .await
            .unwrap()
    }

    fn draft(store: &str, lines: Vec<(&str, i64)>) -> CheckoutDraft {
        CheckoutDraft {
            store_id: store.to_string(),
            cashier_id: "cashier-1".to_string(),
            cashier_name: Some("Dana".to_string()),
            customer_name: None,
            cart: Cart::new(lines.into_iter().map(|(p, q)| CartLine::new(p, q)).collect()).unwrap(),
            payment_method: PaymentMethod::Cash,
            discount: None,
            tax_rate: TaxRate::zero(),
            notes: None,
        }
    }

    async fn stock_of(db: &Database, id: &str) -> i64 {
        db.products().get_by_id(id).await.unwrap().unwrap().stock_quantity
    }

    async fn transaction_count(db: &Database) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM transactions")
            .fetch_one(db.pool())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_checkout_writes_sale_items_and_ledger() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let p = product(&db, "s1", "P", 1000, 5).await;

        let committed = db
            .transactions()
            .commit_checkout(&draft("s1", vec![(&p.id, 3)]), None)
            .await
            .unwrap();

        let tx = &committed.detail.transaction;
        assert_eq!(tx.subtotal_cents, 3000);
        assert_eq!(tx.total_cents, 3000);
        assert_eq!(tx.status, TransactionStatus::Completed);
        assert_eq!(committed.detail.items.len(), 1);
        assert_eq!(committed.detail.items[0].unit_price_cents, 1000);

        assert_eq!(committed.ledger_entries.len(), 1);
        let entry = &committed.ledger_entries[0];
        assert_eq!(entry.entry_type, LedgerEntryType::Sale);
        assert_eq!((entry.previous_quantity, entry.change_quantity, entry.new_quantity), (5, -3, 2));
        assert_eq!(entry.transaction_id.as_deref(), Some(tx.id.as_str()));

        assert_eq!(stock_of(&db, &p.id).await, 2);

        let stored = db.transactions().get_detail("s1", &tx.id).await.unwrap().unwrap();
        assert_eq!(stored.transaction.transaction_number, tx.transaction_number);
        assert_eq!(stored.items.len(), 1);
    }

    #[tokio::test]
    async fn test_lookup_is_scoped_to_store() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let p = product(&db, "s1", "P", 1000, 5).await;
        let repo = db.transactions();
        let sale = repo.commit_checkout(&draft("s1", vec![(&p.id, 1)]), None).await.unwrap();
        let id = sale.detail.transaction.id;

        assert!(repo.get("s1", &id).await.unwrap().is_some());
        assert!(repo.get("s2", &id).await.unwrap().is_none());
        assert!(repo.get_detail("s2", &id).await.unwrap().is_none());
        assert!(repo.get_detail("s1", "missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_failed_line_rolls_back_every_line() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let a = product(&db, "s1", "A", 100, 10).await;
        let b = product(&db, "s1", "B", 100, 1).await;

        let err = db
            .transactions()
            .commit_checkout(&draft("s1", vec![(&a.id, 4), (&b.id, 2)]), None)
            .await
            .unwrap_err();

        assert!(matches!(err, DbError::Domain(CoreError::InsufficientStock { .. })));
        assert_eq!(stock_of(&db, &a.id).await, 10);
        assert_eq!(stock_of(&db, &b.id).await, 1);
        assert_eq!(transaction_count(&db).await, 0);
        assert!(db.ledger().history(&a.id, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cross_store_and_inactive_lines() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let own = product(&db, "s1", "OWN", 100, 10).await;
        let foreign = product(&db, "s2", "FOREIGN", 100, 10).await;

        let err = db
            .transactions()
            .commit_checkout(&draft("s1", vec![(&own.id, 1), (&foreign.id, 1)]), None)
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Domain(CoreError::CrossStoreReference { .. })));
        assert_eq!(stock_of(&db, &own.id).await, 10);

        db.products().set_active(&own.id, false).await.unwrap();
        let err = db
            .transactions()
            .commit_checkout(&draft("s1", vec![(&own.id, 1)]), None)
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Domain(CoreError::ProductInactive(_))));
    }

    #[tokio::test]
    async fn test_line_totals_match_header_with_tax_and_discount() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let a = product(&db, "s1", "A", 333, 10).await;
        let b = product(&db, "s1", "B", 1250, 10).await;

        let mut d = draft("s1", vec![(&a.id, 3), (&b.id, 2)]);
        d.tax_rate = TaxRate::from_bps(825);
        d.discount = Some(Discount::Percentage(1000));

        let committed = db.transactions().commit_checkout(&d, None).await.unwrap();
        let tx = &committed.detail.transaction;
        let items = &committed.detail.items;

        let line_sum: i64 = items.iter().map(|i| i.quantity * i.unit_price_cents).sum();
        assert_eq!(tx.subtotal_cents, line_sum);
        assert_eq!(tx.total_cents, tx.subtotal_cents + tx.tax_cents - tx.discount_cents);
        assert_eq!(items.iter().map(|i| i.total_cents).sum::<i64>(), tx.total_cents);
    }

    #[tokio::test]
    async fn test_snapshot_price_survives_catalog_change() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let p = product(&db, "s1", "P", 1000, 5).await;

        let committed = db
            .transactions()
            .commit_checkout(&draft("s1", vec![(&p.id, 1)]), None)
            .await
            .unwrap();

        db.products()
            .update(
                &p.id,
                &stockline_core::ProductUpdate {
                    price_cents: Some(9999),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let stored = db
            .transactions()
            .get_detail("s1", &committed.detail.transaction.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.items[0].unit_price_cents, 1000);
    }

    #[tokio::test]
    async fn test_transaction_numbers_increase_daily() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let p = product(&db, "s1", "P", 100, 10).await;
        let repo = db.transactions();

        let first = repo.commit_checkout(&draft("s1", vec![(&p.id, 1)]), None).await.unwrap();
        let second = repo.commit_checkout(&draft("s1", vec![(&p.id, 1)]), None).await.unwrap();

        let day = Utc::now().format("%Y%m%d").to_string();
        let n1 = &first.detail.transaction.transaction_number;
        let n2 = &second.detail.transaction.transaction_number;
        assert!(n1.starts_with(&format!("TRX-{}-", day)));
        assert!(n1.ends_with("000001"));
        assert!(n2.ends_with("000002"));
    }

    #[tokio::test]
    async fn test_low_stock_alert() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let p = product(&db, "s1", "P", 100, 3).await;

        let committed = db
            .transactions()
            .commit_checkout(&draft("s1", vec![(&p.id, 2)]), None)
            .await
            .unwrap();
        assert_eq!(committed.low_stock.len(), 1);
        assert_eq!(committed.low_stock[0].stock_quantity, 1);
    }

    #[tokio::test]
    async fn test_refund_restocks_once() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let p = product(&db, "s1", "P", 100, 5).await;
        let repo = db.transactions();

        let sale = repo.commit_checkout(&draft("s1", vec![(&p.id, 3)]), None).await.unwrap();
        let id = sale.detail.transaction.id.clone();

        let reversal = repo
            .reverse(&id, TransactionStatus::Refunded, "admin-1", Some("damaged"), None)
            .await
            .unwrap();
        assert_eq!(reversal.transaction.status, TransactionStatus::Refunded);
        assert_eq!(reversal.ledger_entries.len(), 1);
        assert_eq!(reversal.ledger_entries[0].entry_type, LedgerEntryType::Restock);
        assert_eq!(reversal.ledger_entries[0].change_quantity, 3);
        assert_eq!(stock_of(&db, &p.id).await, 5);

        let linked = db.ledger().entries_for_transaction(&id).await.unwrap();
        let kinds: Vec<_> = linked.iter().map(|e| e.entry_type).collect();
        assert_eq!(kinds, vec![LedgerEntryType::Sale, LedgerEntryType::Restock]);

        let again = repo.reverse(&id, TransactionStatus::Cancelled, "admin-1", None, None).await;
        assert!(matches!(
            again.unwrap_err(),
            DbError::Domain(CoreError::InvalidTransactionStatus { .. })
        ));
        assert_eq!(stock_of(&db, &p.id).await, 5);

        let missing = repo.reverse("nope", TransactionStatus::Refunded, "admin-1", None, None).await;
        assert!(matches!(
            missing.unwrap_err(),
            DbError::Domain(CoreError::TransactionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_list_filters_and_pages() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let p = product(&db, "s1", "P", 100, 100).await;
        let q = product(&db, "s2", "Q", 100, 100).await;
        let repo = db.transactions();

        for i in 0..5 {
            let mut d = draft("s1", vec![(&p.id, 1)]);
            if i % 2 == 0 {
                d.payment_method = PaymentMethod::Card;
            }
            repo.commit_checkout(&d, None).await.unwrap();
        }
        repo.commit_checkout(&draft("s2", vec![(&q.id, 1)]), None).await.unwrap();

        let all = repo.list("s1", &TransactionFilter::default(), 1, 2).await.unwrap();
        assert_eq!(all.total, 5);
        assert_eq!(all.total_pages, 3);
        assert_eq!(all.items.len(), 2);
        assert!(all.items.iter().all(|t| t.store_id == "s1"));
        assert!(all.items[0].created_at >= all.items[1].created_at);

        let last = repo.list("s1", &TransactionFilter::default(), 3, 2).await.unwrap();
        assert_eq!(last.items.len(), 1);

        let cards = repo
            .list(
                "s1",
                &TransactionFilter {
                    payment_method: Some(PaymentMethod::Card),
                    ..Default::default()
                },
                1,
                10,
            )
            .await
            .unwrap();
        assert_eq!(cards.total, 3);

        let future = repo
            .list(
                "s1",
                &TransactionFilter {
                    date_range: stockline_core::DateRange::new(
                        Some(Utc::now() + chrono::Duration::hours(1)),
                        None,
                    ),
                    ..Default::default()
                },
                1,
                10,
            )
            .await
            .unwrap();
        assert_eq!(future.total, 0);
        assert!(future.items.is_empty());
    }

    #[tokio::test]
    async fn test_expired_deadline_writes_nothing() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let p = product(&db, "s1", "P", 100, 5).await;
        let repo = db.transactions();

        let err = repo
            .commit_checkout(&draft("s1", vec![(&p.id, 2)]), Some(Instant::now()))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::DeadlineExceeded));
        assert_eq!(transaction_count(&db).await, 0);
        assert_eq!(stock_of(&db, &p.id).await, 5);

        let sale = repo.commit_checkout(&draft("s1", vec![(&p.id, 2)]), None).await.unwrap();
        let id = sale.detail.transaction.id;
        let err = repo
            .reverse(&id, TransactionStatus::Refunded, "admin-1", None, Some(Instant::now()))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::DeadlineExceeded));
        assert_eq!(repo.get("s1", &id).await.unwrap().unwrap().status, TransactionStatus::Completed);
        assert_eq!(stock_of(&db, &p.id).await, 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_deadline_under_held_write_lock_rolls_back() {
        let dir = tempfile::tempdir().unwrap();
        let config = DbConfig::new(dir.path().join("locked.db"))
            .max_connections(2)
            .busy_timeout(std::time::Duration::from_secs(2));
        let db = Database::new(config).await.unwrap();
        let p = product(&db, "s1", "P", 100, 5).await;

        let mut blocker = db.pool().acquire().await.unwrap();
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *blocker).await.unwrap();

        let deadline = Instant::now() + std::time::Duration::from_millis(100);
        let err = db
            .transactions()
            .commit_checkout(&draft("s1", vec![(&p.id, 1)]), Some(deadline))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::DeadlineExceeded));

        sqlx::query("ROLLBACK").execute(&mut *blocker).await.unwrap();
        drop(blocker);

        assert_eq!(transaction_count(&db).await, 0);
        assert_eq!(stock_of(&db, &p.id).await, 5);
        assert!(db.ledger().history(&p.id, 10).await.unwrap().is_empty());

        db.transactions()
            .commit_checkout(&draft("s1", vec![(&p.id, 1)]), None)
            .await
            .unwrap();
        assert_eq!(stock_of(&db, &p.id).await, 4);
        db.close().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_checkouts_for_last_unit() {
        let dir = tempfile::tempdir().unwrap();
        let config = DbConfig::new(dir.path().join("race.db"))
            .max_connections(4)
            .busy_timeout(std::time::Duration::from_secs(5));
        let db = Database::new(config).await.unwrap();
        let p = product(&db, "s1", "LAST", 100, 1).await;

        let a = {
            let repo = db.transactions();
            let d = draft("s1", vec![(&p.id, 1)]);
            tokio::spawn(async move { repo.commit_checkout(&d, None).await })
        };
        let b = {
            let repo = db.transactions();
            let d = draft("s1", vec![(&p.id, 1)]);
            tokio::spawn(async move { repo.commit_checkout(&d, None).await })
        };

        let results = [a.await.unwrap(), b.await.unwrap()];
        let successes = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(successes, 1);

        let failure = results.iter().find_map(|r| r.as_ref().err()).unwrap();
        assert!(matches!(failure, DbError::Domain(CoreError::InsufficientStock { .. })));

        assert_eq!(stock_of(&db, &p.id).await, 0);
        let entries = db.ledger().history(&p.id, 10).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(transaction_count(&db).await, 1);

        db.close().await;
    }
}
