//! # Domain Types
//!
//! Core domain types used throughout Stockline POS.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────────┐   │
//! │  │    Product      │   │   Transaction   │   │ StockLedgerEntry    │   │
//! │  │  ─────────────  │   │  ─────────────  │   │ ─────────────────   │   │
//! │  │  id, store_id   │   │  number, status │   │ previous → new      │   │
//! │  │  sku, price     │◄──┤  line items     │   │ change (signed)     │   │
//! │  │  stock_quantity │   │  totals         │──►│ sale|adjust|restock │   │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────────┘   │
//! │                                                                         │
//! │  Store scopes Product and Transaction; cross-store refs are invalid.   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Dual-Key Identity Pattern
//! Every entity has:
//! - `id`: UUID v4 - immutable, used for database relations
//! - Business ID: (sku, transaction_number) - human-readable
//!
//! Ledger entries are the exception: their integer id is the append order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use ts_rs::TS;

use crate::money::Money;

// =============================================================================
// Tax Rate
// =============================================================================

/// Tax rate represented in basis points (bps).
///
/// 1 basis point = 0.01%, so 1000 bps = 10%.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TaxRate(u32);

impl TaxRate {
    /// Creates a tax rate from basis points.
    #[inline]
    pub const fn from_bps(bps: u32) -> Self {
        TaxRate(bps)
    }

    /// Returns the rate in basis points.
    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }

    /// Zero tax rate.
    #[inline]
    pub const fn zero() -> Self {
        TaxRate(0)
    }

    /// Checks if tax rate is zero.
    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

// =============================================================================
// Product
// =============================================================================

/// A product stocked by one store.
///
/// `stock_quantity` is the single source of truth for per-store stock.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Product {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Store that owns this product.
    pub store_id: String,

    /// Stock Keeping Unit, unique within the store.
    pub sku: String,

    /// Display name shown to cashier and on invoices.
    pub name: String,

    /// Price in cents.
    pub price_cents: i64,

    /// Units on hand. Never negative.
    pub stock_quantity: i64,

    /// Reorder threshold.
    pub min_stock_level: i64,

    /// Whether product is sellable (soft delete).
    pub is_active: bool,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,

    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Returns the price as a Money type.
    #[inline]
    pub fn price(&self) -> Money {
        Money::from_cents(self.price_cents)
    }

    /// Checks if `quantity` units can be sold right now.
    pub fn can_sell(&self, quantity: i64) -> bool {
        self.is_active && self.stock_quantity >= quantity
    }
}

/// Input for creating a product.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewProduct {
    pub store_id: String,
    pub sku: String,
    pub name: String,
    pub price_cents: i64,
    /// Opening stock; later changes go through the ledger.
    pub initial_stock: i64,
    #[serde(default)]
    pub min_stock_level: i64,
}

/// Catalog fields an admin may change. Stock only moves through the ledger.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ProductUpdate {
    pub name: Option<String>,
    pub price_cents: Option<i64>,
    pub min_stock_level: Option<i64>,
}

// =============================================================================
// Transaction Status
// =============================================================================

/// The status of a transaction.
///
/// ```text
///   pending ──► completed ──┬──► refunded
///                           └──► cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    /// Not yet settled. Checkout never leaves a transaction here.
    Pending,
    /// Paid and final.
    #[default]
    Completed,
    /// Voided after completion; stock restored.
    Cancelled,
    /// Money returned after completion; stock restored.
    Refunded,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Completed => "completed",
            TransactionStatus::Cancelled => "cancelled",
            TransactionStatus::Refunded => "refunded",
        }
    }

    /// Whether `self → next` is an allowed post-creation transition.
    pub fn can_transition_to(&self, next: TransactionStatus) -> bool {
        matches!(
            (self, next),
            (
                TransactionStatus::Completed,
                TransactionStatus::Refunded | TransactionStatus::Cancelled
            )
        )
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Payment Method
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    Card,
    EWallet,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::Card => "card",
            PaymentMethod::EWallet => "e_wallet",
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Discount
// =============================================================================

/// Order-level discount requested at checkout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Discount {
    /// Fixed amount off the order.
    Amount(Money),
    /// Percentage of the subtotal, in basis points (1000 = 10%).
    Percentage(u32),
}

// =============================================================================
// Transaction
// =============================================================================

/// A persisted sale.
///
/// `total_cents == subtotal_cents + tax_cents - discount_cents` always; the
/// totals are computed from the line items, never taken from the caller.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Transaction {
    pub id: String,
    pub store_id: String,
    /// Human-readable, unique: `TRX-YYYYMMDD-NNNNNN`.
    pub transaction_number: String,
    pub cashier_id: String,
    /// Cashier display name at time of sale (frozen).
    pub cashier_name: Option<String>,
    pub customer_name: Option<String>,
    pub subtotal_cents: i64,
    pub tax_cents: i64,
    pub discount_cents: i64,
    pub total_cents: i64,
    pub payment_method: PaymentMethod,
    pub status: TransactionStatus,
    pub notes: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    #[inline]
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }
}

// =============================================================================
// Transaction Line Item
// =============================================================================

/// A line item in a transaction.
/// Uses snapshot pattern to freeze product data at time of sale.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct TransactionLineItem {
    pub id: String,
    pub transaction_id: String,
    /// Position in the cart, starting at 1.
    pub line_no: i64,
    pub product_id: String,
    /// SKU at time of sale (frozen).
    pub sku_snapshot: String,
    /// Product name at time of sale (frozen).
    pub name_snapshot: String,
    pub quantity: i64,
    /// Unit price in cents at time of sale (frozen).
    pub unit_price_cents: i64,
    /// quantity × unit price.
    pub subtotal_cents: i64,
    pub tax_cents: i64,
    /// This line's share of the order discount.
    pub discount_cents: i64,
    /// subtotal + tax − discount.
    pub total_cents: i64,
}

impl TransactionLineItem {
    #[inline]
    pub fn unit_price(&self) -> Money {
        Money::from_cents(self.unit_price_cents)
    }

    #[inline]
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }
}

/// A transaction with its ordered line items.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TransactionDetail {
    pub transaction: Transaction,
    pub items: Vec<TransactionLineItem>,
}

// =============================================================================
// Stock Ledger
// =============================================================================

/// What caused a stock change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum LedgerEntryType {
    /// Written only by checkout.
    Sale,
    /// Manual correction (count, damage, shrinkage). Either sign.
    Adjustment,
    /// Goods received, or returned through a refund/cancel.
    Restock,
}

impl LedgerEntryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerEntryType::Sale => "sale",
            LedgerEntryType::Adjustment => "adjustment",
            LedgerEntryType::Restock => "restock",
        }
    }
}

impl fmt::Display for LedgerEntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One immutable stock change.
///
/// `new_quantity == previous_quantity + change_quantity`, and `new_quantity`
/// was the product's stock at the moment the entry was written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct StockLedgerEntry {
    /// Append order.
    pub id: i64,
    pub product_id: String,
    pub store_id: String,
    /// Set for sale entries and for refund/cancel restocks.
    pub transaction_id: Option<String>,
    pub entry_type: LedgerEntryType,
    pub previous_quantity: i64,
    pub change_quantity: i64,
    pub new_quantity: i64,
    pub notes: Option<String>,
    pub actor_id: String,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

/// A manual stock change request.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct StockAdjustment {
    pub product_id: String,
    pub change_quantity: i64,
    pub entry_type: LedgerEntryType,
    pub notes: Option<String>,
}

// =============================================================================
// Query Types
// =============================================================================

/// Half-open time window `[from, to)`. Missing bounds are open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct DateRange {
    #[ts(as = "Option<String>")]
    pub from: Option<DateTime<Utc>>,
    #[ts(as = "Option<String>")]
    pub to: Option<DateTime<Utc>>,
}

impl DateRange {
    pub fn new(from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> Self {
        DateRange { from, to }
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.from.map_or(true, |from| at >= from) && self.to.map_or(true, |to| at < to)
    }
}

/// Filters for listing transactions.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TransactionFilter {
    #[serde(default)]
    pub date_range: DateRange,
    pub cashier_id: Option<String>,
    pub payment_method: Option<PaymentMethod>,
    pub status: Option<TransactionStatus>,
}

/// One page of results plus the totals needed to render a pager.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: u32,
    pub page_size: u32,
    pub total_pages: u32,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total: i64, page: u32, page_size: u32) -> Self {
        let total_pages = if page_size == 0 {
            0
        } else {
            ((total.max(0) as u64 + page_size as u64 - 1) / page_size as u64) as u32
        };
        Page {
            items,
            total,
            page,
            page_size,
            total_pages,
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_tax_rate_from_bps() {
        let rate = TaxRate::from_bps(1000);
        assert_eq!(rate.bps(), 1000);
        assert!(TaxRate::default().is_zero());
    }

    #[test]
    fn test_status_transitions() {
        use TransactionStatus::*;
        assert!(Completed.can_transition_to(Refunded));
        assert!(Completed.can_transition_to(Cancelled));
        assert!(!Refunded.can_transition_to(Cancelled));
        assert!(!Cancelled.can_transition_to(Refunded));
        assert!(!Pending.can_transition_to(Refunded));
        assert!(!Completed.can_transition_to(Pending));
    }

    #[test]
    fn test_enum_wire_names() {
        assert_eq!(serde_json::to_string(&PaymentMethod::EWallet).unwrap(), "\"e_wallet\"");
        assert_eq!(serde_json::to_string(&LedgerEntryType::Restock).unwrap(), "\"restock\"");
        let discount: Discount = serde_json::from_str(r#"{"type":"percentage","value":1000}"#).unwrap();
        assert_eq!(discount, Discount::Percentage(1000));
    }

    #[test]
    fn test_date_range_is_half_open() {
        let now = Utc::now();
        let range = DateRange::new(Some(now), Some(now + Duration::hours(1)));
        assert!(range.contains(now));
        assert!(!range.contains(now + Duration::hours(1)));
        assert!(DateRange::default().contains(now));
    }

    #[test]
    fn test_page_counts() {
        let page: Page<u8> = Page::new(vec![], 0, 1, 20);
        assert_eq!(page.total_pages, 0);
        let page: Page<u8> = Page::new(vec![], 41, 1, 20);
        assert_eq!(page.total_pages, 3);
        let page: Page<u8> = Page::new(vec![], 40, 2, 20);
        assert_eq!(page.total_pages, 2);
    }
}
