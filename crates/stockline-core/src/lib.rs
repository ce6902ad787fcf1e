//! # stockline-core: Pure Business Logic for Stockline POS
//!
//! This crate is the **heart** of Stockline POS. It contains the checkout
//! and stock rules as pure functions with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Stockline POS Architecture                         │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │     External layers (auth, HTTP, UI) - not in this workspace    │   │
//! │  │          resolve Identity { actor_id, store_id, role }          │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                stockline-engine (services)                      │   │
//! │  │   checkout, record_adjustment, history, list, invoice           │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │              ★ stockline-core (THIS CRATE) ★                    │   │
//! │  │                                                                 │   │
//! │  │   ┌─────────┐ ┌────────┐ ┌─────────┐ ┌────────┐ ┌─────────┐    │   │
//! │  │   │  types  │ │  cart  │ │ pricing │ │ access │ │ invoice │    │   │
//! │  │   │ Product │ │  Cart  │ │ totals  │ │  roles │ │  view   │    │   │
//! │  │   └─────────┘ └────────┘ └─────────┘ └────────┘ └─────────┘    │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                 stockline-db (Database Layer)                   │   │
//! │  │        SQLite queries, migrations, atomic checkout unit         │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (Product, Transaction, StockLedgerEntry, ...)
//! - [`money`] - Money type with integer arithmetic (no floating point!)
//! - [`cart`] - Validated cart input
//! - [`pricing`] - Subtotal, tax, discount and total computation
//! - [`access`] - Identity assertion and role/store-scope checks
//! - [`invoice`] - Printable invoice projection
//! - [`ledger`] - Point-in-time stock and ledger chain audit
//! - [`error`] - Domain error types
//! - [`validation`] - Business rule validation
//!
//! ## Example Usage
//!
//! ```rust
//! use stockline_core::money::Money;
//! use stockline_core::types::TaxRate;
//!
//! let price = Money::from_cents(1000); // $10.00
//! let tax = price.calculate_tax(TaxRate::from_bps(1000)); // 10%
//! assert_eq!(tax.cents(), 100);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod access;
pub mod cart;
pub mod error;
pub mod invoice;
pub mod ledger;
pub mod money;
pub mod pricing;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use access::{Identity, Role};
pub use cart::{Cart, CartLine};
pub use error::{CoreError, CoreResult, ValidationError};
pub use ledger::{LedgerAudit, LedgerBreak};
pub use money::Money;
pub use pricing::{PricedCart, PricedLine};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum distinct products allowed in a single cart.
pub const MAX_CART_ITEMS: usize = 100;

/// Maximum quantity of a single product in a cart.
///
/// Guards against typing 1000 instead of 10 at the register.
pub const MAX_ITEM_QUANTITY: i64 = 999;

/// Highest unit price a product may carry: $1,000,000,000.00.
///
/// With at most `MAX_CART_ITEMS` lines of `MAX_ITEM_QUANTITY` units, every
/// cart total stays far inside `i64` cents.
pub const MAX_PRICE_CENTS: i64 = 100_000_000_000;

/// Upper bound for `history` page sizes.
pub const MAX_HISTORY_LIMIT: u32 = 500;

/// Prefix of every human-readable transaction number.
pub const TRANSACTION_NUMBER_PREFIX: &str = "TRX";
