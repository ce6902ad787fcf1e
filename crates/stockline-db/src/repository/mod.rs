//! # Repository Module
//!
//! Database repositories for Stockline POS.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Engine service                                                        │
//! │       │                                                                 │
//! │       │  db.transactions().commit_checkout(&draft, deadline)           │
//! │       ▼                                                                 │
//! │  ┌──────────────────┐  ┌──────────────────┐  ┌─────────────────────┐   │
//! │  │ProductRepository │  │ LedgerRepository │  │TransactionRepository│   │
//! │  │ catalog CRUD     │  │ adjustments      │  │ checkout unit       │   │
//! │  │ low stock        │  │ history          │  │ refund / cancel     │   │
//! │  └────────┬─────────┘  └────────┬─────────┘  │ paginated list      │   │
//! │           │                     │            └──────────┬──────────┘   │
//! │           └──── shared in-transaction helpers ◄─────────┘              │
//! │                 (conditional stock update, ledger append)              │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite Database                                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`ProductRepository`](product::ProductRepository) - Catalog Store
//! - [`LedgerRepository`](ledger::LedgerRepository) - Stock Ledger
//! - [`TransactionRepository`](transaction::TransactionRepository) - Checkout and queries

pub mod ledger;
pub mod product;
pub mod transaction;
