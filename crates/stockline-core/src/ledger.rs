//! # Ledger Reconstruction
//!
//! Pure functions over a product's stock ledger, oldest entry first.
//!
//! ```text
//!   id  type        prev  change  new
//!   1   restock        0    +10    10
//!   2   sale          10     -3     7   ◄── quantity_at(t2) = 7
//!   3   adjustment     7     -1     6
//!                                   └──── must equal products.stock_quantity
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::types::StockLedgerEntry;

/// Stock on hand at `at`, reconstructed from `entries` (ascending id).
///
/// - the `new_quantity` of the last entry created at or before `at`
/// - the first entry's `previous_quantity` when every entry is later
/// - `current_stock` when there are no entries
pub fn quantity_at(entries: &[StockLedgerEntry], at: DateTime<Utc>, current_stock: i64) -> i64 {
    match entries.iter().rev().find(|e| e.created_at <= at) {
        Some(entry) => entry.new_quantity,
        None => entries
            .first()
            .map_or(current_stock, |first| first.previous_quantity),
    }
}

/// What is wrong at one ledger position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LedgerBreak {
    /// `previous + change != new` within one entry.
    Arithmetic { entry_id: i64 },
    /// An entry does not start where its predecessor ended.
    Gap {
        entry_id: i64,
        expected_previous: i64,
        actual_previous: i64,
    },
    /// The last entry disagrees with the product's stock.
    StockMismatch { ledger_quantity: i64, stock_quantity: i64 },
}

/// Result of walking a product's ledger chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct LedgerAudit {
    pub product_id: String,
    pub entries_checked: usize,
    /// Stock implied by the opening quantity plus every change.
    pub ledger_quantity: i64,
    pub stock_quantity: i64,
    pub breaks: Vec<LedgerBreak>,
}

impl LedgerAudit {
    pub fn is_consistent(&self) -> bool {
        self.breaks.is_empty()
    }
}

/// Verifies `entries` (ascending id) against `stock_quantity`.
pub fn audit(product_id: &str, entries: &[StockLedgerEntry], stock_quantity: i64) -> LedgerAudit {
    let mut breaks = Vec::new();
    let mut expected_previous: Option<i64> = None;

    for entry in entries {
        if entry.previous_quantity + entry.change_quantity != entry.new_quantity {
            breaks.push(LedgerBreak::Arithmetic { entry_id: entry.id });
        }
        if let Some(expected) = expected_previous {
            if entry.previous_quantity != expected {
                breaks.push(LedgerBreak::Gap {
                    entry_id: entry.id,
                    expected_previous: expected,
                    actual_previous: entry.previous_quantity,
                });
            }
        }
        expected_previous = Some(entry.new_quantity);
    }

    let ledger_quantity = match entries.first() {
        Some(first) => {
            first.previous_quantity + entries.iter().map(|e| e.change_quantity).sum::<i64>()
        }
        None => stock_quantity,
    };

    if let Some(last) = entries.last() {
        if last.new_quantity != stock_quantity {
            breaks.push(LedgerBreak::StockMismatch {
                ledger_quantity: last.new_quantity,
                stock_quantity,
            });
        }
    }

    LedgerAudit {
        product_id: product_id.to_string(),
        entries_checked: entries.len(),
        ledger_quantity,
        stock_quantity,
        breaks,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
