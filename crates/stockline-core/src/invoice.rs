//! # Invoice Projection
//!
//! Read-only view of a completed sale, shaped for printing or PDF
//! rendering by an outer layer.
//!
//! ## Receipt Layout (`render_text(40)`)
//! ```text
//! ┌────────────────────────────────────────┐
//! │              Corner Market             │
//! │            12 Harbour Road             │
//! │                                        │
//! │ Invoice: TRX-20240301-000042           │
//! │ Date:    2024-03-01 14:05 UTC          │
//! │ Cashier: Dana                          │
//! │ ────────────────────────────────────── │
//! │ Cola 330ml                             │
//! │   3 x $10.00                    $30.00 │
//! │ ────────────────────────────────────── │
//! │ Subtotal                        $30.00 │
//! │ Tax                              $3.00 │
//! │ TOTAL                           $33.00 │
//! │ Paid by cash                           │
//! │                                        │
//! │ STOCKLINE|TRX-2024...|33.00|...|9f2c.. │
//! └────────────────────────────────────────┘
//! ```
//!
//! ## Code Payload
//! `STOCKLINE|<number>|<total>|<issued_at RFC3339>|<checksum>`, where the
//! checksum is the first 16 hex digits of SHA-256 over everything before
//! the last `|`. A scanner can recompute it to reject hand-edited codes.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use ts_rs::TS;

use crate::money::Money;
use crate::types::{PaymentMethod, TransactionDetail, TransactionStatus};

/// Leading tag of every invoice code.
pub const INVOICE_CODE_PREFIX: &str = "STOCKLINE";

/// Narrowest receipt `render_text` will produce.
pub const MIN_RECEIPT_WIDTH: usize = 32;

/// Store header printed on invoices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct StoreProfile {
    pub store_id: String,
    pub name: String,
    pub address: Option<String>,
}

impl StoreProfile {
    /// Profile for a store with no configured details.
    pub fn fallback(store_id: impl Into<String>) -> Self {
        let store_id = store_id.into();
        StoreProfile {
            name: store_id.clone(),
            store_id,
            address: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct InvoiceLine {
    pub line_no: i64,
    pub sku: String,
    pub name: String,
    pub quantity: i64,
    pub unit_price: Money,
    pub subtotal: Money,
    pub tax: Money,
    pub discount: Money,
    pub total: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct InvoiceData {
    pub invoice_number: String,
    pub transaction_id: String,
    pub store: StoreProfile,
    pub cashier_id: String,
    pub cashier_name: Option<String>,
    pub customer_name: Option<String>,
    #[ts(as = "String")]
    pub issued_at: DateTime<Utc>,
    pub lines: Vec<InvoiceLine>,
    pub subtotal: Money,
    pub tax: Money,
    pub discount: Money,
    pub total: Money,
    pub payment_method: PaymentMethod,
    pub status: TransactionStatus,
    pub notes: Option<String>,
    pub code_payload: String,
}

impl InvoiceData {
    /// Builds the invoice for a persisted transaction.
    pub fn from_detail(detail: &TransactionDetail, store: StoreProfile) -> Self {
        let tx = &detail.transaction;

        let lines = detail
            .items
            .iter()
            .map(|item| InvoiceLine {
                line_no: item.line_no,
                sku: item.sku_snapshot.clone(),
                name: item.name_snapshot.clone(),
                quantity: item.quantity,
                unit_price: item.unit_price(),
                subtotal: Money::from_cents(item.subtotal_cents),
                tax: Money::from_cents(item.tax_cents),
                discount: Money::from_cents(item.discount_cents),
                total: item.total(),
            })
            .collect();

        InvoiceData {
            invoice_number: tx.transaction_number.clone(),
            transaction_id: tx.id.clone(),
            store,
            cashier_id: tx.cashier_id.clone(),
            cashier_name: tx.cashier_name.clone(),
            customer_name: tx.customer_name.clone(),
            issued_at: tx.created_at,
            lines,
            subtotal: Money::from_cents(tx.subtotal_cents),
            tax: Money::from_cents(tx.tax_cents),
            discount: Money::from_cents(tx.discount_cents),
            total: tx.total(),
            payment_method: tx.payment_method,
            status: tx.status,
            notes: tx.notes.clone(),
            code_payload: code_payload(&tx.transaction_number, tx.total(), tx.created_at),
        }
    }

    /// Fixed-width plain-text receipt. Widths below 32 are raised to 32.
    pub fn render_text(&self, width: usize) -> String {
        let width = width.max(MIN_RECEIPT_WIDTH);
        let rule = "-".repeat(width);
        let mut out = Vec::new();

        out.push(center(&self.store.name, width));
        if let Some(address) = &self.store.address {
            out.push(center(address, width));
        }
        out.push(String::new());

        out.push(format!("Invoice: {}", self.invoice_number));
        out.push(format!("Date:    {}", self.issued_at.format("%Y-%m-%d %H:%M UTC")));
        out.push(format!(
            "Cashier: {}",
            self.cashier_name.as_deref().unwrap_or(&self.cashier_id)
        ));
        if let Some(customer) = &self.customer_name {
            out.push(format!("Customer: {}", customer));
        }
        if self.status != TransactionStatus::Completed {
            out.push(format!("Status:  {}", self.status.as_str().to_uppercase()));
        }
        out.push(rule.clone());

        for line in &self.lines {
            out.push(truncate(&line.name, width));
            out.push(two_columns(
                &format!("  {} x {}", line.quantity, line.unit_price),
                &line.subtotal.to_string(),
                width,
            ));
        }
        out.push(rule);

        out.push(two_columns("Subtotal", &self.subtotal.to_string(), width));
        if !self.discount.is_zero() {
            out.push(two_columns("Discount", &format!("-{}", self.discount), width));
        }
        out.push(two_columns("Tax", &self.tax.to_string(), width));
        out.push(two_columns("TOTAL", &self.total.to_string(), width));
        out.push(format!("Paid by {}", self.payment_method));
        out.push(String::new());
        out.push(truncate(&self.code_payload, width));

        let mut text = out.join("\n");
        text.push('\n');
        text
    }
}

/// Builds the scannable code for an invoice.
pub fn code_payload(number: &str, total: Money, issued_at: DateTime<Utc>) -> String {
    let body = format!(
        "{}|{}|{}|{}",
        INVOICE_CODE_PREFIX,
        number,
        total.to_decimal_string(),
        issued_at.to_rfc3339_opts(SecondsFormat::Secs, true)
    );
    let checksum = checksum(&body);
    format!("{}|{}", body, checksum)
}

/// Checks that a scanned payload carries a matching checksum.
pub fn verify_code_payload(payload: &str) -> bool {
    match payload.rsplit_once('|') {
        Some((body, sum)) => body.starts_with(INVOICE_CODE_PREFIX) && checksum(body) == sum,
        None => false,
    }
}

fn checksum(body: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(body.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    digest[..16].to_string()
}

fn center(text: &str, width: usize) -> String {
    let text = truncate(text, width);
    let pad = (width - text.chars().count()) / 2;
    format!("{}{}", " ".repeat(pad), text)
}

fn truncate(text: &str, width: usize) -> String {
    text.chars().take(width).collect()
}

fn two_columns(left: &str, right: &str, width: usize) -> String {
    let right_len = right.chars().count();
    let left = truncate(left, width.saturating_sub(right_len + 1));
    let gap = width.saturating_sub(left.chars().count() + right_len);
    format!("{}{}{}", left, " ".repeat(gap), right)
}

// =============================================================================
// Unit Tests
// =============================================================================
