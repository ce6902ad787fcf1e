//! # Cart
//!
//! The validated cart handed to checkout.
//!
//! ## Validation at the Boundary
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Request body                                                           │
//! │    [{"product_id": "a", "quantity": 2},                                 │
//! │     {"product_id": "b", "quantity": 1},                                 │
//! │     {"product_id": "a", "quantity": 1}]                                 │
//! │       │                                                                 │
//! │       ▼  Cart::new / serde(try_from)                                   │
//! │  ├── empty?              → InvalidCart                                 │
//! │  ├── qty <= 0?           → InvalidCart                                 │
//! │  ├── qty > 999?          → QuantityTooLarge   (each line, then merged) │
//! │  ├── duplicates?         → merged into first occurrence                │
//! │  └── > 100 products?     → CartTooLarge                                │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Cart [(a, 3), (b, 1)]   ← order of first appearance is kept           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A `Cart` value can only exist in its validated form, so the checkout
//! engine never re-checks quantities.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::validation::validate_quantity;
use crate::{MAX_CART_ITEMS, MAX_ITEM_QUANTITY};

/// One requested `(product, quantity)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CartLine {
    pub product_id: String,
    pub quantity: i64,
}

impl CartLine {
    pub fn new(product_id: impl Into<String>, quantity: i64) -> Self {
        CartLine {
            product_id: product_id.into(),
            quantity,
        }
    }
}

/// A non-empty, validated, duplicate-free sequence of cart lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<CartLine>", into = "Vec<CartLine>")]
pub struct Cart {
    lines: Vec<CartLine>,
}

impl Cart {
    /// Validates raw lines into a cart.
    ///
    /// Lines for the same product are merged (quantities summed) at the
    /// position of the first occurrence, the way a register bumps the
    /// quantity when an item is scanned twice.
    pub fn new(lines: Vec<CartLine>) -> CoreResult<Self> {
        if lines.is_empty() {
            return Err(CoreError::invalid_cart("cart is empty"));
        }

        let mut merged: Vec<CartLine> = Vec::with_capacity(lines.len());
        for line in lines {
            let product_id = line.product_id.trim();
            if product_id.is_empty() {
                return Err(CoreError::invalid_cart("product_id is required"));
            }
            check_quantity(product_id, line.quantity)?;

            match merged.iter_mut().find(|l| l.product_id == product_id) {
                Some(existing) => {
                    existing.quantity = existing
                        .quantity
                        .checked_add(line.quantity)
                        .ok_or_else(|| {
                            CoreError::invalid_cart(format!("quantity for {} overflows", product_id))
                        })?;
                    check_quantity(product_id, existing.quantity)?;
                }
                None => merged.push(CartLine::new(product_id, line.quantity)),
            }
        }

        if merged.len() > MAX_CART_ITEMS {
            return Err(CoreError::CartTooLarge {
                max: MAX_CART_ITEMS,
            });
        }

        Ok(Cart { lines: merged })
    }

    /// Lines in cart order.
    pub fn lines(&self) -> &[CartLine] {
        &self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// Always false for a validated cart.
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Total units across all lines.
    pub fn total_units(&self) -> i64 {
        self.lines.iter().map(|l| l.quantity).sum()
    }
}

/// Per-line bound, applied to every raw line and again to each merged sum.
fn check_quantity(product_id: &str, quantity: i64) -> CoreResult<()> {
    match validate_quantity(quantity) {
        Ok(()) => Ok(()),
        Err(ValidationError::OutOfRange { .. }) => Err(CoreError::QuantityTooLarge {
            requested: quantity,
            max: MAX_ITEM_QUANTITY,
        }),
        Err(_) => Err(CoreError::invalid_cart(format!(
            "quantity for {} must be positive, got {}",
            product_id, quantity
        ))),
    }
}

impl TryFrom<Vec<CartLine>> for Cart {
    type Error = CoreError;

    fn try_from(lines: Vec<CartLine>) -> Result<Self, Self::Error> {
        Cart::new(lines)
    }
}

impl From<Cart> for Vec<CartLine> {
    fn from(cart: Cart) -> Self {
        cart.lines
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_cart_is_invalid() {
        let err = Cart::new(vec![]).unwrap_err();
        assert!(matches!(err, CoreError::InvalidCart { .. }));
    }

    #[test]
    fn test_non_positive_quantity_is_invalid() {
        assert!(matches!(
            Cart::new(vec![CartLine::new("p", 0)]).unwrap_err(),
            CoreError::InvalidCart { .. }
        ));
        assert!(matches!(
            Cart::new(vec![CartLine::new("p", -2)]).unwrap_err(),
            CoreError::InvalidCart { .. }
        ));
        assert!(matches!(
            Cart::new(vec![CartLine::new("  ", 1)]).unwrap_err(),
            CoreError::InvalidCart { .. }
        ));
    }

    #[test]
    fn test_duplicates_merge_in_first_position() {
        let cart = Cart::new(vec![
            CartLine::new("a", 2),
            CartLine::new("b", 1),
            CartLine::new("a", 1),
        ])
        .unwrap();

        assert_eq!(cart.lines(), &[CartLine::new("a", 3), CartLine::new("b", 1)]);
        assert_eq!(cart.total_units(), 4);
    }

    #[test]
    fn test_quantity_limit_applies_after_merge() {
        let err = Cart::new(vec![CartLine::new("a", 600), CartLine::new("a", 600)]).unwrap_err();
        assert!(matches!(err, CoreError::QuantityTooLarge { requested: 1200, .. }));
    }

    #[test]
    fn test_oversized_line_is_rejected_before_merging() {
        let err = Cart::new(vec![CartLine::new("a", i64::MAX), CartLine::new("a", 1)]).unwrap_err();
        assert!(matches!(err, CoreError::QuantityTooLarge { requested: i64::MAX, .. }));

        let err = Cart::new(vec![CartLine::new("a", 1), CartLine::new("a", i64::MAX)]).unwrap_err();
        assert!(matches!(err, CoreError::QuantityTooLarge { .. }));

        let wrapped = serde_json::json!([
            {"product_id": "a", "quantity": 9223372036854775807i64},
            {"product_id": "a", "quantity": 1}
        ]);
        assert!(serde_json::from_value::<Cart>(wrapped).is_err());
    }

    #[test]
    fn test_too_many_products() {
        let lines = (0..=MAX_CART_ITEMS)
            .map(|i| CartLine::new(format!("p-{}", i), 1))
            .collect();
        assert!(matches!(Cart::new(lines).unwrap_err(), CoreError::CartTooLarge { .. }));
    }

    #[test]
    fn test_deserialize_validates() {
        let cart: Cart =
            serde_json::from_str(r#"[{"product_id":"a","quantity":3}]"#).unwrap();
        assert_eq!(cart.len(), 1);

        assert!(serde_json::from_str::<Cart>("[]").is_err());
        assert!(serde_json::from_str::<Cart>(r#"[{"product_id":"a","quantity":0}]"#).is_err());
    }
}
