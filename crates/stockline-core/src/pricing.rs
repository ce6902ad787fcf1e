//! # Pricing
//!
//! Turns resolved cart lines into the exact amounts that get persisted.
//!
//! ## Calculation Order
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  per line i:                                                            │
//! │    subtotal_i = unit_price_i × qty_i                                    │
//! │    tax_i      = round_half_up(subtotal_i × rate)                        │
//! │                                                                         │
//! │  order:                                                                 │
//! │    subtotal   = Σ subtotal_i                                            │
//! │    tax        = Σ tax_i                                                 │
//! │    discount   = amount  |  round_half_up(subtotal × pct)                │
//! │    discount_i = floor(discount × subtotal_i / subtotal)                 │
//! │                 + 1 cent to the largest remainders until Σ = discount   │
//! │                                                                         │
//! │    total      = subtotal + tax − discount      (exact, to the cent)    │
//! │    total_i    = subtotal_i + tax_i − discount_i,  Σ total_i = total    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Tax is charged on the pre-discount subtotal. Every sum above is computed
//! from the per-line values, so header and line items can never disagree.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::types::{Discount, TaxRate};

/// A cart line with its product resolved and its price snapshotted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceLine {
    pub product_id: String,
    pub sku: String,
    pub name: String,
    pub unit_price: Money,
    pub quantity: i64,
}

/// One priced line, ready to become a `transaction_items` row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PricedLine {
    pub product_id: String,
    pub sku: String,
    pub name: String,
    pub quantity: i64,
    pub unit_price: Money,
    pub subtotal: Money,
    pub tax: Money,
    pub discount: Money,
    pub total: Money,
}

/// Priced cart: lines plus order totals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PricedCart {
    pub lines: Vec<PricedLine>,
    pub subtotal: Money,
    pub tax: Money,
    pub discount: Money,
    pub total: Money,
}

/// Prices `lines` at `tax_rate`, applying an optional order discount.
///
/// ## Errors
/// - `InvalidCart` if there are no lines, or if an amount would overflow
/// - `InvalidDiscount` if the discount is negative, above 100%, or larger
///   than the subtotal
///
/// ## Example
/// ```rust
/// use stockline_core::money::Money;
/// use stockline_core::pricing::{price_lines, PriceLine};
/// use stockline_core::types::TaxRate;
///
/// let lines = vec![PriceLine {
///     product_id: "p".into(),
///     sku: "P".into(),
///     name: "Product".into(),
///     unit_price: Money::from_cents(1000),
///     quantity: 3,
/// }];
/// let priced = price_lines(&lines, TaxRate::from_bps(1000), None).unwrap();
/// assert_eq!(priced.subtotal.cents(), 3000);
/// assert_eq!(priced.tax.cents(), 300);
/// assert_eq!(priced.total.cents(), 3300);
/// ```
pub fn price_lines(
    lines: &[PriceLine],
    tax_rate: TaxRate,
    discount: Option<Discount>,
) -> CoreResult<PricedCart> {
    if lines.is_empty() {
        return Err(CoreError::invalid_cart("cart is empty"));
    }

    let subtotals = lines
        .iter()
        .map(|l| l.unit_price.checked_multiply_quantity(l.quantity).ok_or_else(overflow))
        .collect::<CoreResult<Vec<Money>>>()?;
    let subtotal = Money::checked_sum(subtotals.iter().copied()).ok_or_else(overflow)?;

    let discount = resolve_discount(discount, subtotal)?;
    let shares = allocate(discount, subtotal, &subtotals);

    let mut priced = Vec::with_capacity(lines.len());
    for (line, (&line_subtotal, line_discount)) in lines.iter().zip(subtotals.iter().zip(shares)) {
        let line_tax = line_subtotal.calculate_tax(tax_rate);
        let line_total = line_subtotal
            .checked_add(line_tax)
            .and_then(|m| m.checked_sub(line_discount))
            .ok_or_else(overflow)?;

        priced.push(PricedLine {
            product_id: line.product_id.clone(),
            sku: line.sku.clone(),
            name: line.name.clone(),
            quantity: line.quantity,
            unit_price: line.unit_price,
            subtotal: line_subtotal,
            tax: line_tax,
            discount: line_discount,
            total: line_total,
        });
    }

    let tax = Money::checked_sum(priced.iter().map(|l| l.tax)).ok_or_else(overflow)?;
    let total = subtotal
        .checked_add(tax)
        .and_then(|m| m.checked_sub(discount))
        .ok_or_else(overflow)?;

    Ok(PricedCart {
        lines: priced,
        subtotal,
        tax,
        discount,
        total,
    })
}

fn overflow() -> CoreError {
    CoreError::invalid_cart("cart total exceeds the largest representable amount")
}

/// Resolves the requested discount to an amount in `0..=subtotal`.
fn resolve_discount(discount: Option<Discount>, subtotal: Money) -> CoreResult<Money> {
    let amount = match discount {
        None => return Ok(Money::zero()),
        Some(Discount::Amount(amount)) => {
            if amount.is_negative() {
                return Err(CoreError::InvalidDiscount {
                    reason: "discount amount cannot be negative".to_string(),
                });
            }
            amount
        }
        Some(Discount::Percentage(bps)) => {
            if bps > 10000 {
                return Err(CoreError::InvalidDiscount {
                    reason: format!("percentage {} bps exceeds 100%", bps),
                });
            }
            subtotal.percentage(bps)
        }
    };

    if amount > subtotal {
        return Err(CoreError::InvalidDiscount {
            reason: format!("discount {} exceeds subtotal {}", amount, subtotal),
        });
    }

    Ok(amount)
}

/// Splits `discount` across lines in proportion to their subtotals.
///
/// Largest-remainder apportionment: each share is the truncated proportion,
/// then leftover cents go one at a time to the lines with the biggest
/// truncated fraction (earlier lines win ties). No share exceeds its line's
/// subtotal.
fn allocate(discount: Money, whole: Money, subtotals: &[Money]) -> Vec<Money> {
    if discount.is_zero() || whole.is_zero() {
        return vec![Money::zero(); subtotals.len()];
    }

    let mut shares: Vec<Money> = subtotals
        .iter()
        .map(|&part| discount.proportion(part, whole))
        .collect();

    // truncated shares sum to at most `discount`
    let allocated: Money = shares.iter().copied().sum();
    let mut leftover = (discount - allocated).cents();

    let mut by_remainder: Vec<(usize, i128)> = subtotals
        .iter()
        .enumerate()
        .map(|(i, part)| {
            let rem = (discount.cents() as i128 * part.cents() as i128) % whole.cents() as i128;
            (i, rem)
        })
        .collect();
    // stable sort keeps cart order among equal remainders
    by_remainder.sort_by(|a, b| b.1.cmp(&a.1));

    for (i, _) in by_remainder {
        if leftover == 0 {
            break;
        }
        shares[i] += Money::from_cents(1);
        leftover -= 1;
    }

    shares
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn line(id: &str, price: i64, qty: i64) -> PriceLine {
        PriceLine {
            product_id: id.to_string(),
            sku: id.to_uppercase(),
            name: format!("Product {}", id),
            unit_price: Money::from_cents(price),
            quantity: qty,
        }
    }

    fn assert_consistent(priced: &PricedCart) {
        let line_subtotal: Money = priced.lines.iter().map(|l| l.subtotal).sum();
        let line_tax: Money = priced.lines.iter().map(|l| l.tax).sum();
        let line_discount: Money = priced.lines.iter().map(|l| l.discount).sum();
        let line_total: Money = priced.lines.iter().map(|l| l.total).sum();

        assert_eq!(line_subtotal, priced.subtotal);
        assert_eq!(line_tax, priced.tax);
        assert_eq!(line_discount, priced.discount);
        assert_eq!(line_total, priced.total);
        assert_eq!(priced.total, priced.subtotal + priced.tax - priced.discount);
        for l in &priced.lines {
            assert_eq!(Some(l.subtotal), l.unit_price.checked_multiply_quantity(l.quantity));
            assert!(l.discount <= l.subtotal);
        }
    }

    #[test]
    fn test_three_units_at_ten_dollars() {
        let priced = price_lines(&[line("p", 1000, 3)], TaxRate::zero(), None).unwrap();
        assert_eq!(priced.subtotal.cents(), 3000);
        assert_eq!(priced.total.cents(), 3000);
        assert_consistent(&priced);
    }

    #[test]
    fn test_tax_is_per_line_half_up() {
        // 8.25% of 1000 = 82.5 → 83, of 333 = 27.47 → 27
        let priced = price_lines(
            &[line("a", 1000, 1), line("b", 333, 1)],
            TaxRate::from_bps(825),
            None,
        )
        .unwrap();
        assert_eq!(priced.lines[0].tax.cents(), 83);
        assert_eq!(priced.lines[1].tax.cents(), 27);
        assert_eq!(priced.tax.cents(), 110);
        assert_consistent(&priced);
    }

    #[test]
    fn test_amount_discount_is_apportioned_exactly() {
        let priced = price_lines(
            &[line("a", 1000, 1), line("b", 1000, 1), line("c", 1000, 1)],
            TaxRate::from_bps(1000),
            Some(Discount::Amount(Money::from_cents(100))),
        )
        .unwrap();

        let shares: Vec<i64> = priced.lines.iter().map(|l| l.discount.cents()).collect();
        assert_eq!(shares, vec![34, 33, 33]);
        assert_eq!(priced.total.cents(), 3000 + 300 - 100);
        assert_consistent(&priced);
    }

    #[test]
    fn test_percentage_discount() {
        let priced = price_lines(
            &[line("a", 2500, 2), line("b", 999, 1)],
            TaxRate::from_bps(700),
            Some(Discount::Percentage(1500)),
        )
        .unwrap();
        // 15% of 5999 = 899.85 → 900
        assert_eq!(priced.discount.cents(), 900);
        assert_consistent(&priced);
    }

    #[test]
    fn test_discount_shares_never_exceed_line_subtotal() {
        let priced = price_lines(
            &[line("a", 1, 1), line("b", 1, 1), line("c", 1, 1), line("d", 97, 1)],
            TaxRate::zero(),
            Some(Discount::Amount(Money::from_cents(99))),
        )
        .unwrap();
        assert_consistent(&priced);
    }

    #[test]
    fn test_full_discount_on_free_items() {
        let priced = price_lines(
            &[line("a", 0, 2), line("b", 500, 1)],
            TaxRate::zero(),
            Some(Discount::Amount(Money::from_cents(500))),
        )
        .unwrap();
        assert!(priced.lines[0].discount.is_zero());
        assert_eq!(priced.total.cents(), 0);
        assert_consistent(&priced);
    }

    #[test]
    fn test_invalid_discounts() {
        let lines = [line("a", 1000, 1)];
        let too_big = price_lines(&lines, TaxRate::zero(), Some(Discount::Amount(Money::from_cents(1001))));
        assert!(matches!(too_big.unwrap_err(), CoreError::InvalidDiscount { .. }));

        let negative = price_lines(&lines, TaxRate::zero(), Some(Discount::Amount(Money::from_cents(-1))));
        assert!(matches!(negative.unwrap_err(), CoreError::InvalidDiscount { .. }));

        let over_pct = price_lines(&lines, TaxRate::zero(), Some(Discount::Percentage(10001)));
        assert!(matches!(over_pct.unwrap_err(), CoreError::InvalidDiscount { .. }));
    }

    #[test]
    fn test_overflowing_amounts_are_invalid_cart() {
        let huge = line("a", i64::MAX / 2, 3);
        let err = price_lines(&[huge], TaxRate::zero(), None).unwrap_err();
        assert!(matches!(err, CoreError::InvalidCart { .. }));

        let halves = [line("a", i64::MAX / 2 + 1, 1), line("b", i64::MAX / 2 + 1, 1)];
        let err = price_lines(&halves, TaxRate::zero(), None).unwrap_err();
        assert!(matches!(err, CoreError::InvalidCart { .. }));

        let taxed = [line("a", i64::MAX - 10, 1)];
        let err = price_lines(&taxed, TaxRate::from_bps(1000), None).unwrap_err();
        assert!(matches!(err, CoreError::InvalidCart { .. }));
    }

    #[test]
    fn test_largest_allowed_cart_prices_exactly() {
        let lines: Vec<PriceLine> = (0..crate::MAX_CART_ITEMS)
            .map(|i| line(&format!("p{}", i), crate::MAX_PRICE_CENTS, crate::MAX_ITEM_QUANTITY))
            .collect();
        let priced = price_lines(&lines, TaxRate::from_bps(10000), Some(Discount::Percentage(5000))).unwrap();
        assert_consistent(&priced);
    }

    #[test]
    fn test_empty_lines_rejected() {
        assert!(matches!(
            price_lines(&[], TaxRate::zero(), None).unwrap_err(),
            CoreError::InvalidCart { .. }
        ));
    }
}
