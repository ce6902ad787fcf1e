//! # Checkout Engine
//!
//! The only path that sells stock.
//!
//! ## Checkout Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    checkout(identity, request)                          │
//! │                                                                         │
//! │  authorize_sale(store) ─────────────────────────────► Unauthorized     │
//! │       │                                                                 │
//! │       ▼            (bounded by the checkout deadline)                  │
//! │  resolve every line ─── missing / inactive ─────────► ProductNotFound  │
//! │       │            └─── other store ────────────────► CrossStoreRef    │
//! │       ▼                                                                 │
//! │  stock pre-check ─────── short ─────────────────────► InsufficientStock│
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  price pre-check ─────── discount > subtotal ───────► InvalidCart      │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  TransactionRepository::commit_checkout                                │
//! │       BEGIN                                                            │
//! │       UPDATE products SET stock = stock - q WHERE stock >= q  (× lines)│
//! │       INSERT transactions, transaction_items, stock_ledger             │
//! │       deadline passed? ─── ROLLBACK ────────────────► Timeout          │
//! │       COMMIT  (or nothing: race lost ───────────────► InsufficientStock)│
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  warn! for lines left at or below their minimum level                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The pre-checks give precise errors without taking the write lock. The
//! conditional update inside the unit is what actually decides.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::StocklineConfig;
use crate::error::ServiceResult;
use crate::services::Deadline;
use std::sync::Arc;
use stockline_core::pricing::{price_lines, PriceLine};
use stockline_core::validation::{validate_id, validate_notes};
use stockline_core::{
    Cart, CoreError, Discount, Identity, PaymentMethod, Product, Transaction, TransactionDetail,
    TransactionStatus,
};
use stockline_db::{CheckoutDraft, Database};

/// What the caller submits to sell a cart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutRequest {
    pub store_id: String,
    pub cart: Cart,
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub discount: Option<Discount>,
    #[serde(default)]
    pub customer_name: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl CheckoutRequest {
    pub fn new(store_id: impl Into<String>, cart: Cart, payment_method: PaymentMethod) -> Self {
        CheckoutRequest {
            store_id: store_id.into(),
            cart,
            payment_method,
            discount: None,
            customer_name: None,
            notes: None,
        }
    }

    pub fn with_discount(mut self, discount: Discount) -> Self {
        self.discount = Some(discount);
        self
    }

    pub fn with_customer(mut self, name: impl Into<String>) -> Self {
        self.customer_name = Some(name.into());
        self
    }
}

/// Checkout, refund and cancel.
#[derive(Debug, Clone)]
pub struct CheckoutService {
    db: Database,
    config: Arc<StocklineConfig>,
}

impl CheckoutService {
    pub fn new(db: Database, config: Arc<StocklineConfig>) -> Self {
        CheckoutService { db, config }
    }

    /// Sells `request.cart` as one atomic unit.
    ///
    /// ## Errors
    /// `InvalidCart`, `ProductNotFound`, `CrossStoreReference`,
    /// `InsufficientStock`, `Unauthorized`, `Timeout`, `PersistenceFailure`.
    /// On any error nothing was written.
    pub async fn checkout(
        &self,
        identity: &Identity,
        request: CheckoutRequest,
    ) -> ServiceResult<TransactionDetail> {
        identity.authorize_sale(&request.store_id)?;
        validate_notes("customer_name", request.customer_name.as_deref())?;
        validate_notes("notes", request.notes.as_deref())?;

        let deadline = Deadline::start("checkout", self.config.checkout.timeout());
        self.run_checkout(identity, request, deadline).await
    }

    async fn run_checkout(
        &self,
        identity: &Identity,
        request: CheckoutRequest,
        deadline: Deadline,
    ) -> ServiceResult<TransactionDetail> {
        debug!(
            store_id = %request.store_id,
            lines = request.cart.len(),
            units = request.cart.total_units(),
            "Checkout requested"
        );

        let products = deadline.run(self.resolve(&request)).await?;

        for (line, product) in request.cart.lines().iter().zip(&products) {
            if !product.can_sell(line.quantity) {
                return Err(CoreError::InsufficientStock {
                    product_id: product.id.clone(),
                    sku: product.sku.clone(),
                    available: product.stock_quantity,
                    requested: line.quantity,
                }
                .into());
            }
        }

        let tax_rate = self.config.tax_rate_for(&request.store_id);
        let preview: Vec<PriceLine> = request
            .cart
            .lines()
            .iter()
            .zip(&products)
            .map(|(line, product)| PriceLine {
                product_id: product.id.clone(),
                sku: product.sku.clone(),
                name: product.name.clone(),
                unit_price: product.price(),
                quantity: line.quantity,
            })
            .collect();
        price_lines(&preview, tax_rate, request.discount)?;

        let draft = CheckoutDraft {
            store_id: request.store_id,
            cashier_id: identity.actor_id.clone(),
            cashier_name: identity.display_name.clone(),
            customer_name: request.customer_name,
            cart: request.cart,
            payment_method: request.payment_method,
            discount: request.discount,
            tax_rate,
            notes: request.notes,
        };

        let committed =
            deadline.settle(self.db.transactions().commit_checkout(&draft, deadline.at()).await)?;

        for alert in &committed.low_stock {
            warn!(
                product_id = %alert.product_id,
                sku = %alert.sku,
                stock = alert.stock_quantity,
                min_stock_level = alert.min_stock_level,
                "Product at or below minimum stock level"
            );
        }

        info!(
            transaction_number = %committed.detail.transaction.transaction_number,
            cashier_id = %identity.actor_id,
            total_cents = committed.detail.transaction.total_cents,
            "Sale completed"
        );

        Ok(committed.detail)
    }

    /// Looks up every cart line before anything else is judged.
    async fn resolve(&self, request: &CheckoutRequest) -> ServiceResult<Vec<Product>> {
        let repo = self.db.products();
        let mut products = Vec::with_capacity(request.cart.len());

        for line in request.cart.lines() {
            validate_id("product_id", &line.product_id)?;

            let product = repo
                .get_by_id(&line.product_id)
                .await?
                .ok_or_else(|| CoreError::ProductNotFound(line.product_id.clone()))?;

            if product.store_id != request.store_id {
                return Err(CoreError::cross_store(&product.id, &request.store_id).into());
            }
            if !product.is_active {
                return Err(CoreError::ProductInactive(product.id).into());
            }

            products.push(product);
        }

        Ok(products)
    }

    /// Refunds a completed sale and puts its items back in stock.
    pub async fn refund(
        &self,
        identity: &Identity,
        transaction_id: &str,
        reason: Option<&str>,
    ) -> ServiceResult<Transaction> {
        self.reverse("refund", identity, transaction_id, TransactionStatus::Refunded, reason)
            .await
    }

    /// Cancels a completed sale and puts its items back in stock.
    pub async fn cancel(
        &self,
        identity: &Identity,
        transaction_id: &str,
        reason: Option<&str>,
    ) -> ServiceResult<Transaction> {
        self.reverse("cancel", identity, transaction_id, TransactionStatus::Cancelled, reason)
            .await
    }

    async fn reverse(
        &self,
        operation: &'static str,
        identity: &Identity,
        transaction_id: &str,
        status: TransactionStatus,
        reason: Option<&str>,
    ) -> ServiceResult<Transaction> {
        validate_notes("reason", reason)?;

        identity.authorize_admin(&identity.store_id)?;

        let deadline = Deadline::start(operation, self.config.checkout.timeout());
        let repo = self.db.transactions();

        // another store's sale is indistinguishable from a missing one
        deadline
            .run(async { Ok(repo.get(&identity.store_id, transaction_id).await?) })
            .await?
            .ok_or_else(|| CoreError::TransactionNotFound(transaction_id.to_string()))?;

        let reversal = deadline.settle(
            repo.reverse(transaction_id, status, &identity.actor_id, reason, deadline.at())
                .await,
        )?;
        Ok(reversal.transaction)
    }
}
