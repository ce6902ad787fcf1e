//! # Invoice Generator
//!
//! Printable invoice view of a persisted transaction. Pure derivation: the
//! transaction is read, never written.

use std::sync::Arc;
use tracing::debug;

use crate::config::StocklineConfig;
use crate::error::ServiceResult;
use stockline_core::invoice::InvoiceData;
use stockline_core::{CoreError, Identity};
use stockline_db::Database;

#[derive(Debug, Clone)]
pub struct InvoiceService {
    db: Database,
    config: Arc<StocklineConfig>,
}

impl InvoiceService {
    pub fn new(db: Database, config: Arc<StocklineConfig>) -> Self {
        InvoiceService { db, config }
    }

    /// Invoice view with the store header from configuration.
    ///
    /// Only the caller's own store's transactions are visible.
    pub async fn generate_invoice_view(
        &self,
        identity: &Identity,
        transaction_id: &str,
    ) -> ServiceResult<InvoiceData> {
        identity.authorize_read(&identity.store_id)?;

        let detail = self
            .db
            .transactions()
            .get_detail(&identity.store_id, transaction_id)
            .await?
            .ok_or_else(|| CoreError::TransactionNotFound(transaction_id.to_string()))?;

        let store = self.config.store_profile(&detail.transaction.store_id);
        let invoice = InvoiceData::from_detail(&detail, store);

        debug!(
            invoice_number = %invoice.invoice_number,
            lines = invoice.lines.len(),
            "Invoice view generated"
        );

        Ok(invoice)
    }
}

#[cfg(test)]
mod tests {
    use crate::error::ErrorKind;
    use crate::services::CheckoutRequest;
    use crate::test_support::*;
    use crate::StocklineConfig;
    use stockline_core::invoice::verify_code_payload;
    use stockline_core::{Cart, CartLine, Identity, PaymentMethod};

    #[tokio::test]
    async fn test_invoice_mirrors_transaction() {
        let mut config = StocklineConfig::in_memory();
        config.stores = vec![crate::config::StoreSettings {
            id: STORE.to_string(),
            name: "Downtown".to_string(),
            address: Some("12 Market Street".to_string()),
            tax_rate_bps: Some(1000),
        }];
        let engine = crate::Stockline::open(config).await.unwrap();
        let p = add_product(&engine, STORE, "TEA", 450, 10).await;

        let cart = Cart::new(vec![CartLine::new(&p.id, 2)]).unwrap();
        let detail = engine
            .checkout()
            .checkout(
                &cashier().with_display_name("Sam"),
                CheckoutRequest::new(STORE, cart, PaymentMethod::Card),
            )
            .await
            .unwrap();

        let invoice = engine
            .invoice()
            .generate_invoice_view(&cashier(), &detail.transaction.id)
            .await
            .unwrap();

        assert_eq!(invoice.invoice_number, detail.transaction.transaction_number);
        assert_eq!(invoice.store.name, "Downtown");
        assert_eq!(invoice.cashier_name.as_deref(), Some("Sam"));
        assert_eq!(invoice.subtotal.cents(), 900);
        assert_eq!(invoice.tax.cents(), 90);
        assert_eq!(invoice.total.cents(), 990);
        assert_eq!(invoice.lines.len(), 1);
        assert!(verify_code_payload(&invoice.code_payload));

        let receipt = invoice.render_text(40);
        assert!(receipt.contains("Downtown"));
        assert!(receipt.contains(&invoice.invoice_number));
    }

    #[tokio::test]
    async fn test_unknown_store_uses_fallback_header() {
        let engine = engine().await;
        let p = add_product(&engine, STORE, "TEA", 450, 10).await;
        let cart = Cart::new(vec![CartLine::new(&p.id, 1)]).unwrap();
        let detail = engine
            .checkout()
            .checkout(&cashier(), CheckoutRequest::new(STORE, cart, PaymentMethod::Cash))
            .await
            .unwrap();

        let invoice = engine
            .invoice()
            .generate_invoice_view(&admin(), &detail.transaction.id)
            .await
            .unwrap();
        assert_eq!(invoice.store.store_id, STORE);
        assert!(invoice.store.address.is_none());
    }

    #[tokio::test]
    async fn test_unknown_transaction() {
        let engine = engine().await;
        let err = engine
            .invoice()
            .generate_invoice_view(&cashier(), "missing")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TransactionNotFound);
    }

    #[tokio::test]
    async fn test_other_store_sees_not_found() {
        let engine = engine().await;
        let p = add_product(&engine, STORE, "TEA", 450, 10).await;
        let cart = Cart::new(vec![CartLine::new(&p.id, 1)]).unwrap();
        let detail = engine
            .checkout()
            .checkout(&cashier(), CheckoutRequest::new(STORE, cart, PaymentMethod::Cash))
            .await
            .unwrap();

        let err = engine
            .invoice()
            .generate_invoice_view(&Identity::cashier("c-9", OTHER_STORE), &detail.transaction.id)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TransactionNotFound);
    }
}
