//! # Transaction Query Service
//!
//! Filtered, paginated reads over a store's transactions. Reads only.

use std::sync::Arc;

use crate::config::StocklineConfig;
use crate::error::ServiceResult;
use stockline_core::validation::{validate_date_range, validate_page};
use stockline_core::{CoreError, Identity, Page, Transaction, TransactionDetail, TransactionFilter};
use stockline_db::Database;

#[derive(Debug, Clone)]
pub struct QueryService {
    db: Database,
    config: Arc<StocklineConfig>,
}

impl QueryService {
    pub fn new(db: Database, config: Arc<StocklineConfig>) -> Self {
        QueryService { db, config }
    }

    /// One page of `store_id`'s transactions, newest first.
    ///
    /// `page` is 1-based. `page_size` defaults to `query.default_page_size`
    /// and may not exceed `query.max_page_size`. The date range is
    /// half-open: `from <= created_at < to`.
    pub async fn list(
        &self,
        identity: &Identity,
        store_id: &str,
        filter: &TransactionFilter,
        page: u32,
        page_size: Option<u32>,
    ) -> ServiceResult<Page<Transaction>> {
        identity.authorize_read(store_id)?;

        let page_size = page_size.unwrap_or(self.config.query.default_page_size);
        validate_page(page, page_size, self.config.query.max_page_size)?;
        validate_date_range(filter.date_range.from, filter.date_range.to)?;

        Ok(self
            .db
            .transactions()
            .list(store_id, filter, page, page_size)
            .await?)
    }

    /// One transaction of the caller's store with its line items.
    ///
    /// Another store's transaction is `TransactionNotFound`, same as an
    /// unknown id.
    pub async fn get(
        &self,
        identity: &Identity,
        transaction_id: &str,
    ) -> ServiceResult<TransactionDetail> {
        identity.authorize_read(&identity.store_id)?;

        let detail = self
            .db
            .transactions()
            .get_detail(&identity.store_id, transaction_id)
            .await?
            .ok_or_else(|| CoreError::TransactionNotFound(transaction_id.to_string()))?;

        Ok(detail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::services::CheckoutRequest;
    use crate::test_support::*;
    use chrono::{Duration, Utc};
    use stockline_core::{Cart, CartLine, DateRange, PaymentMethod, TransactionStatus};

    async fn sell(engine: &crate::Stockline, who: &Identity, product_id: &str, method: PaymentMethod) -> String {
        let cart = Cart::new(vec![CartLine::new(product_id, 1)]).unwrap();
        engine
            .checkout()
            .checkout(who, CheckoutRequest::new(STORE, cart, method))
            .await
            .unwrap()
            .transaction
            .id
    }

    #[tokio::test]
    async fn test_list_filters_and_pages() {
        let engine = engine().await;
        let p = add_product(&engine, STORE, "P", 100, 50).await;
        let other_cashier = Identity::cashier("cashier-2", STORE);

        let mut ids = Vec::new();
        for i in 0..5 {
            let who = if i % 2 == 0 { cashier() } else { other_cashier.clone() };
            let method = if i < 3 { PaymentMethod::Cash } else { PaymentMethod::Card };
            ids.push(sell(&engine, &who, &p.id, method).await);
        }
        engine.checkout().refund(&admin(), &ids[0], None).await.unwrap();

        let query = engine.query();
        let all = query.list(&admin(), STORE, &TransactionFilter::default(), 1, Some(2)).await.unwrap();
        assert_eq!(all.total, 5);
        assert_eq!(all.items.len(), 2);
        assert_eq!(all.total_pages, 3);
        assert_eq!(all.items[0].id, ids[4]);

        let last = query.list(&admin(), STORE, &TransactionFilter::default(), 3, Some(2)).await.unwrap();
        assert_eq!(last.items.len(), 1);
        assert_eq!(last.items[0].id, ids[0]);

        let by_cashier = TransactionFilter { cashier_id: Some("cashier-2".into()), ..Default::default() };
        assert_eq!(query.list(&admin(), STORE, &by_cashier, 1, None).await.unwrap().total, 2);

        let by_method = TransactionFilter { payment_method: Some(PaymentMethod::Card), ..Default::default() };
        assert_eq!(query.list(&admin(), STORE, &by_method, 1, None).await.unwrap().total, 2);

        let refunded = TransactionFilter { status: Some(TransactionStatus::Refunded), ..Default::default() };
        let page = query.list(&admin(), STORE, &refunded, 1, None).await.unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].id, ids[0]);

        let future = TransactionFilter {
            date_range: DateRange::new(Some(Utc::now() + Duration::hours(1)), None),
            ..Default::default()
        };
        assert_eq!(query.list(&admin(), STORE, &future, 1, None).await.unwrap().total, 0);
    }

    #[tokio::test]
    async fn test_list_rejects_bad_arguments() {
        let engine = engine().await;
        let query = engine.query();
        let none = TransactionFilter::default();

        for (page, size) in [(0, Some(10)), (1, Some(0)), (1, Some(101))] {
            let err = query.list(&admin(), STORE, &none, page, size).await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidInput);
        }

        let now = Utc::now();
        let inverted = TransactionFilter {
            date_range: DateRange::new(Some(now), Some(now - Duration::days(1))),
            ..Default::default()
        };
        let err = query.list(&admin(), STORE, &inverted, 1, None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);

        let err = query
            .list(&Identity::admin("a-9", OTHER_STORE), STORE, &none, 1, None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
    }

    #[tokio::test]
    async fn test_get_detail() {
        let engine = engine().await;
        let p = add_product(&engine, STORE, "P", 100, 5).await;
        let id = sell(&engine, &cashier(), &p.id, PaymentMethod::Cash).await;

        let detail = engine.query().get(&cashier(), &id).await.unwrap();
        assert_eq!(detail.items.len(), 1);
        assert_eq!(detail.items[0].sku_snapshot, "P");

        let err = engine.query().get(&cashier(), "missing").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TransactionNotFound);

        let err = engine
            .query()
            .get(&Identity::cashier("c-9", OTHER_STORE), &id)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TransactionNotFound);
    }

    #[tokio::test]
    async fn test_foreign_and_unknown_ids_look_the_same() {
        let engine = engine().await;
        let p = add_product(&engine, STORE, "P", 100, 5).await;
        let id = sell(&engine, &cashier(), &p.id, PaymentMethod::Cash).await;

        let outsider = Identity::admin("a-9", OTHER_STORE);
        let foreign = engine.query().get(&outsider, &id).await.unwrap_err();
        let unknown = engine.query().get(&outsider, "missing").await.unwrap_err();
        assert_eq!(foreign.kind(), unknown.kind());
        assert_eq!(foreign.kind(), ErrorKind::TransactionNotFound);

        let mut inactive = cashier();
        inactive.active = false;
        for target in [id.as_str(), "missing"] {
            let err = engine.query().get(&inactive, target).await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Unauthorized);
        }
    }
}
