//! # stockline-engine: Checkout Engine and Services
//!
//! The process-facing layer of Stockline POS. An outer adapter (HTTP,
//! desktop shell, CLI) resolves who the caller is and hands the engine an
//! [`Identity`](stockline_core::Identity); the engine enforces store scope,
//! roles, time bounds and the error taxonomy.
//!
//! ## Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  StocklineConfig::load(path)                                           │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Stockline::open(config) ──► Database::new (pool + migrations, once)   │
//! │       │                                                                 │
//! │       │  every service holds a clone of the same Database              │
//! │       ├── catalog()   CatalogService                                   │
//! │       ├── checkout()  CheckoutService                                  │
//! │       ├── ledger()    LedgerService                                    │
//! │       ├── query()     QueryService                                     │
//! │       └── invoice()   InvoiceService                                   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Stockline::shutdown() ──► pool closed                                 │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust,ignore
//! use stockline_core::{Cart, CartLine, Identity, PaymentMethod};
//! use stockline_engine::{CheckoutRequest, Stockline, StocklineConfig};
//!
//! let engine = Stockline::open(StocklineConfig::load(None)?).await?;
//! let cashier = Identity::cashier("u-17", "store-downtown");
//! let cart = Cart::new(vec![CartLine::new(product_id, 3)])?;
//!
//! let sale = engine
//!     .checkout()
//!     .checkout(&cashier, CheckoutRequest::new("store-downtown", cart, PaymentMethod::Cash))
//!     .await?;
//! println!("{}", sale.transaction.transaction_number);
//!
//! engine.shutdown().await;
//! ```

pub mod config;
pub mod error;
pub mod services;

pub use config::{ConfigError, StocklineConfig};
pub use error::{ErrorKind, ErrorPayload, ServiceError, ServiceResult};
pub use services::{
    CatalogService, CheckoutRequest, CheckoutService, InvoiceService, LedgerService, QueryService,
};

use std::sync::Arc;
use tracing::info;

use stockline_db::Database;

/// Process-wide engine handle. Cheap to clone; clones share one pool.
#[derive(Debug, Clone)]
pub struct Stockline {
    db: Database,
    config: Arc<StocklineConfig>,
    catalog: CatalogService,
    checkout: CheckoutService,
    ledger: LedgerService,
    query: QueryService,
    invoice: InvoiceService,
}

impl Stockline {
    /// Opens the database (running migrations) and wires the services.
    pub async fn open(config: StocklineConfig) -> ServiceResult<Self> {
        let db = Database::new(config.db_config()).await?;
        let config = Arc::new(config);

        info!(
            path = %config.database.path.display(),
            stores = config.stores.len(),
            checkout_timeout_ms = config.checkout.timeout_ms,
            "Stockline engine ready"
        );

        Ok(Stockline {
            catalog: CatalogService::new(db.clone()),
            checkout: CheckoutService::new(db.clone(), config.clone()),
            ledger: LedgerService::new(db.clone(), config.clone()),
            query: QueryService::new(db.clone(), config.clone()),
            invoice: InvoiceService::new(db.clone(), config.clone()),
            db,
            config,
        })
    }

    /// Engine over a private in-memory database with default settings.
    pub async fn open_in_memory() -> ServiceResult<Self> {
        Self::open(StocklineConfig::in_memory()).await
    }

    pub fn catalog(&self) -> &CatalogService {
        &self.catalog
    }

    pub fn checkout(&self) -> &CheckoutService {
        &self.checkout
    }

    pub fn ledger(&self) -> &LedgerService {
        &self.ledger
    }

    pub fn query(&self) -> &QueryService {
        &self.query
    }

    pub fn invoice(&self) -> &InvoiceService {
        &self.invoice
    }

    pub fn config(&self) -> &StocklineConfig {
        &self.config
    }

    /// The shared database handle.
    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Whether the database answers queries.
    pub async fn health_check(&self) -> bool {
        self.db.health_check().await
    }

    /// Closes the pool. Operations after this fail with `PersistenceFailure`.
    pub async fn shutdown(&self) {
        info!("Shutting down Stockline engine");
        self.db.close().await;
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use stockline_core::{Cart, CartLine, PaymentMethod};

    #[tokio::test]
    async fn test_open_and_shutdown() {
        let engine = engine().await;
        assert!(engine.health_check().await);

        engine.shutdown().await;
        assert!(!engine.health_check().await);

        let err = engine
            .catalog()
            .list_products(&admin(), STORE, false)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PersistenceFailure);
    }

    #[tokio::test]
    async fn test_clones_share_one_database() {
        let engine = engine().await;
        let clone = engine.clone();
        let p = add_product(&engine, STORE, "SHARED", 100, 3).await;

        let cart = Cart::new(vec![CartLine::new(&p.id, 1)]).unwrap();
        clone
            .checkout()
            .checkout(&cashier(), CheckoutRequest::new(STORE, cart, PaymentMethod::Cash))
            .await
            .unwrap();

        let seen = engine.catalog().get_product(&admin(), STORE, &p.id).await.unwrap();
        assert_eq!(seen.stock_quantity, 2);
    }
}
