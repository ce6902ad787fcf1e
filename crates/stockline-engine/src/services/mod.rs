//! # Engine Services
//!
//! One service per component. Each holds a clone of the process-wide
//! [`Database`](stockline_db::Database) and a shared config.
//!
//! ```text
//! services/
//! ├── mod.rs       ◄─── You are here (exports, Deadline)
//! ├── catalog.rs   ◄─── Products, activation, low stock
//! ├── checkout.rs  ◄─── Checkout, refund, cancel
//! ├── ledger.rs    ◄─── Adjustments, history, audit
//! ├── query.rs     ◄─── Transaction list and detail
//! └── invoice.rs   ◄─── Printable invoice view
//! ```
//!
//! ## Common Shape
//! ```text
//! operation(identity, args)
//!      │
//!      ├── validate arguments          → InvalidInput / InvalidCart
//!      ├── identity.authorize_*(store) → Unauthorized
//!      └── repository call             → DbError mapped into ServiceError
//! ```

pub mod catalog;
pub mod checkout;
pub mod invoice;
pub mod ledger;
pub mod query;

pub use catalog::CatalogService;
pub use checkout::{CheckoutRequest, CheckoutService};
pub use invoice::InvoiceService;
pub use ledger::LedgerService;
pub use query::QueryService;

use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::warn;

use crate::error::{ServiceError, ServiceResult};
use stockline_db::{DbError, DbResult};

/// Time bound of one write operation.
///
/// Reads before the unit run under [`Deadline::run`]. The unit itself gets
/// [`Deadline::at`] and stops short of COMMIT once it passes, so a
/// `Timeout` always means nothing was written. A unit that reached COMMIT
/// in time reports its real outcome even if that lands after the bound.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Deadline {
    operation: &'static str,
    bound: Duration,
    at: Instant,
}

impl Deadline {
    pub(crate) fn start(operation: &'static str, bound: Duration) -> Self {
        Deadline {
            operation,
            bound,
            at: Instant::now() + bound,
        }
    }

    /// Instant handed to the database unit.
    pub(crate) fn at(&self) -> Option<Instant> {
        Some(self.at)
    }

    /// Runs a read-only step, dropping it if the deadline passes.
    pub(crate) async fn run<T, F>(&self, step: F) -> ServiceResult<T>
    where
        F: Future<Output = ServiceResult<T>>,
    {
        match tokio::time::timeout_at(self.at, step).await {
            Ok(result) => result,
            Err(_) => Err(self.expired()),
        }
    }

    /// Maps the unit's result, turning `DeadlineExceeded` into `Timeout`.
    pub(crate) fn settle<T>(&self, result: DbResult<T>) -> ServiceResult<T> {
        match result {
            Err(DbError::DeadlineExceeded) => Err(self.expired()),
            other => Ok(other?),
        }
    }

    fn expired(&self) -> ServiceError {
        let ms = self.bound.as_millis() as u64;
        warn!(operation = self.operation, timeout_ms = ms, "Operation timed out, rolled back");
        ServiceError::Timeout {
            operation: self.operation,
            ms,
        }
    }
}
