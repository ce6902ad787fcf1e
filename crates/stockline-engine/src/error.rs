//! # Service Error Type
//!
//! The one error type every engine operation returns.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Flow in Stockline                              │
//! │                                                                         │
//! │  Service operation                                                      │
//! │  ServiceResult<T>                                                       │
//! │         │                                                               │
//! │         ├── CoreError (cart, access, pricing) ─────► Rejected          │
//! │         │                                                               │
//! │         ├── DbError::Domain(CoreError) ────────────► Rejected          │
//! │         ├── DbError::UniqueViolation ──────────────► Duplicate         │
//! │         ├── DbError contention (busy, pool) ───────► Busy              │
//! │         ├── DbError (anything else) ───────────────► Persistence       │
//! │         │                                                               │
//! │         └── Deadline passed before COMMIT ─────────► Timeout           │
//! │                                                                         │
//! │  Caller matches on err.kind():                                         │
//! │    { kind: INSUFFICIENT_STOCK, message, retryable: false }             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::Serialize;
use thiserror::Error;
use tracing::error;

use stockline_core::{CoreError, ValidationError};
use stockline_db::DbError;

/// Result type for service operations.
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Stable, serializable error classification for callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    InvalidCart,
    ProductNotFound,
    CrossStoreReference,
    InsufficientStock,
    Unauthorized,
    Timeout,
    TransactionNotFound,
    InvalidTransactionStatus,
    InvalidInput,
    PersistenceFailure,
}

/// Engine operation errors.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// A business rule rejected the request. Nothing was written.
    #[error(transparent)]
    Rejected(#[from] CoreError),

    /// The operation exceeded its time bound and was rolled back.
    #[error("{operation} timed out after {ms} ms")]
    Timeout { operation: &'static str, ms: u64 },

    /// The database stayed locked or the pool stayed empty past its wait.
    #[error("Database busy: {0}")]
    Busy(String),

    /// A unique key is already taken.
    #[error("Duplicate {field}: '{value}' already exists")]
    Duplicate { field: String, value: String },

    /// Storage failed for a reason unrelated to the request.
    #[error("Persistence failure: {0}")]
    Persistence(DbError),
}

impl ServiceError {
    /// Machine-readable classification.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ServiceError::Rejected(err) => core_kind(err),
            ServiceError::Timeout { .. } | ServiceError::Busy(_) => ErrorKind::Timeout,
            ServiceError::Duplicate { .. } => ErrorKind::InvalidInput,
            ServiceError::Persistence(_) => ErrorKind::PersistenceFailure,
        }
    }

    /// Whether the same request may succeed if sent again unchanged.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Timeout
    }

    /// Serializable view for an outer adapter.
    pub fn to_payload(&self) -> ErrorPayload {
        ErrorPayload {
            kind: self.kind(),
            message: self.to_string(),
            retryable: self.is_retryable(),
        }
    }
}

fn core_kind(err: &CoreError) -> ErrorKind {
    match err {
        CoreError::InvalidCart { .. }
        | CoreError::CartTooLarge { .. }
        | CoreError::QuantityTooLarge { .. }
        | CoreError::InvalidDiscount { .. } => ErrorKind::InvalidCart,
        CoreError::ProductNotFound(_) | CoreError::ProductInactive(_) => ErrorKind::ProductNotFound,
        CoreError::CrossStoreReference { .. } => ErrorKind::CrossStoreReference,
        CoreError::InsufficientStock { .. } => ErrorKind::InsufficientStock,
        CoreError::Unauthorized { .. } => ErrorKind::Unauthorized,
        CoreError::TransactionNotFound(_) => ErrorKind::TransactionNotFound,
        CoreError::InvalidTransactionStatus { .. } => ErrorKind::InvalidTransactionStatus,
        CoreError::Validation(_) => ErrorKind::InvalidInput,
    }
}

/// What an outer adapter sends back when an operation fails.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorPayload {
    pub kind: ErrorKind,
    pub message: String,
    pub retryable: bool,
}

/// Converts database errors to service errors.
impl From<DbError> for ServiceError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::Domain(core) => ServiceError::Rejected(core),
            DbError::UniqueViolation { field, value } => ServiceError::Duplicate { field, value },
            DbError::NotFound { entity, id } if entity == "Product" => {
                ServiceError::Rejected(CoreError::ProductNotFound(id))
            }
            DbError::NotFound { entity, id } if entity == "Transaction" => {
                ServiceError::Rejected(CoreError::TransactionNotFound(id))
            }
            DbError::Busy(msg) => ServiceError::Busy(msg),
            other if other.is_contention() => ServiceError::Busy(other.to_string()),
            other => {
                error!(error = %other, "Persistence failure");
                ServiceError::Persistence(other)
            }
        }
    }
}

impl From<ValidationError> for ServiceError {
    fn from(err: ValidationError) -> Self {
        ServiceError::Rejected(CoreError::Validation(err))
    }
}
