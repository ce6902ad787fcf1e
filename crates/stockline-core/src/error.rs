//! # Error Types
//!
//! Domain-specific error types for stockline-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  stockline-core errors (this file)                                     │
//! │  ├── CoreError        - Business rule violations                       │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  stockline-db errors                                                   │
//! │  └── DbError          - Storage failures (wraps CoreError raised       │
//! │                         inside an atomic unit)                          │
//! │                                                                         │
//! │  stockline-engine errors                                               │
//! │  └── ServiceError     - What callers see, with a stable ErrorKind      │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → DbError → ServiceError            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//! 1. Use `thiserror` for derive macros (not manual impl)
//! 2. Include context in error messages (SKU, ID, etc.)
//! 3. Errors are enum variants, never String
//! 4. Each error variant maps to a user-facing message

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Core business logic errors.
///
/// These errors represent business rule violations. None of them is raised
/// after a write has become visible: either they are detected before the
/// atomic unit starts, or the unit is rolled back.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The cart is empty or carries malformed lines.
    #[error("Invalid cart: {reason}")]
    InvalidCart { reason: String },

    /// Cart has exceeded maximum allowed distinct products.
    #[error("Cart cannot have more than {max} items")]
    CartTooLarge { max: usize },

    /// Item quantity exceeds maximum allowed.
    #[error("Quantity {requested} exceeds maximum allowed ({max})")]
    QuantityTooLarge { requested: i64, max: i64 },

    /// Order discount cannot be applied to this cart.
    #[error("Invalid discount: {reason}")]
    InvalidDiscount { reason: String },

    /// Product cannot be found in the store's inventory.
    ///
    /// ## When This Occurs
    /// - Product ID doesn't exist in database
    /// - Product row vanished between validation and commit
    #[error("Product not found: {0}")]
    ProductNotFound(String),

    /// Product exists but has been soft-disabled.
    #[error("Product is inactive: {0}")]
    ProductInactive(String),

    /// A product owned by another store was referenced.
    #[error("Product {product_id} does not belong to store {store_id}")]
    CrossStoreReference {
        product_id: String,
        store_id: String,
    },

    /// Insufficient stock to complete a sale or a negative adjustment.
    ///
    /// ## User Workflow
    /// ```text
    /// Checkout (qty: 5)
    ///      │
    ///      ▼
    /// Check stock: available=3
    ///      │
    ///      ▼
    /// InsufficientStock { sku: "COKE", available: 3, requested: 5 }
    ///      │
    ///      ▼
    /// UI shows: "Only 3 COKE in stock"
    /// ```
    #[error("Insufficient stock for {sku}: available {available}, requested {requested}")]
    InsufficientStock {
        product_id: String,
        sku: String,
        available: i64,
        requested: i64,
    },

    /// The identity may not perform this operation in this store.
    #[error("Actor {actor_id} is not authorized: {reason}")]
    Unauthorized { actor_id: String, reason: String },

    /// Transaction not found.
    #[error("Transaction not found: {0}")]
    TransactionNotFound(String),

    /// Transaction is not in a state that allows the requested transition.
    ///
    /// ## When This Occurs
    /// - Refunding a transaction that was already refunded or cancelled
    /// - Cancelling a pending transaction
    #[error("Transaction {transaction_id} is {current_status}, cannot perform operation")]
    InvalidTransactionStatus {
        transaction_id: String,
        current_status: String,
    },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl CoreError {
    /// Creates an InvalidCart error.
    pub fn invalid_cart(reason: impl Into<String>) -> Self {
        CoreError::InvalidCart {
            reason: reason.into(),
        }
    }

    /// Creates an Unauthorized error.
    pub fn unauthorized(actor_id: impl Into<String>, reason: impl Into<String>) -> Self {
        CoreError::Unauthorized {
            actor_id: actor_id.into(),
            reason: reason.into(),
        }
    }

    /// Creates a CrossStoreReference error.
    pub fn cross_store(product_id: impl Into<String>, store_id: impl Into<String>) -> Self {
        CoreError::CrossStoreReference {
            product_id: product_id.into(),
            store_id: store_id.into(),
        }
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These errors occur when input doesn't meet requirements.
/// Used for early validation before business logic runs.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Invalid format (e.g., invalid SKU characters, inverted date range).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Value is not in allowed set.
    #[error("{field} must be one of: {allowed:?}")]
    NotAllowed { field: String, allowed: Vec<String> },

    /// Duplicate value (e.g., duplicate SKU).
    #[error("{field} '{value}' already exists")]
    Duplicate { field: String, value: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
