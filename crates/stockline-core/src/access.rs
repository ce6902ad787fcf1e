//! # Access Rules
//!
//! Authentication happens outside this workspace. Callers arrive with an
//! [`Identity`] that is trusted as-is; this module only decides whether that
//! identity may act on a given store.
//!
//! ```text
//! ┌──────────────────────────┬──────────────┬──────────────┐
//! │ Operation                │   Cashier    │    Admin     │
//! ├──────────────────────────┼──────────────┼──────────────┤
//! │ checkout                 │      ✓       │      ✓       │
//! │ reads (catalog, history, │      ✓       │      ✓       │
//! │   transactions, invoice) │              │              │
//! │ stock adjustment/restock │      ✗       │      ✓       │
//! │ refund / cancel          │      ✗       │      ✓       │
//! │ catalog writes           │      ✗       │      ✓       │
//! └──────────────────────────┴──────────────┴──────────────┘
//!   All rows: the identity must be active and belong to the store.
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};

/// Role of an authenticated actor within one store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Cashier,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Cashier => "cashier",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// "Caller is `role` `actor_id` of store `store_id`."
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Identity {
    pub actor_id: String,
    pub store_id: String,
    pub role: Role,
    /// Frozen onto transactions as the cashier name.
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl Identity {
    pub fn new(actor_id: impl Into<String>, store_id: impl Into<String>, role: Role) -> Self {
        Identity {
            actor_id: actor_id.into(),
            store_id: store_id.into(),
            role,
            display_name: None,
            active: true,
        }
    }

    pub fn admin(actor_id: impl Into<String>, store_id: impl Into<String>) -> Self {
        Identity::new(actor_id, store_id, Role::Admin)
    }

    pub fn cashier(actor_id: impl Into<String>, store_id: impl Into<String>) -> Self {
        Identity::new(actor_id, store_id, Role::Cashier)
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// May sell in `store_id`.
    pub fn authorize_sale(&self, store_id: &str) -> CoreResult<()> {
        self.authorize_store(store_id)
    }

    /// May read catalog, ledger and transactions of `store_id`.
    pub fn authorize_read(&self, store_id: &str) -> CoreResult<()> {
        self.authorize_store(store_id)
    }

    /// May change stock, catalog or transaction status in `store_id`.
    pub fn authorize_admin(&self, store_id: &str) -> CoreResult<()> {
        self.authorize_store(store_id)?;
        if !self.is_admin() {
            return Err(CoreError::unauthorized(
                &self.actor_id,
                format!("role {} cannot perform this operation", self.role),
            ));
        }
        Ok(())
    }

    fn authorize_store(&self, store_id: &str) -> CoreResult<()> {
        if !self.active {
            return Err(CoreError::unauthorized(&self.actor_id, "actor is inactive"));
        }
        if self.store_id != store_id {
            return Err(CoreError::unauthorized(
                &self.actor_id,
                format!("actor belongs to store {}, not {}", self.store_id, store_id),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
