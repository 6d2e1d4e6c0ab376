//! Ledger store errors.

use common::{ItemId, OrderId};
use thiserror::Error;

/// Errors that can occur in the ledger store.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Referenced inventory item does not exist in the caller's scope.
    #[error("inventory item not found: {item_id}")]
    ItemNotFound { item_id: ItemId },

    /// Referenced order does not exist in the caller's scope.
    #[error("order not found: {order_id}")]
    OrderNotFound { order_id: OrderId },

    /// A stored row could not be mapped back to a domain value.
    #[error("corrupt ledger row: {0}")]
    Decode(String),

    /// Database error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The backing store is temporarily unreachable.
    #[error("ledger unavailable: {0}")]
    Unavailable(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Convenience type alias for ledger results.
pub type Result<T> = std::result::Result<T, LedgerError>;
