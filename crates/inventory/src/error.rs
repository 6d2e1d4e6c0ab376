//! Allocation errors.

use common::ItemId;
use ledger::LedgerError;
use rust_decimal::Decimal;
use thiserror::Error;

/// Errors produced by inventory operations.
#[derive(Debug, Error)]
pub enum InventoryError {
    /// Quantities must be strictly positive.
    #[error("invalid quantity {quantity} (must be positive)")]
    InvalidQuantity { quantity: Decimal },

    /// Normal business rejection: not enough stock to cover the request.
    #[error(
        "insufficient stock for item {item_id}: available {available}, requested {requested}"
    )]
    InsufficientStock {
        item_id: ItemId,
        available: Decimal,
        requested: Decimal,
    },

    /// Fatal invariant violation: the cached item total admitted a
    /// deduction the batches could not cover. The cache and the batch sum
    /// have diverged through some other code path; this must be
    /// investigated, never retried or absorbed.
    #[error(
        "stock ledger drift for item {item_id}: batches exhausted with {remaining} outstanding"
    )]
    StockDrift { item_id: ItemId, remaining: Decimal },

    /// Ledger store error.
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl InventoryError {
    /// Returns true for the fatal cache/batch divergence error.
    pub fn is_fatal(&self) -> bool {
        matches!(self, InventoryError::StockDrift { .. })
    }
}
