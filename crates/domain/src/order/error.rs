//! Order domain errors.

use common::ItemId;
use rust_decimal::Decimal;
use thiserror::Error;

use super::{OrderAction, OrderStatus};

/// Errors produced by order operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum OrderError {
    /// The action is not supported by the order's current status.
    #[error("action '{action}' is not allowed while the order is {status}")]
    InvalidTransition {
        status: OrderStatus,
        action: OrderAction,
    },

    /// An order must contain at least one line.
    #[error("order must contain at least one line")]
    EmptyLines,

    /// Line quantity must be positive.
    #[error("invalid line quantity: {quantity}")]
    InvalidQuantity { quantity: u32 },

    /// Unit prices are sale-time snapshots and may be zero, never negative.
    #[error("unit price must not be negative: {price}")]
    NegativePrice { price: Decimal },

    /// Material usage per unit must be positive.
    #[error("invalid material quantity {quantity} for item {item_id}")]
    InvalidMaterialQuantity { item_id: ItemId, quantity: Decimal },

    /// The payment method code is not recognised.
    #[error("unknown payment method code: {code}")]
    UnknownPaymentMethod { code: String },

    /// Points to redeem must not be negative.
    #[error("points to use must not be negative: {points}")]
    InvalidPoints { points: i64 },
}
