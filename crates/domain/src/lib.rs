//! Domain layer for the beverage POS backend.
//!
//! This crate provides the pure (I/O-free) core of the system:
//! - Money and quantity arithmetic on exact decimals
//! - The order entity and its 7-state lifecycle policy table
//! - Inventory ledger entities (items, batches, movements, shipments)
//! - Notification events emitted by lifecycle transitions

pub mod money;
pub mod order;
pub mod stock;

pub use money::Money;
pub use order::{
    LineOption, MaterialUse, Order, OrderAction, OrderChannel, OrderError, OrderEvent, OrderLine,
    OrderStatus, PaymentContext, PaymentMethod, PolicyResult, ProductId, StatusPolicy, policy_for,
    validate_lines,
};
pub use stock::{InventoryBatch, InventoryItem, MovementReason, Shipment, StockMovement};
