//! Inventory allocation engine.
//!
//! Moves stock from "received" to "consumed" using earliest-expiry-first
//! batch selection, while keeping the item-level cached total consistent
//! with the sum of the underlying batches.

pub mod allocator;
pub mod error;

pub use allocator::{Allocator, ShipmentLine, deduct_in_tx};
pub use error::InventoryError;
