//! Shared types for the beverage POS backend.

mod types;

pub use types::{
    BatchId, BrandId, ItemId, MemberId, OrderId, ShipmentId, StaffId, StoreId, TicketId,
};
