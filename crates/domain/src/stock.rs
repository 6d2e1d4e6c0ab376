//! Inventory ledger entities.
//!
//! Pure data carried between the allocator and the ledger store. The only
//! behaviour here is the small invariant-preserving helpers on batches.

use chrono::{DateTime, NaiveDate, Utc};
use common::{BatchId, BrandId, ItemId, ShipmentId, StaffId, StoreId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A brand-scoped material definition.
///
/// `total_quantity` is a cached aggregate equal to the sum of
/// `current_quantity` over all batches of this item across all stores. It
/// is mutated only by the allocator under the item lock, and serves as the
/// brand-wide fail-fast bound for deductions. Items are deactivated, never
/// deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryItem {
    pub id: ItemId,
    pub brand_id: BrandId,
    pub name: String,
    /// Unit of measure (e.g. "g", "ml", "pcs").
    pub unit: String,
    pub total_quantity: Decimal,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl InventoryItem {
    /// Registers a new material with zero stock.
    pub fn new(brand_id: BrandId, name: impl Into<String>, unit: impl Into<String>) -> Self {
        Self {
            id: ItemId::new(),
            brand_id,
            name: name.into(),
            unit: unit.into(),
            total_quantity: Decimal::ZERO,
            active: true,
            created_at: Utc::now(),
        }
    }
}

/// One receipt lot of a material held by a store.
///
/// Invariant: `0 <= current_quantity <= quantity_received`. Batches are
/// consumed earliest-expiry-first and are never physically deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryBatch {
    pub id: BatchId,
    pub store_id: StoreId,
    pub item_id: ItemId,
    pub shipment_id: Option<ShipmentId>,
    pub quantity_received: Decimal,
    pub current_quantity: Decimal,
    pub expiry_date: NaiveDate,
    pub received_at: DateTime<Utc>,
}

impl InventoryBatch {
    /// Creates a full batch from a shipment line or count correction.
    pub fn new(
        store_id: StoreId,
        item_id: ItemId,
        shipment_id: Option<ShipmentId>,
        quantity: Decimal,
        expiry_date: NaiveDate,
        received_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: BatchId::new(),
            store_id,
            item_id,
            shipment_id,
            quantity_received: quantity,
            current_quantity: quantity,
            expiry_date,
            received_at,
        }
    }

    /// Draws up to `wanted` from this batch, returning the amount taken.
    ///
    /// Never takes the batch below zero.
    pub fn draw(&mut self, wanted: Decimal) -> Decimal {
        let taken = wanted.min(self.current_quantity);
        self.current_quantity -= taken;
        taken
    }

    /// Returns true if the batch holds no remaining quantity.
    pub fn is_exhausted(&self) -> bool {
        self.current_quantity.is_zero()
    }
}

/// Why a stock level changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MovementReason {
    /// Shipment receipt.
    Restock,
    /// Manual count correction.
    Audit,
    /// Spoilage / disposal.
    Waste,
    /// Consumed fulfilling an order.
    Usage,
}

impl MovementReason {
    /// Returns the wire name of this reason.
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementReason::Restock => "RESTOCK",
            MovementReason::Audit => "AUDIT",
            MovementReason::Waste => "WASTE",
            MovementReason::Usage => "USAGE",
        }
    }

    /// Parses a wire name back into a reason.
    pub fn from_wire(s: &str) -> Option<Self> {
        match s {
            "RESTOCK" => Some(MovementReason::Restock),
            "AUDIT" => Some(MovementReason::Audit),
            "WASTE" => Some(MovementReason::Waste),
            "USAGE" => Some(MovementReason::Usage),
            _ => None,
        }
    }
}

impl std::fmt::Display for MovementReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Append-only ledger row written for every stock mutation.
///
/// `balance_after` snapshots the item's total after the mutation so
/// historical stock levels can be reconstructed without replay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockMovement {
    pub id: Uuid,
    pub item_id: ItemId,
    pub store_id: StoreId,
    pub batch_id: Option<BatchId>,
    /// Signed change applied to the item total.
    pub change: Decimal,
    pub reason: MovementReason,
    pub operator: Option<StaffId>,
    pub balance_after: Decimal,
    pub recorded_at: DateTime<Utc>,
}

impl StockMovement {
    /// Records one mutation of an item's stock.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        item_id: ItemId,
        store_id: StoreId,
        batch_id: Option<BatchId>,
        change: Decimal,
        reason: MovementReason,
        operator: Option<StaffId>,
        balance_after: Decimal,
        recorded_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            item_id,
            store_id,
            batch_id,
            change,
            reason,
            operator,
            balance_after,
            recorded_at,
        }
    }
}

/// One receiving shipment, owning its batches via `shipment_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shipment {
    pub id: ShipmentId,
    pub store_id: StoreId,
    pub operator: Option<StaffId>,
    pub received_at: DateTime<Utc>,
}

impl Shipment {
    /// Creates a shipment record for a store receipt.
    pub fn new(store_id: StoreId, operator: Option<StaffId>, received_at: DateTime<Utc>) -> Self {
        Self {
            id: ShipmentId::new(),
            store_id,
            operator,
            received_at,
        }
    }
}
