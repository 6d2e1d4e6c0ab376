//! Transactional store abstraction.
//!
//! The allocator and orchestrator are written once against [`Ledger`] /
//! [`LedgerTx`]; the Postgres and in-memory backends supply the same
//! semantics. Lock discipline is part of the contract: within one
//! transaction the item row is always locked before its batches, and
//! batches are locked in FIFO order (`expiry_date`, then `received_at`,
//! then id), which gives concurrent deductions a fixed global lock order.

use async_trait::async_trait;
use common::{BatchId, ItemId, OrderId, StoreId};
use domain::{InventoryBatch, InventoryItem, Order, Shipment, StockMovement};
use rust_decimal::Decimal;

use crate::error::Result;

/// One batch's share of a deduction, applied as part of a bulk write.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchDraw {
    pub batch_id: BatchId,
    /// Amount taken from the batch by this operation.
    pub drawn: Decimal,
    /// Batch quantity after the draw.
    pub new_quantity: Decimal,
}

/// Handle to the persistent ledger.
#[async_trait]
pub trait Ledger: Clone + Send + Sync + 'static {
    type Tx: LedgerTx;

    /// Opens a transaction. All mutations go through the transaction;
    /// nothing is visible to other callers until [`LedgerTx::commit`].
    async fn begin(&self) -> Result<Self::Tx>;

    /// Fetches an item without locking it.
    async fn get_item(&self, item_id: ItemId) -> Result<Option<InventoryItem>>;

    /// Fetches an order with its lines, without locking it.
    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>>;

    /// Sums `current_quantity` over one store's batches of an item.
    ///
    /// This is the authoritative per-store stock figure; the item-level
    /// total is a cross-store aggregate cache and is never consulted here.
    async fn store_stock(&self, store_id: StoreId, item_id: ItemId) -> Result<Decimal>;

    /// Returns the append-only movement ledger for an item, oldest first.
    async fn movements_for_item(&self, item_id: ItemId) -> Result<Vec<StockMovement>>;
}

/// One atomic unit of ledger work.
///
/// Dropping a transaction without committing rolls back every mutation
/// performed through it.
#[async_trait]
pub trait LedgerTx: Send {
    // -- inventory items --

    /// Inserts a newly registered item.
    async fn insert_item(&mut self, item: &InventoryItem) -> Result<()>;

    /// Locks an item row exclusively and returns it.
    ///
    /// Serializes all concurrent receipts and deductions for the item.
    async fn lock_item(&mut self, item_id: ItemId) -> Result<InventoryItem>;

    /// Persists a new cached total for a previously locked item.
    async fn update_item_total(&mut self, item_id: ItemId, total: Decimal) -> Result<()>;

    /// Marks an item inactive. Items are never deleted.
    async fn deactivate_item(&mut self, item_id: ItemId) -> Result<()>;

    // -- batches & shipments --

    /// Inserts a shipment record.
    async fn insert_shipment(&mut self, shipment: &Shipment) -> Result<()>;

    /// Inserts a new batch.
    async fn insert_batch(&mut self, batch: &InventoryBatch) -> Result<()>;

    /// Locks and returns one store's non-exhausted batches of an item,
    /// ordered ascending by expiry date (ties by receipt time, then id).
    ///
    /// Callers must hold the item lock first.
    async fn lock_batches_fifo(
        &mut self,
        store_id: StoreId,
        item_id: ItemId,
    ) -> Result<Vec<InventoryBatch>>;

    /// Applies a set of batch draws as one bulk write.
    async fn update_batch_quantities(&mut self, draws: &[BatchDraw]) -> Result<()>;

    /// Appends a movement row to the ledger.
    async fn insert_movement(&mut self, movement: &StockMovement) -> Result<()>;

    // -- orders --

    /// Inserts an order with its lines.
    async fn insert_order(&mut self, order: &Order) -> Result<()>;

    /// Locks an order row exclusively and returns it with its lines.
    async fn lock_order(&mut self, order_id: OrderId) -> Result<Order>;

    /// Persists an order, replacing its line collection wholesale.
    async fn update_order(&mut self, order: &Order) -> Result<()>;

    /// Commits the transaction.
    async fn commit(self) -> Result<()>;
}
