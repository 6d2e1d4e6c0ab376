//! In-memory ledger implementation for testing.
//!
//! Behavioural twin of the Postgres backend. A single mutex over the whole
//! state stands in for the row locks: `begin` takes the mutex and clones
//! the state, mutations hit the clone, and `commit` writes the clone back.
//! A transaction dropped without committing therefore rolls back, and
//! transactions are strictly serialized just as the item row lock
//! serializes them in Postgres.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use common::{ItemId, OrderId, ShipmentId, StoreId};
use domain::{InventoryBatch, InventoryItem, Order, Shipment, StockMovement};
use rust_decimal::Decimal;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::error::{LedgerError, Result};
use crate::store::{BatchDraw, Ledger, LedgerTx};

#[derive(Debug, Clone, Default)]
struct State {
    items: HashMap<ItemId, InventoryItem>,
    /// Insertion order doubles as the receipt-time tie-breaker.
    batches: Vec<InventoryBatch>,
    movements: Vec<StockMovement>,
    shipments: HashMap<ShipmentId, Shipment>,
    orders: HashMap<OrderId, Order>,
}

/// In-memory ledger for tests and local development.
#[derive(Clone, Default)]
pub struct InMemoryLedger {
    state: Arc<Mutex<State>>,
    fail_begins: Arc<AtomicU32>,
    fail_commits: Arc<AtomicU32>,
}

impl InMemoryLedger {
    /// Creates a new empty in-memory ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` calls to `begin` fail as unavailable.
    pub fn fail_next_begins(&self, count: u32) {
        self.fail_begins.store(count, Ordering::SeqCst);
    }

    /// Makes the next `count` transaction commits fail as unavailable.
    /// The failed transaction rolls back, as a lost connection would.
    pub fn fail_next_commits(&self, count: u32) {
        self.fail_commits.store(count, Ordering::SeqCst);
    }

    /// Returns the number of movement rows in the ledger.
    pub async fn movement_count(&self) -> usize {
        self.state.lock().await.movements.len()
    }

    /// Returns the number of batches (exhausted ones included).
    pub async fn batch_count(&self) -> usize {
        self.state.lock().await.batches.len()
    }

    /// Returns a snapshot of one store's batches of an item, FIFO ordered.
    pub async fn batches_snapshot(
        &self,
        store_id: StoreId,
        item_id: ItemId,
    ) -> Vec<InventoryBatch> {
        let state = self.state.lock().await;
        let mut batches: Vec<_> = state
            .batches
            .iter()
            .filter(|b| b.store_id == store_id && b.item_id == item_id)
            .cloned()
            .collect();
        batches.sort_by(|a, b| {
            a.expiry_date
                .cmp(&b.expiry_date)
                .then(a.received_at.cmp(&b.received_at))
        });
        batches
    }

    /// Clears all state.
    pub async fn clear(&self) {
        *self.state.lock().await = State::default();
    }
}

#[async_trait]
impl Ledger for InMemoryLedger {
    type Tx = InMemoryTx;

    async fn begin(&self) -> Result<InMemoryTx> {
        if self
            .fail_begins
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(LedgerError::Unavailable("injected failure".to_string()));
        }
        let guard = self.state.clone().lock_owned().await;
        let staged = guard.clone();
        Ok(InMemoryTx {
            guard,
            staged,
            fail_commits: self.fail_commits.clone(),
        })
    }

    async fn get_item(&self, item_id: ItemId) -> Result<Option<InventoryItem>> {
        Ok(self.state.lock().await.items.get(&item_id).cloned())
    }

    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>> {
        Ok(self.state.lock().await.orders.get(&order_id).cloned())
    }

    async fn store_stock(&self, store_id: StoreId, item_id: ItemId) -> Result<Decimal> {
        let state = self.state.lock().await;
        Ok(state
            .batches
            .iter()
            .filter(|b| b.store_id == store_id && b.item_id == item_id)
            .map(|b| b.current_quantity)
            .sum())
    }

    async fn movements_for_item(&self, item_id: ItemId) -> Result<Vec<StockMovement>> {
        let state = self.state.lock().await;
        Ok(state
            .movements
            .iter()
            .filter(|m| m.item_id == item_id)
            .cloned()
            .collect())
    }
}

/// An open in-memory transaction.
///
/// Holds the store mutex for its whole lifetime; committing writes the
/// staged state back, dropping discards it.
pub struct InMemoryTx {
    guard: OwnedMutexGuard<State>,
    staged: State,
    fail_commits: Arc<AtomicU32>,
}

#[async_trait]
impl LedgerTx for InMemoryTx {
    async fn insert_item(&mut self, item: &InventoryItem) -> Result<()> {
        self.staged.items.insert(item.id, item.clone());
        Ok(())
    }

    async fn lock_item(&mut self, item_id: ItemId) -> Result<InventoryItem> {
        self.staged
            .items
            .get(&item_id)
            .cloned()
            .ok_or(LedgerError::ItemNotFound { item_id })
    }

    async fn update_item_total(&mut self, item_id: ItemId, total: Decimal) -> Result<()> {
        let item = self
            .staged
            .items
            .get_mut(&item_id)
            .ok_or(LedgerError::ItemNotFound { item_id })?;
        item.total_quantity = total;
        Ok(())
    }

    async fn deactivate_item(&mut self, item_id: ItemId) -> Result<()> {
        let item = self
            .staged
            .items
            .get_mut(&item_id)
            .ok_or(LedgerError::ItemNotFound { item_id })?;
        item.active = false;
        Ok(())
    }

    async fn insert_shipment(&mut self, shipment: &Shipment) -> Result<()> {
        self.staged.shipments.insert(shipment.id, shipment.clone());
        Ok(())
    }

    async fn insert_batch(&mut self, batch: &InventoryBatch) -> Result<()> {
        self.staged.batches.push(batch.clone());
        Ok(())
    }

    async fn lock_batches_fifo(
        &mut self,
        store_id: StoreId,
        item_id: ItemId,
    ) -> Result<Vec<InventoryBatch>> {
        let mut batches: Vec<_> = self
            .staged
            .batches
            .iter()
            .filter(|b| {
                b.store_id == store_id
                    && b.item_id == item_id
                    && b.current_quantity > Decimal::ZERO
            })
            .cloned()
            .collect();
        // Stable sort keeps insertion order for equal keys, matching the
        // received_at/id tie-break of the SQL backend.
        batches.sort_by(|a, b| {
            a.expiry_date
                .cmp(&b.expiry_date)
                .then(a.received_at.cmp(&b.received_at))
        });
        Ok(batches)
    }

    async fn update_batch_quantities(&mut self, draws: &[BatchDraw]) -> Result<()> {
        for draw in draws {
            if let Some(batch) = self.staged.batches.iter_mut().find(|b| b.id == draw.batch_id) {
                batch.current_quantity = draw.new_quantity;
            }
        }
        Ok(())
    }

    async fn insert_movement(&mut self, movement: &StockMovement) -> Result<()> {
        self.staged.movements.push(movement.clone());
        Ok(())
    }

    async fn insert_order(&mut self, order: &Order) -> Result<()> {
        self.staged.orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn lock_order(&mut self, order_id: OrderId) -> Result<Order> {
        self.staged
            .orders
            .get(&order_id)
            .cloned()
            .ok_or(LedgerError::OrderNotFound { order_id })
    }

    async fn update_order(&mut self, order: &Order) -> Result<()> {
        self.staged.orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn commit(mut self) -> Result<()> {
        if self
            .fail_commits
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(LedgerError::Unavailable("injected failure".to_string()));
        }
        *self.guard = self.staged;
        Ok(())
    }
}
