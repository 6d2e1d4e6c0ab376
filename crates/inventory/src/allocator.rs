//! Shipment receipt and FIFO deduction.
//!
//! Lock discipline (shared with the ledger backends): the item row is
//! locked first and serializes every mutation of that item; batches are
//! then locked in FIFO order. Because batch selection depends only on
//! remaining batch state, the cumulative draw from each batch after a set
//! of concurrent deductions equals applying the same deductions
//! sequentially in any order.

use chrono::{NaiveDate, Utc};
use common::{BrandId, ItemId, ShipmentId, StaffId, StoreId};
use domain::{InventoryBatch, InventoryItem, MovementReason, Shipment, StockMovement};
use ledger::{BatchDraw, Ledger, LedgerTx};
use rust_decimal::Decimal;

use crate::error::InventoryError;

/// One line of a receiving shipment.
#[derive(Debug, Clone)]
pub struct ShipmentLine {
    pub item_id: ItemId,
    pub quantity: Decimal,
    pub expiry_date: NaiveDate,
}

/// Deducts stock inside an already-open ledger transaction.
///
/// This is the single source of the deduction algorithm; the allocator's
/// own [`Allocator::deduct`] and the order orchestrator both run through
/// it so manual deductions and order fulfilment behave identically.
///
/// Steps: lock item → fail fast on the cached total → persist the new
/// total → lock batches FIFO → greedy walk → one bulk batch write →
/// append the movement row. Exhausting the batches while quantity remains
/// outstanding means the cached total and the batch sum have diverged;
/// that surfaces as the fatal [`InventoryError::StockDrift`], distinct
/// from the ordinary insufficient-stock rejection.
pub async fn deduct_in_tx<T: LedgerTx>(
    tx: &mut T,
    store_id: StoreId,
    item_id: ItemId,
    quantity: Decimal,
    reason: MovementReason,
    operator: Option<StaffId>,
) -> Result<Vec<BatchDraw>, InventoryError> {
    if quantity <= Decimal::ZERO {
        return Err(InventoryError::InvalidQuantity { quantity });
    }

    let item = tx.lock_item(item_id).await?;
    if item.total_quantity < quantity {
        return Err(InventoryError::InsufficientStock {
            item_id,
            available: item.total_quantity,
            requested: quantity,
        });
    }

    let new_total = item.total_quantity - quantity;
    tx.update_item_total(item_id, new_total).await?;

    let batches = tx.lock_batches_fifo(store_id, item_id).await?;
    let mut remaining = quantity;
    let mut draws = Vec::new();
    for mut batch in batches {
        if remaining.is_zero() {
            break;
        }
        let taken = batch.draw(remaining);
        remaining -= taken;
        draws.push(BatchDraw {
            batch_id: batch.id,
            drawn: taken,
            new_quantity: batch.current_quantity,
        });
    }

    if remaining > Decimal::ZERO {
        tracing::error!(
            %item_id,
            %store_id,
            %remaining,
            cached_total = %item.total_quantity,
            "stock ledger drift detected during deduction"
        );
        metrics::counter!("inventory_stock_drift_total").increment(1);
        return Err(InventoryError::StockDrift { item_id, remaining });
    }

    tx.update_batch_quantities(&draws).await?;
    tx.insert_movement(&StockMovement::new(
        item_id,
        store_id,
        None,
        -quantity,
        reason,
        operator,
        new_total,
        Utc::now(),
    ))
    .await?;

    Ok(draws)
}

/// Inventory allocator over a ledger backend.
#[derive(Clone)]
pub struct Allocator<L: Ledger> {
    ledger: L,
}

impl<L: Ledger> Allocator<L> {
    /// Creates an allocator over the given ledger.
    pub fn new(ledger: L) -> Self {
        Self { ledger }
    }

    /// Returns a reference to the underlying ledger.
    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    /// Registers a new material definition with zero stock.
    #[tracing::instrument(skip(self, name, unit))]
    pub async fn register_item(
        &self,
        brand_id: BrandId,
        name: &str,
        unit: &str,
    ) -> Result<InventoryItem, InventoryError> {
        let item = InventoryItem::new(brand_id, name, unit);
        let mut tx = self.ledger.begin().await?;
        tx.insert_item(&item).await?;
        tx.commit().await?;
        Ok(item)
    }

    /// Receives a shipment: one batch per line, cached totals bumped
    /// under the item lock, one `RESTOCK` movement per line.
    ///
    /// Fails with not-found if a referenced item does not exist or does
    /// not belong to the brand. Nothing is persisted on failure.
    #[tracing::instrument(skip(self, lines), fields(line_count = lines.len()))]
    pub async fn add_shipment(
        &self,
        brand_id: BrandId,
        store_id: StoreId,
        operator: Option<StaffId>,
        mut lines: Vec<ShipmentLine>,
    ) -> Result<ShipmentId, InventoryError> {
        for line in &lines {
            if line.quantity <= Decimal::ZERO {
                return Err(InventoryError::InvalidQuantity {
                    quantity: line.quantity,
                });
            }
        }
        // Items are locked in a deterministic order so two concurrent
        // multi-line shipments cannot deadlock.
        lines.sort_by_key(|l| l.item_id.as_uuid());

        let now = Utc::now();
        let shipment = Shipment::new(store_id, operator, now);
        let mut tx = self.ledger.begin().await?;
        tx.insert_shipment(&shipment).await?;

        for line in &lines {
            let item = tx.lock_item(line.item_id).await?;
            if item.brand_id != brand_id {
                // Scope violations are indistinguishable from missing rows.
                return Err(ledger::LedgerError::ItemNotFound {
                    item_id: line.item_id,
                }
                .into());
            }

            let batch = InventoryBatch::new(
                store_id,
                line.item_id,
                Some(shipment.id),
                line.quantity,
                line.expiry_date,
                now,
            );
            tx.insert_batch(&batch).await?;

            let new_total = item.total_quantity + line.quantity;
            tx.update_item_total(line.item_id, new_total).await?;
            tx.insert_movement(&StockMovement::new(
                line.item_id,
                store_id,
                Some(batch.id),
                line.quantity,
                MovementReason::Restock,
                operator,
                new_total,
                now,
            ))
            .await?;
        }

        tx.commit().await?;
        metrics::counter!("inventory_shipments_total").increment(1);
        Ok(shipment.id)
    }

    /// Deducts stock in its own transaction (manual/operational path).
    #[tracing::instrument(skip(self))]
    pub async fn deduct(
        &self,
        store_id: StoreId,
        item_id: ItemId,
        quantity: Decimal,
        reason: MovementReason,
        operator: Option<StaffId>,
    ) -> Result<Vec<BatchDraw>, InventoryError> {
        let start = std::time::Instant::now();
        let mut tx = self.ledger.begin().await?;
        let draws = deduct_in_tx(&mut tx, store_id, item_id, quantity, reason, operator).await?;
        tx.commit().await?;

        metrics::counter!("inventory_deductions_total").increment(1);
        metrics::histogram!("inventory_deduction_seconds")
            .record(start.elapsed().as_secs_f64());
        Ok(draws)
    }

    /// Returns the authoritative per-store stock for an item.
    ///
    /// Always sums the store's batches; never reads the item-level cache,
    /// which aggregates across stores.
    pub async fn current_stock(
        &self,
        store_id: StoreId,
        item_id: ItemId,
    ) -> Result<Decimal, InventoryError> {
        Ok(self.ledger.store_stock(store_id, item_id).await?)
    }

    /// Reconciles a physical count against the ledger.
    ///
    /// Counting up creates a correction batch with the given expiry;
    /// counting down deducts FIFO. Either way an `AUDIT` movement is
    /// appended. A matching count is a no-op.
    #[tracing::instrument(skip(self))]
    pub async fn correct_count(
        &self,
        store_id: StoreId,
        item_id: ItemId,
        observed: Decimal,
        surplus_expiry: NaiveDate,
        operator: Option<StaffId>,
    ) -> Result<Decimal, InventoryError> {
        if observed < Decimal::ZERO {
            return Err(InventoryError::InvalidQuantity { quantity: observed });
        }

        let now = Utc::now();
        let mut tx = self.ledger.begin().await?;
        let item = tx.lock_item(item_id).await?;
        let batches = tx.lock_batches_fifo(store_id, item_id).await?;
        let on_ledger: Decimal = batches.iter().map(|b| b.current_quantity).sum();
        let delta = observed - on_ledger;

        if delta > Decimal::ZERO {
            let batch =
                InventoryBatch::new(store_id, item_id, None, delta, surplus_expiry, now);
            tx.insert_batch(&batch).await?;
            let new_total = item.total_quantity + delta;
            tx.update_item_total(item_id, new_total).await?;
            tx.insert_movement(&StockMovement::new(
                item_id,
                store_id,
                Some(batch.id),
                delta,
                MovementReason::Audit,
                operator,
                new_total,
                now,
            ))
            .await?;
        } else if delta < Decimal::ZERO {
            let shortfall = -delta;
            let new_total = item.total_quantity - shortfall;
            tx.update_item_total(item_id, new_total).await?;

            let mut remaining = shortfall;
            let mut draws = Vec::new();
            for mut batch in batches {
                if remaining.is_zero() {
                    break;
                }
                let taken = batch.draw(remaining);
                remaining -= taken;
                draws.push(BatchDraw {
                    batch_id: batch.id,
                    drawn: taken,
                    new_quantity: batch.current_quantity,
                });
            }
            tx.update_batch_quantities(&draws).await?;
            tx.insert_movement(&StockMovement::new(
                item_id,
                store_id,
                None,
                -shortfall,
                MovementReason::Audit,
                operator,
                new_total,
                now,
            ))
            .await?;
        }

        tx.commit().await?;
        Ok(delta)
    }
}
