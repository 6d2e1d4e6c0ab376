//! PostgreSQL-backed ledger implementation.
//!
//! Row locks are taken with `SELECT ... FOR UPDATE`; the fixed lock order
//! (item before batches, batches in FIFO order) is what keeps concurrent
//! deductions deadlock-free.

use async_trait::async_trait;
use common::{BatchId, ItemId, OrderId, ShipmentId, StoreId};
use domain::{
    InventoryBatch, InventoryItem, LineOption, MaterialUse, MovementReason, Order, OrderChannel,
    OrderLine, OrderStatus, PaymentMethod, ProductId, Shipment, StockMovement,
};
use rust_decimal::Decimal;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use uuid::Uuid;

use crate::error::{LedgerError, Result};
use crate::store::{BatchDraw, Ledger, LedgerTx};

/// PostgreSQL ledger.
#[derive(Clone)]
pub struct PostgresLedger {
    pool: PgPool,
}

impl PostgresLedger {
    /// Creates a new Postgres ledger over an existing pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    #[tracing::instrument(skip(self))]
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        tracing::info!("applying ledger migrations");
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }
}

fn row_to_item(row: PgRow) -> Result<InventoryItem> {
    Ok(InventoryItem {
        id: ItemId::from_uuid(row.try_get::<Uuid, _>("id")?),
        brand_id: row.try_get::<Uuid, _>("brand_id")?.into(),
        name: row.try_get("name")?,
        unit: row.try_get("unit")?,
        total_quantity: row.try_get("total_quantity")?,
        active: row.try_get("active")?,
        created_at: row.try_get("created_at")?,
    })
}

fn row_to_batch(row: PgRow) -> Result<InventoryBatch> {
    Ok(InventoryBatch {
        id: BatchId::from_uuid(row.try_get::<Uuid, _>("id")?),
        store_id: row.try_get::<Uuid, _>("store_id")?.into(),
        item_id: row.try_get::<Uuid, _>("item_id")?.into(),
        shipment_id: row
            .try_get::<Option<Uuid>, _>("shipment_id")?
            .map(ShipmentId::from_uuid),
        quantity_received: row.try_get("quantity_received")?,
        current_quantity: row.try_get("current_quantity")?,
        expiry_date: row.try_get("expiry_date")?,
        received_at: row.try_get("received_at")?,
    })
}

fn row_to_movement(row: PgRow) -> Result<StockMovement> {
    let reason: String = row.try_get("reason")?;
    Ok(StockMovement {
        id: row.try_get("id")?,
        item_id: row.try_get::<Uuid, _>("item_id")?.into(),
        store_id: row.try_get::<Uuid, _>("store_id")?.into(),
        batch_id: row
            .try_get::<Option<Uuid>, _>("batch_id")?
            .map(BatchId::from_uuid),
        change: row.try_get("change")?,
        reason: MovementReason::from_wire(&reason)
            .ok_or_else(|| LedgerError::Decode(format!("unknown movement reason '{reason}'")))?,
        operator: row
            .try_get::<Option<Uuid>, _>("operator")?
            .map(Into::into),
        balance_after: row.try_get("balance_after")?,
        recorded_at: row.try_get("recorded_at")?,
    })
}

fn row_to_order(row: PgRow, lines: Vec<OrderLine>) -> Result<Order> {
    let status: String = row.try_get("status")?;
    let channel: String = row.try_get("channel")?;
    let payment_method: Option<String> = row.try_get("payment_method")?;
    Ok(Order {
        id: OrderId::from_uuid(row.try_get::<Uuid, _>("id")?),
        brand_id: row.try_get::<Uuid, _>("brand_id")?.into(),
        store_id: row.try_get::<Uuid, _>("store_id")?.into(),
        member_id: row
            .try_get::<Option<Uuid>, _>("member_id")?
            .map(Into::into),
        staff_id: row.try_get::<Option<Uuid>, _>("staff_id")?.map(Into::into),
        channel: OrderChannel::from_wire(&channel)
            .ok_or_else(|| LedgerError::Decode(format!("unknown order channel '{channel}'")))?,
        status: OrderStatus::from_wire(&status)
            .ok_or_else(|| LedgerError::Decode(format!("unknown order status '{status}'")))?,
        total_amount: row.try_get::<Decimal, _>("total_amount")?.into(),
        discount_amount: row.try_get::<Decimal, _>("discount_amount")?.into(),
        final_amount: row.try_get::<Decimal, _>("final_amount")?.into(),
        points_used: row.try_get("points_used")?,
        points_earned: row.try_get("points_earned")?,
        payment_method: payment_method
            .map(|code| {
                code.parse::<PaymentMethod>()
                    .map_err(|_| LedgerError::Decode(format!("unknown payment method '{code}'")))
            })
            .transpose()?,
        placed_at: row.try_get("placed_at")?,
        completed_at: row.try_get("completed_at")?,
        lines,
    })
}

fn row_to_line(row: PgRow) -> Result<OrderLine> {
    let options: Vec<LineOption> = serde_json::from_value(row.try_get("options")?)?;
    let consumes: Vec<MaterialUse> = serde_json::from_value(row.try_get("consumes")?)?;
    Ok(OrderLine {
        product_id: ProductId::new(row.try_get::<String, _>("product_id")?),
        name: row.try_get("name")?,
        quantity: row.try_get::<i32, _>("quantity")? as u32,
        unit_price: row.try_get::<Decimal, _>("unit_price")?.into(),
        subtotal: row.try_get::<Decimal, _>("subtotal")?.into(),
        options,
        consumes,
    })
}

const SELECT_LINES: &str = r#"
    SELECT product_id, name, quantity, unit_price, subtotal, options, consumes
    FROM order_lines
    WHERE order_id = $1
    ORDER BY position ASC
"#;

#[async_trait]
impl Ledger for PostgresLedger {
    type Tx = PostgresTx;

    async fn begin(&self) -> Result<PostgresTx> {
        Ok(PostgresTx {
            tx: self.pool.begin().await?,
        })
    }

    async fn get_item(&self, item_id: ItemId) -> Result<Option<InventoryItem>> {
        let row = sqlx::query(
            "SELECT id, brand_id, name, unit, total_quantity, active, created_at \
             FROM inventory_items WHERE id = $1",
        )
        .bind(item_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;
        row.map(row_to_item).transpose()
    }

    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>> {
        let Some(row) = sqlx::query("SELECT * FROM orders WHERE id = $1")
            .bind(order_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?
        else {
            return Ok(None);
        };

        let lines = sqlx::query(SELECT_LINES)
            .bind(order_id.as_uuid())
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(row_to_line)
            .collect::<Result<Vec<_>>>()?;

        Ok(Some(row_to_order(row, lines)?))
    }

    async fn store_stock(&self, store_id: StoreId, item_id: ItemId) -> Result<Decimal> {
        let total: Decimal = sqlx::query_scalar(
            "SELECT COALESCE(SUM(current_quantity), 0) \
             FROM inventory_batches WHERE store_id = $1 AND item_id = $2",
        )
        .bind(store_id.as_uuid())
        .bind(item_id.as_uuid())
        .fetch_one(&self.pool)
        .await?;
        Ok(total)
    }

    async fn movements_for_item(&self, item_id: ItemId) -> Result<Vec<StockMovement>> {
        sqlx::query(
            "SELECT id, item_id, store_id, batch_id, change, reason, operator, \
                    balance_after, recorded_at \
             FROM stock_movements WHERE item_id = $1 ORDER BY recorded_at ASC, id ASC",
        )
        .bind(item_id.as_uuid())
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(row_to_movement)
        .collect()
    }
}

/// An open Postgres transaction.
pub struct PostgresTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl LedgerTx for PostgresTx {
    async fn insert_item(&mut self, item: &InventoryItem) -> Result<()> {
        sqlx::query(
            "INSERT INTO inventory_items (id, brand_id, name, unit, total_quantity, active, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(item.id.as_uuid())
        .bind(item.brand_id.as_uuid())
        .bind(&item.name)
        .bind(&item.unit)
        .bind(item.total_quantity)
        .bind(item.active)
        .bind(item.created_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn lock_item(&mut self, item_id: ItemId) -> Result<InventoryItem> {
        let row = sqlx::query(
            "SELECT id, brand_id, name, unit, total_quantity, active, created_at \
             FROM inventory_items WHERE id = $1 FOR UPDATE",
        )
        .bind(item_id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await?;
        row.map(row_to_item)
            .transpose()?
            .ok_or(LedgerError::ItemNotFound { item_id })
    }

    async fn update_item_total(&mut self, item_id: ItemId, total: Decimal) -> Result<()> {
        let result = sqlx::query("UPDATE inventory_items SET total_quantity = $2 WHERE id = $1")
            .bind(item_id.as_uuid())
            .bind(total)
            .execute(&mut *self.tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(LedgerError::ItemNotFound { item_id });
        }
        Ok(())
    }

    async fn deactivate_item(&mut self, item_id: ItemId) -> Result<()> {
        let result = sqlx::query("UPDATE inventory_items SET active = FALSE WHERE id = $1")
            .bind(item_id.as_uuid())
            .execute(&mut *self.tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(LedgerError::ItemNotFound { item_id });
        }
        Ok(())
    }

    async fn insert_shipment(&mut self, shipment: &Shipment) -> Result<()> {
        sqlx::query(
            "INSERT INTO shipments (id, store_id, operator, received_at) VALUES ($1, $2, $3, $4)",
        )
        .bind(shipment.id.as_uuid())
        .bind(shipment.store_id.as_uuid())
        .bind(shipment.operator.map(|s| s.as_uuid()))
        .bind(shipment.received_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn insert_batch(&mut self, batch: &InventoryBatch) -> Result<()> {
        sqlx::query(
            "INSERT INTO inventory_batches \
             (id, store_id, item_id, shipment_id, quantity_received, current_quantity, expiry_date, received_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(batch.id.as_uuid())
        .bind(batch.store_id.as_uuid())
        .bind(batch.item_id.as_uuid())
        .bind(batch.shipment_id.map(|s| s.as_uuid()))
        .bind(batch.quantity_received)
        .bind(batch.current_quantity)
        .bind(batch.expiry_date)
        .bind(batch.received_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn lock_batches_fifo(
        &mut self,
        store_id: StoreId,
        item_id: ItemId,
    ) -> Result<Vec<InventoryBatch>> {
        sqlx::query(
            "SELECT id, store_id, item_id, shipment_id, quantity_received, current_quantity, \
                    expiry_date, received_at \
             FROM inventory_batches \
             WHERE store_id = $1 AND item_id = $2 AND current_quantity > 0 \
             ORDER BY expiry_date ASC, received_at ASC, id ASC \
             FOR UPDATE",
        )
        .bind(store_id.as_uuid())
        .bind(item_id.as_uuid())
        .fetch_all(&mut *self.tx)
        .await?
        .into_iter()
        .map(row_to_batch)
        .collect()
    }

    #[tracing::instrument(skip(self, draws), fields(draws = draws.len()))]
    async fn update_batch_quantities(&mut self, draws: &[BatchDraw]) -> Result<()> {
        if draws.is_empty() {
            return Ok(());
        }
        let ids: Vec<Uuid> = draws.iter().map(|d| d.batch_id.as_uuid()).collect();
        let quantities: Vec<Decimal> = draws.iter().map(|d| d.new_quantity).collect();

        // One statement for the whole draw set.
        sqlx::query(
            "UPDATE inventory_batches AS b \
             SET current_quantity = v.new_quantity \
             FROM (SELECT UNNEST($1::uuid[]) AS id, UNNEST($2::numeric[]) AS new_quantity) AS v \
             WHERE b.id = v.id",
        )
        .bind(&ids)
        .bind(&quantities)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn insert_movement(&mut self, movement: &StockMovement) -> Result<()> {
        sqlx::query(
            "INSERT INTO stock_movements \
             (id, item_id, store_id, batch_id, change, reason, operator, balance_after, recorded_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(movement.id)
        .bind(movement.item_id.as_uuid())
        .bind(movement.store_id.as_uuid())
        .bind(movement.batch_id.map(|b| b.as_uuid()))
        .bind(movement.change)
        .bind(movement.reason.as_str())
        .bind(movement.operator.map(|s| s.as_uuid()))
        .bind(movement.balance_after)
        .bind(movement.recorded_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn insert_order(&mut self, order: &Order) -> Result<()> {
        sqlx::query(
            "INSERT INTO orders \
             (id, brand_id, store_id, member_id, staff_id, channel, status, total_amount, \
              discount_amount, final_amount, points_used, points_earned, payment_method, \
              placed_at, completed_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)",
        )
        .bind(order.id.as_uuid())
        .bind(order.brand_id.as_uuid())
        .bind(order.store_id.as_uuid())
        .bind(order.member_id.map(|m| m.as_uuid()))
        .bind(order.staff_id.map(|s| s.as_uuid()))
        .bind(order.channel.as_str())
        .bind(order.status.as_str())
        .bind(order.total_amount.amount())
        .bind(order.discount_amount.amount())
        .bind(order.final_amount.amount())
        .bind(order.points_used)
        .bind(order.points_earned)
        .bind(order.payment_method.map(|p| p.as_str()))
        .bind(order.placed_at)
        .bind(order.completed_at)
        .execute(&mut *self.tx)
        .await?;

        self.insert_lines(order).await
    }

    #[tracing::instrument(skip(self))]
    async fn lock_order(&mut self, order_id: OrderId) -> Result<Order> {
        let row = sqlx::query("SELECT * FROM orders WHERE id = $1 FOR UPDATE")
            .bind(order_id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await?
            .ok_or(LedgerError::OrderNotFound { order_id })?;

        let lines = sqlx::query(SELECT_LINES)
            .bind(order_id.as_uuid())
            .fetch_all(&mut *self.tx)
            .await?
            .into_iter()
            .map(row_to_line)
            .collect::<Result<Vec<_>>>()?;

        row_to_order(row, lines)
    }

    async fn update_order(&mut self, order: &Order) -> Result<()> {
        let result = sqlx::query(
            "UPDATE orders SET \
             member_id = $2, status = $3, total_amount = $4, discount_amount = $5, \
             final_amount = $6, points_used = $7, points_earned = $8, payment_method = $9, \
             completed_at = $10 \
             WHERE id = $1",
        )
        .bind(order.id.as_uuid())
        .bind(order.member_id.map(|m| m.as_uuid()))
        .bind(order.status.as_str())
        .bind(order.total_amount.amount())
        .bind(order.discount_amount.amount())
        .bind(order.final_amount.amount())
        .bind(order.points_used)
        .bind(order.points_earned)
        .bind(order.payment_method.map(|p| p.as_str()))
        .bind(order.completed_at)
        .execute(&mut *self.tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(LedgerError::OrderNotFound { order_id: order.id });
        }

        // Lines are replaced wholesale.
        sqlx::query("DELETE FROM order_lines WHERE order_id = $1")
            .bind(order.id.as_uuid())
            .execute(&mut *self.tx)
            .await?;

        self.insert_lines(order).await
    }

    async fn commit(self) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }
}

impl PostgresTx {
    async fn insert_lines(&mut self, order: &Order) -> Result<()> {
        for (position, line) in order.lines.iter().enumerate() {
            sqlx::query(
                "INSERT INTO order_lines \
                 (order_id, position, product_id, name, quantity, unit_price, subtotal, options, consumes) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
            )
            .bind(order.id.as_uuid())
            .bind(position as i32)
            .bind(line.product_id.as_str())
            .bind(&line.name)
            .bind(line.quantity as i32)
            .bind(line.unit_price.amount())
            .bind(line.subtotal.amount())
            .bind(serde_json::to_value(&line.options)?)
            .bind(serde_json::to_value(&line.consumes)?)
            .execute(&mut *self.tx)
            .await?;
        }
        Ok(())
    }
}
