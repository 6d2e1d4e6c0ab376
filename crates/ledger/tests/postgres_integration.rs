//! PostgreSQL integration tests
//!
//! These tests share one PostgreSQL container and run serially because
//! each one truncates the tables for isolation.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use common::{BrandId, MemberId, OrderId, StoreId};
use domain::{
    InventoryBatch, InventoryItem, Money, MovementReason, Order, OrderChannel, OrderLine,
    OrderStatus, Shipment, StockMovement,
};
use ledger::{BatchDraw, Ledger, LedgerError, LedgerTx, PostgresLedger};
use rust_decimal::Decimal;
use serial_test::serial;
use sqlx::PgPool;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();
            PostgresLedger::new(temp_pool.clone())
                .run_migrations()
                .await
                .unwrap();
            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

/// Fresh ledger over its own pool, with cleared tables.
async fn get_test_ledger() -> PostgresLedger {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query(
        "TRUNCATE TABLE stock_movements, inventory_batches, shipments, \
         order_lines, orders, inventory_items, idempotency_keys",
    )
    .execute(&pool)
    .await
    .unwrap();

    PostgresLedger::new(pool)
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn sample_order() -> Order {
    Order::new(
        OrderId::new(),
        BrandId::new(),
        StoreId::new(),
        OrderChannel::Counter,
        None,
        None,
        vec![OrderLine::new(
            "latte",
            "Latte",
            2,
            Money::from_major(30),
            vec![],
            vec![],
        )],
        Utc::now(),
    )
}

#[tokio::test]
#[serial]
async fn item_round_trip() {
    let ledger = get_test_ledger().await;
    let item = InventoryItem::new(BrandId::new(), "oat milk", "ml");

    let mut tx = ledger.begin().await.unwrap();
    tx.insert_item(&item).await.unwrap();
    tx.commit().await.unwrap();

    let stored = ledger.get_item(item.id).await.unwrap().unwrap();
    assert_eq!(stored.id, item.id);
    assert_eq!(stored.brand_id, item.brand_id);
    assert_eq!(stored.name, "oat milk");
    assert_eq!(stored.unit, "ml");
    assert_eq!(stored.total_quantity, Decimal::ZERO);
    assert!(stored.active);
}

#[tokio::test]
#[serial]
async fn dropped_transaction_rolls_back() {
    let ledger = get_test_ledger().await;
    let item = InventoryItem::new(BrandId::new(), "beans", "g");

    {
        let mut tx = ledger.begin().await.unwrap();
        tx.insert_item(&item).await.unwrap();
        // No commit.
    }

    assert!(ledger.get_item(item.id).await.unwrap().is_none());
}

#[tokio::test]
#[serial]
async fn lock_item_reports_missing_rows() {
    let ledger = get_test_ledger().await;

    let mut tx = ledger.begin().await.unwrap();
    let err = tx.lock_item(common::ItemId::new()).await.unwrap_err();

    assert!(matches!(err, LedgerError::ItemNotFound { .. }));
}

#[tokio::test]
#[serial]
async fn batches_lock_in_fifo_order() {
    let ledger = get_test_ledger().await;
    let store_id = StoreId::new();
    let item = InventoryItem::new(BrandId::new(), "syrup", "ml");
    let now = Utc::now();

    // Inserted deliberately out of expiry order.
    let late = InventoryBatch::new(store_id, item.id, None, Decimal::from(5), date(2027, 6, 1), now);
    let early =
        InventoryBatch::new(store_id, item.id, None, Decimal::from(5), date(2027, 1, 1), now);
    let tie_breaker = InventoryBatch::new(
        store_id,
        item.id,
        None,
        Decimal::from(5),
        date(2027, 1, 1),
        now + chrono::Duration::seconds(10),
    );

    let mut tx = ledger.begin().await.unwrap();
    tx.insert_item(&item).await.unwrap();
    tx.insert_batch(&late).await.unwrap();
    tx.insert_batch(&early).await.unwrap();
    tx.insert_batch(&tie_breaker).await.unwrap();
    tx.commit().await.unwrap();

    let mut tx = ledger.begin().await.unwrap();
    tx.lock_item(item.id).await.unwrap();
    let batches = tx.lock_batches_fifo(store_id, item.id).await.unwrap();

    assert_eq!(batches.len(), 3);
    assert_eq!(batches[0].id, early.id);
    assert_eq!(batches[1].id, tie_breaker.id);
    assert_eq!(batches[2].id, late.id);
}

#[tokio::test]
#[serial]
async fn exhausted_batches_are_not_locked() {
    let ledger = get_test_ledger().await;
    let store_id = StoreId::new();
    let item = InventoryItem::new(BrandId::new(), "syrup", "ml");
    let now = Utc::now();

    let mut empty =
        InventoryBatch::new(store_id, item.id, None, Decimal::from(5), date(2027, 1, 1), now);
    empty.current_quantity = Decimal::ZERO;
    let live =
        InventoryBatch::new(store_id, item.id, None, Decimal::from(5), date(2027, 6, 1), now);

    let mut tx = ledger.begin().await.unwrap();
    tx.insert_item(&item).await.unwrap();
    tx.insert_batch(&empty).await.unwrap();
    tx.insert_batch(&live).await.unwrap();
    tx.commit().await.unwrap();

    let mut tx = ledger.begin().await.unwrap();
    tx.lock_item(item.id).await.unwrap();
    let batches = tx.lock_batches_fifo(store_id, item.id).await.unwrap();

    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].id, live.id);
}

#[tokio::test]
#[serial]
async fn batch_draws_apply_as_bulk_write() {
    let ledger = get_test_ledger().await;
    let store_id = StoreId::new();
    let item = InventoryItem::new(BrandId::new(), "milk", "ml");
    let now = Utc::now();

    let a = InventoryBatch::new(store_id, item.id, None, Decimal::from(30), date(2027, 1, 1), now);
    let b = InventoryBatch::new(store_id, item.id, None, Decimal::from(70), date(2027, 2, 1), now);

    let mut tx = ledger.begin().await.unwrap();
    tx.insert_item(&item).await.unwrap();
    tx.insert_batch(&a).await.unwrap();
    tx.insert_batch(&b).await.unwrap();
    tx.update_batch_quantities(&[
        BatchDraw {
            batch_id: a.id,
            drawn: Decimal::from(30),
            new_quantity: Decimal::ZERO,
        },
        BatchDraw {
            batch_id: b.id,
            drawn: Decimal::from(20),
            new_quantity: Decimal::from(50),
        },
    ])
    .await
    .unwrap();
    tx.commit().await.unwrap();

    assert_eq!(
        ledger.store_stock(store_id, item.id).await.unwrap(),
        Decimal::from(50)
    );
}

#[tokio::test]
#[serial]
async fn store_stock_sums_only_the_requested_store() {
    let ledger = get_test_ledger().await;
    let store_a = StoreId::new();
    let store_b = StoreId::new();
    let item = InventoryItem::new(BrandId::new(), "milk", "ml");
    let now = Utc::now();

    let mut tx = ledger.begin().await.unwrap();
    tx.insert_item(&item).await.unwrap();
    tx.insert_batch(&InventoryBatch::new(
        store_a,
        item.id,
        None,
        Decimal::from(40),
        date(2027, 1, 1),
        now,
    ))
    .await
    .unwrap();
    tx.insert_batch(&InventoryBatch::new(
        store_b,
        item.id,
        None,
        Decimal::from(60),
        date(2027, 1, 1),
        now,
    ))
    .await
    .unwrap();
    tx.commit().await.unwrap();

    assert_eq!(
        ledger.store_stock(store_a, item.id).await.unwrap(),
        Decimal::from(40)
    );
    assert_eq!(
        ledger.store_stock(store_b, item.id).await.unwrap(),
        Decimal::from(60)
    );
}

#[tokio::test]
#[serial]
async fn movement_ledger_preserves_insertion_order() {
    let ledger = get_test_ledger().await;
    let store_id = StoreId::new();
    let item = InventoryItem::new(BrandId::new(), "cups", "pcs");
    let now = Utc::now();

    let restock = StockMovement::new(
        item.id,
        store_id,
        None,
        Decimal::from(100),
        MovementReason::Restock,
        None,
        Decimal::from(100),
        now,
    );
    let usage = StockMovement::new(
        item.id,
        store_id,
        None,
        Decimal::from(-30),
        MovementReason::Usage,
        None,
        Decimal::from(70),
        now + chrono::Duration::seconds(5),
    );

    let mut tx = ledger.begin().await.unwrap();
    tx.insert_item(&item).await.unwrap();
    tx.insert_movement(&restock).await.unwrap();
    tx.insert_movement(&usage).await.unwrap();
    tx.commit().await.unwrap();

    let movements = ledger.movements_for_item(item.id).await.unwrap();
    assert_eq!(movements.len(), 2);
    assert_eq!(movements[0].reason, MovementReason::Restock);
    assert_eq!(movements[0].change, Decimal::from(100));
    assert_eq!(movements[1].reason, MovementReason::Usage);
    assert_eq!(movements[1].balance_after, Decimal::from(70));
}

#[tokio::test]
#[serial]
async fn shipment_links_its_batches() {
    let ledger = get_test_ledger().await;
    let store_id = StoreId::new();
    let item = InventoryItem::new(BrandId::new(), "milk", "ml");
    let now = Utc::now();

    let shipment = Shipment::new(store_id, None, now);
    let batch = InventoryBatch::new(
        store_id,
        item.id,
        Some(shipment.id),
        Decimal::from(100),
        date(2027, 1, 1),
        now,
    );

    let mut tx = ledger.begin().await.unwrap();
    tx.insert_item(&item).await.unwrap();
    tx.insert_shipment(&shipment).await.unwrap();
    tx.insert_batch(&batch).await.unwrap();
    tx.commit().await.unwrap();

    let mut tx = ledger.begin().await.unwrap();
    tx.lock_item(item.id).await.unwrap();
    let batches = tx.lock_batches_fifo(store_id, item.id).await.unwrap();
    assert_eq!(batches[0].shipment_id, Some(shipment.id));
}

#[tokio::test]
#[serial]
async fn item_total_and_deactivation_persist() {
    let ledger = get_test_ledger().await;
    let item = InventoryItem::new(BrandId::new(), "lids", "pcs");

    let mut tx = ledger.begin().await.unwrap();
    tx.insert_item(&item).await.unwrap();
    tx.update_item_total(item.id, Decimal::from(250)).await.unwrap();
    tx.deactivate_item(item.id).await.unwrap();
    tx.commit().await.unwrap();

    let stored = ledger.get_item(item.id).await.unwrap().unwrap();
    assert_eq!(stored.total_quantity, Decimal::from(250));
    assert!(!stored.active);
}

#[tokio::test]
#[serial]
async fn order_round_trip_with_lines() {
    let ledger = get_test_ledger().await;
    let order = sample_order();

    let mut tx = ledger.begin().await.unwrap();
    tx.insert_order(&order).await.unwrap();
    tx.commit().await.unwrap();

    let stored = ledger.get_order(order.id).await.unwrap().unwrap();
    assert_eq!(stored.id, order.id);
    assert_eq!(stored.status, OrderStatus::Pending);
    assert_eq!(stored.total_amount, Money::from_major(60));
    assert_eq!(stored.lines.len(), 1);
    assert_eq!(stored.lines[0].name, "Latte");
    assert_eq!(stored.lines[0].subtotal, Money::from_major(60));
}

#[tokio::test]
#[serial]
async fn order_update_replaces_lines_wholesale() {
    let ledger = get_test_ledger().await;
    let mut order = sample_order();

    let mut tx = ledger.begin().await.unwrap();
    tx.insert_order(&order).await.unwrap();
    tx.commit().await.unwrap();

    order.lines = vec![
        OrderLine::new("espresso", "Espresso", 1, Money::from_major(25), vec![], vec![]),
        OrderLine::new("scone", "Scone", 3, Money::from_major(10), vec![], vec![]),
    ];
    order.status = OrderStatus::Held;
    order.member_id = Some(MemberId::new());

    let mut tx = ledger.begin().await.unwrap();
    tx.lock_order(order.id).await.unwrap();
    tx.update_order(&order).await.unwrap();
    tx.commit().await.unwrap();

    let stored = ledger.get_order(order.id).await.unwrap().unwrap();
    assert_eq!(stored.status, OrderStatus::Held);
    assert_eq!(stored.member_id, order.member_id);
    assert_eq!(stored.lines.len(), 2);
    assert_eq!(stored.lines[0].name, "Espresso");
    assert_eq!(stored.lines[1].name, "Scone");
}

#[tokio::test]
#[serial]
async fn lock_order_reports_missing_rows() {
    let ledger = get_test_ledger().await;

    let mut tx = ledger.begin().await.unwrap();
    let err = tx.lock_order(OrderId::new()).await.unwrap_err();

    assert!(matches!(err, LedgerError::OrderNotFound { .. }));
}
