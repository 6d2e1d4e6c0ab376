//! Integration tests for the API server.

use std::str::FromStr;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use api::config::Config;
use api::routes::orders::AppState;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::MemberId;
use domain::{Money, OrderEvent};
use ingest::{DeadLetterQueue, InMemoryIdempotencyGuard, IngestWorker, TicketQueue};
use inventory::Allocator;
use ledger::InMemoryLedger;
use metrics_exporter_prometheus::PrometheusHandle;
use orchestrator::{
    InMemoryNotifier, InMemoryPointsService, InMemoryPromotionService, Orchestrator, Promotion,
};
use rust_decimal::Decimal;
use tower::ServiceExt;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            builder
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

/// Full application wired over the in-memory ledger, with handles onto
/// the collaborators so tests can seed members, promotions and stock.
struct Harness {
    app: axum::Router,
    guard: InMemoryIdempotencyGuard,
    points: InMemoryPointsService,
    promotions: InMemoryPromotionService,
    notifier: InMemoryNotifier,
    brand_id: String,
    store_id: String,
}

fn setup() -> Harness {
    let ledger = InMemoryLedger::new();
    let guard = InMemoryIdempotencyGuard::new();
    let points = InMemoryPointsService::new();
    let promotions = InMemoryPromotionService::new();
    let notifier = InMemoryNotifier::new();

    let config = Config::default();
    let (queue, receiver) = TicketQueue::bounded(config.ticket_queue_capacity);
    let dead_letters = DeadLetterQueue::new();

    let worker = IngestWorker::new(
        Arc::new(Orchestrator::new(
            ledger.clone(),
            points.clone(),
            promotions.clone(),
            notifier.clone(),
        )),
        guard.clone(),
        receiver,
        dead_letters,
    );
    tokio::spawn(worker.run());

    let state = Arc::new(AppState {
        orchestrator: Orchestrator::new(
            ledger.clone(),
            points.clone(),
            promotions.clone(),
            notifier.clone(),
        ),
        allocator: Allocator::new(ledger),
        queue,
        guard: guard.clone(),
    });

    Harness {
        app: api::create_app(state, get_metrics_handle()),
        guard,
        points,
        promotions,
        notifier,
        brand_id: uuid::Uuid::new_v4().to_string(),
        store_id: uuid::Uuid::new_v4().to_string(),
    }
}

impl Harness {
    async fn get(&self, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = self
            .app
            .clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        into_json(response).await
    }

    async fn send_json(
        &self,
        method: &str,
        uri: &str,
        body: serde_json::Value,
        idempotency_key: Option<&str>,
    ) -> (StatusCode, serde_json::Value) {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json");
        if let Some(key) = idempotency_key {
            builder = builder.header("Idempotency-Key", key);
        }
        let response = self
            .app
            .clone()
            .oneshot(
                builder
                    .body(Body::from(serde_json::to_string(&body).unwrap()))
                    .unwrap(),
            )
            .await
            .unwrap();
        into_json(response).await
    }

    /// Registers a material and receives a shipment for it over HTTP.
    /// Returns the item id.
    async fn stocked_item(&self, quantity: u32) -> String {
        let (status, item) = self
            .send_json(
                "POST",
                "/items",
                serde_json::json!({
                    "brand_id": self.brand_id,
                    "name": "oat milk",
                    "unit": "ml",
                }),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        let item_id = item["id"].as_str().unwrap().to_string();

        let (status, _) = self
            .send_json(
                "POST",
                &format!("/stores/{}/shipments", self.store_id),
                serde_json::json!({
                    "brand_id": self.brand_id,
                    "lines": [{
                        "item_id": item_id,
                        "quantity": quantity,
                        "expiry_date": "2027-01-01",
                    }],
                }),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        item_id
    }

    fn order_body(&self, item_id: &str) -> serde_json::Value {
        serde_json::json!({
            "brand_id": self.brand_id,
            "store_id": self.store_id,
            "channel": "COUNTER",
            "lines": [{
                "product_id": "latte",
                "name": "Latte",
                "quantity": 2,
                "unit_price": "100",
                "consumes": [{ "item_id": item_id, "quantity": "30" }],
            }],
        })
    }

    /// Submits an order and waits for the ingest worker to place it.
    /// Returns the order id.
    async fn create_order_and_wait(&self, body: serde_json::Value, key: &str) -> String {
        let seen = self.placed_order_ids().len();
        let (status, ticket) = self.send_json("POST", "/orders", body, Some(key)).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert!(ticket["ticket_id"].as_str().is_some());

        for _ in 0..200 {
            let placed = self.placed_order_ids();
            if placed.len() > seen {
                return placed.last().unwrap().clone();
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("ingest worker did not place the order in time");
    }

    fn placed_order_ids(&self) -> Vec<String> {
        self.notifier
            .events()
            .iter()
            .filter_map(|e| match e {
                OrderEvent::Placed { order_id, .. } => Some(order_id.to_string()),
                _ => None,
            })
            .collect()
    }
}

async fn into_json(response: axum::response::Response) -> (StatusCode, serde_json::Value) {
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if body.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&body).unwrap()
    };
    (status, json)
}

fn money(value: &serde_json::Value) -> Money {
    Money::new(Decimal::from_str(value.as_str().expect("money field is a string")).unwrap())
}

#[tokio::test]
async fn test_health_check() {
    let h = setup();
    let (status, json) = h.get("/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn test_metrics_endpoint_responds() {
    let h = setup();
    let response = h
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/metrics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

mod inventory_endpoints {
    use super::*;

    #[tokio::test]
    async fn test_shipment_then_stock_query() {
        let h = setup();
        let item_id = h.stocked_item(500).await;

        let (status, stock) = h
            .get(&format!("/stores/{}/stock/{}", h.store_id, item_id))
            .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(stock["quantity"], "500");
    }

    #[tokio::test]
    async fn test_manual_deduction_draws_from_batches() {
        let h = setup();
        let item_id = h.stocked_item(500).await;

        let (status, result) = h
            .send_json(
                "POST",
                &format!("/stores/{}/stock/{}/deduct", h.store_id, item_id),
                serde_json::json!({ "quantity": "120", "reason": "WASTE" }),
                None,
            )
            .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(result["deducted"], "120");
        assert_eq!(result["draws"].as_array().unwrap().len(), 1);

        let (_, stock) = h
            .get(&format!("/stores/{}/stock/{}", h.store_id, item_id))
            .await;
        assert_eq!(stock["quantity"], "380");
    }

    #[tokio::test]
    async fn test_deduction_beyond_stock_is_rejected() {
        let h = setup();
        let item_id = h.stocked_item(10).await;

        let (status, body) = h
            .send_json(
                "POST",
                &format!("/stores/{}/stock/{}/deduct", h.store_id, item_id),
                serde_json::json!({ "quantity": "50", "reason": "WASTE" }),
                None,
            )
            .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "insufficient_stock");
    }

    #[tokio::test]
    async fn test_unknown_movement_reason_is_rejected() {
        let h = setup();
        let item_id = h.stocked_item(10).await;

        let (status, _) = h
            .send_json(
                "POST",
                &format!("/stores/{}/stock/{}/deduct", h.store_id, item_id),
                serde_json::json!({ "quantity": "5", "reason": "SHRINKAGE" }),
                None,
            )
            .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_stock_query_for_unknown_item() {
        let h = setup();
        let fake = uuid::Uuid::new_v4();

        let (status, body) = h
            .get(&format!("/stores/{}/stock/{}", h.store_id, fake))
            .await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "unknown_item");
    }
}

mod order_ingestion {
    use super::*;

    #[tokio::test]
    async fn test_create_order_is_accepted_and_processed() {
        let h = setup();
        let item_id = h.stocked_item(500).await;

        let order_id = h
            .create_order_and_wait(h.order_body(&item_id), "key-1")
            .await;

        let (status, order) = h.get(&format!("/orders/{order_id}")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(order["status"], "PENDING");
        assert_eq!(order["channel"], "COUNTER");
        assert_eq!(money(&order["total_amount"]), Money::from_major(200));

        // Materials were consumed during placement.
        let (_, stock) = h
            .get(&format!("/stores/{}/stock/{}", h.store_id, item_id))
            .await;
        assert_eq!(stock["quantity"], "440");
    }

    #[tokio::test]
    async fn test_missing_idempotency_key_is_rejected() {
        let h = setup();
        let item_id = h.stocked_item(500).await;

        let (status, _) = h
            .send_json("POST", "/orders", h.order_body(&item_id), None)
            .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_duplicate_idempotency_key_conflicts() {
        let h = setup();
        let item_id = h.stocked_item(500).await;

        h.create_order_and_wait(h.order_body(&item_id), "key-dup")
            .await;
        let (status, body) = h
            .send_json("POST", "/orders", h.order_body(&item_id), Some("key-dup"))
            .await;

        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["code"], "duplicate_request");
        // The successful submission keeps its claim.
        assert_eq!(h.guard.claim_count(), 1);
    }

    #[tokio::test]
    async fn test_malformed_order_is_rejected_synchronously() {
        let h = setup();

        let (status, body) = h
            .send_json(
                "POST",
                "/orders",
                serde_json::json!({
                    "brand_id": h.brand_id,
                    "store_id": h.store_id,
                    "channel": "COUNTER",
                    "lines": [],
                }),
                Some("key-empty"),
            )
            .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "validation");
        // Rejected before claiming, so the key stays available.
        assert_eq!(h.guard.claim_count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_channel_is_rejected() {
        let h = setup();
        let mut body = h.order_body(&uuid::Uuid::new_v4().to_string());
        body["channel"] = serde_json::json!("DRIVE_THROUGH");

        let (status, _) = h.send_json("POST", "/orders", body, Some("key-chan")).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}

mod order_lifecycle {
    use super::*;

    #[tokio::test]
    async fn test_payment_applies_points_and_promotion() {
        let h = setup();
        let item_id = h.stocked_item(500).await;
        let member_id = MemberId::new();
        h.points.add_member(member_id, 500);
        h.promotions.add_promotion(Promotion {
            brand_id: uuid::Uuid::from_str(&h.brand_id).unwrap().into(),
            percent_off: Decimal::new(10, 2),
            min_total: Money::from_major(100),
        });

        let order_id = h
            .create_order_and_wait(h.order_body(&item_id), "key-pay")
            .await;

        let (status, order) = h
            .send_json(
                "POST",
                &format!("/orders/{order_id}/payment"),
                serde_json::json!({
                    "payment_method": "card",
                    "member_id": member_id.to_string(),
                    "points_to_use": 100,
                }),
                None,
            )
            .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(order["status"], "PREPARING");
        // 200 total, 100 points worth 10, 10% promotion worth 20.
        assert_eq!(money(&order["discount_amount"]), Money::from_major(30));
        assert_eq!(money(&order["final_amount"]), Money::from_major(170));
        assert_eq!(order["points_used"], 100);
        assert_eq!(h.points.balance(member_id), Some(400));
    }

    #[tokio::test]
    async fn test_full_counter_flow_to_closed() {
        let h = setup();
        let item_id = h.stocked_item(500).await;

        let order_id = h
            .create_order_and_wait(h.order_body(&item_id), "key-flow")
            .await;

        let (status, _) = h
            .send_json(
                "POST",
                &format!("/orders/{order_id}/payment"),
                serde_json::json!({ "payment_method": "cash" }),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::OK);

        let (status, order) = h
            .send_json(
                "POST",
                &format!("/orders/{order_id}/ready"),
                serde_json::Value::Null,
                None,
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(order["status"], "READY_FOR_PICKUP");

        let (status, order) = h
            .send_json(
                "POST",
                &format!("/orders/{order_id}/status"),
                serde_json::json!({ "target": "CLOSED" }),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(order["status"], "CLOSED");
    }

    #[tokio::test]
    async fn test_illegal_transition_conflicts() {
        let h = setup();
        let item_id = h.stocked_item(500).await;

        let order_id = h
            .create_order_and_wait(h.order_body(&item_id), "key-illegal")
            .await;

        // Pending orders cannot be marked ready.
        let (status, body) = h
            .send_json(
                "POST",
                &format!("/orders/{order_id}/ready"),
                serde_json::Value::Null,
                None,
            )
            .await;

        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["code"], "illegal_transition");
    }

    #[tokio::test]
    async fn test_update_lines_recomputes_totals() {
        let h = setup();
        let item_id = h.stocked_item(500).await;

        let order_id = h
            .create_order_and_wait(h.order_body(&item_id), "key-update")
            .await;

        let (status, order) = h
            .send_json(
                "PUT",
                &format!("/orders/{order_id}/items"),
                serde_json::json!({
                    "lines": [{
                        "product_id": "espresso",
                        "name": "Espresso",
                        "quantity": 1,
                        "unit_price": "45.50",
                    }],
                }),
                None,
            )
            .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            money(&order["total_amount"]),
            Money::new(Decimal::new(4550, 2))
        );
        assert_eq!(order["lines"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_insufficient_points_is_a_bad_request() {
        let h = setup();
        let item_id = h.stocked_item(500).await;
        let member_id = MemberId::new();
        h.points.add_member(member_id, 5);

        let order_id = h
            .create_order_and_wait(h.order_body(&item_id), "key-points")
            .await;

        let (status, body) = h
            .send_json(
                "POST",
                &format!("/orders/{order_id}/payment"),
                serde_json::json!({
                    "payment_method": "card",
                    "member_id": member_id.to_string(),
                    "points_to_use": 100,
                }),
                None,
            )
            .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "insufficient_points");
    }

    #[tokio::test]
    async fn test_unknown_member_is_not_found() {
        let h = setup();
        let item_id = h.stocked_item(500).await;

        let order_id = h
            .create_order_and_wait(h.order_body(&item_id), "key-member")
            .await;

        let (status, body) = h
            .send_json(
                "POST",
                &format!("/orders/{order_id}/payment"),
                serde_json::json!({
                    "payment_method": "card",
                    "member_id": MemberId::new().to_string(),
                    "points_to_use": 1,
                }),
                None,
            )
            .await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "unknown_member");
    }

    #[tokio::test]
    async fn test_status_endpoint_rejects_non_terminal_targets() {
        let h = setup();
        let item_id = h.stocked_item(500).await;

        let order_id = h
            .create_order_and_wait(h.order_body(&item_id), "key-target")
            .await;

        let (status, _) = h
            .send_json(
                "POST",
                &format!("/orders/{order_id}/status"),
                serde_json::json!({ "target": "PREPARING" }),
                None,
            )
            .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_get_nonexistent_order() {
        let h = setup();
        let fake_id = uuid::Uuid::new_v4();

        let (status, body) = h.get(&format!("/orders/{fake_id}")).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "unknown_order");
    }

    #[tokio::test]
    async fn test_invalid_order_id_format() {
        let h = setup();

        let (status, _) = h.get("/orders/not-a-uuid").await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
