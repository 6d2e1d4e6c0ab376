//! Order ingestion and lifecycle endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use common::{BrandId, ItemId, MemberId, OrderId, StaffId, StoreId};
use domain::{
    LineOption, MaterialUse, Money, Order, OrderChannel, OrderLine, OrderStatus, validate_lines,
};
use ingest::{IdempotencyGuard, Ticket, TicketQueue};
use inventory::Allocator;
use ledger::Ledger;
use orchestrator::{
    InMemoryNotifier, InMemoryPointsService, InMemoryPromotionService, NewOrder, Orchestrator,
    PaymentRequest,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

/// Shared application state accessible from all handlers.
pub struct AppState<L: Ledger, G: IdempotencyGuard> {
    pub orchestrator:
        Orchestrator<L, InMemoryPointsService, InMemoryPromotionService, InMemoryNotifier>,
    pub allocator: Allocator<L>,
    pub queue: TicketQueue,
    pub guard: G,
}

// -- Request types --

#[derive(Deserialize)]
pub struct CreateOrderRequest {
    pub brand_id: String,
    pub store_id: String,
    /// Wire channel name (`COUNTER`, `TAB`, `ONLINE`).
    pub channel: String,
    pub staff_id: Option<String>,
    pub member_id: Option<String>,
    pub lines: Vec<OrderLineRequest>,
}

#[derive(Deserialize)]
pub struct OrderLineRequest {
    pub product_id: String,
    pub name: String,
    pub quantity: u32,
    pub unit_price: Decimal,
    #[serde(default)]
    pub options: Vec<LineOptionRequest>,
    #[serde(default)]
    pub consumes: Vec<MaterialUseRequest>,
}

#[derive(Deserialize)]
pub struct LineOptionRequest {
    pub name: String,
    pub price_delta: Decimal,
}

#[derive(Deserialize)]
pub struct MaterialUseRequest {
    pub item_id: String,
    pub quantity: Decimal,
}

#[derive(Deserialize)]
pub struct UpdateLinesRequest {
    pub lines: Vec<OrderLineRequest>,
}

#[derive(Deserialize)]
pub struct PayRequest {
    pub payment_method: String,
    pub member_id: Option<String>,
    #[serde(default)]
    pub points_to_use: i64,
}

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    /// Wire status name; only `CLOSED` and `CANCELLED` are accepted.
    pub target: String,
}

// -- Response types --

#[derive(Serialize)]
pub struct TicketResponse {
    pub ticket_id: String,
}

#[derive(Serialize)]
pub struct OrderResponse {
    pub id: String,
    pub store_id: String,
    pub channel: String,
    pub status: String,
    pub total_amount: Money,
    pub discount_amount: Money,
    pub final_amount: Money,
    pub points_used: i64,
    pub points_earned: i64,
    pub payment_method: Option<String>,
    pub lines: Vec<OrderLineResponse>,
}

#[derive(Serialize)]
pub struct OrderLineResponse {
    pub product_id: String,
    pub name: String,
    pub quantity: u32,
    pub unit_price: Money,
    pub subtotal: Money,
}

impl From<Order> for OrderResponse {
    fn from(order: Order) -> Self {
        Self {
            id: order.id.to_string(),
            store_id: order.store_id.to_string(),
            channel: order.channel.as_str().to_string(),
            status: order.status.as_str().to_string(),
            total_amount: order.total_amount,
            discount_amount: order.discount_amount,
            final_amount: order.final_amount,
            points_used: order.points_used,
            points_earned: order.points_earned,
            payment_method: order.payment_method.map(|m| m.as_str().to_string()),
            lines: order
                .lines
                .into_iter()
                .map(|l| OrderLineResponse {
                    product_id: l.product_id.to_string(),
                    name: l.name,
                    quantity: l.quantity,
                    unit_price: l.unit_price,
                    subtotal: l.subtotal,
                })
                .collect(),
        }
    }
}

// -- Handlers --

/// POST /orders — accept an order creation request for async processing.
#[tracing::instrument(skip(state, headers, req))]
pub async fn create<L: Ledger, G: IdempotencyGuard>(
    State(state): State<Arc<AppState<L, G>>>,
    headers: HeaderMap,
    Json(req): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<TicketResponse>), ApiError> {
    let key = headers
        .get("Idempotency-Key")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::BadRequest("missing Idempotency-Key header".to_string()))?
        .to_string();

    let order = new_order_from_request(req)?;
    // Reject malformed orders synchronously; only well-formed requests
    // reach the queue.
    validate_lines(&order.lines).map_err(orchestrator::OrchestratorError::from)?;

    state.guard.claim(&key).await?;
    let ticket = Ticket::new(key.clone(), order);
    let ticket_id = ticket.ticket_id;
    if let Err(err) = state.queue.submit(ticket).await {
        // The claim must not outlive a ticket that never got queued.
        let _ = state.guard.release(&key).await;
        return Err(err.into());
    }

    Ok((
        StatusCode::ACCEPTED,
        Json(TicketResponse {
            ticket_id: ticket_id.to_string(),
        }),
    ))
}

/// GET /orders/:id — fetch an order.
#[tracing::instrument(skip(state))]
pub async fn get<L: Ledger, G: IdempotencyGuard>(
    State(state): State<Arc<AppState<L, G>>>,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id = parse_id::<OrderId>(&id, "order id")?;
    let order = state.orchestrator.get_order(order_id).await?;
    Ok(Json(order.into()))
}

/// PUT /orders/:id/items — replace the order's line collection.
#[tracing::instrument(skip(state, req))]
pub async fn update_items<L: Ledger, G: IdempotencyGuard>(
    State(state): State<Arc<AppState<L, G>>>,
    Path(id): Path<String>,
    Json(req): Json<UpdateLinesRequest>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id = parse_id::<OrderId>(&id, "order id")?;
    let lines = req
        .lines
        .into_iter()
        .map(order_line_from_request)
        .collect::<Result<Vec<_>, _>>()?;

    let order = state.orchestrator.update_order(order_id, lines).await?;
    Ok(Json(order.into()))
}

/// POST /orders/:id/payment — settle the order.
#[tracing::instrument(skip(state, req))]
pub async fn pay<L: Ledger, G: IdempotencyGuard>(
    State(state): State<Arc<AppState<L, G>>>,
    Path(id): Path<String>,
    Json(req): Json<PayRequest>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id = parse_id::<OrderId>(&id, "order id")?;
    let member_id = req
        .member_id
        .as_deref()
        .map(|s| parse_id::<MemberId>(s, "member id"))
        .transpose()?;

    let order = state
        .orchestrator
        .pay(
            order_id,
            PaymentRequest {
                payment_method: req.payment_method,
                member_id,
                points_to_use: req.points_to_use,
            },
        )
        .await?;
    Ok(Json(order.into()))
}

/// POST /orders/:id/accept — staff accepts an online order.
#[tracing::instrument(skip(state))]
pub async fn accept<L: Ledger, G: IdempotencyGuard>(
    State(state): State<Arc<AppState<L, G>>>,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id = parse_id::<OrderId>(&id, "order id")?;
    let order = state.orchestrator.accept(order_id).await?;
    Ok(Json(order.into()))
}

/// POST /orders/:id/ready — mark fulfilment finished.
#[tracing::instrument(skip(state))]
pub async fn ready<L: Ledger, G: IdempotencyGuard>(
    State(state): State<Arc<AppState<L, G>>>,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id = parse_id::<OrderId>(&id, "order id")?;
    let order = state.orchestrator.mark_ready(order_id).await?;
    Ok(Json(order.into()))
}

/// POST /orders/:id/status — drive the order to a terminal status.
#[tracing::instrument(skip(state, req))]
pub async fn update_status<L: Ledger, G: IdempotencyGuard>(
    State(state): State<Arc<AppState<L, G>>>,
    Path(id): Path<String>,
    Json(req): Json<UpdateStatusRequest>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id = parse_id::<OrderId>(&id, "order id")?;
    let target = OrderStatus::from_wire(&req.target)
        .ok_or_else(|| ApiError::BadRequest(format!("unknown status: {}", req.target)))?;

    let order = state.orchestrator.update_status(order_id, target).await?;
    Ok(Json(order.into()))
}

// -- Conversions --

fn new_order_from_request(req: CreateOrderRequest) -> Result<NewOrder, ApiError> {
    let channel = OrderChannel::from_wire(&req.channel)
        .ok_or_else(|| ApiError::BadRequest(format!("unknown channel: {}", req.channel)))?;
    let lines = req
        .lines
        .into_iter()
        .map(order_line_from_request)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(NewOrder {
        brand_id: parse_id::<BrandId>(&req.brand_id, "brand id")?,
        store_id: parse_id::<StoreId>(&req.store_id, "store id")?,
        channel,
        staff_id: req
            .staff_id
            .as_deref()
            .map(|s| parse_id::<StaffId>(s, "staff id"))
            .transpose()?,
        member_id: req
            .member_id
            .as_deref()
            .map(|s| parse_id::<MemberId>(s, "member id"))
            .transpose()?,
        lines,
    })
}

fn order_line_from_request(req: OrderLineRequest) -> Result<OrderLine, ApiError> {
    let consumes = req
        .consumes
        .into_iter()
        .map(|m| {
            Ok(MaterialUse {
                item_id: parse_id::<ItemId>(&m.item_id, "item id")?,
                quantity: m.quantity,
            })
        })
        .collect::<Result<Vec<_>, ApiError>>()?;

    Ok(OrderLine::new(
        req.product_id,
        req.name,
        req.quantity,
        Money::new(req.unit_price),
        req.options
            .into_iter()
            .map(|o| LineOption {
                name: o.name,
                price_delta: Money::new(o.price_delta),
            })
            .collect(),
        consumes,
    ))
}

pub(crate) fn parse_id<T: From<uuid::Uuid>>(id: &str, what: &str) -> Result<T, ApiError> {
    let uuid = uuid::Uuid::parse_str(id)
        .map_err(|e| ApiError::BadRequest(format!("invalid {what}: {e}")))?;
    Ok(T::from(uuid))
}
