//! Inventory endpoints: item registration, shipments, stock queries and
//! manual deductions.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::NaiveDate;
use common::{BrandId, ItemId, StaffId, StoreId};
use domain::MovementReason;
use ingest::IdempotencyGuard;
use inventory::ShipmentLine;
use ledger::Ledger;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::routes::orders::{AppState, parse_id};

// -- Request types --

#[derive(Deserialize)]
pub struct RegisterItemRequest {
    pub brand_id: String,
    pub name: String,
    pub unit: String,
}

#[derive(Deserialize)]
pub struct ShipmentRequest {
    pub brand_id: String,
    pub operator_id: Option<String>,
    pub lines: Vec<ShipmentLineRequest>,
}

#[derive(Deserialize)]
pub struct ShipmentLineRequest {
    pub item_id: String,
    pub quantity: Decimal,
    pub expiry_date: NaiveDate,
}

#[derive(Deserialize)]
pub struct DeductRequest {
    pub quantity: Decimal,
    /// Wire reason name (`WASTE`, `AUDIT`, `USAGE`).
    pub reason: String,
    pub operator_id: Option<String>,
}

// -- Response types --

#[derive(Serialize)]
pub struct ItemResponse {
    pub id: String,
    pub brand_id: String,
    pub name: String,
    pub unit: String,
    pub total_quantity: Decimal,
}

#[derive(Serialize)]
pub struct ShipmentResponse {
    pub shipment_id: String,
}

#[derive(Serialize)]
pub struct StockResponse {
    pub quantity: Decimal,
}

#[derive(Serialize)]
pub struct DeductResponse {
    pub deducted: Decimal,
    pub draws: Vec<BatchDrawResponse>,
}

#[derive(Serialize)]
pub struct BatchDrawResponse {
    pub batch_id: String,
    pub drawn: Decimal,
}

// -- Handlers --

/// POST /items — register a new material.
#[tracing::instrument(skip(state, req))]
pub async fn register_item<L: Ledger, G: IdempotencyGuard>(
    State(state): State<Arc<AppState<L, G>>>,
    Json(req): Json<RegisterItemRequest>,
) -> Result<(StatusCode, Json<ItemResponse>), ApiError> {
    let brand_id = parse_id::<BrandId>(&req.brand_id, "brand id")?;
    let item = state
        .allocator
        .register_item(brand_id, &req.name, &req.unit)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ItemResponse {
            id: item.id.to_string(),
            brand_id: item.brand_id.to_string(),
            name: item.name,
            unit: item.unit,
            total_quantity: item.total_quantity,
        }),
    ))
}

/// POST /stores/:store_id/shipments — receive a shipment.
#[tracing::instrument(skip(state, req))]
pub async fn add_shipment<L: Ledger, G: IdempotencyGuard>(
    State(state): State<Arc<AppState<L, G>>>,
    Path(store_id): Path<String>,
    Json(req): Json<ShipmentRequest>,
) -> Result<(StatusCode, Json<ShipmentResponse>), ApiError> {
    let store_id = parse_id::<StoreId>(&store_id, "store id")?;
    let brand_id = parse_id::<BrandId>(&req.brand_id, "brand id")?;
    let operator = req
        .operator_id
        .as_deref()
        .map(|s| parse_id::<StaffId>(s, "operator id"))
        .transpose()?;
    let lines = req
        .lines
        .into_iter()
        .map(|l| {
            Ok(ShipmentLine {
                item_id: parse_id::<ItemId>(&l.item_id, "item id")?,
                quantity: l.quantity,
                expiry_date: l.expiry_date,
            })
        })
        .collect::<Result<Vec<_>, ApiError>>()?;

    let shipment_id = state
        .allocator
        .add_shipment(brand_id, store_id, operator, lines)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ShipmentResponse {
            shipment_id: shipment_id.to_string(),
        }),
    ))
}

/// GET /stores/:store_id/stock/:item_id — per-store stock level.
#[tracing::instrument(skip(state))]
pub async fn get_stock<L: Ledger, G: IdempotencyGuard>(
    State(state): State<Arc<AppState<L, G>>>,
    Path((store_id, item_id)): Path<(String, String)>,
) -> Result<Json<StockResponse>, ApiError> {
    let store_id = parse_id::<StoreId>(&store_id, "store id")?;
    let item_id = parse_id::<ItemId>(&item_id, "item id")?;

    let quantity = state.allocator.current_stock(store_id, item_id).await?;
    Ok(Json(StockResponse { quantity }))
}

/// POST /stores/:store_id/stock/:item_id/deduct — manual deduction.
#[tracing::instrument(skip(state, req))]
pub async fn deduct<L: Ledger, G: IdempotencyGuard>(
    State(state): State<Arc<AppState<L, G>>>,
    Path((store_id, item_id)): Path<(String, String)>,
    Json(req): Json<DeductRequest>,
) -> Result<Json<DeductResponse>, ApiError> {
    let store_id = parse_id::<StoreId>(&store_id, "store id")?;
    let item_id = parse_id::<ItemId>(&item_id, "item id")?;
    let reason = MovementReason::from_wire(&req.reason)
        .ok_or_else(|| ApiError::BadRequest(format!("unknown reason: {}", req.reason)))?;
    let operator = req
        .operator_id
        .as_deref()
        .map(|s| parse_id::<StaffId>(s, "operator id"))
        .transpose()?;

    let draws = state
        .allocator
        .deduct(store_id, item_id, req.quantity, reason, operator)
        .await?;

    Ok(Json(DeductResponse {
        deducted: req.quantity,
        draws: draws
            .into_iter()
            .map(|d| BatchDrawResponse {
                batch_id: d.batch_id.to_string(),
                drawn: d.drawn,
            })
            .collect(),
    }))
}
