//! API error types with HTTP response mapping.
//!
//! Client-correctable failures carry a stable machine `code` alongside
//! the message. Fatal invariant violations are answered with an opaque
//! body; the full detail goes to the error log only.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use domain::OrderError;
use ingest::IngestError;
use inventory::InventoryError;
use ledger::LedgerError;
use orchestrator::OrchestratorError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// Orchestration error.
    Orchestrator(OrchestratorError),
    /// Stock allocation error.
    Inventory(InventoryError),
    /// Ingestion error.
    Ingest(IngestError),
    /// Internal server error.
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            ApiError::Orchestrator(err) => orchestrator_error_to_response(err),
            ApiError::Inventory(err) => inventory_error_to_response(err),
            ApiError::Ingest(err) => ingest_error_to_response(err),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal",
                    "unexpected error".to_string(),
                )
            }
        };

        let body = serde_json::json!({ "error": message, "code": code });
        (status, axum::Json(body)).into_response()
    }
}

fn orchestrator_error_to_response(err: OrchestratorError) -> (StatusCode, &'static str, String) {
    match &err {
        OrchestratorError::Order(order_err) => match order_err {
            OrderError::InvalidTransition { .. } => {
                (StatusCode::CONFLICT, "illegal_transition", err.to_string())
            }
            OrderError::EmptyLines
            | OrderError::InvalidQuantity { .. }
            | OrderError::NegativePrice { .. }
            | OrderError::InvalidMaterialQuantity { .. }
            | OrderError::UnknownPaymentMethod { .. }
            | OrderError::InvalidPoints { .. } => {
                (StatusCode::BAD_REQUEST, "validation", err.to_string())
            }
        },
        OrchestratorError::Inventory(inv) => return inventory_error_to_response_ref(inv, &err),
        OrchestratorError::Ledger(ledger_err) => ledger_error_to_response(ledger_err, &err),
        OrchestratorError::UnknownMember { .. } => {
            (StatusCode::NOT_FOUND, "unknown_member", err.to_string())
        }
        OrchestratorError::InsufficientPoints { .. } => {
            (StatusCode::BAD_REQUEST, "insufficient_points", err.to_string())
        }
        OrchestratorError::MemberRequired => {
            (StatusCode::BAD_REQUEST, "member_required", err.to_string())
        }
        OrchestratorError::UnsupportedStatusTarget { .. } => {
            (StatusCode::BAD_REQUEST, "validation", err.to_string())
        }
        OrchestratorError::PointsService(_)
        | OrchestratorError::PromotionService(_)
        | OrchestratorError::Notification(_) => internal(&err),
    }
}

fn inventory_error_to_response(err: InventoryError) -> (StatusCode, &'static str, String) {
    inventory_error_to_response_ref(&err, &err)
}

fn inventory_error_to_response_ref(
    err: &InventoryError,
    display: &dyn std::fmt::Display,
) -> (StatusCode, &'static str, String) {
    match err {
        InventoryError::InvalidQuantity { .. } => {
            (StatusCode::BAD_REQUEST, "validation", display.to_string())
        }
        InventoryError::InsufficientStock { .. } => (
            StatusCode::BAD_REQUEST,
            "insufficient_stock",
            display.to_string(),
        ),
        // Fatal divergence: never leak detail to the client.
        InventoryError::StockDrift { .. } => internal(display),
        InventoryError::Ledger(ledger_err) => ledger_error_to_response(ledger_err, display),
    }
}

fn ledger_error_to_response(
    err: &LedgerError,
    display: &dyn std::fmt::Display,
) -> (StatusCode, &'static str, String) {
    match err {
        LedgerError::ItemNotFound { .. } => {
            (StatusCode::NOT_FOUND, "unknown_item", display.to_string())
        }
        LedgerError::OrderNotFound { .. } => {
            (StatusCode::NOT_FOUND, "unknown_order", display.to_string())
        }
        _ => internal(display),
    }
}

fn ingest_error_to_response(err: IngestError) -> (StatusCode, &'static str, String) {
    match &err {
        IngestError::DuplicateRequest { .. } => {
            (StatusCode::CONFLICT, "duplicate_request", err.to_string())
        }
        _ => internal(&err),
    }
}

fn internal(err: &dyn std::fmt::Display) -> (StatusCode, &'static str, String) {
    tracing::error!(error = %err, "internal server error");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "internal",
        "unexpected error".to_string(),
    )
}

impl From<OrchestratorError> for ApiError {
    fn from(err: OrchestratorError) -> Self {
        ApiError::Orchestrator(err)
    }
}

impl From<InventoryError> for ApiError {
    fn from(err: InventoryError) -> Self {
        ApiError::Inventory(err)
    }
}

impl From<IngestError> for ApiError {
    fn from(err: IngestError) -> Self {
        ApiError::Ingest(err)
    }
}
