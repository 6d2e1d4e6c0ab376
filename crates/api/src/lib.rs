//! HTTP API server with observability for the beverage POS backend.
//!
//! Provides REST endpoints for inventory and order lifecycle management,
//! with structured logging (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post, put};
use ingest::{
    DeadLetterQueue, IdempotencyGuard, IngestWorker, InMemoryIdempotencyGuard, TicketQueue,
};
use inventory::Allocator;
use ledger::{InMemoryLedger, Ledger};
use metrics_exporter_prometheus::PrometheusHandle;
use orchestrator::{
    InMemoryNotifier, InMemoryPointsService, InMemoryPromotionService, Orchestrator,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::Config;

pub use crate::routes::orders::AppState;

/// The ingest worker type produced by [`build_state`].
pub type Worker<L, G> = IngestWorker<
    L,
    InMemoryPointsService,
    InMemoryPromotionService,
    InMemoryNotifier,
    G,
>;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<L: Ledger, G: IdempotencyGuard>(
    state: Arc<AppState<L, G>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/items", post(routes::inventory::register_item::<L, G>))
        .route(
            "/stores/{store_id}/shipments",
            post(routes::inventory::add_shipment::<L, G>),
        )
        .route(
            "/stores/{store_id}/stock/{item_id}",
            get(routes::inventory::get_stock::<L, G>),
        )
        .route(
            "/stores/{store_id}/stock/{item_id}/deduct",
            post(routes::inventory::deduct::<L, G>),
        )
        .route("/orders", post(routes::orders::create::<L, G>))
        .route("/orders/{id}", get(routes::orders::get::<L, G>))
        .route("/orders/{id}/items", put(routes::orders::update_items::<L, G>))
        .route("/orders/{id}/payment", post(routes::orders::pay::<L, G>))
        .route("/orders/{id}/accept", post(routes::orders::accept::<L, G>))
        .route("/orders/{id}/ready", post(routes::orders::ready::<L, G>))
        .route(
            "/orders/{id}/status",
            post(routes::orders::update_status::<L, G>),
        )
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Wires the application state and its ingest worker over a ledger and
/// idempotency guard. The caller spawns the worker.
pub fn build_state<L: Ledger, G: IdempotencyGuard>(
    ledger: L,
    guard: G,
    config: &Config,
) -> (Arc<AppState<L, G>>, Worker<L, G>, DeadLetterQueue) {
    let points = InMemoryPointsService::new();
    let promotions = InMemoryPromotionService::new();
    let notifier = InMemoryNotifier::new();

    let (queue, receiver) = TicketQueue::bounded(config.ticket_queue_capacity);
    let dead_letters = DeadLetterQueue::new();

    let worker_orchestrator = Arc::new(Orchestrator::new(
        ledger.clone(),
        points.clone(),
        promotions.clone(),
        notifier.clone(),
    ));
    let worker = IngestWorker::new(
        worker_orchestrator,
        guard.clone(),
        receiver,
        dead_letters.clone(),
    );

    let state = Arc::new(AppState {
        orchestrator: Orchestrator::new(ledger.clone(), points, promotions, notifier),
        allocator: Allocator::new(ledger),
        queue,
        guard,
    });

    (state, worker, dead_letters)
}

/// Wires everything over the in-memory ledger (tests, local development).
pub fn build_in_memory_state(
    config: &Config,
) -> (
    Arc<AppState<InMemoryLedger, InMemoryIdempotencyGuard>>,
    Worker<InMemoryLedger, InMemoryIdempotencyGuard>,
    DeadLetterQueue,
) {
    build_state(
        InMemoryLedger::new(),
        InMemoryIdempotencyGuard::with_ttl(config.idempotency_ttl),
        config,
    )
}
