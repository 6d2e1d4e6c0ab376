//! Order orchestration layer.
//!
//! Exposes the [`Orchestrator`] facade that sequences the order state
//! machine, the stock allocator and the external collaborators (points,
//! promotions, notifications) inside one ledger transaction per
//! operation.

pub mod error;
pub mod orchestrator;
pub mod services;

pub use error::OrchestratorError;
pub use orchestrator::{NewOrder, Orchestrator, PaymentRequest};
pub use services::{
    InMemoryNotifier, InMemoryPointsService, InMemoryPromotionService, OrderNotifier,
    PointsService, Promotion, PromotionService,
};
