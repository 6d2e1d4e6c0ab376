//! Async order ingestion.
//!
//! The HTTP surface claims an idempotency key, enqueues a ticket on a
//! bounded queue and answers immediately; the [`IngestWorker`] drains the
//! queue, creating orders through the orchestrator and dead-lettering
//! tickets that fail business rules.

pub mod error;
pub mod idempotency;
pub mod ticket;
pub mod worker;

pub use error::IngestError;
pub use idempotency::{
    DEFAULT_TTL, IdempotencyGuard, InMemoryIdempotencyGuard, PostgresIdempotencyGuard,
};
pub use ticket::{Ticket, TicketQueue};
pub use worker::{DEFAULT_MAX_ATTEMPTS, DeadLetter, DeadLetterQueue, IngestWorker};
