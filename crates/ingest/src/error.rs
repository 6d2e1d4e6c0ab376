//! Ingestion errors.

use thiserror::Error;

/// Errors produced by the ingestion path.
#[derive(Debug, Error)]
pub enum IngestError {
    /// The idempotency key was already claimed within its window.
    #[error("duplicate request: key '{key}' is already claimed")]
    DuplicateRequest { key: String },

    /// The ticket queue has shut down.
    #[error("ticket queue is closed")]
    QueueClosed,

    /// Guard storage error.
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}
