//! Ticket consumer.
//!
//! Business-rule failures (validation, not-found, insufficient stock,
//! illegal transition) dead-letter the ticket exactly once and release
//! its idempotency claim so a corrected retry may pass. Transient storage
//! failures retry with linear backoff up to a bounded attempt count.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use common::TicketId;
use ledger::{Ledger, LedgerError};
use orchestrator::{Orchestrator, OrchestratorError};
use orchestrator::services::{OrderNotifier, PointsService, PromotionService};
use tokio::sync::mpsc;

use crate::idempotency::IdempotencyGuard;
use crate::ticket::Ticket;

/// Default bound on processing attempts per ticket.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// A ticket that could not be processed.
#[derive(Debug, Clone)]
pub struct DeadLetter {
    pub ticket_id: TicketId,
    pub idempotency_key: String,
    pub error: String,
    pub attempts: u32,
}

/// Shared sink of failed tickets, inspectable by operators and tests.
#[derive(Debug, Clone, Default)]
pub struct DeadLetterQueue {
    entries: Arc<Mutex<Vec<DeadLetter>>>,
}

impl DeadLetterQueue {
    /// Creates an empty dead-letter queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of dead letters.
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    /// Returns true when no ticket has dead-lettered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns a snapshot of all dead letters.
    pub fn entries(&self) -> Vec<DeadLetter> {
        self.entries.lock().unwrap().clone()
    }

    fn push(&self, entry: DeadLetter) {
        self.entries.lock().unwrap().push(entry);
    }
}

/// Consumes tickets from the queue and drives order creation.
pub struct IngestWorker<L, P, R, N, G>
where
    L: Ledger,
    P: PointsService,
    R: PromotionService,
    N: OrderNotifier,
    G: IdempotencyGuard,
{
    orchestrator: Arc<Orchestrator<L, P, R, N>>,
    guard: G,
    receiver: mpsc::Receiver<Ticket>,
    dead_letters: DeadLetterQueue,
    max_attempts: u32,
    retry_delay: Duration,
}

impl<L, P, R, N, G> IngestWorker<L, P, R, N, G>
where
    L: Ledger,
    P: PointsService,
    R: PromotionService,
    N: OrderNotifier,
    G: IdempotencyGuard,
{
    /// Creates a worker over the given orchestrator and guard.
    pub fn new(
        orchestrator: Arc<Orchestrator<L, P, R, N>>,
        guard: G,
        receiver: mpsc::Receiver<Ticket>,
        dead_letters: DeadLetterQueue,
    ) -> Self {
        Self {
            orchestrator,
            guard,
            receiver,
            dead_letters,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_delay: Duration::from_millis(200),
        }
    }

    /// Overrides the retry policy.
    pub fn with_retry(mut self, max_attempts: u32, retry_delay: Duration) -> Self {
        self.max_attempts = max_attempts.max(1);
        self.retry_delay = retry_delay;
        self
    }

    /// Runs until the submission side of the queue is dropped.
    pub async fn run(mut self) {
        while let Some(ticket) = self.receiver.recv().await {
            self.process(ticket).await;
        }
        tracing::info!("ticket queue closed, ingest worker stopping");
    }

    #[tracing::instrument(skip(self, ticket), fields(ticket_id = %ticket.ticket_id))]
    async fn process(&self, ticket: Ticket) {
        let mut attempts = 0;
        loop {
            attempts += 1;
            match self.orchestrator.create_order(ticket.order.clone()).await {
                Ok(order) => {
                    // Claim retained: replays of this key stay blocked.
                    tracing::info!(order_id = %order.id, attempts, "ticket processed");
                    metrics::counter!("ingest_tickets_processed_total").increment(1);
                    return;
                }
                Err(error) if is_transient(&error) && attempts < self.max_attempts => {
                    tracing::warn!(%error, attempts, "transient failure, retrying ticket");
                    tokio::time::sleep(self.retry_delay * attempts).await;
                }
                Err(error) => {
                    self.dead_letter(&ticket, error, attempts).await;
                    return;
                }
            }
        }
    }

    async fn dead_letter(&self, ticket: &Ticket, error: OrchestratorError, attempts: u32) {
        if error.is_fatal() {
            tracing::error!(%error, ticket_id = %ticket.ticket_id, "fatal error processing ticket");
        } else {
            tracing::warn!(%error, ticket_id = %ticket.ticket_id, attempts, "ticket dead-lettered");
        }
        if let Err(release_error) = self.guard.release(&ticket.idempotency_key).await {
            tracing::warn!(error = %release_error, "failed to release idempotency claim");
        }
        self.dead_letters.push(DeadLetter {
            ticket_id: ticket.ticket_id,
            idempotency_key: ticket.idempotency_key.clone(),
            error: error.to_string(),
            attempts,
        });
        metrics::counter!("ingest_dead_letters_total").increment(1);
    }
}

/// Storage-level failures are worth retrying; business rejections and
/// fatal invariant violations are not.
fn is_transient(error: &OrchestratorError) -> bool {
    let ledger_error = match error {
        OrchestratorError::Ledger(e) => e,
        OrchestratorError::Inventory(inventory::InventoryError::Ledger(e)) => e,
        _ => return false,
    };
    matches!(
        ledger_error,
        LedgerError::Database(_) | LedgerError::Unavailable(_)
    )
}
