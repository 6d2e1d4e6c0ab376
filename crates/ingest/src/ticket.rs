//! Creation tickets and the bounded in-process queue.

use common::TicketId;
use orchestrator::NewOrder;
use tokio::sync::mpsc;

use crate::error::IngestError;

/// An accepted order-creation request awaiting processing.
#[derive(Debug, Clone)]
pub struct Ticket {
    pub ticket_id: TicketId,
    /// The claim backing this ticket; released if processing fails on a
    /// business rule.
    pub idempotency_key: String,
    pub order: NewOrder,
}

impl Ticket {
    /// Wraps an order request into a freshly numbered ticket.
    pub fn new(idempotency_key: impl Into<String>, order: NewOrder) -> Self {
        Self {
            ticket_id: TicketId::new(),
            idempotency_key: idempotency_key.into(),
            order,
        }
    }
}

/// Sender half of the ticket queue.
///
/// `submit` applies backpressure: it waits for queue capacity rather than
/// dropping tickets.
#[derive(Debug, Clone)]
pub struct TicketQueue {
    sender: mpsc::Sender<Ticket>,
}

impl TicketQueue {
    /// Creates a bounded queue, returning the submission handle and the
    /// receiver to hand to the worker.
    pub fn bounded(capacity: usize) -> (Self, mpsc::Receiver<Ticket>) {
        let (sender, receiver) = mpsc::channel(capacity);
        (Self { sender }, receiver)
    }

    /// Enqueues a ticket, waiting for capacity.
    pub async fn submit(&self, ticket: Ticket) -> Result<(), IngestError> {
        self.sender
            .send(ticket)
            .await
            .map_err(|_| IngestError::QueueClosed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{BrandId, StoreId};
    use domain::OrderChannel;

    fn order_request() -> NewOrder {
        NewOrder {
            brand_id: BrandId::new(),
            store_id: StoreId::new(),
            channel: OrderChannel::Counter,
            staff_id: None,
            member_id: None,
            lines: vec![],
        }
    }

    #[tokio::test]
    async fn test_submit_and_receive() {
        let (queue, mut receiver) = TicketQueue::bounded(4);
        let ticket = Ticket::new("key-1", order_request());
        let id = ticket.ticket_id;

        queue.submit(ticket).await.unwrap();

        let received = receiver.recv().await.unwrap();
        assert_eq!(received.ticket_id, id);
        assert_eq!(received.idempotency_key, "key-1");
    }

    #[tokio::test]
    async fn test_submit_after_shutdown_fails() {
        let (queue, receiver) = TicketQueue::bounded(1);
        drop(receiver);

        let err = queue
            .submit(Ticket::new("key-1", order_request()))
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::QueueClosed));
    }
}
