//! Order notification trait and in-memory implementation.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use domain::OrderEvent;

use crate::error::OrchestratorError;

/// Trait for forwarding committed order events to subscribers (kitchen
/// displays, status pages).
///
/// Called after the enclosing transaction commits; failures are logged
/// by the orchestrator, never rolled back into the order operation.
#[async_trait]
pub trait OrderNotifier: Send + Sync {
    /// Delivers a batch of events from one committed operation.
    async fn notify(&self, events: &[OrderEvent]) -> Result<(), OrchestratorError>;
}

#[derive(Debug, Default)]
struct InMemoryNotifierState {
    events: Vec<OrderEvent>,
    fail_on_notify: bool,
}

/// In-memory notifier recording delivered events for assertions.
#[derive(Debug, Clone, Default)]
pub struct InMemoryNotifier {
    state: Arc<RwLock<InMemoryNotifierState>>,
}

impl InMemoryNotifier {
    /// Creates a new empty notifier.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all events delivered so far.
    pub fn events(&self) -> Vec<OrderEvent> {
        self.state.read().unwrap().events.clone()
    }

    /// Returns the delivered event type names, in delivery order.
    pub fn event_types(&self) -> Vec<&'static str> {
        self.state
            .read()
            .unwrap()
            .events
            .iter()
            .map(|e| e.event_type())
            .collect()
    }

    /// Configures the notifier to fail on the next delivery.
    pub fn set_fail_on_notify(&self, fail: bool) {
        self.state.write().unwrap().fail_on_notify = fail;
    }
}

#[async_trait]
impl OrderNotifier for InMemoryNotifier {
    async fn notify(&self, events: &[OrderEvent]) -> Result<(), OrchestratorError> {
        let mut state = self.state.write().unwrap();
        if state.fail_on_notify {
            return Err(OrchestratorError::Notification(
                "subscriber unreachable".to_string(),
            ));
        }
        state.events.extend_from_slice(events);
        Ok(())
    }
}
