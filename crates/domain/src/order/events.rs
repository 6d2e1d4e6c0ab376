//! Notification events emitted by lifecycle transitions.
//!
//! Events are handed to the (external) notification collaborator after the
//! enclosing transaction commits; they carry just enough to drive kitchen
//! displays and status subscriptions.

use chrono::{DateTime, Utc};
use common::{OrderId, StoreId};
use serde::{Deserialize, Serialize};

use super::{OrderChannel, OrderStatus};

/// An event describing a committed order transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrderEvent {
    /// A new order was placed and persisted.
    Placed {
        order_id: OrderId,
        store_id: StoreId,
        channel: OrderChannel,
        at: DateTime<Utc>,
    },

    /// The order moved from one status to another.
    StatusChanged {
        order_id: OrderId,
        store_id: StoreId,
        from: OrderStatus,
        to: OrderStatus,
        at: DateTime<Utc>,
    },

    /// A new order entered preparation; fulfilment staff must pick it up.
    KitchenOrderAdded { order_id: OrderId, store_id: StoreId },

    /// An in-flight order was cancelled; fulfilment staff must drop it.
    KitchenOrderRemoved { order_id: OrderId, store_id: StoreId },
}

impl OrderEvent {
    /// Returns the event type name.
    pub fn event_type(&self) -> &'static str {
        match self {
            OrderEvent::Placed { .. } => "order_placed",
            OrderEvent::StatusChanged { .. } => "status_changed",
            OrderEvent::KitchenOrderAdded { .. } => "kitchen_order_added",
            OrderEvent::KitchenOrderRemoved { .. } => "kitchen_order_removed",
        }
    }

    /// Returns the order this event belongs to.
    pub fn order_id(&self) -> OrderId {
        match self {
            OrderEvent::Placed { order_id, .. }
            | OrderEvent::StatusChanged { order_id, .. }
            | OrderEvent::KitchenOrderAdded { order_id, .. }
            | OrderEvent::KitchenOrderRemoved { order_id, .. } => *order_id,
        }
    }
}
