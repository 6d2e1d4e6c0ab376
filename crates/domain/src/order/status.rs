//! Order lifecycle statuses and the actions dispatched against them.

use serde::{Deserialize, Serialize};

/// The status of an order in its lifecycle.
///
/// Status transitions:
/// ```text
/// Pending ────────────┬──► Preparing ──► ReadyForPickup ──► Closed
/// Held ───────────────┤        │                │
/// AwaitingAcceptance ─┤        ├──► Closed      │
///                     └────────┴────────────────┴──► Cancelled
/// ```
///
/// `Closed` and `Cancelled` are terminal; no action is legal once an order
/// reaches either of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Counter order awaiting payment; items can still be edited.
    Pending,

    /// Open tab; like `Pending` but held until the guest settles.
    Held,

    /// Online order waiting for staff acceptance.
    AwaitingAcceptance,

    /// Paid or accepted; fulfilment in progress.
    Preparing,

    /// Fulfilment done, waiting for hand-over.
    ReadyForPickup,

    /// Completed and settled (terminal).
    Closed,

    /// Cancelled before completion (terminal).
    Cancelled,
}

impl OrderStatus {
    /// Returns true if no further transition is legal from this status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Closed | OrderStatus::Cancelled)
    }

    /// Returns the status name as used on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Held => "HELD",
            OrderStatus::AwaitingAcceptance => "AWAITING_ACCEPTANCE",
            OrderStatus::Preparing => "PREPARING",
            OrderStatus::ReadyForPickup => "READY_FOR_PICKUP",
            OrderStatus::Closed => "CLOSED",
            OrderStatus::Cancelled => "CANCELLED",
        }
    }

    /// Parses a wire name back into a status.
    pub fn from_wire(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(OrderStatus::Pending),
            "HELD" => Some(OrderStatus::Held),
            "AWAITING_ACCEPTANCE" => Some(OrderStatus::AwaitingAcceptance),
            "PREPARING" => Some(OrderStatus::Preparing),
            "READY_FOR_PICKUP" => Some(OrderStatus::ReadyForPickup),
            "CLOSED" => Some(OrderStatus::Closed),
            "CANCELLED" => Some(OrderStatus::Cancelled),
            _ => None,
        }
    }

    /// All statuses, for exhaustive policy-table tests.
    pub const ALL: [OrderStatus; 7] = [
        OrderStatus::Pending,
        OrderStatus::Held,
        OrderStatus::AwaitingAcceptance,
        OrderStatus::Preparing,
        OrderStatus::ReadyForPickup,
        OrderStatus::Closed,
        OrderStatus::Cancelled,
    ];
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A business action dispatched through the status policy table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OrderAction {
    /// Replace the line collection wholesale.
    Update,
    /// Settle payment and move to preparation.
    Pay,
    /// Staff accepts an online order.
    Accept,
    /// Fulfilment finished, order waiting for hand-over.
    MarkReady,
    /// Close the order.
    Complete,
    /// Cancel the order.
    Cancel,
}

impl OrderAction {
    /// Returns the action name used in error messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderAction::Update => "update",
            OrderAction::Pay => "pay",
            OrderAction::Accept => "accept",
            OrderAction::MarkReady => "mark_ready",
            OrderAction::Complete => "complete",
            OrderAction::Cancel => "cancel",
        }
    }

    /// All actions, for exhaustive policy-table tests.
    pub const ALL: [OrderAction; 6] = [
        OrderAction::Update,
        OrderAction::Pay,
        OrderAction::Accept,
        OrderAction::MarkReady,
        OrderAction::Complete,
        OrderAction::Cancel,
    ];
}

impl std::fmt::Display for OrderAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
