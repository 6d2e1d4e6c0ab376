//! Status policy table: one stateless policy object per lifecycle status.
//!
//! Every business action is dispatched to the policy bound to the order's
//! current status. The trait default-implements each action as a
//! fail-closed rejection naming the current status; a status's policy
//! overrides only the actions it supports, so anything unlisted is
//! rejected rather than silently ignored.

use chrono::{DateTime, Utc};
use common::MemberId;

use crate::money::Money;

use super::{
    OrderAction, OrderError, OrderEvent, OrderStatus, PaymentMethod,
    types::{Order, OrderLine, validate_lines},
};

/// Inputs to the `pay` action, resolved by the orchestrator inside the
/// same transaction (payment code parse, member lookup, point redemption,
/// promotion computation).
#[derive(Debug, Clone)]
pub struct PaymentContext {
    pub payment_method: PaymentMethod,
    pub member_id: Option<MemberId>,
    /// Points redeemed against this order.
    pub points_used: i64,
    /// Discount granted for the redeemed points.
    pub points_discount: Money,
    /// Best applicable promotion discount.
    pub promo_discount: Money,
}

/// Policy object for one lifecycle status.
pub trait StatusPolicy: Send + Sync {
    /// The status this policy is bound to.
    fn status(&self) -> OrderStatus;

    /// Returns true if this status supports the given action.
    ///
    /// Lets callers fail fast before performing collaborator side effects
    /// for an action the status will reject anyway.
    fn supports(&self, _action: OrderAction) -> bool {
        false
    }

    /// Replaces the line collection wholesale.
    fn update(&self, _order: &mut Order, _lines: Vec<OrderLine>) -> PolicyResult {
        Err(self.rejected(OrderAction::Update))
    }

    /// Settles payment and moves the order to preparation.
    fn pay(&self, _order: &mut Order, _ctx: PaymentContext, _now: DateTime<Utc>) -> PolicyResult {
        Err(self.rejected(OrderAction::Pay))
    }

    /// Staff accepts an online order.
    fn accept(&self, _order: &mut Order, _now: DateTime<Utc>) -> PolicyResult {
        Err(self.rejected(OrderAction::Accept))
    }

    /// Marks fulfilment as finished, waiting for hand-over.
    fn mark_ready(&self, _order: &mut Order, _now: DateTime<Utc>) -> PolicyResult {
        Err(self.rejected(OrderAction::MarkReady))
    }

    /// Closes the order.
    fn complete(
        &self,
        _order: &mut Order,
        _points_earned: i64,
        _now: DateTime<Utc>,
    ) -> PolicyResult {
        Err(self.rejected(OrderAction::Complete))
    }

    /// Cancels the order.
    fn cancel(&self, _order: &mut Order, _now: DateTime<Utc>) -> PolicyResult {
        Err(self.rejected(OrderAction::Cancel))
    }

    /// Builds the fail-closed rejection for an unsupported action.
    fn rejected(&self, action: OrderAction) -> OrderError {
        OrderError::InvalidTransition {
            status: self.status(),
            action,
        }
    }
}

/// Events to forward to the notification collaborator after commit.
pub type PolicyResult = Result<Vec<OrderEvent>, OrderError>;

/// Selects the policy for a status. Pure; no registry involved.
pub fn policy_for(status: OrderStatus) -> &'static dyn StatusPolicy {
    match status {
        OrderStatus::Pending => &PendingPolicy,
        OrderStatus::Held => &HeldPolicy,
        OrderStatus::AwaitingAcceptance => &AwaitingAcceptancePolicy,
        OrderStatus::Preparing => &PreparingPolicy,
        OrderStatus::ReadyForPickup => &ReadyForPickupPolicy,
        OrderStatus::Closed => &ClosedPolicy,
        OrderStatus::Cancelled => &CancelledPolicy,
    }
}

// -- Shared transition bodies --
//
// Pending and Held share the editable-order behaviour, so the actual
// mutations live in free functions and the policies stay declarative.

fn apply_update(order: &mut Order, lines: Vec<OrderLine>) -> PolicyResult {
    validate_lines(&lines)?;
    order.lines = lines;
    order.discount_amount = Money::zero();
    order.points_used = 0;
    order.recompute_totals();
    Ok(vec![])
}

fn apply_pay(order: &mut Order, ctx: PaymentContext, now: DateTime<Utc>) -> PolicyResult {
    let from = order.status;
    order.payment_method = Some(ctx.payment_method);
    if ctx.member_id.is_some() {
        order.member_id = ctx.member_id;
    }
    order.points_used = ctx.points_used;
    order.discount_amount = ctx.points_discount + ctx.promo_discount;
    order.final_amount = order.total_amount.saturating_sub(order.discount_amount);
    order.status = OrderStatus::Preparing;
    Ok(vec![
        OrderEvent::StatusChanged {
            order_id: order.id,
            store_id: order.store_id,
            from,
            to: order.status,
            at: now,
        },
        OrderEvent::KitchenOrderAdded {
            order_id: order.id,
            store_id: order.store_id,
        },
    ])
}

fn apply_cancel(order: &mut Order, now: DateTime<Utc>) -> PolicyResult {
    let from = order.status;
    order.status = OrderStatus::Cancelled;
    let mut events = vec![OrderEvent::StatusChanged {
        order_id: order.id,
        store_id: order.store_id,
        from,
        to: order.status,
        at: now,
    }];
    // Orders already visible to fulfilment staff need an explicit removal.
    if matches!(
        from,
        OrderStatus::AwaitingAcceptance | OrderStatus::Preparing | OrderStatus::ReadyForPickup
    ) {
        events.push(OrderEvent::KitchenOrderRemoved {
            order_id: order.id,
            store_id: order.store_id,
        });
    }
    Ok(events)
}

fn apply_complete(order: &mut Order, points_earned: i64, now: DateTime<Utc>) -> PolicyResult {
    let from = order.status;
    order.completed_at = Some(now);
    order.points_earned = points_earned;
    order.status = OrderStatus::Closed;
    Ok(vec![OrderEvent::StatusChanged {
        order_id: order.id,
        store_id: order.store_id,
        from,
        to: order.status,
        at: now,
    }])
}

// -- Per-status policies --

/// Counter order awaiting payment.
struct PendingPolicy;

impl StatusPolicy for PendingPolicy {
    fn status(&self) -> OrderStatus {
        OrderStatus::Pending
    }

    fn supports(&self, action: OrderAction) -> bool {
        matches!(
            action,
            OrderAction::Update | OrderAction::Pay | OrderAction::Cancel
        )
    }

    fn update(&self, order: &mut Order, lines: Vec<OrderLine>) -> PolicyResult {
        apply_update(order, lines)
    }

    fn pay(&self, order: &mut Order, ctx: PaymentContext, now: DateTime<Utc>) -> PolicyResult {
        apply_pay(order, ctx, now)
    }

    fn cancel(&self, order: &mut Order, now: DateTime<Utc>) -> PolicyResult {
        apply_cancel(order, now)
    }
}

/// Open tab; behaves like `Pending` until settled.
struct HeldPolicy;

impl StatusPolicy for HeldPolicy {
    fn status(&self) -> OrderStatus {
        OrderStatus::Held
    }

    fn supports(&self, action: OrderAction) -> bool {
        matches!(
            action,
            OrderAction::Update | OrderAction::Pay | OrderAction::Cancel
        )
    }

    fn update(&self, order: &mut Order, lines: Vec<OrderLine>) -> PolicyResult {
        apply_update(order, lines)
    }

    fn pay(&self, order: &mut Order, ctx: PaymentContext, now: DateTime<Utc>) -> PolicyResult {
        apply_pay(order, ctx, now)
    }

    fn cancel(&self, order: &mut Order, now: DateTime<Utc>) -> PolicyResult {
        apply_cancel(order, now)
    }
}

/// Online order waiting for staff acceptance.
struct AwaitingAcceptancePolicy;

impl StatusPolicy for AwaitingAcceptancePolicy {
    fn status(&self) -> OrderStatus {
        OrderStatus::AwaitingAcceptance
    }

    fn supports(&self, action: OrderAction) -> bool {
        matches!(action, OrderAction::Accept | OrderAction::Cancel)
    }

    fn accept(&self, order: &mut Order, now: DateTime<Utc>) -> PolicyResult {
        let from = order.status;
        order.status = OrderStatus::Preparing;
        Ok(vec![
            OrderEvent::StatusChanged {
                order_id: order.id,
                store_id: order.store_id,
                from,
                to: order.status,
                at: now,
            },
            OrderEvent::KitchenOrderAdded {
                order_id: order.id,
                store_id: order.store_id,
            },
        ])
    }

    fn cancel(&self, order: &mut Order, now: DateTime<Utc>) -> PolicyResult {
        apply_cancel(order, now)
    }
}

/// Fulfilment in progress.
struct PreparingPolicy;

impl StatusPolicy for PreparingPolicy {
    fn status(&self) -> OrderStatus {
        OrderStatus::Preparing
    }

    fn supports(&self, action: OrderAction) -> bool {
        matches!(
            action,
            OrderAction::MarkReady | OrderAction::Complete | OrderAction::Cancel
        )
    }

    fn mark_ready(&self, order: &mut Order, now: DateTime<Utc>) -> PolicyResult {
        let from = order.status;
        order.status = OrderStatus::ReadyForPickup;
        Ok(vec![OrderEvent::StatusChanged {
            order_id: order.id,
            store_id: order.store_id,
            from,
            to: order.status,
            at: now,
        }])
    }

    fn complete(&self, order: &mut Order, points_earned: i64, now: DateTime<Utc>) -> PolicyResult {
        apply_complete(order, points_earned, now)
    }

    fn cancel(&self, order: &mut Order, now: DateTime<Utc>) -> PolicyResult {
        apply_cancel(order, now)
    }
}

/// Waiting for hand-over.
struct ReadyForPickupPolicy;

impl StatusPolicy for ReadyForPickupPolicy {
    fn status(&self) -> OrderStatus {
        OrderStatus::ReadyForPickup
    }

    fn supports(&self, action: OrderAction) -> bool {
        matches!(action, OrderAction::Complete | OrderAction::Cancel)
    }

    fn complete(&self, order: &mut Order, points_earned: i64, now: DateTime<Utc>) -> PolicyResult {
        apply_complete(order, points_earned, now)
    }

    fn cancel(&self, order: &mut Order, now: DateTime<Utc>) -> PolicyResult {
        apply_cancel(order, now)
    }
}

/// Terminal: completed and settled. Everything rejects.
struct ClosedPolicy;

impl StatusPolicy for ClosedPolicy {
    fn status(&self) -> OrderStatus {
        OrderStatus::Closed
    }
}

/// Terminal: cancelled. Everything rejects.
struct CancelledPolicy;

impl StatusPolicy for CancelledPolicy {
    fn status(&self) -> OrderStatus {
        OrderStatus::Cancelled
    }
}
