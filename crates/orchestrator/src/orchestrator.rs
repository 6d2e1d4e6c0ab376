//! The order orchestration facade.
//!
//! Sequences the status policy table, the points/promotion collaborators
//! and the stock allocator inside a single ledger transaction per
//! operation. Collaborator side effects for an action the current status
//! rejects are avoided by checking `supports` before calling out.

use std::collections::BTreeMap;

use chrono::Utc;
use common::{BrandId, ItemId, MemberId, OrderId, StaffId, StoreId};
use domain::{
    Money, MovementReason, Order, OrderAction, OrderChannel, OrderError, OrderEvent, OrderLine,
    OrderStatus, PaymentContext, PaymentMethod, policy_for, validate_lines,
};
use inventory::deduct_in_tx;
use ledger::{Ledger, LedgerError, LedgerTx};
use rust_decimal::Decimal;

use crate::error::OrchestratorError;
use crate::services::{OrderNotifier, PointsService, PromotionService};

/// Request to place a new order.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub brand_id: BrandId,
    pub store_id: StoreId,
    pub channel: OrderChannel,
    pub staff_id: Option<StaffId>,
    pub member_id: Option<MemberId>,
    pub lines: Vec<OrderLine>,
}

/// Request to settle an order.
#[derive(Debug, Clone)]
pub struct PaymentRequest {
    /// Wire payment code (`CASH`, `CARD`, `WALLET`).
    pub payment_method: String,
    pub member_id: Option<MemberId>,
    pub points_to_use: i64,
}

/// Facade over the order lifecycle.
pub struct Orchestrator<L, P, R, N>
where
    L: Ledger,
    P: PointsService,
    R: PromotionService,
    N: OrderNotifier,
{
    ledger: L,
    points: P,
    promotions: R,
    notifier: N,
}

impl<L, P, R, N> Orchestrator<L, P, R, N>
where
    L: Ledger,
    P: PointsService,
    R: PromotionService,
    N: OrderNotifier,
{
    /// Creates an orchestrator over the given ledger and collaborators.
    pub fn new(ledger: L, points: P, promotions: R, notifier: N) -> Self {
        Self {
            ledger,
            points,
            promotions,
            notifier,
        }
    }

    /// Returns a reference to the underlying ledger.
    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    /// Places a new order and deducts the materials it consumes.
    ///
    /// Order insert and all stock deductions share one transaction; an
    /// insufficient-stock rejection on any material leaves nothing
    /// persisted.
    #[tracing::instrument(skip(self, request), fields(store_id = %request.store_id))]
    pub async fn create_order(&self, request: NewOrder) -> Result<Order, OrchestratorError> {
        validate_lines(&request.lines).map_err(OrchestratorError::from)?;

        let now = Utc::now();
        let order = Order::new(
            OrderId::new(),
            request.brand_id,
            request.store_id,
            request.channel,
            request.staff_id,
            request.member_id,
            request.lines,
            now,
        );

        let mut tx = self.ledger.begin().await?;
        tx.insert_order(&order).await?;

        // Aggregate per-item consumption; the sorted map also fixes the
        // item lock order, so concurrent creations cannot deadlock.
        let mut usage: BTreeMap<ItemId, Decimal> = BTreeMap::new();
        for line in &order.lines {
            for material in &line.consumes {
                let total = material.quantity * Decimal::from(line.quantity);
                *usage.entry(material.item_id).or_insert(Decimal::ZERO) += total;
            }
        }
        for (item_id, quantity) in usage {
            deduct_in_tx(
                &mut tx,
                order.store_id,
                item_id,
                quantity,
                MovementReason::Usage,
                order.staff_id,
            )
            .await?;
        }

        tx.commit().await?;
        metrics::counter!("orders_created_total").increment(1);

        self.deliver(vec![OrderEvent::Placed {
            order_id: order.id,
            store_id: order.store_id,
            channel: order.channel,
            at: now,
        }])
        .await;
        Ok(order)
    }

    /// Fetches an order by id.
    pub async fn get_order(&self, order_id: OrderId) -> Result<Order, OrchestratorError> {
        self.ledger
            .get_order(order_id)
            .await?
            .ok_or(OrchestratorError::Ledger(LedgerError::OrderNotFound {
                order_id,
            }))
    }

    /// Replaces the order's line collection.
    #[tracing::instrument(skip(self, lines))]
    pub async fn update_order(
        &self,
        order_id: OrderId,
        lines: Vec<OrderLine>,
    ) -> Result<Order, OrchestratorError> {
        let mut tx = self.ledger.begin().await?;
        let mut order = tx.lock_order(order_id).await?;

        let events = policy_for(order.status).update(&mut order, lines)?;
        tx.update_order(&order).await?;
        tx.commit().await?;

        self.deliver(events).await;
        Ok(order)
    }

    /// Settles payment: resolves the payment code, redeems points, applies
    /// the best promotion, then dispatches `pay`.
    #[tracing::instrument(skip(self, request))]
    pub async fn pay(
        &self,
        order_id: OrderId,
        request: PaymentRequest,
    ) -> Result<Order, OrchestratorError> {
        let payment_method: PaymentMethod = request.payment_method.parse()?;
        if request.points_to_use < 0 {
            return Err(OrderError::InvalidPoints {
                points: request.points_to_use,
            }
            .into());
        }

        let mut tx = self.ledger.begin().await?;
        let mut order = tx.lock_order(order_id).await?;

        let policy = policy_for(order.status);
        if !policy.supports(OrderAction::Pay) {
            return Err(policy.rejected(OrderAction::Pay).into());
        }

        let member_id = request.member_id.or(order.member_id);
        let points_discount = if request.points_to_use > 0 {
            let member_id = member_id.ok_or(OrchestratorError::MemberRequired)?;
            self.points.redeem(member_id, request.points_to_use).await?
        } else {
            Money::zero()
        };
        let promo_discount = self
            .promotions
            .best_discount(order.brand_id, order.total_amount)
            .await?;

        let events = policy.pay(
            &mut order,
            PaymentContext {
                payment_method,
                member_id,
                points_used: request.points_to_use,
                points_discount,
                promo_discount,
            },
            Utc::now(),
        )?;
        let stored = match tx.update_order(&order).await {
            Ok(()) => tx.commit().await,
            Err(error) => Err(error),
        };
        if let Err(error) = stored {
            // The redemption already applied; hand the points back before
            // surfacing the storage error.
            if request.points_to_use > 0 {
                if let Some(member_id) = member_id {
                    self.return_points(member_id, request.points_to_use).await;
                }
            }
            return Err(error.into());
        }
        metrics::counter!("orders_paid_total").increment(1);

        self.deliver(events).await;
        Ok(order)
    }

    /// Staff accepts an online order.
    #[tracing::instrument(skip(self))]
    pub async fn accept(&self, order_id: OrderId) -> Result<Order, OrchestratorError> {
        let mut tx = self.ledger.begin().await?;
        let mut order = tx.lock_order(order_id).await?;

        let events = policy_for(order.status).accept(&mut order, Utc::now())?;
        tx.update_order(&order).await?;
        tx.commit().await?;

        self.deliver(events).await;
        Ok(order)
    }

    /// Marks fulfilment as finished, waiting for hand-over.
    #[tracing::instrument(skip(self))]
    pub async fn mark_ready(&self, order_id: OrderId) -> Result<Order, OrchestratorError> {
        let mut tx = self.ledger.begin().await?;
        let mut order = tx.lock_order(order_id).await?;

        let events = policy_for(order.status).mark_ready(&mut order, Utc::now())?;
        tx.update_order(&order).await?;
        tx.commit().await?;

        self.deliver(events).await;
        Ok(order)
    }

    /// Drives the order to a terminal status.
    ///
    /// `Closed` completes the order (earning points when a member is
    /// linked); `Cancelled` cancels it (refunding redeemed points). Any
    /// other target is rejected.
    #[tracing::instrument(skip(self))]
    pub async fn update_status(
        &self,
        order_id: OrderId,
        target: OrderStatus,
    ) -> Result<Order, OrchestratorError> {
        match target {
            OrderStatus::Closed => self.complete(order_id).await,
            OrderStatus::Cancelled => self.cancel(order_id).await,
            status => Err(OrchestratorError::UnsupportedStatusTarget { status }),
        }
    }

    async fn complete(&self, order_id: OrderId) -> Result<Order, OrchestratorError> {
        let mut tx = self.ledger.begin().await?;
        let mut order = tx.lock_order(order_id).await?;

        let policy = policy_for(order.status);
        if !policy.supports(OrderAction::Complete) {
            return Err(policy.rejected(OrderAction::Complete).into());
        }

        let points_earned = match order.member_id {
            Some(member_id) => self.points.earn(member_id, order.final_amount).await?,
            None => 0,
        };
        let events = policy.complete(&mut order, points_earned, Utc::now())?;
        let stored = match tx.update_order(&order).await {
            Ok(()) => tx.commit().await,
            Err(error) => Err(error),
        };
        if let Err(error) = stored {
            if points_earned > 0 {
                if let Some(member_id) = order.member_id {
                    self.reclaim_points(member_id, points_earned).await;
                }
            }
            return Err(error.into());
        }
        metrics::counter!("orders_completed_total").increment(1);

        self.deliver(events).await;
        Ok(order)
    }

    async fn cancel(&self, order_id: OrderId) -> Result<Order, OrchestratorError> {
        let mut tx = self.ledger.begin().await?;
        let mut order = tx.lock_order(order_id).await?;

        let policy = policy_for(order.status);
        if !policy.supports(OrderAction::Cancel) {
            return Err(policy.rejected(OrderAction::Cancel).into());
        }

        if order.points_used > 0 {
            if let Some(member_id) = order.member_id {
                self.points.refund(member_id, order.points_used).await?;
            }
        }
        let events = policy.cancel(&mut order, Utc::now())?;
        let stored = match tx.update_order(&order).await {
            Ok(()) => tx.commit().await,
            Err(error) => Err(error),
        };
        if let Err(error) = stored {
            if order.points_used > 0 {
                if let Some(member_id) = order.member_id {
                    self.reclaim_points(member_id, order.points_used).await;
                }
            }
            return Err(error.into());
        }
        metrics::counter!("orders_cancelled_total").increment(1);

        self.deliver(events).await;
        Ok(order)
    }

    /// Best-effort return of a debit after the order write failed. The
    /// storage error is what the caller sees; a reversal failure here
    /// leaves the balance for reconciliation.
    async fn return_points(&self, member_id: MemberId, points: i64) {
        if let Err(error) = self.points.refund(member_id, points).await {
            tracing::error!(
                %error, %member_id, points,
                "could not return points after aborted write"
            );
        }
    }

    /// Best-effort reversal of a credit after the order write failed.
    async fn reclaim_points(&self, member_id: MemberId, points: i64) {
        if let Err(error) = self.points.redeem(member_id, points).await {
            tracing::error!(
                %error, %member_id, points,
                "could not reclaim points after aborted write"
            );
        }
    }

    /// Forwards committed events to the notifier. Delivery failures are
    /// logged, never propagated into the already-committed operation.
    async fn deliver(&self, events: Vec<OrderEvent>) {
        if events.is_empty() {
            return;
        }
        if let Err(error) = self.notifier.notify(&events).await {
            tracing::warn!(%error, count = events.len(), "order event delivery failed");
        }
    }
}
