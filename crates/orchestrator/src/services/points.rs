//! Member points service trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use common::MemberId;
use domain::Money;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

use crate::error::OrchestratorError;

/// Trait for member point operations.
///
/// Redeem and refund are called inside the payment/cancellation
/// transaction; a failure aborts the whole operation.
#[async_trait]
pub trait PointsService: Send + Sync {
    /// Debits `points` from the member and returns the discount granted.
    async fn redeem(&self, member_id: MemberId, points: i64) -> Result<Money, OrchestratorError>;

    /// Credits points earned for a settled amount, returning the points.
    async fn earn(&self, member_id: MemberId, amount: Money) -> Result<i64, OrchestratorError>;

    /// Returns previously redeemed points to the member.
    async fn refund(&self, member_id: MemberId, points: i64) -> Result<(), OrchestratorError>;
}

#[derive(Debug, Default)]
struct InMemoryPointsState {
    balances: HashMap<MemberId, i64>,
    fail_on_redeem: bool,
}

/// In-memory points service for testing and dev wiring.
///
/// Redemption grants 0.1 currency units per point; earning credits one
/// point per whole currency unit settled.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPointsService {
    state: Arc<RwLock<InMemoryPointsState>>,
}

impl InMemoryPointsService {
    /// Creates a new points service with no members.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a member with an initial point balance.
    pub fn with_member(self, member_id: MemberId, balance: i64) -> Self {
        self.state
            .write()
            .unwrap()
            .balances
            .insert(member_id, balance);
        self
    }

    /// Registers or replaces a member's balance on a shared handle.
    pub fn add_member(&self, member_id: MemberId, balance: i64) {
        self.state
            .write()
            .unwrap()
            .balances
            .insert(member_id, balance);
    }

    /// Returns a member's balance, if the member exists.
    pub fn balance(&self, member_id: MemberId) -> Option<i64> {
        self.state.read().unwrap().balances.get(&member_id).copied()
    }

    /// Configures the service to fail on the next redeem call.
    pub fn set_fail_on_redeem(&self, fail: bool) {
        self.state.write().unwrap().fail_on_redeem = fail;
    }
}

/// Discount granted per redeemed point.
const REDEEM_RATE: Decimal = Decimal::from_parts(1, 0, 0, false, 1); // 0.1

#[async_trait]
impl PointsService for InMemoryPointsService {
    async fn redeem(&self, member_id: MemberId, points: i64) -> Result<Money, OrchestratorError> {
        let mut state = self.state.write().unwrap();
        if state.fail_on_redeem {
            return Err(OrchestratorError::PointsService(
                "points backend unavailable".to_string(),
            ));
        }

        let balance = state
            .balances
            .get_mut(&member_id)
            .ok_or(OrchestratorError::UnknownMember { member_id })?;
        if *balance < points {
            return Err(OrchestratorError::InsufficientPoints {
                member_id,
                requested: points,
                available: *balance,
            });
        }
        *balance -= points;
        Ok(Money::new(Decimal::from(points) * REDEEM_RATE))
    }

    async fn earn(&self, member_id: MemberId, amount: Money) -> Result<i64, OrchestratorError> {
        let mut state = self.state.write().unwrap();
        let balance = state
            .balances
            .get_mut(&member_id)
            .ok_or(OrchestratorError::UnknownMember { member_id })?;
        let earned = amount.amount().floor().to_i64().unwrap_or(0);
        *balance += earned;
        Ok(earned)
    }

    async fn refund(&self, member_id: MemberId, points: i64) -> Result<(), OrchestratorError> {
        let mut state = self.state.write().unwrap();
        let balance = state
            .balances
            .get_mut(&member_id)
            .ok_or(OrchestratorError::UnknownMember { member_id })?;
        *balance += points;
        Ok(())
    }
}
