//! Orchestration errors.

use common::MemberId;
use domain::{OrderError, OrderStatus};
use inventory::InventoryError;
use ledger::LedgerError;
use thiserror::Error;

/// Errors produced while sequencing an order operation.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// State machine or validation rejection.
    #[error(transparent)]
    Order(#[from] OrderError),

    /// Stock allocation failure.
    #[error(transparent)]
    Inventory(#[from] InventoryError),

    /// Ledger store error.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// The referenced member does not exist.
    #[error("unknown member: {member_id}")]
    UnknownMember { member_id: MemberId },

    /// The member's point balance does not cover the redemption.
    #[error("member {member_id} has {available} points, requested {requested}")]
    InsufficientPoints {
        member_id: MemberId,
        requested: i64,
        available: i64,
    },

    /// Points were requested without a member to charge them to.
    #[error("point redemption requires a member")]
    MemberRequired,

    /// `update_status` only accepts the two terminal targets.
    #[error("cannot set order status to {status} directly")]
    UnsupportedStatusTarget { status: OrderStatus },

    /// Points collaborator failure.
    #[error("points service error: {0}")]
    PointsService(String),

    /// Promotion collaborator failure.
    #[error("promotion service error: {0}")]
    PromotionService(String),

    /// Notification collaborator failure.
    #[error("notification error: {0}")]
    Notification(String),
}

impl OrchestratorError {
    /// Returns true for fatal invariant violations that must surface as
    /// opaque internal errors rather than client-correctable rejections.
    pub fn is_fatal(&self) -> bool {
        matches!(self, OrchestratorError::Inventory(e) if e.is_fatal())
    }
}
