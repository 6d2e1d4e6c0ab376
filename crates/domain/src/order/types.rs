//! Order entity, lines, channels and payment methods.

use chrono::{DateTime, Utc};
use common::{BrandId, ItemId, MemberId, OrderId, StaffId, StoreId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::money::Money;

use super::{OrderError, OrderStatus};

/// Product identifier (catalog SKU).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(String);

impl ProductId {
    /// Creates a new product ID from a string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the product ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ProductId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ProductId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ProductId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// The channel an order was placed through.
///
/// The channel fixes the order's initial lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderChannel {
    /// Walk-up counter sale, paid on the spot.
    Counter,
    /// Open tab held until the guest settles.
    Tab,
    /// Online order that staff must accept before preparation.
    Online,
}

impl OrderChannel {
    /// Returns the wire name of this channel.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderChannel::Counter => "COUNTER",
            OrderChannel::Tab => "TAB",
            OrderChannel::Online => "ONLINE",
        }
    }

    /// Parses a wire name back into a channel.
    pub fn from_wire(s: &str) -> Option<Self> {
        match s {
            "COUNTER" => Some(OrderChannel::Counter),
            "TAB" => Some(OrderChannel::Tab),
            "ONLINE" => Some(OrderChannel::Online),
            _ => None,
        }
    }

    /// Returns the lifecycle status a freshly placed order starts in.
    pub fn initial_status(&self) -> OrderStatus {
        match self {
            OrderChannel::Counter => OrderStatus::Pending,
            OrderChannel::Tab => OrderStatus::Held,
            OrderChannel::Online => OrderStatus::AwaitingAcceptance,
        }
    }
}

/// Accepted payment method codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    Cash,
    Card,
    Wallet,
}

impl PaymentMethod {
    /// Returns the wire code for this method.
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "CASH",
            PaymentMethod::Card => "CARD",
            PaymentMethod::Wallet => "WALLET",
        }
    }
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for PaymentMethod {
    type Err = OrderError;

    fn from_str(code: &str) -> Result<Self, Self::Err> {
        match code {
            "CASH" => Ok(PaymentMethod::Cash),
            "CARD" => Ok(PaymentMethod::Card),
            "WALLET" => Ok(PaymentMethod::Wallet),
            other => Err(OrderError::UnknownPaymentMethod {
                code: other.to_string(),
            }),
        }
    }
}

/// A selected add-on option with its sale-time price adjustment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineOption {
    pub name: String,
    pub price_delta: Money,
}

/// Material consumption required to fulfil one unit of a line.
///
/// Recipe resolution (product → materials) happens upstream; the order
/// carries the already-resolved usage so fulfilment can deduct stock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterialUse {
    pub item_id: ItemId,
    /// Quantity consumed per ordered unit.
    pub quantity: Decimal,
}

/// A line in an order.
///
/// Unit price and option deltas are snapshots taken at sale time; they are
/// never recomputed from the current catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderLine {
    pub product_id: ProductId,
    pub name: String,
    pub quantity: u32,
    pub unit_price: Money,
    pub options: Vec<LineOption>,
    pub subtotal: Money,
    pub consumes: Vec<MaterialUse>,
}

impl OrderLine {
    /// Creates a line, computing its subtotal from the price snapshot.
    pub fn new(
        product_id: impl Into<ProductId>,
        name: impl Into<String>,
        quantity: u32,
        unit_price: Money,
        options: Vec<LineOption>,
        consumes: Vec<MaterialUse>,
    ) -> Self {
        let effective_unit: Money =
            options.iter().fold(unit_price, |acc, opt| acc + opt.price_delta);
        Self {
            product_id: product_id.into(),
            name: name.into(),
            quantity,
            unit_price,
            subtotal: effective_unit.multiply(quantity),
            options,
            consumes,
        }
    }
}

/// Validates a replacement line collection before it is applied.
pub fn validate_lines(lines: &[OrderLine]) -> Result<(), OrderError> {
    if lines.is_empty() {
        return Err(OrderError::EmptyLines);
    }
    for line in lines {
        if line.quantity == 0 {
            return Err(OrderError::InvalidQuantity {
                quantity: line.quantity,
            });
        }
        if line.unit_price.is_negative() {
            return Err(OrderError::NegativePrice {
                price: line.unit_price.amount(),
            });
        }
        for usage in &line.consumes {
            if usage.quantity <= Decimal::ZERO {
                return Err(OrderError::InvalidMaterialQuantity {
                    item_id: usage.item_id,
                    quantity: usage.quantity,
                });
            }
        }
    }
    Ok(())
}

/// Order transaction root.
///
/// Mutated exclusively through the status policy table; immutable once a
/// terminal status is reached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub brand_id: BrandId,
    pub store_id: StoreId,
    pub member_id: Option<MemberId>,
    pub staff_id: Option<StaffId>,
    pub channel: OrderChannel,
    pub status: OrderStatus,
    pub total_amount: Money,
    pub discount_amount: Money,
    pub final_amount: Money,
    pub points_used: i64,
    pub points_earned: i64,
    pub payment_method: Option<PaymentMethod>,
    pub placed_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub lines: Vec<OrderLine>,
}

impl Order {
    /// Builds a new order in its channel's initial status.
    ///
    /// Lines must already be validated with [`validate_lines`].
    pub fn new(
        id: OrderId,
        brand_id: BrandId,
        store_id: StoreId,
        channel: OrderChannel,
        staff_id: Option<StaffId>,
        member_id: Option<MemberId>,
        lines: Vec<OrderLine>,
        placed_at: DateTime<Utc>,
    ) -> Self {
        let total_amount: Money = lines.iter().map(|l| l.subtotal).sum();
        Self {
            id,
            brand_id,
            store_id,
            member_id,
            staff_id,
            channel,
            status: channel.initial_status(),
            total_amount,
            discount_amount: Money::zero(),
            final_amount: total_amount,
            points_used: 0,
            points_earned: 0,
            payment_method: None,
            placed_at,
            completed_at: None,
            lines,
        }
    }

    /// Recomputes `total_amount` and `final_amount` from the lines.
    pub(crate) fn recompute_totals(&mut self) {
        self.total_amount = self.lines.iter().map(|l| l.subtotal).sum();
        self.final_amount = self.total_amount.saturating_sub(self.discount_amount);
    }

    /// Returns true if the order is in a terminal status.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
