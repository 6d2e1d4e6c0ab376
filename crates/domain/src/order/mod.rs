//! Order entity and lifecycle state machine.

mod error;
mod events;
mod policy;
mod status;
mod types;

pub use error::OrderError;
pub use events::OrderEvent;
pub use policy::{PaymentContext, PolicyResult, StatusPolicy, policy_for};
pub use status::{OrderAction, OrderStatus};
pub use types::{
    LineOption, MaterialUse, Order, OrderChannel, OrderLine, PaymentMethod, ProductId,
    validate_lines,
};
