//! Collaborator traits and in-memory implementations.

pub mod notify;
pub mod points;
pub mod promotion;

pub use notify::{InMemoryNotifier, OrderNotifier};
pub use points::{InMemoryPointsService, PointsService};
pub use promotion::{InMemoryPromotionService, Promotion, PromotionService};
