//! Promotion service trait and in-memory implementation.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use common::BrandId;
use domain::Money;
use rust_decimal::Decimal;

use crate::error::OrchestratorError;

/// A percentage-off promotion active for a brand.
#[derive(Debug, Clone)]
pub struct Promotion {
    pub brand_id: BrandId,
    /// Fraction off the order total, e.g. 0.10 for 10% off.
    pub percent_off: Decimal,
    /// Order total required for the promotion to apply.
    pub min_total: Money,
}

impl Promotion {
    fn discount_for(&self, total: Money) -> Money {
        if total < self.min_total {
            return Money::zero();
        }
        Money::new(total.amount() * self.percent_off)
    }
}

/// Trait for resolving the best applicable promotion discount.
#[async_trait]
pub trait PromotionService: Send + Sync {
    /// Returns the largest discount any active promotion grants for the
    /// given brand and order total. Zero when nothing applies.
    async fn best_discount(
        &self,
        brand_id: BrandId,
        total: Money,
    ) -> Result<Money, OrchestratorError>;
}

/// In-memory promotion service for testing and dev wiring.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPromotionService {
    promotions: Arc<RwLock<Vec<Promotion>>>,
}

impl InMemoryPromotionService {
    /// Creates a promotion service with no active promotions.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an active promotion.
    pub fn add_promotion(&self, promotion: Promotion) {
        self.promotions.write().unwrap().push(promotion);
    }
}

#[async_trait]
impl PromotionService for InMemoryPromotionService {
    async fn best_discount(
        &self,
        brand_id: BrandId,
        total: Money,
    ) -> Result<Money, OrchestratorError> {
        let promotions = self.promotions.read().unwrap();
        Ok(promotions
            .iter()
            .filter(|p| p.brand_id == brand_id)
            .map(|p| p.discount_for(total))
            .max()
            .unwrap_or_else(Money::zero))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_best_discount_picks_largest() {
        let brand_id = BrandId::new();
        let service = InMemoryPromotionService::new();
        service.add_promotion(Promotion {
            brand_id,
            percent_off: Decimal::new(5, 2), // 5%
            min_total: Money::zero(),
        });
        service.add_promotion(Promotion {
            brand_id,
            percent_off: Decimal::new(10, 2), // 10%
            min_total: Money::zero(),
        });

        let discount = service
            .best_discount(brand_id, Money::from_major(200))
            .await
            .unwrap();

        assert_eq!(discount, Money::from_major(20));
    }

    #[tokio::test]
    async fn test_min_total_gates_the_promotion() {
        let brand_id = BrandId::new();
        let service = InMemoryPromotionService::new();
        service.add_promotion(Promotion {
            brand_id,
            percent_off: Decimal::new(10, 2),
            min_total: Money::from_major(100),
        });

        let discount = service
            .best_discount(brand_id, Money::from_major(50))
            .await
            .unwrap();

        assert!(discount.is_zero());
    }

    #[tokio::test]
    async fn test_other_brand_promotions_ignored() {
        let service = InMemoryPromotionService::new();
        service.add_promotion(Promotion {
            brand_id: BrandId::new(),
            percent_off: Decimal::new(50, 2),
            min_total: Money::zero(),
        });

        let discount = service
            .best_discount(BrandId::new(), Money::from_major(100))
            .await
            .unwrap();

        assert!(discount.is_zero());
    }
}
