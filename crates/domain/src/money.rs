//! Exact-decimal money arithmetic.
//!
//! All monetary amounts in the system are `rust_decimal` values wrapped in
//! a `Money` newtype. Derived amounts (line subtotals, discounts) are
//! rounded to two decimal places at the point they are computed, so stored
//! amounts are always exact.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Number of decimal places kept on monetary amounts.
const MONEY_SCALE: u32 = 2;

/// A monetary amount with exact decimal representation.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct Money(Decimal);

impl Money {
    /// Creates a money amount from a raw decimal, rounded to money scale.
    pub fn new(amount: Decimal) -> Self {
        Self(amount.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero))
    }

    /// Returns zero money.
    pub fn zero() -> Self {
        Self(Decimal::ZERO)
    }

    /// Creates a money amount from a whole number of currency units.
    pub fn from_major(units: i64) -> Self {
        Self(Decimal::from(units))
    }

    /// Returns the underlying decimal amount.
    pub fn amount(&self) -> Decimal {
        self.0
    }

    /// Returns true if the amount is zero.
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Returns true if the amount is strictly positive.
    pub fn is_positive(&self) -> bool {
        self.0 > Decimal::ZERO
    }

    /// Returns true if the amount is strictly negative.
    pub fn is_negative(&self) -> bool {
        self.0 < Decimal::ZERO
    }

    /// Subtracts `other`, flooring the result at zero.
    ///
    /// Used for `final_amount = max(0, total_amount - discount_amount)`.
    pub fn saturating_sub(&self, other: Money) -> Money {
        let diff = self.0 - other.0;
        if diff < Decimal::ZERO {
            Money::zero()
        } else {
            Money(diff)
        }
    }

    /// Multiplies by an integer quantity, rounding to money scale.
    pub fn multiply(&self, quantity: u32) -> Money {
        Money::new(self.0 * Decimal::from(quantity))
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.round_dp(MONEY_SCALE))
    }
}

impl From<Decimal> for Money {
    fn from(amount: Decimal) -> Self {
        Money::new(amount)
    }
}

impl std::ops::Add for Money {
    type Output = Money;

    fn add(self, rhs: Self) -> Self::Output {
        Money(self.0 + rhs.0)
    }
}

impl std::ops::Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Self) -> Self::Output {
        Money(self.0 - rhs.0)
    }
}

impl std::ops::AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_rounds_to_two_places() {
        let m = Money::new(Decimal::new(12345, 3)); // 12.345
        assert_eq!(m.amount(), Decimal::new(1235, 2)); // 12.35, midpoint away from zero
    }

    #[test]
    fn test_from_major() {
        assert_eq!(Money::from_major(200).amount(), Decimal::from(200));
    }

    #[test]
    fn test_saturating_sub_floors_at_zero() {
        let total = Money::from_major(10);
        let discount = Money::from_major(30);
        assert_eq!(total.saturating_sub(discount), Money::zero());

        let small_discount = Money::from_major(3);
        assert_eq!(total.saturating_sub(small_discount), Money::from_major(7));
    }

    #[test]
    fn test_multiply() {
        let unit = Money::new(Decimal::new(350, 2)); // 3.50
        assert_eq!(unit.multiply(3).amount(), Decimal::new(1050, 2));
    }

    #[test]
    fn test_sum() {
        let amounts = vec![Money::from_major(1), Money::from_major(2)];
        let total: Money = amounts.into_iter().sum();
        assert_eq!(total, Money::from_major(3));
    }

    #[test]
    fn test_comparison() {
        assert!(Money::from_major(1).is_positive());
        assert!(Money::zero().is_zero());
        assert!((Money::zero() - Money::from_major(1)).is_negative());
    }

    #[test]
    fn test_serialization_is_transparent() {
        let m = Money::new(Decimal::new(1999, 2));
        let json = serde_json::to_string(&m).unwrap();
        assert_eq!(json, "\"19.99\"");
        let back: Money = serde_json::from_str(&json).unwrap();
        assert_eq!(m, back);
    }
}
