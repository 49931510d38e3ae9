//! Type-safe money representation using decimal arithmetic.
//!
//! The remote services quote prices as bare JSON numbers in the store's single
//! currency. Everything client-side is computed with [`Decimal`] so totals
//! never pick up binary floating point drift.

use core::fmt;
use core::iter::Sum;
use core::ops::Add;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use super::Quantity;

/// Number of fractional digits shown for every rendered amount.
const DISPLAY_SCALE: u32 = 2;

/// A monetary amount in the store currency.
///
/// Deserializes from either a JSON number or a decimal string.
///
/// ```
/// use bazaar_core::{Money, Quantity};
/// use rust_decimal::Decimal;
///
/// let unit = Money::new(Decimal::new(550, 2));
/// assert_eq!(unit.times(Quantity::new(2).unwrap()).display(), "11.00");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(Decimal);

impl Money {
    /// Zero in the store currency.
    pub const ZERO: Self = Self(Decimal::ZERO);

    /// Create a new amount.
    #[must_use]
    pub const fn new(amount: Decimal) -> Self {
        Self(amount)
    }

    /// Get the underlying decimal amount.
    #[must_use]
    pub const fn amount(&self) -> Decimal {
        self.0
    }

    /// Price of `quantity` units at this unit price.
    #[must_use]
    pub fn times(self, quantity: Quantity) -> Self {
        Self(self.0 * Decimal::from(quantity.get()))
    }

    /// Format with exactly two fractional digits (e.g. `"25.50"`).
    ///
    /// Midpoints round away from zero.
    #[must_use]
    pub fn display(&self) -> String {
        let mut rounded = self
            .0
            .round_dp_with_strategy(DISPLAY_SCALE, RoundingStrategy::MidpointAwayFromZero);
        rounded.rescale(DISPLAY_SCALE);
        rounded.to_string()
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display())
    }
}

impl From<Decimal> for Money {
    fn from(amount: Decimal) -> Self {
        Self(amount)
    }
}

impl Add for Money {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Add::add)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn qty(n: u32) -> Quantity {
        Quantity::new(n).unwrap()
    }

    #[test]
    fn test_display_pads_to_two_digits() {
        assert_eq!(Money::new(Decimal::new(255, 1)).display(), "25.50");
        assert_eq!(Money::new(Decimal::from(30)).display(), "30.00");
        assert_eq!(Money::ZERO.display(), "0.00");
    }

    #[test]
    fn test_display_rounds_midpoint_away_from_zero() {
        assert_eq!(Money::new(Decimal::new(10_005, 3)).display(), "10.01");
        assert_eq!(Money::new(Decimal::new(10_004, 3)).display(), "10.00");
    }

    #[test]
    fn test_sum_of_line_totals() {
        let lines = [
            (Money::new(Decimal::new(1000, 2)), qty(2)),
            (Money::new(Decimal::new(550, 2)), qty(1)),
        ];
        let total: Money = lines.iter().map(|(price, q)| price.times(*q)).sum();
        assert_eq!(total.display(), "25.50");
    }

    #[test]
    fn test_deserialize_from_number_and_string() {
        let from_number: Money = serde_json::from_str("5.5").unwrap();
        let from_string: Money = serde_json::from_str("\"5.50\"").unwrap();
        assert_eq!(from_number.display(), "5.50");
        assert_eq!(from_number, from_string);
    }
}
