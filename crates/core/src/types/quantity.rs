//! Line item quantity.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Errors that can occur when constructing a [`Quantity`].
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuantityError {
    /// Quantities start at one.
    #[error("quantity must be at least 1")]
    Zero,
}

/// A positive number of units.
///
/// ## Constraints
///
/// - Always at least 1; [`Quantity::decrement`] clamps at 1
/// - No upper bound; [`Quantity::increment`] saturates at `u32::MAX`
///
/// ## Examples
///
/// ```
/// use bazaar_core::Quantity;
///
/// let qty = Quantity::ONE.decrement();
/// assert_eq!(qty.get(), 1);
///
/// let qty = qty.increment().increment();
/// assert_eq!(qty.get(), 3);
///
/// assert!(Quantity::new(0).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct Quantity(u32);

impl Quantity {
    /// A single unit.
    pub const ONE: Self = Self(1);

    /// Create a quantity.
    ///
    /// # Errors
    ///
    /// Returns [`QuantityError::Zero`] if `n` is zero.
    pub const fn new(n: u32) -> Result<Self, QuantityError> {
        if n == 0 {
            return Err(QuantityError::Zero);
        }
        Ok(Self(n))
    }

    /// Get the number of units.
    #[must_use]
    pub const fn get(&self) -> u32 {
        self.0
    }

    /// One more unit.
    #[must_use]
    pub const fn increment(self) -> Self {
        Self(self.0.saturating_add(1))
    }

    /// One fewer unit, never going below one.
    #[must_use]
    pub const fn decrement(self) -> Self {
        if self.0 > 1 { Self(self.0 - 1) } else { Self::ONE }
    }

    /// Apply a signed stepper delta, clamping at one.
    #[must_use]
    pub const fn step(self, delta: i32) -> Self {
        let next = self.0.saturating_add_signed(delta);
        if next == 0 { Self::ONE } else { Self(next) }
    }
}

impl Default for Quantity {
    fn default() -> Self {
        Self::ONE
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<u32> for Quantity {
    type Error = QuantityError;

    fn try_from(n: u32) -> Result<Self, Self::Error> {
        Self::new(n)
    }
}

impl From<Quantity> for u32 {
    fn from(qty: Quantity) -> Self {
        qty.0
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_decrement_clamps_at_one() {
        assert_eq!(Quantity::ONE.decrement(), Quantity::ONE);
        assert_eq!(Quantity::new(2).unwrap().decrement(), Quantity::ONE);
    }

    #[test]
    fn test_increment_is_unbounded() {
        let mut qty = Quantity::ONE;
        for _ in 0..1_000 {
            qty = qty.increment();
        }
        assert_eq!(qty.get(), 1_001);
        assert_eq!(Quantity::new(u32::MAX).unwrap().increment().get(), u32::MAX);
    }

    #[test]
    fn test_step_with_large_negative_delta() {
        assert_eq!(Quantity::new(5).unwrap().step(-10), Quantity::ONE);
        assert_eq!(Quantity::new(5).unwrap().step(-4), Quantity::ONE);
        assert_eq!(Quantity::new(5).unwrap().step(3).get(), 8);
    }

    #[test]
    fn test_deserialize_rejects_zero() {
        assert!(serde_json::from_str::<Quantity>("0").is_err());
        assert_eq!(serde_json::from_str::<Quantity>("3").unwrap().get(), 3);
    }
}
