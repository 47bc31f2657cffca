//! Line item quantity.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Errors that can occur when constructing a [`Quantity`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum QuantityError {
    /// The requested quantity is zero or negative.
    #[error("quantity must be at least 1 (got {0})")]
    TooSmall(i64),
    /// The requested quantity does not fit the storage type.
    #[error("quantity must be at most {max}")]
    TooLarge {
        /// Largest accepted quantity.
        max: u32,
    },
}

/// A positive number of units of one product.
///
/// Request bodies carry signed integers so that `0` and negative inputs can be
/// rejected with a validation error instead of failing to parse.
///
/// ```
/// use corner_shop_core::Quantity;
///
/// assert_eq!(Quantity::try_from(3_i64).unwrap().get(), 3);
/// assert!(Quantity::try_from(0_i64).is_err());
/// assert!(Quantity::try_from(-2_i64).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u32")]
pub struct Quantity(u32);

impl Quantity {
    /// Largest quantity a single line may hold.
    pub const MAX: u32 = 9_999;

    /// A quantity of one.
    pub const ONE: Self = Self(1);

    /// Create a quantity.
    ///
    /// # Errors
    ///
    /// Returns `QuantityError` if `n` is zero or above [`Self::MAX`].
    pub const fn new(n: u32) -> Result<Self, QuantityError> {
        if n == 0 {
            return Err(QuantityError::TooSmall(0));
        }
        if n > Self::MAX {
            return Err(QuantityError::TooLarge { max: Self::MAX });
        }
        Ok(Self(n))
    }

    /// The number of units.
    #[must_use]
    pub const fn get(&self) -> u32 {
        self.0
    }

    /// Add two quantities.
    ///
    /// # Errors
    ///
    /// Returns `QuantityError::TooLarge` if the sum exceeds [`Self::MAX`].
    pub const fn checked_add(self, other: Self) -> Result<Self, QuantityError> {
        Self::new(self.0.saturating_add(other.0))
    }
}

impl TryFrom<i64> for Quantity {
    type Error = QuantityError;

    fn try_from(n: i64) -> Result<Self, Self::Error> {
        if n < 1 {
            return Err(QuantityError::TooSmall(n));
        }
        let n = u32::try_from(n).map_err(|_| QuantityError::TooLarge { max: Self::MAX })?;
        Self::new(n)
    }
}

impl From<Quantity> for u32 {
    fn from(q: Quantity) -> Self {
        q.0
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_zero_and_negative() {
        assert_eq!(Quantity::try_from(0), Err(QuantityError::TooSmall(0)));
        assert_eq!(Quantity::try_from(-4), Err(QuantityError::TooSmall(-4)));
    }

    #[test]
    fn test_rejects_too_large() {
        assert!(Quantity::try_from(i64::from(Quantity::MAX) + 1).is_err());
        assert!(Quantity::try_from(i64::MAX).is_err());
    }

    #[test]
    fn test_checked_add() {
        let a = Quantity::new(2).unwrap();
        let b = Quantity::new(3).unwrap();
        assert_eq!(a.checked_add(b).unwrap().get(), 5);

        let max = Quantity::new(Quantity::MAX).unwrap();
        assert!(max.checked_add(Quantity::ONE).is_err());
    }

    #[test]
    fn test_deserialize_validates() {
        assert_eq!(serde_json::from_str::<Quantity>("2").unwrap().get(), 2);
        assert!(serde_json::from_str::<Quantity>("0").is_err());
        assert!(serde_json::from_str::<Quantity>("-1").is_err());
    }
}
