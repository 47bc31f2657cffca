//! Type-safe price representation using decimal arithmetic.
//!
//! Prices are stored in the store currency's standard unit (dollars, not
//! cents) as a [`Decimal`], so line totals never pick up binary floating point
//! error.

use core::fmt;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use super::Quantity;

/// Errors that can occur when constructing a [`Price`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PriceError {
    /// The amount is below zero.
    #[error("price cannot be negative")]
    Negative,
    /// The input could not be parsed as a decimal number.
    #[error("price must be a decimal number")]
    Invalid,
}

/// A non-negative unit price.
///
/// ## Examples
///
/// ```
/// use corner_shop_core::{Price, Quantity};
/// use rust_decimal::Decimal;
///
/// let price = Price::parse("10.00").unwrap();
/// let qty = Quantity::new(3).unwrap();
/// assert_eq!(price.line_total(qty), Decimal::new(3000, 2));
/// assert_eq!(price.to_string(), "$10.00");
///
/// assert!(Price::parse("-1").is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Price(Decimal);

impl Price {
    /// A price of zero.
    pub const ZERO: Self = Self(Decimal::ZERO);

    /// Create a price from a decimal amount, rounded half away from zero to
    /// whole cents.
    ///
    /// # Errors
    ///
    /// Returns `PriceError::Negative` if the amount is below zero.
    pub fn new(amount: Decimal) -> Result<Self, PriceError> {
        if amount.is_sign_negative() && !amount.is_zero() {
            return Err(PriceError::Negative);
        }
        Ok(Self(
            amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero),
        ))
    }

    /// Parse a price from user input such as `"19.99"`.
    ///
    /// # Errors
    ///
    /// Returns `PriceError::Invalid` if the input is not a decimal number and
    /// `PriceError::Negative` if it is below zero.
    pub fn parse(s: &str) -> Result<Self, PriceError> {
        let amount = s
            .trim()
            .parse::<Decimal>()
            .map_err(|_| PriceError::Invalid)?;
        Self::new(amount)
    }

    /// The underlying amount.
    #[must_use]
    pub const fn amount(&self) -> Decimal {
        self.0
    }

    /// Price multiplied by a quantity.
    #[must_use]
    pub fn line_total(&self, quantity: Quantity) -> Decimal {
        self.0 * Decimal::from(quantity.get())
    }
}

impl TryFrom<Decimal> for Price {
    type Error = PriceError;

    fn try_from(amount: Decimal) -> Result<Self, Self::Error> {
        Self::new(amount)
    }
}

impl From<Price> for Decimal {
    fn from(price: Price) -> Self {
        price.0
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", format_money(self.0))
    }
}

/// Format a decimal amount for display, e.g. `$19.99`.
#[must_use]
pub fn format_money(amount: Decimal) -> String {
    let rounded = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    format!("${rounded:.2}")
}

#[cfg(feature = "postgres")]
impl ::sqlx::Type<::sqlx::Postgres> for Price {
    fn type_info() -> ::sqlx::postgres::PgTypeInfo {
        <Decimal as ::sqlx::Type<::sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &::sqlx::postgres::PgTypeInfo) -> bool {
        <Decimal as ::sqlx::Type<::sqlx::Postgres>>::compatible(ty)
    }
}

#[cfg(feature = "postgres")]
impl<'r> ::sqlx::Decode<'r, ::sqlx::Postgres> for Price {
    fn decode(
        value: ::sqlx::postgres::PgValueRef<'r>,
    ) -> ::core::result::Result<Self, ::sqlx::error::BoxDynError> {
        let amount = <Decimal as ::sqlx::Decode<::sqlx::Postgres>>::decode(value)?;
        Ok(Self::new(amount)?)
    }
}

#[cfg(feature = "postgres")]
impl ::sqlx::Encode<'_, ::sqlx::Postgres> for Price {
    fn encode_by_ref(
        &self,
        buf: &mut ::sqlx::postgres::PgArgumentBuffer,
    ) -> ::std::result::Result<::sqlx::encode::IsNull, ::sqlx::error::BoxDynError> {
        <Decimal as ::sqlx::Encode<::sqlx::Postgres>>::encode_by_ref(&self.0, buf)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_negative() {
        assert_eq!(Price::new(Decimal::new(-1, 2)), Err(PriceError::Negative));
        assert_eq!(Price::parse("-5"), Err(PriceError::Negative));
    }

    #[test]
    fn test_accepts_zero() {
        assert_eq!(Price::parse("0").unwrap(), Price::ZERO);
    }

    #[test]
    fn test_parse_invalid() {
        assert_eq!(Price::parse("ten"), Err(PriceError::Invalid));
        assert_eq!(Price::parse(""), Err(PriceError::Invalid));
    }

    #[test]
    fn test_display_rounds_to_cents() {
        assert_eq!(Price::parse("5").unwrap().to_string(), "$5.00");
        assert_eq!(format_money(Decimal::new(12345, 3)), "$12.35");
    }

    #[test]
    fn test_new_rounds_to_cents() {
        assert_eq!(Price::new(Decimal::new(19_995, 3)).unwrap().amount(), Decimal::new(2000, 2));
        assert_eq!(Price::parse("3.141").unwrap().amount(), Decimal::new(314, 2));
        assert_eq!(
            serde_json::from_str::<Price>("\"0.125\"").unwrap().amount(),
            Decimal::new(13, 2)
        );
    }

    #[test]
    fn test_deserialize_rejects_negative() {
        assert!(serde_json::from_str::<Price>("\"-3.00\"").is_err());
        assert_eq!(
            serde_json::from_str::<Price>("\"3.50\"").unwrap().amount(),
            Decimal::new(350, 2)
        );
    }
}
