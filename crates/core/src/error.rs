//! Error taxonomy shared by the cart engine and order builder.

use thiserror::Error;

use crate::types::{OrderId, PriceError, ProductId, QuantityError};

/// Boxed source error from a storage backend.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors returned by core commerce operations.
///
/// Operations fail before issuing any write, so an error never leaves a cart
/// or order half-updated.
#[derive(Debug, Error)]
pub enum CommerceError {
    /// The product does not exist in the catalog.
    #[error("product {0} not found")]
    ProductNotFound(ProductId),

    /// The product is not a line in the cart.
    #[error("product {0} is not in the cart")]
    NotInCart(ProductId),

    /// The order does not exist.
    #[error("order {0} not found")]
    OrderNotFound(OrderId),

    /// Input failed validation.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Checkout was attempted with no items.
    #[error("cart is empty")]
    EmptyCart,

    /// The caller may not access the resource.
    #[error("permission denied: {0}")]
    Permission(String),

    /// The backing store failed.
    #[error("storage error: {0}")]
    Storage(#[source] BoxError),
}

/// Coarse category of a [`CommerceError`], used for response mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Validation,
    EmptyCart,
    Permission,
    Storage,
}

impl CommerceError {
    /// Wrap a storage backend error.
    pub fn storage(err: impl Into<BoxError>) -> Self {
        Self::Storage(err.into())
    }

    /// The category this error belongs to.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::ProductNotFound(_) | Self::NotInCart(_) | Self::OrderNotFound(_) => {
                ErrorKind::NotFound
            }
            Self::Validation(_) => ErrorKind::Validation,
            Self::EmptyCart => ErrorKind::EmptyCart,
            Self::Permission(_) => ErrorKind::Permission,
            Self::Storage(_) => ErrorKind::Storage,
        }
    }
}

impl From<QuantityError> for CommerceError {
    fn from(err: QuantityError) -> Self {
        Self::Validation(err.to_string())
    }
}

impl From<PriceError> for CommerceError {
    fn from(err: PriceError) -> Self {
        Self::Validation(err.to_string())
    }
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, CommerceError>;
