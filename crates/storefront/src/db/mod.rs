//! Database operations for storefront `PostgreSQL`.
//!
//! ## Tables
//!
//! - `users` - Customers, with their cart embedded as a JSONB document
//! - `products` - The catalog
//! - `orders` / `order_items` - Placed orders with price snapshots
//! - `tower_sessions.session` - Tower-sessions storage
//!
//! The repositories here implement the storage traits of `corner_shop_core`
//! (`ProductCatalog`, `CartRepository`, `OrderRepository`).
//!
//! # Migrations
//!
//! Migrations are stored in `crates/storefront/migrations/` and run via:
//! ```bash
//! cargo run -p corner-shop-cli -- migrate
//! ```

pub mod orders;
pub mod products;
pub mod users;

use std::time::Duration;

use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

use corner_shop_core::CommerceError;

pub use orders::OrderRepository;
pub use products::ProductRepository;
pub use users::UserRepository;

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Constraint violation (e.g., unique email).
    #[error("constraint violation: {0}")]
    Conflict(String),
}

impl From<RepositoryError> for CommerceError {
    fn from(err: RepositoryError) -> Self {
        Self::storage(err)
    }
}

/// Map a unique-constraint violation to `Conflict`, anything else to `Database`.
pub(crate) fn conflict_on_unique(err: sqlx::Error, what: &str) -> RepositoryError {
    if let sqlx::Error::Database(ref db_err) = err
        && db_err.is_unique_violation()
    {
        return RepositoryError::Conflict(format!("{what} already exists"));
    }
    RepositoryError::Database(err)
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    use corner_shop_core::ErrorKind;

    #[test]
    fn test_repository_error_becomes_storage() {
        let err = CommerceError::from(RepositoryError::DataCorruption("bad price".to_owned()));
        assert_eq!(err.kind(), ErrorKind::Storage);
        assert!(matches!(err, CommerceError::Storage(_)));
    }
}
