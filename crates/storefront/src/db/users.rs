//! User repository for database operations.
//!
//! Besides accounts, this repository owns the persisted cart: each user row
//! carries its cart as a JSONB document that is read and overwritten whole.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use sqlx::types::Json;

use corner_shop_core::{Cart, CartRepository, Email, UserId};

use super::{RepositoryError, conflict_on_unique};
use crate::models::user::User;

const USER_COLUMNS: &str = "id, name, email, is_admin, created_at, updated_at";

/// Database row for `users` (without secrets or the cart).
#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: UserId,
    name: String,
    email: Email,
    is_admin: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            email: row.email,
            is_admin: row.is_admin,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// User row joined with its password hash, for login.
#[derive(Debug, sqlx::FromRow)]
struct UserWithHashRow {
    #[sqlx(flatten)]
    user: UserRow,
    password_hash: String,
}

/// Repository for user database operations.
pub struct UserRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> UserRepository<'a> {
    /// Create a new user repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Get a user by their ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(User::from))
    }

    /// Get a user and their password hash by email.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_password_hash(
        &self,
        email: &Email,
    ) -> Result<Option<(User, String)>, RepositoryError> {
        let row = sqlx::query_as::<_, UserWithHashRow>(&format!(
            "SELECT {USER_COLUMNS}, password_hash FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(|r| (r.user.into(), r.password_hash)))
    }

    /// Create a new user with an empty cart.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the email already exists.
    /// Returns `RepositoryError::Database` for other database errors.
    pub async fn create(
        &self,
        name: &str,
        email: &Email,
        password_hash: &str,
    ) -> Result<User, RepositoryError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            r"
            INSERT INTO users (name, email, password_hash)
            VALUES ($1, $2, $3)
            RETURNING {USER_COLUMNS}
            "
        ))
        .bind(name)
        .bind(email)
        .bind(password_hash)
        .fetch_one(self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, "email"))?;

        Ok(row.into())
    }

    /// Grant or revoke admin rights.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if no user has this email.
    /// Returns `RepositoryError::Database` if the update fails.
    pub async fn set_admin(&self, email: &Email, is_admin: bool) -> Result<User, RepositoryError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            r"
            UPDATE users SET is_admin = $2, updated_at = NOW()
            WHERE email = $1
            RETURNING {USER_COLUMNS}
            "
        ))
        .bind(email)
        .bind(is_admin)
        .fetch_optional(self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)?;

        Ok(row.into())
    }

    /// Load a user's cart document.
    ///
    /// An unknown user yields an empty cart.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::DataCorruption` if the stored document is not a cart.
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_cart(&self, id: UserId) -> Result<Cart, RepositoryError> {
        let document: Option<serde_json::Value> =
            sqlx::query_scalar("SELECT cart FROM users WHERE id = $1")
                .bind(id)
                .fetch_optional(self.pool)
                .await?;

        match document {
            Some(value) => serde_json::from_value(value).map_err(|e| {
                RepositoryError::DataCorruption(format!("invalid cart for user {id}: {e}"))
            }),
            None => Ok(Cart::default()),
        }
    }

    /// Overwrite a user's cart document.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the user does not exist.
    /// Returns `RepositoryError::Database` if the update fails.
    pub async fn set_cart(&self, id: UserId, cart: &Cart) -> Result<(), RepositoryError> {
        let result = sqlx::query("UPDATE users SET cart = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(Json(cart))
            .execute(self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}

#[async_trait]
impl CartRepository for UserRepository<'_> {
    async fn load(&self, user_id: UserId) -> corner_shop_core::error::Result<Cart> {
        Ok(self.get_cart(user_id).await?)
    }

    async fn save(&self, user_id: UserId, cart: &Cart) -> corner_shop_core::error::Result<()> {
        Ok(self.set_cart(user_id, cart).await?)
    }
}
