//! User domain types.

use chrono::{DateTime, Utc};

use corner_shop_core::{Email, UserId};

/// A storefront customer account.
#[derive(Debug, Clone)]
pub struct User {
    /// Unique user ID.
    pub id: UserId,
    /// Display name.
    pub name: String,
    /// Login email, stored lowercased.
    pub email: Email,
    /// Whether the user may manage the catalog and view every order.
    pub is_admin: bool,
    /// When the user was created.
    pub created_at: DateTime<Utc>,
    /// When the user was last updated.
    pub updated_at: DateTime<Utc>,
}
