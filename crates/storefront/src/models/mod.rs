//! Domain models for storefront.
//!
//! These types represent validated domain objects separate from database row
//! types. Catalog, cart and order types live in `corner_shop_core`.

pub mod session;
pub mod user;

pub use session::{CurrentUser, keys as session_keys};
pub use user::User;
