//! Business logic services for storefront.
//!
//! Cart and checkout rules live in `corner_shop_core`; this module holds the
//! storefront-only services.
//!
//! - `auth` - Password registration and login

pub mod auth;
