//! Corner Shop Core - domain logic shared by the storefront and CLI.
//!
//! # Architecture
//!
//! The core crate contains types, traits and pure business rules. It performs
//! no I/O of its own: storage is reached only through the repository traits
//! ([`ProductCatalog`], [`CartRepository`], [`OrderRepository`]), which the
//! storefront implements on `PostgreSQL`.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for ids, prices, quantities, emails, statuses
//! - [`catalog`] - Products and the catalog lookup trait
//! - [`cart`] - Cart snapshots and the [`CartEngine`]
//! - [`order`] - Orders and the [`OrderBuilder`]
//! - [`memory`] - In-memory repository implementations

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod cart;
pub mod catalog;
pub mod error;
pub mod memory;
pub mod order;
pub mod types;

pub use cart::{
    Cart, CartEngine, CartItem, CartLine, CartLines, CartRepository, CartSource, CartUpdate,
    CartWrite, RetryPolicy,
};
pub use catalog::{Product, ProductCatalog};
pub use error::{CommerceError, ErrorKind};
pub use order::{
    NewOrder, Order, OrderBuilder, OrderItem, OrderRepository, Receipt, ShippingAddress,
};
pub use types::*;
