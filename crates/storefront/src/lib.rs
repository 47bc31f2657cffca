//! Corner Shop storefront library.
//!
//! The web binary and the `cs-cli` tool both build on this crate: the CLI
//! reuses its repositories and migrations.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod db;
pub mod error;
pub mod filters;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
