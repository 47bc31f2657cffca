//! HTTP route handlers for storefront.
//!
//! # Route Structure
//!
//! ```text
//! GET  /                       - Home page (newest products)
//! GET  /health                 - Liveness
//! GET  /health/ready           - Readiness (database reachable)
//!
//! # Products
//! GET  /products               - Product listing
//! GET  /products/new           - Create form (admin)
//! POST /products               - Create product, multipart (admin)
//! GET  /products/{id}          - Product detail
//!
//! # Cart (JSON API, page at GET /cart)
//! GET    /cart                 - Cart page
//! POST   /cart                 - Add item       {productId, quantity}
//! PUT    /cart/{productId}     - Set quantity   {quantity}
//! DELETE /cart/{productId}     - Remove item
//! GET    /cart/count           - {cartCount}
//!
//! # Orders (requires auth)
//! GET  /orders                 - Order history
//! GET  /orders/checkout        - Checkout form
//! POST /orders                 - Place order
//! GET  /orders/{id}            - Order detail (owner or admin)
//!
//! # Auth
//! GET  /auth/login             - Login page
//! POST /auth/login             - Login action
//! GET  /auth/register          - Register page
//! POST /auth/register          - Register action
//! GET  /auth/logout            - Logout
//! ```

pub mod auth;
pub mod cart;
pub mod home;
pub mod orders;
pub mod products;

use axum::{
    Router,
    extract::{FromRequestParts, State},
    http::{StatusCode, request::Parts},
    routing::{get, put},
};
use corner_shop_core::Cart;

use crate::error::AppError;
use crate::middleware::{ActiveCart, auth_rate_limiter};
use crate::models::CurrentUser;
use crate::state::AppState;

// =============================================================================
// Page Context
// =============================================================================

/// Header data every full page renders: who is signed in and the cart badge.
#[derive(Debug, Clone, Default)]
pub struct PageContext {
    pub signed_in: bool,
    pub user_name: String,
    pub is_admin: bool,
    pub cart_count: u32,
}

impl PageContext {
    /// Build the context for a visitor and the cart they currently hold.
    #[must_use]
    pub fn new(user: Option<&CurrentUser>, cart: &Cart) -> Self {
        Self {
            signed_in: user.is_some(),
            user_name: user.map(|u| u.name.clone()).unwrap_or_default(),
            is_admin: user.is_some_and(|u| u.is_admin),
            cart_count: cart.count(),
        }
    }
}

impl From<&ActiveCart> for PageContext {
    fn from(active: &ActiveCart) -> Self {
        Self::new(active.user.as_ref(), &active.cart)
    }
}

impl FromRequestParts<AppState> for PageContext {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let active = ActiveCart::from_request_parts(parts, state).await?;
        Ok(Self::from(&active))
    }
}

// =============================================================================
// Routers
// =============================================================================

/// Create the auth routes router.
///
/// Rate limited per client IP.
pub fn auth_routes() -> Router<AppState> {
    let router = Router::new()
        .route("/login", get(auth::login_page).post(auth::login))
        .route("/register", get(auth::register_page).post(auth::register))
        .route("/logout", get(auth::logout));

    match auth_rate_limiter() {
        Some(limiter) => router.layer(limiter),
        None => {
            tracing::warn!("auth rate limiter unavailable; serving auth routes unlimited");
            router
        }
    }
}

/// Create the product routes router.
pub fn product_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(products::index).post(products::create))
        .route("/new", get(products::new_form))
        .route("/{id}", get(products::show))
}

/// Create the cart routes router.
pub fn cart_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(cart::show).post(cart::add))
        .route("/count", get(cart::count))
        .route("/{product_id}", put(cart::update).delete(cart::remove))
}

/// Create the order routes router.
pub fn order_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(orders::index).post(orders::place))
        .route("/checkout", get(orders::checkout))
        .route("/{id}", get(orders::show))
}

/// Create all routes for the storefront.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(home::home))
        .route("/health", get(health))
        .route("/health/ready", get(readiness))
        .nest("/products", product_routes())
        .nest("/cart", cart_routes())
        .nest("/orders", order_routes())
        .nest("/auth", auth_routes())
}

// =============================================================================
// Health
// =============================================================================

/// Liveness health check endpoint. Does not check dependencies.
async fn health() -> &'static str {
    "ok"
}

/// Readiness health check endpoint.
///
/// Returns 503 Service Unavailable if the database is not reachable.
async fn readiness(State(state): State<AppState>) -> StatusCode {
    match sqlx::query("SELECT 1").fetch_one(state.pool()).await {
        Ok(_) => StatusCode::OK,
        Err(e) => {
            tracing::warn!(error = %e, "readiness check failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}
