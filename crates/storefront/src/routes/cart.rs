//! Cart route handlers.
//!
//! The cart page is server-rendered; mutations are a small JSON API called
//! from `static/js/cart.js`. Every mutation goes through the `CartEngine`,
//! which recomputes the total from current catalog prices, and the resulting
//! write is applied to wherever the cart lives (user record or cookie).

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Json,
    extract::{
        Path, State,
        rejection::{JsonRejection, PathRejection},
    },
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use corner_shop_core::{CartEngine, CartLine, CartUpdate, CommerceError, ProductId};

use super::PageContext;
use crate::db::ProductRepository;
use crate::error::{ApiError, AppError, Result};
use crate::filters;
use crate::middleware::{ActiveCart, CartCookie, store_cart};
use crate::state::AppState;

// =============================================================================
// Request / Response Types
// =============================================================================

const fn default_quantity() -> i64 {
    1
}

/// Body of `POST /cart`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddItemRequest {
    pub product_id: ProductId,
    #[serde(default = "default_quantity")]
    pub quantity: i64,
}

/// Body of `PUT /cart/{productId}`.
#[derive(Debug, Deserialize)]
pub struct UpdateQuantityRequest {
    pub quantity: i64,
}

/// Response of every cart mutation.
#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CartResponse {
    pub message: &'static str,
    pub cart_count: u32,
    pub total: Decimal,
}

/// Response of `GET /cart/count`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartCountResponse {
    pub cart_count: u32,
}

fn json_body<T>(
    payload: std::result::Result<Json<T>, JsonRejection>,
) -> std::result::Result<T, ApiError> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| ApiError(AppError::BadRequest(rejection.body_text())))
}

fn path_product_id(
    path: std::result::Result<Path<ProductId>, PathRejection>,
) -> std::result::Result<ProductId, ApiError> {
    path.map(|Path(product_id)| product_id)
        .map_err(|rejection| ApiError(AppError::BadRequest(rejection.body_text())))
}

/// Persist an update and describe the new cart.
async fn respond(
    state: &AppState,
    update: CartUpdate,
    message: &'static str,
) -> std::result::Result<(CartCookie, Json<CartResponse>), ApiError> {
    let cookie = store_cart(state, update.write, &update.cart).await?;
    let body = CartResponse {
        message,
        cart_count: update.cart.count(),
        total: update.cart.total(),
    };
    Ok((cookie, Json(body)))
}

// =============================================================================
// Templates
// =============================================================================

/// Cart page template.
#[derive(Template, WebTemplate)]
#[template(path = "cart/show.html")]
pub struct CartTemplate {
    pub page: PageContext,
    pub lines: Vec<CartLine>,
    /// Lines whose product left the catalog; they can only be removed.
    pub missing: Vec<ProductId>,
    pub total: Decimal,
}

// =============================================================================
// Handlers
// =============================================================================

/// Display the cart page.
///
/// The stored total is refreshed against current prices first, so the page
/// never shows a stale figure.
#[instrument(skip_all, fields(source = ?active.source))]
pub async fn show(
    State(state): State<AppState>,
    active: ActiveCart,
) -> Result<(CartCookie, CartTemplate)> {
    let catalog = ProductRepository::new(state.pool());
    let engine = CartEngine::new(&catalog);

    let cookie = match engine.reprice(active.source, &active.cart).await {
        Ok(update) => store_cart(&state, update.write, &update.cart).await?,
        Err(CommerceError::ProductNotFound(product_id)) => {
            tracing::info!(%product_id, "cart holds a product no longer in the catalog");
            CartCookie::unchanged()
        }
        Err(err) => return Err(err.into()),
    };

    let resolved = engine.lines(&active.cart).await?;
    let total = resolved.lines.iter().map(|line| line.line_total).sum();

    Ok((
        cookie,
        CartTemplate {
            page: PageContext::from(&active),
            lines: resolved.lines,
            missing: resolved.missing,
            total,
        },
    ))
}

/// Add a product to the cart.
#[instrument(skip_all)]
pub async fn add(
    State(state): State<AppState>,
    active: std::result::Result<ActiveCart, AppError>,
    payload: std::result::Result<Json<AddItemRequest>, JsonRejection>,
) -> std::result::Result<(CartCookie, Json<CartResponse>), ApiError> {
    let active = active?;
    let request = json_body(payload)?;

    let catalog = ProductRepository::new(state.pool());
    let update = CartEngine::new(&catalog)
        .add_item(active.source, &active.cart, request.product_id, request.quantity)
        .await?;

    respond(&state, update, "Product added to cart").await
}

/// Set the quantity of a cart line.
#[instrument(skip_all, fields(product_id = tracing::field::Empty))]
pub async fn update(
    State(state): State<AppState>,
    active: std::result::Result<ActiveCart, AppError>,
    path: std::result::Result<Path<ProductId>, PathRejection>,
    payload: std::result::Result<Json<UpdateQuantityRequest>, JsonRejection>,
) -> std::result::Result<(CartCookie, Json<CartResponse>), ApiError> {
    let active = active?;
    let product_id = path_product_id(path)?;
    tracing::Span::current().record("product_id", tracing::field::display(product_id));
    let request = json_body(payload)?;

    let catalog = ProductRepository::new(state.pool());
    let update = CartEngine::new(&catalog)
        .update_quantity(active.source, &active.cart, product_id, request.quantity)
        .await?;

    respond(&state, update, "Cart updated").await
}

/// Remove a product from the cart.
#[instrument(skip_all, fields(product_id = tracing::field::Empty))]
pub async fn remove(
    State(state): State<AppState>,
    active: std::result::Result<ActiveCart, AppError>,
    path: std::result::Result<Path<ProductId>, PathRejection>,
) -> std::result::Result<(CartCookie, Json<CartResponse>), ApiError> {
    let active = active?;
    let product_id = path_product_id(path)?;
    tracing::Span::current().record("product_id", tracing::field::display(product_id));

    let catalog = ProductRepository::new(state.pool());
    let update = CartEngine::new(&catalog)
        .remove_item(active.source, &active.cart, product_id)
        .await?;

    respond(&state, update, "Product removed from cart").await
}

/// Number of units in the cart, for the header badge.
pub async fn count(
    active: std::result::Result<ActiveCart, AppError>,
) -> std::result::Result<Json<CartCountResponse>, ApiError> {
    let active = active?;
    Ok(Json(CartCountResponse {
        cart_count: active.cart.count(),
    }))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_add_request_defaults_to_one() {
        let request: AddItemRequest = serde_json::from_str(r#"{"productId": 7}"#).unwrap();
        assert_eq!(request.product_id, ProductId::new(7));
        assert_eq!(request.quantity, 1);

        let request: AddItemRequest =
            serde_json::from_str(r#"{"productId": 7, "quantity": 3}"#).unwrap();
        assert_eq!(request.quantity, 3);
    }

    #[tokio::test]
    async fn test_bad_product_id_is_json_error() {
        use axum::{Router, body::Body, http::Request, http::StatusCode, routing::delete};
        use tower::ServiceExt;

        let app = Router::new().route(
            "/cart/{product_id}",
            delete(|path: std::result::Result<Path<ProductId>, PathRejection>| async move {
                path_product_id(path).map(|id| id.to_string())
            }),
        );

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri("/cart/abc")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert!(json["message"].as_str().is_some_and(|m| !m.is_empty()));

        let response = app
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri("/cart/12")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn test_cart_response_shape() {
        let body = serde_json::to_value(CartResponse {
            message: "Cart updated",
            cart_count: 4,
            total: Decimal::new(2650, 2),
        })
        .unwrap();
        assert_eq!(
            body,
            serde_json::json!({ "message": "Cart updated", "cartCount": 4, "total": "26.50" })
        );
    }
}
