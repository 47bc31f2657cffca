//! Order route handlers: checkout, history and order detail.
//!
//! All order routes require a signed-in user. Placing an order snapshots the
//! cart's current prices into the order and then clears the cart.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::instrument;

use corner_shop_core::{
    CartEngine, CartLine, CommerceError, Order, OrderBuilder, OrderId, PaymentMethod,
    ShippingAddress,
};

use super::PageContext;
use crate::db::{OrderRepository, ProductRepository, UserRepository};
use crate::error::Result;
use crate::filters;
use crate::middleware::{ActiveCart, RequireAuth, store_cart};
use crate::state::AppState;

// =============================================================================
// Form Types
// =============================================================================

/// Checkout form data, posted with camelCase field names.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutForm {
    #[serde(default)]
    pub street: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub zip_code: String,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub payment_method: String,
}

impl CheckoutForm {
    fn shipping_address(&self) -> ShippingAddress {
        ShippingAddress {
            street: self.street.clone(),
            city: self.city.clone(),
            state: self.state.clone(),
            zip_code: self.zip_code.clone(),
            country: self.country.clone(),
        }
    }
}

/// A payment method option on the checkout form.
pub struct PaymentOption {
    pub value: &'static str,
    pub label: &'static str,
}

fn payment_options() -> Vec<PaymentOption> {
    PaymentMethod::ALL
        .iter()
        .map(|method| PaymentOption {
            value: method.as_str(),
            label: method.label(),
        })
        .collect()
}

// =============================================================================
// Templates
// =============================================================================

/// Order history template.
#[derive(Template, WebTemplate)]
#[template(path = "orders/index.html")]
pub struct OrdersIndexTemplate {
    pub page: PageContext,
    pub orders: Vec<Order>,
}

/// Checkout page template.
#[derive(Template, WebTemplate)]
#[template(path = "orders/checkout.html")]
pub struct CheckoutTemplate {
    pub page: PageContext,
    pub lines: Vec<CartLine>,
    pub total: Decimal,
    pub form: CheckoutForm,
    pub payment_options: Vec<PaymentOption>,
    pub error: Option<String>,
}

/// Order detail template.
#[derive(Template, WebTemplate)]
#[template(path = "orders/show.html")]
pub struct OrderShowTemplate {
    pub page: PageContext,
    pub order: Order,
    /// Set right after checkout if the cart could not be emptied.
    pub cart_not_cleared: bool,
}

/// Query string on the order page after checkout.
#[derive(Debug, Default, Deserialize)]
pub struct OrderQuery {
    #[serde(default)]
    pub cart_not_cleared: bool,
}

/// Render the checkout page for the active cart.
async fn checkout_page(
    state: &AppState,
    active: &ActiveCart,
    form: CheckoutForm,
    error: Option<String>,
) -> Result<CheckoutTemplate> {
    let catalog = ProductRepository::new(state.pool());
    let resolved = CartEngine::new(&catalog).lines(&active.cart).await?;
    if let Some(product_id) = resolved.missing.first() {
        return Err(CommerceError::ProductNotFound(*product_id).into());
    }
    let total = resolved.lines.iter().map(|line| line.line_total).sum();

    Ok(CheckoutTemplate {
        page: PageContext::from(active),
        lines: resolved.lines,
        total,
        form,
        payment_options: payment_options(),
        error,
    })
}

// =============================================================================
// Handlers
// =============================================================================

/// Display the signed-in user's orders, newest first.
#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn index(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    page: PageContext,
) -> Result<OrdersIndexTemplate> {
    let orders = OrderRepository::new(state.pool())
        .list_by_owner(user.id)
        .await?;

    Ok(OrdersIndexTemplate { page, orders })
}

/// Display the checkout form. An empty cart goes back to the cart page.
#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn checkout(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    active: ActiveCart,
) -> Result<Response> {
    if active.cart.is_empty() {
        return Ok(Redirect::to("/cart").into_response());
    }

    let page = checkout_page(&state, &active, CheckoutForm::default(), None).await?;
    Ok(page.into_response())
}

/// Place an order from the active cart.
#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn place(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    active: ActiveCart,
    Form(form): Form<CheckoutForm>,
) -> Result<Response> {
    if active.cart.is_empty() {
        return Ok(Redirect::to("/cart").into_response());
    }

    let payment_method = match form.payment_method.parse::<PaymentMethod>() {
        Ok(method) => method,
        Err(_) => {
            let error = Some("Please choose a payment method".to_owned());
            let page = checkout_page(&state, &active, form, error).await?;
            return Ok((StatusCode::BAD_REQUEST, page).into_response());
        }
    };

    let catalog = ProductRepository::new(state.pool());
    let orders = OrderRepository::new(state.pool());
    let carts = UserRepository::new(state.pool());
    let outcome = OrderBuilder::new(&catalog, &orders, &carts)
        .checkout(
            user.id,
            active.source,
            &active.cart,
            form.shipping_address(),
            payment_method,
        )
        .await;

    let receipt = match outcome {
        Ok(receipt) => receipt,
        Err(CommerceError::EmptyCart) => return Ok(Redirect::to("/cart").into_response()),
        Err(CommerceError::Validation(message)) => {
            let page = checkout_page(&state, &active, form, Some(message)).await?;
            return Ok((StatusCode::BAD_REQUEST, page).into_response());
        }
        Err(err) => return Err(err.into()),
    };

    let cookie = store_cart(&state, receipt.write, &receipt.cart).await?;
    let location = if receipt.cart_cleared {
        format!("/orders/{}", receipt.order.id)
    } else {
        format!("/orders/{}?cart_not_cleared=true", receipt.order.id)
    };

    Ok((cookie, Redirect::to(&location)).into_response())
}

/// Display one order to its owner or an admin.
#[instrument(skip_all, fields(user_id = %user.id, order_id = %id))]
pub async fn show(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    page: PageContext,
    Path(id): Path<OrderId>,
    Query(query): Query<OrderQuery>,
) -> Result<OrderShowTemplate> {
    let catalog = ProductRepository::new(state.pool());
    let orders = OrderRepository::new(state.pool());
    let carts = UserRepository::new(state.pool());
    let order = OrderBuilder::new(&catalog, &orders, &carts)
        .order_for_viewer(id, user.id, user.is_admin)
        .await?;

    Ok(OrderShowTemplate {
        page,
        order,
        cart_not_cleared: query.cart_not_cleared,
    })
}
