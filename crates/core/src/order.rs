//! Orders and the order builder.
//!
//! Checkout runs in two phases:
//!
//! 1. The order and all its items are written in one repository call. Prices
//!    are frozen from the catalog at this moment.
//! 2. The source cart is cleared. Clearing is idempotent, so a persisted cart
//!    is saved with a bounded retry. If every attempt fails the order still
//!    stands and the receipt reports `cart_cleared = false`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::cart::{Cart, CartEngine, CartRepository, CartSource, CartWrite, RetryPolicy, save_with_retry};
use crate::catalog::{ProductCatalog, index_by_id};
use crate::error::{CommerceError, Result};
use crate::types::{OrderId, OrderStatus, PaymentMethod, Price, ProductId, Quantity, UserId};

/// Where an order ships to.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingAddress {
    pub street: String,
    pub city: String,
    pub state: String,
    pub zip_code: String,
    pub country: String,
}

impl ShippingAddress {
    /// Trim every field and require all of them.
    ///
    /// # Errors
    ///
    /// Returns `Validation` naming the first empty field.
    pub fn validated(self) -> Result<Self> {
        let address = Self {
            street: self.street.trim().to_owned(),
            city: self.city.trim().to_owned(),
            state: self.state.trim().to_owned(),
            zip_code: self.zip_code.trim().to_owned(),
            country: self.country.trim().to_owned(),
        };
        let fields = [
            ("street", &address.street),
            ("city", &address.city),
            ("state", &address.state),
            ("zipCode", &address.zip_code),
            ("country", &address.country),
        ];
        if let Some((name, _)) = fields.iter().find(|(_, value)| value.is_empty()) {
            return Err(CommerceError::Validation(format!("{name} is required")));
        }
        Ok(address)
    }
}

/// One purchased line with its price frozen at checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub product_id: ProductId,
    /// Product name at the time of purchase.
    pub name: String,
    pub quantity: Quantity,
    pub price: Price,
}

impl OrderItem {
    #[must_use]
    pub fn line_total(&self) -> Decimal {
        self.price.line_total(self.quantity)
    }
}

/// A placed order. Never modified by the storefront after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub owner_id: UserId,
    pub items: Vec<OrderItem>,
    pub total: Decimal,
    pub shipping_address: ShippingAddress,
    pub payment_method: PaymentMethod,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
}

impl Order {
    /// Check that `viewer` may see this order.
    ///
    /// # Errors
    ///
    /// Returns `Permission` unless the viewer owns the order or is an admin.
    pub fn ensure_visible_to(&self, viewer: UserId, is_admin: bool) -> Result<()> {
        if self.owner_id == viewer || is_admin {
            Ok(())
        } else {
            Err(CommerceError::Permission(format!(
                "order {} belongs to another customer",
                self.id
            )))
        }
    }

    /// Short reference shown to customers, e.g. `#000042`.
    #[must_use]
    pub fn reference(&self) -> String {
        format!("#{:06}", self.id.as_i32())
    }
}

/// An order ready to be stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrder {
    pub owner_id: UserId,
    pub items: Vec<OrderItem>,
    pub total: Decimal,
    pub shipping_address: ShippingAddress,
    pub payment_method: PaymentMethod,
}

/// Order storage.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Store an order and all its items atomically.
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the write fails; no partial order is left behind.
    async fn create(&self, order: NewOrder) -> Result<Order>;

    /// Fetch one order.
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the backing store fails.
    async fn get(&self, id: OrderId) -> Result<Option<Order>>;

    /// All orders of one customer, newest first.
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the backing store fails.
    async fn list_for_owner(&self, owner_id: UserId) -> Result<Vec<Order>>;
}

/// Outcome of a checkout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub order: Order,
    /// The cart the source should now hold (always empty).
    pub cart: Cart,
    /// What the caller still has to do to the source cart. `Keep` once a
    /// persisted cart was cleared here, `ClearCookie` for a cookie cart.
    pub write: CartWrite,
    /// Whether the source cart is known to be empty.
    pub cart_cleared: bool,
}

/// Snapshots carts into orders.
pub struct OrderBuilder<'a, C: ?Sized, O: ?Sized, R: ?Sized> {
    catalog: &'a C,
    orders: &'a O,
    carts: &'a R,
    retry: RetryPolicy,
}

impl<'a, C, O, R> OrderBuilder<'a, C, O, R>
where
    C: ProductCatalog + ?Sized,
    O: OrderRepository + ?Sized,
    R: CartRepository + ?Sized,
{
    #[must_use]
    pub fn new(catalog: &'a C, orders: &'a O, carts: &'a R) -> Self {
        Self {
            catalog,
            orders,
            carts,
            retry: RetryPolicy::default(),
        }
    }

    /// Override the retry policy of the cart-clearing phase.
    #[must_use]
    pub const fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Place an order for `owner` from `cart`, then clear the source cart.
    ///
    /// # Errors
    ///
    /// - `EmptyCart` if the cart has no items.
    /// - `Validation` if a shipping field is empty.
    /// - `ProductNotFound` if a product in the cart left the catalog.
    /// - `Storage` if the catalog lookup or the order write fails.
    ///
    /// Nothing is written when an error is returned. A failure to clear the
    /// cart after the order exists is reported in the receipt instead.
    pub async fn checkout(
        &self,
        owner_id: UserId,
        source: CartSource,
        cart: &Cart,
        shipping_address: ShippingAddress,
        payment_method: PaymentMethod,
    ) -> Result<Receipt> {
        if cart.is_empty() {
            return Err(CommerceError::EmptyCart);
        }
        let shipping_address = shipping_address.validated()?;

        let products = index_by_id(self.catalog.find_many(&cart.product_ids()).await?);
        let items = cart
            .items()
            .iter()
            .map(|item| {
                let product = products
                    .get(&item.product_id)
                    .ok_or(CommerceError::ProductNotFound(item.product_id))?;
                Ok(OrderItem {
                    product_id: item.product_id,
                    name: product.name.clone(),
                    quantity: item.quantity,
                    price: product.price,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let total: Decimal = items.iter().map(OrderItem::line_total).sum();
        if total != cart.total() {
            tracing::warn!(
                cached = %cart.total(),
                %total,
                "cart total drifted from catalog prices; charging snapshot total"
            );
        }

        let order = self
            .orders
            .create(NewOrder {
                owner_id,
                items,
                total,
                shipping_address,
                payment_method,
            })
            .await?;
        tracing::info!(order_id = %order.id, %owner_id, %total, "order placed");

        let cleared = CartEngine::new(self.catalog).clear(source);
        let (write, cart_cleared) = match cleared.write {
            CartWrite::SaveUserCart(user_id) => {
                match save_with_retry(self.carts, user_id, &cleared.cart, self.retry).await {
                    Ok(()) => (CartWrite::Keep, true),
                    Err(err) => {
                        tracing::error!(
                            order_id = %order.id,
                            %user_id,
                            error = %err,
                            "order placed but cart could not be cleared"
                        );
                        (CartWrite::Keep, false)
                    }
                }
            }
            other => (other, true),
        };

        Ok(Receipt {
            order,
            cart: cleared.cart,
            write,
            cart_cleared,
        })
    }

    /// Fetch an order on behalf of `viewer`.
    ///
    /// # Errors
    ///
    /// - `OrderNotFound` if no such order exists.
    /// - `Permission` if the viewer is neither the owner nor an admin.
    /// - `Storage` if the lookup fails.
    pub async fn order_for_viewer(
        &self,
        id: OrderId,
        viewer: UserId,
        is_admin: bool,
    ) -> Result<Order> {
        let order = self
            .orders
            .get(id)
            .await?
            .ok_or(CommerceError::OrderNotFound(id))?;
        order.ensure_visible_to(viewer, is_admin)?;
        Ok(order)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn address() -> ShippingAddress {
        ShippingAddress {
            street: " 1 Main St ".into(),
            city: "Springfield".into(),
            state: "IL".into(),
            zip_code: "62701".into(),
            country: "US".into(),
        }
    }

    #[test]
    fn test_validated_trims() {
        let address = address().validated().unwrap();
        assert_eq!(address.street, "1 Main St");
    }

    #[test]
    fn test_validated_names_first_empty_field() {
        let mut address = address();
        address.zip_code = "   ".into();
        address.country = String::new();
        let err = address.validated().unwrap_err();
        assert_eq!(err.to_string(), "validation failed: zipCode is required");
    }

    #[test]
    fn test_order_visibility() {
        let order = Order {
            id: OrderId::new(42),
            owner_id: UserId::new(1),
            items: Vec::new(),
            total: Decimal::ZERO,
            shipping_address: address(),
            payment_method: PaymentMethod::Paypal,
            status: OrderStatus::Pending,
            created_at: Utc::now(),
        };
        assert!(order.ensure_visible_to(UserId::new(1), false).is_ok());
        assert!(order.ensure_visible_to(UserId::new(2), true).is_ok());
        let err = order.ensure_visible_to(UserId::new(2), false).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Permission);
        assert_eq!(order.reference(), "#000042");
    }
}
