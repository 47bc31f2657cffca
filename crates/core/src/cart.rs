//! Cart model and the cart engine.
//!
//! A [`Cart`] is an immutable snapshot: a set of line items plus a cached
//! total. The [`CartEngine`] never mutates a cart in place. Each operation
//! returns a [`CartUpdate`] holding the new snapshot and the [`CartWrite`] the
//! caller must perform against the resolved [`CartSource`].
//!
//! Every mutation recomputes the total from the full item list using prices
//! fetched from the catalog at that moment. There is no incremental path.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::catalog::{Product, ProductCatalog, index_by_id};
use crate::error::{CommerceError, Result};
use crate::types::{ProductId, Quantity, QuantityError, UserId};

/// A (product, quantity) line in a cart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    pub product_id: ProductId,
    pub quantity: Quantity,
}

/// An immutable cart snapshot.
///
/// Invariants: at most one item per product, and `total` equals the sum of
/// price × quantity as of the last recomputation. Deserialization merges
/// duplicate lines so snapshots read back from storage hold the first
/// invariant too.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "RawCart")]
pub struct Cart {
    items: Vec<CartItem>,
    total: Decimal,
}

#[derive(Deserialize)]
struct RawCart {
    #[serde(default)]
    items: Vec<CartItem>,
    #[serde(default)]
    total: Decimal,
}

impl TryFrom<RawCart> for Cart {
    type Error = QuantityError;

    fn try_from(raw: RawCart) -> std::result::Result<Self, Self::Error> {
        let mut items: Vec<CartItem> = Vec::with_capacity(raw.items.len());
        for item in raw.items {
            match items.iter_mut().find(|i| i.product_id == item.product_id) {
                Some(existing) => existing.quantity = existing.quantity.checked_add(item.quantity)?,
                None => items.push(item),
            }
        }
        Ok(Self {
            items,
            total: raw.total,
        })
    }
}

impl Cart {
    /// The line items, in insertion order.
    #[must_use]
    pub fn items(&self) -> &[CartItem] {
        &self.items
    }

    /// The cached total.
    #[must_use]
    pub const fn total(&self) -> Decimal {
        self.total
    }

    /// Sum of all item quantities, for the header badge.
    #[must_use]
    pub fn count(&self) -> u32 {
        self.items.iter().map(|i| i.quantity.get()).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Quantity held for a product, if it is in the cart.
    #[must_use]
    pub fn quantity_of(&self, product_id: ProductId) -> Option<Quantity> {
        self.items
            .iter()
            .find(|i| i.product_id == product_id)
            .map(|i| i.quantity)
    }

    /// Ids of all products referenced by the cart.
    #[must_use]
    pub fn product_ids(&self) -> Vec<ProductId> {
        self.items.iter().map(|i| i.product_id).collect()
    }
}

/// Where a cart lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CartSource {
    /// Embedded in the signed-in user's record.
    Persisted(UserId),
    /// Held by the visitor's browser in the cart cookie.
    Ephemeral,
}

impl CartSource {
    /// The write that stores `cart` in this source.
    #[must_use]
    pub fn write_for(&self, cart: &Cart) -> CartWrite {
        match self {
            Self::Persisted(user_id) => CartWrite::SaveUserCart(*user_id),
            Self::Ephemeral if cart.is_empty() => CartWrite::ClearCookie,
            Self::Ephemeral => CartWrite::SetCookie,
        }
    }

    fn update(self, cart: Cart) -> CartUpdate {
        let write = self.write_for(&cart);
        CartUpdate { cart, write }
    }
}

/// Instruction for persisting a new cart snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CartWrite {
    /// Nothing changed.
    Keep,
    /// Overwrite the cart document on the user's record.
    SaveUserCart(UserId),
    /// Re-issue the cart cookie with the new snapshot.
    SetCookie,
    /// Remove the cart cookie.
    ClearCookie,
}

/// Result of a cart operation: the new snapshot and how to store it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartUpdate {
    pub cart: Cart,
    pub write: CartWrite,
}

/// Storage for carts embedded in user records.
///
/// Saves overwrite the whole document, so concurrent writers to the same cart
/// resolve last-write-wins.
#[async_trait]
pub trait CartRepository: Send + Sync {
    /// Load a user's cart; an unknown user or missing cart yields an empty cart.
    ///
    /// # Errors
    ///
    /// Returns `CommerceError::Storage` if the backing store fails.
    async fn load(&self, user_id: UserId) -> Result<Cart>;

    /// Replace a user's cart.
    ///
    /// # Errors
    ///
    /// Returns `CommerceError::Storage` if the backing store fails.
    async fn save(&self, user_id: UserId, cart: &Cart) -> Result<()>;
}

/// Bounded retry for idempotent writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub attempts: u32,
    /// Delay before each retry, doubled after every failure.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff: Duration::from_millis(50),
        }
    }
}

/// Save a user's cart, retrying on storage failure.
///
/// Only valid for idempotent writes such as clearing a cart.
///
/// # Errors
///
/// Returns the last storage error once all attempts are exhausted.
pub async fn save_with_retry<R: CartRepository + ?Sized>(
    repo: &R,
    user_id: UserId,
    cart: &Cart,
    policy: RetryPolicy,
) -> Result<()> {
    let mut delay = policy.backoff;
    let mut attempt = 1;
    loop {
        match repo.save(user_id, cart).await {
            Ok(()) => return Ok(()),
            Err(err) if attempt < policy.attempts => {
                tracing::warn!(%user_id, attempt, error = %err, "cart save failed, retrying");
                tokio::time::sleep(delay).await;
                delay = delay.saturating_mul(2);
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

/// A cart line joined with its current catalog entry, for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartLine {
    pub product: Product,
    pub quantity: Quantity,
    pub line_total: Decimal,
}

/// Cart lines resolved against the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CartLines {
    pub lines: Vec<CartLine>,
    /// Products still in the cart that the catalog no longer has.
    pub missing: Vec<ProductId>,
}

/// Applies cart operations using the catalog for authoritative prices.
pub struct CartEngine<'a, C: ?Sized> {
    catalog: &'a C,
}

impl<'a, C: ProductCatalog + ?Sized> CartEngine<'a, C> {
    #[must_use]
    pub const fn new(catalog: &'a C) -> Self {
        Self { catalog }
    }

    /// Add `quantity` units of a product, accumulating onto an existing line.
    ///
    /// # Errors
    ///
    /// - `Validation` if `quantity < 1` or the line would exceed the maximum.
    /// - `ProductNotFound` if the product, or any other product in the cart,
    ///   is not in the catalog.
    /// - `Storage` if the catalog lookup fails.
    pub async fn add_item(
        &self,
        source: CartSource,
        cart: &Cart,
        product_id: ProductId,
        quantity: i64,
    ) -> Result<CartUpdate> {
        let quantity = Quantity::try_from(quantity)?;
        if self.catalog.get(product_id).await?.is_none() {
            return Err(CommerceError::ProductNotFound(product_id));
        }

        let mut items = cart.items.clone();
        match items.iter_mut().find(|i| i.product_id == product_id) {
            Some(existing) => existing.quantity = existing.quantity.checked_add(quantity)?,
            None => items.push(CartItem {
                product_id,
                quantity,
            }),
        }

        let total = self.compute_total(&items).await?;
        tracing::debug!(%product_id, %quantity, %total, "added item to cart");
        Ok(source.update(Cart { items, total }))
    }

    /// Set a line's quantity to exactly `quantity`.
    ///
    /// # Errors
    ///
    /// - `Validation` if `quantity < 1`.
    /// - `NotInCart` if the product is not a line in the cart.
    /// - `ProductNotFound` if a product in the cart is no longer in the catalog.
    /// - `Storage` if the catalog lookup fails.
    pub async fn update_quantity(
        &self,
        source: CartSource,
        cart: &Cart,
        product_id: ProductId,
        quantity: i64,
    ) -> Result<CartUpdate> {
        let quantity = Quantity::try_from(quantity)?;
        let mut items = cart.items.clone();
        let item = items
            .iter_mut()
            .find(|i| i.product_id == product_id)
            .ok_or(CommerceError::NotInCart(product_id))?;
        item.quantity = quantity;

        let total = self.compute_total(&items).await?;
        tracing::debug!(%product_id, %quantity, %total, "updated cart quantity");
        Ok(source.update(Cart { items, total }))
    }

    /// Remove a product's line. Removing an absent product changes nothing.
    ///
    /// # Errors
    ///
    /// - `ProductNotFound` if a remaining product is no longer in the catalog.
    /// - `Storage` if the catalog lookup fails.
    pub async fn remove_item(
        &self,
        source: CartSource,
        cart: &Cart,
        product_id: ProductId,
    ) -> Result<CartUpdate> {
        if cart.quantity_of(product_id).is_none() {
            return Ok(CartUpdate {
                cart: cart.clone(),
                write: CartWrite::Keep,
            });
        }

        let items: Vec<CartItem> = cart
            .items
            .iter()
            .copied()
            .filter(|i| i.product_id != product_id)
            .collect();
        let total = self.compute_total(&items).await?;
        tracing::debug!(%product_id, %total, "removed item from cart");
        Ok(source.update(Cart { items, total }))
    }

    /// Empty the cart. Clearing an empty cart is harmless.
    #[must_use]
    pub fn clear(&self, source: CartSource) -> CartUpdate {
        source.update(Cart::default())
    }

    /// Sum of item quantities.
    #[must_use]
    pub fn count(&self, cart: &Cart) -> u32 {
        cart.count()
    }

    /// Recompute a stored cart's total against current prices.
    ///
    /// Returns `CartWrite::Keep` when the cached total was already correct.
    ///
    /// # Errors
    ///
    /// - `ProductNotFound` if a product in the cart is no longer in the catalog.
    /// - `Storage` if the catalog lookup fails.
    pub async fn reprice(&self, source: CartSource, cart: &Cart) -> Result<CartUpdate> {
        let total = self.compute_total(&cart.items).await?;
        if total == cart.total {
            return Ok(CartUpdate {
                cart: cart.clone(),
                write: CartWrite::Keep,
            });
        }
        tracing::info!(cached = %cart.total, %total, "cart total was stale");
        Ok(source.update(Cart {
            items: cart.items.clone(),
            total,
        }))
    }

    /// Resolve cart lines for display, tolerating vanished products.
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the catalog lookup fails.
    pub async fn lines(&self, cart: &Cart) -> Result<CartLines> {
        if cart.is_empty() {
            return Ok(CartLines::default());
        }
        let mut products = index_by_id(self.catalog.find_many(&cart.product_ids()).await?);

        let mut resolved = CartLines::default();
        for item in &cart.items {
            match products.remove(&item.product_id) {
                Some(product) => resolved.lines.push(CartLine {
                    line_total: product.price.line_total(item.quantity),
                    product,
                    quantity: item.quantity,
                }),
                None => resolved.missing.push(item.product_id),
            }
        }
        Ok(resolved)
    }

    async fn compute_total(&self, items: &[CartItem]) -> Result<Decimal> {
        if items.is_empty() {
            return Ok(Decimal::ZERO);
        }
        let ids: Vec<ProductId> = items.iter().map(|i| i.product_id).collect();
        let products = index_by_id(self.catalog.find_many(&ids).await?);
        sum_items(items, &products)
    }
}

/// Sum price × quantity over `items`, failing on the first unknown product.
pub(crate) fn sum_items(
    items: &[CartItem],
    products: &HashMap<ProductId, Product>,
) -> Result<Decimal> {
    items.iter().try_fold(Decimal::ZERO, |sum, item| {
        let product = products
            .get(&item.product_id)
            .ok_or(CommerceError::ProductNotFound(item.product_id))?;
        Ok(sum + product.price.line_total(item.quantity))
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn item(id: i32, qty: u32) -> CartItem {
        CartItem {
            product_id: ProductId::new(id),
            quantity: Quantity::new(qty).unwrap(),
        }
    }

    #[test]
    fn test_count_sums_quantities() {
        let cart = Cart {
            items: vec![item(1, 2), item(2, 3)],
            total: Decimal::ZERO,
        };
        assert_eq!(cart.count(), 5);
        assert_eq!(Cart::default().count(), 0);
    }

    #[test]
    fn test_deserialize_merges_duplicate_lines() {
        let json = r#"{"items":[{"productId":1,"quantity":2},{"productId":1,"quantity":3}],"total":"0"}"#;
        let cart: Cart = serde_json::from_str(json).unwrap();
        assert_eq!(cart.items(), &[item(1, 5)]);
    }

    #[test]
    fn test_deserialize_rejects_zero_quantity() {
        let json = r#"{"items":[{"productId":1,"quantity":0}],"total":"0"}"#;
        assert!(serde_json::from_str::<Cart>(json).is_err());
    }

    #[test]
    fn test_deserialize_defaults_missing_fields() {
        let cart: Cart = serde_json::from_str("{}").unwrap();
        assert!(cart.is_empty());
        assert_eq!(cart.total(), Decimal::ZERO);
    }

    #[test]
    fn test_serialized_shape() {
        let cart = Cart {
            items: vec![item(3, 1)],
            total: Decimal::new(500, 2),
        };
        let json = serde_json::to_value(&cart).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"items": [{"productId": 3, "quantity": 1}], "total": "5.00"})
        );
    }

    #[test]
    fn test_write_for_source() {
        let user = UserId::new(4);
        let full = Cart {
            items: vec![item(1, 1)],
            total: Decimal::ONE,
        };
        assert_eq!(
            CartSource::Persisted(user).write_for(&Cart::default()),
            CartWrite::SaveUserCart(user)
        );
        assert_eq!(CartSource::Ephemeral.write_for(&full), CartWrite::SetCookie);
        assert_eq!(
            CartSource::Ephemeral.write_for(&Cart::default()),
            CartWrite::ClearCookie
        );
    }

    #[test]
    fn test_sum_items_reports_missing_product() {
        let err = sum_items(&[item(8, 1)], &HashMap::new()).unwrap_err();
        assert!(matches!(err, CommerceError::ProductNotFound(id) if id == ProductId::new(8)));
    }
}
