//! Checkout against in-memory repositories.

#![allow(clippy::unwrap_used)]

use std::time::Duration;

use corner_shop_core::memory::{MemoryCartRepository, MemoryCatalog, MemoryOrderRepository};
use corner_shop_core::{
    Cart, CartEngine, CartRepository, CartSource, CartWrite, CommerceError, ErrorKind,
    OrderBuilder, OrderId, OrderRepository, PaymentMethod, Price, ProductId, RetryPolicy,
    ShippingAddress, UserId,
};
use rust_decimal::Decimal;

const FAST_RETRY: RetryPolicy = RetryPolicy {
    attempts: 3,
    backoff: Duration::from_millis(1),
};

struct Shop {
    catalog: MemoryCatalog,
    carts: MemoryCartRepository,
    orders: MemoryOrderRepository,
    p1: ProductId,
    p2: ProductId,
}

impl Shop {
    async fn new() -> Self {
        let catalog = MemoryCatalog::new();
        let p1 = catalog.insert("Notebook", Price::parse("10.00").unwrap()).await;
        let p2 = catalog.insert("Pencil", Price::parse("5.00").unwrap()).await;
        Self {
            catalog,
            carts: MemoryCartRepository::new(),
            orders: MemoryOrderRepository::new(),
            p1,
            p2,
        }
    }

    fn builder(&self) -> OrderBuilder<'_, MemoryCatalog, MemoryOrderRepository, MemoryCartRepository> {
        OrderBuilder::new(&self.catalog, &self.orders, &self.carts).with_retry(FAST_RETRY)
    }

    /// Fill a cart with 2 × p1 and 1 × p2 and store it for `user`.
    async fn filled_cart(&self, user: UserId) -> Cart {
        let engine = CartEngine::new(&self.catalog);
        let source = CartSource::Persisted(user);
        let cart = engine.add_item(source, &Cart::default(), self.p1, 2).await.unwrap().cart;
        let cart = engine.add_item(source, &cart, self.p2, 1).await.unwrap().cart;
        self.carts.save(user, &cart).await.unwrap();
        cart
    }
}

fn address() -> ShippingAddress {
    ShippingAddress {
        street: "12 Elm Road".into(),
        city: "Portland".into(),
        state: "OR".into(),
        zip_code: "97201".into(),
        country: "US".into(),
    }
}

#[tokio::test]
async fn test_checkout_snapshots_prices_and_clears_cart() {
    let shop = Shop::new().await;
    let user = UserId::new(1);
    let cart = shop.filled_cart(user).await;
    assert_eq!(cart.total(), Decimal::from(25));

    let receipt = shop
        .builder()
        .checkout(
            user,
            CartSource::Persisted(user),
            &cart,
            address(),
            PaymentMethod::CreditCard,
        )
        .await
        .unwrap();

    let order = &receipt.order;
    assert_eq!(order.owner_id, user);
    assert_eq!(order.items.len(), 2);
    assert_eq!(order.items[0].product_id, shop.p1);
    assert_eq!(order.items[0].price.amount(), Decimal::from(10));
    assert_eq!(order.items[0].quantity.get(), 2);
    assert_eq!(order.items[1].product_id, shop.p2);
    assert_eq!(order.items[1].price.amount(), Decimal::from(5));
    assert_eq!(order.total, Decimal::from(25));

    assert!(receipt.cart_cleared);
    assert!(receipt.cart.is_empty());
    assert_eq!(receipt.write, CartWrite::Keep);
    assert!(shop.carts.load(user).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_order_prices_survive_later_catalog_changes() {
    let shop = Shop::new().await;
    let user = UserId::new(1);
    let cart = shop.filled_cart(user).await;

    let receipt = shop
        .builder()
        .checkout(user, CartSource::Persisted(user), &cart, address(), PaymentMethod::Paypal)
        .await
        .unwrap();
    shop.catalog.set_price(shop.p1, Price::parse("99.00").unwrap()).await;

    let stored = shop.orders.get(receipt.order.id).await.unwrap().unwrap();
    assert_eq!(stored.items[0].price.amount(), Decimal::from(10));
    assert_eq!(stored.total, Decimal::from(25));
}

#[tokio::test]
async fn test_checkout_charges_current_prices_over_stale_total() {
    let shop = Shop::new().await;
    let user = UserId::new(1);
    let cart = shop.filled_cart(user).await;
    shop.catalog.set_price(shop.p2, Price::parse("6.00").unwrap()).await;

    let receipt = shop
        .builder()
        .checkout(user, CartSource::Persisted(user), &cart, address(), PaymentMethod::BankTransfer)
        .await
        .unwrap();
    assert_eq!(receipt.order.total, Decimal::from(26));
    let summed: Decimal = receipt.order.items.iter().map(|i| i.line_total()).sum();
    assert_eq!(receipt.order.total, summed);
}

#[tokio::test]
async fn test_empty_cart_creates_no_order() {
    let shop = Shop::new().await;
    let user = UserId::new(1);

    let err = shop
        .builder()
        .checkout(user, CartSource::Persisted(user), &Cart::default(), address(), PaymentMethod::CreditCard)
        .await
        .unwrap_err();
    assert!(matches!(err, CommerceError::EmptyCart));
    assert!(shop.orders.is_empty().await);
}

#[tokio::test]
async fn test_missing_shipping_field_creates_no_order() {
    let shop = Shop::new().await;
    let user = UserId::new(1);
    let cart = shop.filled_cart(user).await;
    let mut shipping = address();
    shipping.city = "  ".into();

    let err = shop
        .builder()
        .checkout(user, CartSource::Persisted(user), &cart, shipping, PaymentMethod::CreditCard)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(shop.orders.is_empty().await);
    assert_eq!(shop.carts.load(user).await.unwrap(), cart);
}

#[tokio::test]
async fn test_vanished_product_creates_no_order() {
    let shop = Shop::new().await;
    let user = UserId::new(1);
    let cart = shop.filled_cart(user).await;
    shop.catalog.remove(shop.p2).await;

    let err = shop
        .builder()
        .checkout(user, CartSource::Persisted(user), &cart, address(), PaymentMethod::CreditCard)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert!(shop.orders.is_empty().await);
    assert_eq!(shop.carts.load(user).await.unwrap(), cart);
}

#[tokio::test]
async fn test_failed_order_write_leaves_cart_intact() {
    let shop = Shop::new().await;
    let user = UserId::new(1);
    let cart = shop.filled_cart(user).await;
    shop.orders.fail_next_creates(1);

    let err = shop
        .builder()
        .checkout(user, CartSource::Persisted(user), &cart, address(), PaymentMethod::CreditCard)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Storage);
    assert!(shop.orders.is_empty().await);
    assert_eq!(shop.carts.load(user).await.unwrap(), cart);
}

#[tokio::test]
async fn test_cookie_cart_checkout_asks_to_clear_cookie() {
    let shop = Shop::new().await;
    let user = UserId::new(1);
    let engine = CartEngine::new(&shop.catalog);
    let cart = engine
        .add_item(CartSource::Ephemeral, &Cart::default(), shop.p1, 1)
        .await
        .unwrap()
        .cart;

    let receipt = shop
        .builder()
        .checkout(user, CartSource::Ephemeral, &cart, address(), PaymentMethod::CashOnDelivery)
        .await
        .unwrap();
    assert_eq!(receipt.write, CartWrite::ClearCookie);
    assert!(receipt.cart_cleared);
    assert_eq!(shop.carts.save_count(), 0);
}

#[tokio::test]
async fn test_cart_clear_is_retried() {
    let shop = Shop::new().await;
    let user = UserId::new(1);
    let cart = shop.filled_cart(user).await;
    shop.carts.fail_next_saves(2);

    let receipt = shop
        .builder()
        .checkout(user, CartSource::Persisted(user), &cart, address(), PaymentMethod::CreditCard)
        .await
        .unwrap();
    assert!(receipt.cart_cleared);
    assert!(shop.carts.load(user).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_order_stands_when_cart_clear_keeps_failing() {
    let shop = Shop::new().await;
    let user = UserId::new(1);
    let cart = shop.filled_cart(user).await;
    shop.carts.fail_next_saves(3);

    let receipt = shop
        .builder()
        .checkout(user, CartSource::Persisted(user), &cart, address(), PaymentMethod::CreditCard)
        .await
        .unwrap();
    assert!(!receipt.cart_cleared);
    assert_eq!(shop.orders.len().await, 1);
    assert_eq!(shop.carts.load(user).await.unwrap(), cart);
}

#[tokio::test]
async fn test_orders_are_private_to_owner_and_admins() {
    let shop = Shop::new().await;
    let owner = UserId::new(1);
    let stranger = UserId::new(2);
    let cart = shop.filled_cart(owner).await;
    let receipt = shop
        .builder()
        .checkout(owner, CartSource::Persisted(owner), &cart, address(), PaymentMethod::CreditCard)
        .await
        .unwrap();
    let id = receipt.order.id;

    let builder = shop.builder();
    assert_eq!(builder.order_for_viewer(id, owner, false).await.unwrap().id, id);
    assert_eq!(builder.order_for_viewer(id, stranger, true).await.unwrap().id, id);
    let err = builder.order_for_viewer(id, stranger, false).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Permission);
    let err = builder
        .order_for_viewer(OrderId::new(999), owner, false)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_order_history_is_newest_first() {
    let shop = Shop::new().await;
    let user = UserId::new(1);
    let mut placed = Vec::new();
    for _ in 0..2 {
        let cart = shop.filled_cart(user).await;
        let receipt = shop
            .builder()
            .checkout(user, CartSource::Persisted(user), &cart, address(), PaymentMethod::CreditCard)
            .await
            .unwrap();
        placed.push(receipt.order.id);
    }

    let history = shop.orders.list_for_owner(user).await.unwrap();
    let ids: Vec<OrderId> = history.iter().map(|o| o.id).collect();
    assert_eq!(ids, vec![placed[1], placed[0]]);
}
