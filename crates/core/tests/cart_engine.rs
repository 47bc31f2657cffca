//! Cart engine behavior against the in-memory catalog.

#![allow(clippy::unwrap_used)]

use corner_shop_core::memory::MemoryCatalog;
use corner_shop_core::{
    Cart, CartEngine, CartSource, CartWrite, CommerceError, ErrorKind, Price, ProductId, UserId,
};
use rust_decimal::Decimal;

fn price(s: &str) -> Price {
    Price::parse(s).unwrap()
}

fn dec(s: &str) -> Decimal {
    s.parse().unwrap()
}

/// Recompute a cart's total from scratch using current catalog prices.
async fn true_total(catalog: &MemoryCatalog, cart: &Cart) -> Decimal {
    let mut total = Decimal::ZERO;
    for item in cart.items() {
        let product = corner_shop_core::ProductCatalog::get(catalog, item.product_id)
            .await
            .unwrap()
            .unwrap();
        total += product.price.line_total(item.quantity);
    }
    total
}

#[tokio::test]
async fn test_single_product_lifecycle() {
    let catalog = MemoryCatalog::new();
    let p1 = catalog.insert("Mug", price("10.00")).await;
    let engine = CartEngine::new(&catalog);
    let source = CartSource::Ephemeral;

    let update = engine.add_item(source, &Cart::default(), p1, 2).await.unwrap();
    assert_eq!(update.cart.total(), dec("20.00"));
    assert_eq!(update.cart.count(), 2);
    assert_eq!(update.write, CartWrite::SetCookie);

    let update = engine.add_item(source, &update.cart, p1, 3).await.unwrap();
    assert_eq!(update.cart.items().len(), 1);
    assert_eq!(update.cart.quantity_of(p1).unwrap().get(), 5);
    assert_eq!(update.cart.total(), dec("50.00"));

    let update = engine.update_quantity(source, &update.cart, p1, 1).await.unwrap();
    assert_eq!(update.cart.quantity_of(p1).unwrap().get(), 1);
    assert_eq!(update.cart.total(), dec("10.00"));

    let update = engine.remove_item(source, &update.cart, p1).await.unwrap();
    assert!(update.cart.items().is_empty());
    assert_eq!(update.cart.total(), Decimal::ZERO);
    assert_eq!(update.write, CartWrite::ClearCookie);
}

#[tokio::test]
async fn test_adds_accumulate_into_one_line() {
    let catalog = MemoryCatalog::new();
    let other = catalog.insert("Tea", price("3.25")).await;
    let p = catalog.insert("Kettle", price("24.99")).await;
    let engine = CartEngine::new(&catalog);
    let source = CartSource::Persisted(UserId::new(1));

    let start = engine.add_item(source, &Cart::default(), other, 1).await.unwrap().cart;
    let once = engine.add_item(source, &start, p, 2).await.unwrap().cart;
    let twice = engine.add_item(source, &once, p, 4).await.unwrap();

    assert_eq!(twice.write, CartWrite::SaveUserCart(UserId::new(1)));
    assert_eq!(twice.cart.items().len(), 2);
    assert_eq!(twice.cart.quantity_of(p).unwrap().get(), 6);
    assert_eq!(twice.cart.total(), dec("3.25") + dec("24.99") * Decimal::from(6));
}

#[tokio::test]
async fn test_total_never_drifts_across_mixed_operations() {
    let catalog = MemoryCatalog::new();
    let a = catalog.insert("A", price("1.10")).await;
    let b = catalog.insert("B", price("7.00")).await;
    let c = catalog.insert("C", price("0.35")).await;
    let engine = CartEngine::new(&catalog);
    let source = CartSource::Ephemeral;

    let mut cart = Cart::default();
    cart = engine.add_item(source, &cart, a, 3).await.unwrap().cart;
    cart = engine.add_item(source, &cart, b, 1).await.unwrap().cart;
    cart = engine.add_item(source, &cart, c, 9).await.unwrap().cart;
    cart = engine.add_item(source, &cart, a, 2).await.unwrap().cart;
    cart = engine.update_quantity(source, &cart, b, 4).await.unwrap().cart;
    cart = engine.remove_item(source, &cart, c).await.unwrap().cart;
    cart = engine.add_item(source, &cart, c, 1).await.unwrap().cart;
    assert_eq!(cart.total(), true_total(&catalog, &cart).await);

    // A price change is picked up by the next mutation of any line.
    catalog.set_price(b, price("6.50")).await;
    cart = engine.add_item(source, &cart, a, 1).await.unwrap().cart;
    assert_eq!(cart.total(), true_total(&catalog, &cart).await);
    assert_eq!(cart.total(), dec("6.60") + dec("26.00") + dec("0.35"));
}

#[tokio::test]
async fn test_add_unknown_product_fails() {
    let catalog = MemoryCatalog::new();
    let engine = CartEngine::new(&catalog);

    let err = engine
        .add_item(CartSource::Ephemeral, &Cart::default(), ProductId::new(99), 1)
        .await
        .unwrap_err();
    assert!(matches!(err, CommerceError::ProductNotFound(id) if id == ProductId::new(99)));
}

#[tokio::test]
async fn test_add_rejects_non_positive_quantity() {
    let catalog = MemoryCatalog::new();
    let p = catalog.insert("Mug", price("10.00")).await;
    let engine = CartEngine::new(&catalog);

    for qty in [0, -3] {
        let err = engine
            .add_item(CartSource::Ephemeral, &Cart::default(), p, qty)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }
}

#[tokio::test]
async fn test_update_quantity_validation_leaves_cart_unchanged() {
    let catalog = MemoryCatalog::new();
    let p = catalog.insert("Mug", price("10.00")).await;
    let engine = CartEngine::new(&catalog);
    let cart = engine
        .add_item(CartSource::Ephemeral, &Cart::default(), p, 2)
        .await
        .unwrap()
        .cart;
    let before = cart.clone();

    for qty in [0, -1] {
        let err = engine
            .update_quantity(CartSource::Ephemeral, &cart, p, qty)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }
    assert_eq!(cart, before);
}

#[tokio::test]
async fn test_update_quantity_of_absent_item_fails() {
    let catalog = MemoryCatalog::new();
    let p = catalog.insert("Mug", price("10.00")).await;
    let engine = CartEngine::new(&catalog);

    let err = engine
        .update_quantity(CartSource::Ephemeral, &Cart::default(), p, 2)
        .await
        .unwrap_err();
    assert!(matches!(err, CommerceError::NotInCart(id) if id == p));
}

#[tokio::test]
async fn test_remove_absent_item_is_noop() {
    let catalog = MemoryCatalog::new();
    let p = catalog.insert("Mug", price("10.00")).await;
    let q = catalog.insert("Bowl", price("4.00")).await;
    let engine = CartEngine::new(&catalog);
    let cart = engine
        .add_item(CartSource::Ephemeral, &Cart::default(), p, 1)
        .await
        .unwrap()
        .cart;

    let update = engine
        .remove_item(CartSource::Ephemeral, &cart, q)
        .await
        .unwrap();
    assert_eq!(update.cart, cart);
    assert_eq!(update.write, CartWrite::Keep);
}

#[tokio::test]
async fn test_clear_is_idempotent() {
    let catalog = MemoryCatalog::new();
    let engine = CartEngine::new(&catalog);
    let user = UserId::new(3);

    let first = engine.clear(CartSource::Persisted(user));
    let second = engine.clear(CartSource::Persisted(user));
    assert_eq!(first, second);
    assert!(first.cart.is_empty());
    assert_eq!(first.cart.total(), Decimal::ZERO);
    assert_eq!(
        engine.clear(CartSource::Ephemeral).write,
        CartWrite::ClearCookie
    );
}

#[tokio::test]
async fn test_catalog_failure_is_storage_error_and_writes_nothing() {
    let catalog = MemoryCatalog::new();
    let p = catalog.insert("Mug", price("10.00")).await;
    let engine = CartEngine::new(&catalog);

    catalog.fail_next_reads(1);
    let err = engine
        .add_item(CartSource::Ephemeral, &Cart::default(), p, 1)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Storage);
}

#[tokio::test]
async fn test_vanished_product_blocks_recompute_but_can_be_removed() {
    let catalog = MemoryCatalog::new();
    let gone = catalog.insert("Discontinued", price("2.00")).await;
    let kept = catalog.insert("Staple", price("1.00")).await;
    let engine = CartEngine::new(&catalog);
    let source = CartSource::Ephemeral;

    let mut cart = engine.add_item(source, &Cart::default(), gone, 1).await.unwrap().cart;
    cart = engine.add_item(source, &cart, kept, 1).await.unwrap().cart;
    catalog.remove(gone).await;

    let err = engine.update_quantity(source, &cart, kept, 2).await.unwrap_err();
    assert!(matches!(err, CommerceError::ProductNotFound(id) if id == gone));

    let lines = engine.lines(&cart).await.unwrap();
    assert_eq!(lines.missing, vec![gone]);
    assert_eq!(lines.lines.len(), 1);

    let update = engine.remove_item(source, &cart, gone).await.unwrap();
    assert_eq!(update.cart.total(), dec("1.00"));
}

#[tokio::test]
async fn test_reprice_refreshes_stale_total() {
    let catalog = MemoryCatalog::new();
    let p = catalog.insert("Mug", price("10.00")).await;
    let engine = CartEngine::new(&catalog);
    let user = UserId::new(5);
    let source = CartSource::Persisted(user);

    let cart = engine.add_item(source, &Cart::default(), p, 2).await.unwrap().cart;
    let unchanged = engine.reprice(source, &cart).await.unwrap();
    assert_eq!(unchanged.write, CartWrite::Keep);

    catalog.set_price(p, price("12.50")).await;
    let repriced = engine.reprice(source, &cart).await.unwrap();
    assert_eq!(repriced.cart.total(), dec("25.00"));
    assert_eq!(repriced.write, CartWrite::SaveUserCart(user));
}
