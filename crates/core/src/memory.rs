//! In-memory repositories.
//!
//! Used by tests across the workspace and handy for local experiments.
//! Writes can be made to fail on demand to exercise error paths.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::cart::{Cart, CartRepository};
use crate::catalog::{Product, ProductCatalog};
use crate::error::{CommerceError, Result};
use crate::order::{NewOrder, Order, OrderRepository};
use crate::types::{OrderId, OrderStatus, Price, ProductId, UserId};

/// Consume one pending injected failure, if any.
fn take_failure(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

/// Product catalog backed by a map.
#[derive(Default)]
pub struct MemoryCatalog {
    products: RwLock<HashMap<ProductId, Product>>,
    next_id: AtomicI32,
    failing_reads: AtomicUsize,
}

impl MemoryCatalog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a product with the given name and price, returning its id.
    pub async fn insert(&self, name: &str, price: Price) -> ProductId {
        let id = ProductId::new(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        let product = Product {
            id,
            name: name.to_owned(),
            description: String::new(),
            price,
            stock: 10,
            category: "general".to_owned(),
            image: String::new(),
            created_at: Utc::now(),
        };
        self.products.write().await.insert(id, product);
        id
    }

    /// Change a product's price.
    pub async fn set_price(&self, id: ProductId, price: Price) {
        if let Some(product) = self.products.write().await.get_mut(&id) {
            product.price = price;
        }
    }

    /// Delete a product from the catalog.
    pub async fn remove(&self, id: ProductId) {
        self.products.write().await.remove(&id);
    }

    /// Make the next `n` lookups fail with a storage error.
    pub fn fail_next_reads(&self, n: usize) {
        self.failing_reads.store(n, Ordering::SeqCst);
    }

    fn check_read(&self) -> Result<()> {
        if take_failure(&self.failing_reads) {
            return Err(CommerceError::storage("injected catalog failure"));
        }
        Ok(())
    }
}

#[async_trait]
impl ProductCatalog for MemoryCatalog {
    async fn get(&self, id: ProductId) -> Result<Option<Product>> {
        self.check_read()?;
        Ok(self.products.read().await.get(&id).cloned())
    }

    async fn find_many(&self, ids: &[ProductId]) -> Result<Vec<Product>> {
        self.check_read()?;
        let products = self.products.read().await;
        let mut found: Vec<Product> = ids.iter().filter_map(|id| products.get(id).cloned()).collect();
        found.dedup_by_key(|p| p.id);
        Ok(found)
    }
}

/// Per-user carts backed by a map.
#[derive(Default)]
pub struct MemoryCartRepository {
    carts: RwLock<HashMap<UserId, Cart>>,
    failing_saves: AtomicUsize,
    saves: AtomicUsize,
}

impl MemoryCartRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` saves fail with a storage error.
    pub fn fail_next_saves(&self, n: usize) {
        self.failing_saves.store(n, Ordering::SeqCst);
    }

    /// Number of successful saves so far.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CartRepository for MemoryCartRepository {
    async fn load(&self, user_id: UserId) -> Result<Cart> {
        Ok(self
            .carts
            .read()
            .await
            .get(&user_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn save(&self, user_id: UserId, cart: &Cart) -> Result<()> {
        if take_failure(&self.failing_saves) {
            return Err(CommerceError::storage("injected cart save failure"));
        }
        self.carts.write().await.insert(user_id, cart.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Orders backed by a vector.
#[derive(Default)]
pub struct MemoryOrderRepository {
    orders: RwLock<Vec<Order>>,
    failing_creates: AtomicUsize,
}

impl MemoryOrderRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` creates fail with a storage error.
    pub fn fail_next_creates(&self, n: usize) {
        self.failing_creates.store(n, Ordering::SeqCst);
    }

    /// Number of stored orders.
    pub async fn len(&self) -> usize {
        self.orders.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.orders.read().await.is_empty()
    }
}

#[async_trait]
impl OrderRepository for MemoryOrderRepository {
    async fn create(&self, order: NewOrder) -> Result<Order> {
        if take_failure(&self.failing_creates) {
            return Err(CommerceError::storage("injected order create failure"));
        }
        let mut orders = self.orders.write().await;
        let id = i32::try_from(orders.len() + 1).map_err(CommerceError::storage)?;
        let order = Order {
            id: OrderId::new(id),
            owner_id: order.owner_id,
            items: order.items,
            total: order.total,
            shipping_address: order.shipping_address,
            payment_method: order.payment_method,
            status: OrderStatus::Pending,
            created_at: Utc::now(),
        };
        orders.push(order.clone());
        Ok(order)
    }

    async fn get(&self, id: OrderId) -> Result<Option<Order>> {
        Ok(self
            .orders
            .read()
            .await
            .iter()
            .find(|o| o.id == id)
            .cloned())
    }

    async fn list_for_owner(&self, owner_id: UserId) -> Result<Vec<Order>> {
        Ok(self
            .orders
            .read()
            .await
            .iter()
            .rev()
            .filter(|o| o.owner_id == owner_id)
            .cloned()
            .collect())
    }
}
