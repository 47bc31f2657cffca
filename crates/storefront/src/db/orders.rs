//! Order repository.
//!
//! An order and its items are written in a single transaction, so a failed
//! checkout never leaves a partial order behind.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;

use corner_shop_core::{
    NewOrder, Order, OrderId, OrderItem, OrderStatus, PaymentMethod, Price, ProductId, Quantity,
    ShippingAddress, UserId,
};

use super::RepositoryError;

const ORDER_COLUMNS: &str = "id, owner_id, total, street, city, state, zip_code, country, \
                             payment_method, status, created_at";

/// Database row for `orders`.
#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    id: OrderId,
    owner_id: UserId,
    total: Decimal,
    street: String,
    city: String,
    state: String,
    zip_code: String,
    country: String,
    payment_method: String,
    status: String,
    created_at: DateTime<Utc>,
}

/// Database row for `order_items`.
#[derive(Debug, sqlx::FromRow)]
struct OrderItemRow {
    order_id: OrderId,
    product_id: ProductId,
    name: String,
    quantity: i32,
    price: Price,
}

impl TryFrom<OrderItemRow> for OrderItem {
    type Error = RepositoryError;

    fn try_from(row: OrderItemRow) -> Result<Self, Self::Error> {
        let quantity = Quantity::try_from(i64::from(row.quantity)).map_err(|e| {
            RepositoryError::DataCorruption(format!("order {} quantity: {e}", row.order_id))
        })?;
        Ok(Self {
            product_id: row.product_id,
            name: row.name,
            quantity,
            price: row.price,
        })
    }
}

impl OrderRow {
    fn into_order(self, items: Vec<OrderItem>) -> Result<Order, RepositoryError> {
        let payment_method = self
            .payment_method
            .parse::<PaymentMethod>()
            .map_err(RepositoryError::DataCorruption)?;
        let status = self
            .status
            .parse::<OrderStatus>()
            .map_err(RepositoryError::DataCorruption)?;

        Ok(Order {
            id: self.id,
            owner_id: self.owner_id,
            items,
            total: self.total,
            shipping_address: ShippingAddress {
                street: self.street,
                city: self.city,
                state: self.state,
                zip_code: self.zip_code,
                country: self.country,
            },
            payment_method,
            status,
            created_at: self.created_at,
        })
    }
}

/// Repository for order database operations.
pub struct OrderRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> OrderRepository<'a> {
    /// Create a new order repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Insert an order and its items atomically.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if any insert fails; the
    /// transaction is rolled back.
    pub async fn insert(&self, order: NewOrder) -> Result<Order, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, OrderRow>(&format!(
            r"
            INSERT INTO orders
                (owner_id, total, street, city, state, zip_code, country, payment_method, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {ORDER_COLUMNS}
            "
        ))
        .bind(order.owner_id)
        .bind(order.total)
        .bind(&order.shipping_address.street)
        .bind(&order.shipping_address.city)
        .bind(&order.shipping_address.state)
        .bind(&order.shipping_address.zip_code)
        .bind(&order.shipping_address.country)
        .bind(order.payment_method.as_str())
        .bind(OrderStatus::Pending.as_str())
        .fetch_one(&mut *tx)
        .await?;

        for (position, item) in order.items.iter().enumerate() {
            let position = i32::try_from(position)
                .map_err(|_| RepositoryError::Conflict("too many order lines".to_owned()))?;
            let quantity = i32::try_from(item.quantity.get())
                .map_err(|_| RepositoryError::Conflict("quantity out of range".to_owned()))?;

            sqlx::query(
                r"
                INSERT INTO order_items (order_id, position, product_id, name, quantity, price)
                VALUES ($1, $2, $3, $4, $5, $6)
                ",
            )
            .bind(row.id)
            .bind(position)
            .bind(item.product_id)
            .bind(&item.name)
            .bind(quantity)
            .bind(item.price)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        row.into_order(order.items)
    }

    /// Get an order with its items.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    /// Returns `RepositoryError::DataCorruption` if a stored value is invalid.
    pub async fn get_by_id(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        let Some(row) = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?
        else {
            return Ok(None);
        };

        let mut items = self.items_for(&[row.id]).await?;
        let items = items.remove(&row.id).unwrap_or_default();
        row.into_order(items).map(Some)
    }

    /// All orders placed by one user, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    /// Returns `RepositoryError::DataCorruption` if a stored value is invalid.
    pub async fn list_by_owner(&self, owner_id: UserId) -> Result<Vec<Order>, RepositoryError> {
        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE owner_id = $1 \
             ORDER BY created_at DESC, id DESC"
        ))
        .bind(owner_id)
        .fetch_all(self.pool)
        .await?;

        let ids: Vec<OrderId> = rows.iter().map(|r| r.id).collect();
        let mut items = self.items_for(&ids).await?;

        rows.into_iter()
            .map(|row| {
                let lines = items.remove(&row.id).unwrap_or_default();
                row.into_order(lines)
            })
            .collect()
    }

    /// Load the items of several orders in one query, grouped by order.
    async fn items_for(
        &self,
        order_ids: &[OrderId],
    ) -> Result<HashMap<OrderId, Vec<OrderItem>>, RepositoryError> {
        if order_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let ids: Vec<i32> = order_ids.iter().map(OrderId::as_i32).collect();

        let rows = sqlx::query_as::<_, OrderItemRow>(
            r"
            SELECT order_id, product_id, name, quantity, price
            FROM order_items
            WHERE order_id = ANY($1)
            ORDER BY order_id, position
            ",
        )
        .bind(ids)
        .fetch_all(self.pool)
        .await?;

        let mut grouped: HashMap<OrderId, Vec<OrderItem>> = HashMap::new();
        for row in rows {
            let order_id = row.order_id;
            grouped.entry(order_id).or_default().push(row.try_into()?);
        }
        Ok(grouped)
    }
}

#[async_trait]
impl corner_shop_core::OrderRepository for OrderRepository<'_> {
    async fn create(&self, order: NewOrder) -> corner_shop_core::error::Result<Order> {
        Ok(self.insert(order).await?)
    }

    async fn get(&self, id: OrderId) -> corner_shop_core::error::Result<Option<Order>> {
        Ok(self.get_by_id(id).await?)
    }

    async fn list_for_owner(&self, owner_id: UserId) -> corner_shop_core::error::Result<Vec<Order>> {
        Ok(self.list_by_owner(owner_id).await?)
    }
}
