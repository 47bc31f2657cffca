//! Product catalog types and the read-side lookup trait.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::{Price, ProductId};

/// A product offered in the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub description: String,
    pub price: Price,
    pub stock: i32,
    pub category: String,
    /// Public path of the product image, empty when none was uploaded.
    pub image: String,
    pub created_at: DateTime<Utc>,
}

impl Product {
    /// Whether any units are left.
    #[must_use]
    pub const fn in_stock(&self) -> bool {
        self.stock > 0
    }
}

/// Authoritative price source for the cart engine and order builder.
#[async_trait]
pub trait ProductCatalog: Send + Sync {
    /// Look up one product.
    ///
    /// # Errors
    ///
    /// Returns `CommerceError::Storage` if the backing store fails.
    async fn get(&self, id: ProductId) -> Result<Option<Product>>;

    /// Look up many products at once. Unknown ids are simply absent from the
    /// result; duplicates in `ids` are allowed.
    ///
    /// # Errors
    ///
    /// Returns `CommerceError::Storage` if the backing store fails.
    async fn find_many(&self, ids: &[ProductId]) -> Result<Vec<Product>>;
}

/// Index a batch lookup result by product id.
#[must_use]
pub fn index_by_id(products: Vec<Product>) -> HashMap<ProductId, Product> {
    products.into_iter().map(|p| (p.id, p)).collect()
}
