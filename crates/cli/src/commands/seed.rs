//! Seed the catalog from a YAML file.
//!
//! # File format
//!
//! ```yaml
//! products:
//!   - name: Desk Lamp
//!     description: Warm light for late evenings
//!     price: "24.50"
//!     category: Home
//!     stock: 12
//!     image: /static/images/products/lamp.jpg   # optional
//! ```
//!
//! Prices may be written quoted or as plain numbers. The whole file is
//! validated before anything is inserted.

use std::path::Path;

use serde::Deserialize;
use tracing::{error, info};

use corner_shop_core::Price;
use corner_shop_storefront::db::ProductRepository;
use corner_shop_storefront::db::products::NewProduct;

use super::{CommandError, connect};

/// Top-level seed file.
#[derive(Debug, Deserialize)]
pub struct SeedFile {
    pub products: Vec<SeedProduct>,
}

/// A price as written in YAML.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum SeedPrice {
    Text(String),
    Number(f64),
}

/// One product entry.
#[derive(Debug, Deserialize)]
pub struct SeedProduct {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub price: SeedPrice,
    pub category: String,
    #[serde(default)]
    pub stock: i32,
    #[serde(default)]
    pub image: String,
}

impl SeedProduct {
    fn validate(&self) -> Result<NewProduct, String> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err("name is empty".to_owned());
        }
        let raw_price = match &self.price {
            SeedPrice::Text(text) => text.clone(),
            SeedPrice::Number(number) => number.to_string(),
        };
        let price = Price::parse(&raw_price).map_err(|e| format!("{name}: price {e}"))?;
        if self.stock < 0 {
            return Err(format!("{name}: stock is negative"));
        }

        Ok(NewProduct {
            name: name.to_owned(),
            description: self.description.trim().to_owned(),
            price,
            stock: self.stock,
            category: self.category.trim().to_owned(),
            image: self.image.trim().to_owned(),
        })
    }
}

/// Validate every entry, collecting all problems.
fn validate_file(file: &SeedFile) -> Result<Vec<NewProduct>, Vec<String>> {
    let mut products = Vec::with_capacity(file.products.len());
    let mut errors = Vec::new();
    for (index, entry) in file.products.iter().enumerate() {
        match entry.validate() {
            Ok(product) => products.push(product),
            Err(e) => errors.push(format!("product #{}: {e}", index + 1)),
        }
    }
    if errors.is_empty() {
        Ok(products)
    } else {
        Err(errors)
    }
}

/// Insert the products listed in `file_path`.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed, any entry is
/// invalid, or an insert fails.
pub async fn products(file_path: &str, dry_run: bool) -> Result<(), CommandError> {
    let path = Path::new(file_path);
    info!(path = %file_path, "Loading products from file");

    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| CommandError::Io {
            path: file_path.to_owned(),
            source,
        })?;
    let file: SeedFile = serde_yaml::from_str(&content)?;

    let products = validate_file(&file).map_err(|errors| {
        error!("Seed file validation failed:");
        for err in &errors {
            error!("  - {err}");
        }
        CommandError::Invalid(format!("{} validation errors found", errors.len()))
    })?;
    info!(products = products.len(), "Seed file validated");

    if dry_run {
        info!("Dry run, nothing inserted");
        return Ok(());
    }

    let pool = connect().await?;
    let repo = ProductRepository::new(&pool);
    for product in &products {
        repo.create(product).await?;
    }

    info!("Seeding complete! {} products inserted", products.len());
    Ok(())
}
