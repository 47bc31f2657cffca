//! Product route handlers.
//!
//! Browsing is public. Creating products is limited to admins and takes a
//! multipart form so an image can be uploaded with the product.

use std::path::Path as FsPath;

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use tracing::instrument;
use uuid::Uuid;

use corner_shop_core::{Price, Product, ProductId};

use super::PageContext;
use crate::db::ProductRepository;
use crate::db::products::NewProduct;
use crate::error::{AppError, Result};
use crate::filters;
use crate::middleware::RequireAdmin;
use crate::state::AppState;

/// Largest accepted create-product request body.
pub const MAX_UPLOAD_BYTES: usize = 5 * 1024 * 1024;

/// Public URL prefix of uploaded product images.
const IMAGE_URL_PREFIX: &str = "/static/images/products";

/// Image file extensions accepted for upload.
const IMAGE_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "gif", "webp"];

// =============================================================================
// Templates
// =============================================================================

/// Product listing page template.
#[derive(Template, WebTemplate)]
#[template(path = "products/index.html")]
pub struct ProductsIndexTemplate {
    pub page: PageContext,
    pub products: Vec<Product>,
}

/// Product detail page template.
#[derive(Template, WebTemplate)]
#[template(path = "products/show.html")]
pub struct ProductShowTemplate {
    pub page: PageContext,
    pub product: Product,
}

/// Create product form template.
#[derive(Template, WebTemplate)]
#[template(path = "products/new.html")]
pub struct ProductFormTemplate {
    pub page: PageContext,
    pub form: ProductForm,
    pub error: Option<String>,
}

// =============================================================================
// Form
// =============================================================================

/// Raw create-product form fields, kept as typed so the form can be re-shown.
#[derive(Debug, Clone, Default)]
pub struct ProductForm {
    pub name: String,
    pub description: String,
    pub price: String,
    pub category: String,
    pub stock: String,
}

/// An uploaded image, before it is written to disk.
#[derive(Debug)]
struct ImageUpload {
    extension: String,
    bytes: axum::body::Bytes,
}

impl ProductForm {
    /// Check the fields and build the product, with `image` as its image URL.
    ///
    /// # Errors
    ///
    /// Returns a message naming the first invalid field.
    pub fn validate(&self, image: String) -> std::result::Result<NewProduct, String> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err("Name is required".to_owned());
        }
        let category = self.category.trim();
        if category.is_empty() {
            return Err("Category is required".to_owned());
        }
        let price = Price::parse(&self.price)
            .map_err(|_| "Price must be a number of at least 0".to_owned())?;
        let stock = match self.stock.trim() {
            "" => 0,
            raw => raw
                .parse::<i32>()
                .ok()
                .filter(|n| *n >= 0)
                .ok_or_else(|| "Stock must be a whole number of at least 0".to_owned())?,
        };

        Ok(NewProduct {
            name: name.to_owned(),
            description: self.description.trim().to_owned(),
            price,
            stock,
            category: category.to_owned(),
            image,
        })
    }
}

/// Lowercased extension of an uploaded file name, if it is an accepted image type.
fn image_extension(file_name: &str) -> Option<String> {
    let extension = FsPath::new(file_name)
        .extension()?
        .to_str()?
        .to_ascii_lowercase();
    IMAGE_EXTENSIONS
        .contains(&extension.as_str())
        .then_some(extension)
}

/// Read the multipart body into form fields and an optional image.
async fn read_form(
    multipart: &mut Multipart,
) -> Result<(ProductForm, std::result::Result<Option<ImageUpload>, String>)> {
    let mut form = ProductForm::default();
    let mut image = Ok(None);

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(e.body_text()))?
    {
        let Some(name) = field.name().map(str::to_owned) else {
            continue;
        };

        if name == "image" {
            let file_name = field.file_name().unwrap_or_default().to_owned();
            let bytes = field
                .bytes()
                .await
                .map_err(|e| AppError::BadRequest(e.body_text()))?;
            if file_name.is_empty() || bytes.is_empty() {
                continue;
            }
            image = match image_extension(&file_name) {
                Some(extension) => Ok(Some(ImageUpload { extension, bytes })),
                None => Err(format!(
                    "Image must be one of: {}",
                    IMAGE_EXTENSIONS.join(", ")
                )),
            };
            continue;
        }

        let value = field
            .text()
            .await
            .map_err(|e| AppError::BadRequest(e.body_text()))?;
        match name.as_str() {
            "name" => form.name = value,
            "description" => form.description = value,
            "price" => form.price = value,
            "category" => form.category = value,
            "stock" => form.stock = value,
            _ => {}
        }
    }

    Ok((form, image))
}

/// Write an uploaded image under the upload directory; returns its public URL.
async fn save_image(upload_dir: &FsPath, image: ImageUpload) -> Result<String> {
    let file_name = format!("{}.{}", Uuid::new_v4(), image.extension);
    tokio::fs::create_dir_all(upload_dir)
        .await
        .map_err(|e| AppError::Internal(format!("create upload dir: {e}")))?;
    tokio::fs::write(upload_dir.join(&file_name), &image.bytes)
        .await
        .map_err(|e| AppError::Internal(format!("write product image: {e}")))?;

    tracing::info!(%file_name, size = image.bytes.len(), "stored product image");
    Ok(format!("{IMAGE_URL_PREFIX}/{file_name}"))
}

// =============================================================================
// Handlers
// =============================================================================

/// Display product listing page.
#[instrument(skip(state, page))]
pub async fn index(State(state): State<AppState>, page: PageContext) -> Result<ProductsIndexTemplate> {
    let products = ProductRepository::new(state.pool()).list().await?;
    Ok(ProductsIndexTemplate { page, products })
}

/// Display product detail page.
#[instrument(skip(state, page))]
pub async fn show(
    State(state): State<AppState>,
    page: PageContext,
    Path(id): Path<ProductId>,
) -> Result<ProductShowTemplate> {
    let product = ProductRepository::new(state.pool())
        .get_by_id(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Product not found".to_owned()))?;

    Ok(ProductShowTemplate { page, product })
}

/// Display the create product form.
pub async fn new_form(RequireAdmin(_admin): RequireAdmin, page: PageContext) -> ProductFormTemplate {
    ProductFormTemplate {
        page,
        form: ProductForm::default(),
        error: None,
    }
}

/// Handle the create product form.
#[instrument(skip_all, fields(admin_id = %admin.id))]
pub async fn create(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    page: PageContext,
    mut multipart: Multipart,
) -> Result<Response> {
    let (form, image) = read_form(&mut multipart).await?;

    let rejected = |form: ProductForm, error: String| {
        tracing::debug!(%error, "product form rejected");
        (
            StatusCode::BAD_REQUEST,
            ProductFormTemplate {
                page: page.clone(),
                form,
                error: Some(error),
            },
        )
            .into_response()
    };

    let image = match image {
        Ok(image) => image,
        Err(error) => return Ok(rejected(form, error)),
    };
    // Validate before touching the disk so a bad form leaves no orphan file.
    if let Err(error) = form.validate(String::new()) {
        return Ok(rejected(form, error));
    }

    let image_url = match image {
        Some(image) => save_image(&state.config().upload_dir, image).await?,
        None => String::new(),
    };
    let product = form.validate(image_url).map_err(AppError::BadRequest)?;
    ProductRepository::new(state.pool()).create(&product).await?;

    Ok(Redirect::to("/products").into_response())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    use rust_decimal::Decimal;

    fn form() -> ProductForm {
        ProductForm {
            name: "  Lamp ".to_owned(),
            description: "Warm light".to_owned(),
            price: "19.99".to_owned(),
            category: "Home".to_owned(),
            stock: "3".to_owned(),
        }
    }

    #[test]
    fn test_valid_form() {
        let product = form().validate("/static/images/products/a.png".to_owned()).unwrap();
        assert_eq!(product.name, "Lamp");
        assert_eq!(product.price.amount(), Decimal::new(1999, 2));
        assert_eq!(product.stock, 3);
        assert_eq!(product.image, "/static/images/products/a.png");
    }

    #[test]
    fn test_blank_stock_defaults_to_zero() {
        let product = ProductForm {
            stock: " ".to_owned(),
            ..form()
        }
        .validate(String::new())
        .unwrap();
        assert_eq!(product.stock, 0);
    }

    #[test]
    fn test_invalid_fields() {
        let cases = [
            (ProductForm { name: " ".to_owned(), ..form() }, "Name is required"),
            (ProductForm { category: String::new(), ..form() }, "Category is required"),
            (ProductForm { price: "-1".to_owned(), ..form() }, "Price must be a number of at least 0"),
            (ProductForm { price: "cheap".to_owned(), ..form() }, "Price must be a number of at least 0"),
            (ProductForm { stock: "-2".to_owned(), ..form() }, "Stock must be a whole number of at least 0"),
        ];
        for (form, message) in cases {
            assert_eq!(form.validate(String::new()).unwrap_err(), message);
        }
    }

    #[test]
    fn test_image_extension() {
        assert_eq!(image_extension("Photo.JPG").unwrap(), "jpg");
        assert_eq!(image_extension("a.b.webp").unwrap(), "webp");
        assert!(image_extension("script.svg").is_none());
        assert!(image_extension("noext").is_none());
    }
}
