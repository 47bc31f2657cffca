//! Home page route handler.

use askama::Template;
use askama_web::WebTemplate;
use axum::extract::State;
use tracing::instrument;

use corner_shop_core::Product;

use super::PageContext;
use crate::db::ProductRepository;
use crate::error::Result;
use crate::filters;
use crate::state::AppState;

/// Number of products featured on the home page.
const FEATURED_COUNT: i64 = 4;

/// Home page template.
#[derive(Template, WebTemplate)]
#[template(path = "home.html")]
pub struct HomeTemplate {
    pub page: PageContext,
    pub featured: Vec<Product>,
}

/// Display the home page with the newest products.
#[instrument(skip(state, page))]
pub async fn home(State(state): State<AppState>, page: PageContext) -> Result<HomeTemplate> {
    let featured = ProductRepository::new(state.pool())
        .newest(FEATURED_COUNT)
        .await?;

    Ok(HomeTemplate { page, featured })
}
