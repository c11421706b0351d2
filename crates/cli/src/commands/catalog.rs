//! Catalog browsing commands.
//!
//! # Usage
//!
//! ```bash
//! shopez products
//! shopez products --category "men's clothing"
//! shopez categories
//! shopez product 1
//! ```
//!
//! # Environment Variables
//!
//! - `SHOPEZ_CATALOG_URL` - Catalog API base URL (optional)

use thiserror::Error;

use shopez_catalog::{CatalogClient, CatalogError};
use shopez_core::ProductId;

use crate::config::{ConfigError, ShopEzConfig};
use crate::render;

/// Errors that can occur while browsing the catalog.
#[derive(Debug, Error)]
pub enum CatalogCommandError {
    /// Configuration could not be loaded.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The catalog API request failed.
    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    /// Writing to the terminal failed.
    #[error("Output error: {0}")]
    Io(#[from] std::io::Error),
}

/// List products, optionally restricted to one category.
pub async fn products(category: Option<&str>) -> Result<(), CatalogCommandError> {
    let config = ShopEzConfig::from_env()?;
    let client = CatalogClient::new(&config.catalog_url);

    let products = match category {
        Some(category) => client.get_products_in_category(category).await?,
        None => client.get_products().await?,
    };

    render::emit(&render::product_list(&products))?;
    Ok(())
}

/// List the catalog's categories.
pub async fn categories() -> Result<(), CatalogCommandError> {
    let config = ShopEzConfig::from_env()?;
    let client = CatalogClient::new(&config.catalog_url);

    let categories = client.get_categories().await?;
    render::emit(&render::category_list(&categories))?;
    Ok(())
}

/// Show one product in detail.
pub async fn product(id: u32) -> Result<(), CatalogCommandError> {
    let config = ShopEzConfig::from_env()?;
    let client = CatalogClient::new(&config.catalog_url);

    let product = client.get_product(ProductId::new(id)).await?;
    render::emit(&render::product_detail(&product))?;
    Ok(())
}
