//! Client for the Fake Store API.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};

use shopez_core::ProductId;

use crate::cache::{CacheKey, CacheValue};
use crate::conversions::{ProductData, convert_product, convert_products};
use crate::error::CatalogError;
use crate::types::Product;

// =============================================================================
// CatalogClient
// =============================================================================

/// Client for the product catalog API.
///
/// Provides typed access to products and categories. All lookups are cached
/// for 5 minutes; the catalog changes rarely and the app re-browses often.
#[derive(Clone)]
pub struct CatalogClient {
    inner: Arc<CatalogClientInner>,
}

struct CatalogClientInner {
    client: reqwest::Client,
    base_url: String,
    cache: Cache<CacheKey, CacheValue>,
}

impl CatalogClient {
    /// Create a new catalog client against a base URL such as
    /// `https://fakestoreapi.com`.
    #[must_use]
    pub fn new(base_url: &str) -> Self {
        let cache = Cache::builder()
            .max_capacity(1000)
            .time_to_live(Duration::from_secs(300)) // 5 minutes
            .build();

        Self {
            inner: Arc::new(CatalogClientInner {
                client: reqwest::Client::new(),
                base_url: base_url.trim_end_matches('/').to_owned(),
                cache,
            }),
        }
    }

    /// Fetch a JSON endpoint.
    ///
    /// The API reports a missing resource as an empty or `null` body with
    /// status 200, which comes back as `None` here.
    async fn fetch<T: DeserializeOwned>(&self, url: String) -> Result<Option<T>, CatalogError> {
        let response = self.inner.client.get(&url).send().await?;
        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(1);
            return Err(CatalogError::RateLimited(retry_after));
        }

        let text = response.text().await?;

        if !status.is_success() {
            tracing::error!(
                status = %status,
                body = %text.chars().take(500).collect::<String>(),
                "Catalog API returned non-success status"
            );
            return Err(CatalogError::Status {
                status: status.as_u16(),
            });
        }

        match parse_body(&text) {
            Ok(value) => Ok(value),
            Err(err) => {
                tracing::error!(
                    error = %err,
                    body = %text.chars().take(500).collect::<String>(),
                    "Failed to parse catalog response"
                );
                Err(CatalogError::Parse(err))
            }
        }
    }

    // =========================================================================
    // Product Methods
    // =========================================================================

    /// Get every product in the catalog.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self))]
    pub async fn get_products(&self) -> Result<Vec<Product>, CatalogError> {
        if let Some(CacheValue::Products(products)) =
            self.inner.cache.get(&CacheKey::Products).await
        {
            debug!("Cache hit for products");
            return Ok(products);
        }

        let data: Vec<ProductData> = self
            .fetch(format!("{}/products", self.inner.base_url))
            .await?
            .unwrap_or_default();
        let products = convert_products(data);

        self.inner
            .cache
            .insert(CacheKey::Products, CacheValue::Products(products.clone()))
            .await;

        Ok(products)
    }

    /// Get the products in one category.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self), fields(category = %category))]
    pub async fn get_products_in_category(
        &self,
        category: &str,
    ) -> Result<Vec<Product>, CatalogError> {
        let cache_key = CacheKey::Category(category.to_owned());
        if let Some(CacheValue::Products(products)) = self.inner.cache.get(&cache_key).await {
            debug!("Cache hit for category products");
            return Ok(products);
        }

        let data: Vec<ProductData> = self
            .fetch(format!(
                "{}/products/category/{}",
                self.inner.base_url,
                urlencoding::encode(category)
            ))
            .await?
            .unwrap_or_default();
        let products = convert_products(data);

        self.inner
            .cache
            .insert(cache_key, CacheValue::Products(products.clone()))
            .await;

        Ok(products)
    }

    /// Get the list of category slugs.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self))]
    pub async fn get_categories(&self) -> Result<Vec<String>, CatalogError> {
        if let Some(CacheValue::Categories(categories)) =
            self.inner.cache.get(&CacheKey::Categories).await
        {
            debug!("Cache hit for categories");
            return Ok(categories);
        }

        let categories: Vec<String> = self
            .fetch(format!("{}/products/categories", self.inner.base_url))
            .await?
            .unwrap_or_default();

        self.inner
            .cache
            .insert(
                CacheKey::Categories,
                CacheValue::Categories(categories.clone()),
            )
            .await;

        Ok(categories)
    }

    /// Get a single product by id.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::NotFound`] if the id does not exist, or an
    /// error if the API request fails.
    #[instrument(skip(self), fields(product_id = %id))]
    pub async fn get_product(&self, id: ProductId) -> Result<Product, CatalogError> {
        let cache_key = CacheKey::Product(id);
        if let Some(CacheValue::Product(product)) = self.inner.cache.get(&cache_key).await {
            debug!("Cache hit for product");
            return Ok(*product);
        }

        let data: Option<ProductData> = self
            .fetch(format!("{}/products/{id}", self.inner.base_url))
            .await?;
        let product = data
            .and_then(convert_product)
            .ok_or_else(|| CatalogError::NotFound(format!("Product not found: {id}")))?;

        self.inner
            .cache
            .insert(cache_key, CacheValue::Product(Box::new(product.clone())))
            .await;

        Ok(product)
    }
}

/// Decode a response body, treating empty and `null` bodies as absent.
fn parse_body<T: DeserializeOwned>(text: &str) -> Result<Option<T>, serde_json::Error> {
    let trimmed = text.trim();
    if trimmed.is_empty() || trimmed == "null" {
        return Ok(None);
    }
    serde_json::from_str(trimmed).map(Some)
}
