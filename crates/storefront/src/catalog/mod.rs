//! Product catalog API client.
//!
//! # Architecture
//!
//! - Read-only, anonymous JSON API (`GET /products`, `GET /products/categories`)
//! - One request per call: no retry, no pagination, no caching
//! - Failures surface as [`CatalogError`]; the caller decides the fallback
//!
//! # Example
//!
//! ```rust,ignore
//! use shopez_storefront::catalog::{CatalogClient, ProductBrowser};
//!
//! let catalog = CatalogClient::new(&config.catalog_url);
//! let mut browser = ProductBrowser::new();
//! browser.load(&catalog).await?;
//! browser.set_query("shirt");
//! for product in browser.visible() { /* ... */ }
//! ```

mod browser;
mod filter;
pub mod types;

pub use browser::{ALL_CATEGORIES, ProductBrowser};
pub use filter::filter_products;
pub use types::{Product, Rating};

use std::sync::Arc;

use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, instrument};
use url::Url;

/// Errors that can occur when talking to the catalog API.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Catalog answered with a non-success status.
    #[error("Catalog returned HTTP {status}: {body}")]
    Status {
        /// Response status code.
        status: u16,
        /// Start of the response body.
        body: String,
    },

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Client for the product catalog API.
#[derive(Clone)]
pub struct CatalogClient {
    inner: Arc<CatalogClientInner>,
}

struct CatalogClientInner {
    client: reqwest::Client,
    base_url: String,
}

impl CatalogClient {
    /// Create a new catalog client for a base URL such as
    /// `https://fakestoreapi.com`.
    #[must_use]
    pub fn new(base_url: &Url) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    /// Create a catalog client that shares an existing HTTP client.
    #[must_use]
    pub fn with_client(client: reqwest::Client, base_url: &Url) -> Self {
        Self {
            inner: Arc::new(CatalogClientInner {
                client,
                base_url: base_url.as_str().trim_end_matches('/').to_string(),
            }),
        }
    }

    /// Fetch every product.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails, the status is not a success,
    /// or the body is not a product list.
    #[instrument(skip(self))]
    pub async fn fetch_products(&self) -> Result<Vec<Product>, CatalogError> {
        let products: Vec<Product> = self.get("/products").await?;
        debug!(count = products.len(), "Fetched products");
        Ok(products)
    }

    /// Fetch the category labels.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails, the status is not a success,
    /// or the body is not a list of strings.
    #[instrument(skip(self))]
    pub async fn fetch_categories(&self) -> Result<Vec<String>, CatalogError> {
        let categories: Vec<String> = self.get("/products/categories").await?;
        debug!(count = categories.len(), "Fetched categories");
        Ok(categories)
    }

    /// Issue a GET and decode the JSON body.
    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, CatalogError> {
        let url = format!("{}{path}", self.inner.base_url);

        let response = self
            .inner
            .client
            .get(&url)
            .header("Accept", "application/json")
            .send()
            .await?;

        let status = response.status();

        // Get response body as text first for better error diagnostics
        let response_text = response.text().await?;

        if !status.is_success() {
            tracing::error!(
                status = %status,
                url = %url,
                body = %response_text.chars().take(500).collect::<String>(),
                "Catalog API returned non-success status"
            );
            return Err(CatalogError::Status {
                status: status.as_u16(),
                body: response_text.chars().take(200).collect(),
            });
        }

        serde_json::from_str(&response_text).map_err(|e| {
            tracing::error!(
                error = %e,
                url = %url,
                body = %response_text.chars().take(500).collect::<String>(),
                "Failed to parse catalog response"
            );
            CatalogError::Parse(e)
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_error_display() {
        let err = CatalogError::Status {
            status: 503,
            body: "upstream unavailable".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Catalog returned HTTP 503: upstream unavailable"
        );
    }

    #[test]
    fn test_base_url_trailing_slash_is_dropped() {
        let base = Url::parse("https://fakestoreapi.com/").unwrap();
        let client = CatalogClient::new(&base);
        assert_eq!(client.inner.base_url, "https://fakestoreapi.com");
    }
}
