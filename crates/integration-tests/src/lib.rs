//! Integration tests for the ShopEZ client.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p shopez-integration-tests
//! ```
//!
//! # Test Categories
//!
//! - `catalog` - catalog client and product browser against a mock API
//! - `cart_flow` - facade, session gate and cart binding on in-process backends
//! - `firebase_auth` - identity REST flows against a mock provider
//! - `firebase_database` - realtime store REST and event stream against a mock
//!
//! Mock servers are `axum` routers bound to an ephemeral local port.

use axum::Router;
use shopez_core::{Price, ProductId};
use shopez_storefront::catalog::Product;
use tokio::net::TcpListener;
use url::Url;

/// Serve `app` on an ephemeral local port and return its base URL.
///
/// # Errors
///
/// Returns an error if the listener cannot be bound.
pub async fn serve(app: Router) -> std::io::Result<Url> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Url::parse(&format!("http://{addr}"))
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))
}

/// An HTTP client that ignores proxy settings, for talking to local mocks.
///
/// # Errors
///
/// Returns an error if the client cannot be built.
pub fn local_client() -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder().no_proxy().build()
}

/// A product record as the catalog would return it.
#[must_use]
pub fn product(id: i64, title: &str, cents: i64, category: &str) -> Product {
    Product {
        id: ProductId::new(id),
        title: title.to_string(),
        price: Price::from_cents(cents),
        category: category.to_string(),
        description: String::new(),
        image: format!("https://fakestoreapi.com/img/{id}.jpg"),
        rating: None,
    }
}

/// The catalog used across tests.
#[must_use]
pub fn sample_products() -> Vec<Product> {
    vec![
        product(1, "Fjallraven Backpack", 10995, "men's clothing"),
        product(2, "Slim Fit T-Shirt", 2230, "men's clothing"),
        product(5, "Dragon Station Chain Bracelet", 69500, "jewelery"),
        product(9, "WD 2TB Portable Hard Drive", 6400, "electronics"),
        product(18, "Rain Jacket Women", 3999, "women's clothing"),
    ]
}
