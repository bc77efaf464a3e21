//! Integration tests for the catalog client and product browser.

#![allow(clippy::unwrap_used)]

use axum::{Json, Router, http::StatusCode, routing::get};
use serde_json::{Value, json};
use shopez_integration_tests::{local_client, sample_products, serve};
use shopez_storefront::catalog::{ALL_CATEGORIES, CatalogClient, CatalogError, ProductBrowser};

fn products_json() -> Value {
    serde_json::to_value(sample_products()).unwrap()
}

fn categories_json() -> Value {
    json!(["electronics", "jewelery", "men's clothing", "women's clothing"])
}

async fn catalog(app: Router) -> CatalogClient {
    let url = serve(app).await.unwrap();
    CatalogClient::with_client(local_client().unwrap(), &url)
}

async fn healthy_catalog() -> CatalogClient {
    catalog(
        Router::new()
            .route("/products", get(|| async { Json(products_json()) }))
            .route("/products/categories", get(|| async { Json(categories_json()) })),
    )
    .await
}

// ============================================================================
// Catalog client
// ============================================================================

#[tokio::test]
async fn test_fetch_products_decodes_catalog_records() {
    let app = Router::new().route(
        "/products",
        get(|| async {
            Json(json!([{
                "id": 1,
                "title": "Fjallraven - Foldsack No. 1 Backpack, Fits 15 Laptops",
                "price": 109.95,
                "description": "Your perfect pack for everyday use",
                "category": "men's clothing",
                "image": "https://fakestoreapi.com/img/81fPKd-2AYL._AC_SL1500_.jpg",
                "rating": {"rate": 3.9, "count": 120}
            }]))
        }),
    );
    let products = catalog(app).await.fetch_products().await.unwrap();

    assert_eq!(products.len(), 1);
    assert_eq!(products[0].price_label(), "$109.95");
    assert_eq!(products[0].rating_label(), "3.9 (120)");
}

#[tokio::test]
async fn test_non_success_status_is_an_error() {
    let app = Router::new().route(
        "/products",
        get(|| async { (StatusCode::SERVICE_UNAVAILABLE, "maintenance") }),
    );
    let err = catalog(app).await.fetch_products().await.unwrap_err();
    assert!(matches!(err, CatalogError::Status { status: 503, .. }));
}

#[tokio::test]
async fn test_undecodable_body_is_an_error() {
    let app = Router::new().route("/products", get(|| async { Json(json!({"products": []})) }));
    let err = catalog(app).await.fetch_products().await.unwrap_err();
    assert!(matches!(err, CatalogError::Parse(_)));
}

// ============================================================================
// Product browser
// ============================================================================

#[tokio::test]
async fn test_browser_filters_loaded_catalog() {
    let catalog = healthy_catalog().await;
    let mut browser = ProductBrowser::new();
    browser.load(&catalog).await.unwrap();

    assert_eq!(browser.visible().len(), 5);
    assert_eq!(browser.category_options()[0], ALL_CATEGORIES);
    assert_eq!(browser.category_options().len(), 5);

    browser.set_query("JACKET");
    assert_eq!(browser.visible().len(), 1);

    browser.select_category("men's clothing");
    assert!(browser.visible().is_empty());

    browser.set_query("");
    assert_eq!(browser.visible().len(), 2);

    browser.select_category(ALL_CATEGORIES);
    assert_eq!(browser.visible().len(), 5);
}

#[tokio::test]
async fn test_category_failure_keeps_products() {
    let catalog = catalog(
        Router::new()
            .route("/products", get(|| async { Json(products_json()) }))
            .route(
                "/products/categories",
                get(|| async { StatusCode::INTERNAL_SERVER_ERROR }),
            ),
    )
    .await;

    let mut browser = ProductBrowser::new();
    browser.load(&catalog).await.unwrap();
    assert_eq!(browser.products().len(), 5);
    assert_eq!(browser.category_options(), vec![ALL_CATEGORIES]);
}

#[tokio::test]
async fn test_product_failure_empties_browser() {
    let catalog = catalog(
        Router::new()
            .route("/products", get(|| async { StatusCode::BAD_GATEWAY }))
            .route("/products/categories", get(|| async { Json(categories_json()) })),
    )
    .await;

    let mut browser = ProductBrowser::new();
    browser.set_products(sample_products());
    assert!(browser.load(&catalog).await.is_err());
    assert!(browser.products().is_empty());
    assert!(browser.visible().is_empty());
}
