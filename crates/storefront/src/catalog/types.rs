//! Domain types for the product catalog.
//!
//! These mirror the catalog's JSON records. Products are immutable
//! snapshots: nothing in the client mutates them after decoding.

use serde::{Deserialize, Serialize};
use shopez_core::{Price, ProductId};

// =============================================================================
// Product Types
// =============================================================================

/// A product as returned by `GET /products`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    /// Catalog identifier.
    pub id: ProductId,
    /// Display title.
    pub title: String,
    /// Unit price.
    pub price: Price,
    /// Category label, matched exactly by the category filter.
    pub category: String,
    /// Long description.
    #[serde(default)]
    pub description: String,
    /// Image URL.
    #[serde(default)]
    pub image: String,
    /// Review summary, when the catalog has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<Rating>,
}

/// Review summary for a product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rating {
    /// Average rate (e.g., 3.9).
    pub rate: f64,
    /// Number of reviews.
    pub count: u32,
}

// Ratings only ever come from JSON numbers, never NaN.
impl Eq for Rating {}

impl Product {
    /// Rating label as shown on product cards: `3.9 (120)` or `N/A (0)`.
    #[must_use]
    pub fn rating_label(&self) -> String {
        match &self.rating {
            Some(rating) if rating.rate > 0.0 => format!("{} ({})", rating.rate, rating.count),
            Some(rating) => format!("N/A ({})", rating.count),
            None => "N/A (0)".to_string(),
        }
    }

    /// Rating label for the detail screen: `3.9 (120 reviews)`.
    #[must_use]
    pub fn review_label(&self) -> String {
        let label = self.rating_label();
        label.strip_suffix(')').map_or(label.clone(), |head| format!("{head} reviews)"))
    }

    /// Price label, e.g. `$109.95`.
    #[must_use]
    pub fn price_label(&self) -> String {
        self.price.to_string()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const CATALOG_RECORD: &str = r#"{
        "id": 1,
        "title": "Fjallraven - Foldsack No. 1 Backpack, Fits 15 Laptops",
        "price": 109.95,
        "description": "Your perfect pack for everyday use and walks in the forest.",
        "category": "men's clothing",
        "image": "https://fakestoreapi.com/img/81fPKd-2AYL._AC_SL1500_.jpg",
        "rating": { "rate": 3.9, "count": 120 }
    }"#;

    #[test]
    fn test_decode_catalog_record() {
        let product: Product = serde_json::from_str(CATALOG_RECORD).unwrap();
        assert_eq!(product.id, ProductId::new(1));
        assert_eq!(product.category, "men's clothing");
        assert_eq!(product.price, Price::from_cents(10995));
        assert_eq!(product.rating.as_ref().unwrap().count, 120);
    }

    #[test]
    fn test_decode_without_rating() {
        let product: Product = serde_json::from_str(
            r#"{"id": 2, "title": "Mug", "price": 5, "category": "kitchen"}"#,
        )
        .unwrap();
        assert!(product.rating.is_none());
        assert!(product.description.is_empty());
    }

    #[test]
    fn test_labels() {
        let mut product: Product = serde_json::from_str(CATALOG_RECORD).unwrap();
        assert_eq!(product.price_label(), "$109.95");
        assert_eq!(product.rating_label(), "3.9 (120)");
        assert_eq!(product.review_label(), "3.9 (120 reviews)");

        product.rating = None;
        assert_eq!(product.rating_label(), "N/A (0)");
        assert_eq!(product.review_label(), "N/A (0 reviews)");
    }
}
