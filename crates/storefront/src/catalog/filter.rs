//! Product list filtering.

use super::Product;

/// Select the products visible for a category and a search query.
///
/// An empty `category` matches every product; otherwise the product's
/// category must equal it exactly (case-sensitive). An empty `query` matches
/// every product; otherwise the lower-cased title must contain the
/// lower-cased query. Both conditions must hold. Order is preserved.
#[must_use]
pub fn filter_products(products: &[Product], category: &str, query: &str) -> Vec<Product> {
    let needle = query.to_lowercase();

    products
        .iter()
        .filter(|p| category.is_empty() || p.category == category)
        .filter(|p| needle.is_empty() || p.title.to_lowercase().contains(&needle))
        .cloned()
        .collect()
}
