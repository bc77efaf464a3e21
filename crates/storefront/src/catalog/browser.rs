//! Product list screen state.

use tracing::{instrument, warn};

use super::{CatalogClient, CatalogError, Product, filter_products};

/// Label of the category option that clears the category filter.
pub const ALL_CATEGORIES: &str = "All";

/// Inputs and derived output of the product list screen.
///
/// Every setter recomputes [`visible`](Self::visible) from the full product
/// list, so the visible subset never depends on the order of updates.
#[derive(Debug, Clone, Default)]
pub struct ProductBrowser {
    products: Vec<Product>,
    categories: Vec<String>,
    selected_category: String,
    query: String,
    visible: Vec<Product>,
}

impl ProductBrowser {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch products and categories from the catalog.
    ///
    /// A category failure is logged and leaves only the "All" option.
    ///
    /// # Errors
    ///
    /// Returns the product fetch error; the product list is left empty.
    #[instrument(skip_all)]
    pub async fn load(&mut self, catalog: &CatalogClient) -> Result<(), CatalogError> {
        let (products, categories) =
            tokio::join!(catalog.fetch_products(), catalog.fetch_categories());

        match categories {
            Ok(categories) => self.set_categories(categories),
            Err(e) => {
                warn!(error = %e, "Failed to fetch categories");
                self.set_categories(Vec::new());
            }
        }

        match products {
            Ok(products) => {
                self.set_products(products);
                Ok(())
            }
            Err(e) => {
                self.set_products(Vec::new());
                Err(e)
            }
        }
    }

    pub fn set_products(&mut self, products: Vec<Product>) {
        self.products = products;
        self.recompute();
    }

    pub fn set_categories(&mut self, categories: Vec<String>) {
        self.categories = categories;
    }

    /// Select a category. The empty string and [`ALL_CATEGORIES`] both clear
    /// the filter.
    pub fn select_category(&mut self, category: &str) {
        category.clone_into(&mut self.selected_category);
        if self.selected_category == ALL_CATEGORIES {
            self.selected_category.clear();
        }
        self.recompute();
    }

    pub fn set_query(&mut self, query: &str) {
        query.clone_into(&mut self.query);
        self.recompute();
    }

    /// Category options for the picker: "All" then the catalog's categories.
    #[must_use]
    pub fn category_options(&self) -> Vec<&str> {
        std::iter::once(ALL_CATEGORIES)
            .chain(self.categories.iter().map(String::as_str))
            .collect()
    }

    #[must_use]
    pub fn selected_category(&self) -> &str {
        &self.selected_category
    }

    #[must_use]
    pub fn query(&self) -> &str {
        &self.query
    }

    #[must_use]
    pub fn products(&self) -> &[Product] {
        &self.products
    }

    /// The products that pass the current category and query.
    #[must_use]
    pub fn visible(&self) -> &[Product] {
        &self.visible
    }

    fn recompute(&mut self) {
        self.visible = filter_products(&self.products, &self.selected_category, &self.query);
    }
}
