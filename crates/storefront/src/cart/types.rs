//! Cart domain types and their wire formats.
//!
//! A line is stored as the product record with `quantity` and `addedAt`
//! added, keyed by product ID under `carts/{uid}`. The durable cache keeps
//! the same line records as a JSON array.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shopez_core::{Price, ProductId};

use crate::catalog::Product;

/// Most items the cart badge spells out before switching to `99+`.
const BADGE_MAX: i64 = 99;

/// Largest quantity a stored line may carry.
pub const MAX_LINE_QUANTITY: i64 = 9_999;

// =============================================================================
// CartLine
// =============================================================================

/// One product in a cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    /// Snapshot of the product when it was added.
    #[serde(flatten)]
    pub product: Product,
    /// Number of units; at least 1 in any stored line.
    pub quantity: i64,
    /// When the product was added.
    #[serde(
        rename = "addedAt",
        with = "chrono::serde::ts_milliseconds_option",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub added_at: Option<DateTime<Utc>>,
}

impl CartLine {
    /// A new line for `product` with quantity 1, added now.
    #[must_use]
    pub fn new(product: Product) -> Self {
        Self {
            product,
            quantity: 1,
            added_at: Some(Utc::now()),
        }
    }

    /// The same line with a different quantity.
    #[must_use]
    pub fn with_quantity(&self, quantity: i64) -> Self {
        Self {
            quantity,
            ..self.clone()
        }
    }

    #[must_use]
    pub const fn product_id(&self) -> ProductId {
        self.product.id
    }

    /// `price × quantity`.
    #[must_use]
    pub fn line_total(&self) -> Price {
        self.product.price.times(self.quantity)
    }
}

// =============================================================================
// Cart
// =============================================================================

/// Error decoding a remote cart value.
#[derive(Debug, thiserror::Error)]
pub enum CartDecodeError {
    /// The value is neither an object, an array, nor null.
    #[error("cart value is not an object or array: {0}")]
    Shape(String),

    /// A line failed to decode.
    #[error("cart line {key}: {source}")]
    Line {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// A line carries a quantity above [`MAX_LINE_QUANTITY`].
    #[error("cart line {key}: quantity {quantity} exceeds {MAX_LINE_QUANTITY}")]
    Quantity { key: String, quantity: i64 },
}

/// A user's cart: product ID to line.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Cart {
    lines: BTreeMap<ProductId, CartLine>,
}

impl Cart {
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a cart from lines, dropping any with quantity below 1 or above
    /// [`MAX_LINE_QUANTITY`]. A later line for the same product replaces an
    /// earlier one.
    #[must_use]
    pub fn from_lines(lines: impl IntoIterator<Item = CartLine>) -> Self {
        Self {
            lines: lines
                .into_iter()
                .filter(|line| (1..=MAX_LINE_QUANTITY).contains(&line.quantity))
                .map(|line| (line.product_id(), line))
                .collect(),
        }
    }

    /// Decode the value stored at `carts/{uid}`.
    ///
    /// `null` is the empty cart. The realtime database may return a cart
    /// keyed by small integers as an array; both shapes are accepted and
    /// `null` entries are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if the value has another shape, a line does not
    /// decode, or a line's quantity is out of range.
    pub fn decode(value: &Value) -> Result<Self, CartDecodeError> {
        let entries: Vec<(String, &Value)> = match value {
            Value::Null => Vec::new(),
            Value::Object(map) => map.iter().map(|(k, v)| (k.clone(), v)).collect(),
            Value::Array(items) => items
                .iter()
                .enumerate()
                .map(|(i, v)| (i.to_string(), v))
                .collect(),
            other => return Err(CartDecodeError::Shape(other.to_string())),
        };

        let mut lines = Vec::with_capacity(entries.len());
        for (key, entry) in entries {
            if entry.is_null() {
                continue;
            }
            let line = CartLine::deserialize(entry)
                .map_err(|source| CartDecodeError::Line { key: key.clone(), source })?;
            if line.quantity > MAX_LINE_QUANTITY {
                return Err(CartDecodeError::Quantity {
                    key,
                    quantity: line.quantity,
                });
            }
            lines.push(line);
        }
        Ok(Self::from_lines(lines))
    }

    /// Serialize for the durable cache (array of lines).
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_cache_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.lines.values().collect::<Vec<_>>())
    }

    /// Parse a durable cache entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the entry is not an array of lines.
    pub fn from_cache_json(json: &str) -> Result<Self, serde_json::Error> {
        let lines: Vec<CartLine> = serde_json::from_str(json)?;
        Ok(Self::from_lines(lines))
    }

    /// Lines ordered by product ID.
    pub fn lines(&self) -> impl Iterator<Item = &CartLine> {
        self.lines.values()
    }

    #[must_use]
    pub fn get(&self, product_id: ProductId) -> Option<&CartLine> {
        self.lines.get(&product_id)
    }

    #[must_use]
    pub fn contains(&self, product_id: ProductId) -> bool {
        self.lines.contains_key(&product_id)
    }

    /// Number of distinct products.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Total number of units across all lines.
    #[must_use]
    pub fn item_count(&self) -> i64 {
        self.lines
            .values()
            .fold(0_i64, |count, line| count.saturating_add(line.quantity))
    }

    /// Sum of `price × quantity` over all lines.
    #[must_use]
    pub fn total(&self) -> Price {
        self.lines.values().map(CartLine::line_total).sum()
    }

    /// Total rounded to cents for display, e.g. `$25.00`.
    #[must_use]
    pub fn total_label(&self) -> String {
        self.total().to_string()
    }
}

/// Label for the cart badge: nothing when empty, `99+` past 99.
#[must_use]
pub fn badge_label(item_count: i64) -> String {
    match item_count {
        n if n <= 0 => String::new(),
        n if n > BADGE_MAX => format!("{BADGE_MAX}+"),
        n => n.to_string(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    fn product(id: i64, cents: i64) -> Product {
        Product {
            id: ProductId::new(id),
            title: format!("Product {id}"),
            price: Price::from_cents(cents),
            category: "clothing".to_string(),
            description: String::new(),
            image: String::new(),
            rating: None,
        }
    }

    fn line(id: i64, cents: i64, quantity: i64) -> CartLine {
        CartLine {
            product: product(id, cents),
            quantity,
            added_at: None,
        }
    }

    #[test]
    fn test_total_scenario() {
        let cart = Cart::from_lines([line(1, 1000, 2), line(2, 500, 1)]);
        assert_eq!(cart.total(), Price::from_cents(2500));
        assert_eq!(cart.total_label(), "$25.00");
        assert_eq!(cart.item_count(), 3);
    }

    #[test]
    fn test_total_rounds_for_display_only() {
        let cart = Cart::from_lines([line(1, 333, 3), line(2, 1, 1)]);
        assert_eq!(cart.total(), Price::from_cents(1000));
        assert_eq!(cart.total_label(), "$10.00");
    }

    #[test]
    fn test_from_lines_drops_non_positive_quantities() {
        let cart = Cart::from_lines([line(1, 100, 0), line(2, 100, -3), line(3, 100, 1)]);
        assert_eq!(cart.len(), 1);
        assert!(cart.contains(ProductId::new(3)));
    }

    #[test]
    fn test_line_wire_format_is_flat() {
        let added = DateTime::from_timestamp_millis(1_700_000_000_000).unwrap();
        let stored = CartLine {
            added_at: Some(added),
            ..line(4, 1999, 2)
        };
        let value = serde_json::to_value(&stored).unwrap();
        assert_eq!(value["id"], json!(4));
        assert_eq!(value["price"], json!(19.99));
        assert_eq!(value["quantity"], json!(2));
        assert_eq!(value["addedAt"], json!(1_700_000_000_000_i64));

        let decoded: CartLine = serde_json::from_value(value).unwrap();
        assert_eq!(decoded, stored);
    }

    #[test]
    fn test_decode_object_and_array_shapes_agree() {
        let object = json!({
            "1": {"id": 1, "title": "A", "price": 10, "category": "c", "quantity": 2},
            "2": {"id": 2, "title": "B", "price": 5, "category": "c", "quantity": 1}
        });
        let array = json!([
            null,
            {"id": 1, "title": "A", "price": 10, "category": "c", "quantity": 2},
            {"id": 2, "title": "B", "price": 5, "category": "c", "quantity": 1}
        ]);

        let from_object = Cart::decode(&object).unwrap();
        let from_array = Cart::decode(&array).unwrap();
        assert_eq!(from_object, from_array);
        assert_eq!(from_object.total_label(), "$25.00");
    }

    #[test]
    fn test_decode_null_is_empty() {
        assert!(Cart::decode(&Value::Null).unwrap().is_empty());
    }

    #[test]
    fn test_decode_rejects_bad_shapes() {
        assert!(matches!(
            Cart::decode(&json!("cart")),
            Err(CartDecodeError::Shape(_))
        ));
        assert!(matches!(
            Cart::decode(&json!({"1": {"id": "one"}})),
            Err(CartDecodeError::Line { .. })
        ));
    }

    #[test]
    fn test_decode_rejects_oversized_quantity() {
        let value = json!({
            "1": {"id": 1, "title": "A", "price": 10, "category": "c", "quantity": i64::MAX},
            "2": {"id": 2, "title": "B", "price": 5, "category": "c", "quantity": 1}
        });
        assert!(matches!(
            Cart::decode(&value),
            Err(CartDecodeError::Quantity { quantity: i64::MAX, .. })
        ));
    }

    #[test]
    fn test_from_lines_drops_oversized_quantities() {
        let cart = Cart::from_lines([
            line(1, 100, MAX_LINE_QUANTITY + 1),
            line(2, 100, MAX_LINE_QUANTITY),
        ]);
        assert_eq!(cart.len(), 1);
        assert_eq!(cart.item_count(), MAX_LINE_QUANTITY);
    }

    #[test]
    fn test_huge_prices_total_without_overflow() {
        let expensive = |id| CartLine {
            product: Product {
                price: Price::MAX,
                ..product(id, 0)
            },
            quantity: MAX_LINE_QUANTITY,
            added_at: None,
        };
        let cart = Cart::from_lines([expensive(1), expensive(2)]);
        assert_eq!(cart.total(), Price::MAX);
        assert!(cart.total_label().starts_with('$'));
        assert_eq!(cart.item_count(), 2 * MAX_LINE_QUANTITY);
    }

    #[test]
    fn test_cache_json_round_trip() {
        let cart = Cart::from_lines([line(1, 1000, 2)]);
        let json = cart.to_cache_json().unwrap();
        assert!(json.starts_with('['));
        assert_eq!(Cart::from_cache_json(&json).unwrap(), cart);
    }

    #[test]
    fn test_badge_label() {
        assert_eq!(badge_label(0), "");
        assert_eq!(badge_label(5), "5");
        assert_eq!(badge_label(99), "99");
        assert_eq!(badge_label(120), "99+");
    }
}
