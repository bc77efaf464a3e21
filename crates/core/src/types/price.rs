//! Decimal price representation.
//!
//! Catalog prices arrive as JSON numbers. They are held as [`Decimal`] so
//! that line totals and cart totals add up exactly.

use core::fmt;
use core::ops::{Add, Mul};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A price in a single currency.
///
/// Serializes as a bare JSON number, matching the catalog and cart wire
/// formats. The currency is not carried on the wire; the catalog only
/// quotes US dollars.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Price {
    #[serde(with = "rust_decimal::serde::float")]
    amount: Decimal,
}

impl Price {
    /// Zero dollars.
    pub const ZERO: Self = Self {
        amount: Decimal::ZERO,
    };

    /// Largest representable price; arithmetic saturates here.
    pub const MAX: Self = Self {
        amount: Decimal::MAX,
    };

    /// Create a price from a decimal amount.
    #[must_use]
    pub const fn new(amount: Decimal) -> Self {
        Self { amount }
    }

    /// Create a price from an amount in cents.
    #[must_use]
    pub fn from_cents(cents: i64) -> Self {
        Self {
            amount: Decimal::new(cents, 2),
        }
    }

    /// The raw amount.
    #[must_use]
    pub const fn amount(&self) -> Decimal {
        self.amount
    }

    /// The amount rounded half-up to two decimal places.
    #[must_use]
    pub fn rounded(&self) -> Decimal {
        self.amount
            .round_dp_with_strategy(2, rust_decimal::RoundingStrategy::MidpointAwayFromZero)
    }

    /// Multiply by a line quantity. Saturates at the bounds of [`Decimal`].
    #[must_use]
    pub fn times(self, quantity: i64) -> Self {
        Self {
            amount: self.amount.saturating_mul(Decimal::from(quantity)),
        }
    }

    /// The currency this price is quoted in.
    #[must_use]
    pub const fn currency(&self) -> CurrencyCode {
        CurrencyCode::USD
    }
}

impl Add for Price {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            amount: self.amount.saturating_add(rhs.amount),
        }
    }
}

impl Mul<i64> for Price {
    type Output = Self;

    fn mul(self, rhs: i64) -> Self {
        self.times(rhs)
    }
}

impl core::iter::Sum for Price {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Add::add)
    }
}

/// Formats as a display label, e.g. `$19.99`.
impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{:.2}", self.currency().symbol(), self.rounded())
    }
}

impl From<Decimal> for Price {
    fn from(amount: Decimal) -> Self {
        Self::new(amount)
    }
}

/// ISO 4217 currency codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum CurrencyCode {
    #[default]
    USD,
}

impl CurrencyCode {
    /// Display symbol.
    #[must_use]
    pub const fn symbol(&self) -> &'static str {
        match self {
            Self::USD => "$",
        }
    }
}
