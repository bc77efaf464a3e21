//! ShopEZ Core - Shared types library.
//!
//! This crate provides common types used across the ShopEZ client:
//! - `storefront` - Catalog, cart reconciliation, and session handling
//! - `integration-tests` - End-to-end tests against in-process backends
//!
//! # Architecture
//!
//! The core crate contains only types - no I/O, no network clients, no
//! runtime. This keeps it lightweight and usable from any presentation layer.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for product IDs, user IDs, prices, and emails

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
