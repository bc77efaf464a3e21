//! ShopEZ storefront client library.
//!
//! Browsing a product catalog, signing in, and keeping a per-user cart in
//! sync with a hosted realtime database. The crate produces view state
//! (visible products, cart snapshots, notices); drawing it is up to the host.
//!
//! # Example
//!
//! ```rust,ignore
//! use shopez_storefront::{config::ClientConfig, state::Storefront, telemetry};
//!
//! let config = ClientConfig::from_env()?;
//! let _sentry = telemetry::init(&config);
//! let storefront = Storefront::connect(&config).await?;
//! let cart = storefront.bind_cart();
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod binding;
pub mod cache;
pub mod cart;
pub mod catalog;
pub mod config;
pub mod error;
pub mod identity;
pub mod session;
pub mod state;
pub mod store;
pub mod telemetry;
