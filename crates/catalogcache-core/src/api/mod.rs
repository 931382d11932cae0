//! HTTP access to the remote product catalog.
//!
//! The catalog service exposes a single unauthenticated `GET /products`
//! endpoint returning the whole list. Image URLs found on products point
//! at arbitrary hosts and are fetched through the same client.

pub mod client;
pub mod error;

pub use client::{parse_products, ApiClient, DEFAULT_BASE_URL, DEFAULT_TIMEOUT_SECS};
pub use error::ApiError;
