//! catalogcache core library.
//!
//! Offline-first product catalog client:
//!
//! - [`store`]: persistent catalog snapshot plus favorites and cart relations
//! - [`filter`]: search, facet filtering and sorting over an in-memory list
//! - [`catalog`]: remote sync orchestration and consumer notifications
//! - [`images`]: single-flight, cancellable image cache keyed by URL
//! - [`api`]: HTTP client for the remote catalog and image hosts

pub mod api;
pub mod catalog;
pub mod config;
pub mod filter;
pub mod images;
pub mod models;
pub mod store;
pub mod utils;

pub use api::{ApiClient, ApiError};
pub use catalog::{CatalogError, CatalogEvent, CatalogOrchestrator, LoadState, ProductSource};
pub use config::Config;
pub use filter::{FilterEngine, ProductFilter, SortOption};
pub use images::{Image, ImageCache, ImageCacheConfig, ImageError, ImageSource};
pub use models::{CartItem, CartLine, FavoriteMark, Product};
pub use store::{CatalogStore, StoreError};
