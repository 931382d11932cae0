//! Local persistent store for offline catalog access.
//!
//! This module provides the `CatalogStore`, which owns three relations:
//! - Products: the merged catalog snapshot, keyed by product id
//! - Favorites: product ids the user marked, with the time they were added
//! - Cart: per-product quantities, with the time the line was created
//!
//! Each relation is persisted as its own JSON file and replaced atomically,
//! so a write either lands completely or not at all.

pub mod catalog;
pub mod error;
mod persist;

pub use catalog::CatalogStore;
pub use error::StoreError;
