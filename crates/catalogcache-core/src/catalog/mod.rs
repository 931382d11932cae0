//! Catalog sync orchestration.
//!
//! The orchestrator pulls the product list from a [`ProductSource`], merges
//! it into the [`CatalogStore`](crate::store::CatalogStore), and keeps the
//! in-memory list and its filtered view current. Load progress is exposed
//! as a watch channel and UI-visible changes as [`CatalogEvent`]s.

pub mod error;
pub mod orchestrator;

pub use error::CatalogError;
pub use orchestrator::{CatalogEvent, CatalogOrchestrator, LoadState, ProductSource};
