//! Search, facet filtering and sorting over an in-memory product list.
//!
//! `apply` is a pure derivation; `FilterEngine` keeps the last search text
//! and the last applied filter so either axis can change on its own.

pub mod engine;
pub mod options;

pub use engine::{apply, available_brands, available_models, FilterEngine};
pub use options::{ProductFilter, SortOption};
