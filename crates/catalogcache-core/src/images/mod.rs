//! Remote image cache.
//!
//! Images are fetched through an [`ImageSource`], probed for format and
//! dimensions, and memoized by exact URL. Concurrent requests for the same
//! URL share one fetch; a fetch nobody waits for anymore is cancelled.

pub mod cache;
pub mod error;

pub use cache::{Image, ImageCache, ImageCacheConfig, ImageSource};
pub use error::ImageError;
