//! Utility functions for string formatting and matching.

pub mod format;
pub(crate) mod lock;

// Re-export commonly used functions at module level
pub use format::{contains_ignore_case, format_date, format_price, truncate};
