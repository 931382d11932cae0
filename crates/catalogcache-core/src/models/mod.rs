//! Data models for catalog entities.
//!
//! - `Product`: immutable catalog record as served by the remote API
//! - `FavoriteMark`, `CartLine`: rows of the persisted relations
//! - `CartItem`: cart line joined with its product

pub mod cart;
pub mod product;

pub use cart::{CartItem, CartLine, FavoriteMark};
pub use product::Product;
