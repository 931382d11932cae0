use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::Product;

/// A product the user has favorited. The product row may be absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FavoriteMark {
    pub product_id: String,
    pub added_at: DateTime<Utc>,
}

/// One line of the cart. `quantity` is never zero for a stored line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub product_id: String,
    pub quantity: u32,
    /// Set when the line is first created; quantity changes keep it.
    pub added_at: DateTime<Utc>,
}

/// A cart line joined with its product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct CartItem {
    pub product: Product,
    pub quantity: u32,
    #[cfg_attr(feature = "ts", ts(type = "string"))]
    pub added_at: DateTime<Utc>,
}

impl CartItem {
    pub fn line_total(&self) -> Decimal {
        self.product.price_value() * Decimal::from(self.quantity)
    }
}
