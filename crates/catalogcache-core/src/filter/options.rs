use std::collections::HashSet;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Sort order for the product list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub enum SortOption {
    #[default]
    OldToNew,
    NewToOld,
    PriceHighToLow,
    PriceLowToHigh,
}

impl SortOption {
    pub const ALL: [SortOption; 4] = [
        SortOption::OldToNew,
        SortOption::NewToOld,
        SortOption::PriceHighToLow,
        SortOption::PriceLowToHigh,
    ];

    /// Get the display title for this option.
    pub fn title(&self) -> &'static str {
        match self {
            SortOption::OldToNew => "Old to new",
            SortOption::NewToOld => "New to old",
            SortOption::PriceHighToLow => "Price high to low",
            SortOption::PriceLowToHigh => "Price low to high",
        }
    }

    /// Short identifier used on the command line and in config.
    pub fn key(&self) -> &'static str {
        match self {
            SortOption::OldToNew => "old-to-new",
            SortOption::NewToOld => "new-to-old",
            SortOption::PriceHighToLow => "price-high-to-low",
            SortOption::PriceLowToHigh => "price-low-to-high",
        }
    }
}

impl FromStr for SortOption {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('_', "-");
        SortOption::ALL
            .into_iter()
            .find(|option| option.key() == wanted)
            .ok_or_else(|| {
                let keys: Vec<&str> = SortOption::ALL.iter().map(SortOption::key).collect();
                format!("unknown sort option '{}', expected one of: {}", s, keys.join(", "))
            })
    }
}

/// Facet selection plus sort order.
/// An empty brand or model set means "no restriction" on that facet.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct ProductFilter {
    pub sort_option: SortOption,
    #[serde(default)]
    pub selected_brands: HashSet<String>,
    #[serde(default)]
    pub selected_models: HashSet<String>,
}

impl ProductFilter {
    pub fn new(sort_option: SortOption) -> Self {
        Self {
            sort_option,
            ..Self::default()
        }
    }

    pub fn with_brands<I, S>(mut self, brands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.selected_brands = brands.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_models<I, S>(mut self, models: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.selected_models = models.into_iter().map(Into::into).collect();
        self
    }

    /// Add the brand if absent, remove it if present.
    pub fn toggle_brand(&mut self, brand: &str) {
        if !self.selected_brands.remove(brand) {
            self.selected_brands.insert(brand.to_string());
        }
    }

    /// Add the model if absent, remove it if present.
    pub fn toggle_model(&mut self, model: &str) {
        if !self.selected_models.remove(model) {
            self.selected_models.insert(model.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sort_option_from_str() {
        assert_eq!("price-low-to-high".parse::<SortOption>(), Ok(SortOption::PriceLowToHigh));
        assert_eq!("NEW_TO_OLD".parse::<SortOption>(), Ok(SortOption::NewToOld));
        assert!("cheapest".parse::<SortOption>().is_err());
    }

    #[test]
    fn test_sort_option_keys_round_trip() {
        for option in SortOption::ALL {
            assert_eq!(option.key().parse::<SortOption>(), Ok(option));
        }
    }

    #[test]
    fn test_toggle_brand() {
        let mut filter = ProductFilter::default();
        filter.toggle_brand("Apple");
        assert!(filter.selected_brands.contains("Apple"));
        filter.toggle_brand("Apple");
        assert!(filter.selected_brands.is_empty());
    }

    #[test]
    fn test_default_filter_is_unrestricted() {
        let filter = ProductFilter::default();
        assert_eq!(filter.sort_option, SortOption::OldToNew);
        assert!(filter.selected_brands.is_empty());
        assert!(filter.selected_models.is_empty());
    }
}
