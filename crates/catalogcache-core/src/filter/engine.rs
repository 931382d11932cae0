use std::cmp::Reverse;
use std::collections::BTreeSet;

use crate::models::Product;
use crate::utils::contains_ignore_case;

use super::{ProductFilter, SortOption};

/// Derive the visible products from the full list.
///
/// Search matches product names case-insensitively. Facets and sort apply
/// only when a filter is given. Sorting is stable, so ties keep input order.
pub fn apply(products: &[Product], search: &str, filter: Option<&ProductFilter>) -> Vec<Product> {
    let mut visible: Vec<&Product> = products.iter().collect();

    if !search.is_empty() {
        let query = search.to_lowercase();
        visible.retain(|p| contains_ignore_case(&p.name, &query));
    }

    if let Some(filter) = filter {
        if !filter.selected_brands.is_empty() {
            visible.retain(|p| filter.selected_brands.contains(&p.brand));
        }
        if !filter.selected_models.is_empty() {
            visible.retain(|p| filter.selected_models.contains(&p.model));
        }

        match filter.sort_option {
            SortOption::OldToNew => visible.sort_by(|a, b| a.created_at.cmp(&b.created_at)),
            SortOption::NewToOld => visible.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
            // Prices are parsed once per product, not once per comparison.
            SortOption::PriceHighToLow => visible.sort_by_cached_key(|p| Reverse(p.price_value())),
            SortOption::PriceLowToHigh => visible.sort_by_cached_key(|p| p.price_value()),
        }
    }

    visible.into_iter().cloned().collect()
}

/// Distinct brands, sorted, for building a facet picker.
pub fn available_brands(products: &[Product]) -> Vec<String> {
    products
        .iter()
        .map(|p| p.brand.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Distinct models, sorted, for building a facet picker.
pub fn available_models(products: &[Product]) -> Vec<String> {
    products
        .iter()
        .map(|p| p.model.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Holds the full list and the last value of each axis (search, filter)
/// so that changing one re-applies the other.
#[derive(Debug, Clone, Default)]
pub struct FilterEngine {
    products: Vec<Product>,
    search_text: String,
    last_filter: Option<ProductFilter>,
    visible: Vec<Product>,
}

impl FilterEngine {
    pub fn new(products: Vec<Product>) -> Self {
        let mut engine = Self {
            products,
            ..Self::default()
        };
        engine.recompute();
        engine
    }

    /// Replace the full list, keeping the current search and filter.
    pub fn set_products(&mut self, products: Vec<Product>) -> &[Product] {
        self.products = products;
        self.recompute()
    }

    /// Update whichever axes are given and recompute the visible list.
    pub fn update(&mut self, search: Option<&str>, filter: Option<ProductFilter>) -> &[Product] {
        if let Some(search) = search {
            self.search_text = search.to_string();
        }
        if let Some(filter) = filter {
            self.last_filter = Some(filter);
        }
        self.recompute()
    }

    pub fn search(&mut self, text: &str) -> &[Product] {
        self.update(Some(text), None)
    }

    pub fn apply_filter(&mut self, filter: ProductFilter) -> &[Product] {
        self.update(None, Some(filter))
    }

    /// Drop the filter axis; the search text stays.
    pub fn clear_filter(&mut self) -> &[Product] {
        self.last_filter = None;
        self.recompute()
    }

    pub fn products(&self) -> &[Product] {
        &self.products
    }

    pub fn visible(&self) -> &[Product] {
        &self.visible
    }

    pub fn search_text(&self) -> &str {
        &self.search_text
    }

    pub fn last_filter(&self) -> Option<&ProductFilter> {
        self.last_filter.as_ref()
    }

    fn recompute(&mut self) -> &[Product] {
        self.visible = apply(&self.products, &self.search_text, self.last_filter.as_ref());
        &self.visible
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::product::sample_product;

    fn phones() -> Vec<Product> {
        vec![
            sample_product("1", "iPhone", "Apple", "1000", "2023-01-01"),
            sample_product("2", "Galaxy", "Samsung", "800", "2022-01-01"),
            sample_product("3", "Pixel", "Google", "600", "2021-01-01"),
        ]
    }

    fn names(products: &[Product]) -> Vec<&str> {
        products.iter().map(|p| p.name.as_str()).collect()
    }

    #[test]
    fn test_brand_filter_with_price_low_to_high() {
        let filter =
            ProductFilter::new(SortOption::PriceLowToHigh).with_brands(["Samsung", "Google"]);
        let visible = apply(&phones(), "", Some(&filter));
        assert_eq!(names(&visible), vec!["Pixel", "Galaxy"]);
    }

    #[test]
    fn test_search_is_case_insensitive_substring() {
        assert_eq!(names(&apply(&phones(), "galaxy", None)), vec!["Galaxy"]);
        assert_eq!(names(&apply(&phones(), "PHO", None)), vec!["iPhone"]);
        assert!(apply(&phones(), "nokia", None).is_empty());
    }

    #[test]
    fn test_no_filter_keeps_input_order() {
        assert_eq!(names(&apply(&phones(), "", None)), vec!["iPhone", "Galaxy", "Pixel"]);
    }

    #[test]
    fn test_empty_facets_do_not_restrict() {
        let filter = ProductFilter::new(SortOption::OldToNew);
        assert_eq!(names(&apply(&phones(), "", Some(&filter))), vec!["Pixel", "Galaxy", "iPhone"]);
    }

    #[test]
    fn test_model_filter() {
        let filter = ProductFilter::new(SortOption::NewToOld).with_models(["Pixel-model", "iPhone-model"]);
        assert_eq!(names(&apply(&phones(), "", Some(&filter))), vec!["iPhone", "Pixel"]);
    }

    #[test]
    fn test_price_high_to_low_with_comma_and_garbage() {
        let products = vec![
            sample_product("1", "A", "X", "10,5", "2021-01-01"),
            sample_product("2", "B", "X", "abc", "2021-01-01"),
            sample_product("3", "C", "X", "11", "2021-01-01"),
        ];
        let filter = ProductFilter::new(SortOption::PriceHighToLow);
        assert_eq!(names(&apply(&products, "", Some(&filter))), vec!["C", "A", "B"]);
    }

    #[test]
    fn test_price_sort_keeps_tie_order_in_both_directions() {
        let products = vec![
            sample_product("1", "Cheap A", "X", "1", "2021-01-01"),
            sample_product("2", "Dear A", "X", "9,00", "2021-01-01"),
            sample_product("3", "Cheap B", "X", "1.0", "2021-01-01"),
            sample_product("4", "Dear B", "X", "9", "2021-01-01"),
        ];
        let high = ProductFilter::new(SortOption::PriceHighToLow);
        assert_eq!(
            names(&apply(&products, "", Some(&high))),
            vec!["Dear A", "Dear B", "Cheap A", "Cheap B"]
        );
        let low = ProductFilter::new(SortOption::PriceLowToHigh);
        assert_eq!(
            names(&apply(&products, "", Some(&low))),
            vec!["Cheap A", "Cheap B", "Dear A", "Dear B"]
        );
    }

    #[test]
    fn test_sort_is_stable_on_ties() {
        let products = vec![
            sample_product("1", "First", "X", "5", "2021-01-01"),
            sample_product("2", "Second", "X", "5.00", "2021-01-01"),
            sample_product("3", "Third", "X", "5,0", "2021-01-01"),
        ];
        for option in SortOption::ALL {
            let filter = ProductFilter::new(option);
            assert_eq!(
                names(&apply(&products, "", Some(&filter))),
                vec!["First", "Second", "Third"],
                "{:?}",
                option
            );
        }
    }

    #[test]
    fn test_engine_search_reapplies_last_filter() {
        let mut engine = FilterEngine::new(phones());
        engine.apply_filter(ProductFilter::new(SortOption::PriceLowToHigh));
        assert_eq!(names(engine.visible()), vec!["Pixel", "Galaxy", "iPhone"]);

        engine.search("i");
        assert_eq!(names(engine.visible()), vec!["Pixel", "iPhone"]);
    }

    #[test]
    fn test_engine_filter_reapplies_last_search() {
        let mut engine = FilterEngine::new(phones());
        engine.search("a");
        assert_eq!(names(engine.visible()), vec!["Galaxy"]);

        let visible = engine.apply_filter(ProductFilter::new(SortOption::NewToOld).with_brands(["Apple"]));
        assert!(visible.is_empty());
        assert_eq!(engine.search_text(), "a");

        engine.search("");
        assert_eq!(names(engine.visible()), vec!["iPhone"]);
    }

    #[test]
    fn test_engine_set_products_keeps_axes() {
        let mut engine = FilterEngine::new(Vec::new());
        engine.update(Some("x"), Some(ProductFilter::new(SortOption::PriceHighToLow)));
        let products = vec![
            sample_product("1", "Xbox", "Microsoft", "500", "2021-01-01"),
            sample_product("2", "Xperia", "Sony", "700", "2021-01-01"),
            sample_product("3", "Switch", "Nintendo", "300", "2021-01-01"),
        ];
        engine.set_products(products);
        assert_eq!(names(engine.visible()), vec!["Xperia", "Xbox"]);
        assert_eq!(engine.products().len(), 3);
    }

    #[test]
    fn test_engine_clear_filter() {
        let mut engine = FilterEngine::new(phones());
        engine.apply_filter(ProductFilter::new(SortOption::OldToNew).with_brands(["Google"]));
        assert_eq!(names(engine.visible()), vec!["Pixel"]);
        engine.clear_filter();
        assert!(engine.last_filter().is_none());
        assert_eq!(names(engine.visible()), vec!["iPhone", "Galaxy", "Pixel"]);
    }

    #[test]
    fn test_available_facets() {
        let mut products = phones();
        products.push(sample_product("4", "iPad", "Apple", "900", "2020-01-01"));
        assert_eq!(available_brands(&products), vec!["Apple", "Google", "Samsung"]);
        assert_eq!(available_models(&products).len(), 4);
    }
}
