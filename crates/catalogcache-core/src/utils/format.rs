use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

/// Case-insensitive substring check.
/// `needle_lower` must already be lowercased so callers can hoist it out of loops.
pub fn contains_ignore_case(haystack: &str, needle_lower: &str) -> bool {
    if needle_lower.is_empty() {
        return true;
    }
    haystack.to_lowercase().contains(needle_lower)
}

/// Truncate a string to a maximum length in characters, adding ellipsis if needed
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else if max_len <= 3 {
        s.chars().take(max_len).collect()
    } else {
        let truncated: String = s.chars().take(max_len - 3).collect();
        format!("{}...", truncated)
    }
}

/// Format a price with two decimal places
pub fn format_price(value: Decimal) -> String {
    format!("{:.2}", value)
}

/// Format a timestamp for display, e.g. "Jan 01, 2023"
pub fn format_date(dt: &DateTime<Utc>) -> String {
    dt.format("%b %d, %Y").to_string()
}
