use std::str::FromStr;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A catalog record as served by `GET /products`.
///
/// Records are replaced wholesale on every sync, never patched field by field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct Product {
    pub id: String,
    pub name: String,
    pub description: String,
    #[serde(rename = "image")]
    pub image_url: String,
    /// Kept as the server sent it; see [`Product::price_value`].
    pub price: String,
    pub brand: String,
    pub model: String,
    #[serde(rename = "createdAt", with = "iso8601")]
    #[cfg_attr(feature = "ts", ts(type = "string"))]
    pub created_at: DateTime<Utc>,
}

impl Product {
    /// Parse the price, accepting either `.` or `,` as the decimal separator.
    /// Anything unparseable counts as zero.
    pub fn price_value(&self) -> Decimal {
        parse_price(&self.price)
    }

    /// `created_at` in the wire format (`2023-01-01T10:00:00.000Z`).
    pub fn created_at_iso(&self) -> String {
        format_timestamp(&self.created_at)
    }
}

pub fn parse_price(raw: &str) -> Decimal {
    let normalized = raw.trim().replace(',', ".");
    Decimal::from_str(&normalized).unwrap_or(Decimal::ZERO)
}

/// Parse an ISO-8601 timestamp. Bare `YYYY-MM-DD` dates are read as midnight UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

pub fn format_timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

mod iso8601 {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{de, Deserialize, Deserializer, Serializer};

    /// Full precision, so a stored product reads back unchanged. Whole
    /// milliseconds still come out as `.529Z`.
    pub fn serialize<S: Serializer>(dt: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&dt.to_rfc3339_opts(SecondsFormat::AutoSi, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse_timestamp(&raw)
            .ok_or_else(|| de::Error::custom(format!("invalid createdAt timestamp: {}", raw)))
    }
}

#[cfg(test)]
pub(crate) fn sample_product(id: &str, name: &str, brand: &str, price: &str, created_at: &str) -> Product {
    Product {
        id: id.to_string(),
        name: name.to_string(),
        description: format!("{} description", name),
        image_url: format!("https://img.example.com/{}.png", id),
        price: price.to_string(),
        brand: brand.to_string(),
        model: format!("{}-model", name),
        created_at: parse_timestamp(created_at).unwrap_or_default(),
    }
}
