//! HTTP client for the remote product catalog.
//!
//! This module provides the `ApiClient` struct for fetching the product
//! list and product image bytes. It implements both `ProductSource` and
//! `ImageSource` so the orchestrator and image cache can use it directly.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use tracing::{debug, warn};

use crate::catalog::ProductSource;
use crate::images::{ImageError, ImageSource};
use crate::models::Product;

use super::ApiError;

// ============================================================================
// Constants
// ============================================================================

/// Default base URL of the catalog service
pub const DEFAULT_BASE_URL: &str = "https://5fc9346b2af77700165ae514.mockapi.io";

/// HTTP request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Maximum number of retries for rate-limited (429) requests.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting.
const INITIAL_BACKOFF_MS: u64 = 1000;

/// API client for the product catalog.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone, Debug)]
pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    /// Create a client against the default catalog service.
    pub fn new() -> Result<Self, ApiError> {
        Self::with_base_url(DEFAULT_BASE_URL, Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    pub fn with_base_url(base_url: &str, timeout: Duration) -> Result<Self, ApiError> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn products_url(&self) -> String {
        format!("{}/products", self.base_url)
    }

    /// Returns Ok(Some(response)) for success, Ok(None) for rate limit (should retry),
    /// or Err for other errors.
    async fn check_response_for_retry(
        response: reqwest::Response,
    ) -> Result<Option<reqwest::Response>, ApiError> {
        if response.status().is_success() {
            Ok(Some(response))
        } else if response.status().as_u16() == 429 {
            Ok(None)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }

    /// GET with 429 backoff, returning the successful response.
    async fn get(&self, url: &str) -> Result<reqwest::Response, ApiError> {
        let mut retries = 0;
        let mut backoff_ms = INITIAL_BACKOFF_MS;

        loop {
            let response = self.client.get(url).send().await?;

            match Self::check_response_for_retry(response).await? {
                Some(response) => return Ok(response),
                None => {
                    retries += 1;
                    if retries > MAX_RATE_LIMIT_RETRIES {
                        return Err(ApiError::RateLimited);
                    }
                    warn!(url = url, retry = retries, backoff_ms = backoff_ms, "Rate limited, backing off");
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                    backoff_ms *= 2;
                }
            }
        }
    }

    /// Fetch the full product list.
    pub async fn fetch_products(&self) -> Result<Vec<Product>, ApiError> {
        let url = self.products_url();
        let body = self.get(&url).await?.text().await?;
        let products = parse_products(&body)?;
        debug!(count = products.len(), "Fetched products");
        Ok(products)
    }

    /// Fetch raw bytes from an absolute URL.
    pub async fn fetch_bytes(&self, url: &str) -> Result<Bytes, ApiError> {
        let bytes = self.get(url).await?.bytes().await?;
        debug!(url = url, len = bytes.len(), "Fetched bytes");
        Ok(bytes)
    }
}

/// Decode a product list payload.
///
/// A body that is not a JSON array is a decoding error. Inside the array,
/// records that do not decode (missing fields, bad `createdAt`) are logged
/// and skipped so one bad record does not hide the rest of the catalog.
pub fn parse_products(body: &str) -> Result<Vec<Product>, ApiError> {
    let records: Vec<serde_json::Value> =
        serde_json::from_str(body).map_err(|e| ApiError::Decoding(e.to_string()))?;

    let products = records
        .into_iter()
        .enumerate()
        .filter_map(|(index, record)| match serde_json::from_value::<Product>(record) {
            Ok(product) => Some(product),
            Err(e) => {
                warn!(index, error = %e, "Skipping malformed product record");
                None
            }
        })
        .collect();
    Ok(products)
}

#[async_trait]
impl ProductSource for ApiClient {
    async fn fetch_products(&self) -> Result<Vec<Product>, ApiError> {
        ApiClient::fetch_products(self).await
    }
}

#[async_trait]
impl ImageSource for ApiClient {
    async fn fetch_image(&self, url: &str) -> Result<Bytes, ImageError> {
        self.fetch_bytes(url)
            .await
            .map_err(|e| ImageError::Fetch(e.to_string()))
    }
}
