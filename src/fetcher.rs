//! HTTP fetcher for the published range list.

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::{Client, StatusCode};
use std::collections::HashMap;
use tracing::{debug, info};

use crate::config::Config;
use crate::error::SyncError;

/// Maximum accepted metadata document size (5 MB).
/// api.github.com/meta is a few hundred KB.
const MAX_META_SIZE: usize = 5 * 1024 * 1024;

/// Something that yields raw CIDR strings.
#[async_trait]
pub trait RangeSource: Send + Sync {
    async fn fetch_ranges(&self) -> Result<Vec<String>, SyncError>;
}

/// Fixed list of ranges.
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    ranges: Vec<String>,
}

impl StaticSource {
    pub fn new<I, S>(ranges: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            ranges: ranges.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl RangeSource for StaticSource {
    async fn fetch_ranges(&self) -> Result<Vec<String>, SyncError> {
        Ok(self.ranges.clone())
    }
}

/// Fetches list fields from a JSON metadata endpoint such as api.github.com/meta.
pub struct MetaFetcher {
    client: Client,
    url: String,
    fields: Vec<String>,
}

impl MetaFetcher {
    pub fn new(config: &Config) -> Result<Self, SyncError> {
        let client = Client::builder()
            .timeout(config.fetch_timeout())
            .user_agent(format!("nftsync/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SyncError::Fetch(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self::with_client(client, config))
    }

    fn with_client(client: Client, config: &Config) -> Self {
        Self {
            client,
            url: config.meta_url.clone(),
            fields: config.meta_fields.clone(),
        }
    }
}

// Note: no retry. A failed fetch fails the run and the next scheduled run
// tries again.
#[async_trait]
impl RangeSource for MetaFetcher {
    async fn fetch_ranges(&self) -> Result<Vec<String>, SyncError> {
        info!("Fetching {}...", self.url);

        let mut response = self
            .client
            .get(&self.url)
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| SyncError::Fetch(format!("{:#}", anyhow::Error::from(e))))?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(SyncError::Fetch(format!("HTTP {}", status)));
        }

        if let Some(length) = response.content_length() {
            if length as usize > MAX_META_SIZE {
                return Err(SyncError::Fetch(format!(
                    "Response too large: {} bytes (max: {} bytes)",
                    length, MAX_META_SIZE
                )));
            }
        }

        // Content-Length is optional, so the cap is also enforced while reading.
        let mut bytes = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| SyncError::Fetch(format!("Failed to read response body: {}", e)))?
        {
            if bytes.len() + chunk.len() > MAX_META_SIZE {
                return Err(SyncError::Fetch(format!(
                    "Downloaded content too large: over {} bytes",
                    MAX_META_SIZE
                )));
            }
            bytes.extend_from_slice(&chunk);
        }
        let body = String::from_utf8(bytes)
            .map_err(|e| SyncError::Decode(format!("Response is not UTF-8: {}", e)))?;
        debug!("Received {} bytes of metadata", body.len());

        parse_meta(&body, &self.fields)
    }
}

/// Extract and concatenate the named string-list fields of a JSON object.
pub fn parse_meta(body: &str, fields: &[String]) -> Result<Vec<String>, SyncError> {
    let doc: HashMap<String, serde_json::Value> =
        serde_json::from_str(body).map_err(|e| SyncError::Decode(e.to_string()))?;

    let mut ranges = Vec::new();
    for field in fields {
        let value = doc
            .get(field)
            .cloned()
            .ok_or_else(|| SyncError::Decode(format!("missing field '{}'", field)))?;
        let list: Vec<String> = serde_json::from_value(value)
            .map_err(|e| SyncError::Decode(format!("field '{}': {}", field, e)))?;
        debug!("Field '{}' has {} entries", field, list.len());
        ranges.extend(list);
    }

    Ok(ranges)
}
