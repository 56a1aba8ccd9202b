use crate::error::FetchError;
use crate::types::{Zone, ZoneCatalog, ZoneFeature};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

/// Backend the explorer reads zones from.
#[async_trait]
pub trait ZoneSource: Send + Sync {
    /// Zone attributes without geometry.
    async fn fetch_zone(&self, code: &str) -> Result<Zone, FetchError>;

    /// Geometry plus attributes, including the neighbour list.
    async fn fetch_feature(&self, code: &str) -> Result<ZoneFeature, FetchError>;

    /// Search-assist list.
    async fn fetch_catalog(&self) -> Result<ZoneCatalog, FetchError>;
}

/// Reads the static API layout written by `generate`.
#[derive(Debug, Clone)]
pub struct HttpZoneSource {
    client: Client,
    base_url: String,
}

impl HttpZoneSource {
    /// Client whose requests give up after `timeout`, so every fetch ends in an answer or
    /// an error.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, base_url))
    }

    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    pub fn zone_path(code: &str) -> String {
        format!("/api/{code}.json")
    }

    pub fn feature_path(code: &str) -> String {
        format!("/api/geo/{code}.geojson")
    }

    pub const CATALOG_PATH: &'static str = "/api/zones.json";

    async fn get_text(&self, path: &str) -> Result<String, FetchError> {
        let response = self.client.get(format!("{}{}", self.base_url, path)).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                path: path.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response.text().await?)
    }
}

#[async_trait]
impl ZoneSource for HttpZoneSource {
    async fn fetch_zone(&self, code: &str) -> Result<Zone, FetchError> {
        let body = self.get_text(&Self::zone_path(code)).await?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn fetch_feature(&self, code: &str) -> Result<ZoneFeature, FetchError> {
        let body = self.get_text(&Self::feature_path(code)).await?;
        let feature: geojson::Feature = serde_json::from_str(&body)?;
        ZoneFeature::try_from(feature)
    }

    async fn fetch_catalog(&self) -> Result<ZoneCatalog, FetchError> {
        let body = self.get_text(Self::CATALOG_PATH).await?;
        Ok(serde_json::from_str(&body)?)
    }
}
