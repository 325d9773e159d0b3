//! Catalog HTTP client
//!
//! Talks to the catalog proxy that fronts search, track and album lookups.
//! Track and search requests go to the API host; album lookups are served
//! by a separate host.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use super::{CatalogApi, CatalogError, QualityTier, ResolvedSource, adapter, dto};
use crate::config::CatalogConfig;
use crate::model::{Album, AlbumDetail, Track};

/// Catalog API client
pub struct CatalogClient {
    http_client: reqwest::Client,
    api_base_url: String,
    album_base_url: String,
}

impl CatalogClient {
    /// Create a client from the catalog section of the config.
    pub fn new(config: &CatalogConfig) -> Result<Self, CatalogError> {
        let http_client = reqwest::Client::builder()
            .gzip(true)
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!(
                env!("CARGO_PKG_NAME"),
                "/",
                env!("CARGO_PKG_VERSION")
            ))
            .build()
            .map_err(|e| CatalogError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            api_base_url: config.api_base_url.trim_end_matches('/').to_string(),
            album_base_url: config.album_base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Search tracks by free text.
    pub async fn search_tracks(&self, query: &str) -> Result<Vec<Track>, CatalogError> {
        let url = format!("{}/search/?s={}", self.api_base_url, urlencoding::encode(query));
        let page: dto::TrackSearchResponse = self.get_json(&url).await?;
        Ok(page.items)
    }

    /// Search albums by free text.
    pub async fn search_albums(&self, query: &str) -> Result<Vec<Album>, CatalogError> {
        let url = format!("{}/search/?al={}", self.api_base_url, urlencoding::encode(query));
        let response: dto::AlbumSearchResponse = self.get_json(&url).await?;
        Ok(response.albums.items)
    }

    /// Fetch and normalize the track detail for one quality tier.
    pub async fn track_detail(
        &self,
        track_id: u64,
        quality: Option<QualityTier>,
    ) -> Result<ResolvedSource, CatalogError> {
        let url = track_detail_url(&self.api_base_url, track_id, quality);
        let value: Value = self.get_json(&url).await.map_err(|e| match (e, quality) {
            (CatalogError::Http { status, .. }, Some(tier)) if status != 404 => {
                CatalogError::QualityUnavailable(tier)
            }
            (e, _) => e,
        })?;
        adapter::to_resolved_source(value, quality)
    }

    /// Fetch an album with its track list.
    pub async fn album_detail(&self, album_id: u64) -> Result<AlbumDetail, CatalogError> {
        let url = format!("{}/album/?id={}", self.album_base_url, album_id);
        let value: Value = self.get_json(&url).await?;
        adapter::to_album_detail(value)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, CatalogError> {
        tracing::debug!(target: "catalog", %url, "GET");
        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(|e| CatalogError::Network(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(CatalogError::NotFound);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CatalogError::Http {
                status: status.as_u16(),
                message: body.chars().take(200).collect(),
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|e| CatalogError::Parse(e.to_string()))
    }
}

fn track_detail_url(base: &str, track_id: u64, quality: Option<QualityTier>) -> String {
    match quality {
        Some(tier) => format!("{}/track/?id={}&quality={}", base, track_id, tier.as_str()),
        None => format!("{}/track/?id={}", base, track_id),
    }
}

#[async_trait]
impl CatalogApi for CatalogClient {
    async fn resolve_track_source(
        &self,
        track_id: u64,
        quality: Option<QualityTier>,
    ) -> Result<ResolvedSource, CatalogError> {
        self.track_detail(track_id, quality).await
    }

    async fn search_tracks(&self, query: &str) -> Result<Vec<Track>, CatalogError> {
        CatalogClient::search_tracks(self, query).await
    }

    async fn search_albums(&self, query: &str) -> Result<Vec<Album>, CatalogError> {
        CatalogClient::search_albums(self, query).await
    }

    async fn album_detail(&self, album_id: u64) -> Result<AlbumDetail, CatalogError> {
        CatalogClient::album_detail(self, album_id).await
    }
}
