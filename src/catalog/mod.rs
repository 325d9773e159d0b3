//! Remote catalog access.
//!
//! The catalog resolves tracks to playable source URLs at a requested
//! quality tier and serves search and album listings.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐     ┌──────────────┐     ┌──────────────┐
//! │  Catalog API │ ──► │     DTOs     │ ──► │   Adapter    │ ──► domain types
//! │  (reqwest)   │     │  (serde)     │     │ (shape-typed)│
//! └──────────────┘     └──────────────┘     └──────────────┘
//! ```
//!
//! Callers depend on [`CatalogApi`] so tests can substitute
//! [`mocks::MockCatalog`].

pub mod adapter;
pub mod client;
pub mod dto;
pub mod quality;

use async_trait::async_trait;

use crate::model::{Album, AlbumDetail, Track};

pub use client::CatalogClient;
pub use quality::{QualityTier, fallback_chain, resolve_with_fallback};

/// Errors returned by catalog lookups.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CatalogError {
    #[error("Not found in catalog")]
    NotFound,

    #[error("Network error: {0}")]
    Network(String),

    #[error("Catalog returned HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Quality {0} is not available for this track")]
    QualityUnavailable(QualityTier),

    #[error("Failed to parse response: {0}")]
    Parse(String),

    #[error("Response carried no playable URL")]
    MissingUrl,

    #[error("No playable source for track {track_id}: {last_error}")]
    SourceUnavailable { track_id: u64, last_error: String },
}

/// Decoded manifest details accompanying a resolved source.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ManifestInfo {
    pub track_id: Option<u64>,
    /// Tier the catalog actually served
    pub audio_quality: Option<QualityTier>,
    /// Opaque encoded manifest, kept for diagnostics
    pub encoded: Option<String>,
}

/// A playable/downloadable source for one track.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedSource {
    pub url: String,
    /// Tier that was requested for this attempt (`None` = catalog default)
    pub quality: Option<QualityTier>,
    pub manifest: ManifestInfo,
    /// Track metadata when the response included it
    pub track: Option<Track>,
}

/// Catalog operations used by the rest of the crate.
#[async_trait]
pub trait CatalogApi: Send + Sync {
    /// Resolve one track at one tier. No fallback happens here; see
    /// [`resolve_with_fallback`].
    async fn resolve_track_source(
        &self,
        track_id: u64,
        quality: Option<QualityTier>,
    ) -> Result<ResolvedSource, CatalogError>;

    /// Free-text track search.
    async fn search_tracks(&self, query: &str) -> Result<Vec<Track>, CatalogError>;

    /// Free-text album search.
    async fn search_albums(&self, query: &str) -> Result<Vec<Album>, CatalogError>;

    /// Album with its ordered track list.
    async fn album_detail(&self, album_id: u64) -> Result<AlbumDetail, CatalogError>;
}
