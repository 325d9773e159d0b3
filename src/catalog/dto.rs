//! Catalog API Data Transfer Objects
//!
//! These types match what the catalog API returns. They never leave the
//! catalog module: the adapter converts them into domain types.
//!
//! The track endpoint has answered in two shapes over time:
//!
//! ```json
//! { "track": { ... }, "manifest": { "trackId": 1, "audioQuality": "LOSSLESS",
//!   "manifest": "<base64>", "OriginalTrackUrl": "https://..." } }
//! ```
//!
//! and the older positional array:
//!
//! ```json
//! [ { ...track... }, { "trackId": 1, "audioQuality": "LOSSLESS", "manifest": "..." },
//!   { "OriginalTrackUrl": "https://..." } ]
//! ```

use serde::{Deserialize, Serialize};

use crate::model::{Album, Artist, Track};

/// Playback manifest block of a track detail response
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    #[serde(default)]
    pub track_id: Option<u64>,
    #[serde(default)]
    pub audio_quality: Option<String>,
    /// Opaque encoded manifest
    #[serde(default)]
    pub manifest: Option<String>,
    #[serde(rename = "OriginalTrackUrl", default)]
    pub original_track_url: Option<String>,
}

/// Current object-shaped track detail response
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TrackDetailObject {
    pub track: Option<Track>,
    pub manifest: Manifest,
}

/// Third element of the legacy array response
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LegacyUrlBlock {
    #[serde(rename = "OriginalTrackUrl")]
    pub original_track_url: Option<String>,
}

/// Paged list wrapper used by search endpoints
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    #[serde(default)]
    pub limit: u32,
    #[serde(default)]
    pub offset: u32,
    #[serde(default)]
    pub total_number_of_items: u32,
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
}

/// `/search/?s=` response
pub type TrackSearchResponse = Page<Track>;

/// `/search/?al=` response
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AlbumSearchResponse {
    pub albums: Page<Album>,
    #[serde(default)]
    pub artists: Option<Page<Artist>>,
}

/// Album track list entry: either wrapped in `{ "item": ... }` or bare.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum AlbumItem {
    Wrapped {
        item: Track,
        #[serde(rename = "type", default)]
        kind: Option<String>,
    },
    Bare(Track),
}

impl AlbumItem {
    pub fn into_track(self) -> Track {
        match self {
            AlbumItem::Wrapped { item, .. } => item,
            AlbumItem::Bare(track) => track,
        }
    }
}

/// Object-shaped `/album/?id=` response
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AlbumDetailObject {
    pub album: Album,
    pub tracks: Page<AlbumItem>,
}
