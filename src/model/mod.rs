//! Core data models for the remote catalog.
//!
//! Defines the primary entities: [`Track`], [`Album`] and the artist/album
//! references embedded in them. The shapes mirror the catalog's camelCase
//! JSON so they can be deserialized directly; everything else in the crate
//! treats them as immutable once fetched.

use serde::{Deserialize, Serialize};

use crate::catalog::QualityTier;

/// An artist as referenced from a track or album.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtistRef {
    pub id: u64,
    pub name: String,
    /// Role of the artist on the release ("MAIN", "FEATURED", ...)
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub picture: Option<String>,
}

/// The album a track belongs to.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlbumRef {
    pub id: u64,
    pub title: String,
    /// Cover image UUID
    #[serde(default)]
    pub cover: String,
    #[serde(default)]
    pub vibrant_color: Option<String>,
}

/// Media tags advertised by the catalog (e.g. `LOSSLESS`, `HIRES_LOSSLESS`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaMetadata {
    #[serde(default)]
    pub tags: Vec<String>,
}

/// A single track in the remote catalog.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    pub id: u64,
    pub title: String,
    /// Duration in seconds
    #[serde(default)]
    pub duration: u32,
    /// Primary artist
    pub artist: ArtistRef,
    #[serde(default)]
    pub artists: Vec<ArtistRef>,
    pub album: AlbumRef,
    /// Catalog quality tag for the track ("LOSSLESS", "HIGH", ...)
    #[serde(default)]
    pub audio_quality: String,
    #[serde(default)]
    pub media_metadata: MediaMetadata,
    #[serde(default)]
    pub popularity: u32,
    #[serde(default)]
    pub explicit: bool,
    #[serde(default)]
    pub bpm: Option<u32>,
    #[serde(default)]
    pub copyright: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub isrc: String,
}

impl Track {
    /// Best quality tier this track advertises.
    pub fn best_quality(&self) -> QualityTier {
        QualityTier::best_for(&self.audio_quality, &self.media_metadata.tags)
    }

    /// Sanitized `"artist - title.ext"` filename for this track.
    pub fn filename(&self, extension: &str) -> String {
        crate::download::generate_filename(&self.artist.name, &self.title, extension)
    }

    /// "Artist - Title" for log lines and terminal output.
    pub fn display_name(&self) -> String {
        format!("{} - {}", self.artist.name, self.title)
    }
}

/// An album search result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Album {
    pub id: u64,
    pub title: String,
    #[serde(default)]
    pub duration: u32,
    #[serde(default)]
    pub cover: String,
    #[serde(default)]
    pub vibrant_color: Option<String>,
    #[serde(default)]
    pub artists: Vec<ArtistRef>,
    #[serde(default)]
    pub number_of_tracks: u32,
    #[serde(default)]
    pub release_date: String,
    #[serde(default)]
    pub audio_quality: String,
    #[serde(default)]
    pub media_metadata: MediaMetadata,
    #[serde(default)]
    pub popularity: u32,
    #[serde(default)]
    pub explicit: bool,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub upc: String,
}

/// An artist search result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artist {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub picture: Option<String>,
    #[serde(default)]
    pub popularity: u32,
    #[serde(default)]
    pub artist_types: Vec<String>,
    #[serde(default)]
    pub url: String,
}

/// An album together with its ordered track list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AlbumDetail {
    pub album: Album,
    pub tracks: Vec<Track>,
}
