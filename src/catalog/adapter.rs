//! Adapter layer: convert catalog DTOs to domain types.
//!
//! Track detail responses are normalized by shape. [`ResponseShape`] is the
//! explicit discriminant (the JSON top-level kind), and each shape has one
//! normalization function returning a typed result.

use serde_json::Value;

use super::dto;
use super::{CatalogError, ManifestInfo, ResolvedSource, QualityTier};
use crate::model::{Album, AlbumDetail};

/// Known track-detail response shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseShape {
    /// `{ "track": ..., "manifest": ... }`
    Object,
    /// `[track, playbackInfo, { "OriginalTrackUrl": ... }]`
    LegacyArray,
}

impl ResponseShape {
    /// Pick the shape from the top-level JSON kind.
    pub fn detect(value: &Value) -> Result<Self, CatalogError> {
        match value {
            Value::Object(_) => Ok(ResponseShape::Object),
            Value::Array(_) => Ok(ResponseShape::LegacyArray),
            other => Err(CatalogError::Parse(format!(
                "unexpected track detail payload: {}",
                json_kind(other)
            ))),
        }
    }
}

/// Normalize a raw track-detail response into a playable source.
pub fn to_resolved_source(
    value: Value,
    requested: Option<QualityTier>,
) -> Result<ResolvedSource, CatalogError> {
    match ResponseShape::detect(&value)? {
        ResponseShape::Object => from_object(value, requested),
        ResponseShape::LegacyArray => from_legacy_array(value, requested),
    }
}

fn from_object(value: Value, requested: Option<QualityTier>) -> Result<ResolvedSource, CatalogError> {
    let detail: dto::TrackDetailObject =
        serde_json::from_value(value).map_err(|e| CatalogError::Parse(e.to_string()))?;

    let url = detail
        .manifest
        .original_track_url
        .clone()
        .filter(|u| !u.is_empty())
        .ok_or(CatalogError::MissingUrl)?;

    Ok(ResolvedSource {
        url,
        quality: requested,
        manifest: manifest_info(&detail.manifest),
        track: detail.track,
    })
}

fn from_legacy_array(
    value: Value,
    requested: Option<QualityTier>,
) -> Result<ResolvedSource, CatalogError> {
    let Value::Array(mut items) = value else {
        return Err(CatalogError::Parse("expected array".to_string()));
    };
    if items.len() < 3 {
        return Err(CatalogError::Parse(format!(
            "legacy track detail has {} elements, expected 3",
            items.len()
        )));
    }

    let url_block: dto::LegacyUrlBlock = serde_json::from_value(items[2].take())
        .map_err(|e| CatalogError::Parse(e.to_string()))?;
    let url = url_block
        .original_track_url
        .filter(|u| !u.is_empty())
        .ok_or(CatalogError::MissingUrl)?;

    // The first two elements are informational; tolerate them being absent or odd.
    let manifest: dto::Manifest = serde_json::from_value(items[1].take()).unwrap_or_default();
    let track = serde_json::from_value(items[0].take()).ok();

    Ok(ResolvedSource {
        url,
        quality: requested,
        manifest: manifest_info(&manifest),
        track,
    })
}

fn manifest_info(manifest: &dto::Manifest) -> ManifestInfo {
    ManifestInfo {
        track_id: manifest.track_id,
        audio_quality: manifest
            .audio_quality
            .as_deref()
            .and_then(QualityTier::parse),
        encoded: manifest.manifest.clone(),
    }
}

/// Normalize an album detail response (object or `[album, page]` array).
pub fn to_album_detail(value: Value) -> Result<AlbumDetail, CatalogError> {
    match value {
        Value::Object(_) => {
            let detail: dto::AlbumDetailObject =
                serde_json::from_value(value).map_err(|e| CatalogError::Parse(e.to_string()))?;
            Ok(AlbumDetail {
                album: detail.album,
                tracks: detail.tracks.items.into_iter().map(dto::AlbumItem::into_track).collect(),
            })
        }
        Value::Array(mut items) if items.len() >= 2 => {
            let album: Album = serde_json::from_value(items[0].take())
                .map_err(|e| CatalogError::Parse(e.to_string()))?;
            let page: dto::Page<dto::AlbumItem> = serde_json::from_value(items[1].take())
                .map_err(|e| CatalogError::Parse(e.to_string()))?;
            Ok(AlbumDetail {
                album,
                tracks: page.items.into_iter().map(dto::AlbumItem::into_track).collect(),
            })
        }
        other => Err(CatalogError::Parse(format!(
            "unexpected album detail payload: {}",
            json_kind(&other)
        ))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
