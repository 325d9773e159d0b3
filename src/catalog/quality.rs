//! Quality tiers and the source-resolution fallback chain.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{CatalogApi, CatalogError, ResolvedSource};

/// Ordinal fidelity classification used by the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QualityTier {
    /// Compressed, low bitrate
    Normal,
    /// Compressed, high bitrate
    High,
    /// CD-quality lossless
    Lossless,
    /// Lossless above CD resolution
    HiResLossless,
}

impl QualityTier {
    /// Wire name used in catalog query strings.
    pub fn as_str(self) -> &'static str {
        match self {
            QualityTier::Normal => "NORMAL",
            QualityTier::High => "HIGH",
            QualityTier::Lossless => "LOSSLESS",
            QualityTier::HiResLossless => "HIRES_LOSSLESS",
        }
    }

    /// Parse a catalog quality tag. Unknown tags yield `None`.
    pub fn parse(tag: &str) -> Option<Self> {
        match tag {
            "NORMAL" => Some(QualityTier::Normal),
            "HIGH" => Some(QualityTier::High),
            "LOSSLESS" => Some(QualityTier::Lossless),
            "HIRES_LOSSLESS" => Some(QualityTier::HiResLossless),
            _ => None,
        }
    }

    /// Best tier advertised by a track's quality tag and media tags.
    pub fn best_for(audio_quality: &str, tags: &[String]) -> Self {
        let has_tag = |name: &str| tags.iter().any(|t| t == name);
        if has_tag("HIRES_LOSSLESS") {
            QualityTier::HiResLossless
        } else if audio_quality == "LOSSLESS" || has_tag("LOSSLESS") {
            QualityTier::Lossless
        } else if audio_quality == "HIGH" {
            QualityTier::High
        } else {
            QualityTier::Normal
        }
    }
}

impl std::fmt::Display for QualityTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Explicit tiers tried after the requested and unspecified attempts.
const DESCENDING_TIERS: [QualityTier; 3] =
    [QualityTier::Lossless, QualityTier::High, QualityTier::Normal];

/// Ordered list of attempts for a requested tier.
///
/// `None` means "let the catalog pick". A tier already present in the chain
/// is not attempted twice.
pub fn fallback_chain(requested: QualityTier) -> Vec<Option<QualityTier>> {
    let mut chain = vec![Some(requested), None];
    for tier in DESCENDING_TIERS {
        if !chain.contains(&Some(tier)) {
            chain.push(Some(tier));
        }
    }
    chain
}

/// Resolve a playable source, walking the fallback chain until one succeeds.
///
/// Returns [`CatalogError::SourceUnavailable`] once every tier has failed.
pub async fn resolve_with_fallback<C>(
    catalog: &C,
    track_id: u64,
    requested: QualityTier,
) -> Result<ResolvedSource, CatalogError>
where
    C: CatalogApi + ?Sized,
{
    let chain = fallback_chain(requested);
    let mut last_error = None;

    for tier in &chain {
        match catalog.resolve_track_source(track_id, *tier).await {
            Ok(source) => {
                debug!(target: "catalog", track_id, tier = ?tier, "Resolved playable source");
                return Ok(source);
            }
            Err(e) => {
                debug!(target: "catalog", track_id, tier = ?tier, error = %e, "Tier failed, falling back");
                last_error = Some(e);
            }
        }
    }

    warn!(target: "catalog", track_id, attempts = chain.len(), "Every quality tier failed");
    Err(CatalogError::SourceUnavailable {
        track_id,
        last_error: last_error.map(|e| e.to_string()).unwrap_or_default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::mocks::MockCatalog;

    #[test]
    fn test_best_for_prefers_hires_tag() {
        let tags = vec!["LOSSLESS".to_string(), "HIRES_LOSSLESS".to_string()];
        assert_eq!(QualityTier::best_for("LOSSLESS", &tags), QualityTier::HiResLossless);
        assert_eq!(QualityTier::best_for("LOSSLESS", &[]), QualityTier::Lossless);
        assert_eq!(QualityTier::best_for("HIGH", &[]), QualityTier::High);
        assert_eq!(QualityTier::best_for("LOW", &[]), QualityTier::Normal);
    }

    #[test]
    fn test_fallback_chain_order() {
        assert_eq!(
            fallback_chain(QualityTier::HiResLossless),
            vec![
                Some(QualityTier::HiResLossless),
                None,
                Some(QualityTier::Lossless),
                Some(QualityTier::High),
                Some(QualityTier::Normal),
            ]
        );
    }

    #[test]
    fn test_fallback_chain_skips_duplicate_tier() {
        assert_eq!(
            fallback_chain(QualityTier::Lossless),
            vec![
                Some(QualityTier::Lossless),
                None,
                Some(QualityTier::High),
                Some(QualityTier::Normal),
            ]
        );
    }

    #[tokio::test]
    async fn test_stops_at_first_successful_tier() {
        let catalog = MockCatalog::new()
            .failing_tier(Some(QualityTier::HiResLossless))
            .with_source(1, "https://cdn.example/1.flac");

        let source = resolve_with_fallback(&catalog, 1, QualityTier::HiResLossless)
            .await
            .unwrap();

        assert_eq!(source.quality, None);
        assert_eq!(source.url, "https://cdn.example/1.flac");
        // Requested tier, then the unspecified one; nothing lower.
        assert_eq!(catalog.attempts(), vec![Some(QualityTier::HiResLossless), None]);
    }

    #[tokio::test]
    async fn test_exhausted_chain_is_source_unavailable() {
        let catalog = MockCatalog::new();

        let result = resolve_with_fallback(&catalog, 5, QualityTier::High).await;

        assert!(matches!(
            result,
            Err(CatalogError::SourceUnavailable { track_id: 5, .. })
        ));
        // HIGH, unspecified, LOSSLESS, NORMAL
        assert_eq!(catalog.attempts().len(), 4);
    }
}
