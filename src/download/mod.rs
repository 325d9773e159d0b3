//! Download pipeline: transfer, convert, rename.
//!
//! ```text
//! source URL ──► temp "<unique>.flac" ──► ffmpeg (FLAC → MP3) ──► final file
//!                     │                        or
//!                     └──────────────────► rename ─────────────► final file
//! ```
//!
//! [`DownloadManager`] owns the registry of in-flight transfers and reports
//! progress keyed by the requested filename. The HTTP transport and the
//! encoder sit behind the [`Fetcher`] and [`Encoder`] traits.

pub mod convert;
pub mod fetch;
pub mod filename;
pub mod manager;

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use convert::{Encoder, FfmpegEncoder, find_ffmpeg, is_ffmpeg_available};
pub use fetch::{Fetcher, HttpFetcher};
pub use filename::{clean_folder_name, generate_filename, uniquify};
pub use manager::{DownloadManager, Reservation};

/// Output container the user wants on disk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    #[default]
    Flac,
    Mp3,
}

impl AudioFormat {
    pub fn extension(self) -> &'static str {
        match self {
            AudioFormat::Flac => "flac",
            AudioFormat::Mp3 => "mp3",
        }
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for AudioFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "flac" => Ok(AudioFormat::Flac),
            "mp3" => Ok(AudioFormat::Mp3),
            other => Err(format!("unknown format '{}' (expected flac or mp3)", other)),
        }
    }
}

/// Codec family of a source, guessed from its URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Lossless,
    Compressed,
}

/// Classify a source URL. Anything mentioning `.mp3` or ending in `mp3`
/// is compressed; everything else is assumed lossless.
pub fn classify_source(url: &str) -> SourceFormat {
    let lower = url.to_lowercase();
    if lower.contains(".mp3") || lower.ends_with("mp3") {
        SourceFormat::Compressed
    } else {
        SourceFormat::Lossless
    }
}

/// One download to perform.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadRequest {
    pub source_url: String,
    pub dest_dir: PathBuf,
    /// Name the job was created with; also the progress key
    pub requested_filename: String,
    pub preferred_format: AudioFormat,
}

/// Where a finished download ended up.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadOutcome {
    pub path: PathBuf,
    pub filename: String,
}

/// Which stage a progress event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Transferring,
    Converting,
}

/// Progress report for one in-flight download.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressEvent {
    /// Requested filename of the download
    pub key: String,
    /// 0 - 100
    pub percentage: u8,
    pub phase: Phase,
}

/// Download pipeline errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DownloadError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Filesystem error at {path}: {message}")]
    Filesystem { path: PathBuf, message: String },

    #[error("Conversion failed: {0}")]
    Conversion(String),

    #[error("Download cancelled")]
    Cancelled,

    #[error("A download for {0} is already in progress")]
    AlreadyInFlight(String),

    #[error("Could not resolve source: {0}")]
    Resolution(#[from] crate::catalog::CatalogError),
}

impl DownloadError {
    pub fn filesystem(path: impl Into<PathBuf>, err: impl fmt::Display) -> Self {
        Self::Filesystem {
            path: path.into(),
            message: err.to_string(),
        }
    }
}
