//! Lossless to MP3 conversion through an external ffmpeg process.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use async_trait::async_trait;
use tracing::{debug, warn};

use super::DownloadError;

/// Common ffmpeg installation paths, tried after the configured binary
const FFMPEG_PATHS: &[&str] = &[
    "ffmpeg",
    "/usr/bin/ffmpeg",
    "/usr/local/bin/ffmpeg",
    "/opt/homebrew/bin/ffmpeg",
    "C:\\ffmpeg\\bin\\ffmpeg.exe",
];

/// Transcodes one file into another.
#[async_trait]
pub trait Encoder: Send + Sync {
    /// Write `output` from `input`. Must leave `input` untouched.
    async fn transcode(&self, input: &Path, output: &Path) -> Result<(), DownloadError>;
}

/// Find a working ffmpeg, checking the configured path first.
pub fn find_ffmpeg(configured: Option<&Path>) -> Option<PathBuf> {
    configured
        .map(Path::to_path_buf)
        .into_iter()
        .chain(FFMPEG_PATHS.iter().map(PathBuf::from))
        .find(|path| {
            Command::new(path)
                .arg("-version")
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .map(|s| s.success())
                .unwrap_or(false)
        })
}

/// Check if ffmpeg is available on the system
pub fn is_ffmpeg_available(configured: Option<&Path>) -> bool {
    find_ffmpeg(configured).is_some()
}

/// ffmpeg-backed MP3 encoder (libmp3lame, VBR quality 0).
#[derive(Debug, Clone)]
pub struct FfmpegEncoder {
    binary: PathBuf,
}

impl FfmpegEncoder {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Use the discovered binary, or plain `ffmpeg` so a missing encoder
    /// surfaces as a conversion error at the point of use.
    pub fn discover(configured: Option<&Path>) -> Self {
        let binary = find_ffmpeg(configured).unwrap_or_else(|| {
            warn!(target: "download", "ffmpeg not found; MP3 conversion will fail");
            PathBuf::from("ffmpeg")
        });
        Self::new(binary)
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }
}

#[async_trait]
impl Encoder for FfmpegEncoder {
    async fn transcode(&self, input: &Path, output: &Path) -> Result<(), DownloadError> {
        debug!(target: "download", input = %input.display(), output = %output.display(), "Running ffmpeg");

        let result = tokio::process::Command::new(&self.binary)
            .arg("-y")
            .arg("-i")
            .arg(input)
            .args(["-codec:a", "libmp3lame", "-q:a", "0"])
            .arg(output)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| DownloadError::Conversion(format!("Failed to run ffmpeg: {}", e)))?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(DownloadError::Conversion(stderr.trim().to_string()));
        }
        Ok(())
    }
}

/// Transcode and delete the input on success. On failure the input stays.
pub async fn transcode_and_remove(
    encoder: &dyn Encoder,
    input: &Path,
    output: &Path,
) -> Result<(), DownloadError> {
    encoder.transcode(input, output).await?;

    if let Err(e) = tokio::fs::remove_file(input).await {
        warn!(target: "download", path = %input.display(), error = %e, "Could not remove converted source");
    }
    Ok(())
}
