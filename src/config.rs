//! Configuration system using TOML files.
//!
//! Config is stored in the OS-standard config directory:
//! - Windows: %APPDATA%\music-courier\config.toml
//! - macOS: ~/Library/Application Support/music-courier/config.toml
//! - Linux: ~/.config/music-courier/config.toml
//!
//! The config file is human-readable and editable. Settings are loaded at
//! startup; command-line flags override them for a single invocation.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::catalog::QualityTier;
use crate::download::AudioFormat;

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Where and how tracks are saved
    pub download: DownloadConfig,

    /// Catalog endpoints
    pub catalog: CatalogConfig,

    /// Playback settings
    pub playback: PlaybackConfig,

    /// External encoder settings
    pub encoder: EncoderConfig,
}

/// Download settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    /// Default download directory
    pub directory: PathBuf,

    /// Output format for new downloads
    pub preferred_format: AudioFormat,

    /// Pause between album tracks, in milliseconds
    pub album_delay_ms: u64,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            directory: default_download_dir(),
            preferred_format: AudioFormat::Flac,
            album_delay_ms: 250,
        }
    }
}

/// Catalog endpoint settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Search and track detail host
    pub api_base_url: String,

    /// Album detail host
    pub album_base_url: String,

    /// Per-request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            api_base_url: "https://maus.qqdl.site".to_string(),
            album_base_url: "https://hund.qqdl.site".to_string(),
            timeout_secs: 30,
        }
    }
}

/// Playback settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Initial volume (0 - 100)
    pub volume: u8,

    /// Tier to request first; `None` uses each track's best advertised tier
    pub preferred_quality: Option<QualityTier>,

    /// Selected output device name (empty = system default)
    pub output_device: String,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            volume: 50,
            preferred_quality: None,
            output_device: String::new(),
        }
    }
}

/// Encoder settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderConfig {
    /// Explicit ffmpeg binary; searched on PATH when unset
    pub ffmpeg_path: Option<PathBuf>,
}

fn default_download_dir() -> PathBuf {
    dirs::download_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join("Downloads")))
        .unwrap_or_else(|| PathBuf::from("."))
        .join("music-courier")
}

// ============================================================================
// Config File Operations
// ============================================================================

/// Get the config directory path
pub fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("music-courier"))
}

/// Get the full path to the config file
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|d| d.join("config.toml"))
}

/// Load configuration from disk
///
/// Returns default config if file doesn't exist or can't be parsed.
/// Logs warnings but doesn't fail - we always return a usable config.
pub fn load() -> Config {
    let Some(path) = config_path() else {
        tracing::warn!("Could not determine config directory, using defaults");
        return Config::default();
    };
    load_from(&path)
}

/// Load configuration from an explicit path, falling back to defaults.
pub fn load_from(path: &Path) -> Config {
    if !path.exists() {
        tracing::info!("No config file found at {:?}, using defaults", path);
        return Config::default();
    }

    match std::fs::read_to_string(path) {
        Ok(contents) => match toml::from_str(&contents) {
            Ok(config) => {
                tracing::info!("Loaded config from {:?}", path);
                config
            }
            Err(e) => {
                tracing::error!("Failed to parse config file {:?}: {}", path, e);
                tracing::warn!("Using default configuration");
                Config::default()
            }
        },
        Err(e) => {
            tracing::error!("Failed to read config file {:?}: {}", path, e);
            Config::default()
        }
    }
}

/// Save configuration to the standard location
pub fn save(config: &Config) -> Result<(), ConfigError> {
    let path = config_path().ok_or(ConfigError::NoConfigDir)?;
    save_to(config, &path)
}

/// Save configuration to `path`, creating its directory if needed.
pub fn save_to(config: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|e| ConfigError::CreateDir(dir.to_path_buf(), e))?;
    }

    let contents = toml::to_string_pretty(config).map_err(ConfigError::Serialize)?;

    // Write atomically (write to temp, then rename)
    let temp_path = path.with_extension("toml.tmp");
    std::fs::write(&temp_path, &contents).map_err(|e| ConfigError::Write(temp_path.clone(), e))?;
    std::fs::rename(&temp_path, path)
        .map_err(|e| ConfigError::Rename(temp_path, path.to_path_buf(), e))?;

    tracing::info!("Saved config to {:?}", path);
    Ok(())
}

/// Save configuration off the async runtime
pub async fn save_async(config: Config) -> Result<(), ConfigError> {
    tokio::task::spawn_blocking(move || save(&config))
        .await
        .map_err(|e| ConfigError::TaskJoin(e.to_string()))?
}

// ============================================================================
// Error Types
// ============================================================================

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Failed to create config directory {0}: {1}")]
    CreateDir(PathBuf, std::io::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(toml::ser::Error),

    #[error("Failed to write config to {0}: {1}")]
    Write(PathBuf, std::io::Error),

    #[error("Failed to rename temp file {0} to {1}: {2}")]
    Rename(PathBuf, PathBuf, std::io::Error),

    #[error("Task join error: {0}")]
    TaskJoin(String),
}

// ============================================================================
// Tests
// ============================================================================
