//! TOML configuration file loading
//!
//! Supports `~/.config/hark/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::{Error, Result};

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct HarkConfigFile {
    /// Capture and model settings
    #[serde(default)]
    pub audio: AudioFileConfig,

    /// Worker timeouts
    #[serde(default)]
    pub pipeline: PipelineFileConfig,

    /// Speech output settings
    #[serde(default)]
    pub tts: TtsFileConfig,

    /// Weather service
    #[serde(default)]
    pub weather: WeatherFileConfig,

    /// Calendar service
    #[serde(default)]
    pub calendar: CalendarFileConfig,
}

/// Audio capture configuration
#[derive(Debug, Default, Deserialize)]
pub struct AudioFileConfig {
    /// Recognition model directory
    pub model_path: Option<String>,

    /// Capture rate in Hz
    pub sample_rate: Option<u32>,

    /// Frames per block
    pub block_size: Option<usize>,

    /// Input device name (default device when unset)
    pub input_device: Option<String>,
}

/// Pipeline configuration
#[derive(Debug, Default, Deserialize)]
pub struct PipelineFileConfig {
    pub startup_timeout_secs: Option<u64>,
    pub stop_timeout_ms: Option<u64>,
}

/// Speech output configuration
#[derive(Debug, Default, Deserialize)]
pub struct TtsFileConfig {
    /// Backend preference order (e.g. `["espeak", "spd-say"]`)
    pub backends: Option<Vec<String>>,

    /// Preferred voice name
    pub voice: Option<String>,

    /// Preferred language code
    pub language: Option<String>,

    /// Words per minute
    pub rate: Option<u32>,

    pub volume: Option<u32>,

    /// Ask which backend to use at startup
    pub prompt: Option<bool>,
}

/// Weather service configuration
#[derive(Debug, Default, Deserialize)]
pub struct WeatherFileConfig {
    pub base_url: Option<String>,
    pub default_location: Option<String>,
}

/// Calendar service configuration
#[derive(Debug, Default, Deserialize)]
pub struct CalendarFileConfig {
    pub base_url: Option<String>,
}

/// Load the TOML config file from the standard path
///
/// Returns `HarkConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> HarkConfigFile {
    let Some(path) = config_file_path() else {
        return HarkConfigFile::default();
    };

    if !path.exists() {
        return HarkConfigFile::default();
    }

    match load_config_file_from(&path) {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to load config file, using defaults"
            );
            HarkConfigFile::default()
        }
    }
}

/// Load a config file the user named explicitly
///
/// # Errors
///
/// Returns [`Error::Config`] if the file can't be read or parsed
pub fn load_config_file_from(path: &Path) -> Result<HarkConfigFile> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("failed to read {}: {e}", path.display())))?;
    let config = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("failed to parse {}: {e}", path.display())))?;
    tracing::info!(path = %path.display(), "loaded config file");
    Ok(config)
}

/// Return the config file path: `~/.config/hark/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("hark").join("config.toml"))
}
