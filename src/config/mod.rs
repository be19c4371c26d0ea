//! Configuration management for hark
//!
//! Layered: built-in defaults, then the TOML file, then `HARK_*` environment
//! variables, then command-line overrides.

pub mod file;

use std::path::PathBuf;
use std::time::Duration;

use crate::voice::{BLOCK_SIZE, BackendKind, SAMPLE_RATE, SpeechOptions, VoicePreference, WorkerConfig};
use crate::{Error, Result};

use file::HarkConfigFile;

/// Location used when a weather question names no place
pub const DEFAULT_LOCATION: &str = "Marburg";

/// hark configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub audio: AudioConfig,
    pub pipeline: PipelineConfig,
    pub tts: TtsConfig,
    pub weather: WeatherConfig,
    pub calendar: CalendarConfig,
}

/// Audio capture configuration
#[derive(Debug, Clone)]
pub struct AudioConfig {
    /// Recognition model directory
    pub model_path: PathBuf,

    /// Capture rate in Hz
    pub sample_rate: u32,

    /// Frames per block
    pub block_size: usize,

    /// Input device name (default device when `None`)
    pub input_device: Option<String>,
}

/// Worker timeouts
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub startup_timeout: Duration,
    pub stop_timeout: Duration,
}

/// Speech output configuration
#[derive(Debug, Clone)]
pub struct TtsConfig {
    /// Backend preference order
    pub backends: Vec<BackendKind>,
    pub voice: Option<String>,
    pub language: Option<String>,
    pub rate: u32,
    pub volume: u32,
    /// Ask which backend to try first
    pub prompt: bool,
}

/// Weather service configuration
#[derive(Debug, Clone)]
pub struct WeatherConfig {
    /// Service URL (weather questions get an apology when unset)
    pub base_url: Option<String>,
    pub default_location: String,
}

/// Calendar service configuration
#[derive(Debug, Clone, Default)]
pub struct CalendarConfig {
    pub base_url: Option<String>,
}

/// Command-line overrides, applied last
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    /// Explicit config file; parse failures are errors
    pub config_path: Option<PathBuf>,
    pub model_path: Option<PathBuf>,
    pub input_device: Option<String>,
    pub tts_backends: Option<Vec<String>>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            audio: AudioConfig {
                model_path: default_model_path(),
                sample_rate: SAMPLE_RATE,
                block_size: BLOCK_SIZE,
                input_device: None,
            },
            pipeline: PipelineConfig {
                startup_timeout: Duration::from_secs(30),
                stop_timeout: Duration::from_millis(2000),
            },
            tts: TtsConfig {
                backends: vec![BackendKind::Espeak, BackendKind::SpeechDispatcher],
                voice: None,
                language: Some("en".to_string()),
                rate: 180,
                volume: 120,
                prompt: false,
            },
            weather: WeatherConfig {
                base_url: None,
                default_location: DEFAULT_LOCATION.to_string(),
            },
            calendar: CalendarConfig::default(),
        }
    }
}

/// Default model location: `<data_dir>/hark/models/vosk-model`
#[must_use]
pub fn default_model_path() -> PathBuf {
    directories::BaseDirs::new().map_or_else(
        || PathBuf::from("models").join("vosk-model"),
        |d| d.data_dir().join("hark").join("models").join("vosk-model"),
    )
}

/// Parse backend names into a preference list
///
/// # Errors
///
/// Returns [`Error::Config`] on an unknown name or an empty list
pub fn parse_backends<S: AsRef<str>>(names: &[S]) -> Result<Vec<BackendKind>> {
    let backends = names
        .iter()
        .map(|n| n.as_ref())
        .filter(|n| !n.trim().is_empty())
        .map(str::parse)
        .collect::<Result<Vec<BackendKind>>>()?;

    if backends.is_empty() {
        return Err(Error::Config("TTS backend list is empty".to_string()));
    }
    Ok(backends)
}

impl Config {
    /// Load configuration from all layers
    ///
    /// # Errors
    ///
    /// Returns error if an explicit config file is invalid or a setting is
    /// out of range
    pub fn load(overrides: &Overrides) -> Result<Self> {
        let fc = match &overrides.config_path {
            Some(path) => file::load_config_file_from(path)?,
            None => file::load_config_file(),
        };

        let mut config = Self::from_file(fc)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        config.apply_overrides(overrides)?;
        config.validate()?;

        tracing::debug!(
            model = %config.audio.model_path.display(),
            backends = ?config.tts.backends,
            "configuration loaded"
        );
        Ok(config)
    }

    /// Defaults overlaid with a parsed config file
    ///
    /// # Errors
    ///
    /// Returns error if the file names an unknown TTS backend
    pub fn from_file(fc: HarkConfigFile) -> Result<Self> {
        let mut config = Self::default();

        if let Some(path) = fc.audio.model_path {
            config.audio.model_path = PathBuf::from(path);
        }
        if let Some(rate) = fc.audio.sample_rate {
            config.audio.sample_rate = rate;
        }
        if let Some(size) = fc.audio.block_size {
            config.audio.block_size = size;
        }
        config.audio.input_device = fc.audio.input_device;

        if let Some(secs) = fc.pipeline.startup_timeout_secs {
            config.pipeline.startup_timeout = Duration::from_secs(secs);
        }
        if let Some(ms) = fc.pipeline.stop_timeout_ms {
            config.pipeline.stop_timeout = Duration::from_millis(ms);
        }

        if let Some(names) = fc.tts.backends {
            config.tts.backends = parse_backends(&names)?;
        }
        config.tts.voice = fc.tts.voice;
        if fc.tts.language.is_some() {
            config.tts.language = fc.tts.language;
        }
        config.tts.rate = fc.tts.rate.unwrap_or(config.tts.rate);
        config.tts.volume = fc.tts.volume.unwrap_or(config.tts.volume);
        config.tts.prompt = fc.tts.prompt.unwrap_or(false);

        config.weather.base_url = fc.weather.base_url;
        if let Some(location) = fc.weather.default_location {
            config.weather.default_location = location;
        }
        config.calendar.base_url = fc.calendar.base_url;

        Ok(config)
    }

    /// Apply `HARK_*` environment variables through `lookup`
    ///
    /// # Errors
    ///
    /// Returns error if `HARK_TTS_BACKENDS` names an unknown backend
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(path) = lookup("HARK_MODEL_PATH") {
            self.audio.model_path = PathBuf::from(path);
        }
        if let Some(device) = lookup("HARK_INPUT_DEVICE") {
            self.audio.input_device = Some(device);
        }
        if let Some(list) = lookup("HARK_TTS_BACKENDS") {
            let names: Vec<&str> = list.split(',').collect();
            self.tts.backends = parse_backends(&names)?;
        }
        if let Some(voice) = lookup("HARK_TTS_VOICE") {
            self.tts.voice = Some(voice);
        }
        if let Some(url) = lookup("HARK_WEATHER_URL") {
            self.weather.base_url = Some(url);
        }
        if let Some(url) = lookup("HARK_CALENDAR_URL") {
            self.calendar.base_url = Some(url);
        }
        Ok(())
    }

    /// Apply command-line overrides
    ///
    /// # Errors
    ///
    /// Returns error if `--tts` names an unknown backend
    pub fn apply_overrides(&mut self, overrides: &Overrides) -> Result<()> {
        if let Some(path) = &overrides.model_path {
            self.audio.model_path.clone_from(path);
        }
        if let Some(device) = &overrides.input_device {
            self.audio.input_device = Some(device.clone());
        }
        if let Some(names) = &overrides.tts_backends {
            self.tts.backends = parse_backends(names)?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.audio.sample_rate == 0 {
            return Err(Error::Config("sample_rate must be positive".to_string()));
        }
        if self.audio.block_size == 0 {
            return Err(Error::Config("block_size must be positive".to_string()));
        }
        if self.pipeline.startup_timeout.is_zero() {
            return Err(Error::Config(
                "startup_timeout_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Worker settings derived from this config
    #[must_use]
    pub fn worker_config(&self) -> WorkerConfig {
        WorkerConfig {
            model_path: self.audio.model_path.clone(),
            sample_rate: self.audio.sample_rate,
            startup_timeout: self.pipeline.startup_timeout,
            stop_timeout: self.pipeline.stop_timeout,
        }
    }

    /// Synthesis settings derived from this config
    #[must_use]
    pub fn speech_options(&self) -> SpeechOptions {
        SpeechOptions {
            voice: VoicePreference {
                name: self.tts.voice.clone(),
                language: self.tts.language.clone(),
            },
            rate: self.tts.rate,
            volume: self.tts.volume,
        }
    }
}
