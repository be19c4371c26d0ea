//! Error types for hark

use std::time::Duration;

use thiserror::Error;

/// Result type alias for hark operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the assistant
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Audio device or stream error
    #[error("audio error: {0}")]
    Audio(String),

    /// Speech recognition model could not be loaded
    #[error("model error: {0}")]
    Model(String),

    /// Text-to-speech error
    #[error("TTS error: {0}")]
    Tts(String),

    /// Capture/recognition pipeline error
    #[error("pipeline error: {0}")]
    Pipeline(String),

    /// Pipeline did not come up within the startup budget
    #[error("startup timed out after {}s", .0.as_secs())]
    StartupTimeout(Duration),

    /// Remote API answered with a non-success status
    #[error("API error {status}: {body}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Raw response body
        body: String,
    },

    /// Calendar service reported a failure inside a successful response
    #[error("calendar error: {0}")]
    Calendar(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl Error {
    /// Whether this error aborts the session before it starts listening
    #[must_use]
    pub const fn is_fatal_at_startup(&self) -> bool {
        matches!(
            self,
            Self::Config(_) | Self::Audio(_) | Self::Model(_) | Self::Tts(_) | Self::StartupTimeout(_)
        )
    }
}
