//! Streaming speech recognition
//!
//! A [`Recognizer`] is fed capture blocks in arrival order and reports a
//! [`TranscriptEvent::Final`] once per utterance. Engines are produced by a
//! [`RecognizerLoader`] from a model directory; the offline Vosk engine lives
//! behind the `vosk` cargo feature.

use std::path::Path;
use std::sync::Arc;

use crate::voice::AudioBlock;
use crate::{Error, Result};

/// Outcome of feeding one block to a recognizer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranscriptEvent {
    /// Utterance still in progress (discarded by the pipeline)
    Partial,
    /// End of utterance with its transcript; never empty
    Final(String),
}

impl TranscriptEvent {
    /// Build a final event, degrading blank text to [`TranscriptEvent::Partial`]
    #[must_use]
    pub fn finalized(text: impl AsRef<str>) -> Self {
        let text = text.as_ref().trim();
        if text.is_empty() {
            Self::Partial
        } else {
            Self::Final(text.to_string())
        }
    }

    /// Transcript text, if final
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Partial => None,
            Self::Final(text) => Some(text),
        }
    }
}

/// A streaming recognition session
///
/// `feed` is total: a malformed or dropped block degrades the transcript but
/// never poisons the session.
pub trait Recognizer: Send {
    /// Accept the next block in capture order
    fn feed(&mut self, block: &AudioBlock) -> TranscriptEvent;
}

/// Loads a recognizer from a model directory
pub trait RecognizerLoader: Send + Sync {
    /// Load the model and open a session at `sample_rate`
    ///
    /// # Errors
    ///
    /// Returns error if the model is missing or cannot be loaded. The error
    /// is final for this loader call; retrying needs a new pipeline.
    fn load(&self, model_path: &Path, sample_rate: u32) -> Result<Box<dyn Recognizer>>;
}

impl<F> RecognizerLoader for F
where
    F: Fn(&Path, u32) -> Result<Box<dyn Recognizer>> + Send + Sync,
{
    fn load(&self, model_path: &Path, sample_rate: u32) -> Result<Box<dyn Recognizer>> {
        self(model_path, sample_rate)
    }
}

/// Ensure the model directory exists before handing it to an engine
///
/// # Errors
///
/// Returns [`Error::Model`] if the path is missing or not a directory
pub fn check_model_dir(path: &Path) -> Result<()> {
    if !path.exists() {
        return Err(Error::Model(format!(
            "model directory not found: {}",
            path.display()
        )));
    }
    if !path.is_dir() {
        return Err(Error::Model(format!(
            "model path is not a directory: {}",
            path.display()
        )));
    }
    Ok(())
}

/// The engine this build was compiled with
#[must_use]
pub fn default_loader() -> Arc<dyn RecognizerLoader> {
    #[cfg(feature = "vosk")]
    {
        Arc::new(vosk_engine::VoskLoader)
    }

    #[cfg(not(feature = "vosk"))]
    {
        Arc::new(UnavailableLoader)
    }
}

/// Placeholder used when no engine feature is enabled
#[cfg(not(feature = "vosk"))]
struct UnavailableLoader;

#[cfg(not(feature = "vosk"))]
impl RecognizerLoader for UnavailableLoader {
    fn load(&self, model_path: &Path, _sample_rate: u32) -> Result<Box<dyn Recognizer>> {
        check_model_dir(model_path)?;
        Err(Error::Model(
            "built without a speech recognition engine; rebuild with `--features vosk`".to_string(),
        ))
    }
}

#[cfg(feature = "vosk")]
pub use vosk_engine::{VoskLoader, VoskRecognizer};

#[cfg(feature = "vosk")]
mod vosk_engine {
    use std::path::Path;

    use vosk::{CompleteResult, DecodingState, Model, Recognizer as KaldiRecognizer};

    use super::{Recognizer, RecognizerLoader, TranscriptEvent, check_model_dir};
    use crate::voice::AudioBlock;
    use crate::{Error, Result};

    /// Loads Vosk models from disk
    #[derive(Debug, Clone, Copy, Default)]
    pub struct VoskLoader;

    impl RecognizerLoader for VoskLoader {
        fn load(&self, model_path: &Path, sample_rate: u32) -> Result<Box<dyn Recognizer>> {
            check_model_dir(model_path)?;

            let path = model_path.to_string_lossy().into_owned();
            tracing::info!(path = %path, "loading vosk model");

            let model = Model::new(path.as_str())
                .ok_or_else(|| Error::Model(format!("failed to load vosk model from {path}")))?;

            #[allow(clippy::cast_precision_loss)]
            let recognizer = KaldiRecognizer::new(&model, sample_rate as f32)
                .ok_or_else(|| Error::Model("failed to create vosk recognizer".to_string()))?;

            tracing::info!(sample_rate, "vosk recognizer ready");
            Ok(Box::new(VoskRecognizer { recognizer }))
        }
    }

    /// Streaming Kaldi recognizer session
    pub struct VoskRecognizer {
        recognizer: KaldiRecognizer,
    }

    impl Recognizer for VoskRecognizer {
        fn feed(&mut self, block: &AudioBlock) -> TranscriptEvent {
            let samples = block.samples();
            match self.recognizer.accept_waveform(&samples) {
                Ok(DecodingState::Finalized) => {
                    let text = match self.recognizer.result() {
                        CompleteResult::Single(single) => single.text.to_string(),
                        CompleteResult::Multiple(multiple) => multiple
                            .alternatives
                            .first()
                            .map(|alt| alt.text.to_string())
                            .unwrap_or_default(),
                    };
                    tracing::debug!(transcript = %text, "utterance finalized");
                    TranscriptEvent::finalized(text)
                }
                Ok(DecodingState::Running) => TranscriptEvent::Partial,
                Ok(DecodingState::Failed) => {
                    tracing::debug!("vosk failed to decode block");
                    TranscriptEvent::Partial
                }
                Err(e) => {
                    tracing::warn!(error = %e, "vosk rejected block");
                    TranscriptEvent::Partial
                }
            }
        }
    }
}
