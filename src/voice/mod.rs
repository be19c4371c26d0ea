//! Voice processing module
//!
//! Handles audio capture, streaming recognition, the capture/recognition
//! worker that connects them, and spoken output.

mod capture;
mod recognizer;
mod tts;
mod worker;

pub use capture::{
    AudioBlock, AudioSource, BLOCK_SIZE, BlockSink, CaptureEvent, CaptureStream, CpalSource,
    SAMPLE_RATE, samples_to_wav,
};
#[cfg(feature = "vosk")]
pub use recognizer::{VoskLoader, VoskRecognizer};
pub use recognizer::{
    Recognizer, RecognizerLoader, TranscriptEvent, check_model_dir, default_loader,
};
pub use tts::{
    BackendKind, ConsoleBackend, EspeakBackend, SpeechBackend, SpeechDispatcherBackend,
    SpeechOptions, SpeechOutput, Voice, VoicePreference, select_voice,
};
pub use worker::{
    ConsumerExit, DEFAULT_STARTUP_TIMEOUT, DEFAULT_STOP_TIMEOUT, PipelineState, TextCallback,
    Worker, WorkerConfig, WorkerEvent,
};
