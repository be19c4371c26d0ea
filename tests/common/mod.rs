//! Shared test utilities
//!
//! In-process fakes for the audio source, the recognizer and the speech
//! backend, so the pipeline can run without audio hardware.

#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use hark::voice::{
    AudioBlock, AudioSource, BlockSink, CaptureStream, Recognizer, RecognizerLoader,
    SpeechBackend, SpeechOutput, TranscriptEvent, Voice,
};
use hark::{Error, Result};

/// Audio source that plays back a fixed script of blocks
///
/// Each block carries one marker sample value. The source keeps its sink
/// open until the stream is closed, like a live device would.
#[derive(Default)]
pub struct ScriptedSource {
    script: Vec<i16>,
    lose_device: bool,
    pub opened: Arc<AtomicUsize>,
    pub closed: Arc<AtomicUsize>,
}

impl ScriptedSource {
    pub fn new(script: Vec<i16>) -> Self {
        Self {
            script,
            ..Self::default()
        }
    }

    /// Report device loss after the script has played
    pub fn then_lose_device(mut self) -> Self {
        self.lose_device = true;
        self
    }
}

struct ScriptedStream {
    sink: Option<BlockSink>,
    closed: Arc<AtomicUsize>,
}

impl CaptureStream for ScriptedStream {
    fn close(mut self: Box<Self>) -> Result<()> {
        self.sink.take();
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl AudioSource for ScriptedSource {
    fn open(&mut self, sink: BlockSink) -> Result<Box<dyn CaptureStream>> {
        self.opened.fetch_add(1, Ordering::SeqCst);

        let producer = sink.clone();
        let script = self.script.clone();
        let lose_device = self.lose_device;
        thread::spawn(move || {
            for marker in script {
                producer.push(AudioBlock::from_samples(&[marker; 4]));
            }
            if lose_device {
                producer.device_lost("device unplugged");
            }
        });

        Ok(Box::new(ScriptedStream {
            sink: Some(sink),
            closed: Arc::clone(&self.closed),
        }))
    }
}

/// Recognizer that finalizes `transcripts[marker - 1]` for positive markers
///
/// Marker 0 is an in-progress block (partial result).
pub struct ScriptedRecognizer {
    transcripts: Vec<String>,
    seen: Arc<Mutex<Vec<i16>>>,
    delay: Duration,
}

impl Recognizer for ScriptedRecognizer {
    fn feed(&mut self, block: &AudioBlock) -> TranscriptEvent {
        let marker = block.samples().first().copied().unwrap_or(0);
        self.seen.lock().unwrap().push(marker);
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }

        usize::try_from(marker)
            .ok()
            .and_then(|m| m.checked_sub(1))
            .and_then(|i| self.transcripts.get(i))
            .map_or(TranscriptEvent::Partial, TranscriptEvent::finalized)
    }
}

/// Loader producing [`ScriptedRecognizer`]s that record every marker fed
pub fn scripted_loader(
    transcripts: &[&str],
    delay: Duration,
) -> (Arc<dyn RecognizerLoader>, Arc<Mutex<Vec<i16>>>) {
    let transcripts: Vec<String> = transcripts.iter().map(ToString::to_string).collect();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let recorded = Arc::clone(&seen);

    let loader = move |_: &Path, _: u32| -> Result<Box<dyn Recognizer>> {
        Ok(Box::new(ScriptedRecognizer {
            transcripts: transcripts.clone(),
            seen: Arc::clone(&recorded),
            delay,
        }))
    };
    (Arc::new(loader), seen)
}

/// Loader that fails like a missing model
pub fn failing_loader() -> Arc<dyn RecognizerLoader> {
    Arc::new(|path: &Path, _: u32| -> Result<Box<dyn Recognizer>> {
        Err(Error::Model(format!(
            "model directory not found: {}",
            path.display()
        )))
    })
}

/// Loader that takes longer than any reasonable startup timeout in tests
pub fn slow_loader(delay: Duration) -> Arc<dyn RecognizerLoader> {
    Arc::new(move |_: &Path, _: u32| -> Result<Box<dyn Recognizer>> {
        thread::sleep(delay);
        Err(Error::Model("loaded too late".to_string()))
    })
}

/// Speech backend that records what it was asked to say
#[derive(Clone, Default)]
pub struct RecordingBackend {
    spoken: Arc<Mutex<Vec<String>>>,
}

impl RecordingBackend {
    pub fn spoken(&self) -> Vec<String> {
        self.spoken.lock().unwrap().clone()
    }

    pub fn output(&self) -> Arc<SpeechOutput> {
        Arc::new(SpeechOutput::from_backend(Box::new(self.clone())))
    }
}

impl SpeechBackend for RecordingBackend {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn speak(&self, text: &str) -> Result<()> {
        self.spoken.lock().unwrap().push(text.to_string());
        Ok(())
    }

    fn voices(&self) -> Vec<Voice> {
        Vec::new()
    }
}

/// Poll `cond` until it holds or five seconds pass
pub fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    false
}

/// Run blocking client code on a plain OS thread
///
/// Blocking HTTP clients must be created and dropped outside the async
/// runtime, so tests hand them to a dedicated thread.
pub fn off_runtime<T, F>(f: F) -> T
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    thread::spawn(f).join().expect("blocking test thread panicked")
}
