//! Capture/recognition worker
//!
//! Owns the listening session: the audio callback (producer) pushes blocks
//! onto an unbounded FIFO, one consumer thread drains it into the recognizer
//! and invokes the text callback for every finalized utterance.
//!
//! ```text
//!   Idle ──start──▶ Starting ──ok──▶ Running ──stop──▶ Stopping ──▶ Idle
//!                       │
//!                       └──err──▶ Failed (terminal)
//! ```

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError, select};

use crate::voice::{
    AudioSource, BlockSink, CaptureEvent, CaptureStream, Recognizer, RecognizerLoader,
    SAMPLE_RATE,
};
use crate::{Error, Result};

/// Callback receiving finalized transcripts on the consumer thread
pub type TextCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Default bound on model loading
pub const DEFAULT_STARTUP_TIMEOUT: Duration = Duration::from_secs(30);

/// Default bound on releasing the device and stopping the consumer
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(2);

/// How often `stop` re-checks whether the consumer has exited
const JOIN_POLL: Duration = Duration::from_millis(10);

/// Lifecycle state of the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// Not listening; `start` allowed
    Idle,
    /// Loading the model and opening the device
    Starting,
    /// Listening and draining the queue
    Running,
    /// Tearing down
    Stopping,
    /// Startup failed; this worker cannot be restarted
    Failed,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Why the consumer loop ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsumerExit {
    /// `stop` was requested; never reported as a [`WorkerEvent`]
    Stopped,
    /// The capture device went away
    DeviceLost(String),
    /// Every producer handle was dropped
    SourceClosed,
}

/// Notifications from the worker to its owner
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerEvent {
    /// The consumer loop ended
    Exited(ConsumerExit),
}

/// Worker settings
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Recognition model directory
    pub model_path: PathBuf,
    /// Capture sample rate in Hz
    pub sample_rate: u32,
    /// Bound on model loading
    pub startup_timeout: Duration,
    /// Bound on closing the device and waiting for the consumer to exit
    pub stop_timeout: Duration,
}

impl WorkerConfig {
    /// Settings with default rate and timeouts
    #[must_use]
    pub fn new(model_path: impl Into<PathBuf>) -> Self {
        Self {
            model_path: model_path.into(),
            sample_rate: SAMPLE_RATE,
            startup_timeout: DEFAULT_STARTUP_TIMEOUT,
            stop_timeout: DEFAULT_STOP_TIMEOUT,
        }
    }
}

/// Resources held while listening
struct Session {
    stream: Box<dyn CaptureStream>,
    /// Dropping this disconnects the consumer's stop channel
    stop_tx: Sender<()>,
    consumer: JoinHandle<()>,
    /// Exits of this session's consumer only
    events: Receiver<WorkerEvent>,
}

/// The capture/recognition worker
///
/// Not `Send`: the capture stream is pinned to the thread that opened it.
pub struct Worker {
    config: WorkerConfig,
    source: Box<dyn AudioSource>,
    loader: Arc<dyn RecognizerLoader>,
    on_text: Option<TextCallback>,
    state: PipelineState,
    session: Option<Session>,
}

impl Worker {
    /// Create an idle worker
    #[must_use]
    pub fn new(
        config: WorkerConfig,
        source: Box<dyn AudioSource>,
        loader: Arc<dyn RecognizerLoader>,
    ) -> Self {
        Self {
            config,
            source,
            loader,
            on_text: None,
            state: PipelineState::Idle,
            session: None,
        }
    }

    /// Register the transcript callback used by the next `start`
    ///
    /// The callback runs on the consumer thread; while it runs, later
    /// transcripts wait in the queue.
    pub fn set_callback(&mut self, on_text: impl Fn(&str) + Send + Sync + 'static) {
        self.on_text = Some(Arc::new(on_text));
    }

    /// Current lifecycle state
    #[must_use]
    pub const fn state(&self) -> PipelineState {
        self.state
    }

    /// Receiver for unrequested consumer exits of the current session
    ///
    /// Each `start` opens a fresh channel, so nothing from an earlier session
    /// leaks in. Without a session the receiver never fires; once the session
    /// is torn down it reports disconnection.
    #[must_use]
    pub fn events(&self) -> Receiver<WorkerEvent> {
        self.session
            .as_ref()
            .map_or_else(crossbeam_channel::never, |s| s.events.clone())
    }

    /// Load the model, open the device and begin listening
    ///
    /// # Errors
    ///
    /// Returns error if called outside `Idle`, or if model loading or device
    /// setup fails. A setup failure leaves the worker `Failed`.
    pub fn start(&mut self) -> Result<()> {
        if self.state != PipelineState::Idle {
            return Err(Error::Pipeline(format!(
                "cannot start while {}",
                self.state
            )));
        }

        self.state = PipelineState::Starting;
        tracing::info!(model = %self.config.model_path.display(), "starting pipeline");

        match self.open_session() {
            Ok(session) => {
                self.session = Some(session);
                self.state = PipelineState::Running;
                tracing::info!("pipeline running");
                Ok(())
            }
            Err(e) => {
                self.state = PipelineState::Failed;
                tracing::error!(error = %e, "pipeline failed to start");
                Err(e)
            }
        }
    }

    /// Stop listening and release the device
    ///
    /// Idempotent and total: teardown failures are logged, never returned.
    /// Blocks still waiting in the queue are discarded.
    pub fn stop(&mut self) {
        match self.state {
            PipelineState::Idle | PipelineState::Stopping => {
                tracing::debug!(state = %self.state, "stop ignored");
                return;
            }
            PipelineState::Failed => {
                tracing::debug!("stop on failed pipeline");
                self.release();
                return;
            }
            PipelineState::Starting | PipelineState::Running => {}
        }

        self.state = PipelineState::Stopping;
        tracing::info!("stopping pipeline");
        self.release();
        self.state = PipelineState::Idle;
        tracing::info!("pipeline stopped");
    }

    /// Tear down whatever session exists
    ///
    /// Closing the device and joining the consumer share one `stop_timeout`
    /// deadline; whatever is still busy past it is detached.
    fn release(&mut self) {
        let Some(Session {
            stream,
            stop_tx,
            consumer,
            ..
        }) = self.session.take()
        else {
            return;
        };

        // Signal first so the consumer skips anything still queued
        drop(stop_tx);

        let deadline = Instant::now() + self.config.stop_timeout;
        close_stream(stream, deadline);

        while !consumer.is_finished() {
            if Instant::now() >= deadline {
                tracing::warn!(
                    timeout_ms = self.config.stop_timeout.as_millis(),
                    "recognition thread still busy, detaching"
                );
                return;
            }
            thread::sleep(JOIN_POLL);
        }

        if consumer.join().is_err() {
            tracing::warn!("recognition thread panicked");
        }
    }

    fn open_session(&mut self) -> Result<Session> {
        let recognizer = self.load_recognizer()?;

        let (sink, blocks) = BlockSink::channel();
        let stream = self.source.open(sink)?;

        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(0);
        let (events_tx, events) = crossbeam_channel::unbounded();
        let on_text = self.on_text.clone();

        let spawned = thread::Builder::new()
            .name("hark-recognition".to_string())
            .spawn(move || {
                let exit = consume(recognizer, &blocks, &stop_rx, on_text.as_deref());
                tracing::debug!(?exit, "recognition loop exited");
                if exit != ConsumerExit::Stopped {
                    let _ = events_tx.send(WorkerEvent::Exited(exit));
                }
            });

        match spawned {
            Ok(consumer) => Ok(Session {
                stream,
                stop_tx,
                consumer,
                events,
            }),
            Err(e) => {
                close_stream(stream, Instant::now() + self.config.stop_timeout);
                Err(Error::Pipeline(format!(
                    "failed to spawn recognition thread: {e}"
                )))
            }
        }
    }

    /// Load the recognizer on a helper thread, bounded by the startup timeout
    fn load_recognizer(&self) -> Result<Box<dyn Recognizer>> {
        let loader = Arc::clone(&self.loader);
        let model_path = self.config.model_path.clone();
        let sample_rate = self.config.sample_rate;
        let (tx, rx) = crossbeam_channel::bounded(1);

        thread::Builder::new()
            .name("hark-model-loader".to_string())
            .spawn(move || {
                let started = Instant::now();
                let result = loader.load(&model_path, sample_rate);
                tracing::debug!(elapsed_ms = started.elapsed().as_millis(), "model load finished");
                let _ = tx.send(result);
            })?;

        match rx.recv_timeout(self.config.startup_timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => {
                Err(Error::StartupTimeout(self.config.startup_timeout))
            }
            Err(RecvTimeoutError::Disconnected) => Err(Error::Model(
                "model loader exited without a result".to_string(),
            )),
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Close the capture stream on a helper thread, waiting until `deadline`
///
/// A wedged driver can block `close` indefinitely; past the deadline the
/// helper is left to finish on its own.
fn close_stream(stream: Box<dyn CaptureStream>, deadline: Instant) {
    let (done_tx, done_rx) = crossbeam_channel::bounded(1);
    let spawned = thread::Builder::new()
        .name("hark-capture-close".to_string())
        .spawn(move || {
            let _ = done_tx.send(stream.close());
        });

    if let Err(e) = spawned {
        tracing::warn!(error = %e, "failed to spawn capture close thread");
        return;
    }

    match done_rx.recv_deadline(deadline) {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::warn!(error = %e, "failed to close capture stream"),
        Err(RecvTimeoutError::Timeout) => {
            tracing::warn!("capture device did not close in time, detaching");
        }
        Err(RecvTimeoutError::Disconnected) => {
            tracing::warn!("capture close thread panicked");
        }
    }
}

/// The consumer loop
fn consume(
    mut recognizer: Box<dyn Recognizer>,
    blocks: &Receiver<CaptureEvent>,
    stop: &Receiver<()>,
    on_text: Option<&(dyn Fn(&str) + Send + Sync)>,
) -> ConsumerExit {
    loop {
        // Checked before every dequeue; a block already taken is always fed
        if stop_requested(stop) {
            return ConsumerExit::Stopped;
        }

        select! {
            recv(stop) -> _ => return ConsumerExit::Stopped,
            recv(blocks) -> event => match event {
                Ok(CaptureEvent::Block(block)) => {
                    if let Some(text) = recognizer.feed(&block).text() {
                        tracing::info!(transcript = %text, "heard");
                        if let Some(on_text) = on_text {
                            on_text(text);
                        }
                    }
                }
                Ok(CaptureEvent::DeviceLost(reason)) => {
                    tracing::error!(reason = %reason, "capture device lost");
                    return ConsumerExit::DeviceLost(reason);
                }
                Err(_) => return ConsumerExit::SourceClosed,
            },
        }
    }
}

/// The stop channel never carries values; disconnection is the signal
fn stop_requested(stop: &Receiver<()>) -> bool {
    !matches!(stop.try_recv(), Err(TryRecvError::Empty))
}
