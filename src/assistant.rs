//! Assistant - the voice interaction loop
//!
//! Wires the capture/recognition worker to intent classification, response
//! generation and speech output, and drives the session until the user says
//! goodbye or the process is interrupted.

use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender, select};

use crate::dialogue::DialogueManager;
use crate::nlu::{self, Intent};
use crate::voice::{ConsumerExit, PipelineState, SpeechOutput, Worker, WorkerEvent};
use crate::{Error, Result};

/// Spoken before the model loads
pub const STARTING_PHRASE: &str = "Assistant is starting. Loading speech model. Please wait.";

/// Spoken once listening
pub const READY_PHRASE: &str = "Done! Ready to go.";

/// Spoken when the model load exceeds the startup timeout
pub const TIMEOUT_PHRASE: &str =
    "The speech model did not load in time. Please try restarting the assistant.";

/// Spoken on any other startup failure
pub const LOAD_FAILED_PHRASE: &str = "Failed to load the speech model.";

/// Requests delivered to the session loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    /// The user asked to leave; the farewell has been spoken
    Shutdown,
    /// The process received an interrupt
    Interrupt,
}

/// How a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// Exit intent
    ExitRequested,
    /// Ctrl-C or another external stop
    Interrupted,
}

/// One handled utterance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub intent: Intent,
    pub response: String,
}

/// Handles finalized transcripts: classify, respond, speak
///
/// Runs on the recognition thread, so at most one turn is in flight and the
/// next transcript waits until the current response has been spoken.
pub struct Interaction {
    dialogue: DialogueManager,
    speech: Arc<SpeechOutput>,
    control: Sender<Control>,
}

impl Interaction {
    #[must_use]
    pub const fn new(
        dialogue: DialogueManager,
        speech: Arc<SpeechOutput>,
        control: Sender<Control>,
    ) -> Self {
        Self {
            dialogue,
            speech,
            control,
        }
    }

    /// Handle one transcript
    ///
    /// Returns `None` when the text is blank and nothing was dispatched.
    pub fn handle(&self, text: &str) -> Option<Turn> {
        let Some(intent) = nlu::classify(text) else {
            tracing::debug!("empty transcript, skipping");
            return None;
        };

        let response = self.dialogue.respond(&intent, text);
        tracing::info!(intent = %intent.name, response = %response, "responding");
        self.speech.speak(&response);

        if intent.is_exit() {
            tracing::info!("exit requested");
            let _ = self.control.send(Control::Shutdown);
        }

        Some(Turn { intent, response })
    }
}

/// The assistant session
pub struct Assistant {
    worker: Worker,
    speech: Arc<SpeechOutput>,
    control_tx: Sender<Control>,
    control_rx: Receiver<Control>,
}

impl Assistant {
    /// Create a session around an idle worker
    #[must_use]
    pub fn new(mut worker: Worker, dialogue: DialogueManager, speech: Arc<SpeechOutput>) -> Self {
        let (control_tx, control_rx) = crossbeam_channel::unbounded();

        let interaction = Interaction::new(dialogue, Arc::clone(&speech), control_tx.clone());
        worker.set_callback(move |text| {
            interaction.handle(text);
        });

        Self {
            worker,
            speech,
            control_tx,
            control_rx,
        }
    }

    /// Handle for stopping the session from another thread
    #[must_use]
    pub fn control(&self) -> Sender<Control> {
        self.control_tx.clone()
    }

    /// Current worker state
    #[must_use]
    pub const fn state(&self) -> PipelineState {
        self.worker.state()
    }

    /// Start listening and block until the session ends
    ///
    /// The worker is stopped before this returns, whatever the outcome.
    ///
    /// # Errors
    ///
    /// Returns error if the pipeline fails to start or the input device is
    /// lost mid-session
    pub fn run(mut self) -> Result<SessionEnd> {
        self.speech.speak(STARTING_PHRASE);

        if let Err(e) = self.worker.start() {
            let phrase = match e {
                Error::StartupTimeout(_) => TIMEOUT_PHRASE,
                _ => LOAD_FAILED_PHRASE,
            };
            self.speech.speak(phrase);
            return Err(e);
        }

        self.speech.speak(READY_PHRASE);

        let events = self.worker.events();
        let outcome = loop {
            select! {
                recv(self.control_rx) -> control => match control {
                    Ok(Control::Shutdown) => break Ok(SessionEnd::ExitRequested),
                    Ok(Control::Interrupt) | Err(_) => break Ok(SessionEnd::Interrupted),
                },
                recv(events) -> event => match event {
                    Ok(WorkerEvent::Exited(ConsumerExit::DeviceLost(reason))) => {
                        break Err(Error::Audio(format!("input device lost: {reason}")));
                    }
                    Ok(WorkerEvent::Exited(ConsumerExit::SourceClosed)) => {
                        break Err(Error::Audio("capture stream closed".to_string()));
                    }
                    Ok(WorkerEvent::Exited(ConsumerExit::Stopped)) | Err(_) => {
                        break Ok(SessionEnd::Interrupted);
                    }
                },
            }
        };

        self.worker.stop();

        match &outcome {
            Ok(end) => tracing::info!(?end, "session ended"),
            Err(e) => tracing::error!(error = %e, "session aborted"),
        }
        outcome
    }
}
