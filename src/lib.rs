//! hark - offline voice command assistant
//!
//! This library provides the building blocks of the assistant:
//! - Audio capture and streaming speech recognition
//! - The capture/recognition worker and its lifecycle
//! - Rule-based intent classification and response generation
//! - Spoken output through local TTS engines
//! - Weather and calendar service clients
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  blocks   ┌──────────────────────────┐
//! │ Audio source │ ────────▶ │ Worker (recognition loop)│
//! │  (cpal cb)   │  (queue)  └────────────┬─────────────┘
//! └──────────────┘                        │ finalized text
//!                           ┌─────────────▼─────────────┐
//!                           │ classify ─▶ respond ─▶ speak │
//!                           └─────────────┬─────────────┘
//!                                         │ exit intent
//!                           ┌─────────────▼─────────────┐
//!                           │   Assistant (stop, exit)   │
//!                           └───────────────────────────┘
//! ```

pub mod assistant;
pub mod config;
pub mod dialogue;
pub mod error;
pub mod integrations;
pub mod nlu;
pub mod voice;

pub use assistant::{Assistant, Control, Interaction, SessionEnd, Turn};
pub use config::Config;
pub use dialogue::DialogueManager;
pub use error::{Error, Result};
pub use nlu::{Intent, IntentName, SlotValue, classify};
