//! Host-side orchestration of Neutrino Tau synthesis.
//!
//! A [`SynthesisTask`] snapshots a segment of notes, builds a request
//! document, runs one blocking call into the native engine on a worker
//! thread, and rebuilds audio, pitch and per-note phoneme timing from the
//! response. Cancellation reaches into the native call through a cancel
//! token owned by the task.
#![allow(clippy::missing_safety_doc)]

pub mod bridge;
pub mod cancel;
pub mod config;
pub mod engine;
pub mod error;
pub mod logging;
pub mod native;
pub mod note;
pub mod payload;
pub mod pitch;
pub mod property;
pub mod reconcile;
pub mod response;
pub mod segment;
pub mod snapshot;
pub mod task;
pub mod voice;

pub use config::EngineConfig;
pub use engine::{NativeEngine, VoiceEngine};
pub use error::{EngineError, LoggingError, SynthesisError};
pub use logging::init_logging;
pub use native::NativeApi;
pub use note::{NoteKey, NoteRef, Phoneme, PitchSource, SynthesisData, SynthesisNote};
pub use property::{PropertyObject, PropertyValue};
pub use reconcile::{NotePhonemeMap, Point, SynthesisResult, SynthesizedPhoneme};
pub use segment::{PitchCurve, Segment, SegmentNote};
pub use task::{SynthesisEvent, SynthesisTask};
pub use voice::{AutomationConfig, NumberConfig, VoiceSource, VoiceSourceInfo};
