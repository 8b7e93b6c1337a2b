//! micgate - Voice-activity gated microphone capture and segmentation
//!
//! A real-time producer callback turns a continuous PCM stream into
//! fixed-duration frames; a hysteresis state machine gates them into bounded
//! speech segments with pre-roll; a mode controller routes every frame to
//! any combination of concurrently armed modes (Recording, Detecting,
//! Listening) across a non-blocking channel boundary.

#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

pub mod audio;
pub mod config;
pub mod defaults;
pub mod error;
pub mod mic;
pub mod route;
pub mod segment;
pub mod spotter;

// Core traits (source → classify → route → sink)
pub use audio::classifier::{EnergyClassifier, ScriptedClassifier, VoiceClassifier};
pub use audio::sink::{MemorySink, RecordingSink, WavSink};
pub use audio::source::{
    FrameFormat, FrameHandler, FrameOutcome, FrameSource, FrameSplitter, MockFrameSource,
};
#[cfg(feature = "cpal-audio")]
pub use audio::capture::CpalFrameSource;

// Routing
pub use mic::Microphone;
pub use route::channel::{frame_channel, FrameReceiver, FrameSender, Received};
pub use route::controller::{
    ControllerHandle, DetectParams, ListenParams, Mode, ModeController,
};
pub use route::session::{DetectSession, ListenSession, RecordingHandle};

// Segmentation
pub use segment::frame::{ChannelItem, Frame, Segment};
pub use segment::ring::PaddingRing;
pub use segment::segmenter::{SegmentState, Segmenter, SegmenterConfig, SessionKind};

// Keyword spotting
pub use spotter::{KeywordSpotter, ScriptedSpotter, SpotterConfig};

// Error handling
pub use error::{MicgateError, Result};

// Config
pub use config::Config;
