//! TOML configuration.
//!
//! Every value mirrors a constant in [`crate::defaults`]; missing fields
//! fall back to those defaults, so a partial file is always valid.

use crate::audio::source::FrameFormat;
use crate::defaults;
use crate::error::Result;
use crate::route::controller::ListenParams;
use crate::segment::segmenter::SessionKind;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub audio: AudioSection,
    pub segmenter: SegmenterSection,
    pub channel: ChannelSection,
}

/// Audio capture configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AudioSection {
    pub device: Option<String>,
    pub sample_rate: u32,
    pub frame_ms: u32,
    pub aggressiveness: u8,
}

/// Hysteresis and countdown configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SegmenterSection {
    pub enter_window: usize,
    pub enter_threshold: usize,
    pub exit_window: usize,
    pub exit_threshold: usize,
    pub max_phrase_ms: u64,
    pub max_wait_ms: u64,
}

/// Cross-thread channel configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ChannelSection {
    pub delay_threshold: usize,
    pub receive_timeout_ms: u64,
}

impl Default for AudioSection {
    fn default() -> Self {
        Self {
            device: None,
            sample_rate: defaults::SAMPLE_RATE,
            frame_ms: defaults::FRAME_MS,
            aggressiveness: defaults::AGGRESSIVENESS,
        }
    }
}

impl Default for SegmenterSection {
    fn default() -> Self {
        Self {
            enter_window: defaults::ENTER_WINDOW,
            enter_threshold: defaults::ENTER_THRESHOLD,
            exit_window: defaults::EXIT_WINDOW,
            exit_threshold: defaults::EXIT_THRESHOLD,
            max_phrase_ms: defaults::MAX_PHRASE_MS,
            max_wait_ms: defaults::MAX_WAIT_MS,
        }
    }
}

impl Default for ChannelSection {
    fn default() -> Self {
        Self {
            delay_threshold: defaults::DELAY_THRESHOLD,
            receive_timeout_ms: defaults::RECEIVE_TIMEOUT_MS,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Missing fields use default values.
    ///
    /// # Errors
    /// Returns an error if the file is unreadable or contains invalid TOML.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from a file, or return defaults if the file does
    /// not exist
    ///
    /// # Errors
    /// Invalid TOML is still an error; only a missing file falls back.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        match Self::load(path) {
            Ok(config) => Ok(config),
            Err(crate::error::MicgateError::Io(e))
                if e.kind() == std::io::ErrorKind::NotFound =>
            {
                Ok(Self::default())
            }
            Err(e) => Err(e),
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - MICGATE_AUDIO_DEVICE → audio.device
    /// - MICGATE_AGGRESSIVENESS → audio.aggressiveness
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(device) = std::env::var("MICGATE_AUDIO_DEVICE")
            && !device.is_empty()
        {
            self.audio.device = Some(device);
        }

        if let Ok(tier) = std::env::var("MICGATE_AGGRESSIVENESS")
            && let Ok(tier) = tier.parse::<u8>()
        {
            self.audio.aggressiveness = tier;
        }

        self
    }

    /// Frame geometry implied by the audio section.
    pub fn frame_format(&self) -> FrameFormat {
        FrameFormat {
            sample_rate: self.audio.sample_rate,
            frame_ms: self.audio.frame_ms,
        }
    }

    /// Listening parameters implied by the segmenter and channel sections.
    pub fn listen_params(&self, kind: SessionKind) -> ListenParams {
        ListenParams::new(self.segmenter.max_phrase_ms, self.segmenter.max_wait_ms)
            .with_kind(kind)
            .with_enter_window(self.segmenter.enter_window, self.segmenter.enter_threshold)
            .with_exit_window(self.segmenter.exit_window, self.segmenter.exit_threshold)
            .with_receive_timeout(Duration::from_millis(self.channel.receive_timeout_ms))
    }
}
