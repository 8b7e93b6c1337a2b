//! Keyword spotter adapter.
//!
//! The spotting engine is an external collaborator: frames go in, an
//! optional hypothesis string comes out. The core only requires that `feed`
//! is callable once per frame in capture order and that polling never
//! blocks.

use crate::error::{MicgateError, Result};
use crate::segment::frame::Frame;
use std::path::{Path, PathBuf};

/// Trait for keyword-spotting engines.
pub trait KeywordSpotter: Send {
    /// Advances the recognizer with one frame.
    ///
    /// # Errors
    /// An error marks the collaborator as failed; the session stops feeding
    /// it and surfaces a tagged error to the caller.
    fn feed(&mut self, frame: &Frame) -> Result<()>;

    /// Returns a partial or final hypothesis if one is available. Never
    /// blocks.
    fn poll_hypothesis(&mut self) -> Option<String>;

    /// Resets the recognizer between utterances.
    fn restart(&mut self);
}

/// Opaque model configuration for a spotting engine.
///
/// The paths (acoustic model directory, dictionary, keyword list) are passed
/// through to the engine unmodified; the core only checks they exist, at arm
/// time.
#[derive(Debug, Clone)]
pub struct SpotterConfig {
    /// Hidden Markov model directory.
    pub model_dir: PathBuf,
    /// Pronunciation dictionary.
    pub dictionary: PathBuf,
    /// Keyword list file.
    pub keywords: PathBuf,
}

impl SpotterConfig {
    /// Validates that every configured path exists.
    ///
    /// # Errors
    /// Returns `MicgateError::SpotterModelNotFound` naming the first missing
    /// path. Runs synchronously at arm time, never on the real-time path.
    pub fn validate(&self) -> Result<()> {
        for path in [&self.model_dir, &self.dictionary, &self.keywords] {
            if !Path::new(path).exists() {
                return Err(MicgateError::SpotterModelNotFound {
                    path: path.display().to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Scripted spotter for tests.
///
/// Yields a configured hypothesis after a fixed number of fed frames,
/// counted since construction or the last restart.
pub struct ScriptedSpotter {
    hypothesis: Option<String>,
    yield_after: usize,
    fed_since_restart: usize,
    restarts: usize,
    should_fail_feed: bool,
}

impl ScriptedSpotter {
    /// Creates a spotter that never yields a hypothesis.
    pub fn new() -> Self {
        Self {
            hypothesis: None,
            yield_after: 0,
            fed_since_restart: 0,
            restarts: 0,
            should_fail_feed: false,
        }
    }

    /// Configure a hypothesis to yield after `frames` fed frames.
    pub fn with_hypothesis_after(mut self, frames: usize, hypothesis: &str) -> Self {
        self.hypothesis = Some(hypothesis.to_string());
        self.yield_after = frames;
        self
    }

    /// Configure the spotter to fail on feed.
    pub fn with_feed_failure(mut self) -> Self {
        self.should_fail_feed = true;
        self
    }

    /// Number of restarts since construction.
    pub fn restarts(&self) -> usize {
        self.restarts
    }

    /// Frames fed since the last restart.
    pub fn fed_since_restart(&self) -> usize {
        self.fed_since_restart
    }
}

impl Default for ScriptedSpotter {
    fn default() -> Self {
        Self::new()
    }
}

impl KeywordSpotter for ScriptedSpotter {
    fn feed(&mut self, _frame: &Frame) -> Result<()> {
        if self.should_fail_feed {
            return Err(MicgateError::SpotterFailed {
                message: "mock feed failure".to_string(),
            });
        }
        self.fed_since_restart += 1;
        Ok(())
    }

    fn poll_hypothesis(&mut self) -> Option<String> {
        match &self.hypothesis {
            Some(hyp) if self.fed_since_restart >= self.yield_after => Some(hyp.clone()),
            _ => None,
        }
    }

    fn restart(&mut self) {
        self.fed_since_restart = 0;
        self.restarts += 1;
    }
}
