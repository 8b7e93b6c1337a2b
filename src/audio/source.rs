//! Frame source abstraction.
//!
//! A frame source wraps a real-time audio callback and delivers fixed-duration
//! PCM frames to a registered handler. The device may hand over buffers larger
//! than one logical frame; [`FrameSplitter`] cuts them into exact frames,
//! carrying any remainder to the next invocation.

use crate::defaults;
use crate::error::{MicgateError, Result};
use crate::segment::frame::Frame;

/// Frame geometry shared by every component of a capture pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameFormat {
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Frame duration in milliseconds.
    pub frame_ms: u32,
}

impl Default for FrameFormat {
    fn default() -> Self {
        Self {
            sample_rate: defaults::SAMPLE_RATE,
            frame_ms: defaults::FRAME_MS,
        }
    }
}

impl FrameFormat {
    /// Number of samples in one frame.
    pub fn samples_per_frame(&self) -> usize {
        (self.sample_rate as usize * self.frame_ms as usize) / 1000
    }

    /// Validates the geometry.
    ///
    /// A frame duration that does not map to a whole number of samples is a
    /// fatal configuration error, raised here at registration time; runtime
    /// frames are trusted to match.
    ///
    /// # Errors
    /// Returns `MicgateError::InvalidFrameFormat` on bad geometry.
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(MicgateError::InvalidFrameFormat {
                message: "sample rate must be greater than zero".to_string(),
            });
        }
        if self.frame_ms == 0 {
            return Err(MicgateError::InvalidFrameFormat {
                message: "frame duration must be greater than zero".to_string(),
            });
        }
        if (self.sample_rate as u64 * self.frame_ms as u64) % 1000 != 0 {
            return Err(MicgateError::InvalidFrameFormat {
                message: format!(
                    "{}ms at {}Hz is not a whole number of samples",
                    self.frame_ms, self.sample_rate
                ),
            });
        }
        Ok(())
    }
}

/// Status returned by a frame handler to its source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Keep delivering frames.
    Continue,
    /// Capture is closed; deliver no further frames.
    Stop,
}

/// Per-frame callback registered against a source.
pub type FrameHandler = Box<dyn FnMut(Frame) -> FrameOutcome + Send>;

/// Trait for real-time frame producers.
///
/// This trait allows swapping implementations (real audio device vs mock).
/// A handler is registered exactly once; `start`/`stop` gate delivery. After
/// `stop` returns, no further frames reach the handler.
pub trait FrameSource: Send {
    /// Registers the per-frame handler. Called once, before `start`.
    ///
    /// # Errors
    /// Returns an error if a handler is already registered or the source's
    /// frame format is invalid.
    fn register(&mut self, handler: FrameHandler) -> Result<()>;

    /// Starts delivering frames to the registered handler.
    fn start(&mut self) -> Result<()>;

    /// Stops delivery. Idempotent.
    fn stop(&mut self) -> Result<()>;

    /// The frame geometry this source produces.
    fn format(&self) -> FrameFormat;
}

/// Cuts device buffers into exact fixed-duration frames.
///
/// Device callbacks may deliver any number of samples per invocation; the
/// splitter accumulates them and emits whole frames in order, carrying the
/// remainder to the next call. Sequence numbers are assigned here and are
/// strictly increasing for the lifetime of the splitter.
#[derive(Debug)]
pub struct FrameSplitter {
    format: FrameFormat,
    pending: Vec<i16>,
    next_sequence: u64,
}

impl FrameSplitter {
    /// Creates a splitter for the given geometry.
    ///
    /// # Errors
    /// Returns `MicgateError::InvalidFrameFormat` on bad geometry.
    pub fn new(format: FrameFormat) -> Result<Self> {
        format.validate()?;
        Ok(Self {
            format,
            pending: Vec::with_capacity(format.samples_per_frame() * 2),
            next_sequence: 0,
        })
    }

    /// Appends device samples and returns every complete frame now available.
    pub fn push(&mut self, samples: &[i16]) -> Vec<Frame> {
        self.pending.extend_from_slice(samples);

        let per_frame = self.format.samples_per_frame();
        let complete = self.pending.len() / per_frame;
        let mut frames = Vec::with_capacity(complete);

        for chunk in self.pending.chunks_exact(per_frame).take(complete) {
            frames.push(Frame::new(self.next_sequence, chunk.to_vec()));
            self.next_sequence += 1;
        }
        self.pending.drain(..complete * per_frame);

        frames
    }

    /// Number of samples waiting for the next frame boundary.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

/// Mock frame source for testing.
///
/// Feeds scripted sample batches through a [`FrameSplitter`] synchronously
/// when started, then goes quiet.
pub struct MockFrameSource {
    format: FrameFormat,
    batches: Vec<Vec<i16>>,
    handler: Option<FrameHandler>,
    started: bool,
    should_fail_start: bool,
}

impl MockFrameSource {
    /// Creates a mock source with the default format and no batches.
    pub fn new() -> Self {
        Self {
            format: FrameFormat::default(),
            batches: Vec::new(),
            handler: None,
            started: false,
            should_fail_start: false,
        }
    }

    /// Configure the frame format.
    pub fn with_format(mut self, format: FrameFormat) -> Self {
        self.format = format;
        self
    }

    /// Configure the sample batches delivered on `start`.
    pub fn with_batches(mut self, batches: Vec<Vec<i16>>) -> Self {
        self.batches = batches;
        self
    }

    /// Configure the mock to fail on start.
    pub fn with_start_failure(mut self) -> Self {
        self.should_fail_start = true;
        self
    }

    /// Check if the source is started.
    pub fn is_started(&self) -> bool {
        self.started
    }
}

impl Default for MockFrameSource {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameSource for MockFrameSource {
    fn register(&mut self, handler: FrameHandler) -> Result<()> {
        if self.handler.is_some() {
            return Err(MicgateError::AudioCapture {
                message: "handler already registered".to_string(),
            });
        }
        self.format.validate()?;
        self.handler = Some(handler);
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        if self.should_fail_start {
            return Err(MicgateError::AudioCapture {
                message: "mock start failure".to_string(),
            });
        }
        if self.started {
            return Ok(());
        }
        self.started = true;

        let handler = self.handler.as_mut().ok_or(MicgateError::AudioCapture {
            message: "no handler registered".to_string(),
        })?;
        let mut splitter = FrameSplitter::new(self.format)?;

        'batches: for batch in self.batches.drain(..) {
            for frame in splitter.push(&batch) {
                if handler(frame) == FrameOutcome::Stop {
                    break 'batches;
                }
            }
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.started = false;
        Ok(())
    }

    fn format(&self) -> FrameFormat {
        self.format
    }
}
