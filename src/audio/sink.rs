//! Recording sinks.
//!
//! A recording sink is a write-only byte sink opened with the frame format of
//! the capture pipeline. The core writes raw frame samples in order and
//! closes the sink exactly once.

use crate::audio::source::FrameFormat;
use crate::error::{MicgateError, Result};
use crate::segment::frame::Frame;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Write-only destination for recorded frames.
///
/// `close` is called exactly once by the owner, either when the recording
/// countdown expires or when the mode is disarmed, never both.
pub trait RecordingSink: Send {
    /// Appends one frame's samples, in capture order.
    fn write_frame(&mut self, frame: &Frame) -> Result<()>;

    /// Flushes and releases the sink. Idempotent.
    fn close(&mut self) -> Result<()>;
}

/// WAV file sink matching the capture frame format.
pub struct WavSink {
    writer: Option<hound::WavWriter<BufWriter<File>>>,
}

impl WavSink {
    /// Creates a 16-bit mono WAV file at the pipeline's sample rate.
    ///
    /// # Errors
    /// Returns `MicgateError::RecordingSink` if the file cannot be created.
    pub fn create(path: &Path, format: FrameFormat) -> Result<Self> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: format.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let writer = hound::WavWriter::create(path, spec).map_err(|e| {
            MicgateError::RecordingSink {
                message: format!("failed to create {}: {}", path.display(), e),
            }
        })?;
        Ok(Self {
            writer: Some(writer),
        })
    }
}

impl RecordingSink for WavSink {
    fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        let writer = self.writer.as_mut().ok_or(MicgateError::RecordingSink {
            message: "write after close".to_string(),
        })?;
        for &sample in &frame.samples {
            writer
                .write_sample(sample)
                .map_err(|e| MicgateError::RecordingSink {
                    message: format!("write failed: {}", e),
                })?;
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if let Some(writer) = self.writer.take() {
            writer.finalize().map_err(|e| MicgateError::RecordingSink {
                message: format!("finalize failed: {}", e),
            })?;
        }
        Ok(())
    }
}

/// Shared view into a [`MemorySink`], for assertions after the sink has been
/// handed to a writer thread.
#[derive(Debug, Clone)]
pub struct MemorySinkState {
    samples: Arc<Mutex<Vec<i16>>>,
    close_count: Arc<AtomicUsize>,
}

impl MemorySinkState {
    /// Samples written so far, in order.
    pub fn samples(&self) -> Vec<i16> {
        self.samples.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Number of times `close` has been called.
    pub fn close_count(&self) -> usize {
        self.close_count.load(Ordering::SeqCst)
    }
}

/// In-memory sink for tests.
#[derive(Debug, Default)]
pub struct MemorySink {
    samples: Arc<Mutex<Vec<i16>>>,
    close_count: Arc<AtomicUsize>,
    should_fail_write: bool,
}

impl MemorySink {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configure the sink to fail on write.
    pub fn with_write_failure(mut self) -> Self {
        self.should_fail_write = true;
        self
    }

    /// Returns a shared view for later assertions.
    pub fn state(&self) -> MemorySinkState {
        MemorySinkState {
            samples: self.samples.clone(),
            close_count: self.close_count.clone(),
        }
    }
}

impl RecordingSink for MemorySink {
    fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        if self.should_fail_write {
            return Err(MicgateError::RecordingSink {
                message: "mock sink write failure".to_string(),
            });
        }
        if let Ok(mut samples) = self.samples.lock() {
            samples.extend_from_slice(&frame.samples);
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.close_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
