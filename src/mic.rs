//! Microphone handle: the composition root.
//!
//! Owns the frame source and the controller handle, wires the producer
//! callback at registration time, and exposes the consumer-facing
//! start/stop operations. Mode state lives for the lifetime of this handle;
//! sessions are scoped to each start call.

use crate::audio::classifier::{EnergyClassifier, VoiceClassifier};
use crate::audio::sink::RecordingSink;
use crate::audio::source::{FrameFormat, FrameOutcome, FrameSource};
use crate::defaults;
use crate::error::Result;
use crate::route::controller::{ControllerHandle, DetectParams, ListenParams, Mode, ModeController};
use crate::route::session::{DetectSession, ListenSession, RecordingHandle};
use crate::spotter::KeywordSpotter;
use tracing::debug;

/// Voice-gated microphone with independently armable routing modes.
///
/// Any subset of {Recording, Detecting, Listening} may run concurrently over
/// the same frame stream; each start call returns a session handle whose
/// output sequence ends with a terminal marker.
pub struct Microphone {
    source: Box<dyn FrameSource>,
    handle: ControllerHandle,
    format: FrameFormat,
}

impl Microphone {
    /// Wires a frame source to a fresh mode controller.
    ///
    /// The controller becomes the source's registered frame handler; frame
    /// geometry is validated here, once, so the real-time path never sees a
    /// malformed frame.
    ///
    /// # Errors
    /// Returns `InvalidFrameFormat` for bad geometry or the source's own
    /// registration error.
    pub fn new(mut source: Box<dyn FrameSource>) -> Result<Self> {
        let format = source.format();
        format.validate()?;

        let (mut controller, handle) = ModeController::new();
        source.register(Box::new(move |frame| {
            if controller.on_frame(frame) {
                FrameOutcome::Continue
            } else {
                FrameOutcome::Stop
            }
        }))?;

        Ok(Self {
            source,
            handle,
            format,
        })
    }

    /// Opens a real capture device with the default frame format.
    ///
    /// # Errors
    /// Returns `AudioDeviceNotFound` for unknown devices.
    #[cfg(feature = "cpal-audio")]
    pub fn open(device_name: Option<&str>) -> Result<Self> {
        let source = crate::audio::capture::CpalFrameSource::new(device_name, FrameFormat::default())?;
        Self::new(Box::new(source))
    }

    /// The frame geometry of this capture pipeline.
    pub fn format(&self) -> FrameFormat {
        self.format
    }

    /// True if the mode currently has an armed sub-pipeline.
    pub fn is_armed(&self, mode: Mode) -> bool {
        self.handle.is_armed(mode)
    }

    /// Starts a voice-activity segmented listening session with the default
    /// energy classifier.
    ///
    /// # Errors
    /// Configuration errors surface here, synchronously; see
    /// [`start_listening_with`](Self::start_listening_with).
    pub fn start_listening(&mut self, params: &ListenParams) -> Result<ListenSession> {
        let classifier = EnergyClassifier::new(defaults::AGGRESSIVENESS)?;
        self.start_listening_with(params, Box::new(classifier))
    }

    /// Starts a listening session with an explicit classifier.
    ///
    /// The classifier handle is scoped to this session; nothing is shared
    /// across sessions or process-wide.
    ///
    /// # Errors
    /// `InvalidParams` for inconsistent configuration, plus any source start
    /// error.
    pub fn start_listening_with(
        &mut self,
        params: &ListenParams,
        classifier: Box<dyn VoiceClassifier>,
    ) -> Result<ListenSession> {
        let session = self
            .handle
            .arm_listen(params, classifier, self.format.frame_ms)?;
        self.source.start()?;
        Ok(session)
    }

    /// Starts a wake-word detection session.
    ///
    /// # Errors
    /// `InvalidParams` for an empty keyword, plus any source start error.
    pub fn start_detecting(
        &mut self,
        params: &DetectParams,
        spotter: Box<dyn KeywordSpotter>,
    ) -> Result<DetectSession> {
        let session = self.handle.arm_detect(params, spotter)?;
        self.source.start()?;
        Ok(session)
    }

    /// Starts recording raw frames into the sink for at most
    /// `max_duration_ms`.
    ///
    /// # Errors
    /// `InvalidParams` for a sub-frame duration, plus any source start
    /// error.
    pub fn start_recording(
        &mut self,
        sink: Box<dyn RecordingSink>,
        max_duration_ms: u64,
    ) -> Result<RecordingHandle> {
        let handle = self
            .handle
            .arm_record(sink, max_duration_ms, self.format.frame_ms)?;
        self.source.start()?;
        Ok(handle)
    }

    /// Requests a mode to disarm; it flushes its resources at the next frame
    /// boundary without affecting other armed modes.
    ///
    /// # Errors
    /// `RouterClosed` if the producer is gone.
    pub fn stop(&mut self, mode: Mode) -> Result<()> {
        self.handle.disarm(mode)
    }

    /// Stops the capture device if no mode is armed.
    ///
    /// Returns true if the device was stopped.
    ///
    /// # Errors
    /// Propagates the source's stop error.
    pub fn stop_if_idle(&mut self) -> Result<bool> {
        let any_armed = self.handle.is_armed(Mode::Recording)
            || self.handle.is_armed(Mode::Detecting)
            || self.handle.is_armed(Mode::Listening);
        if any_armed {
            return Ok(false);
        }
        self.source.stop()?;
        Ok(true)
    }

    /// Shuts everything down: every armed session gets its terminal marker
    /// and the device stops. No further frames are forwarded afterward.
    ///
    /// # Errors
    /// Propagates the source's stop error.
    pub fn close(mut self) -> Result<()> {
        if self.handle.shutdown().is_err() {
            debug!("router already closed");
        }
        self.source.stop()
        // Dropping the source releases the controller, which delivers any
        // terminal markers the shutdown command did not reach.
    }
}
