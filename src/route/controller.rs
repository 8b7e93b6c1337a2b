//! Mode controller: the single per-frame entry point of the producer path.
//!
//! Tracks which of {Recording, Detecting, Listening} are armed and offers
//! every incoming frame to each armed sub-pipeline in that fixed order, so
//! side effects are deterministic relative to segmentation decisions.
//!
//! Arm/disarm requests travel over a command queue that is drained at frame
//! boundaries: producer-owned state has exactly one writer (the real-time
//! thread) and crosses threads only through channels and a small set of
//! cooperative flags, so no locks are needed.

use crate::audio::classifier::VoiceClassifier;
use crate::audio::sink::RecordingSink;
use crate::defaults;
use crate::error::{MicgateError, Result};
use crate::route::channel::{frame_channel, FrameSender};
use crate::route::session::{spawn_sink_writer, DetectSession, ListenSession, RecordingHandle};
use crate::segment::frame::{ChannelItem, Frame};
use crate::segment::segmenter::{Segmenter, SegmenterConfig, SessionKind};
use crate::spotter::{KeywordSpotter, SpotterConfig};
use crossbeam_channel::{Receiver, Sender, TryRecvError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Independently armable frame-routing modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Raw frames to a recording sink.
    Recording,
    /// Raw frames to a keyword-spotting session.
    Detecting,
    /// Voice-activity segmented frames to a listening session.
    Listening,
}

/// Parameters for a listening session.
#[derive(Debug, Clone)]
pub struct ListenParams {
    /// Maximum phrase duration in milliseconds.
    pub max_phrase_ms: u64,
    /// Maximum wait for speech in milliseconds.
    pub max_wait_ms: u64,
    /// Single-shot or continuous segmentation.
    pub kind: SessionKind,
    /// Enter hysteresis window in frames.
    pub enter_window: usize,
    /// Voiced frames within the enter window confirming speech start.
    pub enter_threshold: usize,
    /// Exit hysteresis window in frames.
    pub exit_window: usize,
    /// Voiced frames within the exit window below which speech ends.
    pub exit_threshold: usize,
    /// Channel depth above which the delay diagnostic is logged.
    pub delay_threshold: usize,
    /// Consumer-side receive timeout.
    pub receive_timeout: Duration,
}

impl ListenParams {
    /// Creates parameters with the given countdowns and default hysteresis.
    pub fn new(max_phrase_ms: u64, max_wait_ms: u64) -> Self {
        Self {
            max_phrase_ms,
            max_wait_ms,
            kind: SessionKind::SingleShot,
            enter_window: defaults::ENTER_WINDOW,
            enter_threshold: defaults::ENTER_THRESHOLD,
            exit_window: defaults::EXIT_WINDOW,
            exit_threshold: defaults::EXIT_THRESHOLD,
            delay_threshold: defaults::DELAY_THRESHOLD,
            receive_timeout: Duration::from_millis(defaults::RECEIVE_TIMEOUT_MS),
        }
    }

    /// Switches between single-shot and continuous segmentation.
    pub fn with_kind(mut self, kind: SessionKind) -> Self {
        self.kind = kind;
        self
    }

    /// Overrides the enter hysteresis pair.
    pub fn with_enter_window(mut self, window: usize, threshold: usize) -> Self {
        self.enter_window = window;
        self.enter_threshold = threshold;
        self
    }

    /// Overrides the exit hysteresis pair.
    pub fn with_exit_window(mut self, window: usize, threshold: usize) -> Self {
        self.exit_window = window;
        self.exit_threshold = threshold;
        self
    }

    /// Overrides the consumer-side receive timeout.
    pub fn with_receive_timeout(mut self, timeout: Duration) -> Self {
        self.receive_timeout = timeout;
        self
    }

    fn segmenter_config(&self, frame_ms: u32) -> SegmenterConfig {
        SegmenterConfig {
            enter_window: self.enter_window,
            enter_threshold: self.enter_threshold,
            exit_window: self.exit_window,
            exit_threshold: self.exit_threshold,
            max_phrase_ms: self.max_phrase_ms,
            max_wait_ms: self.max_wait_ms,
            frame_ms,
            kind: self.kind,
        }
    }
}

impl Default for ListenParams {
    fn default() -> Self {
        Self::new(defaults::MAX_PHRASE_MS, defaults::MAX_WAIT_MS)
    }
}

/// Parameters for a detection session.
#[derive(Debug, Clone)]
pub struct DetectParams {
    /// Keyword that resolves the session.
    pub keyword: String,
    /// Spotter model paths, validated at arm time when present.
    pub spotter_config: Option<SpotterConfig>,
    /// Channel depth above which the delay diagnostic is logged.
    pub delay_threshold: usize,
    /// Consumer-side receive timeout.
    pub receive_timeout: Duration,
}

impl DetectParams {
    /// Creates parameters for the given keyword.
    pub fn new(keyword: &str) -> Self {
        Self {
            keyword: keyword.to_string(),
            spotter_config: None,
            delay_threshold: defaults::DELAY_THRESHOLD,
            receive_timeout: Duration::from_millis(defaults::RECEIVE_TIMEOUT_MS),
        }
    }

    /// Attaches model paths to validate before the spotter is armed.
    pub fn with_spotter_config(mut self, config: SpotterConfig) -> Self {
        self.spotter_config = Some(config);
        self
    }

    /// Overrides the consumer-side receive timeout.
    pub fn with_receive_timeout(mut self, timeout: Duration) -> Self {
        self.receive_timeout = timeout;
        self
    }
}

/// Single-writer armed flags, readable from the consumer side.
#[derive(Debug, Default)]
struct ArmedFlags {
    recording: AtomicBool,
    detecting: AtomicBool,
    listening: AtomicBool,
}

impl ArmedFlags {
    fn flag(&self, mode: Mode) -> &AtomicBool {
        match mode {
            Mode::Recording => &self.recording,
            Mode::Detecting => &self.detecting,
            Mode::Listening => &self.listening,
        }
    }
}

struct ListenState {
    classifier: Box<dyn VoiceClassifier>,
    segmenter: Segmenter,
    tx: FrameSender,
    stop: Arc<AtomicBool>,
}

struct DetectState {
    tx: FrameSender,
    stop: Arc<AtomicBool>,
}

struct RecordState {
    tx: FrameSender,
    stop: Arc<AtomicBool>,
    budget: i64,
}

enum Command {
    ArmRecord(RecordState),
    ArmDetect(DetectState),
    ArmListen(ListenState),
    Disarm(Mode),
    Shutdown,
}

/// Producer-side frame router.
///
/// Owned by the frame source callback; every state transition happens on the
/// real-time thread at a frame boundary.
pub struct ModeController {
    commands: Receiver<Command>,
    armed: Arc<ArmedFlags>,
    recording: Option<RecordState>,
    detecting: Option<DetectState>,
    listening: Option<ListenState>,
    closed: bool,
}

impl ModeController {
    /// Creates a controller and its consumer-side handle.
    pub fn new() -> (Self, ControllerHandle) {
        let (tx, rx) = crossbeam_channel::unbounded();
        let armed = Arc::new(ArmedFlags::default());
        (
            Self {
                commands: rx,
                armed: armed.clone(),
                recording: None,
                detecting: None,
                listening: None,
                closed: false,
            },
            ControllerHandle { commands: tx, armed },
        )
    }

    /// The single per-frame entry point, invoked by the frame source.
    ///
    /// Returns false once the router is shut down; the source then stops
    /// forwarding.
    pub fn on_frame(&mut self, frame: Frame) -> bool {
        self.drain_commands();
        if self.closed {
            return false;
        }

        // Fixed dispatch order: Recording, then Detecting, then Listening.
        self.dispatch_recording(&frame);
        self.dispatch_detecting(&frame);
        self.dispatch_listening(frame);

        true
    }

    /// True if the given mode currently has an armed sub-pipeline.
    pub fn is_armed(&self, mode: Mode) -> bool {
        match mode {
            Mode::Recording => self.recording.is_some(),
            Mode::Detecting => self.detecting.is_some(),
            Mode::Listening => self.listening.is_some(),
        }
    }

    fn dispatch_recording(&mut self, frame: &Frame) {
        let Some(mut state) = self.recording.take() else {
            return;
        };

        if state.stop.load(Ordering::Relaxed) {
            self.finish_recording(state);
            return;
        }

        let alive = state.tx.send(ChannelItem::frame(frame.clone(), false));
        state.budget -= 1;

        if !alive || state.budget <= 0 {
            self.finish_recording(state);
        } else {
            self.recording = Some(state);
        }
    }

    fn dispatch_detecting(&mut self, frame: &Frame) {
        let Some(mut state) = self.detecting.take() else {
            return;
        };

        if state.stop.load(Ordering::Relaxed) {
            self.finish_detecting(state);
            return;
        }

        if state.tx.send(ChannelItem::frame(frame.clone(), false)) {
            self.detecting = Some(state);
        } else {
            self.finish_detecting(state);
        }
    }

    fn dispatch_listening(&mut self, frame: Frame) {
        let Some(mut state) = self.listening.take() else {
            return;
        };

        if state.stop.load(Ordering::Relaxed) {
            self.finish_listening(state);
            return;
        }

        let voiced = state.classifier.classify(&frame.samples);
        let step = state.segmenter.process(frame, voiced);

        let mut alive = true;
        for item in step.items {
            if !state.tx.send(item) {
                alive = false;
                break;
            }
        }

        if step.session_over || !alive {
            // The segmenter already emitted the terminal marker (or the
            // consumer is gone); just release the state.
            self.armed.listening.store(false, Ordering::Relaxed);
            info!("listening session ended");
        } else {
            self.listening = Some(state);
        }
    }

    /// Sends the terminal marker and releases the mode. The writer thread
    /// behind the channel closes the sink exactly once.
    fn finish_recording(&self, mut state: RecordState) {
        state.tx.send(ChannelItem::EndOfStream);
        self.armed.recording.store(false, Ordering::Relaxed);
        info!("recording stopped");
    }

    fn finish_detecting(&self, mut state: DetectState) {
        state.tx.send(ChannelItem::EndOfStream);
        self.armed.detecting.store(false, Ordering::Relaxed);
        info!("detection stopped");
    }

    fn finish_listening(&self, mut state: ListenState) {
        state.tx.send(ChannelItem::EndOfStream);
        self.armed.listening.store(false, Ordering::Relaxed);
        info!("listening stopped");
    }

    fn finish_all(&mut self) {
        if let Some(state) = self.recording.take() {
            self.finish_recording(state);
        }
        if let Some(state) = self.detecting.take() {
            self.finish_detecting(state);
        }
        if let Some(state) = self.listening.take() {
            self.finish_listening(state);
        }
    }

    fn drain_commands(&mut self) {
        loop {
            match self.commands.try_recv() {
                Ok(Command::ArmRecord(state)) => {
                    // Re-arming replaces the old session wholesale; no stale
                    // state crosses sessions.
                    if let Some(old) = self.recording.take() {
                        self.finish_recording(old);
                    }
                    self.armed.recording.store(true, Ordering::Relaxed);
                    info!(frames = state.budget, "recording armed");
                    self.recording = Some(state);
                }
                Ok(Command::ArmDetect(state)) => {
                    if let Some(old) = self.detecting.take() {
                        self.finish_detecting(old);
                    }
                    self.armed.detecting.store(true, Ordering::Relaxed);
                    info!("detection armed");
                    self.detecting = Some(state);
                }
                Ok(Command::ArmListen(state)) => {
                    if let Some(old) = self.listening.take() {
                        self.finish_listening(old);
                    }
                    self.armed.listening.store(true, Ordering::Relaxed);
                    info!("listening armed");
                    self.listening = Some(state);
                }
                Ok(Command::Disarm(mode)) => match mode {
                    Mode::Recording => {
                        if let Some(state) = self.recording.take() {
                            self.finish_recording(state);
                        }
                    }
                    Mode::Detecting => {
                        if let Some(state) = self.detecting.take() {
                            self.finish_detecting(state);
                        }
                    }
                    Mode::Listening => {
                        if let Some(state) = self.listening.take() {
                            self.finish_listening(state);
                        }
                    }
                },
                Ok(Command::Shutdown) => {
                    self.finish_all();
                    self.closed = true;
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    // Every handle is gone; nobody can arm anything again.
                    self.finish_all();
                    self.closed = true;
                    break;
                }
            }
        }
    }
}

impl Drop for ModeController {
    fn drop(&mut self) {
        // Orderly terminals for any session still armed when the source is
        // torn down.
        self.finish_all();
    }
}

/// Consumer-side handle: arms and disarms modes, builds session handles.
///
/// All validation happens here, synchronously, before a command ever reaches
/// the real-time path.
#[derive(Clone)]
pub struct ControllerHandle {
    commands: Sender<Command>,
    armed: Arc<ArmedFlags>,
}

impl ControllerHandle {
    /// True if the mode's sub-pipeline is currently armed.
    ///
    /// Arm/disarm requests take effect at the next frame boundary, so this
    /// lags commands by up to one frame.
    pub fn is_armed(&self, mode: Mode) -> bool {
        self.armed.flag(mode).load(Ordering::Relaxed)
    }

    /// Arms listening with the given classifier.
    ///
    /// # Errors
    /// `InvalidParams` for inconsistent hysteresis/countdown configuration,
    /// `RouterClosed` if the producer is gone.
    pub fn arm_listen(
        &self,
        params: &ListenParams,
        classifier: Box<dyn VoiceClassifier>,
        frame_ms: u32,
    ) -> Result<ListenSession> {
        let segmenter = Segmenter::new(params.segmenter_config(frame_ms))?;
        let (tx, rx) = frame_channel(params.delay_threshold);
        let stop = Arc::new(AtomicBool::new(false));

        self.send(Command::ArmListen(ListenState {
            classifier,
            segmenter,
            tx,
            stop: stop.clone(),
        }))?;

        Ok(ListenSession::new(rx, stop, params.receive_timeout))
    }

    /// Arms detection with the given spotter.
    ///
    /// # Errors
    /// `InvalidParams` for an empty keyword, `RouterClosed` if the producer
    /// is gone.
    pub fn arm_detect(
        &self,
        params: &DetectParams,
        spotter: Box<dyn KeywordSpotter>,
    ) -> Result<DetectSession> {
        if params.keyword.is_empty() {
            return Err(MicgateError::InvalidParams {
                param: "keyword".to_string(),
                message: "must not be empty".to_string(),
            });
        }
        if let Some(config) = &params.spotter_config {
            config.validate()?;
        }

        let (tx, rx) = frame_channel(params.delay_threshold);
        let stop = Arc::new(AtomicBool::new(false));

        self.send(Command::ArmDetect(DetectState {
            tx,
            stop: stop.clone(),
        }))?;

        Ok(DetectSession::new(
            rx,
            stop,
            spotter,
            params.keyword.clone(),
            params.receive_timeout,
        ))
    }

    /// Arms recording into the given sink for at most `max_duration_ms`.
    ///
    /// The sink is handed to a dedicated writer thread so no file I/O ever
    /// runs on the real-time path; it is flushed and closed exactly once.
    ///
    /// # Errors
    /// `InvalidParams` for a sub-frame duration, `RouterClosed` if the
    /// producer is gone.
    pub fn arm_record(
        &self,
        sink: Box<dyn RecordingSink>,
        max_duration_ms: u64,
        frame_ms: u32,
    ) -> Result<RecordingHandle> {
        if frame_ms == 0 || max_duration_ms < frame_ms as u64 {
            return Err(MicgateError::InvalidParams {
                param: "max_duration_ms".to_string(),
                message: "must be at least one frame long".to_string(),
            });
        }

        let budget = (max_duration_ms / frame_ms as u64) as i64;
        let (tx, rx) = frame_channel(defaults::DELAY_THRESHOLD);
        let stop = Arc::new(AtomicBool::new(false));
        let writer = spawn_sink_writer(rx, sink);

        self.send(Command::ArmRecord(RecordState {
            tx,
            stop: stop.clone(),
            budget,
        }))?;

        Ok(RecordingHandle::new(stop, writer))
    }

    /// Requests a mode to disarm at the next frame boundary.
    ///
    /// # Errors
    /// `RouterClosed` if the producer is gone.
    pub fn disarm(&self, mode: Mode) -> Result<()> {
        self.send(Command::Disarm(mode))
    }

    /// Shuts the router down: every armed mode gets its terminal marker and
    /// no further frames are routed.
    ///
    /// # Errors
    /// `RouterClosed` if the producer is already gone.
    pub fn shutdown(&self) -> Result<()> {
        self.send(Command::Shutdown)
    }

    fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| MicgateError::RouterClosed)
    }
}
