//! Segmentation state machine.
//!
//! Consumes per-frame speech flags and ring-buffer statistics to turn a raw
//! frame stream into bounded segments with pre-roll padding. Idle and armed
//! are merged: every idle frame lands in the padding ring, and each push
//! re-evaluates the enter condition.
//!
//! All decisions are made in whole-frame units on the producer thread;
//! nothing here blocks or allocates beyond the configured windows.

use crate::defaults;
use crate::error::{MicgateError, Result};
use crate::segment::frame::{ChannelItem, Frame};
use crate::segment::ring::PaddingRing;
use tracing::debug;

/// Whether a session ends with its first segment or keeps segmenting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionKind {
    /// The session ends when the first segment completes.
    SingleShot,
    /// The machine resets and waits for the next segment after each one.
    Continuous,
}

/// Configuration for the segmentation state machine.
///
/// The hysteresis pairs are independent: the exit window is typically much
/// larger than the enter window. All values are tunable; the defaults follow
/// [`crate::defaults`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmenterConfig {
    /// Recent frames inspected for the enter condition.
    pub enter_window: usize,
    /// Voiced frames within the enter window that confirm speech start.
    pub enter_threshold: usize,
    /// Recent frames inspected for the exit condition.
    pub exit_window: usize,
    /// Voiced frames within the exit window below which speech has ended.
    pub exit_threshold: usize,
    /// Maximum phrase duration in milliseconds, measured from activation.
    pub max_phrase_ms: u64,
    /// Maximum wait for speech in milliseconds, measured from session start.
    pub max_wait_ms: u64,
    /// Frame duration in milliseconds.
    pub frame_ms: u32,
    /// Single-shot or continuous segmentation.
    pub kind: SessionKind,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            enter_window: defaults::ENTER_WINDOW,
            enter_threshold: defaults::ENTER_THRESHOLD,
            exit_window: defaults::EXIT_WINDOW,
            exit_threshold: defaults::EXIT_THRESHOLD,
            max_phrase_ms: defaults::MAX_PHRASE_MS,
            max_wait_ms: defaults::MAX_WAIT_MS,
            frame_ms: defaults::FRAME_MS,
            kind: SessionKind::SingleShot,
        }
    }
}

impl SegmenterConfig {
    /// Validates window geometry and countdown budgets.
    ///
    /// # Errors
    /// Returns `MicgateError::InvalidParams` describing the first offending
    /// field. Validation runs at arm time, never on the real-time path.
    pub fn validate(&self) -> Result<()> {
        if self.frame_ms == 0 {
            return Err(invalid("frame_ms", "must be greater than zero"));
        }
        if self.enter_window == 0 {
            return Err(invalid("enter_window", "must be greater than zero"));
        }
        if self.enter_threshold == 0 || self.enter_threshold > self.enter_window {
            return Err(invalid("enter_threshold", "must be in 1..=enter_window"));
        }
        if self.exit_window == 0 {
            return Err(invalid("exit_window", "must be greater than zero"));
        }
        if self.exit_threshold == 0 || self.exit_threshold > self.exit_window {
            return Err(invalid("exit_threshold", "must be in 1..=exit_window"));
        }
        if self.max_phrase_ms < self.frame_ms as u64 {
            return Err(invalid("max_phrase_ms", "must be at least one frame long"));
        }
        if self.max_wait_ms < self.frame_ms as u64 {
            return Err(invalid("max_wait_ms", "must be at least one frame long"));
        }
        Ok(())
    }

    /// Countdown budget in whole frames; the fractional remainder is dropped.
    fn frames(&self, ms: u64) -> i64 {
        (ms / self.frame_ms as u64) as i64
    }
}

fn invalid(param: &str, message: &str) -> MicgateError {
    MicgateError::InvalidParams {
        param: param.to_string(),
        message: message.to_string(),
    }
}

/// Current state of the segmentation machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentState {
    /// Collecting pre-roll, speech not yet confirmed.
    Idle,
    /// Forwarding frames as a live segment.
    Active,
    /// The session is over; no further frames are accepted.
    Ended,
}

/// Result of feeding one frame through the machine.
#[derive(Debug)]
pub struct Step {
    /// Items to forward to the consumer, in order.
    pub items: Vec<ChannelItem>,
    /// True once the session terminal marker has been emitted.
    pub session_over: bool,
}

/// Hysteresis-gated segmentation state machine.
///
/// One instance per session; never reused across sessions. Re-arming a mode
/// constructs a fresh machine so no stale pre-roll crosses session
/// boundaries.
pub struct Segmenter {
    config: SegmenterConfig,
    state: SegmentState,
    ring: PaddingRing,
    wait_budget: i64,
    phrase_budget: i64,
    session_over: bool,
}

impl Segmenter {
    /// Creates a machine in `Idle` with a fresh enter-window ring.
    ///
    /// # Errors
    /// Returns `MicgateError::InvalidParams` if the configuration is
    /// inconsistent.
    pub fn new(config: SegmenterConfig) -> Result<Self> {
        config.validate()?;
        let wait_budget = config.frames(config.max_wait_ms);
        Ok(Self {
            config,
            state: SegmentState::Idle,
            ring: PaddingRing::new(config.enter_window),
            wait_budget,
            phrase_budget: 0,
            session_over: false,
        })
    }

    /// Returns the current state.
    pub fn state(&self) -> SegmentState {
        self.state
    }

    /// Feeds one classified frame through the machine.
    ///
    /// Every emitted item is in capture order; the terminal marker, once
    /// emitted, is the final item of the session.
    pub fn process(&mut self, frame: Frame, voiced: bool) -> Step {
        let mut items = Vec::new();

        match self.state {
            SegmentState::Idle => self.process_idle(frame, voiced, &mut items),
            SegmentState::Active => self.process_active(frame, voiced, &mut items),
            SegmentState::Ended => {}
        }

        Step {
            items,
            session_over: self.session_over,
        }
    }

    fn process_idle(&mut self, frame: Frame, voiced: bool, items: &mut Vec<ChannelItem>) {
        self.ring.push(frame, voiced);

        // The enter condition is only meaningful over a full window; this is
        // also what puts activation on the frame that completes the window.
        let entered = self.ring.is_full()
            && self.ring.count_voiced_in_last(self.config.enter_window)
                >= self.config.enter_threshold;

        if entered {
            // The ring already holds the triggering frame, so the drained
            // pre-roll ends with it: oldest first, no duplication, no loss.
            let preroll = self.ring.drain_ordered();
            debug!(preroll = preroll.len(), "segment activated");
            for f in preroll {
                items.push(ChannelItem::frame(f, false));
            }

            self.ring.resize(self.config.exit_window);
            self.phrase_budget = self.config.frames(self.config.max_phrase_ms);
            self.state = SegmentState::Active;

            // The activation frame counts as the first frame of Active.
            self.phrase_budget -= 1;
            if self.phrase_budget <= 0 {
                mark_last_as_segment_end(items);
                self.finish_segment(items);
            }
            return;
        }

        self.wait_budget -= 1;
        if self.wait_budget <= 0 {
            // No speech confirmed within the wait window: empty terminal.
            debug!("wait budget exhausted before activation");
            items.push(ChannelItem::EndOfStream);
            self.session_over = true;
            self.state = SegmentState::Ended;
        }
    }

    fn process_active(&mut self, frame: Frame, voiced: bool, items: &mut Vec<ChannelItem>) {
        self.ring.push(frame.clone(), voiced);
        self.phrase_budget -= 1;

        // Confirming "speech ended" waits for a full exit window; until then
        // only the phrase budget can cut the segment.
        let silence_exit = self.ring.is_full()
            && self.ring.count_voiced_in_last(self.config.exit_window)
                < self.config.exit_threshold;
        let forced_exit = self.phrase_budget <= 0;
        let ending = silence_exit || forced_exit;

        items.push(ChannelItem::frame(frame, ending));

        if ending {
            debug!(forced = forced_exit, "segment ended");
            self.finish_segment(items);
        }
    }

    /// Closes the current segment: terminal for single-shot sessions, fresh
    /// `Idle` (new ring, new countdowns) for continuous ones.
    fn finish_segment(&mut self, items: &mut Vec<ChannelItem>) {
        match self.config.kind {
            SessionKind::SingleShot => {
                items.push(ChannelItem::EndOfStream);
                self.session_over = true;
                self.state = SegmentState::Ended;
            }
            SessionKind::Continuous => {
                self.ring.resize(self.config.enter_window);
                self.wait_budget = self.config.frames(self.config.max_wait_ms);
                self.phrase_budget = 0;
                self.state = SegmentState::Idle;
            }
        }
    }
}

fn mark_last_as_segment_end(items: &mut [ChannelItem]) {
    if let Some(ChannelItem::Frame { segment_end, .. }) = items.last_mut() {
        *segment_end = true;
    }
}
