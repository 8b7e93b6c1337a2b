//! Consumer-side session handles.
//!
//! Each session owns the receive side of one cross-thread channel and a
//! cooperative stop flag. Sessions are lazy, finite and non-restartable:
//! iteration ends at the terminal marker. A receive timeout is a distinct,
//! recoverable condition; the producer may merely be stalled.

use crate::audio::sink::RecordingSink;
use crate::error::{MicgateError, Result};
use crate::route::channel::{FrameReceiver, Received};
use crate::segment::frame::{ChannelItem, Frame, Segment};
use crate::spotter::KeywordSpotter;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{info, warn};

/// A voice-activity segmented listening session.
///
/// Yields one [`Segment`] per detected utterance until the session's
/// terminal marker arrives.
pub struct ListenSession {
    rx: FrameReceiver,
    stop: Arc<AtomicBool>,
    receive_timeout: Duration,
    current: Vec<Frame>,
    done: bool,
}

impl ListenSession {
    pub(crate) fn new(rx: FrameReceiver, stop: Arc<AtomicBool>, receive_timeout: Duration) -> Self {
        Self {
            rx,
            stop,
            receive_timeout,
            current: Vec::new(),
            done: false,
        }
    }

    /// Waits for the next complete segment.
    ///
    /// Returns `Ok(None)` once the session has ended in order. Frames
    /// collected before a timeout are kept, so a retry after
    /// `ReceiveTimeout` resumes mid-segment without loss.
    ///
    /// # Errors
    /// `ReceiveTimeout` if no item arrived in time (recoverable);
    /// `ProducerDisconnected` if the producer vanished without a terminal.
    pub fn next_segment(&mut self) -> Result<Option<Segment>> {
        if self.done {
            return Ok(None);
        }

        loop {
            match self.rx.recv_timeout(self.receive_timeout) {
                Received::Item(ChannelItem::Frame { frame, segment_end }) => {
                    self.current.push(frame);
                    if segment_end {
                        return Ok(Some(Segment::new(std::mem::take(&mut self.current))));
                    }
                }
                Received::Item(ChannelItem::EndOfStream) => {
                    self.done = true;
                    let frames = std::mem::take(&mut self.current);
                    return if frames.is_empty() {
                        Ok(None)
                    } else {
                        Ok(Some(Segment::new(frames)))
                    };
                }
                Received::TimedOut => {
                    return Err(MicgateError::ReceiveTimeout {
                        timeout_ms: self.receive_timeout.as_millis() as u64,
                    });
                }
                Received::Disconnected => {
                    self.done = true;
                    return Err(MicgateError::ProducerDisconnected);
                }
            }
        }
    }

    /// Requests cancellation. The producer notices within one frame and
    /// emits the terminal marker on its next opportunity.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    /// True once the terminal marker has been received.
    pub fn is_done(&self) -> bool {
        self.done
    }
}

impl Iterator for ListenSession {
    type Item = Result<Segment>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next_segment() {
            Ok(Some(segment)) => Some(Ok(segment)),
            Ok(None) => None,
            Err(e) => Some(Err(e)),
        }
    }
}

/// A wake-word detection session.
///
/// Feeds raw frames to its keyword spotter in capture order and resolves
/// when a hypothesis containing the armed keyword appears.
pub struct DetectSession {
    rx: FrameReceiver,
    stop: Arc<AtomicBool>,
    spotter: Box<dyn KeywordSpotter>,
    keyword: String,
    receive_timeout: Duration,
    done: bool,
}

impl DetectSession {
    pub(crate) fn new(
        rx: FrameReceiver,
        stop: Arc<AtomicBool>,
        spotter: Box<dyn KeywordSpotter>,
        keyword: String,
        receive_timeout: Duration,
    ) -> Self {
        Self {
            rx,
            stop,
            spotter,
            keyword,
            receive_timeout,
            done: false,
        }
    }

    /// Drains frames until the keyword is heard or the session ends.
    ///
    /// A hypothesis that does not contain the keyword restarts the spotter
    /// and keeps listening. Returns `Ok(None)` on orderly end without a
    /// match.
    ///
    /// # Errors
    /// `ReceiveTimeout` (recoverable), `ProducerDisconnected`, or the
    /// spotter's own tagged failure, after which the spotter is no longer
    /// fed.
    pub fn wait_for_keyword(&mut self) -> Result<Option<String>> {
        if self.done {
            return Ok(None);
        }

        loop {
            match self.rx.recv_timeout(self.receive_timeout) {
                Received::Item(ChannelItem::Frame { frame, .. }) => {
                    if let Err(e) = self.spotter.feed(&frame) {
                        // Stop feeding the failed collaborator; other armed
                        // modes are unaffected.
                        self.stop();
                        self.done = true;
                        return Err(e);
                    }

                    if let Some(hypothesis) = self.spotter.poll_hypothesis() {
                        if hypothesis.contains(&self.keyword) {
                            info!(keyword = %self.keyword, "keyword detected");
                            self.stop();
                            self.done = true;
                            return Ok(Some(hypothesis));
                        }
                        // Heard something else: reset for the next utterance.
                        self.spotter.restart();
                    }
                }
                Received::Item(ChannelItem::EndOfStream) => {
                    self.done = true;
                    return Ok(None);
                }
                Received::TimedOut => {
                    return Err(MicgateError::ReceiveTimeout {
                        timeout_ms: self.receive_timeout.as_millis() as u64,
                    });
                }
                Received::Disconnected => {
                    self.done = true;
                    return Err(MicgateError::ProducerDisconnected);
                }
            }
        }
    }

    /// Requests cancellation; latency is bounded by one frame.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}

/// Handle to an armed recording.
pub struct RecordingHandle {
    stop: Arc<AtomicBool>,
    writer: Option<JoinHandle<()>>,
}

impl RecordingHandle {
    pub(crate) fn new(stop: Arc<AtomicBool>, writer: JoinHandle<()>) -> Self {
        Self {
            stop,
            writer: Some(writer),
        }
    }

    /// Requests the recording to end; the sink is flushed and closed by the
    /// writer thread.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    /// Waits for the sink to be flushed and closed.
    ///
    /// # Errors
    /// Returns `MicgateError::RecordingSink` if the writer thread panicked.
    pub fn wait(mut self) -> Result<()> {
        if let Some(writer) = self.writer.take() {
            writer.join().map_err(|_| MicgateError::RecordingSink {
                message: "writer thread panicked".to_string(),
            })?;
        }
        Ok(())
    }
}

/// Spawns the writer thread that drains recording frames into a sink.
///
/// The sink is closed exactly once: on the terminal marker, on producer
/// disconnect, or after a write error.
pub(crate) fn spawn_sink_writer(
    rx: FrameReceiver,
    mut sink: Box<dyn RecordingSink>,
) -> JoinHandle<()> {
    std::thread::spawn(move || {
        loop {
            match rx.recv() {
                Received::Item(ChannelItem::Frame { frame, .. }) => {
                    if let Err(e) = sink.write_frame(&frame) {
                        warn!("recording sink write failed: {}", e);
                        break;
                    }
                }
                Received::Item(ChannelItem::EndOfStream) | Received::Disconnected => break,
                Received::TimedOut => unreachable!("blocking recv cannot time out"),
            }
        }
        if let Err(e) = sink.close() {
            warn!("failed to close recording sink: {}", e);
        }
    })
}
