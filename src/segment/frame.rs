//! Frame and channel item types.
//!
//! Defines the data structures that flow from the real-time producer to
//! session consumers.

/// Fixed-duration block of mono 16-bit PCM samples, the atomic unit of the
/// pipeline.
///
/// Immutable once captured; the sample count always equals the configured
/// frame geometry (e.g. 480 samples for 30ms at 16kHz).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Sequence number for ordering frames within a capture stream.
    pub sequence: u64,
    /// Audio samples as 16-bit PCM.
    pub samples: Vec<i16>,
}

impl Frame {
    /// Creates a new frame.
    pub fn new(sequence: u64, samples: Vec<i16>) -> Self {
        Self { sequence, samples }
    }

    /// Returns the duration of this frame in milliseconds.
    pub fn duration_ms(&self, sample_rate: u32) -> u32 {
        (self.samples.len() as u32 * 1000) / sample_rate
    }
}

/// One item on a session's cross-thread channel.
///
/// A session's stream is a sequence of frames, with the last frame of each
/// segment flagged, terminated by exactly one [`ChannelItem::EndOfStream`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelItem {
    /// An audio frame; `segment_end` marks the final frame of a segment.
    Frame {
        frame: Frame,
        segment_end: bool,
    },
    /// Orderly end of the session. Always the last item.
    EndOfStream,
}

impl ChannelItem {
    /// Wraps a frame as a channel item.
    pub fn frame(frame: Frame, segment_end: bool) -> Self {
        Self::Frame { frame, segment_end }
    }

    /// Returns true if this is the terminal marker.
    pub fn is_end_of_stream(&self) -> bool {
        matches!(self, ChannelItem::EndOfStream)
    }
}

/// One bounded span of audio frames considered a single utterance.
///
/// The first frames are the pre-roll captured before the activation point,
/// in original capture order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    /// Frames in capture order, pre-roll first.
    pub frames: Vec<Frame>,
}

impl Segment {
    /// Creates a segment from frames in capture order.
    pub fn new(frames: Vec<Frame>) -> Self {
        Self { frames }
    }

    /// Returns the number of frames in this segment.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Returns true if the segment holds no frames.
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Concatenates all frames into a single PCM buffer in capture order.
    pub fn samples(&self) -> Vec<i16> {
        let total: usize = self.frames.iter().map(|f| f.samples.len()).sum();
        let mut out = Vec::with_capacity(total);
        for frame in &self.frames {
            out.extend_from_slice(&frame.samples);
        }
        out
    }

    /// Returns the duration of this segment in milliseconds.
    pub fn duration_ms(&self, sample_rate: u32) -> u32 {
        let samples: usize = self.frames.iter().map(|f| f.samples.len()).sum();
        (samples as u32 * 1000) / sample_rate
    }
}
