//! Padding ring buffer.
//!
//! Bounded circular store of the most recent frames and their speech flags,
//! sized to whichever hysteresis window the state machine is currently
//! evaluating. The buffered frames become the pre-roll of a segment when
//! speech is confirmed, so the start of an utterance is not lost.

use crate::segment::frame::Frame;
use std::collections::VecDeque;

/// Fixed-capacity ring of (frame, speech flag) pairs with FIFO eviction.
///
/// All operations are O(window size) at worst and never block, so the ring
/// is safe to drive from the real-time producer path.
#[derive(Debug)]
pub struct PaddingRing {
    entries: VecDeque<(Frame, bool)>,
    capacity: usize,
}

impl PaddingRing {
    /// Creates an empty ring with the given capacity.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Appends an entry, evicting the oldest once at capacity.
    pub fn push(&mut self, frame: Frame, voiced: bool) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back((frame, voiced));
    }

    /// Counts voiced flags among the most recent `k` pushes.
    ///
    /// `k` is clamped to the number of entries currently held; callers pass
    /// `k <= capacity`.
    pub fn count_voiced_in_last(&self, k: usize) -> usize {
        self.entries
            .iter()
            .rev()
            .take(k)
            .filter(|(_, voiced)| *voiced)
            .count()
    }

    /// Returns all currently held frames in capture order.
    ///
    /// The buffer contents are left untouched; callers reset separately via
    /// [`clear`](Self::clear) or [`resize`](Self::resize).
    pub fn drain_ordered(&self) -> Vec<Frame> {
        self.entries.iter().map(|(frame, _)| frame.clone()).collect()
    }

    /// Resets the ring to empty, keeping its capacity.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Changes the capacity and clears all entries.
    ///
    /// Enter-window and exit-window contents are never shared: switching
    /// windows always starts from an empty buffer.
    pub fn resize(&mut self, capacity: usize) {
        self.capacity = capacity;
        self.entries.clear();
    }

    /// Returns the number of entries currently held.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the ring holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the current capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns true if the ring holds a full window of entries.
    pub fn is_full(&self) -> bool {
        self.entries.len() == self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(seq: u64) -> Frame {
        Frame::new(seq, vec![seq as i16; 4])
    }

    #[test]
    fn test_push_below_capacity() {
        let mut ring = PaddingRing::new(4);
        ring.push(frame(0), false);
        ring.push(frame(1), true);

        assert_eq!(ring.len(), 2);
        assert!(!ring.is_full());
    }

    #[test]
    fn test_push_evicts_oldest_at_capacity() {
        let mut ring = PaddingRing::new(3);
        for seq in 0..5 {
            ring.push(frame(seq), false);
        }

        assert_eq!(ring.len(), 3);
        let frames = ring.drain_ordered();
        let sequences: Vec<u64> = frames.iter().map(|f| f.sequence).collect();
        assert_eq!(sequences, vec![2, 3, 4]);
    }

    #[test]
    fn test_count_voiced_in_last() {
        let mut ring = PaddingRing::new(8);
        let flags = [false, false, true, true, false, true];
        for (seq, &voiced) in flags.iter().enumerate() {
            ring.push(frame(seq as u64), voiced);
        }

        assert_eq!(ring.count_voiced_in_last(6), 3);
        assert_eq!(ring.count_voiced_in_last(3), 2);
        assert_eq!(ring.count_voiced_in_last(1), 1);
    }

    #[test]
    fn test_count_voiced_with_fewer_entries_than_window() {
        let mut ring = PaddingRing::new(8);
        ring.push(frame(0), true);
        ring.push(frame(1), true);

        assert_eq!(ring.count_voiced_in_last(8), 2);
    }

    #[test]
    fn test_drain_ordered_preserves_capture_order() {
        let mut ring = PaddingRing::new(4);
        for seq in 0..4 {
            ring.push(frame(seq), seq % 2 == 0);
        }

        let frames = ring.drain_ordered();
        let sequences: Vec<u64> = frames.iter().map(|f| f.sequence).collect();
        assert_eq!(sequences, vec![0, 1, 2, 3]);

        // Non-destructive: the entries are still there
        assert_eq!(ring.len(), 4);
    }

    #[test]
    fn test_clear_resets_to_empty() {
        let mut ring = PaddingRing::new(4);
        ring.push(frame(0), true);
        ring.clear();

        assert!(ring.is_empty());
        assert_eq!(ring.capacity(), 4);
        assert_eq!(ring.count_voiced_in_last(4), 0);
    }

    #[test]
    fn test_resize_changes_capacity_and_clears() {
        let mut ring = PaddingRing::new(4);
        for seq in 0..4 {
            ring.push(frame(seq), true);
        }

        ring.resize(48);
        assert!(ring.is_empty());
        assert_eq!(ring.capacity(), 48);

        // Eviction now happens at the new capacity
        for seq in 0..50 {
            ring.push(frame(seq), false);
        }
        assert_eq!(ring.len(), 48);
    }

    #[test]
    fn test_is_full() {
        let mut ring = PaddingRing::new(2);
        assert!(!ring.is_full());
        ring.push(frame(0), false);
        assert!(!ring.is_full());
        ring.push(frame(1), false);
        assert!(ring.is_full());
        ring.push(frame(2), false);
        assert!(ring.is_full());
        assert_eq!(ring.len(), 2);
    }
}
