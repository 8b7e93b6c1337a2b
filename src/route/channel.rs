//! Cross-thread frame channel.
//!
//! Carries [`ChannelItem`]s from the real-time producer to a non-real-time
//! consumer. Backpressure policy is **grow**: the producer-side `send` never
//! blocks; instead, a depth threshold that is exceeded logs a
//! "{N} frames delayed" diagnostic (once per crossing). All blocking happens
//! on the consumer side through `recv_timeout`.

use crate::segment::frame::ChannelItem;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use std::time::Duration;
use tracing::warn;

/// Creates a connected producer/consumer pair.
///
/// `delay_threshold` is the queue depth above which the delay diagnostic is
/// logged.
pub fn frame_channel(delay_threshold: usize) -> (FrameSender, FrameReceiver) {
    let (tx, rx) = crossbeam_channel::unbounded();
    (
        FrameSender {
            tx,
            delay_threshold,
            delayed: false,
        },
        FrameReceiver { rx },
    )
}

/// Producer side. Single-owner; lives on the real-time thread.
pub struct FrameSender {
    tx: Sender<ChannelItem>,
    delay_threshold: usize,
    delayed: bool,
}

impl FrameSender {
    /// Enqueues an item without blocking.
    ///
    /// Returns false if the consumer has gone away; the caller stops
    /// forwarding to this session.
    pub fn send(&mut self, item: ChannelItem) -> bool {
        let depth = self.tx.len();
        if depth > self.delay_threshold {
            if !self.delayed {
                warn!("{} frames delayed", depth);
                self.delayed = true;
            }
        } else {
            self.delayed = false;
        }

        self.tx.send(item).is_ok()
    }
}

/// Outcome of a consumer-side receive.
///
/// A timeout is NOT the same as the terminal marker: a timeout means the
/// producer has stalled or stopped unexpectedly, while the terminal marker
/// is the orderly end of the session.
#[derive(Debug)]
pub enum Received {
    /// The next item in capture order.
    Item(ChannelItem),
    /// No item arrived within the timeout.
    TimedOut,
    /// The producer dropped its sender without a terminal marker.
    Disconnected,
}

/// Consumer side.
pub struct FrameReceiver {
    rx: Receiver<ChannelItem>,
}

impl FrameReceiver {
    /// Waits up to `timeout` for the next item.
    pub fn recv_timeout(&self, timeout: Duration) -> Received {
        match self.rx.recv_timeout(timeout) {
            Ok(item) => Received::Item(item),
            Err(RecvTimeoutError::Timeout) => Received::TimedOut,
            Err(RecvTimeoutError::Disconnected) => Received::Disconnected,
        }
    }

    /// Blocks until the next item or producer disconnect. Never yields
    /// [`Received::TimedOut`].
    pub fn recv(&self) -> Received {
        match self.rx.recv() {
            Ok(item) => Received::Item(item),
            Err(_) => Received::Disconnected,
        }
    }

    /// Current queue depth.
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    /// Returns true if no items are queued.
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::frame::Frame;

    fn item(seq: u64) -> ChannelItem {
        ChannelItem::frame(Frame::new(seq, vec![0i16; 4]), false)
    }

    #[test]
    fn test_items_arrive_in_order() {
        let (mut tx, rx) = frame_channel(4);

        for seq in 0..10 {
            assert!(tx.send(item(seq)));
        }
        tx.send(ChannelItem::EndOfStream);

        let mut sequences = Vec::new();
        loop {
            match rx.recv_timeout(Duration::from_millis(100)) {
                Received::Item(ChannelItem::Frame { frame, .. }) => {
                    sequences.push(frame.sequence);
                }
                Received::Item(ChannelItem::EndOfStream) => break,
                other => panic!("unexpected receive outcome: {:?}", other),
            }
        }

        assert_eq!(sequences, (0..10).collect::<Vec<u64>>());
    }

    #[test]
    fn test_send_never_blocks_past_threshold() {
        let (mut tx, rx) = frame_channel(4);

        // Far beyond the threshold: grow policy, no blocking.
        for seq in 0..100 {
            assert!(tx.send(item(seq)));
        }
        assert_eq!(rx.len(), 100);
    }

    #[test]
    fn test_send_reports_disconnected_consumer() {
        let (mut tx, rx) = frame_channel(4);
        drop(rx);
        assert!(!tx.send(item(0)));
    }

    #[test]
    fn test_recv_timeout_on_empty_channel() {
        let (_tx, rx) = frame_channel(4);
        let outcome = rx.recv_timeout(Duration::from_millis(10));
        assert!(matches!(outcome, Received::TimedOut));
    }

    #[test]
    fn test_recv_distinguishes_disconnect_from_timeout() {
        let (tx, rx) = frame_channel(4);
        drop(tx);
        let outcome = rx.recv_timeout(Duration::from_millis(10));
        assert!(matches!(outcome, Received::Disconnected));
    }

    #[test]
    fn test_cross_thread_ordering() {
        let (mut tx, rx) = frame_channel(4);

        let producer = std::thread::spawn(move || {
            for seq in 0..500 {
                tx.send(item(seq));
            }
            tx.send(ChannelItem::EndOfStream);
        });

        let mut expected = 0u64;
        loop {
            match rx.recv_timeout(Duration::from_secs(1)) {
                Received::Item(ChannelItem::Frame { frame, .. }) => {
                    assert_eq!(frame.sequence, expected);
                    expected += 1;
                }
                Received::Item(ChannelItem::EndOfStream) => break,
                other => panic!("unexpected receive outcome: {:?}", other),
            }
        }

        assert_eq!(expected, 500);
        producer.join().unwrap();
    }
}
