//! Single-slot, last-write-wins frame store.
//!
//! Backed by a `tokio::sync::watch` channel: publishing replaces the value
//! in place and never waits for readers, and readers only ever see the most
//! recent frame.

use crate::capture::Frame;
use std::sync::Arc;
use tokio::sync::watch;

/// Latest-frame store shared between the capture thread and the renderer.
///
/// Cloning yields another handle to the same slot.
#[derive(Debug, Clone)]
pub struct FrameSlot {
    tx: Arc<watch::Sender<Option<Frame>>>,
}

impl FrameSlot {
    /// Creates an empty slot.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// Replaces the current frame. Never blocks, with or without readers.
    pub fn publish(&self, frame: Frame) {
        tracing::trace!(sequence = frame.sequence(), "Frame published");
        self.tx.send_replace(Some(frame));
    }

    /// Returns the most recent frame, or `None` before the first publish.
    pub fn current(&self) -> Option<Frame> {
        self.tx.borrow().clone()
    }

    /// Opens a subscription that observes future publishes.
    pub fn subscribe(&self) -> FrameSubscription {
        FrameSubscription {
            rx: self.tx.subscribe(),
        }
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for FrameSlot {
    fn default() -> Self {
        Self::new()
    }
}

/// Reader side of a [`FrameSlot`].
#[derive(Debug, Clone)]
pub struct FrameSubscription {
    rx: watch::Receiver<Option<Frame>>,
}

impl FrameSubscription {
    /// Most recent frame, marking it as seen.
    pub fn latest(&mut self) -> Option<Frame> {
        self.rx.borrow_and_update().clone()
    }

    /// True if a frame was published since the last `latest` or `changed`.
    pub fn has_changed(&self) -> bool {
        self.rx.has_changed().unwrap_or(false)
    }

    /// Waits for the next publish and returns the frame it stored.
    ///
    /// Returns `None` once every [`FrameSlot`] handle has been dropped.
    pub async fn changed(&mut self) -> Option<Frame> {
        self.rx.changed().await.ok()?;
        self.rx.borrow_and_update().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn frame(sequence: u64) -> Frame {
        Frame::from_rgba(vec![0u8; 4], 1, 1, sequence).unwrap()
    }

    #[test]
    fn test_empty_before_publish() {
        let slot = FrameSlot::new();
        assert!(slot.current().is_none());
        assert!(slot.subscribe().latest().is_none());
    }

    #[test]
    fn test_publish_without_subscribers() {
        let slot = FrameSlot::new();
        assert_eq!(slot.subscriber_count(), 0);
        slot.publish(frame(1));
        assert_eq!(slot.current().unwrap().sequence(), 1);
    }

    #[test]
    fn test_subscription_sees_change_once() {
        let slot = FrameSlot::new();
        let mut sub = slot.subscribe();
        assert!(!sub.has_changed());

        slot.publish(frame(1));
        slot.publish(frame(2));
        assert!(sub.has_changed());
        assert_eq!(sub.latest().unwrap().sequence(), 2);
        assert!(!sub.has_changed());
    }

    #[test]
    fn test_clones_share_slot() {
        let slot = FrameSlot::new();
        let other = slot.clone();
        other.publish(frame(7));
        assert_eq!(slot.current().unwrap().sequence(), 7);
    }

    #[tokio::test]
    async fn test_changed_wakes_on_publish() {
        let slot = FrameSlot::new();
        let mut sub = slot.subscribe();

        let publisher = slot.clone();
        let handle = std::thread::spawn(move || publisher.publish(frame(5)));

        let received = sub.changed().await.unwrap();
        assert_eq!(received.sequence(), 5);
        handle.join().unwrap();
    }

    #[tokio::test]
    async fn test_changed_ends_when_slot_dropped() {
        let slot = FrameSlot::new();
        let mut sub = slot.subscribe();
        drop(slot);
        assert!(sub.changed().await.is_none());
    }

    #[test]
    fn test_concurrent_publishers_leave_one_of_the_last_writes() {
        let slot = FrameSlot::new();
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let slot = slot.clone();
                std::thread::spawn(move || {
                    for i in 0..100 {
                        slot.publish(frame(t * 1000 + i));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let last = slot.current().unwrap().sequence();
        assert!([99, 1099, 2099, 3099].contains(&last));
    }

    proptest! {
        #[test]
        fn prop_last_write_wins(sequences in proptest::collection::vec(any::<u64>(), 1..64)) {
            let slot = FrameSlot::new();
            let mut sub = slot.subscribe();
            for &sequence in &sequences {
                slot.publish(frame(sequence));
            }
            let expected = *sequences.last().unwrap();
            prop_assert_eq!(slot.current().unwrap().sequence(), expected);
            prop_assert_eq!(sub.latest().unwrap().sequence(), expected);
        }
    }
}
