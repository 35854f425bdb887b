//! Bounded queue for compressed frames
//!
//! The single handoff point between the capture worker and the sender
//! worker. When the queue is full the oldest frame is evicted to make
//! room; the producer never blocks.

use std::collections::VecDeque;

use bytes::Bytes;
use parking_lot::Mutex;

/// Fixed-capacity FIFO of compressed frames with drop-oldest overflow.
///
/// Eviction is layered on top of the deque inside one critical section,
/// so the size can never exceed `capacity` even under concurrent pushes.
pub struct BoundedFrameQueue {
    frames: Mutex<VecDeque<Bytes>>,
    capacity: usize,
}

impl BoundedFrameQueue {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "queue capacity must be non-zero");
        Self {
            frames: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    /// Insert a frame, evicting and returning the oldest one if the queue
    /// is at capacity. Never blocks.
    pub fn push(&self, frame: Bytes) -> Option<Bytes> {
        let mut frames = self.frames.lock();
        let evicted = if frames.len() >= self.capacity {
            frames.pop_front()
        } else {
            None
        };
        frames.push_back(frame);
        evicted
    }

    /// Non-blocking pop of the oldest frame
    pub fn pop(&self) -> Option<Bytes> {
        self.frames.lock().pop_front()
    }

    pub fn clear(&self) {
        self.frames.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.frames.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(tag: u8) -> Bytes {
        Bytes::from(vec![tag; 4])
    }

    #[test]
    fn fifo_order_within_capacity() {
        let queue = BoundedFrameQueue::new(5);
        for tag in 0..3 {
            assert!(queue.push(frame(tag)).is_none());
        }
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.pop(), Some(frame(0)));
        assert_eq!(queue.pop(), Some(frame(1)));
        assert_eq!(queue.pop(), Some(frame(2)));
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn overflow_evicts_oldest_and_never_exceeds_capacity() {
        let queue = BoundedFrameQueue::new(5);
        let mut evictions = 0;
        for tag in 0..8 {
            if let Some(oldest) = queue.push(frame(tag)) {
                evictions += 1;
                // Evictions come out in insertion order: frames 0, 1, 2
                assert_eq!(oldest, frame(evictions - 1));
            }
            assert!(queue.len() <= queue.capacity());
        }

        // 8 inserts into capacity 5: exactly 3 evictions, the 5 newest remain
        assert_eq!(evictions, 3);
        assert_eq!(queue.len(), 5);
        for tag in 3..8 {
            assert_eq!(queue.pop(), Some(frame(tag)));
        }
        assert!(queue.is_empty());
    }

    #[test]
    fn clear_discards_everything() {
        let queue = BoundedFrameQueue::new(2);
        queue.push(frame(1));
        queue.push(frame(2));
        queue.clear();
        assert!(queue.is_empty());
        assert_eq!(queue.pop(), None);
    }
}
