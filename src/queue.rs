//! Receive ring buffer.

use heapless::Deque;

use crate::frame::{CanFrame, IoFlags};

/// One received (or looped back) frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RxItem {
    pub frame: CanFrame,
    /// UTC time of reception, in microseconds.
    pub utc_usec: u64,
    pub flags: IoFlags,
}

/// Fixed-capacity buffer of received frames.
///
/// Pushing into a full buffer evicts the oldest entry and counts an overflow.
/// There is no locking here; the owning interface serializes access between
/// interrupt and thread context.
#[derive(Debug)]
pub struct RxQueue<const CAP: usize> {
    items: Deque<RxItem, CAP>,
    overflow_cnt: u32,
}

impl<const CAP: usize> RxQueue<CAP> {
    pub const fn new() -> Self {
        assert!(CAP > 0, "receive queue needs a non-zero capacity");
        Self {
            items: Deque::new(),
            overflow_cnt: 0,
        }
    }

    /// Stores a frame, dropping the oldest one if the buffer is full.
    pub fn push(&mut self, frame: CanFrame, utc_usec: u64, flags: IoFlags) {
        if self.items.is_full() {
            self.items.pop_front();
            self.overflow_cnt = self.overflow_cnt.saturating_add(1);
        }
        let item = RxItem {
            frame,
            utc_usec,
            flags,
        };
        // Room was made above.
        let _ = self.items.push_back(item);
    }

    /// Removes the oldest frame.
    ///
    /// The caller checks [`RxQueue::len`] first; popping an empty queue is a
    /// logic error and returns `None` after a debug assertion.
    pub fn pop(&mut self) -> Option<RxItem> {
        debug_assert!(!self.items.is_empty(), "pop from empty receive queue");
        self.items.pop_front()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[inline]
    pub const fn capacity(&self) -> usize {
        CAP
    }

    /// Number of frames evicted because the buffer was full, saturating.
    #[inline]
    pub fn overflow_count(&self) -> u32 {
        self.overflow_cnt
    }
}

impl<const CAP: usize> Default for RxQueue<CAP> {
    fn default() -> Self {
        Self::new()
    }
}
