//! Copies of received frames for an external frame bridge.

use core::cell::{Cell, RefCell};

use critical_section::Mutex;
use heapless::Deque;

use crate::frame::BridgeFrame;

/// Consumer of raw received frames, fed from the RX interrupt.
pub trait FrameSink: Sync {
    /// Whether frames with this flagged identifier should be forwarded.
    fn accepts(&self, id: u32) -> bool;

    /// Hands over a frame. Must not block. A frame that cannot be taken is
    /// returned and dropped by the caller.
    fn post(&self, frame: BridgeFrame) -> Result<(), BridgeFrame>;
}

/// Bounded queue implementing [`FrameSink`], drained from thread context.
pub struct BridgeQueue<const N: usize> {
    filter: fn(u32) -> bool,
    queue: Mutex<RefCell<Deque<BridgeFrame, N>>>,
    dropped: Mutex<Cell<u32>>,
}

impl<const N: usize> BridgeQueue<N> {
    /// Creates a queue forwarding frames whose flagged identifier passes
    /// `filter`.
    pub const fn new(filter: fn(u32) -> bool) -> Self {
        Self {
            filter,
            queue: Mutex::new(RefCell::new(Deque::new())),
            dropped: Mutex::new(Cell::new(0)),
        }
    }

    /// Takes the oldest forwarded frame.
    pub fn pop(&self) -> Option<BridgeFrame> {
        critical_section::with(|cs| self.queue.borrow_ref_mut(cs).pop_front())
    }

    pub fn len(&self) -> usize {
        critical_section::with(|cs| self.queue.borrow_ref(cs).len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Frames lost because the queue was full, saturating.
    pub fn dropped(&self) -> u32 {
        critical_section::with(|cs| self.dropped.borrow(cs).get())
    }
}

impl<const N: usize> FrameSink for BridgeQueue<N> {
    fn accepts(&self, id: u32) -> bool {
        (self.filter)(id)
    }

    fn post(&self, frame: BridgeFrame) -> Result<(), BridgeFrame> {
        critical_section::with(|cs| {
            let result = self.queue.borrow_ref_mut(cs).push_back(frame);
            if result.is_err() {
                let dropped = self.dropped.borrow(cs);
                dropped.set(dropped.get().saturating_add(1));
            }
            result
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(id: u32) -> BridgeFrame {
        BridgeFrame {
            id,
            dlc: 1,
            data: [id as u8, 0, 0, 0, 0, 0, 0, 0],
        }
    }

    #[test]
    fn bounded_and_ordered() {
        let q = BridgeQueue::<2>::new(|_| true);
        assert!(q.post(frame(1)).is_ok());
        assert!(q.post(frame(2)).is_ok());
        assert_eq!(q.post(frame(3)), Err(frame(3)));
        assert_eq!(q.dropped(), 1);
        assert_eq!(q.len(), 2);
        assert_eq!(q.pop(), Some(frame(1)));
        assert_eq!(q.pop(), Some(frame(2)));
        assert!(q.is_empty());
    }

    #[test]
    fn filter_predicate() {
        let q = BridgeQueue::<4>::new(|id| id & BridgeFrame::EXT_FLAG != 0);
        assert!(!q.accepts(0x123));
        assert!(q.accepts(0x123 | BridgeFrame::EXT_FLAG));
    }
}
