//! Interrupt-to-thread wake signal.

use core::cell::Cell;

use critical_section::Mutex;

use crate::time::{Clock, Duration, MonotonicTime};

/// Binary event: any number of signals before a wait collapse into one
/// wake-up.
///
/// Signalling only takes a short critical section, so it is safe from
/// interrupt context.
#[derive(Debug)]
pub struct Signal {
    raised: Mutex<Cell<bool>>,
}

impl Signal {
    pub const fn new() -> Self {
        Self {
            raised: Mutex::new(Cell::new(false)),
        }
    }

    /// Raises the signal.
    pub fn signal(&self) {
        critical_section::with(|cs| self.raised.borrow(cs).set(true));
    }

    /// Consumes a pending signal, if any.
    pub fn try_take(&self) -> bool {
        critical_section::with(|cs| self.raised.borrow(cs).replace(false))
    }

    /// Drops any pending signal.
    pub fn reset(&self) {
        critical_section::with(|cs| self.raised.borrow(cs).set(false));
    }

    /// Blocks until the signal is raised or `deadline` passes.
    ///
    /// The signal and the deadline are re-checked after every
    /// [`Clock::idle`], see there for what `idle` may do.
    ///
    /// Returns whether the signal was consumed.
    pub fn wait_until<C: Clock>(&self, clock: &C, deadline: MonotonicTime) -> bool {
        loop {
            if self.try_take() {
                return true;
            }
            if clock.monotonic() >= deadline {
                return false;
            }
            clock.idle();
        }
    }

    /// Blocks until the signal is raised or `timeout` elapses.
    pub fn wait_for<C: Clock>(&self, clock: &C, timeout: Duration) -> bool {
        let deadline = clock.monotonic() + timeout;
        self.wait_until(clock, deadline)
    }
}

impl Default for Signal {
    fn default() -> Self {
        Self::new()
    }
}
