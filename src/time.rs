//! Time sources consumed by the driver.

/// Monotonic instant with microsecond resolution.
pub type MonotonicTime = fugit::TimerInstantU64<1_000_000>;
/// Span of monotonic time.
pub type Duration = fugit::MicrosDurationU64;

/// Wall-clock time of a received frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "ufmt", derive(ufmt::derive::uDebug))]
pub struct UtcTime {
    usec: u64,
}

impl UtcTime {
    #[inline]
    pub const fn from_usec(usec: u64) -> Self {
        Self { usec }
    }

    #[inline]
    pub const fn as_usec(&self) -> u64 {
        self.usec
    }

    /// Whether the clock was synchronized when the timestamp was taken.
    #[inline]
    pub const fn is_valid(&self) -> bool {
        self.usec != 0
    }
}

/// Clock collaborator.
pub trait Clock {
    /// Current monotonic time. Coarse precision is fine.
    fn monotonic(&self) -> MonotonicTime;

    /// UTC microseconds, callable from interrupt context. Zero while the UTC
    /// clock is not synchronized.
    fn utc_usec_from_interrupt(&self) -> u64;

    /// Called repeatedly while a blocking wait has nothing to do.
    ///
    /// A wait only re-checks its signal after this returns, so an interrupt
    /// that fired just before the call must not put the core to sleep, and
    /// the call must return at least once per monotonic tick so deadlines
    /// are noticed. On Cortex-M, `cortex_m::asm::wfe()` fits: taking an
    /// exception sets the event register, so `wfe` returns at once if an
    /// interrupt ran since the previous one. A bare `wfi()` does not, and
    /// only wakes on the next interrupt.
    #[inline]
    fn idle(&self) {
        core::hint::spin_loop();
    }
}

impl<C: Clock> Clock for &C {
    #[inline]
    fn monotonic(&self) -> MonotonicTime {
        (**self).monotonic()
    }

    #[inline]
    fn utc_usec_from_interrupt(&self) -> u64 {
        (**self).utc_usec_from_interrupt()
    }

    #[inline]
    fn idle(&self) {
        (**self).idle()
    }
}
