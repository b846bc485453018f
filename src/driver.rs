//! Driver multiplexer over one or more controllers.

use core::cell::Cell;

use bitflags::bitflags;
use critical_section::Mutex;
use embedded_hal::{blocking::delay::DelayMs, can};

use crate::{
    bridge::FrameSink,
    buffer::RxFifo,
    error::{Error, Result},
    event::Signal,
    filter::FilterConfig,
    frame::{CanFrame, IoFlags},
    iface::{CanIface, Received, SendStatus},
    regs::RegisterBlock,
    stat::{ErrorState, LastErrorCode},
    time::{Clock, Duration, MonotonicTime},
    Settings,
};

/// Most controllers a single driver can multiplex. The filter banks are
/// split between CAN1 and CAN2 only.
pub const MAX_IFACES: usize = 2;

bitflags! {
    /// One bit per interface, bit `i` for interface `i`.
    #[derive(Default)]
    pub struct IfaceMask: u8 {
        const IFACE0 = 1 << 0;
        const IFACE1 = 1 << 1;
    }
}

impl IfaceMask {
    /// Bit of interface `index`; empty for indices without a bit.
    pub fn iface(index: usize) -> Self {
        if index < MAX_IFACES {
            Self::from_bits_truncate(1 << index)
        } else {
            Self::empty()
        }
    }
}

/// Readiness masks: readable interfaces have frames queued, writable ones
/// have a free transmit mailbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SelectMasks {
    pub read: IfaceMask,
    pub write: IfaceMask,
}

impl SelectMasks {
    /// Whether any bit of `requested` is set in `self`.
    pub fn intersects(&self, requested: &SelectMasks) -> bool {
        self.read.intersects(requested.read) || self.write.intersects(requested.write)
    }
}

/// Interrupt vectors of one controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "ufmt", derive(ufmt::derive::uDebug))]
pub enum Vector {
    Tx,
    Rx0,
    Rx1,
}

impl Vector {
    pub const ALL: [Vector; 3] = [Vector::Tx, Vector::Rx0, Vector::Rx1];
}

/// An interrupt line: one vector of one controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "ufmt", derive(ufmt::derive::uDebug))]
pub struct IrqLine {
    pub iface: usize,
    pub vector: Vector,
}

/// Peripheral clock gating for the controllers.
pub trait ClockControl {
    /// Enables the clock domain of controller `iface`.
    fn enable(&mut self, iface: usize);

    /// Pulses the reset line of controller `iface`.
    fn reset(&mut self, iface: usize);

    /// Disables the clock domain of controller `iface`.
    fn disable(&mut self, iface: usize);
}

/// Interrupt controller access.
pub trait InterruptControl {
    /// Unmasks `line` at `priority`.
    fn enable(&mut self, line: IrqLine, priority: u8);
}

/// Driver for `N` controllers with `Q`-frame receive queues.
///
/// Meant to live in a `static` so the interrupt handlers can reach it; every
/// operation takes `&self`.
///
/// ```ignore
/// static CAN: CanDriver<Mmio, SysClock, 1, 32> = CanDriver::new(
///     [CanIface::new(unsafe { Mmio::new(CAN1_BASE) })],
///     SysClock,
///     Settings::new(),
///     None,
/// );
///
/// bxcan_driver::bind_can_interrupts!(CAN => {
///     CAN1_TX = tx(0),
///     CAN1_RX0 = rx0(0),
///     CAN1_RX1 = rx1(0)
/// });
/// ```
pub struct CanDriver<R, C, const N: usize, const Q: usize> {
    ifaces: [CanIface<R, Q>; N],
    clock: C,
    settings: Settings,
    update_event: Signal,
    tx_mb0_sem: Signal,
    registered: Mutex<Cell<IfaceMask>>,
    bridge: Option<&'static dyn FrameSink>,
}

impl<R, C, const N: usize, const Q: usize> CanDriver<R, C, N, Q>
where
    R: RegisterBlock,
    C: Clock,
{
    pub const fn new(
        ifaces: [CanIface<R, Q>; N],
        clock: C,
        settings: Settings,
        bridge: Option<&'static dyn FrameSink>,
    ) -> Self {
        assert!(N > 0 && N <= MAX_IFACES, "unsupported interface count");
        Self {
            ifaces,
            clock,
            settings,
            update_event: Signal::new(),
            tx_mb0_sem: Signal::new(),
            registered: Mutex::new(Cell::new(IfaceMask::empty())),
            bridge,
        }
    }

    /// Number of interfaces.
    #[inline]
    pub const fn iface_count(&self) -> usize {
        N
    }

    #[inline]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    #[inline]
    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Clocks, resets and brings up every controller at `bit_rate`, then
    /// enables their interrupts.
    ///
    /// If a controller fails, the clock domains enabled so far are disabled
    /// again and the error is returned. Interrupt dispatch is enabled only
    /// once all controllers are up.
    pub fn init<CC, IC, D>(&self, bit_rate: u32, rcc: &mut CC, irq: &mut IC, delay: &mut D) -> Result<()>
    where
        CC: ClockControl,
        IC: InterruptControl,
        D: DelayMs<u8>,
    {
        info!("CAN init: {} interfaces, {} bit/s", N, bit_rate);

        critical_section::with(|cs| self.registered.borrow(cs).set(IfaceMask::empty()));
        self.tx_mb0_sem.reset();
        self.update_event.reset();

        for (index, iface) in self.ifaces.iter().enumerate() {
            critical_section::with(|_| {
                rcc.enable(index);
                rcc.reset(index);
            });

            if let Err(err) = iface.init(index, N, bit_rate, &self.settings, delay) {
                error!("CAN iface {} init failed", index);
                for clocked in 0..=index {
                    rcc.disable(clocked);
                }
                return Err(err);
            }
            debug!("CAN iface {} up", index);
        }

        critical_section::with(|cs| {
            let mask = (0..N).fold(IfaceMask::empty(), |mask, index| mask | IfaceMask::iface(index));
            self.registered.borrow(cs).set(mask);
        });

        for iface in 0..N {
            for vector in Vector::ALL {
                irq.enable(IrqLine { iface, vector }, self.settings.irq_priority);
            }
        }

        info!("CAN init done");
        Ok(())
    }

    /// Handle for interface `index`.
    pub fn iface(&self, index: usize) -> Option<Iface<'_, R, C, N, Q>> {
        (index < N).then_some(Iface { driver: self, index })
    }

    /// Like [`CanDriver::iface`], reporting a missing interface as an error.
    pub fn try_iface(&self, index: usize) -> Result<Iface<'_, R, C, N, Q>> {
        self.iface(index)
            .ok_or(Error::NoSuchIface(index.min(u8::MAX as usize) as u8))
    }

    /// Raw access to interface `index`.
    pub fn can_iface(&self, index: usize) -> Option<&CanIface<R, Q>> {
        self.ifaces.get(index)
    }

    /// Current readiness of every interface.
    pub fn make_select_masks(&self) -> SelectMasks {
        self.ifaces
            .iter()
            .enumerate()
            .fold(SelectMasks::default(), |mut masks, (index, iface)| {
                if !iface.is_tx_buffer_full() {
                    masks.write |= IfaceMask::iface(index);
                }
                if !iface.is_rx_buffer_empty() {
                    masks.read |= IfaceMask::iface(index);
                }
                masks
            })
    }

    /// Waits until one of the `requested` readiness bits is set, or until
    /// `deadline`.
    ///
    /// Timed-out transmissions are discarded first. The returned masks are
    /// the full current readiness, which may still not satisfy `requested`
    /// after a wake-up or timeout.
    pub fn select(&self, requested: SelectMasks, deadline: MonotonicTime) -> SelectMasks {
        let now = self.clock.monotonic();
        for iface in &self.ifaces {
            iface.discard_timed_out_transmissions(now);
        }

        let masks = self.make_select_masks();
        if masks.intersects(&requested) {
            return masks;
        }

        self.update_event.wait_until(&self.clock, deadline);
        self.make_select_masks()
    }

    /// Waits up to `timeout` for mailbox 0 of interface 0 to be empty.
    pub fn wait_tx_mb0(&self, timeout: Duration) -> bool {
        let iface = &self.ifaces[0];
        if iface.is_tx_mailbox0_empty() {
            return true;
        }
        self.tx_mb0_sem.wait_for(&self.clock, timeout);
        iface.is_tx_mailbox0_empty()
    }

    /// Whether any interface saw traffic since the previous call. Clears the
    /// latch on every interface.
    pub fn had_activity(&self) -> bool {
        self.ifaces
            .iter()
            .fold(false, |active, iface| iface.had_activity() | active)
    }

    fn is_registered(&self, index: usize) -> bool {
        critical_section::with(|cs| self.registered.borrow(cs).get().contains(IfaceMask::iface(index)))
    }

    fn isr_utc_usec(&self) -> u64 {
        self.clock.utc_usec_from_interrupt().saturating_sub(1)
    }

    /// Transmit interrupt of interface `index`.
    pub fn on_tx_interrupt(&self, index: usize) {
        let iface = match self.ifaces.get(index) {
            Some(iface) if self.is_registered(index) => iface,
            _ => {
                debug_assert!(false, "TX interrupt for unregistered interface");
                return;
            }
        };

        if iface.handle_tx_interrupt(self.isr_utc_usec()) {
            self.tx_mb0_sem.signal();
        }
        self.update_event.signal();
    }

    /// Receive interrupt of `fifo` on interface `index`.
    pub fn on_rx_interrupt(&self, index: usize, fifo: RxFifo) {
        let iface = match self.ifaces.get(index) {
            Some(iface) if self.is_registered(index) => iface,
            _ => {
                debug_assert!(false, "RX interrupt for unregistered interface");
                return;
            }
        };

        if let Some(raw) = iface.handle_rx_interrupt(fifo, self.isr_utc_usec()) {
            if let Some(sink) = self.bridge {
                if sink.accepts(raw.id) {
                    // Dropped when the sink is full.
                    let _ = sink.post(raw);
                }
            }
        }
        self.update_event.signal();
    }
}

/// Borrowed handle for one interface of a [`CanDriver`].
pub struct Iface<'a, R, C, const N: usize, const Q: usize> {
    driver: &'a CanDriver<R, C, N, Q>,
    index: usize,
}

impl<'a, R, C, const N: usize, const Q: usize> Iface<'a, R, C, N, Q>
where
    R: RegisterBlock,
    C: Clock,
{
    fn inner(&self) -> &'a CanIface<R, Q> {
        &self.driver.ifaces[self.index]
    }

    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Queues `frame` for transmission, to be abandoned after `deadline`.
    pub fn send(&self, frame: &CanFrame, deadline: MonotonicTime, flags: IoFlags) -> Result<SendStatus> {
        self.inner().send(frame, deadline, flags)
    }

    pub fn receive(&self) -> Option<Received> {
        self.inner().receive(&self.driver.clock)
    }

    pub fn configure_filters(&self, filters: &[FilterConfig]) -> Result<()> {
        self.inner().configure_filters(filters)
    }

    pub fn error_count(&self) -> u32 {
        self.inner().error_count()
    }

    pub fn last_hardware_error_code(&self) -> Option<LastErrorCode> {
        self.inner().last_hardware_error_code()
    }

    pub fn had_activity(&self) -> bool {
        self.inner().had_activity()
    }

    pub fn rx_queue_length(&self) -> usize {
        self.inner().rx_queue_length()
    }

    pub fn is_tx_buffer_full(&self) -> bool {
        self.inner().is_tx_buffer_full()
    }

    pub fn is_rx_buffer_empty(&self) -> bool {
        self.inner().is_rx_buffer_empty()
    }

    pub fn error_state(&self) -> ErrorState {
        self.inner().error_state()
    }
}

impl<'a, R, C, const N: usize, const Q: usize> can::nb::Can for Iface<'a, R, C, N, Q>
where
    R: RegisterBlock,
    C: Clock,
{
    type Frame = CanFrame;
    type Error = Error;

    /// Never displaces a pending frame, so `Ok` always carries `None`.
    fn transmit(&mut self, frame: &Self::Frame) -> nb::Result<Option<Self::Frame>, Self::Error> {
        let deadline = self.driver.clock.monotonic() + self.driver.settings.tx_timeout;
        match self.send(frame, deadline, IoFlags::empty())? {
            SendStatus::Accepted => Ok(None),
            SendStatus::NoCapacity => Err(nb::Error::WouldBlock),
        }
    }

    fn receive(&mut self) -> nb::Result<Self::Frame, Self::Error> {
        Iface::receive(self)
            .map(|received| received.frame)
            .ok_or(nb::Error::WouldBlock)
    }
}
