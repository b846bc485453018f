//! Interrupt-driven driver for the STM32 bxCAN controller.
//!
//! [`CanDriver`] owns one or more [`CanIface`]s, each wrapping a controller's
//! register block. Frames are sent into the hardware mailboxes and received
//! into a software queue filled from the interrupt handlers, and
//! [`CanDriver::select`] blocks until an interface becomes readable or
//! writable.
#![no_std]

#[macro_use]
mod fmt;

pub mod bridge;
pub mod buffer;
pub mod driver;
pub mod error;
pub mod event;
pub mod filter;
pub mod frame;
pub mod iface;
pub mod irq;
pub(crate) mod macros;
pub mod queue;
pub mod regs;
pub mod stat;
pub mod time;
pub mod timing;

pub use crate::{
    bridge::{BridgeQueue, FrameSink},
    driver::{CanDriver, ClockControl, Iface, IfaceMask, InterruptControl, IrqLine, SelectMasks, Vector},
    error::{Error, Result},
    frame::{BridgeFrame, CanFrame, IoFlags},
    iface::{CanIface, Received, SendStatus},
    regs::{Mmio, RegisterBlock, CAN1_BASE, CAN2_BASE},
    time::{Clock, Duration, MonotonicTime, UtcTime},
};

/// Controller operating mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "ufmt", derive(ufmt::derive::uDebug))]
pub enum OpMode {
    /// Normal bus operation.
    Normal,
    /// Transmitted frames are received back internally and not driven onto
    /// the bus.
    Loopback,
    /// Receive only, the controller never drives the bus.
    Silent,
    /// Loopback without touching the bus at all. Self test.
    SilentLoopback,
}

impl OpMode {
    /// Whether `BTR.LBKM` is set in this mode.
    #[inline]
    pub const fn loopback(self) -> bool {
        matches!(self, OpMode::Loopback | OpMode::SilentLoopback)
    }

    /// Whether `BTR.SILM` is set in this mode.
    #[inline]
    pub const fn silent(self) -> bool {
        matches!(self, OpMode::Silent | OpMode::SilentLoopback)
    }
}

/// Settings used to initialize the controllers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settings {
    /// Frequency of the peripheral clock feeding the controllers, in Hz.
    pub pclk_hz: u32,
    /// Controller operation mode.
    pub mode: OpMode,
    /// Priority of the controller interrupt vectors.
    pub irq_priority: u8,
    /// How many times the mode acknowledgment is polled before giving up.
    pub ack_attempts: u16,
    /// Delay between two acknowledgment polls, in milliseconds.
    pub ack_poll_ms: u8,
    /// Deadline applied to frames sent through
    /// [`embedded_hal::can::nb::Can`], which has no deadline of its own.
    pub tx_timeout: Duration,
}

impl Settings {
    pub const fn new() -> Self {
        Self {
            pclk_hz: 42_000_000,
            mode: OpMode::Normal,
            irq_priority: 4,
            ack_attempts: 500,
            ack_poll_ms: 2,
            tx_timeout: Duration::secs(1),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::new()
    }
}
