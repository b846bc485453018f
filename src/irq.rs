//! Interrupt entry points.
//!
//! Each function services one interrupt vector of one controller. Call them
//! from the vector handlers directly, or let [`bind_can_interrupts!`]
//! generate the handlers.
//!
//! [`bind_can_interrupts!`]: crate::bind_can_interrupts

use crate::{buffer::RxFifo, driver::CanDriver, regs::RegisterBlock, time::Clock};

/// Transmit mailbox empty interrupt of interface `iface`.
#[inline]
pub fn tx<R: RegisterBlock, C: Clock, const N: usize, const Q: usize>(
    driver: &CanDriver<R, C, N, Q>,
    iface: usize,
) {
    driver.on_tx_interrupt(iface);
}

/// FIFO 0 message pending interrupt of interface `iface`.
#[inline]
pub fn rx0<R: RegisterBlock, C: Clock, const N: usize, const Q: usize>(
    driver: &CanDriver<R, C, N, Q>,
    iface: usize,
) {
    driver.on_rx_interrupt(iface, RxFifo::F0);
}

/// FIFO 1 message pending interrupt of interface `iface`.
#[inline]
pub fn rx1<R: RegisterBlock, C: Clock, const N: usize, const Q: usize>(
    driver: &CanDriver<R, C, N, Q>,
    iface: usize,
) {
    driver.on_rx_interrupt(iface, RxFifo::F1);
}
