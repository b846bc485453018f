use embedded_hal::can::ErrorKind;
use modular_bitfield::prelude::*;

use crate::regs::Esr;

/// Last error code reported by the controller in `ESR.LEC`.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, BitfieldSpecifier)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "ufmt", derive(ufmt::derive::uDebug))]
#[bits = 3]
pub enum LastErrorCode {
    NoError,
    Stuff,
    Form,
    Acknowledgment,
    BitRecessive,
    BitDominant,
    Crc,
    /// Written by software; the controller never reports this value itself.
    SetBySoftware,
}

impl LastErrorCode {
    /// Maps the code onto the generic `embedded-hal` error kinds.
    pub fn kind(self) -> Option<ErrorKind> {
        match self {
            LastErrorCode::NoError => None,
            LastErrorCode::Stuff => Some(ErrorKind::Stuff),
            LastErrorCode::Form => Some(ErrorKind::Form),
            LastErrorCode::Acknowledgment => Some(ErrorKind::Acknowledge),
            LastErrorCode::BitRecessive | LastErrorCode::BitDominant => Some(ErrorKind::Bit),
            LastErrorCode::Crc => Some(ErrorKind::Crc),
            LastErrorCode::SetBySoftware => Some(ErrorKind::Other),
        }
    }
}

/// Snapshot of the controller's fault confinement state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "ufmt", derive(ufmt::derive::uDebug))]
pub struct ErrorState {
    /// Transmit error counter.
    pub tec: u8,
    /// Receive error counter.
    pub rec: u8,
    /// One of the counters reached the warning limit (96).
    pub warning: bool,
    /// One of the counters exceeded 127.
    pub passive: bool,
    /// The controller entered bus-off.
    pub bus_off: bool,
}

impl From<Esr> for ErrorState {
    fn from(esr: Esr) -> Self {
        Self {
            tec: esr.tec(),
            rec: esr.rec(),
            warning: esr.ewgf(),
            passive: esr.epvf(),
            bus_off: esr.boff(),
        }
    }
}
