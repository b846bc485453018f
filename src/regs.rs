//! bxCAN registers.

use modular_bitfield::prelude::*;

use crate::stat::LastErrorCode;

/// Base address of the CAN1 register block on STM32F1/F2/F4 parts.
pub const CAN1_BASE: usize = 0x4000_6400;
/// Base address of the CAN2 register block (connectivity-line parts only).
pub const CAN2_BASE: usize = 0x4000_6800;

/// Register offsets relative to the controller's base address.
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Register {
    MCR = 0x000,
    MSR = 0x004,
    TSR = 0x008,
    RF0R = 0x00C,
    RF1R = 0x010,
    IER = 0x014,
    ESR = 0x018,
    BTR = 0x01C,
    TI0R = 0x180,
    TDT0R = 0x184,
    TDL0R = 0x188,
    TDH0R = 0x18C,
    TI1R = 0x190,
    TDT1R = 0x194,
    TDL1R = 0x198,
    TDH1R = 0x19C,
    TI2R = 0x1A0,
    TDT2R = 0x1A4,
    TDL2R = 0x1A8,
    TDH2R = 0x1AC,
    RI0R = 0x1B0,
    RDT0R = 0x1B4,
    RDL0R = 0x1B8,
    RDH0R = 0x1BC,
    RI1R = 0x1C0,
    RDT1R = 0x1C4,
    RDL1R = 0x1C8,
    RDH1R = 0x1CC,
    FMR = 0x200,
    FM1R = 0x204,
    FS1R = 0x20C,
    FFA1R = 0x214,
    FA1R = 0x21C,
    F0R1 = 0x240,
    F0R2 = 0x244,
    F14R1 = 0x2B0,
    F14R2 = 0x2B4,
}

impl Register {
    /// Byte offset of the register from the controller base.
    #[inline]
    pub const fn offset(self) -> usize {
        self as u16 as usize
    }
}

/// Access to one physical controller's register block.
///
/// Implemented by [`Mmio`] for real hardware. The driver only ever calls these
/// from inside a critical section or during bring-up, so implementations need
/// no locking of their own.
pub trait RegisterBlock {
    /// Reads the raw 32-bit content of `reg`.
    fn read(&self, reg: Register) -> u32;

    /// Writes `value` to `reg`.
    fn write(&mut self, reg: Register, value: u32);

    /// Read a register via a register object.
    #[inline]
    fn read_reg<R: Reg>(&self) -> R
    where
        Self: Sized,
    {
        R::read(self.read(R::ADDRESS))
    }

    /// Write to a register using a register object.
    #[inline]
    fn write_reg<R: Reg>(&mut self, reg: R)
    where
        Self: Sized,
    {
        self.write(R::ADDRESS, reg.write());
    }

    /// Reads a register whose layout is shared between several addresses.
    #[inline]
    fn read_as<R: Raw>(&self, reg: Register) -> R
    where
        Self: Sized,
    {
        R::read(self.read(reg))
    }

    /// Writes a register whose layout is shared between several addresses.
    #[inline]
    fn write_as<R: Raw>(&mut self, reg: Register, value: R)
    where
        Self: Sized,
    {
        self.write(reg, value.write());
    }

    /// Read-modify-write of a register object.
    #[inline]
    fn modify_reg<R: Reg>(&mut self, f: impl FnOnce(R) -> R)
    where
        Self: Sized,
    {
        let value = self.read_reg::<R>();
        self.write_reg(f(value));
    }
}

/// Memory-mapped register block.
#[derive(Debug)]
pub struct Mmio {
    base: *mut u32,
}

impl Mmio {
    /// Creates a handle to the register block at `base`.
    ///
    /// # Safety
    ///
    /// `base` must be the address of a bxCAN register block, and only one
    /// `Mmio` may exist per block.
    pub const unsafe fn new(base: usize) -> Self {
        Self {
            base: base as *mut u32,
        }
    }
}

// The block is a fixed peripheral address; ownership of the handle is the
// ownership of the peripheral.
unsafe impl Send for Mmio {}

impl RegisterBlock for Mmio {
    #[inline]
    fn read(&self, reg: Register) -> u32 {
        // Safety: offsets in `Register` are all inside the register block.
        unsafe { core::ptr::read_volatile(self.base.add(reg.offset() / 4)) }
    }

    #[inline]
    fn write(&mut self, reg: Register, value: u32) {
        // Safety: as above.
        unsafe { core::ptr::write_volatile(self.base.add(reg.offset() / 4), value) }
    }
}

/// Conversion between a register layout and its raw 32-bit content.
pub trait Raw: Copy {
    /// Read the register into itself from the raw word.
    fn read(content: u32) -> Self;

    /// Write the register to a raw word.
    fn write(self) -> u32;
}

/// Register layout living at a single fixed address.
pub trait Reg: Raw {
    /// Address of this register.
    const ADDRESS: Register;
}

/// Master control register.
#[bitfield]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mcr {
    /// Initialization request.
    pub inrq: bool,
    /// Sleep mode request.
    pub sleep: bool,
    /// Transmit FIFO priority (chronological order instead of identifier).
    pub txfp: bool,
    /// Receive FIFO locked mode.
    pub rflm: bool,
    /// No automatic retransmission.
    pub nart: bool,
    /// Automatic wakeup mode.
    pub awum: bool,
    /// Automatic bus-off management.
    pub abom: bool,
    /// Time triggered communication mode.
    pub ttcm: bool,
    #[skip]
    __: B7,
    /// Software master reset.
    pub reset: bool,
    /// Debug freeze.
    pub dbf: bool,
    #[skip]
    __: B15,
}

/// Master status register.
#[bitfield]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Msr {
    /// Initialization acknowledge.
    #[skip(setters)]
    pub inak: bool,
    /// Sleep acknowledge.
    #[skip(setters)]
    pub slak: bool,
    pub erri: bool,
    pub wkui: bool,
    pub slaki: bool,
    #[skip]
    __: B3,
    #[skip(setters)]
    pub txm: bool,
    #[skip(setters)]
    pub rxm: bool,
    #[skip(setters)]
    pub samp: bool,
    #[skip(setters)]
    pub rx: bool,
    #[skip]
    __: B20,
}

/// Status bits of one transmit mailbox inside `TSR`.
#[bitfield(bits = 8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, BitfieldSpecifier)]
pub struct MailboxStatus {
    /// Request completed (write 1 to clear).
    pub rqcp: bool,
    /// Transmission OK.
    pub txok: bool,
    /// Arbitration lost.
    pub alst: bool,
    /// Transmission error.
    pub terr: bool,
    #[skip]
    __: B3,
    /// Abort request.
    pub abrq: bool,
}

/// Transmit status register.
#[bitfield]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tsr {
    pub mb0: MailboxStatus,
    pub mb1: MailboxStatus,
    pub mb2: MailboxStatus,
    /// Number of the next empty mailbox.
    #[skip(setters)]
    pub code: B2,
    #[skip(setters)]
    pub tme0: bool,
    #[skip(setters)]
    pub tme1: bool,
    #[skip(setters)]
    pub tme2: bool,
    #[skip(setters)]
    pub low0: bool,
    #[skip(setters)]
    pub low1: bool,
    #[skip(setters)]
    pub low2: bool,
}

/// Receive FIFO register (`RF0R`/`RF1R`).
#[bitfield]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rfr {
    /// Number of pending messages.
    pub fmp: B2,
    #[skip]
    __: B1,
    /// FIFO full (write 1 to clear).
    pub full: bool,
    /// FIFO overrun (write 1 to clear).
    pub fovr: bool,
    /// Release FIFO output mailbox.
    pub rfom: bool,
    #[skip]
    __: B26,
}

impl Rfr {
    /// Value that releases the output mailbox and clears the overrun and full
    /// conditions.
    pub const RELEASE: Self = Self::from_bytes([0b0011_1000, 0, 0, 0]);
}

/// Interrupt enable register.
#[bitfield]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ier {
    /// Transmit mailbox empty.
    pub tmeie: bool,
    /// FIFO 0 message pending.
    pub fmpie0: bool,
    pub ffie0: bool,
    pub fovie0: bool,
    /// FIFO 1 message pending.
    pub fmpie1: bool,
    pub ffie1: bool,
    pub fovie1: bool,
    #[skip]
    __: B1,
    pub ewgie: bool,
    pub epvie: bool,
    pub bofie: bool,
    pub lecie: bool,
    #[skip]
    __: B3,
    pub errie: bool,
    pub wkuie: bool,
    pub slkie: bool,
    #[skip]
    __: B14,
}

/// Error status register.
#[bitfield]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Esr {
    /// Error warning flag.
    #[skip(setters)]
    pub ewgf: bool,
    /// Error passive flag.
    #[skip(setters)]
    pub epvf: bool,
    /// Bus-off flag.
    #[skip(setters)]
    pub boff: bool,
    #[skip]
    __: B1,
    /// Last error code.
    pub lec: LastErrorCode,
    #[skip]
    __: B9,
    /// Transmit error counter.
    #[skip(setters)]
    pub tec: u8,
    /// Receive error counter.
    #[skip(setters)]
    pub rec: u8,
}

/// Bit timing register.
#[bitfield]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Btr {
    /// Baud rate prescaler, minus one.
    pub brp: B10,
    #[skip]
    __: B6,
    /// Time segment 1, minus one.
    pub ts1: B4,
    /// Time segment 2, minus one.
    pub ts2: B3,
    #[skip]
    __: B1,
    /// Resynchronization jump width, minus one.
    pub sjw: B2,
    #[skip]
    __: B4,
    /// Loop back mode.
    pub lbkm: bool,
    /// Silent mode.
    pub silm: bool,
}

/// Mailbox identifier register (`TIxR` and `RIxR`).
///
/// `txrq` is only meaningful on transmit mailboxes and reads as zero on
/// receive mailboxes.
#[bitfield]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MailboxIdent {
    /// Transmit mailbox request.
    pub txrq: bool,
    /// Remote transmission request.
    pub rtr: bool,
    /// Identifier extension.
    pub ide: bool,
    /// Lower 18 bits of an extended identifier.
    pub exid: B18,
    /// Standard identifier, or upper 11 bits of an extended one.
    pub stid: B11,
}

/// Mailbox data length and time stamp register (`TDTxR` and `RDTxR`).
#[bitfield]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MailboxLength {
    /// Data length code.
    pub dlc: B4,
    #[skip]
    __: B4,
    /// Filter match index on receive, transmit global time on transmit.
    pub fmi: u8,
    /// Message time stamp.
    pub time: u16,
}

/// Filter master register.
#[bitfield]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fmr {
    /// Filter init mode.
    pub finit: bool,
    #[skip]
    __: B7,
    /// First filter bank assigned to CAN2.
    pub can2sb: B6,
    #[skip]
    __: B18,
}

macro_rules! raw {
    ($($s:ty),*) => {
        $(
            impl Raw for $s {
                #[inline]
                fn read(content: u32) -> Self {
                    Self::from_bytes(content.to_le_bytes())
                }

                #[inline]
                fn write(self) -> u32 {
                    u32::from_le_bytes(self.into_bytes())
                }
            }
        )*
    };
}

macro_rules! reg {
    ($($s:ty => $reg:expr),*) => {
        $(
            impl Reg for $s {
                const ADDRESS: Register = $reg;
            }
        )*
    };
}

raw! { Mcr, Msr, Tsr, Rfr, Ier, Esr, Btr, MailboxIdent, MailboxLength, Fmr }

reg! {
    Mcr => Register::MCR,
    Msr => Register::MSR,
    Tsr => Register::TSR,
    Ier => Register::IER,
    Esr => Register::ESR,
    Btr => Register::BTR,
    Fmr => Register::FMR
}
