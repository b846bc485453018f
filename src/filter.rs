//! Acceptance filters.

use crate::{
    error::{Error, Result},
    regs::{Fmr, Register, RegisterBlock},
};

/// Number of filter banks owned by the primary controller; the secondary one
/// gets the rest.
pub const NUM_FILTERS: u8 = 14;

/// 32-bit scale for the banks in use with two controllers.
const FS1R_DUAL: u32 = 0x07FF_FFFF;
/// 32-bit scale for the banks in use with one controller.
const FS1R_SINGLE: u32 = 0x1FFF;

/// Identifier/mask acceptance filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "ufmt", derive(ufmt::derive::uDebug))]
pub struct FilterConfig {
    pub id: u32,
    pub mask: u32,
}

/// Programs the shared filter banks so every controller accepts all frames
/// into FIFO 0.
///
/// Only the primary controller (index 0) owns the filter registers. With
/// more than one interface, banks are split at [`NUM_FILTERS`] and the first
/// bank of each half is activated.
pub fn accept_all<R: RegisterBlock>(regs: &mut R, iface_count: usize) {
    regs.modify_reg::<Fmr>(|fmr| fmr.with_finit(true).with_can2sb(NUM_FILTERS));

    // Identifier mask mode, FIFO 0, for every bank.
    regs.write(Register::FFA1R, 0);
    regs.write(Register::FM1R, 0);

    if iface_count > 1 {
        regs.write(Register::FS1R, FS1R_DUAL);
        regs.write(Register::F0R1, 0);
        regs.write(Register::F0R2, 0);
        regs.write(Register::F14R1, 0);
        regs.write(Register::F14R2, 0);
        regs.write(Register::FA1R, 1 | (1 << NUM_FILTERS));
    } else {
        regs.write(Register::FS1R, FS1R_SINGLE);
        regs.write(Register::F0R1, 0);
        regs.write(Register::F0R2, 0);
        regs.write(Register::FA1R, 1);
    }

    regs.modify_reg::<Fmr>(|fmr| fmr.with_finit(false));
}

/// Hardware filter programming is not supported; every request fails.
pub fn configure(_filters: &[FilterConfig]) -> Result<()> {
    Err(Error::FiltersUnsupported)
}
