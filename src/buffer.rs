//! Transmit mailboxes, receive FIFOs and the mailbox register encoding.

use embedded_hal::can::{ExtendedId, Id, StandardId};

use crate::{
    frame::CanFrame,
    regs::{MailboxIdent, MailboxStatus, Register, Tsr},
};

impl MailboxIdent {
    /// Creates a mailbox identification register from a frame.
    pub fn from_frame(frame: &CanFrame) -> Self {
        // Standard: `ide == false`, the identifier goes into `stid`.
        // Extended: `ide == true`, the lower 18 bits go into `exid` and the
        // upper 11 bits into `stid`.
        let reg = MailboxIdent::new().with_rtr(frame.rtr);
        match frame.id {
            Id::Standard(id) => reg.with_ide(false).with_stid(id.as_raw()),
            Id::Extended(id) => reg
                .with_ide(true)
                .with_exid(id.as_raw() & 0x3FFFF)
                .with_stid((id.as_raw() >> 18) as u16),
        }
    }

    /// Identifier stored in the register.
    pub fn id(&self) -> Id {
        if self.ide() {
            let raw = (u32::from(self.stid()) << 18) | self.exid();
            // 11 + 18 bits always fit an extended identifier.
            Id::Extended(ExtendedId::new(raw).unwrap_or(ExtendedId::MAX))
        } else {
            Id::Standard(StandardId::new(self.stid()).unwrap_or(StandardId::MAX))
        }
    }
}

/// Splits `data` into the low and high data register words.
pub(crate) fn data_words(data: &[u8; 8]) -> (u32, u32) {
    (
        u32::from_le_bytes([data[0], data[1], data[2], data[3]]),
        u32::from_le_bytes([data[4], data[5], data[6], data[7]]),
    )
}

/// Joins the low and high data register words back into bytes.
pub(crate) fn data_bytes(low: u32, high: u32) -> [u8; 8] {
    let mut data = [0u8; 8];
    data[..4].copy_from_slice(&low.to_le_bytes());
    data[4..].copy_from_slice(&high.to_le_bytes());
    data
}

crate::mailbox_def! {
    /// Transmit mailbox.
    TxMailbox => {
        /// Tx mailbox 0.
        M0 => [Register::TI0R, Register::TDT0R, Register::TDL0R, Register::TDH0R],
        /// Tx mailbox 1.
        M1 => [Register::TI1R, Register::TDT1R, Register::TDL1R, Register::TDH1R],
        /// Tx mailbox 2.
        M2 => [Register::TI2R, Register::TDT2R, Register::TDL2R, Register::TDH2R]
    }
}

/// Number of hardware transmit mailboxes.
pub const NUM_TX_MAILBOXES: usize = TxMailbox::ALL.len();

impl TxMailbox {
    /// Status bits of this mailbox in `tsr`.
    pub fn status(self, tsr: Tsr) -> MailboxStatus {
        match self {
            TxMailbox::M0 => tsr.mb0(),
            TxMailbox::M1 => tsr.mb1(),
            TxMailbox::M2 => tsr.mb2(),
        }
    }

    /// Whether `tsr` reports this mailbox as empty.
    pub fn is_empty(self, tsr: Tsr) -> bool {
        match self {
            TxMailbox::M0 => tsr.tme0(),
            TxMailbox::M1 => tsr.tme1(),
            TxMailbox::M2 => tsr.tme2(),
        }
    }

    /// `TSR` value writing `status` into this mailbox's bits only.
    pub fn tsr_write(self, status: MailboxStatus) -> Tsr {
        match self {
            TxMailbox::M0 => Tsr::new().with_mb0(status),
            TxMailbox::M1 => Tsr::new().with_mb1(status),
            TxMailbox::M2 => Tsr::new().with_mb2(status),
        }
    }

    /// `TSR` value that clears this mailbox's request-completed flag.
    pub fn clear_completion(self) -> Tsr {
        self.tsr_write(MailboxStatus::new().with_rqcp(true))
    }

    /// `TSR` value that requests this mailbox's transmission be aborted.
    pub fn abort_request(self) -> Tsr {
        self.tsr_write(MailboxStatus::new().with_abrq(true))
    }
}

crate::mailbox_def! {
    /// Receive FIFO.
    RxFifo => {
        /// FIFO 0.
        F0 => [Register::RI0R, Register::RDT0R, Register::RDL0R, Register::RDH0R],
        /// FIFO 1.
        F1 => [Register::RI1R, Register::RDT1R, Register::RDL1R, Register::RDH1R]
    }
}

impl RxFifo {
    /// Returns the FIFO's status register.
    pub const fn rfr(self) -> Register {
        match self {
            RxFifo::F0 => Register::RF0R,
            RxFifo::F1 => Register::RF1R,
        }
    }

    /// FIFO for `index`, if any.
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::regs::Raw;
    use embedded_hal::can::Frame;

    #[test]
    fn standard_id_layout() {
        let frame = CanFrame::new(StandardId::new(0x5A5).unwrap(), &[]).unwrap();
        let reg = MailboxIdent::from_frame(&frame);
        assert_eq!(reg.write(), 0x5A5 << 21);
        assert_eq!(reg.id(), frame.id());
    }

    #[test]
    fn extended_remote_id_layout() {
        let id = ExtendedId::new(0x1ABC_DEF0).unwrap();
        let frame = CanFrame::new_remote(id, 4).unwrap();
        let reg = MailboxIdent::from_frame(&frame);
        assert_eq!(reg.write(), (0x1ABC_DEF0 << 3) | 0b110);
        assert_eq!(MailboxIdent::read(reg.write()).id(), Id::Extended(id));
        assert!(reg.rtr());
    }

    #[test]
    fn data_word_order() {
        let data = [1, 2, 3, 4, 5, 6, 7, 8];
        let (low, high) = data_words(&data);
        assert_eq!(low, 0x0403_0201);
        assert_eq!(high, 0x0807_0605);
        assert_eq!(data_bytes(low, high), data);
    }

    #[test]
    fn mailbox_tsr_bits() {
        assert_eq!(TxMailbox::M1.clear_completion().write(), 1 << 8);
        assert_eq!(TxMailbox::M2.abort_request().write(), 1 << 23);
        assert_eq!(NUM_TX_MAILBOXES, 3);
        assert_eq!(RxFifo::from_index(1), Some(RxFifo::F1));
        assert_eq!(RxFifo::from_index(2), None);
    }
}
