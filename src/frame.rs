use bitflags::bitflags;
use embedded_hal::can::{Frame, Id};

bitflags! {
    /// Per-frame I/O flags.
    #[derive(Default)]
    pub struct IoFlags: u8 {
        /// On send: deliver a copy back through the receive path once the
        /// frame is on the bus. On receive: the frame is such a copy.
        const LOOPBACK = 1 << 0;
    }
}

/// CAN frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CanFrame {
    /// ID of CAN frame.
    pub(crate) id: Id,
    /// Whether the frame is an RTR frame.
    pub(crate) rtr: bool,
    /// Whether the frame is an error frame. Never transmitted.
    pub(crate) err: bool,
    /// Length of data in CAN frame.
    pub(crate) dlc: u8,
    /// Data, maximum 8 bytes.
    pub(crate) data: [u8; 8],
}

impl CanFrame {
    /// Builds a frame from its raw parts without validating `dlc`.
    ///
    /// Frames with a data length code above 8 are rejected when sent.
    pub const fn from_parts(id: Id, rtr: bool, dlc: u8, data: [u8; 8]) -> Self {
        Self {
            id,
            rtr,
            err: false,
            dlc,
            data,
        }
    }

    /// Builds an error frame. Error frames are only ever observed, the driver
    /// refuses to transmit them.
    pub fn new_error(id: impl Into<Id>) -> Self {
        Self {
            id: id.into(),
            rtr: false,
            err: true,
            dlc: 0,
            data: [0; 8],
        }
    }

    /// Whether this is an error frame.
    #[inline]
    pub fn is_error_frame(&self) -> bool {
        self.err
    }

    /// Raw data length code, possibly above 8 for frames built with
    /// [`CanFrame::from_parts`].
    #[inline]
    pub fn raw_dlc(&self) -> u8 {
        self.dlc
    }

    /// Whether the frame may be loaded into a transmit mailbox.
    #[inline]
    pub(crate) fn is_transmittable(&self) -> bool {
        !self.err && self.dlc <= 8
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for CanFrame {
    fn format(&self, fmt: defmt::Formatter) {
        // [`Id`] does not implement `defmt::Format`
        #[derive(defmt::Format)]
        enum InnerId {
            Standard(u16),
            Extended(u32),
        }

        defmt::write!(
            fmt,
            "CanFrame {{ id: {:#X}, rtr: {}, dlc: {:#X}, data: {:#X} }}",
            match self.id {
                Id::Standard(id) => InnerId::Standard(id.as_raw()),
                Id::Extended(id) => InnerId::Extended(id.as_raw()),
            },
            self.rtr,
            self.dlc,
            self.data()
        );
    }
}

impl Frame for CanFrame {
    fn new(id: impl Into<Id>, data: &[u8]) -> Option<Self> {
        let dlc = u8::try_from(data.len()).ok().filter(|&len| len <= 8)?;
        let mut buf = [0; 8];
        buf[..data.len()].copy_from_slice(data);
        Some(Self::from_parts(id.into(), false, dlc, buf))
    }

    fn new_remote(id: impl Into<Id>, dlc: usize) -> Option<Self> {
        let dlc = u8::try_from(dlc).ok().filter(|&dlc| dlc <= 8)?;
        Some(Self::from_parts(id.into(), true, dlc, [0; 8]))
    }

    #[inline]
    fn is_extended(&self) -> bool {
        matches!(self.id, Id::Extended(_))
    }

    #[inline]
    fn is_remote_frame(&self) -> bool {
        self.rtr
    }

    #[inline]
    fn id(&self) -> Id {
        self.id
    }

    #[inline]
    fn dlc(&self) -> usize {
        self.dlc as usize
    }

    #[inline]
    fn data(&self) -> &[u8] {
        &self.data[..self.dlc().min(8)]
    }
}

/// Raw frame handed to the frame bridge.
///
/// The identifier carries the frame format in its top bits, the way Linux
/// `can_frame` does: [`BridgeFrame::EXT_FLAG`] for extended identifiers and
/// [`BridgeFrame::RTR_FLAG`] for remote frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "ufmt", derive(ufmt::derive::uDebug))]
pub struct BridgeFrame {
    /// Identifier with format flags.
    pub id: u32,
    /// Data length code as read from the mailbox.
    pub dlc: u8,
    /// All eight data bytes of the mailbox, including the ones past `dlc`.
    pub data: [u8; 8],
}

impl BridgeFrame {
    pub const EXT_FLAG: u32 = 1 << 31;
    pub const RTR_FLAG: u32 = 1 << 30;

    /// Identifier with format flags for `frame`.
    pub fn flagged_id(frame: &CanFrame) -> u32 {
        let mut id = match frame.id {
            Id::Standard(id) => u32::from(id.as_raw()),
            Id::Extended(id) => id.as_raw() | Self::EXT_FLAG,
        };
        if frame.rtr {
            id |= Self::RTR_FLAG;
        }
        id
    }
}

impl From<&CanFrame> for BridgeFrame {
    fn from(frame: &CanFrame) -> Self {
        Self {
            id: Self::flagged_id(frame),
            dlc: frame.dlc,
            data: frame.data,
        }
    }
}
