use core::fmt;

use embedded_hal::can::ErrorKind;

pub type Result<T> = core::result::Result<T, Error>;

/// Direction of a configuration mode change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "ufmt", derive(ufmt::derive::uDebug))]
pub enum ModeRequest {
    /// Entering initialization mode.
    Enter,
    /// Leaving initialization mode.
    Leave,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "ufmt", derive(ufmt::derive::uDebug))]
pub enum Error {
    /// No timing along the search walk gives exactly this bit rate.
    UnachievableBitRate(u32),
    /// The controller did not acknowledge a mode change in time.
    ModeTimeout(ModeRequest),
    /// Error frames and frames with a data length code above 8 are never sent.
    InvalidFrame,
    /// Hardware acceptance filters cannot be configured.
    FiltersUnsupported,
    /// No interface with this index.
    NoSuchIface(u8),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::UnachievableBitRate(rate) => write!(f, "bit rate {} is unachievable", rate),
            Error::ModeTimeout(ModeRequest::Enter) => f.write_str("init mode not acknowledged"),
            Error::ModeTimeout(ModeRequest::Leave) => f.write_str("init mode exit not acknowledged"),
            Error::InvalidFrame => f.write_str("frame rejected"),
            Error::FiltersUnsupported => f.write_str("acceptance filters not supported"),
            Error::NoSuchIface(index) => write!(f, "no interface {}", index),
        }
    }
}

impl embedded_hal::can::Error for Error {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Other
    }
}
