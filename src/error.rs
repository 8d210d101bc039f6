//! Error definitions for the power management array.

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, PartialEq, Eq)]
pub enum Error<PinError, SenseError> {
    /// Driving a trigger or diagnostic-enable line failed.
    Pin(PinError),
    /// Reading a sense line from the ADC failed.
    Sense(SenseError),
    /// Channel index outside `0..N`. The command was ignored.
    InvalidChannel(usize),
}

impl<PinError: core::fmt::Debug, SenseError: core::fmt::Debug> core::fmt::Display for Error<PinError, SenseError> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Error::Pin(e) => write!(f, "pin error: {:?}", e),
            Error::Sense(e) => write!(f, "sense error: {:?}", e),
            Error::InvalidChannel(ch) => write!(f, "invalid channel {}", ch),
        }
    }
}
