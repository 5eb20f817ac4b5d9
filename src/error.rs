//! Controller and console errors
//!
//! Transport failures stay [`BusError`]s; everything the controller or the
//! command dispatcher rejects on its own is described here. `Display` gives
//! the single diagnostic line the console prints for a failure.

use core::fmt;

use crate::hal::i2c::BusError;

/// Result alias for controller and console operations
pub type Result<T> = core::result::Result<T, Error>;

/// Controller / console error
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "embedded", derive(defmt::Format))]
pub enum Error {
    /// A bus transaction failed
    Bus(BusError),
    /// Channel index outside 0..=2
    InvalidChannel(u8),
    /// Requested output above the chip limit
    FrequencyTooHigh {
        /// Requested frequency in MHz
        mhz: u32,
    },
    /// Bring-up ran to completion with failed register writes
    PartialInit {
        /// Number of writes that failed
        failed_writes: u8,
    },
    /// No command matches the verb
    UnknownCommand,
    /// Missing or malformed arguments; holds the usage line
    Usage(&'static str),
}

impl From<BusError> for Error {
    fn from(err: BusError) -> Self {
        Self::Bus(err)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bus(err) => write!(f, "ERR: I2C {err}"),
            Self::InvalidChannel(ch) => write!(f, "ERR: ch={ch} (use 0..2)"),
            Self::FrequencyTooHigh { mhz } => {
                write!(f, "Freq too high ({mhz} MHz > 150 MHz)")
            }
            Self::PartialInit { failed_writes } => {
                write!(f, "ERR: init incomplete, {failed_writes} register write(s) failed")
            }
            Self::UnknownCommand => f.write_str("Unknown command. Type 'help' / 'H' / '?'"),
            Self::Usage(usage) => write!(f, "usage: {usage}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::fmt::Write as _;
    use heapless::String;

    fn render(err: Error) -> String<96> {
        let mut s = String::new();
        write!(s, "{err}").unwrap();
        s
    }

    #[test]
    fn diagnostics_are_single_lines() {
        let all = [
            Error::Bus(BusError::Timeout),
            Error::InvalidChannel(7),
            Error::FrequencyTooHigh { mhz: 200 },
            Error::PartialInit { failed_writes: 2 },
            Error::UnknownCommand,
            Error::Usage("oe on|off"),
        ];
        for err in all {
            let text = render(err);
            assert!(!text.is_empty());
            assert!(!text.contains('\n'));
        }
    }

    #[test]
    fn bus_errors_convert() {
        let err: Error = BusError::NoAcknowledge.into();
        assert_eq!(err, Error::Bus(BusError::NoAcknowledge));
        assert_eq!(render(err).as_str(), "ERR: I2C NACK");
    }
}
