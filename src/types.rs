//! Shared types used across the clock generator firmware
//!
//! This module defines domain-specific types that enforce invariants
//! at compile time and provide type safety throughout the codebase.

use core::fmt;

use crate::config::MAX_OUTPUT_HZ;

/// Output frequency in Hertz with validation
///
/// Represents a frequency a clock channel can be programmed to.
/// Requests arrive in whole megahertz; the value is stored in Hz.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Frequency(u32);

impl Frequency {
    /// Minimum supported frequency (1 MHz, the smallest whole-MHz request)
    pub const MIN_HZ: u32 = 1_000_000;

    /// Maximum supported frequency (150 MHz)
    pub const MAX_HZ: u32 = MAX_OUTPUT_HZ;

    /// Create a new Frequency from Hz, returns None if out of range
    #[must_use]
    pub const fn from_hz(hz: u32) -> Option<Self> {
        if hz >= Self::MIN_HZ && hz <= Self::MAX_HZ {
            Some(Self(hz))
        } else {
            None
        }
    }

    /// Create a new Frequency from whole MHz
    #[must_use]
    pub const fn from_mhz(mhz: u32) -> Option<Self> {
        match mhz.checked_mul(1_000_000) {
            Some(hz) => Self::from_hz(hz),
            None => None,
        }
    }

    /// Get the frequency in Hz
    #[must_use]
    pub const fn as_hz(self) -> u32 {
        self.0
    }

    /// Get the frequency in MHz (truncated)
    #[must_use]
    pub const fn as_mhz(self) -> u32 {
        self.0 / 1_000_000
    }
}

impl fmt::Debug for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Frequency({} Hz)", self.0)
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} MHz", self.0 / 1_000_000)
    }
}

#[cfg(feature = "embedded")]
impl defmt::Format for Frequency {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "{} Hz", self.0);
    }
}

/// Clock output identifier
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClockOutput {
    /// CLK0 output
    Clk0,
    /// CLK1 output
    Clk1,
    /// CLK2 output
    Clk2,
}

impl ClockOutput {
    /// All outputs in register order
    pub const ALL: [Self; 3] = [Self::Clk0, Self::Clk1, Self::Clk2];

    /// Look up an output by channel index (0-2)
    #[must_use]
    pub const fn from_index(index: u8) -> Option<Self> {
        match index {
            0 => Some(Self::Clk0),
            1 => Some(Self::Clk1),
            2 => Some(Self::Clk2),
            _ => None,
        }
    }

    /// Channel index (0-2)
    #[must_use]
    pub const fn index(self) -> u8 {
        match self {
            Self::Clk0 => 0,
            Self::Clk1 => 1,
            Self::Clk2 => 2,
        }
    }

    /// Bit of this output in the Output-Enable register (set = disabled)
    #[must_use]
    pub const fn enable_mask(self) -> u8 {
        1 << self.index()
    }
}

impl fmt::Display for ClockOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CLK{}", self.index())
    }
}

#[cfg(feature = "embedded")]
impl defmt::Format for ClockOutput {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Self::Clk0 => defmt::write!(f, "CLK0"),
            Self::Clk1 => defmt::write!(f, "CLK1"),
            Self::Clk2 => defmt::write!(f, "CLK2"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frequency_bounds() {
        assert!(Frequency::from_mhz(0).is_none());
        assert_eq!(Frequency::from_mhz(1).map(Frequency::as_hz), Some(1_000_000));
        assert_eq!(Frequency::from_mhz(150).map(Frequency::as_mhz), Some(150));
        assert!(Frequency::from_mhz(151).is_none());
        assert!(Frequency::from_mhz(u32::MAX).is_none());
    }

    #[test]
    fn clock_output_index_roundtrip() {
        for out in ClockOutput::ALL {
            assert_eq!(ClockOutput::from_index(out.index()), Some(out));
        }
        assert!(ClockOutput::from_index(3).is_none());
        assert_eq!(ClockOutput::Clk2.enable_mask(), 0b100);
    }
}
