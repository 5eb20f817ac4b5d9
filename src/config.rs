//! System configuration and hardware constants
//!
//! This module defines compile-time constants for the clock generator board.
//! Bus timing, chip constants, pin mappings and console limits are centralized here.

use crate::types::Frequency;

/// I2C bus frequency for the `Si5351A` (standard mode; the chip tolerates 400 kHz)
pub const I2C_FREQUENCY_HZ: u32 = 100_000;

/// I2C peripheral index used for the clock bus
pub const I2C_PORT: u8 = 1;

/// `Si5351A` I2C address
pub const SI5351_I2C_ADDR: u8 = 0x60;

/// `Si5351A` crystal frequency (25 MHz standard)
pub const SI5351_XTAL_FREQ: u32 = 25_000_000;

/// PLL A feedback multiplier (25 MHz × 32 = 800 MHz)
pub const PLLA_MULTIPLIER: u32 = 32;

/// Highest output frequency accepted for a channel
pub const MAX_OUTPUT_HZ: u32 = 150_000_000;

/// CLK0 frequency programmed by the basic bring-up sequence
pub const DEFAULT_CLK0_MHZ: u32 = 100;

/// Per-phase transaction timeout in microseconds
pub const I2C_PHASE_TIMEOUT_US: u32 = 2_000;

/// Per-address probe timeout used by the quick scan
pub const I2C_PROBE_TIMEOUT_US: u32 = 1_000;

/// Delay between attempts of the retrying wrappers
pub const I2C_RETRY_INTERVAL_MS: u32 = 2;

/// Default window for the retrying wrappers
pub const I2C_RETRY_WINDOW_MS: u32 = 20;

/// Settling delay between tearing the bus down and bringing it back up
pub const I2C_RESET_SETTLE_MS: u32 = 50;

/// Longest register burst written in one transaction
pub const I2C_MAX_BURST: usize = 8;

/// First probed 7-bit address (0x00-0x07 are reserved)
pub const I2C_SCAN_FIRST: u8 = 0x08;

/// Last probed 7-bit address (0x78-0x7F are reserved)
pub const I2C_SCAN_LAST: u8 = 0x77;

/// Clock pulses issued by the bus-clear sequence (one stuck byte plus ACK)
pub const BUS_CLEAR_MAX_PULSES: u8 = 9;

/// Half period of a bus-clear clock pulse in microseconds
pub const BUS_CLEAR_HALF_PERIOD_US: u32 = 5;

/// Time the recovery lines settle before pulsing
pub const BUS_CLEAR_SETTLE_MS: u32 = 1;

/// Status LED blink interval in milliseconds
pub const LED_BLINK_MS: u64 = 250;

/// Console input line capacity (including room for the terminator)
pub const CMD_BUFFER_SIZE: usize = 64;

/// Longest accepted command verb
pub const CMD_VERB_LEN: usize = 32;

/// Console response buffer capacity
pub const RESPONSE_BUFFER_SIZE: usize = 1024;

/// USB CDC ACM packet size
pub const USB_CDC_PACKET_SIZE: u16 = 64;

/// USB VID (use test VID for development)
pub const USB_VID: u16 = 0x1209;

/// USB PID (get from pid.codes for production)
pub const USB_PID: u16 = 0x0001;

/// Pin assignments for GPIO
pub mod pins {
    //! GPIO pin assignments matching the schematic

    /// Port B pin number of SCL
    pub const I2C1_SCL_NUM: u8 = 8;

    /// Port B pin number of SDA
    pub const I2C1_SDA_NUM: u8 = 9;
}

/// PLL A output frequency in Hz
#[must_use]
pub const fn plla_frequency_hz() -> u32 {
    SI5351_XTAL_FREQ * PLLA_MULTIPLIER
}

/// Build the default CLK0 frequency
#[must_use]
pub const fn default_frequency() -> Option<Frequency> {
    Frequency::from_mhz(DEFAULT_CLK0_MHZ)
}
