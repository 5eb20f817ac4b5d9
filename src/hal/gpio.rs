//! GPIO Abstractions
//!
//! The manual bus-clear pulse train and the status LED, both written
//! against the embedded-hal pin traits so they run unchanged on the host.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin};

/// Result of a bus-clear pulse train
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "embedded", derive(defmt::Format))]
pub enum ClearOutcome {
    /// SDA read high after `pulses` clock pulses
    Released {
        /// Pulses issued, 1..=max
        pulses: u8,
    },
    /// SDA still low after the last pulse
    Stuck,
}

/// A recovery line could not be driven or sampled
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "embedded", derive(defmt::Format))]
pub struct LineFault;

/// Clock SCL low/high until SDA is released, at most `max_pulses` times
///
/// A slave stuck mid-byte shifts out one bit per clock; nine pulses cover
/// eight data bits plus the acknowledge slot. SDA is sampled after every
/// high phase and the train stops as soon as it reads high.
///
/// # Errors
///
/// `LineFault` if either pin reports an error.
pub fn pulse_until_released<SCL, SDA, D>(
    scl: &mut SCL,
    sda: &mut SDA,
    delay: &mut D,
    max_pulses: u8,
    half_period_us: u32,
) -> Result<ClearOutcome, LineFault>
where
    SCL: OutputPin,
    SDA: InputPin,
    D: DelayNs,
{
    for pulse in 1..=max_pulses {
        scl.set_low().map_err(|_| LineFault)?;
        delay.delay_us(half_period_us);
        scl.set_high().map_err(|_| LineFault)?;
        delay.delay_us(half_period_us);
        if sda.is_high().map_err(|_| LineFault)? {
            return Ok(ClearOutcome::Released { pulses: pulse });
        }
    }
    delay.delay_us(half_period_us);
    Ok(ClearOutcome::Stuck)
}

/// Status LED state
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum LedState {
    /// LED is off
    #[default]
    Off,
    /// LED is on
    On,
}

impl LedState {
    /// Toggle the LED state
    #[must_use]
    pub const fn toggle(self) -> Self {
        match self {
            Self::Off => Self::On,
            Self::On => Self::Off,
        }
    }
}

#[cfg(feature = "embedded")]
impl defmt::Format for LedState {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Self::Off => defmt::write!(f, "OFF"),
            Self::On => defmt::write!(f, "ON"),
        }
    }
}

/// Status LED driver
///
/// Owns nothing but its pin, so the blinker shares no state with the bus.
pub struct StatusLed<P> {
    pin: P,
    state: LedState,
}

impl<P: OutputPin> StatusLed<P> {
    /// Create a new status LED (initially off)
    pub fn new(mut pin: P) -> Self {
        let _ = pin.set_low();
        Self {
            pin,
            state: LedState::Off,
        }
    }

    /// Toggle LED state; constant time, never blocks
    pub fn toggle(&mut self) {
        self.state = self.state.toggle();
        let _ = match self.state {
            LedState::On => self.pin.set_high(),
            LedState::Off => self.pin.set_low(),
        };
    }

    /// Get current state
    #[must_use]
    pub const fn state(&self) -> LedState {
        self.state
    }
}
