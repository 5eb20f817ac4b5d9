//! I2C Bus Transport
//!
//! Blocking, timeout-bounded register access for the `Si5351A`.
//! The platform supplies a [`BusPort`]; this module layers the two-phase
//! register protocol, burst limits, the retrying wrappers, probing and
//! scanning, and the manual bus-clear recovery on top of it.
//!
//! Every single transaction is bounded by the per-phase timeout in
//! [`BusConfig`]. The `*_with_timeout` wrappers bound the total wait to the
//! caller's window plus at most one transaction.

use core::fmt;

use embedded_hal::digital::{InputPin, OutputPin};
use embedded_hal::i2c::{ErrorKind, NoAcknowledgeSource};
use heapless::Vec;

use crate::config::{
    pins, BUS_CLEAR_HALF_PERIOD_US, BUS_CLEAR_MAX_PULSES, BUS_CLEAR_SETTLE_MS, I2C_FREQUENCY_HZ,
    I2C_MAX_BURST, I2C_PHASE_TIMEOUT_US, I2C_PORT, I2C_PROBE_TIMEOUT_US, I2C_RESET_SETTLE_MS,
    I2C_RETRY_INTERVAL_MS, I2C_SCAN_FIRST, I2C_SCAN_LAST, SI5351_I2C_ADDR,
};
use crate::hal::gpio::{pulse_until_released, ClearOutcome};
use crate::hal::timer::{Deadline, TimeSource};

/// I2C operation result
pub type I2cResult<T> = Result<T, BusError>;

/// Number of addresses in the probed range
pub const SCAN_RANGE_LEN: usize = (I2C_SCAN_LAST - I2C_SCAN_FIRST + 1) as usize;

/// Transport-level failure
///
/// `Ok(())` is the successful transaction outcome; a failed transaction
/// never hands back partially read data.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "embedded", derive(defmt::Format))]
pub enum BusError {
    /// Bus has not been brought up
    NotReady,
    /// Peripheral could not be configured
    InitFailed,
    /// Addressed device did not acknowledge
    NoAcknowledge,
    /// A phase or a retry window ran out of time
    Timeout,
    /// Arbitration loss or other bus-level fault
    Bus,
    /// Write burst longer than the chip accepts
    PayloadTooLarge {
        /// Requested data length
        len: usize,
    },
    /// Bus-clear could not get the data line released
    StuckLow,
}

impl fmt::Display for BusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotReady => f.write_str("bus not initialized"),
            Self::InitFailed => f.write_str("bus init failed"),
            Self::NoAcknowledge => f.write_str("NACK"),
            Self::Timeout => f.write_str("timeout"),
            Self::Bus => f.write_str("bus error"),
            Self::PayloadTooLarge { len } => {
                write!(f, "payload too large ({len} > {I2C_MAX_BURST} bytes)")
            }
            Self::StuckLow => f.write_str("SDA stuck low"),
        }
    }
}

/// Which half of a register access failed
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "embedded", derive(defmt::Format))]
pub enum Phase {
    /// Device address / register address phase
    Address,
    /// Data transfer phase
    Data,
    /// Driver did not report which phase failed
    Transfer,
}

/// Failure class of a single phase
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "embedded", derive(defmt::Format))]
pub enum PhaseErrorKind {
    /// Not acknowledged
    Nack,
    /// Phase exceeded its timeout
    Timeout,
    /// Arbitration loss, overrun or other bus fault
    Bus,
}

impl From<ErrorKind> for PhaseErrorKind {
    fn from(kind: ErrorKind) -> Self {
        match kind {
            ErrorKind::NoAcknowledge(_) => Self::Nack,
            _ => Self::Bus,
        }
    }
}

/// Error reported by a [`BusPort`] for one transaction
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "embedded", derive(defmt::Format))]
pub struct PhaseError {
    /// Failing phase
    pub phase: Phase,
    /// Failure class
    pub kind: PhaseErrorKind,
}

impl PhaseError {
    /// Create a phase error
    #[must_use]
    pub const fn new(phase: Phase, kind: PhaseErrorKind) -> Self {
        Self { phase, kind }
    }

    /// Classify an embedded-hal error, taking the phase from the NACK source
    #[must_use]
    pub fn from_kind(kind: ErrorKind) -> Self {
        let phase = match kind {
            ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address) => Phase::Address,
            ErrorKind::NoAcknowledge(NoAcknowledgeSource::Data) => Phase::Data,
            _ => Phase::Transfer,
        };
        Self::new(phase, PhaseErrorKind::from(kind))
    }

    /// Whether the failure points at the bus rather than the device
    #[must_use]
    pub const fn is_bus_fault(self) -> bool {
        matches!(self.kind, PhaseErrorKind::Timeout | PhaseErrorKind::Bus)
    }
}

/// Timeout programmed into a driver that takes one value for every phase
///
/// Ports whose peripheral driver fixes its timeout at construction use this
/// to notice when a call asks for a different bound and the driver has to be
/// rebuilt, as when a quick scan switches to the shorter probe timeout.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DriverTimeout {
    active_us: Option<u32>,
}

impl DriverTimeout {
    /// Record `timeout_us`; true if it differs from the one in effect
    pub fn select(&mut self, timeout_us: u32) -> bool {
        if self.active_us == Some(timeout_us) {
            false
        } else {
            self.active_us = Some(timeout_us);
            true
        }
    }

    /// Forget the programmed value (driver dropped)
    pub fn clear(&mut self) {
        self.active_us = None;
    }

    /// Timeout currently programmed
    #[must_use]
    pub const fn active_us(&self) -> Option<u32> {
        self.active_us
    }
}

impl From<PhaseError> for BusError {
    fn from(err: PhaseError) -> Self {
        match err.kind {
            PhaseErrorKind::Nack => Self::NoAcknowledge,
            PhaseErrorKind::Timeout => Self::Timeout,
            PhaseErrorKind::Bus => Self::Bus,
        }
    }
}

/// I2C device address wrapper
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct I2cAddress(u8);

impl I2cAddress {
    /// `Si5351A` clock synthesizer address
    pub const SI5351: Self = Self(SI5351_I2C_ADDR);

    /// Create from 7-bit address
    #[must_use]
    pub const fn new(addr: u8) -> Self {
        Self(addr & 0x7F)
    }

    /// Get the 7-bit address
    #[must_use]
    pub const fn addr(self) -> u8 {
        self.0
    }

    /// Whether the address lies outside the reserved ranges
    #[must_use]
    pub const fn is_scannable(self) -> bool {
        self.0 >= I2C_SCAN_FIRST && self.0 <= I2C_SCAN_LAST
    }
}

impl fmt::Display for I2cAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:02X}", self.0)
    }
}

#[cfg(feature = "embedded")]
impl defmt::Format for I2cAddress {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "0x{:02X}", self.0);
    }
}

/// Bus configuration
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BusConfig {
    /// Peripheral index
    pub port: u8,
    /// Bus frequency in Hz (typically 100_000 or 400_000)
    pub speed_hz: u32,
    /// Data line pin number
    pub sda_pin: u8,
    /// Clock line pin number
    pub scl_pin: u8,
    /// Timeout for each phase of a transaction in microseconds
    pub phase_timeout_us: u32,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            port: I2C_PORT,
            speed_hz: I2C_FREQUENCY_HZ,
            sda_pin: pins::I2C1_SDA_NUM,
            scl_pin: pins::I2C1_SCL_NUM,
            phase_timeout_us: I2C_PHASE_TIMEOUT_US,
        }
    }
}

/// Bus lifecycle
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "embedded", derive(defmt::Format))]
pub enum BusState {
    /// Peripheral not running
    #[default]
    Uninitialized,
    /// Peripheral running, last bus-level transaction healthy
    Ready,
    /// A transaction timed out or hit a bus fault; cleared by reset or bus-clear
    Faulted,
}

/// Platform half of the transport
///
/// Implementations own the I2C peripheral and its two pins. Each call is a
/// single bus transaction whose phases are each bounded by `timeout_us`.
pub trait BusPort {
    /// Clock line driven as GPIO during recovery
    type Scl: OutputPin;
    /// Data line sampled as GPIO during recovery
    type Sda: InputPin;

    /// Route the pins to the peripheral, enable pull-ups and start it
    ///
    /// # Errors
    ///
    /// Returns `BusError::InitFailed` if the peripheral cannot run with `config`.
    fn bring_up(&mut self, config: &BusConfig) -> I2cResult<()>;

    /// Stop the peripheral and leave both pins in a safe, released state
    fn shut_down(&mut self);

    /// Write `bytes` to `addr` followed by STOP; an empty slice is an address-only probe
    ///
    /// # Errors
    ///
    /// Reports the failing phase and its class.
    fn write(&mut self, addr: u8, bytes: &[u8], timeout_us: u32) -> Result<(), PhaseError>;

    /// Write `bytes` without STOP, then read `buf` after a repeated START
    ///
    /// # Errors
    ///
    /// Reports the failing phase and its class.
    fn write_read(
        &mut self,
        addr: u8,
        bytes: &[u8],
        buf: &mut [u8],
        timeout_us: u32,
    ) -> Result<(), PhaseError>;

    /// Hand both lines over as GPIO: SCL driven high, SDA input with pull-up
    ///
    /// Only called while the peripheral is shut down.
    fn recovery_lines(&mut self, config: &BusConfig) -> (&mut Self::Scl, &mut Self::Sda);
}

/// Timeout-bounded I2C transport
pub struct I2cBus<P, T> {
    port: P,
    time: T,
    config: BusConfig,
    state: BusState,
}

impl<P: BusPort, T: TimeSource> I2cBus<P, T> {
    /// Create an uninitialized transport; no pins are touched until [`Self::init`]
    #[must_use]
    pub fn new(port: P, time: T, config: BusConfig) -> Self {
        Self {
            port,
            time,
            config,
            state: BusState::Uninitialized,
        }
    }

    /// Bring the peripheral up
    ///
    /// # Errors
    ///
    /// `BusError::InitFailed` if the port refuses the configuration. The port
    /// is shut down again so no pin is left half-configured.
    pub fn init(&mut self) -> I2cResult<()> {
        match self.port.bring_up(&self.config) {
            Ok(()) => {
                self.state = BusState::Ready;
                info!(
                    "I2C{} up: SDA={} SCL={} {} Hz",
                    self.config.port,
                    self.config.sda_pin,
                    self.config.scl_pin,
                    self.config.speed_hz
                );
                Ok(())
            }
            Err(_) => {
                self.port.shut_down();
                self.state = BusState::Uninitialized;
                error!("I2C{} init failed", self.config.port);
                Err(BusError::InitFailed)
            }
        }
    }

    /// Tear the peripheral down, wait for the bus to settle, and bring it back up
    ///
    /// # Errors
    ///
    /// `BusError::InitFailed` if the restart fails.
    pub fn reset(&mut self) -> I2cResult<()> {
        self.port.shut_down();
        self.state = BusState::Uninitialized;
        self.time.delay_ms(I2C_RESET_SETTLE_MS);
        self.init()
    }

    /// Read `buf.len()` registers starting at `reg`
    ///
    /// # Errors
    ///
    /// `NotReady`, `NoAcknowledge`, `Timeout` or `Bus`. On failure `buf` is zeroed.
    pub fn read(&mut self, addr: I2cAddress, reg: u8, buf: &mut [u8]) -> I2cResult<()> {
        self.ensure_up()?;
        let result = self
            .port
            .write_read(addr.addr(), &[reg], buf, self.config.phase_timeout_us);
        if result.is_err() {
            buf.fill(0);
        }
        self.settle(result)
    }

    /// Write `data` to consecutive registers starting at `reg`
    ///
    /// # Errors
    ///
    /// `PayloadTooLarge` (checked before any bus activity), `NotReady`,
    /// `NoAcknowledge`, `Timeout` or `Bus`.
    pub fn write(&mut self, addr: I2cAddress, reg: u8, data: &[u8]) -> I2cResult<()> {
        if data.len() > I2C_MAX_BURST {
            return Err(BusError::PayloadTooLarge { len: data.len() });
        }
        self.ensure_up()?;

        let mut frame = [0u8; I2C_MAX_BURST + 1];
        frame[0] = reg;
        frame[1..=data.len()].copy_from_slice(data);
        let result = self
            .port
            .write(addr.addr(), &frame[..=data.len()], self.config.phase_timeout_us);
        self.settle(result)
    }

    /// Read a single register
    ///
    /// # Errors
    ///
    /// As [`Self::read`].
    pub fn read_reg(&mut self, addr: I2cAddress, reg: u8) -> I2cResult<u8> {
        let mut buf = [0u8];
        self.read(addr, reg, &mut buf)?;
        Ok(buf[0])
    }

    /// Write a single register
    ///
    /// # Errors
    ///
    /// As [`Self::write`].
    pub fn write_reg(&mut self, addr: I2cAddress, reg: u8, value: u8) -> I2cResult<()> {
        self.write(addr, reg, &[value])
    }

    /// Retry [`Self::read`] until it succeeds or `timeout_ms` elapses
    ///
    /// # Errors
    ///
    /// `Timeout` once the window closes; `NotReady` immediately.
    pub fn read_with_timeout(
        &mut self,
        addr: I2cAddress,
        reg: u8,
        buf: &mut [u8],
        timeout_ms: u32,
    ) -> I2cResult<()> {
        let deadline = Deadline::after_ms(&self.time, timeout_ms);
        let result = self.retry_until(deadline, |bus| bus.read(addr, reg, &mut *buf));
        if result.is_err() {
            warn!("I2C read timeout at {}", addr);
        }
        result
    }

    /// Retry [`Self::write`] until it succeeds or `timeout_ms` elapses
    ///
    /// # Errors
    ///
    /// `Timeout` once the window closes; `NotReady` and `PayloadTooLarge` immediately.
    pub fn write_with_timeout(
        &mut self,
        addr: I2cAddress,
        reg: u8,
        data: &[u8],
        timeout_ms: u32,
    ) -> I2cResult<()> {
        let deadline = Deadline::after_ms(&self.time, timeout_ms);
        let result = self.retry_until(deadline, |bus| bus.write(addr, reg, data));
        if result.is_err() {
            warn!("I2C write timeout at {}", addr);
        }
        result
    }

    /// Address-only write used to test for an acknowledgment
    pub fn ping(&mut self, addr: I2cAddress) -> bool {
        self.probe(addr, self.config.phase_timeout_us)
    }

    /// Probe every valid 7-bit address and collect those that acknowledge
    pub fn scan_full(&mut self) -> Vec<I2cAddress, SCAN_RANGE_LEN> {
        let mut found = Vec::new();
        for raw in I2C_SCAN_FIRST..=I2C_SCAN_LAST {
            let addr = I2cAddress::new(raw);
            if self.ping(addr) {
                info!("I2C device at {}", addr);
                let _ = found.push(addr);
            }
        }
        if found.is_empty() {
            info!("I2C scan: no devices");
        }
        found
    }

    /// Probe the address range with short per-address timeouts, stopping at the first hit
    pub fn scan_quick(&mut self) -> Option<I2cAddress> {
        let hit = (I2C_SCAN_FIRST..=I2C_SCAN_LAST)
            .map(I2cAddress::new)
            .find(|&addr| self.probe(addr, I2C_PROBE_TIMEOUT_US));
        match hit {
            Some(addr) => info!("I2C device at {}", addr),
            None => info!("I2C scan: no devices"),
        }
        hit
    }

    /// Free a bus whose data line is held low by a slave stuck mid-byte
    ///
    /// The peripheral is stopped, SCL is driven as GPIO and pulsed up to nine
    /// times until SDA reads high. A bus that was running is brought back up
    /// afterwards. Returns the number of pulses issued.
    ///
    /// # Errors
    ///
    /// `StuckLow` if SDA never released, `Bus` if a line could not be driven.
    /// Either leaves a previously running bus Faulted.
    pub fn bus_clear(&mut self) -> I2cResult<u8> {
        let was_up = self.state != BusState::Uninitialized;
        if was_up {
            self.port.shut_down();
            self.state = BusState::Uninitialized;
        }

        let outcome = {
            let (scl, sda) = self.port.recovery_lines(&self.config);
            self.time.delay_ms(BUS_CLEAR_SETTLE_MS);
            pulse_until_released(
                scl,
                sda,
                &mut self.time,
                BUS_CLEAR_MAX_PULSES,
                BUS_CLEAR_HALF_PERIOD_US,
            )
        };

        let result = match outcome {
            Ok(ClearOutcome::Released { pulses }) => {
                info!("I2C bus clear: SDA released after {} pulses", pulses);
                Ok(pulses)
            }
            Ok(ClearOutcome::Stuck) => {
                error!("I2C bus clear: SDA still low");
                Err(BusError::StuckLow)
            }
            Err(_) => {
                error!("I2C bus clear: line control failed");
                Err(BusError::Bus)
            }
        };

        if was_up {
            self.init()?;
            if result.is_err() {
                self.state = BusState::Faulted;
            }
        }
        result
    }

    /// Current lifecycle state
    #[must_use]
    pub const fn state(&self) -> BusState {
        self.state
    }

    /// Active configuration
    #[must_use]
    pub const fn config(&self) -> &BusConfig {
        &self.config
    }

    /// Borrow the platform port
    #[must_use]
    pub const fn port(&self) -> &P {
        &self.port
    }

    /// Mutably borrow the platform port
    pub fn port_mut(&mut self) -> &mut P {
        &mut self.port
    }

    /// Borrow the time source
    #[must_use]
    pub const fn time(&self) -> &T {
        &self.time
    }

    fn ensure_up(&self) -> I2cResult<()> {
        if self.state == BusState::Uninitialized {
            Err(BusError::NotReady)
        } else {
            Ok(())
        }
    }

    fn probe(&mut self, addr: I2cAddress, timeout_us: u32) -> bool {
        if self.ensure_up().is_err() {
            return false;
        }
        let result = self.port.write(addr.addr(), &[], timeout_us);
        self.settle(result).is_ok()
    }

    /// Record bus-level faults and convert the port error
    fn settle(&mut self, result: Result<(), PhaseError>) -> I2cResult<()> {
        result.map_err(|err| {
            if err.is_bus_fault() && self.state == BusState::Ready {
                warn!("I2C fault in {} phase, bus marked faulted", err.phase);
                self.state = BusState::Faulted;
            }
            BusError::from(err)
        })
    }

    fn retry_until<F>(&mut self, deadline: Deadline, mut op: F) -> I2cResult<()>
    where
        F: FnMut(&mut Self) -> I2cResult<()>,
    {
        let interval_us = u64::from(I2C_RETRY_INTERVAL_MS) * 1_000;
        while !deadline.expired(&self.time) {
            match op(self) {
                Ok(()) => return Ok(()),
                Err(err @ (BusError::NotReady | BusError::PayloadTooLarge { .. })) => {
                    return Err(err)
                }
                Err(_) => {}
            }
            // Never sleep past the deadline
            let pause = deadline.remaining_us(&self.time).min(interval_us);
            if pause > 0 {
                self.time.delay_us(u32::try_from(pause).unwrap_or(u32::MAX));
            }
        }
        // Attempts that stalled or hit a bus error already marked the bus;
        // a window of NACKs leaves it Ready
        Err(BusError::Timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_masks_to_seven_bits() {
        assert_eq!(I2cAddress::new(0xE0).addr(), 0x60);
        assert!(I2cAddress::SI5351.is_scannable());
        assert!(!I2cAddress::new(0x07).is_scannable());
        assert!(!I2cAddress::new(0x78).is_scannable());
    }

    #[test]
    fn scan_range_covers_valid_addresses() {
        assert_eq!(SCAN_RANGE_LEN, 0x70);
    }

    #[test]
    fn phase_error_mapping() {
        let nack = PhaseError::new(Phase::Address, PhaseErrorKind::Nack);
        let stall = PhaseError::new(Phase::Data, PhaseErrorKind::Timeout);
        assert!(!nack.is_bus_fault());
        assert!(stall.is_bus_fault());
        assert_eq!(BusError::from(nack), BusError::NoAcknowledge);
        assert_eq!(BusError::from(stall), BusError::Timeout);
    }

    #[test]
    fn error_kind_keeps_reported_phase() {
        assert_eq!(
            PhaseError::from_kind(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address)),
            PhaseError::new(Phase::Address, PhaseErrorKind::Nack)
        );
        assert_eq!(
            PhaseError::from_kind(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Data)),
            PhaseError::new(Phase::Data, PhaseErrorKind::Nack)
        );
        // An unknown NACK source is not attributed to the data phase
        assert_eq!(
            PhaseError::from_kind(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Unknown)),
            PhaseError::new(Phase::Transfer, PhaseErrorKind::Nack)
        );
        assert_eq!(
            PhaseError::from_kind(ErrorKind::Overrun),
            PhaseError::new(Phase::Transfer, PhaseErrorKind::Bus)
        );
    }

    #[test]
    fn driver_timeout_rebuilds_only_on_change() {
        let mut timeout = DriverTimeout::default();
        assert!(timeout.select(I2C_PHASE_TIMEOUT_US));
        assert!(!timeout.select(I2C_PHASE_TIMEOUT_US));

        // Quick scan: one switch to the short bound, then no churn
        assert!(timeout.select(I2C_PROBE_TIMEOUT_US));
        for _ in 0..SCAN_RANGE_LEN {
            assert!(!timeout.select(I2C_PROBE_TIMEOUT_US));
        }
        assert_eq!(timeout.active_us(), Some(I2C_PROBE_TIMEOUT_US));

        // Back to register traffic
        assert!(timeout.select(I2C_PHASE_TIMEOUT_US));

        timeout.clear();
        assert_eq!(timeout.active_us(), None);
        assert!(timeout.select(I2C_PHASE_TIMEOUT_US));
    }

    #[test]
    fn error_kind_mapping() {
        assert_eq!(
            PhaseErrorKind::from(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address)),
            PhaseErrorKind::Nack
        );
        assert_eq!(
            PhaseErrorKind::from(ErrorKind::ArbitrationLoss),
            PhaseErrorKind::Bus
        );
    }

    #[test]
    fn default_config_matches_board() {
        let config = BusConfig::default();
        assert_eq!(config.speed_hz, 100_000);
        assert_eq!(config.phase_timeout_us, I2C_PHASE_TIMEOUT_US);
        assert_eq!(config.sda_pin, pins::I2C1_SDA_NUM);
    }
}
