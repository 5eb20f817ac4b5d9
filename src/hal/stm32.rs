//! STM32G474 Bus Port
//!
//! [`BusPort`] over the blocking embassy-stm32 I2C1 driver on PB8 (SCL) and
//! PB9 (SDA). The peripheral and both pins are owned here so the driver can
//! be dropped for a shutdown and rebuilt on bring-up, and so the pins can be
//! handed out as plain GPIO for bus recovery.
//!
//! The blocking driver applies one timeout to every phase and fixes it at
//! construction, so a call asking for a different per-phase bound (the
//! quick scan's address checks) rebuilds the driver with that bound first.

#![allow(unsafe_code)]

use embassy_stm32::gpio::{Input, Level, Output, Pull, Speed};
use embassy_stm32::i2c::{self, I2c};
use embassy_stm32::mode::Blocking;
use embassy_stm32::peripherals::{I2C1, PB8, PB9};
use embassy_stm32::time::Hertz;
use embassy_stm32::Peripheral;
use embassy_time::Duration;
use embedded_hal::i2c::Error as _;

use crate::hal::i2c::{
    BusConfig, BusError, BusPort, DriverTimeout, I2cResult, Phase, PhaseError, PhaseErrorKind,
};

/// Slowest and fastest bus clock the peripheral is configured for
const SPEED_RANGE_HZ: core::ops::RangeInclusive<u32> = 10_000..=1_000_000;

/// I2C1 with its pins
pub struct Stm32I2cPort {
    i2c: I2C1,
    scl: PB8,
    sda: PB9,
    speed_hz: u32,
    timeout: DriverTimeout,
    driver: Option<I2c<'static, Blocking>>,
    recovery: Option<(Output<'static>, Input<'static>)>,
}

impl Stm32I2cPort {
    /// Take ownership of the peripheral and pins; nothing is configured yet
    #[must_use]
    pub fn new(i2c: I2C1, scl: PB8, sda: PB9) -> Self {
        Self {
            i2c,
            scl,
            sda,
            speed_hz: 0,
            timeout: DriverTimeout::default(),
            driver: None,
            recovery: None,
        }
    }

    /// (Re)create the blocking driver with a per-phase timeout
    fn build(&mut self, timeout_us: u32) {
        self.driver = None;

        let mut i2c_config = i2c::Config::default();
        i2c_config.scl_pullup = true;
        i2c_config.sda_pullup = true;
        i2c_config.timeout = Duration::from_micros(u64::from(timeout_us));

        // SAFETY: the previous driver or GPIO owning these resources was
        // dropped, so only one owner exists at a time.
        let (peri, scl, sda) = unsafe {
            (
                self.i2c.clone_unchecked(),
                self.scl.clone_unchecked(),
                self.sda.clone_unchecked(),
            )
        };
        self.driver = Some(I2c::new_blocking(
            peri,
            scl,
            sda,
            Hertz(self.speed_hz),
            i2c_config,
        ));
        trace!("I2C1 driver timeout {} us", timeout_us);
    }

    /// Running driver, rebuilt first if `timeout_us` differs from its bound
    fn driver(&mut self, timeout_us: u32) -> Result<&mut I2c<'static, Blocking>, PhaseError> {
        if self.driver.is_none() {
            return Err(PhaseError::new(Phase::Address, PhaseErrorKind::Bus));
        }
        if self.timeout.select(timeout_us) {
            self.build(timeout_us);
        }
        self.driver
            .as_mut()
            .ok_or(PhaseError::new(Phase::Address, PhaseErrorKind::Bus))
    }
}

fn phase_error(err: &i2c::Error) -> PhaseError {
    match err {
        // embedded-hal folds the driver timeout into `Other`
        i2c::Error::Timeout => PhaseError::new(Phase::Transfer, PhaseErrorKind::Timeout),
        other => PhaseError::from_kind(other.kind()),
    }
}

impl BusPort for Stm32I2cPort {
    type Scl = Output<'static>;
    type Sda = Input<'static>;

    fn bring_up(&mut self, config: &BusConfig) -> I2cResult<()> {
        if !SPEED_RANGE_HZ.contains(&config.speed_hz) {
            return Err(BusError::InitFailed);
        }
        // Release recovery GPIO before the pins are routed to the peripheral
        self.recovery = None;
        self.speed_hz = config.speed_hz;
        self.timeout.clear();
        self.timeout.select(config.phase_timeout_us);
        self.build(config.phase_timeout_us);
        Ok(())
    }

    fn shut_down(&mut self) {
        // Dropping the driver disables the peripheral and disconnects the pins
        self.driver = None;
        self.recovery = None;
        self.timeout.clear();
    }

    fn write(&mut self, addr: u8, bytes: &[u8], timeout_us: u32) -> Result<(), PhaseError> {
        self.driver(timeout_us)?
            .blocking_write(addr, bytes)
            .map_err(|err| {
                let mut err = phase_error(&err);
                // An empty write sends only the address
                if bytes.is_empty() {
                    err.phase = Phase::Address;
                }
                err
            })
    }

    fn write_read(
        &mut self,
        addr: u8,
        bytes: &[u8],
        buf: &mut [u8],
        timeout_us: u32,
    ) -> Result<(), PhaseError> {
        self.driver(timeout_us)?
            .blocking_write_read(addr, bytes, buf)
            .map_err(|err| phase_error(&err))
    }

    fn recovery_lines(&mut self, _config: &BusConfig) -> (&mut Self::Scl, &mut Self::Sda) {
        self.driver = None;
        self.timeout.clear();
        let (scl, sda) = self.recovery.get_or_insert_with(|| {
            // SAFETY: the I2C driver was dropped above; the pins have no other owner.
            let (scl, sda) = unsafe { (self.scl.clone_unchecked(), self.sda.clone_unchecked()) };
            (
                Output::new(scl, Level::High, Speed::Low),
                Input::new(sda, Pull::Up),
            )
        });
        (scl, sda)
    }
}
