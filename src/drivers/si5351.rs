//! `Si5351A` Clock Synthesizer Driver
//!
//! Programs PLL A and the three multisynth outputs of an `Si5351A`.
//!
//! The `Si5351A` generates three independent clock outputs from a single
//! 25MHz crystal reference. This driver runs PLL A at a fixed 800 MHz and
//! derives every output with an integer multisynth divider.
//!
//! Output changes always follow the same order: divider registers, then the
//! control register, then the Output-Enable bit. An output is never enabled
//! while its divider is still being written.

use core::fmt;

use crate::config::{
    default_frequency, plla_frequency_hz, DEFAULT_CLK0_MHZ, MAX_OUTPUT_HZ, PLLA_MULTIPLIER,
    SI5351_XTAL_FREQ,
};
use crate::divider::{integer_divider, MsParams, PllParams};
use crate::error::{Error, Result};
use crate::hal::i2c::{BusPort, I2cAddress, I2cBus, I2cResult};
use crate::hal::timer::TimeSource;
use crate::types::{ClockOutput, Frequency};

/// `Si5351A` register addresses
pub mod reg {
    /// Device status (`SYS_INIT`, `LOL_B`, `LOL_A`, `LOS`)
    pub const DEVICE_STATUS: u8 = 0;
    /// Interrupt status sticky bits
    pub const INTERRUPT_STATUS: u8 = 1;
    /// Output enable control (bit set = output disabled)
    pub const OUTPUT_ENABLE: u8 = 3;
    /// CLK0 control
    pub const CLK0_CONTROL: u8 = 16;
    /// CLK1 control
    pub const CLK1_CONTROL: u8 = 17;
    /// CLK2 control
    pub const CLK2_CONTROL: u8 = 18;
    /// First PLL A parameter register
    pub const PLLA_PARAMS: u8 = 26;
    /// First multisynth 0 parameter register
    pub const MS0_PARAMS: u8 = 42;
    /// First multisynth 1 parameter register
    pub const MS1_PARAMS: u8 = 50;
    /// First multisynth 2 parameter register
    pub const MS2_PARAMS: u8 = 58;
    /// PLL soft reset
    pub const PLL_RESET: u8 = 177;
    /// Crystal internal load capacitance
    pub const CRYSTAL_LOAD: u8 = 183;
}

/// Control value: powered up, integer mode, PLL A, multisynth source, 8 mA
pub const CONTROL_NOMINAL: u8 = 0x4F;

/// Control value: output powered down
pub const CONTROL_POWER_DOWN: u8 = 0x80;

/// Soft reset of PLL A and PLL B
pub const PLL_RESET_BOTH: u8 = 0xA0;

/// Register addresses of one output
trait OutputRegs {
    fn control_reg(self) -> u8;
    fn ms_reg(self) -> u8;
}

impl OutputRegs for ClockOutput {
    fn control_reg(self) -> u8 {
        match self {
            Self::Clk0 => reg::CLK0_CONTROL,
            Self::Clk1 => reg::CLK1_CONTROL,
            Self::Clk2 => reg::CLK2_CONTROL,
        }
    }

    fn ms_reg(self) -> u8 {
        match self {
            Self::Clk0 => reg::MS0_PARAMS,
            Self::Clk1 => reg::MS1_PARAMS,
            Self::Clk2 => reg::MS2_PARAMS,
        }
    }
}

/// Crystal load capacitance
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CrystalLoad {
    /// 6 pF load
    Load6pF,
    /// 8 pF load
    Load8pF,
    /// 10 pF load
    #[default]
    Load10pF,
}

impl CrystalLoad {
    /// Register value for `CRYSTAL_LOAD` (reserved low bits written as zero)
    #[must_use]
    pub const fn as_reg(self) -> u8 {
        match self {
            Self::Load6pF => 0b0100_0000,
            Self::Load8pF => 0b1000_0000,
            Self::Load10pF => 0b1100_0000,
        }
    }
}

/// What `init_basic` does after a failed register write
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "embedded", derive(defmt::Format))]
pub enum InitPolicy {
    /// Log the failure and run the remaining steps; report `PartialInit`
    #[default]
    Continue,
    /// Stop at the first failed write
    Abort,
}

/// Controller view of one output
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ClockChannel {
    /// Multisynth integer divider last written, if any
    pub divider: Option<u32>,
    /// Output-Enable bit clear as last written
    pub enabled: bool,
    /// Requested frequency of the last successful program
    pub frequency: Option<Frequency>,
    /// Control register holds the powered-up value
    pub powered: bool,
}

/// Result of a successful frequency request
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelUpdate {
    /// Output-Enable bit set, dividers untouched
    Disabled(ClockOutput),
    /// Divider and control written, output enabled
    Programmed {
        /// Output that changed
        output: ClockOutput,
        /// Requested frequency
        frequency: Frequency,
        /// Integer divider written
        divider: u32,
    },
}

impl fmt::Display for ChannelUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disabled(output) => write!(f, "{output} disabled"),
            Self::Programmed {
                output,
                frequency,
                divider,
            } => write!(f, "{output} = {frequency} (div={divider})"),
        }
    }
}

/// Snapshot of the status-related registers
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StatusReport {
    /// Register 0
    pub device_status: u8,
    /// Register 3
    pub output_enable: u8,
    /// Register 16
    pub clk0_control: u8,
}

impl StatusReport {
    /// Device still in its power-up initialization
    #[must_use]
    pub const fn sys_init(&self) -> bool {
        self.device_status & 0x80 != 0
    }

    /// PLL B lost lock
    #[must_use]
    pub const fn lol_b(&self) -> bool {
        self.device_status & 0x40 != 0
    }

    /// PLL A lost lock
    #[must_use]
    pub const fn lol_a(&self) -> bool {
        self.device_status & 0x20 != 0
    }

    /// Crystal loss of signal
    #[must_use]
    pub const fn los(&self) -> bool {
        self.device_status & 0x10 != 0
    }
}

/// `Si5351A` driver bound to a transport
pub struct Si5351<P, T> {
    bus: I2cBus<P, T>,
    address: I2cAddress,
    policy: InitPolicy,
    crystal_load: CrystalLoad,
    pll: PllParams,
    channels: [ClockChannel; 3],
    output_enable: u8,
}

impl<P: BusPort, T: TimeSource> Si5351<P, T> {
    /// Bind to a transport; performs no bus I/O
    #[must_use]
    pub fn new(bus: I2cBus<P, T>, address: I2cAddress) -> Self {
        info!("Si5351A bound at {}", address);
        Self {
            bus,
            address,
            policy: InitPolicy::default(),
            crystal_load: CrystalLoad::default(),
            pll: PllParams::integer(PLLA_MULTIPLIER),
            channels: [ClockChannel::default(); 3],
            // Assume everything off until the chip says otherwise
            output_enable: 0xFF,
        }
    }

    /// Select how `init_basic` reacts to failed writes
    #[must_use]
    pub fn with_init_policy(mut self, policy: InitPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Full bring-up: outputs off, crystal load, PLL A at 800 MHz and reset,
    /// CLK0 at the default frequency, CLK1/CLK2 powered down, CLK0 enabled last
    ///
    /// # Errors
    ///
    /// With [`InitPolicy::Abort`], the first failed write as `Error::Bus`.
    /// With [`InitPolicy::Continue`], `Error::PartialInit` after all steps ran.
    pub fn init_basic(&mut self) -> Result<()> {
        let default = default_frequency().ok_or(Error::FrequencyTooHigh {
            mhz: DEFAULT_CLK0_MHZ,
        })?;
        let mut failed: u8 = 0;
        let divider = integer_divider(plla_frequency_hz(), default.as_hz());
        let ms = MsParams::integer(divider).register_image();
        let pll = self.pll.register_image();
        let load = self.crystal_load.as_reg();

        self.step(&mut failed, |s| s.write_oe(0xFF))?;
        self.step(&mut failed, |s| s.write(reg::CRYSTAL_LOAD, &[load]))?;
        self.step(&mut failed, |s| s.write(reg::PLLA_PARAMS, &pll))?;
        self.step(&mut failed, |s| s.write(reg::PLL_RESET, &[PLL_RESET_BOTH]))?;

        let clk0 = ClockOutput::Clk0;
        self.step(&mut failed, |s| {
            s.write(clk0.ms_reg(), &ms)?;
            s.channels[0].divider = Some(divider);
            s.channels[0].frequency = Some(default);
            Ok(())
        })?;
        self.step(&mut failed, |s| {
            s.write(clk0.control_reg(), &[CONTROL_NOMINAL])?;
            s.channels[0].powered = true;
            Ok(())
        })?;
        for output in [ClockOutput::Clk1, ClockOutput::Clk2] {
            self.step(&mut failed, |s| {
                s.write(output.control_reg(), &[CONTROL_POWER_DOWN])?;
                s.channel_mut(output).powered = false;
                Ok(())
            })?;
        }
        self.step(&mut failed, |s| s.write_oe(!clk0.enable_mask()))?;

        if failed > 0 {
            warn!("Si5351A init finished with {} failed writes", failed);
            return Err(Error::PartialInit {
                failed_writes: failed,
            });
        }
        info!("Si5351A initialized (PLLA={} Hz)", self.vco_hz());
        Ok(())
    }

    /// Program channel `channel` to `mhz` MHz; zero disables the output
    ///
    /// # Errors
    ///
    /// `InvalidChannel` and `FrequencyTooHigh` before any bus access;
    /// `Error::Bus` if a write fails. A failed divider or control write
    /// leaves the output's enable bit untouched.
    pub fn set_channel_frequency(&mut self, channel: u8, mhz: u32) -> Result<ChannelUpdate> {
        let output = ClockOutput::from_index(channel).ok_or(Error::InvalidChannel(channel))?;

        if mhz == 0 {
            self.update_output_enable(output.enable_mask(), true)?;
            info!("{} disabled", output);
            return Ok(ChannelUpdate::Disabled(output));
        }

        let frequency = mhz
            .checked_mul(1_000_000)
            .filter(|&hz| hz <= MAX_OUTPUT_HZ)
            .and_then(Frequency::from_hz)
            .ok_or(Error::FrequencyTooHigh { mhz })?;

        let divider = integer_divider(plla_frequency_hz(), frequency.as_hz());
        let ms = MsParams::integer(divider);
        let image = ms.register_image();

        self.write(output.ms_reg(), &image)?;
        let state = self.channel_mut(output);
        state.divider = Some(divider);
        state.frequency = Some(frequency);

        self.write(output.control_reg(), &[CONTROL_NOMINAL])?;
        self.channel_mut(output).powered = true;

        self.update_output_enable(output.enable_mask(), false)?;
        info!(
            "{} = {} MHz (div={}, actual {} Hz)",
            output,
            frequency.as_mhz(),
            divider,
            ms.output_frequency(self.vco_hz())
        );
        Ok(ChannelUpdate::Programmed {
            output,
            frequency,
            divider,
        })
    }

    /// Read one chip register
    ///
    /// # Errors
    ///
    /// Transport failure.
    pub fn peek(&mut self, register: u8) -> Result<u8> {
        Ok(self.bus.read_reg(self.address, register)?)
    }

    /// Write one chip register
    ///
    /// # Errors
    ///
    /// Transport failure.
    pub fn poke(&mut self, register: u8, value: u8) -> Result<()> {
        if register == reg::OUTPUT_ENABLE {
            self.write_oe(value)?;
        } else {
            self.write(register, &[value])?;
        }
        Ok(())
    }

    /// Read status flags, the Output-Enable mask and CLK0 control
    ///
    /// # Errors
    ///
    /// The first failed read.
    pub fn status(&mut self) -> Result<StatusReport> {
        Ok(StatusReport {
            device_status: self.bus.read_reg(self.address, reg::DEVICE_STATUS)?,
            output_enable: self.bus.read_reg(self.address, reg::OUTPUT_ENABLE)?,
            clk0_control: self.bus.read_reg(self.address, ClockOutput::Clk0.control_reg())?,
        })
    }

    /// Close every output, force CLK0 control to nominal, open CLK0 only
    ///
    /// Returns the Output-Enable and CLK0 control values read back.
    ///
    /// # Errors
    ///
    /// The first failed write or read.
    pub fn force_enable(&mut self) -> Result<(u8, u8)> {
        let clk0 = ClockOutput::Clk0;
        self.write_oe(0xFF)?;
        self.write(clk0.control_reg(), &[CONTROL_NOMINAL])?;
        self.channels[0].powered = true;
        self.write_oe(!clk0.enable_mask())?;

        let oe = self.bus.read_reg(self.address, reg::OUTPUT_ENABLE)?;
        let control = self.bus.read_reg(self.address, clk0.control_reg())?;
        info!("force_on: OE=0x{:02X} CLK0_CTRL=0x{:02X}", oe, control);
        Ok((oe, control))
    }

    /// Enable (`0x00`) or disable (`0xFF`) every output at once
    ///
    /// # Errors
    ///
    /// Transport failure.
    pub fn set_all_outputs(&mut self, on: bool) -> Result<()> {
        self.write_oe(if on { 0x00 } else { 0xFF })?;
        Ok(())
    }

    /// Read registers 0 and 1
    ///
    /// # Errors
    ///
    /// The first failed read.
    pub fn whoami(&mut self) -> Result<(u8, u8)> {
        let r0 = self.bus.read_reg(self.address, reg::DEVICE_STATUS)?;
        let r1 = self.bus.read_reg(self.address, reg::INTERRUPT_STATUS)?;
        Ok((r0, r1))
    }

    /// Controller state of one output
    #[must_use]
    pub fn channel(&self, output: ClockOutput) -> &ClockChannel {
        &self.channels[usize::from(output.index())]
    }

    /// PLL A configuration
    #[must_use]
    pub const fn pll(&self) -> PllParams {
        self.pll
    }

    /// Output-Enable mask as last written (bit set = disabled)
    #[must_use]
    pub const fn output_enable_mask(&self) -> u8 {
        self.output_enable
    }

    /// Chip address
    #[must_use]
    pub const fn address(&self) -> I2cAddress {
        self.address
    }

    /// Active failure policy
    #[must_use]
    pub const fn init_policy(&self) -> InitPolicy {
        self.policy
    }

    /// Borrow the transport
    #[must_use]
    pub const fn bus(&self) -> &I2cBus<P, T> {
        &self.bus
    }

    /// Mutably borrow the transport for scans, pings and bus recovery
    pub fn bus_mut(&mut self) -> &mut I2cBus<P, T> {
        &mut self.bus
    }

    /// PLL A output for the fitted crystal
    fn vco_hz(&self) -> u64 {
        self.pll.vco_frequency(u64::from(SI5351_XTAL_FREQ))
    }

    fn channel_mut(&mut self, output: ClockOutput) -> &mut ClockChannel {
        &mut self.channels[usize::from(output.index())]
    }

    /// Run one bring-up step under the active policy
    fn step<F>(&mut self, failed: &mut u8, op: F) -> Result<()>
    where
        F: FnOnce(&mut Self) -> I2cResult<()>,
    {
        match op(self) {
            Ok(()) => Ok(()),
            Err(err) => match self.policy {
                InitPolicy::Abort => Err(Error::Bus(err)),
                InitPolicy::Continue => {
                    *failed = failed.saturating_add(1);
                    Ok(())
                }
            },
        }
    }

    /// Single non-retried write; failures are logged here
    fn write(&mut self, register: u8, data: &[u8]) -> I2cResult<()> {
        self.bus
            .write(self.address, register, data)
            .inspect_err(|err| warn!("Si5351A write reg {} failed: {}", register, err))
    }

    /// Write the Output-Enable register and mirror it into the channel flags
    fn write_oe(&mut self, mask: u8) -> I2cResult<()> {
        self.write(reg::OUTPUT_ENABLE, &[mask])?;
        self.output_enable = mask;
        for output in ClockOutput::ALL {
            self.channel_mut(output).enabled = mask & output.enable_mask() == 0;
        }
        Ok(())
    }

    /// Set or clear bits of the Output-Enable register, leaving the others
    ///
    /// The current value is read from the chip; if that read fails the
    /// shadow copy is used so other outputs keep their state.
    fn update_output_enable(&mut self, bits: u8, disable: bool) -> I2cResult<u8> {
        let current = match self.bus.read_reg(self.address, reg::OUTPUT_ENABLE) {
            Ok(value) => value,
            Err(err) => {
                warn!("OE read failed ({}), using cached 0x{:02X}", err, self.output_enable);
                self.output_enable
            }
        };
        let next = if disable { current | bits } else { current & !bits };
        self.write_oe(next)?;
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crystal_load_register_values() {
        assert_eq!(CrystalLoad::default().as_reg(), 0xC0);
        assert_eq!(CrystalLoad::Load6pF.as_reg(), 0x40);
        assert_eq!(CrystalLoad::Load8pF.as_reg(), 0x80);
    }

    #[test]
    fn output_register_map() {
        assert_eq!(ClockOutput::Clk0.control_reg(), 16);
        assert_eq!(ClockOutput::Clk2.control_reg(), 18);
        assert_eq!(ClockOutput::Clk1.ms_reg(), 50);
        assert_eq!(ClockOutput::Clk2.ms_reg(), 58);
    }

    #[test]
    fn status_flag_bits() {
        let report = StatusReport {
            device_status: 0xB0,
            output_enable: 0xFE,
            clk0_control: CONTROL_NOMINAL,
        };
        assert!(report.sys_init());
        assert!(!report.lol_b());
        assert!(report.lol_a());
        assert!(report.los());
    }

    #[test]
    fn update_messages() {
        use core::fmt::Write as _;
        let mut s: heapless::String<48> = heapless::String::new();
        let update = ChannelUpdate::Programmed {
            output: ClockOutput::Clk1,
            frequency: Frequency::from_mhz(20).unwrap(),
            divider: 40,
        };
        write!(s, "{update}").unwrap();
        assert_eq!(s.as_str(), "CLK1 = 20 MHz (div=40)");
    }
}
