//! Simulated bus hardware for host tests
//!
//! [`MockBus`] implements [`BusPort`] with an `Si5351A` register file,
//! optional extra devices, injectable faults and simulated recovery lines.
//! [`SimClock`] is the matching time source; clones share one timeline so
//! a stalled transaction visibly consumes time.

use core::convert::Infallible;
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;
use std::vec::Vec;

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{ErrorType, InputPin, OutputPin};

use crate::config::SI5351_I2C_ADDR;
use crate::hal::i2c::{
    BusConfig, BusError, BusPort, I2cBus, I2cResult, Phase, PhaseError, PhaseErrorKind,
};
use crate::hal::timer::TimeSource;

/// Simulated monotonic clock; delays advance time instantly
#[derive(Clone, Debug, Default)]
pub struct SimClock {
    now_us: Rc<Cell<u64>>,
}

impl SimClock {
    /// Clock starting at zero
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Move time forward
    pub fn advance_us(&self, us: u64) {
        self.now_us.set(self.now_us.get() + us);
    }
}

impl DelayNs for SimClock {
    fn delay_ns(&mut self, ns: u32) {
        self.advance_us(u64::from(ns).div_ceil(1_000));
    }

    fn delay_us(&mut self, us: u32) {
        self.advance_us(u64::from(us));
    }

    fn delay_ms(&mut self, ms: u32) {
        self.advance_us(u64::from(ms) * 1_000);
    }
}

impl TimeSource for SimClock {
    fn now_us(&self) -> u64 {
        self.now_us.get()
    }
}

/// How long the simulated slave keeps SDA low
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SdaHold {
    /// Line idles high
    Released,
    /// Line low until this many SCL pulses have been seen
    Pulses(u32),
    /// Line never releases
    Forever,
}

#[derive(Debug)]
struct LineState {
    scl_high: bool,
    pulses: u32,
    hold: SdaHold,
}

/// Simulated SCL line
#[derive(Clone, Debug)]
pub struct SimScl {
    state: Rc<RefCell<LineState>>,
}

impl ErrorType for SimScl {
    type Error = Infallible;
}

impl OutputPin for SimScl {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        let mut state = self.state.borrow_mut();
        if state.scl_high {
            state.pulses += 1;
        }
        state.scl_high = false;
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.state.borrow_mut().scl_high = true;
        Ok(())
    }
}

/// Simulated SDA line
#[derive(Clone, Debug)]
pub struct SimSda {
    state: Rc<RefCell<LineState>>,
}

impl ErrorType for SimSda {
    type Error = Infallible;
}

impl InputPin for SimSda {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        let state = self.state.borrow();
        Ok(match state.hold {
            SdaHold::Released => true,
            SdaHold::Pulses(n) => state.pulses >= n,
            SdaHold::Forever => false,
        })
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        self.is_high().map(|high| !high)
    }
}

/// SCL/SDA pair sharing one line state
#[derive(Debug)]
pub struct RecoveryLines {
    scl: SimScl,
    sda: SimSda,
}

impl RecoveryLines {
    /// Lines with the given SDA behavior
    #[must_use]
    pub fn new(hold: SdaHold) -> Self {
        let state = Rc::new(RefCell::new(LineState {
            scl_high: true,
            pulses: 0,
            hold,
        }));
        Self {
            scl: SimScl {
                state: Rc::clone(&state),
            },
            sda: SimSda { state },
        }
    }

    /// Healthy bus
    #[must_use]
    pub fn released() -> Self {
        Self::new(SdaHold::Released)
    }

    /// Slave releases SDA after `pulses` clocks
    #[must_use]
    pub fn held_for(pulses: u32) -> Self {
        Self::new(SdaHold::Pulses(pulses))
    }

    /// Slave never releases SDA
    #[must_use]
    pub fn stuck() -> Self {
        Self::new(SdaHold::Forever)
    }

    /// Change SDA behavior and restart the pulse count
    pub fn set_hold(&mut self, hold: SdaHold) {
        let mut state = self.scl.state.borrow_mut();
        state.hold = hold;
        state.pulses = 0;
    }

    /// SCL falling edges seen since the last [`Self::set_hold`]
    #[must_use]
    pub fn pulses(&self) -> u32 {
        self.scl.state.borrow().pulses
    }

    /// Borrow both lines
    pub fn split(&mut self) -> (&mut SimScl, &mut SimSda) {
        (&mut self.scl, &mut self.sda)
    }

    /// Extra handle onto the SCL line
    #[must_use]
    pub fn scl_handle(&self) -> SimScl {
        self.scl.clone()
    }
}

/// Logged transaction
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Transaction {
    /// Register write burst
    Write {
        /// Device address
        addr: u8,
        /// First register
        reg: u8,
        /// Data bytes
        data: Vec<u8>,
    },
    /// Register read
    Read {
        /// Device address
        addr: u8,
        /// First register
        reg: u8,
        /// Bytes read
        len: usize,
    },
    /// Address-only write
    Probe {
        /// Device address
        addr: u8,
    },
}

/// Fault applied to the next register transaction
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Fault {
    /// Device does not acknowledge its address
    Nack,
    /// Slave stretches the clock past the phase timeout
    Stall,
    /// Arbitration loss
    BusError,
}

/// Simulated I2C port with an `Si5351A` attached
#[derive(Debug)]
pub struct MockBus {
    clock: SimClock,
    chip_addr: u8,
    chip_present: bool,
    registers: [u8; 256],
    extra_devices: Vec<u8>,
    faults: VecDeque<Fault>,
    failing_registers: Vec<u8>,
    stall_all: bool,
    refuse_bring_up: bool,
    up: bool,
    bring_ups: u32,
    shut_downs: u32,
    last_config: Option<BusConfig>,
    log: Vec<Transaction>,
    lines: RecoveryLines,
    transaction_us: u64,
}

impl MockBus {
    /// Time a healthy transaction takes on the simulated bus
    pub const TRANSACTION_US: u64 = 200;

    /// Port with the chip at its default address
    #[must_use]
    pub fn new(clock: SimClock) -> Self {
        Self {
            clock,
            chip_addr: SI5351_I2C_ADDR,
            chip_present: true,
            registers: [0; 256],
            extra_devices: Vec::new(),
            faults: VecDeque::new(),
            failing_registers: Vec::new(),
            stall_all: false,
            refuse_bring_up: false,
            up: false,
            bring_ups: 0,
            shut_downs: 0,
            last_config: None,
            log: Vec::new(),
            lines: RecoveryLines::released(),
            transaction_us: Self::TRANSACTION_US,
        }
    }

    /// Queue a fault for the next register transaction
    pub fn inject(&mut self, fault: Fault) {
        self.faults.push_back(fault);
    }

    /// NACK the data phase of every write whose first register is `reg`
    pub fn fail_writes_to(&mut self, reg: u8) {
        self.failing_registers.push(reg);
    }

    /// Make every transaction, probes included, stall
    pub fn set_stall_all(&mut self, stall: bool) {
        self.stall_all = stall;
    }

    /// Make the next bring-ups fail
    pub fn set_refuse_bring_up(&mut self, refuse: bool) {
        self.refuse_bring_up = refuse;
    }

    /// Attach or detach the `Si5351A`
    pub fn set_chip_present(&mut self, present: bool) {
        self.chip_present = present;
    }

    /// Attach another acknowledging device
    pub fn add_device(&mut self, addr: u8) {
        self.extra_devices.push(addr);
    }

    /// Current chip register value
    #[must_use]
    pub fn register(&self, reg: u8) -> u8 {
        self.registers[usize::from(reg)]
    }

    /// Preset a chip register
    pub fn set_register(&mut self, reg: u8, value: u8) {
        self.registers[usize::from(reg)] = value;
    }

    /// Slice of consecutive chip registers
    #[must_use]
    pub fn registers(&self, first: u8, len: usize) -> &[u8] {
        let start = usize::from(first);
        &self.registers[start..start + len]
    }

    /// Transaction log
    #[must_use]
    pub fn transactions(&self) -> &[Transaction] {
        &self.log
    }

    /// Register writes only, as `(reg, data)` pairs
    #[must_use]
    pub fn writes(&self) -> Vec<(u8, Vec<u8>)> {
        self.log
            .iter()
            .filter_map(|t| match t {
                Transaction::Write { reg, data, .. } => Some((*reg, data.clone())),
                _ => None,
            })
            .collect()
    }

    /// Clear transaction log
    pub fn clear_transactions(&mut self) {
        self.log.clear();
    }

    /// Whether the simulated peripheral is running
    #[must_use]
    pub const fn is_up(&self) -> bool {
        self.up
    }

    /// Number of successful bring-ups
    #[must_use]
    pub const fn bring_up_count(&self) -> u32 {
        self.bring_ups
    }

    /// Number of shut-downs
    #[must_use]
    pub const fn shut_down_count(&self) -> u32 {
        self.shut_downs
    }

    /// Configuration of the last successful bring-up
    #[must_use]
    pub const fn last_config(&self) -> Option<BusConfig> {
        self.last_config
    }

    /// Recovery line simulation
    #[must_use]
    pub const fn lines(&self) -> &RecoveryLines {
        &self.lines
    }

    /// Mutable recovery line simulation
    pub fn lines_mut(&mut self) -> &mut RecoveryLines {
        &mut self.lines
    }

    fn acknowledges(&self, addr: u8) -> bool {
        (self.chip_present && addr == self.chip_addr) || self.extra_devices.contains(&addr)
    }

    /// Apply stalls, queued faults and address acknowledgment
    fn begin(&mut self, addr: u8, probe: bool, timeout_us: u32) -> Result<(), PhaseError> {
        if !self.up {
            return Err(PhaseError::new(Phase::Address, PhaseErrorKind::Bus));
        }
        if self.stall_all {
            self.clock.advance_us(u64::from(timeout_us));
            return Err(PhaseError::new(Phase::Address, PhaseErrorKind::Timeout));
        }
        if !probe {
            match self.faults.pop_front() {
                Some(Fault::Nack) => {
                    self.clock.advance_us(self.transaction_us);
                    return Err(PhaseError::new(Phase::Address, PhaseErrorKind::Nack));
                }
                Some(Fault::Stall) => {
                    self.clock.advance_us(u64::from(timeout_us));
                    return Err(PhaseError::new(Phase::Address, PhaseErrorKind::Timeout));
                }
                Some(Fault::BusError) => {
                    self.clock.advance_us(self.transaction_us);
                    return Err(PhaseError::new(Phase::Address, PhaseErrorKind::Bus));
                }
                None => {}
            }
        }
        self.clock.advance_us(self.transaction_us);
        if self.acknowledges(addr) {
            Ok(())
        } else {
            Err(PhaseError::new(Phase::Address, PhaseErrorKind::Nack))
        }
    }
}

impl BusPort for MockBus {
    type Scl = SimScl;
    type Sda = SimSda;

    fn bring_up(&mut self, config: &BusConfig) -> I2cResult<()> {
        if self.refuse_bring_up {
            return Err(BusError::InitFailed);
        }
        self.up = true;
        self.bring_ups += 1;
        self.last_config = Some(*config);
        Ok(())
    }

    fn shut_down(&mut self) {
        self.up = false;
        self.shut_downs += 1;
    }

    fn write(&mut self, addr: u8, bytes: &[u8], timeout_us: u32) -> Result<(), PhaseError> {
        let Some((&reg, data)) = bytes.split_first() else {
            let result = self.begin(addr, true, timeout_us);
            self.log.push(Transaction::Probe { addr });
            return result;
        };
        self.begin(addr, false, timeout_us)?;
        if addr == self.chip_addr && self.failing_registers.contains(&reg) {
            return Err(PhaseError::new(Phase::Data, PhaseErrorKind::Nack));
        }
        self.log.push(Transaction::Write {
            addr,
            reg,
            data: data.to_vec(),
        });
        if addr == self.chip_addr {
            for (offset, &value) in data.iter().enumerate() {
                let index = (usize::from(reg) + offset) & 0xFF;
                self.registers[index] = value;
            }
        }
        Ok(())
    }

    fn write_read(
        &mut self,
        addr: u8,
        bytes: &[u8],
        buf: &mut [u8],
        timeout_us: u32,
    ) -> Result<(), PhaseError> {
        self.begin(addr, false, timeout_us)?;
        let reg = bytes.first().copied().unwrap_or(0);
        self.log.push(Transaction::Read {
            addr,
            reg,
            len: buf.len(),
        });
        for (offset, slot) in buf.iter_mut().enumerate() {
            let index = (usize::from(reg) + offset) & 0xFF;
            *slot = if addr == self.chip_addr {
                self.registers[index]
            } else {
                0
            };
        }
        Ok(())
    }

    fn recovery_lines(&mut self, _config: &BusConfig) -> (&mut SimScl, &mut SimSda) {
        self.lines.split()
    }
}

/// Uninitialized transport over a fresh [`MockBus`] with default config
#[must_use]
pub fn sim_bus() -> I2cBus<MockBus, SimClock> {
    let clock = SimClock::new();
    I2cBus::new(MockBus::new(clock.clone()), clock, BusConfig::default())
}

/// Transport over a fresh [`MockBus`], already brought up
///
/// # Panics
///
/// Never: the fresh mock accepts every bring-up.
#[must_use]
pub fn ready_bus() -> I2cBus<MockBus, SimClock> {
    let mut bus = sim_bus();
    bus.init().expect("mock bring-up");
    bus
}
