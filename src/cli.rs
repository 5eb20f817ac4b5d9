//! Console Command Dispatcher
//!
//! Executes one console line against the synthesizer controller and writes
//! the CR/LF-terminated response to any [`core::fmt::Write`] sink. Every
//! failure produces exactly one diagnostic line; a blank line produces none.

use core::fmt::{self, Write};

use crate::drivers::si5351::{Si5351, StatusReport};
use crate::error::Error;
use crate::hal::i2c::BusPort;
use crate::hal::timer::TimeSource;
use crate::protocol::{Command, HELP_TEXT};

/// Parse and execute one line
///
/// # Errors
///
/// Only if writing to `out` fails.
pub fn handle_line<P, T, W>(line: &str, synth: &mut Si5351<P, T>, out: &mut W) -> fmt::Result
where
    P: BusPort,
    T: TimeSource,
    W: Write,
{
    match Command::parse(line) {
        Ok(None) => Ok(()),
        Ok(Some(cmd)) => {
            debug!("console command: {}", line);
            execute(cmd, synth, out)
        }
        Err(err) => diagnostic(out, err),
    }
}

/// Execute a parsed command
///
/// # Errors
///
/// Only if writing to `out` fails.
pub fn execute<P, T, W>(cmd: Command, synth: &mut Si5351<P, T>, out: &mut W) -> fmt::Result
where
    P: BusPort,
    T: TimeSource,
    W: Write,
{
    match cmd {
        Command::Help => {
            for line in HELP_TEXT {
                write!(out, "{line}\r\n")?;
            }
            Ok(())
        }
        Command::Scan => match synth.bus_mut().scan_quick() {
            Some(addr) => write!(out, "I2C device found at {addr}\r\n"),
            None => out.write_str("No I2C devices found\r\n"),
        },
        Command::ScanAll => {
            let found = synth.bus_mut().scan_full();
            for addr in &found {
                write!(out, "Found {addr}\r\n")?;
            }
            write!(out, "{} device(s)\r\n", found.len())
        }
        Command::Ping => {
            let addr = synth.address();
            if synth.bus_mut().ping(addr) {
                write!(out, "[PING] {addr} ACK\r\n")
            } else {
                write!(out, "[PING] {addr} NACK/Timeout\r\n")
            }
        }
        Command::WhoAmI => match synth.whoami() {
            Ok((r0, r1)) => write!(out, "Reg0:0x{r0:02X}, Reg1:0x{r1:02X}\r\n"),
            Err(err) => diagnostic(out, err),
        },
        Command::Status => match synth.status() {
            Ok(report) => write_status(out, &report),
            Err(err) => diagnostic(out, err),
        },
        Command::Init => match synth.init_basic() {
            Ok(()) => out.write_str("Si5351A initialized (PLLA=800 MHz)\r\n"),
            Err(err) => diagnostic(out, err),
        },
        Command::Peek { register } => match synth.peek(register) {
            Ok(value) => write!(out, "reg[0x{register:02X}] = 0x{value:02X}\r\n"),
            Err(err) => diagnostic(out, err),
        },
        Command::Poke { register, value } => match synth.poke(register, value) {
            Ok(()) => write!(out, "reg[0x{register:02X}] <= 0x{value:02X}\r\n"),
            Err(err) => diagnostic(out, err),
        },
        Command::ForceOn => match synth.force_enable() {
            Ok((oe, control)) => {
                write!(out, "force_on: OE=0x{oe:02X} CLK0_CTRL=0x{control:02X}\r\n")
            }
            Err(err) => diagnostic(out, err),
        },
        Command::SetFrequency { channel, mhz } => match synth.set_channel_frequency(channel, mhz) {
            Ok(update) => write!(out, "{update}\r\n"),
            Err(err) => diagnostic(out, err),
        },
        Command::OutputEnable(on) => match synth.set_all_outputs(on) {
            Ok(()) if on => out.write_str("OE: ON (all enabled)\r\n"),
            Ok(()) => out.write_str("OE: OFF (all disabled)\r\n"),
            Err(err) => diagnostic(out, err),
        },
        Command::BusClear => match synth.bus_mut().bus_clear() {
            Ok(pulses) => write!(out, "Bus clear: SDA released after {pulses} pulse(s)\r\n"),
            Err(err) => diagnostic(out, Error::Bus(err)),
        },
    }
}

fn write_status<W: Write>(out: &mut W, report: &StatusReport) -> fmt::Result {
    write!(
        out,
        "SYS_INIT={} LOL_B={} LOL_A={} LOS={}\r\n",
        u8::from(report.sys_init()),
        u8::from(report.lol_b()),
        u8::from(report.lol_a()),
        u8::from(report.los()),
    )?;
    write!(
        out,
        "OE=0x{:02X} CLK0_CTRL=0x{:02X}\r\n",
        report.output_enable, report.clk0_control
    )
}

fn diagnostic<W: Write>(out: &mut W, err: Error) -> fmt::Result {
    warn!("console: {}", err);
    write!(out, "{err}\r\n")
}
