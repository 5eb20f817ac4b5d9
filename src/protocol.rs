//! Console Command Protocol
//!
//! Parses one console line into a [`Command`]. `=` counts as whitespace, so
//! `clk0=100` and `clk0 100` are the same command; the verb is matched
//! case-insensitively. Parsing never touches the bus.

use heapless::String;

use crate::config::CMD_VERB_LEN;
use crate::error::{Error, Result};

/// Console command
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    /// Print the command summary
    Help,
    /// Quick bus probe, first responder only
    Scan,
    /// Probe every valid address
    ScanAll,
    /// Address-only write to the chip
    Ping,
    /// Read registers 0 and 1
    WhoAmI,
    /// Report status flags, Output-Enable and CLK0 control
    Status,
    /// Run the full bring-up sequence
    Init,
    /// Read one register
    Peek {
        /// Register address
        register: u8,
    },
    /// Write one register
    Poke {
        /// Register address
        register: u8,
        /// Value to write
        value: u8,
    },
    /// Force CLK0 on
    ForceOn,
    /// Program or disable (0 MHz) one output
    SetFrequency {
        /// Channel index as typed
        channel: u8,
        /// Requested frequency in MHz
        mhz: u32,
    },
    /// Enable or disable every output
    OutputEnable(bool),
    /// Run the bus-clear recovery
    BusClear,
}

/// Usage line for `freq`
pub const USAGE_FREQ: &str = "freq <MHz>";
/// Usage line for `clk`
pub const USAGE_CLK: &str = "clk <ch:0|1|2> <MHz>";
/// Usage line for `oe`
pub const USAGE_OE: &str = "oe on|off";
/// Usage line for `peek`
pub const USAGE_PEEK: &str = "peek <reg hex>";
/// Usage line for `poke`
pub const USAGE_POKE: &str = "poke <reg hex> <val hex>";

/// Per-channel verb prefixes; `cll` tolerates a common typo of `clk`
const CHANNEL_PREFIXES: [&str; 4] = ["freq", "clk", "cll", "ch"];

/// Command summary printed by `help`
pub const HELP_TEXT: &[&str] = &[
    "",
    "==================  HELP MENU (Si5351A)  ==================",
    " help / h / H / ?           : show this help",
    " scan                       : I2C scan (first device)",
    " scanall                    : I2C scan (all addresses)",
    " ping                       : probe the Si5351A address",
    " whoami                     : read Reg0/Reg1",
    " status                     : SYS_INIT/LOL/LOS, OE, CLK0 control",
    " init                       : re-init Si5351A (PLLA=800MHz)",
    " peek <reg>                 : read register (hex)",
    " poke <reg> <val>           : write register (hex)",
    " force_on                   : force CLK0 on",
    " freq=<MHz>                 : set CLK0",
    " clk <ch> <MHz>             : set CLKch (ch=0|1|2, MHz=0 disables)",
    " clk0=<MHz> / ch0=<MHz> / freq0=<MHz> (also 1, 2)",
    " cll0=<MHz> / cll1=<MHz> / cll2=<MHz> (typo tolerant)",
    " oe on|off                  : enable/disable all outputs",
    " busclear                   : free a stuck I2C bus",
    "",
    " Examples:",
    "  clk 1 20    -> CLK1 = 20 MHz",
    "  freq1=50    -> CLK1 = 50 MHz",
    "  ch2=0       -> disable CLK2",
    "==========================================================",
];

/// Split a line into tokens, treating `=` as whitespace
pub fn tokens(line: &str) -> impl Iterator<Item = &str> {
    line.split(|c: char| c.is_ascii_whitespace() || c == '=')
        .filter(|t| !t.is_empty())
}

impl Command {
    /// Parse one line
    ///
    /// Returns `Ok(None)` for a blank line. Extra trailing tokens are ignored.
    ///
    /// # Errors
    ///
    /// `UnknownCommand` for an unrecognized verb, `Usage` for missing or
    /// malformed arguments.
    pub fn parse(line: &str) -> Result<Option<Self>> {
        let mut toks = tokens(line);
        let Some(first) = toks.next() else {
            return Ok(None);
        };
        let verb = lower_verb(first);

        let cmd = match verb.as_str() {
            "help" | "h" | "?" => Self::Help,
            "scan" => Self::Scan,
            "scanall" => Self::ScanAll,
            "ping" => Self::Ping,
            "whoami" => Self::WhoAmI,
            "status" => Self::Status,
            "init" => Self::Init,
            "force_on" => Self::ForceOn,
            "busclear" => Self::BusClear,
            "peek" => Self::Peek {
                register: hex_arg(toks.next(), USAGE_PEEK)?,
            },
            "poke" => Self::Poke {
                register: hex_arg(toks.next(), USAGE_POKE)?,
                value: hex_arg(toks.next(), USAGE_POKE)?,
            },
            "oe" => match toks.next() {
                Some(m) if m.eq_ignore_ascii_case("on") => Self::OutputEnable(true),
                Some(m) if m.eq_ignore_ascii_case("off") => Self::OutputEnable(false),
                _ => return Err(Error::Usage(USAGE_OE)),
            },
            "freq" => Self::SetFrequency {
                channel: 0,
                mhz: mhz_arg(toks.next(), USAGE_FREQ)?,
            },
            "clk" => {
                let channel = toks
                    .next()
                    .and_then(|t| t.parse::<u8>().ok())
                    .ok_or(Error::Usage(USAGE_CLK))?;
                Self::SetFrequency {
                    channel,
                    mhz: mhz_arg(toks.next(), USAGE_CLK)?,
                }
            }
            other => {
                let channel = channel_alias(other).ok_or(Error::UnknownCommand)?;
                // No argument means disable
                let mhz = match toks.next() {
                    Some(t) => mhz_arg(Some(t), USAGE_CLK)?,
                    None => 0,
                };
                Self::SetFrequency { channel, mhz }
            }
        };
        Ok(Some(cmd))
    }
}

/// Lower-cased verb, truncated to the verb buffer
fn lower_verb(token: &str) -> String<CMD_VERB_LEN> {
    let mut verb = String::new();
    for c in token.chars().take(CMD_VERB_LEN - 1) {
        if verb.push(c.to_ascii_lowercase()).is_err() {
            break;
        }
    }
    verb
}

/// `clk0`, `ch1`, `freq2`, `cll0` and so on
fn channel_alias(verb: &str) -> Option<u8> {
    CHANNEL_PREFIXES.iter().find_map(|prefix| {
        match verb.strip_prefix(prefix)? {
            "0" => Some(0),
            "1" => Some(1),
            "2" => Some(2),
            _ => None,
        }
    })
}

fn mhz_arg(token: Option<&str>, usage: &'static str) -> Result<u32> {
    token
        .and_then(|t| t.parse::<u32>().ok())
        .ok_or(Error::Usage(usage))
}

fn hex_arg(token: Option<&str>, usage: &'static str) -> Result<u8> {
    let token = token.ok_or(Error::Usage(usage))?;
    let digits = token
        .strip_prefix("0x")
        .or_else(|| token.strip_prefix("0X"))
        .unwrap_or(token);
    u8::from_str_radix(digits, 16).map_err(|_| Error::Usage(usage))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(line: &str) -> Command {
        Command::parse(line).unwrap().unwrap()
    }

    #[test]
    fn equals_is_whitespace() {
        assert_eq!(parse("clk0=100"), parse("clk 0 100"));
        assert_eq!(
            parse("clk0=100"),
            Command::SetFrequency {
                channel: 0,
                mhz: 100
            }
        );
        assert_eq!(parse("freq=25"), parse("freq 25"));
    }

    #[test]
    fn verbs_are_case_insensitive() {
        assert_eq!(parse("HELP"), Command::Help);
        assert_eq!(parse("H"), Command::Help);
        assert_eq!(parse("?"), Command::Help);
        assert_eq!(parse("CLK1=20"), parse("clk 1 20"));
        assert_eq!(parse("oe ON"), Command::OutputEnable(true));
    }

    #[test]
    fn channel_aliases() {
        for (line, channel) in [("ch2=7", 2), ("freq1=7", 1), ("cll0=7", 0), ("clk2 7", 2)] {
            assert_eq!(parse(line), Command::SetFrequency { channel, mhz: 7 });
        }
    }

    #[test]
    fn alias_without_argument_disables() {
        assert_eq!(
            parse("clk1"),
            Command::SetFrequency {
                channel: 1,
                mhz: 0
            }
        );
    }

    #[test]
    fn blank_line_is_nothing() {
        assert_eq!(Command::parse("").unwrap(), None);
        assert_eq!(Command::parse("   \t").unwrap(), None);
        assert_eq!(Command::parse("=").unwrap(), None);
    }

    #[test]
    fn unknown_verbs() {
        assert_eq!(Command::parse("xyz"), Err(Error::UnknownCommand));
        assert_eq!(Command::parse("clk3=10"), Err(Error::UnknownCommand));
        assert_eq!(Command::parse("ch"), Err(Error::UnknownCommand));
    }

    #[test]
    fn hex_arguments() {
        assert_eq!(parse("peek 0x03"), Command::Peek { register: 3 });
        assert_eq!(parse("peek B7"), Command::Peek { register: 0xB7 });
        assert_eq!(
            parse("poke 10 4f"),
            Command::Poke {
                register: 0x10,
                value: 0x4F
            }
        );
        assert_eq!(Command::parse("peek"), Err(Error::Usage(USAGE_PEEK)));
        assert_eq!(Command::parse("poke 10 zz"), Err(Error::Usage(USAGE_POKE)));
        assert_eq!(Command::parse("peek 100"), Err(Error::Usage(USAGE_PEEK)));
    }

    #[test]
    fn usage_errors() {
        assert_eq!(Command::parse("freq"), Err(Error::Usage(USAGE_FREQ)));
        assert_eq!(Command::parse("clk 1"), Err(Error::Usage(USAGE_CLK)));
        assert_eq!(Command::parse("clk x 1"), Err(Error::Usage(USAGE_CLK)));
        assert_eq!(Command::parse("oe maybe"), Err(Error::Usage(USAGE_OE)));
        assert_eq!(Command::parse("clk0=abc"), Err(Error::Usage(USAGE_CLK)));
    }

    #[test]
    fn long_verbs_are_truncated_not_rejected_early() {
        let verb = lower_verb("ABCDEFGHIJKLMNOPQRSTUVWXYZABCDEFGHIJ");
        assert_eq!(verb.len(), CMD_VERB_LEN - 1);
        assert!(verb.starts_with("abcdef"));
    }
}
