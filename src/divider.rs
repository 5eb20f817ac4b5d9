//! Si5351 Divider Calculation
//!
//! Integer-mode PLL and multisynth divider math plus the register encoding
//! shared by both. This module is testable on the host.
//!
//! # Theory of Operation
//!
//! The Si5351 uses a two-stage frequency synthesis:
//! 1. PLL stage: FVCO = FXTAL × (a + b/c) where 15 ≤ a ≤ 90
//! 2. Multisynth stage: FOUT = FVCO / (a + b/c) where a ≥ 4
//!
//! Both stages are programmed through the same three fields:
//! P1 = 128a + ⌊128b/c⌋ − 512, P2 = 128b − c·⌊128b/c⌋, P3 = c.
//! This firmware always runs integer mode (b = 0, c = 1).

/// PLL feedback divider parameters
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PllParams {
    /// Integer part (15-90)
    pub a: u32,
    /// Numerator (0 to c-1)
    pub b: u32,
    /// Denominator (1-1048575)
    pub c: u32,
}

impl PllParams {
    /// Minimum PLL multiplier
    pub const MIN_A: u32 = 15;
    /// Maximum PLL multiplier
    pub const MAX_A: u32 = 90;

    /// Create integer PLL params (b=0, c=1)
    #[must_use]
    pub const fn integer(a: u32) -> Self {
        Self { a, b: 0, c: 1 }
    }

    /// Calculate the VCO frequency given crystal frequency
    #[must_use]
    pub fn vco_frequency(&self, xtal_hz: u64) -> u64 {
        // FVCO = FXTAL × (a + b/c), kept in integers
        (xtal_hz * u64::from(self.a) * u64::from(self.c) + xtal_hz * u64::from(self.b))
            / u64::from(self.c)
    }

    /// Validate parameters are in range
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.a >= Self::MIN_A && self.a <= Self::MAX_A && self.c >= 1 && self.b < self.c
    }

    /// Calculate P1, P2, P3 register values
    #[must_use]
    pub fn to_registers(&self) -> (u32, u32, u32) {
        split_fields(self.a, self.b, self.c)
    }

    /// Register image for the eight PLL parameter registers
    #[must_use]
    pub fn register_image(&self) -> [u8; 8] {
        let (p1, p2, p3) = self.to_registers();
        encode_fields(p1, p2, p3, 0)
    }
}

/// Multisynth (output) divider parameters
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MsParams {
    /// Integer part (≥ 4)
    pub a: u32,
    /// Numerator
    pub b: u32,
    /// Denominator
    pub c: u32,
    /// R divider power of 2 (0-7 for 1, 2, 4, 8, 16, 32, 64, 128)
    pub r_div: u8,
}

impl MsParams {
    /// Minimum integer divisor
    pub const MIN_A: u32 = 4;
    /// Maximum integer divisor
    pub const MAX_A: u32 = 1800;

    /// Create integer multisynth params (b=0, c=1)
    #[must_use]
    pub const fn integer(a: u32) -> Self {
        Self {
            a,
            b: 0,
            c: 1,
            r_div: 0,
        }
    }

    /// Calculate output frequency given VCO frequency
    #[must_use]
    pub fn output_frequency(&self, vco_hz: u64) -> u64 {
        // FOUT = FVCO × c / (a × c + b) / R
        let divisor = u64::from(self.a) * u64::from(self.c) + u64::from(self.b);
        let r = 1u64 << self.r_div;
        (vco_hz * u64::from(self.c)) / divisor / r
    }

    /// Calculate P1, P2, P3 register values
    #[must_use]
    pub fn to_registers(&self) -> (u32, u32, u32) {
        split_fields(self.a, self.b, self.c)
    }

    /// Register image for a channel's eight multisynth registers
    #[must_use]
    pub fn register_image(&self) -> [u8; 8] {
        let (p1, p2, p3) = self.to_registers();
        encode_fields(p1, p2, p3, self.r_div)
    }
}

/// Integer divider for a requested output: round(pll / target), kept
/// within the multisynth's integer range (4..=1800)
///
/// `target_hz` must be non-zero.
#[must_use]
pub fn integer_divider(pll_hz: u32, target_hz: u32) -> u32 {
    let pll = u64::from(pll_hz);
    let target = u64::from(target_hz);
    let rounded = (pll + target / 2) / target;
    let clamped = rounded.clamp(u64::from(MsParams::MIN_A), u64::from(MsParams::MAX_A));
    u32::try_from(clamped).unwrap_or(MsParams::MAX_A)
}

fn split_fields(a: u32, b: u32, c: u32) -> (u32, u32, u32) {
    let floor_128b_c = (128 * b) / c;
    let p1 = 128 * a + floor_128b_c - 512;
    let p2 = 128 * b - c * floor_128b_c;
    (p1, p2, c)
}

/// Pack P1/P2/P3 into the chip's 8-register layout (R divider in byte 2)
fn encode_fields(p1: u32, p2: u32, p3: u32, r_div: u8) -> [u8; 8] {
    [
        ((p3 >> 8) & 0xFF) as u8,
        (p3 & 0xFF) as u8,
        ((r_div & 0x07) << 4) | ((p1 >> 16) & 0x03) as u8,
        ((p1 >> 8) & 0xFF) as u8,
        (p1 & 0xFF) as u8,
        (((p3 >> 12) & 0xF0) | ((p2 >> 16) & 0x0F)) as u8,
        ((p2 >> 8) & 0xFF) as u8,
        (p2 & 0xFF) as u8,
    ]
}
