//! Si5351A Controller Tests
//!
//! Register programming order, divider encoding, Output-Enable handling and
//! failure policy, verified against the simulated register file.
//! Run with: cargo test --no-default-features --features std --test synth_tests

use clockgen_firmware::divider::{integer_divider, MsParams, PllParams};
use clockgen_firmware::drivers::si5351::{
    reg, ChannelUpdate, InitPolicy, Si5351, CONTROL_NOMINAL, CONTROL_POWER_DOWN,
};
use clockgen_firmware::error::Error;
use clockgen_firmware::hal::i2c::{BusError, I2cAddress};
use clockgen_firmware::hal::mock::{ready_bus, Fault, MockBus, SimClock, Transaction};
use clockgen_firmware::types::{ClockOutput, Frequency};

type Synth = Si5351<MockBus, SimClock>;

fn synth() -> Synth {
    Si5351::new(ready_bus(), I2cAddress::SI5351)
}

fn initialized() -> Synth {
    let mut s = synth();
    s.init_basic().unwrap();
    s.bus_mut().port_mut().clear_transactions();
    s
}

fn writes(s: &Synth) -> Vec<(u8, Vec<u8>)> {
    s.bus().port().writes()
}

fn position(log: &[(u8, Vec<u8>)], register: u8) -> usize {
    log.iter()
        .position(|(r, _)| *r == register)
        .unwrap_or_else(|| panic!("no write to register {register}"))
}

/// Divider registers of all three multisynths
fn divider_block(s: &Synth) -> Vec<u8> {
    s.bus().port().registers(reg::MS0_PARAMS, 24).to_vec()
}

// =============================================================================
// Binding and Bring-up Tests
// =============================================================================

#[test]
fn binding_performs_no_io() {
    let s = synth();
    assert!(s.bus().port().transactions().is_empty());
    assert_eq!(s.pll(), PllParams::integer(32));
    assert_eq!(s.init_policy(), InitPolicy::Continue);
}

#[test]
fn init_basic_register_sequence() {
    let mut s = synth();
    s.init_basic().unwrap();

    let expected: Vec<(u8, Vec<u8>)> = vec![
        (reg::OUTPUT_ENABLE, vec![0xFF]),
        (reg::CRYSTAL_LOAD, vec![0xC0]),
        (reg::PLLA_PARAMS, vec![0x00, 0x01, 0x00, 0x0E, 0x00, 0x00, 0x00, 0x00]),
        (reg::PLL_RESET, vec![0xA0]),
        (reg::MS0_PARAMS, vec![0x00, 0x01, 0x00, 0x02, 0x00, 0x00, 0x00, 0x00]),
        (reg::CLK0_CONTROL, vec![CONTROL_NOMINAL]),
        (reg::CLK1_CONTROL, vec![CONTROL_POWER_DOWN]),
        (reg::CLK2_CONTROL, vec![CONTROL_POWER_DOWN]),
        (reg::OUTPUT_ENABLE, vec![0xFE]),
    ];
    assert_eq!(writes(&s), expected);
}

#[test]
fn init_basic_final_state() {
    let mut s = synth();
    s.init_basic().unwrap();

    let port = s.bus().port();
    assert_eq!(port.register(reg::OUTPUT_ENABLE), 0xFE);
    assert_eq!(port.register(reg::CLK1_CONTROL), 0x80);
    assert_eq!(port.register(reg::CLK2_CONTROL), 0x80);

    let clk0 = s.channel(ClockOutput::Clk0);
    assert!(clk0.enabled && clk0.powered);
    assert_eq!(clk0.divider, Some(8));
    assert_eq!(clk0.frequency, Frequency::from_mhz(100));
    for out in [ClockOutput::Clk1, ClockOutput::Clk2] {
        let ch = s.channel(out);
        assert!(!ch.enabled);
        assert!(!ch.powered);
    }
    assert_eq!(s.output_enable_mask(), 0xFE);
}

#[test]
fn init_policy_continue_runs_every_step() {
    let mut s = synth();
    s.bus_mut().port_mut().fail_writes_to(reg::CRYSTAL_LOAD);
    assert_eq!(
        s.init_basic(),
        Err(Error::PartialInit { failed_writes: 1 })
    );
    let log = writes(&s);
    assert_eq!(log.len(), 8);
    assert_eq!(log.last(), Some(&(reg::OUTPUT_ENABLE, vec![0xFE])));
}

#[test]
fn init_policy_abort_stops_at_first_failure() {
    let mut s = synth().with_init_policy(InitPolicy::Abort);
    s.bus_mut().port_mut().fail_writes_to(reg::PLL_RESET);
    assert_eq!(
        s.init_basic(),
        Err(Error::Bus(BusError::NoAcknowledge))
    );
    let registers: Vec<u8> = writes(&s).into_iter().map(|(r, _)| r).collect();
    assert_eq!(
        registers,
        [reg::OUTPUT_ENABLE, reg::CRYSTAL_LOAD, reg::PLLA_PARAMS]
    );
    // Outputs stay closed
    assert_eq!(s.bus().port().register(reg::OUTPUT_ENABLE), 0xFF);
}

// =============================================================================
// Frequency Programming Tests
// =============================================================================

#[test]
fn program_channel_one() {
    let mut s = initialized();
    let update = s.set_channel_frequency(1, 20).unwrap();
    assert_eq!(
        update,
        ChannelUpdate::Programmed {
            output: ClockOutput::Clk1,
            frequency: Frequency::from_mhz(20).unwrap(),
            divider: 40,
        }
    );

    let port = s.bus().port();
    // P1 = 128 × 40 - 512 = 0x1200
    assert_eq!(
        port.registers(reg::MS1_PARAMS, 8),
        &[0x00, 0x01, 0x00, 0x12, 0x00, 0x00, 0x00, 0x00]
    );
    assert_eq!(port.register(reg::CLK1_CONTROL), CONTROL_NOMINAL);
    // CLK0 stays enabled, CLK1 joins it
    assert_eq!(port.register(reg::OUTPUT_ENABLE), 0xFC);
    assert!(s.channel(ClockOutput::Clk1).enabled);
}

#[test]
fn enable_is_always_last() {
    let mut s = initialized();
    for (ch, mhz) in [(2u8, 25u32), (0, 7), (1, 150)] {
        s.bus_mut().port_mut().clear_transactions();
        s.set_channel_frequency(ch, mhz).unwrap();
        let out = ClockOutput::from_index(ch).unwrap();
        let log = writes(&s);
        let ms = position(&log, reg::MS0_PARAMS + 8 * ch);
        let control = position(&log, reg::CLK0_CONTROL + ch);
        let oe = position(&log, reg::OUTPUT_ENABLE);
        assert!(ms < control && control < oe, "{out} programmed out of order");
        assert_eq!(oe, log.len() - 1);
    }
}

#[test]
fn divider_matches_rounding_for_every_whole_mhz() {
    let mut s = initialized();
    for mhz in 1..=150u32 {
        s.set_channel_frequency(0, mhz).unwrap();
        let div = integer_divider(800_000_000, mhz * 1_000_000);
        assert!(div >= 4);
        assert_eq!(
            s.bus().port().registers(reg::MS0_PARAMS, 8),
            &MsParams::integer(div).register_image()
        );
        assert_eq!(s.channel(ClockOutput::Clk0).divider, Some(div));
    }
}

#[test]
fn zero_disables_without_touching_dividers() {
    let mut s = initialized();
    s.set_channel_frequency(2, 10).unwrap();
    s.bus_mut().port_mut().clear_transactions();
    let before = divider_block(&s);

    let update = s.set_channel_frequency(2, 0).unwrap();
    assert_eq!(update, ChannelUpdate::Disabled(ClockOutput::Clk2));
    assert_eq!(divider_block(&s), before);
    assert_eq!(writes(&s), vec![(reg::OUTPUT_ENABLE, vec![0xFE | 0x04])]);
    assert!(!s.channel(ClockOutput::Clk2).enabled);
    // Divider record kept for a later re-enable
    assert_eq!(s.channel(ClockOutput::Clk2).divider, Some(80));
}

#[test]
fn single_channel_changes_leave_other_bits() {
    let mut s = initialized();
    s.set_channel_frequency(1, 10).unwrap();
    s.set_channel_frequency(2, 10).unwrap();
    assert_eq!(s.bus().port().register(reg::OUTPUT_ENABLE), 0xF8);

    s.set_channel_frequency(1, 0).unwrap();
    assert_eq!(s.bus().port().register(reg::OUTPUT_ENABLE), 0xFA);
    s.set_channel_frequency(0, 0).unwrap();
    assert_eq!(s.bus().port().register(reg::OUTPUT_ENABLE), 0xFB);
}

#[test]
fn too_high_rejected_before_bus() {
    let mut s = initialized();
    for mhz in [151u32, 1_000, u32::MAX] {
        assert_eq!(
            s.set_channel_frequency(0, mhz),
            Err(Error::FrequencyTooHigh { mhz })
        );
    }
    assert!(s.bus().port().transactions().is_empty());
    assert_eq!(s.channel(ClockOutput::Clk0).divider, Some(8));
}

#[test]
fn invalid_channel_rejected_before_bus() {
    let mut s = initialized();
    assert_eq!(s.set_channel_frequency(3, 10), Err(Error::InvalidChannel(3)));
    assert_eq!(s.set_channel_frequency(255, 0), Err(Error::InvalidChannel(255)));
    assert!(s.bus().port().transactions().is_empty());
}

#[test]
fn failed_divider_write_never_enables() {
    let mut s = initialized();
    s.bus_mut().port_mut().inject(Fault::Nack);
    assert_eq!(
        s.set_channel_frequency(1, 20),
        Err(Error::Bus(BusError::NoAcknowledge))
    );
    assert!(writes(&s).is_empty());
    assert_eq!(s.bus().port().register(reg::OUTPUT_ENABLE), 0xFE);
    assert!(!s.channel(ClockOutput::Clk1).enabled);
}

#[test]
fn failed_control_write_never_enables() {
    let mut s = initialized();
    s.bus_mut().port_mut().fail_writes_to(reg::CLK2_CONTROL);
    assert!(s.set_channel_frequency(2, 20).is_err());
    let registers: Vec<u8> = writes(&s).into_iter().map(|(r, _)| r).collect();
    assert_eq!(registers, [reg::MS2_PARAMS]);
    assert_eq!(s.bus().port().register(reg::OUTPUT_ENABLE), 0xFE);
}

#[test]
fn oe_read_failure_uses_cached_mask() {
    let mut s = initialized();
    // Chip value drifts but the read fails, so the cache wins
    s.bus_mut().port_mut().set_register(reg::OUTPUT_ENABLE, 0x00);
    s.bus_mut().port_mut().inject(Fault::Nack);
    s.set_channel_frequency(2, 0).unwrap();
    assert_eq!(s.bus().port().register(reg::OUTPUT_ENABLE), 0xFE | 0x04);
}

#[test]
fn oe_read_modify_write_uses_chip_value() {
    let mut s = initialized();
    s.bus_mut().port_mut().set_register(reg::OUTPUT_ENABLE, 0xF8);
    s.set_channel_frequency(1, 0).unwrap();
    let log = s.bus().port().transactions();
    assert!(matches!(
        log[0],
        Transaction::Read {
            reg: reg::OUTPUT_ENABLE,
            len: 1,
            ..
        }
    ));
    assert_eq!(s.bus().port().register(reg::OUTPUT_ENABLE), 0xFA);
    assert!(s.channel(ClockOutput::Clk2).enabled);
}

// =============================================================================
// Diagnostics Tests
// =============================================================================

#[test]
fn force_enable_reopens_clk0_only() {
    let mut s = initialized();
    s.set_all_outputs(true).unwrap();
    s.bus_mut().port_mut().set_register(reg::CLK0_CONTROL, 0x80);
    s.bus_mut().port_mut().clear_transactions();

    assert_eq!(s.force_enable(), Ok((0xFE, 0x4F)));
    assert_eq!(
        writes(&s),
        vec![
            (reg::OUTPUT_ENABLE, vec![0xFF]),
            (reg::CLK0_CONTROL, vec![0x4F]),
            (reg::OUTPUT_ENABLE, vec![0xFE]),
        ]
    );
    assert!(s.channel(ClockOutput::Clk0).enabled);
    assert!(!s.channel(ClockOutput::Clk1).enabled);
}

#[test]
fn all_outputs_on_off() {
    let mut s = initialized();
    s.set_all_outputs(false).unwrap();
    assert_eq!(s.bus().port().register(reg::OUTPUT_ENABLE), 0xFF);
    assert!(ClockOutput::ALL.iter().all(|&o| !s.channel(o).enabled));

    s.set_all_outputs(true).unwrap();
    assert_eq!(s.bus().port().register(reg::OUTPUT_ENABLE), 0x00);
    assert!(ClockOutput::ALL.iter().all(|&o| s.channel(o).enabled));
}

#[test]
fn status_reads_three_registers() {
    let mut s = initialized();
    s.bus_mut().port_mut().set_register(reg::DEVICE_STATUS, 0x20);
    let report = s.status().unwrap();
    assert!(report.lol_a());
    assert!(!report.sys_init() && !report.lol_b() && !report.los());
    assert_eq!(report.output_enable, 0xFE);
    assert_eq!(report.clk0_control, 0x4F);
}

#[test]
fn status_propagates_read_failure() {
    let mut s = initialized();
    s.bus_mut().port_mut().inject(Fault::Stall);
    assert_eq!(s.status(), Err(Error::Bus(BusError::Timeout)));
}

#[test]
fn whoami_reads_first_two_registers() {
    let mut s = initialized();
    s.bus_mut().port_mut().set_register(0, 0x11);
    s.bus_mut().port_mut().set_register(1, 0x22);
    assert_eq!(s.whoami(), Ok((0x11, 0x22)));
}

#[test]
fn peek_and_poke_pass_through() {
    let mut s = initialized();
    s.poke(0x95, 0x5A).unwrap();
    assert_eq!(s.peek(0x95), Ok(0x5A));

    s.poke(reg::OUTPUT_ENABLE, 0xF9).unwrap();
    assert_eq!(s.output_enable_mask(), 0xF9);
    assert!(s.channel(ClockOutput::Clk1).enabled);
    assert!(!s.channel(ClockOutput::Clk0).enabled);
}
