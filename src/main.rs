//! Si5351A Clock Generator Main Application
//!
//! Entry point for the STM32G474 clock generator firmware.
//! Recovers and brings up the clock bus, programs the default outputs and
//! then serves the command console over USB CDC ACM.

#![no_std]
#![no_main]

use core::fmt::Write as _;

use defmt::{error, info, warn};
use embassy_executor::Spawner;
use embassy_futures::join::join;
use embassy_stm32::gpio::{Level, Output, Speed};
use embassy_stm32::usb::Driver;
use embassy_stm32::{bind_interrupts, peripherals, usb};
use embassy_time::Timer;
use embassy_usb::class::cdc_acm::{CdcAcmClass, State};
use embassy_usb::driver::{Driver as UsbDriver, EndpointError};
use embassy_usb::Builder;
use static_cell::StaticCell;
use {defmt_rtt as _, panic_probe as _};

use clockgen_firmware::cli;
use clockgen_firmware::hal::gpio::StatusLed;
use clockgen_firmware::hal::i2c::BusPort;
use clockgen_firmware::prelude::*;
use clockgen_firmware::usb::cdc::{LineBuffer, ResponseBuffer, UsbDeviceInfo, UsbStrings};

// Bind interrupt handlers
bind_interrupts!(struct Irqs {
    USB_LP => usb::InterruptHandler<peripherals::USB>;
});

/// Console lines replayed at boot to reach the documented default state
const BOOT_COMMANDS: [&str; 4] = ["init", "clk0=100", "clk1=0", "clk2=0"];

/// Main entry point
#[embassy_executor::main]
async fn main(spawner: Spawner) {
    info!("Si5351A Clock Generator v{}", env!("CARGO_PKG_VERSION"));

    // HSI48 trimmed from USB SOF clocks the USB peripheral
    let mut config = embassy_stm32::Config::default();
    {
        use embassy_stm32::rcc::{mux, Hsi48Config};
        config.rcc.hsi48 = Some(Hsi48Config {
            sync_from_usb: true,
        });
        config.rcc.mux.clk48sel = mux::Clk48sel::HSI48;
    }
    let p = embassy_stm32::init(config);

    info!("Peripherals initialized");

    // Status LED (PA5 on Nucleo boards); blinks for as long as the firmware runs
    let led = Output::new(p.PA5, Level::Low, Speed::Low);
    spawner.spawn(heartbeat_task(led)).unwrap();

    // I2C1 for the Si5351A: PB8 = SCL, PB9 = SDA
    let port = Stm32I2cPort::new(p.I2C1, p.PB8, p.PB9);
    let mut bus = I2cBus::new(port, EmbassyTime, BusConfig::default());

    match bus.bus_clear() {
        Ok(pulses) => info!("Bus clear done ({} pulses)", pulses),
        Err(err) => warn!("Bus clear failed: {}", err),
    }

    if bus.init().is_err() {
        halt("I2C init failed").await;
    }
    if !bus.ping(I2cAddress::SI5351) {
        halt("Si5351A not responding at 0x60").await;
    }
    let _ = bus.scan_quick();

    let mut synth = Si5351::new(bus, I2cAddress::SI5351).with_init_policy(InitPolicy::Continue);
    let mut boot_log: ResponseBuffer<RESPONSE_BUFFER_SIZE> = ResponseBuffer::new();
    for command in BOOT_COMMANDS {
        boot_log.clear();
        let _ = cli::handle_line(command, &mut synth, &mut boot_log);
        info!(
            "boot> {}: {}",
            command,
            core::str::from_utf8(boot_log.as_bytes()).unwrap_or("")
        );
    }

    // USB CDC ACM console
    let driver = Driver::new(p.USB, Irqs, p.PA12, p.PA11);

    let device = UsbDeviceInfo::default();
    let strings = UsbStrings::default();
    let mut usb_config = embassy_usb::Config::new(device.vid, device.pid);
    usb_config.manufacturer = Some(strings.manufacturer);
    usb_config.product = Some(strings.product);
    usb_config.serial_number = Some(strings.serial);
    usb_config.device_release = device.device_release;
    usb_config.max_power = 100;
    usb_config.max_packet_size_0 = 64;

    static CONFIG_DESCRIPTOR: StaticCell<[u8; 256]> = StaticCell::new();
    static BOS_DESCRIPTOR: StaticCell<[u8; 256]> = StaticCell::new();
    static CONTROL_BUF: StaticCell<[u8; 64]> = StaticCell::new();
    static CDC_STATE: StaticCell<State<'static>> = StaticCell::new();

    let mut builder = Builder::new(
        driver,
        usb_config,
        CONFIG_DESCRIPTOR.init([0; 256]),
        BOS_DESCRIPTOR.init([0; 256]),
        &mut [],
        CONTROL_BUF.init([0; 64]),
    );
    let state = CDC_STATE.init(State::new());
    let mut class = CdcAcmClass::new(&mut builder, state, USB_CDC_PACKET_SIZE);
    let mut usb = builder.build();

    info!("{} ready, entering console loop", device);

    let console_fut = async {
        loop {
            class.wait_connection().await;
            info!("Console connected");
            if console(&mut class, &mut synth).await.is_err() {
                info!("Console disconnected");
            }
        }
    };

    join(usb.run(), console_fut).await;
}

/// Serve the command console until the host goes away
async fn console<'d, D, P, T>(
    class: &mut CdcAcmClass<'d, D>,
    synth: &mut Si5351<P, T>,
) -> Result<(), EndpointError>
where
    D: UsbDriver<'d>,
    P: BusPort,
    T: TimeSource,
{
    let mut lines = LineBuffer::new();
    let mut out: ResponseBuffer<RESPONSE_BUFFER_SIZE> = ResponseBuffer::new();
    let mut packet = [0u8; USB_CDC_PACKET_SIZE as usize];

    let _ = write!(out, "\r\nSi5351A CLI ready. Type 'help'.\r\n> ");
    flush(class, &mut out).await?;

    loop {
        let n = class.read_packet(&mut packet).await?;
        let received = &packet[..n];
        class.write_packet(received).await?;

        lines.feed_all(received, |line| {
            let _ = out.write_str("\r\n");
            let _ = cli::handle_line(line, synth, &mut out);
            let _ = out.write_str("> ");
        });
        if !out.is_empty() {
            if out.truncated() {
                warn!("console response truncated");
            }
            flush(class, &mut out).await?;
        }
    }
}

/// Send and clear the response buffer
async fn flush<'d, D: UsbDriver<'d>>(
    class: &mut CdcAcmClass<'d, D>,
    out: &mut ResponseBuffer<RESPONSE_BUFFER_SIZE>,
) -> Result<(), EndpointError> {
    let packet = usize::from(USB_CDC_PACKET_SIZE);
    let mut last = 0;
    for chunk in out.chunks(packet) {
        class.write_packet(chunk).await?;
        last = chunk.len();
    }
    // A full final packet needs a ZLP to end the transfer
    if last == packet {
        class.write_packet(&[]).await?;
    }
    out.clear();
    Ok(())
}

/// Stop bring-up for good; the heartbeat keeps running
async fn halt(reason: &str) {
    error!("HALT: {}", reason);
    loop {
        Timer::after(Duration::from_secs(1)).await;
    }
}

/// Heartbeat task - blinks LED to show system is running
#[embassy_executor::task]
async fn heartbeat_task(led: Output<'static>) {
    let mut led = StatusLed::new(led);
    loop {
        led.toggle();
        Timer::after(Duration::from_millis(LED_BLINK_MS)).await;
    }
}
