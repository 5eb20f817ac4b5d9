//! Si5351A Clock Generator Firmware Library
//!
//! This library drives an `Si5351A` clock synthesizer from an STM32G474
//! over I2C and exposes it through a line-oriented USB serial console.
//!
//! # Architecture
//!
//! The firmware is organized in layers:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    APPLICATION LAYER                         │
//! │  Console framing (usb::cdc)  │  Dispatcher (cli, protocol)   │
//! ├─────────────────────────────────────────────────────────────┤
//! │                      DRIVER LAYER                            │
//! │  Si5351A controller  │  Divider math (divider)               │
//! ├─────────────────────────────────────────────────────────────┤
//! │                   HAL / TRANSPORT LAYER                      │
//! │  I2C transport  │  Bus clear  │  Time source  │  Port seam   │
//! ├─────────────────────────────────────────────────────────────┤
//! │                    RTOS / SCHEDULER                          │
//! │           embassy-rs (async/await executor)                  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Control is synchronous from the console down to the bus. The only other
//! activity is the status LED blinker, which shares nothing with the bus.
//!
//! # Design Principles
//!
//! - **Explicit context**: the transport and controller are values threaded
//!   through every call, never module-level state
//! - **Injected time**: retry windows and recovery timing run on a
//!   [`hal::timer::TimeSource`], so host tests simulate elapsed time
//! - **No unsafe in application code**: the STM32 port adapter is the only exception
//! - **Explicit error handling**: All fallible operations return `Result`

#![cfg_attr(feature = "embedded", no_std)]
#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Must come first so the logging macros are visible to every module
#[macro_use]
mod fmt;

// Re-export dependencies needed by applications (only in embedded mode)
#[cfg(feature = "embedded")]
pub use embassy_executor;
#[cfg(feature = "embedded")]
pub use embassy_stm32;
#[cfg(feature = "embedded")]
pub use embassy_time;
#[cfg(feature = "embedded")]
pub use embassy_usb;

/// System configuration and constants
pub mod config;

/// Shared types used across modules
pub mod types;

/// Controller and console errors
pub mod error;

/// PLL and multisynth divider math
pub mod divider;

/// Hardware Abstraction Layer
///
/// I2C transport, time source, recovery GPIO and the STM32 port adapter.
pub mod hal;

/// Peripheral Drivers
///
/// The `Si5351A` synthesizer controller.
pub mod drivers;

/// Console command parsing
pub mod protocol;

/// Console command execution
pub mod cli;

/// USB Subsystem
///
/// CDC ACM console framing.
pub mod usb;

/// Prelude module for common imports
#[cfg(feature = "embedded")]
pub mod prelude {
    //! Convenient re-exports for common types and traits.

    pub use crate::config::*;
    pub use crate::types::*;

    pub use crate::drivers::si5351::{InitPolicy, Si5351};
    pub use crate::hal::i2c::{BusConfig, BusState, I2cAddress, I2cBus};
    pub use crate::hal::stm32::Stm32I2cPort;
    pub use crate::hal::timer::{EmbassyTime, TimeSource};

    // Common traits
    pub use embedded_hal::digital::OutputPin;

    // Embassy
    pub use embassy_time::{Duration, Instant, Timer};

    // Error handling
    pub use core::result::Result;

    // Logging
    pub use defmt::{debug, error, info, trace, warn};
}
