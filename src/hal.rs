//! Hardware Abstraction Layer
//!
//! The bus transport and its platform seams. Everything except the STM32
//! port adapter is written against embedded-hal traits and runs on the host.

pub mod gpio;
pub mod i2c;
pub mod timer;

#[cfg(any(test, feature = "std"))]
pub mod mock;

#[cfg(feature = "embedded")]
pub mod stm32;
