//! USB Subsystem
//!
//! Serial console framing for the CDC ACM interface.

pub mod cdc;
