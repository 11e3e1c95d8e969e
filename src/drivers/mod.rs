//! Drivers module
//!
//! The bit-banged SPI master and the pin contract it drives.

pub mod flex_pin;
pub mod soft_spi;
