//! # swspi
//!
//! Bit-banged SPI master for boards where no hardware SPI peripheral is free.
//! Three general-purpose pins carry MOSI, MISO and SCLK; timing comes from an
//! `embedded-hal` [`DelayNs`](embedded_hal::delay::DelayNs) provider.
//!
//! ```ignore
//! let mut spi = SoftSpi::new(mosi, miso, sclk, delay)?;
//! spi.set_format(16, 3)?;
//! spi.set_frequency(250_000);
//! let reply = spi.transfer(0x8F00)?;
//! ```

#![cfg_attr(not(test), no_std)]

// Must come first so the logging macros are visible below.
#[macro_use]
mod fmt;

pub mod config;
pub mod drivers;
#[cfg(any(test, feature = "sim"))]
pub mod sim;

pub use config::SoftSpiConfig;
pub use drivers::flex_pin::{Direction, FlexPin, PinBank, Pull};
pub use drivers::soft_spi::{Error, SoftSpi};
