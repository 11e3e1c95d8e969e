//! # Bus Configuration
//!
//! Frame format and bit rate for the software SPI master. Defaults live in
//! [`constants`] so a board file can override only what differs.

use embedded_hal::spi::{Mode, Phase, Polarity};

/// Bus-level defaults and thresholds
pub mod constants {
    /// Default word width in bits
    pub const DEFAULT_WORD_BITS: u8 = 8;

    /// Default clock mode (CPOL=0, CPHA=0)
    pub const DEFAULT_MODE: u8 = 0;

    /// Default bit rate (1 MHz)
    pub const DEFAULT_FREQUENCY_HZ: u32 = 1_000_000;

    /// At or above this rate the untimed fast path is taken
    pub const FAST_PATH_THRESHOLD_HZ: u32 = 1_000_000;

    /// Half a bit period is `HALF_PERIOD_NUMERATOR / hz` microseconds
    pub const HALF_PERIOD_NUMERATOR: u32 = 500_000;

    /// Widest word the transfer value can carry
    pub const MAX_WORD_BITS: u8 = 32;
}

/// Frame format and bit rate applied to a [`SoftSpi`](crate::SoftSpi).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SoftSpiConfig {
    /// Bits per transferred word
    pub word_bits: u8,

    /// Clock mode 0..=3, bit 1 is CPOL and bit 0 is CPHA
    pub mode: u8,

    /// Requested bit rate in Hz
    pub frequency_hz: u32,
}

impl Default for SoftSpiConfig {
    fn default() -> Self {
        Self {
            word_bits: constants::DEFAULT_WORD_BITS,
            mode: constants::DEFAULT_MODE,
            frequency_hz: constants::DEFAULT_FREQUENCY_HZ,
        }
    }
}

impl SoftSpiConfig {
    pub const fn new(word_bits: u8, mode: u8, frequency_hz: u32) -> Self {
        Self { word_bits, mode, frequency_hz }
    }

    /// Idle clock level for this mode
    pub const fn polarity(&self) -> bool {
        polarity_of(self.mode)
    }

    /// `true` when input is sampled after the first clock transition
    pub const fn phase(&self) -> bool {
        phase_of(self.mode)
    }

    pub const fn is_fast(&self) -> bool {
        is_fast(self.frequency_hz)
    }

    pub const fn half_period_us(&self) -> u32 {
        half_period_us(self.frequency_hz)
    }
}

pub const fn polarity_of(mode: u8) -> bool {
    (mode >> 1) & 1 == 1
}

pub const fn phase_of(mode: u8) -> bool {
    mode & 1 == 1
}

pub const fn is_fast(frequency_hz: u32) -> bool {
    frequency_hz >= constants::FAST_PATH_THRESHOLD_HZ
}

/// Half a bit period in whole microseconds, truncated. A zero rate is read as 1 Hz.
pub const fn half_period_us(frequency_hz: u32) -> u32 {
    let hz = if frequency_hz == 0 { 1 } else { frequency_hz };
    constants::HALF_PERIOD_NUMERATOR / hz
}

/// Numeric clock mode for an `embedded-hal` SPI mode.
pub const fn mode_number(mode: Mode) -> u8 {
    let cpol = match mode.polarity {
        Polarity::IdleLow => 0,
        Polarity::IdleHigh => 1,
    };
    let cpha = match mode.phase {
        Phase::CaptureOnFirstTransition => 0,
        Phase::CaptureOnSecondTransition => 1,
    };
    (cpol << 1) | cpha
}
