//! Blocking bit-banged SPI master.
//!
//! Drives MOSI/SCLK and samples MISO on three general-purpose pins, paced by
//! a microsecond delay. All four clock modes and word widths up to 32 bits.
//!
//! Between transfers every line is a floating input, so the bus can be shared
//! with other masters while idle. Each transfer claims the lines, clocks one
//! word MSB first and lets them float again.
//!
//! At 1 MHz and above a fixed 8-bit burst without delays runs first, followed
//! by the regular paced loop; the paced loop's result is returned.

use embedded_hal::delay::DelayNs;
use embedded_hal::spi::{ErrorKind, ErrorType, Mode, SpiBus};

use super::flex_pin::{Direction, FlexPin, PinBank, Pull};
use crate::config::{self, constants, SoftSpiConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error<E> {
    /// A pin operation failed
    Pin(E),
    /// Pin identifier invalid or already claimed
    ResourceUnavailable,
}

impl<E: core::fmt::Debug> embedded_hal::spi::Error for Error<E> {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Other
    }
}

pub struct SoftSpi<MOSI, MISO, SCLK, DELAY>
where
    MOSI: FlexPin,
    MISO: FlexPin,
    SCLK: FlexPin,
    DELAY: DelayNs,
{
    mosi: MOSI,
    miso: MISO,
    sclk: SCLK,
    delay: DELAY,
    word_bits: u8,
    mode: u8,
    polarity: bool,
    phase: bool,
    frequency_hz: u32,
    half_period_us: u32,
    fast: bool,
}

impl<MOSI, MISO, SCLK, DELAY, E> SoftSpi<MOSI, MISO, SCLK, DELAY>
where
    MOSI: FlexPin<Error = E>,
    MISO: FlexPin<Error = E>,
    SCLK: FlexPin<Error = E>,
    DELAY: DelayNs,
{
    /// Takes ownership of the three lines, floats them and applies the
    /// default format (8 bits, mode 0) and rate (1 MHz).
    pub fn new(mosi: MOSI, miso: MISO, sclk: SCLK, delay: DELAY) -> Result<Self, Error<E>> {
        Self::with_config(mosi, miso, sclk, delay, SoftSpiConfig::default())
    }

    pub fn with_config(
        mut mosi: MOSI,
        mut miso: MISO,
        mut sclk: SCLK,
        delay: DELAY,
        config: SoftSpiConfig,
    ) -> Result<Self, Error<E>> {
        mosi.float().map_err(Error::Pin)?;
        miso.float().map_err(Error::Pin)?;
        sclk.float().map_err(Error::Pin)?;

        let mut spi = Self {
            mosi,
            miso,
            sclk,
            delay,
            word_bits: 0,
            mode: 0,
            polarity: false,
            phase: false,
            frequency_hz: 0,
            half_period_us: 0,
            fast: false,
        };
        spi.set_format(config.word_bits, config.mode)?;
        spi.set_frequency(config.frequency_hz);
        debug!("soft-spi: ready, {} bits mode {} at {} Hz", spi.word_bits, spi.mode, spi.frequency_hz);
        Ok(spi)
    }

    /// Sets word width and clock mode, then parks the clock latch at the
    /// idle level. Values are not range checked.
    pub fn set_format(&mut self, bits: u8, mode: u8) -> Result<(), Error<E>> {
        if bits == 0 || bits > constants::MAX_WORD_BITS || mode > 3 {
            warn!("soft-spi: format {} bits mode {} out of range", bits, mode);
        }
        self.word_bits = bits;
        self.mode = mode;
        self.polarity = config::polarity_of(mode);
        self.phase = config::phase_of(mode);
        self.sclk.set_state(self.polarity.into()).map_err(Error::Pin)
    }

    pub fn set_mode(&mut self, mode: Mode) -> Result<(), Error<E>> {
        self.set_format(self.word_bits, config::mode_number(mode))
    }

    pub fn set_frequency(&mut self, hz: u32) {
        self.frequency_hz = hz;
        self.half_period_us = config::half_period_us(hz);
        self.fast = config::is_fast(hz);
        debug!("soft-spi: {} Hz, half period {} us, fast {}", hz, self.half_period_us, self.fast);
    }

    pub fn word_bits(&self) -> u8 {
        self.word_bits
    }

    pub fn mode(&self) -> u8 {
        self.mode
    }

    pub fn polarity(&self) -> bool {
        self.polarity
    }

    pub fn phase(&self) -> bool {
        self.phase
    }

    pub fn frequency(&self) -> u32 {
        self.frequency_hz
    }

    pub fn half_period_us(&self) -> u32 {
        self.half_period_us
    }

    pub fn is_fast(&self) -> bool {
        self.fast
    }

    pub fn config(&self) -> SoftSpiConfig {
        SoftSpiConfig::new(self.word_bits, self.mode, self.frequency_hz)
    }

    /// Clocks one word out on MOSI while sampling MISO, MSB first.
    ///
    /// Only the low `word_bits` bits of the result are meaningful. The lines
    /// float again before returning, also when a pin operation failed.
    pub fn transfer(&mut self, value: u32) -> Result<u32, Error<E>> {
        trace!("soft-spi: transfer {=u32:#x}", value);
        let result = self.claim_bus().and_then(|_| {
            if self.fast {
                // Result is overwritten by the paced loop below.
                let _ = self.fast_transfer(value as u8)?;
            }
            self.paced_transfer(value)
        });
        let released = self.release_bus();
        let read = result?;
        released?;
        Ok(read)
    }

    /// Consume and return the lines and the delay.
    pub fn release(self) -> (MOSI, MISO, SCLK, DELAY) {
        (self.mosi, self.miso, self.sclk, self.delay)
    }

    fn claim_bus(&mut self) -> Result<(), Error<E>> {
        self.mosi.drive().map_err(Error::Pin)?;
        self.miso.set_direction(Direction::Input).map_err(Error::Pin)?;
        self.miso.set_pull(Pull::None).map_err(Error::Pin)?;
        self.sclk.drive().map_err(Error::Pin)
    }

    /// Floats every line even if an earlier one fails; reports the first error.
    fn release_bus(&mut self) -> Result<(), Error<E>> {
        let mosi = self.mosi.float();
        let miso = self.miso.float();
        let sclk = self.sclk.float();
        mosi.and(miso).and(sclk).map_err(Error::Pin)
    }

    /// Byte-wide bus access with a non-8-bit format.
    fn check_byte_words(&self) {
        if self.word_bits != 8 {
            warn!("soft-spi: byte access with {}-bit words", self.word_bits);
        }
    }

    fn sample(&mut self, read: &mut u32, bit: u32) -> Result<(), Error<E>> {
        if self.miso.is_high().map_err(Error::Pin)? {
            *read |= 1u32.checked_shl(bit).unwrap_or(0);
        }
        Ok(())
    }

    fn paced_transfer(&mut self, value: u32) -> Result<u32, Error<E>> {
        let mut read = 0u32;
        for bit in (0..u32::from(self.word_bits)).rev() {
            let out = value.checked_shr(bit).unwrap_or(0) & 1 != 0;
            self.mosi.set_state(out.into()).map_err(Error::Pin)?;

            if !self.phase {
                self.sample(&mut read, bit)?;
            }

            self.sclk.set_state((!self.polarity).into()).map_err(Error::Pin)?;
            self.delay.delay_us(self.half_period_us);

            if self.phase {
                self.sample(&mut read, bit)?;
            }

            self.sclk.set_state(self.polarity.into()).map_err(Error::Pin)?;
            self.delay.delay_us(self.half_period_us);
        }
        Ok(read)
    }

    /// Fixed 8-bit burst, sample before the rising edge, no pacing.
    fn fast_transfer(&mut self, value: u8) -> Result<u8, Error<E>> {
        let mut read = 0u8;
        let mut mask = 0x80u8;
        while mask != 0 {
            self.mosi.set_state((value & mask != 0).into()).map_err(Error::Pin)?;
            if self.miso.is_high().map_err(Error::Pin)? {
                read |= mask;
            }
            self.sclk.set_high().map_err(Error::Pin)?;
            self.sclk.set_low().map_err(Error::Pin)?;
            mask >>= 1;
        }
        Ok(read)
    }
}

impl<P, DELAY, E> SoftSpi<P, P, P, DELAY>
where
    P: FlexPin<Error = E>,
    DELAY: DelayNs,
{
    /// Claims the three lines from `bank` by identifier.
    ///
    /// Fails with [`Error::ResourceUnavailable`] if any identifier is invalid
    /// or taken; lines claimed before the failure go back to the bank.
    pub fn from_bank<B>(
        bank: &mut B,
        mosi: B::Id,
        miso: B::Id,
        sclk: B::Id,
        delay: DELAY,
    ) -> Result<Self, Error<E>>
    where
        B: PinBank<Pin = P>,
    {
        let mosi = bank.claim(mosi).ok_or(Error::ResourceUnavailable)?;
        let miso = bank.claim(miso).ok_or(Error::ResourceUnavailable)?;
        let sclk = bank.claim(sclk).ok_or(Error::ResourceUnavailable)?;
        Self::new(mosi, miso, sclk, delay)
    }
}

impl<MOSI, MISO, SCLK, DELAY, E> ErrorType for SoftSpi<MOSI, MISO, SCLK, DELAY>
where
    MOSI: FlexPin<Error = E>,
    MISO: FlexPin<Error = E>,
    SCLK: FlexPin<Error = E>,
    DELAY: DelayNs,
    E: core::fmt::Debug,
{
    type Error = Error<E>;
}

/// One word per byte, using the configured format.
///
/// Each byte is clocked as a `word_bits` wide word: wider words shift out
/// leading zeros, narrower ones drop the high bits of the byte. Received words
/// are truncated to their low 8 bits.
impl<MOSI, MISO, SCLK, DELAY, E> SpiBus<u8> for SoftSpi<MOSI, MISO, SCLK, DELAY>
where
    MOSI: FlexPin<Error = E>,
    MISO: FlexPin<Error = E>,
    SCLK: FlexPin<Error = E>,
    DELAY: DelayNs,
    E: core::fmt::Debug,
{
    fn read(&mut self, words: &mut [u8]) -> Result<(), Self::Error> {
        self.check_byte_words();
        for word in words.iter_mut() {
            *word = self.transfer(0)? as u8;
        }
        Ok(())
    }

    fn write(&mut self, words: &[u8]) -> Result<(), Self::Error> {
        self.check_byte_words();
        for &word in words {
            self.transfer(u32::from(word))?;
        }
        Ok(())
    }

    fn transfer(&mut self, read: &mut [u8], write: &[u8]) -> Result<(), Self::Error> {
        self.check_byte_words();
        for i in 0..read.len().max(write.len()) {
            let out = write.get(i).copied().unwrap_or(0x00);
            let word = SoftSpi::transfer(self, u32::from(out))? as u8;
            if let Some(slot) = read.get_mut(i) {
                *slot = word;
            }
        }
        Ok(())
    }

    fn transfer_in_place(&mut self, words: &mut [u8]) -> Result<(), Self::Error> {
        self.check_byte_words();
        for word in words.iter_mut() {
            *word = SoftSpi::transfer(self, u32::from(*word))? as u8;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}
