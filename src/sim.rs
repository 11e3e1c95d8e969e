//! In-memory GPIO bank and delay for exercising the bus without hardware.
//!
//! Pins can be wired to each other (loopback) or driven externally, and every
//! level written to an output pin is logged with the simulated time at which
//! it happened. Time only moves when a [`SimDelay`] is asked to wait.
//!
//! Built for tests and with the `sim` feature.

use core::cell::RefCell;
use core::convert::Infallible;

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{ErrorType, InputPin, OutputPin};
use heapless::Vec;

use crate::drivers::flex_pin::{Direction, FlexPin, PinBank, Pull};

/// Number of pins in a [`SimGpio`]
pub const SIM_PINS: usize = 32;

/// Output writes kept in the trace before new ones are dropped
pub const TRACE_DEPTH: usize = 512;

/// Direction and pull of a pin as last configured
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinConfig {
    pub direction: Direction,
    pub pull: Pull,
}

/// A level written to a pin while it was an output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinEvent {
    pub pin: u8,
    pub level: bool,
    pub at_ns: u64,
}

#[derive(Clone, Copy)]
struct PinState {
    claimed: bool,
    config: PinConfig,
    latch: bool,
    external: Option<bool>,
    source: Option<u8>,
}

impl PinState {
    const RESET: Self = Self {
        claimed: false,
        config: PinConfig { direction: Direction::Input, pull: Pull::None },
        latch: false,
        external: None,
        source: None,
    };
}

/// Peripheral that presents the next bit of `pattern` on `miso` after every
/// level written to `sclk` while it is an output.
#[derive(Clone, Copy)]
struct ShiftOut {
    sclk: u8,
    miso: u8,
    pattern: u32,
    len: u8,
    edges: u8,
}

impl ShiftOut {
    fn level(&self) -> bool {
        if self.edges >= self.len {
            return false;
        }
        let bit = u32::from(self.len - 1 - self.edges);
        self.pattern.checked_shr(bit).unwrap_or(0) & 1 != 0
    }
}

struct GpioState {
    pins: [PinState; SIM_PINS],
    now_ns: u64,
    trace: Vec<PinEvent, TRACE_DEPTH>,
    shift_out: Option<ShiftOut>,
}

impl GpioState {
    /// Level present on the line itself.
    fn line_level(&self, id: u8) -> bool {
        let pin = &self.pins[id as usize];
        if pin.config.direction == Direction::Output {
            return pin.latch;
        }
        if let Some(slave) = self.shift_out.filter(|slave| slave.miso == id) {
            return slave.level();
        }
        match (pin.external, pin.config.pull) {
            (Some(level), _) => level,
            (None, Pull::Up) => true,
            (None, _) => false,
        }
    }

    /// Level seen when reading the pin.
    fn sample(&self, id: u8) -> bool {
        let pin = &self.pins[id as usize];
        match (pin.config.direction, pin.source) {
            (Direction::Output, _) => pin.latch,
            (Direction::Input, Some(source)) => self.line_level(source),
            (Direction::Input, None) => self.line_level(id),
        }
    }
}

/// Simulated GPIO bank. Claim pins through [`PinBank`] on `&SimGpio`.
pub struct SimGpio {
    state: RefCell<GpioState>,
}

impl Default for SimGpio {
    fn default() -> Self {
        Self::new()
    }
}

impl SimGpio {
    pub fn new() -> Self {
        Self {
            state: RefCell::new(GpioState {
                pins: [PinState::RESET; SIM_PINS],
                now_ns: 0,
                trace: Vec::new(),
                shift_out: None,
            }),
        }
    }

    fn valid(id: u8) -> bool {
        (id as usize) < SIM_PINS
    }

    /// Claims pin `id`, see [`PinBank::claim`].
    pub fn pin(&self, id: u8) -> Option<SimPin<'_>> {
        let mut bank = self;
        bank.claim(id)
    }

    /// Wires input `to` so that it reads whatever is on line `from`.
    pub fn connect(&self, to: u8, from: u8) {
        if Self::valid(to) && Self::valid(from) {
            self.state.borrow_mut().pins[to as usize].source = Some(from);
        }
    }

    /// Attaches a peripheral that puts `pattern` on line `miso`, MSB first,
    /// moving to the next of its `len` bits on every SCLK transition the
    /// master drives on line `sclk`. Past the end the line reads low.
    pub fn attach_shift_out(&self, sclk: u8, miso: u8, pattern: u32, len: u8) {
        if Self::valid(sclk) && Self::valid(miso) {
            self.state.borrow_mut().shift_out =
                Some(ShiftOut { sclk, miso, pattern, len: len.min(32), edges: 0 });
        }
    }

    pub fn detach_shift_out(&self) {
        self.state.borrow_mut().shift_out = None;
    }

    /// Drives line `id` from outside, `None` leaves it to the pull resistor.
    pub fn set_external(&self, id: u8, level: Option<bool>) {
        if Self::valid(id) {
            self.state.borrow_mut().pins[id as usize].external = level;
        }
    }

    pub fn config(&self, id: u8) -> PinConfig {
        self.state.borrow().pins[id as usize].config
    }

    /// Output latch of pin `id`, whatever its direction.
    pub fn latched(&self, id: u8) -> bool {
        self.state.borrow().pins[id as usize].latch
    }

    pub fn is_claimed(&self, id: u8) -> bool {
        Self::valid(id) && self.state.borrow().pins[id as usize].claimed
    }

    pub fn now_ns(&self) -> u64 {
        self.state.borrow().now_ns
    }

    /// Snapshot of the output trace
    pub fn events(&self) -> Vec<PinEvent, TRACE_DEPTH> {
        self.state.borrow().trace.clone()
    }

    /// Output events of one pin, oldest first.
    pub fn events_for(&self, id: u8) -> Vec<PinEvent, TRACE_DEPTH> {
        self.state.borrow().trace.iter().filter(|e| e.pin == id).copied().collect()
    }

    pub fn clear_trace(&self) {
        self.state.borrow_mut().trace.clear();
    }

    /// Delay provider advancing this bank's clock.
    pub fn delay(&self) -> SimDelay<'_> {
        SimDelay { gpio: self }
    }
}

impl<'a> PinBank for &'a SimGpio {
    type Id = u8;
    type Pin = SimPin<'a>;

    fn claim(&mut self, id: u8) -> Option<SimPin<'a>> {
        if !SimGpio::valid(id) {
            return None;
        }
        let mut state = self.state.borrow_mut();
        let pin = &mut state.pins[id as usize];
        if pin.claimed {
            return None;
        }
        pin.claimed = true;
        Some(SimPin { gpio: *self, id })
    }
}

/// A claimed simulated pin. Returned to the bank on drop.
pub struct SimPin<'a> {
    gpio: &'a SimGpio,
    id: u8,
}

impl SimPin<'_> {
    pub fn id(&self) -> u8 {
        self.id
    }

    fn write(&mut self, level: bool) {
        let mut state = self.gpio.state.borrow_mut();
        let at_ns = state.now_ns;
        let pin = &mut state.pins[self.id as usize];
        pin.latch = level;
        if pin.config.direction == Direction::Output {
            // A full trace drops further events.
            let _ = state.trace.push(PinEvent { pin: self.id, level, at_ns });
            if let Some(slave) = state.shift_out.as_mut().filter(|slave| slave.sclk == self.id) {
                slave.edges = slave.edges.saturating_add(1);
            }
        }
    }
}

impl Drop for SimPin<'_> {
    fn drop(&mut self) {
        self.gpio.state.borrow_mut().pins[self.id as usize].claimed = false;
    }
}

impl ErrorType for SimPin<'_> {
    type Error = Infallible;
}

impl InputPin for SimPin<'_> {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        Ok(self.gpio.state.borrow().sample(self.id))
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        Ok(!self.gpio.state.borrow().sample(self.id))
    }
}

impl OutputPin for SimPin<'_> {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.write(false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.write(true);
        Ok(())
    }
}

impl FlexPin for SimPin<'_> {
    fn set_direction(&mut self, direction: Direction) -> Result<(), Self::Error> {
        self.gpio.state.borrow_mut().pins[self.id as usize].config.direction = direction;
        Ok(())
    }

    fn set_pull(&mut self, pull: Pull) -> Result<(), Self::Error> {
        self.gpio.state.borrow_mut().pins[self.id as usize].config.pull = pull;
        Ok(())
    }
}

/// Delay that advances the simulated clock of a [`SimGpio`] instead of waiting.
pub struct SimDelay<'a> {
    gpio: &'a SimGpio,
}

impl DelayNs for SimDelay<'_> {
    fn delay_ns(&mut self, ns: u32) {
        self.gpio.state.borrow_mut().now_ns += u64::from(ns);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claim_is_exclusive() {
        let gpio = SimGpio::new();
        let pin = gpio.pin(3);
        assert!(pin.is_some());
        assert!(gpio.pin(3).is_none());
        drop(pin);
        assert!(!gpio.is_claimed(3));
        assert!(gpio.pin(3).is_some());
    }

    #[test]
    fn test_invalid_id() {
        let gpio = SimGpio::new();
        assert!(gpio.pin(SIM_PINS as u8).is_none());
    }

    #[test]
    fn test_latch_only_reaches_line_as_output() {
        let gpio = SimGpio::new();
        let mut out = gpio.pin(0).unwrap();
        let mut inp = gpio.pin(1).unwrap();
        gpio.connect(1, 0);

        out.set_high().unwrap();
        assert!(gpio.latched(0));
        assert!(!inp.is_high().unwrap());
        assert!(gpio.events().is_empty());

        out.drive().unwrap();
        assert!(inp.is_high().unwrap());
        out.set_low().unwrap();
        assert!(inp.is_low().unwrap());
        assert_eq!(gpio.events_for(0).len(), 1);
    }

    #[test]
    fn test_pull_and_external_levels() {
        let gpio = SimGpio::new();
        let mut pin = gpio.pin(5).unwrap();
        assert!(pin.is_low().unwrap());
        pin.set_pull(Pull::Up).unwrap();
        assert!(pin.is_high().unwrap());
        gpio.set_external(5, Some(false));
        assert!(pin.is_low().unwrap());
    }

    #[test]
    fn test_shift_out_advances_on_clock_writes() {
        let gpio = SimGpio::new();
        let mut sclk = gpio.pin(2).unwrap();
        let mut miso = gpio.pin(1).unwrap();
        gpio.attach_shift_out(2, 1, 0b101, 3);

        // Latch writes while SCLK is an input do not count.
        sclk.set_high().unwrap();
        assert!(miso.is_high().unwrap());

        sclk.drive().unwrap();
        sclk.set_low().unwrap();
        assert!(miso.is_low().unwrap());
        sclk.set_high().unwrap();
        assert!(miso.is_high().unwrap());
        sclk.set_low().unwrap();
        assert!(miso.is_low().unwrap());

        gpio.detach_shift_out();
        gpio.set_external(1, Some(true));
        assert!(miso.is_high().unwrap());
    }

    #[test]
    fn test_delay_advances_clock() {
        let gpio = SimGpio::new();
        let mut delay = gpio.delay();
        delay.delay_us(3);
        delay.delay_ns(250);
        assert_eq!(gpio.now_ns(), 3_250);
    }
}
