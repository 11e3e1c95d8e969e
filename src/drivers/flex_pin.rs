//! Bidirectional GPIO contract the bit-banged bus is built on.
//!
//! Every bus line can be switched between input and output at runtime and
//! carries its own pull configuration, so the master can let the lines float
//! between transfers.

use embedded_hal::digital::{InputPin, OutputPin};

/// Pin direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Direction {
    Input,
    Output,
}

/// Pull resistor configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Pull {
    #[default]
    None,
    Up,
    Down,
}

/// A pin that can be read, written and re-purposed between input and output.
///
/// Writing while the pin is an input only updates the output latch; the
/// level appears on the line once the pin is switched to output.
pub trait FlexPin: InputPin + OutputPin {
    fn set_direction(&mut self, direction: Direction) -> Result<(), Self::Error>;

    fn set_pull(&mut self, pull: Pull) -> Result<(), Self::Error>;

    /// High-impedance input without pull resistor.
    fn float(&mut self) -> Result<(), Self::Error> {
        self.set_direction(Direction::Input)?;
        self.set_pull(Pull::None)
    }

    /// Push-pull output without pull resistor.
    fn drive(&mut self) -> Result<(), Self::Error> {
        self.set_direction(Direction::Output)?;
        self.set_pull(Pull::None)
    }
}

/// Source of pins addressed by identifier.
///
/// Follows the acquire/release pattern: a pin can be held by one owner at a
/// time and returns to the bank when dropped.
pub trait PinBank {
    type Id: Copy;
    type Pin: FlexPin;

    /// Claims a pin. `None` if the identifier is invalid or already claimed.
    fn claim(&mut self, id: Self::Id) -> Option<Self::Pin>;
}
