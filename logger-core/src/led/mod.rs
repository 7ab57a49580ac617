//! LED status presenter.
//!
//! [`present`] is a pure function from [`DeviceStatus`] to a color; the only
//! time-varying input is a free-running [`BlinkTimer`] the caller advances
//! once per loop iteration. Selection precedence: explicit override, then an
//! active deferred-action countdown (urgent blink), then the attached
//! breathing pattern, then the detached steady color.

use crate::status::{AttachState, DeviceStatus};

/// Colors expressible on a tri-color (3-bit RGB) status LED.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum LedColor {
    Off,
    Blue,
    Green,
    Cyan,
    Red,
    Magenta,
    Yellow,
    White,
}

impl LedColor {
    /// Packs the color as `0b0000_0rgb`.
    #[must_use]
    pub const fn bits(self) -> u8 {
        match self {
            LedColor::Off => 0b000,
            LedColor::Blue => 0b001,
            LedColor::Green => 0b010,
            LedColor::Cyan => 0b011,
            LedColor::Red => 0b100,
            LedColor::Magenta => 0b101,
            LedColor::Yellow => 0b110,
            LedColor::White => 0b111,
        }
    }

    /// Red channel of the packed color.
    #[must_use]
    pub const fn red(self) -> bool {
        self.bits() & 0b100 != 0
    }

    /// Green channel of the packed color.
    #[must_use]
    pub const fn green(self) -> bool {
        self.bits() & 0b010 != 0
    }

    /// Blue channel of the packed color.
    #[must_use]
    pub const fn blue(self) -> bool {
        self.bits() & 0b001 != 0
    }

    /// Parses a color keyword, case-insensitively.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        const NAMES: [(&str, LedColor); 8] = [
            ("off", LedColor::Off),
            ("blue", LedColor::Blue),
            ("green", LedColor::Green),
            ("cyan", LedColor::Cyan),
            ("red", LedColor::Red),
            ("magenta", LedColor::Magenta),
            ("yellow", LedColor::Yellow),
            ("white", LedColor::White),
        ];
        NAMES
            .iter()
            .find(|(candidate, _)| name.eq_ignore_ascii_case(candidate))
            .map(|(_, color)| *color)
    }

    /// Lowercase keyword for the color.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            LedColor::Off => "off",
            LedColor::Blue => "blue",
            LedColor::Green => "green",
            LedColor::Cyan => "cyan",
            LedColor::Red => "red",
            LedColor::Magenta => "magenta",
            LedColor::Yellow => "yellow",
            LedColor::White => "white",
        }
    }
}

/// Free-running counter driving the blink and breathing patterns.
#[derive(Clone, Debug, Default)]
pub struct BlinkTimer {
    counter: u16,
    polarity: bool,
}

impl BlinkTimer {
    /// Creates a timer at phase zero.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            counter: 0,
            polarity: false,
        }
    }

    /// Advances one loop iteration; polarity flips each counter wrap.
    pub fn advance(&mut self) {
        self.counter = self.counter.wrapping_add(1);
        if self.counter == 0 {
            self.polarity = !self.polarity;
        }
    }

    /// Breathing ramp between two colors.
    ///
    /// Compares the counter's low byte against its running high byte, so the
    /// duty cycle of `active` sweeps from 0 to full over one counter period;
    /// the polarity flip reverses the sweep on alternate periods.
    #[must_use]
    pub fn ramp(&self, rest: LedColor, active: LedColor) -> LedColor {
        let position = self.counter as u8;
        let duty = (self.counter >> 8) as u8;
        let (first, second) = if self.polarity {
            (active, rest)
        } else {
            (rest, active)
        };
        if position < duty { second } else { first }
    }

    /// Hard two-phase blink between two colors.
    #[must_use]
    pub const fn square(&self, first: LedColor, second: LedColor) -> LedColor {
        if self.polarity { second } else { first }
    }
}

/// Selects the LED color for the current device state.
#[must_use]
pub fn present(status: &DeviceStatus, blink: &BlinkTimer) -> LedColor {
    if let Some(color) = status.led_override {
        return color;
    }

    if status.attach == AttachState::Attached {
        if status.action_countdown > 0 {
            return blink.square(LedColor::Red, LedColor::Off);
        }

        let active = if status.battery_full {
            LedColor::White
        } else {
            LedColor::Yellow
        };
        let rest = if status.inactivity == 0 {
            LedColor::Off
        } else {
            LedColor::Red
        };
        return blink.ramp(rest, active);
    }

    if status.battery_full {
        LedColor::Green
    } else {
        LedColor::Yellow
    }
}
