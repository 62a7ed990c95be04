// MIT License - Copyright (c) 2026 Peter Wright
// Output (PGM / siren) status

use std::fmt;

/// State of an addressable output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum OutputStatus {
    #[default]
    Off,
    On,
    /// Activated in pulse mode; reverts on its own.
    Pulsed,
}

impl OutputStatus {
    /// Decode from the on/pulsed bitmap pair. Pulsed wins over on.
    pub fn from_bits(on: bool, pulsed: bool) -> Self {
        if pulsed {
            Self::Pulsed
        } else if on {
            Self::On
        } else {
            Self::Off
        }
    }

    /// Decode the state byte of a live event (0 = off, 1 = on, 2 = pulsed).
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(Self::Off),
            1 => Some(Self::On),
            2 => Some(Self::Pulsed),
            _ => None,
        }
    }

    pub fn as_byte(&self) -> u8 {
        match self {
            Self::Off => 0,
            Self::On => 1,
            Self::Pulsed => 2,
        }
    }

    pub fn is_active(&self) -> bool {
        !matches!(self, Self::Off)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::On => "on",
            Self::Pulsed => "pulsed",
        }
    }
}

impl fmt::Display for OutputStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
