// MIT License - Copyright (c) 2026 Peter Wright
// Panel model tables

use std::fmt;
use std::str::FromStr;

use crate::error::GatewayError;

/// Frame codes a panel family uses for each message type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameCodes {
    pub login: u8,
    pub login_ack: u8,
    pub status_request: u8,
    pub status_response: u8,
    pub command: u8,
    pub command_ack: u8,
    pub nack: u8,
    pub live_event: u8,
}

/// Static description of one panel model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelLayout {
    pub name: &'static str,
    pub zones: u32,
    pub partitions: u32,
    pub outputs: u32,
    /// Serial baud rate the panel ships with.
    pub baud: u32,
    pub codes: FrameCodes,
}

impl ModelLayout {
    /// Bytes in one zone bitmap.
    pub fn zone_bitmap_len(&self) -> usize {
        bitmap_len(self.zones)
    }

    /// Bytes in one output bitmap.
    pub fn output_bitmap_len(&self) -> usize {
        bitmap_len(self.outputs)
    }
}

fn bitmap_len(count: u32) -> usize {
    (count as usize).div_ceil(8)
}

const SP_MG_CODES: FrameCodes = FrameCodes {
    login: 0x5F,
    login_ack: 0x10,
    status_request: 0x50,
    status_response: 0x52,
    command: 0x40,
    command_ack: 0x42,
    nack: 0x70,
    live_event: 0xE0,
};

const EVO_CODES: FrameCodes = FrameCodes {
    login: 0x5F,
    login_ack: 0x10,
    status_request: 0x54,
    status_response: 0x56,
    command: 0x40,
    command_ack: 0x42,
    nack: 0x70,
    live_event: 0xE2,
};

static SPECTRA: ModelLayout = ModelLayout {
    name: "spectra",
    zones: 32,
    partitions: 2,
    outputs: 16,
    baud: 9600,
    codes: SP_MG_CODES,
};

static MAGELLAN: ModelLayout = ModelLayout {
    name: "magellan",
    zones: 32,
    partitions: 2,
    outputs: 4,
    baud: 9600,
    codes: SP_MG_CODES,
};

static EVO192: ModelLayout = ModelLayout {
    name: "evo192",
    zones: 192,
    partitions: 8,
    outputs: 16,
    baud: 38400,
    codes: EVO_CODES,
};

/// Supported panel families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PanelModel {
    /// SP6000 / SP7000
    #[default]
    Spectra,
    /// MG5050
    Magellan,
    Evo192,
}

impl PanelModel {
    pub fn layout(&self) -> &'static ModelLayout {
        match self {
            PanelModel::Spectra => &SPECTRA,
            PanelModel::Magellan => &MAGELLAN,
            PanelModel::Evo192 => &EVO192,
        }
    }

    pub fn as_str(&self) -> &'static str {
        self.layout().name
    }
}

impl fmt::Display for PanelModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PanelModel {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "spectra" | "sp" | "sp6000" | "sp7000" => Ok(PanelModel::Spectra),
            "magellan" | "mg" | "mg5050" => Ok(PanelModel::Magellan),
            "evo192" | "evo" => Ok(PanelModel::Evo192),
            other => Err(GatewayError::config(format!("unknown panel model '{}'", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bitmap_lengths() {
        let evo = PanelModel::Evo192.layout();
        assert_eq!(evo.zone_bitmap_len(), 24);
        assert_eq!(evo.output_bitmap_len(), 2);
        assert_eq!(PanelModel::Magellan.layout().output_bitmap_len(), 1);
    }

    #[test]
    fn test_model_from_str() {
        assert_eq!("EVO192".parse::<PanelModel>().unwrap(), PanelModel::Evo192);
        assert_eq!("mg5050".parse::<PanelModel>().unwrap(), PanelModel::Magellan);
        assert!(matches!(
            "vista".parse::<PanelModel>(),
            Err(GatewayError::Config { .. })
        ));
    }

    #[test]
    fn test_codes_are_distinct_per_model() {
        for model in [PanelModel::Spectra, PanelModel::Magellan, PanelModel::Evo192] {
            let c = model.layout().codes;
            let all = [
                c.login, c.login_ack, c.status_request, c.status_response,
                c.command, c.command_ack, c.nack, c.live_event,
            ];
            for (i, a) in all.iter().enumerate() {
                for b in &all[i + 1..] {
                    assert_ne!(a, b, "{} reuses code 0x{:02X}", model, a);
                }
            }
        }
    }
}
