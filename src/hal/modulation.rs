//! # Modulation Parameters
//!
//! Modulation enums shared by the RX and TX paths of the concentrator HAL.
//! LoRa spreading factors and bandwidths carry their register discriminants;
//! the string forms used on the wire (`SF7BW125`, `4/5`) live next to the
//! enums so the protocol layer never hand-rolls them.

use std::fmt;
use std::str::FromStr;

use crate::error::FwdError;

/// Modulation of a radio frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Modulation {
    LoRa,
    Fsk,
}

impl fmt::Display for Modulation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Modulation::LoRa => write!(f, "LORA"),
            Modulation::Fsk => write!(f, "FSK"),
        }
    }
}

/// Spreading Factor for LoRa
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SpreadingFactor {
    SF5 = 5,
    SF6 = 6,
    SF7 = 7,
    SF8 = 8,
    SF9 = 9,
    SF10 = 10,
    SF11 = 11,
    SF12 = 12,
}

impl SpreadingFactor {
    pub fn as_u8(&self) -> u8 {
        *self as u8
    }

    pub fn from_u8(sf: u8) -> Result<Self, FwdError> {
        match sf {
            5 => Ok(SpreadingFactor::SF5),
            6 => Ok(SpreadingFactor::SF6),
            7 => Ok(SpreadingFactor::SF7),
            8 => Ok(SpreadingFactor::SF8),
            9 => Ok(SpreadingFactor::SF9),
            10 => Ok(SpreadingFactor::SF10),
            11 => Ok(SpreadingFactor::SF11),
            12 => Ok(SpreadingFactor::SF12),
            _ => Err(FwdError::Other(format!("unsupported SF{sf}"))),
        }
    }
}

/// Bandwidth of a LoRa channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bandwidth {
    BW125,
    BW250,
    BW500,
}

impl Bandwidth {
    /// Bandwidth in Hz
    pub fn hz(&self) -> u32 {
        match self {
            Bandwidth::BW125 => 125_000,
            Bandwidth::BW250 => 250_000,
            Bandwidth::BW500 => 500_000,
        }
    }

    /// Bandwidth in kHz, the unit the wire format uses
    pub fn khz(&self) -> u32 {
        self.hz() / 1000
    }

    pub fn from_khz(khz: u32) -> Result<Self, FwdError> {
        match khz {
            125 => Ok(Bandwidth::BW125),
            250 => Ok(Bandwidth::BW250),
            500 => Ok(Bandwidth::BW500),
            _ => Err(FwdError::Other(format!("unsupported bandwidth {khz} kHz"))),
        }
    }

    pub fn from_hz(hz: u32) -> Result<Self, FwdError> {
        Self::from_khz(hz / 1000)
    }
}

/// Data rate: a spreading factor for LoRa, a bitrate for FSK
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataRate {
    Lora(SpreadingFactor),
    Fsk { bps: u32 },
}

/// Coding Rate for LoRa forward error correction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodingRate {
    Cr4_5,
    Cr4_6,
    Cr4_7,
    Cr4_8,
    /// Implicit-header frames with no ECC reported
    Off,
}

impl CodingRate {
    /// Numerator of the coding-rate denominator increment, as used by the
    /// time-on-air symbol formula (4/5 -> 1, ... 4/8 -> 4).
    pub fn increment(&self) -> u32 {
        match self {
            CodingRate::Cr4_5 => 1,
            CodingRate::Cr4_6 => 2,
            CodingRate::Cr4_7 => 3,
            CodingRate::Cr4_8 => 4,
            CodingRate::Off => 0,
        }
    }
}

impl fmt::Display for CodingRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodingRate::Cr4_5 => write!(f, "4/5"),
            CodingRate::Cr4_6 => write!(f, "4/6"),
            CodingRate::Cr4_7 => write!(f, "4/7"),
            CodingRate::Cr4_8 => write!(f, "4/8"),
            CodingRate::Off => write!(f, "OFF"),
        }
    }
}

impl FromStr for CodingRate {
    type Err = FwdError;

    /// Parses the wire form of a coding rate. The `2/3` and `1/2` aliases
    /// seen from some network servers map onto 4/6 and 4/8.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "4/5" => Ok(CodingRate::Cr4_5),
            "4/6" | "2/3" => Ok(CodingRate::Cr4_6),
            "4/7" => Ok(CodingRate::Cr4_7),
            "4/8" | "1/2" => Ok(CodingRate::Cr4_8),
            "OFF" => Ok(CodingRate::Off),
            _ => Err(FwdError::Other(format!("unsupported coding rate {s:?}"))),
        }
    }
}

/// A LoRa datarate identifier in its wire form, e.g. `SF9BW125`.
pub fn format_lora_datr(sf: SpreadingFactor, bw: Bandwidth) -> String {
    format!("SF{}BW{}", sf.as_u8(), bw.khz())
}

/// Parses a LoRa datarate identifier of the form `SF{5..12}BW{125|250|500}`.
pub fn parse_lora_datr(s: &str) -> Result<(SpreadingFactor, Bandwidth), FwdError> {
    let rest = s
        .strip_prefix("SF")
        .ok_or_else(|| FwdError::Other(format!("invalid datr {s:?}")))?;
    let bw_pos = rest
        .find("BW")
        .ok_or_else(|| FwdError::Other(format!("invalid datr {s:?}")))?;
    let sf: u8 = rest[..bw_pos]
        .parse()
        .map_err(|_| FwdError::Other(format!("invalid datr {s:?}")))?;
    let khz: u32 = rest[bw_pos + 2..]
        .parse()
        .map_err(|_| FwdError::Other(format!("invalid datr {s:?}")))?;
    Ok((SpreadingFactor::from_u8(sf)?, Bandwidth::from_khz(khz)?))
}
