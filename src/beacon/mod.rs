//! # Class-B Beacon Construction
//!
//! Builds the periodic LoRaWAN beacon: a fixed little-endian layout
//! carrying the GPS time of the slot and the gateway coordinates, each part
//! protected by a CRC-16. Beacon slots sit on exact multiples of the beacon
//! period in GPS time, and the carrier rotates over a configurable set of
//! channels derived from the slot time.
//!
//! ```text
//! [ RFU1 | time u32 | crc16 | infodesc u8 | lat i24 | lon i24 | RFU2 | crc16 ]
//! ```

use std::time::Duration;

use crate::error::FwdError;
use crate::hal::{
    Bandwidth, CodingRate, DataRate, Modulation, SpreadingFactor, TxMode, TxPacket,
};

/// Beacon plan taken from the gateway configuration.
#[derive(Debug, Clone)]
pub struct BeaconPlan {
    /// Beacon period, s (0 disables beaconing)
    pub period_s: u32,
    /// First beacon channel, Hz
    pub freq_hz: u32,
    /// Number of beacon channels
    pub freq_nb: u8,
    /// Spacing between beacon channels, Hz
    pub freq_step_hz: u32,
    /// Spreading factor (8, 9, 10 or 12)
    pub datarate: u8,
    /// Bandwidth, Hz
    pub bw_hz: u32,
    /// TX power, dBm
    pub power: i8,
    /// Information descriptor byte
    pub infodesc: u8,
}

/// CRC-16/XMODEM: polynomial 0x1021, init 0x0000, no reflection, no xorout.
pub fn crc16(data: &[u8]) -> u16 {
    let mut crc: u16 = 0x0000;
    for &byte in data {
        crc ^= (byte as u16) << 8;
        for _ in 0..8 {
            if crc & 0x8000 != 0 {
                crc = (crc << 1) ^ 0x1021;
            } else {
                crc <<= 1;
            }
        }
    }
    crc
}

/// Reserved-field sizes (RFU1, RFU2) for the supported spreading factors.
fn rfu_sizes(datarate: u8) -> Result<(usize, usize), FwdError> {
    match datarate {
        8 => Ok((1, 3)),
        9 => Ok((2, 0)),
        10 => Ok((3, 1)),
        12 => Ok((5, 3)),
        _ => Err(FwdError::Config(format!(
            "unsupported beacon datarate SF{datarate}"
        ))),
    }
}

/// Scales a coordinate onto a signed 24-bit fraction of its full range.
fn coord_i24(degrees: f64, range: f64) -> i32 {
    let scaled = (degrees / range * (1 << 23) as f64).round() as i64;
    scaled.clamp(-(1 << 23), (1 << 23) - 1) as i32
}

/// Builds the beacon payload for the slot at `gps_seconds`.
pub fn beacon_payload(
    plan: &BeaconPlan,
    gps_seconds: u64,
    lat: f64,
    lon: f64,
) -> Result<Vec<u8>, FwdError> {
    let (rfu1, rfu2) = rfu_sizes(plan.datarate)?;
    let mut pyld = Vec::with_capacity(rfu1 + rfu2 + 15);

    // Network common part: RFU1 | time | crc
    pyld.resize(rfu1, 0u8);
    pyld.extend_from_slice(&(gps_seconds as u32).to_le_bytes());
    let crc1 = crc16(&pyld);
    pyld.extend_from_slice(&crc1.to_le_bytes());

    // Gateway specific part: infodesc | lat | lon | RFU2 | crc
    let gw_start = pyld.len();
    pyld.push(plan.infodesc);
    pyld.extend_from_slice(&coord_i24(lat, 90.0).to_le_bytes()[..3]);
    pyld.extend_from_slice(&coord_i24(lon, 180.0).to_le_bytes()[..3]);
    pyld.resize(pyld.len() + rfu2, 0u8);
    let crc2 = crc16(&pyld[gw_start..]);
    pyld.extend_from_slice(&crc2.to_le_bytes());

    Ok(pyld)
}

/// GPS time of the next beacon slot strictly after `now_gps`.
pub fn next_slot(now_gps: Duration, period_s: u32) -> u64 {
    let period = period_s as u64;
    (now_gps.as_secs() / period + 1) * period
}

/// Channel index of the slot at `gps_seconds`.
pub fn channel(plan: &BeaconPlan, gps_seconds: u64) -> u8 {
    if plan.freq_nb <= 1 {
        return 0;
    }
    ((gps_seconds / plan.period_s as u64) % plan.freq_nb as u64) as u8
}

/// Carrier frequency of the slot at `gps_seconds`.
pub fn frequency_hz(plan: &BeaconPlan, gps_seconds: u64) -> u32 {
    plan.freq_hz + channel(plan, gps_seconds) as u32 * plan.freq_step_hz
}

/// Builds the complete TX packet for the slot at `gps_seconds`. The target
/// counter is filled in by the caller once the slot time has been run
/// through the GPS time reference.
pub fn build_tx_packet(
    plan: &BeaconPlan,
    gps_seconds: u64,
    lat: f64,
    lon: f64,
    rf_chain: u8,
) -> Result<TxPacket, FwdError> {
    let payload = beacon_payload(plan, gps_seconds, lat, lon)?;
    Ok(TxPacket {
        tx_mode: TxMode::OnGps,
        count_us: 0,
        rf_chain,
        freq_hz: frequency_hz(plan, gps_seconds),
        rf_power: plan.power,
        modulation: Modulation::LoRa,
        bandwidth: Bandwidth::from_hz(plan.bw_hz)?,
        datarate: DataRate::Lora(SpreadingFactor::from_u8(plan.datarate)?),
        coderate: CodingRate::Cr4_5,
        // Beacons are uplink-polarity broadcasts with implicit header,
        // no physical CRC and a 10-symbol preamble
        invert_pol: false,
        fdev_khz: 0,
        preamble: 10,
        no_crc: true,
        no_header: true,
        payload,
    })
}
