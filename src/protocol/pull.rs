//! # PULL_DATA / PULL_RESP Handling
//!
//! The downstream half of the protocol: the PULL_DATA heartbeat that keeps
//! the server's NAT pinhole open, the PULL_ACK that answers it, and the
//! PULL_RESP carrying a `txpk` TX request.

use serde::Deserialize;

use crate::constants::{
    MIN_FSK_PREAMBLE, MIN_LORA_PREAMBLE, PKT_PULL_ACK, PKT_PULL_DATA, PKT_PULL_RESP,
    STD_FSK_PREAMBLE, STD_LORA_PREAMBLE,
};
use crate::error::FwdError;
use crate::hal::modulation::parse_lora_datr;
use crate::hal::{Bandwidth, CodingRate, DataRate, Modulation, TxMode, TxPacket};
use crate::protocol::{parse_downlink_header, put_header};

/// A PULL_DATA heartbeat datagram.
pub struct PullData {
    pub token: u16,
    pub gateway_eui: u64,
}

impl PullData {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(12);
        put_header(&mut buf, self.token, PKT_PULL_DATA, self.gateway_eui);
        buf
    }
}

/// A PULL_ACK datagram from the server.
pub struct PullAck {
    pub token: u16,
}

impl PullAck {
    pub fn from_bytes(buf: &[u8]) -> Result<Self, FwdError> {
        let (token, _) = parse_downlink_header(buf, PKT_PULL_ACK)?;
        Ok(PullAck { token })
    }
}

/// Raw `txpk` object of a PULL_RESP, as deserialized off the wire.
///
/// Validation beyond JSON well-formedness (scheduling mode, frequency
/// plan, power plan) happens in the downstream pipeline where the gateway
/// configuration is at hand.
#[derive(Debug, Clone, Deserialize)]
pub struct TxPk {
    /// Send immediately, ignoring any timestamp
    #[serde(default)]
    pub imme: bool,
    /// Target concentrator counter, us
    pub tmst: Option<u32>,
    /// Target GPS time, ms since the GPS epoch
    pub tmms: Option<u64>,
    /// TX center frequency, MHz
    pub freq: f64,
    /// RF chain to transmit on
    pub rfch: u8,
    /// Requested output power, dBm
    pub powe: Option<i8>,
    /// "LORA" or "FSK"
    pub modu: String,
    /// Datarate: `SF..BW..` string for LoRa, bps number for FSK
    pub datr: serde_json::Value,
    /// LoRa coding rate identifier
    pub codr: Option<String>,
    /// FSK frequency deviation, Hz
    pub fdev: Option<u32>,
    /// LoRa polarity inversion
    pub ipol: Option<bool>,
    /// Preamble length
    pub prea: Option<u16>,
    /// Disable the physical-layer CRC
    #[serde(default)]
    pub ncrc: bool,
    /// Implicit header mode
    #[serde(default)]
    pub nhdr: bool,
    /// Payload size in bytes
    pub size: u16,
    /// Base64-encoded payload
    pub data: String,
}

/// Scheduling mode requested by a `txpk`, mapped from which of
/// `imme`/`tmst`/`tmms` is present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxTiming {
    /// Class C: send as soon as possible
    Immediate,
    /// Class A: counter-targeted
    OnCounter(u32),
    /// Class B: GPS-time-targeted, ms since GPS epoch
    OnGpsTime(u64),
}

impl TxPk {
    /// Resolves the scheduling mode. Exactly one of the three selectors is
    /// honored, in the order the reference forwarder checks them.
    pub fn timing(&self) -> Result<TxTiming, FwdError> {
        if self.imme {
            return Ok(TxTiming::Immediate);
        }
        if let Some(tmst) = self.tmst {
            return Ok(TxTiming::OnCounter(tmst));
        }
        if let Some(tmms) = self.tmms {
            return Ok(TxTiming::OnGpsTime(tmms));
        }
        Err(FwdError::TxRequest(
            "no scheduling selector (imme/tmst/tmms)".into(),
        ))
    }

    /// Converts the request into a HAL TX packet. Modulation parameters are
    /// checked here; frequency and power plans are the caller's concern.
    pub fn to_tx_packet(&self) -> Result<TxPacket, FwdError> {
        let payload = base64::decode(&self.data)
            .map_err(|e| FwdError::TxRequest(format!("bad base64 payload: {e}")))?;
        if payload.len() != self.size as usize {
            log::warn!(
                "txpk size field ({}) does not match payload ({} bytes), using payload",
                self.size,
                payload.len()
            );
        }

        let (modulation, bandwidth, datarate, coderate, preamble, fdev_khz, invert_pol) =
            match self.modu.as_str() {
                "LORA" => {
                    let datr_str = self.datr.as_str().ok_or_else(|| {
                        FwdError::TxRequest("LoRa datr must be a string".into())
                    })?;
                    let (sf, bw) = parse_lora_datr(datr_str)
                        .map_err(|e| FwdError::TxRequest(e.to_string()))?;
                    let codr = self
                        .codr
                        .as_deref()
                        .ok_or_else(|| FwdError::TxRequest("missing codr".into()))?
                        .parse::<CodingRate>()
                        .map_err(|e| FwdError::TxRequest(e.to_string()))?;
                    let preamble = match self.prea {
                        Some(p) if p >= MIN_LORA_PREAMBLE => p,
                        Some(_) => MIN_LORA_PREAMBLE,
                        None => STD_LORA_PREAMBLE,
                    };
                    (
                        Modulation::LoRa,
                        bw,
                        DataRate::Lora(sf),
                        codr,
                        preamble,
                        0u8,
                        self.ipol.unwrap_or(true),
                    )
                }
                "FSK" => {
                    let bps = self.datr.as_u64().ok_or_else(|| {
                        FwdError::TxRequest("FSK datr must be a number".into())
                    })? as u32;
                    let fdev = self
                        .fdev
                        .ok_or_else(|| FwdError::TxRequest("missing fdev".into()))?;
                    let preamble = match self.prea {
                        Some(p) if p >= MIN_FSK_PREAMBLE => p,
                        Some(_) => MIN_FSK_PREAMBLE,
                        None => STD_FSK_PREAMBLE,
                    };
                    (
                        Modulation::Fsk,
                        Bandwidth::BW125,
                        DataRate::Fsk { bps },
                        CodingRate::Off,
                        preamble,
                        (fdev / 1000) as u8,
                        false,
                    )
                }
                other => {
                    return Err(FwdError::TxRequest(format!("unknown modulation {other:?}")))
                }
            };

        let tx_mode = match self.timing()? {
            TxTiming::Immediate => TxMode::Immediate,
            TxTiming::OnCounter(_) => TxMode::Timestamped,
            TxTiming::OnGpsTime(_) => TxMode::OnGps,
        };

        Ok(TxPacket {
            tx_mode,
            count_us: self.tmst.unwrap_or(0),
            rf_chain: self.rfch,
            freq_hz: (self.freq * 1e6).round() as u32,
            rf_power: self.powe.unwrap_or(14),
            modulation,
            bandwidth,
            datarate,
            coderate,
            invert_pol,
            fdev_khz,
            preamble,
            no_crc: self.ncrc,
            no_header: self.nhdr,
            payload,
        })
    }
}

/// Body of a PULL_RESP datagram.
#[derive(Debug, Deserialize)]
pub struct PullRespPayload {
    pub txpk: TxPk,
}

/// A PULL_RESP datagram from the server.
pub struct PullResp {
    pub token: u16,
    pub txpk: TxPk,
}

impl PullResp {
    pub fn from_bytes(buf: &[u8]) -> Result<Self, FwdError> {
        let (token, body) = parse_downlink_header(buf, PKT_PULL_RESP)?;
        let payload: PullRespPayload = serde_json::from_slice(body)?;
        Ok(PullResp {
            token,
            txpk: payload.txpk,
        })
    }
}
