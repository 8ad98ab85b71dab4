//! # PUSH_DATA Construction
//!
//! Serializes received frames and the periodic status report into the
//! `{"rxpk":[...], "stat":{...}}` body of a PUSH_DATA datagram.

use serde::Serialize;

use crate::constants::PKT_PUSH_DATA;
use crate::error::FwdError;
use crate::hal::{DataRate, RxPacket};
use crate::protocol::put_header;
use crate::protocol::stat::StatReport;
use crate::time::TimeRef;

/// LoRa datarates travel as `SF..BW..` strings, FSK datarates as numbers.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum DatrField {
    Lora(String),
    Fsk(u32),
}

/// One received frame in its wire form.
///
/// Field order matches the published protocol tables so the emitted JSON
/// reads the same as the reference forwarder's.
#[derive(Debug, Clone, Serialize)]
pub struct RxPk {
    /// Version of the rxpk frame format
    pub jver: u8,
    /// Counter capture at the RX-finished event, us
    pub tmst: u32,
    /// UTC time, ISO 8601 with 6-digit fraction, when GPS-locked
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    /// Milliseconds since the GPS epoch, when GPS-locked
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tmms: Option<u64>,
    /// Fine timestamp, ns within the PPS second
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ftime: Option<u32>,
    pub chan: u8,
    pub rfch: u8,
    /// Carrier frequency, MHz
    pub freq: f64,
    /// Demodulator id
    pub mid: u8,
    /// CRC status: 1 = OK, -1 = fail, 0 = no CRC
    pub stat: i8,
    pub modu: String,
    pub datr: DatrField,
    pub codr: String,
    /// Signal RSSI, dBm
    pub rssis: i32,
    /// Channel RSSI, dBm
    pub rssi: i32,
    /// SNR, dB, one decimal
    pub lsnr: f64,
    /// Frequency offset, Hz
    pub foff: i32,
    pub size: u8,
    /// Base64-encoded payload
    pub data: String,
}

impl RxPk {
    /// Builds the wire form of one received frame. UTC and GPS times are
    /// filled only when a valid time reference is at hand.
    pub fn from_packet(pkt: &RxPacket, time_ref: Option<&TimeRef>) -> Self {
        let (time, tmms) = match time_ref {
            Some(tref) => {
                let utc = tref.cnt2utc(pkt.count_us);
                let gps = tref.cnt2gps(pkt.count_us);
                let iso = chrono::DateTime::from_timestamp(utc.as_secs() as i64, utc.subsec_nanos())
                    .map(|t| t.format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string());
                (iso, Some(gps.as_millis() as u64))
            }
            None => (None, None),
        };

        let datr = match pkt.datarate {
            DataRate::Lora(sf) => DatrField::Lora(crate::hal::modulation::format_lora_datr(
                sf,
                pkt.bandwidth,
            )),
            DataRate::Fsk { bps } => DatrField::Fsk(bps),
        };

        RxPk {
            jver: 1,
            tmst: pkt.count_us,
            time,
            tmms,
            ftime: pkt.fine_time_ns,
            chan: pkt.if_chain,
            rfch: pkt.rf_chain,
            freq: (pkt.freq_hz as f64) / 1e6,
            mid: pkt.modem_id,
            stat: pkt.crc_status.stat_code(),
            modu: pkt.modulation.to_string(),
            datr,
            codr: pkt.coderate.to_string(),
            rssis: pkt.rssi_signal.round() as i32,
            rssi: pkt.rssi_channel.round() as i32,
            lsnr: (pkt.snr as f64 * 10.0).round() / 10.0,
            foff: pkt.freq_offset,
            size: pkt.payload.len() as u8,
            data: base64::encode(&pkt.payload),
        }
    }
}

/// Body of a PUSH_DATA datagram; either field may be absent but never both.
#[derive(Debug, Serialize)]
pub struct PushPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rxpk: Option<Vec<RxPk>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stat: Option<StatReport>,
}

/// A complete PUSH_DATA datagram.
pub struct PushData {
    pub token: u16,
    pub gateway_eui: u64,
    pub payload: PushPayload,
}

impl PushData {
    pub fn to_bytes(&self) -> Result<Vec<u8>, FwdError> {
        let mut buf = Vec::with_capacity(256);
        put_header(&mut buf, self.token, PKT_PUSH_DATA, self.gateway_eui);
        buf.append(&mut serde_json::to_vec(&self.payload)?);
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::{Bandwidth, CodingRate, CrcStatus, Modulation, SpreadingFactor};

    fn frame() -> RxPacket {
        RxPacket {
            freq_hz: 868_100_000,
            freq_offset: -120,
            if_chain: 2,
            rf_chain: 0,
            modem_id: 4,
            modulation: Modulation::LoRa,
            bandwidth: Bandwidth::BW125,
            datarate: DataRate::Lora(SpreadingFactor::SF7),
            coderate: CodingRate::Cr4_5,
            crc_status: CrcStatus::Ok,
            count_us: 0x1122_3344,
            fine_time_ns: None,
            rssi_channel: -80.4,
            rssi_signal: -81.6,
            snr: 9.47,
            payload: vec![0xAA, 0xBB],
        }
    }

    #[test]
    fn test_rxpk_wire_form() {
        let rxpk = RxPk::from_packet(&frame(), None);
        let json = serde_json::to_string(&rxpk).unwrap();
        assert!(json.contains("\"tmst\":287454020"));
        assert!(json.contains("\"modu\":\"LORA\""));
        assert!(json.contains("\"datr\":\"SF7BW125\""));
        assert!(json.contains("\"codr\":\"4/5\""));
        assert!(json.contains("\"size\":2"));
        assert!(json.contains("\"data\":\"qrs=\""));
        assert!(json.contains("\"rssi\":-80"));
        assert!(json.contains("\"rssis\":-82"));
        assert!(json.contains("\"lsnr\":9.5"));
        // No GPS lock: no absolute times on the wire
        assert!(!json.contains("\"time\""));
        assert!(!json.contains("\"tmms\""));
    }

    #[test]
    fn test_fsk_datr_is_numeric() {
        let mut pkt = frame();
        pkt.modulation = Modulation::Fsk;
        pkt.datarate = DataRate::Fsk { bps: 50_000 };
        pkt.coderate = CodingRate::Off;
        let json = serde_json::to_string(&RxPk::from_packet(&pkt, None)).unwrap();
        assert!(json.contains("\"modu\":\"FSK\""));
        assert!(json.contains("\"datr\":50000"));
        assert!(json.contains("\"codr\":\"OFF\""));
    }

    #[test]
    fn test_push_data_layout() {
        let push = PushData {
            token: 0x0102,
            gateway_eui: 0xAABB_CCDD_EEFF_0011,
            payload: PushPayload {
                rxpk: Some(vec![RxPk::from_packet(&frame(), None)]),
                stat: None,
            },
        };
        let bytes = push.to_bytes().unwrap();
        assert_eq!(bytes[0], crate::constants::PROTOCOL_VERSION);
        assert_eq!(&bytes[1..3], &[0x01, 0x02]);
        assert_eq!(bytes[3], PKT_PUSH_DATA);
        assert_eq!(bytes[11], 0x11);
        let body: serde_json::Value = serde_json::from_slice(&bytes[12..]).unwrap();
        assert_eq!(body["rxpk"][0]["tmst"], 287454020u32);
        assert!(body.get("stat").is_none());
    }
}
