//! # Acknowledgement Datagrams
//!
//! PUSH_ACK validation on the upstream socket and TX_ACK construction on
//! the downstream socket. A successful TX_ACK is the bare 12-byte header;
//! rejections and warnings carry a `{"txpk_ack":{...}}` body.

use serde::Serialize;

use crate::constants::{PKT_PUSH_ACK, PKT_TX_ACK};
use crate::error::FwdError;
use crate::jit::JitError;
use crate::protocol::{parse_downlink_header, put_header};

/// A PUSH_ACK datagram from the server.
pub struct PushAck {
    pub token: u16,
}

impl PushAck {
    pub fn from_bytes(buf: &[u8]) -> Result<Self, FwdError> {
        let (token, _) = parse_downlink_header(buf, PKT_PUSH_ACK)?;
        Ok(PushAck { token })
    }
}

/// Maps a scheduling rejection onto its wire token.
pub fn jit_error_token(err: JitError) -> &'static str {
    match err {
        JitError::TooLate => "TOO_LATE",
        JitError::TooEarly => "TOO_EARLY",
        JitError::CollisionPacket => "COLLISION_PACKET",
        JitError::CollisionBeacon => "COLLISION_BEACON",
        // The ack vocabulary is closed; a full queue and an unschedulable
        // request both read as contention on the chain.
        JitError::Full | JitError::Invalid => "COLLISION_PACKET",
    }
}

/// Outcome reported inside a TX_ACK.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TxAckInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warn: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<i8>,
}

impl TxAckInfo {
    pub fn error(token: &str) -> Self {
        TxAckInfo {
            error: Some(token.to_string()),
            ..Default::default()
        }
    }

    pub fn warn(token: &str, value: i8) -> Self {
        TxAckInfo {
            warn: Some(token.to_string()),
            value: Some(value),
            ..Default::default()
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none() && self.warn.is_none()
    }
}

#[derive(Serialize)]
struct TxAckPayload<'a> {
    txpk_ack: &'a TxAckInfo,
}

/// A TX_ACK datagram, answering one PULL_RESP with its token.
pub struct TxAck {
    pub token: u16,
    pub gateway_eui: u64,
    pub info: TxAckInfo,
}

impl TxAck {
    pub fn to_bytes(&self) -> Result<Vec<u8>, FwdError> {
        let mut buf = Vec::with_capacity(64);
        put_header(&mut buf, self.token, PKT_TX_ACK, self.gateway_eui);
        // Nothing to report on success: the header alone acknowledges.
        if !self.info.is_ok() {
            buf.append(&mut serde_json::to_vec(&TxAckPayload {
                txpk_ack: &self.info,
            })?);
        }
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::PROTOCOL_VERSION;

    #[test]
    fn test_push_ack_token() {
        let buf = [PROTOCOL_VERSION, 0xAB, 0xCD, PKT_PUSH_ACK];
        assert_eq!(PushAck::from_bytes(&buf).unwrap().token, 0xABCD);
    }

    #[test]
    fn test_tx_ack_success_is_header_only() {
        let ack = TxAck {
            token: 7,
            gateway_eui: 2,
            info: TxAckInfo::default(),
        };
        assert_eq!(ack.to_bytes().unwrap().len(), 12);
    }

    #[test]
    fn test_tx_ack_error_body() {
        let ack = TxAck {
            token: 7,
            gateway_eui: 2,
            info: TxAckInfo::error("TOO_LATE"),
        };
        let bytes = ack.to_bytes().unwrap();
        let body = std::str::from_utf8(&bytes[12..]).unwrap();
        assert_eq!(body, r#"{"txpk_ack":{"error":"TOO_LATE"}}"#);
    }

    #[test]
    fn test_tx_ack_power_warning_carries_value() {
        let ack = TxAck {
            token: 7,
            gateway_eui: 2,
            info: TxAckInfo::warn("TX_POWER", 14),
        };
        let bytes = ack.to_bytes().unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes[12..]).unwrap();
        assert_eq!(body["txpk_ack"]["warn"], "TX_POWER");
        assert_eq!(body["txpk_ack"]["value"], 14);
    }

    #[test]
    fn test_jit_error_tokens() {
        assert_eq!(jit_error_token(JitError::TooLate), "TOO_LATE");
        assert_eq!(jit_error_token(JitError::TooEarly), "TOO_EARLY");
        assert_eq!(jit_error_token(JitError::CollisionPacket), "COLLISION_PACKET");
        assert_eq!(jit_error_token(JitError::CollisionBeacon), "COLLISION_BEACON");
    }
}
