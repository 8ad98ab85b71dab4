//! # Semtech UDP Protocol
//!
//! Bit-exact framing of the datagrams exchanged with the network server.
//! Every datagram opens with a 12-byte header on the gateway-to-server
//! direction and a 4-byte header on the server-to-gateway direction:
//!
//! ```text
//! [ version (1) | token (2, big-endian) | type (1) | gateway EUI (8, MSB first) ]
//! ```
//!
//! The JSON bodies (`rxpk`, `stat`, `txpk`, `txpk_ack`) live in the
//! submodules; this module owns header assembly and parsing.

pub mod ack;
pub mod pull;
pub mod push;
pub mod stat;

pub use ack::{jit_error_token, PushAck, TxAck, TxAckInfo};
pub use pull::{PullAck, PullData, PullResp, TxPk};
pub use push::{PushData, PushPayload, RxPk};
pub use stat::StatReport;

use bytes::BufMut;
use nom::number::complete::{be_u16, u8 as nom_u8};
use nom::IResult;

use crate::constants::PROTOCOL_VERSION;
use crate::error::FwdError;

/// Appends the 12-byte uplink header to `buf`.
pub fn put_header(buf: &mut Vec<u8>, token: u16, kind: u8, gateway_eui: u64) {
    buf.put_u8(PROTOCOL_VERSION);
    buf.put_u16(token);
    buf.put_u8(kind);
    buf.put_u64(gateway_eui);
}

fn header_fields(input: &[u8]) -> IResult<&[u8], (u8, u16, u8)> {
    let (input, version) = nom_u8(input)?;
    let (input, token) = be_u16(input)?;
    let (input, kind) = nom_u8(input)?;
    Ok((input, (version, token, kind)))
}

/// Parses a server-to-gateway header, checking protocol version and
/// datagram type. Returns the token and the remaining body.
pub fn parse_downlink_header(buf: &[u8], expected_kind: u8) -> Result<(u16, &[u8]), FwdError> {
    let (body, (version, token, kind)) = header_fields(buf)
        .map_err(|_| FwdError::Datagram(format!("short datagram ({} bytes)", buf.len())))?;
    if version != PROTOCOL_VERSION {
        return Err(FwdError::Datagram(format!(
            "protocol version {version}, expected {PROTOCOL_VERSION}"
        )));
    }
    if kind != expected_kind {
        return Err(FwdError::Datagram(format!(
            "datagram type {kind}, expected {expected_kind}"
        )));
    }
    Ok((token, body))
}

/// Peeks the datagram type of a server-to-gateway datagram without
/// consuming it.
pub fn peek_kind(buf: &[u8]) -> Option<u8> {
    if buf.len() < 4 || buf[0] != PROTOCOL_VERSION {
        return None;
    }
    Some(buf[3])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{HEADER_SIZE, PKT_PULL_ACK, PKT_PUSH_ACK};

    #[test]
    fn test_put_header_layout() {
        let mut buf = Vec::new();
        put_header(&mut buf, 0xBEEF, PKT_PUSH_ACK, 0xAA55_5A05_0000_0101);
        assert_eq!(buf.len(), HEADER_SIZE);
        assert_eq!(buf[0], PROTOCOL_VERSION);
        assert_eq!(&buf[1..3], &[0xBE, 0xEF]);
        assert_eq!(buf[3], PKT_PUSH_ACK);
        assert_eq!(&buf[4..12], &[0xAA, 0x55, 0x5A, 0x05, 0x00, 0x00, 0x01, 0x01]);
    }

    #[test]
    fn test_parse_downlink_header() {
        let buf = [PROTOCOL_VERSION, 0x12, 0x34, PKT_PULL_ACK];
        let (token, body) = parse_downlink_header(&buf, PKT_PULL_ACK).unwrap();
        assert_eq!(token, 0x1234);
        assert!(body.is_empty());
    }

    #[test]
    fn test_parse_downlink_header_rejects() {
        // Too short
        assert!(parse_downlink_header(&[PROTOCOL_VERSION, 0x12], PKT_PULL_ACK).is_err());
        // Wrong version
        let buf = [1, 0x12, 0x34, PKT_PULL_ACK];
        assert!(parse_downlink_header(&buf, PKT_PULL_ACK).is_err());
        // Wrong type
        let buf = [PROTOCOL_VERSION, 0x12, 0x34, PKT_PUSH_ACK];
        assert!(parse_downlink_header(&buf, PKT_PULL_ACK).is_err());
    }

    #[test]
    fn test_peek_kind() {
        let buf = [PROTOCOL_VERSION, 0, 1, PKT_PULL_ACK, 0xFF];
        assert_eq!(peek_kind(&buf), Some(PKT_PULL_ACK));
        assert_eq!(peek_kind(&buf[..3]), None);
        assert_eq!(peek_kind(&[0, 0, 0, 0]), None);
    }
}
