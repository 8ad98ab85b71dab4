//! # UBX and NMEA Frame Decoding
//!
//! Decodes the two message families the forwarder listens for on the GPS
//! line: the binary UBX-NAV-TIMEGPS message that pairs with the PPS edge,
//! and the NMEA RMC sentence carrying the position fix.

use std::time::Duration;

use crate::constants::{GPS_EPOCH_UNIX_OFFSET, GPS_WEEK_SECONDS};
use crate::gps::{GpsMsg, ScanOutcome, UBX_SYNC1, UBX_SYNC2};

/// UBX class/id of NAV-TIMEGPS
const UBX_NAV_CLASS: u8 = 0x01;
const UBX_NAV_TIMEGPS_ID: u8 = 0x20;
const UBX_NAV_TIMEGPS_LEN: usize = 16;

/// Validity flags of the NAV-TIMEGPS payload
const TIMEGPS_TOW_VALID: u8 = 0x01;
const TIMEGPS_WEEK_VALID: u8 = 0x02;
const TIMEGPS_LEAP_VALID: u8 = 0x04;

/// Decodes one UBX frame at the head of `buf`.
///
/// The caller guarantees `buf[0] == UBX_SYNC1`.
pub fn parse_ubx_frame(buf: &[u8]) -> ScanOutcome {
    if buf.len() < 8 {
        return ScanOutcome::Incomplete;
    }
    if buf[1] != UBX_SYNC2 {
        return ScanOutcome::Invalid;
    }
    let class = buf[2];
    let id = buf[3];
    let payload_len = u16::from_le_bytes([buf[4], buf[5]]) as usize;
    let frame_len = 6 + payload_len + 2;
    if frame_len > 1024 {
        return ScanOutcome::Invalid;
    }
    if buf.len() < frame_len {
        return ScanOutcome::Incomplete;
    }

    let (ck_a, ck_b) = ubx_checksum(&buf[2..6 + payload_len]);
    if ck_a != buf[frame_len - 2] || ck_b != buf[frame_len - 1] {
        return ScanOutcome::Invalid;
    }

    if class != UBX_NAV_CLASS || id != UBX_NAV_TIMEGPS_ID || payload_len != UBX_NAV_TIMEGPS_LEN {
        return ScanOutcome::Frame(frame_len, GpsMsg::Ignored);
    }

    match decode_nav_timegps(&buf[6..6 + payload_len]) {
        Some(msg) => ScanOutcome::Frame(frame_len, msg),
        None => ScanOutcome::Frame(frame_len, GpsMsg::Ignored),
    }
}

/// 8-bit Fletcher checksum over the class, id, length and payload bytes.
fn ubx_checksum(data: &[u8]) -> (u8, u8) {
    let mut ck_a: u8 = 0;
    let mut ck_b: u8 = 0;
    for &byte in data {
        ck_a = ck_a.wrapping_add(byte);
        ck_b = ck_b.wrapping_add(ck_a);
    }
    (ck_a, ck_b)
}

fn decode_nav_timegps(payload: &[u8]) -> Option<GpsMsg> {
    let itow_ms = u32::from_le_bytes(payload[0..4].try_into().ok()?);
    let ftow_ns = i32::from_le_bytes(payload[4..8].try_into().ok()?);
    let week = i16::from_le_bytes(payload[8..10].try_into().ok()?);
    let leap_s = payload[10] as i8;
    let valid = payload[11];

    let required = TIMEGPS_TOW_VALID | TIMEGPS_WEEK_VALID | TIMEGPS_LEAP_VALID;
    if valid & required != required || week < 0 {
        return None;
    }

    let mut total_ns =
        week as i64 * GPS_WEEK_SECONDS as i64 * 1_000_000_000 + itow_ms as i64 * 1_000_000
            + ftow_ns as i64;
    if total_ns < 0 {
        total_ns = 0;
    }
    let gps_time = Duration::from_nanos(total_ns as u64);
    let utc_s = gps_time.as_secs() as i64 + GPS_EPOCH_UNIX_OFFSET as i64 - leap_s as i64;
    let utc = Duration::new(utc_s.max(0) as u64, gps_time.subsec_nanos());

    Some(GpsMsg::TimeGps { gps_time, utc })
}

/// Decodes one complete NMEA sentence, terminator included.
///
/// The caller guarantees the sentence starts with `$` and ends at the first
/// `\n` in the buffer.
pub fn parse_nmea_sentence(sentence: &[u8]) -> ScanOutcome {
    let len = sentence.len();
    let Ok(text) = std::str::from_utf8(sentence) else {
        return ScanOutcome::Invalid;
    };
    let body = text.trim_end_matches(['\r', '\n']);

    // "$....*hh" with a two-digit hex checksum over the payload
    let Some(star) = body.rfind('*') else {
        return ScanOutcome::Invalid;
    };
    if star + 3 != body.len() || star < 1 {
        return ScanOutcome::Invalid;
    }
    let Ok(wire_sum) = u8::from_str_radix(&body[star + 1..], 16) else {
        return ScanOutcome::Invalid;
    };
    let payload = &body[1..star];
    let computed: u8 = payload.bytes().fold(0, |acc, b| acc ^ b);
    if computed != wire_sum {
        return ScanOutcome::Invalid;
    }

    let fields: Vec<&str> = payload.split(',').collect();
    let talker = fields[0];
    if talker.len() != 5 || &talker[2..] != "RMC" {
        return ScanOutcome::Frame(len, GpsMsg::Ignored);
    }
    if fields.len() < 7 {
        return ScanOutcome::Frame(len, GpsMsg::Ignored);
    }

    let valid = fields[2] == "A";
    let lat = parse_coordinate(fields[3], fields[4], 2);
    let lon = parse_coordinate(fields[5], fields[6], 3);
    match (lat, lon) {
        (Some(latitude), Some(longitude)) => ScanOutcome::Frame(
            len,
            GpsMsg::Rmc {
                latitude,
                longitude,
                valid,
            },
        ),
        _ => ScanOutcome::Frame(len, GpsMsg::Ignored),
    }
}

/// Parses a `ddmm.mmmm` / `dddmm.mmmm` coordinate with its hemisphere.
fn parse_coordinate(value: &str, hemisphere: &str, deg_digits: usize) -> Option<f64> {
    if value.len() <= deg_digits {
        return None;
    }
    let degrees: f64 = value[..deg_digits].parse().ok()?;
    let minutes: f64 = value[deg_digits..].parse().ok()?;
    let magnitude = degrees + minutes / 60.0;
    match hemisphere {
        "N" | "E" => Some(magnitude),
        "S" | "W" => Some(-magnitude),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ubx_timegps_frame(itow_ms: u32, ftow_ns: i32, week: i16, leap: i8, valid: u8) -> Vec<u8> {
        let mut payload = Vec::with_capacity(UBX_NAV_TIMEGPS_LEN);
        payload.extend_from_slice(&itow_ms.to_le_bytes());
        payload.extend_from_slice(&ftow_ns.to_le_bytes());
        payload.extend_from_slice(&week.to_le_bytes());
        payload.push(leap as u8);
        payload.push(valid);
        payload.extend_from_slice(&2000u32.to_le_bytes()); // tAcc

        let mut frame = vec![UBX_SYNC1, UBX_SYNC2, UBX_NAV_CLASS, UBX_NAV_TIMEGPS_ID];
        frame.extend_from_slice(&(UBX_NAV_TIMEGPS_LEN as u16).to_le_bytes());
        frame.extend_from_slice(&payload);
        let (ck_a, ck_b) = ubx_checksum(&frame[2..]);
        frame.push(ck_a);
        frame.push(ck_b);
        frame
    }

    #[test]
    fn test_timegps_decode() {
        // Week 2200, 300.5 s into the week, 18 leap seconds
        let frame = ubx_timegps_frame(300_500, 0, 2200, 18, 0x07);
        match parse_ubx_frame(&frame) {
            ScanOutcome::Frame(len, GpsMsg::TimeGps { gps_time, utc }) => {
                assert_eq!(len, frame.len());
                let expect_gps = 2200u64 * GPS_WEEK_SECONDS + 300;
                assert_eq!(gps_time.as_secs(), expect_gps);
                assert_eq!(gps_time.subsec_millis(), 500);
                assert_eq!(utc.as_secs(), expect_gps + GPS_EPOCH_UNIX_OFFSET - 18);
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn test_timegps_invalid_flags_ignored() {
        // Leap seconds not yet resolved
        let frame = ubx_timegps_frame(300_500, 0, 2200, 18, 0x03);
        assert_eq!(parse_ubx_frame(&frame), ScanOutcome::Frame(frame.len(), GpsMsg::Ignored));
    }

    #[test]
    fn test_ubx_bad_checksum_resyncs() {
        let mut frame = ubx_timegps_frame(1_000, 0, 2200, 18, 0x07);
        let last = frame.len() - 1;
        frame[last] ^= 0xFF;
        assert_eq!(parse_ubx_frame(&frame), ScanOutcome::Invalid);
    }

    #[test]
    fn test_ubx_partial_frame_waits() {
        let frame = ubx_timegps_frame(1_000, 0, 2200, 18, 0x07);
        assert_eq!(parse_ubx_frame(&frame[..4]), ScanOutcome::Incomplete);
        assert_eq!(parse_ubx_frame(&frame[..10]), ScanOutcome::Incomplete);
    }

    #[test]
    fn test_other_ubx_message_skipped_whole() {
        // UBX-NAV-STATUS (class 0x01, id 0x03), 4-byte dummy payload
        let mut frame = vec![UBX_SYNC1, UBX_SYNC2, 0x01, 0x03, 4, 0, 1, 2, 3, 4];
        let (ck_a, ck_b) = ubx_checksum(&frame[2..]);
        frame.push(ck_a);
        frame.push(ck_b);
        assert_eq!(parse_ubx_frame(&frame), ScanOutcome::Frame(frame.len(), GpsMsg::Ignored));
    }

    #[test]
    fn test_rmc_position() {
        let sentence = b"$GPRMC,120000.00,A,4717.11,N,00833.91,E,0.0,0.0,010124,,,A*5E\r\n";
        match parse_nmea_sentence(sentence) {
            ScanOutcome::Frame(len, GpsMsg::Rmc { latitude, longitude, valid }) => {
                assert_eq!(len, sentence.len());
                assert!(valid);
                assert!((latitude - (47.0 + 17.11 / 60.0)).abs() < 1e-9);
                assert!((longitude - (8.0 + 33.91 / 60.0)).abs() < 1e-9);
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn test_rmc_void_fix_flagged() {
        let sentence = b"$GPRMC,120000.00,V,4717.11,N,00833.91,E,0.0,0.0,010124,,,N*46\r\n";
        match parse_nmea_sentence(sentence) {
            ScanOutcome::Frame(_, GpsMsg::Rmc { valid, .. }) => assert!(!valid),
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn test_nmea_bad_checksum_resyncs() {
        let sentence = b"$GPRMC,120000.00,A,4717.11,N,00833.91,E,0.0,0.0,010124,,,A*00\r\n";
        assert_eq!(parse_nmea_sentence(sentence), ScanOutcome::Invalid);
    }

    #[test]
    fn test_southern_western_hemispheres() {
        assert!((parse_coordinate("3350.00", "S", 2).unwrap() - (-(33.0 + 50.0 / 60.0))).abs() < 1e-9);
        assert!((parse_coordinate("15112.00", "W", 3).unwrap() - (-(151.0 + 12.0 / 60.0))).abs() < 1e-9);
    }

    #[test]
    fn test_non_rmc_sentence_ignored() {
        let sentence = b"$GPGGA,120000.00,4717.11,N,00833.91,E,1,08,1.0,495.0,M,48.0,M,,*67\r\n";
        match parse_nmea_sentence(sentence) {
            ScanOutcome::Frame(len, GpsMsg::Ignored) => assert_eq!(len, sentence.len()),
            other => panic!("unexpected outcome {other:?}"),
        }
    }
}
