//! # GPS Serial Stream Handling
//!
//! Framed input over the GPS TTY byte stream. The scanner looks for either
//! the UBX sync byte or the NMEA `$` at the head of the buffer and attempts
//! a frame decode; the reader loop drops one byte and resyncs whenever the
//! head cannot open a valid frame.

pub mod parser;

pub use parser::{parse_nmea_sentence, parse_ubx_frame};

use std::time::Duration;

/// A decoded GPS message the forwarder acts on.
#[derive(Debug, Clone, PartialEq)]
pub enum GpsMsg {
    /// UBX-NAV-TIMEGPS, aligned with the PPS edge.
    TimeGps {
        /// Time since the GPS epoch
        gps_time: Duration,
        /// Corresponding UTC, as duration since the Unix epoch
        utc: Duration,
    },
    /// NMEA RMC position fix.
    Rmc {
        latitude: f64,
        longitude: f64,
        /// False while the receiver reports the fix as void
        valid: bool,
    },
    /// A well-formed frame the forwarder has no use for.
    Ignored,
}

/// Outcome of one scan over the head of the receive buffer.
#[derive(Debug, Clone, PartialEq)]
pub enum ScanOutcome {
    /// The head may open a frame but more bytes are needed.
    Incomplete,
    /// The head cannot open a frame; drop one byte and resync.
    Invalid,
    /// A complete frame of the given length was decoded.
    Frame(usize, GpsMsg),
}

/// UBX frame sync bytes
pub const UBX_SYNC1: u8 = 0xB5;
pub const UBX_SYNC2: u8 = 0x62;

/// Longest sentence we are willing to buffer before declaring a desync
const NMEA_SENTENCE_MAX: usize = 120;

/// Scans the head of `buf` for one UBX or NMEA frame.
pub fn scan(buf: &[u8]) -> ScanOutcome {
    match buf.first() {
        None => ScanOutcome::Incomplete,
        Some(&UBX_SYNC1) => parse_ubx_frame(buf),
        Some(&b'$') => {
            match buf.iter().position(|&b| b == b'\n') {
                Some(end) => parse_nmea_sentence(&buf[..=end]),
                None if buf.len() > NMEA_SENTENCE_MAX => ScanOutcome::Invalid,
                None => ScanOutcome::Incomplete,
            }
        }
        Some(_) => ScanOutcome::Invalid,
    }
}

/// Consumes `stream` buffer contents, invoking `handle` for every decoded
/// message, and leaves any trailing partial frame in place.
pub fn drain_buffer<F: FnMut(GpsMsg)>(stream: &mut Vec<u8>, mut handle: F) {
    let mut start = 0usize;
    while start < stream.len() {
        match scan(&stream[start..]) {
            ScanOutcome::Incomplete => break,
            ScanOutcome::Invalid => start += 1,
            ScanOutcome::Frame(len, msg) => {
                handle(msg);
                start += len;
            }
        }
    }
    stream.drain(..start);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_resyncs_on_garbage() {
        assert_eq!(scan(&[0x00, 0xB5]), ScanOutcome::Invalid);
        assert_eq!(scan(&[]), ScanOutcome::Incomplete);
    }

    #[test]
    fn test_drain_buffer_skips_noise_between_frames() {
        // Noise, then a complete RMC sentence, then a partial sentence
        let mut buf = Vec::new();
        buf.extend_from_slice(&[0xFF, 0x07]);
        buf.extend_from_slice(b"$GPRMC,120000.00,A,4717.11,N,00833.91,E,0.0,0.0,010124,,,A*5E\r\n");
        buf.extend_from_slice(b"$GPGGA,1200");

        let mut msgs = Vec::new();
        drain_buffer(&mut buf, |m| msgs.push(m));

        // Only the partial sentence remains buffered
        assert!(buf.starts_with(b"$GPGGA"));
        assert_eq!(msgs.len(), 1);
        match &msgs[0] {
            GpsMsg::Rmc { valid, .. } => assert!(*valid),
            other => panic!("expected RMC, got {other:?}"),
        }
    }
}
