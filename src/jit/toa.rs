//! # Time on Air
//!
//! Deterministic modem airtime of a frame, computed from modulation
//! parameters and payload length. The JIT queue sizes every TX reservation
//! window with this value.

use crate::hal::{Bandwidth, DataRate, Modulation, TxPacket};
use crate::jit::JitError;

/// Computes the airtime of `pkt` in microseconds.
///
/// Returns [`JitError::Invalid`] when the modulation and datarate fields
/// disagree or the datarate is degenerate.
pub fn time_on_air_us(pkt: &TxPacket) -> Result<u32, JitError> {
    match (pkt.modulation, pkt.datarate) {
        (Modulation::LoRa, DataRate::Lora(sf)) => {
            let sf = sf.as_u8() as u32;
            let bw_khz = pkt.bandwidth.khz() as f64;

            // Low data rate optimization is mandated for SF11/SF12 at 125 kHz
            let de = if sf >= 11 && pkt.bandwidth == Bandwidth::BW125 {
                1i64
            } else {
                0i64
            };
            let crc = if pkt.no_crc { 0i64 } else { 1i64 };
            let ih = if pkt.no_header { 1i64 } else { 0i64 };

            let t_sym_us = (1u64 << sf) as f64 * 1000.0 / bw_khz;
            let payload_len = pkt.payload.len() as i64;

            let numerator = 8 * payload_len - 4 * sf as i64 + 28 + 16 * crc - 20 * ih;
            let denominator = 4 * (sf as i64 - 2 * de);
            let blocks = (numerator as f64 / denominator as f64).ceil() as i64;
            let cr_inc = (pkt.coderate.increment() + 4) as i64;
            let payload_symbols = 8 + (blocks * cr_inc).max(0);

            let t_preamble = (pkt.preamble as f64 + 4.25) * t_sym_us;
            let t_payload = payload_symbols as f64 * t_sym_us;
            Ok((t_preamble + t_payload).ceil() as u32)
        }
        (Modulation::Fsk, DataRate::Fsk { bps }) => {
            if bps == 0 {
                return Err(JitError::Invalid);
            }
            // preamble + sync word (3) + length byte + payload + CRC (2)
            let bits = (pkt.preamble as u64 + 3 + 1 + pkt.payload.len() as u64 + 2) * 8;
            Ok((bits as f64 * 1e6 / bps as f64).ceil() as u32)
        }
        _ => Err(JitError::Invalid),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::{CodingRate, SpreadingFactor, TxMode};

    fn lora_pkt(sf: SpreadingFactor, bw: Bandwidth, payload_len: usize) -> TxPacket {
        TxPacket {
            tx_mode: TxMode::Timestamped,
            count_us: 0,
            rf_chain: 0,
            freq_hz: 868_100_000,
            rf_power: 14,
            modulation: Modulation::LoRa,
            bandwidth: bw,
            datarate: DataRate::Lora(sf),
            coderate: CodingRate::Cr4_5,
            invert_pol: true,
            fdev_khz: 0,
            preamble: 8,
            no_crc: false,
            no_header: false,
            payload: vec![0u8; payload_len],
        }
    }

    #[test]
    fn test_sf7_reference_airtime() {
        // SF7BW125, CR4/5, 8-symbol preamble, 10-byte payload, CRC on:
        // 12.25 preamble symbols + (8 + 4*5) payload symbols = 40.25
        // symbols of 1.024 ms -> 41.216 ms
        let toa = time_on_air_us(&lora_pkt(SpreadingFactor::SF7, Bandwidth::BW125, 10)).unwrap();
        assert_eq!(toa, 41_216);
    }

    #[test]
    fn test_sf12_slower_than_sf7() {
        let fast = time_on_air_us(&lora_pkt(SpreadingFactor::SF7, Bandwidth::BW125, 20)).unwrap();
        let slow = time_on_air_us(&lora_pkt(SpreadingFactor::SF12, Bandwidth::BW125, 20)).unwrap();
        assert!(slow > 20 * fast);
    }

    #[test]
    fn test_wider_bandwidth_is_faster() {
        let narrow = time_on_air_us(&lora_pkt(SpreadingFactor::SF9, Bandwidth::BW125, 32)).unwrap();
        let wide = time_on_air_us(&lora_pkt(SpreadingFactor::SF9, Bandwidth::BW500, 32)).unwrap();
        assert!(wide < narrow);
        assert!(narrow < 4 * wide + 1_000);
    }

    #[test]
    fn test_fsk_airtime() {
        let mut pkt = lora_pkt(SpreadingFactor::SF7, Bandwidth::BW125, 10);
        pkt.modulation = Modulation::Fsk;
        pkt.datarate = DataRate::Fsk { bps: 50_000 };
        pkt.preamble = 5;
        // (5 + 3 + 1 + 10 + 2) * 8 bits at 50 kbps = 3.36 ms
        assert_eq!(time_on_air_us(&pkt).unwrap(), 3_360);
    }

    #[test]
    fn test_mismatched_modulation_is_invalid() {
        let mut pkt = lora_pkt(SpreadingFactor::SF7, Bandwidth::BW125, 10);
        pkt.datarate = DataRate::Fsk { bps: 50_000 };
        assert_eq!(time_on_air_us(&pkt), Err(JitError::Invalid));

        let mut pkt = lora_pkt(SpreadingFactor::SF7, Bandwidth::BW125, 10);
        pkt.modulation = Modulation::Fsk;
        pkt.datarate = DataRate::Fsk { bps: 0 };
        assert_eq!(time_on_air_us(&pkt), Err(JitError::Invalid));
    }
}
