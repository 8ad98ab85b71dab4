//! Beacon construction tests: CRC golden vector, payload layout across
//! spreading factors, channel rotation, and the complete TX packet handed
//! to the JIT queue.

use std::time::Duration;

use pktfwd_rs::beacon::{self, BeaconPlan};
use pktfwd_rs::hal::{DataRate, Modulation, SpreadingFactor, TxMode};

fn plan() -> BeaconPlan {
    BeaconPlan {
        period_s: 128,
        freq_hz: 869_525_000,
        freq_nb: 8,
        freq_step_hz: 200_000,
        datarate: 9,
        bw_hz: 125_000,
        power: 14,
        infodesc: 0,
    }
}

#[test]
fn crc16_xmodem_golden_vector() {
    assert_eq!(beacon::crc16(b"123456789"), 0x31C3);
}

/// Beacon rotation scenario: with 8 channels spaced 200 kHz over a 128 s
/// period, the slot at 1024 s lands on channel 0 and the slot at 1152 s on
/// channel 1.
#[test]
fn channel_rotation_reference() {
    let plan = plan();
    assert_eq!(beacon::channel(&plan, 1024), 0);
    assert_eq!(beacon::frequency_hz(&plan, 1024), 869_525_000);
    assert_eq!(beacon::channel(&plan, 1152), 1);
    assert_eq!(beacon::frequency_hz(&plan, 1152), 869_725_000);
}

#[test]
fn slot_times_are_period_multiples() {
    let plan = plan();
    let mut slot = beacon::next_slot(Duration::from_secs(1_000_000_000), plan.period_s);
    for _ in 0..16 {
        assert_eq!(slot % plan.period_s as u64, 0);
        let next = beacon::next_slot(Duration::from_secs(slot), plan.period_s);
        assert_eq!(next, slot + plan.period_s as u64);
        slot = next;
    }
}

#[test]
fn beacon_time_field_matches_slot() {
    let pyld = beacon::beacon_payload(&plan(), 0x1234_5678, 0.0, 0.0).unwrap();
    // SF9: two RFU bytes ahead of the little-endian time field
    assert_eq!(
        u32::from_le_bytes(pyld[2..6].try_into().unwrap()),
        0x1234_5678
    );
}

#[test]
fn both_crcs_validate_their_sections() {
    let pyld = beacon::beacon_payload(&plan(), 987_654_400, 46.2354, 6.0452).unwrap();
    assert_eq!(pyld.len(), 17);

    let crc1 = u16::from_le_bytes(pyld[6..8].try_into().unwrap());
    assert_eq!(crc1, beacon::crc16(&pyld[0..6]));

    let crc2 = u16::from_le_bytes(pyld[15..17].try_into().unwrap());
    assert_eq!(crc2, beacon::crc16(&pyld[8..15]));

    // Corrupting the time field must break the first CRC only
    let mut bad = pyld.clone();
    bad[3] ^= 0x01;
    assert_ne!(crc1, beacon::crc16(&bad[0..6]));
    assert_eq!(crc2, beacon::crc16(&bad[8..15]));
}

#[test]
fn tx_packet_carries_beacon_parameters() {
    let plan = plan();
    let pkt = beacon::build_tx_packet(&plan, 1152, 46.0, 6.0, 0).unwrap();
    assert_eq!(pkt.tx_mode, TxMode::OnGps);
    assert_eq!(pkt.freq_hz, 869_725_000);
    assert_eq!(pkt.rf_power, 14);
    assert_eq!(pkt.modulation, Modulation::LoRa);
    assert_eq!(pkt.datarate, DataRate::Lora(SpreadingFactor::SF9));
    assert!(pkt.no_crc);
    assert!(pkt.no_header);
    assert!(!pkt.invert_pol);
    assert_eq!(pkt.payload.len(), 17);
}
