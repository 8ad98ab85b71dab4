//! Packet Forwarder Protocol Constants
//!
//! This module defines the constants of the Semtech UDP protocol and the
//! timing budgets of the gateway scheduler, aligned with revision 2 of the
//! published protocol.

/// Version of the Semtech UDP protocol carried in every datagram header
pub const PROTOCOL_VERSION: u8 = 2;

/// PUSH_DATA identifier (gateway to server, RX frames and status)
pub const PKT_PUSH_DATA: u8 = 0;

/// PUSH_ACK identifier (server to gateway)
pub const PKT_PUSH_ACK: u8 = 1;

/// PULL_DATA identifier (gateway to server, downlink heartbeat)
pub const PKT_PULL_DATA: u8 = 2;

/// PULL_RESP identifier (server to gateway, TX request)
pub const PKT_PULL_RESP: u8 = 3;

/// PULL_ACK identifier (server to gateway)
pub const PKT_PULL_ACK: u8 = 4;

/// TX_ACK identifier (gateway to server, TX request outcome)
pub const PKT_TX_ACK: u8 = 5;

/// Size of the header shared by every datagram type
pub const HEADER_SIZE: usize = 12;

/// Largest datagram accepted or emitted on either socket
pub const DATAGRAM_MAX: usize = 4096;

/// Maximum number of packets fetched from the concentrator per poll
pub const NB_PKT_MAX: usize = 255;

/// Maximum radio payload size in bytes
pub const PAYLOAD_MAX: usize = 255;

/// Pause between radio polls when nothing was received (ms)
pub const FETCH_SLEEP_MS: u64 = 10;

/// Blocking wait on the downstream socket (ms)
pub const PULL_TIMEOUT_MS: u64 = 200;

/// Default upstream ACK collection budget (ms), waited in two halves
pub const DEFAULT_PUSH_TIMEOUT_MS: u64 = 100;

/// Pause between JIT queue polls (ms)
pub const JIT_POLL_MS: u64 = 10;

// ---------------------------------------------------------------------------
// JIT scheduling budgets
// ---------------------------------------------------------------------------

/// Lead time the concentrator needs to program a timestamped frame (us)
pub const TX_START_DELAY: u32 = 1_500;

/// Margin wrapped around TX windows for collision checks (us)
pub const TX_MARGIN_DELAY: u32 = 1_000;

/// Entries due within this window are handed to the radio (us)
pub const TX_JIT_DELAY: u32 = 30_000;

/// Upper bound on scheduling ahead of time (us), sized so that every
/// pre-allocated beacon slot stays within the wrap-safe half-range
pub const TX_MAX_ADVANCE_DELAY: u32 =
    (JIT_NUM_BEACON_IN_QUEUE as u32 + 1) * DEFAULT_BEACON_PERIOD_S * 1_000_000;

/// Capacity of one JIT queue
pub const JIT_QUEUE_MAX: usize = 32;

/// Number of future beacons kept queued per RF chain
pub const JIT_NUM_BEACON_IN_QUEUE: usize = 8;

/// Guard interval reserved ahead of a beacon slot (us)
pub const BEACON_GUARD_US: u32 = 3_000_000;

/// Airtime reserved for the beacon slot itself (us)
pub const BEACON_RESERVED_US: u32 = 2_120_000;

/// Canonical class-B beacon period (s)
pub const DEFAULT_BEACON_PERIOD_S: u32 = 128;

// ---------------------------------------------------------------------------
// GPS discipline
// ---------------------------------------------------------------------------

/// A time reference older than this is stale (s)
pub const GPS_REF_MAX_AGE: u64 = 30;

/// Number of samples averaged before the XTAL correction is declared stable
pub const XERR_INIT_AVG: usize = 16;

/// Dilution coefficient of the first-order XTAL error tracker
pub const XERR_FILT_COEF: f64 = 256.0;

/// Seconds between the GPS epoch (06-Jan-1980) and the Unix epoch
pub const GPS_EPOCH_UNIX_OFFSET: u64 = 315_964_800;

/// Seconds in one GPS week
pub const GPS_WEEK_SECONDS: u64 = 604_800;

// ---------------------------------------------------------------------------
// Modulation floors and defaults
// ---------------------------------------------------------------------------

/// Smallest LoRa preamble the scheduler will program
pub const MIN_LORA_PREAMBLE: u16 = 6;

/// Default LoRa preamble when the server does not request one
pub const STD_LORA_PREAMBLE: u16 = 8;

/// Smallest FSK preamble the scheduler will program
pub const MIN_FSK_PREAMBLE: u16 = 3;

/// Default FSK preamble when the server does not request one
pub const STD_FSK_PREAMBLE: u16 = 5;

/// Number of RF chains on the concentrator board
pub const NB_RF_CHAINS: usize = 2;

/// Step between spectral scan channels (Hz)
pub const SPECTRAL_SCAN_STEP_HZ: u32 = 200_000;
