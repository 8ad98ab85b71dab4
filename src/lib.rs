//! # pktfwd-rs - A Rust LoRaWAN Gateway Packet Forwarder
//!
//! The pktfwd-rs crate bridges a LoRa concentrator board and a LoRaWAN
//! network server over the Semtech UDP protocol: received radio frames are
//! tagged with precise timestamps, batched into PUSH_DATA datagrams and
//! forwarded upstream, while downlink requests and class-B beacons are
//! scheduled just-in-time against the concentrator's free-running counter.
//!
//! ## Features
//!
//! - Upstream pipeline: RX fetch, CRC filtering, `rxpk` serialization and
//!   PUSH_DATA/PUSH_ACK bookkeeping
//! - Downstream pipeline: PULL_DATA heartbeats, PULL_RESP validation and
//!   TX_ACK reporting
//! - Per-RF-chain just-in-time TX queues with collision avoidance and
//!   wrap-safe 32-bit counter arithmetic
//! - GPS discipline: UBX/NMEA decoding, PPS synchronization and an
//!   exponentially-filtered crystal-error estimator
//! - Class-B beacon construction with CRC-16 integrity and channel rotation
//! - Background spectral scan on idle RF chains
//!
//! ## Usage
//!
//! The `pktfwd` binary drives the whole gateway from a JSON configuration
//! file. The library exposes every building block for integration tests
//! and custom deployments:
//!
//! ```rust,no_run
//! use pktfwd_rs::{fwd, hal::mock::MockConcentrator, Config};
//!
//! # async fn demo() -> Result<(), pktfwd_rs::FwdError> {
//! let config = Config::load(std::path::Path::new("global_conf.json"))?;
//! fwd::run(config, Box::new(MockConcentrator::wall_clock())).await
//! # }
//! ```

pub mod beacon;
pub mod config;
pub mod constants;
pub mod error;
pub mod fwd;
pub mod gps;
pub mod hal;
pub mod jit;
pub mod logging;
pub mod protocol;
pub mod stats;
pub mod time;

pub use crate::error::FwdError;
pub use crate::logging::{init_logger, log_info};

// Core gateway types
pub use config::Config;
pub use fwd::GatewayContext;
pub use hal::{Concentrator, RxPacket, TxPacket};
pub use jit::{time_on_air_us, JitError, JitQueue, PacketClass};
pub use time::{less_recent, wrap_diff, TimeRef, XtalFilter};

// Protocol surface
pub use protocol::{PullResp, PushData, RxPk, StatReport, TxAck};
