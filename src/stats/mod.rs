//! # Traffic Statistics
//!
//! Upstream and downstream counter buckets, each behind its own mutex, and
//! the status-report buffer handed from the reporting loop to the upstream
//! pipeline. The reporter swaps a bucket for a fresh one at every window,
//! so writers never block on report construction.

use std::sync::Mutex;

use crate::jit::JitError;

/// Counters of the upstream pipeline, reset each statistics window.
#[derive(Debug, Default, Clone)]
pub struct UpstreamStats {
    /// Frames fetched from the concentrator
    pub rx_rcv: u32,
    /// Frames with a good CRC
    pub rx_ok: u32,
    /// Frames with a bad CRC
    pub rx_bad: u32,
    /// Frames without a CRC
    pub rx_nocrc: u32,
    /// Frames forwarded after filtering
    pub rx_fwd: u32,
    /// Radio payload bytes forwarded
    pub payload_bytes: u64,
    /// PUSH_DATA datagrams sent
    pub dgram_sent: u32,
    /// Network payload bytes sent, headers included
    pub network_bytes: u64,
    /// PUSH_ACK datagrams matched to a sent token
    pub ack_rcv: u32,
}

impl UpstreamStats {
    /// Percentage of datagrams acknowledged over the window.
    pub fn ack_ratio(&self) -> f64 {
        if self.dgram_sent == 0 {
            return 0.0;
        }
        (100.0 * self.ack_rcv as f64 / self.dgram_sent as f64 * 10.0).round() / 10.0
    }
}

/// Counters of the downstream pipeline and the JIT dispatcher, reset each
/// statistics window.
#[derive(Debug, Default, Clone)]
pub struct DownstreamStats {
    /// PULL_DATA heartbeats sent
    pub pull_sent: u32,
    /// PULL_ACK datagrams matched to a sent token
    pub ack_rcv: u32,
    /// PULL_RESP datagrams received
    pub dgram_rcv: u32,
    /// Network payload bytes received
    pub network_bytes: u64,
    /// TX requests accepted into a JIT queue
    pub tx_requested: u32,
    /// Frames handed to the radio
    pub tx_ok: u32,
    /// Frames dropped at dispatch (late, radio busy, send failure)
    pub tx_fail: u32,
    /// Requests rejected as too late
    pub rej_too_late: u32,
    /// Requests rejected as too early
    pub rej_too_early: u32,
    /// Requests rejected on a window collision
    pub rej_collision: u32,
    /// Beacons admitted into the queue
    pub beacon_queued: u32,
    /// Beacons emitted by the radio
    pub beacon_sent: u32,
    /// Beacon slots refused by the queue
    pub beacon_rejected: u32,
}

impl DownstreamStats {
    /// Files one enqueue rejection under its bucket.
    pub fn record_rejection(&mut self, err: JitError) {
        match err {
            JitError::TooLate => self.rej_too_late += 1,
            JitError::TooEarly => self.rej_too_early += 1,
            _ => self.rej_collision += 1,
        }
    }
}

/// Status report handed from the reporting loop to the upstream pipeline.
///
/// The consumer clears `ready` under the mutex; a report skipped for one
/// datagram stays available for the next.
#[derive(Debug, Default)]
pub struct ReportBuffer {
    pub report: Option<crate::protocol::StatReport>,
    pub ready: bool,
}

/// Swaps the bucket behind `mutex` for a fresh one and returns the window
/// that just closed.
pub fn take<T: Default>(mutex: &Mutex<T>) -> T {
    let mut guard = mutex.lock().unwrap();
    std::mem::take(&mut *guard)
}
