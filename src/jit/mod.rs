//! # Just-In-Time TX Queue
//!
//! Per-RF-chain ordered reservation of future transmissions. Downlinks and
//! class-B beacons are admitted against lead-time bounds and a pairwise
//! collision check over their TX windows, then handed to the dispatcher in
//! ascending target-counter order.
//!
//! Every comparison of counter values goes through the wrap-safe predicates
//! of [`crate::time`]; the queue behaves identically around the 32-bit
//! rollover and around zero.

pub mod toa;

pub use toa::time_on_air_us;

use thiserror::Error;

use crate::constants::{
    BEACON_GUARD_US, BEACON_RESERVED_US, JIT_QUEUE_MAX, PAYLOAD_MAX, TX_JIT_DELAY,
    TX_MARGIN_DELAY, TX_MAX_ADVANCE_DELAY, TX_START_DELAY,
};
use crate::hal::{TxMode, TxPacket};
use crate::time::wrap_diff;

/// Scheduling rejection reported by [`JitQueue::enqueue`].
///
/// Each variant maps one-to-one onto a TX_ACK error token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum JitError {
    /// The queue has no free slot.
    #[error("queue is full")]
    Full,

    /// The target is closer than the minimum programming lead.
    #[error("packet is too late")]
    TooLate,

    /// The target is farther away than the scheduler accepts.
    #[error("packet is too early")]
    TooEarly,

    /// The TX window overlaps an already queued downlink.
    #[error("overlaps a queued downlink")]
    CollisionPacket,

    /// The TX window overlaps a reserved beacon slot.
    #[error("overlaps a beacon slot")]
    CollisionBeacon,

    /// The packet parameters are inconsistent.
    #[error("invalid packet parameters")]
    Invalid,
}

/// Class of a queued transmission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketClass {
    /// Class-A downlink, scheduled on the concentrator counter
    DownlinkA,
    /// Class-B downlink, scheduled from GPS time
    DownlinkB,
    /// Class-C downlink, sent as soon as possible
    DownlinkC,
    /// Network beacon, pre-allocated slot with guard time
    Beacon,
}

/// One reservation in the queue.
#[derive(Debug, Clone)]
pub struct JitEntry {
    pub pkt: TxPacket,
    pub class: PacketClass,
    /// Counter when the entry was admitted, us
    pub enqueued_at: u32,
    /// Window opens this many us before the target
    pub pre_delay: u32,
    /// Window closes this many us after the target
    pub post_delay: u32,
}

impl JitEntry {
    /// True when the TX windows of `self` and `other` intersect under
    /// wrap-safe comparison.
    fn collides_with(&self, other: &JitEntry) -> bool {
        let diff = wrap_diff(self.pkt.count_us, other.pkt.count_us);
        if diff >= 0 {
            (diff as u32) < self.pre_delay + other.post_delay
        } else {
            (diff.unsigned_abs()) < self.post_delay + other.pre_delay
        }
    }
}

/// Bounded ordered queue of future transmissions for one RF chain.
#[derive(Debug, Default)]
pub struct JitQueue {
    nodes: Vec<JitEntry>,
}

impl JitQueue {
    pub fn new() -> Self {
        JitQueue { nodes: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Number of queued entries of the given class.
    pub fn count_class(&self, class: PacketClass) -> usize {
        self.nodes.iter().filter(|n| n.class == class).count()
    }

    /// Read-only view of the resident entries, earliest first.
    pub fn entries(&self) -> &[JitEntry] {
        &self.nodes
    }

    /// Admits a packet against the current counter value `now`.
    ///
    /// The queue is left untouched on any rejection.
    pub fn enqueue(&mut self, now: u32, mut pkt: TxPacket, class: PacketClass) -> Result<(), JitError> {
        if pkt.payload.len() > PAYLOAD_MAX {
            return Err(JitError::Invalid);
        }
        if self.nodes.len() >= JIT_QUEUE_MAX {
            return Err(JitError::Full);
        }

        let toa = time_on_air_us(&pkt)?;
        let (pre_delay, post_delay) = match class {
            PacketClass::Beacon => (BEACON_GUARD_US, BEACON_RESERVED_US),
            _ => (TX_START_DELAY + TX_MARGIN_DELAY, toa + TX_MARGIN_DELAY),
        };

        match pkt.tx_mode {
            TxMode::Immediate => {
                // ASAP packets contend with every scheduled frame on the
                // chain; they are only admitted into an empty queue.
                if !self.nodes.is_empty() {
                    return Err(JitError::CollisionPacket);
                }
                pkt.count_us = now.wrapping_add(TX_START_DELAY + TX_MARGIN_DELAY);
            }
            TxMode::Timestamped | TxMode::OnGps => {
                let ahead = wrap_diff(pkt.count_us, now);
                if ahead < (pre_delay + TX_JIT_DELAY) as i32 {
                    return Err(JitError::TooLate);
                }
                if ahead as i64 > TX_MAX_ADVANCE_DELAY as i64 {
                    return Err(JitError::TooEarly);
                }
            }
        }

        let entry = JitEntry {
            pkt,
            class,
            enqueued_at: now,
            pre_delay,
            post_delay,
        };

        for node in &self.nodes {
            if entry.collides_with(node) {
                if node.class == PacketClass::Beacon || class == PacketClass::Beacon {
                    return Err(JitError::CollisionBeacon);
                }
                return Err(JitError::CollisionPacket);
            }
        }

        // Stable insert by target counter; a beacon slips ahead of a
        // downlink sharing the exact same target.
        let pos = self
            .nodes
            .iter()
            .position(|n| {
                wrap_diff(entry.pkt.count_us, n.pkt.count_us) < 0
                    || (entry.pkt.count_us == n.pkt.count_us
                        && class == PacketClass::Beacon
                        && n.class != PacketClass::Beacon)
            })
            .unwrap_or(self.nodes.len());
        self.nodes.insert(pos, entry);
        Ok(())
    }

    /// Returns the index of the earliest entry whose dispatch window has
    /// opened (target minus pre-delay due within [`TX_JIT_DELAY`]).
    ///
    /// An entry whose target has already passed is still returned; the
    /// dispatcher evicts it and records the failure.
    pub fn peek(&self, now: u32) -> Option<usize> {
        let head = self.nodes.first()?;
        let window_open = head.pkt.count_us.wrapping_sub(head.pre_delay);
        if wrap_diff(window_open, now) <= TX_JIT_DELAY as i32 {
            Some(0)
        } else {
            None
        }
    }

    /// Removes and returns the entry at `index`, preserving the order of
    /// the rest.
    pub fn dequeue(&mut self, index: usize) -> JitEntry {
        self.nodes.remove(index)
    }
}
