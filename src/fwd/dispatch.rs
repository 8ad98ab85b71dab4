//! # JIT Dispatcher
//!
//! Polls every JIT queue against the concentrator counter and hands due
//! packets to the radio. Beacon carriers get the XTAL correction applied at
//! the last moment, and an in-progress spectral scan is aborted before any
//! real transmission.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::time::sleep;

use crate::constants::{JIT_POLL_MS, NB_RF_CHAINS};
use crate::error::FwdError;
use crate::fwd::GatewayContext;
use crate::hal::{TxMode, TxStatus};
use crate::jit::PacketClass;
use crate::time::wrap_diff;

pub async fn run(ctx: Arc<GatewayContext>) -> Result<(), FwdError> {
    let poll = Duration::from_millis(JIT_POLL_MS);

    info!("JIT dispatcher started");
    while !ctx.flags.stopping() {
        sleep(poll).await;

        for chain in 0..NB_RF_CHAINS {
            let now = match ctx.concentrator_now().await {
                Ok(now) => now,
                Err(e) => {
                    warn!("cannot read concentrator time: {e}");
                    break;
                }
            };

            let entry = {
                let mut queue = ctx.jit[chain].lock().unwrap();
                match queue.peek(now) {
                    Some(index) => queue.dequeue(index),
                    None => continue,
                }
            };
            let is_beacon = entry.class == PacketClass::Beacon;
            let mut pkt = entry.pkt;

            // An entry whose target has slipped into the past cannot be
            // programmed anymore; evict and account for it.
            if pkt.tx_mode != TxMode::Immediate && wrap_diff(now, pkt.count_us) > 0 {
                warn!(
                    "missed TX window on RF chain {chain} by {} us",
                    wrap_diff(now, pkt.count_us)
                );
                let mut stats = ctx.down_stats.lock().unwrap();
                stats.tx_fail += 1;
                continue;
            }

            // Trim the beacon carrier by the crystal correction right
            // before programming it.
            if is_beacon {
                let factor = ctx.xtal.lock().unwrap().factor();
                pkt.freq_hz = (factor * pkt.freq_hz as f64).round() as u32;
            }

            let mut radio = ctx.radio.lock().await;

            if ctx.scan_in_progress.swap(false, Ordering::SeqCst) {
                if let Err(e) = radio.spectral_scan_abort() {
                    warn!("spectral scan abort failed: {e}");
                }
            }

            match radio.tx_status(chain as u8) {
                Ok(TxStatus::Emitting) => {
                    warn!("RF chain {chain} is emitting, dropping scheduled TX");
                    drop(radio);
                    ctx.down_stats.lock().unwrap().tx_fail += 1;
                    continue;
                }
                Ok(TxStatus::Scheduled) => {
                    warn!("a TX was already scheduled on RF chain {chain}, overwriting");
                }
                Ok(_) => {}
                Err(e) => warn!("TX status check failed: {e}"),
            }

            let sent = radio.send(&pkt);
            drop(radio);

            let mut stats = ctx.down_stats.lock().unwrap();
            match sent {
                Ok(()) => {
                    stats.tx_ok += 1;
                    if is_beacon {
                        stats.beacon_sent += 1;
                        debug!("beacon programmed at count {} for {} Hz", pkt.count_us, pkt.freq_hz);
                    } else {
                        debug!("downlink programmed at count {}", pkt.count_us);
                    }
                }
                Err(e) => {
                    stats.tx_fail += 1;
                    warn!("radio refused TX: {e}");
                }
            }
        }
    }

    info!("JIT dispatcher stopped");
    Ok(())
}
