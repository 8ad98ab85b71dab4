//! # Statistics Reporter
//!
//! Closes the statistics window every `stat_interval` seconds: swaps both
//! counter buckets, logs a dashboard, and leaves a fresh `stat` object in
//! the report buffer for the upstream pipeline to merge into its next
//! PUSH_DATA.

use std::sync::Arc;
use std::time::Duration;

use log::{info, warn};
use tokio::time::sleep;

use crate::error::FwdError;
use crate::fwd::GatewayContext;
use crate::protocol::StatReport;
use crate::stats;

pub async fn run(ctx: Arc<GatewayContext>) -> Result<(), FwdError> {
    let interval_s = ctx.config.gateway.stat_interval;

    info!("statistics reporter started, {interval_s} s window");
    'outer: while !ctx.flags.stopping() {
        // Sleep in one-second slices so shutdown stays prompt.
        for _ in 0..interval_s {
            sleep(Duration::from_secs(1)).await;
            if ctx.flags.stopping() {
                break 'outer;
            }
        }

        let up = stats::take(&ctx.up_stats);
        let down = stats::take(&ctx.down_stats);

        let temp = {
            let mut radio = ctx.radio.lock().await;
            match radio.temperature() {
                Ok(temp) => temp,
                Err(e) => {
                    warn!("temperature read failed: {e}");
                    0.0
                }
            }
        };

        let coords = *ctx.coords.lock().unwrap();
        let report = StatReport {
            time: StatReport::stamp_now(),
            lati: coords.map(|c| (c.latitude * 1e5).round() / 1e5),
            long: coords.map(|c| (c.longitude * 1e5).round() / 1e5),
            alti: coords.map(|c| c.altitude),
            rxnb: up.rx_rcv,
            rxok: up.rx_ok,
            rxfw: up.rx_fwd,
            ackr: up.ack_ratio(),
            dwnb: down.dgram_rcv,
            txnb: down.tx_ok,
            temp: (temp * 10.0).round() / 10.0,
        };

        info!(
            "### RX: {} frames ({} ok, {} bad, {} no-crc), {} forwarded, {} B, ack {:.1}%",
            up.rx_rcv, up.rx_ok, up.rx_bad, up.rx_nocrc, up.rx_fwd, up.payload_bytes,
            up.ack_ratio()
        );
        info!(
            "### TX: {} requested, {} sent, {} failed, rejected {}/{}/{} (late/early/collision)",
            down.tx_requested,
            down.tx_ok,
            down.tx_fail,
            down.rej_too_late,
            down.rej_too_early,
            down.rej_collision
        );
        if ctx.beacon_plan.is_some() {
            info!(
                "### Beacons: {} queued, {} sent, {} rejected",
                down.beacon_queued, down.beacon_sent, down.beacon_rejected
            );
        }
        info!(
            "### Link: {} PULL sent, {} PULL_ACK, board {:.1} C",
            down.pull_sent, down.ack_rcv, temp
        );

        let mut buffer = ctx.report.lock().unwrap();
        buffer.report = Some(report);
        buffer.ready = true;
    }

    info!("statistics reporter stopped");
    Ok(())
}
