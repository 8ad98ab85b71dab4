//! # Downstream Pipeline
//!
//! Keeps the PULL_DATA heartbeat session alive, refills the beacon queue,
//! validates every PULL_RESP against the radio plan, enqueues the TX
//! request just-in-time, and answers each request with a TX_ACK in
//! processing order.

use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use tokio::net::UdpSocket;
use tokio::time::timeout;

use crate::beacon;
use crate::constants::{
    DATAGRAM_MAX, JIT_NUM_BEACON_IN_QUEUE, PKT_PULL_ACK, PKT_PULL_RESP, PULL_TIMEOUT_MS,
};
use crate::error::FwdError;
use crate::fwd::GatewayContext;
use crate::jit::{JitError, PacketClass};
use crate::protocol::{
    jit_error_token, peek_kind, PullAck, PullData, PullResp, TxAck, TxAckInfo, TxPk,
};
use crate::protocol::pull::TxTiming;

pub async fn run(ctx: Arc<GatewayContext>, sock: Arc<UdpSocket>) -> Result<(), FwdError> {
    let keepalive = Duration::from_secs(ctx.config.gateway.keepalive_interval);
    let autoquit_threshold = ctx.config.gateway.autoquit_threshold;
    let mut recv_buf = [0u8; DATAGRAM_MAX];

    let mut last_pull: Option<Instant> = None;
    let mut pull_token = 0u16;
    let mut pull_acked = true;
    let mut autoquit_cnt = 0u32;
    let mut next_beacon_gps: Option<u64> = None;

    info!("downstream pipeline started");
    while !ctx.flags.stopping() {
        // Heartbeat, with the autoquit escalation on silence.
        if last_pull.map(|t| t.elapsed() >= keepalive).unwrap_or(true) {
            if !pull_acked {
                autoquit_cnt += 1;
                if autoquit_threshold > 0 && autoquit_cnt >= autoquit_threshold {
                    warn!("{autoquit_cnt} PULL_DATA without PULL_ACK, exiting");
                    ctx.flags.request_exit();
                    break;
                }
            }
            pull_token = rand::random::<u16>();
            let pull = PullData {
                token: pull_token,
                gateway_eui: ctx.eui,
            };
            match sock.send(&pull.to_bytes()).await {
                Ok(_) => {
                    pull_acked = false;
                    ctx.down_stats.lock().unwrap().pull_sent += 1;
                }
                Err(e) => warn!("PULL_DATA send failed: {e}"),
            }
            last_pull = Some(Instant::now());
        }

        // Keep the beacon queue topped up while the heartbeat is idle.
        refill_beacons(&ctx, &mut next_beacon_gps).await;

        let received = match timeout(
            Duration::from_millis(PULL_TIMEOUT_MS),
            sock.recv(&mut recv_buf),
        )
        .await
        {
            Ok(Ok(n)) => n,
            Ok(Err(e)) => {
                warn!("downstream socket error: {e}");
                continue;
            }
            Err(_) => continue,
        };
        let dgram = &recv_buf[..received];

        match peek_kind(dgram) {
            Some(PKT_PULL_ACK) => match PullAck::from_bytes(dgram) {
                Ok(ack) if ack.token == pull_token => {
                    pull_acked = true;
                    autoquit_cnt = 0;
                    ctx.down_stats.lock().unwrap().ack_rcv += 1;
                }
                Ok(_) => debug!("PULL_ACK with stale token, ignoring"),
                Err(e) => debug!("invalid PULL_ACK: {e}"),
            },
            Some(PKT_PULL_RESP) => {
                {
                    let mut stats = ctx.down_stats.lock().unwrap();
                    stats.dgram_rcv += 1;
                    stats.network_bytes += received as u64;
                }
                handle_pull_resp(&ctx, &sock, dgram).await;
            }
            _ => debug!(
                "ignoring datagram on downstream socket: {}",
                hex::encode(&dgram[..received.min(16)])
            ),
        }
    }

    info!("downstream pipeline stopped");
    Ok(())
}

/// Validates one PULL_RESP and answers it with a TX_ACK. Requests that do
/// not even parse are dropped; everything else gets an answer.
async fn handle_pull_resp(ctx: &GatewayContext, sock: &UdpSocket, dgram: &[u8]) {
    let resp = match PullResp::from_bytes(dgram) {
        Ok(resp) => resp,
        Err(e) => {
            warn!("ignoring malformed PULL_RESP: {e}");
            return;
        }
    };

    // Requests that cannot even be decoded are dropped per the recoverable
    // error policy; decoded requests always get an answer.
    let Some(info) = admit_tx_request(ctx, &resp.txpk).await else {
        return;
    };
    let ack = TxAck {
        token: resp.token,
        gateway_eui: ctx.eui,
        info,
    };
    match ack.to_bytes() {
        Ok(bytes) => {
            if let Err(e) = sock.send(&bytes).await {
                warn!("TX_ACK send failed: {e}");
            }
        }
        Err(e) => warn!("TX_ACK encode failed: {e}"),
    }
}

/// Runs the full admission chain of a TX request. Returns the TX_ACK
/// outcome, or `None` when the request was too malformed to answer.
async fn admit_tx_request(ctx: &GatewayContext, txpk: &TxPk) -> Option<TxAckInfo> {
    // Scheduling mode first: it decides the packet class and, for class B,
    // needs the GPS time reference.
    let timing = match txpk.timing() {
        Ok(timing) => timing,
        Err(e) => {
            warn!("ignoring txpk: {e}");
            return None;
        }
    };

    let mut pkt = match txpk.to_tx_packet() {
        Ok(pkt) => pkt,
        Err(e) => {
            warn!("ignoring txpk: {e}");
            return None;
        }
    };

    let class = match timing {
        TxTiming::Immediate => PacketClass::DownlinkC,
        TxTiming::OnCounter(count_us) => {
            pkt.count_us = count_us;
            PacketClass::DownlinkA
        }
        TxTiming::OnGpsTime(tmms) => {
            let Some(tref) = ctx.valid_time_ref() else {
                debug!("class-B downlink while GPS is unlocked");
                return Some(TxAckInfo::error("GPS_UNLOCKED"));
            };
            pkt.count_us = tref.gps2cnt(Duration::from_millis(tmms));
            PacketClass::DownlinkB
        }
    };

    // Radio plan checks: chain exists, may transmit, frequency in range.
    let Some(radio) = ctx.config.radio(pkt.rf_chain) else {
        warn!("txpk requests unknown RF chain {}", pkt.rf_chain);
        return Some(TxAckInfo::error("TX_FREQ"));
    };
    if !radio.tx_enable {
        warn!("txpk requests RF chain {} which is RX only", pkt.rf_chain);
        return Some(TxAckInfo::error("TX_FREQ"));
    }
    if !radio.tx_freq_in_range(pkt.freq_hz) {
        warn!(
            "txpk frequency {} Hz outside [{}, {}]",
            pkt.freq_hz, radio.tx_freq_min, radio.tx_freq_max
        );
        return Some(TxAckInfo::error("TX_FREQ"));
    }

    // Power plan: round down into the gain table, warn when not exact.
    let requested_power = pkt.rf_power;
    let mut power_warn = false;
    if let Some(chosen) = radio.select_power(requested_power) {
        if chosen != requested_power {
            debug!("requested {requested_power} dBm, programming {chosen} dBm");
            power_warn = true;
        }
        pkt.rf_power = chosen;
    }
    let chosen_power = pkt.rf_power;

    let now = match ctx.concentrator_now().await {
        Ok(now) => now,
        Err(e) => {
            warn!("cannot read concentrator time: {e}");
            return Some(TxAckInfo::error("TOO_LATE"));
        }
    };

    let rf_chain = pkt.rf_chain as usize;
    let result = ctx.jit[rf_chain].lock().unwrap().enqueue(now, pkt, class);
    let mut stats = ctx.down_stats.lock().unwrap();
    match result {
        Ok(()) => {
            stats.tx_requested += 1;
            if power_warn {
                Some(TxAckInfo::warn("TX_POWER", chosen_power))
            } else {
                Some(TxAckInfo::default())
            }
        }
        Err(e) => {
            stats.record_rejection(e);
            debug!("JIT rejected downlink: {e}");
            Some(TxAckInfo::error(jit_error_token(e)))
        }
    }
}

/// Keeps up to [`JIT_NUM_BEACON_IN_QUEUE`] future beacon slots reserved
/// while the time reference is valid.
async fn refill_beacons(ctx: &GatewayContext, next_gps: &mut Option<u64>) {
    let Some(plan) = &ctx.beacon_plan else {
        return;
    };
    let Some(rf_chain) = ctx.tx_rf_chain() else {
        return;
    };
    let Some(tref) = ctx.valid_time_ref() else {
        // The schedule restarts from scratch at the next GPS lock.
        *next_gps = None;
        return;
    };

    let now_gps = tref.gps_time + tref.age();
    let mut next = match *next_gps {
        Some(next) if next > now_gps.as_secs() => next,
        _ => beacon::next_slot(now_gps, plan.period_s),
    };

    loop {
        if ctx.flags.stopping() {
            break;
        }
        let queued = ctx.jit[rf_chain as usize]
            .lock()
            .unwrap()
            .count_class(PacketClass::Beacon);
        if queued >= JIT_NUM_BEACON_IN_QUEUE {
            break;
        }

        let (latitude, longitude) = match *ctx.coords.lock().unwrap() {
            Some(coords) => (coords.latitude, coords.longitude),
            None => (0.0, 0.0),
        };
        let mut pkt = match beacon::build_tx_packet(plan, next, latitude, longitude, rf_chain) {
            Ok(pkt) => pkt,
            Err(e) => {
                warn!("cannot build beacon: {e}");
                break;
            }
        };
        pkt.count_us = tref.gps2cnt(Duration::from_secs(next));

        let now = match ctx.concentrator_now().await {
            Ok(now) => now,
            Err(e) => {
                warn!("cannot read concentrator time: {e}");
                break;
            }
        };

        let result = ctx.jit[rf_chain as usize]
            .lock()
            .unwrap()
            .enqueue(now, pkt, PacketClass::Beacon);
        match result {
            Ok(()) => {
                debug!(
                    "beacon queued for GPS time {next} s at {} Hz",
                    beacon::frequency_hz(plan, next)
                );
                ctx.down_stats.lock().unwrap().beacon_queued += 1;
                next += plan.period_s as u64;
            }
            // The queue horizon is reached; try again next loop.
            Err(JitError::TooEarly) | Err(JitError::Full) => break,
            Err(e) => {
                // Slot lost to a downlink or to time already passed; skip
                // to the following slot.
                debug!("beacon slot at {next} s refused: {e}");
                ctx.down_stats.lock().unwrap().beacon_rejected += 1;
                next += plan.period_s as u64;
            }
        }
    }

    *next_gps = Some(next);
}
