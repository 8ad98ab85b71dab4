//! # Upstream Pipeline
//!
//! Polls the concentrator for received frames, filters them by CRC policy,
//! serializes them as `rxpk` objects together with any pending status
//! report, and pushes the datagram to the server. Each PUSH_DATA waits for
//! its PUSH_ACK in two half-timeout rounds so a late ACK still counts
//! without stalling the fetch loop.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};
use tokio::net::UdpSocket;
use tokio::time::{sleep, timeout};

use crate::constants::{DATAGRAM_MAX, FETCH_SLEEP_MS, NB_PKT_MAX};
use crate::error::FwdError;
use crate::fwd::GatewayContext;
use crate::hal::CrcStatus;
use crate::protocol::{PushAck, PushData, PushPayload, RxPk};

pub async fn run(ctx: Arc<GatewayContext>, sock: Arc<UdpSocket>) -> Result<(), FwdError> {
    let push_timeout_half =
        Duration::from_millis((ctx.config.gateway.push_timeout_ms / 2).max(1));
    let fetch_sleep = Duration::from_millis(FETCH_SLEEP_MS);
    let mut ack_buf = [0u8; DATAGRAM_MAX];

    info!("upstream pipeline started");
    while !ctx.flags.stopping() {
        // Fetch under the radio mutex; a receive failure is fatal.
        let packets = {
            let mut radio = ctx.radio.lock().await;
            match radio.receive(NB_PKT_MAX) {
                Ok(packets) => packets,
                Err(e) => {
                    error!("frame fetch failed, shutting down: {e}");
                    ctx.flags.request_exit();
                    return Err(e);
                }
            }
        };

        let time_ref = ctx.valid_time_ref();
        let gateway = &ctx.config.gateway;

        let mut rxpks = Vec::new();
        let mut fwd_bytes = 0u64;
        {
            let mut stats = ctx.up_stats.lock().unwrap();
            for pkt in &packets {
                stats.rx_rcv += 1;
                let forward = match pkt.crc_status {
                    CrcStatus::Ok => {
                        stats.rx_ok += 1;
                        gateway.forward_crc_valid
                    }
                    CrcStatus::Bad => {
                        stats.rx_bad += 1;
                        gateway.forward_crc_error
                    }
                    CrcStatus::NoCrc => {
                        stats.rx_nocrc += 1;
                        gateway.forward_crc_disabled
                    }
                };
                if !forward {
                    continue;
                }
                stats.rx_fwd += 1;
                fwd_bytes += pkt.payload.len() as u64;
                rxpks.push(RxPk::from_packet(pkt, time_ref.as_ref()));
            }
            stats.payload_bytes += fwd_bytes;
        }

        // Consume a pending status report, if the reporter left one.
        let stat = {
            let mut report = ctx.report.lock().unwrap();
            if report.ready {
                report.ready = false;
                report.report.take()
            } else {
                None
            }
        };

        if rxpks.is_empty() && stat.is_none() {
            sleep(fetch_sleep).await;
            continue;
        }

        let token = rand::random::<u16>();
        let push = PushData {
            token,
            gateway_eui: ctx.eui,
            payload: PushPayload {
                rxpk: if rxpks.is_empty() { None } else { Some(rxpks) },
                stat,
            },
        };
        let dgram = push.to_bytes()?;
        debug!("PUSH_DATA: {}", String::from_utf8_lossy(&dgram[12..]));

        if let Err(e) = sock.send(&dgram).await {
            warn!("PUSH_DATA send failed: {e}");
            continue;
        }
        {
            let mut stats = ctx.up_stats.lock().unwrap();
            stats.dgram_sent += 1;
            stats.network_bytes += dgram.len() as u64;
        }

        // Two half-waits catch a late ACK without halving throughput on a
        // miss.
        for _ in 0..2 {
            let received = match timeout(push_timeout_half, sock.recv(&mut ack_buf)).await {
                Ok(Ok(n)) => n,
                Ok(Err(e)) => {
                    warn!("upstream socket error: {e}");
                    break;
                }
                Err(_) => continue,
            };
            match PushAck::from_bytes(&ack_buf[..received]) {
                Ok(ack) if ack.token == token => {
                    ctx.up_stats.lock().unwrap().ack_rcv += 1;
                    break;
                }
                Ok(_) => debug!("PUSH_ACK with stale token, ignoring"),
                Err(e) => debug!("ignoring datagram on upstream socket: {e}"),
            }
        }
    }

    info!("upstream pipeline stopped");
    Ok(())
}
