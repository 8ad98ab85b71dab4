//! # GPS Reader
//!
//! Reads the GPS TTY stream, re-frames it into UBX/NMEA messages, and
//! disciplines the shared time reference. Each UBX-NAV-TIMEGPS pairs with
//! the PPS-latched counter register; each valid NMEA RMC refreshes the
//! gateway coordinates.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use log::{debug, error, info, warn};
use tokio::io::AsyncReadExt;
use tokio::time::timeout;
use tokio_serial::SerialPortBuilderExt;

use crate::error::FwdError;
use crate::fwd::{Coords, GatewayContext};
use crate::gps::{drain_buffer, GpsMsg};
use crate::time::TimeRef;

/// GPS modules talk NMEA at this rate out of the box
const GPS_BAUD_RATE: u32 = 9600;

/// A GPS fix claiming to be earlier than this is garbage (2020-03-05)
const GPS_TIME_SANITY_UNIX_S: u64 = 1_583_366_400;

/// System-vs-GPS drift worth telling the operator about
const CLOCK_DRIFT_ALERT: Duration = Duration::from_secs(10);

pub async fn run(ctx: Arc<GatewayContext>) -> Result<(), FwdError> {
    let Some(path) = ctx.config.gateway.gps_tty_path.clone() else {
        info!("no GPS TTY configured, GPS disciplining disabled");
        return Ok(());
    };

    let mut port = tokio_serial::new(path.as_str(), GPS_BAUD_RATE)
        .open_native_async()
        .map_err(|e| FwdError::SerialPort(format!("{path}: {e}")))?;
    info!("reading GPS stream from {path}");

    let mut stream: Vec<u8> = Vec::with_capacity(1024);
    let mut read_buf = [0u8; 256];
    let mut drift_reported = false;

    while !ctx.flags.stopping() {
        let n = match timeout(Duration::from_secs(1), port.read(&mut read_buf)).await {
            Ok(Ok(0)) => {
                warn!("GPS TTY closed");
                break;
            }
            Ok(Ok(n)) => n,
            Ok(Err(e)) => {
                error!("GPS TTY read failed: {e}");
                return Err(FwdError::SerialPort(format!("{path}: {e}")));
            }
            Err(_) => continue,
        };
        stream.extend_from_slice(&read_buf[..n]);

        let mut messages = Vec::new();
        drain_buffer(&mut stream, |msg| messages.push(msg));

        for msg in messages {
            match msg {
                GpsMsg::TimeGps { gps_time, utc } => {
                    handle_timegps(&ctx, gps_time, utc, &mut drift_reported).await;
                }
                GpsMsg::Rmc {
                    latitude,
                    longitude,
                    valid,
                } => {
                    if valid && !ctx.config.gateway.fake_gps {
                        let altitude = ctx.config.gateway.ref_altitude.unwrap_or(0);
                        *ctx.coords.lock().unwrap() = Some(Coords {
                            latitude,
                            longitude,
                            altitude,
                        });
                    }
                }
                GpsMsg::Ignored => {}
            }
        }
    }

    info!("GPS reader stopped");
    Ok(())
}

/// Pairs a TIMEGPS message with the PPS-latched counter and rebuilds the
/// time reference.
async fn handle_timegps(
    ctx: &GatewayContext,
    gps_time: Duration,
    utc: Duration,
    drift_reported: &mut bool,
) {
    let trig_cnt = {
        let mut radio = ctx.radio.lock().await;
        match radio.trigcnt() {
            Ok(cnt) => cnt,
            Err(e) => {
                warn!("cannot read PPS counter: {e}");
                return;
            }
        }
    };

    {
        let mut tref = ctx.time_ref.lock().unwrap();
        let updated = TimeRef::sync(tref.as_ref(), trig_cnt, utc, gps_time);
        debug!(
            "PPS sync at count {trig_cnt}, xtal error {:.9}",
            updated.xtal_err
        );
        *tref = Some(updated);
    }
    ctx.gps_ref_valid.store(true, Ordering::SeqCst);

    // One-shot operator hint when the host clock has wandered; the daemon
    // itself never touches the system clock. Fixes before the sanity date
    // come from receivers still running on a stale almanac and prove
    // nothing about the host clock.
    if !*drift_reported && utc.as_secs() >= GPS_TIME_SANITY_UNIX_S {
        if let Ok(sys_now) = SystemTime::now().duration_since(UNIX_EPOCH) {
            let drift = if sys_now > utc { sys_now - utc } else { utc - sys_now };
            if drift > CLOCK_DRIFT_ALERT {
                warn!(
                    "system clock is {} s away from GPS time, consider fixing it",
                    drift.as_secs()
                );
                *drift_reported = true;
            }
        }
    }
}
