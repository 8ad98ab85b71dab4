//! # Background Spectral Scan
//!
//! Opportunistically sweeps the configured channel range with the SX1261
//! companion radio while no transmission is scheduled or in progress. A
//! running scan stays abortable by the JIT dispatcher, which always wins
//! the radio.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use tokio::time::sleep;

use crate::constants::{NB_RF_CHAINS, SPECTRAL_SCAN_STEP_HZ};
use crate::error::FwdError;
use crate::fwd::GatewayContext;
use crate::hal::{ScanStatus, TxStatus};

/// Give up on a scan that has not completed within this budget.
const SCAN_TIMEOUT: Duration = Duration::from_secs(2);

pub async fn run(ctx: Arc<GatewayContext>) -> Result<(), FwdError> {
    let conf = ctx.config.sx130x.sx1261_conf.spectral_scan.clone();
    if !conf.enable || conf.nb_chan == 0 {
        return Ok(());
    }
    let pace = Duration::from_secs(conf.pace_s.max(1) as u64);

    info!(
        "spectral scan started: {} channels from {} Hz",
        conf.nb_chan, conf.freq_start
    );
    'sweep: while !ctx.flags.stopping() {
        for chan in 0..conf.nb_chan {
            if ctx.flags.stopping() {
                break 'sweep;
            }
            let freq_hz = conf.freq_start + chan as u32 * SPECTRAL_SCAN_STEP_HZ;

            if !try_start_scan(&ctx, freq_hz, conf.nb_scan).await {
                sleep(pace).await;
                continue;
            }

            let completed = wait_for_completion(&ctx).await;
            ctx.scan_in_progress.store(false, Ordering::SeqCst);

            if completed {
                let results = ctx.radio.lock().await.spectral_scan_results();
                match results {
                    Ok(histogram) => log_histogram(freq_hz, &histogram),
                    Err(e) => warn!("cannot fetch scan results: {e}"),
                }
            }
            sleep(pace).await;
        }
    }

    info!("spectral scan stopped");
    Ok(())
}

/// Starts a scan if no transmission is scheduled or emitting. Returns
/// false when the radio is busy.
async fn try_start_scan(ctx: &GatewayContext, freq_hz: u32, nb_scan: u16) -> bool {
    let mut radio = ctx.radio.lock().await;

    // Any frame about to dispatch wins the radio over a scan.
    let now = match radio.instcnt() {
        Ok(now) => now,
        Err(e) => {
            warn!("cannot read concentrator time: {e}");
            return false;
        }
    };
    for chain in 0..NB_RF_CHAINS {
        if ctx.jit[chain].lock().unwrap().peek(now).is_some() {
            return false;
        }
        match radio.tx_status(chain as u8) {
            Ok(TxStatus::Scheduled) | Ok(TxStatus::Emitting) => return false,
            _ => {}
        }
    }

    match radio.spectral_scan_start(freq_hz, nb_scan) {
        Ok(()) => {
            ctx.scan_in_progress.store(true, Ordering::SeqCst);
            true
        }
        Err(e) => {
            debug!("scan start at {freq_hz} Hz refused: {e}");
            false
        }
    }
}

/// Polls the scan until completion, abort, or timeout.
async fn wait_for_completion(ctx: &GatewayContext) -> bool {
    let deadline = Instant::now() + SCAN_TIMEOUT;
    loop {
        sleep(Duration::from_millis(10)).await;
        if ctx.flags.stopping() {
            return false;
        }
        // The dispatcher may have aborted the scan under our feet.
        if !ctx.scan_in_progress.load(Ordering::SeqCst) {
            return false;
        }
        let status = ctx.radio.lock().await.spectral_scan_status();
        match status {
            Ok(ScanStatus::Completed) => return true,
            Ok(ScanStatus::Aborted) | Ok(ScanStatus::None) => return false,
            Ok(ScanStatus::OnGoing) => {}
            Err(e) => {
                warn!("scan status poll failed: {e}");
                return false;
            }
        }
        if Instant::now() >= deadline {
            warn!("spectral scan timed out");
            let _ = ctx.radio.lock().await.spectral_scan_abort();
            return false;
        }
    }
}

fn log_histogram(freq_hz: u32, histogram: &[(i16, u16)]) {
    let total: u32 = histogram.iter().map(|&(_, n)| n as u32).sum();
    let floor = histogram
        .iter()
        .filter(|&&(_, n)| n > 0)
        .map(|&(level, _)| level)
        .min();
    debug!(
        "scan {freq_hz} Hz: {total} samples, noise floor {:?} dBm",
        floor
    );
}
