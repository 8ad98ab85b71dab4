//! # Time Reference Validator
//!
//! Runs at 1 Hz: downgrades the GPS time reference when it goes stale and
//! feeds fresh crystal-error samples into the XTAL correction filter. The
//! correction is dropped back to unity whenever the reference is lost, so
//! a later lock re-seeds from a clean average.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::time::sleep;

use crate::error::FwdError;
use crate::fwd::GatewayContext;

pub async fn run(ctx: Arc<GatewayContext>) -> Result<(), FwdError> {
    // Counter capture of the last sample fed to the filter; one PPS, one
    // sample.
    let mut last_fed: Option<u32> = None;
    let mut was_valid = false;

    info!("time reference validator started");
    while !ctx.flags.stopping() {
        sleep(Duration::from_secs(1)).await;

        let snapshot = ctx.time_ref.lock().unwrap().clone();
        match snapshot {
            Some(tref) if tref.is_valid() => {
                if !was_valid {
                    info!("GPS time reference is locked");
                    was_valid = true;
                }
                ctx.gps_ref_valid.store(true, Ordering::SeqCst);
                if last_fed != Some(tref.count_us) {
                    let mut xtal = ctx.xtal.lock().unwrap();
                    xtal.update(tref.xtal_err);
                    if xtal.is_stable() {
                        debug!("XTAL correction {:.9}", xtal.factor());
                    }
                    last_fed = Some(tref.count_us);
                }
            }
            _ => {
                if was_valid {
                    warn!("GPS time reference lost");
                    was_valid = false;
                }
                ctx.gps_ref_valid.store(false, Ordering::SeqCst);
                ctx.xtal.lock().unwrap().reset();
                last_fed = None;
            }
        }
    }

    info!("time reference validator stopped");
    Ok(())
}
