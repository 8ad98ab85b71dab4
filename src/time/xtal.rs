//! # XTAL Correction Filter
//!
//! Two-phase estimator of the concentrator crystal frequency error. The
//! raw per-PPS slope samples from the GPS discipline loop are first
//! averaged over [`XERR_INIT_AVG`] samples to seed the correction, then
//! tracked with a first-order IIR. The resulting factor multiplies the
//! beacon carrier frequency right before dispatch.

use crate::constants::{XERR_FILT_COEF, XERR_INIT_AVG};

/// Exponentially-filtered crystal correction factor.
#[derive(Debug, Clone)]
pub struct XtalFilter {
    nb_samples: usize,
    acc: f64,
    factor: f64,
    stable: bool,
}

impl XtalFilter {
    pub fn new() -> Self {
        XtalFilter {
            nb_samples: 0,
            acc: 0.0,
            factor: 1.0,
            stable: false,
        }
    }

    /// Drops all accumulated state. Called when the time reference goes
    /// stale, so the next lock re-seeds from a fresh average.
    pub fn reset(&mut self) {
        *self = XtalFilter::new();
    }

    /// Feeds one raw crystal-error sample (counter us per true us).
    ///
    /// While seeding, samples accumulate into an arithmetic mean whose
    /// inverse becomes the initial correction. Once stable, the correction
    /// tracks `1/sample` through the IIR `c <- c - c/K + (1/sample)/K`.
    pub fn update(&mut self, xtal_err: f64) {
        if !self.stable {
            self.acc += xtal_err;
            self.nb_samples += 1;
            if self.nb_samples >= XERR_INIT_AVG {
                self.factor = self.nb_samples as f64 / self.acc;
                self.stable = true;
            }
        } else {
            self.factor = self.factor - self.factor / XERR_FILT_COEF
                + (1.0 / xtal_err) / XERR_FILT_COEF;
        }
    }

    /// Current multiplicative correction, 1.0 until stable.
    pub fn factor(&self) -> f64 {
        self.factor
    }

    /// True once the initial average has been consumed.
    pub fn is_stable(&self) -> bool {
        self.stable
    }
}

impl Default for XtalFilter {
    fn default() -> Self {
        Self::new()
    }
}
