//! # Counter Time Discipline
//!
//! Wrap-safe arithmetic for the concentrator's free-running 32-bit
//! microsecond counter, and the GPS time reference used to translate
//! counter values to UTC / GPS time and back.
//!
//! The counter wraps every ~71.6 minutes. Every ordering decision in the
//! scheduler goes through [`wrap_diff`] / [`less_recent`]; no code compares
//! raw counter values directly.

pub mod xtal;

pub use xtal::XtalFilter;

use std::time::{Duration, SystemTime};

use crate::constants::GPS_REF_MAX_AGE;

/// Signed difference `(a - b) mod 2^32`, interpreted as i32.
///
/// Negative means `a` is in the past relative to `b`.
#[inline]
pub fn wrap_diff(a: u32, b: u32) -> i32 {
    a.wrapping_sub(b) as i32
}

/// Wrap-safe ordering predicate: true when `a` precedes `b` on the counter.
#[inline]
pub fn less_recent(a: u32, b: u32) -> bool {
    wrap_diff(a, b) < 0
}

/// Time reference binding a concentrator counter capture to GPS time.
///
/// Rebuilt on every PPS-aligned UBX-NAV-TIMEGPS message; stale after
/// [`GPS_REF_MAX_AGE`] seconds without a new fix.
#[derive(Debug, Clone)]
pub struct TimeRef {
    /// System wall time when the reference was taken
    pub systime: SystemTime,
    /// Counter latched on the PPS edge, us
    pub count_us: u32,
    /// UTC time of the PPS edge, as duration since the Unix epoch
    pub utc: Duration,
    /// GPS time of the PPS edge, as duration since the GPS epoch (06-Jan-1980)
    pub gps_time: Duration,
    /// Raw crystal error slope against GPS, counter us per true us
    pub xtal_err: f64,
}

/// Largest plausible deviation of the XTAL slope from 1.0. A slope outside
/// this band means a missed PPS or a counter glitch, not crystal drift.
const XTAL_ERR_MAX_DEVIATION: f64 = 1e-3;

impl TimeRef {
    /// Builds a new reference from a PPS capture.
    ///
    /// The crystal error slope is fitted between this capture and the
    /// previous one; an implausible slope (missed PPS, counter wrap glitch)
    /// keeps the previous estimate.
    pub fn sync(prev: Option<&TimeRef>, count_us: u32, utc: Duration, gps_time: Duration) -> TimeRef {
        let xtal_err = match prev {
            Some(p) if gps_time > p.gps_time => {
                let cnt_diff = wrap_diff(count_us, p.count_us) as f64;
                let gps_diff_us = (gps_time - p.gps_time).as_secs_f64() * 1e6;
                let slope = cnt_diff / gps_diff_us;
                if (slope - 1.0).abs() < XTAL_ERR_MAX_DEVIATION {
                    slope
                } else {
                    p.xtal_err
                }
            }
            Some(p) => p.xtal_err,
            None => 1.0,
        };
        TimeRef {
            systime: SystemTime::now(),
            count_us,
            utc,
            gps_time,
            xtal_err,
        }
    }

    /// Age of the reference against the system clock.
    pub fn age(&self) -> Duration {
        self.systime.elapsed().unwrap_or(Duration::MAX)
    }

    /// True while the reference is fresh enough to schedule against.
    pub fn is_valid(&self) -> bool {
        self.age() <= Duration::from_secs(GPS_REF_MAX_AGE)
    }

    /// Translates a counter value to GPS time.
    pub fn cnt2gps(&self, count_us: u32) -> Duration {
        let delta_us = wrap_diff(count_us, self.count_us) as f64 / self.xtal_err;
        apply_delta_us(self.gps_time, delta_us)
    }

    /// Translates a counter value to UTC (duration since the Unix epoch).
    pub fn cnt2utc(&self, count_us: u32) -> Duration {
        let delta_us = wrap_diff(count_us, self.count_us) as f64 / self.xtal_err;
        apply_delta_us(self.utc, delta_us)
    }

    /// Translates a GPS time to the corresponding counter value.
    pub fn gps2cnt(&self, gps_time: Duration) -> u32 {
        let delta_s = gps_time.as_secs_f64() - self.gps_time.as_secs_f64();
        let delta_cnt = (delta_s * 1e6 * self.xtal_err).round() as i64;
        self.count_us.wrapping_add(delta_cnt as u32)
    }
}

fn apply_delta_us(base: Duration, delta_us: f64) -> Duration {
    let total = base.as_secs_f64() + delta_us / 1e6;
    if total <= 0.0 {
        return Duration::ZERO;
    }
    Duration::from_secs_f64(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrap_diff_plain() {
        assert_eq!(wrap_diff(2_000_000, 1_000_000), 1_000_000);
        assert_eq!(wrap_diff(1_000_000, 2_000_000), -1_000_000);
    }

    #[test]
    fn test_wrap_diff_across_rollover() {
        // 100 us after the wrap vs 100 us before it
        assert_eq!(wrap_diff(100, u32::MAX - 99), 200);
        assert_eq!(wrap_diff(u32::MAX - 99, 100), -200);
        assert!(less_recent(u32::MAX - 99, 100));
        assert!(!less_recent(100, u32::MAX - 99));
    }

    fn reference(count_us: u32, gps_s: u64) -> TimeRef {
        TimeRef {
            systime: SystemTime::now(),
            count_us,
            utc: Duration::from_secs(1_700_000_000),
            gps_time: Duration::from_secs(gps_s),
            xtal_err: 1.0,
        }
    }

    #[test]
    fn test_gps2cnt_cnt2gps_round_trip() {
        let tref = reference(5_000_000, 1_000);
        let target = Duration::from_millis(1_002_500);
        let cnt = tref.gps2cnt(target);
        assert_eq!(cnt, 5_000_000 + 2_500_000);
        let back = tref.cnt2gps(cnt);
        assert!((back.as_secs_f64() - target.as_secs_f64()).abs() < 1e-6);
    }

    #[test]
    fn test_gps2cnt_wraps() {
        let tref = reference(u32::MAX - 1_000_000, 1_000);
        // 3 s ahead lands past the counter rollover
        let cnt = tref.gps2cnt(Duration::from_secs(1_003));
        assert_eq!(wrap_diff(cnt, tref.count_us), 3_000_000);
    }

    #[test]
    fn test_sync_fits_slope() {
        let prev = reference(0, 1_000);
        // One second of GPS time, one second and 50 us of counter
        let tref = TimeRef::sync(
            Some(&prev),
            1_000_050,
            Duration::from_secs(1_700_000_001),
            Duration::from_secs(1_001),
        );
        assert!((tref.xtal_err - 1.000_05).abs() < 1e-9);
    }

    #[test]
    fn test_sync_rejects_implausible_slope() {
        let mut prev = reference(0, 1_000);
        prev.xtal_err = 1.000_02;
        // Two whole counter seconds across one GPS second: a missed PPS
        let tref = TimeRef::sync(
            Some(&prev),
            2_000_000,
            Duration::from_secs(1_700_000_001),
            Duration::from_secs(1_001),
        );
        assert_eq!(tref.xtal_err, 1.000_02);
    }
}
