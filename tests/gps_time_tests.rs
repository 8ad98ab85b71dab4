//! Time-discipline tests: wrap-safe counter arithmetic, time reference
//! freshness, counter/GPS conversions, and convergence of the XTAL
//! correction filter.

use std::time::{Duration, SystemTime};

use proptest::prelude::*;

use pktfwd_rs::constants::{GPS_REF_MAX_AGE, XERR_FILT_COEF, XERR_INIT_AVG};
use pktfwd_rs::{less_recent, wrap_diff, TimeRef, XtalFilter};

proptest! {
    /// wrap_diff is an anti-symmetric shift-invariant ordering.
    #[test]
    fn prop_wrap_diff_shift_invariant(a in any::<u32>(), b in any::<u32>(), shift in any::<u32>()) {
        prop_assert_eq!(
            wrap_diff(a, b),
            wrap_diff(a.wrapping_add(shift), b.wrapping_add(shift))
        );
        if wrap_diff(a, b) != i32::MIN {
            prop_assert_eq!(wrap_diff(a, b), -wrap_diff(b, a));
        }
    }

    /// Within the half-range, less_recent agrees with plain ordering on
    /// the unwrapped timeline.
    #[test]
    fn prop_less_recent_matches_unwrapped(base in any::<u32>(), ahead in 1u32..i32::MAX as u32) {
        let later = base.wrapping_add(ahead);
        prop_assert!(less_recent(base, later));
        prop_assert!(!less_recent(later, base));
    }

    /// gps2cnt and cnt2gps invert each other to microsecond precision for
    /// targets within the scheduling horizon.
    #[test]
    fn prop_gps_cnt_round_trip(
        count_us in any::<u32>(),
        gps_s in 1_000_000_000u64..1_500_000_000,
        ahead_ms in 0u64..1_000_000,
        err_ppm in -100i32..100,
    ) {
        let tref = TimeRef {
            systime: SystemTime::now(),
            count_us,
            utc: Duration::from_secs(1_700_000_000),
            gps_time: Duration::from_secs(gps_s),
            xtal_err: 1.0 + err_ppm as f64 * 1e-6,
        };
        let target = Duration::from_secs(gps_s) + Duration::from_millis(ahead_ms);
        let cnt = tref.gps2cnt(target);
        let back = tref.cnt2gps(cnt);
        let delta = (back.as_secs_f64() - target.as_secs_f64()).abs();
        prop_assert!(delta < 2e-6, "round trip error {delta}");
    }

    /// For a constant error sample, the filter converges to its inverse
    /// once seeded and settles within a few filter time constants.
    #[test]
    fn prop_xtal_filter_converges(err_ppm in -100i32..100) {
        let sample = 1.0 + err_ppm as f64 * 1e-6;
        let mut filter = XtalFilter::new();
        for _ in 0..XERR_INIT_AVG {
            filter.update(sample);
        }
        prop_assert!(filter.is_stable());
        for _ in 0..(XERR_FILT_COEF as usize) * 14 {
            filter.update(sample);
        }
        let target = 1.0 / sample;
        prop_assert!((filter.factor() - target).abs() < 1e-9);
    }
}

#[test]
fn time_ref_freshness_window() {
    let mut tref = TimeRef {
        systime: SystemTime::now(),
        count_us: 0,
        utc: Duration::from_secs(1_700_000_000),
        gps_time: Duration::from_secs(1_400_000_000),
        xtal_err: 1.0,
    };
    assert!(tref.is_valid());

    tref.systime = SystemTime::now() - Duration::from_secs(GPS_REF_MAX_AGE - 1);
    assert!(tref.is_valid());

    tref.systime = SystemTime::now() - Duration::from_secs(GPS_REF_MAX_AGE + 1);
    assert!(!tref.is_valid());
}

#[test]
fn xtal_reset_requires_fresh_seed() {
    let mut filter = XtalFilter::new();
    for _ in 0..XERR_INIT_AVG {
        filter.update(1.000_05);
    }
    assert!(filter.is_stable());

    filter.reset();
    assert!(!filter.is_stable());
    assert_eq!(filter.factor(), 1.0);

    // Half a seed is not enough
    for _ in 0..XERR_INIT_AVG / 2 {
        filter.update(1.000_05);
    }
    assert!(!filter.is_stable());
}

#[test]
fn cnt2utc_tracks_reference_offset() {
    let tref = TimeRef {
        systime: SystemTime::now(),
        count_us: 1_000_000,
        utc: Duration::from_secs(1_700_000_000),
        gps_time: Duration::from_secs(1_400_000_000),
        xtal_err: 1.0,
    };
    let utc = tref.cnt2utc(3_500_000);
    assert_eq!(utc.as_secs(), 1_700_000_002);
    assert_eq!(utc.subsec_micros(), 500_000);
}
