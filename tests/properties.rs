// Property tests for the statistical core.

use proptest::prelude::*;
use team_drift_engine::baseline::confidence;
use team_drift_engine::composite::drift_index;
use team_drift_engine::config::BaselineConfig;
use team_drift_engine::{estimate_baseline, normalize_value, percentile, track_streak};

mod strategies {
    use super::*;

    pub fn weekly_values() -> impl Strategy<Value = Vec<f64>> {
        prop::collection::vec(-1_000.0f64..1_000.0, 1..40)
    }
}

fn conventional_median(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

proptest! {
    #[test]
    fn prop_percentile_median_matches_conventional(values in strategies::weekly_values()) {
        let mut sorted = values.clone();
        sorted.sort_by(f64::total_cmp);
        let p50 = percentile(&sorted, 50.0).unwrap();
        prop_assert!((p50 - conventional_median(&values)).abs() < 1e-9);
    }

    #[test]
    fn prop_quartiles_are_ordered(values in strategies::weekly_values()) {
        let baseline = estimate_baseline("meeting_load", &values, None, &BaselineConfig::default());
        let (p25, median, p75) = (
            baseline.p25.unwrap(),
            baseline.median.unwrap(),
            baseline.p75.unwrap(),
        );
        prop_assert!(p25 <= median && median <= p75);
        prop_assert!((0.0..=1.0).contains(&baseline.confidence));
        prop_assert!(baseline.mad.unwrap() >= 0.0);
    }

    #[test]
    fn prop_confidence_grows_with_samples(
        n in 0usize..60,
        extra in 0usize..20,
        expected in 1usize..12,
    ) {
        let config = BaselineConfig::default();
        // Coverage never drops when samples and expectation grow together.
        let smaller = confidence(n, Some(expected.max(n)), &config);
        let larger = confidence(n + extra, Some(expected.max(n) + extra), &config);
        prop_assert!(larger + 1e-12 >= smaller);
        prop_assert_eq!(confidence(0, Some(expected), &config), 0.0);
    }

    #[test]
    fn prop_confidence_grows_with_coverage(n in 1usize..30, gap in 0usize..30, step in 0usize..30) {
        let config = BaselineConfig::default();
        let sparse = confidence(n, Some(n + gap + step), &config);
        let denser = confidence(n, Some(n + gap), &config);
        prop_assert!(denser + 1e-12 >= sparse);
    }

    #[test]
    fn prop_normalize_is_clamped(
        value in -500.0f64..500.0,
        low in -100.0f64..100.0,
        width in 0.0f64..100.0,
    ) {
        let high = low + width;
        let normalized = normalize_value(value, Some(low), Some(high)).unwrap();
        prop_assert!((0.0..=1.0).contains(&normalized));
        if high == low {
            prop_assert_eq!(normalized, 0.5);
        } else if value < low {
            prop_assert_eq!(normalized, 0.0);
        } else if value > high {
            prop_assert_eq!(normalized, 1.0);
        }
    }

    #[test]
    fn prop_drift_index_is_rms(o in 0.0f64..=100.0, e in 0.0f64..=100.0, r in 0.0f64..=100.0) {
        let bdi = drift_index(o, e, r);
        prop_assert!((bdi - ((o * o + e * e + r * r) / 3.0).sqrt()).abs() < 1e-9);
        prop_assert!(bdi <= o.max(e).max(r) + 1e-9);
    }

    #[test]
    fn prop_streak_never_exceeds_trailing_trues(
        flags in prop::collection::vec(any::<bool>(), 0..30),
    ) {
        let streak = track_streak(&flags);
        prop_assert!(streak <= flags.len());
        prop_assert!(flags[flags.len() - streak..].iter().all(|flag| *flag));
        if streak < flags.len() {
            prop_assert!(!flags[flags.len() - streak - 1]);
        }
    }
}
