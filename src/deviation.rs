use crate::models::{AdverseDirection, Baseline, DeviationResult, Direction};

/// Rescales MAD to a standard-deviation equivalent under normality.
pub const MAD_SCALE: f64 = 1.4826;

pub fn robust_z(current: f64, baseline: &Baseline) -> Option<f64> {
    let median = baseline.median?;
    let mad = nonzero(baseline.mad)?;
    finite((current - median) / (MAD_SCALE * mad))
}

pub fn standard_z(current: f64, baseline: &Baseline) -> Option<f64> {
    let mean = baseline.mean?;
    let std = nonzero(baseline.std)?;
    finite((current - mean) / std)
}

/// Compare this week's value against its baseline. Degenerate spreads give
/// `None` rather than infinities.
pub fn score_deviation(current_value: f64, baseline: &Baseline) -> DeviationResult {
    let reference = baseline.median;
    let delta_abs = reference.map(|value| current_value - value);
    let delta_pct = nonzero(reference)
        .and_then(|value| finite((current_value - value) / value.abs() * 100.0));

    let direction = match (baseline.p25, baseline.p75) {
        (Some(lower), _) if current_value < lower => Some(Direction::Below),
        (_, Some(upper)) if current_value > upper => Some(Direction::Above),
        _ => None,
    };
    let outside_band = baseline.p25.is_some() && baseline.p75.is_some() && direction.is_some();

    DeviationResult {
        metric_key: baseline.metric_key.clone(),
        current_value,
        robust_z: robust_z(current_value, baseline),
        standard_z: standard_z(current_value, baseline),
        delta_abs,
        delta_pct,
        outside_band,
        direction: if outside_band { direction } else { None },
    }
}

/// Position of `value` inside the interquartile band, clamped to `[0, 1]`.
pub fn normalize_value(value: f64, p25: Option<f64>, p75: Option<f64>) -> Option<f64> {
    let (lower, upper) = (p25?, p75?);
    if upper == lower {
        return Some(0.5);
    }
    Some(((value - lower) / (upper - lower)).clamp(0.0, 1.0))
}

/// 0–100 drift magnitude counting only the metric's adverse side.
///
/// Prefers the robust z-score and falls back to the standard one. A flat
/// baseline has neither, so any adverse move out of its band saturates.
pub fn deviation_magnitude(
    result: &DeviationResult,
    adverse: AdverseDirection,
    z_saturation: f64,
) -> f64 {
    let Some(z) = result.robust_z.or(result.standard_z) else {
        let adverse_exit = match (adverse, result.direction) {
            (AdverseDirection::Either, Some(_)) => true,
            (AdverseDirection::Above, Some(Direction::Above)) => true,
            (AdverseDirection::Below, Some(Direction::Below)) => true,
            _ => false,
        };
        return if result.outside_band && adverse_exit {
            100.0
        } else {
            0.0
        };
    };
    let adverse_z = match adverse {
        AdverseDirection::Above => z.max(0.0),
        AdverseDirection::Below => (-z).max(0.0),
        AdverseDirection::Either => z.abs(),
    };
    (adverse_z / z_saturation * 100.0).clamp(0.0, 100.0)
}

fn nonzero(value: Option<f64>) -> Option<f64> {
    value.filter(|v| *v != 0.0)
}

fn finite(value: f64) -> Option<f64> {
    value.is_finite().then_some(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::baseline::estimate_baseline;
    use crate::config::BaselineConfig;

    fn weekly_baseline() -> Baseline {
        estimate_baseline(
            "meeting_load",
            &[40.0, 42.0, 38.0, 41.0, 39.0, 43.0],
            Some(6),
            &BaselineConfig::default(),
        )
    }

    #[test]
    fn spike_lands_above_the_band() {
        let result = score_deviation(70.0, &weekly_baseline());
        assert!(result.outside_band);
        assert_eq!(result.direction, Some(Direction::Above));
        // (70 - 40.5) / (1.4826 * 1.5)
        let robust = result.robust_z.unwrap();
        assert!((robust - 29.5 / (MAD_SCALE * 1.5)).abs() < 1e-9);
        assert!(robust > 10.0);
        assert_eq!(result.delta_abs, Some(29.5));
        assert!((result.delta_pct.unwrap() - 29.5 / 40.5 * 100.0).abs() < 1e-9);
    }

    #[test]
    fn value_inside_band_has_no_direction() {
        let result = score_deviation(40.0, &weekly_baseline());
        assert!(!result.outside_band);
        assert!(result.direction.is_none());
    }

    #[test]
    fn below_band_is_flagged() {
        let result = score_deviation(20.0, &weekly_baseline());
        assert!(result.outside_band);
        assert_eq!(result.direction, Some(Direction::Below));
        assert!(result.robust_z.unwrap() < 0.0);
    }

    #[test]
    fn both_z_scores_are_zero_at_the_centre() {
        let baseline =
            estimate_baseline("focus_time", &[1.0, 2.0, 3.0], None, &BaselineConfig::default());
        let result = score_deviation(2.0, &baseline);
        assert_eq!(result.robust_z, Some(0.0));
        assert_eq!(result.standard_z, Some(0.0));
    }

    #[test]
    fn flat_baseline_has_no_z_scores() {
        let baseline =
            estimate_baseline("focus_time", &[5.0, 5.0, 5.0], None, &BaselineConfig::default());
        let result = score_deviation(9.0, &baseline);
        assert!(result.robust_z.is_none());
        assert!(result.standard_z.is_none());
        assert!(result.outside_band);
    }

    #[test]
    fn zero_reference_suppresses_percentage() {
        let baseline =
            estimate_baseline("after_hours", &[0.0, 0.0, 0.0], None, &BaselineConfig::default());
        let result = score_deviation(3.0, &baseline);
        assert_eq!(result.delta_abs, Some(3.0));
        assert!(result.delta_pct.is_none());
    }

    #[test]
    fn empty_baseline_yields_absent_fields() {
        let baseline = Baseline::empty("participation", 6);
        let result = score_deviation(3.0, &baseline);
        assert!(result.robust_z.is_none());
        assert!(result.standard_z.is_none());
        assert!(result.delta_abs.is_none());
        assert!(!result.outside_band);
        assert!(result.direction.is_none());
    }

    #[test]
    fn normalize_clamps_and_handles_flat_band() {
        assert_eq!(normalize_value(1.0, Some(2.0), Some(4.0)), Some(0.0));
        assert_eq!(normalize_value(9.0, Some(2.0), Some(4.0)), Some(1.0));
        assert_eq!(normalize_value(3.0, Some(2.0), Some(4.0)), Some(0.5));
        assert_eq!(normalize_value(100.0, Some(3.0), Some(3.0)), Some(0.5));
        assert_eq!(normalize_value(3.0, None, Some(4.0)), None);
    }

    #[test]
    fn magnitude_counts_only_the_adverse_side() {
        let baseline = weekly_baseline();
        let spike = score_deviation(70.0, &baseline);
        let dip = score_deviation(20.0, &baseline);

        assert_eq!(deviation_magnitude(&spike, AdverseDirection::Above, 3.0), 100.0);
        assert_eq!(deviation_magnitude(&spike, AdverseDirection::Below, 3.0), 0.0);
        assert_eq!(deviation_magnitude(&dip, AdverseDirection::Below, 3.0), 100.0);
        assert_eq!(deviation_magnitude(&dip, AdverseDirection::Either, 3.0), 100.0);

        let mild = score_deviation(41.5, &baseline);
        let expected = (1.0 / (MAD_SCALE * 1.5)) / 3.0 * 100.0;
        let magnitude = deviation_magnitude(&mild, AdverseDirection::Above, 3.0);
        assert!((magnitude - expected).abs() < 1e-9);
    }

    #[test]
    fn flat_baseline_jump_saturates_on_the_adverse_side() {
        let baseline =
            estimate_baseline("after_hours", &[0.0; 6], Some(6), &BaselineConfig::default());
        let jump = score_deviation(40.0, &baseline);
        assert!(jump.robust_z.is_none() && jump.standard_z.is_none());
        assert_eq!(deviation_magnitude(&jump, AdverseDirection::Above, 3.0), 100.0);
        assert_eq!(deviation_magnitude(&jump, AdverseDirection::Either, 3.0), 100.0);
        assert_eq!(deviation_magnitude(&jump, AdverseDirection::Below, 3.0), 0.0);

        let steady = score_deviation(0.0, &baseline);
        assert_eq!(deviation_magnitude(&steady, AdverseDirection::Above, 3.0), 0.0);
    }
}
