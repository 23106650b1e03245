use crate::config::BaselineConfig;
use crate::models::Baseline;

/// Days per week; the sample factor saturates at one sample per day of the window.
const DAYS_PER_WEEK: f64 = 7.0;
const COVERAGE_WEIGHT: f64 = 0.6;
const SAMPLE_WEIGHT: f64 = 0.4;

/// Linear-interpolated percentile over an ascending slice.
///
/// Returns `None` for an empty slice.
pub fn percentile(sorted: &[f64], p: f64) -> Option<f64> {
    match sorted.len() {
        0 => None,
        1 => Some(sorted[0]),
        n => {
            let idx = (p.clamp(0.0, 100.0) / 100.0) * (n - 1) as f64;
            let lower = idx.floor() as usize;
            let upper = idx.ceil() as usize;
            let fraction = idx - lower as f64;
            Some(sorted[lower] + (sorted[upper] - sorted[lower]) * fraction)
        }
    }
}

/// Robust descriptive statistics over a trailing window of weekly values.
///
/// Non-finite values are dropped and count as missing weeks. An empty window
/// yields a baseline with every statistic `None` and zero confidence.
pub fn estimate_baseline(
    metric_key: &str,
    values: &[f64],
    expected_count: Option<usize>,
    config: &BaselineConfig,
) -> Baseline {
    let raw: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if raw.is_empty() {
        return Baseline::empty(metric_key, config.baseline_weeks);
    }

    let n = raw.len();
    let mut sorted = raw.clone();
    sorted.sort_by(f64::total_cmp);

    let mean = raw.iter().sum::<f64>() / n as f64;
    let variance = raw.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n as f64;
    let median = percentile(&sorted, 50.0);

    let mad = median.and_then(|center| {
        let mut deviations: Vec<f64> = sorted.iter().map(|v| (v - center).abs()).collect();
        deviations.sort_by(f64::total_cmp);
        percentile(&deviations, 50.0)
    });

    Baseline {
        metric_key: metric_key.to_string(),
        window_weeks: config.baseline_weeks,
        mean: Some(mean),
        median,
        std: Some(variance.sqrt()),
        mad,
        p25: percentile(&sorted, 25.0),
        p75: percentile(&sorted, 75.0),
        confidence: confidence(n, expected_count, config),
        sample_size: n,
    }
}

/// Blend of temporal coverage and raw sample count, in `[0, 1]`.
pub fn confidence(
    sample_size: usize,
    expected_count: Option<usize>,
    config: &BaselineConfig,
) -> f64 {
    if sample_size == 0 {
        return 0.0;
    }
    let data_coverage = data_coverage(sample_size, expected_count);
    let coverage_factor = (data_coverage / config.min_coverage).min(1.0);
    let sample_factor =
        (sample_size as f64 / (config.baseline_weeks as f64 * DAYS_PER_WEEK)).min(1.0);
    (COVERAGE_WEIGHT * coverage_factor + SAMPLE_WEIGHT * sample_factor).clamp(0.0, 1.0)
}

/// Fraction of expected weeks present. Missing or zero expectation counts as full coverage.
pub fn data_coverage(sample_size: usize, expected_count: Option<usize>) -> f64 {
    match expected_count {
        Some(expected) if expected > 0 => sample_size as f64 / expected as f64,
        _ => 1.0,
    }
}
