use crate::error::{EngineError, Result};
use crate::models::{Baseline, TimeSeriesPoint, WeeklyValue};

/// Trailing `weeks_to_show` weeks of `history`, each annotated with the
/// baseline band. Nothing is recomputed here.
pub fn build_time_series(
    history: &[WeeklyValue],
    baseline: &Baseline,
    weeks_to_show: usize,
) -> Result<Vec<TimeSeriesPoint>> {
    if weeks_to_show == 0 {
        return Err(EngineError::InvalidInput(
            "weeks_to_show must be at least 1".to_string(),
        ));
    }

    let mut ordered = history.to_vec();
    ordered.sort_by_key(|point| point.week_start);
    let skip = ordered.len().saturating_sub(weeks_to_show);

    Ok(ordered
        .into_iter()
        .skip(skip)
        .map(|point| TimeSeriesPoint {
            week_start: point.week_start,
            value: point.value,
            baseline_median: baseline.median,
            baseline_lower: baseline.p25,
            baseline_upper: baseline.p75,
            is_above_upper_band: baseline.p75.is_some_and(|upper| point.value > upper),
            is_below_lower_band: baseline.p25.is_some_and(|lower| point.value < lower),
        })
        .collect())
}
