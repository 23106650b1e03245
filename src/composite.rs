use std::collections::HashMap;

use chrono::NaiveDate;

use crate::config::CompositeWeights;
use crate::models::{CompositeRiskScore, MetricKey};

/// Combine per-metric deviation magnitudes (0–100) into Overload, Execution,
/// Retention and the overall drift index.
///
/// Metrics absent from `deviations` contribute 0.
pub fn aggregate_composite(
    team_id: &str,
    week_start: NaiveDate,
    deviations: &HashMap<MetricKey, f64>,
    weights: &CompositeWeights,
) -> CompositeRiskScore {
    let input = |key: MetricKey| clamp_score(deviations.get(&key).copied().unwrap_or(0.0));

    let overload = clamp_score(
        weights.overload.meeting * input(MetricKey::MeetingLoad)
            + weights.overload.after_hours * input(MetricKey::AfterHours)
            + weights.overload.focus_time * input(MetricKey::FocusTime),
    );
    let execution = clamp_score(
        weights.execution.response_time * input(MetricKey::ResponseTime)
            + weights.execution.meeting_fragmentation * input(MetricKey::MeetingFragmentation)
            + weights.execution.participation * input(MetricKey::Participation),
    );
    let retention = clamp_score(
        weights.retention.attrition_risk * input(MetricKey::AttritionRisk)
            + weights.retention.network_shrinkage * input(MetricKey::NetworkBreadth)
            + weights.retention.sentiment_drop * input(MetricKey::SentimentDrop),
    );

    CompositeRiskScore {
        team_id: team_id.to_string(),
        week_start,
        overload,
        execution,
        retention,
        bdi: drift_index(overload, execution, retention),
    }
}

/// Root-mean-square of the three dimensions, so one acute dimension is not
/// averaged away by two calm ones.
pub fn drift_index(overload: f64, execution: f64, retention: f64) -> f64 {
    clamp_score(((overload.powi(2) + execution.powi(2) + retention.powi(2)) / 3.0).sqrt())
}

fn clamp_score(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 100.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn week() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 2).unwrap()
    }

    #[test]
    fn drift_index_reference_points() {
        assert_eq!(drift_index(0.0, 0.0, 0.0), 0.0);
        assert!((drift_index(100.0, 100.0, 100.0) - 100.0).abs() < 1e-9);
        assert!((drift_index(100.0, 0.0, 0.0) - 57.735).abs() < 1e-3);
    }

    #[test]
    fn single_acute_dimension_outweighs_average() {
        let acute = drift_index(90.0, 0.0, 0.0);
        let spread = drift_index(30.0, 30.0, 30.0);
        assert!(acute > spread);
    }

    #[test]
    fn weights_apply_per_dimension() {
        let deviations = HashMap::from([
            (MetricKey::MeetingLoad, 100.0),
            (MetricKey::AfterHours, 50.0),
            (MetricKey::ResponseTime, 80.0),
            (MetricKey::AttritionRisk, 40.0),
            (MetricKey::NetworkBreadth, 40.0),
            (MetricKey::SentimentDrop, 40.0),
        ]);
        let weights = CompositeWeights::default();
        let score = aggregate_composite("platform", week(), &deviations, &weights);

        assert!((score.overload - (40.0 + 17.5)).abs() < 1e-9);
        assert!((score.execution - 32.0).abs() < 1e-9);
        assert!((score.retention - 40.0).abs() < 1e-9);
        let squares =
            score.overload.powi(2) + score.execution.powi(2) + score.retention.powi(2);
        let expected_bdi = (squares / 3.0).sqrt();
        assert!((score.bdi - expected_bdi).abs() < 1e-9);
        assert_eq!(score.team_id, "platform");
        assert_eq!(score.week_start, week());
    }

    #[test]
    fn out_of_range_inputs_are_clamped() {
        let deviations = HashMap::from([
            (MetricKey::MeetingLoad, 400.0),
            (MetricKey::AfterHours, 400.0),
            (MetricKey::FocusTime, 400.0),
            (MetricKey::ResponseTime, -50.0),
        ]);
        let weights = CompositeWeights::default();
        let score = aggregate_composite("platform", week(), &deviations, &weights);
        assert!((score.overload - 100.0).abs() < 1e-9);
        assert_eq!(score.execution, 0.0);
        assert!(score.bdi <= 100.0);
    }

    #[test]
    fn empty_input_is_calm() {
        let weights = CompositeWeights::default();
        let score = aggregate_composite("platform", week(), &HashMap::new(), &weights);
        assert_eq!(score.bdi, 0.0);
    }
}
