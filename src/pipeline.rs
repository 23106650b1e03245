use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use chrono::{Duration, NaiveDate};
use serde::Serialize;
use tokio::task::{self, JoinSet};
use tracing::{debug, info, warn};

use crate::baseline::{data_coverage, estimate_baseline};
use crate::composite::aggregate_composite;
use crate::config::EngineConfig;
use crate::deviation::{deviation_magnitude, score_deviation};
use crate::error::{EngineError, Result};
use crate::models::{
    Baseline, CompositeRiskScore, DeviationResult, MetricKey, MetricSample, ZoneState,
};
use crate::quality::{
    gate_data_quality, meets_group_size, QualityParams, QualityVerdict, GROUP_SIZE_REASON,
};
use crate::zone::{next_zone, ZoneTrack};

/// Everything needed to score one team for one week.
#[derive(Debug, Clone)]
pub struct TeamWeekInput {
    pub team_id: String,
    pub week_start: NaiveDate,
    pub active_users: u32,
    /// Samples for the scoring week and the weeks before it, any order.
    pub samples: Vec<MetricSample>,
    pub previous_zone: Option<ZoneTrack>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricScore {
    pub baseline: Baseline,
    pub verdict: QualityVerdict,
    pub deviation: Option<DeviationResult>,
    /// 0–100 contribution handed to the composite; 0 when suppressed.
    pub magnitude: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TeamWeekScore {
    pub metrics: Vec<MetricScore>,
    pub composite: CompositeRiskScore,
    pub zone: ZoneState,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum TeamWeekOutcome {
    Suppressed {
        team_id: String,
        week_start: NaiveDate,
        reason: String,
    },
    Scored(TeamWeekScore),
}

impl TeamWeekOutcome {
    pub fn team_id(&self) -> &str {
        match self {
            TeamWeekOutcome::Suppressed { team_id, .. } => team_id,
            TeamWeekOutcome::Scored(score) => &score.composite.team_id,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchFailure {
    pub team_id: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub outcomes: Vec<TeamWeekOutcome>,
    pub failures: Vec<BatchFailure>,
}

impl BatchReport {
    pub fn scored(&self) -> impl Iterator<Item = &TeamWeekScore> {
        self.outcomes.iter().filter_map(|outcome| match outcome {
            TeamWeekOutcome::Scored(score) => Some(score),
            TeamWeekOutcome::Suppressed { .. } => None,
        })
    }

    pub fn suppressed_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|outcome| matches!(outcome, TeamWeekOutcome::Suppressed { .. }))
            .count()
    }

    /// Move outcomes that could not be stored into `failures`, keyed by their
    /// position in `outcomes`.
    pub fn fail_outcomes(&mut self, mut failed: Vec<(usize, String)>) {
        failed.sort_by(|a, b| b.0.cmp(&a.0));
        failed.dedup_by_key(|(index, _)| *index);
        for (index, error) in failed {
            if index >= self.outcomes.len() {
                continue;
            }
            let outcome = self.outcomes.remove(index);
            self.failures.push(BatchFailure {
                team_id: outcome.team_id().to_string(),
                error,
            });
        }
        self.failures.sort_by(|a, b| a.team_id.cmp(&b.team_id));
    }
}

/// Score one team-week. Malformed input is an error; thin data is not.
pub fn score_team_week(
    input: &TeamWeekInput,
    config: &EngineConfig,
) -> Result<TeamWeekOutcome> {
    config.validate()?;
    validate_samples(input)?;

    if !meets_group_size(input.active_users, config.quality.min_group_size) {
        debug!(
            team_id = %input.team_id,
            active_users = input.active_users,
            "team below privacy floor"
        );
        return Ok(TeamWeekOutcome::Suppressed {
            team_id: input.team_id.clone(),
            week_start: input.week_start,
            reason: GROUP_SIZE_REASON.to_string(),
        });
    }

    let window_weeks = config.baseline.baseline_weeks;
    let window_start = input
        .week_start
        .checked_sub_signed(Duration::weeks(i64::from(window_weeks)))
        .ok_or_else(|| {
            EngineError::InvalidInput(format!(
                "baseline window of {window_weeks} weeks before {} is out of range",
                input.week_start
            ))
        })?;

    let mut by_metric: BTreeMap<&str, Vec<&MetricSample>> = BTreeMap::new();
    for sample in &input.samples {
        by_metric.entry(sample.metric_key.as_str()).or_default().push(sample);
    }

    let mut metrics = Vec::with_capacity(by_metric.len());
    let mut magnitudes: HashMap<MetricKey, f64> = HashMap::new();

    for (metric_key, mut samples) in by_metric {
        samples.sort_by_key(|sample| sample.week_start);
        let window: Vec<f64> = samples
            .iter()
            .filter(|sample| {
                sample.week_start >= window_start && sample.week_start < input.week_start
            })
            .map(|sample| sample.value)
            .collect();
        let current = samples
            .iter()
            .find(|sample| sample.week_start == input.week_start)
            .map(|sample| sample.value);

        let expected = Some(window_weeks as usize);
        let baseline = estimate_baseline(metric_key, &window, expected, &config.baseline);
        let mut verdict = gate_data_quality(&QualityParams {
            active_users_count: input.active_users,
            min_group_size: config.quality.min_group_size,
            data_coverage: data_coverage(baseline.sample_size, expected),
            min_coverage: config.baseline.min_coverage,
            sample_size: baseline.sample_size,
            min_sample_size: config.quality.min_sample_size,
        });
        if verdict.meets && current.is_none() {
            verdict = QualityVerdict {
                meets: false,
                reason: Some(format!("No sample for week {}", input.week_start)),
            };
        }

        let deviation = match current {
            Some(value) if verdict.meets => Some(score_deviation(value, &baseline)),
            _ => None,
        };

        let magnitude = match (&deviation, metric_key.parse::<MetricKey>()) {
            (Some(deviation), Ok(key)) => {
                let magnitude =
                    deviation_magnitude(deviation, key.adverse_direction(), config.z_saturation);
                magnitudes.insert(key, magnitude);
                magnitude
            }
            (Some(_), Err(_)) => {
                warn!(
                    team_id = %input.team_id,
                    metric_key,
                    "metric has no composite weight, skipping"
                );
                0.0
            }
            (None, _) => {
                debug!(
                    team_id = %input.team_id,
                    metric_key,
                    reason = verdict.reason.as_deref().unwrap_or_default(),
                    "metric suppressed"
                );
                0.0
            }
        };

        metrics.push(MetricScore {
            baseline,
            verdict,
            deviation,
            magnitude,
        });
    }

    let composite = aggregate_composite(
        &input.team_id,
        input.week_start,
        &magnitudes,
        &config.weights,
    );
    let track = next_zone(input.previous_zone, composite.bdi, &config.zones);

    Ok(TeamWeekOutcome::Scored(TeamWeekScore {
        metrics,
        zone: ZoneState {
            team_id: input.team_id.clone(),
            week_start: input.week_start,
            zone: track.zone,
            band: track.band,
            weeks_in_zone: track.weeks_in_zone,
        },
        composite,
    }))
}

/// Score every team concurrently. A failing team is recorded and skipped;
/// it never aborts the rest of the batch.
pub async fn score_batch(inputs: Vec<TeamWeekInput>, config: Arc<EngineConfig>) -> BatchReport {
    run_batch(inputs, config, score_team_week).await
}

async fn run_batch<F>(
    inputs: Vec<TeamWeekInput>,
    config: Arc<EngineConfig>,
    score: F,
) -> BatchReport
where
    F: Fn(&TeamWeekInput, &EngineConfig) -> Result<TeamWeekOutcome> + Copy + Send + 'static,
{
    let team_ids: Vec<String> = inputs.iter().map(|input| input.team_id.clone()).collect();
    let mut tasks = JoinSet::new();
    let mut slots: HashMap<task::Id, usize> = HashMap::new();

    for (index, input) in inputs.into_iter().enumerate() {
        let config = Arc::clone(&config);
        let handle = tasks.spawn(async move { (index, score(&input, &config)) });
        slots.insert(handle.id(), index);
    }

    let mut report = BatchReport::default();
    let mut finished = vec![false; team_ids.len()];

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((index, Ok(outcome))) => {
                finished[index] = true;
                report.outcomes.push(outcome);
            }
            Ok((index, Err(err))) => {
                finished[index] = true;
                let team_id = team_ids[index].clone();
                warn!(team_id = %team_id, error = %err, "team scoring rejected");
                report.failures.push(BatchFailure {
                    team_id,
                    error: err.to_string(),
                });
            }
            Err(err) => {
                let Some(&index) = slots.get(&err.id()) else {
                    warn!(error = %err, "unknown scoring task failed");
                    continue;
                };
                finished[index] = true;
                let team_id = team_ids[index].clone();
                let error = if err.is_panic() {
                    "scoring task panicked"
                } else {
                    "scoring task cancelled"
                };
                warn!(team_id = %team_id, error, "team scoring task failed");
                report.failures.push(BatchFailure {
                    team_id,
                    error: error.to_string(),
                });
            }
        }
    }

    for (index, team_id) in team_ids.into_iter().enumerate() {
        if !finished[index] {
            report.failures.push(BatchFailure {
                team_id,
                error: "scoring task aborted".to_string(),
            });
        }
    }

    report.outcomes.sort_by(|a, b| a.team_id().cmp(b.team_id()));
    report.failures.sort_by(|a, b| a.team_id.cmp(&b.team_id));
    info!(
        scored = report.scored().count(),
        suppressed = report.suppressed_count(),
        failed = report.failures.len(),
        "batch scoring finished"
    );
    report
}

fn validate_samples(input: &TeamWeekInput) -> Result<()> {
    let mut seen: HashSet<(&str, NaiveDate)> = HashSet::new();
    for sample in &input.samples {
        if sample.team_id != input.team_id {
            return Err(EngineError::InvalidInput(format!(
                "sample for team '{}' passed to team '{}'",
                sample.team_id, input.team_id
            )));
        }
        if !sample.value.is_finite() {
            return Err(EngineError::NonFiniteSample {
                metric_key: sample.metric_key.clone(),
                week_start: sample.week_start,
                value: sample.value,
            });
        }
        if !seen.insert((sample.metric_key.as_str(), sample.week_start)) {
            return Err(EngineError::DuplicateSample {
                metric_key: sample.metric_key.clone(),
                week_start: sample.week_start,
            });
        }
    }
    Ok(())
}
