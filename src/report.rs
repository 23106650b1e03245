use std::collections::BTreeMap;
use std::fmt::Write;

use chrono::{Duration, NaiveDate};
use serde::Serialize;

use crate::baseline::estimate_baseline;
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::models::{
    Baseline, CompositeRiskScore, MetricSample, PersistentRisk, TimeSeriesPoint, WeeklyValue,
    ZoneState,
};
use crate::persistent::{scan_persistent_risks, PersistenceStrategy};
use crate::timeseries::build_time_series;

/// Calendar month, holding the weeks whose Monday falls inside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MonthWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl MonthWindow {
    pub fn new(year: i32, month: u32) -> Result<Self> {
        let invalid = || EngineError::InvalidInput(format!("invalid month {year}-{month:02}"));
        let start = NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(invalid)?;
        let next = if month == 12 {
            NaiveDate::from_ymd_opt(year + 1, 1, 1)
        } else {
            NaiveDate::from_ymd_opt(year, month + 1, 1)
        }
        .ok_or_else(invalid)?;
        Ok(Self {
            start,
            end: next - Duration::days(1),
        })
    }

    /// Parse `YYYY-MM`.
    pub fn parse(value: &str) -> Result<Self> {
        let invalid = || EngineError::InvalidInput(format!("expected YYYY-MM, got '{value}'"));
        let (year, month) = value.split_once('-').ok_or_else(invalid)?;
        let year = year.parse::<i32>().map_err(|_| invalid())?;
        let month = month.parse::<u32>().map_err(|_| invalid())?;
        Self::new(year, month)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricSeries {
    pub metric_key: String,
    pub baseline: Baseline,
    pub points: Vec<TimeSeriesPoint>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WeeklyRow {
    pub score: CompositeRiskScore,
    pub zone: ZoneState,
}

#[derive(Debug, Clone, Serialize)]
pub struct MonthlyReport {
    pub team_id: String,
    pub team_name: String,
    pub month: MonthWindow,
    pub weeks: Vec<WeeklyRow>,
    pub persistent_risks: Vec<PersistentRisk>,
    pub series: Vec<MetricSeries>,
}

impl MonthlyReport {
    pub fn latest(&self) -> Option<&WeeklyRow> {
        self.weeks.last()
    }
}

/// Assemble the monthly view for one team.
///
/// `history` is oldest first and may reach back before the month so streaks
/// that started earlier are counted in full. `samples` feeds the per-metric
/// series; each metric's baseline is the window before its latest week.
pub fn build_monthly_report(
    team_id: &str,
    team_name: &str,
    month: MonthWindow,
    history: &[(CompositeRiskScore, ZoneState)],
    samples: &[MetricSample],
    config: &EngineConfig,
    strategy: &dyn PersistenceStrategy,
) -> Result<MonthlyReport> {
    config.validate()?;
    let through_month: Vec<&(CompositeRiskScore, ZoneState)> = history
        .iter()
        .filter(|(score, _)| score.week_start <= month.end)
        .collect();
    let scores: Vec<CompositeRiskScore> =
        through_month.iter().map(|(score, _)| score.clone()).collect();
    let persistent_risks = scan_persistent_risks(&scores, &config.persistence, strategy);

    let weeks = through_month
        .into_iter()
        .filter(|(score, _)| score.week_start >= month.start)
        .map(|(score, zone)| WeeklyRow {
            score: score.clone(),
            zone: zone.clone(),
        })
        .collect();

    let mut by_metric: BTreeMap<&str, Vec<WeeklyValue>> = BTreeMap::new();
    for sample in samples.iter().filter(|sample| sample.week_start <= month.end) {
        by_metric
            .entry(sample.metric_key.as_str())
            .or_default()
            .push(WeeklyValue {
                week_start: sample.week_start,
                value: sample.value,
            });
    }

    let window_weeks = config.baseline.baseline_weeks;
    let mut series = Vec::with_capacity(by_metric.len());
    for (metric_key, values) in by_metric {
        let Some(latest) = values.iter().map(|value| value.week_start).max() else {
            continue;
        };
        let window_start = latest
            .checked_sub_signed(Duration::weeks(i64::from(window_weeks)))
            .ok_or_else(|| {
                EngineError::InvalidInput(format!(
                    "baseline window of {window_weeks} weeks before {latest} is out of range"
                ))
            })?;
        let window: Vec<f64> = values
            .iter()
            .filter(|value| value.week_start >= window_start && value.week_start < latest)
            .map(|value| value.value)
            .collect();
        let expected = Some(window_weeks as usize);
        let baseline = estimate_baseline(metric_key, &window, expected, &config.baseline);
        let points = build_time_series(&values, &baseline, config.weeks_to_show)?;
        series.push(MetricSeries {
            metric_key: metric_key.to_string(),
            baseline,
            points,
        });
    }

    Ok(MonthlyReport {
        team_id: team_id.to_string(),
        team_name: team_name.to_string(),
        month,
        weeks,
        persistent_risks,
        series,
    })
}

pub fn render_markdown(report: &MonthlyReport) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Team Drift Report");
    let _ = writeln!(
        output,
        "Generated for {} ({}) covering {} to {}",
        report.team_name, report.team_id, report.month.start, report.month.end
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Current State");

    match report.latest() {
        Some(row) => {
            let _ = writeln!(
                output,
                "- Zone {} for {} week(s), band {} ({} severity)",
                row.zone.zone.as_str(),
                row.zone.weeks_in_zone,
                row.zone.band.as_str(),
                row.zone.band.severity()
            );
            let _ = writeln!(
                output,
                "- BDI {:.1} (overload {:.1}, execution {:.1}, retention {:.1})",
                row.score.bdi, row.score.overload, row.score.execution, row.score.retention
            );
        }
        None => {
            let _ = writeln!(output, "No scored weeks in this month.");
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Weekly Scores");

    if report.weeks.is_empty() {
        let _ = writeln!(output, "No scored weeks in this month.");
    } else {
        let _ = writeln!(output, "| Week | BDI | Overload | Execution | Retention | Zone |");
        let _ = writeln!(output, "|---|---|---|---|---|---|");
        for row in &report.weeks {
            let _ = writeln!(
                output,
                "| {} | {:.1} | {:.1} | {:.1} | {:.1} | {} |",
                row.score.week_start,
                row.score.bdi,
                row.score.overload,
                row.score.execution,
                row.score.retention,
                row.zone.zone.as_str()
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Persistent Risks");

    if report.persistent_risks.is_empty() {
        let _ = writeln!(output, "No sustained risks this month.");
    } else {
        for risk in &report.persistent_risks {
            let _ = writeln!(
                output,
                "- {}: {} weeks above threshold, avg score {:.1} ({})",
                risk.risk_type.as_str(),
                risk.weeks_above_threshold,
                risk.avg_score,
                risk.classification.as_str()
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Metric Trends");

    if report.series.is_empty() {
        let _ = writeln!(output, "No metric samples recorded for this window.");
    } else {
        for series in &report.series {
            let _ = writeln!(output);
            let _ = writeln!(output, "### {}", series.metric_key);
            match (series.baseline.p25, series.baseline.median, series.baseline.p75) {
                (Some(lower), Some(median), Some(upper)) => {
                    let _ = writeln!(
                        output,
                        "Baseline median {:.1}, band {:.1} to {:.1} (confidence {:.2})",
                        median, lower, upper, series.baseline.confidence
                    );
                }
                _ => {
                    let _ = writeln!(output, "Baseline: insufficient data");
                }
            }
            for point in &series.points {
                let marker = if point.is_above_upper_band {
                    " ▲ above band"
                } else if point.is_below_lower_band {
                    " ▼ below band"
                } else {
                    ""
                };
                let _ = writeln!(output, "- {}: {:.1}{}", point.week_start, point.value, marker);
            }
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Band, Classification, RiskType, Zone};
    use crate::persistent::SlopeStrategy;

    fn week(offset: i64) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 2).unwrap() + Duration::weeks(offset)
    }

    fn row(offset: i64, overload: f64, zone: Zone, band: Band) -> (CompositeRiskScore, ZoneState) {
        (
            CompositeRiskScore {
                team_id: "platform".to_string(),
                week_start: week(offset),
                overload,
                execution: 10.0,
                retention: 10.0,
                bdi: crate::composite::drift_index(overload, 10.0, 10.0),
            },
            ZoneState {
                team_id: "platform".to_string(),
                week_start: week(offset),
                zone,
                band,
                weeks_in_zone: 1,
            },
        )
    }

    fn samples() -> Vec<MetricSample> {
        [40.0, 42.0, 38.0, 41.0, 39.0, 43.0, 70.0]
            .iter()
            .enumerate()
            .map(|(i, value)| MetricSample {
                team_id: "platform".to_string(),
                metric_key: "meeting_load".to_string(),
                week_start: week(i as i64 - 3),
                value: *value,
            })
            .collect()
    }

    #[test]
    fn streak_started_before_month_is_counted() {
        let history = vec![
            row(-2, 70.0, Zone::Watch, Band::Yellow),
            row(-1, 75.0, Zone::Watch, Band::Yellow),
            row(0, 80.0, Zone::Watch, Band::Yellow),
            row(1, 85.0, Zone::Watch, Band::Yellow),
        ];
        let config = EngineConfig::default();
        let report = build_monthly_report(
            "platform",
            "Platform Engineering",
            MonthWindow {
                start: week(0),
                end: week(3),
            },
            &history,
            &samples(),
            &config,
            &SlopeStrategy::from_config(&config.persistence),
        )
        .unwrap();

        assert_eq!(report.weeks.len(), 2);
        assert_eq!(report.persistent_risks.len(), 1);
        let risk = &report.persistent_risks[0];
        assert_eq!(risk.risk_type, RiskType::Overload);
        assert_eq!(risk.weeks_above_threshold, 4);
        assert_eq!(risk.classification, Classification::Structural);

        assert_eq!(report.series.len(), 1);
        let series = &report.series[0];
        assert_eq!(series.baseline.median, Some(40.5));
        assert!(series.points.last().unwrap().is_above_upper_band);
    }

    #[test]
    fn markdown_lists_zone_and_risks() {
        let history = vec![
            row(0, 90.0, Zone::Surge, Band::Red),
            row(1, 92.0, Zone::Surge, Band::Red),
            row(2, 95.0, Zone::Surge, Band::Red),
        ];
        let config = EngineConfig::default();
        let report = build_monthly_report(
            "platform",
            "Platform Engineering",
            MonthWindow {
                start: week(0),
                end: week(3),
            },
            &history,
            &samples(),
            &config,
            &SlopeStrategy::from_config(&config.persistence),
        )
        .unwrap();
        let markdown = render_markdown(&report);

        assert!(markdown.contains("# Team Drift Report"));
        assert!(markdown.contains("Zone Surge"));
        assert!(markdown.contains("overload: 3 weeks above threshold"));
        assert!(markdown.contains("(structural)"));
        assert!(markdown.contains("### meeting_load"));
        assert!(markdown.contains("above band"));
    }

    #[test]
    fn month_window_spans_calendar_month() {
        let month = MonthWindow::parse("2026-02").unwrap();
        assert_eq!(month.start, NaiveDate::from_ymd_opt(2026, 2, 1).unwrap());
        assert_eq!(month.end, NaiveDate::from_ymd_opt(2026, 2, 28).unwrap());

        let december = MonthWindow::parse("2025-12").unwrap();
        assert_eq!(december.end, NaiveDate::from_ymd_opt(2025, 12, 31).unwrap());

        assert!(MonthWindow::parse("2026-13").is_err());
        assert!(MonthWindow::parse("march").is_err());
    }

    #[test]
    fn oversized_baseline_window_is_rejected() {
        let mut config = EngineConfig::default();
        config.baseline.baseline_weeks = 20_000_000;
        let result = build_monthly_report(
            "platform",
            "Platform Engineering",
            MonthWindow {
                start: week(0),
                end: week(3),
            },
            &[],
            &samples(),
            &config,
            &SlopeStrategy::from_config(&config.persistence),
        );
        assert!(matches!(result, Err(EngineError::InvalidConfig(_))));
    }

    #[test]
    fn empty_month_renders_placeholders() {
        let config = EngineConfig::default();
        let report = build_monthly_report(
            "design",
            "Design Studio",
            MonthWindow {
                start: week(0),
                end: week(3),
            },
            &[],
            &[],
            &config,
            &SlopeStrategy::from_config(&config.persistence),
        )
        .unwrap();
        let markdown = render_markdown(&report);
        assert!(markdown.contains("No scored weeks in this month."));
        assert!(markdown.contains("No sustained risks this month."));
        assert!(markdown.contains("No metric samples recorded for this window."));
    }
}
