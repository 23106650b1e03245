use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    pub team_id: String,
    pub metric_key: String,
    pub week_start: NaiveDate,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Baseline {
    pub metric_key: String,
    pub window_weeks: u32,
    pub mean: Option<f64>,
    pub median: Option<f64>,
    pub std: Option<f64>,
    pub mad: Option<f64>,
    pub p25: Option<f64>,
    pub p75: Option<f64>,
    pub confidence: f64,
    pub sample_size: usize,
}

impl Baseline {
    pub fn empty(metric_key: &str, window_weeks: u32) -> Self {
        Self {
            metric_key: metric_key.to_string(),
            window_weeks,
            mean: None,
            median: None,
            std: None,
            mad: None,
            p25: None,
            p75: None,
            confidence: 0.0,
            sample_size: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Above,
    Below,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Above => "above",
            Direction::Below => "below",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviationResult {
    pub metric_key: String,
    pub current_value: f64,
    pub robust_z: Option<f64>,
    pub standard_z: Option<f64>,
    pub delta_abs: Option<f64>,
    pub delta_pct: Option<f64>,
    pub outside_band: bool,
    pub direction: Option<Direction>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositeRiskScore {
    pub team_id: String,
    pub week_start: NaiveDate,
    pub overload: f64,
    pub execution: f64,
    pub retention: f64,
    pub bdi: f64,
}

impl CompositeRiskScore {
    pub fn dimension(&self, risk_type: RiskType) -> f64 {
        match risk_type {
            RiskType::Overload => self.overload,
            RiskType::Execution => self.execution,
            RiskType::Retention => self.retention,
            RiskType::Drift => self.bdi,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Band {
    Green,
    Yellow,
    Red,
}

impl Band {
    pub fn as_str(&self) -> &'static str {
        match self {
            Band::Green => "green",
            Band::Yellow => "yellow",
            Band::Red => "red",
        }
    }

    pub fn severity(&self) -> &'static str {
        match self {
            Band::Green => "low",
            Band::Yellow => "moderate",
            Band::Red => "high",
        }
    }
}

impl FromStr for Band {
    type Err = EngineError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "green" => Ok(Band::Green),
            "yellow" => Ok(Band::Yellow),
            "red" => Ok(Band::Red),
            other => Err(EngineError::InvalidInput(format!("unknown band '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Zone {
    Stable,
    Watch,
    Surge,
    Recovery,
}

impl Zone {
    pub fn as_str(&self) -> &'static str {
        match self {
            Zone::Stable => "Stable",
            Zone::Watch => "Watch",
            Zone::Surge => "Surge",
            Zone::Recovery => "Recovery",
        }
    }
}

impl FromStr for Zone {
    type Err = EngineError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "Stable" => Ok(Zone::Stable),
            "Watch" => Ok(Zone::Watch),
            "Surge" => Ok(Zone::Surge),
            "Recovery" => Ok(Zone::Recovery),
            other => Err(EngineError::InvalidInput(format!("unknown zone '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneState {
    pub team_id: String,
    pub week_start: NaiveDate,
    pub zone: Zone,
    pub band: Band,
    /// Consecutive weeks spent in `zone`, including this one.
    pub weeks_in_zone: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskType {
    Overload,
    Execution,
    Retention,
    Drift,
}

impl RiskType {
    pub const ALL: [RiskType; 4] = [
        RiskType::Overload,
        RiskType::Execution,
        RiskType::Retention,
        RiskType::Drift,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskType::Overload => "overload",
            RiskType::Execution => "execution",
            RiskType::Retention => "retention",
            RiskType::Drift => "drift",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    Structural,
    Episodic,
}

impl Classification {
    pub fn as_str(&self) -> &'static str {
        match self {
            Classification::Structural => "structural",
            Classification::Episodic => "episodic",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistentRisk {
    pub risk_type: RiskType,
    pub weeks_above_threshold: usize,
    pub avg_score: f64,
    pub classification: Classification,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeeklyValue {
    pub week_start: NaiveDate,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeriesPoint {
    pub week_start: NaiveDate,
    pub value: f64,
    pub baseline_median: Option<f64>,
    pub baseline_lower: Option<f64>,
    pub baseline_upper: Option<f64>,
    pub is_above_upper_band: bool,
    pub is_below_lower_band: bool,
}

/// Which side of the baseline counts as drift for a metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdverseDirection {
    Above,
    Below,
    Either,
}

/// Metrics the composite aggregator knows how to weigh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKey {
    MeetingLoad,
    AfterHours,
    FocusTime,
    ResponseTime,
    MeetingFragmentation,
    Participation,
    AttritionRisk,
    NetworkBreadth,
    SentimentDrop,
}

impl MetricKey {
    pub const ALL: [MetricKey; 9] = [
        MetricKey::MeetingLoad,
        MetricKey::AfterHours,
        MetricKey::FocusTime,
        MetricKey::ResponseTime,
        MetricKey::MeetingFragmentation,
        MetricKey::Participation,
        MetricKey::AttritionRisk,
        MetricKey::NetworkBreadth,
        MetricKey::SentimentDrop,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKey::MeetingLoad => "meeting_load",
            MetricKey::AfterHours => "after_hours",
            MetricKey::FocusTime => "focus_time",
            MetricKey::ResponseTime => "response_time",
            MetricKey::MeetingFragmentation => "meeting_fragmentation",
            MetricKey::Participation => "participation",
            MetricKey::AttritionRisk => "attrition_risk",
            MetricKey::NetworkBreadth => "network_breadth",
            MetricKey::SentimentDrop => "sentiment_drop",
        }
    }

    /// Less focus time, participation or network breadth is drift; for the
    /// rest, more is.
    pub fn adverse_direction(&self) -> AdverseDirection {
        match self {
            MetricKey::FocusTime | MetricKey::Participation | MetricKey::NetworkBreadth => {
                AdverseDirection::Below
            }
            _ => AdverseDirection::Above,
        }
    }
}

impl fmt::Display for MetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricKey {
    type Err = EngineError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        MetricKey::ALL
            .into_iter()
            .find(|key| key.as_str() == value)
            .ok_or_else(|| EngineError::InvalidInput(format!("unknown metric key '{value}'")))
    }
}

/// Monday of the ISO week containing `date`.
pub fn week_start_of(date: NaiveDate) -> NaiveDate {
    date - Duration::days(date.weekday().num_days_from_monday() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metric_keys_round_trip_through_strings() {
        for key in MetricKey::ALL {
            assert_eq!(key.as_str().parse::<MetricKey>(), Ok(key));
        }
        assert!("sentiment".parse::<MetricKey>().is_err());
    }

    #[test]
    fn week_start_snaps_to_monday() {
        let thursday = NaiveDate::from_ymd_opt(2026, 2, 5).unwrap();
        let monday = NaiveDate::from_ymd_opt(2026, 2, 2).unwrap();
        assert_eq!(week_start_of(thursday), monday);
        assert_eq!(week_start_of(monday), monday);
    }

    #[test]
    fn composite_dimension_lookup_matches_fields() {
        let score = CompositeRiskScore {
            team_id: "platform".to_string(),
            week_start: NaiveDate::from_ymd_opt(2026, 2, 2).unwrap(),
            overload: 10.0,
            execution: 20.0,
            retention: 30.0,
            bdi: 21.6,
        };
        assert_eq!(score.dimension(RiskType::Execution), 20.0);
        assert_eq!(score.dimension(RiskType::Drift), 21.6);
    }
}
