use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

/// Longest look-back (ten years of weeks) accepted for baselines and series.
pub const MAX_WINDOW_WEEKS: u32 = 520;

/// A streak shorter than this never counts as persistent.
pub const MIN_PERSISTENT_WEEKS: usize = 3;

/// Scoring policy threaded into every engine call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub baseline: BaselineConfig,
    pub quality: QualityConfig,
    /// |z| at which a metric's deviation magnitude saturates at 100.
    pub z_saturation: f64,
    pub weights: CompositeWeights,
    pub zones: ZoneThresholds,
    pub persistence: PersistenceConfig,
    pub weeks_to_show: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            baseline: BaselineConfig::default(),
            quality: QualityConfig::default(),
            z_saturation: 3.0,
            weights: CompositeWeights::default(),
            zones: ZoneThresholds::default(),
            persistence: PersistenceConfig::default(),
            weeks_to_show: 8,
        }
    }
}

impl EngineConfig {
    /// Load a TOML policy file, falling back to defaults when no path is given.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read config {}", path.display()))?;
                toml::from_str::<EngineConfig>(&raw)
                    .with_context(|| format!("failed to parse config {}", path.display()))?
            }
            None => EngineConfig::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.baseline.validate()?;
        self.quality.validate()?;
        if !(self.z_saturation.is_finite() && self.z_saturation > 0.0) {
            return Err(EngineError::InvalidConfig(format!(
                "z_saturation must be positive, got {}",
                self.z_saturation
            )));
        }
        self.weights.validate()?;
        self.zones.validate()?;
        self.persistence.validate()?;
        if self.weeks_to_show == 0 || self.weeks_to_show > MAX_WINDOW_WEEKS as usize {
            return Err(EngineError::InvalidConfig(format!(
                "weeks_to_show must be within [1, {MAX_WINDOW_WEEKS}], got {}",
                self.weeks_to_show
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BaselineConfig {
    pub baseline_weeks: u32,
    pub min_coverage: f64,
}

impl Default for BaselineConfig {
    fn default() -> Self {
        Self {
            baseline_weeks: 6,
            min_coverage: 0.7,
        }
    }
}

impl BaselineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.baseline_weeks == 0 || self.baseline_weeks > MAX_WINDOW_WEEKS {
            return Err(EngineError::InvalidConfig(format!(
                "baseline_weeks must be within [1, {MAX_WINDOW_WEEKS}], got {}",
                self.baseline_weeks
            )));
        }
        validate_fraction("min_coverage", self.min_coverage)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityConfig {
    pub min_group_size: u32,
    /// 0 disables the sample-size gate.
    pub min_sample_size: usize,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            min_group_size: 8,
            min_sample_size: 3,
        }
    }
}

impl QualityConfig {
    pub fn validate(&self) -> Result<()> {
        if self.min_group_size == 0 {
            return Err(EngineError::InvalidConfig(
                "min_group_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OverloadWeights {
    pub meeting: f64,
    pub after_hours: f64,
    pub focus_time: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExecutionWeights {
    pub response_time: f64,
    pub meeting_fragmentation: f64,
    pub participation: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetentionWeights {
    pub attrition_risk: f64,
    pub network_shrinkage: f64,
    pub sentiment_drop: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompositeWeights {
    pub overload: OverloadWeights,
    pub execution: ExecutionWeights,
    pub retention: RetentionWeights,
}

impl Default for CompositeWeights {
    fn default() -> Self {
        Self {
            overload: OverloadWeights {
                meeting: 0.40,
                after_hours: 0.35,
                focus_time: 0.25,
            },
            execution: ExecutionWeights {
                response_time: 0.40,
                meeting_fragmentation: 0.30,
                participation: 0.30,
            },
            retention: RetentionWeights {
                attrition_risk: 0.40,
                network_shrinkage: 0.30,
                sentiment_drop: 0.30,
            },
        }
    }
}

impl CompositeWeights {
    pub fn validate(&self) -> Result<()> {
        let dimensions = [
            (
                "overload",
                [
                    self.overload.meeting,
                    self.overload.after_hours,
                    self.overload.focus_time,
                ],
            ),
            (
                "execution",
                [
                    self.execution.response_time,
                    self.execution.meeting_fragmentation,
                    self.execution.participation,
                ],
            ),
            (
                "retention",
                [
                    self.retention.attrition_risk,
                    self.retention.network_shrinkage,
                    self.retention.sentiment_drop,
                ],
            ),
        ];

        for (name, weights) in dimensions {
            if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
                return Err(EngineError::InvalidConfig(format!(
                    "{name} weights must be non-negative"
                )));
            }
            let total: f64 = weights.iter().sum();
            if (total - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
                return Err(EngineError::InvalidConfig(format!(
                    "{name} weights must sum to 1.0, got {total:.4}"
                )));
            }
        }
        Ok(())
    }
}

/// Band cut points on BDI plus the hysteresis applied when leaving a zone.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ZoneThresholds {
    /// BDI at or below this is green.
    pub green_max: f64,
    /// BDI at or below this (and above `green_max`) is yellow; above is red.
    pub yellow_max: f64,
    /// Distance below a cut point a team must fall before it leaves the
    /// higher zone.
    pub hysteresis: f64,
    /// Weeks in Recovery without reaching green before settling into Watch.
    pub recovery_hold_weeks: u32,
}

impl Default for ZoneThresholds {
    fn default() -> Self {
        Self {
            green_max: 35.0,
            yellow_max: 65.0,
            hysteresis: 5.0,
            recovery_hold_weeks: 2,
        }
    }
}

impl ZoneThresholds {
    pub fn validate(&self) -> Result<()> {
        let ordered = 0.0 <= self.green_max && self.green_max < self.yellow_max;
        if !(ordered && self.yellow_max <= 100.0) {
            return Err(EngineError::InvalidConfig(format!(
                "zone cut points must satisfy 0 <= green_max < yellow_max <= 100, got {} / {}",
                self.green_max, self.yellow_max
            )));
        }
        if !(self.hysteresis >= 0.0 && self.hysteresis < self.yellow_max - self.green_max) {
            return Err(EngineError::InvalidConfig(format!(
                "hysteresis must be in [0, yellow_max - green_max), got {}",
                self.hysteresis
            )));
        }
        if self.recovery_hold_weeks == 0 {
            return Err(EngineError::InvalidConfig(
                "recovery_hold_weeks must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    /// A week counts toward a streak when its score is strictly above this.
    /// Defaults to `yellow_max`, so only red weeks count.
    pub threshold: f64,
    pub min_weeks: usize,
    /// Slope (points per week) below `-slope_tolerance` reads as resolving.
    pub slope_tolerance: f64,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            threshold: 65.0,
            min_weeks: 3,
            slope_tolerance: 1.0,
        }
    }
}

impl PersistenceConfig {
    pub fn validate(&self) -> Result<()> {
        if self.min_weeks < MIN_PERSISTENT_WEEKS {
            return Err(EngineError::InvalidConfig(format!(
                "persistence min_weeks must be at least {MIN_PERSISTENT_WEEKS}, got {}",
                self.min_weeks
            )));
        }
        if !(0.0..100.0).contains(&self.threshold) {
            return Err(EngineError::InvalidConfig(format!(
                "persistence threshold must be within [0, 100), got {}",
                self.threshold
            )));
        }
        if !(self.slope_tolerance.is_finite() && self.slope_tolerance >= 0.0) {
            return Err(EngineError::InvalidConfig(format!(
                "slope_tolerance must be non-negative, got {}",
                self.slope_tolerance
            )));
        }
        Ok(())
    }
}

fn validate_fraction(name: &str, value: f64) -> Result<()> {
    if value > 0.0 && value <= 1.0 {
        Ok(())
    } else {
        Err(EngineError::InvalidConfig(format!(
            "{name} must be within (0, 1], got {value}"
        )))
    }
}
