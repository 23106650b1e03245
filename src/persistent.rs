use crate::config::{PersistenceConfig, MIN_PERSISTENT_WEEKS};
use crate::models::{Classification, CompositeRiskScore, PersistentRisk, RiskType};
use crate::streak::streak_above;

/// Decides whether a qualifying streak is structural or episodic.
pub trait PersistenceStrategy: Send + Sync {
    /// `streak_scores` is oldest first and never empty.
    fn classify(&self, streak_scores: &[f64]) -> Classification;
}

/// Least-squares slope across the streak: flat or rising is structural.
#[derive(Debug, Clone, Copy)]
pub struct SlopeStrategy {
    pub tolerance: f64,
}

impl SlopeStrategy {
    pub fn from_config(config: &PersistenceConfig) -> Self {
        Self {
            tolerance: config.slope_tolerance,
        }
    }
}

impl PersistenceStrategy for SlopeStrategy {
    fn classify(&self, streak_scores: &[f64]) -> Classification {
        match least_squares_slope(streak_scores) {
            Some(slope) if slope < -self.tolerance => Classification::Episodic,
            _ => Classification::Structural,
        }
    }
}

/// Episodic once the latest score has decayed a fraction below the streak peak.
#[derive(Debug, Clone, Copy)]
pub struct PeakDecayStrategy {
    pub decay_ratio: f64,
}

impl PersistenceStrategy for PeakDecayStrategy {
    fn classify(&self, streak_scores: &[f64]) -> Classification {
        let peak = streak_scores.iter().copied().fold(f64::MIN, f64::max);
        match streak_scores.last() {
            Some(latest) if *latest < peak * (1.0 - self.decay_ratio) => Classification::Episodic,
            _ => Classification::Structural,
        }
    }
}

/// Label a streak, or `None` when it is too short to count as persistent.
///
/// `score_history` is oldest first; only its trailing `weeks_above_threshold`
/// entries are considered. `min_weeks` never drops below three.
pub fn classify_persistent_risk(
    risk_type: RiskType,
    weeks_above_threshold: usize,
    score_history: &[f64],
    min_weeks: usize,
    strategy: &dyn PersistenceStrategy,
) -> Option<PersistentRisk> {
    if weeks_above_threshold < min_weeks.max(MIN_PERSISTENT_WEEKS) {
        return None;
    }
    let streak_len = weeks_above_threshold.min(score_history.len());
    if streak_len == 0 {
        return None;
    }
    let streak = &score_history[score_history.len() - streak_len..];
    let avg_score = streak.iter().sum::<f64>() / streak_len as f64;

    Some(PersistentRisk {
        risk_type,
        weeks_above_threshold,
        avg_score,
        classification: strategy.classify(streak),
    })
}

/// Monthly scan over each risk dimension of an oldest-first score history.
pub fn scan_persistent_risks(
    history: &[CompositeRiskScore],
    config: &PersistenceConfig,
    strategy: &dyn PersistenceStrategy,
) -> Vec<PersistentRisk> {
    RiskType::ALL
        .into_iter()
        .filter_map(|risk_type| {
            let scores: Vec<f64> = history
                .iter()
                .map(|score| score.dimension(risk_type))
                .collect();
            let weeks = streak_above(&scores, config.threshold);
            classify_persistent_risk(risk_type, weeks, &scores, config.min_weeks, strategy)
        })
        .collect()
}

fn least_squares_slope(values: &[f64]) -> Option<f64> {
    let n = values.len();
    if n < 2 {
        return None;
    }
    let mean_x = (n - 1) as f64 / 2.0;
    let mean_y = values.iter().sum::<f64>() / n as f64;
    let (num, den) = values
        .iter()
        .enumerate()
        .fold((0.0, 0.0), |(num, den), (i, y)| {
            let dx = i as f64 - mean_x;
            (num + dx * (y - mean_y), den + dx * dx)
        });
    Some(num / den)
}
