use serde::{Deserialize, Serialize};

pub const GROUP_SIZE_REASON: &str = "Below minimum group size for privacy";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QualityParams {
    pub active_users_count: u32,
    pub min_group_size: u32,
    pub data_coverage: f64,
    pub min_coverage: f64,
    pub sample_size: usize,
    /// 0 disables the sample-size check.
    pub min_sample_size: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityVerdict {
    pub meets: bool,
    pub reason: Option<String>,
}

impl QualityVerdict {
    fn pass() -> Self {
        Self {
            meets: true,
            reason: None,
        }
    }

    fn fail(reason: impl Into<String>) -> Self {
        Self {
            meets: false,
            reason: Some(reason.into()),
        }
    }
}

/// Decide whether a metric may be surfaced. The first failing rule wins and
/// the privacy floor is always checked first.
pub fn gate_data_quality(params: &QualityParams) -> QualityVerdict {
    if params.active_users_count < params.min_group_size {
        return QualityVerdict::fail(GROUP_SIZE_REASON);
    }

    if params.data_coverage < params.min_coverage {
        return QualityVerdict::fail(format!(
            "Insufficient data coverage: {:.0}% (minimum {:.0}%)",
            params.data_coverage * 100.0,
            params.min_coverage * 100.0
        ));
    }

    if params.min_sample_size > 0 && params.sample_size < params.min_sample_size {
        return QualityVerdict::fail(format!(
            "Insufficient samples: {} (minimum {})",
            params.sample_size, params.min_sample_size
        ));
    }

    QualityVerdict::pass()
}

/// The privacy floor on its own, checked before any per-metric work begins.
pub fn meets_group_size(active_users_count: u32, min_group_size: u32) -> bool {
    active_users_count >= min_group_size
}

#[cfg(test)]
mod tests {
    use super::*;

    fn healthy() -> QualityParams {
        QualityParams {
            active_users_count: 12,
            min_group_size: 8,
            data_coverage: 1.0,
            min_coverage: 0.7,
            sample_size: 6,
            min_sample_size: 3,
        }
    }

    #[test]
    fn passes_when_every_rule_holds() {
        let verdict = gate_data_quality(&healthy());
        assert!(verdict.meets);
        assert!(verdict.reason.is_none());
    }

    #[test]
    fn privacy_floor_wins_over_everything() {
        let params = QualityParams {
            active_users_count: 7,
            data_coverage: 0.0,
            sample_size: 0,
            ..healthy()
        };
        let verdict = gate_data_quality(&params);
        assert!(!verdict.meets);
        assert_eq!(verdict.reason.as_deref(), Some(GROUP_SIZE_REASON));
    }

    #[test]
    fn coverage_failure_reports_percentages() {
        let params = QualityParams {
            data_coverage: 0.5,
            ..healthy()
        };
        let verdict = gate_data_quality(&params);
        assert!(!verdict.meets);
        assert_eq!(
            verdict.reason.as_deref(),
            Some("Insufficient data coverage: 50% (minimum 70%)")
        );
    }

    #[test]
    fn sample_gate_is_disabled_at_zero() {
        let params = QualityParams {
            sample_size: 1,
            min_sample_size: 0,
            ..healthy()
        };
        assert!(gate_data_quality(&params).meets);

        let params = QualityParams {
            sample_size: 1,
            ..healthy()
        };
        assert!(!gate_data_quality(&params).meets);
    }
}
