//! Behavioral drift detection for team-aggregated weekly metrics.
//!
//! Raw weekly samples are turned into robust baselines, per-metric
//! deviations, an Overload / Execution / Retention composite with an overall
//! drift index (BDI), a team zone, and a structural-vs-episodic reading of
//! sustained risk. The statistical modules are pure; `db` and `report` are the
//! batch-job edges.

pub mod baseline;
pub mod composite;
pub mod config;
pub mod db;
pub mod deviation;
pub mod error;
pub mod models;
pub mod observability;
pub mod persistent;
pub mod pipeline;
pub mod quality;
pub mod report;
pub mod streak;
pub mod timeseries;
pub mod zone;

pub use baseline::{estimate_baseline, percentile};
pub use composite::aggregate_composite;
pub use config::EngineConfig;
pub use deviation::{normalize_value, score_deviation};
pub use error::{EngineError, Result};
pub use persistent::{classify_persistent_risk, PersistenceStrategy, SlopeStrategy};
pub use pipeline::{score_batch, score_team_week, TeamWeekInput, TeamWeekOutcome};
pub use quality::gate_data_quality;
pub use streak::track_streak;
pub use timeseries::build_time_series;
pub use zone::classify_zone;
