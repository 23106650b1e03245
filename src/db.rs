use anyhow::Context;
use chrono::{Duration, NaiveDate};
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::{debug, info};
use uuid::Uuid;

use crate::models::{
    week_start_of, Band, CompositeRiskScore, MetricKey, MetricSample, Zone, ZoneState,
};
use crate::pipeline::{BatchReport, MetricScore, TeamWeekInput, TeamWeekScore};
use crate::zone::ZoneTrack;

#[derive(Debug, Clone)]
pub struct TeamRecord {
    pub team_id: String,
    pub display_name: String,
    pub active_users: u32,
}

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

async fn upsert_team(
    tx: &mut Transaction<'_, Postgres>,
    team_id: &str,
    display_name: &str,
    active_users: u32,
) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO drift_engine.teams (team_id, display_name, active_users)
        VALUES ($1, $2, $3)
        ON CONFLICT (team_id) DO UPDATE
        SET display_name = EXCLUDED.display_name,
            active_users = EXCLUDED.active_users,
            updated_at = now()
        "#,
    )
    .bind(team_id)
    .bind(display_name)
    .bind(i32::try_from(active_users).context("active_users out of range")?)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Append a sample; an existing `(team, metric, week)` row is left untouched.
async fn insert_sample(
    tx: &mut Transaction<'_, Postgres>,
    sample: &MetricSample,
    source_key: &str,
) -> anyhow::Result<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO drift_engine.metric_samples
        (id, team_id, metric_key, week_start, value, source_key)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (team_id, metric_key, week_start) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(&sample.team_id)
    .bind(&sample.metric_key)
    .bind(sample.week_start)
    .bind(sample.value)
    .bind(source_key)
    .execute(&mut **tx)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<usize> {
    let teams = [
        ("platform", "Platform Engineering", 14u32),
        ("growth", "Growth Marketing", 9),
        ("design", "Design Studio", 6),
    ];
    let first_week = NaiveDate::from_ymd_opt(2026, 1, 5).context("invalid date")?;
    let weeks = 12i64;

    let mut tx = pool.begin().await?;
    let mut inserted = 0usize;

    for (team_index, (team_id, display_name, active_users)) in teams.iter().enumerate() {
        upsert_team(&mut tx, team_id, display_name, *active_users).await?;

        for (metric_index, key) in MetricKey::ALL.iter().enumerate() {
            for week in 0..weeks {
                let sample = MetricSample {
                    team_id: team_id.to_string(),
                    metric_key: key.as_str().to_string(),
                    week_start: first_week + Duration::weeks(week),
                    value: seed_value(team_index, metric_index, *key, week, weeks),
                };
                let source_key = format!("seed-{team_id}-{}-{}", key, sample.week_start);
                if insert_sample(&mut tx, &sample, &source_key).await? {
                    inserted += 1;
                }
            }
        }
    }

    tx.commit().await?;
    Ok(inserted)
}

/// Steady weekly values with small jitter; the platform team drifts into
/// overload over its last three weeks.
fn seed_value(
    team_index: usize,
    metric_index: usize,
    key: MetricKey,
    week: i64,
    weeks: i64,
) -> f64 {
    let base = 20.0 + (metric_index as f64) * 5.0 + (team_index as f64) * 2.0;
    let jitter = ((week * 7 + metric_index as i64 * 3 + team_index as i64) % 5) as f64 - 2.0;
    let surging = team_index == 0 && week >= weeks - 3;
    let step = (week - weeks + 4) as f64;
    let surge = match key {
        MetricKey::MeetingLoad | MetricKey::AfterHours if surging => 12.0 * step,
        MetricKey::FocusTime if surging => -8.0 * step,
        _ => 0.0,
    };
    base + jitter + surge
}

pub async fn import_csv(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<usize> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        team_id: String,
        team_name: String,
        active_users: u32,
        metric_key: String,
        week_start: NaiveDate,
        value: f64,
        source_key: Option<String>,
    }

    let mut reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let mut tx = pool.begin().await?;
    let mut inserted = 0usize;

    for (line, result) in reader.deserialize::<CsvRow>().enumerate() {
        let row = result.with_context(|| format!("malformed row {}", line + 2))?;
        if !row.value.is_finite() {
            anyhow::bail!("row {} has a non-finite value", line + 2);
        }
        upsert_team(&mut tx, &row.team_id, &row.team_name, row.active_users).await?;

        let sample = MetricSample {
            team_id: row.team_id,
            metric_key: row.metric_key,
            week_start: week_start_of(row.week_start),
            value: row.value,
        };
        let source_key = row
            .source_key
            .unwrap_or_else(|| format!("import-{}", Uuid::new_v4()));

        if insert_sample(&mut tx, &sample, &source_key).await? {
            inserted += 1;
        }
    }

    tx.commit().await?;
    Ok(inserted)
}

pub async fn fetch_teams(pool: &PgPool, team: Option<&str>) -> anyhow::Result<Vec<TeamRecord>> {
    let mut query = String::from(
        "SELECT team_id, display_name, active_users FROM drift_engine.teams",
    );
    if team.is_some() {
        query.push_str(" WHERE team_id = $1");
    }
    query.push_str(" ORDER BY team_id");

    let mut rows = sqlx::query(&query);
    if let Some(value) = team {
        rows = rows.bind(value);
    }

    let mut teams = Vec::new();
    for row in rows.fetch_all(pool).await? {
        let active_users: i32 = row.get("active_users");
        teams.push(TeamRecord {
            team_id: row.get("team_id"),
            display_name: row.get("display_name"),
            active_users: u32::try_from(active_users).context("negative active_users")?,
        });
    }
    Ok(teams)
}

pub async fn fetch_samples(
    pool: &PgPool,
    team_id: &str,
    since: NaiveDate,
    until: NaiveDate,
) -> anyhow::Result<Vec<MetricSample>> {
    let rows = sqlx::query(
        r#"
        SELECT team_id, metric_key, week_start, value
        FROM drift_engine.metric_samples
        WHERE team_id = $1 AND week_start >= $2 AND week_start <= $3
        ORDER BY metric_key, week_start
        "#,
    )
    .bind(team_id)
    .bind(since)
    .bind(until)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| MetricSample {
            team_id: row.get("team_id"),
            metric_key: row.get("metric_key"),
            week_start: row.get("week_start"),
            value: row.get("value"),
        })
        .collect())
}

async fn fetch_previous_zone(
    pool: &PgPool,
    team_id: &str,
    week_start: NaiveDate,
) -> anyhow::Result<Option<ZoneTrack>> {
    let row = sqlx::query(
        r#"
        SELECT zone, band, weeks_in_zone
        FROM drift_engine.weekly_scores
        WHERE team_id = $1 AND week_start < $2
        ORDER BY week_start DESC
        LIMIT 1
        "#,
    )
    .bind(team_id)
    .bind(week_start)
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };
    let zone: String = row.get("zone");
    let band: String = row.get("band");
    let weeks_in_zone: i32 = row.get("weeks_in_zone");
    Ok(Some(ZoneTrack {
        zone: zone.parse::<Zone>()?,
        band: band.parse::<Band>()?,
        weeks_in_zone: u32::try_from(weeks_in_zone).context("negative weeks_in_zone")?,
    }))
}

/// Assemble scoring inputs for every team (or one) for `week_start`.
pub async fn fetch_team_inputs(
    pool: &PgPool,
    week_start: NaiveDate,
    team: Option<&str>,
    baseline_weeks: u32,
) -> anyhow::Result<Vec<TeamWeekInput>> {
    let window_start = baseline_window_start(week_start, baseline_weeks)?;
    let mut inputs = Vec::new();

    for record in fetch_teams(pool, team).await? {
        let samples = fetch_samples(pool, &record.team_id, window_start, week_start).await?;
        let previous_zone = fetch_previous_zone(pool, &record.team_id, week_start).await?;
        debug!(team_id = %record.team_id, samples = samples.len(), "loaded team inputs");
        inputs.push(TeamWeekInput {
            team_id: record.team_id,
            week_start,
            active_users: record.active_users,
            samples,
            previous_zone,
        });
    }
    Ok(inputs)
}

fn baseline_window_start(week_start: NaiveDate, baseline_weeks: u32) -> anyhow::Result<NaiveDate> {
    week_start
        .checked_sub_signed(Duration::weeks(i64::from(baseline_weeks)))
        .with_context(|| format!("{baseline_weeks} weeks before {week_start} is out of range"))
}

pub async fn start_run(pool: &PgPool, week_start: NaiveDate) -> anyhow::Result<Uuid> {
    let run_id = Uuid::new_v4();
    sqlx::query("INSERT INTO drift_engine.scoring_runs (id, week_start) VALUES ($1, $2)")
        .bind(run_id)
        .bind(week_start)
        .execute(pool)
        .await?;
    Ok(run_id)
}

pub async fn finish_run(pool: &PgPool, run_id: Uuid, report: &BatchReport) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        UPDATE drift_engine.scoring_runs
        SET finished_at = now(), teams_scored = $2, teams_suppressed = $3, teams_failed = $4
        WHERE id = $1
        "#,
    )
    .bind(run_id)
    .bind(report.scored().count() as i32)
    .bind(report.suppressed_count() as i32)
    .bind(report.failures.len() as i32)
    .execute(pool)
    .await?;
    Ok(())
}

/// Write one team-week atomically, superseding any earlier run for the same
/// `(team_id, week_start)`.
pub async fn upsert_team_week(
    pool: &PgPool,
    run_id: Uuid,
    score: &TeamWeekScore,
) -> anyhow::Result<()> {
    let team_id = score.composite.team_id.as_str();
    let week_start = score.composite.week_start;
    let mut tx = pool.begin().await?;

    for metric in &score.metrics {
        upsert_baseline(&mut tx, team_id, week_start, metric).await?;
        upsert_deviation(&mut tx, team_id, week_start, metric).await?;
    }

    sqlx::query(
        r#"
        INSERT INTO drift_engine.weekly_scores
        (team_id, week_start, overload, execution, retention, bdi, band, zone,
         weeks_in_zone, run_id)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        ON CONFLICT (team_id, week_start) DO UPDATE
        SET overload = EXCLUDED.overload,
            execution = EXCLUDED.execution,
            retention = EXCLUDED.retention,
            bdi = EXCLUDED.bdi,
            band = EXCLUDED.band,
            zone = EXCLUDED.zone,
            weeks_in_zone = EXCLUDED.weeks_in_zone,
            run_id = EXCLUDED.run_id
        "#,
    )
    .bind(team_id)
    .bind(week_start)
    .bind(score.composite.overload)
    .bind(score.composite.execution)
    .bind(score.composite.retention)
    .bind(score.composite.bdi)
    .bind(score.zone.band.as_str())
    .bind(score.zone.zone.as_str())
    .bind(i32::try_from(score.zone.weeks_in_zone).context("weeks_in_zone out of range")?)
    .bind(run_id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    info!(
        team_id,
        %week_start,
        bdi = score.composite.bdi,
        zone = score.zone.zone.as_str(),
        "team week stored"
    );
    Ok(())
}

async fn upsert_baseline(
    tx: &mut Transaction<'_, Postgres>,
    team_id: &str,
    week_start: NaiveDate,
    metric: &MetricScore,
) -> anyhow::Result<()> {
    let baseline = &metric.baseline;
    sqlx::query(
        r#"
        INSERT INTO drift_engine.baselines
        (team_id, week_start, metric_key, window_weeks, mean, median, std, mad, p25, p75,
         confidence, sample_size, meets_quality, quality_reason)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
        ON CONFLICT (team_id, week_start, metric_key) DO UPDATE
        SET window_weeks = EXCLUDED.window_weeks,
            mean = EXCLUDED.mean,
            median = EXCLUDED.median,
            std = EXCLUDED.std,
            mad = EXCLUDED.mad,
            p25 = EXCLUDED.p25,
            p75 = EXCLUDED.p75,
            confidence = EXCLUDED.confidence,
            sample_size = EXCLUDED.sample_size,
            meets_quality = EXCLUDED.meets_quality,
            quality_reason = EXCLUDED.quality_reason
        "#,
    )
    .bind(team_id)
    .bind(week_start)
    .bind(&baseline.metric_key)
    .bind(i32::try_from(baseline.window_weeks).context("window_weeks out of range")?)
    .bind(baseline.mean)
    .bind(baseline.median)
    .bind(baseline.std)
    .bind(baseline.mad)
    .bind(baseline.p25)
    .bind(baseline.p75)
    .bind(baseline.confidence)
    .bind(i32::try_from(baseline.sample_size).context("sample_size out of range")?)
    .bind(metric.verdict.meets)
    .bind(metric.verdict.reason.as_deref())
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// A gated metric removes any deviation an earlier run stored for it.
async fn upsert_deviation(
    tx: &mut Transaction<'_, Postgres>,
    team_id: &str,
    week_start: NaiveDate,
    metric: &MetricScore,
) -> anyhow::Result<()> {
    let Some(deviation) = &metric.deviation else {
        sqlx::query(
            r#"
            DELETE FROM drift_engine.deviations
            WHERE team_id = $1 AND week_start = $2 AND metric_key = $3
            "#,
        )
        .bind(team_id)
        .bind(week_start)
        .bind(&metric.baseline.metric_key)
        .execute(&mut **tx)
        .await?;
        return Ok(());
    };

    sqlx::query(
        r#"
        INSERT INTO drift_engine.deviations
        (team_id, week_start, metric_key, current_value, robust_z, standard_z, delta_abs,
         delta_pct, outside_band, direction, magnitude)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        ON CONFLICT (team_id, week_start, metric_key) DO UPDATE
        SET current_value = EXCLUDED.current_value,
            robust_z = EXCLUDED.robust_z,
            standard_z = EXCLUDED.standard_z,
            delta_abs = EXCLUDED.delta_abs,
            delta_pct = EXCLUDED.delta_pct,
            outside_band = EXCLUDED.outside_band,
            direction = EXCLUDED.direction,
            magnitude = EXCLUDED.magnitude
        "#,
    )
    .bind(team_id)
    .bind(week_start)
    .bind(&deviation.metric_key)
    .bind(deviation.current_value)
    .bind(deviation.robust_z)
    .bind(deviation.standard_z)
    .bind(deviation.delta_abs)
    .bind(deviation.delta_pct)
    .bind(deviation.outside_band)
    .bind(deviation.direction.map(|direction| direction.as_str()))
    .bind(metric.magnitude)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Remove everything stored for a team-week that may no longer be shown,
/// e.g. after the team fell below the privacy floor.
pub async fn clear_team_week(
    pool: &PgPool,
    team_id: &str,
    week_start: NaiveDate,
) -> anyhow::Result<()> {
    let mut tx = pool.begin().await?;
    for table in ["deviations", "baselines", "weekly_scores"] {
        let statement =
            format!("DELETE FROM drift_engine.{table} WHERE team_id = $1 AND week_start = $2");
        sqlx::query(&statement)
            .bind(team_id)
            .bind(week_start)
            .execute(&mut *tx)
            .await?;
    }
    tx.commit().await?;
    Ok(())
}

/// Oldest-first weekly composites and zones for a team.
pub async fn fetch_score_history(
    pool: &PgPool,
    team_id: &str,
    since: NaiveDate,
    until: NaiveDate,
) -> anyhow::Result<Vec<(CompositeRiskScore, ZoneState)>> {
    let rows = sqlx::query(
        r#"
        SELECT team_id, week_start, overload, execution, retention, bdi, band, zone, weeks_in_zone
        FROM drift_engine.weekly_scores
        WHERE team_id = $1 AND week_start >= $2 AND week_start <= $3
        ORDER BY week_start
        "#,
    )
    .bind(team_id)
    .bind(since)
    .bind(until)
    .fetch_all(pool)
    .await?;

    let mut history = Vec::with_capacity(rows.len());
    for row in rows {
        let team_id: String = row.get("team_id");
        let week_start: NaiveDate = row.get("week_start");
        let band: String = row.get("band");
        let zone: String = row.get("zone");
        let weeks_in_zone: i32 = row.get("weeks_in_zone");

        history.push((
            CompositeRiskScore {
                team_id: team_id.clone(),
                week_start,
                overload: row.get("overload"),
                execution: row.get("execution"),
                retention: row.get("retention"),
                bdi: row.get("bdi"),
            },
            ZoneState {
                team_id,
                week_start,
                zone: zone.parse::<Zone>()?,
                band: band.parse::<Band>()?,
                weeks_in_zone: u32::try_from(weeks_in_zone).context("negative weeks_in_zone")?,
            },
        ));
    }
    Ok(history)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_values_stay_calm_outside_the_surge() {
        for week in 0..12 {
            let value = seed_value(1, 0, MetricKey::MeetingLoad, week, 12);
            assert!((20.0..=24.0).contains(&value), "week {week}: {value}");
        }
    }

    #[test]
    fn seed_surge_only_hits_platform_overload_metrics() {
        let calm = seed_value(0, 0, MetricKey::MeetingLoad, 8, 12);
        let peak = seed_value(0, 0, MetricKey::MeetingLoad, 11, 12);
        assert!(peak - calm > 30.0);

        let focus = seed_value(0, 2, MetricKey::FocusTime, 11, 12);
        assert!(focus < 10.0);

        let untouched = seed_value(0, 3, MetricKey::ResponseTime, 11, 12);
        assert!(untouched > 30.0);
    }

    #[test]
    fn window_start_fails_instead_of_overflowing() {
        let week = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        let start = baseline_window_start(week, 6).unwrap();
        assert_eq!(start, NaiveDate::from_ymd_opt(2026, 1, 19).unwrap());
        assert!(baseline_window_start(week, u32::MAX).is_err());
    }
}
