use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use chrono::{Duration, NaiveDate, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};

use team_drift_engine::config::EngineConfig;
use team_drift_engine::models::week_start_of;
use team_drift_engine::persistent::SlopeStrategy;
use team_drift_engine::pipeline::{score_batch, TeamWeekOutcome};
use team_drift_engine::report::{build_monthly_report, render_markdown, MonthWindow};
use team_drift_engine::{db, observability};

#[derive(Parser)]
#[command(name = "team-drift-engine")]
#[command(
    about = "Weekly behavioral drift scoring for team-aggregated metrics",
    long_about = None
)]
struct Cli {
    /// TOML scoring policy; defaults apply when omitted
    #[arg(long, global = true, env = "DRIFT_ENGINE_CONFIG")]
    config: Option<PathBuf>,
    /// Debug-level logging for the engine
    #[arg(long, short, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum ReportFormat {
    Markdown,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load realistic seed teams and weekly samples
    Seed,
    /// Import weekly metric samples from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Score every team (or one) for a week and store the results
    Score {
        /// Any date inside the week to score; defaults to last week
        #[arg(long)]
        week: Option<NaiveDate>,
        #[arg(long)]
        team: Option<String>,
    },
    /// Write a monthly drift report for one team
    Report {
        #[arg(long)]
        team: String,
        /// Month as YYYY-MM
        #[arg(long)]
        month: String,
        #[arg(long, value_enum, default_value_t = ReportFormat::Markdown)]
        format: ReportFormat,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    observability::init_logging(cli.verbose)?;
    let config = EngineConfig::load(cli.config.as_deref())?;

    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set to a production Postgres instance")?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")?;

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            let inserted = db::seed(&pool).await?;
            println!("Seed data inserted ({inserted} samples).");
        }
        Commands::Import { csv } => {
            let inserted = db::import_csv(&pool, &csv).await?;
            println!("Inserted {inserted} samples from {}.", csv.display());
        }
        Commands::Score { week, team } => {
            let week = week.unwrap_or_else(|| Utc::now().date_naive() - Duration::weeks(1));
            let week_start = week_start_of(week);
            let inputs = db::fetch_team_inputs(
                &pool,
                week_start,
                team.as_deref(),
                config.baseline.baseline_weeks,
            )
            .await?;

            if inputs.is_empty() {
                println!("No teams found to score.");
                return Ok(());
            }

            let run_id = db::start_run(&pool, week_start).await?;
            info!(%run_id, %week_start, teams = inputs.len(), "scoring run started");
            let mut report = score_batch(inputs, Arc::new(config)).await;

            let mut unstored = Vec::new();
            for (index, outcome) in report.outcomes.iter().enumerate() {
                let stored = match outcome {
                    TeamWeekOutcome::Scored(score) => {
                        db::upsert_team_week(&pool, run_id, score).await
                    }
                    TeamWeekOutcome::Suppressed {
                        team_id,
                        week_start,
                        ..
                    } => db::clear_team_week(&pool, team_id, *week_start).await,
                };
                if let Err(err) = stored {
                    warn!(team_id = outcome.team_id(), error = %err, "failed to store team week");
                    unstored.push((index, format!("storage failed: {err:#}")));
                }
            }
            report.fail_outcomes(unstored);
            db::finish_run(&pool, run_id, &report).await?;

            println!("Week of {week_start}:");
            for outcome in &report.outcomes {
                match outcome {
                    TeamWeekOutcome::Scored(score) => println!(
                        "- {} BDI {:.1} ({} / {}) overload {:.1}, execution {:.1}, retention {:.1}",
                        score.composite.team_id,
                        score.composite.bdi,
                        score.zone.zone.as_str(),
                        score.zone.band.as_str(),
                        score.composite.overload,
                        score.composite.execution,
                        score.composite.retention
                    ),
                    TeamWeekOutcome::Suppressed { team_id, reason, .. } => {
                        println!("- {team_id} suppressed: {reason}")
                    }
                }
            }
            for failure in &report.failures {
                println!("- {} failed: {}", failure.team_id, failure.error);
            }
        }
        Commands::Report {
            team,
            month,
            format,
            out,
        } => {
            let month = MonthWindow::parse(&month)?;
            let record = db::fetch_teams(&pool, Some(team.as_str()))
                .await?
                .into_iter()
                .next()
                .with_context(|| format!("unknown team '{team}'"))?;

            let lookback_weeks = config.baseline.baseline_weeks as usize + config.weeks_to_show;
            let since = i64::try_from(lookback_weeks)
                .ok()
                .and_then(|weeks| month.start.checked_sub_signed(Duration::weeks(weeks)))
                .with_context(|| {
                    format!("{lookback_weeks} weeks before {} is out of range", month.start)
                })?;
            let history = db::fetch_score_history(&pool, &record.team_id, since, month.end).await?;
            let samples = db::fetch_samples(&pool, &record.team_id, since, month.end).await?;

            let strategy = SlopeStrategy::from_config(&config.persistence);
            let report = build_monthly_report(
                &record.team_id,
                &record.display_name,
                month,
                &history,
                &samples,
                &config,
                &strategy,
            )?;

            let rendered = match format {
                ReportFormat::Markdown => render_markdown(&report),
                ReportFormat::Json => serde_json::to_string_pretty(&report)?,
            };
            std::fs::write(&out, rendered)?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}
