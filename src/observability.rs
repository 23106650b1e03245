use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global subscriber. `RUST_LOG` wins over the `verbose` flag.
pub fn init_logging(verbose: bool) -> anyhow::Result<()> {
    let default_filter = if verbose {
        "team_drift_engine=debug,sqlx=warn,info"
    } else {
        "team_drift_engine=info,sqlx=warn,warn"
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(verbose)
        .with_line_number(verbose)
        .with_writer(std::io::stderr);

    // A second init (tests, embedding callers) keeps the existing subscriber.
    if tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .is_ok()
    {
        debug!("logging initialized");
    }
    Ok(())
}
