//! Logging configuration using tracing.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize logging with the specified level.
///
/// `output` selects the stream (`stderr` or `stdout`). Command results are
/// written to stdout, so the default configuration logs to stderr.
pub fn init(level: &str, output: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(filter);

    match output {
        "stderr" => registry.with(fmt::layer().with_writer(std::io::stderr)).try_init()?,
        "stdout" => registry.with(fmt::layer().with_writer(std::io::stdout)).try_init()?,
        other => anyhow::bail!("Unsupported log output: {other}"),
    }

    Ok(())
}
