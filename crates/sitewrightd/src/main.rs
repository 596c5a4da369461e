//! Sitewright daemon
//!
//! Keeps a working copy of `REPO_URL` in sync with `REPO_BRANCH`, rebuilds
//! the site on change (poll and/or webhook) and publishes each build under
//! `OUTPUT_DIR/current`. Runs until SIGINT or SIGTERM.

use anyhow::{Context, Result};
use clap::Parser;
use sitewright_core::{init_tracing, BuildConfig, Daemon, LogFormat};
use tracing::{info, Level};

#[derive(Parser, Debug)]
#[command(name = "sitewrightd")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Continuous-build daemon for static sites", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Log line format
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(flatten)]
    config: BuildConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    init_tracing(cli.log_format, level);

    let daemon = Daemon::from_config(cli.config)
        .await
        .context("Failed to start builder")?;
    info!(address = %daemon.local_addr(), "builder started successfully");

    let signal = wait_for_signal().await?;
    info!(signal, "received signal, shutting down");

    daemon.stop().await;
    Ok(())
}

#[cfg(unix)]
async fn wait_for_signal() -> Result<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm =
        signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for Ctrl-C")?;
            Ok("SIGINT")
        }
        _ = sigterm.recv() => Ok("SIGTERM"),
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    Ok("SIGINT")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_flags() {
        let cli = Cli::try_parse_from([
            "sitewrightd",
            "--repo-url",
            "https://example.com/site.git",
            "--log-format",
            "json",
            "--poll-interval",
            "30",
        ])
        .unwrap();
        assert_eq!(cli.log_format, LogFormat::Json);
        assert_eq!(cli.config.repo_url, "https://example.com/site.git");
        assert_eq!(cli.config.poll_interval, 30);
        assert_eq!(cli.config.generator_args(), vec!["--minify", "--gc"]);
    }

    #[test]
    fn test_cli_verify_command() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
