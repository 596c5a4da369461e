//! Daemon configuration.
//!
//! Every field can be set from the environment or from a command-line flag.
//! The struct is validated once at startup and is read-only afterwards.

use std::path::PathBuf;
use std::time::Duration;

use clap::Args;

use crate::error::ConfigError;

/// Configuration for the build daemon.
#[derive(Debug, Clone, Args)]
pub struct BuildConfig {
    /// Local working copy of the source repository
    #[arg(long, env = "WORKDIR", default_value = "/app/workdir")]
    pub workdir: PathBuf,

    /// Publish root holding the `current` pointer and build artifacts
    #[arg(long, env = "OUTPUT_DIR", default_value = "/app/public")]
    pub output_dir: PathBuf,

    /// Remote repository URL
    #[arg(long, env = "REPO_URL")]
    pub repo_url: String,

    /// Branch to track
    #[arg(long, env = "REPO_BRANCH", default_value = "main")]
    pub repo_branch: String,

    /// Shared secret for webhook signatures (empty disables verification)
    #[arg(long, env = "WEBHOOK_SECRET", default_value = "", hide_env_values = true)]
    pub webhook_secret: String,

    /// Address the webhook/health listener binds to (`host:port` or `:port`)
    #[arg(long, env = "SERVER_ADDRESS", default_value = ":8080")]
    pub server_address: String,

    /// Poll interval in seconds (0 disables polling)
    #[arg(long, env = "POLL_INTERVAL", default_value_t = 0)]
    pub poll_interval: u64,

    /// Extra generator arguments, comma separated
    #[arg(
        long,
        env = "HUGO_ARGS",
        value_delimiter = ',',
        default_value = "--minify,--gc",
        allow_hyphen_values = true
    )]
    pub hugo_args: Vec<String>,

    /// Site generator executable
    #[arg(long, env = "GENERATOR_BIN", default_value = "hugo")]
    pub generator_bin: String,

    /// Version-control client executable
    #[arg(long, env = "GIT_BIN", default_value = "git")]
    pub git_bin: String,
}

impl BuildConfig {
    /// Minimal configuration with defaults for everything but the paths and URL.
    pub fn new(
        workdir: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
        repo_url: impl Into<String>,
    ) -> Self {
        Self {
            workdir: workdir.into(),
            output_dir: output_dir.into(),
            repo_url: repo_url.into(),
            repo_branch: "main".to_string(),
            webhook_secret: String::new(),
            server_address: ":8080".to_string(),
            poll_interval: 0,
            hugo_args: vec!["--minify".to_string(), "--gc".to_string()],
            generator_bin: "hugo".to_string(),
            git_bin: "git".to_string(),
        }
    }

    /// Reject configurations the daemon cannot start with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.repo_url.trim().is_empty() {
            return Err(ConfigError::Missing("REPO_URL"));
        }
        if self.repo_branch.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "REPO_BRANCH",
                reason: "branch name must not be empty".to_string(),
            });
        }
        if self.server_address.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "SERVER_ADDRESS",
                reason: "listen address must not be empty".to_string(),
            });
        }
        if self.generator_bin.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "GENERATOR_BIN",
                reason: "generator executable must not be empty".to_string(),
            });
        }
        if self.git_bin.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "GIT_BIN",
                reason: "git executable must not be empty".to_string(),
            });
        }
        Ok(())
    }

    /// Poll interval, or `None` when polling is disabled.
    pub fn poll_every(&self) -> Option<Duration> {
        (self.poll_interval > 0).then(|| Duration::from_secs(self.poll_interval))
    }

    /// Address to hand to the listener. A bare `:port` binds all IPv4
    /// interfaces; host names are resolved at bind time.
    pub fn listen_address(&self) -> String {
        let address = self.server_address.trim();
        match address.strip_prefix(':') {
            Some(port) => format!("0.0.0.0:{port}"),
            None => address.to_string(),
        }
    }

    /// Full ref name pushed for the tracked branch.
    pub fn branch_ref(&self) -> String {
        format!("refs/heads/{}", self.repo_branch)
    }

    /// Generator arguments with blank entries (e.g. `HUGO_ARGS=""`) removed.
    pub fn generator_args(&self) -> Vec<String> {
        self.hugo_args
            .iter()
            .map(|a| a.trim())
            .filter(|a| !a.is_empty())
            .map(str::to_string)
            .collect()
    }
}
