//! Error taxonomy for the build pipeline.
//!
//! Each pipeline stage has its own error type so callers can tell a flaky
//! fetch apart from a broken site. [`PipelineError`] composes them for the
//! coordinator, which logs and swallows them at the pipeline boundary.

use std::path::PathBuf;
use std::time::Duration;

/// Invalid or missing configuration. Fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required configuration: {0}")]
    Missing(&'static str),

    #[error("invalid configuration for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Failures of the version-control client.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("failed to prepare working directory {path}: {source}")]
    WorkDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("git {operation} failed (exit code {exit_code}): {stderr}")]
    CommandFailed {
        operation: String,
        exit_code: i32,
        stderr: String,
    },

    #[error("git {operation} returned an empty revision")]
    EmptyRevision { operation: String },
}

/// The site generator could not produce an artifact.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("failed to allocate build directory {path}: {source}")]
    Allocate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to run generator {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("generator exited with code {exit_code} after {duration:?}")]
    GeneratorFailed {
        exit_code: i32,
        duration: Duration,
        output: String,
    },
}

impl BuildError {
    /// Captured generator output, when the generator actually ran.
    pub fn output(&self) -> Option<&str> {
        match self {
            BuildError::GeneratorFailed { output, .. } => Some(output),
            _ => None,
        }
    }
}

/// The `current` pointer could not be swapped.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("failed to create temporary pointer {path}: {source}")]
    TempPointer {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to swap {from} over {to}: {source}")]
    Swap {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A single retention entry could not be processed. Never fatal.
#[derive(Debug, thiserror::Error)]
pub enum PruneError {
    #[error("failed to list builds in {path}: {source}")]
    List {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to remove old build {path}: {source}")]
    Remove {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Any stage failure that ends a single pipeline run.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("sync failed: {0}")]
    Sync(#[from] SyncError),

    #[error("build failed: {0}")]
    Build(#[from] BuildError),

    #[error("publish failed: {0}")]
    Publish(#[from] PublishError),
}

impl PipelineError {
    /// Stage name used as a structured log field.
    pub fn stage(&self) -> &'static str {
        match self {
            PipelineError::Sync(_) => "sync",
            PipelineError::Build(_) => "build",
            PipelineError::Publish(_) => "publish",
        }
    }
}

/// The daemon could not start.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("initial clone failed: {0}")]
    Clone(#[from] SyncError),

    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },
}
