//! Sitewright Core Library
//!
//! Build orchestration and publication engine for a continuously rebuilt
//! static site: source sync, single-flight builds, atomic publication and
//! the poll/webhook trigger sources that feed them.

pub mod config;
pub mod coordinator;
pub mod error;
pub mod executor;
pub mod fakes;
pub mod generator;
pub mod http;
pub mod lifecycle;
pub mod metrics;
pub mod obs;
pub mod poller;
pub mod publish;
pub mod shutdown;
pub mod state;
pub mod sync;
pub mod telemetry;
pub mod vcs;
pub mod webhook;

pub use config::BuildConfig;
pub use coordinator::{BuildCoordinator, PipelineOutcome, TriggerOutcome, TriggerSource};
pub use error::{
    BuildError, ConfigError, PipelineError, PruneError, PublishError, StartupError, SyncError,
};
pub use executor::{BuildArtifact, BuildExecutor, BuildId};
pub use generator::{GeneratorCli, GeneratorOutput, SiteGenerator};
pub use http::{router, AppState, HealthResponse, MAX_WEBHOOK_BODY};
pub use lifecycle::{Daemon, SHUTDOWN_TIMEOUT};
pub use poller::run_poller;
pub use publish::{PruneReport, Publisher};
pub use shutdown::{Shutdown, ShutdownSignal};
pub use state::{BuildGuard, BuilderState, StateSnapshot};
pub use sync::{RetryPolicy, SourceSync, SyncOutcome};
pub use vcs::{GitCli, SourceControl};
pub use webhook::{verify_signature, WebhookDecision};

pub use metrics::METRICS;
pub use obs::{
    build_span, emit_build_failed, emit_build_finished, emit_build_started,
    emit_publish_completed, emit_trigger_dropped,
};
pub use telemetry::{init_tracing, LogFormat};

/// Sitewright version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
