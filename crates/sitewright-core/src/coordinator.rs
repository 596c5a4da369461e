//! Build coordinator: the single-flight gate in front of the pipeline.
//!
//! Every trigger goes through [`BuildCoordinator::trigger`]. Admission is a
//! check-and-set of the shared `is_building` flag; a trigger that loses is
//! dropped rather than queued, since the next build re-fetches the remote
//! anyway. An admitted pipeline runs sync → render → publish on its own task
//! and releases the flag when its [`BuildGuard`] drops.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use tokio::task::JoinHandle;
use tracing::{error, info, Instrument};

use crate::config::BuildConfig;
use crate::error::PipelineError;
use crate::executor::{discard_dir, BuildExecutor, BuildId};
use crate::generator::SiteGenerator;
use crate::metrics::METRICS;
use crate::obs;
use crate::publish::{Publisher, DEFAULT_RETAIN};
use crate::shutdown::ShutdownSignal;
use crate::state::{BuildGuard, BuilderState};
use crate::sync::{RetryPolicy, SourceSync};
use crate::vcs::SourceControl;

/// Where a build request came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerSource {
    Startup,
    Poll,
    Webhook,
}

impl fmt::Display for TriggerSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TriggerSource::Startup => "startup",
            TriggerSource::Poll => "poll",
            TriggerSource::Webhook => "webhook",
        };
        f.write_str(name)
    }
}

/// Admission decision for one trigger.
#[derive(Debug)]
pub enum TriggerOutcome {
    /// A pipeline was spawned. The handle resolves when it has finished
    /// (successfully or not); callers are free to drop it.
    Started(JoinHandle<()>),

    /// Another build holds the slot; the trigger was dropped.
    AlreadyBuilding,

    /// Shutdown has been requested; the trigger was abandoned.
    ShuttingDown,
}

impl TriggerOutcome {
    pub fn is_started(&self) -> bool {
        matches!(self, TriggerOutcome::Started(_))
    }
}

/// How an admitted pipeline ended without error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineOutcome {
    Published { build_id: BuildId, commit: String },
    Cancelled,
}

/// Serializes Synchronizer → Executor → Publisher.
pub struct BuildCoordinator {
    state: Arc<BuilderState>,
    sync: SourceSync,
    executor: BuildExecutor,
    publisher: Publisher,
    args: Vec<String>,
    retain: usize,
    shutdown: ShutdownSignal,
}

impl BuildCoordinator {
    pub fn new(
        config: &BuildConfig,
        state: Arc<BuilderState>,
        vcs: Arc<dyn SourceControl>,
        generator: Arc<dyn SiteGenerator>,
        shutdown: ShutdownSignal,
    ) -> Self {
        let sync = SourceSync::new(
            vcs,
            Arc::clone(&state),
            &config.workdir,
            &config.repo_url,
            &config.repo_branch,
        );
        Self {
            state,
            sync,
            executor: BuildExecutor::new(generator, &config.output_dir),
            publisher: Publisher::new(&config.output_dir),
            args: config.generator_args(),
            retain: DEFAULT_RETAIN,
            shutdown,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.sync = self.sync.with_retry(retry);
        self
    }

    pub fn state(&self) -> &Arc<BuilderState> {
        &self.state
    }

    pub fn sync(&self) -> &SourceSync {
        &self.sync
    }

    pub fn publisher(&self) -> &Publisher {
        &self.publisher
    }

    /// Request a build.
    ///
    /// Never waits for the build itself. A panic inside the pipeline is
    /// logged by a supervising task and still releases the build slot.
    pub fn trigger(self: &Arc<Self>, source: TriggerSource) -> TriggerOutcome {
        METRICS.inc_triggers_received();

        if self.shutdown.is_cancelled() {
            METRICS.inc_triggers_dropped();
            obs::emit_trigger_dropped(source, "shutting down");
            return TriggerOutcome::ShuttingDown;
        }

        let Some(guard) = self.state.try_begin_build() else {
            METRICS.inc_triggers_dropped();
            obs::emit_trigger_dropped(source, "build already in progress");
            return TriggerOutcome::AlreadyBuilding;
        };

        let coordinator = Arc::clone(self);
        let pipeline = tokio::spawn(
            async move { coordinator.run_admitted(guard, source).await }
                .instrument(obs::build_span(source)),
        );

        TriggerOutcome::Started(tokio::spawn(async move {
            if let Err(e) = pipeline.await {
                if e.is_panic() {
                    METRICS.inc_builds_failed();
                    error!(trigger = %source, "build pipeline panicked");
                } else {
                    error!(trigger = %source, error = %e, "build pipeline aborted");
                }
            }
        }))
    }

    async fn run_admitted(&self, _guard: BuildGuard, source: TriggerSource) {
        let start = Instant::now();
        obs::emit_build_started(source);

        match self.run_pipeline().await {
            Ok(PipelineOutcome::Published { build_id, commit }) => {
                METRICS.inc_builds_succeeded();
                obs::emit_build_finished(&build_id.to_string(), &commit, start.elapsed());
            }
            Ok(PipelineOutcome::Cancelled) => {
                info!("build cancelled due to shutdown");
            }
            Err(e) => {
                METRICS.inc_builds_failed();
                obs::emit_build_failed(&self.state.last_commit(), &e, start.elapsed());
            }
        }
        METRICS.flush();
    }

    /// Run sync → render → publish once.
    ///
    /// Callers must hold the build slot. Cancellation is checked before each
    /// stage; a rendered artifact that will not be published is removed.
    pub async fn run_pipeline(&self) -> Result<PipelineOutcome, PipelineError> {
        if self.shutdown.is_cancelled() {
            return Ok(PipelineOutcome::Cancelled);
        }

        let synced = self.sync.sync_with_retry().await?;
        let commit = synced.commit().to_string();

        if self.shutdown.is_cancelled() {
            return Ok(PipelineOutcome::Cancelled);
        }

        info!(commit = %commit, "building site");
        let artifact = self.executor.render(self.sync.workdir(), &self.args).await?;

        if self.shutdown.is_cancelled() {
            discard_dir(&artifact.dir).await;
            return Ok(PipelineOutcome::Cancelled);
        }

        if let Err(e) = self.publisher.publish(&artifact) {
            discard_dir(&artifact.dir).await;
            return Err(e.into());
        }
        obs::emit_publish_completed(&artifact.id.to_string(), &commit, artifact.duration);

        self.spawn_prune();

        Ok(PipelineOutcome::Published {
            build_id: artifact.id,
            commit,
        })
    }

    fn spawn_prune(&self) {
        let publisher = self.publisher.clone();
        let retain = self.retain;
        tokio::task::spawn_blocking(move || {
            let report = publisher.prune(retain);
            METRICS.add_artifacts_pruned(report.removed.len() as u64);
        });
    }
}
