//! Daemon startup and graceful shutdown.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::config::BuildConfig;
use crate::coordinator::{BuildCoordinator, TriggerOutcome, TriggerSource};
use crate::error::StartupError;
use crate::generator::{GeneratorCli, SiteGenerator};
use crate::http::{router, AppState};
use crate::poller::run_poller;
use crate::shutdown::Shutdown;
use crate::state::BuilderState;
use crate::vcs::{GitCli, SourceControl};

/// Upper bound on draining the HTTP listener during [`Daemon::stop`].
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// A running daemon: HTTP listener, optional poller, and the coordinator
/// they both feed.
pub struct Daemon {
    coordinator: Arc<BuildCoordinator>,
    shutdown: Shutdown,
    local_addr: SocketAddr,
    server: JoinHandle<()>,
    poller: Option<JoinHandle<()>>,
    startup_build: Option<JoinHandle<()>>,
}

impl Daemon {
    /// Start with the `git` and generator binaries named in `config`.
    pub async fn from_config(config: BuildConfig) -> Result<Self, StartupError> {
        let vcs = Arc::new(GitCli::new(&config.git_bin));
        let generator = Arc::new(GeneratorCli::new(&config.generator_bin));
        Self::start(config, vcs, generator).await
    }

    /// Clone if needed, bind the listener, kick off the first build, then
    /// serve and poll.
    ///
    /// Returns once the listener is bound; the first build runs in the
    /// background.
    pub async fn start(
        config: BuildConfig,
        vcs: Arc<dyn SourceControl>,
        generator: Arc<dyn SiteGenerator>,
    ) -> Result<Self, StartupError> {
        config.validate()?;

        let shutdown = Shutdown::new();
        let coordinator = Arc::new(BuildCoordinator::new(
            &config,
            Arc::new(BuilderState::new()),
            vcs,
            generator,
            shutdown.signal(),
        ));

        coordinator.sync().ensure_cloned().await?;

        let address = config.listen_address();
        let bind_error = |source: std::io::Error| StartupError::Bind {
            address: address.clone(),
            source,
        };
        let listener = TcpListener::bind(address.as_str())
            .await
            .map_err(bind_error)?;
        let local_addr = listener.local_addr().map_err(bind_error)?;

        let startup_build = match coordinator.trigger(TriggerSource::Startup) {
            TriggerOutcome::Started(handle) => Some(handle),
            _ => None,
        };

        info!(address = %local_addr, "starting webhook server");

        let app = router(AppState::new(
            Arc::clone(&coordinator),
            &config.webhook_secret,
            &config.branch_ref(),
        ));
        let mut drain = shutdown.signal();
        let server = tokio::spawn(async move {
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(async move { drain.cancelled().await })
                .await;
            if let Err(e) = result {
                error!(error = %e, "webhook server failed");
            }
        });

        let poller = config.poll_every().map(|every| {
            tokio::spawn(run_poller(
                Arc::clone(&coordinator),
                every,
                shutdown.signal(),
            ))
        });

        info!(
            repo = %config.repo_url,
            branch = %config.repo_branch,
            polling = poller.is_some(),
            "builder started"
        );

        Ok(Self {
            coordinator,
            shutdown,
            local_addr,
            server,
            poller,
            startup_build,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn coordinator(&self) -> &Arc<BuildCoordinator> {
        &self.coordinator
    }

    /// Handle to the startup build, if it was admitted. Yields it once.
    pub fn take_startup_build(&mut self) -> Option<JoinHandle<()>> {
        self.startup_build.take()
    }

    /// Cancel in-flight work and drain the listener.
    ///
    /// Builds already running are not awaited. If the listener does not
    /// drain within [`SHUTDOWN_TIMEOUT`] the error is logged and the server
    /// task is aborted.
    pub async fn stop(self) {
        info!("shutting down");
        self.shutdown.cancel();

        if let Some(poller) = self.poller {
            if let Err(e) = poller.await {
                error!(error = %e, "poller task failed");
            }
        }

        let mut server = self.server;
        match tokio::time::timeout(SHUTDOWN_TIMEOUT, &mut server).await {
            Ok(Ok(())) => info!("webhook server stopped"),
            Ok(Err(e)) => error!(error = %e, "webhook server task failed"),
            Err(_) => {
                error!(
                    timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
                    "timed out waiting for webhook server to shut down"
                );
                server.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConfigError;
    use crate::fakes::{FakeGenerator, FakeSourceControl};

    fn config(dir: &std::path::Path) -> BuildConfig {
        let mut config = BuildConfig::new(
            dir.join("work"),
            dir.join("public"),
            "https://example.com/site.git",
        );
        config.server_address = "127.0.0.1:0".to_string();
        config
    }

    #[tokio::test]
    async fn test_start_rejects_missing_repo_url() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path());
        config.repo_url.clear();

        let vcs = Arc::new(FakeSourceControl::new("c1"));
        let result = Daemon::start(config, vcs.clone(), Arc::new(FakeGenerator::new())).await;
        assert!(matches!(
            result,
            Err(StartupError::Config(ConfigError::Missing(_)))
        ));
        assert!(vcs.ops().is_empty());
    }

    #[tokio::test]
    async fn test_start_fails_when_clone_fails() {
        let dir = tempfile::tempdir().unwrap();
        let vcs = Arc::new(FakeSourceControl::new("c1"));
        vcs.fail("clone", 1);

        let result = Daemon::start(config(dir.path()), vcs, Arc::new(FakeGenerator::new())).await;
        assert!(matches!(result, Err(StartupError::Clone(_))));
    }

    #[tokio::test]
    async fn test_start_fails_when_address_in_use() {
        let dir = tempfile::tempdir().unwrap();
        let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let mut config = config(dir.path());
        config.server_address = taken.local_addr().unwrap().to_string();

        let result = Daemon::start(
            config,
            Arc::new(FakeSourceControl::new("c1")),
            Arc::new(FakeGenerator::new()),
        )
        .await;
        assert!(matches!(result, Err(StartupError::Bind { .. })));
    }

    #[tokio::test]
    async fn test_start_binds_host_name_address() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path());
        config.server_address = "localhost:0".to_string();

        let daemon = Daemon::start(
            config,
            Arc::new(FakeSourceControl::new("c1")),
            Arc::new(FakeGenerator::new()),
        )
        .await
        .unwrap();
        assert!(daemon.local_addr().ip().is_loopback());
        assert_ne!(daemon.local_addr().port(), 0);
        daemon.stop().await;
    }

    #[tokio::test]
    async fn test_unresolvable_address_is_bind_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path());
        config.server_address = "not an address".to_string();

        let result = Daemon::start(
            config,
            Arc::new(FakeSourceControl::new("c1")),
            Arc::new(FakeGenerator::new()),
        )
        .await;
        match result {
            Err(StartupError::Bind { address, .. }) => assert_eq!(address, "not an address"),
            Err(other) => panic!("expected Bind error, got {other}"),
            Ok(_) => panic!("expected Bind error"),
        }
    }

    #[tokio::test]
    async fn test_start_builds_once_then_stops() {
        let dir = tempfile::tempdir().unwrap();
        let generator = Arc::new(FakeGenerator::new());
        let mut daemon = Daemon::start(
            config(dir.path()),
            Arc::new(FakeSourceControl::new("c1")),
            generator.clone(),
        )
        .await
        .unwrap();

        daemon.take_startup_build().unwrap().await.unwrap();
        assert!(daemon.take_startup_build().is_none());
        assert_eq!(generator.calls().len(), 1);
        assert!(daemon.coordinator().publisher().current_build().is_some());
        assert_eq!(daemon.coordinator().state().last_commit(), "c1");

        let coordinator = Arc::clone(daemon.coordinator());
        tokio::time::timeout(SHUTDOWN_TIMEOUT * 2, daemon.stop())
            .await
            .unwrap();
        assert!(matches!(
            coordinator.trigger(TriggerSource::Poll),
            TriggerOutcome::ShuttingDown
        ));
    }
}
