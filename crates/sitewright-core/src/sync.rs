//! Source synchronizer: keeps the working copy a mirror of the remote branch.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::error::SyncError;
use crate::state::BuilderState;
use crate::vcs::SourceControl;

/// Bounded retry with linearly increasing backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub attempts: u32,

    /// Backoff after attempt `n` (1-based) is `n * step`.
    pub step: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            step: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.step * attempt
    }
}

/// Result of comparing the local checkout with the fetched remote tip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteStatus {
    pub local: String,
    pub remote: String,
}

impl RemoteStatus {
    pub fn has_changes(&self) -> bool {
        self.local != self.remote
    }
}

/// What a successful sync did to the working copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Unchanged { commit: String },
    Updated { from: String, to: String },
}

impl SyncOutcome {
    /// Commit the working copy points at after the sync.
    pub fn commit(&self) -> &str {
        match self {
            SyncOutcome::Unchanged { commit } => commit,
            SyncOutcome::Updated { to, .. } => to,
        }
    }
}

/// Owns the local working copy.
pub struct SourceSync {
    vcs: Arc<dyn SourceControl>,
    state: Arc<BuilderState>,
    workdir: PathBuf,
    repo_url: String,
    branch: String,
    retry: RetryPolicy,
}

impl SourceSync {
    pub fn new(
        vcs: Arc<dyn SourceControl>,
        state: Arc<BuilderState>,
        workdir: impl Into<PathBuf>,
        repo_url: impl Into<String>,
        branch: impl Into<String>,
    ) -> Self {
        Self {
            vcs,
            state,
            workdir: workdir.into(),
            repo_url: repo_url.into(),
            branch: branch.into(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// Clone the branch unless the working directory already has content.
    pub async fn ensure_cloned(&self) -> Result<(), SyncError> {
        let workdir_err = |e: std::io::Error| SyncError::WorkDir {
            path: self.workdir.clone(),
            source: e,
        };

        let mut entries = match tokio::fs::read_dir(&self.workdir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(workdir = %self.workdir.display(), "work directory does not exist, creating");
                tokio::fs::create_dir_all(&self.workdir)
                    .await
                    .map_err(workdir_err)?;
                tokio::fs::read_dir(&self.workdir).await.map_err(workdir_err)?
            }
            Err(e) => return Err(workdir_err(e)),
        };

        if entries.next_entry().await.map_err(workdir_err)?.is_some() {
            info!(workdir = %self.workdir.display(), "work directory is not empty, skipping clone");
            return Ok(());
        }

        info!(
            repo_url = %self.repo_url,
            branch = %self.branch,
            workdir = %self.workdir.display(),
            "cloning repository"
        );
        self.vcs
            .clone_branch(&self.repo_url, &self.branch, &self.workdir)
            .await
    }

    /// Fetch the branch and compare local `HEAD` with the remote tip.
    ///
    /// Records the local `HEAD` as the last known commit.
    pub async fn has_remote_changes(&self) -> Result<RemoteStatus, SyncError> {
        self.vcs.fetch(&self.workdir, &self.branch).await?;
        let local = self.vcs.head_commit(&self.workdir).await?;
        let remote = self
            .vcs
            .remote_head_commit(&self.workdir, &self.branch)
            .await?;
        self.state.set_last_commit(local.clone());
        Ok(RemoteStatus { local, remote })
    }

    /// Hard-reset the working copy to the remote tip if it moved.
    ///
    /// When the tips already match nothing beyond the comparison runs.
    pub async fn sync_to_remote(&self) -> Result<SyncOutcome, SyncError> {
        let status = self.has_remote_changes().await?;
        if !status.has_changes() {
            info!(commit = %status.local, "no changes detected, skipping update");
            return Ok(SyncOutcome::Unchanged {
                commit: status.local,
            });
        }

        self.vcs.fetch(&self.workdir, &self.branch).await?;
        self.vcs.reset_hard(&self.workdir, &self.branch).await?;
        let head = self.vcs.head_commit(&self.workdir).await?;

        info!(old_commit = %status.local, new_commit = %head, "repository updated");
        self.state.set_last_commit(head.clone());
        Ok(SyncOutcome::Updated {
            from: status.local,
            to: head,
        })
    }

    /// [`sync_to_remote`](Self::sync_to_remote) under the retry policy.
    ///
    /// Only the error of the final attempt is returned.
    pub async fn sync_with_retry(&self) -> Result<SyncOutcome, SyncError> {
        let attempts = self.retry.attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.sync_to_remote().await {
                Ok(outcome) => return Ok(outcome),
                Err(e) if attempt >= attempts => return Err(e),
                Err(e) => {
                    let backoff = self.retry.backoff(attempt);
                    warn!(
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "git operation failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::FakeSourceControl;

    fn make_sync(vcs: Arc<FakeSourceControl>, workdir: &Path) -> (Arc<BuilderState>, SourceSync) {
        let state = Arc::new(BuilderState::new());
        let sync = SourceSync::new(
            vcs,
            state.clone(),
            workdir,
            "https://example.com/site.git",
            "main",
        );
        (state, sync)
    }

    #[test]
    fn test_linear_backoff() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(1), Duration::from_secs(1));
        assert_eq!(policy.backoff(2), Duration::from_secs(2));
        assert_eq!(policy.backoff(3), Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_ensure_cloned_creates_missing_dir() {
        let scratch = tempfile::tempdir().unwrap();
        let workdir = scratch.path().join("nested").join("work");
        let vcs = Arc::new(FakeSourceControl::new("c1"));
        let (_state, sync) = make_sync(vcs.clone(), &workdir);

        sync.ensure_cloned().await.unwrap();
        assert!(workdir.is_dir());
        assert_eq!(vcs.count("clone"), 1);
    }

    #[tokio::test]
    async fn test_ensure_cloned_clones_into_empty_dir() {
        let workdir = tempfile::tempdir().unwrap();
        let vcs = Arc::new(FakeSourceControl::new("c1"));
        let (_state, sync) = make_sync(vcs.clone(), workdir.path());

        sync.ensure_cloned().await.unwrap();
        assert_eq!(vcs.count("clone"), 1);
    }

    #[tokio::test]
    async fn test_ensure_cloned_skips_non_empty_dir() {
        let workdir = tempfile::tempdir().unwrap();
        std::fs::write(workdir.path().join("README.md"), "hi").unwrap();
        let vcs = Arc::new(FakeSourceControl::new("c1"));
        let (_state, sync) = make_sync(vcs.clone(), workdir.path());

        sync.ensure_cloned().await.unwrap();
        assert_eq!(vcs.count("clone"), 0);
    }

    #[tokio::test]
    async fn test_ensure_cloned_surfaces_clone_failure() {
        let workdir = tempfile::tempdir().unwrap();
        let vcs = Arc::new(FakeSourceControl::new("c1"));
        vcs.fail("clone", 1);
        let (_state, sync) = make_sync(vcs, workdir.path());

        assert!(sync.ensure_cloned().await.is_err());
    }

    #[tokio::test]
    async fn test_has_remote_changes_records_local_head() {
        let workdir = tempfile::tempdir().unwrap();
        let vcs = Arc::new(FakeSourceControl::new("c1"));
        let (state, sync) = make_sync(vcs.clone(), &workdir.path().join("w"));
        sync.ensure_cloned().await.unwrap();

        vcs.push("c2");
        let status = sync.has_remote_changes().await.unwrap();
        assert_eq!(status.local, "c1");
        assert_eq!(status.remote, "c2");
        assert!(status.has_changes());
        assert_eq!(state.last_commit(), "c1");
    }

    #[tokio::test]
    async fn test_sync_is_noop_when_unchanged() {
        let workdir = tempfile::tempdir().unwrap();
        let vcs = Arc::new(FakeSourceControl::new("c1"));
        let (state, sync) = make_sync(vcs.clone(), &workdir.path().join("w"));
        sync.ensure_cloned().await.unwrap();

        let outcome = sync.sync_to_remote().await.unwrap();
        assert_eq!(
            outcome,
            SyncOutcome::Unchanged {
                commit: "c1".to_string()
            }
        );
        assert_eq!(vcs.count("reset"), 0);
        assert_eq!(vcs.count("fetch"), 1);
        assert_eq!(state.last_commit(), "c1");
    }

    #[tokio::test]
    async fn test_sync_fast_forwards_to_remote() {
        let workdir = tempfile::tempdir().unwrap();
        let vcs = Arc::new(FakeSourceControl::new("c1"));
        let (state, sync) = make_sync(vcs.clone(), &workdir.path().join("w"));
        sync.ensure_cloned().await.unwrap();

        vcs.push("c2");
        let outcome = sync.sync_to_remote().await.unwrap();
        assert_eq!(
            outcome,
            SyncOutcome::Updated {
                from: "c1".to_string(),
                to: "c2".to_string()
            }
        );
        assert_eq!(outcome.commit(), "c2");
        assert_eq!(vcs.count("reset"), 1);
        assert_eq!(state.last_commit(), "c2");
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_recovers_from_transient_failure() {
        let workdir = tempfile::tempdir().unwrap();
        let vcs = Arc::new(FakeSourceControl::new("c1"));
        let (_state, sync) = make_sync(vcs.clone(), &workdir.path().join("w"));
        sync.ensure_cloned().await.unwrap();

        vcs.push("c2");
        vcs.fail("fetch", 2);
        let started = tokio::time::Instant::now();
        let outcome = sync.sync_with_retry().await.unwrap();
        assert_eq!(outcome.commit(), "c2");
        // 1s after the first failure, 2s after the second.
        assert!(started.elapsed() >= Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_exhaustion_keeps_previous_commit() {
        let workdir = tempfile::tempdir().unwrap();
        let vcs = Arc::new(FakeSourceControl::new("c1"));
        let (state, sync) = make_sync(vcs.clone(), &workdir.path().join("w"));
        sync.ensure_cloned().await.unwrap();
        state.set_last_commit("c1");

        vcs.push("c2");
        vcs.fail("fetch", 3);
        let err = sync.sync_with_retry().await.unwrap_err();
        assert!(err.to_string().contains("injected fetch failure"));
        assert_eq!(vcs.count("fetch"), 3);
        assert_eq!(vcs.count("reset"), 0);
        assert_eq!(state.last_commit(), "c1");
        assert_eq!(vcs.local_head().as_deref(), Some("c1"));
    }
}
