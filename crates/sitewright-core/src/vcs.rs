//! Version-control capability and the `git` process adapter.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::error::SyncError;

/// Remote name used for every fetch and reset.
pub const REMOTE: &str = "origin";

/// Operations the synchronizer needs from a version-control client.
///
/// Every method runs against the working copy at `dir`. Implementations must
/// be safe to call concurrently from independent tasks.
#[async_trait]
pub trait SourceControl: Send + Sync {
    /// Clone `branch` of `url` into `dir`.
    async fn clone_branch(&self, url: &str, branch: &str, dir: &Path) -> Result<(), SyncError>;

    /// Fetch `branch` from the remote.
    async fn fetch(&self, dir: &Path, branch: &str) -> Result<(), SyncError>;

    /// Resolve the local `HEAD` commit.
    async fn head_commit(&self, dir: &Path) -> Result<String, SyncError>;

    /// Resolve the tip of the remote-tracking branch.
    async fn remote_head_commit(&self, dir: &Path, branch: &str) -> Result<String, SyncError>;

    /// Hard-reset the working copy to the remote-tracking branch.
    async fn reset_hard(&self, dir: &Path, branch: &str) -> Result<(), SyncError>;
}

/// [`SourceControl`] backed by the `git` command-line client.
#[derive(Debug, Clone)]
pub struct GitCli {
    program: PathBuf,
}

impl Default for GitCli {
    fn default() -> Self {
        Self::new("git")
    }
}

impl GitCli {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Run git with `args`, returning trimmed stdout on success.
    async fn run(&self, dir: Option<&Path>, args: &[&str]) -> Result<String, SyncError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(false);
        if let Some(dir) = dir {
            cmd.current_dir(dir);
        }

        debug!(program = %self.program.display(), ?args, "running git");
        let output = cmd.output().await.map_err(|e| SyncError::Spawn {
            program: self.program.display().to_string(),
            source: e,
        })?;

        if !output.status.success() {
            return Err(SyncError::CommandFailed {
                operation: args.join(" "),
                exit_code: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    async fn rev_parse(&self, dir: &Path, rev: &str) -> Result<String, SyncError> {
        let sha = self.run(Some(dir), &["rev-parse", rev]).await?;
        if sha.is_empty() {
            return Err(SyncError::EmptyRevision {
                operation: format!("rev-parse {rev}"),
            });
        }
        Ok(sha)
    }
}

#[async_trait]
impl SourceControl for GitCli {
    async fn clone_branch(&self, url: &str, branch: &str, dir: &Path) -> Result<(), SyncError> {
        let dir = dir.to_string_lossy();
        self.run(None, &["clone", "--branch", branch, url, &dir])
            .await
            .map(|_| ())
    }

    async fn fetch(&self, dir: &Path, branch: &str) -> Result<(), SyncError> {
        self.run(Some(dir), &["fetch", REMOTE, branch])
            .await
            .map(|_| ())
    }

    async fn head_commit(&self, dir: &Path) -> Result<String, SyncError> {
        self.rev_parse(dir, "HEAD").await
    }

    async fn remote_head_commit(&self, dir: &Path, branch: &str) -> Result<String, SyncError> {
        self.rev_parse(dir, &format!("{REMOTE}/{branch}")).await
    }

    async fn reset_hard(&self, dir: &Path, branch: &str) -> Result<(), SyncError> {
        self.run(Some(dir), &["reset", "--hard", &format!("{REMOTE}/{branch}")])
            .await
            .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command as StdCommand;

    fn run_git(repo_dir: &Path, args: &[&str]) {
        let output = StdCommand::new("git")
            .args(args)
            .current_dir(repo_dir)
            .output()
            .unwrap();
        assert!(
            output.status.success(),
            "git {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
    }

    fn commit_file(repo_dir: &Path, name: &str, contents: &str) {
        std::fs::write(repo_dir.join(name), contents).unwrap();
        run_git(repo_dir, &["add", name]);
        run_git(repo_dir, &["commit", "-m", name]);
    }

    fn make_upstream() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        run_git(dir.path(), &["init", "--initial-branch=main"]);
        run_git(dir.path(), &["config", "user.name", "test-user"]);
        run_git(dir.path(), &["config", "user.email", "test@example.com"]);
        commit_file(dir.path(), "index.md", "# hello");
        dir
    }

    #[tokio::test]
    async fn clone_fetch_and_reset_follow_upstream() {
        let upstream = make_upstream();
        let scratch = tempfile::tempdir().unwrap();
        let work = scratch.path().join("work");
        let git = GitCli::default();

        git.clone_branch(&upstream.path().to_string_lossy(), "main", &work)
            .await
            .expect("clone failed");
        let head = git.head_commit(&work).await.unwrap();
        assert_eq!(head.len(), 40, "SHA should be 40 hex chars, got: {head}");

        commit_file(upstream.path(), "about.md", "# about");
        git.fetch(&work, "main").await.unwrap();
        let remote = git.remote_head_commit(&work, "main").await.unwrap();
        assert_ne!(head, remote);

        git.reset_hard(&work, "main").await.unwrap();
        assert_eq!(git.head_commit(&work).await.unwrap(), remote);
        assert!(work.join("about.md").exists());
    }

    #[tokio::test]
    async fn clone_of_missing_branch_fails() {
        let upstream = make_upstream();
        let scratch = tempfile::tempdir().unwrap();
        let err = GitCli::default()
            .clone_branch(
                &upstream.path().to_string_lossy(),
                "does-not-exist",
                &scratch.path().join("work"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::CommandFailed { .. }), "{err}");
    }

    #[tokio::test]
    async fn head_commit_fails_outside_repo() {
        let dir = tempfile::tempdir().unwrap();
        assert!(GitCli::default().head_commit(dir.path()).await.is_err());
    }

    #[tokio::test]
    async fn missing_binary_is_a_spawn_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = GitCli::new("/nonexistent/git")
            .head_commit(dir.path())
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Spawn { .. }));
    }
}
