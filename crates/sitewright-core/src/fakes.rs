//! In-memory fakes for the process-backed capabilities (testing only)
//!
//! Provides `FakeSourceControl` and `FakeGenerator`, which satisfy the
//! [`SourceControl`] and [`SiteGenerator`] contracts without spawning `git`
//! or a site generator.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{BuildError, SyncError};
use crate::generator::{GeneratorOutput, SiteGenerator};
use crate::vcs::SourceControl;

// ---------------------------------------------------------------------------
// FakeSourceControl
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct RepoState {
    /// Tip of the branch on the "server".
    upstream: String,
    /// Remote-tracking ref after the last successful fetch.
    tracking: Option<String>,
    /// Local `HEAD`; `None` until cloned.
    head: Option<String>,
    /// Remaining operations that should fail, by operation name.
    failures: Vec<(&'static str, usize)>,
    ops: Vec<String>,
}

impl RepoState {
    fn take_failure(&mut self, op: &'static str) -> Option<SyncError> {
        let entry = self.failures.iter_mut().find(|(name, n)| *name == op && *n > 0)?;
        entry.1 -= 1;
        Some(SyncError::CommandFailed {
            operation: op.to_string(),
            exit_code: 128,
            stderr: format!("injected {op} failure"),
        })
    }
}

/// In-memory version-control client with a single upstream branch.
#[derive(Debug, Default)]
pub struct FakeSourceControl {
    state: Mutex<RepoState>,
}

impl FakeSourceControl {
    /// Fake whose upstream branch points at `commit`.
    pub fn new(commit: impl Into<String>) -> Self {
        Self {
            state: Mutex::new(RepoState {
                upstream: commit.into(),
                ..RepoState::default()
            }),
        }
    }

    /// Move the upstream branch tip, as if someone pushed.
    pub fn push(&self, commit: impl Into<String>) {
        self.state.lock().unwrap().upstream = commit.into();
    }

    /// Make the next `times` calls of `op` fail.
    ///
    /// `op` is one of `clone`, `fetch`, `rev-parse`, `reset`.
    pub fn fail(&self, op: &'static str, times: usize) {
        self.state.lock().unwrap().failures.push((op, times));
    }

    /// Names of every operation invoked so far, in order.
    pub fn ops(&self) -> Vec<String> {
        self.state.lock().unwrap().ops.clone()
    }

    pub fn count(&self, op: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .ops
            .iter()
            .filter(|o| o.as_str() == op)
            .count()
    }

    pub fn local_head(&self) -> Option<String> {
        self.state.lock().unwrap().head.clone()
    }
}

#[async_trait]
impl SourceControl for FakeSourceControl {
    async fn clone_branch(&self, _url: &str, _branch: &str, dir: &Path) -> Result<(), SyncError> {
        let mut state = self.state.lock().unwrap();
        state.ops.push("clone".to_string());
        if let Some(err) = state.take_failure("clone") {
            return Err(err);
        }
        std::fs::create_dir_all(dir).map_err(|e| SyncError::WorkDir {
            path: dir.to_path_buf(),
            source: e,
        })?;
        std::fs::write(dir.join("config.toml"), "title = \"fake\"\n").map_err(|e| {
            SyncError::WorkDir {
                path: dir.to_path_buf(),
                source: e,
            }
        })?;
        state.head = Some(state.upstream.clone());
        state.tracking = Some(state.upstream.clone());
        Ok(())
    }

    async fn fetch(&self, _dir: &Path, _branch: &str) -> Result<(), SyncError> {
        let mut state = self.state.lock().unwrap();
        state.ops.push("fetch".to_string());
        if let Some(err) = state.take_failure("fetch") {
            return Err(err);
        }
        state.tracking = Some(state.upstream.clone());
        Ok(())
    }

    async fn head_commit(&self, _dir: &Path) -> Result<String, SyncError> {
        let mut state = self.state.lock().unwrap();
        state.ops.push("rev-parse HEAD".to_string());
        if let Some(err) = state.take_failure("rev-parse") {
            return Err(err);
        }
        state.head.clone().ok_or_else(|| SyncError::CommandFailed {
            operation: "rev-parse HEAD".to_string(),
            exit_code: 128,
            stderr: "not a git repository".to_string(),
        })
    }

    async fn remote_head_commit(&self, _dir: &Path, branch: &str) -> Result<String, SyncError> {
        let mut state = self.state.lock().unwrap();
        state.ops.push("rev-parse remote".to_string());
        if let Some(err) = state.take_failure("rev-parse") {
            return Err(err);
        }
        state.tracking.clone().ok_or_else(|| SyncError::CommandFailed {
            operation: format!("rev-parse origin/{branch}"),
            exit_code: 128,
            stderr: "unknown revision".to_string(),
        })
    }

    async fn reset_hard(&self, _dir: &Path, branch: &str) -> Result<(), SyncError> {
        let mut state = self.state.lock().unwrap();
        state.ops.push("reset".to_string());
        if let Some(err) = state.take_failure("reset") {
            return Err(err);
        }
        let tracking = state.tracking.clone().ok_or_else(|| SyncError::CommandFailed {
            operation: format!("reset --hard origin/{branch}"),
            exit_code: 128,
            stderr: "unknown revision".to_string(),
        })?;
        state.head = Some(tracking);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// FakeGenerator
// ---------------------------------------------------------------------------

/// One recorded [`SiteGenerator::render`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderCall {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub args: Vec<String>,
}

/// Generator that writes an `index.html` into the destination.
///
/// Queued failures write a partial file first, mimicking a generator that
/// dies half-way through.
#[derive(Debug, Default)]
pub struct FakeGenerator {
    calls: Mutex<Vec<RenderCall>>,
    failures: Mutex<VecDeque<String>>,
    delay: Mutex<Option<Duration>>,
}

impl FakeGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every render take at least `delay`.
    pub fn with_delay(self, delay: Duration) -> Self {
        *self.delay.lock().unwrap() = Some(delay);
        self
    }

    /// Make the next render exit non-zero with `output`.
    pub fn fail_next(&self, output: impl Into<String>) {
        self.failures.lock().unwrap().push_back(output.into());
    }

    pub fn calls(&self) -> Vec<RenderCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl SiteGenerator for FakeGenerator {
    async fn render(
        &self,
        source: &Path,
        destination: &Path,
        args: &[String],
    ) -> Result<GeneratorOutput, BuildError> {
        self.calls.lock().unwrap().push(RenderCall {
            source: source.to_path_buf(),
            destination: destination.to_path_buf(),
            args: args.to_vec(),
        });

        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let failure = self.failures.lock().unwrap().pop_front();
        let io_err = |e: std::io::Error| BuildError::Spawn {
            program: "fake-generator".to_string(),
            source: e,
        };
        match failure {
            Some(output) => {
                std::fs::write(destination.join("partial.html"), "<html>").map_err(io_err)?;
                Ok(GeneratorOutput {
                    exit_code: 1,
                    output,
                    duration: delay.unwrap_or_default(),
                })
            }
            None => {
                std::fs::write(
                    destination.join("index.html"),
                    format!("<html><!-- {} --></html>", destination.display()),
                )
                .map_err(io_err)?;
                Ok(GeneratorOutput {
                    exit_code: 0,
                    output: "Total in 12 ms".to_string(),
                    duration: delay.unwrap_or_default(),
                })
            }
        }
    }
}
