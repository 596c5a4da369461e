//! Build executor: renders the working copy into an isolated artifact directory.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{debug, warn};

use crate::error::BuildError;
use crate::generator::SiteGenerator;

/// Directory under the publish root that holds build artifacts.
pub const BUILDS_DIR: &str = ".builds";

const BUILD_ID_PREFIX: &str = "build-";

/// Monotonic build identifier derived from the wall clock in milliseconds.
///
/// Formats as `build-<13 digits>` so lexical and numeric order agree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BuildId(u64);

impl BuildId {
    pub fn from_millis(millis: u64) -> Self {
        BuildId(millis)
    }

    pub fn millis(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for BuildId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{BUILD_ID_PREFIX}{:013}", self.0)
    }
}

impl FromStr for BuildId {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.strip_prefix(BUILD_ID_PREFIX).ok_or(())?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(());
        }
        digits.parse().map(BuildId).map_err(|_| ())
    }
}

/// A fully rendered build, ready for publication.
#[derive(Debug, Clone)]
pub struct BuildArtifact {
    pub id: BuildId,
    pub dir: PathBuf,
    pub duration: Duration,
    pub output: String,
}

/// Runs the site generator into fresh artifact directories.
pub struct BuildExecutor {
    generator: Arc<dyn SiteGenerator>,
    builds_dir: PathBuf,
    last_id: AtomicU64,
}

impl BuildExecutor {
    pub fn new(generator: Arc<dyn SiteGenerator>, publish_root: impl AsRef<Path>) -> Self {
        Self {
            generator,
            builds_dir: publish_root.as_ref().join(BUILDS_DIR),
            last_id: AtomicU64::new(0),
        }
    }

    pub fn builds_dir(&self) -> &Path {
        &self.builds_dir
    }

    /// Next identifier: the current time, bumped past the previous one if the
    /// clock has not advanced.
    fn next_id(&self) -> BuildId {
        let now = u64::try_from(Utc::now().timestamp_millis()).unwrap_or(0);
        let mut prev = self.last_id.load(Ordering::Relaxed);
        loop {
            let next = now.max(prev + 1);
            match self
                .last_id
                .compare_exchange(prev, next, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => return BuildId(next),
                Err(actual) => prev = actual,
            }
        }
    }

    /// Render `working_dir` into a new artifact directory.
    ///
    /// On any failure the artifact directory is removed before returning, so a
    /// returned [`BuildArtifact`] is always complete.
    pub async fn render(
        &self,
        working_dir: &Path,
        args: &[String],
    ) -> Result<BuildArtifact, BuildError> {
        let start = Instant::now();
        let (id, dir) = self.allocate().await?;
        debug!(build_id = %id, dir = %dir.display(), "allocated build directory");

        let result = self.generator.render(working_dir, &dir, args).await;
        let duration = start.elapsed();

        match result {
            Ok(out) if out.success() => Ok(BuildArtifact {
                id,
                dir,
                duration,
                output: out.output,
            }),
            Ok(out) => {
                discard_dir(&dir).await;
                Err(BuildError::GeneratorFailed {
                    exit_code: out.exit_code,
                    duration,
                    output: out.output,
                })
            }
            Err(e) => {
                discard_dir(&dir).await;
                Err(e)
            }
        }
    }

    async fn allocate(&self) -> Result<(BuildId, PathBuf), BuildError> {
        tokio::fs::create_dir_all(&self.builds_dir)
            .await
            .map_err(|e| BuildError::Allocate {
                path: self.builds_dir.clone(),
                source: e,
            })?;

        // Ids must sort after every artifact already on disk, even when the
        // clock is behind them.
        if let Some(latest) = self.latest_on_disk().await {
            self.last_id.fetch_max(latest.millis(), Ordering::AcqRel);
        }

        // An existing directory with the same id is skipped, never reused.
        loop {
            let id = self.next_id();
            let dir = self.builds_dir.join(id.to_string());
            match tokio::fs::create_dir(&dir).await {
                Ok(()) => return Ok((id, dir)),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(BuildError::Allocate { path: dir, source: e }),
            }
        }
    }

    async fn latest_on_disk(&self) -> Option<BuildId> {
        let mut entries = match tokio::fs::read_dir(&self.builds_dir).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(path = %self.builds_dir.display(), error = %e, "failed to list builds");
                return None;
            }
        };
        let mut latest = None;
        while let Ok(Some(entry)) = entries.next_entry().await {
            if let Some(id) = entry
                .file_name()
                .to_str()
                .and_then(|name| name.parse::<BuildId>().ok())
            {
                latest = latest.max(Some(id));
            }
        }
        latest
    }
}

/// Remove an artifact directory that will never be published.
pub async fn discard_dir(dir: &Path) {
    if let Err(e) = tokio::fs::remove_dir_all(dir).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(dir = %dir.display(), error = %e, "failed to remove discarded build");
        }
    }
}
