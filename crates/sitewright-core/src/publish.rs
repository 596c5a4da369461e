//! Publisher: atomic `current` pointer swap and artifact retention.
//!
//! Layout under the publish root:
//!
//! ```text
//! <root>/current        -> .builds/build-<id>   (symlink, relative)
//! <root>/.builds/build-<id>/
//! ```
//!
//! The pointer is replaced with `rename(2)`, so a reader resolving `current`
//! sees either the old or the new artifact, never a missing one.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::{PruneError, PublishError};
use crate::executor::{BuildArtifact, BuildId, BUILDS_DIR};

/// Name of the live pointer under the publish root.
pub const CURRENT_LINK: &str = "current";

const TEMP_LINK: &str = "current.tmp";

/// Number of artifacts kept after a successful publish.
pub const DEFAULT_RETAIN: usize = 2;

/// Result of a retention pass.
#[derive(Debug, Default)]
pub struct PruneReport {
    pub removed: Vec<PathBuf>,
    pub errors: Vec<PruneError>,
}

/// Makes finished artifacts live and prunes old ones.
#[derive(Debug, Clone)]
pub struct Publisher {
    root: PathBuf,
}

impl Publisher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn builds_dir(&self) -> PathBuf {
        self.root.join(BUILDS_DIR)
    }

    pub fn current_link(&self) -> PathBuf {
        self.root.join(CURRENT_LINK)
    }

    /// Artifact the `current` pointer names, if any.
    pub fn current_build(&self) -> Option<BuildId> {
        let target = std::fs::read_link(self.current_link()).ok()?;
        target.file_name()?.to_str()?.parse().ok()
    }

    /// Point `current` at `artifact`.
    ///
    /// On error the previous pointer is untouched; the caller owns the
    /// now-orphaned artifact directory.
    pub fn publish(&self, artifact: &BuildArtifact) -> Result<(), PublishError> {
        let current = self.current_link();
        let temp = self.root.join(TEMP_LINK);
        let target = Path::new(BUILDS_DIR).join(artifact.id.to_string());

        // Left over from a process that died between symlink and rename.
        if std::fs::symlink_metadata(&temp).is_ok() {
            debug!(path = %temp.display(), "removing stale temporary pointer");
            let _ = std::fs::remove_file(&temp);
        }

        symlink_dir(&target, &temp).map_err(|e| PublishError::TempPointer {
            path: temp.clone(),
            source: e,
        })?;

        if let Err(e) = std::fs::rename(&temp, &current) {
            let _ = std::fs::remove_file(&temp);
            return Err(PublishError::Swap {
                from: temp,
                to: current,
                source: e,
            });
        }

        info!(build_id = %artifact.id, target = %target.display(), "published build");
        Ok(())
    }

    /// Remove all but the `retain` newest artifacts.
    ///
    /// The artifact `current` points at is never removed. Entries that are
    /// not build directories are ignored. Failures are
    /// logged per entry and collected, never retried.
    pub fn prune(&self, retain: usize) -> PruneReport {
        let mut report = PruneReport::default();
        let builds_dir = self.builds_dir();

        let entries = match std::fs::read_dir(&builds_dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(path = %builds_dir.display(), error = %e, "failed to list builds");
                report.errors.push(PruneError::List {
                    path: builds_dir,
                    source: e,
                });
                return report;
            }
        };

        let mut builds: Vec<(BuildId, PathBuf)> = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let id = entry.file_name().to_str()?.parse::<BuildId>().ok()?;
                Some((id, entry.path()))
            })
            .collect();
        builds.sort_by(|a, b| b.0.cmp(&a.0));

        let live = self.current_build();
        for (id, path) in builds.into_iter().skip(retain) {
            if Some(id) == live {
                debug!(build_id = %id, "keeping live build outside the retention window");
                continue;
            }
            match std::fs::remove_dir_all(&path) {
                Ok(()) => {
                    info!(path = %path.display(), "cleaned up old build");
                    report.removed.push(path);
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "failed to remove old build");
                    report.errors.push(PruneError::Remove { path, source: e });
                }
            }
        }

        report
    }
}

#[cfg(unix)]
fn symlink_dir(target: &Path, link: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
fn symlink_dir(target: &Path, link: &Path) -> std::io::Result<()> {
    std::os::windows::fs::symlink_dir(target, link)
}
