//! Shared builder state: the last synced commit and the single-flight flag.
//!
//! Both fields live behind one `RwLock`. Writers (coordinator, synchronizer)
//! take the write lock, the health endpoint takes the read lock. The lock is
//! never held across an `.await`, a process invocation, or network I/O.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Debug, Default)]
struct Inner {
    last_commit: String,
    is_building: bool,
}

/// Point-in-time copy of the builder state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateSnapshot {
    pub last_commit: String,
    pub is_building: bool,
}

/// State shared between the coordinator, the synchronizer and the HTTP layer.
#[derive(Debug, Default)]
pub struct BuilderState {
    inner: RwLock<Inner>,
}

impl BuilderState {
    pub fn new() -> Self {
        Self::default()
    }

    // A panic while holding the lock cannot leave the two plain fields
    // half-written, so poisoning is ignored.
    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Last commit observed in the working copy (empty before the first sync).
    pub fn last_commit(&self) -> String {
        self.read().last_commit.clone()
    }

    /// Record the commit the working copy currently points at.
    pub fn set_last_commit(&self, commit: impl Into<String>) {
        self.write().last_commit = commit.into();
    }

    pub fn is_building(&self) -> bool {
        self.read().is_building
    }

    pub fn snapshot(&self) -> StateSnapshot {
        let inner = self.read();
        StateSnapshot {
            last_commit: inner.last_commit.clone(),
            is_building: inner.is_building,
        }
    }

    /// Atomically check and set the single-flight flag.
    ///
    /// Returns a guard that clears the flag when dropped, or `None` if a build
    /// is already running. The flag is released on every exit path of the
    /// pipeline, including panics.
    pub fn try_begin_build(self: &Arc<Self>) -> Option<BuildGuard> {
        let mut inner = self.write();
        if inner.is_building {
            return None;
        }
        inner.is_building = true;
        Some(BuildGuard {
            state: Arc::clone(self),
        })
    }
}

/// RAII token proving the holder owns the single build slot.
#[derive(Debug)]
pub struct BuildGuard {
    state: Arc<BuilderState>,
}

impl Drop for BuildGuard {
    fn drop(&mut self) {
        self.state.write().is_building = false;
    }
}
