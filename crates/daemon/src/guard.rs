//! Transcode guard: the set of source paths currently being transcoded.
//!
//! A path is claimed for exactly as long as a transcode for it is in flight.
//! Check-and-insert happens under one lock, so two concurrent claims of the
//! same path can never both succeed.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

/// Shared claim set. Cloning yields another handle to the same set.
#[derive(Debug, Clone, Default)]
pub struct TranscodeGuard {
    claimed: Arc<Mutex<HashSet<PathBuf>>>,
}

impl TranscodeGuard {
    pub fn new() -> Self {
        Self::default()
    }

    // A poisoned set is still a valid set; keep serving it.
    fn lock(&self) -> MutexGuard<'_, HashSet<PathBuf>> {
        self.claimed.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Record `path` as claimed. Returns false, without side effect, if it
    /// already was.
    pub fn claim(&self, path: &Path) -> bool {
        self.lock().insert(path.to_path_buf())
    }

    /// Remove `path` from the set. No-op if it was not claimed.
    pub fn release(&self, path: &Path) {
        self.lock().remove(path);
    }

    pub fn is_claimed(&self, path: &Path) -> bool {
        self.lock().contains(path)
    }

    /// Number of paths currently claimed.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Claim `path` for the lifetime of the returned [`Claim`].
    pub fn try_claim(&self, path: &Path) -> Option<Claim> {
        if self.claim(path) {
            Some(Claim {
                guard: self.clone(),
                path: path.to_path_buf(),
            })
        } else {
            None
        }
    }
}

/// A held claim. Dropping it releases the path, whichever way the
/// transcode ended.
#[derive(Debug)]
pub struct Claim {
    guard: TranscodeGuard,
    path: PathBuf,
}

impl Claim {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for Claim {
    fn drop(&mut self) {
        self.guard.release(&self.path);
    }
}
