//! Per-run scratch storage
//!
//! Every run gets its own directory, `<root>/run-<uuid>`. Nothing is shared
//! between runs, so concurrent runs under the same root never collide. The
//! directory and everything in it is removed when the [`RunScratch`] is
//! released or dropped, whether the run succeeded or not.

use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::Result;

/// Scratch directory owned by a single run
#[derive(Debug)]
pub struct RunScratch {
    run_id: Uuid,
    dir: PathBuf,
    keep: bool,
    released: bool,
}

impl RunScratch {
    /// Create a fresh run directory under `root`
    pub fn create(root: &Path) -> Result<Self> {
        let run_id = Uuid::new_v4();
        let dir = root.join(format!("run-{run_id}"));
        std::fs::create_dir_all(&dir)?;

        debug!("Created scratch {}", dir.display());

        Ok(Self {
            run_id,
            dir,
            keep: false,
            released: false,
        })
    }

    /// Leave the directory on disk after the run (for debugging)
    #[must_use]
    pub fn keep(mut self, keep: bool) -> Self {
        self.keep = keep;
        self
    }

    #[must_use]
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path for a file inside the run directory
    #[must_use]
    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    /// Create (if needed) and return a subdirectory
    pub fn subdir(&self, name: &str) -> Result<PathBuf> {
        let path = self.dir.join(name);
        std::fs::create_dir_all(&path)?;
        Ok(path)
    }

    /// Release everything now and report failures.
    pub fn release(mut self) -> Result<()> {
        self.released = true;
        if self.keep {
            info!("Keeping scratch for run {}: {}", self.run_id, self.dir.display());
            return Ok(());
        }
        remove_tree(&self.dir)?;
        debug!("Released scratch for run {}", self.run_id);
        Ok(())
    }
}

impl Drop for RunScratch {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if self.keep {
            info!("Keeping scratch for run {}: {}", self.run_id, self.dir.display());
            return;
        }
        if let Err(e) = remove_tree(&self.dir) {
            warn!("Failed to release scratch {}: {}", self.dir.display(), e);
        }
    }
}

fn remove_tree(dir: &Path) -> std::io::Result<()> {
    match std::fs::remove_dir_all(dir) {
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}
