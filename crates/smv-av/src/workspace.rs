//! Per-job scratch directory and ephemeral asset bookkeeping.
//!
//! A [`Workspace`] owns a temporary directory for one job. Every file a
//! stage creates is registered as an ephemeral [`MediaAsset`]; caller files
//! the job only reads are adopted as persistent ones. Superseded assets are
//! discarded immediately and the remaining ephemeral ones are removed by
//! [`Workspace::cleanup`]. On success the directory disappears with the
//! workspace. On failure [`Workspace::persist`] keeps whatever diagnostic
//! leftovers remain.
//!
//! Assets also carry their measured duration so ffprobe runs at most once
//! per file and job.

use std::path::{Path, PathBuf};

use smv_core::{JobId, MediaAsset, MediaKind};
use tempfile::TempDir;

/// Scratch space for one job.
///
/// # Example
///
/// ```no_run
/// use smv_av::Workspace;
/// use smv_core::{JobId, MediaKind};
///
/// let mut ws = Workspace::new(JobId::new()).unwrap();
/// let audio = ws.register(ws.file("speed.mp3"), MediaKind::Audio);
/// // ... run stages ...
/// ws.cleanup();
/// ```
pub struct Workspace {
    temp_dir: TempDir,
    assets: Vec<MediaAsset>,
}

impl Workspace {
    /// Create a scratch directory under the system temp dir.
    pub fn new(job_id: JobId) -> smv_core::Result<Self> {
        Self::new_in(&std::env::temp_dir(), job_id)
    }

    /// Create a scratch directory under `parent`.
    pub fn new_in(parent: &Path, job_id: JobId) -> smv_core::Result<Self> {
        let temp_dir = tempfile::Builder::new()
            .prefix(&format!("smv-{}-", job_id.short()))
            .tempdir_in(parent)
            .map_err(|e| smv_core::Error::Internal(format!("failed to create scratch dir: {e}")))?;

        tracing::debug!(job_id = %job_id, dir = %temp_dir.path().display(), "scratch directory created");

        Ok(Self {
            temp_dir,
            assets: Vec::new(),
        })
    }

    /// Path to the scratch directory.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// A path for a named file inside the scratch directory.
    pub fn file(&self, name: &str) -> PathBuf {
        self.temp_dir.path().join(name)
    }

    /// Track `path` as an ephemeral asset and return its descriptor.
    pub fn register(&mut self, path: impl Into<PathBuf>, kind: MediaKind) -> MediaAsset {
        self.track(MediaAsset::ephemeral(path, kind))
    }

    /// Track a file the job reads but does not own. Cleanup leaves it alone.
    pub fn adopt(&mut self, path: impl Into<PathBuf>, kind: MediaKind) -> MediaAsset {
        self.track(MediaAsset::persistent(path, kind))
    }

    fn track(&mut self, asset: MediaAsset) -> MediaAsset {
        if let Some(existing) = self.assets.iter().find(|a| a.path == asset.path) {
            return existing.clone();
        }
        tracing::trace!(path = %asset.path.display(), kind = %asset.kind, ephemeral = asset.ephemeral, "tracking asset");
        self.assets.push(asset.clone());
        asset
    }

    /// Cached duration of a tracked asset.
    pub fn duration(&self, path: &Path) -> Option<f64> {
        self.assets.iter().find(|a| a.path == path).and_then(|a| a.duration)
    }

    /// Remember the measured duration of a tracked asset. Untracked paths are
    /// ignored.
    pub fn record_duration(&mut self, path: &Path, secs: f64) {
        if let Some(asset) = self.assets.iter_mut().find(|a| a.path == path) {
            asset.duration = Some(secs);
        }
    }

    /// Delete an asset that a later stage has superseded.
    pub fn discard(&mut self, path: &Path) {
        self.assets.retain(|a| a.path != path);
        remove_quietly(path);
    }

    /// Stop tracking `path` without deleting it (it has been moved out).
    pub fn release(&mut self, path: &Path) {
        self.assets.retain(|a| a.path != path);
    }

    /// Delete every tracked ephemeral asset and forget the rest. Returns
    /// how many were removed. Failures are logged and otherwise ignored.
    pub fn cleanup(&mut self) -> usize {
        let mut removed = 0;
        for asset in self.assets.drain(..) {
            if !asset.ephemeral {
                continue;
            }
            match std::fs::remove_file(&asset.path) {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!(
                        path = %asset.path.display(),
                        kind = %asset.kind,
                        "failed to remove ephemeral asset: {e}"
                    );
                }
            }
        }
        removed
    }

    /// Keep the scratch directory if anything is left in it, returning its
    /// location. An empty directory is removed as usual.
    pub fn persist(self) -> Option<PathBuf> {
        let has_leftovers = std::fs::read_dir(self.temp_dir.path())
            .map(|mut entries| entries.next().is_some())
            .unwrap_or(false);
        if has_leftovers {
            Some(self.temp_dir.keep())
        } else {
            None
        }
    }
}

fn remove_quietly(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => tracing::debug!(path = %path.display(), "discarded superseded artifact"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %path.display(), "failed to discard artifact: {e}"),
    }
}
