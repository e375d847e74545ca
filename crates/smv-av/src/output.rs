//! Placement of finished artifacts into the outputs directory.
//!
//! Name collisions never overwrite: a `_<unix-seconds>` suffix is added, and
//! a counter on top of that if needed. The artifact is copied out of scratch
//! and the scratch copy deleted afterwards; a failed delete is only a
//! warning because the job's product is already safe.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use smv_core::BackgroundKind;

/// Provenance written next to an artifact as `<stem>.credits.txt`.
#[derive(Debug, Clone)]
pub struct Manifest {
    pub title: Option<String>,
    pub source_locator: String,
    pub background_kind: BackgroundKind,
    pub background_locator: String,
    pub ratio: f64,
    pub created: DateTime<Local>,
}

impl Manifest {
    pub fn render(&self) -> String {
        let mut out = String::new();
        if let Some(title) = &self.title {
            out.push_str(&format!("Title: {title}\n"));
        }
        out.push_str(&format!("Source: {}\n", self.source_locator));
        out.push_str(&format!(
            "Background ({}): {}\n",
            self.background_kind, self.background_locator
        ));
        out.push_str(&format!("Speed ratio: {}\n", self.ratio));
        out.push_str(&format!("Created: {}\n", self.created.format("%Y-%m-%d %H:%M:%S")));
        out
    }
}

/// Moves artifacts into a destination directory.
#[derive(Debug, Clone)]
pub struct OutputResolver {
    dir: PathBuf,
}

impl OutputResolver {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// First free path for `<stem>.<ext>`, using `secs` for the collision
    /// suffix.
    pub fn resolve_at(&self, stem: &str, ext: &str, secs: i64) -> PathBuf {
        let plain = self.dir.join(format!("{stem}.{ext}"));
        if !plain.exists() {
            return plain;
        }
        let stamped = self.dir.join(format!("{stem}_{secs}.{ext}"));
        if !stamped.exists() {
            return stamped;
        }
        (1u32..)
            .map(|n| self.dir.join(format!("{stem}_{secs}_{n}.{ext}")))
            .find(|p| !p.exists())
            .unwrap_or(stamped)
    }

    /// First free path for `<stem>.<ext>` right now.
    pub fn resolve(&self, stem: &str, ext: &str) -> PathBuf {
        self.resolve_at(stem, ext, chrono::Utc::now().timestamp())
    }

    /// Copy `artifact` to its final name and delete the original.
    ///
    /// # Errors
    ///
    /// Fails if the destination directory cannot be created or the copy
    /// fails. Deleting the source never fails the call.
    pub fn place(&self, artifact: &Path, stem: &str, ext: &str) -> smv_core::Result<PathBuf> {
        std::fs::create_dir_all(&self.dir)?;
        let dest = self.resolve(stem, ext);

        std::fs::copy(artifact, &dest).map_err(|e| {
            smv_core::Error::Internal(format!(
                "failed to copy {} to {}: {e}",
                artifact.display(),
                dest.display()
            ))
        })?;

        if let Err(e) = std::fs::remove_file(artifact) {
            tracing::warn!(path = %artifact.display(), "artifact copied but source not removed: {e}");
        }

        tracing::info!(output = %dest.display(), "artifact placed");
        Ok(dest)
    }

    /// Write the provenance sidecar for `artifact`. Failures are warnings.
    pub fn write_manifest(&self, artifact: &Path, manifest: &Manifest) -> Option<PathBuf> {
        let stem = artifact.file_stem()?.to_string_lossy().into_owned();
        let path = artifact.with_file_name(format!("{stem}.credits.txt"));
        match std::fs::write(&path, manifest.render()) {
            Ok(()) => Some(path),
            Err(e) => {
                tracing::warn!(path = %path.display(), "failed to write manifest: {e}");
                None
            }
        }
    }
}
