//! Media assets flowing between pipeline stages.
//!
//! A [`MediaAsset`] is a file on disk plus what the pipeline knows about it.
//! Ephemeral assets live in a job's scratch directory and are deleted when
//! the job ends; non-ephemeral assets (caller-supplied local files, the final
//! artifact) are never touched by cleanup.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Coarse classification of a media file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Audio,
    Video,
    Image,
}

impl MediaKind {
    /// Guess the kind from a file extension. Animated GIFs count as video
    /// because they are looped, not stilled.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "mp3" | "m4a" | "aac" | "wav" | "flac" | "ogg" | "opus" | "webm" => Some(Self::Audio),
            "mp4" | "mkv" | "mov" | "gif" | "avi" => Some(Self::Video),
            "jpg" | "jpeg" | "png" | "bmp" | "webp" => Some(Self::Image),
            _ => None,
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Audio => write!(f, "audio"),
            Self::Video => write!(f, "video"),
            Self::Image => write!(f, "image"),
        }
    }
}

/// A file produced or consumed by a pipeline stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaAsset {
    pub path: PathBuf,
    pub kind: MediaKind,
    /// Probed duration in seconds, filled in the first time it is needed.
    pub duration: Option<f64>,
    /// Whether the asset must be deleted when the job ends.
    pub ephemeral: bool,
}

impl MediaAsset {
    /// An asset the pipeline created and owns.
    pub fn ephemeral(path: impl Into<PathBuf>, kind: MediaKind) -> Self {
        Self {
            path: path.into(),
            kind,
            duration: None,
            ephemeral: true,
        }
    }

    /// An asset owned by someone else (caller input, final artifact).
    pub fn persistent(path: impl Into<PathBuf>, kind: MediaKind) -> Self {
        Self {
            path: path.into(),
            kind,
            duration: None,
            ephemeral: false,
        }
    }

    /// Whether the file exists and holds at least one byte.
    pub fn is_nonempty(&self) -> bool {
        std::fs::metadata(&self.path)
            .map(|m| m.is_file() && m.len() > 0)
            .unwrap_or(false)
    }
}
