//! Unified error type for the spedup-mv orchestrator.
//!
//! Every crate funnels its failures into [`Error`]. The variants mirror the
//! failure taxonomy of a transcode job: fetch failures are fatal, probe
//! failures degrade gracefully, encode and verification failures advance the
//! fallback ladder. HTTP handlers derive a status code via
//! [`Error::http_status`].

use std::fmt;
use std::path::{Path, PathBuf};

/// Unified error type covering all failure modes in spedup-mv.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An input (source media or background asset) could not be obtained.
    #[error("Fetch error [{what}]: {message}")]
    Fetch {
        /// Which input failed ("source", "background").
        what: String,
        /// Human-readable error description.
        message: String,
    },

    /// A capability or duration probe failed.
    #[error("Probe error: {0}")]
    Probe(String),

    /// An encode candidate failed to run to completion.
    #[error("Encode error [{stage}]: {message}")]
    Encode {
        /// The pipeline stage that was encoding.
        stage: String,
        /// Human-readable error description.
        message: String,
    },

    /// A tool exited successfully but its artifact is missing or empty.
    #[error("Verification failed for {}: {reason}", path.display())]
    Verification {
        /// The artifact that was expected.
        path: PathBuf,
        /// Why verification rejected it.
        reason: String,
    },

    /// Another job is already running.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Request data failed validation.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The requested entity could not be found.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// The kind of entity (e.g. "job", "output").
        entity: String,
        /// The identifier that was looked up.
        id: String,
    },

    /// The job was cancelled between stages.
    #[error("Job cancelled")]
    Cancelled,

    /// An I/O operation failed.
    #[error("IO error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// An external tool (ffmpeg, ffprobe, yt-dlp) could not be run.
    #[error("Tool error [{tool}]: {message}")]
    Tool {
        /// Name of the tool that failed.
        tool: String,
        /// Human-readable error description.
        message: String,
    },

    /// Catch-all for unexpected internal errors.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Map this error to an appropriate HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            Error::Fetch { .. } => 502,
            Error::Probe(_) => 422,
            Error::Encode { .. } => 500,
            Error::Verification { .. } => 500,
            Error::Conflict(_) => 409,
            Error::Validation(_) => 400,
            Error::NotFound { .. } => 404,
            Error::Cancelled => 409,
            Error::Io { .. } => 500,
            Error::Tool { .. } => 502,
            Error::Internal(_) => 500,
        }
    }

    /// Whether the fallback ladder should advance to the next candidate
    /// after this error instead of aborting the stage.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::Encode { .. } | Error::Verification { .. } | Error::Tool { .. }
        )
    }

    /// Convenience constructor for [`Error::Fetch`].
    pub fn fetch(what: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Fetch {
            what: what.into(),
            message: message.into(),
        }
    }

    /// Convenience constructor for [`Error::Encode`].
    pub fn encode(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Encode {
            stage: stage.into(),
            message: message.into(),
        }
    }

    /// Convenience constructor for [`Error::Verification`].
    pub fn verification(path: &Path, reason: impl Into<String>) -> Self {
        Error::Verification {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }

    /// Convenience constructor for [`Error::NotFound`].
    pub fn not_found(entity: impl Into<String>, id: impl fmt::Display) -> Self {
        Error::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    /// Convenience constructor for [`Error::Tool`].
    pub fn tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Tool {
            tool: tool.into(),
            message: message.into(),
        }
    }
}

/// Result alias using the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
