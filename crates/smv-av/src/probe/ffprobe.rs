//! ffprobe-backed media queries.
//!
//! Durations come from `ffprobe -v error -show_entries format=duration -of
//! default=noprint_wrappers=1:nokey=1 <path>`, which prints a bare float.
//! Images, broken files and streams without a container duration print
//! `N/A` or nothing, which surfaces as [`smv_core::Error::Probe`].
//!
//! The first video stream is read with `-select_streams v:0 -show_entries
//! stream=codec_name,width,height -of csv=p=0`, one `codec,width,height`
//! line. Stills report a single-frame stream (`png`, `mjpeg`), so this
//! also accepts images.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::command::ToolRunner;
use crate::tools::{ToolRegistry, FFPROBE};

/// ffprobe is quick; anything slower is a hung network mount.
const PROBE_TIMEOUT: Duration = Duration::from_secs(30);

/// Parse ffprobe's bare `format=duration` output.
pub fn parse_duration(stdout: &str) -> smv_core::Result<f64> {
    let text = stdout.trim();
    let secs: f64 = text
        .lines()
        .next()
        .unwrap_or_default()
        .trim()
        .parse()
        .map_err(|_| smv_core::Error::Probe(format!("unparseable duration '{text}'")))?;

    if !secs.is_finite() || secs <= 0.0 {
        return Err(smv_core::Error::Probe(format!("non-positive duration {secs}")));
    }
    Ok(secs)
}

/// First video stream of a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoStream {
    pub codec: String,
    pub width: u32,
    pub height: u32,
}

/// Parse the `codec,width,height` line printed for `v:0`.
pub fn parse_video_stream(stdout: &str) -> smv_core::Result<VideoStream> {
    let line = stdout.lines().map(str::trim).find(|l| !l.is_empty());
    let Some(line) = line else {
        return Err(smv_core::Error::Probe("no video stream".into()));
    };

    let mut fields = line.split(',').map(str::trim);
    let codec = fields.next().unwrap_or_default();
    let dims = (fields.next().map(str::parse::<u32>), fields.next().map(str::parse::<u32>));
    match (codec, dims) {
        (codec, (Some(Ok(width)), Some(Ok(height)))) if !codec.is_empty() && width > 0 && height > 0 => {
            Ok(VideoStream {
                codec: codec.to_string(),
                width,
                height,
            })
        }
        _ => Err(smv_core::Error::Probe(format!("unreadable video stream '{line}'"))),
    }
}

/// Probes media through a [`ToolRunner`].
#[derive(Clone)]
pub struct MediaProber {
    runner: Arc<dyn ToolRunner>,
    tools: ToolRegistry,
}

impl MediaProber {
    pub fn new(runner: Arc<dyn ToolRunner>, tools: ToolRegistry) -> Self {
        Self { runner, tools }
    }

    /// Duration of `path` in seconds.
    ///
    /// # Errors
    ///
    /// Every failure (missing ffprobe, tool error, no duration) is mapped to
    /// [`smv_core::Error::Probe`] so callers can treat it as "unknown".
    pub async fn duration(&self, path: &Path) -> smv_core::Result<f64> {
        let mut cmd = self
            .tools
            .command(FFPROBE)
            .map_err(|e| smv_core::Error::Probe(e.to_string()))?;
        cmd.args([
            "-v",
            "error",
            "-show_entries",
            "format=duration",
            "-of",
            "default=noprint_wrappers=1:nokey=1",
        ])
        .path_arg(path)
        .timeout(PROBE_TIMEOUT);

        let output = self
            .runner
            .run(&cmd)
            .await
            .map_err(|e| smv_core::Error::Probe(e.to_string()))?;
        let secs = parse_duration(&output.stdout)?;
        tracing::debug!(path = %path.display(), secs, "probed duration");
        Ok(secs)
    }

    /// Codec and dimensions of the first video stream of `path`.
    ///
    /// # Errors
    ///
    /// [`smv_core::Error::Probe`] when ffprobe fails or the file carries no
    /// decodable video stream (an HTML error page, a truncated download).
    pub async fn video_stream(&self, path: &Path) -> smv_core::Result<VideoStream> {
        let mut cmd = self
            .tools
            .command(FFPROBE)
            .map_err(|e| smv_core::Error::Probe(e.to_string()))?;
        cmd.args([
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-show_entries",
            "stream=codec_name,width,height",
            "-of",
            "csv=p=0",
        ])
        .path_arg(path)
        .timeout(PROBE_TIMEOUT);

        let output = self
            .runner
            .run(&cmd)
            .await
            .map_err(|e| smv_core::Error::Probe(e.to_string()))?;
        let stream = parse_video_stream(&output.stdout)?;
        tracing::debug!(
            path = %path.display(),
            codec = %stream.codec,
            width = stream.width,
            height = stream.height,
            "probed video stream"
        );
        Ok(stream)
    }

    /// Duration of `path`, or `None` with a warning when it cannot be probed.
    pub async fn duration_or_none(&self, path: &Path) -> Option<f64> {
        match self.duration(path).await {
            Ok(secs) => Some(secs),
            Err(e) => {
                tracing::warn!(path = %path.display(), "duration unknown: {e}");
                None
            }
        }
    }
}
