//! Job domain model: what a caller submits and what observers see.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::ids::JobId;
use crate::Error;

/// Longest title fragment kept in a derived output name.
pub const MAX_TITLE_CHARS: usize = 50;

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

/// How the background asset is turned into a video track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackgroundKind {
    /// A still image held for the whole target duration.
    Static,
    /// An animated asset (GIF, short clip) repeated to fill the duration.
    Looping,
}

impl fmt::Display for BackgroundKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static => write!(f, "static"),
            Self::Looping => write!(f, "looping"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackgroundSpec {
    pub kind: BackgroundKind,
    pub locator: String,
}

/// Playback speed change applied to the source audio.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpeedSpec {
    pub ratio: f64,
}

impl SpeedSpec {
    pub const SLOWED: f64 = 0.9;
    pub const NIGHTCORE: f64 = 1.4;

    pub fn slowed() -> Self {
        Self { ratio: Self::SLOWED }
    }

    pub fn nightcore() -> Self {
        Self {
            ratio: Self::NIGHTCORE,
        }
    }

    /// Resolve a preset name (`slowed`, `nightcore`) or a numeric ratio.
    pub fn parse(s: &str) -> Result<Self> {
        let spec = match s.trim().to_ascii_lowercase().as_str() {
            "slowed" | "slow" => Self::slowed(),
            "nightcore" | "fast" => Self::nightcore(),
            other => {
                let ratio = other
                    .parse::<f64>()
                    .map_err(|_| Error::Validation(format!("unknown speed '{s}'")))?;
                Self { ratio }
            }
        };
        spec.validate()?;
        Ok(spec)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.ratio.is_finite() || self.ratio <= 0.0 {
            return Err(Error::Validation(format!(
                "speed ratio must be a finite number > 0, got {}",
                self.ratio
            )));
        }
        Ok(())
    }

    /// Output name prefix for this direction of change.
    pub fn name_prefix(&self) -> &'static str {
        if self.ratio < 1.0 {
            "slowed_down_"
        } else {
            "nightcore_"
        }
    }
}

/// Naming and presentation options for the final artifact.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct OutputOptions {
    /// Explicit output stem; derived from the title when absent.
    pub name: Option<String>,
    /// Container extension; the configured default applies when absent.
    pub extension: Option<String>,
    /// Text burned into the video when set. Best-effort.
    pub overlay_text: Option<String>,
    /// Write a `<stem>.credits.txt` provenance sidecar.
    pub keep_manifest: bool,
    /// Destination directory; the configured outputs directory when absent.
    /// Local callers only: never read from or written to the wire.
    #[serde(skip)]
    pub output_dir: Option<PathBuf>,
}

/// Everything needed to run one job. Immutable once submitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRequest {
    pub source_locator: String,
    /// Human-readable title of the source, used for naming.
    #[serde(default)]
    pub title: Option<String>,
    pub background: BackgroundSpec,
    pub speed: SpeedSpec,
    #[serde(default)]
    pub output_options: OutputOptions,
}

impl JobRequest {
    /// Reject requests that cannot possibly succeed, before any job is claimed.
    pub fn validate(&self) -> Result<()> {
        if self.source_locator.trim().is_empty() {
            return Err(Error::Validation("source locator is empty".into()));
        }
        if self.background.locator.trim().is_empty() {
            return Err(Error::Validation("background locator is empty".into()));
        }
        self.speed.validate()?;
        if let Some(ext) = &self.output_options.extension {
            if ext.is_empty() || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
                return Err(Error::Validation(format!("invalid output extension '{ext}'")));
            }
        }
        if let Some(name) = &self.output_options.name {
            if sanitize_title(name).is_empty() {
                return Err(Error::Validation(format!("invalid output name '{name}'")));
            }
        }
        Ok(())
    }

    /// The title used for naming: explicit title, else the locator's file stem.
    pub fn display_title(&self) -> String {
        if let Some(title) = self.title.as_deref().filter(|t| !t.trim().is_empty()) {
            return title.to_string();
        }
        let tail = self
            .source_locator
            .trim_end_matches('/')
            .rsplit(['/', '\\', '='])
            .next()
            .unwrap_or_default();
        Path::new(tail)
            .file_stem()
            .and_then(|s| s.to_str())
            .filter(|s| !s.is_empty())
            .unwrap_or("output")
            .to_string()
    }

    /// Output stem before collision handling, e.g. `nightcore_My_Song`.
    pub fn output_stem(&self) -> String {
        match self.output_options.name.as_deref() {
            Some(name) => sanitize_title(name),
            None => {
                let title = sanitize_title(&self.display_title());
                let title = if title.is_empty() { "output".to_string() } else { title };
                format!("{}{}", self.speed.name_prefix(), title)
            }
        }
    }
}

/// Replace every non-alphanumeric character with `_`, collapse runs of `_`,
/// trim them from both ends, and cap the result at [`MAX_TITLE_CHARS`].
pub fn sanitize_title(title: &str) -> String {
    let mut out = String::with_capacity(title.len());
    for c in title.chars() {
        let c = if c.is_alphanumeric() { c } else { '_' };
        if c == '_' && out.ends_with('_') {
            continue;
        }
        out.push(c);
    }
    let trimmed: String = out.trim_matches('_').chars().take(MAX_TITLE_CHARS).collect();
    trimmed.trim_end_matches('_').to_string()
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Lifecycle of the single job slot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    #[default]
    Idle,
    Running,
    Complete,
    Failed,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Running => write!(f, "running"),
            Self::Complete => write!(f, "complete"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Coarse executor stage reported alongside progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineStage {
    Fetching,
    Preparing,
    Encoding,
    Muxing,
    Finalizing,
    Done,
    Error,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Fetching => "fetching",
            Self::Preparing => "preparing",
            Self::Encoding => "encoding",
            Self::Muxing => "muxing",
            Self::Finalizing => "finalizing",
            Self::Done => "done",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}

/// Snapshot of the job slot as seen by observers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatus {
    pub state: JobState,
    pub progress: u8,
    pub message: String,
    /// Set only when `state` is `Complete`.
    pub output_path: Option<PathBuf>,
    pub stage: Option<PipelineStage>,
    pub job_id: Option<JobId>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Default for JobStatus {
    fn default() -> Self {
        Self {
            state: JobState::Idle,
            progress: 0,
            message: "Idle".into(),
            output_path: None,
            stage: None,
            job_id: None,
            started_at: None,
            finished_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(source: &str, ratio: f64) -> JobRequest {
        JobRequest {
            source_locator: source.into(),
            title: None,
            background: BackgroundSpec {
                kind: BackgroundKind::Static,
                locator: "bg.png".into(),
            },
            speed: SpeedSpec { ratio },
            output_options: OutputOptions::default(),
        }
    }

    #[test]
    fn sanitize_replaces_and_collapses() {
        assert_eq!(sanitize_title("My Song (Official Video)"), "My_Song_Official_Video");
        assert_eq!(sanitize_title("a -- b"), "a_b");
        assert_eq!(sanitize_title("///"), "");
    }

    #[test]
    fn sanitize_caps_length() {
        let long = "x".repeat(80);
        assert_eq!(sanitize_title(&long).chars().count(), MAX_TITLE_CHARS);
    }

    #[test]
    fn speed_presets_and_parse() {
        assert_eq!(SpeedSpec::parse("slowed").unwrap().ratio, 0.9);
        assert_eq!(SpeedSpec::parse("Nightcore").unwrap().ratio, 1.4);
        assert_eq!(SpeedSpec::parse("1.25").unwrap().ratio, 1.25);
        assert!(SpeedSpec::parse("0").is_err());
        assert!(SpeedSpec::parse("-1").is_err());
        assert!(SpeedSpec::parse("NaN").is_err());
        assert!(SpeedSpec::parse("warp").is_err());
    }

    #[test]
    fn invalid_ratio_is_validation_error() {
        let err = request("song.mp3", f64::INFINITY).validate().unwrap_err();
        assert_eq!(err.http_status(), 400);
    }

    #[test]
    fn empty_locators_rejected() {
        assert!(request("  ", 1.4).validate().is_err());
        let mut req = request("song.mp3", 1.4);
        req.background.locator = String::new();
        assert!(req.validate().is_err());
    }

    #[test]
    fn derived_stem_uses_direction_prefix() {
        let mut req = request("/music/My Song.mp3", 1.4);
        assert_eq!(req.output_stem(), "nightcore_My_Song");
        req.speed = SpeedSpec::slowed();
        assert_eq!(req.output_stem(), "slowed_down_My_Song");
        req.title = Some("Other Title!".into());
        assert_eq!(req.output_stem(), "slowed_down_Other_Title");
    }

    #[test]
    fn explicit_name_wins() {
        let mut req = request("song.mp3", 1.4);
        req.output_options.name = Some("final cut".into());
        assert_eq!(req.output_stem(), "final_cut");
    }

    #[test]
    fn request_deserializes_camel_case() {
        let json = r#"{
            "sourceLocator": "https://example.com/a.mp3",
            "background": {"kind": "looping", "locator": "bg.gif"},
            "speed": {"ratio": 0.9},
            "outputOptions": {"keepManifest": true}
        }"#;
        let req: JobRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.background.kind, BackgroundKind::Looping);
        assert!(req.output_options.keep_manifest);
        assert!(req.title.is_none());
        req.validate().unwrap();
    }

    #[test]
    fn wire_requests_cannot_redirect_output() {
        let json = r#"{
            "sourceLocator": "a.mp3",
            "background": {"kind": "static", "locator": "bg.png"},
            "speed": {"ratio": 1.4},
            "outputOptions": {"outputDir": "/etc", "name": "x"}
        }"#;
        let req: JobRequest = serde_json::from_str(json).unwrap();
        assert!(req.output_options.output_dir.is_none());
        assert_eq!(req.output_options.name.as_deref(), Some("x"));

        let mut local = req.clone();
        local.output_options.output_dir = Some(PathBuf::from("/tmp/out"));
        let echoed = serde_json::to_value(&local).unwrap();
        assert!(echoed["outputOptions"].get("outputDir").is_none());
    }

    #[test]
    fn status_serializes_camel_case() {
        let status = JobStatus {
            state: JobState::Complete,
            progress: 100,
            output_path: Some(PathBuf::from("outputs/a.mp4")),
            ..JobStatus::default()
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["state"], "complete");
        assert_eq!(json["outputPath"], "outputs/a.mp4");
        assert!(json["jobId"].is_null());
    }
}
