//! The try / verify / advance / abort-on-exhaustion combinator.
//!
//! [`run_with_fallback`] materializes a template once per encoder profile
//! and runs the candidates in order. A candidate succeeds only when the tool
//! exits cleanly *and* its output exists with a nonzero size. A failed
//! candidate's partial output is deleted before the next one runs; the
//! partial output of the final candidate is left for diagnosis.

use std::path::{Path, PathBuf};

use smv_av::{EncodeTemplate, EncoderProfile, ToolCommand, ToolRunner};
use smv_core::{Error, Result};

/// A successful candidate.
#[derive(Debug, Clone)]
pub struct Attempted {
    /// The profile that produced the output; `None` for templates without an
    /// encoder slot.
    pub profile: Option<EncoderProfile>,
    pub output: PathBuf,
    /// 1-based index of the successful candidate.
    pub attempts: usize,
}

/// Check that `path` exists and is nonempty.
pub fn verify_artifact(path: &Path) -> Result<()> {
    match std::fs::metadata(path) {
        Ok(m) if m.is_file() && m.len() > 0 => Ok(()),
        Ok(m) if m.is_file() => Err(Error::verification(path, "artifact is empty")),
        Ok(_) => Err(Error::verification(path, "artifact is not a regular file")),
        Err(_) => Err(Error::verification(path, "artifact is missing")),
    }
}

fn discard_partial(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => tracing::debug!(path = %path.display(), "removed partial artifact"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %path.display(), "failed to remove partial artifact: {e}"),
    }
}

/// Run `template` against each profile in `encoders` until one verifies.
///
/// Templates without an encoder slot run exactly once. `base` is the
/// ffmpeg command (path and timeout) the template is materialized onto.
///
/// # Errors
///
/// Returns [`Error::Encode`] naming `stage` when every candidate fails, or
/// the first non-recoverable error a candidate raises.
pub async fn run_with_fallback(
    runner: &dyn ToolRunner,
    base: &ToolCommand,
    stage: &str,
    template: &EncodeTemplate,
    encoders: &[EncoderProfile],
) -> Result<Attempted> {
    let candidates: Vec<Option<&EncoderProfile>> = if template.has_encoder_slot() {
        encoders.iter().map(Some).collect()
    } else {
        vec![None]
    };

    if candidates.is_empty() {
        return Err(Error::encode(stage, "no encoder candidates"));
    }

    let output = template.output();
    let total = candidates.len();
    let mut last_error = None;

    for (i, candidate) in candidates.into_iter().enumerate() {
        let attempt = i + 1;
        let encoder = candidate.map(|p| p.id.as_str()).unwrap_or("-");
        let cmd = template.materialize(base, candidate);
        tracing::info!(stage, encoder, attempt, total, "running candidate");

        let result = match runner.run(&cmd).await {
            Ok(_) => verify_artifact(output),
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => {
                if attempt > 1 {
                    tracing::info!(stage, encoder, attempt, "fallback candidate succeeded");
                }
                return Ok(Attempted {
                    profile: candidate.cloned(),
                    output: output.to_path_buf(),
                    attempts: attempt,
                });
            }
            Err(e) if e.is_recoverable() => {
                tracing::warn!(stage, encoder, attempt, total, "candidate failed: {e}");
                if attempt < total {
                    discard_partial(output);
                }
                last_error = Some(e);
            }
            Err(e) => return Err(e),
        }
    }

    let detail = last_error.map(|e| e.to_string()).unwrap_or_default();
    Err(Error::encode(
        stage,
        format!("all {total} candidate(s) failed; last error: {detail}"),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use smv_av::testing::{Outcome, ScriptedRunner};
    use smv_av::{CapabilitySet, EncoderSelector, VideoSlot};
    use std::path::PathBuf;

    fn ladder() -> Vec<EncoderProfile> {
        EncoderSelector::default().select(&CapabilitySet::from_tokens(
            ["cuda"],
            ["h264_nvenc", "h264_qsv"],
        ))
    }

    fn template(dir: &Path) -> EncodeTemplate {
        EncodeTemplate::new(dir.join("out.mp4"))
            .plain_input(["-loop", "1"], &dir.join("in.png"))
            .video_filter("format=yuv420p")
    }

    fn base() -> ToolCommand {
        ToolCommand::new(PathBuf::from("ffmpeg"))
    }

    #[test]
    fn verify_rejects_missing_and_empty() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("a.mp4");
        assert!(matches!(verify_artifact(&p), Err(Error::Verification { .. })));
        std::fs::write(&p, b"").unwrap();
        let err = verify_artifact(&p).unwrap_err();
        assert!(err.to_string().contains("empty"));
        std::fs::write(&p, b"x").unwrap();
        verify_artifact(&p).unwrap();
    }

    #[tokio::test]
    async fn first_candidate_wins() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ScriptedRunner::new();
        let done = run_with_fallback(&runner, &base(), "bg", &template(dir.path()), &ladder())
            .await
            .unwrap();
        assert_eq!(done.attempts, 1);
        assert_eq!(done.profile.unwrap().id, "nvenc");
        assert_eq!(runner.ffmpeg_calls().len(), 1);
    }

    #[tokio::test]
    async fn advances_past_failures_and_empty_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ScriptedRunner::new()
            .rule("h264_nvenc", Outcome::FailWithPartial, None)
            .rule("h264_qsv", Outcome::EmptyOutput, None);
        let done = run_with_fallback(&runner, &base(), "bg", &template(dir.path()), &ladder())
            .await
            .unwrap();
        assert_eq!(done.attempts, 3);
        assert_eq!(done.profile.unwrap().id, "cpu");
        assert_eq!(std::fs::read(&done.output).unwrap(), b"fake-media");
    }

    #[tokio::test]
    async fn exhaustion_fails_and_keeps_last_partial() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ScriptedRunner::new()
            .rule("h264_nvenc", Outcome::Fail, None)
            .rule("h264_qsv", Outcome::Fail, None)
            .rule("libx264", Outcome::FailWithPartial, None);
        let t = template(dir.path());
        let err = run_with_fallback(&runner, &base(), "background", &t, &ladder())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Encode { .. }));
        assert!(err.to_string().contains("background"));
        assert!(err.to_string().contains("all 3 candidate(s) failed"));
        assert_eq!(std::fs::read(t.output()).unwrap(), b"partial");
    }

    #[tokio::test]
    async fn superseded_partial_is_removed() {
        let dir = tempfile::tempdir().unwrap();
        // The partial written by nvenc must be gone before qsv runs; qsv
        // then writes nothing, so the final state shows whether it was.
        let runner = ScriptedRunner::new()
            .rule("h264_nvenc", Outcome::FailWithPartial, None)
            .rule("h264_qsv", Outcome::NoOutput, None)
            .fail_when("libx264");
        let t = template(dir.path());
        let _ = run_with_fallback(&runner, &base(), "bg", &t, &ladder()).await;
        assert!(!t.output().exists());
    }

    #[tokio::test]
    async fn slotless_template_runs_once() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ScriptedRunner::new().fail_when("-frames:v");
        let t = EncodeTemplate::new(dir.path().join("f.png"))
            .plain_input(Vec::<String>::new(), &dir.path().join("bg.gif"))
            .video(VideoSlot::Fixed(vec!["-frames:v".into(), "1".into()]));
        let err = run_with_fallback(&runner, &base(), "frame", &t, &ladder())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("all 1 candidate(s) failed"));
        assert_eq!(runner.ffmpeg_calls().len(), 1);
    }

    #[tokio::test]
    async fn empty_ladder_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ScriptedRunner::new();
        let err = run_with_fallback(&runner, &base(), "bg", &template(dir.path()), &[])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no encoder candidates"));
    }
}
