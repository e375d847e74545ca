//! Stage ladders: encoder-independent fallbacks layered on top of the
//! encoder ladder.
//!
//! A [`StageLadder`] is an ordered list of templates. Each level is run
//! through [`run_with_fallback`] with the full encoder list; the first level
//! that produces a verified artifact ends the ladder.

use smv_av::{EncodeTemplate, EncoderProfile, ToolCommand, ToolRunner};
use smv_core::{Error, Result};

use crate::fallback::{run_with_fallback, Attempted};

/// Outcome of a ladder: which level won and how.
#[derive(Debug, Clone)]
pub struct LadderOutcome {
    /// 0-based index of the level that succeeded.
    pub level: usize,
    pub attempted: Attempted,
}

#[derive(Debug, Clone)]
pub struct StageLadder {
    stage: &'static str,
    levels: Vec<EncodeTemplate>,
}

impl StageLadder {
    pub fn new(stage: &'static str, levels: Vec<EncodeTemplate>) -> Self {
        Self { stage, levels }
    }

    /// Run the levels in order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Encode`] for the stage when every level is exhausted.
    /// The artifact of a superseded level is removed before the next level
    /// runs; the last level's partial artifact is kept.
    pub async fn run(
        &self,
        runner: &dyn ToolRunner,
        base: &ToolCommand,
        encoders: &[EncoderProfile],
    ) -> Result<LadderOutcome> {
        let total = self.levels.len();
        let mut last_error = None;

        for (level, template) in self.levels.iter().enumerate() {
            match run_with_fallback(runner, base, self.stage, template, encoders).await {
                Ok(attempted) => {
                    if level > 0 {
                        tracing::info!(stage = self.stage, level, "stage fallback level succeeded");
                    }
                    return Ok(LadderOutcome { level, attempted });
                }
                Err(e) if e.is_recoverable() => {
                    tracing::warn!(stage = self.stage, level, total, "stage level exhausted: {e}");
                    if level + 1 < total {
                        if let Err(rm) = std::fs::remove_file(template.output()) {
                            if rm.kind() != std::io::ErrorKind::NotFound {
                                tracing::warn!(path = %template.output().display(), "failed to remove superseded artifact: {rm}");
                            }
                        }
                    }
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| Error::encode(self.stage, "no fallback levels")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smv_av::actions::background::{loop_levels, static_levels};
    use smv_av::testing::{Outcome, ScriptedRunner};
    use smv_av::EncoderSelector;
    use std::path::{Path, PathBuf};

    fn base() -> ToolCommand {
        ToolCommand::new(PathBuf::from("ffmpeg"))
    }

    fn cpu_only() -> Vec<EncoderProfile> {
        vec![EncoderSelector::default().cpu_profile()]
    }

    #[tokio::test]
    async fn first_level_success() {
        let dir = tempfile::tempdir().unwrap();
        let ladder = StageLadder::new(
            "background",
            loop_levels(&dir.path().join("bg.gif"), &dir.path().join("bg.mp4"), 20.0, Some(2.0), 30),
        );
        let runner = ScriptedRunner::new();
        let out = ladder.run(&runner, &base(), &cpu_only()).await.unwrap();
        assert_eq!(out.level, 0);
        assert_eq!(out.attempted.output, dir.path().join("bg.mp4"));
    }

    #[tokio::test]
    async fn falls_through_to_explicit_loop_count() {
        let dir = tempfile::tempdir().unwrap();
        let ladder = StageLadder::new(
            "background",
            loop_levels(&dir.path().join("bg.gif"), &dir.path().join("bg.mp4"), 20.0, Some(2.0), 30),
        );
        let runner = ScriptedRunner::new()
            .rule("-stream_loop -1", Outcome::FailWithPartial, None)
            .fail_when("-ignore_loop 0");
        let out = ladder.run(&runner, &base(), &cpu_only()).await.unwrap();
        assert_eq!(out.level, 2);
        let calls = runner.ffmpeg_calls();
        assert_eq!(calls.len(), 3);
        assert!(calls[2].contains("-stream_loop 11 "));
    }

    #[tokio::test]
    async fn exhausted_ladder_reports_stage() {
        let dir = tempfile::tempdir().unwrap();
        let ladder = StageLadder::new(
            "background",
            static_levels(Path::new("/nope.png"), &dir.path().join("bg.mp4"), 5.0, 30),
        );
        let runner = ScriptedRunner::new().fail_when("-loop 1");
        let err = ladder.run(&runner, &base(), &cpu_only()).await.unwrap_err();
        assert!(matches!(err, Error::Encode { ref stage, .. } if stage == "background"));
        assert_eq!(runner.ffmpeg_calls().len(), 2);
    }

    #[tokio::test]
    async fn every_level_tries_every_encoder() {
        let dir = tempfile::tempdir().unwrap();
        let encoders = EncoderSelector::default().select(&smv_av::CapabilitySet::from_tokens(
            ["cuda"],
            ["h264_nvenc"],
        ));
        let ladder = StageLadder::new(
            "background",
            static_levels(Path::new("img.png"), &dir.path().join("bg.mp4"), 5.0, 30),
        );
        let runner = ScriptedRunner::new().fail_when("trunc(iw/2)");
        let out = ladder.run(&runner, &base(), &encoders).await.unwrap();
        assert_eq!(out.level, 1);
        assert_eq!(out.attempted.profile.unwrap().id, "nvenc");
        assert_eq!(runner.ffmpeg_calls().len(), 3);
    }
}
