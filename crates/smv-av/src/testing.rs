//! A scripted [`ToolRunner`] that emulates ffmpeg, ffprobe and yt-dlp.
//!
//! Transcodes "succeed" by writing a few bytes to the output path (the last
//! argument, or the value after `-o` for yt-dlp). ffprobe answers from tables
//! of file-name fragments. Failures are injected by matching a fragment of
//! the rendered command line.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::command::{ToolCommand, ToolOutput, ToolRunner};

/// What an injected rule does to a matching command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Non-zero exit, no output.
    Fail,
    /// Non-zero exit after writing a partial output.
    FailWithPartial,
    /// Zero exit but the output is empty.
    EmptyOutput,
    /// Zero exit but no output is written at all.
    NoOutput,
}

#[derive(Debug)]
struct Rule {
    needle: String,
    outcome: Outcome,
    /// `None` = applies forever.
    remaining: Option<usize>,
}

#[derive(Default)]
struct State {
    calls: Vec<ToolCommand>,
    rules: Vec<Rule>,
}

/// Scripted stand-in for the real tools.
#[derive(Default)]
pub struct ScriptedRunner {
    state: Mutex<State>,
    hwaccels: String,
    encoders: String,
    durations: Vec<(String, Option<f64>)>,
    default_duration: Option<f64>,
    streams: Vec<(String, Option<String>)>,
    payload: Vec<u8>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self {
            default_duration: Some(10.0),
            payload: b"fake-media".to_vec(),
            ..Self::default()
        }
    }

    pub fn with_capabilities(mut self, hwaccels: &str, encoders: &str) -> Self {
        self.hwaccels = hwaccels.to_string();
        self.encoders = encoders.to_string();
        self
    }

    /// ffprobe answers `secs` for any path containing `fragment`; `None`
    /// makes the probe fail. First matching fragment wins.
    pub fn with_duration(mut self, fragment: &str, secs: Option<f64>) -> Self {
        self.durations.push((fragment.to_string(), secs));
        self
    }

    /// Answer for paths that match no fragment.
    pub fn with_default_duration(mut self, secs: Option<f64>) -> Self {
        self.default_duration = secs;
        self
    }

    /// Video stream line (`codec,width,height`) reported for paths
    /// containing `fragment`; `None` reports no video stream. Unmatched
    /// paths report `h264,1280,720`.
    pub fn with_video_stream(mut self, fragment: &str, line: Option<&str>) -> Self {
        self.streams.push((fragment.to_string(), line.map(str::to_string)));
        self
    }

    /// Any command whose rendering contains `needle` fails.
    pub fn fail_when(self, needle: &str) -> Self {
        self.rule(needle, Outcome::Fail, None)
    }

    /// Any command whose rendering contains `needle` gets `outcome`; after
    /// `times` matches (when given) the rule stops applying.
    pub fn rule(self, needle: &str, outcome: Outcome, times: Option<usize>) -> Self {
        self.state.lock().rules.push(Rule {
            needle: needle.to_string(),
            outcome,
            remaining: times,
        });
        self
    }

    /// Every command run so far.
    pub fn calls(&self) -> Vec<ToolCommand> {
        self.state.lock().calls.clone()
    }

    /// Rendered ffmpeg transcode commands (introspection excluded).
    pub fn ffmpeg_calls(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| c.tool_name().contains("ffmpeg"))
            .filter(|c| !c.get_args().iter().any(|a| a == "-hwaccels" || a == "-encoders"))
            .map(|c| c.display())
            .collect()
    }

    fn matching_outcome(&self, rendered: &str) -> Option<Outcome> {
        let mut state = self.state.lock();
        for rule in state.rules.iter_mut() {
            if !rendered.contains(&rule.needle) {
                continue;
            }
            match rule.remaining.as_mut() {
                Some(0) => continue,
                Some(n) => *n -= 1,
                None => {}
            }
            return Some(rule.outcome);
        }
        None
    }

    fn duration_for(&self, path: &str) -> Option<f64> {
        self.durations
            .iter()
            .find(|(fragment, _)| path.contains(fragment.as_str()))
            .map(|(_, secs)| *secs)
            .unwrap_or(self.default_duration)
    }

    fn stream_for(&self, path: &str) -> String {
        self.streams
            .iter()
            .find(|(fragment, _)| path.contains(fragment.as_str()))
            .map(|(_, line)| line.clone().unwrap_or_default())
            .unwrap_or_else(|| "h264,1280,720".to_string())
    }

    fn output_path(cmd: &ToolCommand) -> Option<PathBuf> {
        let args = cmd.get_args();
        if cmd.tool_name().contains("yt-dlp") {
            let idx = args.iter().position(|a| a == "-o")?;
            return args.get(idx + 1).map(PathBuf::from);
        }
        args.last().map(PathBuf::from)
    }

    fn write(path: &Path, bytes: &[u8]) {
        let _ = std::fs::write(path, bytes);
    }

    fn failure(cmd: &ToolCommand) -> smv_core::Error {
        smv_core::Error::tool(cmd.tool_name(), "exited with status 1: scripted failure")
    }
}

#[async_trait]
impl ToolRunner for ScriptedRunner {
    async fn run(&self, cmd: &ToolCommand) -> smv_core::Result<ToolOutput> {
        let rendered = cmd.display();
        self.state.lock().calls.push(cmd.clone());
        let outcome = self.matching_outcome(&rendered);
        let tool = cmd.tool_name();
        let args = cmd.get_args();

        if tool.contains("ffprobe") {
            if outcome.is_some() {
                return Err(Self::failure(cmd));
            }
            let path = args.last().cloned().unwrap_or_default();
            if args.iter().any(|a| a == "-select_streams") {
                return Ok(ToolOutput {
                    code: Some(0),
                    stdout: format!("{}\n", self.stream_for(&path)),
                    stderr: String::new(),
                });
            }
            return match self.duration_for(&path) {
                Some(secs) => Ok(ToolOutput {
                    code: Some(0),
                    stdout: format!("{secs:.6}\n"),
                    stderr: String::new(),
                }),
                None => Ok(ToolOutput {
                    code: Some(0),
                    stdout: "N/A\n".into(),
                    stderr: String::new(),
                }),
            };
        }

        if args.iter().any(|a| a == "-hwaccels" || a == "-encoders") {
            if outcome.is_some() {
                return Err(Self::failure(cmd));
            }
            let stdout = if args.iter().any(|a| a == "-hwaccels") {
                self.hwaccels.clone()
            } else {
                self.encoders.clone()
            };
            return Ok(ToolOutput {
                code: Some(0),
                stdout,
                stderr: String::new(),
            });
        }

        let output = Self::output_path(cmd);
        match (outcome, output) {
            (Some(Outcome::Fail), _) => Err(Self::failure(cmd)),
            (Some(Outcome::FailWithPartial), Some(out)) => {
                Self::write(&out, b"partial");
                Err(Self::failure(cmd))
            }
            (Some(Outcome::FailWithPartial), None) => Err(Self::failure(cmd)),
            (Some(Outcome::EmptyOutput), out) => {
                if let Some(out) = out {
                    Self::write(&out, b"");
                }
                Ok(ToolOutput {
                    code: Some(0),
                    ..ToolOutput::default()
                })
            }
            (Some(Outcome::NoOutput), _) => Ok(ToolOutput {
                code: Some(0),
                ..ToolOutput::default()
            }),
            (None, out) => {
                if let Some(out) = out {
                    Self::write(&out, &self.payload);
                }
                Ok(ToolOutput {
                    code: Some(0),
                    ..ToolOutput::default()
                })
            }
        }
    }
}
