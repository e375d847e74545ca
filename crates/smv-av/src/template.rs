//! Encoder-independent ffmpeg command templates.
//!
//! An [`EncodeTemplate`] describes one transcode with a hole where the
//! encoder goes. [`EncodeTemplate::materialize`] fills the hole from an
//! [`EncoderProfile`]: decode acceleration on the accelerated inputs,
//! device initialisation, the upload filter, codec, preset and rate control.

use std::path::{Path, PathBuf};

use crate::command::ToolCommand;
use crate::encoders::{EncoderKind, EncoderProfile};

/// One `-i` input with its input-side options.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateInput {
    /// Options placed before `-i` (e.g. `-stream_loop -1`, `-loop 1`).
    pub options: Vec<String>,
    pub path: PathBuf,
    /// Whether `-hwaccel` may be applied to this input.
    pub accelerate: bool,
}

/// How the video stream is produced.
#[derive(Debug, Clone, PartialEq)]
pub enum VideoSlot {
    /// Filled from the encoder profile.
    Encoder,
    /// Fixed codec arguments; the template ignores the profile.
    Fixed(Vec<String>),
    /// No video stream (`-vn`).
    Disabled,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EncodeTemplate {
    inputs: Vec<TemplateInput>,
    video_filter: Option<String>,
    video: VideoSlot,
    /// Output options after the video codec (audio codec, `-t`, `-r`, ...).
    output_options: Vec<String>,
    output: PathBuf,
}

impl EncodeTemplate {
    pub fn new(output: impl Into<PathBuf>) -> Self {
        Self {
            inputs: Vec::new(),
            video_filter: None,
            video: VideoSlot::Encoder,
            output_options: Vec::new(),
            output: output.into(),
        }
    }

    /// Add an input that may be hardware decoded.
    pub fn input<I, S>(mut self, options: I, path: &Path) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inputs.push(TemplateInput {
            options: options.into_iter().map(Into::into).collect(),
            path: path.to_path_buf(),
            accelerate: true,
        });
        self
    }

    /// Add an input that is always software decoded (audio, still images).
    pub fn plain_input<I, S>(mut self, options: I, path: &Path) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inputs.push(TemplateInput {
            options: options.into_iter().map(Into::into).collect(),
            path: path.to_path_buf(),
            accelerate: false,
        });
        self
    }

    pub fn video_filter(mut self, filter: impl Into<String>) -> Self {
        self.video_filter = Some(filter.into());
        self
    }

    pub fn video(mut self, slot: VideoSlot) -> Self {
        self.video = slot;
        self
    }

    pub fn output_options<I, S>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output_options
            .extend(options.into_iter().map(Into::into));
        self
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    /// Whether the command changes with the encoder profile.
    pub fn has_encoder_slot(&self) -> bool {
        self.video == VideoSlot::Encoder
    }

    /// Build the concrete command on top of `base` (an ffmpeg command with
    /// its path and timeout already set).
    pub fn materialize(&self, base: &ToolCommand, profile: Option<&EncoderProfile>) -> ToolCommand {
        let profile = profile.filter(|_| self.has_encoder_slot());
        let mut cmd = base.clone();
        cmd.args(["-y", "-hide_banner", "-loglevel", "error"]);

        if let Some(p) = profile {
            cmd.args(p.device_init.iter().cloned());
        }

        for input in &self.inputs {
            if let Some(hw) = profile.and_then(|p| p.hwaccel.as_deref()) {
                if input.accelerate {
                    cmd.args(["-hwaccel", hw]);
                }
            }
            cmd.args(input.options.iter().cloned());
            cmd.arg("-i").path_arg(&input.path);
        }

        let stream_copy = profile.is_some_and(|p| p.kind == EncoderKind::StreamCopy);
        let upload = profile.and_then(|p| p.upload_filter.as_deref());
        let filter = match (self.video_filter.as_deref(), upload) {
            _ if stream_copy => None,
            (Some(f), Some(u)) => Some(format!("{f},{u}")),
            (Some(f), None) => Some(f.to_string()),
            (None, Some(u)) => Some(u.to_string()),
            (None, None) => None,
        };
        if let Some(f) = filter {
            cmd.args(["-vf", f.as_str()]);
        }

        match (&self.video, profile) {
            (VideoSlot::Encoder, Some(p)) => {
                cmd.args(["-c:v", p.encoder.as_str()]);
                if let Some(preset) = &p.preset {
                    cmd.args(["-preset", preset.as_str()]);
                }
                cmd.args(p.rate_control.iter().cloned());
            }
            (VideoSlot::Encoder, None) => {}
            (VideoSlot::Fixed(args), _) => {
                cmd.args(args.iter().cloned());
            }
            (VideoSlot::Disabled, _) => {
                cmd.arg("-vn");
            }
        }

        cmd.args(self.output_options.iter().cloned());
        cmd.path_arg(&self.output);
        cmd
    }
}
