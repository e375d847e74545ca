//! Everything a job needs that outlives the job.
//!
//! A [`PipelineContext`] is built once per process. Hardware capabilities
//! are probed at build time and the configured `hw_accel` policy is applied,
//! so every job sees the same deterministic encoder ladder.

use std::path::PathBuf;
use std::sync::Arc;

use smv_av::tools::FFMPEG;
use smv_av::{
    CapabilityProber, CapabilitySet, EncoderProfile, EncoderSelector, EncoderSettings,
    MediaProber, ToolCommand, ToolRegistry, ToolRunner,
};
use smv_core::config::{Config, EncodingConfig, OutputConfig};
use smv_core::Result;

use crate::fetch::Fetchers;

pub struct PipelineContext {
    pub runner: Arc<dyn ToolRunner>,
    pub tools: ToolRegistry,
    pub prober: MediaProber,
    pub selector: EncoderSelector,
    /// Detected capabilities after the `hw_accel` policy.
    pub capabilities: CapabilitySet,
    /// Encoder ladder for encode-class stages, CPU last.
    pub encoders: Vec<EncoderProfile>,
    pub encoding: EncodingConfig,
    pub output: OutputConfig,
    pub fetchers: Fetchers,
    /// Parent of per-job scratch directories; the system temp dir when unset.
    pub scratch_root: Option<PathBuf>,
}

impl PipelineContext {
    /// Assemble a context from an already known capability set.
    pub fn new(
        config: &Config,
        runner: Arc<dyn ToolRunner>,
        tools: ToolRegistry,
        fetchers: Fetchers,
        capabilities: CapabilitySet,
    ) -> Self {
        let capabilities = capabilities.apply_policy(&config.encoding.hw_accel);
        let selector = EncoderSelector::new(EncoderSettings::from(&config.encoding));
        let encoders = selector.select(&capabilities);
        tracing::info!(
            policy = %config.encoding.hw_accel,
            ladder = ?encoders.iter().map(|p| p.id.as_str()).collect::<Vec<_>>(),
            "encoder ladder ready"
        );

        Self {
            prober: MediaProber::new(runner.clone(), tools.clone()),
            runner,
            tools,
            selector,
            capabilities,
            encoders,
            encoding: config.encoding.clone(),
            output: config.output.clone(),
            fetchers,
            scratch_root: None,
        }
    }

    /// Probe hardware support through `runner`, then assemble.
    pub async fn detect(
        config: &Config,
        runner: Arc<dyn ToolRunner>,
        tools: ToolRegistry,
        fetchers: Fetchers,
    ) -> Self {
        let capabilities = CapabilityProber::new(runner.clone(), tools.clone())
            .probe()
            .await;
        Self::new(config, runner, tools, fetchers, capabilities)
    }

    pub fn with_scratch_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.scratch_root = Some(root.into());
        self
    }

    /// A bare ffmpeg invocation that templates are materialized onto.
    pub fn ffmpeg(&self) -> Result<ToolCommand> {
        self.tools.command(FFMPEG)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::{AutoFetcher, HttpFetcher, RetryPolicy};
    use smv_av::testing::ScriptedRunner;
    use smv_av::tools::FFPROBE;
    use smv_av::EncoderKind;

    fn fetchers() -> Fetchers {
        Fetchers::auto(AutoFetcher::new(
            HttpFetcher::new(RetryPolicy::once()).unwrap(),
            None,
        ))
    }

    fn tools() -> ToolRegistry {
        ToolRegistry::with_paths([(FFMPEG, PathBuf::from("ffmpeg")), (FFPROBE, PathBuf::from("ffprobe"))])
    }

    #[tokio::test]
    async fn detect_builds_hardware_ladder() {
        let runner = Arc::new(ScriptedRunner::new().with_capabilities(
            "Hardware acceleration methods:\ncuda\nvaapi\n",
            " V..... h264_nvenc  NVIDIA NVENC H.264 encoder\n V..... h264_vaapi  H.264/AVC (VAAPI)\n",
        ));
        let ctx = PipelineContext::detect(&Config::default(), runner, tools(), fetchers()).await;
        let ids: Vec<_> = ctx.encoders.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, ["nvenc", "vaapi", "cpu"]);
    }

    #[tokio::test]
    async fn policy_none_leaves_cpu_only() {
        let runner = Arc::new(ScriptedRunner::new().with_capabilities("cuda\n", " V..... h264_nvenc x\n"));
        let mut config = Config::default();
        config.encoding.hw_accel = "none".into();
        let ctx = PipelineContext::detect(&config, runner, tools(), fetchers()).await;
        assert_eq!(ctx.encoders.len(), 1);
        assert_eq!(ctx.encoders[0].kind, EncoderKind::Cpu);
    }

    #[test]
    fn missing_ffmpeg_is_reported() {
        let runner: Arc<dyn ToolRunner> = Arc::new(ScriptedRunner::new());
        let ctx = PipelineContext::new(
            &Config::default(),
            runner,
            ToolRegistry::default(),
            fetchers(),
            CapabilitySet::default(),
        );
        assert!(ctx.ffmpeg().is_err());
        assert_eq!(ctx.encoders.len(), 1);
    }
}
