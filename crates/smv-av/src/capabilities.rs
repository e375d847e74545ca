//! Hardware capability detection.
//!
//! [`CapabilityProber`] asks ffmpeg which hardware-acceleration backends and
//! H.264 encoders it was built with. Probing never fails: a missing ffmpeg,
//! a timeout or unparseable output all produce an empty [`CapabilitySet`],
//! which simply means CPU encoding.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::command::ToolRunner;
use crate::encoders::{vendor, HW_VENDORS};
use crate::tools::{ToolRegistry, FFMPEG};

/// Per-command timeout for the introspection calls.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(15);

/// Known hardware tokens present in this ffmpeg build.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CapabilitySet {
    pub hwaccels: BTreeSet<String>,
    pub encoders: BTreeSet<String>,
}

impl CapabilitySet {
    pub fn from_tokens<'a>(
        hwaccels: impl IntoIterator<Item = &'a str>,
        encoders: impl IntoIterator<Item = &'a str>,
    ) -> Self {
        Self {
            hwaccels: hwaccels.into_iter().map(str::to_string).collect(),
            encoders: encoders.into_iter().map(str::to_string).collect(),
        }
    }

    pub fn has_hwaccel(&self, token: &str) -> bool {
        self.hwaccels.contains(token)
    }

    pub fn has_encoder(&self, token: &str) -> bool {
        self.encoders.contains(token)
    }

    pub fn is_empty(&self) -> bool {
        self.hwaccels.is_empty() && self.encoders.is_empty()
    }

    /// Apply the `encoding.hw_accel` policy.
    ///
    /// `auto` keeps the detected set, `none` empties it, and a vendor name
    /// narrows the set to that vendor. A forced vendor is assumed present
    /// even when undetected; verification and the CPU fallback catch a
    /// wrong guess. Unknown policies behave like `auto`.
    pub fn apply_policy(self, policy: &str) -> Self {
        match policy {
            "auto" => self,
            "none" => Self::default(),
            other => match vendor(other) {
                Some(v) => Self::from_tokens([v.hwaccel], [v.encoder]),
                None => {
                    tracing::warn!(policy = other, "unknown hw_accel policy; using detected capabilities");
                    self
                }
            },
        }
    }
}

/// Extract known hwaccel tokens from `ffmpeg -hwaccels` output.
///
/// The listing is a header line followed by one backend name per line.
pub fn parse_hwaccels(text: &str) -> BTreeSet<String> {
    let known: BTreeSet<&str> = HW_VENDORS.iter().map(|v| v.hwaccel).collect();
    text.lines()
        .map(str::trim)
        .filter(|l| known.contains(l))
        .map(str::to_string)
        .collect()
}

/// Extract known encoder tokens from `ffmpeg -encoders` output.
///
/// Rows look like ` V....D h264_nvenc   NVIDIA NVENC H.264 encoder`; the
/// encoder name is the second column.
pub fn parse_encoders(text: &str) -> BTreeSet<String> {
    let known: BTreeSet<&str> = HW_VENDORS.iter().map(|v| v.encoder).collect();
    text.lines()
        .filter_map(|l| l.split_whitespace().nth(1))
        .filter(|name| known.contains(name))
        .map(str::to_string)
        .collect()
}

/// Queries ffmpeg for hardware support.
pub struct CapabilityProber {
    runner: Arc<dyn ToolRunner>,
    tools: ToolRegistry,
}

impl CapabilityProber {
    pub fn new(runner: Arc<dyn ToolRunner>, tools: ToolRegistry) -> Self {
        Self { runner, tools }
    }

    /// Detect the capability set. Never fails.
    pub async fn probe(&self) -> CapabilitySet {
        let hwaccels = self
            .list("-hwaccels")
            .await
            .map(|out| parse_hwaccels(&out))
            .unwrap_or_default();
        let encoders = self
            .list("-encoders")
            .await
            .map(|out| parse_encoders(&out))
            .unwrap_or_default();

        let caps = CapabilitySet { hwaccels, encoders };
        tracing::info!(
            hwaccels = ?caps.hwaccels,
            encoders = ?caps.encoders,
            "hardware capabilities probed"
        );
        caps
    }

    async fn list(&self, flag: &str) -> Option<String> {
        let mut cmd = match self.tools.command(FFMPEG) {
            Ok(cmd) => cmd,
            Err(e) => {
                tracing::warn!("capability probe skipped: {e}");
                return None;
            }
        };
        cmd.args(["-hide_banner", flag]).timeout(PROBE_TIMEOUT);

        match self.runner.run(&cmd).await {
            Ok(out) => Some(out.stdout),
            Err(e) => {
                tracing::warn!(flag, "capability probe failed: {e}");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedRunner;
    use std::path::PathBuf;

    const HWACCELS: &str = "Hardware acceleration methods:\nvdpau\ncuda\nvaapi\nqsv\ndrm\nopencl\n";
    const ENCODERS: &str = "Encoders:\n V..... = Video\n ------\n V....D libx264              libx264 H.264 / AVC\n V....D h264_nvenc           NVIDIA NVENC H.264 encoder (codec h264)\n V....D h264_vaapi           H.264/AVC (VAAPI) (codec h264)\n V....D hevc_nvenc           NVIDIA NVENC hevc encoder (codec hevc)\n A....D aac                  AAC (Advanced Audio Coding)\n";

    #[test]
    fn parses_hwaccel_listing() {
        let set = parse_hwaccels(HWACCELS);
        let got: Vec<&str> = set.iter().map(String::as_str).collect();
        assert_eq!(got, vec!["cuda", "qsv", "vaapi"]);
    }

    #[test]
    fn parses_encoder_listing() {
        let set = parse_encoders(ENCODERS);
        let got: Vec<&str> = set.iter().map(String::as_str).collect();
        assert_eq!(got, vec!["h264_nvenc", "h264_vaapi"]);
    }

    #[test]
    fn garbage_parses_to_empty() {
        assert!(parse_hwaccels("").is_empty());
        assert!(parse_encoders("not ffmpeg output at all").is_empty());
    }

    #[test]
    fn policy_none_and_forced() {
        let detected = CapabilitySet::from_tokens(["cuda"], ["h264_nvenc"]);
        assert!(detected.clone().apply_policy("none").is_empty());
        assert_eq!(detected.clone().apply_policy("auto"), detected);

        let forced = detected.apply_policy("vaapi");
        assert!(forced.has_encoder("h264_vaapi"));
        assert!(forced.has_hwaccel("vaapi"));
        assert!(!forced.has_encoder("h264_nvenc"));
    }

    #[tokio::test]
    async fn probe_reads_both_listings() {
        let runner = Arc::new(ScriptedRunner::new().with_capabilities(HWACCELS, ENCODERS));
        let tools = ToolRegistry::with_paths([(FFMPEG, PathBuf::from("ffmpeg"))]);
        let caps = CapabilityProber::new(runner.clone(), tools).probe().await;
        assert!(caps.has_hwaccel("cuda"));
        assert!(caps.has_encoder("h264_nvenc"));

        let calls = runner.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].get_args(), ["-hide_banner", "-hwaccels"]);
        assert_eq!(calls[0].get_timeout(), PROBE_TIMEOUT);
    }

    #[tokio::test]
    async fn probe_without_ffmpeg_is_empty() {
        let runner = Arc::new(ScriptedRunner::new());
        let caps = CapabilityProber::new(runner.clone(), ToolRegistry::default())
            .probe()
            .await;
        assert!(caps.is_empty());
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn probe_failure_is_soft() {
        let runner = Arc::new(ScriptedRunner::new().fail_when("-hwaccels").fail_when("-encoders"));
        let tools = ToolRegistry::with_paths([(FFMPEG, PathBuf::from("ffmpeg"))]);
        let caps = CapabilityProber::new(runner, tools).probe().await;
        assert!(caps.is_empty());
    }
}
