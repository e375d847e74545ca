//! Encoder profiles and the ordered ladder built from a capability set.
//!
//! Hardware vendors are tried in a fixed priority order; the libx264 CPU
//! profile is always appended last so every ladder has a terminal fallback.

use serde::Serialize;

use crate::capabilities::CapabilitySet;

/// A hardware backend the orchestrator knows how to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HwVendor {
    /// Policy name accepted by `encoding.hw_accel`.
    pub id: &'static str,
    /// Token listed by `ffmpeg -hwaccels`.
    pub hwaccel: &'static str,
    /// Token listed by `ffmpeg -encoders`.
    pub encoder: &'static str,
    pub priority: u32,
}

/// Vendor priority table, lowest priority tried first.
pub const HW_VENDORS: &[HwVendor] = &[
    HwVendor { id: "nvenc", hwaccel: "cuda", encoder: "h264_nvenc", priority: 10 },
    HwVendor { id: "qsv", hwaccel: "qsv", encoder: "h264_qsv", priority: 20 },
    HwVendor { id: "amf", hwaccel: "d3d11va", encoder: "h264_amf", priority: 30 },
    HwVendor { id: "videotoolbox", hwaccel: "videotoolbox", encoder: "h264_videotoolbox", priority: 40 },
    HwVendor { id: "vaapi", hwaccel: "vaapi", encoder: "h264_vaapi", priority: 50 },
];

const VAAPI_DEVICE: &str = "/dev/dri/renderD128";

pub fn vendor(id: &str) -> Option<&'static HwVendor> {
    HW_VENDORS.iter().find(|v| v.id == id)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EncoderKind {
    Hardware,
    /// Re-mux the already encoded video without touching it.
    StreamCopy,
    Cpu,
}

/// One rung of an encoder ladder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EncoderProfile {
    pub id: String,
    pub kind: EncoderKind,
    /// `-hwaccel` value, when the decode backend is also available.
    pub hwaccel: Option<String>,
    /// `-c:v` value.
    pub encoder: String,
    pub preset: Option<String>,
    /// Bitrate / quality arguments following the preset.
    pub rate_control: Vec<String>,
    /// Global options that must precede the inputs (VAAPI device).
    pub device_init: Vec<String>,
    /// Filter appended to the video chain to move frames onto the device.
    pub upload_filter: Option<String>,
    pub priority: u32,
}

impl EncoderProfile {
    pub fn is_hardware(&self) -> bool {
        self.kind == EncoderKind::Hardware
    }

    pub fn stream_copy() -> Self {
        Self {
            id: "copy".into(),
            kind: EncoderKind::StreamCopy,
            hwaccel: None,
            encoder: "copy".into(),
            preset: None,
            rate_control: Vec::new(),
            device_init: Vec::new(),
            upload_filter: None,
            priority: u32::MAX - 1,
        }
    }
}

/// Tunables shared by every profile the selector emits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderSettings {
    pub cpu_preset: String,
    pub cpu_crf: u32,
    pub hw_bitrate: String,
}

impl Default for EncoderSettings {
    fn default() -> Self {
        Self {
            cpu_preset: "fast".into(),
            cpu_crf: 22,
            hw_bitrate: "5M".into(),
        }
    }
}

impl From<&smv_core::config::EncodingConfig> for EncoderSettings {
    fn from(cfg: &smv_core::config::EncodingConfig) -> Self {
        Self {
            cpu_preset: cfg.cpu_preset.clone(),
            cpu_crf: cfg.cpu_crf,
            hw_bitrate: cfg.hw_bitrate.clone(),
        }
    }
}

/// Turns a [`CapabilitySet`] into an ordered encoder ladder.
#[derive(Debug, Clone, Default)]
pub struct EncoderSelector {
    settings: EncoderSettings,
}

impl EncoderSelector {
    pub fn new(settings: EncoderSettings) -> Self {
        Self { settings }
    }

    /// Hardware profiles whose encoder is listed, by vendor priority, then
    /// exactly one CPU profile.
    pub fn select(&self, caps: &CapabilitySet) -> Vec<EncoderProfile> {
        let mut ladder: Vec<EncoderProfile> = HW_VENDORS
            .iter()
            .filter(|v| caps.has_encoder(v.encoder))
            .map(|v| self.hardware_profile(v, caps.has_hwaccel(v.hwaccel)))
            .collect();
        ladder.sort_by_key(|p| p.priority);
        ladder.push(self.cpu_profile());
        ladder
    }

    /// Mux ladder: the hardware profile that produced the video (if any),
    /// then stream copy, then CPU re-encode.
    pub fn mux_ladder(&self, previous: Option<&EncoderProfile>) -> Vec<EncoderProfile> {
        let mut ladder = Vec::with_capacity(3);
        if let Some(p) = previous.filter(|p| p.is_hardware()) {
            ladder.push(p.clone());
        }
        ladder.push(EncoderProfile::stream_copy());
        ladder.push(self.cpu_profile());
        ladder
    }

    pub fn cpu_profile(&self) -> EncoderProfile {
        EncoderProfile {
            id: "cpu".into(),
            kind: EncoderKind::Cpu,
            hwaccel: None,
            encoder: "libx264".into(),
            preset: Some(self.settings.cpu_preset.clone()),
            rate_control: vec!["-crf".into(), self.settings.cpu_crf.to_string()],
            device_init: Vec::new(),
            upload_filter: None,
            priority: u32::MAX,
        }
    }

    fn hardware_profile(&self, v: &HwVendor, decode_available: bool) -> EncoderProfile {
        let bitrate = self.settings.hw_bitrate.clone();
        let (preset, rate_control, device_init, upload_filter) = match v.id {
            "nvenc" => (
                Some("p4".to_string()),
                vec!["-tune".into(), "hq".into(), "-b:v".into(), bitrate],
                Vec::new(),
                None,
            ),
            "qsv" => (Some("fast".to_string()), vec!["-b:v".into(), bitrate], Vec::new(), None),
            "amf" => (
                None,
                vec!["-quality".into(), "balanced".into(), "-b:v".into(), bitrate],
                Vec::new(),
                None,
            ),
            "vaapi" => (
                None,
                vec!["-b:v".into(), bitrate],
                vec!["-vaapi_device".into(), VAAPI_DEVICE.into()],
                Some("format=nv12,hwupload".to_string()),
            ),
            _ => (None, vec!["-b:v".into(), bitrate], Vec::new(), None),
        };

        EncoderProfile {
            id: v.id.to_string(),
            kind: EncoderKind::Hardware,
            hwaccel: decode_available.then(|| v.hwaccel.to_string()),
            encoder: v.encoder.to_string(),
            preset,
            rate_control,
            device_init,
            upload_filter,
            priority: v.priority,
        }
    }
}
