//! Background visual to video track.
//!
//! Looping assets (GIFs, short clips) go through a ladder of loop strategies;
//! still images are held with `-loop 1`. Every template writes a silent
//! `yuv420p` track capped at the target duration.

use std::path::{Path, PathBuf};

use crate::template::{EncodeTemplate, VideoSlot};

/// Assumed length of a loop whose duration cannot be probed.
pub const DEFAULT_LOOP_ESTIMATE_SECS: f64 = 1.0;

const EVEN_SCALE: &str = "scale=trunc(iw/2)*2:trunc(ih/2)*2";
const FIXED_SCALE: &str = "scale=1280:720";

/// Number of plays needed to cover `target` with a `source`-second loop,
/// plus one spare so rounding never leaves the track short.
pub fn loop_count(target_secs: f64, source_secs: f64) -> u32 {
    let source = if source_secs.is_finite() && source_secs > 0.0 {
        source_secs
    } else {
        DEFAULT_LOOP_ESTIMATE_SECS
    };
    ((target_secs / source).ceil().max(0.0) as u32).saturating_add(1)
}

/// Seconds formatted for `-t`.
pub fn format_secs(secs: f64) -> String {
    format!("{secs:.3}")
}

fn track_options(target_secs: f64, frame_rate: u32) -> Vec<String> {
    vec![
        "-t".into(),
        format_secs(target_secs),
        "-r".into(),
        frame_rate.to_string(),
        "-an".into(),
    ]
}

/// Loop strategies for an animated background, most faithful first:
///
/// 1. `-stream_loop -1` capped with `-t`
/// 2. the asset's own loop metadata (`-ignore_loop 0`)
/// 3. an explicit `-stream_loop N` from the probed loop length
pub fn loop_levels(
    background: &Path,
    output: &Path,
    target_secs: f64,
    probed_secs: Option<f64>,
    frame_rate: u32,
) -> Vec<EncodeTemplate> {
    let filter = format!("{EVEN_SCALE},format=yuv420p");
    let count = loop_count(target_secs, probed_secs.unwrap_or(DEFAULT_LOOP_ESTIMATE_SECS));
    let input_options: [Vec<String>; 3] = [
        vec!["-stream_loop".into(), "-1".into()],
        vec!["-ignore_loop".into(), "0".into()],
        vec!["-stream_loop".into(), count.to_string()],
    ];

    input_options
        .into_iter()
        .map(|opts| {
            EncodeTemplate::new(output)
                .input(opts, background)
                .video_filter(filter.clone())
                .output_options(track_options(target_secs, frame_rate))
        })
        .collect()
}

/// Grab the first frame of `background` as a still image. No encoder slot.
pub fn extract_frame(background: &Path, output: &Path) -> EncodeTemplate {
    EncodeTemplate::new(output)
        .plain_input(Vec::<String>::new(), background)
        .video(VideoSlot::Fixed(vec!["-frames:v".into(), "1".into()]))
}

/// Where [`extract_frame`] writes for a given scratch directory.
pub fn frame_path(dir: &Path) -> PathBuf {
    dir.join("background_frame.png")
}

/// Still-image strategies: even-dimension scaling, then a fixed 1280x720.
pub fn static_levels(
    image: &Path,
    output: &Path,
    target_secs: f64,
    frame_rate: u32,
) -> Vec<EncodeTemplate> {
    [EVEN_SCALE, FIXED_SCALE]
        .into_iter()
        .map(|scale| {
            EncodeTemplate::new(output)
                .plain_input(["-loop", "1"], image)
                .video_filter(format!("{scale},format=yuv420p"))
                .output_options(track_options(target_secs, frame_rate))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::ToolCommand;
    use crate::encoders::EncoderSelector;

    fn render(t: &EncodeTemplate) -> String {
        let cpu = EncoderSelector::default().cpu_profile();
        t.materialize(&ToolCommand::new(PathBuf::from("ffmpeg")), Some(&cpu))
            .get_args()
            .join(" ")
    }

    #[test]
    fn loop_count_covers_target() {
        for (target, source) in [(128.57, 2.4), (10.0, 10.0), (0.5, 3.0), (300.0, 0.04), (61.0, 7.3)] {
            let n = loop_count(target, source);
            assert!(f64::from(n) * source >= target, "{n} x {source} < {target}");
        }
        assert_eq!(loop_count(10.0, 2.5), 5);
    }

    #[test]
    fn loop_count_uses_estimate_for_bad_duration() {
        assert_eq!(loop_count(10.0, 0.0), 11);
        assert_eq!(loop_count(10.0, f64::NAN), 11);
    }

    #[test]
    fn loop_count_saturates_for_huge_targets() {
        assert_eq!(loop_count(1e10, 1.0), u32::MAX);
        assert_eq!(loop_count(f64::INFINITY, 0.04), u32::MAX);
    }

    #[test]
    fn loop_ladder_order() {
        let levels = loop_levels(
            Path::new("/s/bg.gif"),
            Path::new("/s/bg.mp4"),
            12.0,
            Some(2.5),
            30,
        );
        assert_eq!(levels.len(), 3);
        assert!(render(&levels[0]).contains("-stream_loop -1 -i /s/bg.gif"));
        assert!(render(&levels[1]).contains("-ignore_loop 0 -i /s/bg.gif"));
        assert!(render(&levels[2]).contains("-stream_loop 6 -i /s/bg.gif"));
        assert!(render(&levels[0]).ends_with("-t 12.000 -r 30 -an /s/bg.mp4"));
    }

    #[test]
    fn unprobed_loop_falls_back_to_estimate() {
        let levels = loop_levels(Path::new("bg.gif"), Path::new("bg.mp4"), 4.0, None, 30);
        assert!(render(&levels[2]).contains("-stream_loop 5 "));
    }

    #[test]
    fn static_ladder_scales() {
        let levels = static_levels(Path::new("/s/img.png"), Path::new("/s/bg.mp4"), 128.571, 30);
        let first = render(&levels[0]);
        assert!(first.contains("-loop 1 -i /s/img.png"), "{first}");
        assert!(first.contains("-vf scale=trunc(iw/2)*2:trunc(ih/2)*2,format=yuv420p"));
        assert!(first.contains("-t 128.571"));
        assert!(render(&levels[1]).contains("-vf scale=1280:720,format=yuv420p"));
    }

    #[test]
    fn frame_extraction_is_encoder_independent() {
        let t = extract_frame(Path::new("/s/bg.gif"), &frame_path(Path::new("/s")));
        assert!(!t.has_encoder_slot());
        assert!(render(&t).ends_with("-frames:v 1 /s/background_frame.png"));
    }
}
