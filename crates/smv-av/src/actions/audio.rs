//! Speed transform of the source audio.
//!
//! Pitch and tempo change together: the samples are reinterpreted at
//! `rate * ratio` and resampled back to `rate`, the same effect as playing a
//! record faster or slower. The output lasts `source / ratio` seconds.

use std::path::Path;

use crate::template::{EncodeTemplate, VideoSlot};

/// Audio codecs tried in order, with the extension each one writes.
pub const SPEED_CODECS: &[(&str, &str)] = &[("libmp3lame", "mp3"), ("aac", "m4a")];

/// `asetrate=<rate*ratio>,aresample=<rate>`.
pub fn speed_filter(ratio: f64, sample_rate: u32) -> String {
    let shifted = (f64::from(sample_rate) * ratio).round() as u64;
    format!("asetrate={shifted},aresample={sample_rate}")
}

/// Expected duration after the transform.
pub fn transformed_duration(source_secs: f64, ratio: f64) -> f64 {
    source_secs / ratio
}

/// One template per codec in [`SPEED_CODECS`], writing `<stem>.<ext>` into
/// `dir`. None of them has an encoder slot.
pub fn speed_transform_levels(
    input: &Path,
    dir: &Path,
    stem: &str,
    ratio: f64,
    sample_rate: u32,
) -> Vec<EncodeTemplate> {
    let filter = speed_filter(ratio, sample_rate);
    SPEED_CODECS
        .iter()
        .map(|(codec, ext)| {
            let mut options = vec!["-af".to_string(), filter.clone(), "-c:a".into(), (*codec).into()];
            if *codec == "libmp3lame" {
                options.extend(["-q:a".to_string(), "2".to_string()]);
            } else {
                options.extend(["-b:a".to_string(), "192k".to_string()]);
            }
            EncodeTemplate::new(dir.join(format!("{stem}.{ext}")))
                .plain_input(Vec::<String>::new(), input)
                .video(VideoSlot::Disabled)
                .output_options(options)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::ToolCommand;
    use std::path::PathBuf;

    #[test]
    fn nightcore_filter() {
        assert_eq!(speed_filter(1.4, 44_100), "asetrate=61740,aresample=44100");
        assert_eq!(speed_filter(0.9, 44_100), "asetrate=39690,aresample=44100");
    }

    #[test]
    fn duration_scales_inversely() {
        let d = transformed_duration(180.0, 1.4);
        assert!((d - 128.571).abs() < 0.001);
        assert!((transformed_duration(90.0, 0.9) - 100.0).abs() < 1e-9);
    }

    #[test]
    fn levels_try_mp3_then_m4a() {
        let levels = speed_transform_levels(
            Path::new("/in/song.webm"),
            Path::new("/scratch"),
            "speed",
            1.4,
            44_100,
        );
        assert_eq!(levels.len(), 2);
        assert_eq!(levels[0].output(), Path::new("/scratch/speed.mp3"));
        assert_eq!(levels[1].output(), Path::new("/scratch/speed.m4a"));
        assert!(levels.iter().all(|t| !t.has_encoder_slot()));

        let args = levels[0]
            .materialize(&ToolCommand::new(PathBuf::from("ffmpeg")), None)
            .get_args()
            .join(" ");
        assert!(args.contains("-i /in/song.webm -vn -af asetrate=61740,aresample=44100 -c:a libmp3lame"), "{args}");
    }
}
