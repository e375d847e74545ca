//! Final mux of the background video track with the transformed audio.

use std::path::Path;

use crate::template::EncodeTemplate;

/// Video from the first input, audio from the second, re-encoded to AAC and
/// trimmed to the shorter stream.
pub fn mux_template(video: &Path, audio: &Path, output: &Path, audio_bitrate: &str) -> EncodeTemplate {
    EncodeTemplate::new(output)
        .input(Vec::<String>::new(), video)
        .plain_input(Vec::<String>::new(), audio)
        .output_options([
            "-map",
            "0:v:0",
            "-map",
            "1:a:0",
            "-c:a",
            "aac",
            "-b:a",
            audio_bitrate,
            "-shortest",
            "-movflags",
            "+faststart",
        ])
}
