//! Best-effort text overlay on the background track.

use std::path::Path;

use crate::template::EncodeTemplate;

/// Escape `text` for a `drawtext` option value inside a filter graph.
///
/// Two levels apply: the filter option parser (`\`, `'`, `:`) and then the
/// graph parser (`\`, `'`, `[`, `]`, `,`, `;`).
pub fn escape_drawtext(text: &str) -> String {
    let escape = |s: &str, specials: &[char]| {
        let mut out = String::with_capacity(s.len());
        for c in s.chars() {
            if specials.contains(&c) {
                out.push('\\');
            }
            out.push(c);
        }
        out
    };
    let option_level = escape(text, &['\\', '\'', ':']);
    escape(&option_level, &['\\', '\'', '[', ']', ',', ';'])
}

/// `drawtext` filter centred near the bottom edge with a translucent box.
pub fn drawtext_filter(text: &str) -> String {
    format!(
        "drawtext=text={}:expansion=none:fontcolor=white:fontsize=36:box=1:boxcolor=black@0.5:boxborderw=10:x=(w-text_w)/2:y=h-text_h-40",
        escape_drawtext(text)
    )
}

/// Re-encode `video` with the overlay burned in.
pub fn overlay_template(video: &Path, text: &str, output: &Path) -> EncodeTemplate {
    EncodeTemplate::new(output)
        .input(Vec::<String>::new(), video)
        .video_filter(drawtext_filter(text))
        .output_options(["-an"])
}
