//! Per-stage ffmpeg command builders: speed transform, background track,
//! text overlay and final mux.
//!
//! Each builder returns [`EncodeTemplate`](crate::template::EncodeTemplate)s;
//! running them (and falling back between them) is the pipeline's job.

pub mod audio;
pub mod background;
pub mod mux;
pub mod overlay;

pub use audio::{speed_filter, speed_transform_levels, transformed_duration, SPEED_CODECS};
pub use background::{extract_frame, frame_path, loop_count, loop_levels, static_levels};
pub use mux::mux_template;
pub use overlay::{drawtext_filter, overlay_template};
