//! Media probing through ffprobe.
//!
//! The pipeline needs durations (the speed transform output length, the
//! background loop count and the post-encode duration check) and a sanity
//! read of the background's first video stream.

pub mod ffprobe;

pub use self::ffprobe::{parse_duration, parse_video_stream, MediaProber, VideoStream};
