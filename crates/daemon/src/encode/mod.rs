//! Encoding modules for HEVC Sweep

pub mod ffmpeg;

pub use ffmpeg::{build_ffmpeg_args, FfmpegEncodeParams};
