//! FFmpeg encoder module for HEVC Sweep
//!
//! Builds the FFmpeg argument vector for a single re-encode with the
//! configured target codecs and quality.

use crate::config::FfmpegConfig;
use std::ffi::OsString;
use std::path::PathBuf;

/// Parameters for one FFmpeg encoding job
#[derive(Debug, Clone)]
pub struct FfmpegEncodeParams {
    /// Path to the input video file
    pub input_path: PathBuf,
    /// Path for the encoded output file
    pub output_path: PathBuf,
    /// Target video encoder (`-c:v`)
    pub video_codec: String,
    /// Constant rate factor (`-crf`)
    pub crf: u8,
    /// Target audio encoder (`-c:a`)
    pub audio_codec: String,
    /// Audio bitrate (`-b:a`)
    pub audio_bitrate: String,
}

impl FfmpegEncodeParams {
    /// Take codec and quality settings from the FFmpeg configuration
    pub fn from_config(input_path: PathBuf, output_path: PathBuf, cfg: &FfmpegConfig) -> Self {
        Self {
            input_path,
            output_path,
            video_codec: cfg.video_codec.clone(),
            crf: cfg.crf,
            audio_codec: cfg.audio_codec.clone(),
            audio_bitrate: cfg.audio_bitrate.clone(),
        }
    }
}

/// Build the FFmpeg argument vector
///
/// Produces `-i <in> -c:v <codec> -crf <n> -c:a <codec> -b:a <rate> <out>`.
/// Paths are passed as separate arguments, so no quoting is involved.
pub fn build_ffmpeg_args(params: &FfmpegEncodeParams) -> Vec<OsString> {
    let mut args: Vec<OsString> = Vec::with_capacity(11);

    args.push("-i".into());
    args.push(params.input_path.clone().into_os_string());

    args.push("-c:v".into());
    args.push(params.video_codec.clone().into());

    args.push("-crf".into());
    args.push(params.crf.to_string().into());

    args.push("-c:a".into());
    args.push(params.audio_codec.clone().into());

    args.push("-b:a".into());
    args.push(params.audio_bitrate.clone().into());

    // Output path must come last
    args.push(params.output_path.clone().into_os_string());

    args
}
