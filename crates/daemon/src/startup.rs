//! Startup checks module for HEVC Sweep
//!
//! Preflight checks run before the first scan:
//! - FFmpeg availability (the configured binary answers `-version`)
//! - Catalog export presence

use crate::config::Config;
use log::{info, warn};
use std::path::Path;
use std::process::Command;
use thiserror::Error;

/// Error types for startup checks
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("FFmpeg not available: {0}")]
    FfmpegUnavailable(String),

    #[error("Catalog not available: {0}")]
    CatalogUnavailable(String),
}

/// Parse FFmpeg version string and extract major version number
///
/// Handles various FFmpeg version formats:
/// - Standard: "ffmpeg version 6.1 ..."
/// - N-prefixed: "ffmpeg version n6.1-... ..."
///
/// Git builds ("ffmpeg version N-112345-g...") carry no release number and
/// yield None.
pub fn parse_ffmpeg_version(version_output: &str) -> Option<u32> {
    let version_line = version_output
        .lines()
        .find(|line| line.to_lowercase().contains("ffmpeg version"))?;

    let version_part = version_line
        .to_lowercase()
        .split("ffmpeg version")
        .nth(1)?
        .split_whitespace()
        .next()?
        .to_string();

    // Handle n-prefixed versions (e.g., "n6.1-...")
    let version_str = version_part.trim_start_matches('n');

    // Extract major version (before first '.' or '-')
    let major_str = version_str.split(|c| c == '.' || c == '-').next()?;

    major_str.parse().ok()
}

/// Check that `binary -version` runs successfully
///
/// Returns the parsed major version when the banner carries one.
pub fn check_ffmpeg_available(binary: &Path) -> Result<Option<u32>, StartupError> {
    let output = Command::new(binary).arg("-version").output().map_err(|e| {
        StartupError::FfmpegUnavailable(format!(
            "{} -version failed; is FFmpeg installed and in PATH? Error: {}",
            binary.display(),
            e
        ))
    })?;

    if !output.status.success() {
        return Err(StartupError::FfmpegUnavailable(format!(
            "{} -version exited with {}",
            binary.display(),
            output.status
        )));
    }

    let version_output = String::from_utf8_lossy(&output.stdout);
    Ok(parse_ffmpeg_version(&version_output))
}

/// Check that the catalog export exists and is a file
pub fn check_catalog_present(path: &Path) -> Result<(), StartupError> {
    if path.is_file() {
        Ok(())
    } else {
        Err(StartupError::CatalogUnavailable(format!(
            "{} does not exist or is not a file",
            path.display()
        )))
    }
}

/// Run all startup checks in order
pub fn run_startup_checks(cfg: &Config) -> Result<(), StartupError> {
    match check_ffmpeg_available(&cfg.ffmpeg.binary)? {
        Some(major) => info!("Found FFmpeg {} at {}", major, cfg.ffmpeg.binary.display()),
        None => warn!(
            "Could not parse FFmpeg version from {}; continuing",
            cfg.ffmpeg.binary.display()
        ),
    }
    check_catalog_present(&cfg.catalog.path)?;
    Ok(())
}
