//! HEVC Sweep
//!
//! Background service that finds HEVC video in a media catalog, re-encodes
//! each file to H.264 with FFmpeg and replaces the original on success.

pub mod catalog;
pub mod daemon;
pub mod encode;
pub mod guard;
pub mod metrics;
pub mod metrics_server;
pub mod orchestrator;
pub mod process;
pub mod replace;
pub mod scan;
pub mod select;
pub mod startup;

#[cfg(test)]
mod testing;

pub use catalog::{
    Catalog, CatalogError, InMemoryCatalog, ItemQuery, JsonCatalog, MediaItem, MediaKind,
    MediaStream, StreamKind,
};
pub use daemon::{Daemon, DaemonError, RunSummary};
pub use encode::{build_ffmpeg_args, FfmpegEncodeParams};
pub use guard::{Claim, TranscodeGuard};
pub use hevc_sweep_config as config;
pub use hevc_sweep_config::Config;
pub use metrics::{new_shared_metrics, JobMetrics, MetricsSnapshot, ScanState, SharedMetrics};
pub use metrics_server::{create_metrics_router, run_metrics_server, ServerError};
pub use orchestrator::{
    JobState, SkipReason, TranscodeError, TranscodeJob, TranscodeOutcome, Transcoder,
};
pub use process::{ProcessExit, ProcessHandle, ProcessRunner, TokioProcessRunner};
pub use replace::{derived_path, ReplaceAction, ReplaceError};
pub use scan::{
    CancelToken, ItemReport, ProgressSink, ScanDriver, ScanError, ScanHandle, ScanReport,
};
pub use select::{is_eligible, CandidateSelector};
pub use startup::{
    check_catalog_present, check_ffmpeg_available, parse_ffmpeg_version, run_startup_checks,
    StartupError,
};
