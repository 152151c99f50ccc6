//! Transcode orchestrator for HEVC Sweep
//!
//! Drives one item through the pipeline: re-check eligibility, derive the
//! output path, claim the source, run FFmpeg, swap files, release the claim.

use crate::catalog::MediaItem;
use crate::config::FfmpegConfig;
use crate::encode::{build_ffmpeg_args, FfmpegEncodeParams};
use crate::guard::TranscodeGuard;
use crate::metrics::{now_unix_ms, JobMetrics, SharedMetrics};
use crate::process::{ProcessExit, ProcessRunner};
use crate::replace::{
    derived_path, discard_output, finish_replacement, remove_stale_output, ReplaceAction,
    ReplaceError,
};
use crate::select::is_eligible;
use log::{debug, error, info, warn};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Error type for a single transcode
#[derive(Debug, Error)]
pub enum TranscodeError {
    /// The encoder could not be started
    #[error("Failed to launch {program}: {source}")]
    Launch {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Waiting on the encoder failed
    #[error("Failed waiting for encoder: {0}")]
    Wait(std::io::Error),

    /// A timed-out encoder could not be killed and may still be writing
    #[error("Failed to kill timed-out encoder: {0}")]
    Kill(std::io::Error),

    /// File replacement failed
    #[error("Replacement failed: {0}")]
    Replace(#[from] ReplaceError),
}

/// Why an item was passed over without running the encoder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Wrong codec, no path, not a video, or already claimed
    Ineligible,
    /// No usable output path could be derived from the source path
    NoDerivedPath,
    /// Lost the claim race to another transcode
    AlreadyClaimed,
}

/// Result of a transcode that ran to completion without an error
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranscodeOutcome {
    /// Encoder succeeded; the source was deleted and `output` replaces it
    Replaced { source: PathBuf, output: PathBuf },
    /// Encoder failed; its output was deleted and the source kept
    EncoderFailed { source: PathBuf, exit: ProcessExit },
    /// Encoder exceeded the configured timeout and was killed
    TimedOut { source: PathBuf },
    /// Nothing was done
    Skipped(SkipReason),
}

impl TranscodeOutcome {
    pub fn is_replaced(&self) -> bool {
        matches!(self, TranscodeOutcome::Replaced { .. })
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, TranscodeOutcome::Skipped(_))
    }
}

/// Job state representing the current stage in the pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobState {
    /// Claimed, encoder not started yet
    Queued,
    /// Encoder is running
    Encoding,
    /// Swapping or cleaning up files
    Replacing,
    /// Source replaced by the encoded output
    Completed,
    /// Encoder failed or timed out; source kept
    Failed(String),
}

impl JobState {
    /// Convert state to string for metrics
    pub fn as_str(&self) -> &str {
        match self {
            JobState::Queued => "queued",
            JobState::Encoding => "encoding",
            JobState::Replacing => "replacing",
            JobState::Completed => "completed",
            JobState::Failed(_) => "failed",
        }
    }
}

/// One claimed source on its way through the pipeline
#[derive(Debug, Clone)]
pub struct TranscodeJob {
    /// Unique job identifier
    pub id: String,
    /// Path to the source video file
    pub source_path: PathBuf,
    /// Derived path for the encoded output
    pub output_path: PathBuf,
    /// Current state of the job
    pub state: JobState,
    /// Unix milliseconds when the job was created
    pub started_at_unix_ms: i64,
}

impl TranscodeJob {
    pub fn new(source_path: PathBuf, output_path: PathBuf) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            source_path,
            output_path,
            state: JobState::Queued,
            started_at_unix_ms: now_unix_ms(),
        }
    }

    /// Create JobMetrics from current job state
    pub fn to_metrics(&self) -> JobMetrics {
        JobMetrics {
            id: self.id.clone(),
            input_path: self.source_path.to_string_lossy().to_string(),
            output_path: self.output_path.to_string_lossy().to_string(),
            stage: self.state.as_str().to_string(),
            started_at_unix_ms: self.started_at_unix_ms,
        }
    }
}

/// Runs single-item transcodes
pub struct Transcoder {
    guard: TranscodeGuard,
    runner: Arc<dyn ProcessRunner>,
    ffmpeg: FfmpegConfig,
    source_codec: String,
    metrics: SharedMetrics,
}

impl Transcoder {
    pub fn new(
        guard: TranscodeGuard,
        runner: Arc<dyn ProcessRunner>,
        ffmpeg: FfmpegConfig,
        source_codec: impl Into<String>,
        metrics: SharedMetrics,
    ) -> Self {
        Self {
            guard,
            runner,
            ffmpeg,
            source_codec: source_codec.into(),
            metrics,
        }
    }

    pub fn guard(&self) -> &TranscodeGuard {
        &self.guard
    }

    fn timeout(&self) -> Option<Duration> {
        (self.ffmpeg.timeout_secs > 0).then(|| Duration::from_secs(self.ffmpeg.timeout_secs))
    }

    /// Transcode one item.
    ///
    /// Ineligible items are skipped without error. The claim on the source
    /// path is released on every return path, errors included.
    pub async fn transcode(&self, item: &MediaItem) -> Result<TranscodeOutcome, TranscodeError> {
        // Re-check: the item may have been claimed or changed since selection
        if !is_eligible(item, &self.source_codec, &self.guard) {
            debug!("Skipping ineligible item {:?}", item.path);
            self.record_skip().await;
            return Ok(TranscodeOutcome::Skipped(SkipReason::Ineligible));
        }
        let Some(source) = item.path.clone() else {
            self.record_skip().await;
            return Ok(TranscodeOutcome::Skipped(SkipReason::Ineligible));
        };

        let Some(output) = derived_path(&source, &self.ffmpeg.output_suffix) else {
            warn!("Cannot derive an output path for {}", source.display());
            self.record_skip().await;
            return Ok(TranscodeOutcome::Skipped(SkipReason::NoDerivedPath));
        };

        let Some(claim) = self.guard.try_claim(&source) else {
            debug!("{} was claimed by another transcode", source.display());
            self.record_skip().await;
            return Ok(TranscodeOutcome::Skipped(SkipReason::AlreadyClaimed));
        };

        let mut job = TranscodeJob::new(source, output);
        info!("Transcoding video at: {}", job.source_path.display());

        let result = self.run_job(&mut job).await;
        match &result {
            Ok(TranscodeOutcome::Replaced { output, .. }) => {
                info!("Replaced {} with {}", job.source_path.display(), output.display());
            }
            Ok(TranscodeOutcome::EncoderFailed { exit, .. }) => {
                warn!(
                    "Encoder failed for {} ({}); source kept",
                    job.source_path.display(),
                    exit
                );
            }
            Ok(TranscodeOutcome::TimedOut { .. }) => {
                warn!(
                    "Encoder timed out for {}; source kept",
                    job.source_path.display()
                );
            }
            Ok(TranscodeOutcome::Skipped(_)) => {}
            Err(e) => {
                error!("Transcode of {} failed: {}", job.source_path.display(), e);
                job.state = JobState::Failed(e.to_string());
            }
        }
        self.finish_job_metrics(&job, &result).await;

        // Released last, after the file swap
        drop(claim);
        result
    }

    async fn run_job(&self, job: &mut TranscodeJob) -> Result<TranscodeOutcome, TranscodeError> {
        // The encoder must not find an old output in its way
        if remove_stale_output(&job.output_path)? {
            warn!("Removed stale output {}", job.output_path.display());
        }

        let params = FfmpegEncodeParams::from_config(
            job.source_path.clone(),
            job.output_path.clone(),
            &self.ffmpeg,
        );
        let args = build_ffmpeg_args(&params);

        job.state = JobState::Encoding;
        self.update_job_metrics(job).await;

        let mut handle = self
            .runner
            .launch(&self.ffmpeg.binary, &args)
            .map_err(|source| TranscodeError::Launch {
                program: self.ffmpeg.binary.clone(),
                source,
            })?;
        debug!("Encoder started (pid {:?}) for {}", handle.id(), job.id);

        let exit = match self.timeout() {
            None => Some(handle.wait().await.map_err(TranscodeError::Wait)?),
            Some(limit) => {
                let waited = tokio::time::timeout(limit, handle.wait()).await;
                match waited {
                    Ok(exit) => Some(exit.map_err(TranscodeError::Wait)?),
                    Err(_) => {
                        // Leave the output alone while the encoder may still own it
                        handle.kill().await.map_err(TranscodeError::Kill)?;
                        None
                    }
                }
            }
        };

        job.state = JobState::Replacing;
        self.update_job_metrics(job).await;

        let source = job.source_path.clone();
        match exit {
            Some(exit) => {
                match finish_replacement(&job.source_path, &job.output_path, exit.success())? {
                    ReplaceAction::SourceReplaced => {
                        job.state = JobState::Completed;
                        Ok(TranscodeOutcome::Replaced {
                            source,
                            output: job.output_path.clone(),
                        })
                    }
                    ReplaceAction::OutputDiscarded => {
                        job.state = JobState::Failed(exit.to_string());
                        Ok(TranscodeOutcome::EncoderFailed { source, exit })
                    }
                }
            }
            None => {
                discard_output(&job.output_path)?;
                job.state = JobState::Failed("timed out".to_string());
                Ok(TranscodeOutcome::TimedOut { source })
            }
        }
    }

    /// Publish the job as the current job
    async fn update_job_metrics(&self, job: &TranscodeJob) {
        let mut metrics = self.metrics.write().await;
        metrics.current_job = Some(job.to_metrics());
    }

    async fn finish_job_metrics(
        &self,
        job: &TranscodeJob,
        result: &Result<TranscodeOutcome, TranscodeError>,
    ) {
        let mut metrics = self.metrics.write().await;
        if metrics.current_job.as_ref().map(|j| j.id.as_str()) == Some(job.id.as_str()) {
            metrics.current_job = None;
        }
        match result {
            Ok(TranscodeOutcome::Replaced { .. }) => metrics.completed_jobs += 1,
            Ok(TranscodeOutcome::Skipped(_)) => metrics.skipped_jobs += 1,
            _ => metrics.failed_jobs += 1,
        }
    }

    async fn record_skip(&self) {
        let mut metrics = self.metrics.write().await;
        metrics.skipped_jobs += 1;
    }
}
