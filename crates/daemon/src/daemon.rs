//! Daemon startup and main loop for HEVC Sweep
//!
//! Wires the catalog, guard, process runner and scan driver together and
//! runs scan passes until cancelled.

use crate::catalog::{Catalog, JsonCatalog};
use crate::config::{Config, ConfigError};
use crate::guard::TranscodeGuard;
use crate::metrics::{new_shared_metrics, SharedMetrics};
use crate::metrics_server::run_metrics_server;
use crate::orchestrator::Transcoder;
use crate::process::{ProcessRunner, TokioProcessRunner};
use crate::scan::{CancelToken, ProgressSink, ScanDriver, ScanError, ScanReport};
use crate::select::CandidateSelector;
use crate::startup::{run_startup_checks, StartupError};
use log::{debug, error, info};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// How often a sleeping daemon looks at the cancel token
const CANCEL_POLL: Duration = Duration::from_millis(250);

/// Error type for daemon operations
#[derive(Debug, Error)]
pub enum DaemonError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Startup check failed
    #[error("Startup check failed: {0}")]
    Startup(#[from] StartupError),

    /// A scan pass could not run
    #[error("Scan failed: {0}")]
    Scan(#[from] ScanError),
}

/// Totals across every pass the daemon ran
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub passes: usize,
    /// Periodic passes abandoned because the catalog could not be read
    pub failed_passes: usize,
    pub replaced: usize,
    pub failed: usize,
    pub skipped: usize,
    pub cancelled: bool,
}

impl RunSummary {
    fn absorb(&mut self, report: &ScanReport) {
        self.passes += 1;
        self.replaced += report.replaced();
        self.failed += report.failures().count();
        self.skipped += report.skipped();
        self.cancelled |= report.cancelled;
    }
}

/// Progress sink that writes each step to the log
struct LogProgress;

impl ProgressSink for LogProgress {
    fn report(&self, fraction: f64) {
        debug!("Scan progress: {:.1}%", fraction * 100.0);
    }
}

/// Daemon state containing all runtime components
pub struct Daemon {
    /// Configuration loaded from file and environment
    pub config: Config,
    /// Shared metrics state
    pub metrics: SharedMetrics,
    guard: TranscodeGuard,
    driver: Arc<ScanDriver>,
}

impl Daemon {
    /// Initialize the daemon with configuration from file
    ///
    /// This performs the full startup sequence:
    /// 1. Load config from file (defaults when the file is missing)
    /// 2. Apply environment overrides and the catalog override
    /// 3. Run startup checks (ffmpeg, catalog)
    /// 4. Build the scan pipeline
    pub fn new<P: AsRef<Path>>(
        config_path: P,
        catalog_override: Option<PathBuf>,
    ) -> Result<Self, DaemonError> {
        let config = Self::load_config(config_path, catalog_override)?;
        Self::with_config(config)
    }

    /// Load configuration and apply an optional catalog path override
    pub fn load_config<P: AsRef<Path>>(
        config_path: P,
        catalog_override: Option<PathBuf>,
    ) -> Result<Config, DaemonError> {
        let mut config = Config::load_or_default(config_path)?;
        if let Some(path) = catalog_override {
            config.catalog.path = path;
        }
        Ok(config)
    }

    /// Initialize the daemon with an existing configuration
    pub fn with_config(config: Config) -> Result<Self, DaemonError> {
        run_startup_checks(&config)?;
        Ok(Self::new_without_checks(config))
    }

    /// Initialize the daemon without running startup checks
    ///
    /// Useful for testing when ffmpeg is not available.
    pub fn new_without_checks(config: Config) -> Self {
        let catalog: Arc<dyn Catalog> = Arc::new(JsonCatalog::new(config.catalog.path.clone()));
        Self::with_parts(config, catalog, Arc::new(TokioProcessRunner))
    }

    /// Build the daemon around a given catalog and process runner
    pub fn with_parts(
        config: Config,
        catalog: Arc<dyn Catalog>,
        runner: Arc<dyn ProcessRunner>,
    ) -> Self {
        let metrics = new_shared_metrics();
        let guard = TranscodeGuard::new();

        let selector =
            CandidateSelector::new(catalog, guard.clone(), config.scan.source_codec.clone());
        let transcoder = Transcoder::new(
            guard.clone(),
            runner,
            config.ffmpeg.clone(),
            config.scan.source_codec.clone(),
            metrics.clone(),
        );
        let driver = Arc::new(ScanDriver::new(selector, transcoder, metrics.clone()));

        Self {
            config,
            metrics,
            guard,
            driver,
        }
    }

    /// Get the shared metrics
    pub fn metrics(&self) -> SharedMetrics {
        self.metrics.clone()
    }

    /// Paths currently being transcoded
    pub fn guard(&self) -> &TranscodeGuard {
        &self.guard
    }

    /// Start the metrics HTTP server
    ///
    /// Spawns the HTTP server as a background task.
    pub fn start_metrics_server(&self) -> tokio::task::JoinHandle<()> {
        let metrics = self.metrics.clone();
        let bind = self.config.metrics.bind.clone();
        info!("Starting metrics server on http://{}/metrics", bind);
        tokio::spawn(async move {
            if let Err(e) = run_metrics_server(metrics, &bind).await {
                error!("Metrics server error: {}", e);
            }
        })
    }

    /// Run scan passes until cancelled
    ///
    /// With `once` set, or `scan.interval_secs == 0`, a single pass runs and
    /// a failed catalog query is returned as an error. Periodic passes log
    /// the failure and retry after the interval.
    pub async fn run(&self, cancel: &CancelToken, once: bool) -> Result<RunSummary, DaemonError> {
        let interval = match self.config.scan.interval_secs {
            0 => None,
            _ if once => None,
            secs => Some(Duration::from_secs(secs)),
        };

        let mut summary = RunSummary::default();
        loop {
            match self.driver.run(&LogProgress, cancel).await {
                Ok(report) => summary.absorb(&report),
                Err(e) => match interval {
                    Some(interval) => {
                        error!("Scan pass failed: {}; retrying in {:?}", e, interval);
                        summary.failed_passes += 1;
                    }
                    None => return Err(e.into()),
                },
            }

            let Some(interval) = interval else {
                break;
            };
            if cancel.is_cancelled() || !sleep_unless_cancelled(interval, cancel).await {
                summary.cancelled = true;
                break;
            }
        }

        Ok(summary)
    }

    /// Run the daemon with the metrics server when enabled
    pub async fn run_with_server(
        &self,
        cancel: &CancelToken,
        once: bool,
    ) -> Result<RunSummary, DaemonError> {
        let server = self
            .config
            .metrics
            .enabled
            .then(|| self.start_metrics_server());

        let result = self.run(cancel, once).await;

        if let Some(handle) = server {
            handle.abort();
        }
        result
    }
}

/// Sleep for `duration`, waking early on cancellation.
///
/// Returns false when cancelled.
async fn sleep_unless_cancelled(duration: Duration, cancel: &CancelToken) -> bool {
    let deadline = tokio::time::Instant::now() + duration;
    while tokio::time::Instant::now() < deadline {
        if cancel.is_cancelled() {
            return false;
        }
        let remaining = deadline - tokio::time::Instant::now();
        tokio::time::sleep(remaining.min(CANCEL_POLL)).await;
    }
    !cancel.is_cancelled()
}
