//! Scan driver: walks the candidate snapshot one item at a time.
//!
//! Progress is reported after every item as `processed / total`. Cancellation
//! is cooperative and checked between items, so an encode that has started
//! always runs to completion.

use crate::catalog::CatalogError;
use crate::metrics::{ScanState, SharedMetrics};
use crate::orchestrator::{TranscodeError, TranscodeOutcome, Transcoder};
use crate::select::CandidateSelector;
use log::{error, info};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;

/// Error type for scan operations
#[derive(Debug, Error)]
pub enum ScanError {
    /// The candidate snapshot could not be taken
    #[error("Catalog query failed: {0}")]
    Catalog(#[from] CatalogError),

    /// The scan task panicked or was aborted
    #[error("Scan task failed: {0}")]
    Task(String),
}

/// Receives scan progress as a fraction in `[0, 1]`.
pub trait ProgressSink: Send + Sync {
    fn report(&self, fraction: f64);
}

impl<F> ProgressSink for F
where
    F: Fn(f64) + Send + Sync,
{
    fn report(&self, fraction: f64) {
        self(fraction)
    }
}

/// Cooperative cancellation flag. Clones share the flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the scan to stop at the next item boundary.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// What happened to one candidate.
#[derive(Debug)]
pub struct ItemReport {
    pub path: Option<PathBuf>,
    pub result: Result<TranscodeOutcome, TranscodeError>,
}

impl ItemReport {
    /// Encoder failure, timeout, or error
    pub fn is_failure(&self) -> bool {
        match &self.result {
            Ok(TranscodeOutcome::EncoderFailed { .. }) | Ok(TranscodeOutcome::TimedOut { .. }) => true,
            Ok(_) => false,
            Err(_) => true,
        }
    }
}

/// Summary of one scan pass
#[derive(Debug, Default)]
pub struct ScanReport {
    /// Candidates in the snapshot
    pub total: usize,
    /// Candidates handed to the orchestrator
    pub processed: usize,
    /// Stopped early on request
    pub cancelled: bool,
    pub items: Vec<ItemReport>,
}

impl ScanReport {
    pub fn replaced(&self) -> usize {
        self.items
            .iter()
            .filter(|i| matches!(&i.result, Ok(outcome) if outcome.is_replaced()))
            .count()
    }

    pub fn skipped(&self) -> usize {
        self.items
            .iter()
            .filter(|i| matches!(&i.result, Ok(outcome) if outcome.is_skipped()))
            .count()
    }

    pub fn failures(&self) -> impl Iterator<Item = &ItemReport> {
        self.items.iter().filter(|i| i.is_failure())
    }

    pub fn has_failures(&self) -> bool {
        self.failures().next().is_some()
    }
}

/// Runs scan passes over the catalog
pub struct ScanDriver {
    selector: CandidateSelector,
    transcoder: Transcoder,
    metrics: SharedMetrics,
}

impl ScanDriver {
    pub fn new(selector: CandidateSelector, transcoder: Transcoder, metrics: SharedMetrics) -> Self {
        Self {
            selector,
            transcoder,
            metrics,
        }
    }

    /// Run one scan pass to completion or cancellation.
    ///
    /// Individual item failures are recorded in the report and never stop
    /// the pass; only a failed catalog query does.
    pub async fn run(
        &self,
        progress: &dyn ProgressSink,
        cancel: &CancelToken,
    ) -> Result<ScanReport, ScanError> {
        let candidates = self.selector.select_candidates()?;
        let total = candidates.len();
        info!("{} files to transcode", total);

        {
            let mut metrics = self.metrics.write().await;
            metrics.scans_started += 1;
            metrics.total_items = total;
            metrics.processed_items = 0;
            metrics.progress = 0.0;
            metrics.scan_state = if total == 0 {
                ScanState::Idle
            } else {
                ScanState::Scanning
            };
        }

        let mut report = ScanReport {
            total,
            ..ScanReport::default()
        };
        if total == 0 {
            return Ok(report);
        }

        for item in candidates {
            if cancel.is_cancelled() {
                info!("Scan cancelled after {}/{} items", report.processed, total);
                report.cancelled = true;
                break;
            }

            let result = self.transcoder.transcode(&item).await;
            if let Err(e) = &result {
                error!("Item {:?} failed: {}", item.path, e);
            }

            report.processed += 1;
            let fraction = report.processed as f64 / total as f64;
            {
                let mut metrics = self.metrics.write().await;
                metrics.processed_items = report.processed;
                metrics.progress = fraction;
            }
            progress.report(fraction);

            report.items.push(ItemReport {
                path: item.path,
                result,
            });
        }

        {
            let mut metrics = self.metrics.write().await;
            metrics.scan_state = if report.cancelled {
                ScanState::Cancelled
            } else {
                ScanState::Idle
            };
        }

        info!(
            "Scan finished: {} replaced, {} failed, {} skipped of {}",
            report.replaced(),
            report.failures().count(),
            report.skipped(),
            total
        );
        Ok(report)
    }

    /// Start a scan pass as a background task.
    pub fn spawn(self: Arc<Self>, progress: Arc<dyn ProgressSink>) -> ScanHandle {
        let cancel = CancelToken::new();
        let token = cancel.clone();
        let task = tokio::spawn(async move { self.run(progress.as_ref(), &token).await });
        ScanHandle { cancel, task }
    }
}

/// Caller-side handle on a spawned scan
pub struct ScanHandle {
    cancel: CancelToken,
    task: JoinHandle<Result<ScanReport, ScanError>>,
}

impl ScanHandle {
    /// Request cooperative cancellation; the current item still finishes.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the scan to end
    pub async fn join(self) -> Result<ScanReport, ScanError> {
        self.task
            .await
            .map_err(|e| ScanError::Task(e.to_string()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{InMemoryCatalog, JsonCatalog, MediaItem};
    use crate::config::FfmpegConfig;
    use crate::guard::TranscodeGuard;
    use crate::metrics::new_shared_metrics;
    use crate::replace::ReplaceError;
    use crate::testing::{Script, ScriptedRunner};
    use std::fs;
    use std::sync::Mutex;
    use tempfile::TempDir;

    struct Library {
        dir: TempDir,
        items: Vec<MediaItem>,
    }

    impl Library {
        fn new(codecs: &[&str]) -> Self {
            let dir = TempDir::new().unwrap();
            let items = codecs
                .iter()
                .enumerate()
                .map(|(i, codec)| {
                    let path = dir.path().join(format!("episode{}.mkv", i));
                    fs::write(&path, format!("{} bytes", codec)).unwrap();
                    MediaItem::video(path, codec)
                })
                .collect();
            Self { dir, items }
        }

        fn source(&self, i: usize) -> PathBuf {
            self.dir.path().join(format!("episode{}.mkv", i))
        }

        fn derived(&self, i: usize) -> PathBuf {
            self.dir.path().join(format!("episode{}-tox264.mkv", i))
        }
    }

    fn driver(items: Vec<MediaItem>, runner: Arc<ScriptedRunner>) -> (ScanDriver, TranscodeGuard, SharedMetrics) {
        let guard = TranscodeGuard::new();
        let metrics = new_shared_metrics();
        let selector = CandidateSelector::new(
            Arc::new(InMemoryCatalog::new(items)),
            guard.clone(),
            "hevc",
        );
        let transcoder = Transcoder::new(
            guard.clone(),
            runner,
            FfmpegConfig::default(),
            "hevc",
            metrics.clone(),
        );
        (ScanDriver::new(selector, transcoder, metrics.clone()), guard, metrics)
    }

    fn recorder() -> (Arc<Mutex<Vec<f64>>>, impl Fn(f64) + Send + Sync) {
        let reports = Arc::new(Mutex::new(Vec::new()));
        let sink_reports = reports.clone();
        (reports, move |fraction: f64| sink_reports.lock().unwrap().push(fraction))
    }

    #[tokio::test]
    async fn test_scan_transcodes_only_source_codec() {
        let library = Library::new(&["hevc", "h264", "hevc"]);
        let runner = Arc::new(ScriptedRunner::with_default(Script::succeed()));
        let (driver, guard, _) = driver(library.items.clone(), runner.clone());
        let (reports, sink) = recorder();

        let report = driver.run(&sink, &CancelToken::new()).await.unwrap();

        assert_eq!(report.total, 2);
        assert_eq!(report.processed, 2);
        assert_eq!(report.replaced(), 2);
        assert_eq!(*reports.lock().unwrap(), vec![0.5, 1.0]);
        assert_eq!(runner.launched_inputs(), vec![library.source(0), library.source(2)]);

        assert!(!library.source(0).exists());
        assert!(library.derived(0).exists());
        assert!(library.source(1).exists());
        assert!(!library.derived(1).exists());
        assert!(!library.source(2).exists());
        assert!(library.derived(2).exists());
        assert!(guard.is_empty());
    }

    #[tokio::test]
    async fn test_scan_with_no_candidates_reports_nothing() {
        let library = Library::new(&["h264", "av1"]);
        let runner = Arc::new(ScriptedRunner::with_default(Script::succeed()));
        let (driver, _, metrics) = driver(library.items.clone(), runner.clone());
        let (reports, sink) = recorder();

        let report = driver.run(&sink, &CancelToken::new()).await.unwrap();

        assert_eq!(report.total, 0);
        assert_eq!(report.processed, 0);
        assert!(reports.lock().unwrap().is_empty());
        assert!(runner.launches().is_empty());
        let snapshot = metrics.read().await;
        assert_eq!(snapshot.scan_state, ScanState::Idle);
        assert_eq!(snapshot.progress, 0.0);
    }

    #[tokio::test]
    async fn test_cancel_after_first_item() {
        let library = Library::new(&["hevc", "hevc", "hevc"]);
        let runner = Arc::new(ScriptedRunner::with_default(Script::succeed()));
        let (driver, _, metrics) = driver(library.items.clone(), runner.clone());

        let cancel = CancelToken::new();
        let sink_cancel = cancel.clone();
        let reports = Arc::new(Mutex::new(Vec::new()));
        let sink_reports = reports.clone();
        let sink = move |fraction: f64| {
            sink_reports.lock().unwrap().push(fraction);
            sink_cancel.cancel();
        };

        let report = driver.run(&sink, &cancel).await.unwrap();

        assert!(report.cancelled);
        assert_eq!(report.processed, 1);
        assert_eq!(runner.launches().len(), 1);
        assert_eq!(reports.lock().unwrap().len(), 1);
        assert!(!library.source(0).exists());
        for i in 1..3 {
            assert!(library.source(i).exists());
            assert!(!library.derived(i).exists());
        }
        assert_eq!(metrics.read().await.scan_state, ScanState::Cancelled);
    }

    #[tokio::test]
    async fn test_item_failures_do_not_stop_scan() {
        let library = Library::new(&["hevc", "hevc", "hevc"]);
        let runner = Arc::new(ScriptedRunner::with_default(Script::succeed()));
        runner.script(library.source(0), Script::LaunchError);
        runner.script(
            library.source(1),
            Script::Exit {
                code: 1,
                write_output: true,
            },
        );
        let (driver, guard, metrics) = driver(library.items.clone(), runner.clone());
        let (reports, sink) = recorder();

        let report = driver.run(&sink, &CancelToken::new()).await.unwrap();

        assert_eq!(report.processed, 3);
        assert_eq!(report.replaced(), 1);
        assert_eq!(report.failures().count(), 2);
        assert!(report.has_failures());
        assert!(matches!(
            report.items[0].result,
            Err(TranscodeError::Launch { .. })
        ));
        let fractions = reports.lock().unwrap().clone();
        assert_eq!(fractions.len(), 3);
        assert!(fractions.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(fractions.last(), Some(&1.0));

        assert!(library.source(0).exists());
        assert!(library.source(1).exists());
        assert!(!library.derived(1).exists());
        assert!(!library.source(2).exists());
        assert!(guard.is_empty());

        let snapshot = metrics.read().await;
        assert_eq!(snapshot.completed_jobs, 1);
        assert_eq!(snapshot.failed_jobs, 2);
        assert_eq!(snapshot.processed_items, 3);
    }

    #[tokio::test]
    async fn test_source_delete_failure_does_not_stop_scan() {
        let library = Library::new(&["hevc", "hevc"]);
        // Swap the first source for a non-empty directory so deleting it fails
        fs::remove_file(library.source(0)).unwrap();
        fs::create_dir(library.source(0)).unwrap();
        fs::write(library.source(0).join("part"), b"x").unwrap();

        let runner = Arc::new(ScriptedRunner::with_default(Script::succeed()));
        let (driver, guard, _) = driver(library.items.clone(), runner.clone());
        let (reports, sink) = recorder();

        let report = driver.run(&sink, &CancelToken::new()).await.unwrap();

        assert_eq!(report.processed, 2);
        assert!(matches!(
            report.items[0].result,
            Err(TranscodeError::Replace(ReplaceError::RemoveSourceFailed { .. }))
        ));
        assert!(report.items[1].result.as_ref().is_ok_and(|o| o.is_replaced()));
        assert_eq!(*reports.lock().unwrap(), vec![0.5, 1.0]);

        assert!(library.source(0).exists());
        assert!(library.derived(0).exists());
        assert!(!library.source(1).exists());
        assert!(library.derived(1).exists());
        assert!(guard.is_empty());
    }

    #[tokio::test]
    async fn test_catalog_error_fails_scan() {
        let guard = TranscodeGuard::new();
        let metrics = new_shared_metrics();
        let selector = CandidateSelector::new(
            Arc::new(JsonCatalog::new("/nonexistent/catalog.json")),
            guard.clone(),
            "hevc",
        );
        let transcoder = Transcoder::new(
            guard,
            Arc::new(ScriptedRunner::with_default(Script::succeed())),
            FfmpegConfig::default(),
            "hevc",
            metrics.clone(),
        );
        let driver = ScanDriver::new(selector, transcoder, metrics);

        let result = driver.run(&|_: f64| {}, &CancelToken::new()).await;
        assert!(matches!(result, Err(ScanError::Catalog(_))));
    }

    #[tokio::test]
    async fn test_spawned_scan_runs_to_completion() {
        let library = Library::new(&["hevc", "hevc"]);
        let runner = Arc::new(ScriptedRunner::with_default(Script::succeed()));
        let (driver, _, _) = driver(library.items.clone(), runner);
        let (reports, sink) = recorder();

        let handle = Arc::new(driver).spawn(Arc::new(sink));
        let report = handle.join().await.unwrap();

        assert_eq!(report.replaced(), 2);
        assert_eq!(*reports.lock().unwrap(), vec![0.5, 1.0]);
    }

    #[tokio::test]
    async fn test_spawned_scan_cancelled_before_start() {
        let library = Library::new(&["hevc", "hevc", "hevc"]);
        let runner = Arc::new(ScriptedRunner::with_default(Script::succeed()));
        let (driver, _, _) = driver(library.items.clone(), runner.clone());

        // current-thread runtime: the task cannot start before we yield
        let handle = Arc::new(driver).spawn(Arc::new(|_: f64| {}));
        handle.cancel();
        let report = handle.join().await.unwrap();

        assert!(report.cancelled);
        assert_eq!(report.processed, 0);
        assert!(runner.launches().is_empty());
        for i in 0..3 {
            assert!(library.source(i).exists());
        }
    }

    #[test]
    fn test_cancel_token_clones_share_flag() {
        let token = CancelToken::new();
        let other = token.clone();
        assert!(!other.is_cancelled());
        token.cancel();
        assert!(other.is_cancelled());
    }
}
