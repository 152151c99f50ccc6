//! Metrics module for HEVC Sweep
//!
//! Provides structs for scan progress and per-job state, shared between the
//! scan driver, the orchestrator and the metrics endpoint.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;

/// State of the job currently being transcoded
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobMetrics {
    pub id: String,
    pub input_path: String,
    pub output_path: String,
    pub stage: String,
    pub started_at_unix_ms: i64,
}

/// Lifecycle of the scan driver
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ScanState {
    #[default]
    Idle,
    Scanning,
    Cancelled,
}

/// Complete metrics snapshot served at `/metrics`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct MetricsSnapshot {
    pub timestamp_unix_ms: i64,
    pub scan_state: ScanState,
    pub scans_started: u64,
    /// Candidates in the current (or last) scan
    pub total_items: usize,
    /// Candidates handled so far in the current (or last) scan
    pub processed_items: usize,
    /// `processed_items / total_items`, 0 when there is nothing to do
    pub progress: f64,
    pub current_job: Option<JobMetrics>,
    pub completed_jobs: u64,
    pub failed_jobs: u64,
    pub skipped_jobs: u64,
}

/// Shared metrics state for concurrent access across components
pub type SharedMetrics = Arc<RwLock<MetricsSnapshot>>;

/// Creates a new SharedMetrics instance with default values
pub fn new_shared_metrics() -> SharedMetrics {
    Arc::new(RwLock::new(MetricsSnapshot::default()))
}

/// Current time as Unix epoch milliseconds
pub fn now_unix_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
