//! Performance tracking and advisory feedback
//!
//! This module provides:
//! - Append-only recording of task results
//! - Windowed aggregate metrics by LLM and by prompt strategy
//! - Threshold-based recommendations and a text report
//! - A cached snapshot file for display
//! - Archival of old results
//!
//! Recommendations are advisory; nothing here feeds back into routing.

mod log;
mod snapshot;

pub use log::{ArchiveSummary, ResultLog};
pub use snapshot::{
    GroupStats, LOW_AVERAGE_SCORE, LOW_SUCCESS_RATE, PerformanceSnapshot, SUCCESS_SCORE,
    TaskResult,
};

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::error::{Error, Result};

/// On-disk shape of the snapshot cache
#[derive(Debug, Serialize, Deserialize)]
struct SnapshotFile {
    #[serde(flatten)]
    snapshot: PerformanceSnapshot,
    last_updated: DateTime<Utc>,
}

/// Performance tracker over the result log
#[derive(Debug)]
pub struct PerformanceTracker {
    log: ResultLog,
    metrics_path: Option<PathBuf>,
    cached: Option<PerformanceSnapshot>,
}

impl PerformanceTracker {
    /// Create a tracker over a result log, without a snapshot cache file
    pub fn new(log_path: impl Into<PathBuf>) -> Self {
        Self {
            log: ResultLog::new(log_path),
            metrics_path: None,
            cached: None,
        }
    }

    /// Persist snapshots to a cache file, loading any existing one
    pub fn with_metrics_path(mut self, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        self.cached = Self::load_snapshot(&path);
        self.metrics_path = Some(path);
        self
    }

    pub fn log(&self) -> &ResultLog {
        &self.log
    }

    fn load_snapshot(path: &Path) -> Option<PerformanceSnapshot> {
        if !path.exists() {
            return None;
        }
        let parsed = fs::read_to_string(path)
            .map_err(Error::from)
            .and_then(|contents| Ok(serde_json::from_str::<SnapshotFile>(&contents)?));
        match parsed {
            Ok(file) => Some(file.snapshot),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Ignoring unreadable metrics cache");
                None
            }
        }
    }

    /// Append a task result
    ///
    /// Scores are clamped into [0, 1]; a non-finite score is rejected.
    pub fn record(&self, mut result: TaskResult) -> Result<TaskResult> {
        if !result.validator_score.is_finite() {
            return Err(Error::InvalidInput(format!(
                "validator score for task '{}' is not a number",
                result.task_id
            )));
        }
        let clamped = result.validator_score.clamp(0.0, 1.0);
        if clamped != result.validator_score {
            warn!(
                task_id = %result.task_id,
                score = result.validator_score,
                "Validator score outside [0, 1] was clamped"
            );
            result.validator_score = clamped;
        }

        self.log.append(&result)?;
        Ok(result)
    }

    /// Metrics over the last `window_days` days
    pub fn analyze(&self, window_days: u32) -> PerformanceSnapshot {
        self.analyze_at(window_days, Utc::now())
    }

    /// Metrics over the `window_days` days before `now`
    ///
    /// Only results strictly newer than the cutoff count. A log that cannot
    /// be read yields an empty snapshot.
    pub fn analyze_at(&self, window_days: u32, now: DateTime<Utc>) -> PerformanceSnapshot {
        let history = match self.log.read_all() {
            Ok(history) => history,
            Err(e) => {
                error!(error = %e, "Failed to load task history");
                return PerformanceSnapshot::empty(now);
            }
        };

        let cutoff = now - Duration::days(i64::from(window_days));
        let in_window: Vec<&TaskResult> =
            history.iter().filter(|r| r.timestamp > cutoff).collect();

        if in_window.is_empty() {
            warn!(window_days, "No tasks in window");
            return PerformanceSnapshot::empty(now);
        }

        debug!(window_days, tasks = in_window.len(), "Analyzed performance");
        PerformanceSnapshot::from_results(window_days, in_window, now)
    }

    /// Advisory recommendations for a snapshot
    pub fn recommend(&self, snapshot: &PerformanceSnapshot) -> Vec<String> {
        snapshot.recommendations()
    }

    /// Human-readable report for the last `window_days` days
    pub fn report(&self, window_days: u32) -> String {
        let snapshot = self.analyze(window_days);
        Self::render_report(window_days, &snapshot)
    }

    /// Render a report for an already computed snapshot
    pub fn render_report(window_days: u32, snapshot: &PerformanceSnapshot) -> String {
        let mut lines = vec![
            format!("Performance Report ({}-day window)", window_days),
            "=".repeat(50),
            format!("Tasks completed: {}", snapshot.tasks_completed),
            format!("Average score: {:.2}", snapshot.average_score),
            format!("Success rate: {:.1}%", snapshot.success_rate * 100.0),
            format!("Tokens spent: {}", snapshot.total_tokens_spent),
        ];

        if !snapshot.by_llm.is_empty() {
            lines.push(String::new());
            lines.push("By LLM:".to_string());
            for (llm, stats) in &snapshot.by_llm {
                lines.push(format!(
                    "  {:<24} tasks={:<5} avg={:.2} success={:.1}%",
                    llm,
                    stats.tasks,
                    stats.avg_score,
                    stats.success_rate * 100.0
                ));
            }
        }
        if !snapshot.by_strategy.is_empty() {
            lines.push(String::new());
            lines.push("By strategy:".to_string());
            for (strategy, stats) in &snapshot.by_strategy {
                lines.push(format!(
                    "  {:<24} tasks={:<5} avg={:.2} success={:.1}%",
                    strategy,
                    stats.tasks,
                    stats.avg_score,
                    stats.success_rate * 100.0
                ));
            }
        }

        let recommendations = snapshot.recommendations();
        if !recommendations.is_empty() {
            lines.push(String::new());
            lines.push("Recommendations:".to_string());
            for rec in recommendations {
                lines.push(format!("  - {}", rec));
            }
        }

        lines.join("\n")
    }

    /// Cache a snapshot, writing the metrics file when one is configured
    pub fn save_snapshot(&mut self, snapshot: &PerformanceSnapshot) -> Result<()> {
        self.cached = Some(snapshot.clone());

        let Some(path) = &self.metrics_path else {
            return Ok(());
        };
        let file = SnapshotFile {
            snapshot: snapshot.clone(),
            last_updated: Utc::now(),
        };
        let contents = serde_json::to_string_pretty(&file)?;
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        fs::write(path, contents)
            .map_err(|e| Error::PersistenceFailed(path.display().to_string(), e.to_string()))?;
        debug!(path = %path.display(), "Metrics saved");
        Ok(())
    }

    /// Last saved snapshot, if any
    pub fn cached_snapshot(&self) -> Option<&PerformanceSnapshot> {
        self.cached.as_ref()
    }

    /// The most recent `limit` results, oldest first
    pub fn history(&self, limit: usize) -> Result<Vec<TaskResult>> {
        let mut all = self.log.read_all()?;
        let skip = all.len().saturating_sub(limit);
        Ok(all.split_off(skip))
    }

    /// Archive results at least `days` days older than `now`
    pub fn archive_older_than(&self, days: u32, now: DateTime<Utc>) -> Result<ArchiveSummary> {
        let cutoff = now - Duration::days(i64::from(days));
        self.log.archive_older_than(cutoff, now)
    }
}
