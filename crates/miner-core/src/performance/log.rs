//! Append-only JSONL result log
//!
//! One [`TaskResult`] per line in write order. Records are never edited;
//! archival moves old lines verbatim into a sibling archive file.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use super::snapshot::TaskResult;
use crate::error::{Error, Result};

/// Outcome of an archival pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveSummary {
    pub archived: usize,
    pub retained: usize,
    /// Archive file written, if anything was archived
    pub archive_path: Option<PathBuf>,
}

/// File-backed result log
#[derive(Debug, Clone)]
pub struct ResultLog {
    path: PathBuf,
}

impl ResultLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record
    pub fn append(&self, result: &TaskResult) -> Result<()> {
        let line = serde_json::to_string(result)?;
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| self.persistence_error(e))?;
        writeln!(file, "{}", line).map_err(|e| self.persistence_error(e))?;

        debug!(task_id = %result.task_id, score = result.validator_score, "Recorded task result");
        Ok(())
    }

    /// Every well-formed record in write order
    ///
    /// A missing log is empty. Malformed lines are skipped with a warning.
    pub fn read_all(&self) -> Result<Vec<TaskResult>> {
        Ok(self
            .read_lines()?
            .into_iter()
            .filter_map(|(_, record)| record)
            .collect())
    }

    /// Raw lines paired with their parsed record, if the line parses
    fn read_lines(&self) -> Result<Vec<(String, Option<TaskResult>)>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let contents = fs::read_to_string(&self.path)?;
        let mut lines = Vec::new();
        for (index, line) in contents.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let record = match serde_json::from_str::<TaskResult>(line) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!(line = index + 1, error = %e, "Skipping malformed result line");
                    None
                }
            };
            lines.push((line.to_string(), record));
        }
        Ok(lines)
    }

    /// Move records with `timestamp <= cutoff` into an archive file
    ///
    /// The archive is named `<stem>.archive-<YYYYMMDDHHMMSS>.jsonl` after
    /// `now`. Malformed lines stay in the active log. The active log is
    /// replaced through a temporary file and rename.
    pub fn archive_older_than(
        &self,
        cutoff: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<ArchiveSummary> {
        let lines = self.read_lines()?;
        let (archived, retained): (Vec<_>, Vec<_>) = lines.into_iter().partition(|(_, record)| {
            record
                .as_ref()
                .is_some_and(|r| r.timestamp <= cutoff)
        });

        if archived.is_empty() {
            return Ok(ArchiveSummary {
                archived: 0,
                retained: retained.len(),
                archive_path: None,
            });
        }

        let archive_path = self.archive_path(now);
        let mut archive = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&archive_path)
            .map_err(|e| Error::PersistenceFailed(archive_path.display().to_string(), e.to_string()))?;
        for (line, _) in &archived {
            writeln!(archive, "{}", line).map_err(|e| {
                Error::PersistenceFailed(archive_path.display().to_string(), e.to_string())
            })?;
        }
        archive
            .sync_all()
            .map_err(|e| Error::PersistenceFailed(archive_path.display().to_string(), e.to_string()))?;

        let mut active = String::new();
        for (line, _) in &retained {
            active.push_str(line);
            active.push('\n');
        }
        let tmp = self.path.with_extension("jsonl.tmp");
        fs::write(&tmp, active).map_err(|e| self.persistence_error(e))?;
        fs::rename(&tmp, &self.path).map_err(|e| self.persistence_error(e))?;

        info!(
            archived = archived.len(),
            retained = retained.len(),
            archive = %archive_path.display(),
            "Archived old task results"
        );

        Ok(ArchiveSummary {
            archived: archived.len(),
            retained: retained.len(),
            archive_path: Some(archive_path),
        })
    }

    fn archive_path(&self, now: DateTime<Utc>) -> PathBuf {
        let stem = self
            .path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "task-history".to_string());
        let name = format!("{}.archive-{}.jsonl", stem, now.format("%Y%m%d%H%M%S"));
        self.path.with_file_name(name)
    }

    fn persistence_error(&self, e: std::io::Error) -> Error {
        Error::PersistenceFailed(self.path.display().to_string(), e.to_string())
    }
}
