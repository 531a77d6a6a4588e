// Iteration snapshots and their JSONL audit log

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::review::{ConsistencyReport, CoordinatorDecision, FeedbackByDoc, QualityReport};

/// Everything observed and decided in one pass of the loop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationSnapshot {
    pub iteration: usize,
    pub timestamp: DateTime<Utc>,
    pub quality: QualityReport,
    pub consistency: ConsistencyReport,
    pub coordinator: CoordinatorDecision,
    pub feedback_by_doc: FeedbackByDoc,
    pub filtered_feedback: FeedbackByDoc,
    pub skipped_feedback: FeedbackByDoc,
    pub applied_files: Vec<PathBuf>,
    /// Why the loop stopped after this pass, if it did
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<String>,
}

/// Append-only JSONL log, one snapshot per line
pub struct SnapshotLog {
    path: PathBuf,
}

impl SnapshotLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, snapshot: &IterationSnapshot) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open snapshot log: {}", self.path.display()))?;

        let json = serde_json::to_string(snapshot).context("Failed to serialize snapshot")?;
        writeln!(file, "{}", json).context("Failed to write snapshot to log")?;

        Ok(())
    }

    pub fn read_all(&self) -> Result<Vec<IterationSnapshot>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read snapshot log: {}", self.path.display()))?;

        contents
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(serde_json::from_str)
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to parse snapshot log")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::documents::DocumentKind;

    fn snapshot(iteration: usize) -> IterationSnapshot {
        let mut feedback = FeedbackByDoc::new();
        feedback.insert(DocumentKind::Design, vec!["[quality] add diagram".to_string()]);
        IterationSnapshot {
            iteration,
            timestamp: Utc::now(),
            quality: QualityReport {
                overall: Some(60.0),
                needs_improvement: true,
                ..Default::default()
            },
            consistency: ConsistencyReport::default(),
            coordinator: CoordinatorDecision::default(),
            feedback_by_doc: feedback.clone(),
            filtered_feedback: feedback,
            skipped_feedback: FeedbackByDoc::new(),
            applied_files: vec![PathBuf::from("/out/design.md")],
            stop_reason: None,
        }
    }

    #[test]
    fn test_append_and_read_back() {
        let tmp = tempfile::tempdir().unwrap();
        let log = SnapshotLog::new(tmp.path().join(".specforge/iterations.jsonl"));

        log.append(&snapshot(1)).unwrap();
        log.append(&snapshot(2)).unwrap();

        let entries = log.read_all().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].iteration, 1);
        assert_eq!(entries[1].applied_files, vec![PathBuf::from("/out/design.md")]);
        assert_eq!(entries[1].quality.overall, Some(60.0));
    }

    #[test]
    fn test_read_missing_log_is_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let log = SnapshotLog::new(tmp.path().join("none.jsonl"));
        assert!(log.read_all().unwrap().is_empty());
    }
}
