// Workflow context: the state one refinement run carries between steps
//
// Documents here are a read-through copy of the store taken at the start of
// each iteration; the store stays authoritative.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use super::snapshot::IterationSnapshot;
use super::tracker::FeedbackTracker;
use crate::documents::{Document, DocumentKind, ServiceType};

/// Fixed facts about the run
#[derive(Debug, Clone, Serialize)]
pub struct ProjectInfo {
    pub session_id: Uuid,
    pub output_dir: PathBuf,
    pub service_type: ServiceType,
    pub started_at: DateTime<Utc>,
}

/// Counters reported at the end of a run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunMetrics {
    pub review_calls: usize,
    pub regeneration_calls: usize,
    pub regeneration_failures: usize,
    pub validation_failures: usize,
    pub unchanged_regenerations: usize,
    pub documents_saved: usize,
}

#[derive(Debug, Default)]
struct QualityState {
    tracker: FeedbackTracker,
    snapshots: Vec<IterationSnapshot>,
    updated_files: Vec<PathBuf>,
}

#[derive(Debug)]
pub struct WorkflowContext {
    project: ProjectInfo,
    documents: BTreeMap<DocumentKind, Document>,
    quality: QualityState,
    metrics: RunMetrics,
}

impl WorkflowContext {
    pub fn new(output_dir: impl Into<PathBuf>, service_type: ServiceType) -> Self {
        Self {
            project: ProjectInfo {
                session_id: Uuid::new_v4(),
                output_dir: output_dir.into(),
                service_type,
                started_at: Utc::now(),
            },
            documents: BTreeMap::new(),
            quality: QualityState::default(),
            metrics: RunMetrics::default(),
        }
    }

    /// Resume with previously persisted tracker state.
    pub fn with_tracker(mut self, tracker: FeedbackTracker) -> Self {
        self.quality.tracker = tracker;
        self
    }

    pub fn project(&self) -> &ProjectInfo {
        &self.project
    }

    pub fn output_dir(&self) -> &Path {
        &self.project.output_dir
    }

    pub fn document_order(&self) -> Vec<DocumentKind> {
        self.project.service_type.document_order()
    }

    // ── documents ─────────────────────────────────────────────────────────────

    pub fn documents(&self) -> &BTreeMap<DocumentKind, Document> {
        &self.documents
    }

    pub fn document(&self, kind: DocumentKind) -> Option<&Document> {
        self.documents.get(&kind)
    }

    /// Kinds loaded this iteration, in generation order
    pub fn loaded_kinds(&self) -> Vec<DocumentKind> {
        self.documents.keys().copied().collect()
    }

    pub fn replace_documents(&mut self, documents: BTreeMap<DocumentKind, Document>) {
        self.documents = documents;
    }

    /// Keep the in-memory copy in step with a successful save.
    pub fn update_document_content(&mut self, kind: DocumentKind, content: String) {
        if let Some(doc) = self.documents.get_mut(&kind) {
            doc.content = content;
        }
    }

    // ── quality state ─────────────────────────────────────────────────────────

    pub fn tracker(&self) -> &FeedbackTracker {
        &self.quality.tracker
    }

    pub fn tracker_mut(&mut self) -> &mut FeedbackTracker {
        &mut self.quality.tracker
    }

    pub fn record_snapshot(&mut self, snapshot: IterationSnapshot) {
        self.quality.snapshots.push(snapshot);
    }

    pub fn snapshots(&self) -> &[IterationSnapshot] {
        &self.quality.snapshots
    }

    /// Remember an updated file; repeats are ignored.
    pub fn record_updated_file(&mut self, path: PathBuf) {
        if !self.quality.updated_files.contains(&path) {
            self.quality.updated_files.push(path);
        }
    }

    pub fn updated_files(&self) -> &[PathBuf] {
        &self.quality.updated_files
    }

    pub fn improvement_applied(&self) -> bool {
        !self.quality.updated_files.is_empty()
    }

    // ── metrics ───────────────────────────────────────────────────────────────

    pub fn metrics(&self) -> &RunMetrics {
        &self.metrics
    }

    pub fn metrics_mut(&mut self) -> &mut RunMetrics {
        &mut self.metrics
    }
}
