// Feedback tracker: pending/verified state per (document, note)
//
// A note becomes `pending` when a refinement is applied for it. On the next
// evaluation it is promoted to `verified` if reviewers stopped raising it, and
// demoted back to `pending` if a verified note is raised again. Records are
// transitioned, never duplicated or deleted.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;

use crate::documents::{normalize_label, DocumentKind};
use crate::review::FeedbackByDoc;

/// Resolution state of one tracked note
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackStatus {
    Pending,
    Verified,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackRecord {
    pub note: String,
    pub status: FeedbackStatus,
    /// Iteration in which the note was last applied
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iteration: Option<usize>,
    /// SHA-256 of the document content saved for this note
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
}

impl FeedbackRecord {
    pub fn is_verified(&self) -> bool {
        self.status == FeedbackStatus::Verified
    }
}

/// Status changes produced by one `update_with_feedback` call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackerUpdate {
    pub verified: Vec<(DocumentKind, String)>,
    pub regressed: Vec<(DocumentKind, String)>,
    pub still_pending: Vec<(DocumentKind, String)>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedbackTracker {
    records: BTreeMap<DocumentKind, Vec<FeedbackRecord>>,
}

impl FeedbackTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `notes` were applied to `document` in `iteration`.
    ///
    /// A live record for the same note is replaced rather than duplicated.
    pub fn mark_pending(
        &mut self,
        document: DocumentKind,
        notes: &[String],
        iteration: usize,
        content_hash: &str,
    ) {
        let entries = self.records.entry(document).or_default();
        for note in notes {
            // A verified record would only exist here if the caller skipped
            // `update_with_feedback`; reopen it in place.
            if let Some(existing) = entries.iter_mut().find(|e| e.note == *note && e.is_verified()) {
                existing.status = FeedbackStatus::Pending;
                existing.iteration = Some(iteration);
                existing.content_hash = Some(content_hash.to_string());
                continue;
            }

            entries.retain(|e| !(e.note == *note && !e.is_verified()));
            entries.push(FeedbackRecord {
                note: note.clone(),
                status: FeedbackStatus::Pending,
                iteration: Some(iteration),
                content_hash: Some(content_hash.to_string()),
            });
        }
    }

    /// Reconcile tracked records against a fresh evaluation.
    pub fn update_with_feedback(&mut self, feedback: &FeedbackByDoc) -> TrackerUpdate {
        let mut update = TrackerUpdate::default();

        for (&kind, entries) in self.records.iter_mut() {
            let fresh: HashSet<&str> = feedback
                .get(&kind)
                .map(|notes| notes.iter().map(String::as_str).collect())
                .unwrap_or_default();

            for entry in entries.iter_mut() {
                let raised = fresh.contains(entry.note.as_str());
                match (entry.status, raised) {
                    (FeedbackStatus::Pending, true) => {
                        update.still_pending.push((kind, entry.note.clone()));
                    }
                    (FeedbackStatus::Pending, false) => {
                        entry.status = FeedbackStatus::Verified;
                        update.verified.push((kind, entry.note.clone()));
                    }
                    (FeedbackStatus::Verified, true) => {
                        entry.status = FeedbackStatus::Pending;
                        update.regressed.push((kind, entry.note.clone()));
                    }
                    (FeedbackStatus::Verified, false) => {}
                }
            }
        }
        self.records.retain(|_, entries| !entries.is_empty());

        for (kind, note) in &update.verified {
            tracing::info!(document = %kind, %note, "Feedback verified");
        }
        for (kind, note) in &update.regressed {
            tracing::warn!(document = %kind, %note, "Verified feedback raised again; reopening");
        }

        update
    }

    /// Split fresh feedback into notes still to act on and notes already verified.
    pub fn filter_verified(&self, feedback: &FeedbackByDoc) -> (FeedbackByDoc, FeedbackByDoc) {
        let mut filtered = FeedbackByDoc::new();
        let mut skipped = FeedbackByDoc::new();

        for (&kind, notes) in feedback {
            let verified: HashSet<&str> = self
                .records
                .get(&kind)
                .into_iter()
                .flatten()
                .filter(|e| e.is_verified())
                .map(|e| e.note.as_str())
                .collect();

            let (removed, remaining): (Vec<String>, Vec<String>) = notes
                .iter()
                .cloned()
                .partition(|note| verified.contains(note.as_str()));

            if !remaining.is_empty() {
                filtered.insert(kind, remaining);
            }
            if !removed.is_empty() {
                skipped.insert(kind, removed);
            }
        }

        (filtered, skipped)
    }

    /// Verified notes per document.
    pub fn verified_feedback(&self) -> FeedbackByDoc {
        self.records
            .iter()
            .filter_map(|(&kind, entries)| {
                let notes: Vec<String> = entries
                    .iter()
                    .filter(|e| e.is_verified())
                    .map(|e| e.note.clone())
                    .collect();
                (!notes.is_empty()).then_some((kind, notes))
            })
            .collect()
    }

    pub fn records(&self, kind: DocumentKind) -> &[FeedbackRecord] {
        self.records.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn pending_count(&self) -> usize {
        self.records
            .values()
            .flatten()
            .filter(|e| !e.is_verified())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    // ── Persistence ───────────────────────────────────────────────────────────

    /// Load tracker state; a missing file yields an empty tracker.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read feedback tracker: {}", path.display()))?;
        let value: Value = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse feedback tracker: {}", path.display()))?;
        Ok(Self::from_value(&value))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(&self.records)
            .context("Failed to serialize feedback tracker")?;
        fs::write(path, json)
            .with_context(|| format!("Failed to write feedback tracker: {}", path.display()))?;
        Ok(())
    }

    /// Lenient reader for stored state.
    ///
    /// Document keys go through label normalization, entries without a note
    /// are dropped, bare strings and entries without a status count as
    /// verified. Each note keeps one record per document.
    pub fn from_value(value: &Value) -> Self {
        let mut tracker = Self::new();
        let Some(map) = value.as_object() else {
            tracing::warn!("Ignoring feedback tracker state that is not an object");
            return tracker;
        };

        for (key, entries) in map {
            let Some(kind) = normalize_label(key) else {
                tracing::warn!(document = %key, "Ignoring tracker entries for unknown document");
                continue;
            };
            let items: Vec<&Value> = match entries {
                Value::Array(items) => items.iter().collect(),
                Value::Null => Vec::new(),
                other => vec![other],
            };

            let records = tracker.records.entry(kind).or_default();
            for item in items {
                if let Some(record) = record_from_value(item) {
                    // Aliased keys land on one kind; the last entry for a note wins.
                    records.retain(|existing| existing.note != record.note);
                    records.push(record);
                }
            }
        }
        tracker.records.retain(|_, entries| !entries.is_empty());
        tracker
    }
}

fn record_from_value(value: &Value) -> Option<FeedbackRecord> {
    match value {
        Value::Object(obj) => {
            let note = match obj.get("note")? {
                Value::String(s) if !s.is_empty() => s.clone(),
                Value::String(_) | Value::Null | Value::Bool(false) => return None,
                other => other.to_string(),
            };
            let status = match obj.get("status").and_then(Value::as_str) {
                Some("pending") => FeedbackStatus::Pending,
                _ => FeedbackStatus::Verified,
            };
            Some(FeedbackRecord {
                note,
                status,
                iteration: obj.get("iteration").and_then(Value::as_u64).map(|i| i as usize),
                content_hash: obj
                    .get("content_hash")
                    .and_then(Value::as_str)
                    .map(str::to_string),
            })
        }
        Value::String(s) if !s.is_empty() => Some(FeedbackRecord {
            note: s.clone(),
            status: FeedbackStatus::Verified,
            iteration: None,
            content_hash: None,
        }),
        _ => None,
    }
}
