// Feedback aggregation across the three reviewers
//
// Notes are prefixed with their source (`[quality] ...`) and deduplicated per
// document on the prefixed text. Entries without a recognizable target are
// broadcast to every loaded document after the targeted ones.

use std::collections::{BTreeMap, HashSet};

use super::reports::{ConsistencyReport, CoordinatorDecision, FeedbackItem, QualityReport};
use crate::documents::{normalize_labels, DocumentKind};

/// Per-document feedback notes, in generation order
pub type FeedbackByDoc = BTreeMap<DocumentKind, Vec<String>>;

/// Which reviewer produced a note
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedbackSource {
    Quality,
    Consistency,
    Coordinator,
}

impl FeedbackSource {
    pub fn label(self) -> &'static str {
        match self {
            FeedbackSource::Quality => "quality",
            FeedbackSource::Consistency => "consistency",
            FeedbackSource::Coordinator => "coordinator",
        }
    }

    /// `[source] note`
    pub fn tag(self, note: &str) -> String {
        format!("[{}] {}", self.label(), note)
    }
}

/// Merge the three reports into one feedback list per document.
///
/// `present` is the set of documents loaded this iteration; targets outside it
/// are kept (the reviewer named them explicitly) but broadcasts only reach
/// documents in `present`.
pub fn aggregate_feedback(
    quality: &QualityReport,
    consistency: &ConsistencyReport,
    coordinator: &CoordinatorDecision,
    present: &[DocumentKind],
) -> FeedbackByDoc {
    let mut aggregator = Aggregator::default();

    let sources = [
        (FeedbackSource::Quality, &quality.feedback),
        (FeedbackSource::Consistency, &consistency.issues),
        (FeedbackSource::Coordinator, &coordinator.required_improvements),
    ];
    for (source, items) in sources {
        for item in items {
            aggregator.add(source, item);
        }
    }

    aggregator.finish(present)
}

#[derive(Default)]
struct Aggregator {
    by_doc: FeedbackByDoc,
    seen: HashSet<(DocumentKind, String)>,
    general: Vec<String>,
}

impl Aggregator {
    fn add(&mut self, source: FeedbackSource, item: &FeedbackItem) {
        let note = item.note.trim();
        if note.is_empty() {
            return;
        }
        let labeled = source.tag(note);

        let targets = normalize_labels(&item.documents);
        if targets.is_empty() {
            if !self.general.contains(&labeled) {
                self.general.push(labeled);
            }
            return;
        }

        for kind in targets {
            self.push(kind, &labeled);
        }
    }

    fn push(&mut self, kind: DocumentKind, note: &str) {
        if self.seen.insert((kind, note.to_string())) {
            self.by_doc.entry(kind).or_default().push(note.to_string());
        }
    }

    fn finish(mut self, present: &[DocumentKind]) -> FeedbackByDoc {
        let general = std::mem::take(&mut self.general);
        for note in &general {
            for &kind in present {
                self.push(kind, note);
            }
        }
        if !general.is_empty() {
            tracing::debug!(
                notes = general.len(),
                documents = present.len(),
                "Broadcast untargeted feedback"
            );
        }
        self.by_doc
    }
}

/// Total number of notes across all documents
pub fn note_count(feedback: &FeedbackByDoc) -> usize {
    feedback.values().map(Vec::len).sum()
}
