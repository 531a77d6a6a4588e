// Refinement executor: regenerates one document from its outstanding feedback
//
// Per document: re-read from the store, dedup notes, prompt the regenerator,
// post-process, skip identical output, validate, save, hash, mark pending.
// Any failure leaves the file untouched and only affects that document.

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::Instrument;

use super::context::WorkflowContext;
use crate::documents::{Document, DocumentKind, DocumentStore, SaveReceipt, StructuralValidator};
use crate::providers::TextGenerator;
use crate::review::interpreter::{parse_structured, strip_code_fences};
use crate::review::prompts::improvement_prompt;
use crate::review::FeedbackByDoc;

/// What happened to one document
#[derive(Debug, Clone, PartialEq)]
pub enum RefineOutcome {
    Updated {
        receipt: SaveReceipt,
        content_hash: String,
        applied_notes: Vec<String>,
    },
    /// Regenerated content matched what is on disk
    Unchanged,
    /// Nothing to do (no feedback, no regenerator, document gone)
    Skipped(String),
    /// Regeneration, post-processing, validation or save failed
    Failed(String),
}

pub struct RefinementExecutor {
    store: Arc<dyn DocumentStore>,
    validator: Arc<dyn StructuralValidator>,
    regenerators: BTreeMap<DocumentKind, Arc<dyn TextGenerator>>,
}

impl RefinementExecutor {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        validator: Arc<dyn StructuralValidator>,
        regenerators: BTreeMap<DocumentKind, Arc<dyn TextGenerator>>,
    ) -> Self {
        Self {
            store,
            validator,
            regenerators,
        }
    }

    /// Refine every document with feedback, in generation order.
    ///
    /// Returns the files that were actually rewritten.
    pub async fn execute(
        &self,
        ctx: &mut WorkflowContext,
        feedback: &FeedbackByDoc,
        iteration: usize,
    ) -> Vec<PathBuf> {
        let mut updated = Vec::new();

        for kind in ctx.document_order() {
            let Some(notes) = feedback.get(&kind).filter(|n| !n.is_empty()) else {
                continue;
            };

            let span = tracing::info_span!("document", kind = %kind, iteration);
            let outcome = self
                .refine_document(ctx, kind, notes, iteration)
                .instrument(span)
                .await;

            if let RefineOutcome::Updated { receipt, .. } = outcome {
                updated.push(receipt.file_path);
            }
        }

        updated
    }

    /// Refine a single document.
    pub async fn refine_document(
        &self,
        ctx: &mut WorkflowContext,
        kind: DocumentKind,
        feedback: &[String],
        iteration: usize,
    ) -> RefineOutcome {
        let notes = dedup_notes(feedback);
        if notes.is_empty() {
            return RefineOutcome::Skipped("no feedback".into());
        }

        let Some(generator) = self.regenerators.get(&kind) else {
            tracing::warn!("No regenerator configured; skipping");
            return RefineOutcome::Skipped("no regenerator".into());
        };

        let current = match self.current_content(ctx, kind) {
            Some(content) => content,
            None => {
                tracing::warn!("Document not found on disk; skipping");
                return RefineOutcome::Skipped("document missing".into());
            }
        };

        tracing::info!(notes = notes.len(), chars = current.len(), "Applying feedback");

        let document = Document {
            kind,
            path: self.store.path_for(kind),
            content: current.clone(),
        };
        let required = self.validator.required_sections(kind);
        let Some(prompt) = improvement_prompt(&document, &notes, &required) else {
            return RefineOutcome::Skipped("empty prompt".into());
        };

        ctx.metrics_mut().regeneration_calls += 1;
        let reply = match generator.generate(&prompt).await {
            Ok(reply) => reply,
            Err(e) => {
                ctx.metrics_mut().regeneration_failures += 1;
                tracing::error!("Regeneration failed: {:#}", e);
                return RefineOutcome::Failed(format!("{:#}", e));
            }
        };

        let processed = match process_regenerated(kind, &reply) {
            Ok(processed) => processed,
            Err(e) => {
                ctx.metrics_mut().regeneration_failures += 1;
                tracing::error!("Regenerated content rejected: {:#}", e);
                return RefineOutcome::Failed(format!("{:#}", e));
            }
        };

        if reply == current || is_unchanged(kind, &current, &processed) {
            ctx.metrics_mut().unchanged_regenerations += 1;
            tracing::warn!("Regenerated content is identical to the current document; not saving");
            return RefineOutcome::Unchanged;
        }

        if let Err(e) = self.validator.validate(kind, &processed) {
            ctx.metrics_mut().validation_failures += 1;
            tracing::error!("Validation failed; keeping previous content: {}", e);
            return RefineOutcome::Failed(e.to_string());
        }

        let receipt = match self.store.write(kind, &processed) {
            Ok(receipt) => receipt,
            Err(e) => {
                tracing::error!("Failed to save regenerated document: {:#}", e);
                return RefineOutcome::Failed(format!("{:#}", e));
            }
        };

        let content_hash = content_hash(&processed);
        ctx.tracker_mut().mark_pending(kind, &notes, iteration, &content_hash);
        ctx.update_document_content(kind, processed);
        ctx.record_updated_file(receipt.file_path.clone());
        ctx.metrics_mut().documents_saved += 1;

        tracing::info!(file = %receipt.file_path.display(), hash = %content_hash, "Feedback applied");

        RefineOutcome::Updated {
            receipt,
            content_hash,
            applied_notes: notes,
        }
    }

    /// Fresh on-disk content, falling back to the copy loaded this iteration
    /// when the read itself fails.
    fn current_content(&self, ctx: &WorkflowContext, kind: DocumentKind) -> Option<String> {
        match self.store.read(kind) {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!("Failed to re-read document, using loaded copy: {:#}", e);
                ctx.document(kind).map(|doc| doc.content.clone())
            }
        }
    }
}

/// Order-preserving dedup of feedback notes.
fn dedup_notes(notes: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    notes
        .iter()
        .filter(|note| seen.insert(note.as_str()))
        .cloned()
        .collect()
}

/// Turn a regenerator reply into document content.
///
/// Markdown is used as returned. The API contract must parse as JSON (after
/// de-fencing and key repair) and is stored pretty-printed.
pub fn process_regenerated(kind: DocumentKind, reply: &str) -> Result<String> {
    if kind.is_markdown() {
        return Ok(reply.to_string());
    }

    let (value, stage) = parse_structured(strip_code_fences(reply))
        .context("API contract reply is not valid JSON")?;
    if !value.is_object() {
        anyhow::bail!("API contract reply is a JSON array, expected an object");
    }
    tracing::debug!(?stage, "Parsed API contract reply");

    serde_json::to_string_pretty(&value).context("Failed to serialize API contract")
}

/// Whether processed output says the same thing as the stored document.
///
/// The API contract is compared as JSON, so formatting alone never counts as
/// a change.
fn is_unchanged(kind: DocumentKind, current: &str, processed: &str) -> bool {
    if processed == current {
        return true;
    }
    if kind.is_markdown() {
        return false;
    }
    match parse_structured(strip_code_fences(current)) {
        Ok((stored, _)) => serde_json::from_str::<serde_json::Value>(processed)
            .is_ok_and(|regenerated| regenerated == stored),
        Err(_) => false,
    }
}

/// SHA-256 fingerprint of saved content
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use crate::documents::{FsDocumentStore, ServiceType, TemplateValidator};
    use async_trait::async_trait;
    use std::sync::Mutex;

    const DESIGN_OK: &str = "# Architecture\n## Sequence Diagram\n## Data Model\n## API Contract\n\
                             ## Security & Permissions\n## Performance Goals\n";

    struct Scripted {
        reply: Result<String, String>,
        prompts: Mutex<Vec<String>>,
    }

    impl Scripted {
        fn ok(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Ok(reply.to_string()),
                prompts: Mutex::new(Vec::new()),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                reply: Err("upstream timeout".into()),
                prompts: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl TextGenerator for Scripted {
        async fn generate(&self, prompt: &str) -> Result<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.reply.clone().map_err(|e| anyhow!(e))
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    fn setup(
        kind: DocumentKind,
        initial: &str,
        generator: Arc<Scripted>,
    ) -> (tempfile::TempDir, Arc<FsDocumentStore>, RefinementExecutor, WorkflowContext) {
        let tmp = tempfile::tempdir().unwrap();
        let store = Arc::new(FsDocumentStore::prepare(tmp.path()).unwrap());
        store.write(kind, initial).unwrap();

        let mut regenerators: BTreeMap<DocumentKind, Arc<dyn TextGenerator>> = BTreeMap::new();
        regenerators.insert(kind, generator);
        let executor = RefinementExecutor::new(
            store.clone(),
            Arc::new(TemplateValidator::new()),
            regenerators,
        );
        let ctx = WorkflowContext::new(store.output_dir(), ServiceType::Api);
        (tmp, store, executor, ctx)
    }

    fn notes(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_updates_document_and_marks_pending() {
        let generator = Scripted::ok(&format!("{}\nmore detail\n", DESIGN_OK));
        let (_tmp, store, executor, mut ctx) = setup(DocumentKind::Design, DESIGN_OK, generator.clone());

        let outcome = executor
            .refine_document(&mut ctx, DocumentKind::Design, &notes(&["a", "b", "a"]), 1)
            .await;

        match outcome {
            RefineOutcome::Updated { applied_notes, content_hash: hash, .. } => {
                assert_eq!(applied_notes, notes(&["a", "b"]));
                let saved = store.read(DocumentKind::Design).unwrap().unwrap();
                assert_eq!(hash, content_hash(&saved));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(ctx.tracker().records(DocumentKind::Design).len(), 2);
        assert_eq!(ctx.updated_files().len(), 1);
        assert_eq!(ctx.metrics().documents_saved, 1);

        let prompt = generator.prompts.lock().unwrap()[0].clone();
        assert!(prompt.contains("- Sequence Diagram"));
        assert_eq!(prompt.matches("\"note\": \"a\"").count(), 1);
    }

    #[tokio::test]
    async fn test_identical_output_is_noop() {
        let (_tmp, store, executor, mut ctx) =
            setup(DocumentKind::Design, DESIGN_OK, Scripted::ok(DESIGN_OK));

        let outcome = executor
            .refine_document(&mut ctx, DocumentKind::Design, &notes(&["a"]), 1)
            .await;

        assert_eq!(outcome, RefineOutcome::Unchanged);
        assert!(ctx.tracker().is_empty());
        assert!(store.saved_files().len() == 1, "only the fixture write");
        assert_eq!(ctx.metrics().unchanged_regenerations, 1);
    }

    #[tokio::test]
    async fn test_validation_failure_leaves_file_untouched() {
        let (_tmp, store, executor, mut ctx) =
            setup(DocumentKind::Design, DESIGN_OK, Scripted::ok("# Architecture only\n"));

        let outcome = executor
            .refine_document(&mut ctx, DocumentKind::Design, &notes(&["a"]), 1)
            .await;

        assert!(matches!(outcome, RefineOutcome::Failed(_)));
        assert_eq!(store.read(DocumentKind::Design).unwrap().as_deref(), Some(DESIGN_OK));
        assert!(ctx.tracker().is_empty());
        assert_eq!(ctx.metrics().validation_failures, 1);
    }

    #[tokio::test]
    async fn test_generator_failure_is_contained() {
        let (_tmp, _store, executor, mut ctx) =
            setup(DocumentKind::Design, DESIGN_OK, Scripted::failing());

        let updated = executor
            .execute(
                &mut ctx,
                &[(DocumentKind::Design, notes(&["a"]))].into_iter().collect(),
                1,
            )
            .await;

        assert!(updated.is_empty());
        assert_eq!(ctx.metrics().regeneration_failures, 1);
    }

    #[tokio::test]
    async fn test_missing_regenerator_skips() {
        let (_tmp, _store, executor, mut ctx) =
            setup(DocumentKind::Design, DESIGN_OK, Scripted::ok("x"));
        let outcome = executor
            .refine_document(&mut ctx, DocumentKind::Tasks, &notes(&["a"]), 1)
            .await;
        assert!(matches!(outcome, RefineOutcome::Skipped(_)));
    }

    #[tokio::test]
    async fn test_api_contract_reply_is_normalized() {
        let initial = r#"{"openapi":"3.1.0","info":{"title":"Svc","version":"1.0"},"paths":{}}"#;
        let reply = "```json\n{openapi: '3.1.0', info: {title: 'Svc', version: '1.1'}, paths: {'/users': {}}}\n```";
        let (_tmp, store, executor, mut ctx) =
            setup(DocumentKind::ApiContract, initial, Scripted::ok(reply));

        let outcome = executor
            .refine_document(&mut ctx, DocumentKind::ApiContract, &notes(&["add users"]), 2)
            .await;

        assert!(matches!(outcome, RefineOutcome::Updated { .. }));
        let saved = store.read(DocumentKind::ApiContract).unwrap().unwrap();
        let value: serde_json::Value = serde_json::from_str(&saved).unwrap();
        assert_eq!(value["info"]["version"], "1.1");
        assert!(saved.contains('\n'), "stored pretty-printed");
    }

    #[tokio::test]
    async fn test_compact_contract_echoed_back_is_noop() {
        let initial = r#"{"openapi":"3.1.0","info":{"title":"Svc","version":"1.0"},"paths":{}}"#;
        let (_tmp, store, executor, mut ctx) =
            setup(DocumentKind::ApiContract, initial, Scripted::ok(initial));

        let outcome = executor
            .refine_document(&mut ctx, DocumentKind::ApiContract, &notes(&["add users"]), 1)
            .await;

        assert_eq!(outcome, RefineOutcome::Unchanged);
        assert!(ctx.tracker().is_empty());
        assert_eq!(store.read(DocumentKind::ApiContract).unwrap().unwrap(), initial);
        assert_eq!(ctx.metrics().unchanged_regenerations, 1);
    }

    #[tokio::test]
    async fn test_reformatted_contract_is_noop() {
        let initial = r#"{"openapi":"3.1.0","info":{"title":"Svc","version":"1.0"},"paths":{}}"#;
        let reply = "```json\n{\n  \"paths\": {},\n  \"info\": {\"version\": \"1.0\", \"title\": \"Svc\"},\n  \"openapi\": \"3.1.0\"\n}\n```";
        let (_tmp, store, executor, mut ctx) =
            setup(DocumentKind::ApiContract, initial, Scripted::ok(reply));

        let outcome = executor
            .refine_document(&mut ctx, DocumentKind::ApiContract, &notes(&["add users"]), 1)
            .await;

        assert_eq!(outcome, RefineOutcome::Unchanged);
        assert_eq!(store.read(DocumentKind::ApiContract).unwrap().unwrap(), initial);
    }

    #[test]
    fn test_process_regenerated_contract_fails_loudly() {
        assert!(process_regenerated(DocumentKind::ApiContract, "Sorry, I cannot do that.").is_err());
        assert!(process_regenerated(DocumentKind::ApiContract, "[1, 2]").is_err());
    }

    #[test]
    fn test_process_regenerated_markdown_verbatim() {
        let text = "  # Tasks\n\n";
        assert_eq!(process_regenerated(DocumentKind::Tasks, text).unwrap(), text);
    }

    #[test]
    fn test_content_hash_is_sha256_hex() {
        let hash = content_hash("abc");
        assert_eq!(hash.len(), 64);
        assert_eq!(
            hash,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
