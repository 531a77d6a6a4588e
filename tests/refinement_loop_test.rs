// Refinement loop integration tests
//
// Reviewers and regenerators are scripted; documents live in a temp dir behind
// the real filesystem store and template validator.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fs;
use std::sync::{Arc, Mutex};

use specforge::documents::{DocumentKind, DocumentStore, FsDocumentStore, ServiceType, TemplateValidator};
use specforge::providers::TextGenerator;
use specforge::refine::{
    snapshot_log_path, tracker_path, ControllerSettings, FeedbackStatus, FeedbackTracker,
    IterationController, RefinementExecutor, Reviewers, SnapshotLog, StallReason, Termination,
    WorkflowContext,
};

const REQUIREMENTS: &str = "# Header/Meta\n## Scope\n## Functional Requirements\n## Error Requirements\n\
                            ## Security & Privacy\n## Observability\n## Acceptance Criteria\n";
const DESIGN: &str = "# Architecture\n## Sequence Diagram\n## Data Model\n## API Contract\n\
                      ## Security & Permissions\n## Performance Goals\n";
const TASKS: &str = "# Epic\n## Story\n### Task\n## DoD\n";

const APPROVED: &str = r#"{"approved": true, "decision": "approve"}"#;
const NOT_APPROVED: &str = r#"{"approved": false}"#;
const PASSING_QUALITY: &str = r#"{"overall": 90, "needs_improvement": false, "feedback": []}"#;
const NO_ISSUES: &str = r#"{"issues": [], "severity": "low"}"#;

// ── Scripted generator ────────────────────────────────────────────────────────

/// Replies in order, repeating the last reply once the script runs out.
struct Scripted {
    replies: Vec<Result<String, String>>,
    prompts: Mutex<Vec<String>>,
}

impl Scripted {
    fn new(replies: &[&str]) -> Arc<Self> {
        assert!(!replies.is_empty());
        Arc::new(Self {
            replies: replies.iter().map(|r| Ok(r.to_string())).collect(),
            prompts: Mutex::new(Vec::new()),
        })
    }

    fn owned(replies: Vec<String>) -> Arc<Self> {
        assert!(!replies.is_empty());
        Arc::new(Self {
            replies: replies.into_iter().map(Ok).collect(),
            prompts: Mutex::new(Vec::new()),
        })
    }

    fn failing(message: &str) -> Arc<Self> {
        Arc::new(Self {
            replies: vec![Err(message.to_string())],
            prompts: Mutex::new(Vec::new()),
        })
    }

    fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextGenerator for Scripted {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let mut prompts = self.prompts.lock().unwrap();
        let idx = prompts.len().min(self.replies.len() - 1);
        prompts.push(prompt.to_string());
        self.replies[idx].clone().map_err(|e| anyhow!(e))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

// ── Harness ───────────────────────────────────────────────────────────────────

struct Harness {
    _tmp: tempfile::TempDir,
    store: Arc<FsDocumentStore>,
    ctx: WorkflowContext,
}

fn harness(service_type: ServiceType, docs: &[(DocumentKind, &str)]) -> Harness {
    let tmp = tempfile::tempdir().unwrap();
    let store = Arc::new(FsDocumentStore::prepare(tmp.path()).unwrap());
    for (kind, content) in docs {
        fs::write(store.path_for(*kind), content).unwrap();
    }
    let ctx = WorkflowContext::new(store.output_dir(), service_type);
    Harness {
        _tmp: tmp,
        store,
        ctx,
    }
}

fn controller(
    store: &Arc<FsDocumentStore>,
    quality: &Arc<Scripted>,
    consistency: &Arc<Scripted>,
    coordinator: &Arc<Scripted>,
    regenerators: &[(DocumentKind, &Arc<Scripted>)],
    settings: ControllerSettings,
) -> IterationController {
    let regenerators: BTreeMap<DocumentKind, Arc<dyn TextGenerator>> = regenerators
        .iter()
        .map(|(kind, generator)| (*kind, Arc::clone(*generator) as Arc<dyn TextGenerator>))
        .collect();
    let executor = RefinementExecutor::new(
        store.clone(),
        Arc::new(TemplateValidator::new()),
        regenerators,
    );
    IterationController::new(
        store.clone(),
        Reviewers {
            quality: quality.clone(),
            consistency: consistency.clone(),
            coordinator: coordinator.clone(),
        },
        executor,
        settings,
    )
}

fn max_iterations(n: usize) -> ControllerSettings {
    ControllerSettings {
        max_iterations: n,
        ..Default::default()
    }
}

// ── Scenarios ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_targeted_feedback_rewrites_only_named_documents() {
    let mut h = harness(
        ServiceType::Web,
        &[
            (DocumentKind::Requirements, REQUIREMENTS),
            (DocumentKind::Design, DESIGN),
            (DocumentKind::Tasks, TASKS),
        ],
    );

    let quality = Scripted::new(&[
        r#"{"overall": 62, "needs_improvement": true,
            "feedback": [{"documents": ["design"], "note": "add sequence diagram"}]}"#,
        PASSING_QUALITY,
    ]);
    let consistency = Scripted::new(&[NO_ISSUES]);
    let coordinator = Scripted::new(&[
        r#"{"approved": false, "required_improvements": [{"document": "tasks", "note": "reflect design change"}]}"#,
        APPROVED,
    ]);
    let regen_requirements = Scripted::new(&["# should never be used"]);
    let regen_design = Scripted::owned(vec![format!("{DESIGN}\nsequenceDiagram\n")]);
    let regen_tasks = Scripted::owned(vec![format!("{TASKS}- reflect design change\n")]);

    let controller = controller(
        &h.store,
        &quality,
        &consistency,
        &coordinator,
        &[
            (DocumentKind::Requirements, &regen_requirements),
            (DocumentKind::Design, &regen_design),
            (DocumentKind::Tasks, &regen_tasks),
        ],
        max_iterations(3),
    );

    let summary = controller.run(&mut h.ctx).await.unwrap();

    assert_eq!(summary.termination, Termination::Converged);
    assert_eq!(summary.iterations.len(), 2);
    assert!(summary.improvement_applied);
    assert_eq!(
        summary.updated_files,
        vec![
            h.store.path_for(DocumentKind::Design),
            h.store.path_for(DocumentKind::Tasks)
        ]
    );

    let first = &h.ctx.snapshots()[0];
    let mut expected = BTreeMap::new();
    expected.insert(DocumentKind::Design, vec!["[quality] add sequence diagram".to_string()]);
    expected.insert(DocumentKind::Tasks, vec!["[coordinator] reflect design change".to_string()]);
    assert_eq!(first.feedback_by_doc, expected);

    assert!(regen_requirements.prompts().is_empty());
    assert_eq!(
        h.store.read(DocumentKind::Requirements).unwrap().unwrap(),
        REQUIREMENTS
    );
    assert!(h
        .store
        .read(DocumentKind::Design)
        .unwrap()
        .unwrap()
        .contains("sequenceDiagram"));

    // Nothing raised in iteration 2, so both applied notes are now verified
    let design_records = h.ctx.tracker().records(DocumentKind::Design);
    assert_eq!(design_records.len(), 1);
    assert_eq!(design_records[0].status, FeedbackStatus::Verified);
    assert_eq!(h.ctx.tracker().pending_count(), 0);
}

#[tokio::test]
async fn test_verified_feedback_is_not_resent() {
    let mut h = harness(ServiceType::Web, &[(DocumentKind::Requirements, REQUIREMENTS)]);

    let quality = Scripted::new(&[
        r#"{"overall": 55, "needs_improvement": true, "feedback": [{"document": "requirements", "note": "add password policy"}]}"#,
        r#"{"overall": 65, "needs_improvement": true, "feedback": [{"document": "requirements", "note": "add audit logging"}]}"#,
        r#"{"overall": 68, "needs_improvement": true, "feedback": [{"document": "requirements", "note": "add rate limits"}]}"#,
    ]);
    let consistency = Scripted::new(&[NO_ISSUES]);
    let coordinator = Scripted::new(&[NOT_APPROVED]);
    let regen = Scripted::owned(vec![
        format!("{REQUIREMENTS}\nPasswords: min 12 chars.\n"),
        format!("{REQUIREMENTS}\nPasswords: min 12 chars.\nAudit: every write.\n"),
        format!("{REQUIREMENTS}\nPasswords: min 12 chars.\nAudit: every write.\nRate: 100/min.\n"),
    ]);

    let controller = controller(
        &h.store,
        &quality,
        &consistency,
        &coordinator,
        &[(DocumentKind::Requirements, &regen)],
        max_iterations(3),
    );

    let summary = controller.run(&mut h.ctx).await.unwrap();
    assert_eq!(summary.termination, Termination::Exhausted);
    assert_eq!(summary.iterations.len(), 3);

    let prompts = regen.prompts();
    assert_eq!(prompts.len(), 3);
    assert!(prompts[0].contains("add password policy"));
    assert!(prompts[1].contains("add audit logging"));
    assert!(!prompts[1].contains("add password policy"));
    assert!(!prompts[2].contains("add password policy"));

    // The coordinator is told about verified fixes once they exist
    let coordinator_prompts = coordinator.prompts();
    assert!(!coordinator_prompts[0].contains("Improvements already applied"));
    assert!(coordinator_prompts[2].contains("Improvements already applied"));
    assert!(coordinator_prompts[2].contains("add password policy"));

    let records = h.ctx.tracker().records(DocumentKind::Requirements);
    let status = |note: &str| {
        records
            .iter()
            .find(|r| r.note == format!("[quality] {note}"))
            .map(|r| r.status)
    };
    assert_eq!(status("add password policy"), Some(FeedbackStatus::Verified));
    assert_eq!(status("add audit logging"), Some(FeedbackStatus::Verified));
    assert_eq!(status("add rate limits"), Some(FeedbackStatus::Pending));
}

#[tokio::test]
async fn test_repeated_note_is_retried_until_exhausted() {
    let mut h = harness(ServiceType::Web, &[(DocumentKind::Design, DESIGN)]);

    let quality = Scripted::new(&[
        r#"{"overall": 40, "needs_improvement": true, "feedback": [{"documents": ["design.md"], "note": "expand data model"}]}"#,
    ]);
    let consistency = Scripted::new(&[NO_ISSUES]);
    let coordinator = Scripted::new(&[NOT_APPROVED]);
    let regen = Scripted::owned(vec![format!("{DESIGN}\nv1\n"), format!("{DESIGN}\nv2\n")]);

    let controller = controller(
        &h.store,
        &quality,
        &consistency,
        &coordinator,
        &[(DocumentKind::Design, &regen)],
        max_iterations(2),
    );

    let summary = controller.run(&mut h.ctx).await.unwrap();

    assert_eq!(summary.termination, Termination::Exhausted);
    assert_eq!(summary.iterations.len(), 2);
    assert_eq!(regen.prompts().len(), 2);
    assert_eq!(summary.updated_files, vec![h.store.path_for(DocumentKind::Design)]);
    assert_eq!(h.ctx.tracker().pending_count(), 1);
    assert_eq!(summary.metrics.documents_saved, 2);
}

#[tokio::test]
async fn test_identical_regeneration_stalls() {
    let mut h = harness(ServiceType::Web, &[(DocumentKind::Design, DESIGN)]);

    let quality = Scripted::new(&[
        r#"{"overall": 50, "needs_improvement": true, "feedback": [{"documents": ["design"], "note": "clarify caching"}]}"#,
    ]);
    let consistency = Scripted::new(&[NO_ISSUES]);
    let coordinator = Scripted::new(&[NOT_APPROVED]);
    let regen = Scripted::new(&[DESIGN]);

    let controller = controller(
        &h.store,
        &quality,
        &consistency,
        &coordinator,
        &[(DocumentKind::Design, &regen)],
        max_iterations(3),
    );

    let summary = controller.run(&mut h.ctx).await.unwrap();

    assert_eq!(summary.termination, Termination::Stalled(StallReason::NoUpdate));
    assert_eq!(summary.iterations.len(), 1);
    assert!(!summary.improvement_applied);
    assert_eq!(summary.metrics.unchanged_regenerations, 1);
    assert_eq!(h.store.read(DocumentKind::Design).unwrap().unwrap(), DESIGN);
    assert!(h.ctx.tracker().is_empty());
}

#[tokio::test]
async fn test_invalid_regeneration_keeps_previous_content() {
    let mut h = harness(ServiceType::Web, &[(DocumentKind::Tasks, TASKS)]);

    let quality = Scripted::new(&[
        r#"{"overall": 50, "needs_improvement": true, "feedback": [{"documents": ["tasks"], "note": "split epics"}]}"#,
    ]);
    let consistency = Scripted::new(&[NO_ISSUES]);
    let coordinator = Scripted::new(&[NOT_APPROVED]);
    let regen = Scripted::new(&["# Epic\nno other sections\n"]);

    let controller = controller(
        &h.store,
        &quality,
        &consistency,
        &coordinator,
        &[(DocumentKind::Tasks, &regen)],
        max_iterations(3),
    );

    let summary = controller.run(&mut h.ctx).await.unwrap();

    assert_eq!(summary.termination, Termination::Stalled(StallReason::NoUpdate));
    assert_eq!(summary.metrics.validation_failures, 1);
    assert_eq!(h.store.read(DocumentKind::Tasks).unwrap().unwrap(), TASKS);
}

#[tokio::test]
async fn test_unattributed_feedback_is_broadcast() {
    let mut h = harness(
        ServiceType::Web,
        &[
            (DocumentKind::Requirements, REQUIREMENTS),
            (DocumentKind::Design, DESIGN),
        ],
    );

    let quality = Scripted::new(&[
        r#"{"overall": 50, "needs_improvement": true, "feedback": ["tighten terminology"]}"#,
    ]);
    let consistency = Scripted::new(&[NO_ISSUES]);
    let coordinator = Scripted::new(&[NOT_APPROVED]);
    let regen_requirements = Scripted::owned(vec![format!("{REQUIREMENTS}\nGlossary added.\n")]);
    let regen_design = Scripted::owned(vec![format!("{DESIGN}\nGlossary added.\n")]);

    let controller = controller(
        &h.store,
        &quality,
        &consistency,
        &coordinator,
        &[
            (DocumentKind::Requirements, &regen_requirements),
            (DocumentKind::Design, &regen_design),
        ],
        max_iterations(1),
    );

    let summary = controller.run(&mut h.ctx).await.unwrap();

    assert_eq!(summary.termination, Termination::Exhausted);
    assert_eq!(
        summary.updated_files,
        vec![
            h.store.path_for(DocumentKind::Requirements),
            h.store.path_for(DocumentKind::Design)
        ]
    );
    let feedback = &h.ctx.snapshots()[0].feedback_by_doc;
    assert_eq!(feedback.len(), 2);
    assert_eq!(
        feedback[&DocumentKind::Design],
        vec!["[quality] tighten terminology".to_string()]
    );
    assert!(!feedback.contains_key(&DocumentKind::Tasks));
}

#[tokio::test]
async fn test_prose_wrapped_and_literal_replies_converge() {
    let mut h = harness(ServiceType::Web, &[(DocumentKind::Design, DESIGN)]);

    let quality = Scripted::new(&[
        r#"Here is my result: {"overall": 88, "needs_improvement": false, "feedback": []} Thanks."#,
    ]);
    let consistency = Scripted::new(&[NO_ISSUES]);
    let coordinator = Scripted::new(&["{'approved': True, 'decision': 'approve', 'message': None}"]);
    let regen = Scripted::new(&["# unused"]);

    let controller = controller(
        &h.store,
        &quality,
        &consistency,
        &coordinator,
        &[(DocumentKind::Design, &regen)],
        max_iterations(3),
    );

    let summary = controller.run(&mut h.ctx).await.unwrap();

    assert_eq!(summary.termination, Termination::Converged);
    assert_eq!(summary.iterations.len(), 1);
    assert_eq!(summary.iterations[0].quality.overall, Some(88.0));
    assert!(summary.iterations[0].coordinator.approved);
    assert!(regen.prompts().is_empty());
    assert!(!summary.improvement_applied);
}

#[tokio::test]
async fn test_review_failures_do_not_abort_the_run() {
    let mut h = harness(ServiceType::Web, &[(DocumentKind::Design, DESIGN)]);

    let quality = Scripted::failing("connection reset");
    let consistency = Scripted::new(&["Looks consistent to me."]);
    let coordinator = Scripted::new(&[NOT_APPROVED]);
    let regen = Scripted::new(&["# unused"]);

    let controller = controller(
        &h.store,
        &quality,
        &consistency,
        &coordinator,
        &[(DocumentKind::Design, &regen)],
        max_iterations(3),
    );

    let summary = controller.run(&mut h.ctx).await.unwrap();

    assert_eq!(
        summary.termination,
        Termination::Stalled(StallReason::NoActionableFeedback)
    );
    assert_eq!(summary.metrics.review_calls, 3);
    let record = &summary.iterations[0];
    assert_eq!(record.quality.overall, None);
    assert_eq!(
        record.consistency.raw_response.as_deref(),
        Some("Looks consistent to me.")
    );
}

#[tokio::test]
async fn test_empty_output_dir_stalls_without_reviews() {
    let mut h = harness(ServiceType::Api, &[]);

    let quality = Scripted::new(&[PASSING_QUALITY]);
    let consistency = Scripted::new(&[NO_ISSUES]);
    let coordinator = Scripted::new(&[APPROVED]);

    let controller = controller(&h.store, &quality, &consistency, &coordinator, &[], max_iterations(3));
    let summary = controller.run(&mut h.ctx).await.unwrap();

    assert_eq!(summary.termination, Termination::Stalled(StallReason::NoDocuments));
    assert!(summary.iterations.is_empty());
    assert!(quality.prompts().is_empty());
}

#[tokio::test]
async fn test_missing_output_dir_is_an_error() {
    let mut h = harness(ServiceType::Web, &[(DocumentKind::Design, DESIGN)]);
    fs::remove_dir_all(h.store.output_dir()).unwrap();

    let quality = Scripted::new(&[PASSING_QUALITY]);
    let consistency = Scripted::new(&[NO_ISSUES]);
    let coordinator = Scripted::new(&[APPROVED]);

    let controller = controller(&h.store, &quality, &consistency, &coordinator, &[], max_iterations(3));
    assert!(controller.run(&mut h.ctx).await.is_err());
}

#[tokio::test]
async fn test_api_contract_reply_is_normalized() {
    let mut h = harness(
        ServiceType::Api,
        &[(
            DocumentKind::ApiContract,
            r#"{"openapi": "3.1.0", "info": {"title": "Svc", "version": "1"}, "paths": {}}"#,
        )],
    );

    let quality = Scripted::new(&[
        r#"{"overall": 40, "needs_improvement": true, "feedback": [{"documents": ["openapi"], "note": "add /health"}]}"#,
    ]);
    let consistency = Scripted::new(&[NO_ISSUES]);
    let coordinator = Scripted::new(&[NOT_APPROVED]);
    let regen = Scripted::new(&[
        "```json\n{openapi: \"3.1.0\", info: {title: \"Svc\", version: \"1\"}, paths: {\"/health\": {}}}\n```",
    ]);

    let controller = controller(
        &h.store,
        &quality,
        &consistency,
        &coordinator,
        &[(DocumentKind::ApiContract, &regen)],
        max_iterations(1),
    );

    let summary = controller.run(&mut h.ctx).await.unwrap();
    assert!(summary.improvement_applied);

    let saved = h.store.read(DocumentKind::ApiContract).unwrap().unwrap();
    let value: serde_json::Value = serde_json::from_str(&saved).unwrap();
    assert!(value["paths"].get("/health").is_some());
}

#[tokio::test]
async fn test_snapshots_and_tracker_are_persisted() {
    let mut h = harness(ServiceType::Web, &[(DocumentKind::Design, DESIGN)]);
    let output_dir = h.store.output_dir().to_path_buf();

    let quality = Scripted::new(&[
        r#"{"overall": 50, "needs_improvement": true, "feedback": [{"documents": ["design"], "note": "add failure modes"}]}"#,
    ]);
    let consistency = Scripted::new(&[NO_ISSUES]);
    let coordinator = Scripted::new(&[NOT_APPROVED]);
    let regen = Scripted::owned(vec![format!("{DESIGN}\nFailure modes.\n")]);

    let settings = ControllerSettings {
        max_iterations: 1,
        snapshot_log: Some(snapshot_log_path(&output_dir)),
        tracker_path: Some(tracker_path(&output_dir)),
        ..Default::default()
    };
    let controller = controller(
        &h.store,
        &quality,
        &consistency,
        &coordinator,
        &[(DocumentKind::Design, &regen)],
        settings,
    );

    let summary = controller.run(&mut h.ctx).await.unwrap();

    let snapshots = SnapshotLog::new(snapshot_log_path(&output_dir)).read_all().unwrap();
    assert_eq!(snapshots.len(), summary.iterations.len());
    assert_eq!(snapshots[0].applied_files, summary.updated_files);

    let tracker = FeedbackTracker::load(&tracker_path(&output_dir)).unwrap();
    let records = tracker.records(DocumentKind::Design);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].note, "[quality] add failure modes");
    assert_eq!(records[0].status, FeedbackStatus::Pending);
    assert_eq!(records[0].iteration, Some(1));
}
