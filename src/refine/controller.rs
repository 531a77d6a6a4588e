// Iteration controller: evaluate → decide → refine, bounded by max_iterations
//
// Each pass re-loads documents from the store, runs the three reviewers in
// sequence (the coordinator sees the other two results), reconciles feedback
// with the tracker, and either stops or hands the remaining feedback to the
// executor. Only a failed initial load is an error; everything later ends the
// loop with a summary.

use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use super::context::{RunMetrics, WorkflowContext};
use super::executor::RefinementExecutor;
use super::snapshot::{IterationSnapshot, SnapshotLog};
use crate::documents::store::load_documents;
use crate::documents::DocumentStore;
use crate::providers::TextGenerator;
use crate::review::prompts::{
    consistency_review_prompt, coordinator_prompt, quality_review_prompt, review_payload,
};
use crate::review::{
    aggregate_feedback, interpret_response, note_count, ConsistencyReport, CoordinatorDecision,
    FeedbackByDoc, QualityReport,
};

/// Why the loop stopped early
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StallReason {
    NoDocuments,
    NoActionableFeedback,
    NoUpdate,
}

/// How the loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum Termination {
    /// Reviewers are satisfied
    Converged,
    /// Iteration limit reached while still refining
    Exhausted,
    Stalled(StallReason),
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Termination::Converged => f.write_str("converged"),
            Termination::Exhausted => f.write_str("exhausted"),
            Termination::Stalled(StallReason::NoDocuments) => f.write_str("stalled (no documents)"),
            Termination::Stalled(StallReason::NoActionableFeedback) => {
                f.write_str("stalled (no actionable feedback)")
            }
            Termination::Stalled(StallReason::NoUpdate) => f.write_str("stalled (no document updated)"),
        }
    }
}

/// Review results for one iteration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationRecord {
    pub iteration: usize,
    pub quality: QualityReport,
    pub consistency: ConsistencyReport,
    pub coordinator: CoordinatorDecision,
}

/// Returned by every run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleSummary {
    pub iterations: Vec<IterationRecord>,
    pub improvement_applied: bool,
    /// Files rewritten across all iterations, deduplicated, first-write order
    pub updated_files: Vec<PathBuf>,
    pub termination: Termination,
    pub metrics: RunMetrics,
}

/// The three review capabilities
#[derive(Clone)]
pub struct Reviewers {
    pub quality: Arc<dyn TextGenerator>,
    pub consistency: Arc<dyn TextGenerator>,
    pub coordinator: Arc<dyn TextGenerator>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ControllerSettings {
    pub max_iterations: usize,
    pub quality_threshold: f64,
    /// Append snapshots here when set
    pub snapshot_log: Option<PathBuf>,
    /// Persist the tracker here after every pass when set
    pub tracker_path: Option<PathBuf>,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            max_iterations: 3,
            quality_threshold: 70.0,
            snapshot_log: None,
            tracker_path: None,
        }
    }
}

/// Continue refining if any reviewer is unhappy.
///
/// A missing `overall` score never trips the threshold rule.
pub fn should_continue(
    quality: &QualityReport,
    coordinator: &CoordinatorDecision,
    quality_threshold: f64,
) -> bool {
    let below_threshold = quality.overall.is_some_and(|overall| overall < quality_threshold);
    quality.needs_improvement || below_threshold || !coordinator.approved
}

struct Evaluation {
    quality: QualityReport,
    consistency: ConsistencyReport,
    coordinator: CoordinatorDecision,
    feedback_by_doc: FeedbackByDoc,
}

pub struct IterationController {
    store: Arc<dyn DocumentStore>,
    reviewers: Reviewers,
    executor: RefinementExecutor,
    settings: ControllerSettings,
    snapshot_log: Option<SnapshotLog>,
}

impl IterationController {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        reviewers: Reviewers,
        executor: RefinementExecutor,
        settings: ControllerSettings,
    ) -> Self {
        let snapshot_log = settings.snapshot_log.clone().map(SnapshotLog::new);
        Self {
            store,
            reviewers,
            executor,
            settings,
            snapshot_log,
        }
    }

    /// Run the refinement loop to completion.
    pub async fn run(&self, ctx: &mut WorkflowContext) -> Result<CycleSummary> {
        let max_iterations = self.settings.max_iterations.max(1);
        let mut records = Vec::new();
        let mut termination = Termination::Exhausted;

        tracing::info!(
            session = %ctx.project().session_id,
            output_dir = %ctx.output_dir().display(),
            max_iterations,
            "Starting quality refinement"
        );

        for iteration in 1..=max_iterations {
            let order = ctx.document_order();
            let documents = match load_documents(self.store.as_ref(), &order) {
                Ok(documents) => documents,
                Err(e) if iteration == 1 => {
                    return Err(e).context("Failed to load documents for refinement");
                }
                Err(e) => {
                    tracing::error!(iteration, "Failed to reload documents: {:#}", e);
                    termination = Termination::Stalled(StallReason::NoDocuments);
                    break;
                }
            };
            if documents.is_empty() {
                tracing::warn!(iteration, "No documents to refine");
                termination = Termination::Stalled(StallReason::NoDocuments);
                break;
            }
            ctx.replace_documents(documents);

            let eval = self.evaluate(ctx, iteration).await;
            records.push(IterationRecord {
                iteration,
                quality: eval.quality.clone(),
                consistency: eval.consistency.clone(),
                coordinator: eval.coordinator.clone(),
            });

            let tracker_update = ctx.tracker_mut().update_with_feedback(&eval.feedback_by_doc);
            let (filtered, skipped) = ctx.tracker().filter_verified(&eval.feedback_by_doc);

            tracing::info!(
                iteration,
                overall = ?eval.quality.overall,
                approved = eval.coordinator.approved,
                notes = note_count(&eval.feedback_by_doc),
                actionable = note_count(&filtered),
                skipped = note_count(&skipped),
                verified = tracker_update.verified.len(),
                "Evaluation complete"
            );

            let mut applied_files = Vec::new();
            let stop = if !should_continue(
                &eval.quality,
                &eval.coordinator,
                self.settings.quality_threshold,
            ) {
                Some(Termination::Converged)
            } else if filtered.is_empty() {
                Some(Termination::Stalled(StallReason::NoActionableFeedback))
            } else {
                applied_files = self.executor.execute(ctx, &filtered, iteration).await;
                if applied_files.is_empty() {
                    Some(Termination::Stalled(StallReason::NoUpdate))
                } else {
                    None
                }
            };

            self.finish_iteration(
                ctx,
                IterationSnapshot {
                    iteration,
                    timestamp: Utc::now(),
                    quality: eval.quality,
                    consistency: eval.consistency,
                    coordinator: eval.coordinator,
                    feedback_by_doc: eval.feedback_by_doc,
                    filtered_feedback: filtered,
                    skipped_feedback: skipped,
                    applied_files,
                    stop_reason: stop.map(|t| t.to_string()),
                },
            );

            if let Some(stop) = stop {
                termination = stop;
                break;
            }
        }

        let summary = CycleSummary {
            iterations: records,
            improvement_applied: ctx.improvement_applied(),
            updated_files: ctx.updated_files().to_vec(),
            termination,
            metrics: ctx.metrics().clone(),
        };

        tracing::info!(
            iterations = summary.iterations.len(),
            updated = summary.updated_files.len(),
            termination = %summary.termination,
            "Quality refinement finished"
        );

        Ok(summary)
    }

    /// Run the three reviewers and aggregate their feedback.
    async fn evaluate(&self, ctx: &mut WorkflowContext, iteration: usize) -> Evaluation {
        let payload = review_payload(ctx.output_dir(), ctx.documents());
        let verified = ctx.tracker().verified_feedback();

        let quality = QualityReport::from_map(
            &self
                .review(ctx, "quality", &self.reviewers.quality, &quality_review_prompt(&payload))
                .await,
        );
        let consistency = ConsistencyReport::from_map(
            &self
                .review(
                    ctx,
                    "consistency",
                    &self.reviewers.consistency,
                    &consistency_review_prompt(&payload),
                )
                .await,
        );
        let coordinator = CoordinatorDecision::from_map(
            &self
                .review(
                    ctx,
                    "coordinator",
                    &self.reviewers.coordinator,
                    &coordinator_prompt(&payload, &quality, &consistency, &verified),
                )
                .await,
        );

        let feedback_by_doc =
            aggregate_feedback(&quality, &consistency, &coordinator, &ctx.loaded_kinds());
        tracing::debug!(iteration, documents = feedback_by_doc.len(), "Feedback aggregated");

        Evaluation {
            quality,
            consistency,
            coordinator,
            feedback_by_doc,
        }
    }

    /// One review call. Failures yield an empty mapping.
    async fn review(
        &self,
        ctx: &mut WorkflowContext,
        name: &str,
        reviewer: &Arc<dyn TextGenerator>,
        prompt: &str,
    ) -> Map<String, Value> {
        ctx.metrics_mut().review_calls += 1;
        match reviewer.generate(prompt).await {
            Ok(text) => interpret_response(name, &text).into_map(),
            Err(e) => {
                tracing::error!(reviewer = name, "Review call failed: {:#}", e);
                Map::new()
            }
        }
    }

    fn finish_iteration(&self, ctx: &mut WorkflowContext, snapshot: IterationSnapshot) {
        if let Some(log) = &self.snapshot_log {
            if let Err(e) = log.append(&snapshot) {
                tracing::warn!("Failed to append iteration snapshot: {:#}", e);
            }
        }
        if let Some(path) = &self.settings.tracker_path {
            if let Err(e) = ctx.tracker().save(path) {
                tracing::warn!("Failed to persist feedback tracker: {:#}", e);
            }
        }
        ctx.record_snapshot(snapshot);
    }
}
