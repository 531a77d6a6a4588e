// Refinement module
// The bounded evaluate → refine loop and the state it carries

pub mod context;
pub mod controller;
pub mod executor;
pub mod snapshot;
pub mod tracker;

pub use context::{ProjectInfo, RunMetrics, WorkflowContext};
pub use controller::{
    should_continue, ControllerSettings, CycleSummary, IterationController, IterationRecord,
    Reviewers, StallReason, Termination,
};
pub use executor::{content_hash, process_regenerated, RefineOutcome, RefinementExecutor};
pub use snapshot::{IterationSnapshot, SnapshotLog};
pub use tracker::{FeedbackRecord, FeedbackStatus, FeedbackTracker, TrackerUpdate};

use std::path::{Path, PathBuf};

/// Run state kept next to the documents
pub const STATE_DIR: &str = ".specforge";

pub fn tracker_path(output_dir: &Path) -> PathBuf {
    output_dir.join(STATE_DIR).join("feedback.json")
}

pub fn snapshot_log_path(output_dir: &Path) -> PathBuf {
    output_dir.join(STATE_DIR).join("iterations.jsonl")
}
