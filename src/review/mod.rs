// Review module
// Turns reviewer replies into typed reports and per-document feedback

pub mod aggregator;
pub mod interpreter;
pub mod literal;
pub mod prompts;
pub mod reports;

pub use aggregator::{aggregate_feedback, note_count, FeedbackByDoc, FeedbackSource};
pub use interpreter::{
    interpret_response, parse_structured, InterpretError, Interpretation, ParseStage,
};
pub use reports::{ConsistencyReport, CoordinatorDecision, FeedbackItem, QualityReport, Severity};
