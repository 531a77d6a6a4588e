// Prompt builders for the review and regeneration calls
//
// Reviewers receive the document list (file name and absolute path) followed
// by each document's current content; each prompt names the JSON keys its
// reply must carry.

use serde_json::json;
use std::collections::BTreeMap;
use std::path::Path;

use super::reports::{ConsistencyReport, QualityReport};
use crate::documents::{Document, DocumentKind};

/// Document list plus contents, shared by all three review prompts.
pub fn review_payload(output_dir: &Path, documents: &BTreeMap<DocumentKind, Document>) -> String {
    let mut out = format!("Documents in {}:\n", output_dir.display());
    for doc in documents.values() {
        out.push_str(&format!("- {}: {}\n", doc.kind.file_name(), doc.path.display()));
    }
    for doc in documents.values() {
        let fence = if doc.kind.is_markdown() { "markdown" } else { "json" };
        out.push_str(&format!(
            "\n===== {} ({}) =====\n```{}\n{}\n```\n",
            doc.kind.file_name(),
            doc.path.display(),
            fence,
            doc.content.trim_end()
        ));
    }
    out
}

pub fn quality_review_prompt(payload: &str) -> String {
    format!(
        "Review the generated specification documents below for quality.\n\n\
         {payload}\n\
         Respond with JSON only. Required keys: completeness, consistency, clarity, \
         technical, overall (numbers 0-100), feedback (array of objects with \
         `document` and `note`; write each note as [location / problem / action]), \
         needs_improvement (boolean)."
    )
}

pub fn consistency_review_prompt(payload: &str) -> String {
    format!(
        "Cross-check the specification documents below against each other. \
         Respond with JSON only.\n\n\
         {payload}\n\
         Required JSON keys: issues (array of objects with `document` and `note`; \
         write each note as [location / mismatch / action]), severity (low|medium|high), \
         cross_references (integer), naming_conflicts (integer)."
    )
}

/// Coordinator prompt. `applied` lists feedback already verified as fixed so
/// the coordinator does not ask for it again.
pub fn coordinator_prompt(
    payload: &str,
    quality: &QualityReport,
    consistency: &ConsistencyReport,
    applied: &BTreeMap<DocumentKind, Vec<String>>,
) -> String {
    let quality_json = pretty(quality);
    let consistency_json = pretty(consistency);

    let applied_section = if applied.values().any(|notes| !notes.is_empty()) {
        format!(
            "Improvements already applied (JSON):\n{}\n\
             Do not ask for any of the items above again.\n\n",
            pretty(applied)
        )
    } else {
        String::new()
    };

    format!(
        "Below are the generated documents and the earlier review results. \
         Decide whether the specification set is approved and answer in JSON.\n\n\
         {payload}\n\
         Quality review:\n{quality_json}\n\n\
         Consistency review:\n{consistency_json}\n\n\
         {applied_section}\
         JSON keys: approved (boolean), overall_quality (number), decision, \
         required_improvements (array of objects with `document` and `note`), message. \
         Do not repeat requests that are already resolved; list only new improvements."
    )
}

/// Regeneration prompt for one document. Returns `None` when there is nothing
/// to address.
pub fn improvement_prompt(
    document: &Document,
    feedback: &[String],
    required_sections: &[String],
) -> Option<String> {
    if feedback.is_empty() {
        return None;
    }

    let payload: Vec<_> = feedback
        .iter()
        .map(|note| json!({"document": document.kind.as_str(), "note": note}))
        .collect();
    let payload = pretty(&payload);

    let mut lines = vec![
        format!(
            "Rewrite the complete {} document stored at {}.",
            document.kind.file_name(),
            document.path.display()
        ),
        "Apply every improvement listed below; items already addressed should be stated more clearly."
            .to_string(),
    ];

    if document.kind.is_markdown() {
        lines.push(format!(
            "Return the full {} only, with no summary or commentary.",
            document.kind.file_name()
        ));
        if !required_sections.is_empty() {
            lines.push("Keep these required section headings exactly as written:".to_string());
            lines.extend(required_sections.iter().map(|s| format!("- {}", s)));
        }
    } else {
        lines.push(
            "Return the full OpenAPI 3.1 document as a single JSON object, with no commentary."
                .to_string(),
        );
    }

    lines.push(String::new());
    lines.push("Current content:".to_string());
    lines.push(document.content.trim_end().to_string());
    lines.push(String::new());
    lines.push("Improvements (JSON):".to_string());
    lines.push(payload);
    lines.push(String::new());
    lines.push("Check that every item is reflected, then return only the final document.".to_string());

    Some(lines.join("\n") + "\n")
}

fn pretty<T: serde::Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".to_string())
}
