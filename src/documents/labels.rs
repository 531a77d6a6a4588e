// Document label normalization
//
// Reviewers refer to documents inconsistently ("REQ doc", "API spec",
// "architecture", "design.md"). Labels are reduced to an alphanumeric key and
// looked up in a fixed alias table.

use super::DocumentKind;

/// Words that carry no information about which document is meant.
const NOISE_WORDS: [&str; 3] = ["document", "doc", "section"];

const ALIASES: &[(&str, DocumentKind)] = &[
    ("requirements", DocumentKind::Requirements),
    ("requirement", DocumentKind::Requirements),
    ("req", DocumentKind::Requirements),
    ("reqs", DocumentKind::Requirements),
    ("functionalrequirements", DocumentKind::Requirements),
    ("design", DocumentKind::Design),
    ("architecture", DocumentKind::Design),
    ("systemdesign", DocumentKind::Design),
    ("designdoc", DocumentKind::Design),
    ("tasks", DocumentKind::Tasks),
    ("task", DocumentKind::Tasks),
    ("workplan", DocumentKind::Tasks),
    ("workbreakdown", DocumentKind::Tasks),
    ("taskplan", DocumentKind::Tasks),
    ("changes", DocumentKind::Changes),
    ("change", DocumentKind::Changes),
    ("releaseplan", DocumentKind::Changes),
    ("deploymentplan", DocumentKind::Changes),
    ("changemanagement", DocumentKind::Changes),
    ("openapi", DocumentKind::ApiContract),
    ("apispec", DocumentKind::ApiContract),
    ("api", DocumentKind::ApiContract),
    ("apicontract", DocumentKind::ApiContract),
];

/// Map a free-form label onto a canonical document kind.
///
/// Returns `None` for labels that name no known document ("general",
/// "overall", empty strings); callers treat that as "no explicit target".
pub fn normalize_label(raw: &str) -> Option<DocumentKind> {
    let mut lowered = raw.trim().to_lowercase();
    if lowered.is_empty() {
        return None;
    }

    for ext in [".md", ".json"] {
        lowered = lowered.replace(ext, "");
    }
    for word in NOISE_WORDS {
        lowered = lowered.replace(word, "");
    }

    let compact: String = lowered
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        .collect();

    lookup(&compact).or_else(|| lookup(lowered.trim()))
}

/// Normalize a list of labels, dropping unknown ones and collapsing duplicates.
///
/// Order of first appearance is kept.
pub fn normalize_labels<S: AsRef<str>>(labels: &[S]) -> Vec<DocumentKind> {
    let mut kinds = Vec::new();
    for label in labels {
        if let Some(kind) = normalize_label(label.as_ref()) {
            if !kinds.contains(&kind) {
                kinds.push(kind);
            }
        }
    }
    kinds
}

fn lookup(key: &str) -> Option<DocumentKind> {
    if key.is_empty() {
        return None;
    }
    ALIASES
        .iter()
        .find(|(alias, _)| *alias == key)
        .map(|(_, kind)| *kind)
}
