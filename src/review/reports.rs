// Typed reviewer reports
//
// Reviewer output is only loosely shaped: feedback entries may be bare strings
// or objects, targets may sit under `documents` or `document`, the note under
// `note`, `message` or `detail`, and scores may arrive as strings. Everything
// is read leniently; missing fields get neutral defaults.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::interpreter::RAW_RESPONSE_KEY;

/// One reviewer note, optionally aimed at specific documents
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackItem {
    /// Raw target labels as the reviewer wrote them
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub documents: Vec<String>,
    pub note: String,
}

impl FeedbackItem {
    pub fn new(documents: &[&str], note: impl Into<String>) -> Self {
        Self {
            documents: documents.iter().map(|d| d.to_string()).collect(),
            note: note.into(),
        }
    }

    /// Entry with no explicit target
    pub fn general(note: impl Into<String>) -> Self {
        Self {
            documents: Vec::new(),
            note: note.into(),
        }
    }

    /// Read one feedback entry; `None` when it carries no usable note.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Object(obj) => {
                let note = ["note", "message", "detail"]
                    .iter()
                    .filter_map(|key| obj.get(*key))
                    .find(|v| is_truthy(v))
                    .and_then(note_text)?;
                let documents = ["documents", "document"]
                    .iter()
                    .filter_map(|key| obj.get(*key))
                    .find(|v| is_truthy(v))
                    .map(target_labels)
                    .unwrap_or_default();
                Some(Self { documents, note })
            }
            Value::Null => None,
            other => note_text(other).map(Self::general),
        }
    }
}

/// Output of the quality reviewer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    pub completeness: Option<f64>,
    pub consistency: Option<f64>,
    pub clarity: Option<f64>,
    pub technical: Option<f64>,
    pub overall: Option<f64>,
    #[serde(default)]
    pub feedback: Vec<FeedbackItem>,
    #[serde(default)]
    pub needs_improvement: bool,
    /// Original text when the response could not be parsed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_response: Option<String>,
}

impl QualityReport {
    pub fn from_map(map: &Map<String, Value>) -> Self {
        Self {
            completeness: score(map.get("completeness")),
            consistency: score(map.get("consistency")),
            clarity: score(map.get("clarity")),
            technical: score(map.get("technical")),
            overall: score(map.get("overall")),
            feedback: items(map.get("feedback")),
            needs_improvement: map.get("needs_improvement").is_some_and(is_truthy),
            raw_response: raw(map),
        }
    }
}

/// Overall severity reported by the consistency reviewer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    fn parse(value: &Value) -> Option<Self> {
        match value.as_str()?.trim().to_lowercase().as_str() {
            "low" => Some(Severity::Low),
            "medium" => Some(Severity::Medium),
            "high" => Some(Severity::High),
            _ => None,
        }
    }
}

/// Output of the cross-document consistency reviewer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConsistencyReport {
    #[serde(default)]
    pub issues: Vec<FeedbackItem>,
    pub severity: Option<Severity>,
    #[serde(default)]
    pub cross_references: u32,
    #[serde(default)]
    pub naming_conflicts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_response: Option<String>,
}

impl ConsistencyReport {
    pub fn from_map(map: &Map<String, Value>) -> Self {
        Self {
            issues: items(map.get("issues")),
            severity: map.get("severity").and_then(Severity::parse),
            cross_references: count(map.get("cross_references")),
            naming_conflicts: count(map.get("naming_conflicts")),
            raw_response: raw(map),
        }
    }
}

/// Final approval decision from the coordinator
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CoordinatorDecision {
    /// A missing or unreadable value counts as not approved
    #[serde(default)]
    pub approved: bool,
    pub overall_quality: Option<f64>,
    #[serde(default)]
    pub decision: String,
    #[serde(default)]
    pub required_improvements: Vec<FeedbackItem>,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_response: Option<String>,
}

impl CoordinatorDecision {
    pub fn from_map(map: &Map<String, Value>) -> Self {
        Self {
            approved: map.get("approved").is_some_and(is_truthy),
            overall_quality: number(map.get("overall_quality")),
            decision: text(map.get("decision")),
            required_improvements: items(map.get("required_improvements")),
            message: text(map.get("message")),
            raw_response: raw(map),
        }
    }
}

// ── Lenient field readers ──────────────────────────────────────────────────────

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => matches!(
            s.trim().to_lowercase().as_str(),
            "true" | "yes" | "y" | "1" | "approved"
        ),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

fn note_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Null => return None,
        Value::Object(_) | Value::Array(_) => serde_json::to_string(value).ok()?,
        other => other.to_string(),
    };
    (!text.is_empty()).then_some(text)
}

fn target_labels(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items.iter().flat_map(target_labels).collect(),
        Value::String(s) if !s.trim().is_empty() => vec![s.trim().to_string()],
        Value::Null | Value::String(_) => Vec::new(),
        other => vec![other.to_string()],
    }
}

fn items(value: Option<&Value>) -> Vec<FeedbackItem> {
    match value {
        Some(Value::Array(entries)) => entries.iter().filter_map(FeedbackItem::from_value).collect(),
        Some(single @ (Value::String(_) | Value::Object(_))) => {
            FeedbackItem::from_value(single).into_iter().collect()
        }
        _ => Vec::new(),
    }
}

fn number(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().trim_end_matches('%').trim().parse().ok(),
        _ => None,
    }
}

/// A 0-100 score; out-of-range values are clamped.
fn score(value: Option<&Value>) -> Option<f64> {
    number(value).map(|v| v.clamp(0.0, 100.0))
}

fn count(value: Option<&Value>) -> u32 {
    number(value)
        .filter(|v| v.is_finite() && *v > 0.0)
        .map(|v| v as u32)
        .unwrap_or(0)
}

fn text(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

fn raw(map: &Map<String, Value>) -> Option<String> {
    map.get(RAW_RESPONSE_KEY)
        .and_then(Value::as_str)
        .map(str::to_string)
}
