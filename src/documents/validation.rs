// Structural validation of document content
//
// Markdown documents must carry their template's required section headings;
// the API contract must be a well-formed OpenAPI 3.1 JSON document.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use super::DocumentKind;

static HEADING_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^[ ]{0,3}(#{1,6})[ \t]+(.+?)[ \t#\r]*$").expect("valid heading regex"));

/// Why a piece of content was rejected
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("{kind} document is empty")]
    Empty { kind: DocumentKind },

    #[error("{kind} is missing required sections: {}", missing.join(", "))]
    MissingSections {
        kind: DocumentKind,
        missing: Vec<String>,
    },

    #[error("API contract is not valid JSON: {0}")]
    InvalidJson(String),

    #[error("API contract is invalid: {0}")]
    InvalidContract(String),
}

/// Result of a successful validation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationReport {
    pub kind: DocumentKind,
    pub required_sections: Vec<String>,
    pub found_sections: Vec<String>,
    /// Always empty on success; failures carry the list in the error
    pub missing_sections: Vec<String>,
    /// Fraction of required sections present (1.0 on success)
    pub compliance_score: f32,
}

/// Structural validator applied to regenerated content before it is saved.
pub trait StructuralValidator: Send + Sync {
    fn validate(&self, kind: DocumentKind, content: &str)
        -> Result<ValidationReport, ValidationError>;

    /// Section headings the regenerated document must keep, for prompts.
    fn required_sections(&self, kind: DocumentKind) -> Vec<String>;
}

/// Validator backed by the built-in document templates
#[derive(Debug, Clone, Default)]
pub struct TemplateValidator;

impl TemplateValidator {
    pub fn new() -> Self {
        Self
    }

    fn template_sections(kind: DocumentKind) -> &'static [&'static str] {
        match kind {
            DocumentKind::Requirements => &[
                "Header/Meta",
                "Scope",
                "Functional Requirements",
                "Error Requirements",
                "Security & Privacy",
                "Observability",
                "Acceptance Criteria",
            ],
            DocumentKind::Design => &[
                "Architecture",
                "Sequence Diagram",
                "Data Model",
                "API Contract",
                "Security & Permissions",
                "Performance Goals",
            ],
            DocumentKind::Tasks => &["Epic", "Story", "Task", "DoD"],
            DocumentKind::Changes => &[
                "Version History",
                "Change Summary",
                "Impact/Risk",
                "Rollback Plan",
                "Known Issues",
            ],
            DocumentKind::ApiContract => &[],
        }
    }

    fn validate_markdown(
        &self,
        kind: DocumentKind,
        content: &str,
    ) -> Result<ValidationReport, ValidationError> {
        let found_sections: Vec<String> = HEADING_RE
            .captures_iter(content)
            .map(|c| c[2].to_string())
            .collect();
        let lowered_headings: Vec<String> = HEADING_RE
            .captures_iter(content)
            .filter(|c| c[1].len() <= 3)
            .map(|c| c[2].to_lowercase())
            .collect();

        let required = Self::template_sections(kind);
        let missing: Vec<String> = required
            .iter()
            .filter(|section| {
                let needle = section.to_lowercase();
                !lowered_headings.iter().any(|h| h.contains(&needle))
            })
            .map(|s| s.to_string())
            .collect();

        if !missing.is_empty() {
            return Err(ValidationError::MissingSections { kind, missing });
        }

        Ok(ValidationReport {
            kind,
            required_sections: required.iter().map(|s| s.to_string()).collect(),
            found_sections,
            missing_sections: Vec::new(),
            compliance_score: 1.0,
        })
    }

    fn validate_contract(&self, content: &str) -> Result<ValidationReport, ValidationError> {
        let spec: Value = serde_json::from_str(content)
            .map_err(|e| ValidationError::InvalidJson(e.to_string()))?;

        let obj = spec
            .as_object()
            .ok_or_else(|| ValidationError::InvalidContract("top level is not an object".into()))?;

        let missing: Vec<&str> = ["openapi", "info", "paths"]
            .into_iter()
            .filter(|field| !obj.contains_key(*field))
            .collect();
        if !missing.is_empty() {
            return Err(ValidationError::InvalidContract(format!(
                "missing required fields: {}",
                missing.join(", ")
            )));
        }

        let version = obj["openapi"].as_str().unwrap_or_default();
        if !version.starts_with("3.1") {
            return Err(ValidationError::InvalidContract(format!(
                "expected OpenAPI 3.1.x, got: {}",
                if version.is_empty() { "<none>" } else { version }
            )));
        }

        let info = &obj["info"];
        let has_title = info.get("title").and_then(Value::as_str).is_some_and(|s| !s.is_empty());
        let has_version = info.get("version").and_then(Value::as_str).is_some_and(|s| !s.is_empty());
        if !has_title || !has_version {
            return Err(ValidationError::InvalidContract(
                "info section must contain title and version".into(),
            ));
        }

        let found_sections = obj
            .get("paths")
            .and_then(Value::as_object)
            .map(|paths| paths.keys().cloned().collect())
            .unwrap_or_default();

        Ok(ValidationReport {
            kind: DocumentKind::ApiContract,
            required_sections: vec!["openapi".into(), "info".into(), "paths".into()],
            found_sections,
            missing_sections: Vec::new(),
            compliance_score: 1.0,
        })
    }
}

impl StructuralValidator for TemplateValidator {
    fn validate(
        &self,
        kind: DocumentKind,
        content: &str,
    ) -> Result<ValidationReport, ValidationError> {
        if content.trim().is_empty() {
            return Err(ValidationError::Empty { kind });
        }
        if kind.is_markdown() {
            self.validate_markdown(kind, content)
        } else {
            self.validate_contract(content)
        }
    }

    fn required_sections(&self, kind: DocumentKind) -> Vec<String> {
        Self::template_sections(kind)
            .iter()
            .map(|s| s.to_string())
            .collect()
    }
}
