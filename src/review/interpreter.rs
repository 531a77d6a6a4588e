// Response interpreter: recovers structured data from free-text reviewer output
//
// Pipeline:
//   1. strip code fences
//   2. cut out the outermost {...} / [...] span with a quote-aware scanner
//   3. strict JSON
//   4. quote bare object keys, then strict JSON again
//   5. literal-only parser (single quotes, True/False/None)
// Every stage reports success or failure on its own so the pipeline can be
// tested stage by stage. Nothing here panics on malformed input.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use thiserror::Error;

use super::literal::parse_literal;

/// Key under which unparseable text is preserved
pub const RAW_RESPONSE_KEY: &str = "raw_response";

/// Key under which a top-level array is wrapped when a mapping is required
pub const ITEMS_KEY: &str = "items";

static BARE_KEY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"([{,]\s*)([A-Za-z_$][A-Za-z0-9_\-$]*)\s*:"#).expect("valid bare key regex")
});

/// Which stage of the pipeline produced the value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseStage {
    Strict,
    QuotedKeys,
    Literal,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InterpretError {
    #[error("response is empty")]
    Empty,

    #[error("no JSON-like structure could be parsed (strict: {strict}; literal: {literal})")]
    Unparseable { strict: String, literal: String },
}

/// Outcome of interpreting one response
#[derive(Debug, Clone, PartialEq)]
pub enum Interpretation {
    /// Parsed object or array
    Structured { value: Value, stage: ParseStage },
    /// Nothing usable; the trimmed text is kept for the audit trail
    Raw(String),
    Empty,
}

impl Interpretation {
    pub fn is_structured(&self) -> bool {
        matches!(self, Interpretation::Structured { .. })
    }

    /// Collapse into a mapping.
    ///
    /// Objects pass through, arrays are wrapped under `items`, raw text is
    /// wrapped under `raw_response`, and an empty response yields `{}`.
    pub fn into_map(self) -> Map<String, Value> {
        match self {
            Interpretation::Structured {
                value: Value::Object(map),
                ..
            } => map,
            Interpretation::Structured { value, .. } => {
                let mut map = Map::new();
                map.insert(ITEMS_KEY.to_string(), value);
                map
            }
            Interpretation::Raw(text) => {
                let mut map = Map::new();
                map.insert(RAW_RESPONSE_KEY.to_string(), Value::String(text));
                map
            }
            Interpretation::Empty => Map::new(),
        }
    }
}

/// Interpret a reviewer response, falling back to the raw-text sentinel.
///
/// `source` names the reviewer for the warning emitted on fallback.
pub fn interpret_response(source: &str, text: &str) -> Interpretation {
    match parse_structured(text) {
        Ok((value, stage)) => {
            if stage != ParseStage::Strict {
                tracing::debug!(source, ?stage, "Reviewer response needed repair");
            }
            Interpretation::Structured { value, stage }
        }
        Err(InterpretError::Empty) => Interpretation::Empty,
        Err(e) => {
            tracing::warn!(source, "Failed to parse reviewer response; keeping raw text: {}", e);
            Interpretation::Raw(text.trim().to_string())
        }
    }
}

/// Run the full pipeline without the raw fallback.
///
/// Used where malformed output must fail loudly (the API contract).
pub fn parse_structured(text: &str) -> Result<(Value, ParseStage), InterpretError> {
    let stripped = strip_code_fences(text);
    if stripped.is_empty() {
        return Err(InterpretError::Empty);
    }
    let candidate = extract_candidate(stripped);

    let strict_err = match parse_strict(candidate) {
        Ok(value) => return Ok((value, ParseStage::Strict)),
        Err(e) => e,
    };

    let quoted = quote_bare_keys(candidate);
    if quoted != candidate {
        if let Ok(value) = parse_strict(&quoted) {
            return Ok((value, ParseStage::QuotedKeys));
        }
    }

    let literal_err = match parse_literal(candidate) {
        Ok(value) => return Ok((value, ParseStage::Literal)),
        Err(e) => e,
    };
    if quoted != candidate {
        if let Ok(value) = parse_literal(&quoted) {
            return Ok((value, ParseStage::Literal));
        }
    }

    Err(InterpretError::Unparseable {
        strict: strict_err,
        literal: literal_err.to_string(),
    })
}

/// Strip a leading ```lang line and a trailing ``` line, if present.
pub fn strip_code_fences(text: &str) -> &str {
    let mut s = text.trim();
    if s.starts_with("```") {
        s = match s.find('\n') {
            Some(idx) => &s[idx + 1..],
            None => s.trim_start_matches('`').trim_start_matches("json"),
        };
    }
    let trimmed = s.trim_end();
    if let Some(rest) = trimmed.strip_suffix("```") {
        s = rest;
    }
    s.trim()
}

/// Find the span of the first balanced object/array, ignoring brackets
/// inside quoted strings. Prose before and after the span is discarded.
///
/// Falls back to the whole (trimmed) text when no balanced span exists, so
/// the parsers still get a chance to report a precise error.
pub fn extract_candidate(text: &str) -> &str {
    let mut start: Option<usize> = None;
    let mut stack: Vec<char> = Vec::new();
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for (idx, ch) in text.char_indices() {
        if start.is_none() {
            if ch == '{' || ch == '[' {
                start = Some(idx);
                stack.push(if ch == '{' { '}' } else { ']' });
            }
            continue;
        }

        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == q {
                quote = None;
            }
            continue;
        }

        match ch {
            '"' | '\'' => quote = Some(ch),
            '{' => stack.push('}'),
            '[' => stack.push(']'),
            '}' | ']' => {
                if stack.pop() != Some(ch) {
                    return text.trim();
                }
                if stack.is_empty() {
                    let begin = start.unwrap_or(0);
                    return &text[begin..idx + ch.len_utf8()];
                }
            }
            _ => {}
        }
    }

    text.trim()
}

/// Stage 3: strict JSON, objects and arrays only.
fn parse_strict(text: &str) -> Result<Value, String> {
    match serde_json::from_str::<Value>(text) {
        Ok(value @ (Value::Object(_) | Value::Array(_))) => Ok(value),
        Ok(_) => Err("top-level JSON value is not an object or array".to_string()),
        Err(e) => Err(e.to_string()),
    }
}

/// Stage 4: wrap identifiers directly followed by `:` in double quotes.
pub fn quote_bare_keys(text: &str) -> String {
    let normalized = text.replace('\r', "");
    BARE_KEY_RE
        .replace_all(&normalized, r#"$1"$2":"#)
        .into_owned()
}
