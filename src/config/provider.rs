// Provider entry: one configured text-generation backend

use serde::{Deserialize, Serialize};

/// A single provider entry.
///
/// Serializes with a `type` tag, e.g.:
/// ```toml
/// [[providers]]
/// type = "openai"
/// api_key = "sk-..."
/// model = "gpt-4o"
///
/// [[providers]]
/// type = "claude"
/// api_key = "sk-ant-..."
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProviderEntry {
    Openai {
        api_key: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        model: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        base_url: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        temperature: Option<f32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },
    Claude {
        api_key: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        model: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        base_url: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        temperature: Option<f32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },
}

impl ProviderEntry {
    /// Human-readable name for logs.
    pub fn display_name(&self) -> &str {
        match self {
            Self::Openai { name, .. } => name.as_deref().unwrap_or("OpenAI"),
            Self::Claude { name, .. } => name.as_deref().unwrap_or("Claude"),
        }
    }

    pub fn api_key(&self) -> &str {
        match self {
            Self::Openai { api_key, .. } | Self::Claude { api_key, .. } => api_key,
        }
    }
}
