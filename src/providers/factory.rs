// Provider factory
//
// Creates one generator per role from the configured provider entries

use anyhow::{bail, Context, Result};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use super::claude::ClaudeGenerator;
use super::openai::OpenAiGenerator;
use super::TextGenerator;
use crate::config::{Config, ProviderEntry};
use crate::documents::DocumentKind;

/// Who a generator works for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Quality,
    Consistency,
    Coordinator,
    Regenerate(DocumentKind),
}

impl Role {
    /// Key used in the `[roles]` config table
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Quality => "quality",
            Role::Consistency => "consistency",
            Role::Coordinator => "coordinator",
            Role::Regenerate(kind) => kind.as_str(),
        }
    }

    pub fn system_prompt(self) -> String {
        match self {
            Role::Quality => "You are a specification quality reviewer. Score completeness, \
                consistency, clarity and technical accuracy from 0 to 100 and reply with JSON only."
                .to_string(),
            Role::Consistency => "You cross-check a set of specification documents for \
                contradictions, broken references and naming conflicts. Reply with JSON only."
                .to_string(),
            Role::Coordinator => "You coordinate specification reviews and decide whether the \
                document set is ready. Reply with JSON only and never re-request resolved items."
                .to_string(),
            Role::Regenerate(DocumentKind::ApiContract) => "You maintain an OpenAPI 3.1 contract. \
                Return the complete contract as a single JSON object and nothing else."
                .to_string(),
            Role::Regenerate(kind) => format!(
                "You maintain the {} document of a software specification. Return the complete \
                 markdown document and nothing else.",
                kind
            ),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Create a generator from a provider entry, primed for `role`.
pub fn create_generator(entry: &ProviderEntry, role: Role) -> Result<Arc<dyn TextGenerator>> {
    if entry.api_key().trim().is_empty() {
        bail!("Provider '{}' has an empty api_key", entry.display_name());
    }

    match entry {
        ProviderEntry::Openai {
            api_key,
            model,
            base_url,
            temperature,
            ..
        } => {
            let mut generator = OpenAiGenerator::new(api_key.clone())?
                .with_system_prompt(role.system_prompt())
                .with_name(format!("{}:{}", entry.display_name(), role));
            if let Some(m) = model {
                generator = generator.with_model(m.clone());
            }
            if let Some(url) = base_url {
                generator = generator.with_base_url(url.clone());
            }
            if let Some(t) = temperature {
                generator = generator.with_temperature(*t);
            }
            Ok(Arc::new(generator))
        }

        ProviderEntry::Claude {
            api_key,
            model,
            base_url,
            temperature,
            ..
        } => {
            let mut generator = ClaudeGenerator::new(api_key.clone())?
                .with_system_prompt(role.system_prompt())
                .with_name(format!("{}:{}", entry.display_name(), role));
            if let Some(m) = model {
                generator = generator.with_model(m.clone());
            }
            if let Some(url) = base_url {
                generator = generator.with_base_url(url.clone());
            }
            if let Some(t) = temperature {
                generator = generator.with_temperature(*t);
            }
            Ok(Arc::new(generator))
        }
    }
}

/// Every generator the refinement loop needs
#[derive(Clone)]
pub struct RoleGenerators {
    pub quality: Arc<dyn TextGenerator>,
    pub consistency: Arc<dyn TextGenerator>,
    pub coordinator: Arc<dyn TextGenerator>,
    pub regenerators: BTreeMap<DocumentKind, Arc<dyn TextGenerator>>,
}

/// Build the reviewers and one regenerator per document in `documents`.
pub fn create_role_generators(config: &Config, documents: &[DocumentKind]) -> Result<RoleGenerators> {
    if config.providers.is_empty() {
        bail!(
            "No providers configured. Add a [[providers]] entry to ~/.specforge/config.toml \
             or set OPENAI_API_KEY."
        );
    }

    let build = |role: Role| -> Result<Arc<dyn TextGenerator>> {
        let entry = config
            .provider_for(role.as_str())
            .with_context(|| format!("No provider available for role '{}'", role))?;
        create_generator(entry, role)
            .with_context(|| format!("Failed to create provider for role '{}'", role))
    };

    let mut regenerators = BTreeMap::new();
    for &kind in documents {
        regenerators.insert(kind, build(Role::Regenerate(kind))?);
    }

    Ok(RoleGenerators {
        quality: build(Role::Quality)?,
        consistency: build(Role::Consistency)?,
        coordinator: build(Role::Coordinator)?,
        regenerators,
    })
}
