// Configuration structs

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use super::provider::ProviderEntry;
use crate::documents::ServiceType;

/// Role names accepted in the `[roles]` table
pub const ROLE_NAMES: [&str; 8] = [
    "quality",
    "consistency",
    "coordinator",
    "requirements",
    "design",
    "tasks",
    "changes",
    "api_contract",
];

fn default_max_iterations() -> usize {
    3
}

fn default_quality_threshold() -> f64 {
    70.0
}

fn default_consistency_threshold() -> f64 {
    75.0
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("specs")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

/// Refinement loop settings (`[refinement]`)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RefinementConfig {
    /// Upper bound on evaluate/refine passes
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    /// Quality `overall` score below which refinement continues
    #[serde(default = "default_quality_threshold")]
    pub quality_threshold: f64,

    /// Reported alongside results; not part of the stop rule
    #[serde(default = "default_consistency_threshold")]
    pub consistency_threshold: f64,

    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    #[serde(default)]
    pub service_type: ServiceType,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Append iteration snapshots to `.specforge/iterations.jsonl`
    #[serde(default = "default_true")]
    pub snapshot_log: bool,

    /// Persist tracker state to `.specforge/feedback.json`
    #[serde(default = "default_true")]
    pub persist_tracker: bool,
}

impl Default for RefinementConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            quality_threshold: default_quality_threshold(),
            consistency_threshold: default_consistency_threshold(),
            output_dir: default_output_dir(),
            service_type: ServiceType::default(),
            log_level: default_log_level(),
            snapshot_log: true,
            persist_tracker: true,
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub refinement: RefinementConfig,

    /// Text-generation backends; the first one is the default for every role
    #[serde(default)]
    pub providers: Vec<ProviderEntry>,

    /// Role name → index into `providers`
    #[serde(default)]
    pub roles: BTreeMap<String, usize>,
}

impl Config {
    pub fn with_providers(providers: Vec<ProviderEntry>) -> Self {
        Self {
            providers,
            ..Default::default()
        }
    }

    /// Clamp soft limits and reject settings the loop cannot run with.
    pub fn validate(&mut self) -> Result<()> {
        if self.refinement.max_iterations == 0 {
            tracing::warn!("max_iterations must be at least 1; using 1");
            self.refinement.max_iterations = 1;
        }

        for (name, value) in [
            ("quality_threshold", &mut self.refinement.quality_threshold),
            ("consistency_threshold", &mut self.refinement.consistency_threshold),
        ] {
            if !value.is_finite() {
                bail!("{} must be a number between 0 and 100", name);
            }
            if !(0.0..=100.0).contains(&*value) {
                let clamped = value.clamp(0.0, 100.0);
                tracing::warn!("{} ({}) out of range; using {}", name, value, clamped);
                *value = clamped;
            }
        }

        for (role, &index) in &self.roles {
            if !ROLE_NAMES.contains(&role.as_str()) {
                bail!(
                    "Unknown role '{}' in [roles]; expected one of: {}",
                    role,
                    ROLE_NAMES.join(", ")
                );
            }
            if index >= self.providers.len() {
                bail!(
                    "Role '{}' points at provider #{} but only {} provider(s) are configured",
                    role,
                    index,
                    self.providers.len()
                );
            }
        }

        Ok(())
    }

    /// Provider assigned to `role`, falling back to the first entry.
    pub fn provider_for(&self, role: &str) -> Option<&ProviderEntry> {
        self.roles
            .get(role)
            .and_then(|&idx| self.providers.get(idx))
            .or_else(|| self.providers.first())
    }
}
