// Configuration loader
// Reads an explicit --config path, else ~/.specforge/config.toml, then applies
// environment variables

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use super::provider::ProviderEntry;
use super::settings::Config;

/// Default location of the user config file
pub fn default_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".specforge/config.toml"))
}

/// Load configuration.
///
/// An explicit path must exist. Without one, the home config is used when
/// present and defaults otherwise. Environment variables are applied last.
pub fn load_config(explicit: Option<&Path>) -> Result<Config> {
    let file_config = match explicit {
        Some(path) => {
            if !path.exists() {
                bail!("Config file not found: {}", path.display());
            }
            Some(load_config_file(path)?)
        }
        None => match default_config_path() {
            Some(path) if path.exists() => Some(load_config_file(&path)?),
            _ => None,
        },
    };

    let from_file = file_config.is_some();
    let mut config = file_config.unwrap_or_default();
    apply_env(&mut config, from_file, |key| std::env::var(key).ok());

    config
        .validate()
        .context("Configuration validation failed")?;
    Ok(config)
}

/// Parse one TOML config file.
pub fn load_config_file(path: &Path) -> Result<Config> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    let config: Config = toml::from_str(&contents)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
    tracing::debug!("Loaded configuration from {}", path.display());
    Ok(config)
}

/// Apply environment variables.
///
/// A provider is synthesised from `OPENAI_API_KEY` (or `ANTHROPIC_API_KEY`)
/// when the config has none. Loop settings from the environment only apply
/// when no config file was read, so file values win.
pub fn apply_env<F>(config: &mut Config, from_file: bool, get: F)
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| get(key).filter(|v| !v.trim().is_empty());

    if config.providers.is_empty() {
        if let Some(api_key) = get("OPENAI_API_KEY") {
            config.providers.push(ProviderEntry::Openai {
                api_key,
                model: get("OPENAI_MODEL"),
                base_url: get("OPENAI_BASE_URL"),
                temperature: None,
                name: Some("OpenAI (Environment)".to_string()),
            });
        } else if let Some(api_key) = get("ANTHROPIC_API_KEY") {
            config.providers.push(ProviderEntry::Claude {
                api_key,
                model: None,
                base_url: None,
                temperature: None,
                name: Some("Claude (Environment)".to_string()),
            });
        }
    }

    if from_file {
        return;
    }

    if let Some(raw) = get("MAX_ITERATIONS") {
        match raw.trim().parse() {
            Ok(n) => config.refinement.max_iterations = n,
            Err(_) => tracing::warn!("Ignoring invalid MAX_ITERATIONS: {}", raw),
        }
    }
    if let Some(raw) = get("QUALITY_THRESHOLD") {
        match raw.trim().parse() {
            Ok(t) => config.refinement.quality_threshold = t,
            Err(_) => tracing::warn!("Ignoring invalid QUALITY_THRESHOLD: {}", raw),
        }
    }
    if let Some(dir) = get("DEFAULT_OUTPUT_DIR") {
        config.refinement.output_dir = PathBuf::from(dir);
    }
}
