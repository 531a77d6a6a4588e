// Configuration module
// Public interface for configuration loading

mod loader;
mod provider;
mod settings;

pub use loader::{apply_env, default_config_path, load_config, load_config_file};
pub use provider::ProviderEntry;
pub use settings::{Config, RefinementConfig, ROLE_NAMES};
