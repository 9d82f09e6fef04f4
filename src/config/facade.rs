//! ConfigLoader facade delegating to merge service.

use super::merge::service::MergeService;
use super::AgentSettings;
use crate::error::AgentError;
use std::path::Path;

/// Configuration loader facade.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from defaults, the global file, an optional explicit file and environment.
    pub fn load(explicit: Option<&Path>) -> Result<AgentSettings, AgentError> {
        let settings = MergeService::load(explicit)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load configuration from a specific file with environment overlay.
    pub fn load_from_file(path: &Path) -> Result<AgentSettings, AgentError> {
        let settings = MergeService::load_from_file(path)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Create default configuration.
    pub fn default() -> AgentSettings {
        AgentSettings::default()
    }
}
