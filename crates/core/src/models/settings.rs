use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::errors::CoreError;

/// Tunables of the planner. Every field falls back to its default when
/// missing from a settings file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerSettings {
    /// Maximum number of open tabs.
    pub max_tabs: usize,

    /// Quiet period before a burst of edits is written back to the tab.
    pub debounce_ms: u64,

    /// Interval between background quote fetches for the active tab.
    pub poll_interval_secs: u64,

    /// How long a cached quote is reused before a provider is asked again.
    pub quote_cache_ttl_secs: u64,

    /// How long a failed foreground fetch stays visible before the form
    /// falls back to manual price entry.
    pub error_revert_secs: u64,

    /// Optional API keys for providers that require them.
    /// Keys: provider name (e.g., "alphavantage").
    pub api_keys: HashMap<String, String>,
}

impl Default for PlannerSettings {
    fn default() -> Self {
        Self {
            max_tabs: 20,
            debounce_ms: 300,
            poll_interval_secs: 60,
            quote_cache_ttl_secs: 60,
            error_revert_secs: 3,
            api_keys: HashMap::new(),
        }
    }
}

impl PlannerSettings {
    /// Parse settings from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, CoreError> {
        let settings: Self = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.max_tabs == 0 {
            return Err(CoreError::ValidationError(
                "max_tabs must be at least 1".into(),
            ));
        }
        if self.poll_interval_secs == 0 {
            return Err(CoreError::ValidationError(
                "poll_interval_secs must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn quote_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.quote_cache_ttl_secs)
    }

    pub fn error_revert_delay(&self) -> Duration {
        Duration::from_secs(self.error_revert_secs)
    }
}
