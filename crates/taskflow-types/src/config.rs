//! Flow configuration.
//!
//! `FlowConfig` carries the tunables a flow builder accepts from a config
//! file. All fields have defaults, so an empty TOML document is valid.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ConfigError;
use crate::params::TaskParams;

/// Default capacity of the per-flow event broadcast channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 64;

/// Configuration applied to a flow at build time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowConfig {
    /// Human-readable flow name, used in log fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Capacity of the event broadcast channel.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,

    /// Initial shared parameters.
    #[serde(default)]
    pub params: Map<String, Value>,

    /// Deadline for the flow context, in seconds from build time. Tasks may
    /// honour it; the engine does not enforce it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline_secs: Option<u64>,
}

fn default_event_capacity() -> usize {
    DEFAULT_EVENT_CAPACITY
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            name: None,
            event_capacity: default_event_capacity(),
            params: Map::new(),
            deadline_secs: None,
        }
    }
}

impl FlowConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let config: FlowConfig = toml::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the runtime cannot honour.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.event_capacity == 0 {
            return Err(ConfigError::Invalid(
                "event_capacity must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Initial parameters as a [`TaskParams`] store.
    pub fn initial_params(&self) -> TaskParams {
        TaskParams::from(self.params.clone())
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_secs.map(Duration::from_secs)
    }
}
