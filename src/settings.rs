// Engine settings - tunables loaded from a file and the environment

//! # Engine Settings
//!
//! Settings are layered with the `config` crate:
//! 1. built-in defaults
//! 2. an optional settings file (TOML/JSON/YAML, picked by extension)
//! 3. environment variables prefixed `RUNDOWN_ENGINE`, e.g.
//!    `RUNDOWN_ENGINE__THROTTLE_INTERVAL_MS=750`

use std::path::Path;
use std::time::Duration;

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::{Result, RundownError};

/// How the live-critical guard shares its last-operation timestamp
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThrottleScope {
    /// One timestamp for every rundown in the process
    Global,
    /// One timestamp per rundown id
    PerRundown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Minimum spacing between live-critical operations
    pub throttle_interval_ms: u64,

    pub throttle_scope: ThrottleScope,

    /// Buffer size of the engine event channel
    pub event_capacity: usize,

    /// Keep an operator-chosen next part when the engine recalculates "next"
    pub respect_operator_next: bool,

    /// Schedule automatic takes for parts flagged `autonext`
    pub auto_next_enabled: bool,

    /// Default tracing filter when RUST_LOG is unset
    pub log_filter: String,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            throttle_interval_ms: 500,
            throttle_scope: ThrottleScope::Global,
            event_capacity: 1000,
            respect_operator_next: true,
            auto_next_enabled: true,
            log_filter: "info".to_string(),
        }
    }
}

impl EngineSettings {
    pub const ENV_PREFIX: &'static str = "RUNDOWN_ENGINE";

    /// Load settings from the environment, optionally layered over a file
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(File::from(path).required(true));
        }
        let settings = builder
            .add_source(
                Environment::with_prefix(Self::ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize::<EngineSettings>()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.event_capacity == 0 {
            return Err(RundownError::Misconfiguration(
                "event_capacity must be at least 1".to_string(),
            ));
        }
        if self.throttle_interval_ms == 0 {
            return Err(RundownError::Misconfiguration(
                "throttle_interval_ms must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn throttle_interval(&self) -> Duration {
        Duration::from_millis(self.throttle_interval_ms)
    }
}
