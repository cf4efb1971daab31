//! Hub configuration types.
//!
//! This module contains the configuration read from a config directory:
//! - `HubConfig` - Main configuration loaded from `hub.toml`
//! - `PropertyTable` - Property table served by the simulated transport,
//!   loaded from `properties.toml`
//! - `load_config_dir()` - Loads and validates both files

use crate::config::{ConfigError, ConfigLoader, SharedConfig};
use crate::vhal::consts::{
    DEFAULT_HANDLER_ORDER, DEFAULT_RETRY_POLL_INTERVAL_MS, DEFAULT_RETRY_TIMEOUT_MS,
    DEFAULT_SIM_TICK_MS,
};
use crate::vhal::types::{AreaId, GLOBAL_AREA, PropId, PropertyDescriptor, Value};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

fn default_retry_timeout_ms() -> u64 {
    DEFAULT_RETRY_TIMEOUT_MS
}

fn default_retry_poll_interval_ms() -> u64 {
    DEFAULT_RETRY_POLL_INTERVAL_MS
}

fn default_tick_ms() -> u64 {
    DEFAULT_SIM_TICK_MS
}

fn default_handlers() -> Vec<String> {
    DEFAULT_HANDLER_ORDER.iter().map(|s| s.to_string()).collect()
}

/// Main configuration loaded from `hub.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HubConfig {
    pub shared: SharedConfig,

    /// Retry policy for synchronous get/set.
    #[serde(default)]
    pub retry: RetryConfig,

    /// Handler names in priority order.
    #[serde(default = "default_handlers")]
    pub handlers: Vec<String>,

    /// Simulated transport settings.
    #[serde(default)]
    pub simulation: SimulationConfig,
}

impl HubConfig {
    /// Validate the hub configuration.
    ///
    /// # Validation Rules
    /// 1. `shared.service_name` is not empty
    /// 2. `retry.poll_interval_ms` > 0
    /// 3. `retry.timeout_ms` >= `retry.poll_interval_ms`
    /// 4. `handlers` is not empty and has no repeated names
    /// 5. `simulation.tick_ms` > 0
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.shared.validate()?;

        if self.retry.poll_interval_ms == 0 {
            return Err(ConfigError::ValidationError(
                "retry.poll_interval_ms must be greater than 0".to_string(),
            ));
        }
        if self.retry.timeout_ms < self.retry.poll_interval_ms {
            return Err(ConfigError::ValidationError(format!(
                "retry.timeout_ms ({}) must be at least retry.poll_interval_ms ({})",
                self.retry.timeout_ms, self.retry.poll_interval_ms
            )));
        }

        if self.handlers.is_empty() {
            return Err(ConfigError::ValidationError(
                "handlers cannot be empty".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        for name in &self.handlers {
            if !seen.insert(name.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "handler '{name}' listed twice"
                )));
            }
        }

        if self.simulation.tick_ms == 0 {
            return Err(ConfigError::ValidationError(
                "simulation.tick_ms must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Retry policy for synchronous calls answered with TRY_AGAIN.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetryConfig {
    #[serde(default = "default_retry_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_retry_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl RetryConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_RETRY_TIMEOUT_MS,
            poll_interval_ms: DEFAULT_RETRY_POLL_INTERVAL_MS,
        }
    }
}

/// Simulated transport settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SimulationConfig {
    /// Period of continuous-property sampling.
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
    /// Number of TRY_AGAIN replies before the endpoint answers get/set.
    #[serde(default)]
    pub boot_try_again: u32,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            tick_ms: DEFAULT_SIM_TICK_MS,
            boot_try_again: 0,
        }
    }
}

/// Initial value of one area of a simulated property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitialValue {
    #[serde(default)]
    pub area_id: AreaId,
    pub value: Value,
}

/// One `[[property]]` entry of `properties.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyEntry {
    #[serde(flatten)]
    pub descriptor: PropertyDescriptor,
    #[serde(default)]
    pub initial: Vec<InitialValue>,
}

/// Property table loaded from `properties.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PropertyTable {
    #[serde(default, rename = "property")]
    pub properties: Vec<PropertyEntry>,
}

impl PropertyTable {
    /// Validate initial values against their descriptors.
    ///
    /// Repeated property ids are left in place: the hub registry rejects them
    /// at startup, which is the behavior of a misconfigured endpoint.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for entry in &self.properties {
            let desc = &entry.descriptor;
            if let Err(reason) = desc.check_sample_rates() {
                return Err(ConfigError::ValidationError(format!(
                    "property {}: {reason}",
                    PropId(desc.id)
                )));
            }
            for initial in &entry.initial {
                if initial.value.shape() != desc.shape {
                    return Err(ConfigError::ValidationError(format!(
                        "property {}: initial value is {} but property shape is {}",
                        PropId(desc.id),
                        initial.value.shape(),
                        desc.shape
                    )));
                }
                if !desc.has_area(initial.area_id) {
                    return Err(ConfigError::ValidationError(format!(
                        "property {}: unknown area {:#x} (global area is {GLOBAL_AREA})",
                        PropId(desc.id),
                        initial.area_id
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Configuration of a config directory.
#[derive(Debug, Clone)]
pub struct FullConfig {
    pub hub: HubConfig,
    pub properties: PropertyTable,
}

/// Load `hub.toml` and `properties.toml` from `dir` and validate both.
pub fn load_config_dir(dir: &Path) -> Result<FullConfig, ConfigError> {
    let hub = HubConfig::load(&dir.join("hub.toml"))?;
    hub.validate()?;

    let properties = PropertyTable::load(&dir.join("properties.toml"))?;
    properties.validate()?;

    Ok(FullConfig { hub, properties })
}
