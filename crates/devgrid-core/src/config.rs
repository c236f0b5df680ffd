//! node.toml configuration parser.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::capability::{Capabilities, ENABLE_STF};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to render config: {0}")]
    Render(#[from] toml::ser::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    pub node: NodeSection,
    #[serde(default)]
    pub device_farm: DeviceFarmConfig,
    #[serde(default)]
    pub matching: MatchingConfig,
    #[serde(default)]
    pub slots: Vec<SlotConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSection {
    pub id: String,
    pub max_sessions: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceFarmConfig {
    /// Whether the device-farm integration is connected on this node.
    #[serde(default)]
    pub enabled: bool,
    /// Request capability that opts a session in or out of device management.
    #[serde(default = "default_marker")]
    pub marker_capability: String,
    /// Upper bound on a single device-farm call, e.g. "10s".
    pub call_timeout: Option<String>,
}

impl Default for DeviceFarmConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            marker_capability: default_marker(),
            call_timeout: None,
        }
    }
}

impl DeviceFarmConfig {
    pub fn call_timeout(&self) -> ConfigResult<Option<Duration>> {
        match &self.call_timeout {
            None => Ok(None),
            Some(raw) => parse_duration(raw)
                .map(Some)
                .ok_or_else(|| ConfigError::Invalid(format!("bad call_timeout '{raw}'"))),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MatchingConfig {
    /// Request keys that never take part in structural matching.
    #[serde(default)]
    pub ignored_keys: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotConfig {
    pub capabilities: Capabilities,
}

fn default_marker() -> String {
    ENABLE_STF.to_string()
}

impl NodeConfig {
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        let config: NodeConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> ConfigResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.node.max_sessions == 0 {
            return Err(ConfigError::Invalid(format!(
                "node '{}': max_sessions must be at least 1",
                self.node.id
            )));
        }

        self.device_farm.call_timeout()?;

        let mut seen = HashSet::new();
        for slot in &self.slots {
            if let Some(udid) = slot.capabilities.udid() {
                if !seen.insert(udid) {
                    return Err(ConfigError::Invalid(format!(
                        "udid '{udid}' is declared by more than one slot"
                    )));
                }
            }
        }

        Ok(())
    }
}

/// Parse a duration string like "5s", "500ms", "1m".
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(secs) = s.strip_suffix('s') {
        if let Some(ms) = secs.strip_suffix('m') {
            ms.parse::<u64>().ok().map(Duration::from_millis)
        } else {
            secs.parse::<u64>().ok().map(Duration::from_secs)
        }
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.parse::<u64>()
            .ok()
            .and_then(|m| m.checked_mul(60))
            .map(Duration::from_secs)
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}
