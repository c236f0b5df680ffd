//! Capability matching between requests and slots.
//!
//! Two pure predicates:
//! - **`matches`**: structural compatibility of a slot template with a request
//! - **`requires_managed_device`**: whether the pair needs a farm-managed device

use std::collections::HashSet;

use devgrid_core::capability::{Capabilities, CapabilityValue};
use devgrid_core::NodeConfig;

/// Request values that match any slot value.
const WILDCARDS: &[&str] = &["ANY", "any", "*", ""];

/// Keys whose string values are compared case-insensitively.
const CASE_INSENSITIVE_KEYS: &[&str] = &["platformName", "platform"];

/// Matching policy for a node.
#[derive(Debug, Clone)]
pub struct MatchPolicy {
    /// Whether the device-farm integration is connected.
    pub farm_enabled: bool,
    /// Request capability that opts in/out of device management.
    pub marker_capability: String,
    /// Request keys excluded from structural matching.
    pub ignored_keys: HashSet<String>,
}

impl MatchPolicy {
    pub fn from_config(config: &NodeConfig) -> Self {
        let marker = config.device_farm.marker_capability.clone();
        let mut ignored_keys: HashSet<String> =
            config.matching.ignored_keys.iter().cloned().collect();
        ignored_keys.insert(marker.clone());
        Self {
            farm_enabled: config.device_farm.enabled,
            marker_capability: marker,
            ignored_keys,
        }
    }
}

impl Default for MatchPolicy {
    fn default() -> Self {
        let marker = devgrid_core::capability::ENABLE_STF.to_string();
        Self {
            farm_enabled: false,
            ignored_keys: HashSet::from([marker.clone()]),
            marker_capability: marker,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CapabilityMatcher {
    policy: MatchPolicy,
}

impl CapabilityMatcher {
    pub fn new(policy: MatchPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &MatchPolicy {
        &self.policy
    }

    /// Whether the slot stands for a farm-managed device for this request.
    ///
    /// True when the integration is enabled, the slot carries a non-empty
    /// udid, and the request does not opt out through the marker. An absent
    /// or unreadable marker counts as opted in.
    pub fn requires_managed_device(&self, slot: &Capabilities, request: &Capabilities) -> bool {
        if !self.policy.farm_enabled || slot.udid().is_none() {
            return false;
        }
        !matches!(request.flag(&self.policy.marker_capability), Ok(Some(false)))
    }

    /// Whether every constrained request capability is satisfied by the slot.
    pub fn matches(&self, slot: &Capabilities, request: &Capabilities) -> bool {
        request
            .iter()
            .filter(|(key, _)| !self.policy.ignored_keys.contains(*key))
            .filter(|(_, wanted)| !is_wildcard(wanted))
            .all(|(key, wanted)| match slot.get(key) {
                Some(offered) => values_match(key, offered, wanted),
                None => false,
            })
    }
}

fn is_wildcard(value: &CapabilityValue) -> bool {
    value.as_str().is_some_and(|s| WILDCARDS.contains(&s.trim()))
}

fn values_match(key: &str, offered: &CapabilityValue, wanted: &CapabilityValue) -> bool {
    match (offered, wanted) {
        (CapabilityValue::String(a), CapabilityValue::String(b))
            if CASE_INSENSITIVE_KEYS.contains(&key) =>
        {
            a.eq_ignore_ascii_case(b)
        }
        _ => offered == wanted,
    }
}
