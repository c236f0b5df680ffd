//! Shared types used across devgrid crates.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Node-unique identifier of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// Stable node-local slot index (registration order).
pub type SlotIndex = usize;

/// Device metadata reported by the device farm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub udid: String,
    pub model: String,
    /// Connect endpoint, only populated while the device is reserved.
    pub remote_connect_url: Option<String>,
}

impl DeviceInfo {
    pub fn new(udid: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            udid: udid.into(),
            model: model.into(),
            remote_connect_url: None,
        }
    }

    pub fn with_remote_connect_url(mut self, url: impl Into<String>) -> Self {
        self.remote_connect_url = Some(url.into());
        self
    }
}
