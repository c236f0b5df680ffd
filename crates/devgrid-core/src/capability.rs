//! Capability model shared by slots, requests and sessions.
//!
//! Capabilities arrive from heterogeneous clients as loosely-typed maps.
//! `Capabilities` keeps them as a closed union of scalars and offers typed
//! accessors that refuse to silently coerce one kind into another.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

/// Unique device identifier of a managed device.
pub const UDID: &str = "udid";

/// Connect endpoint added to the effective view of a reserved device.
pub const REMOTE_URL: &str = "remoteURL";

/// Request marker that opts in/out of device-farm management.
pub const ENABLE_STF: &str = "enableStf";

/// A single capability value.
///
/// Absence is modelled by the key not being present in [`Capabilities`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CapabilityValue {
    Bool(bool),
    Number(f64),
    String(String),
}

impl CapabilityValue {
    /// Name of the variant, used in type-mismatch errors.
    pub fn kind(&self) -> ValueKind {
        match self {
            CapabilityValue::Bool(_) => ValueKind::Bool,
            CapabilityValue::Number(_) => ValueKind::Number,
            CapabilityValue::String(_) => ValueKind::String,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            CapabilityValue::String(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for CapabilityValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CapabilityValue::Bool(b) => write!(f, "{b}"),
            CapabilityValue::Number(n) => write!(f, "{n}"),
            CapabilityValue::String(s) => f.write_str(s),
        }
    }
}

impl From<&str> for CapabilityValue {
    fn from(value: &str) -> Self {
        CapabilityValue::String(value.to_string())
    }
}

impl From<String> for CapabilityValue {
    fn from(value: String) -> Self {
        CapabilityValue::String(value)
    }
}

impl From<bool> for CapabilityValue {
    fn from(value: bool) -> Self {
        CapabilityValue::Bool(value)
    }
}

impl From<f64> for CapabilityValue {
    fn from(value: f64) -> Self {
        CapabilityValue::Number(value)
    }
}

impl From<i64> for CapabilityValue {
    fn from(value: i64) -> Self {
        CapabilityValue::Number(value as f64)
    }
}

/// Kind of a capability value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Bool,
    Number,
    String,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::Bool => "bool",
            ValueKind::Number => "number",
            ValueKind::String => "string",
        };
        f.write_str(name)
    }
}

/// Errors raised by typed capability accessors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CapabilityError {
    #[error("capability '{key}' is a {found}, expected {expected}")]
    TypeMismatch {
        key: String,
        expected: ValueKind,
        found: ValueKind,
    },
}

/// String-keyed capability map.
///
/// Slot templates are shared behind an `Arc` and never mutated; callers
/// that need a modified view clone into a new map first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Capabilities {
    #[serde(deserialize_with = "skip_nulls")]
    entries: HashMap<String, CapabilityValue>,
}

/// `null` entries are dropped so that they read as absent keys.
fn skip_nulls<'de, D>(deserializer: D) -> Result<HashMap<String, CapabilityValue>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = HashMap::<String, Option<CapabilityValue>>::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .filter_map(|(key, value)| value.map(|v| (key, v)))
        .collect())
}

impl Capabilities {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&CapabilityValue> {
        self.entries.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Insert or overwrite an entry, returning the previous value.
    pub fn insert(
        &mut self,
        key: impl Into<String>,
        value: impl Into<CapabilityValue>,
    ) -> Option<CapabilityValue> {
        self.entries.insert(key.into(), value.into())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &CapabilityValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Typed string accessor. `Ok(None)` when the key is absent.
    pub fn str(&self, key: &str) -> Result<Option<&str>, CapabilityError> {
        match self.entries.get(key) {
            None => Ok(None),
            Some(CapabilityValue::String(s)) => Ok(Some(s)),
            Some(other) => Err(mismatch(key, ValueKind::String, other)),
        }
    }

    /// Typed boolean accessor. `Ok(None)` when the key is absent.
    pub fn bool(&self, key: &str) -> Result<Option<bool>, CapabilityError> {
        match self.entries.get(key) {
            None => Ok(None),
            Some(CapabilityValue::Bool(b)) => Ok(Some(*b)),
            Some(other) => Err(mismatch(key, ValueKind::Bool, other)),
        }
    }

    /// Typed numeric accessor. `Ok(None)` when the key is absent.
    pub fn number(&self, key: &str) -> Result<Option<f64>, CapabilityError> {
        match self.entries.get(key) {
            None => Ok(None),
            Some(CapabilityValue::Number(n)) => Ok(Some(*n)),
            Some(other) => Err(mismatch(key, ValueKind::Number, other)),
        }
    }

    /// Trimmed string value, or `None` if absent, blank or not a string.
    pub fn non_empty_str(&self, key: &str) -> Option<&str> {
        self.str(key)
            .ok()
            .flatten()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Lenient boolean reader for flags that clients send either as
    /// booleans or as `"true"`/`"false"` strings.
    pub fn flag(&self, key: &str) -> Result<Option<bool>, CapabilityError> {
        match self.entries.get(key) {
            Some(CapabilityValue::String(s)) if s.eq_ignore_ascii_case("true") => Ok(Some(true)),
            Some(CapabilityValue::String(s)) if s.eq_ignore_ascii_case("false") => Ok(Some(false)),
            _ => self.bool(key),
        }
    }

    /// The device identifier carried by a slot, if any.
    pub fn udid(&self) -> Option<&str> {
        self.non_empty_str(UDID)
    }

    /// Parse a JSON object of scalar values (the dispatcher's payload format).
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

impl<K, V> FromIterator<(K, V)> for Capabilities
where
    K: Into<String>,
    V: Into<CapabilityValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

fn mismatch(key: &str, expected: ValueKind, found: &CapabilityValue) -> CapabilityError {
    CapabilityError::TypeMismatch {
        key: key.to_string(),
        expected,
        found: found.kind(),
    }
}
