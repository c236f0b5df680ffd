//! devgrid-core: capability model, shared types and node configuration.

pub mod capability;
pub mod config;
pub mod types;

pub use capability::{Capabilities, CapabilityError, CapabilityValue, ValueKind};
pub use config::{ConfigError, NodeConfig, parse_duration};
pub use types::*;
