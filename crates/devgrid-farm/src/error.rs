//! Device-farm and reservation error types.

use std::time::Duration;

use thiserror::Error;

/// Failures reported by a device-farm implementation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceFarmError {
    #[error("device farm unreachable: {0}")]
    Transport(String),

    #[error("device farm call timed out after {0:?}")]
    Timeout(Duration),

    #[error("device farm rejected request: {0}")]
    Rejected(String),
}

pub type FarmResult<T> = Result<T, DeviceFarmError>;

/// Errors surfaced by the reservation coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReservationError {
    /// The device is held by someone else (the farm or this node).
    #[error("device {udid} is not available for reservation")]
    Unavailable { udid: String },

    /// The farm could not be reached, timed out, or refused the call.
    #[error("device farm call for {udid} failed: {source}")]
    Transport {
        udid: String,
        #[source]
        source: DeviceFarmError,
    },
}

impl ReservationError {
    pub fn udid(&self) -> &str {
        match self {
            ReservationError::Unavailable { udid } | ReservationError::Transport { udid, .. } => {
                udid
            }
        }
    }
}

pub type ReservationResult<T> = Result<T, ReservationError>;
