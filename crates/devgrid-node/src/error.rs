//! Allocation and session error types.

use thiserror::Error;

use devgrid_core::SessionId;
use devgrid_farm::{DeviceFarmError, ReservationError};

/// Why `try_allocate` returned no session.
///
/// These are expected outcomes, not failures; `allocate` folds them into
/// `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("node is down")]
    NodeDown,

    #[error("no slot on this node matches the request")]
    NoMatchingSlot,

    #[error("node has no free capacity")]
    CapacityExhausted,

    #[error("no matching slot is free with an available device")]
    NoViableSlot,
}

/// Errors surfaced when starting a session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("device {udid} was reserved by another party")]
    ReservationConflict { udid: String },

    #[error("device farm unavailable while reserving {udid}: {source}")]
    Transport {
        udid: String,
        #[source]
        source: DeviceFarmError,
    },

    #[error("session not known to this node: {0}")]
    UnknownSession(SessionId),

    #[error("session already started: {0}")]
    AlreadyStarted(SessionId),
}

impl From<ReservationError> for SessionError {
    fn from(err: ReservationError) -> Self {
        match err {
            ReservationError::Unavailable { udid } => SessionError::ReservationConflict { udid },
            ReservationError::Transport { udid, source } => SessionError::Transport { udid, source },
        }
    }
}

pub type SessionResult<T> = Result<T, SessionError>;
