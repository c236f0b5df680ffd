//! devgrid-node: node-local session admission and device reservation.
//!
//! Decides whether this node can serve a session request, claims a slot
//! for it, and reserves the slot's device with the device farm for the
//! session's lifetime.
//!
//! # Architecture
//!
//! ```text
//! SessionAllocator<H: SessionHooks>
//!   ├── slot templates (Arc<Capabilities>, registration order)
//!   ├── SlotTable behind one Mutex (Free/Claimed, used count)
//!   ├── CapabilityMatcher (structural match)
//!   └── hooks
//!       └── DeviceSessionHooks
//!           ├── CapabilityMatcher (managed-device policy)
//!           ├── DeviceReservationCoordinator (availability, reserve, release)
//!           └── SlotCapabilityAugmenter (effective capability view)
//! ```
//!
//! # Lifecycle
//!
//! `allocate` → `on_session_start` → test traffic → `on_session_end`.
//! A failed start frees the slot before the error is returned, so the
//! dispatcher never holds a claimed slot whose device is not reserved.

pub mod allocator;
pub mod augment;
pub mod error;
pub mod hooks;
pub mod matcher;
pub mod session;

pub use allocator::{SessionAllocator, SlotState};
pub use augment::SlotCapabilityAugmenter;
pub use error::{Rejection, SessionError, SessionResult};
pub use hooks::{DeviceSessionHooks, NoopHooks, SessionHooks};
pub use matcher::{CapabilityMatcher, MatchPolicy};
pub use session::Session;
