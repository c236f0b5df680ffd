//! devgrid-farm: device-farm integration for managed devices.
//!
//! Defines the `DeviceFarm` collaborator a node consumes and the
//! `DeviceReservationCoordinator` that reserves and releases devices
//! around session lifetimes.
//!
//! # Architecture
//!
//! ```text
//! DeviceReservationCoordinator
//!   ├── Arc<dyn DeviceFarm> (availability, info, reserve, release)
//!   ├── per-call timeout (timeout == transport failure)
//!   └── local reservation table (udid → SessionId)
//! ```
//!
//! `MemoryDeviceFarm` is an in-process farm with the same semantics as
//! the real service.

pub mod coordinator;
pub mod error;
pub mod farm;
pub mod memory;

pub use coordinator::{CoordinatorConfig, DeviceReservationCoordinator};
pub use error::{DeviceFarmError, FarmResult, ReservationError, ReservationResult};
pub use farm::{DeviceFarm, ReleaseOutcome, ReserveOutcome};
pub use memory::{CallCounts, MemoryDeviceFarm};
