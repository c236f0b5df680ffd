//! Device-farm collaborator interface.
//!
//! The farm service owns the busy/available state of every managed device.
//! This crate only consumes the four operations below; the transport behind
//! them (HTTP, auth, retries) belongs to the implementation.

use async_trait::async_trait;

use devgrid_core::DeviceInfo;

use crate::error::FarmResult;

/// Answer of the farm to a reserve request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReserveOutcome {
    /// The device is now reserved by this node.
    Reserved,
    /// Another party holds the device.
    AlreadyReserved,
}

/// Answer of the farm to a release request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    Released,
    /// The device was not reserved (already free or unknown).
    NotReserved,
}

#[async_trait]
pub trait DeviceFarm: Send + Sync {
    /// Whether the device is currently free to be reserved.
    async fn device_available(&self, udid: &str) -> FarmResult<bool>;

    /// Device metadata, or `None` if the farm does not know the device.
    async fn device_info(&self, udid: &str) -> FarmResult<Option<DeviceInfo>>;

    /// Mark the device reserved. Must reject a device that is already reserved.
    async fn reserve(&self, udid: &str) -> FarmResult<ReserveOutcome>;

    /// Free the device.
    async fn release(&self, udid: &str) -> FarmResult<ReleaseOutcome>;
}
