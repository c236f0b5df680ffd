//! In-process device farm.
//!
//! Keeps device state in memory with the same semantics a real farm
//! service exposes: a device is available only while it is neither busy
//! nor reserved, reserve rejects held devices, and the connect URL is
//! only published while a reservation is active. Useful for embedding a
//! node without a farm service and for exercising the coordinator.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use devgrid_core::DeviceInfo;

use crate::error::{DeviceFarmError, FarmResult};
use crate::farm::{DeviceFarm, ReleaseOutcome, ReserveOutcome};

#[derive(Debug, Clone)]
struct DeviceRecord {
    model: String,
    connect_url: Option<String>,
    /// In use outside of any reservation (e.g. a manual session).
    busy: bool,
    reserved: bool,
}

/// Number of calls received per operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub available: usize,
    pub info: usize,
    pub reserve: usize,
    pub release: usize,
}

#[derive(Default)]
struct Counters {
    available: AtomicUsize,
    info: AtomicUsize,
    reserve: AtomicUsize,
    release: AtomicUsize,
}

#[derive(Default)]
pub struct MemoryDeviceFarm {
    devices: Mutex<HashMap<String, DeviceRecord>>,
    counters: Counters,
    offline: AtomicBool,
    latency: Option<Duration>,
}

impl MemoryDeviceFarm {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every call by `latency` before answering.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Register a device. `connect_url` is published while it is reserved.
    pub async fn add_device(&self, udid: &str, model: &str, connect_url: Option<&str>) {
        self.devices.lock().await.insert(
            udid.to_string(),
            DeviceRecord {
                model: model.to_string(),
                connect_url: connect_url.map(str::to_string),
                busy: false,
                reserved: false,
            },
        );
    }

    /// Mark a device busy or idle outside of the reservation flow.
    pub async fn set_busy(&self, udid: &str, busy: bool) {
        if let Some(device) = self.devices.lock().await.get_mut(udid) {
            device.busy = busy;
        }
    }

    /// Reserve a device on behalf of another party, bypassing the counters.
    pub async fn reserve_externally(&self, udid: &str) -> bool {
        match self.devices.lock().await.get_mut(udid) {
            Some(device) if !device.reserved && !device.busy => {
                device.reserved = true;
                true
            }
            _ => false,
        }
    }

    pub async fn is_reserved(&self, udid: &str) -> bool {
        self.devices
            .lock()
            .await
            .get(udid)
            .is_some_and(|d| d.reserved)
    }

    /// Make every subsequent call fail with a transport error.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn calls(&self) -> CallCounts {
        CallCounts {
            available: self.counters.available.load(Ordering::SeqCst),
            info: self.counters.info.load(Ordering::SeqCst),
            reserve: self.counters.reserve.load(Ordering::SeqCst),
            release: self.counters.release.load(Ordering::SeqCst),
        }
    }

    async fn enter(&self, counter: &AtomicUsize) -> FarmResult<()> {
        counter.fetch_add(1, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if self.offline.load(Ordering::SeqCst) {
            return Err(DeviceFarmError::Transport(
                "connection refused".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl DeviceFarm for MemoryDeviceFarm {
    async fn device_available(&self, udid: &str) -> FarmResult<bool> {
        self.enter(&self.counters.available).await?;
        let devices = self.devices.lock().await;
        Ok(devices
            .get(udid)
            .is_some_and(|d| !d.busy && !d.reserved))
    }

    async fn device_info(&self, udid: &str) -> FarmResult<Option<DeviceInfo>> {
        self.enter(&self.counters.info).await?;
        let devices = self.devices.lock().await;
        Ok(devices.get(udid).map(|d| DeviceInfo {
            udid: udid.to_string(),
            model: d.model.clone(),
            remote_connect_url: if d.reserved {
                d.connect_url.clone()
            } else {
                None
            },
        }))
    }

    async fn reserve(&self, udid: &str) -> FarmResult<ReserveOutcome> {
        self.enter(&self.counters.reserve).await?;
        let mut devices = self.devices.lock().await;
        let device = devices
            .get_mut(udid)
            .ok_or_else(|| DeviceFarmError::Rejected(format!("unknown device {udid}")))?;

        if device.reserved || device.busy {
            debug!(%udid, "reserve rejected, device held");
            return Ok(ReserveOutcome::AlreadyReserved);
        }
        device.reserved = true;
        Ok(ReserveOutcome::Reserved)
    }

    async fn release(&self, udid: &str) -> FarmResult<ReleaseOutcome> {
        self.enter(&self.counters.release).await?;
        let mut devices = self.devices.lock().await;
        match devices.get_mut(udid) {
            Some(device) if device.reserved => {
                device.reserved = false;
                Ok(ReleaseOutcome::Released)
            }
            _ => Ok(ReleaseOutcome::NotReserved),
        }
    }
}
