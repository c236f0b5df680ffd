//! Extension points invoked by the slot allocator.
//!
//! The allocator owns slot state and capacity; everything device-specific
//! plugs in through [`SessionHooks`]:
//!
//! ```text
//! allocate ──► pre_check (per candidate, outside the slot lock)
//! on_session_start ──► post_claim (error ⇒ claim rolled back)
//! on_session_end ──► pre_release (never blocks freeing the slot)
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use devgrid_core::{Capabilities, ConfigError, NodeConfig};
use devgrid_farm::{CoordinatorConfig, DeviceFarm, DeviceReservationCoordinator};

use crate::augment::SlotCapabilityAugmenter;
use crate::error::SessionResult;
use crate::matcher::{CapabilityMatcher, MatchPolicy};
use crate::session::Session;

#[async_trait]
pub trait SessionHooks: Send + Sync {
    /// Guard for one candidate slot. `false` skips the slot.
    async fn pre_check(&self, _slot: &Capabilities, _request: &Capabilities) -> bool {
        true
    }

    /// Prepare a claimed session before it becomes usable.
    async fn post_claim(&self, _session: &mut Session) -> SessionResult<()> {
        Ok(())
    }

    /// Tear down session resources before its slot is freed.
    async fn pre_release(&self, _session: &Session) {}
}

/// Hooks for nodes without managed devices.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHooks;

impl SessionHooks for NoopHooks {}

/// Reserves farm-managed devices around session lifetimes.
pub struct DeviceSessionHooks {
    matcher: CapabilityMatcher,
    coordinator: Arc<DeviceReservationCoordinator>,
    augmenter: SlotCapabilityAugmenter,
}

impl DeviceSessionHooks {
    pub fn new(matcher: CapabilityMatcher, coordinator: Arc<DeviceReservationCoordinator>) -> Self {
        Self {
            matcher,
            coordinator,
            augmenter: SlotCapabilityAugmenter,
        }
    }

    pub fn from_config(config: &NodeConfig, farm: Arc<dyn DeviceFarm>) -> Result<Self, ConfigError> {
        let coordinator = DeviceReservationCoordinator::new(
            farm,
            CoordinatorConfig {
                call_timeout: config.device_farm.call_timeout()?,
            },
        );
        Ok(Self::new(
            CapabilityMatcher::new(MatchPolicy::from_config(config)),
            Arc::new(coordinator),
        ))
    }

    pub fn coordinator(&self) -> &Arc<DeviceReservationCoordinator> {
        &self.coordinator
    }
}

#[async_trait]
impl SessionHooks for DeviceSessionHooks {
    async fn pre_check(&self, slot: &Capabilities, request: &Capabilities) -> bool {
        match slot.udid() {
            Some(udid) if self.matcher.requires_managed_device(slot, request) => {
                self.coordinator.is_available(udid).await
            }
            _ => true,
        }
    }

    async fn post_claim(&self, session: &mut Session) -> SessionResult<()> {
        let Some(udid) = session.udid().map(str::to_string) else {
            return Ok(());
        };

        let managed = self
            .matcher
            .requires_managed_device(session.slot_capabilities(), session.requested_capabilities());

        let device = if managed {
            info!(%udid, session = %session.id(), "reserving device");
            self.coordinator.reserve(&udid, session.id()).await?;
            session.mark_reserved(udid.as_str());
            self.coordinator.lookup(&udid).await
        } else {
            None
        };

        let effective = self.augmenter.build_effective_capabilities(
            session.slot_capabilities(),
            &udid,
            device.as_ref(),
        );
        session.set_effective_capabilities(effective);
        Ok(())
    }

    async fn pre_release(&self, session: &Session) {
        let Some(udid) = session.udid() else {
            return;
        };
        // Covers a start that was cancelled while the reserve call was in flight.
        if self.coordinator.holder(udid).await != Some(session.id()) {
            return;
        }

        info!(%udid, session = %session.id(), "returning device");
        if let Err(e) = self.coordinator.release(udid).await {
            warn!(%udid, session = %session.id(), error = %e, "device release failed, freeing slot anyway");
        }
    }
}
