//! Live binding of a request to a claimed slot.

use std::sync::Arc;

use devgrid_core::{Capabilities, SessionId, SlotIndex};

/// A session created by [`SessionAllocator`](crate::SessionAllocator).
///
/// The slot template is shared and read-only. The effective view, once
/// built, is owned by the session alone and never replaced. Only the
/// node's own hooks record the effective view and the reservation.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    slot: SlotIndex,
    slot_capabilities: Arc<Capabilities>,
    requested: Capabilities,
    effective: Option<Capabilities>,
    reserved_device: Option<String>,
    started: bool,
}

impl Session {
    pub(crate) fn new(
        id: SessionId,
        slot: SlotIndex,
        slot_capabilities: Arc<Capabilities>,
        requested: Capabilities,
    ) -> Self {
        Self {
            id,
            slot,
            slot_capabilities,
            requested,
            effective: None,
            reserved_device: None,
            started: false,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn slot(&self) -> SlotIndex {
        self.slot
    }

    pub fn slot_capabilities(&self) -> &Capabilities {
        &self.slot_capabilities
    }

    pub fn requested_capabilities(&self) -> &Capabilities {
        &self.requested
    }

    /// Device identifier of the claimed slot, if it stands for a device.
    pub fn udid(&self) -> Option<&str> {
        self.slot_capabilities.udid()
    }

    /// Capabilities the session should expose to clients: the augmented
    /// view when one was built, the slot template otherwise.
    pub fn effective_capabilities(&self) -> &Capabilities {
        self.effective
            .as_ref()
            .unwrap_or(self.slot_capabilities.as_ref())
    }

    pub fn has_effective_view(&self) -> bool {
        self.effective.is_some()
    }

    /// Install the effective view. Once built it is never replaced;
    /// returns `false` if a view was already present.
    pub(crate) fn set_effective_capabilities(&mut self, capabilities: Capabilities) -> bool {
        if self.effective.is_some() {
            return false;
        }
        self.effective = Some(capabilities);
        true
    }

    /// Device reserved for this session through the farm.
    pub fn reserved_device(&self) -> Option<&str> {
        self.reserved_device.as_deref()
    }

    pub(crate) fn mark_reserved(&mut self, udid: impl Into<String>) {
        self.reserved_device = Some(udid.into());
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub(crate) fn mark_started(&mut self) {
        self.started = true;
    }
}
