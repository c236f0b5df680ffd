//! Effective capability view handed to a session.

use devgrid_core::DeviceInfo;
use devgrid_core::capability::{Capabilities, REMOTE_URL};
use tracing::info;

#[derive(Debug, Clone, Copy, Default)]
pub struct SlotCapabilityAugmenter;

impl SlotCapabilityAugmenter {
    /// Copy the slot template and overlay the device's connect endpoint.
    ///
    /// The slot template is only read. The returned map is a fresh copy
    /// owned by the caller; `remoteURL` is set when `device` carries a
    /// connect URL and left untouched otherwise.
    pub fn build_effective_capabilities(
        &self,
        slot: &Capabilities,
        udid: &str,
        device: Option<&DeviceInfo>,
    ) -> Capabilities {
        let mut effective = slot.clone();

        if let Some(device) = device {
            info!(model = %device.model, %udid, "identified device");
            if let Some(url) = &device.remote_connect_url {
                info!(remote_url = %url, %udid, "identified remote URL");
                effective.insert(REMOTE_URL, url.as_str());
            }
        }

        effective
    }
}
