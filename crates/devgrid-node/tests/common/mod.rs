//! Shared fixtures for node integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Once};

use devgrid_core::{Capabilities, CapabilityValue, NodeConfig};
use devgrid_farm::MemoryDeviceFarm;
use devgrid_node::{DeviceSessionHooks, SessionAllocator};

static TRACING_INIT: Once = Once::new();

/// Initialize tracing for test output, controlled by `RUST_LOG`.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init()
            .ok();
    });
}

pub type DeviceNode = SessionAllocator<DeviceSessionHooks>;

/// Node config with the farm enabled and one slot per `(udid, model)`.
pub fn device_config(node_id: &str, max_sessions: u32, devices: &[(&str, &str)]) -> NodeConfig {
    let mut toml = format!(
        r#"
[node]
id = "{node_id}"
max_sessions = {max_sessions}

[device_farm]
enabled = true
call_timeout = "2s"
"#
    );
    for (udid, model) in devices {
        toml.push_str(&format!(
            r#"
[[slots]]
[slots.capabilities]
platformName = "ANDROID"
deviceName = "{model}"
udid = "{udid}"
"#
        ));
    }
    NodeConfig::from_toml_str(&toml).expect("valid test config")
}

/// A farm that knows every device, each publishing `<udid>.farm:7401`.
pub async fn farm_with(devices: &[(&str, &str)]) -> Arc<MemoryDeviceFarm> {
    let farm = Arc::new(MemoryDeviceFarm::new());
    for (udid, model) in devices {
        let url = format!("{udid}.farm:7401");
        farm.add_device(udid, model, Some(&url)).await;
    }
    farm
}

pub fn device_node(config: &NodeConfig, farm: Arc<MemoryDeviceFarm>) -> DeviceNode {
    DeviceNode::from_config(config, farm).expect("node builds from config")
}

pub fn android_request() -> Capabilities {
    Capabilities::from_iter([("platformName", CapabilityValue::from("ANDROID"))])
}
