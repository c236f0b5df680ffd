//! Session lifecycle against a device farm.
//!
//! Covers admission, reservation on start, rollback on failed start,
//! effective capability views, and release on end.

mod common;

use std::sync::Arc;

use async_trait::async_trait;

use common::*;
use devgrid_core::capability::REMOTE_URL;
use devgrid_core::{Capabilities, CapabilityValue, DeviceInfo};
use devgrid_farm::{
    CallCounts, DeviceFarm, DeviceFarmError, FarmResult, MemoryDeviceFarm, ReleaseOutcome,
    ReserveOutcome,
};
use devgrid_node::{Rejection, SessionError, SlotState};

// ── Admission ────────────────────────────────────────────────────

#[tokio::test]
async fn available_device_is_allocated_and_reserved_once() {
    init_tracing();
    let devices = [("ABC123", "Pixel 7")];
    let farm = farm_with(&devices).await;
    let node = device_node(&device_config("n1", 1, &devices), farm.clone());

    let mut session = node.allocate(android_request()).await.expect("session");
    assert_eq!(node.used_slots().await, 1);
    assert_eq!(farm.calls().reserve, 0);

    node.on_session_start(&mut session).await.unwrap();
    assert_eq!(farm.calls().reserve, 1);
    assert!(farm.is_reserved("ABC123").await);
    assert_eq!(session.reserved_device(), Some("ABC123"));

    // Second request while the only slot is taken.
    assert_eq!(
        node.try_allocate(android_request()).await.unwrap_err(),
        Rejection::CapacityExhausted
    );
}

#[tokio::test]
async fn busy_device_is_not_allocated() {
    init_tracing();
    let devices = [("ABC123", "Pixel 7")];
    let farm = farm_with(&devices).await;
    farm.set_busy("ABC123", true).await;
    let node = device_node(&device_config("n1", 1, &devices), farm.clone());

    assert!(node.allocate(android_request()).await.is_none());
    assert_eq!(node.used_slots().await, 0);
    assert_eq!(farm.calls().available, 1);
    assert_eq!(farm.calls().reserve, 0);
}

#[tokio::test]
async fn busy_device_is_skipped_for_the_next_slot() {
    init_tracing();
    let devices = [("ABC123", "Pixel 7"), ("DEF456", "Galaxy S23")];
    let farm = farm_with(&devices).await;
    farm.set_busy("ABC123", true).await;
    let node = device_node(&device_config("n1", 2, &devices), farm.clone());

    let session = node.allocate(android_request()).await.expect("second slot");
    assert_eq!(session.slot(), 1);
    assert_eq!(session.udid(), Some("DEF456"));
    assert_eq!(farm.calls().available, 2);
    assert_eq!(
        node.slot_states().await,
        vec![SlotState::Free, SlotState::Claimed(session.id())]
    );
}

#[tokio::test]
async fn unreachable_farm_fails_closed() {
    init_tracing();
    let devices = [("ABC123", "Pixel 7")];
    let farm = farm_with(&devices).await;
    farm.set_offline(true);
    let node = device_node(&device_config("n1", 1, &devices), farm.clone());

    assert_eq!(
        node.try_allocate(android_request()).await.unwrap_err(),
        Rejection::NoViableSlot
    );
    assert_eq!(node.used_slots().await, 0);
}

#[tokio::test]
async fn opted_out_request_skips_the_farm() {
    init_tracing();
    let devices = [("ABC123", "Pixel 7")];
    let farm = farm_with(&devices).await;
    farm.set_busy("ABC123", true).await;
    let node = device_node(&device_config("n1", 1, &devices), farm.clone());

    let mut request = android_request();
    request.insert("enableStf", false);
    let mut session = node.allocate(request).await.expect("unmanaged session");
    node.on_session_start(&mut session).await.unwrap();

    assert_eq!(farm.calls(), CallCounts::default());
    assert_eq!(session.reserved_device(), None);
    // A device slot still gets its own copy of the capabilities.
    assert!(session.has_effective_view());
    assert!(!session.effective_capabilities().contains_key(REMOTE_URL));

    node.on_session_end(session).await;
    assert_eq!(farm.calls().release, 0);
    assert_eq!(node.used_slots().await, 0);
}

// ── Start failures ───────────────────────────────────────────────

#[tokio::test]
async fn lost_reservation_race_rolls_back() {
    init_tracing();
    let devices = [("ABC123", "Pixel 7")];
    let farm = farm_with(&devices).await;
    let node = device_node(&device_config("n1", 1, &devices), farm.clone());

    let mut session = node.allocate(android_request()).await.expect("session");
    // Another grid grabs the device between the check and the reserve.
    assert!(farm.reserve_externally("ABC123").await);

    let err = node.on_session_start(&mut session).await.unwrap_err();
    assert_eq!(
        err,
        SessionError::ReservationConflict {
            udid: "ABC123".to_string()
        }
    );
    assert_eq!(node.used_slots().await, 0);
    assert_eq!(node.slot_states().await, vec![SlotState::Free]);

    node.on_session_end(session).await;
    assert_eq!(farm.calls().release, 0);
    assert!(farm.is_reserved("ABC123").await, "other party keeps the device");
}

#[tokio::test]
async fn transport_failure_on_reserve_rolls_back() {
    init_tracing();
    let devices = [("ABC123", "Pixel 7")];
    let farm = farm_with(&devices).await;
    let node = device_node(&device_config("n1", 1, &devices), farm.clone());

    let mut session = node.allocate(android_request()).await.expect("session");
    farm.set_offline(true);

    let err = node.on_session_start(&mut session).await.unwrap_err();
    assert!(matches!(
        err,
        SessionError::Transport {
            source: DeviceFarmError::Transport(_),
            ..
        }
    ));
    assert_eq!(node.used_slots().await, 0);
    assert!(node.hooks().coordinator().reservations().await.is_empty());

    // The node serves again once the farm is back.
    farm.set_offline(false);
    let mut retry = node.allocate(android_request()).await.expect("slot is free again");
    node.on_session_start(&mut retry).await.unwrap();
}

// ── Effective capabilities ───────────────────────────────────────

#[tokio::test]
async fn effective_view_carries_remote_url() {
    init_tracing();
    let devices = [("ABC123", "Pixel 7")];
    let farm = farm_with(&devices).await;
    let node = device_node(&device_config("n1", 1, &devices), farm.clone());

    let template_before = node.slot_capabilities(0).unwrap().clone();
    let mut session = node.allocate(android_request()).await.expect("session");
    node.on_session_start(&mut session).await.unwrap();

    let effective = session.effective_capabilities();
    assert_eq!(effective.str(REMOTE_URL).unwrap(), Some("ABC123.farm:7401"));
    assert_eq!(effective.str("deviceName").unwrap(), Some("Pixel 7"));
    assert!(!std::ptr::eq(effective, session.slot_capabilities()));

    // Slot template is untouched.
    assert_eq!(node.slot_capabilities(0).unwrap(), &template_before);
    assert!(!session.slot_capabilities().contains_key(REMOTE_URL));
}

/// Farm that reserves anything but never knows device metadata.
struct NoMetadataFarm(MemoryDeviceFarm);

#[async_trait]
impl DeviceFarm for NoMetadataFarm {
    async fn device_available(&self, udid: &str) -> FarmResult<bool> {
        self.0.device_available(udid).await
    }

    async fn device_info(&self, _udid: &str) -> FarmResult<Option<DeviceInfo>> {
        Ok(None)
    }

    async fn reserve(&self, udid: &str) -> FarmResult<ReserveOutcome> {
        self.0.reserve(udid).await
    }

    async fn release(&self, udid: &str) -> FarmResult<ReleaseOutcome> {
        self.0.release(udid).await
    }
}

#[tokio::test]
async fn missing_device_metadata_still_starts() {
    init_tracing();
    let devices = [("ABC123", "Pixel 7")];
    let inner = MemoryDeviceFarm::new();
    inner.add_device("ABC123", "Pixel 7", Some("ABC123.farm:7401")).await;
    let farm = Arc::new(NoMetadataFarm(inner));
    let node = DeviceNode::from_config(&device_config("n1", 1, &devices), farm.clone()).unwrap();

    let mut session = node.allocate(android_request()).await.expect("session");
    node.on_session_start(&mut session).await.unwrap();

    assert!(session.is_started());
    assert!(!session.effective_capabilities().contains_key(REMOTE_URL));
    assert_eq!(session.reserved_device(), Some("ABC123"));

    node.on_session_end(session).await;
    assert!(!farm.0.is_reserved("ABC123").await);
}

// ── Session end ──────────────────────────────────────────────────

#[tokio::test]
async fn start_then_end_restores_node_and_device() {
    init_tracing();
    let devices = [("ABC123", "Pixel 7")];
    let farm = farm_with(&devices).await;
    let node = device_node(&device_config("n1", 1, &devices), farm.clone());

    let mut session = node.allocate(android_request()).await.expect("session");
    node.on_session_start(&mut session).await.unwrap();
    node.on_session_end(session).await;

    assert_eq!(node.used_slots().await, 0);
    assert_eq!(node.slot_states().await, vec![SlotState::Free]);
    let calls = farm.calls();
    assert_eq!(calls.reserve, 1);
    assert_eq!(calls.release, 1);
    assert!(!farm.is_reserved("ABC123").await);
    assert_eq!(node.hooks().coordinator().holder("ABC123").await, None);
}

#[tokio::test]
async fn release_failure_does_not_pin_the_slot() {
    init_tracing();
    let devices = [("ABC123", "Pixel 7")];
    let farm = farm_with(&devices).await;
    let node = device_node(&device_config("n1", 1, &devices), farm.clone());

    let mut session = node.allocate(android_request()).await.expect("session");
    node.on_session_start(&mut session).await.unwrap();

    farm.set_offline(true);
    node.on_session_end(session).await;

    assert_eq!(node.used_slots().await, 0);
    assert_eq!(node.slot_states().await, vec![SlotState::Free]);
    assert_eq!(farm.calls().release, 1);
    assert!(farm.is_reserved("ABC123").await, "farm never heard the release");
}

#[tokio::test]
async fn ending_an_unstarted_session_frees_the_slot() {
    init_tracing();
    let devices = [("ABC123", "Pixel 7")];
    let farm = farm_with(&devices).await;
    let node = device_node(&device_config("n1", 1, &devices), farm.clone());

    let session = node.allocate(android_request()).await.expect("session");
    node.on_session_end(session).await;

    assert_eq!(node.used_slots().await, 0);
    assert_eq!(farm.calls().release, 0);
}

// ── Node health and config ───────────────────────────────────────

#[tokio::test]
async fn down_node_never_contacts_the_farm() {
    init_tracing();
    let devices = [("ABC123", "Pixel 7")];
    let farm = farm_with(&devices).await;
    let node = device_node(&device_config("n1", 1, &devices), farm.clone());
    node.set_down(true);

    assert_eq!(
        node.try_allocate(android_request()).await.unwrap_err(),
        Rejection::NodeDown
    );
    assert_eq!(farm.calls(), CallCounts::default());
}

#[tokio::test]
async fn unmatched_request_never_contacts_the_farm() {
    init_tracing();
    let devices = [("ABC123", "Pixel 7")];
    let farm = farm_with(&devices).await;
    let node = device_node(&device_config("n1", 1, &devices), farm.clone());

    let request = Capabilities::from_iter([("platformName", CapabilityValue::from("iOS"))]);
    assert_eq!(
        node.try_allocate(request).await.unwrap_err(),
        Rejection::NoMatchingSlot
    );
    assert_eq!(farm.calls().available, 0);
}

#[tokio::test]
async fn disabled_integration_ignores_device_state() {
    init_tracing();
    let mut config = device_config("n1", 1, &[("ABC123", "Pixel 7")]);
    config.device_farm.enabled = false;
    let farm = farm_with(&[("ABC123", "Pixel 7")]).await;
    farm.set_busy("ABC123", true).await;
    let node = device_node(&config, farm.clone());

    let mut session = node.allocate(android_request()).await.expect("session");
    node.on_session_start(&mut session).await.unwrap();
    node.on_session_end(session).await;
    assert_eq!(farm.calls(), CallCounts::default());
}

#[tokio::test]
async fn request_payload_from_json() {
    init_tracing();
    let devices = [("ABC123", "Pixel 7")];
    let farm = farm_with(&devices).await;
    let node = device_node(&device_config("n1", 1, &devices), farm.clone());

    let payload = serde_json::json!({
        "platformName": "android",
        "deviceName": "Pixel 7",
        "enableStf": true,
    });
    let request = Capabilities::from_json(&payload.to_string()).unwrap();

    let mut session = node.allocate(request).await.expect("session");
    node.on_session_start(&mut session).await.unwrap();
    assert_eq!(session.reserved_device(), Some("ABC123"));
    assert_eq!(
        session.requested_capabilities().bool("enableStf").unwrap(),
        Some(true)
    );
}
