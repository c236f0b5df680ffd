//! Reservation coordinator: reserve/release managed devices for sessions.
//!
//! From this node's viewpoint each udid moves through
//! `Unknown -> {Available, Busy} -> Reserved -> Available`. The farm
//! service is the only source of truth for busy/reserved state; the
//! coordinator never caches it beyond a single call. It does keep a local
//! table of the reservations this node holds so that two sessions on the
//! same node can never hold the same device.
//!
//! Every farm call may be bounded by `call_timeout`. A timeout is handled
//! exactly like a transport failure: checks fail closed, reserve fails.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use devgrid_core::{DeviceInfo, SessionId};

use crate::error::{DeviceFarmError, FarmResult, ReservationError, ReservationResult};
use crate::farm::{DeviceFarm, ReleaseOutcome, ReserveOutcome};

#[derive(Debug, Clone, Default)]
pub struct CoordinatorConfig {
    /// Upper bound on a single farm call.
    pub call_timeout: Option<Duration>,
}

pub struct DeviceReservationCoordinator {
    farm: Arc<dyn DeviceFarm>,
    config: CoordinatorConfig,
    /// Reservations held by this node: udid → holding session.
    reservations: Mutex<HashMap<String, SessionId>>,
}

impl DeviceReservationCoordinator {
    pub fn new(farm: Arc<dyn DeviceFarm>, config: CoordinatorConfig) -> Self {
        Self {
            farm,
            config,
            reservations: Mutex::new(HashMap::new()),
        }
    }

    /// Whether the farm reports the device as free.
    ///
    /// Any error or timeout is reported as unavailable.
    pub async fn is_available(&self, udid: &str) -> bool {
        match self.call(self.farm.device_available(udid)).await {
            Ok(available) => {
                debug!(%udid, available, "device availability checked");
                available
            }
            Err(e) => {
                warn!(%udid, error = %e, "availability check failed, treating device as unavailable");
                false
            }
        }
    }

    /// Reserve `udid` on behalf of `holder`.
    ///
    /// No retry is attempted. A device already held by this node is refused
    /// without contacting the farm.
    pub async fn reserve(&self, udid: &str, holder: SessionId) -> ReservationResult<()> {
        {
            let mut reservations = self.reservations.lock().await;
            if let Some(current) = reservations.get(udid) {
                warn!(%udid, %current, requested_by = %holder, "device already reserved by this node");
                return Err(ReservationError::Unavailable {
                    udid: udid.to_string(),
                });
            }
            // Hold the udid locally while the farm call is in flight.
            reservations.insert(udid.to_string(), holder);
        }

        let result = self.call(self.farm.reserve(udid)).await;

        let outcome = match result {
            Ok(ReserveOutcome::Reserved) => {
                info!(%udid, session = %holder, "device reserved");
                return Ok(());
            }
            Ok(ReserveOutcome::AlreadyReserved) => {
                info!(%udid, session = %holder, "device reservation lost to another party");
                Err(ReservationError::Unavailable {
                    udid: udid.to_string(),
                })
            }
            Err(source) => {
                warn!(%udid, session = %holder, error = %source, "device reservation failed");
                Err(ReservationError::Transport {
                    udid: udid.to_string(),
                    source,
                })
            }
        };

        self.forget(udid, holder).await;
        outcome
    }

    /// Release `udid`. The local reservation is dropped whatever the farm
    /// answers, so a stuck farm reservation never pins local state.
    pub async fn release(&self, udid: &str) -> ReservationResult<ReleaseOutcome> {
        let holder = self.reservations.lock().await.remove(udid);

        match self.call(self.farm.release(udid)).await {
            Ok(outcome) => {
                if outcome == ReleaseOutcome::NotReserved {
                    debug!(%udid, "release of a device that was not reserved");
                }
                info!(%udid, session = ?holder, ?outcome, "device released");
                Ok(outcome)
            }
            Err(source) => Err(ReservationError::Transport {
                udid: udid.to_string(),
                source,
            }),
        }
    }

    /// Device metadata. Unknown devices and farm failures both yield `None`.
    pub async fn lookup(&self, udid: &str) -> Option<DeviceInfo> {
        match self.call(self.farm.device_info(udid)).await {
            Ok(Some(info)) => Some(info),
            Ok(None) => {
                debug!(%udid, "device unknown to the farm");
                None
            }
            Err(e) => {
                warn!(%udid, error = %e, "device lookup failed");
                None
            }
        }
    }

    /// Session currently holding `udid` on this node.
    pub async fn holder(&self, udid: &str) -> Option<SessionId> {
        self.reservations.lock().await.get(udid).copied()
    }

    /// Snapshot of the local reservation table.
    pub async fn reservations(&self) -> Vec<(String, SessionId)> {
        let mut held: Vec<_> = self
            .reservations
            .lock()
            .await
            .iter()
            .map(|(udid, session)| (udid.clone(), *session))
            .collect();
        held.sort();
        held
    }

    async fn forget(&self, udid: &str, holder: SessionId) {
        let mut reservations = self.reservations.lock().await;
        if reservations.get(udid) == Some(&holder) {
            reservations.remove(udid);
        }
    }

    async fn call<T, F>(&self, fut: F) -> FarmResult<T>
    where
        F: Future<Output = FarmResult<T>>,
    {
        match self.config.call_timeout {
            Some(limit) => tokio::time::timeout(limit, fut)
                .await
                .map_err(|_| DeviceFarmError::Timeout(limit))?,
            None => fut.await,
        }
    }
}
