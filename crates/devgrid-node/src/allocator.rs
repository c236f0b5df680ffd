//! Session allocator: admits requests onto this node's slots.
//!
//! The `SessionAllocator`:
//! - Enforces the node-level `max_sessions` capacity
//! - Walks slots in registration order and claims the first viable one
//! - Runs the per-candidate `pre_check` hook outside the slot lock
//! - Rolls a claim back when the session fails to start
//!
//! Slot state and the used count live behind a single lock per node.
//! Hooks (which may call the device farm) never run while it is held, so
//! a candidate is re-checked after its hook returns and skipped if another
//! allocation claimed it in the meantime.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use devgrid_core::{Capabilities, ConfigError, NodeConfig, SessionId, SlotIndex};
use devgrid_farm::DeviceFarm;

use crate::error::{Rejection, SessionError, SessionResult};
use crate::hooks::{DeviceSessionHooks, NoopHooks, SessionHooks};
use crate::matcher::{CapabilityMatcher, MatchPolicy};
use crate::session::Session;

/// Occupancy of a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Free,
    Claimed(SessionId),
}

/// Mutable per-node state, guarded by one lock.
struct SlotTable {
    states: Vec<SlotState>,
    used: u32,
}

impl SlotTable {
    /// Free `slot` if it is still claimed by `session`.
    fn free(&mut self, slot: SlotIndex, session: SessionId) -> bool {
        match self.states.get_mut(slot) {
            Some(state) if *state == SlotState::Claimed(session) => {
                *state = SlotState::Free;
                self.used -= 1;
                true
            }
            _ => false,
        }
    }

    fn is_claimed_by(&self, slot: SlotIndex, session: SessionId) -> bool {
        self.states.get(slot) == Some(&SlotState::Claimed(session))
    }
}

pub struct SessionAllocator<H = NoopHooks> {
    node_id: String,
    max_sessions: u32,
    /// Slot templates in registration order. Never mutated.
    templates: Vec<Arc<Capabilities>>,
    table: Mutex<SlotTable>,
    matcher: CapabilityMatcher,
    hooks: H,
    down: AtomicBool,
    next_session: AtomicU64,
}

impl<H: SessionHooks> SessionAllocator<H> {
    /// Create an allocator over `slots`, all initially free.
    pub fn new(
        node_id: impl Into<String>,
        max_sessions: u32,
        slots: Vec<Capabilities>,
        matcher: CapabilityMatcher,
        hooks: H,
    ) -> Self {
        let states = vec![SlotState::Free; slots.len()];
        Self {
            node_id: node_id.into(),
            max_sessions,
            templates: slots.into_iter().map(Arc::new).collect(),
            table: Mutex::new(SlotTable { states, used: 0 }),
            matcher,
            hooks,
            down: AtomicBool::new(false),
            next_session: AtomicU64::new(1),
        }
    }

    /// Create an allocator from a node config with custom hooks.
    pub fn with_hooks(config: &NodeConfig, hooks: H) -> Self {
        Self::new(
            config.node.id.clone(),
            config.node.max_sessions,
            config.slots.iter().map(|s| s.capabilities.clone()).collect(),
            CapabilityMatcher::new(MatchPolicy::from_config(config)),
            hooks,
        )
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn max_sessions(&self) -> u32 {
        self.max_sessions
    }

    pub fn hooks(&self) -> &H {
        &self.hooks
    }

    pub fn slot_count(&self) -> usize {
        self.templates.len()
    }

    /// Static capabilities of a slot.
    pub fn slot_capabilities(&self, slot: SlotIndex) -> Option<&Capabilities> {
        self.templates.get(slot).map(|t| t.as_ref())
    }

    pub fn is_down(&self) -> bool {
        self.down.load(Ordering::SeqCst)
    }

    /// Mark the node down (or back up). A down node admits nothing.
    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
        info!(node = %self.node_id, down, "node health flag changed");
    }

    /// Number of claimed slots.
    pub async fn used_slots(&self) -> u32 {
        self.table.lock().await.used
    }

    /// Snapshot of every slot's occupancy.
    pub async fn slot_states(&self) -> Vec<SlotState> {
        self.table.lock().await.states.clone()
    }

    /// Whether any slot could serve the request, ignoring occupancy.
    pub fn has_capability(&self, request: &Capabilities) -> bool {
        self.templates
            .iter()
            .any(|template| self.matcher.matches(template, request))
    }

    /// Claim a slot for `request`, or `None` if the node cannot serve it.
    pub async fn allocate(&self, request: Capabilities) -> Option<Session> {
        match self.try_allocate(request).await {
            Ok(session) => Some(session),
            Err(rejection) => {
                debug!(node = %self.node_id, %rejection, "no session allocated");
                None
            }
        }
    }

    /// Claim the first viable slot for `request` (first fit).
    pub async fn try_allocate(&self, request: Capabilities) -> Result<Session, Rejection> {
        debug!(node = %self.node_id, "trying to create a new session");

        if self.is_down() {
            return Err(Rejection::NodeDown);
        }

        if !self.has_capability(&request) {
            info!(node = %self.node_id, "node has no matching capability");
            return Err(Rejection::NoMatchingSlot);
        }

        if self.at_capacity().await {
            info!(node = %self.node_id, "node has no free slots");
            return Err(Rejection::CapacityExhausted);
        }

        for (index, template) in self.templates.iter().enumerate() {
            if !self.matcher.matches(template, &request) {
                continue;
            }
            if self.table.lock().await.states[index] != SlotState::Free {
                continue;
            }

            if !self.hooks.pre_check(template, &request).await {
                debug!(node = %self.node_id, slot = index, "candidate slot rejected by pre-check");
                continue;
            }

            let id = {
                let mut table = self.table.lock().await;
                if table.used >= self.max_sessions {
                    info!(node = %self.node_id, "node filled up during allocation");
                    return Err(Rejection::CapacityExhausted);
                }
                if table.states[index] != SlotState::Free {
                    debug!(node = %self.node_id, slot = index, "candidate slot claimed concurrently");
                    continue;
                }
                let id = SessionId(self.next_session.fetch_add(1, Ordering::Relaxed));
                table.states[index] = SlotState::Claimed(id);
                table.used += 1;
                id
            };

            info!(node = %self.node_id, slot = index, session = %id, "slot claimed");
            return Ok(Session::new(id, index, Arc::clone(template), request));
        }

        Err(Rejection::NoViableSlot)
    }

    /// Prepare a claimed session before any test traffic.
    ///
    /// On failure the claim is rolled back and the slot is free again.
    pub async fn on_session_start(&self, session: &mut Session) -> SessionResult<()> {
        if session.is_started() {
            return Err(SessionError::AlreadyStarted(session.id()));
        }
        if !self
            .table
            .lock()
            .await
            .is_claimed_by(session.slot(), session.id())
        {
            return Err(SessionError::UnknownSession(session.id()));
        }

        if let Err(e) = self.hooks.post_claim(session).await {
            warn!(node = %self.node_id, session = %session.id(), error = %e, "session start failed, releasing slot");
            self.free_slot(session).await;
            return Err(e);
        }

        session.mark_started();
        info!(node = %self.node_id, session = %session.id(), slot = session.slot(), "session started");
        Ok(())
    }

    /// Tear a session down and free its slot.
    ///
    /// Safe to call after a failed start or more than once for the same
    /// session id: only a slot still claimed by the session is freed.
    pub async fn on_session_end(&self, session: Session) {
        self.hooks.pre_release(&session).await;
        self.free_slot(&session).await;
    }

    async fn free_slot(&self, session: &Session) {
        let freed = self.table.lock().await.free(session.slot(), session.id());
        if freed {
            info!(node = %self.node_id, session = %session.id(), slot = session.slot(), "slot freed");
        } else {
            debug!(node = %self.node_id, session = %session.id(), "slot already freed");
        }
    }

    async fn at_capacity(&self) -> bool {
        self.table.lock().await.used >= self.max_sessions
    }
}

impl SessionAllocator<DeviceSessionHooks> {
    /// Create a device-farm backed allocator from a node config.
    pub fn from_config(config: &NodeConfig, farm: Arc<dyn DeviceFarm>) -> Result<Self, ConfigError> {
        config.validate()?;
        let hooks = DeviceSessionHooks::from_config(config, farm)?;
        Ok(Self::with_hooks(config, hooks))
    }
}
