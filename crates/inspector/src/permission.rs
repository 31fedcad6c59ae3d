//! Permission coordinator
//!
//! Tracks a [`PermissionState`] per device identity and drives it through
//! the consent handshake:
//!
//! ```text
//! Unknown ──evaluate──► Granted            (provider already holds access)
//!    │
//!    └────evaluate──► Requested ──grant_result(true)──► Granted
//!                         │
//!                         └──grant_result(false)──► Denied ──evaluate──► Requested
//! ```
//!
//! Outcomes for identities that are not in `Requested` are stale and dropped.
//! All transitions happen through `&mut self`, so the single worker that owns
//! the coordinator serializes them per identity.

use crate::provider::{PermissionBroker, UsbProvider};
use std::collections::HashMap;
use types::{DeviceIdentity, PermissionState};
use tracing::{debug, info};

#[derive(Debug, Default)]
pub struct PermissionCoordinator {
    states: HashMap<DeviceIdentity, PermissionState>,
}

impl PermissionCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance the state for `identity` as part of a scan
    ///
    /// Issues at most one broker request per `Requested` episode.
    pub fn evaluate<P, B>(
        &mut self,
        identity: &DeviceIdentity,
        provider: &P,
        broker: &mut B,
    ) -> PermissionState
    where
        P: UsbProvider + ?Sized,
        B: PermissionBroker + ?Sized,
    {
        let state = self
            .states
            .entry(identity.clone())
            .or_insert(PermissionState::Unknown);

        match *state {
            PermissionState::Unknown | PermissionState::Denied => {
                if provider.has_permission(identity) {
                    debug!("Permission already held for {}", identity);
                    *state = PermissionState::Granted;
                } else {
                    info!("Requesting permission for {}", identity);
                    *state = PermissionState::Requested;
                    broker.request_permission(identity);
                }
            }
            PermissionState::Requested => {
                debug!("Permission request for {} still outstanding", identity);
            }
            PermissionState::Granted => {}
        }

        *state
    }

    /// Apply a broker outcome
    ///
    /// Returns the new state, or `None` when the outcome is stale (identity
    /// untracked or not waiting on a request).
    pub fn grant_result(&mut self, identity: &DeviceIdentity, granted: bool) -> Option<PermissionState> {
        match self.states.get_mut(identity) {
            Some(state) if *state == PermissionState::Requested => {
                *state = if granted {
                    PermissionState::Granted
                } else {
                    PermissionState::Denied
                };
                info!("Permission {} for {}", state.label(), identity);
                Some(*state)
            }
            Some(state) => {
                debug!(
                    "Ignoring stale permission result for {} (state: {})",
                    identity,
                    state.label()
                );
                None
            }
            None => {
                debug!("Ignoring permission result for untracked device {}", identity);
                None
            }
        }
    }

    /// Current state, if the identity is tracked
    pub fn state(&self, identity: &DeviceIdentity) -> Option<PermissionState> {
        self.states.get(identity).copied()
    }

    /// Stop tracking an identity
    pub fn forget(&mut self, identity: &DeviceIdentity) -> Option<PermissionState> {
        self.states.remove(identity)
    }

    /// Keep only identities for which `keep` returns true
    pub fn retain(&mut self, mut keep: impl FnMut(&DeviceIdentity) -> bool) {
        self.states.retain(|identity, _| keep(identity));
    }

    pub fn clear(&mut self) {
        self.states.clear();
    }

    /// Number of devices with a tracked state
    pub(crate) fn len(&self) -> usize {
        self.states.len()
    }
}
