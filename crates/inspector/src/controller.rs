//! Enumeration controller
//!
//! Orchestrates scans and reacts to attach, detach and permission events.
//! Every entry point runs synchronously on the caller's thread; the owner is
//! expected to deliver events one at a time, in arrival order.

use crate::permission::PermissionCoordinator;
use crate::provider::{PermissionBroker, UsbProvider};
use crate::snapshot::build_snapshot;
use std::collections::{HashMap, HashSet};
use types::{DeviceIdentity, DeviceSnapshot, PermissionState, ScanEntry, ScanReport};
use tracing::{debug, info, warn};

pub struct EnumerationController<P: UsbProvider, B: PermissionBroker> {
    provider: P,
    broker: B,
    permissions: PermissionCoordinator,
    /// Latest successful snapshot per device
    snapshots: HashMap<DeviceIdentity, DeviceSnapshot>,
    running: bool,
}

impl<P: UsbProvider, B: PermissionBroker> EnumerationController<P, B> {
    pub fn new(provider: P, broker: B) -> Self {
        Self {
            provider,
            broker,
            permissions: PermissionCoordinator::new(),
            snapshots: HashMap::new(),
            running: false,
        }
    }

    /// Begin handling events and perform the initial scan
    pub fn start(&mut self) -> ScanReport {
        self.running = true;
        info!("Enumeration controller started");
        self.run_scan()
    }

    /// Stop handling events and drop all tracked state
    pub fn stop(&mut self) {
        self.running = false;
        self.permissions.clear();
        self.snapshots.clear();
        info!("Enumeration controller stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Scan every attached device
    ///
    /// Never fails as a whole: per-device problems become entries, and a
    /// listing failure is reported through `ScanReport::listing_error`.
    pub fn run_scan(&mut self) -> ScanReport {
        let devices = match self.provider.list_devices() {
            Ok(devices) => devices,
            Err(e) => {
                warn!("Failed to list USB devices: {}", e);
                return ScanReport::listing_failed(e.to_string());
            }
        };

        if devices.is_empty() {
            info!("No USB devices found");
        } else {
            debug!("Scanning {} device(s)", devices.len());
        }

        // Devices that vanished without a detach notification
        let present: HashSet<&DeviceIdentity> = devices.iter().collect();
        self.permissions.retain(|identity| present.contains(identity));
        self.snapshots.retain(|identity, _| present.contains(identity));
        debug!("Tracking permission state for {} device(s)", self.permissions.len());

        let entries = devices
            .iter()
            .map(|identity| self.scan_device(identity))
            .collect();

        ScanReport::from_entries(entries)
    }

    /// A device was attached: rescan everything
    ///
    /// Returns `None` if the controller is not running.
    pub fn on_attach(&mut self) -> Option<ScanReport> {
        if !self.running {
            warn!("Ignoring attach event, controller not running");
            return None;
        }
        info!("Device attached, rescanning");
        Some(self.run_scan())
    }

    /// A device was detached: drop its state without rescanning
    ///
    /// Returns true if anything was tracked for the identity.
    pub fn on_detach(&mut self, identity: &DeviceIdentity) -> bool {
        if !self.running {
            warn!("Ignoring detach event, controller not running");
            return false;
        }
        let had_permission = self.permissions.forget(identity).is_some();
        let had_snapshot = self.snapshots.remove(identity).is_some();
        info!("Device detached: {}", identity);
        had_permission || had_snapshot
    }

    /// Deliver a broker outcome
    ///
    /// A grant reads the one device and returns its entry; a denial returns
    /// a `Denied` entry. Stale outcomes return `None`.
    pub fn on_permission_result(&mut self, identity: &DeviceIdentity, granted: bool) -> Option<ScanEntry> {
        if !self.running {
            warn!("Ignoring permission result, controller not running");
            return None;
        }
        match self.permissions.grant_result(identity, granted)? {
            PermissionState::Granted => Some(self.read_device(identity)),
            PermissionState::Denied => Some(ScanEntry::Denied {
                identity: identity.clone(),
            }),
            PermissionState::Unknown | PermissionState::Requested => None,
        }
    }

    /// Latest snapshot for a device, if one was read this session
    pub fn snapshot(&self, identity: &DeviceIdentity) -> Option<&DeviceSnapshot> {
        self.snapshots.get(identity)
    }

    pub fn permission_state(&self, identity: &DeviceIdentity) -> Option<PermissionState> {
        self.permissions.state(identity)
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn provider_mut(&mut self) -> &mut P {
        &mut self.provider
    }

    pub fn broker(&self) -> &B {
        &self.broker
    }

    fn scan_device(&mut self, identity: &DeviceIdentity) -> ScanEntry {
        match self
            .permissions
            .evaluate(identity, &self.provider, &mut self.broker)
        {
            PermissionState::Granted => self.read_device(identity),
            PermissionState::Denied => ScanEntry::Denied {
                identity: identity.clone(),
            },
            PermissionState::Requested | PermissionState::Unknown => ScanEntry::PendingPermission {
                identity: identity.clone(),
            },
        }
    }

    fn read_device(&mut self, identity: &DeviceIdentity) -> ScanEntry {
        let result = build_snapshot(identity, &self.provider);
        match &result {
            Ok(snapshot) => {
                self.snapshots.insert(identity.clone(), snapshot.clone());
            }
            Err(e) => {
                warn!("Could not read {}: {}", identity, e);
                self.snapshots.remove(identity);
            }
        }
        ScanEntry::from_build(identity.clone(), result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockDevice, MockProvider, RecordingBroker};

    fn controller(devices: Vec<MockDevice>) -> EnumerationController<MockProvider, RecordingBroker> {
        EnumerationController::new(MockProvider::new(devices), RecordingBroker::default())
    }

    #[test]
    fn test_events_ignored_before_start() {
        let device = MockDevice::mass_storage(1, 0x1234, 0x5678).without_permission();
        let identity = device.identity.clone();
        let mut controller = controller(vec![device]);

        assert!(controller.on_attach().is_none());
        assert!(!controller.on_detach(&identity));
        assert!(controller.on_permission_result(&identity, true).is_none());
    }

    #[test]
    fn test_stop_clears_state() {
        let device = MockDevice::mass_storage(1, 0x1234, 0x5678);
        let identity = device.identity.clone();
        let mut controller = controller(vec![device]);

        controller.start();
        assert!(controller.snapshot(&identity).is_some());
        assert_eq!(
            controller.permission_state(&identity),
            Some(PermissionState::Granted)
        );

        controller.stop();
        assert!(!controller.is_running());
        assert!(controller.snapshot(&identity).is_none());
        assert!(controller.permission_state(&identity).is_none());
    }

    #[test]
    fn test_vanished_devices_are_pruned() {
        let device = MockDevice::mass_storage(1, 0x1234, 0x5678).without_permission();
        let identity = device.identity.clone();
        let mut controller = controller(vec![device]);

        controller.start();
        assert_eq!(
            controller.permission_state(&identity),
            Some(PermissionState::Requested)
        );

        // Unplugged without a detach notification
        controller.provider_mut().unplug(identity.device_id);
        let report = controller.run_scan();

        assert!(report.is_empty());
        assert_eq!(controller.permissions.len(), 0);
        assert!(controller.permission_state(&identity).is_none());
        assert!(controller.on_permission_result(&identity, true).is_none());
    }

    #[test]
    fn test_failed_reread_drops_old_snapshot() {
        let device = MockDevice::mass_storage(1, 0x1234, 0x5678);
        let identity = device.identity.clone();
        let mut controller = controller(vec![device]);

        controller.start();
        assert!(controller.snapshot(&identity).is_some());

        controller
            .provider_mut()
            .set_open_error(identity.device_id, Some(types::ProviderError::Busy));
        let report = controller.run_scan();

        assert!(matches!(report.entries[0], ScanEntry::OpenFailed { .. }));
        assert!(controller.snapshot(&identity).is_none());
    }
}
