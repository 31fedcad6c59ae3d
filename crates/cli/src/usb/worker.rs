//! USB worker thread
//!
//! Owns the libusb context and the enumeration controller. Commands from the
//! Tokio side are polled between `handle_events` calls, so every controller
//! entry point runs on this one thread, in arrival order.

use crate::filter::DeviceFilter;
use crate::usb::broker::ChannelBroker;
use crate::usb::hotplug::{ArrivalDebounce, HotplugNotice, register_hotplug};
use crate::usb::provider::RusbProvider;
use common::{InspectorCommand, InspectorEvent, InspectorWorker};
use inspector::{EnumerationController, PermissionBroker, UsbProvider};
use rusb::{Context, Registration, UsbContext};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use types::DeviceIdentity;

const EVENT_TIMEOUT: Duration = Duration::from_millis(100);

/// Settings the worker needs from the loaded configuration
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub filters: Vec<DeviceFilter>,
    pub hotplug: bool,
    /// Quiet period after the last arrival before rescanning
    pub hotplug_debounce: Duration,
}

/// Provider side of a hot-plug departure
pub trait DeviceRegistry {
    /// Drop the device at (bus, address), returning the identity it was listed under
    fn forget(&mut self, bus: u8, address: u8) -> Option<DeviceIdentity>;
}

impl DeviceRegistry for RusbProvider {
    fn forget(&mut self, bus: u8, address: u8) -> Option<DeviceIdentity> {
        RusbProvider::forget(self, bus, address)
    }
}

/// React to one hot-plug notice
///
/// Arrivals only arm the debounce. A departure of a listed device drops its
/// state at once and yields the event to emit.
pub fn apply_notice<P, B>(
    controller: &mut EnumerationController<P, B>,
    arrivals: &mut ArrivalDebounce,
    notice: HotplugNotice,
    now: Instant,
) -> Option<InspectorEvent>
where
    P: UsbProvider + DeviceRegistry,
    B: PermissionBroker,
{
    match notice {
        HotplugNotice::Arrived => {
            arrivals.note(now);
            None
        }
        HotplugNotice::Left { bus, address } => {
            let Some(identity) = controller.provider_mut().forget(bus, address) else {
                debug!("Ignoring departure of unlisted device: bus={}, addr={}", bus, address);
                return None;
            };
            controller.on_detach(&identity);
            Some(InspectorEvent::DeviceDetached(identity))
        }
    }
}

/// Rescan once arrivals have been quiet for the debounce period
pub fn debounced_rescan<P, B>(
    controller: &mut EnumerationController<P, B>,
    arrivals: &mut ArrivalDebounce,
    now: Instant,
) -> Option<InspectorEvent>
where
    P: UsbProvider,
    B: PermissionBroker,
{
    if !arrivals.due(now) {
        return None;
    }
    controller.on_attach().map(InspectorEvent::ScanCompleted)
}

pub struct InspectorWorkerThread {
    controller: EnumerationController<RusbProvider, ChannelBroker>,
    worker: InspectorWorker,
    hotplug_rx: async_channel::Receiver<HotplugNotice>,
    _hotplug_registration: Option<Registration<Context>>,
    arrivals: ArrivalDebounce,
}

impl InspectorWorkerThread {
    pub fn new(worker: InspectorWorker, settings: WorkerSettings) -> Result<Self, rusb::Error> {
        let provider = RusbProvider::new(settings.filters)?;

        let (hotplug_tx, hotplug_rx) = async_channel::bounded(64);
        let registration = if settings.hotplug {
            register_hotplug(provider.context(), hotplug_tx)?
        } else {
            info!("Hot-plug disabled by configuration");
            None
        };

        let broker = ChannelBroker::new(worker.event_tx.clone());

        Ok(Self {
            controller: EnumerationController::new(provider, broker),
            worker,
            hotplug_rx,
            _hotplug_registration: registration,
            arrivals: ArrivalDebounce::new(settings.hotplug_debounce),
        })
    }

    /// Run until Shutdown is received or every bridge handle is gone
    pub fn run(mut self) -> Result<(), rusb::Error> {
        info!("USB worker thread started");

        let initial = self.controller.start();
        self.emit(InspectorEvent::ScanCompleted(initial));

        loop {
            match self.worker.try_recv_command() {
                Some(InspectorCommand::Shutdown) => {
                    info!("USB worker shutting down");
                    break;
                }
                Some(cmd) => self.handle_command(cmd),
                None if self.worker.is_disconnected() => {
                    info!("Command channel closed, USB worker shutting down");
                    break;
                }
                None => {}
            }

            match self
                .controller
                .provider()
                .context()
                .handle_events(Some(EVENT_TIMEOUT))
            {
                Ok(()) => {}
                Err(rusb::Error::Interrupted) => {
                    debug!("USB event handling interrupted");
                }
                Err(e) => {
                    warn!("Error handling USB events: {}", e);
                    std::thread::sleep(EVENT_TIMEOUT);
                }
            }

            self.drain_hotplug();
            self.process_debounced_rescan();
        }

        self.controller.stop();
        info!("USB worker thread stopped");
        Ok(())
    }

    fn drain_hotplug(&mut self) {
        while let Ok(notice) = self.hotplug_rx.try_recv() {
            let event = apply_notice(&mut self.controller, &mut self.arrivals, notice, Instant::now());
            if let Some(event) = event {
                self.emit(event);
            }
        }
    }

    fn process_debounced_rescan(&mut self) {
        if let Some(event) = debounced_rescan(&mut self.controller, &mut self.arrivals, Instant::now()) {
            self.emit(event);
        }
    }

    /// Handle a command from the Tokio runtime
    fn handle_command(&mut self, cmd: InspectorCommand) {
        // Keep the worker alive if a descriptor walk panics
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            self.handle_command_inner(cmd)
        }));

        if let Err(e) = result {
            error!("Panic in USB command handler: {:?}", e);
        }
    }

    fn handle_command_inner(&mut self, cmd: InspectorCommand) {
        match cmd {
            InspectorCommand::Scan { response } => {
                let report = self.controller.run_scan();
                debug!("Scan produced {} entries", report.len());
                let _ = response.send(report);
            }

            InspectorCommand::PermissionResult { identity, granted } => {
                debug!("Permission result for {}: granted={}", identity, granted);
                match self.controller.on_permission_result(&identity, granted) {
                    Some(entry) => self.emit(InspectorEvent::DeviceReady(entry)),
                    None => debug!("Ignoring stale permission result for {}", identity),
                }
            }

            // Handled by the run loop
            InspectorCommand::Shutdown => {}
        }
    }

    fn emit(&self, event: InspectorEvent) {
        if let Err(e) = self.worker.send_event(event) {
            error!("Failed to send inspector event: {}", e);
        }
    }
}

/// Spawn the USB worker thread
///
/// The thread runs until a Shutdown command is received, the bridge is
/// dropped, or the USB context cannot be created.
pub fn spawn_inspector_worker(
    worker: InspectorWorker,
    settings: WorkerSettings,
) -> std::thread::JoinHandle<Result<(), rusb::Error>> {
    std::thread::Builder::new()
        .name("usb-worker".to_string())
        .spawn(move || {
            let worker_thread = InspectorWorkerThread::new(worker, settings)?;
            worker_thread.run()
        })
        .expect("Failed to spawn USB worker thread")
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::create_inspector_bridge;
    use inspector::testing::{MockDevice, MockProvider, RecordingBroker};

    impl DeviceRegistry for MockProvider {
        fn forget(&mut self, bus: u8, address: u8) -> Option<DeviceIdentity> {
            let identity = self
                .list_devices()
                .ok()?
                .into_iter()
                .find(|i| i.bus_number == bus && i.device_address == address)?;
            self.unplug(identity.device_id)
        }
    }

    fn controller(devices: Vec<MockDevice>) -> EnumerationController<MockProvider, RecordingBroker> {
        EnumerationController::new(MockProvider::new(devices), RecordingBroker::default())
    }

    fn settings() -> WorkerSettings {
        WorkerSettings {
            filters: Vec::new(),
            hotplug: false,
            hotplug_debounce: Duration::from_millis(500),
        }
    }

    #[test]
    fn test_worker_creation() {
        let (_bridge, worker) = create_inspector_bridge();

        // USB context creation may fail without libusb access
        match InspectorWorkerThread::new(worker, settings()) {
            Ok(thread) => assert!(!thread.controller.is_running()),
            Err(e) => {
                eprintln!("USB worker creation failed (expected without libusb): {}", e);
            }
        }
    }

    #[test]
    fn test_arrival_burst_rescans_once() {
        let mut controller = controller(vec![MockDevice::mass_storage(1, 0x1234, 0x5678)]);
        let mut arrivals = ArrivalDebounce::new(Duration::from_millis(500));
        let t0 = Instant::now();
        controller.start();

        for offset in [0, 100, 200] {
            let at = t0 + Duration::from_millis(offset);
            assert!(apply_notice(&mut controller, &mut arrivals, HotplugNotice::Arrived, at).is_none());
        }

        // Polled every 50ms, as the run loop would
        let mut rescans = Vec::new();
        for tick in 0..=40 {
            let at = t0 + Duration::from_millis(tick * 50);
            if let Some(event) = debounced_rescan(&mut controller, &mut arrivals, at) {
                assert!(matches!(&event, InspectorEvent::ScanCompleted(r) if r.len() == 1));
                rescans.push(tick * 50);
            }
        }

        assert_eq!(rescans, vec![700]);
    }

    #[test]
    fn test_departure_detaches_listed_device() {
        let device = MockDevice::mass_storage(3, 0x1234, 0x5678);
        let identity = device.identity.clone();
        let mut controller = controller(vec![device]);
        let mut arrivals = ArrivalDebounce::new(Duration::from_millis(500));
        let now = Instant::now();
        controller.start();
        assert!(controller.snapshot(&identity).is_some());

        let notice = HotplugNotice::Left {
            bus: identity.bus_number,
            address: identity.device_address,
        };
        let event = apply_notice(&mut controller, &mut arrivals, notice, now);

        assert!(matches!(event, Some(InspectorEvent::DeviceDetached(ref gone)) if *gone == identity));
        assert!(controller.snapshot(&identity).is_none());
        assert!(controller.permission_state(&identity).is_none());

        // Departure never schedules a rescan
        assert!(debounced_rescan(&mut controller, &mut arrivals, now + Duration::from_secs(5)).is_none());
    }

    #[test]
    fn test_departure_of_unlisted_device_is_ignored() {
        let mut controller = controller(vec![MockDevice::mass_storage(3, 0x1234, 0x5678)]);
        let mut arrivals = ArrivalDebounce::new(Duration::from_millis(500));
        controller.start();

        let notice = HotplugNotice::Left { bus: 2, address: 3 };
        assert!(apply_notice(&mut controller, &mut arrivals, notice, Instant::now()).is_none());
        assert_eq!(controller.run_scan().len(), 1);
    }

    #[tokio::test]
    async fn test_worker_scans_and_shuts_down() {
        let (bridge, worker) = create_inspector_bridge();
        let handle = spawn_inspector_worker(worker, settings());

        // Without a USB backend the thread exits before sending anything
        while let Ok(event) = bridge.recv_event().await {
            if let InspectorEvent::ScanCompleted(_) = event {
                let _ = bridge.scan().await;
                let _ = bridge.send_command(InspectorCommand::Shutdown).await;
                break;
            }
        }
        drop(bridge);

        let joined = tokio::task::spawn_blocking(move || handle.join())
            .await
            .unwrap();
        assert!(joined.is_ok());
    }
}
