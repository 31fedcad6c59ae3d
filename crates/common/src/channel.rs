//! Async channel bridge between Tokio runtime and USB worker thread

use async_channel::{Receiver, Sender, bounded};
use types::{DeviceIdentity, ScanEntry, ScanReport};

/// Commands from Tokio runtime to USB worker thread
#[derive(Debug)]
pub enum InspectorCommand {
    /// Run a full scan now
    Scan {
        /// Channel to send the report back
        response: tokio::sync::oneshot::Sender<ScanReport>,
    },

    /// Deliver a permission broker outcome
    PermissionResult {
        identity: DeviceIdentity,
        granted: bool,
    },

    /// Shutdown the USB worker gracefully
    Shutdown,
}

/// Events from the USB worker thread
#[derive(Debug, Clone)]
pub enum InspectorEvent {
    /// A scan finished (explicit, startup or hot-plug triggered)
    ScanCompleted(ScanReport),

    /// The worker needs a consent decision for this device
    PermissionRequested(DeviceIdentity),

    /// A single device became readable after permission was granted
    DeviceReady(ScanEntry),

    /// Device removed; its state has been dropped
    DeviceDetached(DeviceIdentity),
}

/// Handle for Tokio runtime (async)
#[derive(Clone)]
pub struct InspectorBridge {
    cmd_tx: Sender<InspectorCommand>,
    event_rx: Receiver<InspectorEvent>,
}

impl InspectorBridge {
    /// Send a command to the USB worker
    pub async fn send_command(&self, cmd: InspectorCommand) -> crate::Result<()> {
        self.cmd_tx
            .send(cmd)
            .await
            .map_err(|e| crate::Error::Channel(e.to_string()))
    }

    /// Receive an event from the USB worker
    pub async fn recv_event(&self) -> crate::Result<InspectorEvent> {
        self.event_rx
            .recv()
            .await
            .map_err(|e| crate::Error::Channel(e.to_string()))
    }

    /// Request a scan and wait for its report
    pub async fn scan(&self) -> crate::Result<ScanReport> {
        let (response, rx) = tokio::sync::oneshot::channel();
        self.send_command(InspectorCommand::Scan { response }).await?;
        rx.await.map_err(|e| crate::Error::Channel(e.to_string()))
    }

    /// Answer a pending permission request
    pub async fn answer_permission(&self, identity: DeviceIdentity, granted: bool) -> crate::Result<()> {
        self.send_command(InspectorCommand::PermissionResult { identity, granted })
            .await
    }
}

/// Handle for USB worker thread (blocking)
pub struct InspectorWorker {
    pub(crate) cmd_rx: Receiver<InspectorCommand>,
    /// Event sender (public so the worker's broker and hot-plug code can clone it)
    pub event_tx: Sender<InspectorEvent>,
}

impl InspectorWorker {
    /// Try to receive a command without blocking
    pub fn try_recv_command(&self) -> Option<InspectorCommand> {
        self.cmd_rx.try_recv().ok()
    }

    /// True once every bridge handle has been dropped
    pub fn is_disconnected(&self) -> bool {
        self.cmd_rx.is_closed()
    }

    /// Send an event to Tokio runtime (blocking)
    pub fn send_event(&self, event: InspectorEvent) -> crate::Result<()> {
        self.event_tx
            .send_blocking(event)
            .map_err(|e| crate::Error::Channel(e.to_string()))
    }
}

/// Create the channel bridge between Tokio and the USB worker
///
/// Returns (InspectorBridge for Tokio, InspectorWorker for the USB thread)
pub fn create_inspector_bridge() -> (InspectorBridge, InspectorWorker) {
    let (cmd_tx, cmd_rx) = bounded(256);
    let (event_tx, event_rx) = bounded(256);

    (
        InspectorBridge { cmd_tx, event_rx },
        InspectorWorker { cmd_rx, event_tx },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_bridge() {
        let (bridge, worker) = create_inspector_bridge();

        // Spawn a thread to simulate the USB worker
        let handle = std::thread::spawn(move || {
            let cmd = worker.cmd_rx.recv_blocking().unwrap();
            match cmd {
                InspectorCommand::Scan { response } => {
                    response.send(ScanReport::default()).unwrap();
                    true
                }
                _ => false,
            }
        });

        let report = bridge.scan().await.unwrap();
        assert!(report.is_empty());
        assert!(handle.join().unwrap());
    }

    #[tokio::test]
    async fn test_events_reach_async_side() {
        let (bridge, worker) = create_inspector_bridge();

        worker
            .send_event(InspectorEvent::ScanCompleted(ScanReport::default()))
            .unwrap();

        let event = bridge.recv_event().await.unwrap();
        assert!(matches!(event, InspectorEvent::ScanCompleted(r) if r.is_empty()));
    }

    #[test]
    fn test_worker_sees_disconnect() {
        let (bridge, worker) = create_inspector_bridge();
        assert!(!worker.is_disconnected());
        drop(bridge);
        assert!(worker.is_disconnected());
        assert!(worker.try_recv_command().is_none());
    }
}
