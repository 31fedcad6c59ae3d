//! Permission broker that forwards requests to the async side

use common::InspectorEvent;
use inspector::PermissionBroker;
use tracing::{debug, error};
use types::DeviceIdentity;

/// Emits `PermissionRequested`; the answer comes back as a
/// `PermissionResult` command.
pub struct ChannelBroker {
    event_tx: async_channel::Sender<InspectorEvent>,
}

impl ChannelBroker {
    pub fn new(event_tx: async_channel::Sender<InspectorEvent>) -> Self {
        Self { event_tx }
    }
}

impl PermissionBroker for ChannelBroker {
    fn request_permission(&mut self, identity: &DeviceIdentity) {
        debug!("Requesting permission for {}", identity);
        if let Err(e) = self
            .event_tx
            .send_blocking(InspectorEvent::PermissionRequested(identity.clone()))
        {
            error!("Failed to send PermissionRequested event: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use inspector::testing::create_mock_identity;

    #[test]
    fn test_request_becomes_event() {
        let (tx, rx) = async_channel::bounded(4);
        let mut broker = ChannelBroker::new(tx);
        let identity = create_mock_identity(3, 0x1234, 0x5678);

        broker.request_permission(&identity);

        match rx.try_recv().unwrap() {
            InspectorEvent::PermissionRequested(requested) => assert_eq!(requested, identity),
            other => panic!("unexpected event: {:?}", other),
        }
    }
}
