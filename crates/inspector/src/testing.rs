//! Test doubles for the inspection core
//!
//! Provides an in-memory [`UsbProvider`] and a [`PermissionBroker`] that
//! records requests, for testing across crates.
//!
//! # Example
//!
//! ```
//! use inspector::testing::{MockDevice, MockProvider, create_mock_identity};
//!
//! let identity = create_mock_identity(1, 0x1234, 0x5678);
//! assert_eq!(identity.device_name, "/dev/bus/usb/001/001");
//!
//! let provider = MockProvider::new(vec![MockDevice::mass_storage(2, 0x1234, 0x5678)]);
//! assert_eq!(provider.open_count(), 0);
//! ```

use crate::provider::{PermissionBroker, UsbProvider};
use std::cell::Cell;
use types::{DeviceId, DeviceIdentity, ProviderError, RawEndpoint, RawInterface};

/// Create a DeviceIdentity on bus 1 whose address mirrors `id`
pub fn create_mock_identity(id: u32, vendor_id: u16, product_id: u16) -> DeviceIdentity {
    let device_address = (id % 128) as u8;
    DeviceIdentity {
        device_id: DeviceId(id),
        vendor_id,
        product_id,
        bus_number: 1,
        device_address,
        device_name: format!("/dev/bus/usb/001/{:03}", device_address),
    }
}

#[derive(Debug, Clone)]
struct MockInterface {
    class: u8,
    subclass: u8,
    protocol: u8,
    endpoints: Vec<RawEndpoint>,
    broken: bool,
}

/// One simulated device
#[derive(Debug, Clone)]
pub struct MockDevice {
    pub identity: DeviceIdentity,
    pub has_permission: bool,
    pub open_error: Option<ProviderError>,
    pub product_name: Option<String>,
    pub manufacturer_name: Option<String>,
    interfaces: Vec<MockInterface>,
    config_missing: bool,
}

impl MockDevice {
    /// Device with no interfaces and permission already held
    pub fn new(identity: DeviceIdentity) -> Self {
        Self {
            identity,
            has_permission: true,
            open_error: None,
            product_name: Some("Test Product".to_string()),
            manufacturer_name: Some("Test Manufacturer".to_string()),
            interfaces: Vec::new(),
            config_missing: false,
        }
    }

    /// Mass-storage device with one bulk IN and one bulk OUT endpoint of 512 bytes
    pub fn mass_storage(id: u32, vendor_id: u16, product_id: u16) -> Self {
        Self::new(create_mock_identity(id, vendor_id, product_id))
            .with_names(Some("Flash Disk"), Some("Generic"))
            .with_interface(0x08, vec![Self::bulk_in(0x81, 512), Self::bulk_out(0x02, 512)])
    }

    pub fn bulk_in(address: u8, max_packet_size: u16) -> RawEndpoint {
        RawEndpoint {
            address: address | 0x80,
            direction_code: 0x80,
            type_code: 2,
            max_packet_size,
            interval: 0,
        }
    }

    pub fn bulk_out(address: u8, max_packet_size: u16) -> RawEndpoint {
        RawEndpoint {
            address: address & 0x7F,
            direction_code: 0x00,
            type_code: 2,
            max_packet_size,
            interval: 0,
        }
    }

    pub fn without_permission(mut self) -> Self {
        self.has_permission = false;
        self
    }

    pub fn with_names(mut self, product: Option<&str>, manufacturer: Option<&str>) -> Self {
        self.product_name = product.map(str::to_string);
        self.manufacturer_name = manufacturer.map(str::to_string);
        self
    }

    pub fn with_open_error(mut self, error: ProviderError) -> Self {
        self.open_error = Some(error);
        self
    }

    pub fn with_interface(mut self, class: u8, endpoints: Vec<RawEndpoint>) -> Self {
        self.interfaces.push(MockInterface {
            class,
            subclass: 0,
            protocol: 0,
            endpoints,
            broken: false,
        });
        self
    }

    /// Opens fine but has no readable active configuration
    pub fn without_config(mut self) -> Self {
        self.config_missing = true;
        self
    }

    /// Make reads of interface `index` fail
    pub fn with_broken_interface(mut self, index: usize) -> Self {
        if let Some(interface) = self.interfaces.get_mut(index) {
            interface.broken = true;
        }
        self
    }
}

/// Connection handle returned by [`MockProvider::open`]
#[derive(Debug)]
pub struct MockHandle {
    device_id: DeviceId,
}

/// In-memory USB provider
///
/// Devices are listed in insertion order. Open, close and descriptor reads
/// are counted so tests can check the connection discipline.
#[derive(Debug, Default)]
pub struct MockProvider {
    devices: Vec<MockDevice>,
    listing_error: Option<ProviderError>,
    opens: Cell<usize>,
    closes: Cell<usize>,
    reads: Cell<usize>,
}

impl MockProvider {
    pub fn new(devices: Vec<MockDevice>) -> Self {
        Self {
            devices,
            ..Self::default()
        }
    }

    /// Attach another device
    pub fn plug(&mut self, device: MockDevice) {
        self.devices.push(device);
    }

    /// Detach a device, returning its identity
    pub fn unplug(&mut self, device_id: DeviceId) -> Option<DeviceIdentity> {
        let position = self
            .devices
            .iter()
            .position(|d| d.identity.device_id == device_id)?;
        Some(self.devices.remove(position).identity)
    }

    pub fn set_permission(&mut self, device_id: DeviceId, has_permission: bool) {
        if let Some(device) = self.device_mut(device_id) {
            device.has_permission = has_permission;
        }
    }

    pub fn set_open_error(&mut self, device_id: DeviceId, error: Option<ProviderError>) {
        if let Some(device) = self.device_mut(device_id) {
            device.open_error = error;
        }
    }

    /// Make `list_devices` fail until cleared
    pub fn set_listing_error(&mut self, error: Option<ProviderError>) {
        self.listing_error = error;
    }

    pub fn open_count(&self) -> usize {
        self.opens.get()
    }

    pub fn close_count(&self) -> usize {
        self.closes.get()
    }

    /// Number of name/interface/endpoint reads performed
    pub fn read_count(&self) -> usize {
        self.reads.get()
    }

    fn device(&self, device_id: DeviceId) -> Option<&MockDevice> {
        self.devices.iter().find(|d| d.identity.device_id == device_id)
    }

    fn device_mut(&mut self, device_id: DeviceId) -> Option<&mut MockDevice> {
        self.devices
            .iter_mut()
            .find(|d| d.identity.device_id == device_id)
    }

    fn interface(&self, handle: &MockHandle, index: u8) -> Option<&MockInterface> {
        self.reads.set(self.reads.get() + 1);
        self.device(handle.device_id)
            .filter(|d| !d.config_missing)?
            .interfaces
            .get(usize::from(index))
    }
}

impl UsbProvider for MockProvider {
    type Handle = MockHandle;

    fn list_devices(&mut self) -> Result<Vec<DeviceIdentity>, ProviderError> {
        if let Some(error) = &self.listing_error {
            return Err(error.clone());
        }
        Ok(self.devices.iter().map(|d| d.identity.clone()).collect())
    }

    fn has_permission(&self, identity: &DeviceIdentity) -> bool {
        self.device(identity.device_id)
            .is_some_and(|d| d.has_permission)
    }

    fn open(&self, identity: &DeviceIdentity) -> Result<MockHandle, ProviderError> {
        let device = self
            .device(identity.device_id)
            .ok_or(ProviderError::NoDevice)?;
        if let Some(error) = &device.open_error {
            return Err(error.clone());
        }
        self.opens.set(self.opens.get() + 1);
        Ok(MockHandle {
            device_id: identity.device_id,
        })
    }

    fn close(&self, _handle: &mut MockHandle) {
        self.closes.set(self.closes.get() + 1);
    }

    fn read_product_name(&self, handle: &MockHandle) -> Option<String> {
        self.reads.set(self.reads.get() + 1);
        self.device(handle.device_id)?.product_name.clone()
    }

    fn read_manufacturer_name(&self, handle: &MockHandle) -> Option<String> {
        self.reads.set(self.reads.get() + 1);
        self.device(handle.device_id)?.manufacturer_name.clone()
    }

    fn interface_count(&self, handle: &MockHandle) -> Result<u8, ProviderError> {
        self.reads.set(self.reads.get() + 1);
        let device = self
            .device(handle.device_id)
            .ok_or(ProviderError::NoDevice)?;
        if device.config_missing {
            return Err(ProviderError::NotFound);
        }
        Ok(device.interfaces.len() as u8)
    }

    fn get_interface(&self, handle: &MockHandle, index: u8) -> Result<RawInterface, ProviderError> {
        let interface = self
            .interface(handle, index)
            .ok_or(ProviderError::NotFound)?;
        if interface.broken {
            return Err(ProviderError::Other {
                message: "descriptor truncated".to_string(),
            });
        }
        Ok(RawInterface {
            index,
            class: interface.class,
            subclass: interface.subclass,
            protocol: interface.protocol,
            endpoint_count: interface.endpoints.len() as u8,
        })
    }

    fn get_endpoint(
        &self,
        handle: &MockHandle,
        interface: &RawInterface,
        index: u8,
    ) -> Result<RawEndpoint, ProviderError> {
        self.interface(handle, interface.index)
            .and_then(|i| i.endpoints.get(usize::from(index)))
            .copied()
            .ok_or(ProviderError::NotFound)
    }
}

/// Broker that records every request and never answers
#[derive(Debug, Default)]
pub struct RecordingBroker {
    pub requests: Vec<DeviceIdentity>,
}

impl RecordingBroker {
    /// Number of requests issued for `identity`
    pub fn request_count(&self, identity: &DeviceIdentity) -> usize {
        self.requests.iter().filter(|r| *r == identity).count()
    }
}

impl PermissionBroker for RecordingBroker {
    fn request_permission(&mut self, identity: &DeviceIdentity) {
        self.requests.push(identity.clone());
    }
}
