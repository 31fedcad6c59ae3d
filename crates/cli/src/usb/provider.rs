//! rusb-backed USB provider
//!
//! Keeps a registry of attached devices keyed by (bus, address) and assigns
//! each one a session-local DeviceId. Descriptor reads go through an opened
//! `RusbConnection` holding the active configuration, or the error that
//! prevented reading it.

use crate::filter::DeviceFilter;
use inspector::UsbProvider;
use rusb::{ConfigDescriptor, Context, Device, DeviceDescriptor, DeviceHandle, UsbContext};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};
use types::{DeviceId, DeviceIdentity, Direction, ProviderError, RawEndpoint, RawInterface};

/// Linux Foundation root hub vendor
const ROOT_HUB_VENDOR: u16 = 0x1d6b;
const HUB_CLASS: u8 = 0x09;

const STRING_TIMEOUT: Duration = Duration::from_millis(500);

/// Map a rusb error onto the provider error vocabulary
pub fn map_rusb_error(err: rusb::Error) -> ProviderError {
    match err {
        rusb::Error::NoDevice => ProviderError::NoDevice,
        rusb::Error::Busy => ProviderError::Busy,
        rusb::Error::Access => ProviderError::Access,
        rusb::Error::NotFound => ProviderError::NotFound,
        rusb::Error::NotSupported => ProviderError::NotSupported,
        other => ProviderError::Other {
            message: other.to_string(),
        },
    }
}

/// Open device plus the descriptors read at open time
pub struct RusbConnection {
    handle: DeviceHandle<Context>,
    descriptor: DeviceDescriptor,
    config: Result<ConfigDescriptor, ProviderError>,
}

impl RusbConnection {
    fn config(&self) -> Result<&ConfigDescriptor, ProviderError> {
        self.config.as_ref().map_err(Clone::clone)
    }
}

struct RegisteredDevice {
    identity: DeviceIdentity,
    device: Device<Context>,
}

pub struct RusbProvider {
    context: Context,
    /// (bus, address) -> registered device
    devices: HashMap<(u8, u8), RegisteredDevice>,
    next_device_id: u32,
    filters: Vec<DeviceFilter>,
}

impl RusbProvider {
    pub fn new(filters: Vec<DeviceFilter>) -> Result<Self, rusb::Error> {
        let context = Context::new()?;

        Ok(Self {
            context,
            devices: HashMap::new(),
            next_device_id: 1,
            filters,
        })
    }

    /// Get USB context
    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Drop a device from the registry after a hot-plug removal
    ///
    /// Returns the identity it was listed under, if it was known.
    pub fn forget(&mut self, bus: u8, address: u8) -> Option<DeviceIdentity> {
        let registered = self.devices.remove(&(bus, address))?;
        debug!(
            "Removed device {}: bus={}, addr={}",
            registered.identity.device_id, bus, address
        );
        Some(registered.identity)
    }

    /// Whether a device should be listed at all
    fn is_listed(&self, descriptor: &DeviceDescriptor) -> bool {
        // Root hubs carry no useful interfaces
        if descriptor.vendor_id() == ROOT_HUB_VENDOR && descriptor.class_code() == HUB_CLASS {
            return false;
        }
        DeviceFilter::allows(&self.filters, descriptor.vendor_id(), descriptor.product_id())
    }

    fn lookup(&self, identity: &DeviceIdentity) -> Result<&Device<Context>, ProviderError> {
        self.devices
            .get(&(identity.bus_number, identity.device_address))
            .filter(|registered| registered.identity.device_id == identity.device_id)
            .map(|registered| &registered.device)
            .ok_or(ProviderError::NoDevice)
    }

    fn find_interface<'a>(
        config: &'a ConfigDescriptor,
        index: u8,
    ) -> Result<rusb::InterfaceDescriptor<'a>, ProviderError> {
        config
            .interfaces()
            .nth(index as usize)
            .and_then(|interface| interface.descriptors().next())
            .ok_or(ProviderError::NotFound)
    }
}

impl UsbProvider for RusbProvider {
    type Handle = RusbConnection;

    fn list_devices(&mut self) -> Result<Vec<DeviceIdentity>, ProviderError> {
        let list = self.context.devices().map_err(map_rusb_error)?;

        let mut previous = std::mem::take(&mut self.devices);
        let mut identities = Vec::new();

        for device in list.iter() {
            let bus = device.bus_number();
            let address = device.address();

            let descriptor = match device.device_descriptor() {
                Ok(descriptor) => descriptor,
                Err(e) => {
                    warn!(
                        "Failed to read device descriptor: bus={}, addr={}: {}",
                        bus, address, e
                    );
                    continue;
                }
            };

            if !self.is_listed(&descriptor) {
                debug!(
                    "Device not listed: bus={}, addr={}, vid={:#06x}, pid={:#06x}",
                    bus,
                    address,
                    descriptor.vendor_id(),
                    descriptor.product_id()
                );
                continue;
            }

            let id = match previous.remove(&(bus, address)) {
                Some(registered) => registered.identity.device_id,
                None => {
                    let id = DeviceId(self.next_device_id);
                    self.next_device_id += 1;
                    debug!(
                        "Added device {}: bus={}, addr={}, vid={:#06x}, pid={:#06x}",
                        id,
                        bus,
                        address,
                        descriptor.vendor_id(),
                        descriptor.product_id()
                    );
                    id
                }
            };

            let identity = DeviceIdentity {
                device_id: id,
                vendor_id: descriptor.vendor_id(),
                product_id: descriptor.product_id(),
                bus_number: bus,
                device_address: address,
                device_name: device_name(bus, address),
            };
            identities.push(identity.clone());
            self.devices
                .insert((bus, address), RegisteredDevice { identity, device });
        }

        Ok(identities)
    }

    #[cfg(target_os = "linux")]
    fn has_permission(&self, identity: &DeviceIdentity) -> bool {
        use nix::unistd::{AccessFlags, access};

        access(
            std::path::Path::new(&identity.device_name),
            AccessFlags::R_OK | AccessFlags::W_OK,
        )
        .is_ok()
    }

    #[cfg(not(target_os = "linux"))]
    fn has_permission(&self, identity: &DeviceIdentity) -> bool {
        self.lookup(identity)
            .map(|device| device.open().is_ok())
            .unwrap_or(false)
    }

    fn open(&self, identity: &DeviceIdentity) -> Result<RusbConnection, ProviderError> {
        let device = self.lookup(identity)?;
        let descriptor = device.device_descriptor().map_err(map_rusb_error)?;
        let handle = device.open().map_err(|e| {
            warn!("Failed to open device {}: {}", identity, e);
            map_rusb_error(e)
        })?;
        // Reported through interface_count so the device lists as malformed
        let config = device.active_config_descriptor().map_err(|e| {
            warn!("Failed to get active config descriptor for {}: {}", identity, e);
            map_rusb_error(e)
        });

        Ok(RusbConnection {
            handle,
            descriptor,
            config,
        })
    }

    fn close(&self, connection: &mut RusbConnection) {
        // Nothing is claimed; libusb closes the handle when it is dropped
        debug!(
            "Releasing handle for {:04x}:{:04x}",
            connection.descriptor.vendor_id(),
            connection.descriptor.product_id()
        );
    }

    fn read_product_name(&self, connection: &RusbConnection) -> Option<String> {
        connection.descriptor.product_string_index()?;
        read_string(connection, |handle, language, descriptor| {
            handle.read_product_string(language, descriptor, STRING_TIMEOUT)
        })
    }

    fn read_manufacturer_name(&self, connection: &RusbConnection) -> Option<String> {
        connection.descriptor.manufacturer_string_index()?;
        read_string(connection, |handle, language, descriptor| {
            handle.read_manufacturer_string(language, descriptor, STRING_TIMEOUT)
        })
    }

    fn interface_count(&self, connection: &RusbConnection) -> Result<u8, ProviderError> {
        Ok(connection.config()?.num_interfaces())
    }

    fn get_interface(&self, connection: &RusbConnection, index: u8) -> Result<RawInterface, ProviderError> {
        let descriptor = Self::find_interface(connection.config()?, index)?;

        Ok(RawInterface {
            index,
            class: descriptor.class_code(),
            subclass: descriptor.sub_class_code(),
            protocol: descriptor.protocol_code(),
            endpoint_count: descriptor.num_endpoints(),
        })
    }

    fn get_endpoint(
        &self,
        connection: &RusbConnection,
        interface: &RawInterface,
        index: u8,
    ) -> Result<RawEndpoint, ProviderError> {
        let descriptor = Self::find_interface(connection.config()?, interface.index)?;
        let endpoint = descriptor
            .endpoint_descriptors()
            .nth(index as usize)
            .ok_or(ProviderError::NotFound)?;

        let direction_code = match endpoint.direction() {
            rusb::Direction::In => Direction::IN_MASK,
            rusb::Direction::Out => 0,
        };
        let type_code = match endpoint.transfer_type() {
            rusb::TransferType::Control => 0,
            rusb::TransferType::Isochronous => 1,
            rusb::TransferType::Bulk => 2,
            rusb::TransferType::Interrupt => 3,
        };

        Ok(RawEndpoint {
            address: endpoint.address(),
            direction_code,
            type_code,
            max_packet_size: endpoint.max_packet_size(),
            interval: endpoint.interval(),
        })
    }
}

/// Read one string descriptor in the device's first language
fn read_string<F>(connection: &RusbConnection, read: F) -> Option<String>
where
    F: FnOnce(&DeviceHandle<Context>, rusb::Language, &DeviceDescriptor) -> rusb::Result<String>,
{
    let languages = match connection.handle.read_languages(STRING_TIMEOUT) {
        Ok(languages) => languages,
        Err(e) => {
            debug!("Failed to read string languages: {}", e);
            return None;
        }
    };
    let language = *languages.first()?;

    match read(&connection.handle, language, &connection.descriptor) {
        Ok(value) if !value.is_empty() => Some(value),
        Ok(_) => None,
        Err(e) => {
            debug!("Failed to read string descriptor: {}", e);
            None
        }
    }
}

/// Device node path as shown to the operator
pub fn device_name(bus: u8, address: u8) -> String {
    format!("/dev/bus/usb/{:03}/{:03}", bus, address)
}
