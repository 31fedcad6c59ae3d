//! Collaborator interfaces
//!
//! The core never talks to the operating system directly. A [`UsbProvider`]
//! lists devices and reads descriptor metadata, and a [`PermissionBroker`]
//! asks the user for consent and reports back later.

use types::{DeviceIdentity, ProviderError, RawEndpoint, RawInterface};
use tracing::debug;

/// USB-host subsystem boundary
pub trait UsbProvider {
    /// Open connection to one device
    type Handle;

    /// List attached devices in provider order
    fn list_devices(&mut self) -> Result<Vec<DeviceIdentity>, ProviderError>;

    /// Whether access to the device is already held
    fn has_permission(&self, identity: &DeviceIdentity) -> bool;

    fn open(&self, identity: &DeviceIdentity) -> Result<Self::Handle, ProviderError>;

    /// Release a connection. The handle is dropped right after this returns.
    fn close(&self, handle: &mut Self::Handle);

    fn read_product_name(&self, handle: &Self::Handle) -> Option<String>;

    fn read_manufacturer_name(&self, handle: &Self::Handle) -> Option<String>;

    /// Interfaces in the active configuration
    ///
    /// Fails when the configuration descriptor could not be read at open time.
    fn interface_count(&self, handle: &Self::Handle) -> Result<u8, ProviderError>;

    fn get_interface(&self, handle: &Self::Handle, index: u8) -> Result<RawInterface, ProviderError>;

    fn get_endpoint(
        &self,
        handle: &Self::Handle,
        interface: &RawInterface,
        index: u8,
    ) -> Result<RawEndpoint, ProviderError>;
}

/// Asks the user for access to a device
///
/// Requests are fire-and-forget. The outcome is delivered later through
/// `EnumerationController::on_permission_result`.
pub trait PermissionBroker {
    fn request_permission(&mut self, identity: &DeviceIdentity);
}

/// Scoped provider connection
///
/// Closes the handle when dropped, so every exit path of a descriptor walk
/// releases the device.
pub struct Connection<'a, P: UsbProvider + ?Sized> {
    provider: &'a P,
    handle: P::Handle,
    identity: &'a DeviceIdentity,
}

impl<'a, P: UsbProvider + ?Sized> Connection<'a, P> {
    pub fn open(provider: &'a P, identity: &'a DeviceIdentity) -> Result<Self, ProviderError> {
        let handle = provider.open(identity)?;
        debug!("Opened connection to {}", identity);
        Ok(Self {
            provider,
            handle,
            identity,
        })
    }

    pub fn product_name(&self) -> Option<String> {
        self.provider.read_product_name(&self.handle)
    }

    pub fn manufacturer_name(&self) -> Option<String> {
        self.provider.read_manufacturer_name(&self.handle)
    }

    pub fn interface_count(&self) -> Result<u8, ProviderError> {
        self.provider.interface_count(&self.handle)
    }

    pub fn interface(&self, index: u8) -> Result<RawInterface, ProviderError> {
        self.provider.get_interface(&self.handle, index)
    }

    pub fn endpoint(&self, interface: &RawInterface, index: u8) -> Result<RawEndpoint, ProviderError> {
        self.provider.get_endpoint(&self.handle, interface, index)
    }
}

impl<P: UsbProvider + ?Sized> Drop for Connection<'_, P> {
    fn drop(&mut self) {
        self.provider.close(&mut self.handle);
        debug!("Closed connection to {}", self.identity);
    }
}
