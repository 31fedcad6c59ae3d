//! Device and descriptor type definitions
//!
//! This module defines the identity of an attached device, the raw records a
//! USB-host provider hands back, and the classified descriptor tree built
//! from them.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Provider-assigned device identifier
///
/// Opaque and distinct from the vendor/product codes. A device that leaves
/// and comes back is given a new ID, so state keyed on it never survives a
/// re-plug.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeviceId(pub u32);

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identity of one physical device instance while it is attached
///
/// Used as the key for permission and snapshot state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceIdentity {
    /// Opaque provider handle
    pub device_id: DeviceId,
    /// USB Vendor ID
    pub vendor_id: u16,
    /// USB Product ID
    pub product_id: u16,
    /// Bus number on the host
    pub bus_number: u8,
    /// Device address on the bus
    pub device_address: u8,
    /// Provider-assigned path or name (e.g. `/dev/bus/usb/001/004`)
    pub device_name: String,
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({:04x}:{:04x})",
            self.device_name, self.vendor_id, self.product_id
        )
    }
}

/// Endpoint direction, relative to the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Device to host
    In,
    /// Host to device
    Out,
}

impl Direction {
    /// Direction bit of an endpoint address (bit 7)
    pub const IN_MASK: u8 = 0x80;

    /// Decode a direction from an endpoint address or direction code
    pub fn from_code(code: u8) -> Self {
        if code & Self::IN_MASK != 0 {
            Direction::In
        } else {
            Direction::Out
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Direction::In => "IN",
            Direction::Out => "OUT",
        }
    }
}

/// USB endpoint transfer types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransferType {
    /// Control transfers (type code 0)
    Control,
    /// Isochronous transfers (type code 1), used for audio/video streaming
    Isochronous,
    /// Bulk transfers (type code 2), used for storage and network adapters
    Bulk,
    /// Interrupt transfers (type code 3), used for HID devices
    Interrupt,
    /// Any code outside the four defined transfer types
    Unknown,
}

impl TransferType {
    /// Decode a raw endpoint type code
    ///
    /// Only 0..=3 are defined; every other value maps to `Unknown`.
    pub fn from_code(code: u8) -> Self {
        match code {
            0 => TransferType::Control,
            1 => TransferType::Isochronous,
            2 => TransferType::Bulk,
            3 => TransferType::Interrupt,
            _ => TransferType::Unknown,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            TransferType::Control => "Control",
            TransferType::Isochronous => "Isochronous",
            TransferType::Bulk => "Bulk",
            TransferType::Interrupt => "Interrupt",
            TransferType::Unknown => "unknown",
        }
    }
}

/// Raw interface record as reported by a provider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawInterface {
    /// Position in provider-reported order
    pub index: u8,
    pub class: u8,
    pub subclass: u8,
    pub protocol: u8,
    pub endpoint_count: u8,
}

/// Raw endpoint record as reported by a provider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawEndpoint {
    /// Endpoint address (number plus direction bit)
    pub address: u8,
    /// Direction code, `0x80` for IN
    pub direction_code: u8,
    /// Transfer type code (0..=3)
    pub type_code: u8,
    pub max_packet_size: u16,
    /// Polling interval (frames/microframes)
    pub interval: u8,
}

/// Classified endpoint descriptor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointDescriptor {
    /// Position within the interface (0..endpoint_count)
    pub index: u8,
    pub address: u8,
    pub direction: Direction,
    pub transfer_type: TransferType,
    /// Always non-zero; zero is rejected as malformed while building
    pub max_packet_size: u16,
    pub interval: u8,
}

/// Classified interface descriptor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceDescriptor {
    /// Position in provider-reported order (0..interface_count)
    pub index: u8,
    /// Raw USB interface class code
    pub interface_class: u8,
    /// Human-readable class label
    pub interface_class_label: String,
    pub subclass: u8,
    pub protocol: u8,
    pub endpoints: Vec<EndpointDescriptor>,
}

/// Immutable report of one device's descriptor tree
///
/// Built fresh on every successful read and replaced, never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSnapshot {
    pub identity: DeviceIdentity,
    /// Product string (if the device exposes one)
    pub product_name: Option<String>,
    /// Manufacturer string (if the device exposes one)
    pub manufacturer_name: Option<String>,
    pub interfaces: Vec<InterfaceDescriptor>,
}

impl DeviceSnapshot {
    /// Total endpoint count across all interfaces
    pub fn endpoint_count(&self) -> usize {
        self.interfaces.iter().map(|i| i.endpoints.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transfer_type_codes() {
        assert_eq!(TransferType::from_code(0), TransferType::Control);
        assert_eq!(TransferType::from_code(1), TransferType::Isochronous);
        assert_eq!(TransferType::from_code(2), TransferType::Bulk);
        assert_eq!(TransferType::from_code(3), TransferType::Interrupt);
        assert_eq!(TransferType::from_code(4), TransferType::Unknown);
        assert_eq!(TransferType::from_code(0xFF), TransferType::Unknown);
    }

    #[test]
    fn test_direction_from_code() {
        assert_eq!(Direction::from_code(0x80), Direction::In);
        assert_eq!(Direction::from_code(0x81), Direction::In);
        assert_eq!(Direction::from_code(0x00), Direction::Out);
        assert_eq!(Direction::from_code(0x02), Direction::Out);
    }

    #[test]
    fn test_identity_display() {
        let identity = DeviceIdentity {
            device_id: DeviceId(3),
            vendor_id: 0x1234,
            product_id: 0x5678,
            bus_number: 1,
            device_address: 4,
            device_name: "/dev/bus/usb/001/004".to_string(),
        };
        assert_eq!(identity.to_string(), "/dev/bus/usb/001/004 (1234:5678)");
        assert_eq!(identity.device_id.to_string(), "#3");
    }
}
