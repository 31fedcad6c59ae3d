//! Error types for device access

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors reported by a USB-host provider
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProviderError {
    /// Device is no longer attached
    #[error("Device disconnected")]
    NoDevice,

    /// Device is claimed by another process or driver
    #[error("Device busy")]
    Busy,

    /// Insufficient permissions for the device node
    #[error("Access denied")]
    Access,

    /// Requested descriptor or device does not exist
    #[error("Not found")]
    NotFound,

    /// Operation not supported on this platform
    #[error("Not supported")]
    NotSupported,

    #[error("{message}")]
    Other { message: String },
}

/// Position of a descriptor inside a device's interface/endpoint tree
///
/// No interface means the active configuration descriptor itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DescriptorLocation {
    pub interface: Option<u8>,
    pub endpoint: Option<u8>,
}

impl DescriptorLocation {
    pub fn configuration() -> Self {
        Self {
            interface: None,
            endpoint: None,
        }
    }

    pub fn interface(interface: u8) -> Self {
        Self {
            interface: Some(interface),
            endpoint: None,
        }
    }

    pub fn endpoint(interface: u8, endpoint: u8) -> Self {
        Self {
            interface: Some(interface),
            endpoint: Some(endpoint),
        }
    }
}

impl fmt::Display for DescriptorLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.interface, self.endpoint) {
            (Some(interface), Some(endpoint)) => {
                write!(f, "interface {} endpoint {}", interface, endpoint)
            }
            (Some(interface), None) => write!(f, "interface {}", interface),
            (None, _) => write!(f, "configuration"),
        }
    }
}

/// Per-device failure while building a snapshot
///
/// Neither variant aborts a scan; each becomes a labeled entry for the
/// affected device.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccessError {
    /// Connection could not be opened (busy, revoked or unplugged)
    #[error("Failed to open device: {reason}")]
    OpenFailed { reason: ProviderError },

    /// A descriptor read returned an inconsistent value
    #[error("Malformed descriptor at {location}: {detail}")]
    MalformedDescriptor {
        location: DescriptorLocation,
        detail: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AccessError::OpenFailed {
            reason: ProviderError::Busy,
        };
        assert_eq!(err.to_string(), "Failed to open device: Device busy");

        let err = AccessError::MalformedDescriptor {
            location: DescriptorLocation::endpoint(0, 1),
            detail: "max packet size is 0".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("interface 0 endpoint 1"));
        assert!(msg.contains("max packet size is 0"));
    }

    #[test]
    fn test_interface_location_display() {
        assert_eq!(DescriptorLocation::interface(2).to_string(), "interface 2");
    }

    #[test]
    fn test_configuration_location_display() {
        let err = AccessError::MalformedDescriptor {
            location: DescriptorLocation::configuration(),
            detail: "descriptor read failed: Not found".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Malformed descriptor at configuration: descriptor read failed: Not found"
        );
    }
}
