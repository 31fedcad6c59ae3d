//! Shared data model for usb-inspect
//!
//! This crate defines the values that flow between the inspection core, the
//! USB worker thread and the presentation layer: device identities, the
//! descriptor tree captured in a [`DeviceSnapshot`], per-device scan outcomes
//! and the error taxonomy used to label them.
//!
//! # Example
//!
//! ```
//! use types::{DeviceId, DeviceIdentity, ScanEntry, ScanReport};
//!
//! let identity = DeviceIdentity {
//!     device_id: DeviceId(1),
//!     vendor_id: 0x1234,
//!     product_id: 0x5678,
//!     bus_number: 1,
//!     device_address: 4,
//!     device_name: "/dev/bus/usb/001/004".to_string(),
//! };
//!
//! let report = ScanReport::from_entries(vec![ScanEntry::PendingPermission {
//!     identity: identity.clone(),
//! }]);
//! assert!(!report.is_empty());
//! assert_eq!(report.entries[0].identity(), &identity);
//! ```

pub mod error;
pub mod model;
pub mod scan;

pub use error::{AccessError, DescriptorLocation, ProviderError};
pub use model::{
    DeviceId, DeviceIdentity, DeviceSnapshot, Direction, EndpointDescriptor, InterfaceDescriptor,
    RawEndpoint, RawInterface, TransferType,
};
pub use scan::{PermissionState, ScanEntry, ScanReport};
