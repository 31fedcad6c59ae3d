//! USB discovery and introspection core
//!
//! This crate implements the engine behind usb-inspect:
//! - Descriptor classification (class codes and transfer types to labels)
//! - Snapshot building (walking interfaces and endpoints of an opened device)
//! - Permission coordination (per-device consent state machine)
//! - Enumeration control (scans plus attach/detach/permission events)
//!
//! It talks to the operating system only through the [`UsbProvider`] and
//! [`PermissionBroker`] traits, so every component can be driven by the
//! in-memory doubles in `testing` (enabled by the `test-utils` feature).
//!
//! # Example
//!
//! ```
//! use inspector::EnumerationController;
//! use inspector::testing::{MockDevice, MockProvider, RecordingBroker};
//!
//! let provider = MockProvider::new(vec![MockDevice::mass_storage(1, 0x1234, 0x5678)]);
//! let mut controller = EnumerationController::new(provider, RecordingBroker::default());
//!
//! let report = controller.start();
//! assert_eq!(report.snapshots().count(), 1);
//! ```

pub mod classifier;
pub mod controller;
pub mod permission;
pub mod provider;
pub mod snapshot;
#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use classifier::{classify_endpoint_type, classify_interface_class, endpoint_transfer_type};
pub use controller::EnumerationController;
pub use permission::PermissionCoordinator;
pub use provider::{Connection, PermissionBroker, UsbProvider};
pub use snapshot::build_snapshot;
