//! USB host integration
//!
//! Everything that touches libusb lives here and runs on the worker thread.

pub mod broker;
pub mod hotplug;
pub mod provider;
pub mod worker;

pub use provider::RusbProvider;
pub use worker::{WorkerSettings, spawn_inspector_worker};
