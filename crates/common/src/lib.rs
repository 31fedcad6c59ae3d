//! Common utilities for usb-inspect
//!
//! This crate provides functionality shared between the inspection core and
//! its front ends: error handling, logging setup, and the async channel
//! bridge between the Tokio runtime and the USB worker thread.

pub mod channel;
pub mod error;
pub mod logging;

pub use channel::{
    InspectorBridge, InspectorCommand, InspectorEvent, InspectorWorker, create_inspector_bridge,
};
pub use error::{Error, Result};
pub use logging::setup_logging;
