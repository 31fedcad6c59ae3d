//! usb-inspect front end
//!
//! Wires the inspector core to libusb (through rusb), the configuration file
//! and the terminal.

pub mod config;
pub mod console;
pub mod filter;
pub mod policy;
pub mod render;
pub mod usb;
