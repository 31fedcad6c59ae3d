//! Scan output rendering
//!
//! Turns scan entries into operator-facing lines (text) or JSON documents.
//! Rendering never touches the worker; it only reads the values it is given.

use crate::config::OutputFormat;
use std::io::{self, Write};
use types::{DeviceIdentity, DeviceSnapshot, ProviderError, ScanEntry, ScanReport};

/// Header lines shared by every entry kind
fn identity_lines(identity: &DeviceIdentity) -> Vec<String> {
    vec![
        format!("Found device: {}", identity.device_name),
        format!(
            "VID: 0x{:04X} | PID: 0x{:04X}",
            identity.vendor_id, identity.product_id
        ),
    ]
}

pub fn snapshot_lines(snapshot: &DeviceSnapshot) -> Vec<String> {
    let mut lines = identity_lines(&snapshot.identity);
    lines.push(format!(
        "Product: {}",
        snapshot.product_name.as_deref().unwrap_or("(none)")
    ));
    lines.push(format!(
        "Manufacturer: {}",
        snapshot.manufacturer_name.as_deref().unwrap_or("(none)")
    ));
    lines.push("---- Interfaces ----".to_string());
    lines.push(format!("Interface count: {}", snapshot.interfaces.len()));

    for interface in &snapshot.interfaces {
        lines.push(format!("[Interface {}]", interface.index));
        lines.push(format!(
            "   Class: {} (0x{:02X})",
            interface.interface_class_label, interface.interface_class
        ));
        lines.push(format!("   Subclass: {}", interface.subclass));
        lines.push(format!("   Endpoints: {}", interface.endpoints.len()));

        for endpoint in &interface.endpoints {
            lines.push(format!(
                "   -> Endpoint {}: {} | type: {} | max packet: {} | address: 0x{:02X}",
                endpoint.index,
                endpoint.direction.label(),
                endpoint.transfer_type.label(),
                endpoint.max_packet_size,
                endpoint.address
            ));
        }
    }

    lines.push("Device read complete.".to_string());
    lines
}

pub fn entry_lines(entry: &ScanEntry) -> Vec<String> {
    match entry {
        ScanEntry::Snapshot(snapshot) => snapshot_lines(snapshot),
        ScanEntry::PendingPermission { identity } => {
            let mut lines = identity_lines(identity);
            lines.push("Permission requested, waiting for consent...".to_string());
            lines
        }
        ScanEntry::Denied { identity } => {
            let mut lines = identity_lines(identity);
            lines.push("Permission denied.".to_string());
            lines
        }
        ScanEntry::OpenFailed {
            identity,
            reason: ProviderError::Access,
        } => {
            // Consent does not change node permissions
            let mut lines = identity_lines(identity);
            lines.push(format!(
                "Error: could not open device ({}), the device node is not accessible",
                ProviderError::Access
            ));
            lines.push(udev_hint(identity));
            lines
        }
        ScanEntry::OpenFailed { identity, reason } => {
            let mut lines = identity_lines(identity);
            lines.push(format!(
                "Error: could not open device ({}), it may be in use by another program",
                reason
            ));
            lines
        }
        ScanEntry::Malformed {
            identity,
            location,
            detail,
        } => {
            let mut lines = identity_lines(identity);
            lines.push(format!("Error: malformed descriptor at {}: {}", location, detail));
            lines
        }
    }
}

/// Suggested udev rule for a device whose node cannot be opened
fn udev_hint(identity: &DeviceIdentity) -> String {
    format!(
        "Hint: on Linux, grant access to {} with a udev rule such as \
         SUBSYSTEM==\"usb\", ATTR{{idVendor}}==\"{:04x}\", ATTR{{idProduct}}==\"{:04x}\", MODE=\"0660\", GROUP=\"plugdev\" \
         in /etc/udev/rules.d/, then replug the device",
        identity.device_name, identity.vendor_id, identity.product_id
    )
}

pub fn report_lines(report: &ScanReport) -> Vec<String> {
    if let Some(error) = &report.listing_error {
        return vec![format!("Error: could not list USB devices: {}", error)];
    }
    if report.is_empty() {
        return vec!["No devices found. Check the cable, hub or OTG adapter.".to_string()];
    }

    let mut lines = vec![format!("Found {} USB device(s)", report.len())];
    for entry in &report.entries {
        lines.push(String::new());
        lines.extend(entry_lines(entry));
    }
    lines
}

/// Writes entries and reports in the configured format
#[derive(Debug, Clone, Copy)]
pub struct Renderer {
    format: OutputFormat,
}

impl Renderer {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    pub fn report(&self, report: &ScanReport) -> io::Result<Vec<String>> {
        match self.format {
            OutputFormat::Text => Ok(report_lines(report)),
            OutputFormat::Json => Ok(vec![serde_json::to_string(report)?]),
        }
    }

    pub fn entry(&self, entry: &ScanEntry) -> io::Result<Vec<String>> {
        match self.format {
            OutputFormat::Text => Ok(entry_lines(entry)),
            OutputFormat::Json => Ok(vec![serde_json::to_string(entry)?]),
        }
    }

    pub fn write_report(&self, out: &mut impl Write, report: &ScanReport) -> io::Result<()> {
        write_lines(out, &self.report(report)?)
    }

    pub fn write_entry(&self, out: &mut impl Write, entry: &ScanEntry) -> io::Result<()> {
        write_lines(out, &self.entry(entry)?)
    }
}

fn write_lines(out: &mut impl Write, lines: &[String]) -> io::Result<()> {
    for line in lines {
        writeln!(out, "{}", line)?;
    }
    out.flush()
}
