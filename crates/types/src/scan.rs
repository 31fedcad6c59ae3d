//! Scan outcomes
//!
//! A scan never fails as a whole. Each attached device contributes exactly one
//! [`ScanEntry`] describing what happened to it, so the operator can tell
//! "no permission" apart from "open failed" and "malformed data".

use crate::error::{AccessError, DescriptorLocation, ProviderError};
use crate::model::{DeviceIdentity, DeviceSnapshot};
use serde::{Deserialize, Serialize};

/// Access permission state for one device identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PermissionState {
    /// Seen in a scan, nothing decided yet
    #[default]
    Unknown,
    /// Request sent to the broker, waiting for the user
    Requested,
    /// Access granted for the rest of the session
    Granted,
    /// User refused; a new explicit scan asks again
    Denied,
}

impl PermissionState {
    pub fn label(self) -> &'static str {
        match self {
            PermissionState::Unknown => "unknown",
            PermissionState::Requested => "requested",
            PermissionState::Granted => "granted",
            PermissionState::Denied => "denied",
        }
    }
}

/// Outcome for one device in a scan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ScanEntry {
    /// Descriptors were read successfully
    Snapshot(DeviceSnapshot),
    /// Waiting for the permission broker
    PendingPermission { identity: DeviceIdentity },
    /// The user refused access
    Denied { identity: DeviceIdentity },
    /// Connection could not be opened
    OpenFailed {
        identity: DeviceIdentity,
        reason: ProviderError,
    },
    /// Descriptor data was inconsistent
    Malformed {
        identity: DeviceIdentity,
        location: DescriptorLocation,
        detail: String,
    },
}

impl ScanEntry {
    /// Wrap the result of a snapshot build for `identity`
    pub fn from_build(identity: DeviceIdentity, result: Result<DeviceSnapshot, AccessError>) -> Self {
        match result {
            Ok(snapshot) => ScanEntry::Snapshot(snapshot),
            Err(AccessError::OpenFailed { reason }) => ScanEntry::OpenFailed { identity, reason },
            Err(AccessError::MalformedDescriptor { location, detail }) => ScanEntry::Malformed {
                identity,
                location,
                detail,
            },
        }
    }

    /// Device this entry describes
    pub fn identity(&self) -> &DeviceIdentity {
        match self {
            ScanEntry::Snapshot(snapshot) => &snapshot.identity,
            ScanEntry::PendingPermission { identity }
            | ScanEntry::Denied { identity }
            | ScanEntry::OpenFailed { identity, .. }
            | ScanEntry::Malformed { identity, .. } => identity,
        }
    }

    /// Short status label
    pub fn status(&self) -> &'static str {
        match self {
            ScanEntry::Snapshot(_) => "snapshot",
            ScanEntry::PendingPermission { .. } => "pending permission",
            ScanEntry::Denied { .. } => "permission denied",
            ScanEntry::OpenFailed { .. } => "open failed",
            ScanEntry::Malformed { .. } => "malformed descriptor",
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, ScanEntry::OpenFailed { .. } | ScanEntry::Malformed { .. })
    }
}

/// Result of one full scan
///
/// `entries` follows provider-reported device order. An empty `entries`
/// with no `listing_error` means no devices are attached.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanReport {
    pub entries: Vec<ScanEntry>,
    /// Set when the provider could not list devices at all
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub listing_error: Option<String>,
}

impl ScanReport {
    pub fn from_entries(entries: Vec<ScanEntry>) -> Self {
        Self {
            entries,
            listing_error: None,
        }
    }

    pub fn listing_failed(error: impl Into<String>) -> Self {
        Self {
            entries: Vec::new(),
            listing_error: Some(error.into()),
        }
    }

    /// True when the scan completed and found no devices
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.listing_error.is_none()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Snapshots contained in this report
    pub fn snapshots(&self) -> impl Iterator<Item = &DeviceSnapshot> {
        self.entries.iter().filter_map(|entry| match entry {
            ScanEntry::Snapshot(snapshot) => Some(snapshot),
            _ => None,
        })
    }

    /// Replace the entry for the same device with `entry`
    ///
    /// Returns false if no entry for that device exists.
    pub fn replace_entry(&mut self, entry: ScanEntry) -> bool {
        match self
            .entries
            .iter_mut()
            .find(|existing| existing.identity() == entry.identity())
        {
            Some(existing) => {
                *existing = entry;
                true
            }
            None => false,
        }
    }

    /// Count of entries still waiting on the permission broker
    pub fn pending_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| matches!(entry, ScanEntry::PendingPermission { .. }))
            .count()
    }
}
