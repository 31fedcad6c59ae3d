//! Hot-plug notifications
//!
//! libusb invokes the callback from inside `handle_events` on the worker
//! thread, so it only forwards a notice; the worker reacts after the call
//! returns.

use rusb::{Context, Device, Hotplug, HotplugBuilder, Registration, UsbContext};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HotplugNotice {
    Arrived,
    Left { bus: u8, address: u8 },
}

/// Coalesces a burst of arrivals into one rescan
///
/// Each arrival restarts the quiet period. The rescan is due once no arrival
/// has been noted for `quiet`.
#[derive(Debug, Clone)]
pub struct ArrivalDebounce {
    quiet: Duration,
    last_arrival: Option<Instant>,
}

impl ArrivalDebounce {
    pub fn new(quiet: Duration) -> Self {
        Self {
            quiet,
            last_arrival: None,
        }
    }

    pub fn note(&mut self, now: Instant) {
        self.last_arrival = Some(now);
    }

    /// Whether the rescan is due at `now`. Returns true once per burst.
    pub fn due(&mut self, now: Instant) -> bool {
        match self.last_arrival {
            Some(last) if now.saturating_duration_since(last) >= self.quiet => {
                self.last_arrival = None;
                true
            }
            _ => false,
        }
    }
}

struct HotplugCallback {
    sender: async_channel::Sender<HotplugNotice>,
}

impl HotplugCallback {
    fn forward(&self, notice: HotplugNotice) {
        if let Err(e) = self.sender.try_send(notice) {
            warn!("Dropped hot-plug notice {:?}: {}", notice, e);
        }
    }
}

impl<T: UsbContext> Hotplug<T> for HotplugCallback {
    fn device_arrived(&mut self, device: Device<T>) {
        debug!(
            "Hot-plug callback: device arrived (bus={}, addr={})",
            device.bus_number(),
            device.address()
        );
        self.forward(HotplugNotice::Arrived);
    }

    fn device_left(&mut self, device: Device<T>) {
        debug!(
            "Hot-plug callback: device left (bus={}, addr={})",
            device.bus_number(),
            device.address()
        );
        self.forward(HotplugNotice::Left {
            bus: device.bus_number(),
            address: device.address(),
        });
    }
}

/// Register for attach/detach notifications
///
/// Returns `Ok(None)` when the platform's libusb has no hot-plug support;
/// the registration must be kept alive for notices to keep arriving.
pub fn register_hotplug(
    context: &Context,
    sender: async_channel::Sender<HotplugNotice>,
) -> Result<Option<Registration<Context>>, rusb::Error> {
    if !rusb::has_hotplug() {
        info!("Hot-plug not supported on this platform, rescan manually");
        return Ok(None);
    }

    let registration = HotplugBuilder::new()
        .enumerate(false)
        .register(context, Box::new(HotplugCallback { sender }))?;

    debug!("Hot-plug callbacks registered");
    Ok(Some(registration))
}
