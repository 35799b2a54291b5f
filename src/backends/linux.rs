//! Kernel event nodes.
//!
//! Wraps an `evdev::Device`. The capability snapshot is taken once at open; reads go through
//! evdev's synchronizing reader, which handles `SYN_DROPPED` itself by replaying the state
//! difference as synthetic events, so [`RawDevice::resync`] has nothing left to do here.

use super::{set_nonblocking, wait_readable};
use crate::device::{AbsRange, DeviceInfo, RawDevice};
use crate::error::{DeviceError, Error, Result};
use crate::event::InputEvent;
use crate::metadata::{bus_name, DeviceMeta};
use std::io;
use std::os::fd::AsRawFd;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// An opened `/dev/input/event<N>` node.
pub struct EvdevDevice {
    device: evdev::Device,
    info: Arc<DeviceInfo>,
}

impl std::fmt::Debug for EvdevDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvdevDevice")
            .field("name", &self.info.name)
            .field("path", &self.info.path)
            .finish()
    }
}

impl EvdevDevice {
    /// Open `path` and snapshot its capabilities.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let device_error = |source: io::Error| Error::Device {
            path: path.to_owned(),
            source,
        };
        let device = evdev::Device::open(path).map_err(device_error)?;
        set_nonblocking(device.as_raw_fd()).map_err(device_error)?;
        let info = snapshot(&device, path);
        Ok(Self {
            device,
            info: Arc::new(info),
        })
    }
}

fn snapshot(device: &evdev::Device, path: &Path) -> DeviceInfo {
    let mut info = DeviceInfo::new(device.name().unwrap_or("unknown"), path);
    if let Some(keys) = device.supported_keys() {
        info.keys = keys.iter().collect();
    }
    if let Some(axes) = device.supported_relative_axes() {
        info.relative_axes = axes.iter().collect();
    }
    if let Some(axes) = device.supported_absolute_axes() {
        info.absolute_axes = axes.iter().collect();
    }
    info.properties = device.properties().iter().collect();
    match device.get_absinfo() {
        Ok(ranges) => {
            for (axis, abs) in ranges {
                let range = AbsRange {
                    value: abs.value(),
                    minimum: abs.minimum(),
                    maximum: abs.maximum(),
                };
                info.abs_ranges.insert(axis.0, range);
            }
        }
        Err(e) => log::debug!("{}: no absolute axis info: {e}", path.display()),
    }

    let id = device.input_id();
    info.meta = DeviceMeta {
        bus: Some(bus_name(id.bus_type().0).to_owned()),
        vid: Some(id.vendor()),
        pid: Some(id.product()),
        version: Some(id.version()),
        product_string: device.name().map(str::to_owned),
        phys: device.physical_path().map(str::to_owned),
        uniq: device.unique_name().map(str::to_owned),
        path: Some(path.display().to_string()),
    };
    info
}

impl RawDevice for EvdevDevice {
    fn info(&self) -> &Arc<DeviceInfo> {
        &self.info
    }

    fn grab(&mut self) -> io::Result<()> {
        self.device.grab()
    }

    fn wait(&mut self, timeout: Duration) -> std::result::Result<bool, DeviceError> {
        Ok(wait_readable(self.device.as_raw_fd(), timeout)?)
    }

    fn read_events(&mut self) -> std::result::Result<Vec<InputEvent>, DeviceError> {
        match self.device.fetch_events() {
            Ok(events) => Ok(events.map(InputEvent::from).collect()),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn resync(&mut self) -> std::result::Result<Vec<InputEvent>, DeviceError> {
        Ok(Vec::new())
    }
}
