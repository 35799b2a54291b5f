//! Raw device handles and their capability snapshot.
//!
//! A [`RawDevice`] is owned by exactly one input at a time. Its static description is captured
//! once at open time as a [`DeviceInfo`] and shared behind an `Arc`, so the validator can size
//! state machines on the renderer thread while the handle itself travels to the pump thread.

use crate::error::DeviceError;
use crate::event::InputEvent;
use crate::metadata::DeviceMeta;
use evdev::{AbsoluteAxisCode, AttributeSet, KeyCode, PropType, RelativeAxisCode};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Process-unique identity of a device-backed input.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InputId(u64);

impl InputId {
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        InputId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for InputId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Range metadata of one absolute axis.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AbsRange {
    /// Value at open time.
    pub value: i32,
    pub minimum: i32,
    pub maximum: i32,
}

impl AbsRange {
    pub fn new(minimum: i32, maximum: i32) -> Self {
        Self {
            value: minimum,
            minimum,
            maximum,
        }
    }

    /// Affinely map `v` from this range onto `[0, extent]`.
    ///
    /// A degenerate range maps everything to `0`.
    pub fn map(&self, v: i32, extent: f32) -> f32 {
        let span = self.maximum as f32 - self.minimum as f32;
        if span == 0.0 {
            return 0.0;
        }
        (v as f32 - self.minimum as f32) / span * extent
    }
}

/// Capability snapshot of an input node, taken when it is opened.
#[derive(Clone, Debug, Default)]
pub struct DeviceInfo {
    /// Kernel-reported device name.
    pub name: String,
    /// Node path (`/dev/input/eventN` for real devices).
    pub path: PathBuf,
    pub keys: AttributeSet<KeyCode>,
    pub relative_axes: AttributeSet<RelativeAxisCode>,
    pub absolute_axes: AttributeSet<AbsoluteAxisCode>,
    pub properties: AttributeSet<PropType>,
    /// Ranges of the supported absolute axes, keyed by axis code.
    pub abs_ranges: BTreeMap<u16, AbsRange>,
    /// Descriptive metadata for listings.
    pub meta: DeviceMeta,
}

impl DeviceInfo {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            ..Self::default()
        }
    }

    pub fn has_key(&self, key: KeyCode) -> bool {
        self.keys.contains(key)
    }

    pub fn has_relative(&self) -> bool {
        self.relative_axes.iter().next().is_some()
    }

    pub fn has_absolute(&self, axis: AbsoluteAxisCode) -> bool {
        self.absolute_axes.contains(axis)
    }

    pub fn has_property(&self, prop: PropType) -> bool {
        self.properties.contains(prop)
    }

    pub fn abs_range(&self, axis: AbsoluteAxisCode) -> Option<AbsRange> {
        self.abs_ranges.get(&axis.0).copied()
    }

    /// Number of hardware multi-touch slots (`ABS_MT_SLOT` maximum + 1), or 0.
    pub fn mt_slot_count(&self) -> usize {
        self.abs_range(AbsoluteAxisCode::ABS_MT_SLOT)
            .map(|r| (r.maximum.max(-1) + 1) as usize)
            .unwrap_or(0)
    }

    /// Multi-touch slot selected when the device was opened.
    pub fn initial_mt_slot(&self) -> usize {
        self.abs_range(AbsoluteAxisCode::ABS_MT_SLOT)
            .map(|r| r.value.max(0) as usize)
            .unwrap_or(0)
    }

    /// Builder-style helpers, mostly for virtual devices.
    pub fn with_keys(mut self, keys: &[KeyCode]) -> Self {
        for k in keys {
            self.keys.insert(*k);
        }
        self
    }

    pub fn with_relative(mut self, axes: &[RelativeAxisCode]) -> Self {
        for a in axes {
            self.relative_axes.insert(*a);
        }
        self
    }

    pub fn with_absolute(mut self, axis: AbsoluteAxisCode, range: AbsRange) -> Self {
        self.absolute_axes.insert(axis);
        self.abs_ranges.insert(axis.0, range);
        self
    }

    pub fn with_property(mut self, prop: PropType) -> Self {
        self.properties.insert(prop);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// An open kernel input node (or a stand-in for one).
///
/// Implementations must be `Send`: the handle is created on the enumerating thread and read on
/// its own pump thread.
pub trait RawDevice: Send {
    /// Capability snapshot taken at open time.
    fn info(&self) -> &Arc<DeviceInfo>;

    /// Take exclusive access so events stop reaching other readers.
    fn grab(&mut self) -> std::io::Result<()> {
        Ok(())
    }

    /// Wait up to `timeout` for events; `Ok(false)` on timeout.
    fn wait(&mut self, timeout: Duration) -> Result<bool, DeviceError>;

    /// Read the next batch of decoded events without blocking.
    fn read_events(&mut self) -> Result<Vec<InputEvent>, DeviceError>;

    /// Read synthetic catch-up events after an overflow.
    fn resync(&mut self) -> Result<Vec<InputEvent>, DeviceError>;
}

impl fmt::Debug for dyn RawDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let info = self.info();
        write!(f, "RawDevice({} @ {})", info.name, info.path.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_abs_range_map() {
        let r = AbsRange::new(0, 1000);
        assert_eq!(r.map(500, 800.0), 400.0);

        let offset = AbsRange::new(-100, 100);
        assert_eq!(offset.map(0, 200.0), 100.0);
    }

    #[test]
    fn test_abs_range_degenerate() {
        assert_eq!(AbsRange::new(5, 5).map(5, 640.0), 0.0);
    }

    #[test]
    fn test_mt_slot_count() {
        let info = DeviceInfo::new("panel", "/dev/input/event9").with_absolute(
            AbsoluteAxisCode::ABS_MT_SLOT,
            AbsRange {
                value: 2,
                minimum: 0,
                maximum: 9,
            },
        );
        assert_eq!(info.mt_slot_count(), 10);
        assert_eq!(info.initial_mt_slot(), 2);

        let plain = DeviceInfo::new("mouse", "/dev/input/event3");
        assert_eq!(plain.mt_slot_count(), 0);
    }

    #[test]
    fn test_input_ids_are_unique() {
        let a = InputId::next();
        let b = InputId::next();
        assert_ne!(a, b);
    }
}
