//! Channel-fed devices.
//!
//! A [`VirtualDevice`] behaves like an opened kernel node: it carries a capability snapshot and
//! yields event batches from [`RawDevice::read_events`]. The paired [`VirtualFeed`] injects those
//! batches from any thread and can simulate overflow, read errors and unplugging. Dropping every
//! feed unplugs the device.

use crate::device::{AbsRange, DeviceInfo, RawDevice};
use crate::error::DeviceError;
use crate::event::InputEvent;
use evdev::{AbsoluteAxisCode, KeyCode, PropType, RelativeAxisCode};
use std::io;
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug)]
enum Message {
    Events(Vec<InputEvent>),
    Overflow(Vec<InputEvent>),
    Fail(io::ErrorKind),
    Unplug,
}

/// Device end of a virtual input node.
#[derive(Debug)]
pub struct VirtualDevice {
    info: Arc<DeviceInfo>,
    rx: Receiver<Message>,
    peeked: Option<Message>,
    catch_up: Vec<InputEvent>,
}

/// Injection end of a virtual input node.
#[derive(Clone, Debug)]
pub struct VirtualFeed {
    tx: Sender<Message>,
}

impl VirtualDevice {
    pub fn new(info: DeviceInfo) -> (Self, VirtualFeed) {
        let (tx, rx) = mpsc::channel();
        let device = Self {
            info: Arc::new(info),
            rx,
            peeked: None,
            catch_up: Vec::new(),
        };
        (device, VirtualFeed { tx })
    }

    fn next_message(&mut self) -> Result<Option<Message>, DeviceError> {
        if let Some(msg) = self.peeked.take() {
            return Ok(Some(msg));
        }
        match self.rx.try_recv() {
            Ok(msg) => Ok(Some(msg)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(DeviceError::Gone),
        }
    }
}

impl RawDevice for VirtualDevice {
    fn info(&self) -> &Arc<DeviceInfo> {
        &self.info
    }

    fn wait(&mut self, timeout: Duration) -> Result<bool, DeviceError> {
        if self.peeked.is_some() {
            return Ok(true);
        }
        match self.rx.recv_timeout(timeout) {
            Ok(msg) => {
                self.peeked = Some(msg);
                Ok(true)
            }
            Err(RecvTimeoutError::Timeout) => Ok(false),
            Err(RecvTimeoutError::Disconnected) => Err(DeviceError::Gone),
        }
    }

    fn read_events(&mut self) -> Result<Vec<InputEvent>, DeviceError> {
        match self.next_message()? {
            None => Ok(Vec::new()),
            Some(Message::Events(events)) => Ok(events),
            Some(Message::Overflow(catch_up)) => {
                self.catch_up = catch_up;
                Err(DeviceError::Overflow)
            }
            Some(Message::Fail(kind)) => Err(DeviceError::Io(kind.into())),
            Some(Message::Unplug) => Err(DeviceError::Gone),
        }
    }

    fn resync(&mut self) -> Result<Vec<InputEvent>, DeviceError> {
        Ok(std::mem::take(&mut self.catch_up))
    }
}

impl VirtualFeed {
    fn send(&self, msg: Message) {
        // A closed channel means the device was already dropped; nothing left to feed.
        let _ = self.tx.send(msg);
    }

    /// Deliver `events` followed by a sync report, as one batch.
    pub fn feed(&self, events: impl IntoIterator<Item = InputEvent>) {
        let mut batch: Vec<InputEvent> = events.into_iter().collect();
        batch.push(InputEvent::Sync);
        self.send(Message::Events(batch));
    }

    pub fn move_by(&self, dx: i32, dy: i32) {
        self.feed([
            InputEvent::rel(RelativeAxisCode::REL_X, dx),
            InputEvent::rel(RelativeAxisCode::REL_Y, dy),
        ]);
    }

    pub fn press(&self, key: KeyCode) {
        self.feed([InputEvent::key(key, 1)]);
    }

    pub fn release(&self, key: KeyCode) {
        self.feed([InputEvent::key(key, 0)]);
    }

    /// Single-contact touch at `(x, y)` in device units.
    pub fn touch_down(&self, x: i32, y: i32) {
        self.feed([
            InputEvent::key(KeyCode::BTN_TOUCH, 1),
            InputEvent::abs(AbsoluteAxisCode::ABS_X, x),
            InputEvent::abs(AbsoluteAxisCode::ABS_Y, y),
        ]);
    }

    pub fn touch_up(&self) {
        self.feed([InputEvent::key(KeyCode::BTN_TOUCH, 0)]);
    }

    /// Start or move a contact in multi-touch `slot`.
    pub fn contact(&self, slot: i32, tracking_id: i32, x: i32, y: i32) {
        self.feed([
            InputEvent::abs(AbsoluteAxisCode::ABS_MT_SLOT, slot),
            InputEvent::abs(AbsoluteAxisCode::ABS_MT_TRACKING_ID, tracking_id),
            InputEvent::abs(AbsoluteAxisCode::ABS_MT_POSITION_X, x),
            InputEvent::abs(AbsoluteAxisCode::ABS_MT_POSITION_Y, y),
        ]);
    }

    /// Lift the contact in multi-touch `slot`.
    pub fn lift(&self, slot: i32) {
        self.feed([
            InputEvent::abs(AbsoluteAxisCode::ABS_MT_SLOT, slot),
            InputEvent::abs(AbsoluteAxisCode::ABS_MT_TRACKING_ID, -1),
        ]);
    }

    /// Simulate a dropped buffer; `catch_up` is what the resync read returns.
    pub fn overflow(&self, catch_up: Vec<InputEvent>) {
        self.send(Message::Overflow(catch_up));
    }

    /// Make the next read fail with `kind`.
    pub fn fail(&self, kind: io::ErrorKind) {
        self.send(Message::Fail(kind));
    }

    pub fn unplug(&self) {
        self.send(Message::Unplug);
    }
}

fn node(path: &str) -> PathBuf {
    PathBuf::from(path)
}

/// Capabilities of a two-axis wheel mouse.
pub fn mouse(name: &str, path: &str) -> DeviceInfo {
    DeviceInfo::new(name, node(path))
        .with_relative(&[
            RelativeAxisCode::REL_X,
            RelativeAxisCode::REL_Y,
            RelativeAxisCode::REL_WHEEL,
        ])
        .with_keys(&[KeyCode::BTN_LEFT, KeyCode::BTN_RIGHT, KeyCode::BTN_MIDDLE])
}

/// Capabilities of a plain alphanumeric keyboard.
pub fn keyboard(name: &str, path: &str) -> DeviceInfo {
    let mut keys: Vec<KeyCode> = (KeyCode::KEY_ESC.0..=KeyCode::KEY_KPDOT.0)
        .map(KeyCode)
        .collect();
    keys.extend([
        KeyCode::KEY_RIGHTCTRL,
        KeyCode::KEY_RIGHTALT,
        KeyCode::KEY_UP,
        KeyCode::KEY_LEFT,
        KeyCode::KEY_RIGHT,
        KeyCode::KEY_DOWN,
        KeyCode::KEY_LEFTMETA,
        KeyCode::KEY_RIGHTMETA,
    ]);
    DeviceInfo::new(name, node(path)).with_keys(&keys)
}

fn multitouch(name: &str, path: &str, slots: i32) -> DeviceInfo {
    let range = AbsRange::new(0, 4095);
    DeviceInfo::new(name, node(path))
        .with_keys(&[KeyCode::BTN_TOUCH])
        .with_absolute(AbsoluteAxisCode::ABS_X, range)
        .with_absolute(AbsoluteAxisCode::ABS_Y, range)
        .with_absolute(AbsoluteAxisCode::ABS_MT_SLOT, AbsRange::new(0, slots - 1))
        .with_absolute(AbsoluteAxisCode::ABS_MT_POSITION_X, range)
        .with_absolute(AbsoluteAxisCode::ABS_MT_POSITION_Y, range)
        .with_absolute(AbsoluteAxisCode::ABS_MT_TRACKING_ID, AbsRange::new(-1, 65535))
}

/// Capabilities of a direct multi-touch panel with `slots` contacts on a 0..4095 grid.
pub fn touchscreen(name: &str, path: &str, slots: i32) -> DeviceInfo {
    multitouch(name, path, slots).with_property(PropType::DIRECT)
}

/// Capabilities of an indirect multi-touch pad with a clickpad button.
pub fn trackpad(name: &str, path: &str, slots: i32) -> DeviceInfo {
    multitouch(name, path, slots)
        .with_keys(&[KeyCode::BTN_LEFT])
        .with_property(PropType::POINTER)
        .with_property(PropType::BUTTONPAD)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::{classify, Archetype};

    #[test]
    fn test_presets_classify() {
        assert_eq!(classify(&mouse("m", "/m"), false), Some(Archetype::ButtonMouse));
        assert_eq!(classify(&keyboard("k", "/k"), true), Some(Archetype::Keyboard));
        assert_eq!(classify(&keyboard("k", "/k"), false), None);
        assert_eq!(
            classify(&touchscreen("t", "/t", 10), false),
            Some(Archetype::Touchscreen)
        );
        assert_eq!(
            classify(&trackpad("p", "/p", 5), false),
            Some(Archetype::Trackpad)
        );
    }

    #[test]
    fn test_feed_and_read() {
        let (mut device, feed) = VirtualDevice::new(mouse("m", "/m"));
        assert!(!device.wait(Duration::from_millis(1)).unwrap());
        feed.press(KeyCode::BTN_LEFT);
        assert!(device.wait(Duration::from_millis(100)).unwrap());
        assert_eq!(
            device.read_events().unwrap(),
            vec![InputEvent::key(KeyCode::BTN_LEFT, 1), InputEvent::Sync]
        );
        assert!(device.read_events().unwrap().is_empty());
    }

    #[test]
    fn test_overflow_then_resync() {
        let (mut device, feed) = VirtualDevice::new(mouse("m", "/m"));
        feed.overflow(vec![InputEvent::key(KeyCode::BTN_LEFT, 0)]);
        assert!(matches!(device.read_events(), Err(DeviceError::Overflow)));
        assert_eq!(device.resync().unwrap().len(), 1);
        assert!(device.resync().unwrap().is_empty());
    }

    #[test]
    fn test_dropping_feed_unplugs() {
        let (mut device, feed) = VirtualDevice::new(mouse("m", "/m"));
        drop(feed);
        assert!(matches!(
            device.wait(Duration::from_millis(10)),
            Err(DeviceError::Gone)
        ));
    }
}
