//! Decoded device events.
//!
//! The pump hands these to input state machines one at a time, in kernel order. Only the event
//! categories the archetypes care about are decoded; everything else collapses to
//! [`InputEvent::Other`] so handlers can ignore it with a single match arm.
//!
//! ## Value conventions
//! - **Keys / buttons:** `1` = press, `0` = release, `2` = autorepeat.
//! - **Relative axes:** signed deltas in device counts (`REL_Y` grows downwards).
//! - **Absolute axes:** raw device units; map them with the axis range from
//!   [`DeviceInfo::abs_range`](crate::device::DeviceInfo::abs_range).

use evdev::{AbsoluteAxisCode, EventType, KeyCode, RelativeAxisCode};

/// A single decoded input event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputEvent {
    /// A key or button changed state.
    Key { key: KeyCode, value: i32 },

    /// A relative axis moved by `value` counts.
    Relative { axis: RelativeAxisCode, value: i32 },

    /// An absolute axis reported a new position.
    Absolute { axis: AbsoluteAxisCode, value: i32 },

    /// End of a hardware frame (`SYN_REPORT`).
    Sync,

    /// Anything else (LEDs, misc scancodes, switches, ...).
    Other,
}

impl InputEvent {
    #[inline]
    pub fn key(key: KeyCode, value: i32) -> Self {
        InputEvent::Key { key, value }
    }

    #[inline]
    pub fn rel(axis: RelativeAxisCode, value: i32) -> Self {
        InputEvent::Relative { axis, value }
    }

    #[inline]
    pub fn abs(axis: AbsoluteAxisCode, value: i32) -> Self {
        InputEvent::Absolute { axis, value }
    }
}

impl From<evdev::InputEvent> for InputEvent {
    fn from(ev: evdev::InputEvent) -> Self {
        let (code, value) = (ev.code(), ev.value());
        match ev.event_type() {
            EventType::KEY => InputEvent::Key {
                key: KeyCode(code),
                value,
            },
            EventType::RELATIVE => InputEvent::Relative {
                axis: RelativeAxisCode(code),
                value,
            },
            EventType::ABSOLUTE => InputEvent::Absolute {
                axis: AbsoluteAxisCode(code),
                value,
            },
            // SYN_REPORT is code 0; SYN_DROPPED never reaches us through the synced reader.
            EventType::SYNCHRONIZATION if code == 0 => InputEvent::Sync,
            _ => InputEvent::Other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_key() {
        let raw = evdev::InputEvent::new(EventType::KEY.0, KeyCode::BTN_LEFT.0, 1);
        assert_eq!(
            InputEvent::from(raw),
            InputEvent::key(KeyCode::BTN_LEFT, 1)
        );
    }

    #[test]
    fn test_decode_abs_and_sync() {
        let raw = evdev::InputEvent::new(
            EventType::ABSOLUTE.0,
            AbsoluteAxisCode::ABS_MT_POSITION_X.0,
            512,
        );
        assert_eq!(
            InputEvent::from(raw),
            InputEvent::abs(AbsoluteAxisCode::ABS_MT_POSITION_X, 512)
        );

        let syn = evdev::InputEvent::new(EventType::SYNCHRONIZATION.0, 0, 0);
        assert_eq!(InputEvent::from(syn), InputEvent::Sync);
    }

    #[test]
    fn test_decode_unhandled_type() {
        let raw = evdev::InputEvent::new(EventType::LED.0, 0, 1);
        assert_eq!(InputEvent::from(raw), InputEvent::Other);
    }
}
