//! Device classification.
//!
//! Maps a capability snapshot onto one of the fixed archetypes. The rules are checked in order
//! and the first match wins; there is no scoring or fallback search.

use crate::device::DeviceInfo;
use evdev::{AbsoluteAxisCode, KeyCode, PropType};
use std::fmt;

/// Device classes the runtime knows how to bind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Archetype {
    /// Relative pointer with a primary button.
    ButtonMouse,
    /// Single-contact absolute pointer driven by a touch panel.
    TouchMouse,
    /// Key matrix.
    Keyboard,
    /// Multi-contact panel with the direct-input property.
    Touchscreen,
    /// Multi-contact panel with the pointer (indirect) property.
    Trackpad,
}

impl Archetype {
    /// Pointer-class archetypes share a 4-vector slot and may be multiplexed.
    pub fn is_pointer(self) -> bool {
        matches!(self, Archetype::ButtonMouse | Archetype::TouchMouse)
    }

    /// The archetype to substitute when this one fails to bind, if any.
    pub fn fallback(self) -> Option<Archetype> {
        match self {
            Archetype::Touchscreen | Archetype::Trackpad => Some(Archetype::TouchMouse),
            _ => None,
        }
    }
}

impl fmt::Display for Archetype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Archetype::ButtonMouse => "ButtonMouse",
            Archetype::TouchMouse => "TouchMouse",
            Archetype::Keyboard => "Keyboard",
            Archetype::Touchscreen => "Touchscreen",
            Archetype::Trackpad => "Trackpad",
        })
    }
}

fn has_multitouch(info: &DeviceInfo) -> bool {
    info.has_absolute(AbsoluteAxisCode::ABS_MT_POSITION_X)
        && info.has_absolute(AbsoluteAxisCode::ABS_MT_POSITION_Y)
        && info.has_key(KeyCode::BTN_TOUCH)
}

/// Classify a device.
///
/// Keyboards are only considered when `keyboard_requested` is set; otherwise a keyboard falls
/// through to the remaining rules and usually ends up unclassified.
pub fn classify(info: &DeviceInfo, keyboard_requested: bool) -> Option<Archetype> {
    if info.has_relative() && info.has_key(KeyCode::BTN_LEFT) {
        return Some(Archetype::ButtonMouse);
    }
    if keyboard_requested && info.has_key(KeyCode::KEY_A) {
        return Some(Archetype::Keyboard);
    }
    if has_multitouch(info) {
        if info.has_property(PropType::DIRECT) {
            return Some(Archetype::Touchscreen);
        }
        if info.has_property(PropType::POINTER) {
            return Some(Archetype::Trackpad);
        }
    }
    None
}
