//! Keyboard state as a 256x3 texture.
//!
//! Row 0 holds the down state, row 1 a just-pressed pulse that lives for one frame, row 2 a
//! toggle flipped on every press. Columns follow the browser `keyCode` numbering, which is what
//! Shadertoy keyboard shaders index by.

use super::lock;
use crate::binding::{Renderer, SlotBinding, TextureId, TextureUnit};
use crate::device::{DeviceInfo, InputId};
use crate::event::InputEvent;
use crate::pump::EventSink;
use crate::shutdown::ShutdownToken;
use evdev::KeyCode;
use std::sync::{Arc, Mutex};

/// Texture width (one column per key code).
pub const KEYS: usize = 256;
/// Texture height (down / pulse / toggle).
pub const PLANES: usize = 3;

const DOWN: usize = 0;
const PULSE: usize = KEYS;
const TOGGLE: usize = 2 * KEYS;

const CTRL: u8 = 17;

/// Map a kernel key code onto the `keyCode` column, if it has one.
pub fn normalize(key: KeyCode) -> Option<u8> {
    let code = match key {
        KeyCode::KEY_BACKSPACE => 8,
        KeyCode::KEY_TAB => 9,
        KeyCode::KEY_ENTER => 13,
        KeyCode::KEY_LEFTSHIFT | KeyCode::KEY_RIGHTSHIFT => 16,
        KeyCode::KEY_LEFTCTRL | KeyCode::KEY_RIGHTCTRL => 17,
        KeyCode::KEY_LEFTALT | KeyCode::KEY_RIGHTALT => 18,
        KeyCode::KEY_ESC => 27,
        KeyCode::KEY_SPACE => 32,
        KeyCode::KEY_LEFT => 37,
        KeyCode::KEY_UP => 38,
        KeyCode::KEY_RIGHT => 39,
        KeyCode::KEY_DOWN => 40,
        KeyCode::KEY_0 => 48,
        KeyCode::KEY_1 => 49,
        KeyCode::KEY_2 => 50,
        KeyCode::KEY_3 => 51,
        KeyCode::KEY_4 => 52,
        KeyCode::KEY_5 => 53,
        KeyCode::KEY_6 => 54,
        KeyCode::KEY_7 => 55,
        KeyCode::KEY_8 => 56,
        KeyCode::KEY_9 => 57,
        KeyCode::KEY_A => 65,
        KeyCode::KEY_B => 66,
        KeyCode::KEY_C => 67,
        KeyCode::KEY_D => 68,
        KeyCode::KEY_E => 69,
        KeyCode::KEY_F => 70,
        KeyCode::KEY_G => 71,
        KeyCode::KEY_H => 72,
        KeyCode::KEY_I => 73,
        KeyCode::KEY_J => 74,
        KeyCode::KEY_K => 75,
        KeyCode::KEY_L => 76,
        KeyCode::KEY_M => 77,
        KeyCode::KEY_N => 78,
        KeyCode::KEY_O => 79,
        KeyCode::KEY_P => 80,
        KeyCode::KEY_Q => 81,
        KeyCode::KEY_R => 82,
        KeyCode::KEY_S => 83,
        KeyCode::KEY_T => 84,
        KeyCode::KEY_U => 85,
        KeyCode::KEY_V => 86,
        KeyCode::KEY_W => 87,
        KeyCode::KEY_X => 88,
        KeyCode::KEY_Y => 89,
        KeyCode::KEY_Z => 90,
        KeyCode::KEY_LEFTMETA => 91,
        KeyCode::KEY_RIGHTMETA => 92,
        KeyCode::KEY_SLASH => 191,
        _ => return None,
    };
    Some(code)
}

/// The raw three-plane buffer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyboardState {
    buffer: [u8; KEYS * PLANES],
}

impl Default for KeyboardState {
    fn default() -> Self {
        Self {
            buffer: [0; KEYS * PLANES],
        }
    }
}

impl KeyboardState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    pub fn is_down(&self, code: u8) -> bool {
        self.buffer[DOWN + code as usize] != 0
    }

    pub fn pulse(&self, code: u8) -> bool {
        self.buffer[PULSE + code as usize] != 0
    }

    pub fn toggled(&self, code: u8) -> bool {
        self.buffer[TOGGLE + code as usize] != 0
    }

    /// Apply one event. Returns `true` for a Ctrl+C press.
    pub fn apply(&mut self, event: &InputEvent) -> bool {
        let InputEvent::Key { key, value } = *event else {
            return false;
        };
        let Some(code) = normalize(key) else {
            return false;
        };
        let i = code as usize;
        match value {
            0 => {
                self.buffer[DOWN + i] = 0;
                self.buffer[PULSE + i] = 0;
                false
            }
            1 => {
                self.buffer[DOWN + i] = 255;
                self.buffer[PULSE + i] = 255;
                self.buffer[TOGGLE + i] = 255 - self.buffer[TOGGLE + i];
                key == KeyCode::KEY_C && self.is_down(CTRL)
            }
            _ => false,
        }
    }

    /// Copy of the buffer for upload; the pulse plane is cleared afterwards.
    pub fn take_frame(&mut self) -> [u8; KEYS * PLANES] {
        let frame = self.buffer;
        self.buffer[PULSE..TOGGLE].fill(0);
        frame
    }
}

/// A bound keyboard and the texture it feeds.
#[derive(Debug)]
pub struct KeyboardInput {
    id: InputId,
    slot: SlotBinding,
    info: Arc<DeviceInfo>,
    unit: TextureUnit,
    texture: TextureId,
    state: Mutex<KeyboardState>,
    shutdown: ShutdownToken,
}

impl KeyboardInput {
    pub fn new(
        id: InputId,
        slot: SlotBinding,
        info: Arc<DeviceInfo>,
        unit: TextureUnit,
        texture: TextureId,
        shutdown: ShutdownToken,
    ) -> Self {
        Self {
            id,
            slot,
            info,
            unit,
            texture,
            state: Mutex::new(KeyboardState::new()),
            shutdown,
        }
    }

    pub fn id(&self) -> InputId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.slot.name
    }

    pub fn info(&self) -> &Arc<DeviceInfo> {
        &self.info
    }

    /// Texture unit owned by this keyboard until it retires.
    pub fn unit(&self) -> TextureUnit {
        self.unit
    }

    pub fn snapshot(&self) -> KeyboardState {
        lock(&self.state).clone()
    }

    pub fn render(&self, renderer: &mut dyn Renderer) {
        let frame = lock(&self.state).take_frame();
        renderer.upload_r8(
            self.unit,
            self.texture,
            KEYS as u32,
            PLANES as u32,
            &frame,
        );
    }
}

impl EventSink for KeyboardInput {
    fn dispatch(&self, event: &InputEvent) {
        let interrupt = lock(&self.state).apply(event);
        if interrupt {
            // The grab keeps Ctrl+C away from the terminal.
            log::info!("ctrl+c on {}, shutting down", self.info.name);
            self.shutdown.trigger();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(k: KeyCode, v: i32) -> InputEvent {
        InputEvent::key(k, v)
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize(KeyCode::KEY_A), Some(65));
        assert_eq!(normalize(KeyCode::KEY_0), Some(48));
        assert_eq!(normalize(KeyCode::KEY_RIGHTCTRL), Some(17));
        assert_eq!(normalize(KeyCode::KEY_SLASH), Some(191));
        assert_eq!(normalize(KeyCode::KEY_F1), None);
    }

    #[test]
    fn test_press_release_toggle() {
        let mut k = KeyboardState::new();
        k.apply(&key(KeyCode::KEY_SPACE, 1));
        assert!(k.is_down(32) && k.pulse(32) && k.toggled(32));

        k.apply(&key(KeyCode::KEY_SPACE, 2));
        k.apply(&key(KeyCode::KEY_SPACE, 0));
        assert!(!k.is_down(32) && !k.pulse(32) && k.toggled(32));

        k.apply(&key(KeyCode::KEY_SPACE, 1));
        assert!(!k.toggled(32));
    }

    #[test]
    fn test_pulse_lasts_one_frame() {
        let mut k = KeyboardState::new();
        k.apply(&key(KeyCode::KEY_W, 1));
        let frame = k.take_frame();
        assert_eq!(frame[PULSE + 87], 255);
        assert!(!k.pulse(87));
        assert!(k.is_down(87));
        assert_eq!(k.take_frame()[PULSE + 87], 0);
    }

    #[test]
    fn test_ctrl_c() {
        let mut k = KeyboardState::new();
        assert!(!k.apply(&key(KeyCode::KEY_C, 1)));
        k.apply(&key(KeyCode::KEY_C, 0));
        k.apply(&key(KeyCode::KEY_LEFTCTRL, 1));
        assert!(k.apply(&key(KeyCode::KEY_C, 1)));
    }

    #[test]
    fn test_dispatch_triggers_shutdown() {
        let token = ShutdownToken::new();
        let input = KeyboardInput::new(
            InputId::next(),
            SlotBinding {
                name: "iKeyboard".into(),
                location: crate::binding::SlotLocation(1),
            },
            Arc::new(DeviceInfo::new("kbd", "/dev/input/event1")),
            TextureUnit(0),
            TextureId(1),
            token.clone(),
        );
        input.dispatch(&key(KeyCode::KEY_RIGHTCTRL, 1));
        assert!(!token.is_triggered());
        assert!(input.snapshot().is_down(CTRL));
        input.dispatch(&key(KeyCode::KEY_C, 1));
        assert!(token.is_triggered());
        assert!(input.snapshot().pulse(67));
    }
}
