//! Multi-contact panels (Touchscreen / Trackpad).
//!
//! The kernel's type-B multi-touch protocol addresses contacts through `ABS_MT_SLOT`; every
//! following `ABS_MT_*` event applies to the selected slot. [`MultiTouchTracker`] keeps one
//! [`TouchSlot`] per hardware slot and samples them as a flat `vec4` array using the same sign
//! encoding as a single pointer.

use super::lock;
use crate::binding::{Renderer, SlotBinding};
use crate::classify::Archetype;
use crate::device::{AbsRange, DeviceInfo, InputId};
use crate::event::InputEvent;
use crate::pump::EventSink;
use evdev::AbsoluteAxisCode;
use std::sync::{Arc, Mutex};

/// State of one contact-tracking slot.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TouchSlot {
    /// One-shot: a contact started since the last sample.
    pub touch_started: bool,
    /// Whether X / Y of the current contact have arrived.
    pub drag_axes: [bool; 2],
    pub position: [f32; 2],
    pub drag_origin: [f32; 2],
}

impl Default for TouchSlot {
    fn default() -> Self {
        Self {
            touch_started: false,
            drag_axes: [false, false],
            position: [1.0, 1.0],
            drag_origin: [1.0, 1.0],
        }
    }
}

impl TouchSlot {
    pub fn is_dragging(&self) -> bool {
        self.drag_axes[0] && self.drag_axes[1]
    }

    fn sample(&self) -> [f32; 4] {
        let [mut z, mut w] = self.drag_origin;
        if self.is_dragging() {
            if !self.touch_started {
                w = -w;
            }
        } else {
            z = -z;
            w = -w;
        }
        [self.position[0], self.position[1], z, w]
    }
}

/// Fixed-size array of [`TouchSlot`]s plus the currently addressed slot.
#[derive(Clone, Debug)]
pub struct MultiTouchTracker {
    x: AbsRange,
    y: AbsRange,
    width: f32,
    height: f32,
    slots: Box<[TouchSlot]>,
    current: usize,
    dirty: bool,
    out: Vec<[f32; 4]>,
}

impl MultiTouchTracker {
    /// A tracker with `slots` contacts (at least one) mapping `x`/`y` onto the viewport.
    pub fn new(slots: usize, x: AbsRange, y: AbsRange, width: u32, height: u32) -> Self {
        let count = slots.max(1);
        Self {
            x,
            y,
            width: width as f32,
            height: height as f32,
            slots: vec![TouchSlot::default(); count].into_boxed_slice(),
            current: 0,
            // Upload the idle array once so the program never reads an unset uniform.
            dirty: true,
            out: vec![[0.0; 4]; count],
        }
    }

    /// Size and range a tracker from a device snapshot.
    pub fn for_device(info: &DeviceInfo, width: u32, height: u32) -> Self {
        let x = info
            .abs_range(AbsoluteAxisCode::ABS_MT_POSITION_X)
            .or_else(|| info.abs_range(AbsoluteAxisCode::ABS_X))
            .unwrap_or(AbsRange::new(0, 0));
        let y = info
            .abs_range(AbsoluteAxisCode::ABS_MT_POSITION_Y)
            .or_else(|| info.abs_range(AbsoluteAxisCode::ABS_Y))
            .unwrap_or(AbsRange::new(0, 0));
        let mut tracker = Self::new(info.mt_slot_count(), x, y, width, height);
        tracker.current = info.initial_mt_slot();
        tracker
    }

    pub fn slots(&self) -> &[TouchSlot] {
        &self.slots
    }

    /// Index of the slot addressed by the next `ABS_MT_*` event.
    pub fn current(&self) -> usize {
        self.current
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn apply(&mut self, event: &InputEvent) {
        let InputEvent::Absolute { axis, value } = *event else {
            return;
        };
        if axis == AbsoluteAxisCode::ABS_MT_SLOT {
            self.current = value.max(0) as usize;
            return;
        }
        let (width, height, x, y) = (self.width, self.height, self.x, self.y);
        let Some(slot) = self.slots.get_mut(self.current) else {
            return;
        };
        let before = *slot;
        match axis {
            AbsoluteAxisCode::ABS_MT_TRACKING_ID => {
                if value >= 0 {
                    slot.touch_started = true;
                } else {
                    slot.drag_axes = [false, false];
                }
            }
            AbsoluteAxisCode::ABS_MT_POSITION_X => {
                slot.position[0] = x.map(value, width);
                if !slot.drag_axes[0] {
                    slot.drag_origin[0] = slot.position[0];
                    slot.drag_axes[0] = true;
                }
            }
            AbsoluteAxisCode::ABS_MT_POSITION_Y => {
                slot.position[1] = height - y.map(value, height);
                if !slot.drag_axes[1] {
                    slot.drag_origin[1] = slot.position[1];
                    slot.drag_axes[1] = true;
                }
            }
            _ => return,
        }
        if *slot != before {
            self.dirty = true;
        }
    }

    /// The `vec4` array to upload, or `None` if nothing changed since the last upload.
    ///
    /// Consumes pending `touch_started` pulses; a slot that had one keeps the array dirty for one
    /// more upload so the cleared pulse reaches the program.
    pub fn sample(&mut self) -> Option<&[[f32; 4]]> {
        if !self.dirty {
            return None;
        }
        self.dirty = false;
        for (out, slot) in self.out.iter_mut().zip(self.slots.iter_mut()) {
            *out = slot.sample();
            if slot.touch_started {
                slot.touch_started = false;
                self.dirty = true;
            }
        }
        Some(&self.out)
    }
}

/// A bound multi-touch panel.
#[derive(Debug)]
pub struct MultiTouchInput {
    id: InputId,
    archetype: Archetype,
    slot: SlotBinding,
    info: Arc<DeviceInfo>,
    tracker: Mutex<MultiTouchTracker>,
}

impl MultiTouchInput {
    pub fn new(
        id: InputId,
        archetype: Archetype,
        slot: SlotBinding,
        info: Arc<DeviceInfo>,
        tracker: MultiTouchTracker,
    ) -> Self {
        Self {
            id,
            archetype,
            slot,
            info,
            tracker: Mutex::new(tracker),
        }
    }

    pub fn id(&self) -> InputId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.slot.name
    }

    pub fn archetype(&self) -> Archetype {
        self.archetype
    }

    pub fn info(&self) -> &Arc<DeviceInfo> {
        &self.info
    }

    /// Number of contact slots uploaded each time.
    pub fn slot_count(&self) -> usize {
        lock(&self.tracker).slots().len()
    }

    pub fn render(&self, renderer: &mut dyn Renderer) {
        let mut tracker = lock(&self.tracker);
        if let Some(values) = tracker.sample() {
            renderer.set_vec4_array(self.slot.location, values);
        }
    }
}

impl EventSink for MultiTouchInput {
    fn dispatch(&self, event: &InputEvent) {
        lock(&self.tracker).apply(event);
    }
}
