//! Single pointer state machine (ButtonMouse / TouchMouse).
//!
//! Sampling yields the Shadertoy `iMouse` 4-vector `(x, y, z, w)`:
//! - `xy` is the last position seen while dragging
//! - `zw` is the drag start, with signs encoding the button state:
//!
//! | state                         | z   | w   |
//! |-------------------------------|-----|-----|
//! | not dragging                  | `-` | `-` |
//! | dragging, click consumed      | `+` | `-` |
//! | dragging, click not consumed  | `+` | `+` |
//!
//! The click flag is one-shot: it is set on press and cleared by the next sample.

use super::lock;
use super::multimouse::Aggregate;
use crate::binding::{Renderer, SlotBinding};
use crate::classify::Archetype;
use crate::device::{AbsRange, DeviceInfo, InputId};
use crate::event::InputEvent;
use crate::pump::EventSink;
use evdev::{AbsoluteAxisCode, KeyCode, RelativeAxisCode};
use std::sync::{Arc, Mutex};

/// Where pointer motion comes from.
#[derive(Clone, Copy, Debug, PartialEq)]
enum Source {
    /// Relative motion, primary button.
    Relative,
    /// Absolute single-contact axes, touch button.
    Touch { x: AbsRange, y: AbsRange },
}

/// Pure pointer state, driven by events and drained by samples.
#[derive(Clone, Debug, PartialEq)]
pub struct PointerState {
    source: Source,
    width: f32,
    height: f32,
    /// Free pointer position (relative devices only).
    pointer: [f32; 2],
    /// Position last seen while dragging.
    position: [f32; 2],
    drag_start: [f32; 2],
    dragging: bool,
    click: bool,
    /// Touch only: whether X / Y of the drag start have been captured.
    captured: [bool; 2],
}

impl PointerState {
    fn with_source(source: Source, width: u32, height: u32) -> Self {
        Self {
            source,
            width: width as f32,
            height: height as f32,
            pointer: [1.0, 1.0],
            position: [1.0, 1.0],
            drag_start: [1.0, 1.0],
            dragging: false,
            click: false,
            captured: [false, false],
        }
    }

    /// State for a relative pointer with a primary button.
    pub fn button(width: u32, height: u32) -> Self {
        Self::with_source(Source::Relative, width, height)
    }

    /// State for a single-contact absolute pointer with the given axis ranges.
    pub fn touch(width: u32, height: u32, x: AbsRange, y: AbsRange) -> Self {
        Self::with_source(Source::Touch { x, y }, width, height)
    }

    pub fn is_dragging(&self) -> bool {
        self.dragging
    }

    pub fn has_pending_click(&self) -> bool {
        self.click
    }

    /// Apply one event; returns whether the pointer is dragging afterwards.
    pub fn apply(&mut self, event: &InputEvent) -> bool {
        match self.source {
            Source::Relative => self.apply_relative(event),
            Source::Touch { x, y } => self.apply_touch(event, x, y),
        }
        self.dragging
    }

    fn apply_relative(&mut self, event: &InputEvent) {
        match *event {
            InputEvent::Key { key, value } if key == KeyCode::BTN_LEFT => match value {
                1 => {
                    self.click = true;
                    self.drag_start = self.pointer;
                    self.position = self.pointer;
                    self.dragging = true;
                }
                0 => self.dragging = false,
                _ => {}
            },
            InputEvent::Relative { axis, value } => {
                if axis == RelativeAxisCode::REL_X {
                    self.pointer[0] = (self.pointer[0] + value as f32).clamp(1.0, self.width.max(1.0));
                } else if axis == RelativeAxisCode::REL_Y {
                    // Device Y grows downwards, viewport Y grows upwards.
                    self.pointer[1] = (self.pointer[1] - value as f32).clamp(1.0, self.height.max(1.0));
                } else {
                    return;
                }
                if self.dragging {
                    self.position = self.pointer;
                }
            }
            _ => {}
        }
    }

    fn apply_touch(&mut self, event: &InputEvent, x: AbsRange, y: AbsRange) {
        match *event {
            InputEvent::Key { key, value } if key == KeyCode::BTN_TOUCH => {
                if value == 1 {
                    self.dragging = true;
                    self.click = true;
                } else if value == 0 {
                    self.dragging = false;
                    self.captured = [false, false];
                }
            }
            InputEvent::Absolute { axis, value } if axis == AbsoluteAxisCode::ABS_X => {
                self.position[0] = x.map(value, self.width);
                if !self.captured[0] {
                    self.drag_start[0] = self.position[0];
                    self.captured[0] = true;
                }
            }
            InputEvent::Absolute { axis, value } if axis == AbsoluteAxisCode::ABS_Y => {
                self.position[1] = self.height - y.map(value, self.height);
                if !self.captured[1] {
                    self.drag_start[1] = self.position[1];
                    self.captured[1] = true;
                }
            }
            _ => {}
        }
    }

    /// Produce the 4-vector and consume the click flag.
    pub fn sample(&mut self) -> [f32; 4] {
        let [mut z, mut w] = self.drag_start;
        if self.dragging {
            if !self.click {
                w = -w;
            }
        } else {
            z = -z;
            w = -w;
        }
        self.click = false;
        [self.position[0], self.position[1], z, w]
    }
}

/// A bound pointer device.
///
/// Events reach it through [`EventSink::dispatch`] on its pump thread. While the pointer is a
/// member of a [`MultiMouse`](super::MultiMouse), dispatch is routed through the aggregate so it
/// can track which member is dragging.
#[derive(Debug)]
pub struct PointerInput {
    id: InputId,
    archetype: Archetype,
    slot: SlotBinding,
    info: Arc<DeviceInfo>,
    state: Mutex<PointerState>,
    aggregate: Mutex<Option<Arc<Aggregate>>>,
}

impl PointerInput {
    pub fn new(
        id: InputId,
        archetype: Archetype,
        slot: SlotBinding,
        info: Arc<DeviceInfo>,
        state: PointerState,
    ) -> Self {
        Self {
            id,
            archetype,
            slot,
            info,
            state: Mutex::new(state),
            aggregate: Mutex::new(None),
        }
    }

    pub fn id(&self) -> InputId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.slot.name
    }

    pub fn slot(&self) -> &SlotBinding {
        &self.slot
    }

    pub fn archetype(&self) -> Archetype {
        self.archetype
    }

    pub fn info(&self) -> &Arc<DeviceInfo> {
        &self.info
    }

    pub fn is_dragging(&self) -> bool {
        lock(&self.state).is_dragging()
    }

    /// Copy of the current state, without consuming anything.
    pub fn snapshot(&self) -> PointerState {
        lock(&self.state).clone()
    }

    /// Apply one event to this pointer's own state.
    pub(crate) fn apply(&self, event: &InputEvent) -> bool {
        lock(&self.state).apply(event)
    }

    pub fn sample(&self) -> [f32; 4] {
        lock(&self.state).sample()
    }

    pub fn render(&self, renderer: &mut dyn Renderer) {
        renderer.set_vec4(self.slot.location, self.sample());
    }

    /// Route future events through `aggregate`, or back to this pointer when `None`.
    pub(crate) fn route_to(&self, aggregate: Option<Arc<Aggregate>>) {
        *lock(&self.aggregate) = aggregate;
    }

    pub fn is_aggregated(&self) -> bool {
        lock(&self.aggregate).is_some()
    }
}

impl EventSink for PointerInput {
    fn dispatch(&self, event: &InputEvent) {
        let aggregate = lock(&self.aggregate).clone();
        match aggregate {
            Some(aggregate) => aggregate.dispatch(self, event),
            None => {
                self.apply(event);
            }
        }
    }
}
