//! Bound inputs and their per-archetype state machines.
//!
//! Each device-backed input keeps its state behind a mutex that is written by the input's own
//! pump thread and read by the renderer thread when it samples. Locks are held for a single
//! event or a single sample.

pub mod keyboard;
pub mod multimouse;
pub mod pointer;
pub mod touch;

pub use keyboard::KeyboardInput;
pub use multimouse::MultiMouse;
pub use pointer::{PointerInput, PointerState};
pub use touch::{MultiTouchInput, MultiTouchTracker, TouchSlot};

use crate::binding::Renderer;
use crate::classify::Archetype;
use crate::device::InputId;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Lock, recovering the data if a worker panicked while holding it.
pub(crate) fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// An input taking part in per-frame sampling.
#[derive(Debug)]
pub enum ActiveInput {
    Pointer(Arc<PointerInput>),
    MultiMouse(MultiMouse),
    Keyboard(Arc<KeyboardInput>),
    MultiTouch(Arc<MultiTouchInput>),
}

impl ActiveInput {
    /// Slot name this input writes to.
    pub fn name(&self) -> &str {
        match self {
            ActiveInput::Pointer(p) => p.name(),
            ActiveInput::MultiMouse(m) => m.name(),
            ActiveInput::Keyboard(k) => k.name(),
            ActiveInput::MultiTouch(t) => t.name(),
        }
    }

    /// Archetype of a device-backed input; `None` for an aggregator.
    pub fn archetype(&self) -> Option<Archetype> {
        match self {
            ActiveInput::Pointer(p) => Some(p.archetype()),
            ActiveInput::MultiMouse(_) => None,
            ActiveInput::Keyboard(_) => Some(Archetype::Keyboard),
            ActiveInput::MultiTouch(t) => Some(t.archetype()),
        }
    }

    /// Id of a device-backed input; `None` for an aggregator.
    pub fn id(&self) -> Option<InputId> {
        match self {
            ActiveInput::Pointer(p) => Some(p.id()),
            ActiveInput::MultiMouse(_) => None,
            ActiveInput::Keyboard(k) => Some(k.id()),
            ActiveInput::MultiTouch(t) => Some(t.id()),
        }
    }

    /// Whether this input reads the node at `path`, directly or through a member.
    pub fn reads(&self, path: &Path) -> bool {
        match self {
            ActiveInput::Pointer(p) => p.info().path() == path,
            ActiveInput::MultiMouse(m) => m.members().iter().any(|p| p.info().path() == path),
            ActiveInput::Keyboard(k) => k.info().path() == path,
            ActiveInput::MultiTouch(t) => t.info().path() == path,
        }
    }

    /// Write the current state into the bound slot.
    pub fn render(&mut self, renderer: &mut dyn Renderer) {
        match self {
            ActiveInput::Pointer(p) => p.render(renderer),
            ActiveInput::MultiMouse(m) => m.render(renderer),
            ActiveInput::Keyboard(k) => k.render(renderer),
            ActiveInput::MultiTouch(t) => t.render(renderer),
        }
    }
}
