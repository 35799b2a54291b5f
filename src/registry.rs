//! Pending and active inputs.
//!
//! The pending side is a [`PendingQueue`] shared with the watcher and every pump: newly
//! classified devices and retirement signals are pushed onto it from any thread. The active side
//! is owned by the renderer thread and only changes during a validation pass.

use crate::classify::Archetype;
use crate::device::{DeviceInfo, InputId, RawDevice};
use crate::inputs::{lock, ActiveInput, MultiMouse, PointerInput};
use crate::pump::{Pump, PumpContext};
use crate::shutdown::ShutdownToken;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// A classified device waiting for its slot to be resolved.
#[derive(Debug)]
pub struct PendingInput {
    pub id: InputId,
    /// Slot name to bind to.
    pub name: String,
    pub archetype: Archetype,
    pub device: Box<dyn RawDevice>,
}

impl PendingInput {
    pub fn new(name: impl Into<String>, archetype: Archetype, device: Box<dyn RawDevice>) -> Self {
        Self {
            id: InputId::next(),
            name: name.into(),
            archetype,
            device,
        }
    }

    pub fn info(&self) -> &Arc<DeviceInfo> {
        self.device.info()
    }

    /// A fresh input of `archetype` over the same device, targeting `name`.
    pub fn substitute(self, archetype: Archetype, name: impl Into<String>) -> Self {
        Self::new(name, archetype, self.device)
    }
}

/// Work for the next validation pass.
#[derive(Debug)]
pub enum Pending {
    /// Resolve and activate a new input.
    Bind(PendingInput),
    /// Remove an input whose device went away.
    Retire(InputId),
}

/// Stack of pending work shared across threads.
#[derive(Debug, Default)]
pub struct PendingQueue {
    items: Mutex<Vec<Pending>>,
}

impl PendingQueue {
    pub fn push(&self, item: Pending) {
        lock(&self.items).push(item);
    }

    /// Take everything queued so far, oldest first.
    pub fn take(&self) -> Vec<Pending> {
        std::mem::take(&mut *lock(&self.items))
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.items).is_empty()
    }

    pub fn len(&self) -> usize {
        lock(&self.items).len()
    }
}

/// The set of inputs and the workers feeding them.
#[derive(Debug, Default)]
pub struct Registry {
    pending: Arc<PendingQueue>,
    active: Vec<ActiveInput>,
    pumps: Vec<Pump>,
    running: Arc<AtomicUsize>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared handle for producers of pending work.
    pub fn pending(&self) -> &Arc<PendingQueue> {
        &self.pending
    }

    pub fn active(&self) -> &[ActiveInput] {
        &self.active
    }

    /// Context handed to new pumps.
    pub fn pump_context(&self, shutdown: &ShutdownToken) -> PumpContext {
        PumpContext {
            pending: self.pending.clone(),
            shutdown: shutdown.clone(),
            running: self.running.clone(),
        }
    }

    /// Whether any active input already reads the node at `path`.
    pub fn owns_path(&self, path: &Path) -> bool {
        self.active.iter().any(|a| a.reads(path))
    }

    /// Add a non-pointer input to the active set.
    pub fn activate(&mut self, input: ActiveInput) {
        self.active.push(input);
    }

    /// Add a pointer, multiplexing it with any pointer already bound to the same slot.
    ///
    /// Returns `true` if the pointer ended up in a [`MultiMouse`].
    pub fn activate_pointer(&mut self, pointer: Arc<PointerInput>) -> bool {
        for input in &mut self.active {
            match input {
                ActiveInput::MultiMouse(multi) if multi.name() == pointer.name() => {
                    multi.add(pointer);
                    return true;
                }
                ActiveInput::Pointer(solo) if solo.name() == pointer.name() => {
                    let solo = solo.clone();
                    let mut multi = MultiMouse::new(solo.slot().clone());
                    multi.add(solo);
                    multi.add(pointer);
                    log::info!("multiplexing {} pointers on '{}'", multi.len(), multi.name());
                    *input = ActiveInput::MultiMouse(multi);
                    return true;
                }
                _ => {}
            }
        }
        self.active.push(ActiveInput::Pointer(pointer));
        false
    }

    pub fn add_pump(&mut self, pump: Pump) {
        self.pumps.push(pump);
    }

    /// Remove the input `id` from the active set and join its pump.
    ///
    /// A [`MultiMouse`] left with a single member is dissolved and the survivor takes its place
    /// as a plain pointer. Returns the removed input.
    pub fn retire(&mut self, id: InputId) -> Option<ActiveInput> {
        let removed = self.detach(id);
        if let Some(i) = self.pumps.iter().position(|p| p.id() == id) {
            self.pumps.swap_remove(i).join();
        }
        if removed.is_some() {
            log::debug!("retired input {id}");
        }
        removed
    }

    fn detach(&mut self, id: InputId) -> Option<ActiveInput> {
        if let Some(index) = self.active.iter().position(|a| a.id() == Some(id)) {
            return Some(self.active.remove(index));
        }
        let index = self
            .active
            .iter()
            .position(|a| matches!(a, ActiveInput::MultiMouse(m) if m.contains(id)))?;
        let ActiveInput::MultiMouse(multi) = &mut self.active[index] else {
            return None;
        };
        let member = multi.remove(id)?;
        if multi.len() <= 1 {
            match multi.dissolve().pop() {
                Some(survivor) => {
                    log::info!("'{}' back to a single pointer", survivor.name());
                    self.active[index] = ActiveInput::Pointer(survivor);
                }
                None => {
                    self.active.remove(index);
                }
            }
        }
        Some(ActiveInput::Pointer(member))
    }

    /// Sample every active input into its slot.
    pub fn render(&mut self, renderer: &mut dyn crate::binding::Renderer) {
        for input in &mut self.active {
            input.render(renderer);
        }
    }

    /// Number of pump threads currently running.
    pub fn running_pumps(&self) -> usize {
        self.running.load(Ordering::SeqCst)
    }

    /// Number of active device-backed inputs of `archetype`, aggregated members included.
    pub fn count(&self, archetype: Archetype) -> usize {
        self.active
            .iter()
            .map(|a| match a {
                ActiveInput::MultiMouse(m) => m
                    .members()
                    .iter()
                    .filter(|p| p.archetype() == archetype)
                    .count(),
                other => usize::from(other.archetype() == Some(archetype)),
            })
            .sum()
    }

    /// The aggregator bound to `name`, if pointers on it are multiplexed.
    pub fn multi_mouse(&self, name: &str) -> Option<&MultiMouse> {
        self.active.iter().find_map(|a| match a {
            ActiveInput::MultiMouse(m) if m.name() == name => Some(m),
            _ => None,
        })
    }

    /// The plain pointer bound to `name`, if it is not multiplexed.
    pub fn pointer(&self, name: &str) -> Option<&Arc<PointerInput>> {
        self.active.iter().find_map(|a| match a {
            ActiveInput::Pointer(p) if p.name() == name => Some(p),
            _ => None,
        })
    }

    /// Join every pump. Callers trigger shutdown first.
    pub fn join_all(&mut self) {
        for pump in self.pumps.drain(..) {
            pump.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::{SlotBinding, SlotLocation};
    use crate::inputs::PointerState;

    fn pointer(name: &str, path: &str) -> Arc<PointerInput> {
        Arc::new(PointerInput::new(
            InputId::next(),
            Archetype::ButtonMouse,
            SlotBinding {
                name: name.into(),
                location: SlotLocation(0),
            },
            Arc::new(DeviceInfo::new("mouse", path)),
            PointerState::button(100, 100),
        ))
    }

    #[test]
    fn test_pending_queue_order() {
        let q = PendingQueue::default();
        let a = InputId::next();
        let b = InputId::next();
        q.push(Pending::Retire(a));
        q.push(Pending::Retire(b));
        assert_eq!(q.len(), 2);
        let mut items = q.take();
        assert!(q.is_empty());
        assert!(matches!(items.pop(), Some(Pending::Retire(id)) if id == b));
    }

    #[test]
    fn test_merge_and_dissolve() {
        let mut r = Registry::new();
        let a = pointer("iMouse", "/dev/input/event1");
        let b = pointer("iMouse", "/dev/input/event2");
        let c = pointer("iMouse", "/dev/input/event3");
        assert!(!r.activate_pointer(a.clone()));
        assert!(r.activate_pointer(b.clone()));
        assert!(r.activate_pointer(c.clone()));
        assert_eq!(r.active().len(), 1);
        assert_eq!(r.multi_mouse("iMouse").unwrap().len(), 3);
        assert!(r.owns_path(Path::new("/dev/input/event2")));

        assert!(r.retire(b.id()).is_some());
        assert_eq!(r.multi_mouse("iMouse").unwrap().len(), 2);

        r.retire(a.id());
        assert!(r.multi_mouse("iMouse").is_none());
        let survivor = r.pointer("iMouse").unwrap();
        assert_eq!(survivor.id(), c.id());
        assert!(!survivor.is_aggregated());
        assert_eq!(r.count(Archetype::ButtonMouse), 1);
    }

    #[test]
    fn test_pointers_on_different_slots_stay_apart() {
        let mut r = Registry::new();
        r.activate_pointer(pointer("iMouse", "/dev/input/event1"));
        r.activate_pointer(pointer("iCursor", "/dev/input/event2"));
        assert_eq!(r.active().len(), 2);
        assert!(r.multi_mouse("iMouse").is_none());
    }

    #[test]
    fn test_retire_unknown_is_noop() {
        let mut r = Registry::new();
        r.activate_pointer(pointer("iMouse", "/dev/input/event1"));
        assert!(r.retire(InputId::next()).is_none());
        assert_eq!(r.active().len(), 1);
    }
}
