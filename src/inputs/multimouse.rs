//! Several pointers multiplexed onto one slot.
//!
//! The first member seen starting a drag while no member is active becomes the active member;
//! every sample is delegated to it until its drag ends. Members keep their own state the whole
//! time, so a member that leaves the aggregate carries on exactly where it was.

use super::lock;
use super::pointer::PointerInput;
use crate::binding::{Renderer, SlotBinding};
use crate::device::InputId;
use crate::event::InputEvent;
use std::sync::{Arc, Mutex};

/// Vector uploaded before any member has been sampled.
const IDLE: [f32; 4] = [1.0, 1.0, -1.0, -1.0];

/// The part of a [`MultiMouse`] shared with its members' pump threads.
#[derive(Debug, Default)]
pub struct Aggregate {
    active: Mutex<Option<InputId>>,
}

impl Aggregate {
    /// Apply `event` to `member` and claim the active role for it if it just started dragging.
    pub(crate) fn dispatch(&self, member: &PointerInput, event: &InputEvent) {
        let dragging = member.apply(event);
        let mut active = lock(&self.active);
        if active.is_none() && dragging {
            *active = Some(member.id());
        }
    }

    pub fn active(&self) -> Option<InputId> {
        *lock(&self.active)
    }

    fn clear_if(&self, id: InputId) {
        let mut active = lock(&self.active);
        if *active == Some(id) {
            *active = None;
        }
    }
}

/// Aggregator for pointer-class inputs bound to the same slot name.
#[derive(Debug)]
pub struct MultiMouse {
    slot: SlotBinding,
    members: Vec<Arc<PointerInput>>,
    shared: Arc<Aggregate>,
    idle: [f32; 4],
}

impl MultiMouse {
    pub fn new(slot: SlotBinding) -> Self {
        Self {
            slot,
            members: Vec::new(),
            shared: Arc::new(Aggregate::default()),
            idle: IDLE,
        }
    }

    pub fn name(&self) -> &str {
        &self.slot.name
    }

    pub fn members(&self) -> &[Arc<PointerInput>] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn contains(&self, id: InputId) -> bool {
        self.members.iter().any(|m| m.id() == id)
    }

    /// Member currently driving the slot.
    pub fn active(&self) -> Option<InputId> {
        self.shared.active()
    }

    /// Add a member and route its events through this aggregate.
    ///
    /// Returns `false` if it is already a member.
    pub fn add(&mut self, member: Arc<PointerInput>) -> bool {
        if self.contains(member.id()) {
            return false;
        }
        member.route_to(Some(self.shared.clone()));
        self.members.push(member);
        true
    }

    /// Detach a member; its events go back to itself.
    pub fn remove(&mut self, id: InputId) -> Option<Arc<PointerInput>> {
        let index = self.members.iter().position(|m| m.id() == id)?;
        let member = self.members.remove(index);
        member.route_to(None);
        self.shared.clear_if(id);
        Some(member)
    }

    /// Detach every member, leaving the aggregate empty.
    pub fn dissolve(&mut self) -> Vec<Arc<PointerInput>> {
        let members = std::mem::take(&mut self.members);
        for member in &members {
            member.route_to(None);
            self.shared.clear_if(member.id());
        }
        members
    }

    /// Sample the active member, or the idle vector when nobody is dragging.
    pub fn sample(&mut self) -> [f32; 4] {
        let Some(id) = self.shared.active() else {
            return self.idle;
        };
        let Some(member) = self.members.iter().find(|m| m.id() == id) else {
            self.shared.clear_if(id);
            return self.idle;
        };
        let value = member.sample();
        if !member.is_dragging() {
            self.shared.clear_if(id);
        }
        let [x, y, z, w] = value;
        self.idle = [x, y, -z.abs(), -w.abs()];
        value
    }

    pub fn render(&mut self, renderer: &mut dyn Renderer) {
        let value = self.sample();
        renderer.set_vec4(self.slot.location, value);
    }
}
