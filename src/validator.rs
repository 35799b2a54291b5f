//! The binding validation pass.
//!
//! Runs on the renderer thread, once after program link and again at the start of any frame
//! with pending work. A pass:
//!
//! 1. reconciles retirements queued by pumps,
//! 2. pops pending inputs most recent first, resolving each one's slot,
//! 3. substitutes a pointer for a multi-touch panel whose slot is missing, pushing the
//!    substitute back on top so it is handled in the same pass,
//! 4. activates what resolved (multiplexing pointers that share a slot) and starts its pump.
//!
//! Nothing here is fatal: a bad device only ever costs itself.

use crate::binding::{self, FrameContext, Renderer, SlotBinding, TextureUnits};
use crate::classify::Archetype;
use crate::config::SlotNames;
use crate::device::{AbsRange, DeviceInfo};
use crate::inputs::{
    ActiveInput, KeyboardInput, MultiTouchInput, MultiTouchTracker, PointerInput, PointerState,
};
use crate::pump::{self, EventSink};
use crate::registry::{Pending, PendingInput, Registry};
use crate::shutdown::ShutdownToken;
use evdev::AbsoluteAxisCode;
use std::sync::Arc;

/// What one pass did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PassReport {
    pub bound: usize,
    pub substituted: usize,
    pub discarded: usize,
    pub retired: usize,
}

/// Resolves pending inputs against the current program.
#[derive(Debug)]
pub struct BindingValidator {
    names: SlotNames,
    units: TextureUnits,
    shutdown: ShutdownToken,
    passes: u64,
}

impl BindingValidator {
    pub fn new(names: SlotNames, shutdown: ShutdownToken) -> Self {
        Self {
            names,
            units: TextureUnits::default(),
            shutdown,
            passes: 0,
        }
    }

    /// Size the texture-unit pool from the renderer's limit.
    pub fn reset_units(&mut self, max: u32) {
        self.units = TextureUnits::new(max);
    }

    /// Completed passes so far.
    pub fn passes(&self) -> u64 {
        self.passes
    }

    pub fn validate(
        &mut self,
        registry: &mut Registry,
        renderer: &mut dyn Renderer,
        ctx: FrameContext,
    ) -> PassReport {
        let mut report = PassReport::default();
        let mut stack = Vec::new();

        // Retire first so a device re-plugged on the same node is not taken for a duplicate.
        for item in registry.pending().take() {
            match item {
                Pending::Retire(id) => {
                    if let Some(removed) = registry.retire(id) {
                        if let ActiveInput::Keyboard(k) = removed {
                            self.units.release(k.unit());
                        }
                        report.retired += 1;
                    }
                }
                Pending::Bind(input) => stack.push(input),
            }
        }

        while let Some(input) = stack.pop() {
            if registry.owns_path(input.info().path()) {
                log::debug!(
                    "{} is already bound, dropping duplicate",
                    input.info().path().display()
                );
                report.discarded += 1;
                continue;
            }

            let slot = match binding::resolve(renderer, ctx.program, &input.name) {
                Ok(slot) => slot,
                Err(e) => {
                    if let Some(fallback) = input.archetype.fallback() {
                        log::debug!(
                            "{} '{}' unresolved, retrying as {fallback}",
                            input.archetype,
                            input.name
                        );
                        let pointer = self.names.pointer.clone();
                        stack.push(input.substitute(fallback, pointer));
                        report.substituted += 1;
                    } else {
                        if input.archetype.is_pointer() && input.name == self.names.pointer {
                            log::debug!("program does not use '{}'", input.name);
                        } else {
                            log::warn!("invalid {} input: {e}", input.archetype);
                        }
                        report.discarded += 1;
                    }
                    continue;
                }
            };

            if self.bind(registry, renderer, ctx, input, slot) {
                report.bound += 1;
            } else {
                report.discarded += 1;
            }
        }

        self.passes += 1;
        log::debug!("validation pass {} done: {report:?}", self.passes);
        report
    }

    fn bind(
        &mut self,
        registry: &mut Registry,
        renderer: &mut dyn Renderer,
        ctx: FrameContext,
        input: PendingInput,
        slot: SlotBinding,
    ) -> bool {
        let PendingInput {
            id,
            name,
            archetype,
            device,
        } = input;
        let info = device.info().clone();

        // Only pointers share a slot; anything else gets it to itself.
        if !archetype.is_pointer() && registry.active().iter().any(|a| a.name() == name) {
            log::warn!(
                "invalid {archetype} input '{}': uniform '{name}' is already bound",
                info.name
            );
            return false;
        }

        let sink: Arc<dyn EventSink> = match archetype {
            Archetype::ButtonMouse | Archetype::TouchMouse => {
                let state = pointer_state(archetype, &info, ctx);
                let pointer = Arc::new(PointerInput::new(id, archetype, slot, info.clone(), state));
                registry.activate_pointer(pointer.clone());
                pointer
            }
            Archetype::Keyboard => {
                let unit = match self.units.allocate() {
                    Ok(unit) => unit,
                    Err(e) => {
                        log::warn!("invalid {archetype} input '{name}': {e}");
                        return false;
                    }
                };
                let texture = renderer.bind_sampler(slot.location, unit);
                let keyboard = Arc::new(KeyboardInput::new(
                    id,
                    slot,
                    info.clone(),
                    unit,
                    texture,
                    self.shutdown.clone(),
                ));
                registry.activate(ActiveInput::Keyboard(keyboard.clone()));
                keyboard
            }
            Archetype::Touchscreen | Archetype::Trackpad => {
                let tracker = MultiTouchTracker::for_device(&info, ctx.width, ctx.height);
                let touch = Arc::new(MultiTouchInput::new(id, archetype, slot, info.clone(), tracker));
                registry.activate(ActiveInput::MultiTouch(touch.clone()));
                touch
            }
        };

        match pump::spawn(id, device, sink, registry.pump_context(&self.shutdown)) {
            Ok(pump) => registry.add_pump(pump),
            Err(e) => {
                log::error!("cannot start event pump for {}: {e}", info.name);
                if let Some(ActiveInput::Keyboard(k)) = registry.retire(id) {
                    self.units.release(k.unit());
                }
                return false;
            }
        }
        log::info!("bound {archetype} '{}' to '{name}'", info.name);
        true
    }
}

fn pointer_state(archetype: Archetype, info: &DeviceInfo, ctx: FrameContext) -> PointerState {
    if archetype == Archetype::ButtonMouse {
        return PointerState::button(ctx.width, ctx.height);
    }
    // The touch pointer follows the single-contact axes; without them it stays put.
    let range = |axis| info.abs_range(axis).unwrap_or(AbsRange::new(0, 0));
    PointerState::touch(
        ctx.width,
        ctx.height,
        range(AbsoluteAxisCode::ABS_X),
        range(AbsoluteAxisCode::ABS_Y),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::virtual_input::{self, VirtualDevice, VirtualFeed};
    use crate::binding::ProgramId;
    use crate::headless::{HeadlessRenderer, Upload};

    fn ctx() -> FrameContext {
        FrameContext {
            program: ProgramId(1),
            width: 640,
            height: 480,
        }
    }

    fn queue(
        registry: &Registry,
        info: crate::device::DeviceInfo,
        name: &str,
        archetype: Archetype,
    ) -> VirtualFeed {
        let (device, feed) = VirtualDevice::new(info);
        registry
            .pending()
            .push(Pending::Bind(PendingInput::new(name, archetype, Box::new(device))));
        feed
    }

    fn finish(registry: &mut Registry, shutdown: &ShutdownToken) {
        shutdown.trigger();
        registry.join_all();
    }

    #[test]
    fn test_touchscreen_falls_back_to_pointer() {
        let shutdown = ShutdownToken::new();
        let mut v = BindingValidator::new(SlotNames::default(), shutdown.clone());
        let mut registry = Registry::new();
        let mut r = HeadlessRenderer::new(640, 480).declare("iMouse");
        let _feed = queue(
            &registry,
            virtual_input::touchscreen("panel", "/dev/input/event5", 10),
            "iTouchscreen",
            Archetype::Touchscreen,
        );

        let report = v.validate(&mut registry, &mut r, ctx());
        assert_eq!(report.substituted, 1);
        assert_eq!(report.bound, 1);
        assert_eq!(registry.count(Archetype::TouchMouse), 1);
        assert_eq!(registry.count(Archetype::Touchscreen), 0);
        assert_eq!(v.passes(), 1);
        finish(&mut registry, &shutdown);
    }

    #[test]
    fn test_substitute_is_not_substituted_again() {
        let shutdown = ShutdownToken::new();
        let mut v = BindingValidator::new(SlotNames::default(), shutdown.clone());
        let mut registry = Registry::new();
        // No slot at all: the touchscreen becomes a pointer once, which is then dropped silently.
        let mut r = HeadlessRenderer::new(640, 480);
        let _feed = queue(
            &registry,
            virtual_input::touchscreen("panel", "/dev/input/event5", 10),
            "iTouchscreen",
            Archetype::Touchscreen,
        );
        let report = v.validate(&mut registry, &mut r, ctx());
        assert_eq!(report.substituted, 1);
        assert_eq!(report.discarded, 1);
        assert!(registry.active().is_empty());
        assert!(registry.pending().is_empty());
        finish(&mut registry, &shutdown);
    }

    #[test]
    fn test_duplicate_node_dropped() {
        let shutdown = ShutdownToken::new();
        let mut v = BindingValidator::new(SlotNames::default(), shutdown.clone());
        let mut registry = Registry::new();
        let mut r = HeadlessRenderer::new(640, 480).declare("iMouse");
        let _a = queue(
            &registry,
            virtual_input::mouse("m", "/dev/input/event2"),
            "iMouse",
            Archetype::ButtonMouse,
        );
        let _b = queue(
            &registry,
            virtual_input::mouse("m", "/dev/input/event2"),
            "iMouse",
            Archetype::ButtonMouse,
        );
        let report = v.validate(&mut registry, &mut r, ctx());
        assert_eq!(report.bound, 1);
        assert_eq!(report.discarded, 1);
        assert!(registry.pointer("iMouse").is_some());
        finish(&mut registry, &shutdown);
    }

    #[test]
    fn test_keyboard_units_are_recycled() {
        let shutdown = ShutdownToken::new();
        let names = SlotNames {
            keyboard: Some("iKeyboard".into()),
            ..SlotNames::default()
        };
        let mut v = BindingValidator::new(names, shutdown.clone());
        v.reset_units(1);
        let mut registry = Registry::new();
        let mut r = HeadlessRenderer::new(640, 480).declare("iKeyboard");

        let feed = queue(
            &registry,
            virtual_input::keyboard("k1", "/dev/input/event7"),
            "iKeyboard",
            Archetype::Keyboard,
        );
        assert_eq!(v.validate(&mut registry, &mut r, ctx()).bound, 1);

        // The slot is taken, so the second keyboard never reaches the unit pool.
        let _second = queue(
            &registry,
            virtual_input::keyboard("k2", "/dev/input/event8"),
            "iKeyboard",
            Archetype::Keyboard,
        );
        assert_eq!(v.validate(&mut registry, &mut r, ctx()).discarded, 1);

        feed.unplug();
        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
        while registry.pending().is_empty() && std::time::Instant::now() < deadline {
            std::thread::sleep(std::time::Duration::from_millis(5));
        }
        assert_eq!(v.validate(&mut registry, &mut r, ctx()).retired, 1);

        let _third = queue(
            &registry,
            virtual_input::keyboard("k3", "/dev/input/event9"),
            "iKeyboard",
            Archetype::Keyboard,
        );
        assert_eq!(v.validate(&mut registry, &mut r, ctx()).bound, 1);
        assert!(matches!(
            registry.active(),
            [ActiveInput::Keyboard(k)] if k.unit() == crate::binding::TextureUnit(0)
        ));
        finish(&mut registry, &shutdown);
    }

    #[test]
    fn test_second_keyboard_on_taken_slot_is_discarded() {
        let shutdown = ShutdownToken::new();
        let names = SlotNames {
            keyboard: Some("iKeyboard".into()),
            ..SlotNames::default()
        };
        let mut v = BindingValidator::new(names, shutdown.clone());
        let mut registry = Registry::new();
        let mut r = HeadlessRenderer::new(640, 480).declare("iKeyboard");
        let _laptop = queue(
            &registry,
            virtual_input::keyboard("laptop", "/dev/input/event3"),
            "iKeyboard",
            Archetype::Keyboard,
        );
        let _usb = queue(
            &registry,
            virtual_input::keyboard("usb", "/dev/input/event9"),
            "iKeyboard",
            Archetype::Keyboard,
        );

        let report = v.validate(&mut registry, &mut r, ctx());
        assert_eq!(report.bound, 1);
        assert_eq!(report.discarded, 1);
        let bound: Vec<_> = registry
            .active()
            .iter()
            .filter(|a| a.name() == "iKeyboard")
            .collect();
        assert_eq!(bound.len(), 1);
        // Most recent first: the USB keyboard keeps the slot.
        assert!(bound[0].reads(std::path::Path::new("/dev/input/event9")));
        assert_eq!(registry.running_pumps(), 1);
        assert_eq!(r.value("iKeyboard"), Some(&Upload::Sampler(crate::binding::TextureUnit(0))));
        finish(&mut registry, &shutdown);
    }

    #[test]
    fn test_second_touchscreen_on_taken_slot_is_discarded() {
        let shutdown = ShutdownToken::new();
        let names = SlotNames {
            touchscreen: Some("iTouch".into()),
            ..SlotNames::default()
        };
        let mut v = BindingValidator::new(names, shutdown.clone());
        let mut registry = Registry::new();
        let mut r = HeadlessRenderer::new(640, 480).declare("iTouch");
        let _a = queue(
            &registry,
            virtual_input::touchscreen("panel a", "/dev/input/event5", 10),
            "iTouch",
            Archetype::Touchscreen,
        );
        let report = v.validate(&mut registry, &mut r, ctx());
        assert_eq!(report.bound, 1);

        // Hot-plugged later, in a pass of its own.
        let _b = queue(
            &registry,
            virtual_input::touchscreen("panel b", "/dev/input/event6", 5),
            "iTouch",
            Archetype::Touchscreen,
        );
        let report = v.validate(&mut registry, &mut r, ctx());
        assert_eq!(report.discarded, 1);
        assert_eq!(report.substituted, 0);
        assert_eq!(registry.count(Archetype::Touchscreen), 1);
        assert_eq!(registry.active().iter().filter(|a| a.name() == "iTouch").count(), 1);
        assert_eq!(registry.running_pumps(), 1);
        finish(&mut registry, &shutdown);
    }

    #[test]
    fn test_trackpad_binds_as_touch_array() {
        let shutdown = ShutdownToken::new();
        let names = SlotNames {
            trackpad: Some("iTrackpad".into()),
            ..SlotNames::default()
        };
        let mut v = BindingValidator::new(names, shutdown.clone());
        let mut registry = Registry::new();
        let mut r = HeadlessRenderer::new(640, 480).declare("iMouse").declare("iTrackpad");
        let _feed = queue(
            &registry,
            virtual_input::trackpad("pad", "/dev/input/event4", 5),
            "iTrackpad",
            Archetype::Trackpad,
        );

        let report = v.validate(&mut registry, &mut r, ctx());
        assert_eq!(report.bound, 1);
        assert_eq!(report.substituted, 0);
        assert_eq!(registry.count(Archetype::Trackpad), 1);
        assert_eq!(registry.count(Archetype::TouchMouse), 0);
        assert!(matches!(
            registry.active(),
            [ActiveInput::MultiTouch(t)] if t.archetype() == Archetype::Trackpad && t.slot_count() == 5
        ));

        registry.render(&mut r);
        assert_eq!(r.vec4_array("iTrackpad").map(<[_]>::len), Some(5));
        assert_eq!(r.vec4("iMouse"), None);
        finish(&mut registry, &shutdown);
    }

    #[test]
    fn test_trackpad_falls_back_to_pointer() {
        let shutdown = ShutdownToken::new();
        let mut v = BindingValidator::new(SlotNames::default(), shutdown.clone());
        let mut registry = Registry::new();
        let mut r = HeadlessRenderer::new(640, 480).declare("iMouse");
        let _feed = queue(
            &registry,
            virtual_input::trackpad("pad", "/dev/input/event4", 5),
            "iTrackpad",
            Archetype::Trackpad,
        );

        let report = v.validate(&mut registry, &mut r, ctx());
        assert_eq!(report.substituted, 1);
        assert_eq!(report.bound, 1);
        assert_eq!(registry.count(Archetype::Trackpad), 0);
        let pointer = registry.pointer("iMouse").expect("substituted pointer");
        assert_eq!(pointer.archetype(), Archetype::TouchMouse);
        assert_eq!(pointer.info().path(), std::path::Path::new("/dev/input/event4"));
        finish(&mut registry, &shutdown);
    }

    #[test]
    fn test_touch_pointer_needs_single_contact_axes() {
        use crate::event::InputEvent;

        let ctx = ctx();
        let full = virtual_input::touchscreen("panel", "/dev/input/event5", 2);
        let mut state = pointer_state(Archetype::TouchMouse, &full, ctx);
        state.apply(&InputEvent::abs(AbsoluteAxisCode::ABS_X, 4095));
        assert_eq!(state.sample()[0], 640.0);

        // Multi-touch axes only: nothing to map, the pointer stays at the origin.
        let mt_only = DeviceInfo::new("panel", "/dev/input/event6")
            .with_absolute(AbsoluteAxisCode::ABS_MT_POSITION_X, AbsRange::new(0, 4095))
            .with_absolute(AbsoluteAxisCode::ABS_MT_POSITION_Y, AbsRange::new(0, 4095));
        let mut state = pointer_state(Archetype::TouchMouse, &mt_only, ctx);
        state.apply(&InputEvent::abs(AbsoluteAxisCode::ABS_MT_POSITION_X, 4095));
        state.apply(&InputEvent::abs(AbsoluteAxisCode::ABS_X, 4095));
        assert_eq!(state.sample()[0], 0.0);
    }
}
