//! The runtime entry point.
//!
//! [`InputManager`] ties discovery, the registry and the validator together and implements
//! [`FrameHooks`], so a renderer only needs to hold one value and call it back.
//!
//! ```no_run
//! use uniplex::{Config, InputManager};
//!
//! let mut manager = InputManager::new(Config::default());
//! manager.discover();
//! manager.watch();
//! // hand `manager` to the renderer as its `FrameHooks`
//! ```

use crate::backends::{self, linux::EvdevDevice};
use crate::binding::{FrameContext, FrameHooks, ProgramId, Renderer};
use crate::classify::{classify, Archetype};
use crate::config::{Config, SlotNames};
use crate::device::RawDevice;
use crate::registry::{Pending, PendingInput, PendingQueue, Registry};
use crate::shutdown::ShutdownToken;
use crate::validator::{BindingValidator, PassReport};
use crate::watcher::{self, DeviceWatcher};
use std::thread::JoinHandle;

/// Classify `device` and queue it for binding. Unclassified devices are dropped (closed).
pub fn admit(
    device: Box<dyn RawDevice>,
    names: &SlotNames,
    pending: &PendingQueue,
) -> Option<Archetype> {
    let info = device.info().clone();
    let Some(archetype) = classify(&info, names.keyboard_requested()) else {
        log::debug!("{} ({}): not a supported device", info.name, info.path.display());
        return None;
    };
    log::info!(
        "{} ({}): {archetype}",
        info.name,
        info.path.display()
    );
    let name = names.for_archetype(archetype);
    pending.push(Pending::Bind(PendingInput::new(name, archetype, device)));
    Some(archetype)
}

/// Owns every input and worker of one renderer.
#[derive(Debug)]
pub struct InputManager {
    config: Config,
    registry: Registry,
    validator: BindingValidator,
    shutdown: ShutdownToken,
    watcher: Option<JoinHandle<()>>,
}

impl InputManager {
    pub fn new(config: Config) -> Self {
        let shutdown = ShutdownToken::new();
        let validator = BindingValidator::new(config.slots.clone(), shutdown.clone());
        Self {
            config,
            registry: Registry::new(),
            validator,
            shutdown,
            watcher: None,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Queue an already opened device, as discovery would.
    pub fn attach(&self, device: Box<dyn RawDevice>) -> Option<Archetype> {
        admit(device, &self.config.slots, self.registry.pending())
    }

    /// Open and queue every event node present now.
    ///
    /// Warns about explicitly requested kinds for which no device was found. Returns the number
    /// of devices queued.
    pub fn discover(&mut self) -> usize {
        let dir = &self.config.device_dir;
        let nodes = match backends::enumerate(dir) {
            Ok(nodes) => nodes,
            Err(e) => {
                log::warn!("cannot list {}: {e}", dir.display());
                Vec::new()
            }
        };
        let mut found = Vec::new();
        for path in nodes {
            match EvdevDevice::open(&path) {
                Ok(device) => {
                    if let Some(archetype) = self.attach(Box::new(device)) {
                        found.push(archetype);
                    }
                }
                Err(e) => log::debug!("skipping {}: {e}", path.display()),
            }
        }

        let slots = &self.config.slots;
        let wanted = [
            (Archetype::Keyboard, &slots.keyboard),
            (Archetype::Touchscreen, &slots.touchscreen),
            (Archetype::Trackpad, &slots.trackpad),
        ];
        for (archetype, name) in wanted {
            if let Some(name) = name {
                if !found.contains(&archetype) {
                    log::warn!(
                        "no {} device found for uniform '{name}'",
                        archetype.to_string().to_lowercase()
                    );
                }
            }
        }
        found.len()
    }

    /// Start the hot-plug watcher. A failure is logged and the runtime keeps going with what it
    /// already has.
    pub fn watch(&mut self) {
        if self.watcher.is_some() {
            return;
        }
        let watcher = match DeviceWatcher::new(&self.config.device_dir) {
            Ok(w) => w,
            Err(e) => {
                log::warn!("hot-plug disabled: {e}");
                return;
            }
        };
        match watcher::spawn(
            watcher,
            self.config.slots.clone(),
            self.registry.pending().clone(),
            self.shutdown.clone(),
        ) {
            Ok(handle) => self.watcher = Some(handle),
            Err(e) => log::warn!("hot-plug disabled: cannot start watcher: {e}"),
        }
    }

    /// Run a validation pass now.
    pub fn validate(&mut self, renderer: &mut dyn Renderer, ctx: FrameContext) -> PassReport {
        self.validator.validate(&mut self.registry, renderer, ctx)
    }

    pub fn validation_passes(&self) -> u64 {
        self.validator.passes()
    }

    /// Token observed by every worker; triggered by [`shutdown`](Self::shutdown) or Ctrl+C on a
    /// grabbed keyboard.
    pub fn shutdown_token(&self) -> ShutdownToken {
        self.shutdown.clone()
    }

    /// Stop and join every worker. Devices are closed as their pumps exit.
    pub fn shutdown(&mut self) {
        self.shutdown.trigger();
        if let Some(handle) = self.watcher.take() {
            if handle.join().is_err() {
                log::error!("device watcher panicked");
            }
        }
        self.registry.join_all();
    }
}

impl FrameHooks for InputManager {
    fn before_first_frame(
        &mut self,
        renderer: &mut dyn Renderer,
        program: ProgramId,
        width: u32,
        height: u32,
    ) {
        self.validator.reset_units(renderer.max_texture_units());
        let ctx = FrameContext {
            program,
            width,
            height,
        };
        self.validate(renderer, ctx);
    }

    fn frame(&mut self, renderer: &mut dyn Renderer, frame_index: u64, elapsed_seconds: f32) {
        if !self.registry.pending().is_empty() {
            let (width, height) = renderer.viewport();
            let ctx = FrameContext {
                program: renderer.current_program(),
                width,
                height,
            };
            let report = self.validate(renderer, ctx);
            log::debug!("frame {frame_index} ({elapsed_seconds:.2}s): {report:?}");
        }
        self.registry.render(renderer);
    }
}

impl Drop for InputManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}
