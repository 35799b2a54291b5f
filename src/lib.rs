//! uniplex: binds Linux input devices to the uniforms of a frame-driven renderer.
//!
//! Devices found at startup or hot-plugged later are classified into a few archetypes (button
//! mice, touch pointers, keyboards, touchscreens, trackpads), bound to named slots of the
//! current program and sampled once per frame into small fixed-size values: a Shadertoy-style
//! `iMouse` vector, a `vec4` array per multi-touch panel, a 256x3 keyboard texture.
//!
//! Each bound device is read on its own thread; the renderer only ever sees per-input state
//! behind short-lived locks. Binding happens in validation passes the renderer drives through
//! [`FrameHooks`], so everything that touches the program runs on the renderer's thread.

pub mod backends;
pub mod binding;
pub mod classify;
pub mod config;
pub mod device;
pub mod error;
pub mod event;
pub mod headless;
pub mod inputs;
pub mod logger;
pub mod manager;
pub mod metadata;
pub mod pump;
pub mod registry;
pub mod shutdown;
pub mod validator;
pub mod watcher;

pub use binding::{FrameContext, FrameHooks, ProgramId, Renderer, SlotLocation, TextureUnit};
pub use classify::{classify, Archetype};
pub use config::{Config, SlotNames};
pub use device::{AbsRange, DeviceInfo, InputId, RawDevice};
pub use error::{DeviceError, Error, Result};
pub use event::InputEvent;
pub use headless::HeadlessRenderer;
pub use manager::InputManager;
pub use metadata::DeviceMeta;
pub use shutdown::ShutdownToken;
