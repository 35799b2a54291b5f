//! Slot resolution and the renderer seam.
//!
//! The renderer owns the program, the uniform namespace and the frame clock. This module defines
//! the narrow interface uniplex needs from it ([`Renderer`]), the callbacks it exposes back
//! ([`FrameHooks`]), and the owned texture-unit allocator handed to the validator.

use crate::error::{Error, Result};

/// Handle of a linked program.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub struct ProgramId(pub u32);

/// Resolved location of a uniform in the current program.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SlotLocation(pub i32);

/// Texture unit index (`GL_TEXTURE0 + n`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureUnit(pub u32);

/// Renderer-side texture object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TextureId(pub u32);

/// Frame parameters passed to a validation pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameContext {
    pub program: ProgramId,
    pub width: u32,
    pub height: u32,
}

/// What uniplex consumes from the renderer.
///
/// All methods are called on the renderer's own thread, from inside a [`FrameHooks`] callback.
pub trait Renderer {
    /// Look up `name` among the active uniforms of `program`.
    fn resolve_slot(&mut self, program: ProgramId, name: &str) -> Option<SlotLocation>;

    /// Program currently in use.
    fn current_program(&self) -> ProgramId;

    /// Viewport size in pixels.
    fn viewport(&self) -> (u32, u32);

    /// Number of texture image units; `0` if unknown.
    fn max_texture_units(&self) -> u32;

    fn set_vec4(&mut self, slot: SlotLocation, value: [f32; 4]);

    fn set_vec4_array(&mut self, slot: SlotLocation, values: &[[f32; 4]]);

    /// Point a sampler uniform at `unit` and create a texture object for it.
    fn bind_sampler(&mut self, slot: SlotLocation, unit: TextureUnit) -> TextureId;

    /// Upload a single-channel 8-bit image into `texture` on `unit`.
    fn upload_r8(
        &mut self,
        unit: TextureUnit,
        texture: TextureId,
        width: u32,
        height: u32,
        data: &[u8],
    );
}

/// What the renderer calls back into.
pub trait FrameHooks {
    /// Once, after the program is linked and before the first frame.
    fn before_first_frame(
        &mut self,
        renderer: &mut dyn Renderer,
        program: ProgramId,
        width: u32,
        height: u32,
    );

    /// At the start of every frame.
    fn frame(&mut self, renderer: &mut dyn Renderer, frame_index: u64, elapsed_seconds: f32);
}

/// A uniform name resolved against a program.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlotBinding {
    pub name: String,
    pub location: SlotLocation,
}

/// Resolve `name` in `program`, or fail with [`Error::SlotNotFound`].
pub fn resolve(renderer: &mut dyn Renderer, program: ProgramId, name: &str) -> Result<SlotBinding> {
    match renderer.resolve_slot(program, name) {
        Some(location) => Ok(SlotBinding {
            name: name.to_owned(),
            location,
        }),
        None => Err(Error::SlotNotFound {
            name: name.to_owned(),
        }),
    }
}

/// Texture units to assume when the renderer does not report a limit.
const DEFAULT_TEXTURE_UNITS: u32 = 16;

/// Hands out texture units, lowest first, and takes them back on release.
#[derive(Debug, Clone)]
pub struct TextureUnits {
    max: u32,
    next: u32,
    released: Vec<TextureUnit>,
}

impl TextureUnits {
    pub fn new(max: u32) -> Self {
        Self {
            max: if max > 0 { max } else { DEFAULT_TEXTURE_UNITS },
            next: 0,
            released: Vec::new(),
        }
    }

    pub fn allocate(&mut self) -> Result<TextureUnit> {
        if !self.released.is_empty() {
            // Keep reuse deterministic: lowest released unit first.
            self.released.sort_unstable_by(|a, b| b.cmp(a));
            if let Some(unit) = self.released.pop() {
                return Ok(unit);
            }
        }
        if self.next >= self.max {
            return Err(Error::TextureUnitsExhausted { max: self.max });
        }
        let unit = TextureUnit(self.next);
        self.next += 1;
        Ok(unit)
    }

    pub fn release(&mut self, unit: TextureUnit) {
        if unit.0 < self.next && !self.released.contains(&unit) {
            self.released.push(unit);
        }
    }

    pub fn max(&self) -> u32 {
        self.max
    }
}

impl Default for TextureUnits {
    fn default() -> Self {
        Self::new(DEFAULT_TEXTURE_UNITS)
    }
}
