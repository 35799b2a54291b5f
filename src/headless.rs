//! A renderer with no GPU behind it.
//!
//! [`HeadlessRenderer`] declares a fixed set of uniform names, hands out locations for them and
//! records every upload. The command-line tool uses it to run the binding runtime without a display;
//! tests use it to observe exactly what would have reached the shader.

use crate::binding::{ProgramId, Renderer, SlotLocation, TextureId, TextureUnit};
use std::collections::HashMap;

/// Last value written to a slot.
#[derive(Clone, Debug, PartialEq)]
pub enum Upload {
    Vec4([f32; 4]),
    Vec4Array(Vec<[f32; 4]>),
    Sampler(TextureUnit),
}

/// In-memory [`Renderer`].
#[derive(Debug, Default)]
pub struct HeadlessRenderer {
    program: ProgramId,
    width: u32,
    height: u32,
    texture_units: u32,
    declared: Vec<String>,
    uploads: HashMap<i32, Upload>,
    upload_counts: HashMap<i32, usize>,
    textures: HashMap<u32, Vec<u8>>,
    next_texture: u32,
}

impl HeadlessRenderer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            program: ProgramId(1),
            width,
            height,
            texture_units: 16,
            ..Self::default()
        }
    }

    /// Declare a uniform the program uses.
    pub fn declare(mut self, name: &str) -> Self {
        if !self.declared.iter().any(|n| n == name) {
            self.declared.push(name.to_owned());
        }
        self
    }

    pub fn with_texture_units(mut self, units: u32) -> Self {
        self.texture_units = units;
        self
    }

    pub fn set_viewport(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
    }

    fn location_of(&self, name: &str) -> Option<i32> {
        self.declared.iter().position(|n| n == name).map(|i| i as i32)
    }

    /// Last value uploaded to `name`.
    pub fn value(&self, name: &str) -> Option<&Upload> {
        self.uploads.get(&self.location_of(name)?)
    }

    /// The last `vec4` uploaded to `name`.
    pub fn vec4(&self, name: &str) -> Option<[f32; 4]> {
        match self.value(name)? {
            Upload::Vec4(v) => Some(*v),
            _ => None,
        }
    }

    /// The last `vec4[]` uploaded to `name`.
    pub fn vec4_array(&self, name: &str) -> Option<&[[f32; 4]]> {
        match self.value(name)? {
            Upload::Vec4Array(v) => Some(v),
            _ => None,
        }
    }

    /// Number of value uploads to `name` (sampler binding excluded).
    pub fn upload_count(&self, name: &str) -> usize {
        self.location_of(name)
            .and_then(|loc| self.upload_counts.get(&loc).copied())
            .unwrap_or(0)
    }

    /// Latest image data of the texture bound to sampler `name`.
    pub fn texture(&self, name: &str) -> Option<&[u8]> {
        let unit = match self.value(name)? {
            Upload::Sampler(unit) => *unit,
            _ => return None,
        };
        self.textures.get(&unit.0).map(Vec::as_slice)
    }

    fn record(&mut self, slot: SlotLocation, upload: Upload) {
        self.uploads.insert(slot.0, upload);
        *self.upload_counts.entry(slot.0).or_default() += 1;
    }
}

impl Renderer for HeadlessRenderer {
    fn resolve_slot(&mut self, program: ProgramId, name: &str) -> Option<SlotLocation> {
        if program != self.program {
            return None;
        }
        self.location_of(name).map(SlotLocation)
    }

    fn current_program(&self) -> ProgramId {
        self.program
    }

    fn viewport(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn max_texture_units(&self) -> u32 {
        self.texture_units
    }

    fn set_vec4(&mut self, slot: SlotLocation, value: [f32; 4]) {
        log::trace!("uniform {} = {:?}", slot.0, value);
        self.record(slot, Upload::Vec4(value));
    }

    fn set_vec4_array(&mut self, slot: SlotLocation, values: &[[f32; 4]]) {
        log::trace!("uniform {} = {} x vec4", slot.0, values.len());
        self.record(slot, Upload::Vec4Array(values.to_vec()));
    }

    fn bind_sampler(&mut self, slot: SlotLocation, unit: TextureUnit) -> TextureId {
        self.uploads.insert(slot.0, Upload::Sampler(unit));
        self.next_texture += 1;
        TextureId(self.next_texture)
    }

    fn upload_r8(
        &mut self,
        unit: TextureUnit,
        _texture: TextureId,
        _width: u32,
        _height: u32,
        data: &[u8],
    ) {
        self.textures.insert(unit.0, data.to_vec());
    }
}
