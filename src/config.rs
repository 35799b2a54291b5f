//! Runtime configuration.
//!
//! Everything has a default, so an empty file (or no file at all) is a valid configuration:
//!
//! ```toml
//! device_dir = "/dev/input"
//!
//! [slots]
//! pointer = "iMouse"
//! keyboard = "iKeyboard"      # opt-in: keyboards are only bound when this is set
//! touchscreen = "iTouch"
//!
//! [metadata.iKeyboard]
//! layout = "us"
//! ```
//!
//! A keyboard, touchscreen or trackpad name counts as explicitly requested when it is set here
//! or on the command line. Unset names fall back to the conventional Shadertoy-style defaults.

use crate::classify::Archetype;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_DEVICE_DIR: &str = "/dev/input";
pub const DEFAULT_POINTER: &str = "iMouse";
pub const DEFAULT_KEYBOARD: &str = "iKeyboard";
pub const DEFAULT_TOUCHSCREEN: &str = "iTouchscreen";
pub const DEFAULT_TRACKPAD: &str = "iTrackpad";

/// Slot names per archetype.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SlotNames {
    pub pointer: String,
    pub keyboard: Option<String>,
    pub touchscreen: Option<String>,
    pub trackpad: Option<String>,
}

impl Default for SlotNames {
    fn default() -> Self {
        Self {
            pointer: DEFAULT_POINTER.to_owned(),
            keyboard: None,
            touchscreen: None,
            trackpad: None,
        }
    }
}

impl SlotNames {
    /// Keyboards are only classified when a keyboard slot was asked for.
    pub fn keyboard_requested(&self) -> bool {
        self.keyboard.is_some()
    }

    pub fn keyboard_name(&self) -> &str {
        self.keyboard.as_deref().unwrap_or(DEFAULT_KEYBOARD)
    }

    pub fn touchscreen_name(&self) -> &str {
        self.touchscreen.as_deref().unwrap_or(DEFAULT_TOUCHSCREEN)
    }

    pub fn trackpad_name(&self) -> &str {
        self.trackpad.as_deref().unwrap_or(DEFAULT_TRACKPAD)
    }

    /// Slot a freshly classified device of `archetype` targets.
    pub fn for_archetype(&self, archetype: Archetype) -> &str {
        match archetype {
            Archetype::ButtonMouse | Archetype::TouchMouse => &self.pointer,
            Archetype::Keyboard => self.keyboard_name(),
            Archetype::Touchscreen => self.touchscreen_name(),
            Archetype::Trackpad => self.trackpad_name(),
        }
    }

    /// Names set explicitly for the non-pointer kinds, with a label for diagnostics.
    pub fn requested(&self) -> Vec<(&'static str, &str)> {
        [
            ("keyboard", &self.keyboard),
            ("touchscreen", &self.touchscreen),
            ("trackpad", &self.trackpad),
        ]
        .into_iter()
        .filter_map(|(kind, name)| name.as_deref().map(|n| (kind, n)))
        .collect()
    }
}

/// Top-level configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Directory holding the `event<N>` nodes.
    pub device_dir: PathBuf,
    pub slots: SlotNames,
    /// Free-form per-slot annotations, keyed by slot name.
    ///
    /// Annotation only: checked against the declared slots and reported, never used for binding.
    pub metadata: BTreeMap<String, toml::Table>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            device_dir: PathBuf::from(DEFAULT_DEVICE_DIR),
            slots: SlotNames::default(),
            metadata: BTreeMap::new(),
        }
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl Config {
    /// Read and parse a TOML file. Does not validate.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| Error::ConfigRead {
            path: path.to_owned(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Reject malformed requests before any device is opened.
    pub fn validate(&self) -> Result<()> {
        if self.device_dir.as_os_str().is_empty() {
            return Err(Error::InvalidRequest("device directory is empty".into()));
        }

        let mut declared = vec![("pointer", self.slots.pointer.as_str())];
        declared.extend(self.slots.requested());
        for (kind, name) in &declared {
            if !is_identifier(name) {
                return Err(Error::InvalidRequest(format!(
                    "{kind} uniform '{name}' is not a valid identifier"
                )));
            }
        }
        for (i, (kind, name)) in declared.iter().enumerate() {
            if let Some((other, _)) = declared[..i].iter().find(|(_, n)| n == name) {
                return Err(Error::InvalidRequest(format!(
                    "{kind} and {other} both bind uniform '{name}'"
                )));
            }
        }

        for slot in self.metadata.keys() {
            if !declared.iter().any(|(_, name)| *name == slot.as_str()) {
                return Err(Error::InvalidRequest(format!(
                    "metadata for undeclared uniform '{slot}'"
                )));
            }
        }
        Ok(())
    }

    /// Annotations for `slot`, if any.
    pub fn metadata_for(&self, slot: &str) -> Option<&toml::Table> {
        self.metadata.get(slot)
    }
}
