//! Crate-level error types.
//!
//! Only [`Error::InvalidRequest`], [`Error::Config`] and [`Error::ConfigRead`] are fatal; they are
//! raised before any device is opened. Everything else is contained to a single device or input
//! and surfaces as a log line.

use std::io;
use std::path::PathBuf;

/// Errors surfaced by uniplex.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The current program has no active uniform with this name.
    #[error("no active uniform variable '{name}'")]
    SlotNotFound { name: String },

    /// Opening or querying a device node failed.
    #[error("input device {}: {source}", path.display())]
    Device {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The hot-plug watch could not be set up or read.
    #[error("device watch failed: {0}")]
    Watch(#[source] io::Error),

    /// The configuration file is not valid TOML for [`Config`](crate::config::Config).
    #[error("invalid configuration: {0}")]
    Config(#[from] toml::de::Error),

    /// The configuration file could not be read.
    #[error("cannot read configuration {}: {source}", path.display())]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A malformed operator request (bad slot name, metadata for an undeclared slot, ...).
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Every texture unit the renderer exposes is already in use.
    #[error("no free texture unit (renderer exposes {max})")]
    TextureUnitsExhausted { max: u32 },
}

/// Convenience alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Read failures reported by a [`RawDevice`](crate::device::RawDevice).
///
/// The event pump matches on these to decide between resynchronizing and retiring.
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    /// The kernel dropped events (`SYN_DROPPED`); the reader must resync.
    #[error("event buffer overflow")]
    Overflow,

    /// The node is gone (`ENODEV`).
    #[error("device no longer present")]
    Gone,

    #[error(transparent)]
    Io(io::Error),
}

impl From<io::Error> for DeviceError {
    fn from(e: io::Error) -> Self {
        if e.raw_os_error() == Some(libc::ENODEV) {
            DeviceError::Gone
        } else {
            DeviceError::Io(e)
        }
    }
}
