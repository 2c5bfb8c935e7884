//! Core types for the Candela light-probe field.
//!
//! This crate holds the leaf data the probe field is built from: the field
//! specification (probe placement, per-probe atlas resolutions, bias and
//! quality parameters), the derived probe grid with its linear-index
//! addressing, and the storage-format selection tables. Everything here is
//! plain data and math; GPU resources and the per-frame update live in
//! `candela-field`.

pub mod formats;
pub mod grid;
pub mod spec;

pub use grid::ProbeGrid;
pub use spec::{Aabb, FieldSpec};

use serde::{Deserialize, Serialize};

/// Result type for core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while loading field configuration
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config {}: {message}", path.display())]
    Config { path: std::path::PathBuf, message: String },

    #[error("config {}: {source}", path.display())]
    ConfigIo {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Which lighting terms downstream consumers of the probe field see.
///
/// Consumed by the shading kernel contract; the field itself only stores it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LightingMode {
    #[default]
    DirectIndirect,
    DirectOnly,
    IndirectOnly,
}

impl LightingMode {
    /// Integer encoding used in the shading kernel uniform block.
    pub fn as_index(self) -> u32 {
        match self {
            LightingMode::DirectIndirect => 0,
            LightingMode::DirectOnly => 1,
            LightingMode::IndirectOnly => 2,
        }
    }
}
