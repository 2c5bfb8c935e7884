//! Candela field - a spatial grid of light probes caching indirect
//! illumination for a dynamic scene.
//!
//! Each frame the field budgets one batch of sample rays (a fixed count per
//! probe, all sharing one random rotation), hands it to an external
//! intersection engine and shading kernel, and temporally blends the shaded
//! results into two packed octahedral atlases: irradiance, and
//! mean-distance/variance for the leak-suppressing visibility test. The
//! atlases plus a uniform block are the artifact consumed by the deferred
//! compositor.
//!
//! Stages run in strict order within a frame (rays, intersection, shading,
//! blend); the atlases are owned and mutated only by the update engine.

pub mod atlas;
pub mod diag;
pub mod field;
pub mod rays;
pub mod trace;
pub mod update;

pub use atlas::{AtlasLayout, AtlasTexture};
pub use diag::{Diagnostics, ProbeMarker};
pub use field::{FieldUniforms, IrradianceField, LoadOptions};
pub use rays::RayBatch;
pub use trace::{
    BackfaceCull, HitBatch, RayIntersector, SceneSource, ShadedBatch, ShadingContext,
    ShadingKernel,
};

pub use candela_core::{Aabb, FieldSpec, LightingMode, ProbeGrid};

/// Result type for field operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while driving the probe field
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Core(#[from] candela_core::Error),

    /// The external intersection engine failed; fatal to the frame since
    /// recovery needs renderer-level resource policy.
    #[error("intersection engine: {0}")]
    Intersection(String),

    /// The external shading kernel failed; fatal to the frame.
    #[error("shading kernel: {0}")]
    Shading(String),
}
