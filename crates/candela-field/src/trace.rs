//! Bridge to the external intersection engine and shading kernel.
//!
//! The field never walks scene geometry itself: it submits the frame's ray
//! batch to a [`RayIntersector`], then feeds the fixed-layout hit buffers
//! to a [`ShadingKernel`] that produces per-ray radiance. Both are treated
//! as pure functions of their bound inputs for one invocation; failures
//! propagate to the caller as fatal frame errors.

use glam::{Vec3, Vec4};

use crate::atlas::AtlasTexture;
use crate::field::FieldUniforms;
use crate::rays::RayBatch;
use crate::{Error, Result};
use candela_core::{Aabb, LightingMode};

/// How much the probes count when shading *themselves*. 1.0 preserves
/// energy perfectly; slightly lower compensates for small leaks and
/// precision loss by damping the recursive feedback.
pub const RECURSIVE_ENERGY_PRESERVATION: f32 = 0.85;

/// Backface policy for the intersection engine. Probe-update rays must
/// keep back faces: a probe looking through a single-sided ceiling has to
/// register the hit or it will gather light from the wrong side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackfaceCull {
    Cull,
    KeepBackfaces,
}

/// Scene access the field needs from its host: entity bounds for grid
/// derivation, a miss fallback with radiance defined for every direction,
/// and a geometry timestamp for the rebuild debounce.
pub trait SceneSource {
    /// Bounds of every visible entity. Empty means no visible geometry;
    /// the derived grid collapses unless override counts are supplied.
    fn visible_bounds(&self) -> Vec<Aabb>;

    /// Radiance of the miss fallback (sky) in `direction`.
    fn miss_radiance(&self, direction: Vec3) -> Vec3;

    /// Seconds timestamp of the most recent geometry change.
    fn last_geometry_change(&self) -> f64;
}

/// External ray/scene intersection engine. The acceleration structure
/// behind it is a separate subsystem; the field only drives it.
pub trait RayIntersector {
    /// Refresh the acceleration structure from current scene contents.
    /// Called after geometry edits have been quiescent for the debounce
    /// window, never mid-frame.
    fn rebuild(&mut self) -> std::result::Result<(), String>;

    /// Trace one batch, writing hit attributes for every ray into the
    /// fixed-layout buffers of `hits` (already sized to the batch).
    fn intersect(
        &self,
        origins: &[Vec3],
        directions: &[Vec3],
        cull: BackfaceCull,
        hits: &mut HitBatch,
    ) -> std::result::Result<(), String>;
}

/// External GPU shading kernel contract: per-ray radiance from hit
/// attributes plus the field's own atlas bindings for the recursive
/// bounce.
pub trait ShadingKernel {
    fn shade(
        &self,
        rays: &RayBatch,
        hits: &HitBatch,
        ctx: &ShadingContext<'_>,
        radiance: &mut [Vec3],
    ) -> std::result::Result<(), String>;
}

/// Fixed-layout per-ray hit buffers matching the ray batch dimensions.
pub struct HitBatch {
    pub width: u32,
    pub height: u32,
    /// xyz = world-space hit position, w = hit distance (< 0 on miss)
    pub positions: Vec<Vec4>,
    /// xyz = world-space shading normal, w unused
    pub normals: Vec<Vec4>,
    /// rgb = lambertian coefficient, a = coverage
    pub lambertian: Vec<Vec4>,
    /// rgb = glossy coefficient, a = smoothness
    pub glossy: Vec<Vec4>,
    /// rgb = emitted radiance, a unused
    pub emissive: Vec<Vec4>,
}

impl HitBatch {
    /// Distance value marking a miss.
    pub const MISS: f32 = -1.0;

    pub fn with_dimensions(width: u32, height: u32) -> Self {
        let len = (width * height) as usize;
        Self {
            width,
            height,
            positions: vec![Vec4::new(0.0, 0.0, 0.0, Self::MISS); len],
            normals: vec![Vec4::ZERO; len],
            lambertian: vec![Vec4::ZERO; len],
            glossy: vec![Vec4::ZERO; len],
            emissive: vec![Vec4::ZERO; len],
        }
    }

    pub fn is_miss(&self, ray: usize) -> bool {
        self.positions[ray].w < 0.0
    }

    pub fn hit_distance(&self, ray: usize) -> f32 {
        self.positions[ray].w
    }
}

/// Everything the shading kernel sees for one invocation, besides the ray
/// and hit buffers themselves.
pub struct ShadingContext<'a> {
    pub uniforms: FieldUniforms,
    /// Prior-frame irradiance atlas, read for the recursive bounce.
    pub irradiance: &'a AtlasTexture,
    /// Prior-frame mean-distance atlas for the visibility test.
    pub mean_distance: &'a AtlasTexture,
    pub lighting_mode: LightingMode,
    /// False when the specification requests a single bounce.
    pub use_probe_indirect: bool,
    /// Damping applied to the field's own contribution.
    pub energy_preservation: f32,
    pub glossy_to_matte: bool,
    /// Miss fallback provider; the kernel contract requires defined
    /// radiance for every miss direction.
    pub scene: &'a dyn SceneSource,
}

/// Shaded results for one frame, consumed immediately by the update engine.
pub struct ShadedBatch {
    pub hits: HitBatch,
    /// Per-ray outgoing radiance toward the probe.
    pub radiance: Vec<Vec3>,
}

/// Trace the batch through the intersection engine and shade every ray.
pub fn trace_and_shade<I, K>(
    rays: &RayBatch,
    intersector: &I,
    kernel: &K,
    cull: BackfaceCull,
    ctx: &ShadingContext<'_>,
) -> Result<ShadedBatch>
where
    I: RayIntersector + ?Sized,
    K: ShadingKernel + ?Sized,
{
    let mut hits = HitBatch::with_dimensions(rays.width, rays.height);
    intersector
        .intersect(&rays.origins, &rays.directions, cull, &mut hits)
        .map_err(Error::Intersection)?;

    let mut radiance = vec![Vec3::ZERO; rays.ray_count()];
    kernel
        .shade(rays, &hits, ctx, &mut radiance)
        .map_err(Error::Shading)?;

    Ok(ShadedBatch { hits, radiance })
}
