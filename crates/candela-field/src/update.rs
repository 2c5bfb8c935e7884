//! Temporal probe update: blends each frame's shaded rays into the
//! octahedral atlases and re-renders tile borders for filtering.
//!
//! Runs as two passes per frame (irradiance, then mean-distance/variance),
//! parameterized identically but writing different outputs at each atlas's
//! own resolution. The first update after an allocation replaces atlas
//! contents outright (no contribution from uninitialized texels); every
//! later update is an exponential moving average controlled by hysteresis.

use glam::{Vec2, Vec3, Vec4};

use crate::atlas::{probe_coord, probe_total, AtlasLayout, AtlasTexture};
use crate::rays::RayBatch;
use crate::trace::ShadedBatch;
use candela_core::ProbeGrid;

/// Ray weights below this contribute nothing to a texel.
const WEIGHT_EPSILON: f32 = 1e-6;

fn sign_not_zero(v: Vec2) -> Vec2 {
    Vec2::new(
        if v.x >= 0.0 { 1.0 } else { -1.0 },
        if v.y >= 0.0 { 1.0 } else { -1.0 },
    )
}

/// Unit direction for a point on the octahedral map, `uv` in [-1, 1]^2.
pub fn oct_decode(uv: Vec2) -> Vec3 {
    let mut v = Vec3::new(uv.x, uv.y, 1.0 - uv.x.abs() - uv.y.abs());
    if v.z < 0.0 {
        let folded = (Vec2::ONE - Vec2::new(v.y.abs(), v.x.abs())) * sign_not_zero(Vec2::new(v.x, v.y));
        v.x = folded.x;
        v.y = folded.y;
    }
    v.normalize()
}

/// Octahedral map coordinates of a unit direction, in [-1, 1]^2.
pub fn oct_encode(dir: Vec3) -> Vec2 {
    let l1 = dir.x.abs() + dir.y.abs() + dir.z.abs();
    let uv = Vec2::new(dir.x, dir.y) / l1;
    if dir.z < 0.0 {
        (Vec2::ONE - Vec2::new(uv.y.abs(), uv.x.abs())) * sign_not_zero(uv)
    } else {
        uv
    }
}

/// Direction through the center of interior texel `(tx, ty)` of a tile
/// with interior side length `side`.
pub fn texel_direction(tx: u32, ty: u32, side: u32) -> Vec3 {
    let uv = (Vec2::new(tx as f32, ty as f32) + 0.5) / side as f32 * 2.0 - Vec2::ONE;
    oct_decode(uv)
}

/// Parameters of one frame's blend, lifted from the field specification.
#[derive(Debug, Clone, Copy)]
pub struct UpdateParams {
    pub hysteresis: f32,
    pub depth_sharpness: f32,
    pub distance_bias: f32,
    pub max_distance: f32,
}

#[derive(Clone, Copy)]
enum Pass {
    Irradiance,
    Distance,
}

/// Owns both atlases and applies the per-frame temporal blend.
///
/// The atlases are mutated only here; everything else sees them as
/// immutable borrowed views.
pub struct ProbeUpdateEngine {
    irradiance: AtlasTexture,
    mean_distance: AtlasTexture,
    first_frame: bool,
}

impl ProbeUpdateEngine {
    pub fn new(irradiance: AtlasLayout, mean_distance: AtlasLayout) -> Self {
        Self {
            irradiance: AtlasTexture::new(irradiance),
            mean_distance: AtlasTexture::new(mean_distance),
            first_frame: true,
        }
    }

    /// Reallocate whichever atlas no longer matches its layout. Any
    /// reallocation drops the engine back to the cold-start state so stale
    /// or uninitialized texels never bleed into the next blend.
    pub fn ensure_layouts(&mut self, irradiance: AtlasLayout, mean_distance: AtlasLayout) -> bool {
        let changed =
            self.irradiance.ensure(irradiance) | self.mean_distance.ensure(mean_distance);
        if changed {
            self.first_frame = true;
        }
        changed
    }

    pub fn irradiance(&self) -> &AtlasTexture {
        &self.irradiance
    }

    pub fn mean_distance(&self) -> &AtlasTexture {
        &self.mean_distance
    }

    /// True until the first update pass after (re)allocation has run.
    pub fn is_cold_start(&self) -> bool {
        self.first_frame
    }

    /// Blend one frame's shaded rays into both atlases and fix borders.
    pub fn update(
        &mut self,
        grid: &ProbeGrid,
        rays: &RayBatch,
        shaded: &ShadedBatch,
        params: &UpdateParams,
    ) {
        // Cold start: full replace, no contribution from prior contents.
        let hysteresis = if self.first_frame {
            0.0
        } else {
            params.hysteresis
        };

        blend_pass(
            &mut self.irradiance,
            grid,
            rays,
            shaded,
            params,
            hysteresis,
            Pass::Irradiance,
        );
        fix_borders(&mut self.irradiance);

        blend_pass(
            &mut self.mean_distance,
            grid,
            rays,
            shaded,
            params,
            hysteresis,
            Pass::Distance,
        );
        fix_borders(&mut self.mean_distance);

        self.first_frame = false;
        log::trace!("blended {} rays into probe atlases", rays.ray_count());
    }
}

fn blend_pass(
    atlas: &mut AtlasTexture,
    grid: &ProbeGrid,
    rays: &RayBatch,
    shaded: &ShadedBatch,
    params: &UpdateParams,
    hysteresis: f32,
    pass: Pass,
) {
    let layout = *atlas.layout();
    let side = layout.side;
    debug_assert_eq!(layout.probe_counts, grid.counts);
    debug_assert_eq!(rays.width, grid.probe_count());

    for probe in 0..probe_total(layout.probe_counts) {
        let coord = probe_coord(layout.probe_counts, probe);
        let origin = layout.tile_origin(coord);

        for ty in 0..side {
            for tx in 0..side {
                let texel_dir = texel_direction(tx, ty, side);

                let mut sum = Vec4::ZERO;
                let mut total_weight = 0.0f32;
                for ray in 0..rays.height {
                    let i = rays.index(probe, ray);
                    let alignment = texel_dir.dot(rays.directions[i]).max(0.0);
                    let (weight, value) = match pass {
                        Pass::Irradiance => {
                            (alignment, Vec4::new(
                                shaded.radiance[i].x,
                                shaded.radiance[i].y,
                                shaded.radiance[i].z,
                                1.0,
                            ))
                        }
                        Pass::Distance => {
                            let distance = if shaded.hits.is_miss(i) {
                                params.max_distance
                            } else {
                                (shaded.hits.hit_distance(i) - params.distance_bias)
                                    .clamp(0.0, params.max_distance)
                            };
                            (
                                alignment.powf(params.depth_sharpness),
                                Vec4::new(distance, distance * distance, 0.0, 1.0),
                            )
                        }
                    };
                    if weight > WEIGHT_EPSILON {
                        sum += value * weight;
                        total_weight += weight;
                    }
                }

                if total_weight > WEIGHT_EPSILON {
                    let incoming = sum / total_weight;
                    let previous = atlas.texel(origin.x + tx, origin.y + ty);
                    let blended = previous.lerp(incoming, 1.0 - hysteresis);
                    atlas.set_texel(origin.x + tx, origin.y + ty, blended);
                }
            }
        }
    }
}

/// Re-render every tile's one-texel border from its interior with
/// octahedral wrap addressing: edges mirror across the tile's centerline,
/// corners take the diagonally opposite interior corner. Keeps bilinear
/// fetches across a tile edge consistent with the map's wrapping instead
/// of blending foreign probes' texels. The outer atlas margin keeps its
/// sentinel.
pub fn fix_borders(atlas: &mut AtlasTexture) {
    let layout = *atlas.layout();
    let n = layout.side;

    for probe in 0..probe_total(layout.probe_counts) {
        let coord = probe_coord(layout.probe_counts, probe);
        let o = layout.tile_origin(coord);

        for t in 0..n {
            let mirrored = n - 1 - t;
            // Top and bottom rows.
            copy_texel(atlas, (o.x + mirrored, o.y), (o.x + t, o.y - 1));
            copy_texel(atlas, (o.x + mirrored, o.y + n - 1), (o.x + t, o.y + n));
            // Left and right columns.
            copy_texel(atlas, (o.x, o.y + mirrored), (o.x - 1, o.y + t));
            copy_texel(atlas, (o.x + n - 1, o.y + mirrored), (o.x + n, o.y + t));
        }

        // Corners wrap to the opposite interior corner.
        copy_texel(atlas, (o.x + n - 1, o.y + n - 1), (o.x - 1, o.y - 1));
        copy_texel(atlas, (o.x, o.y + n - 1), (o.x + n, o.y - 1));
        copy_texel(atlas, (o.x + n - 1, o.y), (o.x - 1, o.y + n));
        copy_texel(atlas, (o.x, o.y), (o.x + n, o.y + n));
    }
}

fn copy_texel(atlas: &mut AtlasTexture, from: (u32, u32), to: (u32, u32)) {
    let value = atlas.texel(from.0, from.1);
    atlas.set_texel(to.0, to.1, value);
}
