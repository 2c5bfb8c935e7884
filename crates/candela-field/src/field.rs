//! The probe field itself: scene-load specification derivation, per-frame
//! stage ordering, and the uniform block handed to the shading contract.

use bytemuck::{Pod, Zeroable};
use glam::UVec3;
use rand::Rng;

use crate::atlas::{AtlasLayout, AtlasTexture};
use crate::diag::Diagnostics;
use crate::rays;
use crate::trace::{
    trace_and_shade, BackfaceCull, RayIntersector, SceneSource, ShadingContext, ShadingKernel,
    RECURSIVE_ENERGY_PRESERVATION,
};
use crate::update::{ProbeUpdateEngine, UpdateParams};
use crate::{Error, Result};
use candela_core::{formats, Aabb, FieldSpec, LightingMode, ProbeGrid};

/// Geometry edits must be quiescent this long before the intersection
/// structure is rebuilt, so rapid editing doesn't rebuild every frame.
pub const REBUILD_DEBOUNCE_SECONDS: f64 = 0.1;

/// Overrides applied while deriving a scene's specification.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Use these probe counts directly (all components must be positive).
    pub probe_counts_override: Option<UVec3>,
    /// Derive counts from this spacing when no explicit counts are given.
    pub max_probe_spacing: Option<f32>,
    pub irradiance_resolution_override: Option<u32>,
    pub depth_resolution_override: Option<u32>,
    /// Directory searched for a stored per-scene specification file.
    pub data_dir: Option<std::path::PathBuf>,
}

/// Uniform block for the shading kernel and downstream compositor:
/// everything needed to address the atlases and run the visibility test.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct FieldUniforms {
    /// xyz = probes per axis, w = total probe count
    pub probe_counts: [i32; 4],
    /// xyz = world position of probe (0,0,0), w unused
    pub probe_start_position: [f32; 4],
    /// xyz = world-space spacing per axis, w unused
    pub probe_step: [f32; 4],
    /// full atlas dimensions in texels
    pub irradiance_texture_size: [f32; 2],
    pub depth_texture_size: [f32; 2],
    /// interior octahedral side lengths
    pub irradiance_side_length: f32,
    pub depth_side_length: f32,
    pub distance_bias: f32,
    pub variance_bias: f32,
    pub chebyshev_bias: f32,
    pub normal_bias: f32,
    pub max_distance: f32,
    pub energy_preservation: f32,
    pub lighting_mode: u32,
    pub _pad: [u32; 3],
}

/// A spatial grid of light probes caching indirect illumination.
///
/// Constructed once per scene load; [`IrradianceField::update`] runs the
/// per-frame pipeline (rays, intersection, shading, temporal blend). The
/// atlases it maintains are exposed as immutable views.
pub struct IrradianceField {
    spec: FieldSpec,
    grid: ProbeGrid,
    max_distance: f32,
    updater: ProbeUpdateEngine,
    lighting_mode: LightingMode,
    scene_dirty: bool,
}

impl IrradianceField {
    /// Derive the field for a freshly loaded scene.
    ///
    /// Resolution order: stored per-scene spec file (if any), scene-bounds
    /// derivation for the probe volume, explicit count/resolution
    /// overrides, then the texel-budget clamp.
    pub fn load_scene(
        scene_name: &str,
        scene: &dyn SceneSource,
        options: &LoadOptions,
    ) -> Result<Self> {
        let stored = match &options.data_dir {
            Some(dir) => FieldSpec::load(&dir.join(FieldSpec::scene_file_name(scene_name)))?,
            None => None,
        };
        let had_stored = stored.is_some();
        let mut spec = stored.unwrap_or_default();

        if !had_stored || spec.has_derived_dimensions() {
            let bounds = scene
                .visible_bounds()
                .into_iter()
                .reduce(|acc, b| acc.merged(&b));
            if bounds.is_none() {
                log::warn!(
                    "scene '{}' has no visible geometry; probe grid collapses to a point",
                    scene_name
                );
            }
            spec.fit_to_scene_bounds(bounds.unwrap_or(Aabb::new(glam::Vec3::ZERO, glam::Vec3::ZERO)));
        }

        match options.probe_counts_override {
            Some(counts) if counts.cmpgt(UVec3::ZERO).all() => spec.probe_counts = counts,
            _ => {
                if let Some(spacing) = options.max_probe_spacing.filter(|s| *s > 0.0) {
                    spec.derive_counts_from_spacing(spacing);
                }
            }
        }
        if let Some(side) = options.irradiance_resolution_override.filter(|s| *s > 0) {
            spec.irradiance_resolution = side;
        }
        if let Some(side) = options.depth_resolution_override.filter(|s| *s > 0) {
            spec.depth_resolution = side;
        }

        spec.clamp_to_texel_budget();

        let max_distance = spec.max_distance();
        let grid = ProbeGrid::from_spec(&spec);
        let updater =
            ProbeUpdateEngine::new(Self::irradiance_layout(&spec), Self::depth_layout(&spec));

        log::info!(
            "probe field for '{}': {:?} probes, irradiance atlas {}x{}, depth atlas {}x{}, max distance {:.2}",
            scene_name,
            spec.probe_counts,
            updater.irradiance().layout().width(),
            updater.irradiance().layout().height(),
            updater.mean_distance().layout().width(),
            updater.mean_distance().layout().height(),
            max_distance,
        );

        Ok(Self {
            spec,
            grid,
            max_distance,
            updater,
            lighting_mode: LightingMode::default(),
            scene_dirty: true,
        })
    }

    fn irradiance_layout(spec: &FieldSpec) -> AtlasLayout {
        AtlasLayout::new(
            spec.probe_counts,
            spec.irradiance_resolution,
            formats::irradiance_format(spec.irradiance_format_index),
        )
    }

    fn depth_layout(spec: &FieldSpec) -> AtlasLayout {
        AtlasLayout::new(
            spec.probe_counts,
            spec.depth_resolution,
            formats::depth_format(spec.depth_format_index),
        )
    }

    /// Run one frame's update: debounced intersector refresh, buffer
    /// reallocation on spec change, ray generation, trace + shade, and the
    /// temporal blend. Stages run strictly in this order; a failure drops
    /// the whole frame.
    pub fn update<I, K, R>(
        &mut self,
        scene: &dyn SceneSource,
        intersector: &mut I,
        kernel: &K,
        rng: &mut R,
        now_seconds: f64,
    ) -> Result<()>
    where
        I: RayIntersector + ?Sized,
        K: ShadingKernel + ?Sized,
        R: Rng,
    {
        if self.scene_dirty
            && now_seconds - scene.last_geometry_change() > REBUILD_DEBOUNCE_SECONDS
        {
            log::debug!("geometry quiescent, rebuilding intersection structure");
            intersector.rebuild().map_err(Error::Intersection)?;
            self.scene_dirty = false;
        }

        // Reallocation must complete before any pass sees new dimensions.
        self.updater.ensure_layouts(
            Self::irradiance_layout(&self.spec),
            Self::depth_layout(&self.spec),
        );

        let rays = rays::generate(&self.grid, self.spec.rays_per_probe, rng);

        let ctx = ShadingContext {
            uniforms: self.uniforms(),
            irradiance: self.updater.irradiance(),
            mean_distance: self.updater.mean_distance(),
            lighting_mode: self.lighting_mode,
            use_probe_indirect: !self.spec.single_bounce,
            energy_preservation: RECURSIVE_ENERGY_PRESERVATION,
            glossy_to_matte: self.spec.glossy_to_matte,
            scene,
        };
        // Probe rays keep back faces: a probe behind a one-sided surface
        // must still see the hit.
        let shaded =
            trace_and_shade(&rays, &*intersector, kernel, BackfaceCull::KeepBackfaces, &ctx)?;

        let params = UpdateParams {
            hysteresis: self.spec.hysteresis,
            depth_sharpness: self.spec.depth_sharpness,
            distance_bias: self.spec.distance_bias,
            max_distance: self.max_distance,
        };
        self.updater.update(&self.grid, &rays, &shaded, &params);
        Ok(())
    }

    /// Flag a geometry change; the intersection structure refresh happens
    /// on a later update once edits have been quiescent.
    pub fn mark_scene_changed(&mut self) {
        self.scene_dirty = true;
    }

    pub fn spec(&self) -> &FieldSpec {
        &self.spec
    }

    pub fn grid(&self) -> &ProbeGrid {
        &self.grid
    }

    pub fn max_distance(&self) -> f32 {
        self.max_distance
    }

    pub fn lighting_mode(&self) -> LightingMode {
        self.lighting_mode
    }

    pub fn set_lighting_mode(&mut self, mode: LightingMode) {
        self.lighting_mode = mode;
    }

    /// Irradiance atlas, read-only. Mutation happens only inside update.
    pub fn irradiance_atlas(&self) -> &AtlasTexture {
        self.updater.irradiance()
    }

    pub fn mean_distance_atlas(&self) -> &AtlasTexture {
        self.updater.mean_distance()
    }

    /// Change the irradiance tile resolution; the atlas reallocates (and
    /// the field cold-starts) on the next update.
    pub fn set_irradiance_resolution(&mut self, side: u32) {
        assert!(side > 0, "atlas resolutions are positive");
        self.spec.irradiance_resolution = side;
    }

    pub fn set_depth_resolution(&mut self, side: u32) {
        assert!(side > 0, "atlas resolutions are positive");
        self.spec.depth_resolution = side;
    }

    /// Rays traced per frame, in units of 10^9.
    pub fn gigarays_per_frame(&self) -> f32 {
        (self.grid.probe_count() as u64 * self.spec.rays_per_probe as u64) as f32 / 1e9
    }

    /// Uniform block for the shading kernel / compositor contract.
    pub fn uniforms(&self) -> FieldUniforms {
        let irr = self.updater.irradiance().layout();
        let depth = self.updater.mean_distance().layout();
        FieldUniforms {
            probe_counts: [
                self.grid.counts.x as i32,
                self.grid.counts.y as i32,
                self.grid.counts.z as i32,
                self.grid.probe_count() as i32,
            ],
            probe_start_position: [
                self.grid.start_position.x,
                self.grid.start_position.y,
                self.grid.start_position.z,
                0.0,
            ],
            probe_step: [self.grid.step.x, self.grid.step.y, self.grid.step.z, 0.0],
            irradiance_texture_size: [irr.width() as f32, irr.height() as f32],
            depth_texture_size: [depth.width() as f32, depth.height() as f32],
            irradiance_side_length: irr.side as f32,
            depth_side_length: depth.side as f32,
            distance_bias: self.spec.distance_bias,
            variance_bias: self.spec.variance_bias,
            chebyshev_bias: self.spec.chebyshev_bias,
            normal_bias: self.spec.normal_bias,
            max_distance: self.max_distance,
            energy_preservation: RECURSIVE_ENERGY_PRESERVATION,
            lighting_mode: self.lighting_mode.as_index(),
            _pad: [0; 3],
        }
    }

    /// Debug/visualization access: probe markers plus runtime tuning of
    /// the bias parameters, deliberately fenced off from the normal API.
    pub fn diagnostics(&mut self) -> Diagnostics<'_> {
        Diagnostics::new(self)
    }

    pub(crate) fn spec_mut(&mut self) -> &mut FieldSpec {
        &mut self.spec
    }
}
