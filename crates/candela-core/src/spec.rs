//! Field specification: probe placement, atlas resolutions, and the
//! bias/quality parameters that tune the temporal update.
//!
//! A specification is constructed once per scene load, either from a
//! per-scene config file or derived from scene bounds, and is immutable
//! afterwards except through explicit resize operations that re-trigger
//! atlas reallocation.

use glam::{UVec3, Vec3};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::{Error, Result};

/// Largest backing texture either atlas may occupy (4096 x 4096 texels).
pub const MAX_ATLAS_TEXELS: u64 = 4096 * 4096;

/// Axis-aligned bounding box in world space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    /// The degenerate unit box used as a "not yet computed" marker for
    /// probe dimensions in stored specifications.
    pub const UNIT: Aabb = Aabb {
        min: Vec3::ZERO,
        max: Vec3::ONE,
    };

    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn extent(&self) -> Vec3 {
        self.max - self.min
    }

    /// Smallest box containing both `self` and `other`.
    pub fn merged(&self, other: &Aabb) -> Aabb {
        Aabb {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }
}

fn default_probe_dimensions() -> Aabb {
    Aabb::UNIT
}

fn default_probe_counts() -> UVec3 {
    UVec3::new(4, 2, 4)
}

fn default_irradiance_resolution() -> u32 {
    8
}

fn default_depth_resolution() -> u32 {
    16
}

fn default_variance_bias() -> f32 {
    0.02
}

fn default_chebyshev_bias() -> f32 {
    0.07
}

fn default_normal_bias() -> f32 {
    0.25
}

fn default_hysteresis() -> f32 {
    0.98
}

fn default_depth_sharpness() -> f32 {
    50.0
}

fn default_rays_per_probe() -> u32 {
    64
}

fn default_true() -> bool {
    true
}

fn default_irradiance_format_index() -> usize {
    4
}

fn default_depth_format_index() -> usize {
    1
}

/// Immutable configuration for one probe field.
///
/// Maps one-to-one onto the per-scene config file; missing keys fall back
/// to the defaults below, unknown keys abort the load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FieldSpec {
    /// World-space volume the probe grid spans. The unit box means "derive
    /// from scene bounds at load time".
    #[serde(default = "default_probe_dimensions")]
    pub probe_dimensions: Aabb,

    /// Probes per axis. Each component must be a power of two.
    #[serde(default = "default_probe_counts")]
    pub probe_counts: UVec3,

    /// Side length of one probe's octahedral irradiance tile.
    #[serde(default = "default_irradiance_resolution")]
    pub irradiance_resolution: u32,

    /// Side length of one probe's octahedral mean-distance tile.
    #[serde(default = "default_depth_resolution")]
    pub depth_resolution: u32,

    /// Subtract a little distance when recording hits to avoid
    /// self-shadowing texel artifacts.
    #[serde(default)]
    pub distance_bias: f32,

    /// Add a little variance to smooth out self-shadowing. Larger values
    /// soften indirect shadows but also leak light.
    #[serde(default = "default_variance_bias")]
    pub variance_bias: f32,

    /// Bias for the Chebyshev visibility test against thin walls. Usually
    /// in [0, 0.5]; too large re-introduces leaks in corners.
    #[serde(default = "default_chebyshev_bias")]
    pub chebyshev_bias: f32,

    /// Bump the shadow-test point away from the shadow-casting surface.
    #[serde(default = "default_normal_bias")]
    pub normal_bias: f32,

    /// Weight of the previous atlas contents in the temporal blend, in
    /// [0, 1). Close to 1 is stable but slow to react; 0.9 and below
    /// reacts quickly but flickers.
    #[serde(default = "default_hysteresis")]
    pub hysteresis: f32,

    /// Exponent applied to ray weights in the distance pass. High values
    /// react quickly to depth discontinuities but risk banding.
    #[serde(default = "default_depth_sharpness")]
    pub depth_sharpness: f32,

    /// Sample rays emitted per probe per frame.
    #[serde(default = "default_rays_per_probe")]
    pub rays_per_probe: u32,

    /// Fold the glossy coefficient into the matte term for a single
    /// albedo, killing low-probability caustic speckle.
    #[serde(default = "default_true")]
    pub glossy_to_matte: bool,

    /// Skip the recursive probe-field bounce when shading probe rays.
    #[serde(default)]
    pub single_bounce: bool,

    /// Include emissive light fixtures when shading probe rays.
    #[serde(default)]
    pub show_lights: bool,

    /// Whether the grid encloses the scene bound (true) or is inscribed
    /// within it (false).
    #[serde(default)]
    pub enclose_bounds: bool,

    /// Index into [`crate::formats::IRRADIANCE_FORMATS`].
    #[serde(default = "default_irradiance_format_index")]
    pub irradiance_format_index: usize,

    /// Index into [`crate::formats::DEPTH_FORMATS`].
    #[serde(default = "default_depth_format_index")]
    pub depth_format_index: usize,
}

impl Default for FieldSpec {
    fn default() -> Self {
        // Keep in sync with the per-field serde defaults above.
        Self {
            probe_dimensions: default_probe_dimensions(),
            probe_counts: default_probe_counts(),
            irradiance_resolution: default_irradiance_resolution(),
            depth_resolution: default_depth_resolution(),
            distance_bias: 0.0,
            variance_bias: default_variance_bias(),
            chebyshev_bias: default_chebyshev_bias(),
            normal_bias: default_normal_bias(),
            hysteresis: default_hysteresis(),
            depth_sharpness: default_depth_sharpness(),
            rays_per_probe: default_rays_per_probe(),
            glossy_to_matte: true,
            single_bounce: false,
            show_lights: false,
            enclose_bounds: false,
            irradiance_format_index: default_irradiance_format_index(),
            depth_format_index: default_depth_format_index(),
        }
    }
}

impl FieldSpec {
    /// Total number of probes in the grid.
    pub fn probe_count(&self) -> u64 {
        self.probe_counts.x as u64 * self.probe_counts.y as u64 * self.probe_counts.z as u64
    }

    /// Whether the stored probe dimensions are the "derive me" marker.
    pub fn has_derived_dimensions(&self) -> bool {
        self.probe_dimensions == Aabb::UNIT
    }

    /// Replace the probe dimensions with a scaled copy of `scene_bounds`.
    ///
    /// Inscribing (the default) shrinks the box so probes are less likely
    /// to end up embedded in solid walls; the vertical axis shrinks more
    /// because probe counts are usually lowest there. Enclosing grows the
    /// box past the scene bound instead.
    pub fn fit_to_scene_bounds(&mut self, scene_bounds: Aabb) {
        let mut extent = scene_bounds.extent();
        if self.enclose_bounds {
            extent *= 1.1;
        } else {
            extent = Vec3::new(extent.x * 0.9, extent.y * 0.7, extent.z * 0.9);
        }
        let center = scene_bounds.center();
        self.probe_dimensions = Aabb::new(center - extent * 0.5, center + extent * 0.5);
    }

    /// Derive per-axis probe counts from a maximum probe spacing, rounding
    /// each axis up to the next power of two.
    pub fn derive_counts_from_spacing(&mut self, max_probe_spacing: f32) {
        let extent = self.probe_dimensions.extent();
        let raw = extent / max_probe_spacing;
        self.probe_counts = UVec3::new(
            (raw.x as u32).max(1).next_power_of_two(),
            (raw.y as u32).max(1).next_power_of_two(),
            (raw.z as u32).max(1).next_power_of_two(),
        );
        log::debug!("derived probe counts {:?} from spacing {}", self.probe_counts, max_probe_spacing);
    }

    /// Shrink the probe counts until both atlases fit the texel budget.
    ///
    /// Halves the vertical count while it exceeds 8, otherwise halves both
    /// horizontal counts. Counts never drop below 1; if the budget is still
    /// unreachable at (1,1,1) the loop stops rather than spin.
    pub fn clamp_to_texel_budget(&mut self) {
        let over_budget = |spec: &FieldSpec| {
            let total = spec.probe_count();
            total * (spec.irradiance_resolution as u64).pow(2) > MAX_ATLAS_TEXELS
                || total * (spec.depth_resolution as u64).pow(2) > MAX_ATLAS_TEXELS
        };

        while over_budget(self) {
            log::warn!(
                "probe field over texel budget at {:?}, halving",
                self.probe_counts
            );
            if self.probe_counts.y > 8 {
                self.probe_counts.y /= 2;
            } else if self.probe_counts.x > 1 || self.probe_counts.z > 1 {
                self.probe_counts.x = (self.probe_counts.x / 2).max(1);
                self.probe_counts.z = (self.probe_counts.z / 2).max(1);
            } else {
                log::warn!(
                    "texel budget unreachable at single-probe counts; keeping {:?}",
                    self.probe_counts
                );
                break;
            }
        }
    }

    /// Maximum distance recorded into the mean-distance atlas: slightly
    /// larger than the diagonal of one grid cell. Hits beyond it count as
    /// misses for the visibility test.
    pub fn max_distance(&self) -> f32 {
        let cell = self.probe_dimensions.extent() / self.probe_counts.as_vec3();
        cell.length() * 1.5
    }

    /// File name of the per-scene specification, with the scene name
    /// mangled to stay filesystem-safe.
    pub fn scene_file_name(scene_name: &str) -> String {
        let mangled: String = scene_name
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();
        format!("{}.probes.json", mangled)
    }

    /// Load a specification from `path`.
    ///
    /// A missing file is not an error (`Ok(None)`: fall back to derived
    /// defaults). A file that fails to parse, names an unknown key, or
    /// carries out-of-range values aborts the scene load.
    pub fn load(path: &Path) -> Result<Option<FieldSpec>> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(Error::ConfigIo {
                    path: path.to_path_buf(),
                    source: err,
                })
            }
        };
        let spec: FieldSpec = serde_json::from_str(&text).map_err(|err| Error::Config {
            path: path.to_path_buf(),
            message: err.to_string(),
        })?;
        spec.validate().map_err(|message| Error::Config {
            path: path.to_path_buf(),
            message,
        })?;
        log::info!("loaded probe field spec from {}", path.display());
        Ok(Some(spec))
    }

    /// Serialize to the config-file representation.
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).expect("FieldSpec serializes")
    }

    /// Range checks for values a config file could plausibly get wrong.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.irradiance_resolution == 0 || self.depth_resolution == 0 {
            return Err("atlas resolutions must be positive".into());
        }
        if self.rays_per_probe == 0 {
            return Err("rays_per_probe must be positive".into());
        }
        if !(0.0..1.0).contains(&self.hysteresis) {
            return Err(format!("hysteresis {} outside [0, 1)", self.hysteresis));
        }
        if self.probe_counts.cmpeq(UVec3::ZERO).any() {
            return Err("probe counts must be positive".into());
        }
        if self.irradiance_format_index >= crate::formats::IRRADIANCE_FORMATS.len()
            || self.depth_format_index >= crate::formats::DEPTH_FORMATS.len()
        {
            return Err("format index out of range".into());
        }
        Ok(())
    }
}
