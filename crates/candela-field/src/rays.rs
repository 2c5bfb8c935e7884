//! Per-frame ray budget: one batch of sample rays for the whole field.
//!
//! Directions come from a fixed spherical-Fibonacci set (even angular
//! coverage per probe) rotated by a single random rotation shared across
//! the batch, so successive frames sweep different orientations and the
//! temporal blend converges to a dense sampling of the sphere.

use glam::{Mat3, Vec3};
use rand::Rng;

use candela_core::ProbeGrid;

/// One frame's ray batch: width = probe count, height = rays per probe.
/// Regenerated every frame, never persisted.
pub struct RayBatch {
    pub width: u32,
    pub height: u32,
    pub origins: Vec<Vec3>,
    pub directions: Vec<Vec3>,
}

impl RayBatch {
    /// Flat buffer index of ray `ray` belonging to probe `probe`.
    pub fn index(&self, probe: u32, ray: u32) -> usize {
        debug_assert!(probe < self.width && ray < self.height);
        (ray * self.width + probe) as usize
    }

    pub fn ray_count(&self) -> usize {
        (self.width * self.height) as usize
    }
}

/// Direction `i` of `n` on the unit sphere, spherical-Fibonacci spiral.
pub fn spherical_fibonacci(i: u32, n: u32) -> Vec3 {
    const GOLDEN_RATIO: f32 = 1.618_034;
    let phi = std::f32::consts::TAU * (i as f32 / GOLDEN_RATIO).fract();
    let cos_theta = 1.0 - (2.0 * i as f32 + 1.0) / n as f32;
    let sin_theta = (1.0 - cos_theta * cos_theta).max(0.0).sqrt();
    Vec3::new(phi.cos() * sin_theta, phi.sin() * sin_theta, cos_theta)
}

/// Uniformly random rotation: uniformly sampled axis, angle in [0, 2pi).
pub fn random_rotation(rng: &mut impl Rng) -> Mat3 {
    // Uniform direction via uniform z and azimuth.
    let z: f32 = rng.gen_range(-1.0..=1.0);
    let azimuth: f32 = rng.gen_range(0.0..std::f32::consts::TAU);
    let r = (1.0 - z * z).max(0.0).sqrt();
    let axis = Vec3::new(r * azimuth.cos(), r * azimuth.sin(), z);
    let angle: f32 = rng.gen_range(0.0..std::f32::consts::TAU);
    Mat3::from_axis_angle(axis.normalize(), angle)
}

/// Generate the frame's batch: `probe_count x rays_per_probe` rays, each
/// probe shooting the same rotated direction set from its own position.
/// Pure given the random source.
pub fn generate(grid: &ProbeGrid, rays_per_probe: u32, rng: &mut impl Rng) -> RayBatch {
    let probe_count = grid.probe_count();
    let rotation = random_rotation(rng);

    let mut origins = Vec::with_capacity((probe_count * rays_per_probe) as usize);
    let mut directions = Vec::with_capacity((probe_count * rays_per_probe) as usize);
    for ray in 0..rays_per_probe {
        let direction = rotation * spherical_fibonacci(ray, rays_per_probe);
        for probe in 0..probe_count {
            origins.push(grid.position(probe));
            directions.push(direction);
        }
    }

    RayBatch {
        width: probe_count,
        height: rays_per_probe,
        origins,
        directions,
    }
}
