//! End-to-end probe field tests against mock scene collaborators: a flat
//! floor intersector and a kernel that shades hits with a constant albedo
//! bounce and misses with the scene's sky fallback.

use glam::{UVec3, Vec3, Vec4};
use rand::rngs::StdRng;
use rand::SeedableRng;

use candela_field::{
    Aabb, BackfaceCull, HitBatch, IrradianceField, LoadOptions, RayBatch, RayIntersector,
    SceneSource, ShadingContext, ShadingKernel,
};

const SKY: Vec3 = Vec3::new(0.1, 0.2, 0.3);

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

struct TestScene {
    bounds: Vec<Aabb>,
    changed_at: f64,
}

impl TestScene {
    fn room() -> Self {
        Self {
            bounds: vec![Aabb::new(Vec3::splat(-4.0), Vec3::splat(4.0))],
            changed_at: 0.0,
        }
    }
}

impl SceneSource for TestScene {
    fn visible_bounds(&self) -> Vec<Aabb> {
        self.bounds.clone()
    }
    fn miss_radiance(&self, _direction: Vec3) -> Vec3 {
        SKY
    }
    fn last_geometry_change(&self) -> f64 {
        self.changed_at
    }
}

/// Intersects nothing; every ray escapes to the sky.
struct EmptyWorld {
    rebuilds: u32,
}

impl RayIntersector for EmptyWorld {
    fn rebuild(&mut self) -> Result<(), String> {
        self.rebuilds += 1;
        Ok(())
    }
    fn intersect(
        &self,
        _origins: &[Vec3],
        _directions: &[Vec3],
        cull: BackfaceCull,
        _hits: &mut HitBatch,
    ) -> Result<(), String> {
        // Probe rays must never cull back faces.
        assert_eq!(cull, BackfaceCull::KeepBackfaces);
        Ok(())
    }
}

/// Ground plane at y = 0 with a fixed albedo.
struct FlatFloor;

impl RayIntersector for FlatFloor {
    fn rebuild(&mut self) -> Result<(), String> {
        Ok(())
    }
    fn intersect(
        &self,
        origins: &[Vec3],
        directions: &[Vec3],
        _cull: BackfaceCull,
        hits: &mut HitBatch,
    ) -> Result<(), String> {
        for i in 0..origins.len() {
            let (o, d) = (origins[i], directions[i]);
            if d.y < -1e-4 && o.y > 0.0 {
                let t = -o.y / d.y;
                hits.positions[i] = (o + d * t).extend(t);
                hits.normals[i] = Vec4::new(0.0, 1.0, 0.0, 0.0);
                hits.lambertian[i] = Vec4::new(0.5, 0.4, 0.3, 1.0);
            }
        }
        Ok(())
    }
}

/// Constant-albedo bounce on hits, sky fallback on misses.
struct SkyKernel;

impl ShadingKernel for SkyKernel {
    fn shade(
        &self,
        rays: &RayBatch,
        hits: &HitBatch,
        ctx: &ShadingContext<'_>,
        radiance: &mut [Vec3],
    ) -> Result<(), String> {
        for i in 0..rays.ray_count() {
            radiance[i] = if hits.is_miss(i) {
                ctx.scene.miss_radiance(rays.directions[i])
            } else {
                hits.lambertian[i].truncate() * 0.25
            };
        }
        Ok(())
    }
}

struct FailingKernel;

impl ShadingKernel for FailingKernel {
    fn shade(
        &self,
        _rays: &RayBatch,
        _hits: &HitBatch,
        _ctx: &ShadingContext<'_>,
        _radiance: &mut [Vec3],
    ) -> Result<(), String> {
        Err("device lost".into())
    }
}

fn first_interior_texel(field: &IrradianceField) -> Vec4 {
    let layout = *field.irradiance_atlas().layout();
    let origin = layout.tile_origin(UVec3::ZERO);
    field
        .irradiance_atlas()
        .texel(origin.x + layout.side / 2, origin.y + layout.side / 2)
}

#[test]
fn degenerate_scene_places_single_probe_at_center() {
    init_logging();
    let scene = TestScene {
        bounds: vec![Aabb::new(Vec3::new(1.0, 2.0, 3.0), Vec3::new(1.0, 2.0, 3.0))],
        changed_at: 0.0,
    };
    let options = LoadOptions {
        probe_counts_override: Some(UVec3::ONE),
        ..LoadOptions::default()
    };
    let field = IrradianceField::load_scene("degenerate", &scene, &options).unwrap();
    assert_eq!(field.grid().probe_count(), 1);
    assert_eq!(field.grid().position(0), Vec3::new(1.0, 2.0, 3.0));
}

#[test]
fn cold_start_fills_sky_into_every_lit_texel() {
    init_logging();
    let scene = TestScene::room();
    let mut field =
        IrradianceField::load_scene("room", &scene, &LoadOptions::default()).unwrap();
    let mut intersector = EmptyWorld { rebuilds: 0 };
    let mut rng = StdRng::seed_from_u64(1);

    field
        .update(&scene, &mut intersector, &SkyKernel, &mut rng, 1.0)
        .unwrap();

    // Every ray missed, so every touched texel holds the sky exactly even
    // though the configured hysteresis is 0.98.
    let texel = first_interior_texel(&field);
    assert!((texel.truncate() - SKY).length() < 1e-5);

    // The mean-distance atlas saw only misses: max_distance everywhere lit.
    let layout = *field.mean_distance_atlas().layout();
    let origin = layout.tile_origin(UVec3::ZERO);
    let depth_texel = field
        .mean_distance_atlas()
        .texel(origin.x + layout.side / 2, origin.y + layout.side / 2);
    assert!((depth_texel.x - field.max_distance()).abs() < 1e-3);
}

#[test]
fn steady_state_tracks_scene_radiance() {
    init_logging();
    let scene = TestScene::room();
    let mut field =
        IrradianceField::load_scene("room", &scene, &LoadOptions::default()).unwrap();
    let mut intersector = FlatFloor;
    let mut rng = StdRng::seed_from_u64(2);

    for frame in 0..64 {
        field
            .update(&scene, &mut intersector, &SkyKernel, &mut rng, frame as f64)
            .unwrap();
    }

    // Atlas values stay inside the span of observed radiance: between the
    // floor bounce and the sky.
    let texel = first_interior_texel(&field).truncate();
    let floor = Vec3::new(0.5, 0.4, 0.3) * 0.25;
    for channel in 0..3 {
        let lo = floor[channel].min(SKY[channel]) - 1e-4;
        let hi = floor[channel].max(SKY[channel]) + 1e-4;
        assert!(texel[channel] >= lo && texel[channel] <= hi);
    }
}

#[test]
fn geometry_rebuild_is_debounced() {
    init_logging();
    let mut scene = TestScene::room();
    scene.changed_at = 10.0;
    let mut field =
        IrradianceField::load_scene("room", &scene, &LoadOptions::default()).unwrap();
    let mut intersector = EmptyWorld { rebuilds: 0 };
    let mut rng = StdRng::seed_from_u64(3);

    // Within the quiescence window: trace against the stale structure.
    field
        .update(&scene, &mut intersector, &SkyKernel, &mut rng, 10.05)
        .unwrap();
    assert_eq!(intersector.rebuilds, 0);

    // Quiescent long enough: rebuild exactly once.
    field
        .update(&scene, &mut intersector, &SkyKernel, &mut rng, 10.2)
        .unwrap();
    assert_eq!(intersector.rebuilds, 1);
    field
        .update(&scene, &mut intersector, &SkyKernel, &mut rng, 10.3)
        .unwrap();
    assert_eq!(intersector.rebuilds, 1);

    // A new edit re-arms the debounce.
    field.mark_scene_changed();
    field
        .update(&scene, &mut intersector, &SkyKernel, &mut rng, 10.5)
        .unwrap();
    assert_eq!(intersector.rebuilds, 2);
}

#[test]
fn resolution_change_reallocates_and_cold_starts() {
    init_logging();
    let scene = TestScene::room();
    let mut field =
        IrradianceField::load_scene("room", &scene, &LoadOptions::default()).unwrap();
    let mut intersector = EmptyWorld { rebuilds: 0 };
    let mut rng = StdRng::seed_from_u64(4);

    for frame in 0..8 {
        field
            .update(&scene, &mut intersector, &SkyKernel, &mut rng, frame as f64)
            .unwrap();
    }
    assert_eq!(field.irradiance_atlas().layout().width(), 82);

    field.set_irradiance_resolution(16);
    field
        .update(&scene, &mut intersector, &SkyKernel, &mut rng, 9.0)
        .unwrap();

    // New dimensions, and the first pass after reallocation fully
    // replaced the texels despite hysteresis.
    assert_eq!(field.irradiance_atlas().layout().width(), 146);
    let texel = first_interior_texel(&field);
    assert!((texel.truncate() - SKY).length() < 1e-5);
}

#[test]
fn kernel_failure_drops_the_frame() {
    init_logging();
    let scene = TestScene::room();
    let mut field =
        IrradianceField::load_scene("room", &scene, &LoadOptions::default()).unwrap();
    let mut intersector = EmptyWorld { rebuilds: 0 };
    let mut rng = StdRng::seed_from_u64(5);

    let err = field
        .update(&scene, &mut intersector, &FailingKernel, &mut rng, 1.0)
        .unwrap_err();
    assert!(matches!(err, candela_field::Error::Shading(_)));
}

#[test]
fn shading_context_carries_the_recursive_bounce_contract() {
    init_logging();
    struct ContractKernel;
    impl ShadingKernel for ContractKernel {
        fn shade(
            &self,
            rays: &RayBatch,
            _hits: &HitBatch,
            ctx: &ShadingContext<'_>,
            radiance: &mut [Vec3],
        ) -> Result<(), String> {
            assert!(ctx.use_probe_indirect);
            assert_eq!(ctx.energy_preservation, 0.85);
            assert!(ctx.glossy_to_matte);
            assert_eq!(ctx.uniforms.probe_counts[3], 32);
            // Prior atlas is readable for the recursive bounce.
            let _ = ctx.irradiance.texel(0, 0);
            radiance.fill(Vec3::ZERO);
            assert_eq!(radiance.len(), rays.ray_count());
            Ok(())
        }
    }

    let scene = TestScene::room();
    let mut field =
        IrradianceField::load_scene("room", &scene, &LoadOptions::default()).unwrap();
    let mut intersector = EmptyWorld { rebuilds: 0 };
    let mut rng = StdRng::seed_from_u64(6);
    field
        .update(&scene, &mut intersector, &ContractKernel, &mut rng, 1.0)
        .unwrap();
}
