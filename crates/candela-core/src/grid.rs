//! The derived probe grid: world-space placement of every probe and the
//! linear-index addressing shared with the shading kernel contract.

use glam::{UVec3, Vec3};

use crate::spec::FieldSpec;

/// World-space probe placement derived from a [`FieldSpec`].
///
/// Probes sit on a regular lattice: probe (0,0,0) at `start_position`,
/// spaced `step` per axis. An axis with a single probe is centered in the
/// volume instead of sitting at its minimum face.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProbeGrid {
    pub counts: UVec3,
    pub start_position: Vec3,
    pub step: Vec3,
}

impl ProbeGrid {
    /// Derive the grid from a specification.
    ///
    /// Panics if the probe count is not a power of two: counts are always
    /// produced by the power-of-two derivation and the budget clamp, so a
    /// violation here is a logic error upstream, not bad input.
    pub fn from_spec(spec: &FieldSpec) -> Self {
        let total = spec.probe_count();
        assert!(
            total > 0 && (total & (total - 1)) == 0,
            "probe count {} must be a power of two",
            total
        );

        let lo = spec.probe_dimensions.min;
        let hi = spec.probe_dimensions.max;
        let divisions = (spec.probe_counts.as_vec3() - Vec3::ONE).max(Vec3::ONE);
        let step = (hi - lo) / divisions;

        let mut start_position = lo;
        // Special case of a one-probe axis: center it.
        for axis in 0..3 {
            if spec.probe_counts[axis] == 1 {
                start_position[axis] = (lo[axis] + hi[axis]) * 0.5;
            }
        }

        Self {
            counts: spec.probe_counts,
            start_position,
            step,
        }
    }

    pub fn probe_count(&self) -> u32 {
        self.counts.x * self.counts.y * self.counts.z
    }

    /// Linear probe index to 3D grid coordinate.
    pub fn grid_coord(&self, index: u32) -> UVec3 {
        UVec3::new(
            index % self.counts.x,
            (index % (self.counts.x * self.counts.y)) / self.counts.x,
            index / (self.counts.x * self.counts.y),
        )
    }

    /// 3D grid coordinate back to linear probe index.
    pub fn linear_index(&self, coord: UVec3) -> u32 {
        coord.x + coord.y * self.counts.x + coord.z * self.counts.x * self.counts.y
    }

    /// World-space position of a probe.
    pub fn position(&self, index: u32) -> Vec3 {
        self.start_position + self.step * self.grid_coord(index).as_vec3()
    }

    /// Deterministic visualization color from grid-coordinate parity,
    /// normalized so every probe marker has the same brightness.
    pub fn visualization_color(coord: UVec3) -> Vec3 {
        let c = Vec3::new(
            (coord.x & 1) as f32,
            (coord.y & 1) as f32,
            (coord.z & 1) as f32,
        );
        let c = c / (c.x + c.y + c.z).max(0.01);
        c * 0.6 + Vec3::splat(0.2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::Aabb;

    fn grid(counts: UVec3, min: Vec3, max: Vec3) -> ProbeGrid {
        ProbeGrid::from_spec(&FieldSpec {
            probe_counts: counts,
            probe_dimensions: Aabb::new(min, max),
            ..FieldSpec::default()
        })
    }

    #[test]
    fn index_round_trips_for_every_probe() {
        let g = grid(UVec3::new(4, 2, 4), Vec3::ZERO, Vec3::splat(8.0));
        for i in 0..g.probe_count() {
            assert_eq!(g.linear_index(g.grid_coord(i)), i);
        }
    }

    #[test]
    fn coord_mapping_matches_row_major_layout() {
        let g = grid(UVec3::new(4, 2, 4), Vec3::ZERO, Vec3::splat(8.0));
        assert_eq!(g.grid_coord(0), UVec3::ZERO);
        assert_eq!(g.grid_coord(1), UVec3::new(1, 0, 0));
        assert_eq!(g.grid_coord(4), UVec3::new(0, 1, 0));
        assert_eq!(g.grid_coord(8), UVec3::new(0, 0, 1));
        assert_eq!(g.grid_coord(31), UVec3::new(3, 1, 3));
    }

    #[test]
    fn corner_probes_span_the_volume() {
        let g = grid(
            UVec3::new(4, 2, 4),
            Vec3::new(-4.0, 0.0, -4.0),
            Vec3::new(4.0, 2.0, 4.0),
        );
        assert!((g.position(0) - Vec3::new(-4.0, 0.0, -4.0)).length() < 1e-5);
        let last = g.probe_count() - 1;
        assert!((g.position(last) - Vec3::new(4.0, 2.0, 4.0)).length() < 1e-5);
    }

    #[test]
    fn single_probe_axis_is_centered() {
        let g = grid(
            UVec3::new(4, 1, 4),
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(8.0, 6.0, 8.0),
        );
        assert_eq!(g.position(0).y, 3.0);
    }

    #[test]
    fn degenerate_single_probe_grid_sits_at_center() {
        let g = grid(UVec3::ONE, Vec3::splat(2.0), Vec3::splat(2.0));
        assert_eq!(g.position(0), Vec3::splat(2.0));
    }

    #[test]
    #[should_panic(expected = "power of two")]
    fn non_pow2_probe_count_fails_fast() {
        grid(UVec3::new(3, 2, 4), Vec3::ZERO, Vec3::ONE);
    }

    #[test]
    fn parity_colors_distinguish_neighbors() {
        let a = ProbeGrid::visualization_color(UVec3::new(0, 0, 0));
        let b = ProbeGrid::visualization_color(UVec3::new(1, 0, 0));
        assert!((a - b).length() > 0.1);
        // Equal parity means equal color.
        let c = ProbeGrid::visualization_color(UVec3::new(2, 0, 0));
        assert!((a - c).length() < 1e-6);
    }
}
