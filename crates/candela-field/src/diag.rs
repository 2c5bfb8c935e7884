//! Debug/visualization access to the probe field.
//!
//! Everything a developer overlay needs (probe world positions with
//! deterministic parity colors, plus runtime tuning of the bias and
//! hysteresis parameters) behind one explicit accessor instead of open
//! access to the field's internals. Reading markers never affects core
//! state; tuning writes take effect on the next update.

use glam::Vec3;

use crate::field::IrradianceField;
use candela_core::ProbeGrid;

/// World-space radius used when drawing probe markers.
pub const MARKER_RADIUS: f32 = 0.075;

/// One probe's debug marker.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProbeMarker {
    pub position: Vec3,
    /// Parity color: adjacent probes along any axis always differ.
    pub color: Vec3,
}

/// Diagnostics capability over a borrowed field.
pub struct Diagnostics<'a> {
    field: &'a mut IrradianceField,
}

impl<'a> Diagnostics<'a> {
    pub(crate) fn new(field: &'a mut IrradianceField) -> Self {
        Self { field }
    }

    /// Markers for every probe, in linear index order.
    pub fn probe_markers(&self) -> Vec<ProbeMarker> {
        let grid = self.field.grid();
        (0..grid.probe_count())
            .map(|index| ProbeMarker {
                position: grid.position(index),
                color: ProbeGrid::visualization_color(grid.grid_coord(index)),
            })
            .collect()
    }

    pub fn hysteresis(&self) -> f32 {
        self.field.spec().hysteresis
    }

    /// Clamped to [0, 1): 1.0 would freeze the atlases forever.
    pub fn set_hysteresis(&mut self, hysteresis: f32) {
        self.field.spec_mut().hysteresis = hysteresis.clamp(0.0, 0.999);
    }

    pub fn depth_sharpness(&self) -> f32 {
        self.field.spec().depth_sharpness
    }

    pub fn set_depth_sharpness(&mut self, sharpness: f32) {
        self.field.spec_mut().depth_sharpness = sharpness.max(0.0);
    }

    pub fn distance_bias(&self) -> f32 {
        self.field.spec().distance_bias
    }

    pub fn set_distance_bias(&mut self, bias: f32) {
        self.field.spec_mut().distance_bias = bias;
    }

    pub fn variance_bias(&self) -> f32 {
        self.field.spec().variance_bias
    }

    pub fn set_variance_bias(&mut self, bias: f32) {
        self.field.spec_mut().variance_bias = bias;
    }

    pub fn chebyshev_bias(&self) -> f32 {
        self.field.spec().chebyshev_bias
    }

    pub fn set_chebyshev_bias(&mut self, bias: f32) {
        self.field.spec_mut().chebyshev_bias = bias;
    }

    pub fn normal_bias(&self) -> f32 {
        self.field.spec().normal_bias
    }

    pub fn set_normal_bias(&mut self, bias: f32) {
        self.field.spec_mut().normal_bias = bias;
    }
}
