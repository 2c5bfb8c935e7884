//! Packed octahedral probe atlas: layout math, texel storage, and the
//! descriptor a renderer needs to materialize it on the GPU.
//!
//! Every probe owns one `side`-by-`side` octahedral tile padded by a
//! one-texel border, arranged row-major with the (x, y) grid coordinates
//! stacked along the atlas width and z along the height, plus a one-texel
//! outer margin. Borders let edge-clamped bilinear fetches stay inside the
//! owning probe's data.

use glam::{UVec2, UVec3, Vec4};

/// Value written to every texel outside a probe's valid octahedron
/// footprint, so filtering degrades gracefully instead of reading garbage.
pub const BORDER_SENTINEL: Vec4 = Vec4::ONE;

/// Dimensions and storage format of one probe atlas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AtlasLayout {
    pub probe_counts: UVec3,
    /// Interior side length of one probe's octahedral tile.
    pub side: u32,
    pub format: wgpu::TextureFormat,
}

impl AtlasLayout {
    pub fn new(probe_counts: UVec3, side: u32, format: wgpu::TextureFormat) -> Self {
        assert!(side > 0, "octahedral tile side must be positive");
        Self {
            probe_counts,
            side,
            format,
        }
    }

    /// One-texel padding on each side of every tile, one-texel outer margin.
    pub fn width(&self) -> u32 {
        (self.side + 2) * self.probe_counts.x * self.probe_counts.y + 2
    }

    pub fn height(&self) -> u32 {
        (self.side + 2) * self.probe_counts.z + 2
    }

    pub fn texel_count(&self) -> usize {
        self.width() as usize * self.height() as usize
    }

    /// Atlas coordinates of the first *interior* texel of a probe's tile.
    pub fn tile_origin(&self, coord: UVec3) -> UVec2 {
        let column = coord.x + coord.y * self.probe_counts.x;
        UVec2::new((self.side + 2) * column + 2, (self.side + 2) * coord.z + 2)
    }

    pub fn extent(&self) -> wgpu::Extent3d {
        wgpu::Extent3d {
            width: self.width(),
            height: self.height(),
            depth_or_array_layers: 1,
        }
    }

    /// Descriptor for the backing GPU texture.
    pub fn to_descriptor<'a>(&self, label: Option<&'a str>) -> wgpu::TextureDescriptor<'a> {
        wgpu::TextureDescriptor {
            label,
            size: self.extent(),
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: self.format,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        }
    }
}

/// CPU-resident texel storage for one probe atlas.
///
/// Texels are RGBA32F regardless of the selected storage format; narrowing
/// to the GPU format happens at upload. The irradiance atlas uses rgb, the
/// mean-distance atlas uses r = mean distance, g = mean squared distance.
pub struct AtlasTexture {
    layout: AtlasLayout,
    texels: Vec<Vec4>,
}

impl AtlasTexture {
    pub fn new(layout: AtlasLayout) -> Self {
        let mut atlas = Self {
            layout,
            texels: Vec::new(),
        };
        atlas.allocate();
        atlas
    }

    fn allocate(&mut self) {
        log::debug!(
            "allocating {}x{} probe atlas ({:?})",
            self.layout.width(),
            self.layout.height(),
            self.layout.format
        );
        // Sentinel everywhere, then zero the octahedron interiors.
        self.texels = vec![BORDER_SENTINEL; self.layout.texel_count()];
        let side = self.layout.side;
        for probe in 0..probe_total(self.layout.probe_counts) {
            let coord = probe_coord(self.layout.probe_counts, probe);
            let origin = self.layout.tile_origin(coord);
            for ty in 0..side {
                for tx in 0..side {
                    let index = self.texel_index(origin.x + tx, origin.y + ty);
                    self.texels[index] = Vec4::ZERO;
                }
            }
        }
    }

    /// Reallocate only if `layout` actually differs. Returns true when the
    /// backing store was replaced (callers must treat the atlas as cold).
    pub fn ensure(&mut self, layout: AtlasLayout) -> bool {
        if self.layout == layout {
            return false;
        }
        log::info!(
            "probe atlas layout changed ({}x{} -> {}x{}), reallocating",
            self.layout.width(),
            self.layout.height(),
            layout.width(),
            layout.height()
        );
        self.layout = layout;
        self.allocate();
        true
    }

    pub fn layout(&self) -> &AtlasLayout {
        &self.layout
    }

    fn texel_index(&self, x: u32, y: u32) -> usize {
        debug_assert!(x < self.layout.width() && y < self.layout.height());
        (y * self.layout.width() + x) as usize
    }

    pub fn texel(&self, x: u32, y: u32) -> Vec4 {
        self.texels[self.texel_index(x, y)]
    }

    pub fn set_texel(&mut self, x: u32, y: u32, value: Vec4) {
        let index = self.texel_index(x, y);
        self.texels[index] = value;
    }

    pub fn texels(&self) -> &[Vec4] {
        &self.texels
    }

    /// Tightly packed RGBA32F bytes for `queue.write_texture`; converting
    /// to a narrower storage format is the uploader's concern.
    pub fn rgba32f_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.texels)
    }
}

pub(crate) fn probe_total(counts: UVec3) -> u32 {
    counts.x * counts.y * counts.z
}

pub(crate) fn probe_coord(counts: UVec3, index: u32) -> UVec3 {
    UVec3::new(
        index % counts.x,
        (index % (counts.x * counts.y)) / counts.x,
        index / (counts.x * counts.y),
    )
}
