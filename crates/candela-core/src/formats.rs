//! Storage-format selection tables for the probe atlases.
//!
//! The field specification stores *indices* into these process-wide tables
//! rather than raw formats, so a config file can only ever name a format we
//! actually support. Lookups are bounds-checked and fail fast on an
//! out-of-range index.

/// Selectable storage formats for the irradiance atlas, cheapest first.
/// The default specification picks index 4 (RGBA16F).
pub const IRRADIANCE_FORMATS: [wgpu::TextureFormat; 6] = [
    wgpu::TextureFormat::Rgba8Unorm,
    wgpu::TextureFormat::Rgba8UnormSrgb,
    wgpu::TextureFormat::Rgb10a2Unorm,
    wgpu::TextureFormat::Rg11b10Ufloat,
    wgpu::TextureFormat::Rgba16Float,
    wgpu::TextureFormat::Rgba32Float,
];

/// Selectable storage formats for the mean-distance atlas. Only the first
/// two channels are used: X = mean distance, Y = mean squared distance.
/// The default specification picks index 1 (RG16F).
pub const DEPTH_FORMATS: [wgpu::TextureFormat; 3] = [
    wgpu::TextureFormat::Rgba8Unorm,
    wgpu::TextureFormat::Rg16Float,
    wgpu::TextureFormat::Rg32Float,
];

/// Look up an irradiance atlas format by specification index.
///
/// Panics on an out-of-range index: format indices come from validated
/// configuration, so a bad one is a programming error, not bad input.
pub fn irradiance_format(index: usize) -> wgpu::TextureFormat {
    *IRRADIANCE_FORMATS
        .get(index)
        .unwrap_or_else(|| panic!("irradiance format index {} out of range", index))
}

/// Look up a mean-distance atlas format by specification index.
pub fn depth_format(index: usize) -> wgpu::TextureFormat {
    *DEPTH_FORMATS
        .get(index)
        .unwrap_or_else(|| panic!("depth format index {} out of range", index))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_indices_resolve() {
        assert_eq!(irradiance_format(4), wgpu::TextureFormat::Rgba16Float);
        assert_eq!(depth_format(1), wgpu::TextureFormat::Rg16Float);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn irradiance_index_out_of_range_panics() {
        irradiance_format(IRRADIANCE_FORMATS.len());
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn depth_index_out_of_range_panics() {
        depth_format(DEPTH_FORMATS.len());
    }
}
