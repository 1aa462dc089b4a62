//! Texture types and descriptors.

use super::{Extent3d, Origin3d};
use bitflags::bitflags;

/// Texture format enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextureFormat {
    // 8-bit formats
    /// 8-bit red channel, unsigned normalized.
    R8Unorm,
    /// 8-bit red channel, signed normalized.
    R8Snorm,
    /// 8-bit red channel, unsigned integer.
    R8Uint,
    /// 8-bit red channel, signed integer.
    R8Sint,

    // 16-bit formats
    /// 16-bit red channel, unsigned normalized.
    R16Unorm,
    /// 16-bit red channel, unsigned integer.
    R16Uint,
    /// 16-bit red channel, float.
    R16Float,
    /// 8-bit RG channels, unsigned normalized.
    Rg8Unorm,

    // 32-bit formats
    /// 32-bit red channel, float.
    R32Float,
    /// 32-bit red channel, unsigned integer.
    R32Uint,
    /// 16-bit RG channels, float.
    Rg16Float,
    /// 8-bit RGBA channels, unsigned normalized.
    #[default]
    Rgba8Unorm,
    /// 8-bit RGBA channels, sRGB.
    Rgba8UnormSrgb,
    /// 8-bit RGBA channels, unsigned integer.
    Rgba8Uint,
    /// 8-bit BGRA channels, unsigned normalized.
    Bgra8Unorm,
    /// 8-bit BGRA channels, sRGB.
    Bgra8UnormSrgb,
    /// 10-bit RGB with 2-bit alpha, unsigned normalized.
    Rgb10a2Unorm,

    // 64-bit formats
    /// 16-bit RGBA channels, float.
    Rgba16Float,
    /// 32-bit RG channels, float.
    Rg32Float,

    // 128-bit formats
    /// 32-bit RGBA channels, float.
    Rgba32Float,
    /// 32-bit RGBA channels, unsigned integer.
    Rgba32Uint,

    // Depth/stencil formats
    /// 16-bit depth.
    Depth16Unorm,
    /// 24-bit depth with 8-bit stencil.
    Depth24UnormStencil8,
    /// 32-bit depth, float.
    Depth32Float,
    /// 32-bit depth float with 8-bit stencil.
    Depth32FloatStencil8,
}

impl TextureFormat {
    /// Returns true if this is a depth or stencil format.
    pub fn is_depth_stencil(&self) -> bool {
        matches!(
            self,
            Self::Depth16Unorm
                | Self::Depth24UnormStencil8
                | Self::Depth32Float
                | Self::Depth32FloatStencil8
        )
    }

    /// Returns true if this format has a stencil component.
    pub fn has_stencil(&self) -> bool {
        matches!(
            self,
            Self::Depth24UnormStencil8 | Self::Depth32FloatStencil8
        )
    }

    /// Returns the size in bytes per pixel.
    pub fn block_size(&self) -> u32 {
        match self {
            Self::R8Unorm | Self::R8Snorm | Self::R8Uint | Self::R8Sint => 1,
            Self::R16Unorm
            | Self::R16Uint
            | Self::R16Float
            | Self::Rg8Unorm
            | Self::Depth16Unorm => 2,
            Self::R32Float
            | Self::R32Uint
            | Self::Rg16Float
            | Self::Rgba8Unorm
            | Self::Rgba8UnormSrgb
            | Self::Rgba8Uint
            | Self::Bgra8Unorm
            | Self::Bgra8UnormSrgb
            | Self::Rgb10a2Unorm
            | Self::Depth24UnormStencil8
            | Self::Depth32Float => 4,
            Self::Rgba16Float | Self::Rg32Float | Self::Depth32FloatStencil8 => 8,
            Self::Rgba32Float | Self::Rgba32Uint => 16,
        }
    }
}

bitflags! {
    /// Usage flags for textures.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TextureUsage: u32 {
        /// Texture can be sampled or loaded through a read view.
        const SAMPLED = 1 << 0;
        /// Texture can be bound through a read-write view.
        const STORAGE = 1 << 1;
        /// Texture can be used as a color attachment.
        const RENDER_TARGET = 1 << 2;
        /// Texture can be used as a depth/stencil attachment.
        const DEPTH_STENCIL = 1 << 3;
        /// Array layers are interpreted as cube faces (6 per cube).
        const CUBEMAP = 1 << 4;
        /// Texture lives in CPU-visible memory and is used for transfers.
        const STAGING = 1 << 5;
        /// Mip chain can be generated on the GPU.
        const GENERATE_MIPMAPS = 1 << 6;
    }
}

impl Default for TextureUsage {
    fn default() -> Self {
        Self::empty()
    }
}

/// Dimensionality of a texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextureType {
    /// One-dimensional texture.
    Texture1D,
    /// Two-dimensional texture.
    #[default]
    Texture2D,
    /// Three-dimensional texture.
    Texture3D,
}

/// Number of samples per texel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub enum TextureSampleCount {
    /// Single sample (no multisampling).
    #[default]
    Count1,
    /// 2 samples.
    Count2,
    /// 4 samples.
    Count4,
    /// 8 samples.
    Count8,
    /// 16 samples.
    Count16,
    /// 32 samples.
    Count32,
}

impl TextureSampleCount {
    /// Sample count as an integer.
    pub fn count(self) -> u32 {
        match self {
            Self::Count1 => 1,
            Self::Count2 => 2,
            Self::Count4 => 4,
            Self::Count8 => 8,
            Self::Count16 => 16,
            Self::Count32 => 32,
        }
    }

    /// Returns true for more than one sample.
    pub fn is_multisampled(self) -> bool {
        self != Self::Count1
    }
}

/// Descriptor for creating a texture.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TextureDescriptor {
    /// Debug label for the texture.
    pub label: Option<String>,
    /// Size of the texture.
    pub size: Extent3d,
    /// Mip level count.
    pub mip_level_count: u32,
    /// Array layer count (cube count × 6 for cubemaps).
    pub array_layers: u32,
    /// Sample count for multisampling.
    pub sample_count: TextureSampleCount,
    /// Texture dimensionality.
    pub texture_type: TextureType,
    /// Texture format.
    pub format: TextureFormat,
    /// Usage flags.
    pub usage: TextureUsage,
}

impl TextureDescriptor {
    /// Create a new 2D texture descriptor.
    pub fn new_2d(width: u32, height: u32, format: TextureFormat, usage: TextureUsage) -> Self {
        Self {
            size: Extent3d::new_2d(width, height),
            format,
            usage,
            ..Default::default()
        }
    }

    /// Create a new 3D texture descriptor.
    pub fn new_3d(
        width: u32,
        height: u32,
        depth: u32,
        format: TextureFormat,
        usage: TextureUsage,
    ) -> Self {
        Self {
            size: Extent3d::new_3d(width, height, depth),
            texture_type: TextureType::Texture3D,
            format,
            usage,
            ..Default::default()
        }
    }

    /// Set the debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Set the mip level count.
    pub fn with_mip_levels(mut self, count: u32) -> Self {
        self.mip_level_count = count;
        self
    }

    /// Set the array layer count.
    pub fn with_array_layers(mut self, count: u32) -> Self {
        self.array_layers = count;
        self
    }

    /// Set the sample count for multisampling.
    pub fn with_sample_count(mut self, count: TextureSampleCount) -> Self {
        self.sample_count = count;
        self
    }

    /// Width, height and depth of a mip level (never below 1).
    pub fn mip_extent(&self, mip_level: u32) -> Extent3d {
        Extent3d {
            width: (self.size.width >> mip_level).max(1),
            height: (self.size.height >> mip_level).max(1),
            depth: (self.size.depth >> mip_level).max(1),
        }
    }

    /// Number of addressable layers: cube textures expose 6 faces per layer.
    pub fn effective_array_layers(&self) -> u32 {
        if self.usage.contains(TextureUsage::CUBEMAP) {
            self.array_layers * 6
        } else {
            self.array_layers
        }
    }

    /// Linear subresource index for a mip level and array layer.
    pub fn subresource_index(&self, mip_level: u32, array_layer: u32) -> u32 {
        array_layer * self.mip_level_count + mip_level
    }

    /// Total number of subresources.
    pub fn subresource_count(&self) -> u32 {
        self.mip_level_count * self.effective_array_layers()
    }
}

impl Default for TextureDescriptor {
    fn default() -> Self {
        Self {
            label: None,
            size: Extent3d::new_2d(1, 1),
            mip_level_count: 1,
            array_layers: 1,
            sample_count: TextureSampleCount::Count1,
            texture_type: TextureType::Texture2D,
            format: TextureFormat::default(),
            usage: TextureUsage::empty(),
        }
    }
}

/// Descriptor for a view onto a sub-range of a texture.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct TextureViewDescriptor {
    /// Debug label.
    pub label: Option<String>,
    /// First visible mip level.
    pub base_mip_level: u32,
    /// Number of visible mip levels.
    pub mip_levels: u32,
    /// First visible array layer.
    pub base_array_layer: u32,
    /// Number of visible array layers.
    pub array_layers: u32,
    /// Format reinterpretation; `None` keeps the texture format.
    pub format: Option<TextureFormat>,
}

impl TextureViewDescriptor {
    /// A view covering every subresource of a texture.
    pub fn full(texture: &TextureDescriptor) -> Self {
        Self {
            label: None,
            base_mip_level: 0,
            mip_levels: texture.mip_level_count,
            base_array_layer: 0,
            array_layers: texture.effective_array_layers(),
            format: None,
        }
    }

    /// Restrict the view to a mip range.
    pub fn with_mips(mut self, base: u32, count: u32) -> Self {
        self.base_mip_level = base;
        self.mip_levels = count;
        self
    }

    /// Restrict the view to an array range.
    pub fn with_array_layers(mut self, base: u32, count: u32) -> Self {
        self.base_array_layer = base;
        self.array_layers = count;
        self
    }

    /// Reinterpret the texel format.
    pub fn with_format(mut self, format: TextureFormat) -> Self {
        self.format = Some(format);
        self
    }
}

/// One subresource of a texture plus a texel origin inside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TextureLocation {
    /// Mip level.
    pub mip_level: u32,
    /// Array layer (cube face index for cubemaps).
    pub array_layer: u32,
    /// Texel origin inside the subresource.
    pub origin: Origin3d,
}

impl TextureLocation {
    /// Origin of a subresource.
    pub fn new(mip_level: u32, array_layer: u32) -> Self {
        Self {
            mip_level,
            array_layer,
            origin: Origin3d::zero(),
        }
    }

    /// Set the texel origin.
    pub fn with_origin(mut self, origin: Origin3d) -> Self {
        self.origin = origin;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mip_extent_clamps_to_one() {
        let desc = TextureDescriptor::new_2d(16, 4, TextureFormat::Rgba8Unorm, TextureUsage::SAMPLED)
            .with_mip_levels(5);
        assert_eq!(desc.mip_extent(0), Extent3d::new_2d(16, 4));
        assert_eq!(desc.mip_extent(3), Extent3d::new_2d(2, 1));
        assert_eq!(desc.mip_extent(4), Extent3d::new_2d(1, 1));
    }

    #[test]
    fn test_cubemap_layers() {
        let desc = TextureDescriptor::new_2d(
            32,
            32,
            TextureFormat::Rgba8Unorm,
            TextureUsage::SAMPLED | TextureUsage::CUBEMAP,
        )
        .with_mip_levels(2);
        assert_eq!(desc.effective_array_layers(), 6);
        assert_eq!(desc.subresource_count(), 12);
        assert_eq!(desc.subresource_index(1, 2), 5);
    }

    #[test]
    fn test_format_classification() {
        assert!(TextureFormat::Depth32FloatStencil8.has_stencil());
        assert!(TextureFormat::Depth16Unorm.is_depth_stencil());
        assert!(!TextureFormat::R32Float.is_depth_stencil());
        assert_eq!(TextureFormat::Rgba32Uint.block_size(), 16);
    }
}
