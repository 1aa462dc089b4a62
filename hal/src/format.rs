//! Format translation tables.
//!
//! Every [`TextureFormat`] and [`VertexElementFormat`] maps to exactly one
//! [`NativeFormat`]. Depth formats bound for sampling go through a second
//! pair of tables: the texture is allocated with a typeless format and the
//! read view reinterprets it. Combinations missing from those tables are
//! rejected with [`GraphicsError::Unsupported`] at creation time.

use crate::error::{GraphicsError, GraphicsResult};
use crate::types::{
    TextureDescriptor, TextureFormat, TextureSampleCount, TextureUsage, VertexElementFormat,
};

/// Native texel and vertex element formats of the flat-slot native model.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NativeFormat {
    R8Unorm,
    R8Snorm,
    R8Uint,
    R8Sint,
    R16Unorm,
    R16Uint,
    R16Float,
    R8G8Unorm,
    R32Float,
    R32Uint,
    R32Sint,
    R16G16Float,
    R16G16Snorm,
    R8G8B8A8Unorm,
    R8G8B8A8UnormSrgb,
    R8G8B8A8Uint,
    B8G8R8A8Unorm,
    B8G8R8A8UnormSrgb,
    R10G10B10A2Unorm,
    R16G16B16A16Float,
    R16G16B16A16Snorm,
    R32G32Float,
    R32G32Uint,
    R32G32B32Float,
    R32G32B32A32Float,
    R32G32B32A32Uint,
    R32G32B32A32Sint,
    D16Unorm,
    D24UnormS8Uint,
    D32Float,
    D32FloatS8X24Uint,
    R16Typeless,
    R24G8Typeless,
    R32Typeless,
    R32G8X24Typeless,
    R24UnormX8Typeless,
    R32FloatX8X24Typeless,
}

impl NativeFormat {
    /// Returns true for depth formats and their typeless storage formats.
    pub fn is_depth(self) -> bool {
        matches!(
            self,
            Self::D16Unorm
                | Self::D24UnormS8Uint
                | Self::D32Float
                | Self::D32FloatS8X24Uint
                | Self::R16Typeless
                | Self::R24G8Typeless
                | Self::R32Typeless
                | Self::R32G8X24Typeless
        )
    }

    /// Returns true for sRGB and BGRA formats, which have no read-write views.
    pub fn is_display_format(self) -> bool {
        matches!(
            self,
            Self::R8G8B8A8UnormSrgb
                | Self::B8G8R8A8Unorm
                | Self::B8G8R8A8UnormSrgb
        )
    }
}

/// Native format of a texture.
///
/// `depth_sampled` selects the typeless storage format for depth textures that
/// are also read through views.
pub fn texture_format_to_native(format: TextureFormat, depth_sampled: bool) -> NativeFormat {
    if depth_sampled && format.is_depth_stencil() {
        return typeless_depth(format);
    }

    match format {
        // 8-bit formats
        TextureFormat::R8Unorm => NativeFormat::R8Unorm,
        TextureFormat::R8Snorm => NativeFormat::R8Snorm,
        TextureFormat::R8Uint => NativeFormat::R8Uint,
        TextureFormat::R8Sint => NativeFormat::R8Sint,

        // 16-bit formats
        TextureFormat::R16Unorm => NativeFormat::R16Unorm,
        TextureFormat::R16Uint => NativeFormat::R16Uint,
        TextureFormat::R16Float => NativeFormat::R16Float,
        TextureFormat::Rg8Unorm => NativeFormat::R8G8Unorm,

        // 32-bit formats
        TextureFormat::R32Float => NativeFormat::R32Float,
        TextureFormat::R32Uint => NativeFormat::R32Uint,
        TextureFormat::Rg16Float => NativeFormat::R16G16Float,
        TextureFormat::Rgba8Unorm => NativeFormat::R8G8B8A8Unorm,
        TextureFormat::Rgba8UnormSrgb => NativeFormat::R8G8B8A8UnormSrgb,
        TextureFormat::Rgba8Uint => NativeFormat::R8G8B8A8Uint,
        TextureFormat::Bgra8Unorm => NativeFormat::B8G8R8A8Unorm,
        TextureFormat::Bgra8UnormSrgb => NativeFormat::B8G8R8A8UnormSrgb,
        TextureFormat::Rgb10a2Unorm => NativeFormat::R10G10B10A2Unorm,

        // 64-bit formats
        TextureFormat::Rgba16Float => NativeFormat::R16G16B16A16Float,
        TextureFormat::Rg32Float => NativeFormat::R32G32Float,

        // 128-bit formats
        TextureFormat::Rgba32Float => NativeFormat::R32G32B32A32Float,
        TextureFormat::Rgba32Uint => NativeFormat::R32G32B32A32Uint,

        // Depth/stencil formats
        TextureFormat::Depth16Unorm => NativeFormat::D16Unorm,
        TextureFormat::Depth24UnormStencil8 => NativeFormat::D24UnormS8Uint,
        TextureFormat::Depth32Float => NativeFormat::D32Float,
        TextureFormat::Depth32FloatStencil8 => NativeFormat::D32FloatS8X24Uint,
    }
}

fn typeless_depth(format: TextureFormat) -> NativeFormat {
    match format {
        TextureFormat::Depth16Unorm => NativeFormat::R16Typeless,
        TextureFormat::Depth24UnormStencil8 => NativeFormat::R24G8Typeless,
        TextureFormat::Depth32Float => NativeFormat::R32Typeless,
        TextureFormat::Depth32FloatStencil8 => NativeFormat::R32G8X24Typeless,
        other => texture_format_to_native(other, false),
    }
}

/// Format a read view uses to sample a depth texture.
pub fn depth_read_format(format: TextureFormat) -> GraphicsResult<NativeFormat> {
    match format {
        TextureFormat::Depth16Unorm => Ok(NativeFormat::R16Unorm),
        TextureFormat::Depth24UnormStencil8 => Ok(NativeFormat::R24UnormX8Typeless),
        TextureFormat::Depth32Float => Ok(NativeFormat::R32Float),
        TextureFormat::Depth32FloatStencil8 => Ok(NativeFormat::R32FloatX8X24Typeless),
        other => Err(GraphicsError::Unsupported(format!(
            "{other:?} has no depth read format"
        ))),
    }
}

/// Native format of a view onto a texture.
///
/// Depth formats only have read views; read-write views onto them are
/// unsupported.
pub fn view_format_to_native(format: TextureFormat, read_write: bool) -> GraphicsResult<NativeFormat> {
    if format.is_depth_stencil() {
        if read_write {
            return Err(GraphicsError::Unsupported(format!(
                "{format:?} cannot be bound through a read-write view"
            )));
        }
        return depth_read_format(format);
    }
    Ok(texture_format_to_native(format, false))
}

/// Native format of a vertex element.
pub fn vertex_format_to_native(format: VertexElementFormat) -> NativeFormat {
    match format {
        VertexElementFormat::Float1 => NativeFormat::R32Float,
        VertexElementFormat::Float2 => NativeFormat::R32G32Float,
        VertexElementFormat::Float3 => NativeFormat::R32G32B32Float,
        VertexElementFormat::Float4 => NativeFormat::R32G32B32A32Float,
        VertexElementFormat::Byte2Norm => NativeFormat::R8G8Unorm,
        VertexElementFormat::Byte4Norm => NativeFormat::R8G8B8A8Unorm,
        VertexElementFormat::Byte4 => NativeFormat::R8G8B8A8Uint,
        VertexElementFormat::Short2Norm => NativeFormat::R16G16Snorm,
        VertexElementFormat::Short4Norm => NativeFormat::R16G16B16A16Snorm,
        VertexElementFormat::Half2 => NativeFormat::R16G16Float,
        VertexElementFormat::Half4 => NativeFormat::R16G16B16A16Float,
        VertexElementFormat::UInt1 => NativeFormat::R32Uint,
        VertexElementFormat::UInt2 => NativeFormat::R32G32Uint,
        VertexElementFormat::UInt4 => NativeFormat::R32G32B32A32Uint,
        VertexElementFormat::Int1 => NativeFormat::R32Sint,
        VertexElementFormat::Int4 => NativeFormat::R32G32B32A32Sint,
    }
}

/// Returns true if a depth texture with `usage` needs typeless storage.
pub fn needs_typeless_storage(format: TextureFormat, usage: TextureUsage) -> bool {
    format.is_depth_stencil() && usage.contains(TextureUsage::SAMPLED)
}

/// Native storage format of a texture.
pub fn texture_storage_format(descriptor: &TextureDescriptor) -> NativeFormat {
    texture_format_to_native(
        descriptor.format,
        needs_typeless_storage(descriptor.format, descriptor.usage),
    )
}

// ============================================================================
// Capability query
// ============================================================================

/// Limits of one format/type/usage combination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PixelFormatProperties {
    /// Maximum width.
    pub max_width: u32,
    /// Maximum height.
    pub max_height: u32,
    /// Maximum depth.
    pub max_depth: u32,
    /// Maximum mip level count.
    pub max_mip_levels: u32,
    /// Maximum array layer count.
    pub max_array_layers: u32,
    /// Supported sample counts as a mask of the counts themselves (`1 | 4`).
    pub sample_counts: u32,
}

impl PixelFormatProperties {
    /// Returns true if `count` is in the supported sample mask.
    pub fn supports_sample_count(&self, count: TextureSampleCount) -> bool {
        self.sample_counts & count.count() != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_depth_storage_is_typeless_when_sampled() {
        assert_eq!(
            texture_format_to_native(TextureFormat::Depth32Float, true),
            NativeFormat::R32Typeless
        );
        assert_eq!(
            texture_format_to_native(TextureFormat::Depth32Float, false),
            NativeFormat::D32Float
        );
        assert_eq!(
            texture_format_to_native(TextureFormat::Rgba8Unorm, true),
            NativeFormat::R8G8B8A8Unorm
        );
    }

    #[test]
    fn test_depth_view_formats() {
        assert_eq!(
            view_format_to_native(TextureFormat::Depth24UnormStencil8, false),
            Ok(NativeFormat::R24UnormX8Typeless)
        );
        assert!(matches!(
            view_format_to_native(TextureFormat::Depth16Unorm, true),
            Err(GraphicsError::Unsupported(_))
        ));
        assert!(depth_read_format(TextureFormat::Rgba8Unorm).is_err());
    }

    #[test]
    fn test_sample_mask() {
        let props = PixelFormatProperties {
            max_width: 1,
            max_height: 1,
            max_depth: 1,
            max_mip_levels: 1,
            max_array_layers: 1,
            sample_counts: 1 | 4,
        };
        assert!(props.supports_sample_count(TextureSampleCount::Count4));
        assert!(!props.supports_sample_count(TextureSampleCount::Count8));
    }
}
