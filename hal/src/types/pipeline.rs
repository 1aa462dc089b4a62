//! Pipeline state descriptions.
//!
//! These are plain values. Structurally equal descriptions map to the same
//! cached native state object (see [`crate::cache::PipelineStateCache`]).

use std::sync::Arc;

use bitflags::bitflags;

use super::{CompareFunction, RgbaFloat, ShaderStages, TextureFormat, TextureSampleCount};
use crate::resources::{ResourceLayout, Shader};

// ============================================================================
// Blend state
// ============================================================================

/// Blend factor for blending operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BlendFactor {
    /// 0.0
    #[default]
    Zero,
    /// 1.0
    One,
    /// Source color
    SrcColor,
    /// 1 - source color
    OneMinusSrcColor,
    /// Source alpha
    SrcAlpha,
    /// 1 - source alpha
    OneMinusSrcAlpha,
    /// Destination color
    DstColor,
    /// 1 - destination color
    OneMinusDstColor,
    /// Destination alpha
    DstAlpha,
    /// 1 - destination alpha
    OneMinusDstAlpha,
    /// Pipeline blend factor
    BlendFactor,
    /// 1 - pipeline blend factor
    OneMinusBlendFactor,
}

/// Blend operation for combining colors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BlendOperation {
    /// source + destination
    #[default]
    Add,
    /// source - destination
    Subtract,
    /// destination - source
    ReverseSubtract,
    /// min(source, destination)
    Min,
    /// max(source, destination)
    Max,
}

bitflags! {
    /// Color channels written by a blend attachment.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ColorWriteMask: u8 {
        /// Red channel.
        const RED = 1 << 0;
        /// Green channel.
        const GREEN = 1 << 1;
        /// Blue channel.
        const BLUE = 1 << 2;
        /// Alpha channel.
        const ALPHA = 1 << 3;
        /// All channels.
        const ALL = Self::RED.bits() | Self::GREEN.bits() | Self::BLUE.bits() | Self::ALPHA.bits();
    }
}

impl Default for ColorWriteMask {
    fn default() -> Self {
        Self::ALL
    }
}

/// Blend configuration of one color attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlendAttachmentDescription {
    /// Whether blending is enabled.
    pub blend_enabled: bool,
    /// Channels written.
    pub color_write_mask: ColorWriteMask,
    /// Source color factor.
    pub source_color_factor: BlendFactor,
    /// Destination color factor.
    pub destination_color_factor: BlendFactor,
    /// Color operation.
    pub color_function: BlendOperation,
    /// Source alpha factor.
    pub source_alpha_factor: BlendFactor,
    /// Destination alpha factor.
    pub destination_alpha_factor: BlendFactor,
    /// Alpha operation.
    pub alpha_function: BlendOperation,
}

impl BlendAttachmentDescription {
    /// Blending disabled, source overwrites destination.
    pub const OVERRIDE: Self = Self {
        blend_enabled: false,
        color_write_mask: ColorWriteMask::ALL,
        source_color_factor: BlendFactor::One,
        destination_color_factor: BlendFactor::Zero,
        color_function: BlendOperation::Add,
        source_alpha_factor: BlendFactor::One,
        destination_alpha_factor: BlendFactor::Zero,
        alpha_function: BlendOperation::Add,
    };

    /// Standard non-premultiplied alpha blending.
    pub const ALPHA_BLEND: Self = Self {
        blend_enabled: true,
        color_write_mask: ColorWriteMask::ALL,
        source_color_factor: BlendFactor::SrcAlpha,
        destination_color_factor: BlendFactor::OneMinusSrcAlpha,
        color_function: BlendOperation::Add,
        source_alpha_factor: BlendFactor::SrcAlpha,
        destination_alpha_factor: BlendFactor::OneMinusSrcAlpha,
        alpha_function: BlendOperation::Add,
    };

    /// Additive blending.
    pub const ADDITIVE: Self = Self {
        blend_enabled: true,
        color_write_mask: ColorWriteMask::ALL,
        source_color_factor: BlendFactor::SrcAlpha,
        destination_color_factor: BlendFactor::One,
        color_function: BlendOperation::Add,
        source_alpha_factor: BlendFactor::SrcAlpha,
        destination_alpha_factor: BlendFactor::One,
        alpha_function: BlendOperation::Add,
    };
}

impl Default for BlendAttachmentDescription {
    fn default() -> Self {
        Self::OVERRIDE
    }
}

/// Blend state of a graphics pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct BlendStateDescription {
    /// Constant blend color used by [`BlendFactor::BlendFactor`].
    pub blend_factor: RgbaFloat,
    /// One entry per color attachment.
    pub attachments: Vec<BlendAttachmentDescription>,
    /// Alpha-to-coverage.
    pub alpha_to_coverage_enabled: bool,
}

impl BlendStateDescription {
    /// One overriding attachment.
    pub fn single_override() -> Self {
        Self {
            attachments: vec![BlendAttachmentDescription::OVERRIDE],
            ..Default::default()
        }
    }

    /// One alpha-blended attachment.
    pub fn single_alpha_blend() -> Self {
        Self {
            attachments: vec![BlendAttachmentDescription::ALPHA_BLEND],
            ..Default::default()
        }
    }
}

// ============================================================================
// Depth / stencil state
// ============================================================================

/// Stencil operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StencilOperation {
    /// Keep the current value.
    #[default]
    Keep,
    /// Set to zero.
    Zero,
    /// Replace with the reference value.
    Replace,
    /// Increment and clamp.
    IncrementAndClamp,
    /// Decrement and clamp.
    DecrementAndClamp,
    /// Bitwise invert.
    Invert,
    /// Increment and wrap.
    IncrementAndWrap,
    /// Decrement and wrap.
    DecrementAndWrap,
}

/// Stencil behavior for one face.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct StencilBehavior {
    /// Operation when the stencil test fails.
    pub fail: StencilOperation,
    /// Operation when both tests pass.
    pub pass: StencilOperation,
    /// Operation when the depth test fails.
    pub depth_fail: StencilOperation,
    /// Stencil comparison.
    pub comparison: CompareFunction,
}

/// Depth/stencil state of a graphics pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DepthStencilStateDescription {
    /// Depth test enable.
    pub depth_test_enabled: bool,
    /// Depth write enable.
    pub depth_write_enabled: bool,
    /// Depth comparison.
    pub depth_comparison: CompareFunction,
    /// Stencil test enable.
    pub stencil_test_enabled: bool,
    /// Front-face stencil.
    pub stencil_front: StencilBehavior,
    /// Back-face stencil.
    pub stencil_back: StencilBehavior,
    /// Stencil read mask.
    pub stencil_read_mask: u8,
    /// Stencil write mask.
    pub stencil_write_mask: u8,
    /// Stencil reference value. Applied at bind time, not part of the native object.
    pub stencil_reference: u32,
}

impl DepthStencilStateDescription {
    /// Depth test and write with `LessEqual`.
    pub const DEPTH_ONLY_LESS_EQUAL: Self = Self {
        depth_test_enabled: true,
        depth_write_enabled: true,
        depth_comparison: CompareFunction::LessEqual,
        stencil_test_enabled: false,
        stencil_front: StencilBehavior {
            fail: StencilOperation::Keep,
            pass: StencilOperation::Keep,
            depth_fail: StencilOperation::Keep,
            comparison: CompareFunction::Always,
        },
        stencil_back: StencilBehavior {
            fail: StencilOperation::Keep,
            pass: StencilOperation::Keep,
            depth_fail: StencilOperation::Keep,
            comparison: CompareFunction::Always,
        },
        stencil_read_mask: 0xFF,
        stencil_write_mask: 0xFF,
        stencil_reference: 0,
    };

    /// Depth testing and writing disabled.
    pub const DISABLED: Self = Self {
        depth_test_enabled: false,
        depth_write_enabled: false,
        depth_comparison: CompareFunction::Always,
        ..Self::DEPTH_ONLY_LESS_EQUAL
    };
}

impl Default for DepthStencilStateDescription {
    fn default() -> Self {
        Self::DEPTH_ONLY_LESS_EQUAL
    }
}

// ============================================================================
// Rasterizer state
// ============================================================================

/// Face culling mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FaceCullMode {
    /// Cull back faces.
    #[default]
    Back,
    /// Cull front faces.
    Front,
    /// No culling.
    None,
}

/// Polygon fill mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PolygonFillMode {
    /// Filled triangles.
    #[default]
    Solid,
    /// Triangle edges only.
    Wireframe,
}

/// Winding of front faces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FrontFace {
    /// Clockwise triangles face front.
    #[default]
    Clockwise,
    /// Counter-clockwise triangles face front.
    CounterClockwise,
}

/// Rasterizer state of a graphics pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RasterizerStateDescription {
    /// Face culling.
    pub cull_mode: FaceCullMode,
    /// Fill mode.
    pub fill_mode: PolygonFillMode,
    /// Front face winding.
    pub front_face: FrontFace,
    /// Clip against the depth range.
    pub depth_clip_enabled: bool,
    /// Scissor testing.
    pub scissor_test_enabled: bool,
    /// Constant depth bias.
    pub depth_bias: i32,
}

impl RasterizerStateDescription {
    /// Back-face culling, solid fill, clockwise front faces.
    pub const DEFAULT: Self = Self {
        cull_mode: FaceCullMode::Back,
        fill_mode: PolygonFillMode::Solid,
        front_face: FrontFace::Clockwise,
        depth_clip_enabled: true,
        scissor_test_enabled: false,
        depth_bias: 0,
    };

    /// No culling, solid fill.
    pub const CULL_NONE: Self = Self {
        cull_mode: FaceCullMode::None,
        ..Self::DEFAULT
    };
}

impl Default for RasterizerStateDescription {
    fn default() -> Self {
        Self::DEFAULT
    }
}

// ============================================================================
// Vertex input
// ============================================================================

/// Primitive topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PrimitiveTopology {
    /// Triangle list.
    #[default]
    TriangleList,
    /// Triangle strip.
    TriangleStrip,
    /// Line list.
    LineList,
    /// Line strip.
    LineStrip,
    /// Point list.
    PointList,
}

/// Format of one vertex element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexElementFormat {
    /// One f32.
    Float1,
    /// Two f32.
    Float2,
    /// Three f32.
    Float3,
    /// Four f32.
    Float4,
    /// Two u8, normalized.
    Byte2Norm,
    /// Four u8, normalized.
    Byte4Norm,
    /// Four u8.
    Byte4,
    /// Two i16, normalized.
    Short2Norm,
    /// Four i16, normalized.
    Short4Norm,
    /// Two f16.
    Half2,
    /// Four f16.
    Half4,
    /// One u32.
    UInt1,
    /// Two u32.
    UInt2,
    /// Four u32.
    UInt4,
    /// One i32.
    Int1,
    /// Four i32.
    Int4,
}

impl VertexElementFormat {
    /// Size of the element in bytes.
    pub fn size(self) -> u32 {
        match self {
            Self::Byte2Norm => 2,
            Self::Float1
            | Self::Byte4Norm
            | Self::Byte4
            | Self::Short2Norm
            | Self::Half2
            | Self::UInt1
            | Self::Int1 => 4,
            Self::Float2 | Self::Short4Norm | Self::Half4 | Self::UInt2 => 8,
            Self::Float3 => 12,
            Self::Float4 | Self::UInt4 | Self::Int4 => 16,
        }
    }
}

/// One element of a vertex layout.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VertexElementDescription {
    /// Semantic name matched against the vertex shader signature.
    pub name: String,
    /// Element format.
    pub format: VertexElementFormat,
    /// Explicit byte offset; `None` packs after the previous element.
    pub offset: Option<u32>,
}

impl VertexElementDescription {
    /// Create an element packed after its predecessor.
    pub fn new(name: impl Into<String>, format: VertexElementFormat) -> Self {
        Self {
            name: name.into(),
            format,
            offset: None,
        }
    }
}

/// Layout of one vertex buffer binding.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VertexLayoutDescription {
    /// Byte stride between vertices.
    pub stride: u32,
    /// Elements in this buffer.
    pub elements: Vec<VertexElementDescription>,
    /// 0 for per-vertex data, N to advance once every N instances.
    pub instance_step_rate: u32,
}

impl VertexLayoutDescription {
    /// Create a per-vertex layout whose stride is the packed element size.
    pub fn new(elements: Vec<VertexElementDescription>) -> Self {
        let stride = elements.iter().map(|e| e.format.size()).sum();
        Self {
            stride,
            elements,
            instance_step_rate: 0,
        }
    }

    /// Step once every `rate` instances.
    pub fn with_instance_step_rate(mut self, rate: u32) -> Self {
        self.instance_step_rate = rate;
        self
    }
}

// ============================================================================
// Shaders
// ============================================================================

/// Descriptor for a shader module.
///
/// Bytecode is opaque: it is compiled elsewhere for the active backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShaderDescriptor {
    /// Debug label.
    pub label: Option<String>,
    /// Stage; exactly one bit.
    pub stage: ShaderStages,
    /// Compiled bytecode.
    pub bytecode: Vec<u8>,
    /// Entry point name.
    pub entry_point: String,
}

impl ShaderDescriptor {
    /// Create a shader descriptor with a `main` entry point.
    pub fn new(stage: ShaderStages, bytecode: impl Into<Vec<u8>>) -> Self {
        Self {
            label: None,
            stage,
            bytecode: bytecode.into(),
            entry_point: "main".to_string(),
        }
    }

    /// Set the entry point.
    pub fn with_entry_point(mut self, entry_point: impl Into<String>) -> Self {
        self.entry_point = entry_point.into();
        self
    }

    /// Set the debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

// ============================================================================
// Shader set & outputs
// ============================================================================

/// Vertex layouts plus the linked shader stages of a graphics pipeline.
#[derive(Debug, Clone)]
pub struct ShaderSetDescription {
    /// One layout per vertex buffer slot.
    pub vertex_layouts: Vec<VertexLayoutDescription>,
    /// Linked shaders; at most one per stage.
    pub shaders: Vec<Arc<Shader>>,
}

impl ShaderSetDescription {
    /// Create a shader set.
    pub fn new(vertex_layouts: Vec<VertexLayoutDescription>, shaders: Vec<Arc<Shader>>) -> Self {
        Self {
            vertex_layouts,
            shaders,
        }
    }
}

/// Color attachment in an output description.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OutputAttachmentDescription {
    /// Attachment format.
    pub format: TextureFormat,
}

/// Render target signature a pipeline renders into.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct OutputDescription {
    /// Depth attachment, if any.
    pub depth_attachment: Option<OutputAttachmentDescription>,
    /// Color attachments.
    pub color_attachments: Vec<OutputAttachmentDescription>,
    /// Sample count shared by all attachments.
    pub sample_count: TextureSampleCount,
}

/// Descriptor for a graphics pipeline.
#[derive(Debug, Clone)]
pub struct GraphicsPipelineDescriptor {
    /// Debug label.
    pub label: Option<String>,
    /// Blend state.
    pub blend_state: BlendStateDescription,
    /// Depth/stencil state.
    pub depth_stencil_state: DepthStencilStateDescription,
    /// Rasterizer state.
    pub rasterizer_state: RasterizerStateDescription,
    /// Primitive topology.
    pub primitive_topology: PrimitiveTopology,
    /// Vertex layouts and shaders.
    pub shader_set: ShaderSetDescription,
    /// Resource layouts, one per set index.
    pub resource_layouts: Vec<Arc<ResourceLayout>>,
    /// Render target signature.
    pub outputs: OutputDescription,
}

impl GraphicsPipelineDescriptor {
    /// Create a descriptor with default fixed-function state.
    pub fn new(
        shader_set: ShaderSetDescription,
        resource_layouts: Vec<Arc<ResourceLayout>>,
        outputs: OutputDescription,
    ) -> Self {
        Self {
            label: None,
            blend_state: BlendStateDescription::single_override(),
            depth_stencil_state: DepthStencilStateDescription::default(),
            rasterizer_state: RasterizerStateDescription::default(),
            primitive_topology: PrimitiveTopology::TriangleList,
            shader_set,
            resource_layouts,
            outputs,
        }
    }

    /// Set the blend state.
    pub fn with_blend_state(mut self, blend_state: BlendStateDescription) -> Self {
        self.blend_state = blend_state;
        self
    }

    /// Set the depth/stencil state.
    pub fn with_depth_stencil_state(mut self, state: DepthStencilStateDescription) -> Self {
        self.depth_stencil_state = state;
        self
    }

    /// Set the rasterizer state.
    pub fn with_rasterizer_state(mut self, state: RasterizerStateDescription) -> Self {
        self.rasterizer_state = state;
        self
    }

    /// Set the primitive topology.
    pub fn with_topology(mut self, topology: PrimitiveTopology) -> Self {
        self.primitive_topology = topology;
        self
    }

    /// Set the debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// Descriptor for a compute pipeline.
#[derive(Debug, Clone)]
pub struct ComputePipelineDescriptor {
    /// Debug label.
    pub label: Option<String>,
    /// Compute shader.
    pub compute_shader: Arc<Shader>,
    /// Resource layouts, one per set index.
    pub resource_layouts: Vec<Arc<ResourceLayout>>,
    /// Thread group size declared by the shader.
    pub thread_group_size: [u32; 3],
}

impl ComputePipelineDescriptor {
    /// Create a compute pipeline descriptor.
    pub fn new(compute_shader: Arc<Shader>, resource_layouts: Vec<Arc<ResourceLayout>>) -> Self {
        Self {
            label: None,
            compute_shader,
            resource_layouts,
            thread_group_size: [1, 1, 1],
        }
    }

    /// Set the thread group size.
    pub fn with_thread_group_size(mut self, x: u32, y: u32, z: u32) -> Self {
        self.thread_group_size = [x, y, z];
        self
    }

    /// Set the debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertex_layout_stride() {
        let layout = VertexLayoutDescription::new(vec![
            VertexElementDescription::new("Position", VertexElementFormat::Float3),
            VertexElementDescription::new("Color", VertexElementFormat::Byte4Norm),
        ]);
        assert_eq!(layout.stride, 16);
    }
}
