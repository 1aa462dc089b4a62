//! Native command vocabulary.
//!
//! A [`CommandList`](crate::CommandList) records these while it validates and
//! tracks state; a backend replays them in order.

use crate::types::{
    Extent3d, IndexFormat, Origin3d, PrimitiveTopology, RgbaFloat, ScissorRect, ShaderStages,
    Viewport,
};

use super::{
    NativeBlendState, NativeBuffer, NativeDepthStencilState, NativeInputLayout,
    NativeRasterizerState, NativeSampler, NativeShader, NativeTexture, NativeView,
};

/// One vertex buffer binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexBufferBinding {
    /// Buffer.
    pub buffer: NativeBuffer,
    /// Stride from the pipeline's vertex layout.
    pub stride: u32,
    /// Byte offset.
    pub offset: u64,
}

/// A command in a recorded native list.
#[derive(Debug, Clone, PartialEq)]
pub enum NativeCommand {
    // Fixed-function state
    /// Bind a blend state.
    SetBlendState {
        /// State object.
        state: NativeBlendState,
        /// Constant blend factor.
        blend_factor: RgbaFloat,
    },
    /// Bind a depth/stencil state.
    SetDepthStencilState {
        /// State object.
        state: NativeDepthStencilState,
        /// Stencil reference.
        stencil_reference: u32,
    },
    /// Bind a rasterizer state.
    SetRasterizerState(NativeRasterizerState),
    /// Bind an input layout.
    SetInputLayout(Option<NativeInputLayout>),
    /// Set the primitive topology.
    SetPrimitiveTopology(PrimitiveTopology),
    /// Bind or clear the shader of one stage.
    SetShader {
        /// Stage.
        stage: ShaderStages,
        /// Shader; `None` disables the stage.
        shader: Option<NativeShader>,
    },

    // Input assembly
    /// Bind a contiguous run of vertex buffers.
    SetVertexBuffers {
        /// First slot.
        first_slot: u32,
        /// Bindings from `first_slot` on.
        bindings: Vec<VertexBufferBinding>,
    },
    /// Bind the index buffer.
    SetIndexBuffer {
        /// Buffer.
        buffer: NativeBuffer,
        /// Index format.
        format: IndexFormat,
        /// Byte offset.
        offset: u64,
    },

    // Resource slots
    /// Bind or unbind a uniform buffer range.
    SetUniformBuffer {
        /// Stage.
        stage: ShaderStages,
        /// Slot.
        slot: u32,
        /// Buffer; `None` unbinds.
        buffer: Option<NativeBuffer>,
        /// Byte offset.
        offset: u64,
        /// Byte size.
        size: u64,
    },
    /// Bind or unbind a read view.
    SetReadView {
        /// Stage.
        stage: ShaderStages,
        /// Slot.
        slot: u32,
        /// View; `None` unbinds.
        view: Option<NativeView>,
    },
    /// Bind or unbind a read-write view.
    SetReadWriteView {
        /// Stage.
        stage: ShaderStages,
        /// Slot.
        slot: u32,
        /// View; `None` unbinds.
        view: Option<NativeView>,
    },
    /// Bind a sampler.
    SetSampler {
        /// Stage.
        stage: ShaderStages,
        /// Slot.
        slot: u32,
        /// Sampler.
        sampler: NativeSampler,
    },

    // Output merger
    /// Bind render targets.
    SetRenderTargets {
        /// Color views.
        colors: Vec<NativeView>,
        /// Depth view.
        depth: Option<NativeView>,
    },
    /// Set viewports, one per color attachment.
    SetViewports(Vec<Viewport>),
    /// Set scissor rectangles, one per color attachment.
    SetScissorRects(Vec<ScissorRect>),
    /// Clear a render target view.
    ClearRenderTarget {
        /// View.
        view: NativeView,
        /// Color.
        color: RgbaFloat,
    },
    /// Clear a depth/stencil view.
    ClearDepthStencil {
        /// View.
        view: NativeView,
        /// Depth.
        depth: f32,
        /// Stencil.
        stencil: u8,
    },
    /// Mark a view's contents undefined.
    DiscardView(NativeView),

    // Work
    /// Non-indexed draw.
    Draw {
        /// Vertex count.
        vertex_count: u32,
        /// Instance count.
        instance_count: u32,
        /// First vertex.
        first_vertex: u32,
        /// First instance.
        first_instance: u32,
    },
    /// Indexed draw.
    DrawIndexed {
        /// Index count.
        index_count: u32,
        /// Instance count.
        instance_count: u32,
        /// First index.
        first_index: u32,
        /// Added to each index.
        base_vertex: i32,
        /// First instance.
        first_instance: u32,
    },
    /// Draws with arguments read from a buffer.
    DrawIndirect {
        /// Argument buffer.
        buffer: NativeBuffer,
        /// Byte offset.
        offset: u64,
        /// Draw count.
        draw_count: u32,
        /// Bytes between argument structs.
        stride: u32,
    },
    /// Indexed draws with arguments read from a buffer.
    DrawIndexedIndirect {
        /// Argument buffer.
        buffer: NativeBuffer,
        /// Byte offset.
        offset: u64,
        /// Draw count.
        draw_count: u32,
        /// Bytes between argument structs.
        stride: u32,
    },
    /// Compute dispatch.
    Dispatch {
        /// Groups in X.
        x: u32,
        /// Groups in Y.
        y: u32,
        /// Groups in Z.
        z: u32,
    },
    /// Compute dispatch with arguments read from a buffer.
    DispatchIndirect {
        /// Argument buffer.
        buffer: NativeBuffer,
        /// Byte offset.
        offset: u64,
    },

    // Transfers
    /// Device-side update of a buffer region.
    UpdateBuffer {
        /// Destination.
        buffer: NativeBuffer,
        /// Byte offset.
        offset: u64,
        /// Bytes written.
        data: Vec<u8>,
    },
    /// Map with discard, write from the start, unmap.
    WriteDiscard {
        /// Destination.
        buffer: NativeBuffer,
        /// Bytes written.
        data: Vec<u8>,
    },
    /// Buffer-to-buffer copy.
    CopyBufferRegion {
        /// Source.
        source: NativeBuffer,
        /// Source offset.
        source_offset: u64,
        /// Destination.
        destination: NativeBuffer,
        /// Destination offset.
        destination_offset: u64,
        /// Byte count.
        size: u64,
    },
    /// Device-side update of a texture region.
    UpdateTexture {
        /// Destination.
        texture: NativeTexture,
        /// Destination subresource.
        subresource: u32,
        /// Region origin.
        origin: Origin3d,
        /// Region extent.
        extent: Extent3d,
        /// Source bytes.
        data: Vec<u8>,
        /// Source bytes between rows.
        row_pitch: u32,
        /// Source bytes between depth slices.
        depth_pitch: u32,
    },
    /// Texture-to-texture region copy.
    CopyTextureRegion {
        /// Source.
        source: NativeTexture,
        /// Source subresource.
        source_subresource: u32,
        /// Source origin.
        source_origin: Origin3d,
        /// Destination.
        destination: NativeTexture,
        /// Destination subresource.
        destination_subresource: u32,
        /// Destination origin.
        destination_origin: Origin3d,
        /// Region extent.
        extent: Extent3d,
    },
    /// Generate the mip chain below a view's base level.
    GenerateMips(NativeView),
    /// Resolve a multisampled subresource.
    ResolveSubresource {
        /// Multisampled source.
        source: NativeTexture,
        /// Source subresource.
        source_subresource: u32,
        /// Single-sampled destination.
        destination: NativeTexture,
        /// Destination subresource.
        destination_subresource: u32,
    },

    // Debug annotations
    /// Open a debug group.
    BeginEvent(String),
    /// Close the innermost debug group.
    EndEvent,
    /// Insert a debug marker.
    SetMarker(String),
}

impl NativeCommand {
    /// Returns true for draw calls of any kind.
    pub fn is_draw(&self) -> bool {
        matches!(
            self,
            Self::Draw { .. }
                | Self::DrawIndexed { .. }
                | Self::DrawIndirect { .. }
                | Self::DrawIndexedIndirect { .. }
        )
    }

    /// Returns true for compute dispatches.
    pub fn is_dispatch(&self) -> bool {
        matches!(self, Self::Dispatch { .. } | Self::DispatchIndirect { .. })
    }
}
