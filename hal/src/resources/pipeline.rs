//! Graphics and compute pipelines.
//!
//! A pipeline owns none of its fixed-function native objects: blend,
//! depth/stencil, rasterizer and input layout objects come from the device's
//! [`PipelineStateCache`](crate::cache::PipelineStateCache) and live as long
//! as the device.

use std::sync::Arc;

use super::{slot_bases, DeviceResource, ResourceCore, ResourceId, ResourceLayout, SlotCounts};
use crate::backend::{
    NativeBlendState, NativeDepthStencilState, NativeInputLayout, NativeRasterizerState,
    NativeShader,
};
use crate::error::GraphicsResult;
use crate::types::{OutputDescription, PrimitiveTopology, RgbaFloat, ShaderStages};

/// Resolved native state of a graphics pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphicsPipelineState {
    /// Blend state object.
    pub blend_state: NativeBlendState,
    /// Constant blend factor applied with the blend state.
    pub blend_factor: RgbaFloat,
    /// Depth/stencil state object.
    pub depth_stencil_state: NativeDepthStencilState,
    /// Stencil reference applied with the depth/stencil state.
    pub stencil_reference: u32,
    /// Rasterizer state object.
    pub rasterizer_state: NativeRasterizerState,
    /// Input layout; `None` when the pipeline takes no vertex buffers.
    pub input_layout: Option<NativeInputLayout>,
    /// Primitive topology.
    pub topology: PrimitiveTopology,
    /// Stride of each vertex buffer slot the pipeline reads.
    pub vertex_strides: Vec<u32>,
    /// Shader per stage, in pipeline order.
    pub shaders: Vec<(ShaderStages, NativeShader)>,
    /// Render target signature.
    pub outputs: OutputDescription,
}

/// Resolved native state of a compute pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComputePipelineState {
    /// Compute shader.
    pub shader: NativeShader,
    /// Thread group size declared by the shader.
    pub thread_group_size: [u32; 3],
}

/// Graphics or compute.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineKind {
    /// A graphics pipeline.
    Graphics(GraphicsPipelineState),
    /// A compute pipeline.
    Compute(ComputePipelineState),
}

/// A graphics or compute pipeline.
pub struct Pipeline {
    core: ResourceCore,
    label: Option<String>,
    resource_layouts: Vec<Arc<ResourceLayout>>,
    slot_bases: Vec<SlotCounts>,
    kind: PipelineKind,
}

impl Pipeline {
    pub(crate) fn new(
        core: ResourceCore,
        label: Option<String>,
        resource_layouts: Vec<Arc<ResourceLayout>>,
        kind: PipelineKind,
    ) -> Self {
        let slot_bases = slot_bases(&resource_layouts);
        Self {
            core,
            label,
            resource_layouts,
            slot_bases,
            kind,
        }
    }

    /// Device-unique id.
    pub fn id(&self) -> ResourceId {
        self.core.id()
    }

    /// Get the pipeline label, if set.
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Resource layouts, one per set index.
    pub fn resource_layouts(&self) -> &[Arc<ResourceLayout>] {
        &self.resource_layouts
    }

    /// Slot base of each set index.
    pub fn slot_bases(&self) -> &[SlotCounts] {
        &self.slot_bases
    }

    /// Graphics or compute state.
    pub fn kind(&self) -> &PipelineKind {
        &self.kind
    }

    /// Returns true for compute pipelines.
    pub fn is_compute(&self) -> bool {
        matches!(self.kind, PipelineKind::Compute(_))
    }

    /// Graphics state, if this is a graphics pipeline.
    pub fn graphics_state(&self) -> Option<&GraphicsPipelineState> {
        match &self.kind {
            PipelineKind::Graphics(state) => Some(state),
            PipelineKind::Compute(_) => None,
        }
    }

    /// Compute state, if this is a compute pipeline.
    pub fn compute_state(&self) -> Option<&ComputePipelineState> {
        match &self.kind {
            PipelineKind::Compute(state) => Some(state),
            PipelineKind::Graphics(_) => None,
        }
    }

    /// Returns true once [`dispose`](Self::dispose) has run.
    pub fn is_disposed(&self) -> bool {
        self.core.is_disposed()
    }

    /// Mark the pipeline disposed. Cached state objects stay with the device.
    pub fn dispose(&self) {
        self.core.mark_disposed();
    }

    pub(crate) fn check_alive(&self) -> GraphicsResult<()> {
        self.core.check("pipeline", self.label())
    }
}

impl DeviceResource for Pipeline {
    fn dispose(&self) {
        Pipeline::dispose(self);
    }

    fn is_disposed(&self) -> bool {
        Pipeline::is_disposed(self)
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("id", &self.id())
            .field("compute", &self.is_compute())
            .field("layouts", &self.resource_layouts.len())
            .field("label", &self.label)
            .finish()
    }
}

static_assertions::assert_impl_all!(Pipeline: Send, Sync);
