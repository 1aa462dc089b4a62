//! Common types and descriptors for graphics resources.
//!
//! This module contains format enums, usage flags, and descriptor structs
//! used throughout the hardware abstraction layer. Descriptors are plain
//! values: they are copied into the resources created from them.

mod buffer;
mod common;
mod framebuffer;
mod layout;
mod pipeline;
mod sampler;
mod swapchain;
mod texture;

pub use buffer::{
    BufferDescriptor, BufferUsage, DispatchIndirectArgs, DrawIndexedIndirectArgs,
    DrawIndirectArgs, IndexFormat,
};
pub use common::{Extent3d, Origin3d, RgbaFloat, ScissorRect, Viewport};
pub use framebuffer::{
    ColorAttachmentOps, DepthStencilOps, FramebufferAttachmentDescription, FramebufferDescriptor,
    LoadAction, RenderPassDescriptor,
};
pub use layout::{
    BindableResource, BufferRange, ResourceKind, ResourceLayoutDescription,
    ResourceLayoutElementDescription, ResourceLayoutElementOptions, ResourceSetDescriptor,
    ShaderStages, SlotClass,
};
pub use pipeline::{
    BlendAttachmentDescription, BlendFactor, BlendOperation, BlendStateDescription,
    ColorWriteMask, ComputePipelineDescriptor, DepthStencilStateDescription, FaceCullMode,
    FrontFace, GraphicsPipelineDescriptor, OutputAttachmentDescription, OutputDescription,
    PolygonFillMode, PrimitiveTopology, RasterizerStateDescription, ShaderDescriptor,
    ShaderSetDescription, StencilBehavior, StencilOperation, VertexElementDescription,
    VertexElementFormat, VertexLayoutDescription,
};
pub use sampler::{AddressMode, CompareFunction, FilterMode, SamplerBorderColor, SamplerDescriptor};
pub use swapchain::{SwapchainDescriptor, SwapchainSource, WindowHandles};
pub use texture::{
    TextureDescriptor, TextureFormat, TextureLocation, TextureSampleCount, TextureType,
    TextureUsage, TextureViewDescriptor,
};
