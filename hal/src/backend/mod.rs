//! GPU backend abstraction layer.
//!
//! This module provides the trait-based boundary between the hardware
//! abstraction layer and a native graphics API.
//!
//! # Available Backends
//!
//! - `dummy` (default): host-memory emulation of the native model, used for
//!   testing and development without GPU hardware
//!
//! # Architecture
//!
//! The native model is a flat per-kind slot space: uniform buffer slots, read
//! view slots, read-write view slots and sampler slots, per shader stage. Each
//! backend implements the [`GpuBackend`] trait, which provides:
//! - Native object creation (buffers, textures, views, samplers, shaders,
//!   fixed-function state objects, swapchains)
//! - Replay of recorded [`NativeCommand`] lists
//! - Mapping of CPU-visible resources
//!
//! Native objects are referred to by opaque handles. The backend owns the
//! objects; the layer above decides when to destroy them.

mod command;
pub mod dummy;

use std::sync::Arc;

pub use command::{NativeCommand, VertexBufferBinding};

use crate::device::GraphicsDeviceFeatures;
use crate::error::GraphicsResult;
use crate::format::{NativeFormat, PixelFormatProperties};
use crate::types::{
    BlendStateDescription, BufferDescriptor, DepthStencilStateDescription,
    RasterizerStateDescription, SamplerDescriptor, ShaderStages, SwapchainDescriptor,
    TextureDescriptor, TextureType, TextureUsage, VertexLayoutDescription,
};

macro_rules! native_handle {
    ($($(#[$meta:meta])* $name:ident;)*) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
            pub struct $name(pub u64);
        )*
    };
}

native_handle! {
    /// Handle to a native buffer.
    NativeBuffer;
    /// Handle to a native texture.
    NativeTexture;
    /// Handle to a native view (read, read-write, render target or depth).
    NativeView;
    /// Handle to a native sampler.
    NativeSampler;
    /// Handle to a native shader.
    NativeShader;
    /// Handle to a native blend state object.
    NativeBlendState;
    /// Handle to a native depth/stencil state object.
    NativeDepthStencilState;
    /// Handle to a native rasterizer state object.
    NativeRasterizerState;
    /// Handle to a native input layout object.
    NativeInputLayout;
    /// Handle to a native swapchain.
    NativeSwapchain;
}

/// Any native object, for destruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NativeObject {
    /// A buffer.
    Buffer(NativeBuffer),
    /// A texture.
    Texture(NativeTexture),
    /// A view.
    View(NativeView),
    /// A sampler.
    Sampler(NativeSampler),
    /// A shader.
    Shader(NativeShader),
    /// A blend state.
    BlendState(NativeBlendState),
    /// A depth/stencil state.
    DepthStencilState(NativeDepthStencilState),
    /// A rasterizer state.
    RasterizerState(NativeRasterizerState),
    /// An input layout.
    InputLayout(NativeInputLayout),
    /// A swapchain.
    Swapchain(NativeSwapchain),
}

/// A mappable native resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NativeResource {
    /// A buffer.
    Buffer(NativeBuffer),
    /// A texture.
    Texture(NativeTexture),
}

/// Description of a native view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NativeViewDescriptor {
    /// Read view onto a buffer range.
    BufferRead {
        /// Viewed buffer.
        buffer: NativeBuffer,
        /// Byte offset.
        offset: u64,
        /// Byte size.
        size: u64,
        /// Element stride; 0 for raw views.
        stride: u32,
    },
    /// Read-write view onto a buffer range.
    BufferReadWrite {
        /// Viewed buffer.
        buffer: NativeBuffer,
        /// Byte offset.
        offset: u64,
        /// Byte size.
        size: u64,
        /// Element stride; 0 for raw views.
        stride: u32,
    },
    /// Read view onto a texture sub-range.
    TextureRead {
        /// Viewed texture.
        texture: NativeTexture,
        /// View format.
        format: NativeFormat,
        /// First mip level.
        base_mip_level: u32,
        /// Mip level count.
        mip_levels: u32,
        /// First array layer.
        base_array_layer: u32,
        /// Array layer count.
        array_layers: u32,
    },
    /// Read-write view onto one mip of a texture.
    TextureReadWrite {
        /// Viewed texture.
        texture: NativeTexture,
        /// View format.
        format: NativeFormat,
        /// Mip level.
        mip_level: u32,
        /// First array layer.
        base_array_layer: u32,
        /// Array layer count.
        array_layers: u32,
    },
    /// Color attachment view.
    RenderTarget {
        /// Target texture.
        texture: NativeTexture,
        /// View format.
        format: NativeFormat,
        /// Mip level.
        mip_level: u32,
        /// Array layer.
        array_layer: u32,
    },
    /// Depth/stencil attachment view.
    DepthStencil {
        /// Target texture.
        texture: NativeTexture,
        /// View format.
        format: NativeFormat,
        /// Mip level.
        mip_level: u32,
        /// Array layer.
        array_layer: u32,
    },
}

/// Access mode of a mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MapMode {
    /// CPU reads.
    Read,
    /// CPU writes.
    Write,
    /// CPU reads and writes.
    ReadWrite,
}

/// CPU-visible memory returned by [`GpuBackend::map`].
#[derive(Debug, Clone, Copy)]
pub struct NativeMapping {
    /// Start of the mapped subresource.
    pub data: *mut u8,
    /// Mapped size in bytes.
    pub size: u64,
    /// Bytes between rows.
    pub row_pitch: u32,
    /// Bytes between depth slices.
    pub depth_pitch: u32,
}

/// GPU backend trait for abstracting different native APIs.
pub trait GpuBackend: Send + Sync + 'static {
    /// Get the backend name.
    fn name(&self) -> &'static str;

    /// Downcast hook for backend-specific inspection.
    fn as_any(&self) -> &dyn std::any::Any;

    /// Optional capabilities of the backend.
    fn features(&self) -> GraphicsDeviceFeatures;

    /// Limits of a format for a texture type and usage, `None` if unsupported.
    fn format_support(
        &self,
        format: NativeFormat,
        texture_type: TextureType,
        usage: TextureUsage,
    ) -> Option<PixelFormatProperties>;

    /// Create a buffer.
    fn create_buffer(&self, descriptor: &BufferDescriptor) -> GraphicsResult<NativeBuffer>;

    /// Create a texture stored in `format`.
    fn create_texture(
        &self,
        descriptor: &TextureDescriptor,
        format: NativeFormat,
    ) -> GraphicsResult<NativeTexture>;

    /// Create a view.
    fn create_view(&self, descriptor: &NativeViewDescriptor) -> GraphicsResult<NativeView>;

    /// Create a sampler.
    fn create_sampler(&self, descriptor: &SamplerDescriptor) -> GraphicsResult<NativeSampler>;

    /// Create a shader from compiled bytecode.
    fn create_shader(&self, stage: ShaderStages, bytecode: &[u8]) -> GraphicsResult<NativeShader>;

    /// Create a blend state object.
    fn create_blend_state(
        &self,
        descriptor: &BlendStateDescription,
    ) -> GraphicsResult<NativeBlendState>;

    /// Create a depth/stencil state object.
    fn create_depth_stencil_state(
        &self,
        descriptor: &DepthStencilStateDescription,
    ) -> GraphicsResult<NativeDepthStencilState>;

    /// Create a rasterizer state object.
    fn create_rasterizer_state(
        &self,
        descriptor: &RasterizerStateDescription,
        multisampled: bool,
    ) -> GraphicsResult<NativeRasterizerState>;

    /// Create an input layout validated against a vertex shader signature.
    fn create_input_layout(
        &self,
        layouts: &[VertexLayoutDescription],
        vertex_shader_bytecode: &[u8],
    ) -> GraphicsResult<NativeInputLayout>;

    /// Create a swapchain.
    fn create_swapchain(&self, descriptor: &SwapchainDescriptor) -> GraphicsResult<NativeSwapchain>;

    /// Current backbuffer texture of a swapchain.
    fn swapchain_backbuffer(&self, swapchain: NativeSwapchain) -> GraphicsResult<NativeTexture>;

    /// Resize swapchain buffers. Every backbuffer view must already be destroyed.
    fn resize_swapchain(
        &self,
        swapchain: NativeSwapchain,
        width: u32,
        height: u32,
    ) -> GraphicsResult<()>;

    /// Present the current backbuffer.
    fn present(&self, swapchain: NativeSwapchain, sync_interval: u32) -> GraphicsResult<()>;

    /// Destroy a native object.
    fn destroy(&self, object: NativeObject);

    /// Replay a recorded command list on the execution timeline.
    fn execute(&self, commands: &[NativeCommand]) -> GraphicsResult<()>;

    /// Map a subresource for CPU access.
    fn map(
        &self,
        resource: NativeResource,
        subresource: u32,
        mode: MapMode,
    ) -> GraphicsResult<NativeMapping>;

    /// Unmap a subresource.
    fn unmap(&self, resource: NativeResource, subresource: u32);
}

/// Available backend implementations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BackendType {
    /// Host-memory emulation.
    #[default]
    Dummy,
}

impl BackendType {
    /// Parse a backend name as used in configuration.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "dummy" => Some(Self::Dummy),
            _ => None,
        }
    }
}

/// Create a backend of the requested type.
pub fn create_backend(backend: BackendType) -> GraphicsResult<Arc<dyn GpuBackend>> {
    match backend {
        BackendType::Dummy => {
            log::info!("Using dummy backend");
            Ok(Arc::new(dummy::DummyBackend::new()))
        }
    }
}
