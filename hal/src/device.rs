//! Graphics device.
//!
//! The [`GraphicsDevice`] creates every GPU resource, owns the pipeline-state
//! cache and the staging pool, and is the single execution timeline that
//! recorded command lists are submitted to. It is created by
//! [`GraphicsInstance::create_device`](crate::GraphicsInstance::create_device).

use std::collections::HashMap;
use std::sync::atomic::AtomicU64;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::{Mutex, MutexGuard};

use crate::backend::{GpuBackend, MapMode, NativeCommand, NativeMapping, NativeResource};
use crate::cache::{CacheStats, PipelineStateCache};
use crate::command_list::CommandList;
use crate::error::{GraphicsError, GraphicsResult};
use crate::format::{self, PixelFormatProperties};
use crate::resources::{
    Buffer, ComputePipelineState, DeviceResource, Framebuffer, GraphicsPipelineState, Pipeline,
    PipelineKind, ResourceCore, ResourceId, ResourceLayout, ResourceSet, Sampler, Shader, Texture,
    TextureView,
};
use crate::swapchain::Swapchain;
use crate::sync::{Fence, FenceNotifier};
use crate::types::{
    BufferDescriptor, BufferUsage, ComputePipelineDescriptor, Extent3d, FramebufferDescriptor,
    GraphicsPipelineDescriptor, ResourceLayoutDescription, ResourceSetDescriptor,
    ResourceKind, SamplerDescriptor, ShaderDescriptor, ShaderStages, SwapchainDescriptor, TextureDescriptor,
    TextureFormat, TextureLocation, TextureSampleCount, TextureType, TextureUsage,
    TextureViewDescriptor,
};
use crate::upload::{self, StagingBuffer, StagingPool, TextureUploadPath, UploadPath};

/// Optional capabilities of a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct GraphicsDeviceFeatures {
    /// Compute pipelines and dispatches.
    pub compute_shader: bool,
    /// Geometry shader stage.
    pub geometry_shader: bool,
    /// Tessellation control and evaluation stages.
    pub tessellation_shaders: bool,
    /// Viewport and scissor indices above 0.
    pub multiple_viewports: bool,
    /// Indirect draws.
    pub draw_indirect: bool,
    /// Non-zero base vertex in indexed draws.
    pub draw_base_vertex: bool,
    /// Non-zero first instance in draws.
    pub draw_base_instance: bool,
    /// Structured buffer bindings.
    pub structured_buffers: bool,
    /// Anisotropic sampler filtering.
    pub sampler_anisotropy: bool,
    /// Different blend state per color attachment.
    pub independent_blend: bool,
    /// Native resource creation may run concurrently with recording.
    pub concurrent_resource_creation: bool,
}

impl GraphicsDeviceFeatures {
    /// Every feature enabled.
    pub fn all() -> Self {
        Self {
            compute_shader: true,
            geometry_shader: true,
            tessellation_shaders: true,
            multiple_viewports: true,
            draw_indirect: true,
            draw_base_vertex: true,
            draw_base_instance: true,
            structured_buffers: true,
            sampler_anisotropy: true,
            independent_blend: true,
            concurrent_resource_creation: true,
        }
    }

    /// Returns true if every stage in `stages` is supported.
    pub fn supports_stages(&self, stages: ShaderStages) -> bool {
        (!stages.contains(ShaderStages::COMPUTE) || self.compute_shader)
            && (!stages.contains(ShaderStages::GEOMETRY) || self.geometry_shader)
            && (!stages.intersects(
                ShaderStages::TESSELLATION_CONTROL | ShaderStages::TESSELLATION_EVALUATION,
            ) || self.tessellation_shaders)
    }
}

/// Options for creating a device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphicsDeviceOptions {
    /// Validate use of disposed resources. Always on in debug builds.
    pub debug: bool,
    /// Depth format for swapchains created without one.
    pub swapchain_depth_format: Option<TextureFormat>,
    /// Default vertical sync for new swapchains.
    pub sync_to_vertical_blank: bool,
    /// Idle staging buffers the pool retains.
    pub staging_pool_limit: usize,
}

impl Default for GraphicsDeviceOptions {
    fn default() -> Self {
        Self {
            debug: false,
            swapchain_depth_format: None,
            sync_to_vertical_blank: true,
            staging_pool_limit: 16,
        }
    }
}

impl GraphicsDeviceOptions {
    /// Create default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable debug validation.
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Set the default swapchain depth format.
    pub fn with_swapchain_depth_format(mut self, format: TextureFormat) -> Self {
        self.swapchain_depth_format = Some(format);
        self
    }

    /// Set the default vertical sync.
    pub fn with_sync_to_vertical_blank(mut self, sync: bool) -> Self {
        self.sync_to_vertical_blank = sync;
        self
    }

    /// Set how many idle staging buffers are retained.
    pub fn with_staging_pool_limit(mut self, limit: usize) -> Self {
        self.staging_pool_limit = limit;
        self
    }
}

// ============================================================================
// Mapping
// ============================================================================

/// CPU-visible memory of a mapped buffer or texture subresource.
///
/// Valid until the matching unmap call. Rows of a texture subresource are
/// `row_pitch` bytes apart and slices `depth_pitch` bytes apart.
#[derive(Debug, Clone, Copy)]
pub struct MappedResource {
    resource: ResourceId,
    subresource: u32,
    mode: MapMode,
    data: *mut u8,
    size: u64,
    row_pitch: u32,
    depth_pitch: u32,
}

impl MappedResource {
    fn new(resource: ResourceId, subresource: u32, mode: MapMode, mapping: NativeMapping) -> Self {
        Self {
            resource,
            subresource,
            mode,
            data: mapping.data,
            size: mapping.size,
            row_pitch: mapping.row_pitch,
            depth_pitch: mapping.depth_pitch,
        }
    }

    /// The mapped resource.
    pub fn resource(&self) -> ResourceId {
        self.resource
    }

    /// The mapped subresource; 0 for buffers.
    pub fn subresource(&self) -> u32 {
        self.subresource
    }

    /// Access mode of the mapping.
    pub fn mode(&self) -> MapMode {
        self.mode
    }

    /// Start of the mapped memory.
    pub fn data(&self) -> *mut u8 {
        self.data
    }

    /// Mapped size in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Bytes between rows.
    pub fn row_pitch(&self) -> u32 {
        self.row_pitch
    }

    /// Bytes between depth slices.
    pub fn depth_pitch(&self) -> u32 {
        self.depth_pitch
    }

    /// The mapped memory as bytes.
    ///
    /// # Safety
    ///
    /// The resource must still be mapped and no mutable slice of the same
    /// mapping may be alive.
    pub unsafe fn as_slice(&self) -> &[u8] {
        // SAFETY: the caller keeps the mapping alive; `size` is the mapped length.
        unsafe { std::slice::from_raw_parts(self.data, self.size as usize) }
    }

    /// The mapped memory as mutable bytes.
    ///
    /// # Safety
    ///
    /// The resource must still be mapped with a write mode and no other slice
    /// of the same mapping may be alive.
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn as_mut_slice(&self) -> &mut [u8] {
        // SAFETY: the caller keeps the mapping alive and unaliased.
        unsafe { std::slice::from_raw_parts_mut(self.data, self.size as usize) }
    }
}

// SAFETY: `data` points into backend memory that stays valid while the
// device's mapping entry for the subresource has a nonzero count. Map and
// unmap update that count under the device's mapping lock, and the accessors
// that dereference `data` are `unsafe` and require the mapping to be alive.
unsafe impl Send for MappedResource {}
unsafe impl Sync for MappedResource {}

#[derive(Debug)]
struct MappingEntry {
    mapped: MappedResource,
    native: NativeResource,
    count: u32,
}

// ============================================================================
// GraphicsDevice
// ============================================================================

/// A graphics device for creating GPU resources and executing command lists.
///
/// # Thread Safety
///
/// `GraphicsDevice` is `Send + Sync` and can be shared across threads.
/// Command lists record independently; submission, immediate uploads and
/// mapping are serialized on the device's execution timeline.
///
/// # Example
///
/// ```ignore
/// let instance = GraphicsInstance::new(InstanceParameters::default())?;
/// let device = instance.create_device(GraphicsDeviceOptions::default())?;
///
/// let buffer = device.create_buffer(&BufferDescriptor::new(1024, BufferUsage::VERTEX))?;
/// device.update_buffer(&buffer, 0, &vertex_bytes)?;
/// ```
pub struct GraphicsDevice {
    name: String,
    backend: Arc<dyn GpuBackend>,
    features: GraphicsDeviceFeatures,
    options: GraphicsDeviceOptions,
    validate: bool,
    self_ref: Weak<GraphicsDevice>,
    ids: Arc<AtomicU64>,
    context: Mutex<()>,
    pipeline_cache: PipelineStateCache,
    staging: Mutex<StagingPool>,
    mappings: Mutex<HashMap<(ResourceId, u32), MappingEntry>>,
    fences: Arc<FenceNotifier>,
    // Weak references for accounting and dispose
    resources: Mutex<Vec<Weak<dyn DeviceResource>>>,
    main_swapchain: Mutex<Option<Arc<Swapchain>>>,
    disposed: std::sync::atomic::AtomicBool,
}

impl GraphicsDevice {
    /// Create a new device (called by GraphicsInstance).
    pub(crate) fn new(
        name: String,
        backend: Arc<dyn GpuBackend>,
        options: GraphicsDeviceOptions,
    ) -> Arc<Self> {
        let features = backend.features();
        let validate = options.debug || cfg!(debug_assertions);
        Arc::new_cyclic(|self_ref| Self {
            name,
            features,
            validate,
            self_ref: self_ref.clone(),
            ids: Arc::new(AtomicU64::new(1)),
            context: Mutex::new(()),
            pipeline_cache: PipelineStateCache::new(),
            staging: Mutex::new(StagingPool::new(options.staging_pool_limit)),
            mappings: Mutex::new(HashMap::new()),
            fences: Arc::new(FenceNotifier::default()),
            resources: Mutex::new(Vec::new()),
            main_swapchain: Mutex::new(None),
            disposed: std::sync::atomic::AtomicBool::new(false),
            backend,
            options,
        })
    }

    /// Get the device name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name of the active backend.
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// The native backend, for backend-specific inspection.
    pub fn backend(&self) -> &Arc<dyn GpuBackend> {
        &self.backend
    }

    /// Optional capabilities of the device.
    pub fn features(&self) -> GraphicsDeviceFeatures {
        self.features
    }

    /// Options the device was created with.
    pub fn options(&self) -> &GraphicsDeviceOptions {
        &self.options
    }

    /// Returns true if use of disposed resources is validated.
    pub fn validation_enabled(&self) -> bool {
        self.validate
    }

    /// Hit/miss and entry statistics of the pipeline-state cache.
    pub fn pipeline_cache_stats(&self) -> CacheStats {
        self.pipeline_cache.stats()
    }

    /// Staging buffers owned by the pool, idle or checked out.
    pub fn staging_buffer_count(&self) -> usize {
        self.staging.lock().len()
    }

    /// Resources created by this device that are neither dropped nor disposed.
    pub fn live_resource_count(&self) -> usize {
        let mut resources = self.resources.lock();
        resources.retain(|r| r.strong_count() > 0);
        resources
            .iter()
            .filter_map(Weak::upgrade)
            .filter(|r| !r.is_disposed())
            .count()
    }

    fn core(&self) -> GraphicsResult<ResourceCore> {
        self.check_alive()?;
        Ok(ResourceCore::new(
            Arc::clone(&self.ids),
            self.self_ref.clone(),
            Arc::clone(&self.backend),
            self.validate,
        ))
    }

    fn check_alive(&self) -> GraphicsResult<()> {
        if self.is_disposed() {
            return Err(GraphicsError::Disposed(format!("graphics device '{}'", self.name)));
        }
        Ok(())
    }

    fn track<T: DeviceResource + 'static>(&self, resource: T) -> Arc<T> {
        let resource = Arc::new(resource);
        let weak: Weak<dyn DeviceResource> = Arc::downgrade(&resource) as Weak<dyn DeviceResource>;
        let mut resources = self.resources.lock();
        // Amortized pruning of dropped resources
        if resources.len() >= 64 && resources.len().is_power_of_two() {
            resources.retain(|r| r.strong_count() > 0);
        }
        resources.push(weak);
        resource
    }

    /// Serializes work on the device's execution timeline.
    pub(crate) fn lock_context(&self) -> MutexGuard<'_, ()> {
        self.context.lock()
    }

    // ------------------------------------------------------------------------
    // Resource creation
    // ------------------------------------------------------------------------

    /// Create a GPU buffer.
    ///
    /// # Errors
    ///
    /// Returns `InvalidParameter` for a malformed descriptor (zero size,
    /// staging combined with other usages, dynamic combined with read-write
    /// or indirect, structured without a stride, uniform size not a multiple
    /// of 16), `Unsupported` for structured usage without device support.
    pub fn create_buffer(self: &Arc<Self>, descriptor: &BufferDescriptor) -> GraphicsResult<Arc<Buffer>> {
        validate_buffer(descriptor, &self.features)?;
        let core = self.core()?;
        let native = self.backend.create_buffer(descriptor)?;
        let buffer = self.track(Buffer::new(core, descriptor.clone(), native));
        log::trace!(
            "GraphicsDevice: created buffer {:?}, size={}",
            descriptor.label,
            descriptor.size
        );
        Ok(buffer)
    }

    /// Create a GPU texture.
    ///
    /// # Errors
    ///
    /// Returns `InvalidParameter` for zero dimensions or inconsistent
    /// type/mip/array/cubemap settings, `Unsupported` if the format, usage
    /// and sample count combination has no native support.
    pub fn create_texture(self: &Arc<Self>, descriptor: &TextureDescriptor) -> GraphicsResult<Arc<Texture>> {
        validate_texture(descriptor)?;
        let storage = format::texture_storage_format(descriptor);
        let properties = self
            .backend
            .format_support(storage, descriptor.texture_type, descriptor.usage)
            .ok_or_else(|| {
                GraphicsError::Unsupported(format!(
                    "{:?} {:?} with usage {:?}",
                    descriptor.format, descriptor.texture_type, descriptor.usage
                ))
            })?;
        check_texture_limits(descriptor, &properties)?;

        let core = self.core()?;
        let native = self.backend.create_texture(descriptor, storage)?;
        let texture = self.track(Texture::new(core, descriptor.clone(), native));
        log::trace!(
            "GraphicsDevice: created texture {:?}, size={}x{}x{}",
            descriptor.label,
            descriptor.size.width,
            descriptor.size.height,
            descriptor.size.depth
        );
        Ok(texture)
    }

    /// Create a view onto a mip/array range of a texture.
    ///
    /// # Errors
    ///
    /// Returns `InvalidParameter` if the range leaves the texture or the
    /// format reinterpretation changes the texel size.
    pub fn create_texture_view(
        self: &Arc<Self>,
        texture: &Arc<Texture>,
        descriptor: &TextureViewDescriptor,
    ) -> GraphicsResult<Arc<TextureView>> {
        texture.check_alive()?;
        TextureView::validate(texture, descriptor)?;
        let core = self.core()?;
        let view = self.track(TextureView::new(core, Arc::clone(texture), descriptor));
        log::trace!(
            "GraphicsDevice: created view {:?} of texture {:?}",
            descriptor.label,
            texture.label()
        );
        Ok(view)
    }

    /// Create a texture sampler.
    ///
    /// # Errors
    ///
    /// Returns `Unsupported` for anisotropic filtering without device support.
    pub fn create_sampler(self: &Arc<Self>, descriptor: &SamplerDescriptor) -> GraphicsResult<Arc<Sampler>> {
        if descriptor.is_anisotropic() && !self.features.sampler_anisotropy {
            return Err(GraphicsError::Unsupported(
                "anisotropic filtering is not supported by this device".to_string(),
            ));
        }
        let core = self.core()?;
        let native = self.backend.create_sampler(descriptor)?;
        let sampler = self.track(Sampler::new(core, descriptor.clone(), native));
        log::trace!("GraphicsDevice: created sampler {:?}", descriptor.label);
        Ok(sampler)
    }

    /// Create a shader from compiled bytecode.
    ///
    /// # Errors
    ///
    /// Returns `InvalidParameter` unless exactly one stage is set,
    /// `Unsupported` for a stage the device lacks.
    pub fn create_shader(self: &Arc<Self>, descriptor: &ShaderDescriptor) -> GraphicsResult<Arc<Shader>> {
        if descriptor.stage.bits().count_ones() != 1 {
            return Err(GraphicsError::InvalidParameter(format!(
                "shader must have exactly one stage, got {:?}",
                descriptor.stage
            )));
        }
        if !self.features.supports_stages(descriptor.stage) {
            return Err(GraphicsError::Unsupported(format!(
                "{:?} shaders are not supported by this device",
                descriptor.stage
            )));
        }
        let core = self.core()?;
        let native = self.backend.create_shader(descriptor.stage, &descriptor.bytecode)?;
        let shader = self.track(Shader::new(core, descriptor.clone(), native));
        log::trace!(
            "GraphicsDevice: created {:?} shader {:?}",
            descriptor.stage,
            descriptor.label
        );
        Ok(shader)
    }

    /// Compile a resource layout into its slot table.
    ///
    /// # Errors
    ///
    /// Returns `InvalidParameter` for an element without stages or with
    /// duplicate names, `Unsupported` for structured elements without
    /// device support.
    pub fn create_resource_layout(
        self: &Arc<Self>,
        description: &ResourceLayoutDescription,
    ) -> GraphicsResult<Arc<ResourceLayout>> {
        for (index, element) in description.elements.iter().enumerate() {
            if element.stages.is_empty() && !element.is_unused() {
                return Err(GraphicsError::InvalidParameter(format!(
                    "layout element {index} ('{}') has no shader stages",
                    element.name
                )));
            }
            if description.elements[..index]
                .iter()
                .any(|other| other.name == element.name)
            {
                return Err(GraphicsError::InvalidParameter(format!(
                    "duplicate layout element name '{}'",
                    element.name
                )));
            }
            let structured = matches!(
                element.kind,
                ResourceKind::StructuredBufferReadOnly | ResourceKind::StructuredBufferReadWrite
            );
            if structured && !self.features.structured_buffers {
                return Err(GraphicsError::Unsupported(
                    "structured buffers are not supported by this device".to_string(),
                ));
            }
        }
        let core = self.core()?;
        let layout = self.track(ResourceLayout::new(core, description.clone()));
        log::trace!(
            "GraphicsDevice: created resource layout {:?} with {} elements",
            description.label,
            description.elements.len()
        );
        Ok(layout)
    }

    /// Create a resource set.
    ///
    /// # Errors
    ///
    /// Returns `Usage` if a resource does not match its layout element.
    pub fn create_resource_set(
        self: &Arc<Self>,
        descriptor: &ResourceSetDescriptor,
    ) -> GraphicsResult<Arc<ResourceSet>> {
        descriptor.layout.check_alive()?;
        ResourceSet::validate(&descriptor.layout, &descriptor.resources)?;
        let core = self.core()?;
        let set = self.track(ResourceSet::new(
            core,
            descriptor.label.clone(),
            Arc::clone(&descriptor.layout),
            descriptor.resources.clone(),
        ));
        log::trace!("GraphicsDevice: created resource set {:?}", descriptor.label);
        Ok(set)
    }

    /// Create a framebuffer.
    ///
    /// # Errors
    ///
    /// Returns `Usage` if attachments differ in size or sample count or lack
    /// the attachment usage.
    pub fn create_framebuffer(
        self: &Arc<Self>,
        descriptor: &FramebufferDescriptor,
    ) -> GraphicsResult<Arc<Framebuffer>> {
        let core = self.core()?;
        let framebuffer = self.track(Framebuffer::create(core, descriptor, None)?);
        log::trace!(
            "GraphicsDevice: created framebuffer {:?}, {}x{}",
            descriptor.label,
            framebuffer.width(),
            framebuffer.height()
        );
        Ok(framebuffer)
    }

    /// Create a graphics pipeline.
    ///
    /// Fixed-function state objects come from the device's pipeline-state
    /// cache, so pipelines differing only in other state share them.
    ///
    /// # Errors
    ///
    /// Returns `InvalidParameter` for a shader set without a vertex shader,
    /// with duplicate stages or a compute shader, or blend attachments not
    /// matching the outputs.
    pub fn create_graphics_pipeline(
        self: &Arc<Self>,
        descriptor: &GraphicsPipelineDescriptor,
    ) -> GraphicsResult<Arc<Pipeline>> {
        let shaders = &descriptor.shader_set.shaders;
        let mut stages = ShaderStages::empty();
        let mut native_shaders = Vec::with_capacity(shaders.len());
        for shader in shaders {
            if shader.stage() == ShaderStages::COMPUTE || stages.contains(shader.stage()) {
                return Err(GraphicsError::InvalidParameter(format!(
                    "invalid or duplicate {:?} shader in a graphics pipeline",
                    shader.stage()
                )));
            }
            stages |= shader.stage();
            native_shaders.push((shader.stage(), shader.native()?));
        }
        let vertex_shader = shaders
            .iter()
            .find(|shader| shader.stage() == ShaderStages::VERTEX)
            .ok_or_else(|| {
                GraphicsError::InvalidParameter("graphics pipeline needs a vertex shader".to_string())
            })?;

        let blend_attachments = descriptor.blend_state.attachments.len();
        let color_outputs = descriptor.outputs.color_attachments.len();
        if blend_attachments != color_outputs && !(blend_attachments == 1 && color_outputs == 0) {
            return Err(GraphicsError::InvalidParameter(format!(
                "blend state has {blend_attachments} attachments, outputs have {color_outputs}"
            )));
        }
        if blend_attachments > 1
            && !self.features.independent_blend
            && descriptor
                .blend_state
                .attachments
                .windows(2)
                .any(|pair| pair[0] != pair[1])
        {
            return Err(GraphicsError::Unsupported(
                "independent blend state per attachment is not supported by this device"
                    .to_string(),
            ));
        }
        for layout in &descriptor.resource_layouts {
            layout.check_alive()?;
        }

        let vertex_layouts = &descriptor.shader_set.vertex_layouts;
        let objects = self.pipeline_cache.get_or_create(
            self.backend.as_ref(),
            &descriptor.blend_state,
            &descriptor.depth_stencil_state,
            &descriptor.rasterizer_state,
            descriptor.outputs.sample_count.is_multisampled(),
            vertex_layouts,
            vertex_shader.bytecode(),
        )?;

        let state = GraphicsPipelineState {
            blend_state: objects.blend,
            blend_factor: descriptor.blend_state.blend_factor,
            depth_stencil_state: objects.depth_stencil,
            stencil_reference: descriptor.depth_stencil_state.stencil_reference,
            rasterizer_state: objects.rasterizer,
            input_layout: objects.input_layout,
            topology: descriptor.primitive_topology,
            vertex_strides: vertex_layouts.iter().map(|layout| layout.stride).collect(),
            shaders: native_shaders,
            outputs: descriptor.outputs.clone(),
        };
        let core = self.core()?;
        let pipeline = self.track(Pipeline::new(
            core,
            descriptor.label.clone(),
            descriptor.resource_layouts.clone(),
            PipelineKind::Graphics(state),
        ));
        log::trace!(
            "GraphicsDevice: created graphics pipeline {:?} with {} resource layouts",
            descriptor.label,
            descriptor.resource_layouts.len()
        );
        Ok(pipeline)
    }

    /// Create a compute pipeline.
    ///
    /// # Errors
    ///
    /// Returns `Unsupported` without compute support, `InvalidParameter` if
    /// the shader is not a compute shader.
    pub fn create_compute_pipeline(
        self: &Arc<Self>,
        descriptor: &ComputePipelineDescriptor,
    ) -> GraphicsResult<Arc<Pipeline>> {
        if !self.features.compute_shader {
            return Err(GraphicsError::Unsupported(
                "compute shaders are not supported by this device".to_string(),
            ));
        }
        if descriptor.compute_shader.stage() != ShaderStages::COMPUTE {
            return Err(GraphicsError::InvalidParameter(format!(
                "compute pipeline given a {:?} shader",
                descriptor.compute_shader.stage()
            )));
        }
        for layout in &descriptor.resource_layouts {
            layout.check_alive()?;
        }
        let state = ComputePipelineState {
            shader: descriptor.compute_shader.native()?,
            thread_group_size: descriptor.thread_group_size,
        };
        let core = self.core()?;
        let pipeline = self.track(Pipeline::new(
            core,
            descriptor.label.clone(),
            descriptor.resource_layouts.clone(),
            PipelineKind::Compute(state),
        ));
        log::trace!("GraphicsDevice: created compute pipeline {:?}", descriptor.label);
        Ok(pipeline)
    }

    /// Create a swapchain and its framebuffer.
    ///
    /// The device's default depth format applies when the descriptor has none,
    /// and vertical-blank sync is off if the device options turn it off.
    ///
    /// # Errors
    ///
    /// Returns `InvalidParameter` for a zero size or a non-depth depth format.
    pub fn create_swapchain(self: &Arc<Self>, descriptor: &SwapchainDescriptor) -> GraphicsResult<Arc<Swapchain>> {
        let mut descriptor = descriptor.clone();
        if descriptor.depth_format.is_none() {
            descriptor.depth_format = self.options.swapchain_depth_format;
        }
        descriptor.sync_to_vertical_blank &= self.options.sync_to_vertical_blank;
        let core = self.core()?;
        let swapchain = self.track(Swapchain::create(core, &descriptor)?);
        Ok(swapchain)
    }

    /// The swapchain created together with the device, if any.
    pub fn main_swapchain(&self) -> Option<Arc<Swapchain>> {
        self.main_swapchain.lock().clone()
    }

    pub(crate) fn set_main_swapchain(&self, swapchain: Arc<Swapchain>) {
        *self.main_swapchain.lock() = Some(swapchain);
    }

    /// Create a command list in the `Empty` state.
    pub fn create_command_list(self: &Arc<Self>) -> GraphicsResult<CommandList> {
        let core = self.core()?;
        Ok(CommandList::new(core, None, self.features))
    }

    /// Create a labeled command list.
    pub fn create_command_list_with_label(self: &Arc<Self>, label: impl Into<String>) -> GraphicsResult<CommandList> {
        let core = self.core()?;
        Ok(CommandList::new(core, Some(label.into()), self.features))
    }

    /// Create a fence, optionally already signaled.
    pub fn create_fence(&self, signaled: bool) -> Fence {
        Fence::new(signaled, Arc::clone(&self.fences))
    }

    // ------------------------------------------------------------------------
    // Capability queries
    // ------------------------------------------------------------------------

    /// Limits of a format for a texture type, usage and sample count.
    ///
    /// Returns `None` if the combination cannot be created.
    pub fn get_pixel_format_support(
        &self,
        format: TextureFormat,
        texture_type: TextureType,
        usage: TextureUsage,
        sample_count: TextureSampleCount,
    ) -> Option<PixelFormatProperties> {
        let storage = format::texture_format_to_native(
            format,
            format::needs_typeless_storage(format, usage),
        );
        self.backend
            .format_support(storage, texture_type, usage)
            .filter(|properties| properties.supports_sample_count(sample_count))
    }

    // ------------------------------------------------------------------------
    // Submission and synchronization
    // ------------------------------------------------------------------------

    /// Execute an ended command list. `ReadyToExecute -> Empty`.
    ///
    /// Staging buffers the list used return to the pool, and the fence, if
    /// any, is signaled once the commands have executed.
    ///
    /// # Errors
    ///
    /// Returns `Usage` if the list is not ready or the fence is already
    /// signaled. Native execution errors are fatal.
    pub fn submit_commands(&self, list: &mut CommandList, fence: Option<&Fence>) -> GraphicsResult<()> {
        self.check_alive()?;
        if let Some(fence) = fence {
            if fence.is_signaled() {
                return Err(GraphicsError::usage(
                    "fence is already signaled; reset it before submitting",
                ));
            }
            if !fence.shares_notifier(&self.fences) {
                return Err(GraphicsError::usage("fence belongs to another device"));
            }
        }
        let submission = list.take_submission()?;
        log::trace!(
            "GraphicsDevice: submitting {:?} with {} commands",
            list.label(),
            submission.commands.len()
        );
        let result = {
            let _context = self.lock_context();
            self.backend.execute(&submission.commands)
        };
        self.release_staging(submission.staging);
        result?;
        if let Some(fence) = fence {
            fence.signal();
        }
        Ok(())
    }

    /// Block until every submitted command has executed.
    pub fn wait_for_idle(&self) {
        drop(self.lock_context());
    }

    /// Wait for all or any of `fences`.
    ///
    /// Returns `Ok(true)` if the condition was met before the timeout.
    ///
    /// # Errors
    ///
    /// Returns `Usage` if a fence belongs to another device.
    pub fn wait_for_fences(
        &self,
        fences: &[&Fence],
        wait_all: bool,
        timeout: Option<Duration>,
    ) -> GraphicsResult<bool> {
        if let Some(foreign) = fences.iter().find(|f| !f.shares_notifier(&self.fences)) {
            return Err(GraphicsError::usage(format!(
                "fence {foreign:?} belongs to another device"
            )));
        }
        if fences.is_empty() {
            return Ok(true);
        }
        Ok(self.fences.wait_until(timeout, || {
            if wait_all {
                fences.iter().all(|f| f.is_signaled())
            } else {
                fences.iter().any(|f| f.is_signaled())
            }
        }))
    }

    /// Present the current backbuffer of a swapchain.
    pub fn swap_buffers(&self, swapchain: &Swapchain) -> GraphicsResult<()> {
        self.check_alive()?;
        let _context = self.lock_context();
        swapchain.present()
    }

    // ------------------------------------------------------------------------
    // Immediate uploads
    // ------------------------------------------------------------------------

    /// Write `data` into a buffer at `offset`, on the execution timeline.
    ///
    /// Takes the same path a command list would; see [`UploadPath`].
    pub fn update_buffer(self: &Arc<Self>, buffer: &Buffer, offset: u64, data: &[u8]) -> GraphicsResult<()> {
        self.check_alive()?;
        buffer.check_alive()?;
        let size = data.len() as u64;
        let path = upload::choose_buffer_upload(buffer.descriptor(), offset, size)?;
        log::trace!(
            "GraphicsDevice: update {size} bytes of {:?} via {path:?}",
            buffer.label()
        );
        match path {
            UploadPath::Skip => Ok(()),
            UploadPath::DirectUpdate => {
                let command = NativeCommand::UpdateBuffer {
                    buffer: buffer.native()?,
                    offset,
                    data: data.to_vec(),
                };
                let _context = self.lock_context();
                self.backend.execute(std::slice::from_ref(&command))
            }
            UploadPath::MapDiscard => {
                let command = NativeCommand::WriteDiscard {
                    buffer: buffer.native()?,
                    data: data.to_vec(),
                };
                let _context = self.lock_context();
                self.backend.execute(std::slice::from_ref(&command))
            }
            UploadPath::StagingCopy => {
                let staging = self.acquire_staging(size)?;
                let result = self
                    .write_buffer_now(staging.buffer(), 0, data)
                    .and_then(|()| {
                        let command = NativeCommand::CopyBufferRegion {
                            source: staging.buffer().native()?,
                            source_offset: 0,
                            destination: buffer.native()?,
                            destination_offset: offset,
                            size,
                        };
                        let _context = self.lock_context();
                        self.backend.execute(std::slice::from_ref(&command))
                    });
                self.release_staging(vec![staging]);
                result
            }
        }
    }

    /// Typed variant of [`update_buffer`](Self::update_buffer).
    pub fn update_buffer_typed<T: bytemuck::Pod>(
        self: &Arc<Self>,
        buffer: &Buffer,
        offset: u64,
        data: &[T],
    ) -> GraphicsResult<()> {
        self.update_buffer(buffer, offset, bytemuck::cast_slice(data))
    }

    /// Write a region of one texture subresource, on the execution timeline.
    ///
    /// Staging textures are mapped and the rows repacked into the mapped
    /// pitch; other textures take a direct region update carrying
    /// `row_pitch` and `depth_pitch`.
    pub fn update_texture(
        &self,
        texture: &Texture,
        location: TextureLocation,
        extent: Extent3d,
        data: &[u8],
        row_pitch: u32,
        depth_pitch: u32,
    ) -> GraphicsResult<()> {
        self.check_alive()?;
        texture.check_alive()?;
        let subresource = upload::texture_region(texture, location, extent)?;
        let block_size = texture.format().block_size();
        let row_bytes = extent.width * block_size;
        upload::check_source_layout(data.len(), row_bytes, row_pitch, depth_pitch, extent)?;
        let native = texture.native()?;

        match upload::choose_texture_upload(texture.descriptor()) {
            TextureUploadPath::Map => {
                let resource = NativeResource::Texture(native);
                let mapping = self.map(texture.id(), resource, subresource, MapMode::Write)?;
                // SAFETY: the subresource stays mapped for writing until the
                // unmap below.
                let destination = unsafe { mapping.as_mut_slice() };
                let origin = location.origin;
                let start = u64::from(origin.z) * u64::from(mapping.depth_pitch())
                    + u64::from(origin.y) * u64::from(mapping.row_pitch())
                    + u64::from(origin.x * block_size);
                let result = match destination.get_mut(start as usize..) {
                    Some(destination) => upload::repack_rows(
                        data,
                        row_pitch,
                        depth_pitch,
                        destination,
                        mapping.row_pitch(),
                        mapping.depth_pitch(),
                        row_bytes,
                        extent,
                    ),
                    None => Err(GraphicsError::usage("texture region exceeds the mapped subresource")),
                };
                self.unmap(texture.id(), subresource)?;
                result
            }
            TextureUploadPath::DirectUpdate => {
                let command = NativeCommand::UpdateTexture {
                    texture: native,
                    subresource,
                    origin: location.origin,
                    extent,
                    data: data.to_vec(),
                    row_pitch,
                    depth_pitch,
                };
                let _context = self.lock_context();
                self.backend.execute(std::slice::from_ref(&command))
            }
        }
    }

    /// Check out a staging buffer of at least `size` bytes.
    pub(crate) fn acquire_staging(self: &Arc<Self>, size: u64) -> GraphicsResult<StagingBuffer> {
        self.staging.lock().acquire(size, |size| {
            self.create_buffer(
                &BufferDescriptor::new(size, BufferUsage::STAGING).with_label("staging"),
            )
        })
    }

    /// Return staging buffers to the pool.
    pub(crate) fn release_staging(&self, buffers: Vec<StagingBuffer>) {
        if buffers.is_empty() {
            return;
        }
        let mut pool = self.staging.lock();
        for buffer in buffers {
            pool.release(buffer);
        }
    }

    /// Map `buffer` for writing, copy `data` at `offset` and unmap.
    pub(crate) fn write_buffer_now(&self, buffer: &Buffer, offset: u64, data: &[u8]) -> GraphicsResult<()> {
        let resource = NativeResource::Buffer(buffer.native()?);
        let _context = self.lock_context();
        let mapping = self.backend.map(resource, 0, MapMode::Write)?;
        let end = offset + data.len() as u64;
        let result = if end > mapping.size {
            Err(GraphicsError::usage(format!(
                "write of {} bytes at {offset} exceeds mapped size {}",
                data.len(),
                mapping.size
            )))
        } else {
            // SAFETY: the range was checked against the mapped size, and the
            // mapping is exclusive while the context lock is held.
            unsafe {
                std::ptr::copy_nonoverlapping(
                    data.as_ptr(),
                    mapping.data.add(offset as usize),
                    data.len(),
                );
            }
            Ok(())
        };
        self.backend.unmap(resource, 0);
        result
    }

    // ------------------------------------------------------------------------
    // Mapping
    // ------------------------------------------------------------------------

    /// Map a buffer for CPU access.
    ///
    /// Reads need a staging buffer; writes a staging or dynamic buffer.
    /// Mapping an already mapped buffer with the same mode nests; another
    /// mode is a usage error.
    pub fn map_buffer(&self, buffer: &Buffer, mode: MapMode) -> GraphicsResult<MappedResource> {
        let usage = buffer.usage();
        let allowed = match mode {
            MapMode::Read | MapMode::ReadWrite => usage.contains(BufferUsage::STAGING),
            MapMode::Write => usage.intersects(BufferUsage::STAGING | BufferUsage::DYNAMIC),
        };
        if !allowed {
            return Err(GraphicsError::usage(format!(
                "buffer {:?} with usage {usage:?} cannot be mapped for {mode:?}",
                buffer.label()
            )));
        }
        let native = NativeResource::Buffer(buffer.native()?);
        self.map(buffer.id(), native, 0, mode)
    }

    /// Unmap a buffer mapped with [`map_buffer`](Self::map_buffer).
    pub fn unmap_buffer(&self, buffer: &Buffer) -> GraphicsResult<()> {
        self.unmap(buffer.id(), 0)
    }

    /// Map one subresource of a staging texture.
    pub fn map_texture(&self, texture: &Texture, subresource: u32, mode: MapMode) -> GraphicsResult<MappedResource> {
        if !texture.usage().contains(TextureUsage::STAGING) {
            return Err(GraphicsError::usage(format!(
                "texture {:?} is not a staging texture and cannot be mapped",
                texture.label()
            )));
        }
        if subresource >= texture.descriptor().subresource_count() {
            return Err(GraphicsError::usage(format!(
                "subresource {subresource} is outside texture {:?}",
                texture.label()
            )));
        }
        let native = NativeResource::Texture(texture.native()?);
        self.map(texture.id(), native, subresource, mode)
    }

    /// Unmap a texture subresource mapped with [`map_texture`](Self::map_texture).
    pub fn unmap_texture(&self, texture: &Texture, subresource: u32) -> GraphicsResult<()> {
        self.unmap(texture.id(), subresource)
    }

    /// Copy the contents of a staging buffer.
    pub fn read_buffer(&self, buffer: &Buffer) -> GraphicsResult<Vec<u8>> {
        let mapped = self.map_buffer(buffer, MapMode::Read)?;
        // SAFETY: mapped for reading until the unmap below.
        let data = unsafe { mapped.as_slice() }.to_vec();
        self.unmap_buffer(buffer)?;
        Ok(data)
    }

    fn map(
        &self,
        id: ResourceId,
        native: NativeResource,
        subresource: u32,
        mode: MapMode,
    ) -> GraphicsResult<MappedResource> {
        self.check_alive()?;
        let mut mappings = self.mappings.lock();
        if let Some(entry) = mappings.get_mut(&(id, subresource)) {
            if entry.mapped.mode != mode {
                return Err(GraphicsError::usage(format!(
                    "resource {id:?}[{subresource}] is already mapped for {:?}, not {mode:?}",
                    entry.mapped.mode
                )));
            }
            entry.count += 1;
            return Ok(entry.mapped);
        }
        let mapping = {
            let _context = self.lock_context();
            self.backend.map(native, subresource, mode)?
        };
        let mapped = MappedResource::new(id, subresource, mode, mapping);
        mappings.insert(
            (id, subresource),
            MappingEntry {
                mapped,
                native,
                count: 1,
            },
        );
        Ok(mapped)
    }

    fn unmap(&self, id: ResourceId, subresource: u32) -> GraphicsResult<()> {
        let mut mappings = self.mappings.lock();
        let entry = mappings.get_mut(&(id, subresource)).ok_or_else(|| {
            GraphicsError::usage(format!("resource {id:?}[{subresource}] is not mapped"))
        })?;
        entry.count -= 1;
        if entry.count == 0 {
            let native = entry.native;
            mappings.remove(&(id, subresource));
            let _context = self.lock_context();
            self.backend.unmap(native, subresource);
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Disposal
    // ------------------------------------------------------------------------

    /// Returns true once [`dispose`](Self::dispose) has run.
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(std::sync::atomic::Ordering::Acquire)
    }

    /// Dispose every resource this device created, the staging pool and the
    /// cached pipeline state objects. Further creation fails with `Disposed`.
    pub fn dispose(&self) {
        if self.disposed.swap(true, std::sync::atomic::Ordering::AcqRel) {
            return;
        }
        self.main_swapchain.lock().take();
        let context = self.lock_context();
        self.staging.lock().dispose_all();
        let resources = std::mem::take(&mut *self.resources.lock());
        let mut disposed = 0usize;
        // Newest first, so dependents go before what they reference
        for resource in resources.iter().rev().filter_map(Weak::upgrade) {
            if !resource.is_disposed() {
                resource.dispose();
                disposed += 1;
            }
        }
        self.pipeline_cache.destroy_all(self.backend.as_ref());
        drop(context);
        self.mappings.lock().clear();
        log::info!(
            "GraphicsDevice '{}' disposed ({disposed} live resources released)",
            self.name
        );
    }
}

impl std::fmt::Debug for GraphicsDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphicsDevice")
            .field("name", &self.name)
            .field("backend", &self.backend.name())
            .field("features", &self.features)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

// Ensure GraphicsDevice is Send + Sync
static_assertions::assert_impl_all!(GraphicsDevice: Send, Sync);
static_assertions::assert_impl_all!(MappedResource: Send, Sync);

// ============================================================================
// Descriptor validation
// ============================================================================

fn validate_buffer(descriptor: &BufferDescriptor, features: &GraphicsDeviceFeatures) -> GraphicsResult<()> {
    let usage = descriptor.usage;
    if descriptor.size == 0 {
        return Err(GraphicsError::InvalidParameter(
            "buffer size cannot be zero".to_string(),
        ));
    }
    if usage.is_empty() {
        return Err(GraphicsError::InvalidParameter(
            "buffer usage cannot be empty".to_string(),
        ));
    }
    if usage.contains(BufferUsage::STAGING) && usage != BufferUsage::STAGING {
        return Err(GraphicsError::InvalidParameter(format!(
            "staging buffers cannot have other usages ({usage:?})"
        )));
    }
    if usage.contains(BufferUsage::DYNAMIC)
        && usage.intersects(BufferUsage::STRUCTURED_READ_WRITE | BufferUsage::INDIRECT)
    {
        return Err(GraphicsError::InvalidParameter(format!(
            "dynamic buffers cannot be read-write or indirect ({usage:?})"
        )));
    }
    let structured = usage.intersects(BufferUsage::STRUCTURED_READ_ONLY | BufferUsage::STRUCTURED_READ_WRITE);
    if structured {
        if !features.structured_buffers {
            return Err(GraphicsError::Unsupported(
                "structured buffers are not supported by this device".to_string(),
            ));
        }
        if descriptor.structure_byte_stride == 0 && !descriptor.raw_buffer {
            return Err(GraphicsError::InvalidParameter(
                "structured buffers need a non-zero stride unless raw".to_string(),
            ));
        }
    }
    if usage.contains(BufferUsage::UNIFORM) && descriptor.size % 16 != 0 {
        return Err(GraphicsError::InvalidParameter(format!(
            "uniform buffer size {} is not a multiple of 16",
            descriptor.size
        )));
    }
    Ok(())
}

fn validate_texture(descriptor: &TextureDescriptor) -> GraphicsResult<()> {
    let size = descriptor.size;
    if size.width == 0 || size.height == 0 || size.depth == 0 {
        return Err(GraphicsError::InvalidParameter(
            "texture dimensions cannot be zero".to_string(),
        ));
    }
    if descriptor.mip_level_count == 0 || descriptor.array_layers == 0 {
        return Err(GraphicsError::InvalidParameter(
            "texture needs at least one mip level and array layer".to_string(),
        ));
    }
    let largest = size.width.max(size.height).max(size.depth);
    let full_chain = u32::BITS - largest.leading_zeros();
    if descriptor.mip_level_count > full_chain {
        return Err(GraphicsError::InvalidParameter(format!(
            "{} mip levels exceed the full chain of {full_chain} for {largest} texels",
            descriptor.mip_level_count
        )));
    }
    match descriptor.texture_type {
        TextureType::Texture1D if size.height != 1 || size.depth != 1 => {
            return Err(GraphicsError::InvalidParameter(
                "1D textures must have height and depth 1".to_string(),
            ));
        }
        TextureType::Texture2D if size.depth != 1 => {
            return Err(GraphicsError::InvalidParameter(
                "2D textures must have depth 1; use array layers".to_string(),
            ));
        }
        TextureType::Texture3D if descriptor.array_layers != 1 => {
            return Err(GraphicsError::InvalidParameter(
                "3D textures cannot have array layers".to_string(),
            ));
        }
        _ => {}
    }
    if descriptor.usage.contains(TextureUsage::CUBEMAP)
        && (descriptor.texture_type != TextureType::Texture2D || size.width != size.height)
    {
        return Err(GraphicsError::InvalidParameter(
            "cubemaps must be square 2D textures".to_string(),
        ));
    }
    if descriptor.sample_count.is_multisampled() {
        if descriptor.texture_type != TextureType::Texture2D || descriptor.mip_level_count != 1 {
            return Err(GraphicsError::InvalidParameter(
                "multisampled textures must be 2D with one mip level".to_string(),
            ));
        }
        if descriptor
            .usage
            .intersects(TextureUsage::STAGING | TextureUsage::GENERATE_MIPMAPS)
        {
            return Err(GraphicsError::InvalidParameter(
                "multisampled textures cannot be staging or generate mipmaps".to_string(),
            ));
        }
    }
    if descriptor.usage.contains(TextureUsage::DEPTH_STENCIL) && !descriptor.format.is_depth_stencil() {
        return Err(GraphicsError::InvalidParameter(format!(
            "{:?} cannot be a depth/stencil attachment",
            descriptor.format
        )));
    }
    if descriptor.usage.contains(TextureUsage::GENERATE_MIPMAPS)
        && !descriptor.usage.contains(TextureUsage::RENDER_TARGET)
    {
        return Err(GraphicsError::InvalidParameter(
            "GENERATE_MIPMAPS requires RENDER_TARGET usage".to_string(),
        ));
    }
    Ok(())
}

fn check_texture_limits(descriptor: &TextureDescriptor, properties: &PixelFormatProperties) -> GraphicsResult<()> {
    let size = descriptor.size;
    if size.width > properties.max_width
        || size.height > properties.max_height
        || size.depth > properties.max_depth
        || descriptor.effective_array_layers() > properties.max_array_layers
        || descriptor.mip_level_count > properties.max_mip_levels
    {
        return Err(GraphicsError::Unsupported(format!(
            "texture {:?} ({size:?}, {} mips, {} layers) exceeds format limits",
            descriptor.label, descriptor.mip_level_count, descriptor.array_layers
        )));
    }
    if !properties.supports_sample_count(descriptor.sample_count) {
        return Err(GraphicsError::Unsupported(format!(
            "{:?} does not support {:?}",
            descriptor.format, descriptor.sample_count
        )));
    }
    Ok(())
}

/// A device on the dummy backend with debug validation on.
#[cfg(test)]
pub(crate) fn test_device() -> Arc<GraphicsDevice> {
    let backend = crate::backend::create_backend(crate::backend::BackendType::Dummy)
        .expect("dummy backend");
    GraphicsDevice::new(
        "test".to_string(),
        backend,
        GraphicsDeviceOptions::default().with_debug(true),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SwapchainSource;

    #[test]
    fn test_buffer_validation() {
        let device = test_device();
        let invalid = [
            BufferDescriptor::new(0, BufferUsage::VERTEX),
            BufferDescriptor::new(64, BufferUsage::STAGING | BufferUsage::VERTEX),
            BufferDescriptor::new(64, BufferUsage::DYNAMIC | BufferUsage::INDIRECT),
            BufferDescriptor::new(64, BufferUsage::STRUCTURED_READ_ONLY),
            BufferDescriptor::new(20, BufferUsage::UNIFORM),
        ];
        for descriptor in &invalid {
            assert!(
                matches!(device.create_buffer(descriptor), Err(GraphicsError::InvalidParameter(_))),
                "{descriptor:?} should be rejected"
            );
        }
        assert!(device
            .create_buffer(&BufferDescriptor::new(64, BufferUsage::STRUCTURED_READ_ONLY).with_raw_buffer(true))
            .is_ok());
    }

    #[test]
    fn test_texture_validation() {
        let device = test_device();
        let cube = TextureDescriptor::new_2d(16, 8, TextureFormat::Rgba8Unorm, TextureUsage::SAMPLED | TextureUsage::CUBEMAP)
            .with_array_layers(1);
        assert!(matches!(device.create_texture(&cube), Err(GraphicsError::InvalidParameter(_))));

        let too_many_mips =
            TextureDescriptor::new_2d(4, 4, TextureFormat::Rgba8Unorm, TextureUsage::SAMPLED).with_mip_levels(4);
        assert!(matches!(
            device.create_texture(&too_many_mips),
            Err(GraphicsError::InvalidParameter(_))
        ));

        let storage_depth = TextureDescriptor::new_2d(
            4,
            4,
            TextureFormat::Depth32Float,
            TextureUsage::DEPTH_STENCIL | TextureUsage::STORAGE,
        );
        assert!(matches!(
            device.create_texture(&storage_depth),
            Err(GraphicsError::Unsupported(_))
        ));
    }

    #[test]
    fn test_pixel_format_support_query() {
        let device = test_device();
        assert!(device
            .get_pixel_format_support(
                TextureFormat::Rgba8Unorm,
                TextureType::Texture2D,
                TextureUsage::RENDER_TARGET,
                TextureSampleCount::Count4,
            )
            .is_some());
        assert!(device
            .get_pixel_format_support(
                TextureFormat::Rgba8Unorm,
                TextureType::Texture3D,
                TextureUsage::SAMPLED,
                TextureSampleCount::Count4,
            )
            .is_none());
    }

    #[test]
    fn test_map_nesting_and_mode_conflict() {
        let device = test_device();
        let staging = device
            .create_buffer(&BufferDescriptor::new(64, BufferUsage::STAGING))
            .unwrap();
        let vertex = device
            .create_buffer(&BufferDescriptor::new(64, BufferUsage::VERTEX))
            .unwrap();

        let first = device.map_buffer(&staging, MapMode::Write).unwrap();
        let second = device.map_buffer(&staging, MapMode::Write).unwrap();
        assert_eq!(first.data(), second.data());
        assert!(matches!(
            device.map_buffer(&staging, MapMode::Read),
            Err(GraphicsError::Usage(_))
        ));
        device.unmap_buffer(&staging).unwrap();
        device.unmap_buffer(&staging).unwrap();
        assert!(device.unmap_buffer(&staging).is_err());

        assert!(matches!(
            device.map_buffer(&vertex, MapMode::Write),
            Err(GraphicsError::Usage(_))
        ));
    }

    #[test]
    fn test_fence_signaled_on_submit() {
        let device = test_device();
        let fence = device.create_fence(false);
        let mut list = device.create_command_list().unwrap();
        list.begin().unwrap();
        list.insert_debug_marker("frame").unwrap();
        list.end().unwrap();
        device.submit_commands(&mut list, Some(&fence)).unwrap();
        assert!(fence.is_signaled());
        assert!(device
            .wait_for_fences(&[&fence], true, Some(Duration::ZERO))
            .unwrap());

        list.begin().unwrap();
        list.insert_debug_marker("frame").unwrap();
        list.end().unwrap();
        assert!(matches!(
            device.submit_commands(&mut list, Some(&fence)),
            Err(GraphicsError::Usage(_))
        ));
    }

    #[test]
    fn test_wait_for_any_fence() {
        let device = test_device();
        let a = device.create_fence(false);
        let b = device.create_fence(true);
        assert!(device.wait_for_fences(&[&a, &b], false, Some(Duration::ZERO)).unwrap());
        assert!(!device.wait_for_fences(&[&a, &b], true, Some(Duration::from_millis(5))).unwrap());
    }

    #[test]
    fn test_dispose_releases_everything() {
        let device = test_device();
        let buffer = device
            .create_buffer(&BufferDescriptor::new(64, BufferUsage::VERTEX))
            .unwrap();
        let swapchain = device
            .create_swapchain(&SwapchainDescriptor::new(SwapchainSource::Headless, 32, 32))
            .unwrap();
        assert!(device.live_resource_count() >= 2);

        device.dispose();
        assert!(buffer.is_disposed());
        assert!(swapchain.is_disposed());
        assert_eq!(device.live_resource_count(), 0);
        assert!(matches!(
            device.create_buffer(&BufferDescriptor::new(64, BufferUsage::VERTEX)),
            Err(GraphicsError::Disposed(_))
        ));
    }
}
