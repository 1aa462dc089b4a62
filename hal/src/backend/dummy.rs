//! Dummy GPU backend for testing and development.
//!
//! This backend doesn't talk to a GPU. It keeps buffer and texture contents in
//! host memory and executes transfer commands against them, so uploads,
//! copies, resolves and mappings can be observed without GPU hardware. Draws
//! and dispatches are only counted.

use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::device::GraphicsDeviceFeatures;
use crate::error::{GraphicsError, GraphicsResult};
use crate::format::{NativeFormat, PixelFormatProperties};
use crate::types::{
    BlendStateDescription, BufferDescriptor, DepthStencilStateDescription, Extent3d, Origin3d,
    RasterizerStateDescription, SamplerDescriptor, ShaderStages, SwapchainDescriptor,
    TextureDescriptor, TextureType, TextureUsage, VertexLayoutDescription,
};

use super::{
    GpuBackend, MapMode, NativeBlendState, NativeBuffer, NativeCommand, NativeDepthStencilState,
    NativeInputLayout, NativeMapping, NativeObject, NativeRasterizerState, NativeResource,
    NativeSampler, NativeShader, NativeSwapchain, NativeTexture, NativeView,
    NativeViewDescriptor,
};

/// Row pitch alignment of emulated textures, in bytes.
pub const TEXTURE_ROW_PITCH_ALIGNMENT: u32 = 256;

/// Counters describing what the dummy backend has done.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DummyStats {
    /// Buffers created.
    pub buffers_created: u64,
    /// Textures created, including backbuffers.
    pub textures_created: u64,
    /// Views created.
    pub views_created: u64,
    /// Samplers created.
    pub samplers_created: u64,
    /// Shaders created.
    pub shaders_created: u64,
    /// Blend, depth/stencil, rasterizer and input layout objects created.
    pub state_objects_created: u64,
    /// Objects destroyed.
    pub objects_destroyed: u64,
    /// Commands executed.
    pub commands_executed: u64,
    /// Command lists executed.
    pub lists_executed: u64,
    /// Draw calls executed.
    pub draws: u64,
    /// Dispatches executed.
    pub dispatches: u64,
    /// Frames presented.
    pub presents: u64,
}

#[derive(Debug, Default)]
struct Counters {
    buffers_created: AtomicU64,
    textures_created: AtomicU64,
    views_created: AtomicU64,
    samplers_created: AtomicU64,
    shaders_created: AtomicU64,
    state_objects_created: AtomicU64,
    objects_destroyed: AtomicU64,
    commands_executed: AtomicU64,
    lists_executed: AtomicU64,
    draws: AtomicU64,
    dispatches: AtomicU64,
    presents: AtomicU64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

#[derive(Debug)]
struct Subresource {
    width: u32,
    height: u32,
    depth: u32,
    row_pitch: u32,
    depth_pitch: u32,
    data: Vec<u8>,
}

#[derive(Debug)]
struct EmulatedTexture {
    block_size: u32,
    subresources: Vec<Subresource>,
}

impl EmulatedTexture {
    fn new(descriptor: &TextureDescriptor) -> Self {
        let block_size = descriptor.format.block_size();
        let layers = descriptor.effective_array_layers().max(1);
        let mut subresources = Vec::with_capacity((descriptor.mip_level_count * layers) as usize);
        for _layer in 0..layers {
            for mip in 0..descriptor.mip_level_count {
                let extent = descriptor.mip_extent(mip);
                let depth = if descriptor.texture_type == TextureType::Texture3D {
                    extent.depth
                } else {
                    1
                };
                let row_pitch = align_up(extent.width * block_size, TEXTURE_ROW_PITCH_ALIGNMENT);
                let depth_pitch = row_pitch * extent.height;
                subresources.push(Subresource {
                    width: extent.width,
                    height: extent.height,
                    depth,
                    row_pitch,
                    depth_pitch,
                    data: vec![0; (depth_pitch * depth) as usize],
                });
            }
        }
        Self {
            block_size,
            subresources,
        }
    }

    fn subresource(&self, index: u32) -> GraphicsResult<&Subresource> {
        self.subresources
            .get(index as usize)
            .ok_or_else(|| GraphicsError::Backend(format!("subresource {index} out of range")))
    }

    fn subresource_mut(&mut self, index: u32) -> GraphicsResult<&mut Subresource> {
        self.subresources
            .get_mut(index as usize)
            .ok_or_else(|| GraphicsError::Backend(format!("subresource {index} out of range")))
    }
}

impl Subresource {
    fn check_region(&self, origin: Origin3d, extent: Extent3d) -> GraphicsResult<()> {
        if origin.x + extent.width > self.width
            || origin.y + extent.height > self.height
            || origin.z + extent.depth > self.depth
        {
            return Err(GraphicsError::Backend(format!(
                "region {origin:?}+{extent:?} exceeds subresource {}x{}x{}",
                self.width, self.height, self.depth
            )));
        }
        Ok(())
    }

    fn read_region(&self, origin: Origin3d, extent: Extent3d, block_size: u32) -> Vec<u8> {
        let row_bytes = (extent.width * block_size) as usize;
        let mut out = Vec::with_capacity(row_bytes * (extent.height * extent.depth) as usize);
        for z in 0..extent.depth {
            for y in 0..extent.height {
                let start = ((origin.z + z) * self.depth_pitch
                    + (origin.y + y) * self.row_pitch
                    + origin.x * block_size) as usize;
                out.extend_from_slice(&self.data[start..start + row_bytes]);
            }
        }
        out
    }

    #[allow(clippy::too_many_arguments)]
    fn write_region(
        &mut self,
        origin: Origin3d,
        extent: Extent3d,
        block_size: u32,
        source: &[u8],
        source_row_pitch: u32,
        source_depth_pitch: u32,
    ) -> GraphicsResult<()> {
        let row_bytes = (extent.width * block_size) as usize;
        for z in 0..extent.depth {
            for y in 0..extent.height {
                let src = (u64::from(z) * u64::from(source_depth_pitch)
                    + u64::from(y) * u64::from(source_row_pitch)) as usize;
                let dst = ((origin.z + z) * self.depth_pitch
                    + (origin.y + y) * self.row_pitch
                    + origin.x * block_size) as usize;
                let row = source.get(src..src.saturating_add(row_bytes)).ok_or_else(|| {
                    GraphicsError::Backend("texture update source too small".to_string())
                })?;
                self.data[dst..dst + row_bytes].copy_from_slice(row);
            }
        }
        Ok(())
    }
}

#[derive(Debug)]
struct EmulatedSwapchain {
    descriptor: SwapchainDescriptor,
    backbuffer: u64,
}

#[derive(Debug, Default)]
struct Objects {
    buffers: HashMap<u64, Vec<u8>>,
    textures: HashMap<u64, EmulatedTexture>,
    views: HashMap<u64, NativeViewDescriptor>,
    swapchains: HashMap<u64, EmulatedSwapchain>,
    /// Samplers, shaders and state objects: nothing to emulate beyond liveness.
    opaque: HashSet<u64>,
}

impl Objects {
    fn buffer(&self, handle: NativeBuffer) -> GraphicsResult<&Vec<u8>> {
        self.buffers
            .get(&handle.0)
            .ok_or_else(|| GraphicsError::Backend(format!("unknown buffer {handle:?}")))
    }

    fn buffer_mut(&mut self, handle: NativeBuffer) -> GraphicsResult<&mut Vec<u8>> {
        self.buffers
            .get_mut(&handle.0)
            .ok_or_else(|| GraphicsError::Backend(format!("unknown buffer {handle:?}")))
    }

    fn texture(&self, handle: NativeTexture) -> GraphicsResult<&EmulatedTexture> {
        self.textures
            .get(&handle.0)
            .ok_or_else(|| GraphicsError::Backend(format!("unknown texture {handle:?}")))
    }

    fn texture_mut(&mut self, handle: NativeTexture) -> GraphicsResult<&mut EmulatedTexture> {
        self.textures
            .get_mut(&handle.0)
            .ok_or_else(|| GraphicsError::Backend(format!("unknown texture {handle:?}")))
    }

    fn write_buffer(&mut self, handle: NativeBuffer, offset: u64, data: &[u8]) -> GraphicsResult<()> {
        let buffer = self.buffer_mut(handle)?;
        let start = offset as usize;
        let end = start + data.len();
        if end > buffer.len() {
            return Err(GraphicsError::Backend(format!(
                "write of {} bytes at {offset} exceeds buffer size {}",
                data.len(),
                buffer.len()
            )));
        }
        buffer[start..end].copy_from_slice(data);
        Ok(())
    }
}

/// Dummy GPU backend.
#[derive(Debug)]
pub struct DummyBackend {
    next_handle: AtomicU64,
    objects: Mutex<Objects>,
    counters: Counters,
}

impl DummyBackend {
    /// Create a new dummy backend.
    pub fn new() -> Self {
        Self {
            next_handle: AtomicU64::new(1),
            objects: Mutex::new(Objects::default()),
            counters: Counters::default(),
        }
    }

    /// Snapshot of the backend counters.
    pub fn stats(&self) -> DummyStats {
        let c = &self.counters;
        let load = |a: &AtomicU64| a.load(Ordering::Relaxed);
        DummyStats {
            buffers_created: load(&c.buffers_created),
            textures_created: load(&c.textures_created),
            views_created: load(&c.views_created),
            samplers_created: load(&c.samplers_created),
            shaders_created: load(&c.shaders_created),
            state_objects_created: load(&c.state_objects_created),
            objects_destroyed: load(&c.objects_destroyed),
            commands_executed: load(&c.commands_executed),
            lists_executed: load(&c.lists_executed),
            draws: load(&c.draws),
            dispatches: load(&c.dispatches),
            presents: load(&c.presents),
        }
    }

    /// Number of native objects currently alive.
    pub fn live_object_count(&self) -> usize {
        let objects = self.objects.lock();
        objects.buffers.len()
            + objects.textures.len()
            + objects.views.len()
            + objects.swapchains.len()
            + objects.opaque.len()
    }

    /// Copy of a buffer's contents.
    pub fn read_buffer(&self, buffer: NativeBuffer) -> GraphicsResult<Vec<u8>> {
        self.objects.lock().buffer(buffer).cloned()
    }

    fn allocate(&self) -> u64 {
        self.next_handle.fetch_add(1, Ordering::Relaxed)
    }

    fn create_opaque(&self) -> u64 {
        let handle = self.allocate();
        self.objects.lock().opaque.insert(handle);
        handle
    }

    fn insert_texture(&self, descriptor: &TextureDescriptor) -> NativeTexture {
        let handle = self.allocate();
        self.objects
            .lock()
            .textures
            .insert(handle, EmulatedTexture::new(descriptor));
        bump(&self.counters.textures_created);
        NativeTexture(handle)
    }

    fn backbuffer_descriptor(descriptor: &SwapchainDescriptor) -> TextureDescriptor {
        TextureDescriptor::new_2d(
            descriptor.width,
            descriptor.height,
            descriptor.color_format,
            TextureUsage::RENDER_TARGET,
        )
    }

    fn execute_one(&self, objects: &mut Objects, command: &NativeCommand) -> GraphicsResult<()> {
        match command {
            NativeCommand::UpdateBuffer {
                buffer,
                offset,
                data,
            } => objects.write_buffer(*buffer, *offset, data),
            NativeCommand::WriteDiscard { buffer, data } => objects.write_buffer(*buffer, 0, data),
            NativeCommand::CopyBufferRegion {
                source,
                source_offset,
                destination,
                destination_offset,
                size,
            } => {
                let start = *source_offset as usize;
                let bytes = objects
                    .buffer(*source)?
                    .get(start..start + *size as usize)
                    .ok_or_else(|| GraphicsError::Backend("copy source out of range".to_string()))?
                    .to_vec();
                objects.write_buffer(*destination, *destination_offset, &bytes)
            }
            NativeCommand::UpdateTexture {
                texture,
                subresource,
                origin,
                extent,
                data,
                row_pitch,
                depth_pitch,
            } => {
                let texture = objects.texture_mut(*texture)?;
                let block_size = texture.block_size;
                let sub = texture.subresource_mut(*subresource)?;
                sub.check_region(*origin, *extent)?;
                sub.write_region(*origin, *extent, block_size, data, *row_pitch, *depth_pitch)
            }
            NativeCommand::CopyTextureRegion {
                source,
                source_subresource,
                source_origin,
                destination,
                destination_subresource,
                destination_origin,
                extent,
            } => {
                let src = objects.texture(*source)?;
                let block_size = src.block_size;
                let src_sub = src.subresource(*source_subresource)?;
                src_sub.check_region(*source_origin, *extent)?;
                let bytes = src_sub.read_region(*source_origin, *extent, block_size);
                let row_pitch = extent.width * block_size;
                let dst = objects
                    .texture_mut(*destination)?
                    .subresource_mut(*destination_subresource)?;
                dst.check_region(*destination_origin, *extent)?;
                dst.write_region(
                    *destination_origin,
                    *extent,
                    block_size,
                    &bytes,
                    row_pitch,
                    row_pitch * extent.height,
                )
            }
            NativeCommand::ResolveSubresource {
                source,
                source_subresource,
                destination,
                destination_subresource,
            } => {
                // Emulated multisampled textures store one sample.
                let bytes = objects
                    .texture(*source)?
                    .subresource(*source_subresource)?
                    .data
                    .clone();
                let dst = objects
                    .texture_mut(*destination)?
                    .subresource_mut(*destination_subresource)?;
                if dst.data.len() != bytes.len() {
                    return Err(GraphicsError::Backend(
                        "resolve between subresources of different size".to_string(),
                    ));
                }
                dst.data.copy_from_slice(&bytes);
                Ok(())
            }
            NativeCommand::Draw { .. }
            | NativeCommand::DrawIndexed { .. }
            | NativeCommand::DrawIndirect { .. }
            | NativeCommand::DrawIndexedIndirect { .. } => {
                bump(&self.counters.draws);
                Ok(())
            }
            NativeCommand::Dispatch { .. } | NativeCommand::DispatchIndirect { .. } => {
                bump(&self.counters.dispatches);
                Ok(())
            }
            NativeCommand::BeginEvent(name) => {
                log::trace!("DummyBackend: begin event {name}");
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

impl Default for DummyBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn align_up(value: u32, alignment: u32) -> u32 {
    value.div_ceil(alignment) * alignment
}

impl GpuBackend for DummyBackend {
    fn name(&self) -> &'static str {
        "Dummy Backend"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn features(&self) -> GraphicsDeviceFeatures {
        GraphicsDeviceFeatures::all()
    }

    fn format_support(
        &self,
        format: NativeFormat,
        texture_type: TextureType,
        usage: TextureUsage,
    ) -> Option<PixelFormatProperties> {
        if format.is_depth()
            && (texture_type == TextureType::Texture3D || usage.contains(TextureUsage::STORAGE))
        {
            return None;
        }
        if format.is_display_format() && usage.contains(TextureUsage::STORAGE) {
            return None;
        }

        let (max_width, max_height, max_depth, max_array_layers) = match texture_type {
            TextureType::Texture1D => (16384, 1, 1, 2048),
            TextureType::Texture2D => (16384, 16384, 1, 2048),
            TextureType::Texture3D => (2048, 2048, 2048, 1),
        };
        let multisample = texture_type == TextureType::Texture2D
            && !usage.intersects(TextureUsage::STAGING | TextureUsage::STORAGE);
        Some(PixelFormatProperties {
            max_width,
            max_height,
            max_depth,
            max_mip_levels: 32 - max_width.max(max_height).leading_zeros(),
            max_array_layers,
            sample_counts: if multisample { 1 | 2 | 4 | 8 } else { 1 },
        })
    }

    fn create_buffer(&self, descriptor: &BufferDescriptor) -> GraphicsResult<NativeBuffer> {
        log::trace!(
            "DummyBackend: creating buffer {:?} (size: {})",
            descriptor.label,
            descriptor.size
        );
        let handle = self.allocate();
        self.objects
            .lock()
            .buffers
            .insert(handle, vec![0; descriptor.size as usize]);
        bump(&self.counters.buffers_created);
        Ok(NativeBuffer(handle))
    }

    fn create_texture(
        &self,
        descriptor: &TextureDescriptor,
        format: NativeFormat,
    ) -> GraphicsResult<NativeTexture> {
        log::trace!(
            "DummyBackend: creating texture {:?} ({}x{}x{}, {format:?})",
            descriptor.label,
            descriptor.size.width,
            descriptor.size.height,
            descriptor.size.depth
        );
        Ok(self.insert_texture(descriptor))
    }

    fn create_view(&self, descriptor: &NativeViewDescriptor) -> GraphicsResult<NativeView> {
        let handle = self.allocate();
        self.objects.lock().views.insert(handle, *descriptor);
        bump(&self.counters.views_created);
        log::trace!("DummyBackend: creating view {handle} {descriptor:?}");
        Ok(NativeView(handle))
    }

    fn create_sampler(&self, descriptor: &SamplerDescriptor) -> GraphicsResult<NativeSampler> {
        log::trace!("DummyBackend: creating sampler {:?}", descriptor.label);
        bump(&self.counters.samplers_created);
        Ok(NativeSampler(self.create_opaque()))
    }

    fn create_shader(&self, stage: ShaderStages, bytecode: &[u8]) -> GraphicsResult<NativeShader> {
        if bytecode.is_empty() {
            return Err(GraphicsError::ResourceCreationFailed(format!(
                "empty bytecode for {stage:?} shader"
            )));
        }
        bump(&self.counters.shaders_created);
        Ok(NativeShader(self.create_opaque()))
    }

    fn create_blend_state(
        &self,
        descriptor: &BlendStateDescription,
    ) -> GraphicsResult<NativeBlendState> {
        log::trace!(
            "DummyBackend: creating blend state ({} attachments)",
            descriptor.attachments.len()
        );
        bump(&self.counters.state_objects_created);
        Ok(NativeBlendState(self.create_opaque()))
    }

    fn create_depth_stencil_state(
        &self,
        _descriptor: &DepthStencilStateDescription,
    ) -> GraphicsResult<NativeDepthStencilState> {
        bump(&self.counters.state_objects_created);
        Ok(NativeDepthStencilState(self.create_opaque()))
    }

    fn create_rasterizer_state(
        &self,
        descriptor: &RasterizerStateDescription,
        multisampled: bool,
    ) -> GraphicsResult<NativeRasterizerState> {
        log::trace!(
            "DummyBackend: creating rasterizer state {:?}/{:?}, multisampled={multisampled}",
            descriptor.cull_mode,
            descriptor.fill_mode
        );
        bump(&self.counters.state_objects_created);
        Ok(NativeRasterizerState(self.create_opaque()))
    }

    fn create_input_layout(
        &self,
        layouts: &[VertexLayoutDescription],
        vertex_shader_bytecode: &[u8],
    ) -> GraphicsResult<NativeInputLayout> {
        if vertex_shader_bytecode.is_empty() {
            return Err(GraphicsError::ResourceCreationFailed(
                "input layout needs a vertex shader signature".to_string(),
            ));
        }
        log::trace!(
            "DummyBackend: creating input layout ({} buffers)",
            layouts.len()
        );
        bump(&self.counters.state_objects_created);
        Ok(NativeInputLayout(self.create_opaque()))
    }

    fn create_swapchain(&self, descriptor: &SwapchainDescriptor) -> GraphicsResult<NativeSwapchain> {
        let backbuffer = self.insert_texture(&Self::backbuffer_descriptor(descriptor));
        let handle = self.allocate();
        self.objects.lock().swapchains.insert(
            handle,
            EmulatedSwapchain {
                descriptor: descriptor.clone(),
                backbuffer: backbuffer.0,
            },
        );
        log::trace!(
            "DummyBackend: creating swapchain {}x{}",
            descriptor.width,
            descriptor.height
        );
        Ok(NativeSwapchain(handle))
    }

    fn swapchain_backbuffer(&self, swapchain: NativeSwapchain) -> GraphicsResult<NativeTexture> {
        self.objects
            .lock()
            .swapchains
            .get(&swapchain.0)
            .map(|s| NativeTexture(s.backbuffer))
            .ok_or_else(|| GraphicsError::Backend(format!("unknown swapchain {swapchain:?}")))
    }

    fn resize_swapchain(
        &self,
        swapchain: NativeSwapchain,
        width: u32,
        height: u32,
    ) -> GraphicsResult<()> {
        let mut objects = self.objects.lock();
        let entry = objects
            .swapchains
            .get_mut(&swapchain.0)
            .ok_or_else(|| GraphicsError::Backend(format!("unknown swapchain {swapchain:?}")))?;
        entry.descriptor.width = width;
        entry.descriptor.height = height;
        let old = entry.backbuffer;
        let descriptor = Self::backbuffer_descriptor(&entry.descriptor);

        objects.textures.remove(&old);
        let handle = self.allocate();
        objects
            .textures
            .insert(handle, EmulatedTexture::new(&descriptor));
        bump(&self.counters.textures_created);
        if let Some(entry) = objects.swapchains.get_mut(&swapchain.0) {
            entry.backbuffer = handle;
        }
        Ok(())
    }

    fn present(&self, swapchain: NativeSwapchain, sync_interval: u32) -> GraphicsResult<()> {
        if !self.objects.lock().swapchains.contains_key(&swapchain.0) {
            return Err(GraphicsError::Backend(format!(
                "unknown swapchain {swapchain:?}"
            )));
        }
        log::trace!("DummyBackend: present (sync interval {sync_interval})");
        bump(&self.counters.presents);
        Ok(())
    }

    fn destroy(&self, object: NativeObject) {
        let mut objects = self.objects.lock();
        let removed = match object {
            NativeObject::Buffer(h) => objects.buffers.remove(&h.0).is_some(),
            NativeObject::Texture(h) => objects.textures.remove(&h.0).is_some(),
            NativeObject::View(h) => objects.views.remove(&h.0).is_some(),
            NativeObject::Swapchain(h) => match objects.swapchains.remove(&h.0) {
                Some(swapchain) => {
                    objects.textures.remove(&swapchain.backbuffer);
                    true
                }
                None => false,
            },
            NativeObject::Sampler(NativeSampler(h))
            | NativeObject::Shader(NativeShader(h))
            | NativeObject::BlendState(NativeBlendState(h))
            | NativeObject::DepthStencilState(NativeDepthStencilState(h))
            | NativeObject::RasterizerState(NativeRasterizerState(h))
            | NativeObject::InputLayout(NativeInputLayout(h)) => objects.opaque.remove(&h),
        };
        if removed {
            bump(&self.counters.objects_destroyed);
        } else {
            log::warn!("DummyBackend: destroying unknown object {object:?}");
        }
    }

    fn execute(&self, commands: &[NativeCommand]) -> GraphicsResult<()> {
        log::trace!("DummyBackend: executing {} commands", commands.len());
        let mut objects = self.objects.lock();
        for command in commands {
            self.execute_one(&mut objects, command)?;
            bump(&self.counters.commands_executed);
        }
        bump(&self.counters.lists_executed);
        Ok(())
    }

    fn map(
        &self,
        resource: NativeResource,
        subresource: u32,
        mode: MapMode,
    ) -> GraphicsResult<NativeMapping> {
        log::trace!("DummyBackend: map {resource:?}[{subresource}] {mode:?}");
        let mut objects = self.objects.lock();
        match resource {
            NativeResource::Buffer(buffer) => {
                let data = objects.buffer_mut(buffer)?;
                let size = data.len() as u64;
                Ok(NativeMapping {
                    data: data.as_mut_ptr(),
                    size,
                    row_pitch: size as u32,
                    depth_pitch: size as u32,
                })
            }
            NativeResource::Texture(texture) => {
                let sub = objects.texture_mut(texture)?.subresource_mut(subresource)?;
                Ok(NativeMapping {
                    data: sub.data.as_mut_ptr(),
                    size: sub.data.len() as u64,
                    row_pitch: sub.row_pitch,
                    depth_pitch: sub.depth_pitch,
                })
            }
        }
    }

    fn unmap(&self, resource: NativeResource, subresource: u32) {
        log::trace!("DummyBackend: unmap {resource:?}[{subresource}]");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::texture_storage_format;
    use crate::types::{BufferUsage, TextureFormat};

    #[test]
    fn test_buffer_roundtrip() {
        let backend = DummyBackend::new();
        let buffer = backend
            .create_buffer(&BufferDescriptor::new(16, BufferUsage::VERTEX))
            .unwrap();
        backend
            .execute(&[NativeCommand::UpdateBuffer {
                buffer,
                offset: 4,
                data: vec![1, 2, 3, 4],
            }])
            .unwrap();
        let data = backend.read_buffer(buffer).unwrap();
        assert_eq!(&data[4..8], &[1, 2, 3, 4]);
        assert_eq!(backend.stats().commands_executed, 1);
    }

    #[test]
    fn test_texture_rows_are_aligned() {
        let backend = DummyBackend::new();
        let desc = TextureDescriptor::new_2d(4, 2, TextureFormat::Rgba8Unorm, TextureUsage::STAGING);
        let texture = backend
            .create_texture(&desc, texture_storage_format(&desc))
            .unwrap();
        let mapping = backend
            .map(NativeResource::Texture(texture), 0, MapMode::Read)
            .unwrap();
        assert_eq!(mapping.row_pitch, TEXTURE_ROW_PITCH_ALIGNMENT);
        assert_eq!(mapping.size, 2 * TEXTURE_ROW_PITCH_ALIGNMENT as u64);
    }

    #[test]
    fn test_depth_formats_reject_storage() {
        let backend = DummyBackend::new();
        assert!(backend
            .format_support(NativeFormat::D32Float, TextureType::Texture2D, TextureUsage::STORAGE)
            .is_none());
        let props = backend
            .format_support(
                NativeFormat::R8G8B8A8Unorm,
                TextureType::Texture2D,
                TextureUsage::SAMPLED,
            )
            .unwrap();
        assert_eq!(props.max_mip_levels, 15);
    }

    #[test]
    fn test_destroy_counts() {
        let backend = DummyBackend::new();
        let buffer = backend
            .create_buffer(&BufferDescriptor::new(4, BufferUsage::UNIFORM))
            .unwrap();
        assert_eq!(backend.live_object_count(), 1);
        backend.destroy(NativeObject::Buffer(buffer));
        assert_eq!(backend.live_object_count(), 0);
        assert_eq!(backend.stats().objects_destroyed, 1);
    }
}
