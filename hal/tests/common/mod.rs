//! Common utilities for HAL integration tests.
//!
//! Provides a [`TestContext`] on the dummy backend plus helpers for the
//! pipelines, targets and readbacks most tests need.

use std::sync::Arc;

use redlilium_hal::backend::dummy::{DummyBackend, DummyStats};
use redlilium_hal::{
    BindableResource, Buffer, BufferDescriptor, BufferUsage, ComputePipelineDescriptor,
    Framebuffer, FramebufferAttachmentDescription, FramebufferDescriptor, GraphicsDevice,
    GraphicsDeviceOptions, GraphicsInstance, GraphicsPipelineDescriptor, InstanceParameters,
    OutputAttachmentDescription, OutputDescription, Pipeline, ResourceKind, ResourceLayout,
    ResourceLayoutDescription, ResourceLayoutElementDescription, ResourceSet,
    ResourceSetDescriptor, ShaderDescriptor, ShaderSetDescription, ShaderStages, Swapchain,
    SwapchainDescriptor, SwapchainSource, Texture, TextureDescriptor, TextureFormat,
    TextureSampleCount, TextureUsage,
};

/// Size of the default color target.
pub const TARGET_WIDTH: u32 = 64;
/// Size of the default color target.
pub const TARGET_HEIGHT: u32 = 32;

/// Generate a recognizable byte pattern.
pub fn generate_test_pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 7 + 3) as u8).collect()
}

// ============================================================================
// Test Context
// ============================================================================

/// Test context owning an instance and one device on the dummy backend.
pub struct TestContext {
    #[allow(dead_code)]
    instance: Arc<GraphicsInstance>,
    /// Device for creating resources.
    pub device: Arc<GraphicsDevice>,
}

impl TestContext {
    /// Create a context with debug validation on.
    pub fn new() -> Self {
        let _ = env_logger::builder().is_test(true).try_init();
        let instance = GraphicsInstance::new(InstanceParameters::new().with_debug(true))
            .expect("dummy instance");
        let device = instance
            .create_device(GraphicsDeviceOptions::default())
            .expect("dummy device");
        Self { instance, device }
    }

    /// Create a context whose device owns a headless main swapchain.
    #[allow(dead_code)]
    pub fn with_swapchain(options: GraphicsDeviceOptions) -> (Self, Arc<Swapchain>) {
        let _ = env_logger::builder().is_test(true).try_init();
        let instance = GraphicsInstance::new(InstanceParameters::new().with_debug(true))
            .expect("dummy instance");
        let (device, swapchain) = instance
            .create_device_with_swapchain(
                options,
                &SwapchainDescriptor::new(SwapchainSource::Headless, TARGET_WIDTH, TARGET_HEIGHT),
            )
            .expect("device with swapchain");
        (Self { instance, device }, swapchain)
    }

    /// Another device on the same instance.
    #[allow(dead_code)]
    pub fn second_device(&self) -> Arc<GraphicsDevice> {
        self.instance
            .create_device(GraphicsDeviceOptions::default())
            .expect("second device")
    }

    /// The dummy backend behind the device.
    pub fn dummy(&self) -> &DummyBackend {
        self.device
            .backend()
            .as_any()
            .downcast_ref::<DummyBackend>()
            .expect("dummy backend")
    }

    /// Counters of the dummy backend.
    #[allow(dead_code)]
    pub fn stats(&self) -> DummyStats {
        self.dummy().stats()
    }

    /// Create a buffer, panicking on failure.
    pub fn buffer(&self, size: u64, usage: BufferUsage) -> Arc<Buffer> {
        self.device
            .create_buffer(&BufferDescriptor::new(size, usage))
            .expect("buffer")
    }

    /// Copy a buffer into a fresh staging buffer and return its bytes.
    pub fn read_back(&self, buffer: &Arc<Buffer>) -> Vec<u8> {
        let readback = self.buffer(buffer.size(), BufferUsage::STAGING);
        let mut list = self.device.create_command_list().expect("command list");
        list.begin().unwrap();
        list.copy_buffer(buffer, 0, &readback, 0, buffer.size()).unwrap();
        list.end().unwrap();
        self.device.submit_commands(&mut list, None).unwrap();
        self.device.read_buffer(&readback).unwrap()
    }

    /// A color render target and its framebuffer.
    #[allow(dead_code)]
    pub fn color_target(&self) -> (Arc<Texture>, Arc<Framebuffer>) {
        let texture = self
            .device
            .create_texture(&TextureDescriptor::new_2d(
                TARGET_WIDTH,
                TARGET_HEIGHT,
                TextureFormat::Rgba8Unorm,
                TextureUsage::RENDER_TARGET | TextureUsage::SAMPLED,
            ))
            .expect("color target");
        let framebuffer = self
            .device
            .create_framebuffer(&FramebufferDescriptor::new(
                vec![FramebufferAttachmentDescription::new(Arc::clone(&texture))],
                None,
            ))
            .expect("framebuffer");
        (texture, framebuffer)
    }

    /// Compile a layout from `(name, kind, stages)` triples.
    pub fn layout(&self, elements: &[(&str, ResourceKind, ShaderStages)]) -> Arc<ResourceLayout> {
        self.device
            .create_resource_layout(&ResourceLayoutDescription::new(
                elements
                    .iter()
                    .map(|&(name, kind, stages)| {
                        ResourceLayoutElementDescription::new(name, kind, stages)
                    })
                    .collect(),
            ))
            .expect("resource layout")
    }

    /// Create a resource set.
    pub fn set(&self, layout: &Arc<ResourceLayout>, resources: Vec<BindableResource>) -> Arc<ResourceSet> {
        self.device
            .create_resource_set(&ResourceSetDescriptor::new(Arc::clone(layout), resources))
            .expect("resource set")
    }

    /// The graphics pipeline descriptor every test starts from: vertex and
    /// fragment shader, no vertex buffers, one Rgba8 output.
    #[allow(dead_code)]
    pub fn graphics_descriptor(&self, layouts: Vec<Arc<ResourceLayout>>) -> GraphicsPipelineDescriptor {
        let vs = self
            .device
            .create_shader(&ShaderDescriptor::new(ShaderStages::VERTEX, b"vs_main".to_vec()))
            .expect("vertex shader");
        let fs = self
            .device
            .create_shader(&ShaderDescriptor::new(ShaderStages::FRAGMENT, b"fs_main".to_vec()))
            .expect("fragment shader");
        GraphicsPipelineDescriptor::new(
            ShaderSetDescription::new(vec![], vec![vs, fs]),
            layouts,
            OutputDescription {
                depth_attachment: None,
                color_attachments: vec![OutputAttachmentDescription {
                    format: TextureFormat::Rgba8Unorm,
                }],
                sample_count: TextureSampleCount::Count1,
            },
        )
    }

    /// A graphics pipeline over `layouts`.
    #[allow(dead_code)]
    pub fn graphics_pipeline(&self, layouts: Vec<Arc<ResourceLayout>>) -> Arc<Pipeline> {
        let descriptor = self.graphics_descriptor(layouts);
        self.device
            .create_graphics_pipeline(&descriptor)
            .expect("graphics pipeline")
    }

    /// A compute pipeline over `layouts`.
    #[allow(dead_code)]
    pub fn compute_pipeline(&self, layouts: Vec<Arc<ResourceLayout>>) -> Arc<Pipeline> {
        let shader = self
            .device
            .create_shader(&ShaderDescriptor::new(ShaderStages::COMPUTE, b"cs_main".to_vec()))
            .expect("compute shader");
        self.device
            .create_compute_pipeline(
                &ComputePipelineDescriptor::new(shader, layouts).with_thread_group_size(8, 8, 1),
            )
            .expect("compute pipeline")
    }
}
