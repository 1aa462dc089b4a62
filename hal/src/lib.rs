//! # RedLilium HAL
//!
//! GPU hardware abstraction layer for RedLilium with a flat per-kind slot
//! model.
//!
//! ## Overview
//!
//! This crate provides:
//! - [`GraphicsInstance`] and [`GraphicsDevice`] - Backend selection and resource creation
//! - [`ResourceLayout`] - Compiles binding descriptions into per-kind native slots
//! - [`CommandList`] - Records commands, activating resource sets lazily before draws
//! - [`PipelineStateCache`] - Shares fixed-function state objects between pipelines
//! - [`Swapchain`] - Backbuffers with resize that invalidates recording command lists
//! - [`backend::dummy::DummyBackend`] - Host-memory backend for tests and tooling
//!
//! ## Example
//!
//! ```ignore
//! use redlilium_hal::{GraphicsDeviceOptions, GraphicsInstance, InstanceParameters};
//!
//! let instance = GraphicsInstance::new(InstanceParameters::from_env()?)?;
//! let device = instance.create_device(GraphicsDeviceOptions::default())?;
//!
//! let mut list = device.create_command_list()?;
//! list.begin()?;
//! list.set_pipeline(&pipeline)?;
//! list.set_graphics_resource_set(0, &resource_set, &[])?;
//! list.draw(3, 1, 0, 0)?;
//! list.end()?;
//! device.submit_commands(&mut list, None)?;
//! ```

pub mod backend;
pub mod binding;
pub mod cache;
pub mod command_list;
pub mod device;
pub mod error;
pub mod format;
pub mod instance;
pub mod resources;
pub mod swapchain;
pub mod sync;
pub mod types;
pub mod upload;

// Re-export main types for convenience
pub use backend::{BackendType, GpuBackend, MapMode};
pub use binding::{BindPoint, SetState};
pub use cache::{CacheStats, PipelineStateCache};
pub use command_list::{CommandList, CommandListState};
pub use device::{GraphicsDevice, GraphicsDeviceFeatures, GraphicsDeviceOptions, MappedResource};
pub use error::{GraphicsError, GraphicsResult};
pub use format::PixelFormatProperties;
pub use instance::{GraphicsInstance, InstanceParameters};
pub use resources::{
    Buffer, Framebuffer, Pipeline, ResourceId, ResourceLayout, ResourceSet, Sampler, Shader,
    Texture, TextureView,
};
pub use swapchain::Swapchain;
pub use sync::{Fence, FenceStatus};
pub use types::*;
pub use upload::UploadPath;

/// HAL library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the HAL.
///
/// Logs the library version; call once at startup after installing a logger.
pub fn init() {
    log::info!("RedLilium HAL v{} initialized", VERSION);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_dummy_backend() {
        let backend = backend::dummy::DummyBackend::new();
        assert_eq!(backend.name(), "Dummy Backend");
    }
}
