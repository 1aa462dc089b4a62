//! GPU resources.
//!
//! This module contains the resource types that are created by [`GraphicsDevice`]:
//! - [`Buffer`] - GPU memory buffer
//! - [`Texture`] and [`TextureView`] - GPU textures and sub-range views
//! - [`Sampler`] - Texture sampler
//! - [`Shader`] - Compiled shader stage
//! - [`Framebuffer`] - Color and depth attachments rendered to together
//! - [`ResourceLayout`] - Slot table compiled from a layout description
//! - [`ResourceSet`] - Resources matching a layout, bound together
//! - [`Pipeline`] - Graphics or compute pipeline
//!
//! Resources are reference-counted with [`Arc`] and can be shared across threads.
//! Each resource holds a weak reference back to its parent device. Native
//! objects are released by an explicit `dispose()`; dropping the last `Arc`
//! of an undisposed resource leaks its native objects until the device is
//! disposed.
//!
//! [`GraphicsDevice`]: crate::GraphicsDevice
//! [`Arc`]: std::sync::Arc

mod buffer;
mod framebuffer;
mod layout;
mod pipeline;
mod sampler;
mod shader;
mod texture;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

pub use buffer::Buffer;
pub use framebuffer::Framebuffer;
pub use layout::{slot_bases, ResourceBindingInfo, ResourceLayout, ResourceSet, SlotCounts, SlotTable};
pub use pipeline::{ComputePipelineState, GraphicsPipelineState, Pipeline, PipelineKind};
pub use sampler::Sampler;
pub use shader::Shader;
pub use texture::{Texture, TextureView};

use crate::backend::GpuBackend;
use crate::device::GraphicsDevice;
use crate::error::{GraphicsError, GraphicsResult};

/// Device-unique identifier of a resource.
///
/// Views of one texture report the texture's id as their underlying resource,
/// which is what read/write hazard tracking keys on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(pub(crate) u64);

impl ResourceId {
    /// Raw id value.
    pub fn raw(self) -> u64 {
        self.0
    }
}

/// Something the device tracks so it can dispose of it.
pub(crate) trait DeviceResource: Send + Sync {
    fn dispose(&self);
    fn is_disposed(&self) -> bool;
}

/// State every device resource carries.
pub(crate) struct ResourceCore {
    id: ResourceId,
    ids: Arc<AtomicU64>,
    device: Weak<GraphicsDevice>,
    backend: Arc<dyn GpuBackend>,
    validate: bool,
    disposed: AtomicBool,
}

impl ResourceCore {
    pub(crate) fn new(
        ids: Arc<AtomicU64>,
        device: Weak<GraphicsDevice>,
        backend: Arc<dyn GpuBackend>,
        validate: bool,
    ) -> Self {
        let id = ResourceId(ids.fetch_add(1, Ordering::Relaxed));
        Self {
            id,
            ids,
            device,
            backend,
            validate,
            disposed: AtomicBool::new(false),
        }
    }

    /// A fresh core for a resource derived from this one.
    pub(crate) fn sibling(&self) -> Self {
        Self::new(
            Arc::clone(&self.ids),
            self.device.clone(),
            Arc::clone(&self.backend),
            self.validate,
        )
    }

    pub(crate) fn id(&self) -> ResourceId {
        self.id
    }

    pub(crate) fn device(&self) -> Option<Arc<GraphicsDevice>> {
        self.device.upgrade()
    }

    pub(crate) fn backend(&self) -> &Arc<dyn GpuBackend> {
        &self.backend
    }

    pub(crate) fn validation_enabled(&self) -> bool {
        self.validate
    }

    pub(crate) fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Marks the resource disposed. Returns false if it already was.
    pub(crate) fn mark_disposed(&self) -> bool {
        !self.disposed.swap(true, Ordering::AcqRel)
    }

    /// Fails with [`GraphicsError::Disposed`] when validation is on and the
    /// resource has been disposed.
    pub(crate) fn check(&self, what: &str, label: Option<&str>) -> GraphicsResult<()> {
        if self.validate && self.is_disposed() {
            return Err(GraphicsError::Disposed(match label {
                Some(label) => format!("{what} '{label}' ({:?})", self.id),
                None => format!("{what} {:?}", self.id),
            }));
        }
        Ok(())
    }
}

impl std::fmt::Debug for ResourceCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceCore")
            .field("id", &self.id)
            .field("disposed", &self.is_disposed())
            .finish_non_exhaustive()
    }
}
