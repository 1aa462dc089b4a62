//! GPU sampler resource.

use std::sync::Arc;

use super::{DeviceResource, ResourceCore, ResourceId};
use crate::backend::{NativeObject, NativeSampler};
use crate::device::GraphicsDevice;
use crate::error::GraphicsResult;
use crate::types::SamplerDescriptor;

/// A GPU texture sampler.
///
/// Samplers are created by [`GraphicsDevice::create_sampler`] and are reference-counted.
/// They hold a weak reference back to their parent device.
///
/// # Example
///
/// ```ignore
/// let sampler = device.create_sampler(&SamplerDescriptor::linear())?;
/// ```
pub struct Sampler {
    core: ResourceCore,
    descriptor: SamplerDescriptor,
    native: NativeSampler,
}

impl Sampler {
    /// Create a new sampler (called by GraphicsDevice).
    pub(crate) fn new(core: ResourceCore, descriptor: SamplerDescriptor, native: NativeSampler) -> Self {
        Self {
            core,
            descriptor,
            native,
        }
    }

    /// Device-unique id.
    pub fn id(&self) -> ResourceId {
        self.core.id()
    }

    /// Get the parent device, if it still exists.
    pub fn device(&self) -> Option<Arc<GraphicsDevice>> {
        self.core.device()
    }

    /// Get the sampler descriptor.
    pub fn descriptor(&self) -> &SamplerDescriptor {
        &self.descriptor
    }

    /// Get the sampler label, if set.
    pub fn label(&self) -> Option<&str> {
        self.descriptor.label.as_deref()
    }

    /// Returns true once [`dispose`](Self::dispose) has run.
    pub fn is_disposed(&self) -> bool {
        self.core.is_disposed()
    }

    /// Release the native sampler.
    pub fn dispose(&self) {
        if self.core.mark_disposed() {
            self.core.backend().destroy(NativeObject::Sampler(self.native));
        }
    }

    pub(crate) fn native(&self) -> GraphicsResult<NativeSampler> {
        self.core.check("sampler", self.label())?;
        Ok(self.native)
    }
}

impl DeviceResource for Sampler {
    fn dispose(&self) {
        Sampler::dispose(self);
    }

    fn is_disposed(&self) -> bool {
        Sampler::is_disposed(self)
    }
}

impl std::fmt::Debug for Sampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sampler")
            .field("id", &self.id())
            .field("mag_filter", &self.descriptor.mag_filter)
            .field("min_filter", &self.descriptor.min_filter)
            .field("label", &self.descriptor.label)
            .finish()
    }
}

// Ensure Sampler is Send + Sync
static_assertions::assert_impl_all!(Sampler: Send, Sync);

#[cfg(test)]
mod tests {
    use crate::device::test_device;
    use crate::types::SamplerDescriptor;

    #[test]
    fn test_sampler_debug() {
        let sampler = test_device()
            .create_sampler(&SamplerDescriptor::linear().with_label("linear"))
            .unwrap();
        let debug = format!("{:?}", sampler);
        assert!(debug.contains("Sampler"));
        assert!(debug.contains("Linear"));
    }
}
