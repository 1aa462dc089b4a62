//! GPU buffer resource.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use super::{DeviceResource, ResourceCore, ResourceId};
use crate::backend::{NativeBuffer, NativeObject, NativeView, NativeViewDescriptor};
use crate::device::GraphicsDevice;
use crate::error::{GraphicsError, GraphicsResult};
use crate::types::{BufferDescriptor, BufferUsage};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct ViewKey {
    offset: u64,
    size: u64,
    read_write: bool,
}

/// A GPU buffer resource.
///
/// Buffers are created by [`GraphicsDevice::create_buffer`] and are reference-counted.
/// They hold a weak reference back to their parent device.
///
/// Read and read-write views onto buffer ranges are created on first use and
/// cached per `(offset, size, kind)` until the buffer is disposed.
///
/// # Example
///
/// ```ignore
/// let buffer = device.create_buffer(&BufferDescriptor::new(1024, BufferUsage::VERTEX))?;
/// println!("Buffer size: {}", buffer.size());
/// ```
pub struct Buffer {
    core: ResourceCore,
    descriptor: BufferDescriptor,
    native: NativeBuffer,
    views: Mutex<HashMap<ViewKey, NativeView>>,
}

impl Buffer {
    /// Create a new buffer (called by GraphicsDevice).
    pub(crate) fn new(core: ResourceCore, descriptor: BufferDescriptor, native: NativeBuffer) -> Self {
        Self {
            core,
            descriptor,
            native,
            views: Mutex::new(HashMap::new()),
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

    /// Get the buffer descriptor.
    pub fn descriptor(&self) -> &BufferDescriptor {
        &self.descriptor
    }

    /// Get the buffer size in bytes.
    pub fn size(&self) -> u64 {
        self.descriptor.size
    }

    /// Get the usage flags.
    pub fn usage(&self) -> BufferUsage {
        self.descriptor.usage
    }

    /// Get the buffer label, if set.
    pub fn label(&self) -> Option<&str> {
        self.descriptor.label.as_deref()
    }

    /// Returns true once [`dispose`](Self::dispose) has run.
    pub fn is_disposed(&self) -> bool {
        self.core.is_disposed()
    }

    /// Number of cached range views.
    pub fn cached_view_count(&self) -> usize {
        self.views.lock().len()
    }

    /// Release the native buffer and every cached view.
    ///
    /// The caller must not dispose a buffer that submitted work still uses.
    pub fn dispose(&self) {
        if !self.core.mark_disposed() {
            return;
        }
        let backend = self.core.backend();
        for (_, view) in self.views.lock().drain() {
            backend.destroy(NativeObject::View(view));
        }
        backend.destroy(NativeObject::Buffer(self.native));
        log::trace!("Buffer {:?} disposed", self.label());
    }

    pub(crate) fn check_alive(&self) -> GraphicsResult<()> {
        self.core.check("buffer", self.label())
    }

    pub(crate) fn native(&self) -> GraphicsResult<NativeBuffer> {
        self.check_alive()?;
        Ok(self.native)
    }

    /// Fails unless the buffer has every flag in `required`.
    pub(crate) fn require_usage(&self, required: BufferUsage, operation: &str) -> GraphicsResult<()> {
        if !self.usage().contains(required) {
            return Err(GraphicsError::usage(format!(
                "{operation} requires a buffer with {required:?} usage, got {:?}",
                self.usage()
            )));
        }
        Ok(())
    }

    /// Cached read or read-write view onto `[offset, offset + size)`.
    pub(crate) fn range_view(&self, offset: u64, size: u64, read_write: bool) -> GraphicsResult<NativeView> {
        self.check_alive()?;
        let allowed = if read_write {
            BufferUsage::STRUCTURED_READ_WRITE
        } else {
            BufferUsage::STRUCTURED_READ_ONLY | BufferUsage::STRUCTURED_READ_WRITE
        };
        if !self.usage().intersects(allowed) {
            return Err(GraphicsError::usage(format!(
                "buffer {:?} with usage {:?} cannot be bound through a {} view",
                self.label(),
                self.usage(),
                if read_write { "read-write" } else { "read" }
            )));
        }
        if offset + size > self.size() {
            return Err(GraphicsError::usage(format!(
                "view range {offset}+{size} exceeds buffer size {}",
                self.size()
            )));
        }

        let key = ViewKey {
            offset,
            size,
            read_write,
        };
        let mut views = self.views.lock();
        if let Some(view) = views.get(&key) {
            return Ok(*view);
        }

        let stride = if self.descriptor.raw_buffer {
            0
        } else {
            self.descriptor.structure_byte_stride
        };
        let descriptor = if read_write {
            NativeViewDescriptor::BufferReadWrite {
                buffer: self.native,
                offset,
                size,
                stride,
            }
        } else {
            NativeViewDescriptor::BufferRead {
                buffer: self.native,
                offset,
                size,
                stride,
            }
        };
        let view = self.core.backend().create_view(&descriptor)?;
        views.insert(key, view);
        Ok(view)
    }
}

impl DeviceResource for Buffer {
    fn dispose(&self) {
        Buffer::dispose(self);
    }

    fn is_disposed(&self) -> bool {
        Buffer::is_disposed(self)
    }
}

impl std::fmt::Debug for Buffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Buffer")
            .field("id", &self.id())
            .field("size", &self.descriptor.size)
            .field("usage", &self.descriptor.usage)
            .field("label", &self.descriptor.label)
            .finish()
    }
}

// Ensure Buffer is Send + Sync
static_assertions::assert_impl_all!(Buffer: Send, Sync);

#[cfg(test)]
mod tests {
    use crate::device::test_device as device;
    use crate::types::{BufferDescriptor, BufferUsage};

    #[test]
    fn test_buffer_debug() {
        let buffer = device()
            .create_buffer(&BufferDescriptor::new(1024, BufferUsage::VERTEX))
            .unwrap();
        let debug = format!("{:?}", buffer);
        assert!(debug.contains("Buffer"));
        assert!(debug.contains("1024"));
    }

    #[test]
    fn test_range_views_are_cached() {
        let buffer = device()
            .create_buffer(&BufferDescriptor::structured(
                256,
                BufferUsage::STRUCTURED_READ_WRITE,
                16,
            ))
            .unwrap();
        let a = buffer.range_view(0, 128, false).unwrap();
        let b = buffer.range_view(0, 128, false).unwrap();
        let c = buffer.range_view(0, 128, true).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(buffer.cached_view_count(), 2);
    }

    #[test]
    fn test_use_after_dispose() {
        let buffer = device()
            .create_buffer(&BufferDescriptor::new(64, BufferUsage::UNIFORM))
            .unwrap();
        buffer.dispose();
        assert!(buffer.is_disposed());
        assert!(matches!(
            buffer.native(),
            Err(crate::GraphicsError::Disposed(_))
        ));
    }
}
