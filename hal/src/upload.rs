//! Upload decision engine and the staging buffer pool.
//!
//! Buffer uploads take one of four paths depending on the destination's
//! usage and on whether the whole buffer is written:
//!
//! | Buffer                                      | Range   | Path          |
//! |---------------------------------------------|---------|---------------|
//! | any                                         | empty   | `Skip`        |
//! | not dynamic, not staging, not uniform       | any     | `DirectUpdate`|
//! | not dynamic, not staging, uniform           | full    | `DirectUpdate`|
//! | dynamic                                     | full    | `MapDiscard`  |
//! | everything else                             | partial | `StagingCopy` |
//!
//! Uniform buffers only take whole-buffer direct updates, and dynamic
//! buffers can only be written whole through a discarding map, so partial
//! writes to either go through a staging buffer and a device-side copy.

use std::sync::Arc;

use crate::error::{GraphicsError, GraphicsResult};
use crate::resources::{Buffer, Texture};
use crate::types::{
    BufferDescriptor, BufferUsage, Extent3d, TextureDescriptor, TextureLocation, TextureUsage,
};

/// How a buffer upload reaches the GPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UploadPath {
    /// Nothing to upload.
    Skip,
    /// Direct sub-region update of the destination.
    DirectUpdate,
    /// Map the whole buffer with discard and write it.
    MapDiscard,
    /// Write a staging buffer, then copy on the device.
    StagingCopy,
}

/// Choose the upload path for `size` bytes at `offset` into a buffer.
pub fn choose_buffer_upload(
    descriptor: &BufferDescriptor,
    offset: u64,
    size: u64,
) -> GraphicsResult<UploadPath> {
    if size == 0 {
        return Ok(UploadPath::Skip);
    }
    if offset.checked_add(size).is_none_or(|end| end > descriptor.size) {
        return Err(GraphicsError::usage(format!(
            "update of {size} bytes at offset {offset} exceeds buffer {:?} of size {}",
            descriptor.label, descriptor.size
        )));
    }

    let usage = descriptor.usage;
    let dynamic = usage.contains(BufferUsage::DYNAMIC);
    let staging = usage.contains(BufferUsage::STAGING);
    let uniform = usage.contains(BufferUsage::UNIFORM);
    let full = offset == 0 && size == descriptor.size;

    Ok(if !dynamic && !staging && (!uniform || full) {
        UploadPath::DirectUpdate
    } else if dynamic && full {
        UploadPath::MapDiscard
    } else {
        UploadPath::StagingCopy
    })
}

/// How a texture upload reaches the GPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureUploadPath {
    /// Map the subresource and repack rows into it.
    Map,
    /// Direct region update carrying the source pitches.
    DirectUpdate,
}

/// Staging textures are written through a mapping, everything else directly.
pub fn choose_texture_upload(descriptor: &TextureDescriptor) -> TextureUploadPath {
    if descriptor.usage.contains(TextureUsage::STAGING) {
        TextureUploadPath::Map
    } else {
        TextureUploadPath::DirectUpdate
    }
}

/// Validate that `extent` at `location` lies inside one mip level of
/// `texture`. Returns the subresource index.
pub(crate) fn texture_region(
    texture: &Texture,
    location: TextureLocation,
    extent: Extent3d,
) -> GraphicsResult<u32> {
    let subresource = texture.subresource(location.mip_level, location.array_layer)?;
    let mip = texture.descriptor().mip_extent(location.mip_level);
    let origin = location.origin;
    let fits = |origin: u32, size: u32, limit: u32| {
        origin.checked_add(size).is_some_and(|end| end <= limit)
    };
    if !fits(origin.x, extent.width, mip.width)
        || !fits(origin.y, extent.height, mip.height)
        || !fits(origin.z, extent.depth, mip.depth)
    {
        return Err(GraphicsError::usage(format!(
            "region {extent:?} at {origin:?} exceeds mip {} of texture {:?} ({mip:?})",
            location.mip_level,
            texture.label()
        )));
    }
    Ok(subresource)
}

/// Bytes a tightly or loosely pitched source must hold for `extent`.
pub(crate) fn check_source_layout(
    data_len: usize,
    row_bytes: u32,
    row_pitch: u32,
    depth_pitch: u32,
    extent: Extent3d,
) -> GraphicsResult<()> {
    if row_pitch < row_bytes {
        return Err(GraphicsError::usage(format!(
            "row pitch {row_pitch} is smaller than a row of {row_bytes} bytes"
        )));
    }
    if extent.width == 0 || extent.height == 0 || extent.depth == 0 {
        return Ok(());
    }
    let required = u64::from(extent.depth - 1) * u64::from(depth_pitch)
        + u64::from(extent.height - 1) * u64::from(row_pitch)
        + u64::from(row_bytes);
    if (data_len as u64) < required {
        return Err(GraphicsError::usage(format!(
            "texture data holds {data_len} bytes, region needs {required}"
        )));
    }
    Ok(())
}

/// Copy `extent` rows of `row_bytes` from a source laid out with one pair of
/// pitches into a destination laid out with another.
#[allow(clippy::too_many_arguments)]
pub fn repack_rows(
    source: &[u8],
    source_row_pitch: u32,
    source_depth_pitch: u32,
    destination: &mut [u8],
    destination_row_pitch: u32,
    destination_depth_pitch: u32,
    row_bytes: u32,
    extent: Extent3d,
) -> GraphicsResult<()> {
    let row_bytes = row_bytes as usize;
    let offset = |z: u32, y: u32, depth_pitch: u32, row_pitch: u32| {
        (u64::from(z) * u64::from(depth_pitch) + u64::from(y) * u64::from(row_pitch)) as usize
    };
    for z in 0..extent.depth {
        for y in 0..extent.height {
            let src = offset(z, y, source_depth_pitch, source_row_pitch);
            let dst = offset(z, y, destination_depth_pitch, destination_row_pitch);
            let row = source
                .get(src..src.saturating_add(row_bytes))
                .ok_or_else(|| GraphicsError::usage("texture data is smaller than the region"))?;
            destination
                .get_mut(dst..dst.saturating_add(row_bytes))
                .ok_or_else(|| GraphicsError::usage("texture region exceeds the mapped subresource"))?
                .copy_from_slice(row);
        }
    }
    Ok(())
}

// ============================================================================
// Staging pool
// ============================================================================

/// A staging buffer checked out of the pool.
#[derive(Debug, Clone)]
pub struct StagingBuffer {
    index: usize,
    buffer: Arc<Buffer>,
}

impl StagingBuffer {
    /// The staging buffer.
    pub fn buffer(&self) -> &Arc<Buffer> {
        &self.buffer
    }
}

/// Device-wide pool of staging buffers.
///
/// Buffers are addressed by index; a checked-out buffer stays in `entries`
/// and its index returns to `free` on release. Released buffers beyond
/// `limit` are disposed and their index becomes vacant.
#[derive(Debug)]
pub struct StagingPool {
    entries: Vec<Option<Arc<Buffer>>>,
    free: Vec<usize>,
    vacant: Vec<usize>,
    limit: usize,
}

impl StagingPool {
    /// Create an empty pool that retains at most `limit` idle buffers.
    pub fn new(limit: usize) -> Self {
        Self {
            entries: Vec::new(),
            free: Vec::new(),
            vacant: Vec::new(),
            limit,
        }
    }

    /// Check out the first free buffer of at least `size` bytes, or create one.
    pub fn acquire(
        &mut self,
        size: u64,
        create: impl FnOnce(u64) -> GraphicsResult<Arc<Buffer>>,
    ) -> GraphicsResult<StagingBuffer> {
        let found = self.free.iter().position(|&index| {
            self.entries
                .get(index)
                .and_then(Option::as_ref)
                .is_some_and(|buffer| buffer.size() >= size)
        });
        if let Some(position) = found {
            let index = self.free.remove(position);
            if let Some(Some(buffer)) = self.entries.get(index) {
                return Ok(StagingBuffer {
                    index,
                    buffer: Arc::clone(buffer),
                });
            }
        }

        let buffer = create(size)?;
        log::debug!(
            "StagingPool: allocated {size}-byte staging buffer ({} pooled)",
            self.entries.len() - self.vacant.len() + 1
        );
        let index = match self.vacant.pop() {
            Some(index) => {
                self.entries[index] = Some(Arc::clone(&buffer));
                index
            }
            None => {
                self.entries.push(Some(Arc::clone(&buffer)));
                self.entries.len() - 1
            }
        };
        Ok(StagingBuffer { index, buffer })
    }

    /// Return a checked-out buffer.
    ///
    /// A buffer the pool no longer owns, because the pool was disposed after
    /// it was checked out, is disposed instead of pooled.
    pub fn release(&mut self, staging: StagingBuffer) {
        let Some(slot) = self
            .entries
            .get_mut(staging.index)
            .filter(|slot| matches!(slot, Some(buffer) if Arc::ptr_eq(buffer, &staging.buffer)))
        else {
            log::trace!("StagingPool: disposing staging buffer released after pool disposal");
            staging.buffer.dispose();
            return;
        };
        if self.free.contains(&staging.index) {
            return;
        }
        if self.free.len() >= self.limit {
            if let Some(buffer) = slot.take() {
                buffer.dispose();
            }
            self.vacant.push(staging.index);
            return;
        }
        self.free.push(staging.index);
    }

    /// Buffers currently owned by the pool, idle or checked out.
    pub fn len(&self) -> usize {
        self.entries.len() - self.vacant.len()
    }

    /// Returns true if the pool owns no buffers.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Idle buffers.
    pub fn free_count(&self) -> usize {
        self.free.len()
    }

    /// Dispose every pooled buffer.
    pub fn dispose_all(&mut self) {
        for buffer in self.entries.drain(..).flatten() {
            buffer.dispose();
        }
        self.free.clear();
        self.vacant.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::test_device;
    use rstest::rstest;

    fn descriptor(usage: BufferUsage) -> BufferDescriptor {
        BufferDescriptor::new(256, usage)
    }

    #[rstest]
    #[case(BufferUsage::VERTEX, 0, 256, UploadPath::DirectUpdate)]
    #[case(BufferUsage::VERTEX, 16, 32, UploadPath::DirectUpdate)]
    #[case(BufferUsage::UNIFORM, 0, 256, UploadPath::DirectUpdate)]
    #[case(BufferUsage::UNIFORM, 0, 16, UploadPath::StagingCopy)]
    #[case(BufferUsage::UNIFORM | BufferUsage::DYNAMIC, 0, 256, UploadPath::MapDiscard)]
    #[case(BufferUsage::UNIFORM | BufferUsage::DYNAMIC, 64, 64, UploadPath::StagingCopy)]
    #[case(BufferUsage::VERTEX | BufferUsage::DYNAMIC, 0, 16, UploadPath::StagingCopy)]
    #[case(BufferUsage::STAGING, 0, 256, UploadPath::StagingCopy)]
    #[case(BufferUsage::INDEX, 0, 0, UploadPath::Skip)]
    fn test_upload_paths(
        #[case] usage: BufferUsage,
        #[case] offset: u64,
        #[case] size: u64,
        #[case] expected: UploadPath,
    ) {
        assert_eq!(choose_buffer_upload(&descriptor(usage), offset, size), Ok(expected));
    }

    #[test]
    fn test_out_of_bounds_upload() {
        assert!(matches!(
            choose_buffer_upload(&descriptor(BufferUsage::VERTEX), 200, 100),
            Err(GraphicsError::Usage(_))
        ));
    }

    #[test]
    fn test_overflowing_upload_range() {
        assert!(matches!(
            choose_buffer_upload(&descriptor(BufferUsage::VERTEX), u64::MAX, 2),
            Err(GraphicsError::Usage(_))
        ));
    }

    #[test]
    fn test_repack_rows_with_pitch_past_the_data() {
        let source = vec![9u8; 4];
        let mut destination = vec![0u8; 4];
        let result = repack_rows(
            &source,
            4,
            u32::MAX,
            &mut destination,
            4,
            4,
            4,
            Extent3d::new_3d(1, 1, 3),
        );
        assert!(matches!(result, Err(GraphicsError::Usage(_))));
    }

    #[test]
    fn test_repack_rows() {
        let source: Vec<u8> = (0..8).collect();
        let mut destination = vec![0u8; 32];
        repack_rows(&source, 4, 8, &mut destination, 16, 32, 4, Extent3d::new_2d(1, 2)).unwrap();
        assert_eq!(&destination[0..4], &[0, 1, 2, 3]);
        assert_eq!(&destination[16..20], &[4, 5, 6, 7]);
    }

    #[test]
    fn test_pool_reuses_large_enough_buffers() {
        let device = test_device();
        let create = |size| {
            device.create_buffer(&BufferDescriptor::new(size, BufferUsage::STAGING))
        };
        let mut pool = StagingPool::new(4);

        let a = pool.acquire(128, create).unwrap();
        let a_id = a.buffer().id();
        pool.release(a);

        let b = pool.acquire(64, create).unwrap();
        assert_eq!(b.buffer().id(), a_id);
        let c = pool.acquire(64, create).unwrap();
        assert_ne!(c.buffer().id(), a_id);
        assert_eq!(pool.len(), 2);

        pool.release(b);
        let d = pool.acquire(512, create).unwrap();
        assert_eq!(d.buffer().size(), 512);
        assert_eq!(pool.free_count(), 1);
    }

    #[test]
    fn test_pool_limit_disposes_extra_buffers() {
        let device = test_device();
        let create = |size| {
            device.create_buffer(&BufferDescriptor::new(size, BufferUsage::STAGING))
        };
        let mut pool = StagingPool::new(1);
        let a = pool.acquire(16, create).unwrap();
        let b = pool.acquire(16, create).unwrap();
        let b_buffer = Arc::clone(b.buffer());
        pool.release(a);
        pool.release(b);
        assert!(b_buffer.is_disposed());
        assert_eq!(pool.len(), 1);

        let c = pool.acquire(16, create).unwrap();
        let d = pool.acquire(16, create).unwrap();
        assert_ne!(c.buffer().id(), d.buffer().id());
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn test_release_after_dispose_all() {
        let device = test_device();
        let create = |size| {
            device.create_buffer(&BufferDescriptor::new(size, BufferUsage::STAGING))
        };
        let mut pool = StagingPool::new(4);
        let held = pool.acquire(32, create).unwrap();
        let held_buffer = Arc::clone(held.buffer());

        pool.dispose_all();
        assert!(held_buffer.is_disposed());
        pool.release(held);
        assert_eq!(pool.free_count(), 0);

        let fresh = pool.acquire(32, create).unwrap();
        assert!(!fresh.buffer().is_disposed());
        assert_ne!(fresh.buffer().id(), held_buffer.id());
        pool.release(fresh);
        assert_eq!(pool.free_count(), 1);
    }

    #[test]
    fn test_stale_release_does_not_free_a_reused_index() {
        let device = test_device();
        let create = |size| {
            device.create_buffer(&BufferDescriptor::new(size, BufferUsage::STAGING))
        };
        let mut pool = StagingPool::new(4);
        let stale = pool.acquire(16, create).unwrap();
        pool.dispose_all();

        // The new buffer takes the stale buffer's index
        let current = pool.acquire(16, create).unwrap();
        pool.release(stale);
        assert_eq!(pool.free_count(), 0);
        assert!(!current.buffer().is_disposed());
        pool.release(current);
        assert_eq!(pool.free_count(), 1);
    }
}
