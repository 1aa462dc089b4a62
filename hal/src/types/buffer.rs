//! Buffer types and descriptors.

use bitflags::bitflags;
use bytemuck::{Pod, Zeroable};

bitflags! {
    /// Usage flags for buffers.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BufferUsage: u32 {
        /// Buffer can be used as a vertex buffer.
        const VERTEX = 1 << 0;
        /// Buffer can be used as an index buffer.
        const INDEX = 1 << 1;
        /// Buffer can be used as a uniform buffer.
        const UNIFORM = 1 << 2;
        /// Buffer can be bound as a read-only structured buffer.
        const STRUCTURED_READ_ONLY = 1 << 3;
        /// Buffer can be bound as a read-write structured buffer.
        const STRUCTURED_READ_WRITE = 1 << 4;
        /// Buffer can be used as an indirect argument buffer.
        const INDIRECT = 1 << 5;
        /// Buffer is CPU-mappable for writing and updated frequently.
        const DYNAMIC = 1 << 6;
        /// Buffer lives in CPU-visible memory and is used for transfers.
        const STAGING = 1 << 7;
    }
}

impl Default for BufferUsage {
    fn default() -> Self {
        Self::empty()
    }
}

/// Descriptor for creating a buffer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct BufferDescriptor {
    /// Debug label for the buffer.
    pub label: Option<String>,
    /// Size in bytes.
    pub size: u64,
    /// Usage flags.
    pub usage: BufferUsage,
    /// Element stride for structured buffers, 0 otherwise.
    pub structure_byte_stride: u32,
    /// Structured buffers are viewed as raw byte-address buffers.
    pub raw_buffer: bool,
}

impl BufferDescriptor {
    /// Create a new buffer descriptor.
    pub fn new(size: u64, usage: BufferUsage) -> Self {
        Self {
            label: None,
            size,
            usage,
            structure_byte_stride: 0,
            raw_buffer: false,
        }
    }

    /// Create a structured buffer descriptor.
    pub fn structured(size: u64, usage: BufferUsage, stride: u32) -> Self {
        Self {
            structure_byte_stride: stride,
            ..Self::new(size, usage)
        }
    }

    /// Set the debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// View structured bindings as raw byte-address buffers.
    pub fn with_raw_buffer(mut self, raw: bool) -> Self {
        self.raw_buffer = raw;
        self
    }

    /// Returns true if the buffer is bound through read or read-write views.
    pub fn is_structured(&self) -> bool {
        self.usage
            .intersects(BufferUsage::STRUCTURED_READ_ONLY | BufferUsage::STRUCTURED_READ_WRITE)
    }
}

/// Index element format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum IndexFormat {
    /// 16-bit indices.
    #[default]
    Uint16,
    /// 32-bit indices.
    Uint32,
}

impl IndexFormat {
    /// Size of one index in bytes.
    pub fn size(self) -> u32 {
        match self {
            Self::Uint16 => 2,
            Self::Uint32 => 4,
        }
    }
}

// ============================================================================
// Indirect Arguments
// ============================================================================

/// Arguments for a non-indexed indirect draw call.
///
/// The buffer containing these arguments must have [`BufferUsage::INDIRECT`].
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Pod, Zeroable)]
pub struct DrawIndirectArgs {
    /// Number of vertices to draw.
    pub vertex_count: u32,
    /// Number of instances to draw.
    pub instance_count: u32,
    /// Index of the first vertex to draw.
    pub first_vertex: u32,
    /// Instance ID of the first instance to draw.
    pub first_instance: u32,
}

impl DrawIndirectArgs {
    /// Size of the struct in bytes.
    pub const SIZE: u64 = std::mem::size_of::<Self>() as u64;

    /// Create new indirect draw arguments.
    pub fn new(vertex_count: u32, instance_count: u32) -> Self {
        Self {
            vertex_count,
            instance_count,
            first_vertex: 0,
            first_instance: 0,
        }
    }
}

/// Arguments for an indexed indirect draw call.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Pod, Zeroable)]
pub struct DrawIndexedIndirectArgs {
    /// Number of indices to draw.
    pub index_count: u32,
    /// Number of instances to draw.
    pub instance_count: u32,
    /// Index of the first index to draw.
    pub first_index: u32,
    /// Value added to each index before reading from the vertex buffer.
    pub base_vertex: i32,
    /// Instance ID of the first instance to draw.
    pub first_instance: u32,
}

impl DrawIndexedIndirectArgs {
    /// Size of the struct in bytes.
    pub const SIZE: u64 = std::mem::size_of::<Self>() as u64;

    /// Create new indexed indirect draw arguments.
    pub fn new(index_count: u32, instance_count: u32) -> Self {
        Self {
            index_count,
            instance_count,
            first_index: 0,
            base_vertex: 0,
            first_instance: 0,
        }
    }
}

/// Arguments for an indirect compute dispatch.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Pod, Zeroable)]
pub struct DispatchIndirectArgs {
    /// Group count in X.
    pub x: u32,
    /// Group count in Y.
    pub y: u32,
    /// Group count in Z.
    pub z: u32,
}

impl DispatchIndirectArgs {
    /// Size of the struct in bytes.
    pub const SIZE: u64 = std::mem::size_of::<Self>() as u64;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indirect_arg_sizes() {
        assert_eq!(DrawIndirectArgs::SIZE, 16);
        assert_eq!(DrawIndexedIndirectArgs::SIZE, 20);
        assert_eq!(DispatchIndirectArgs::SIZE, 12);
        let args = DrawIndirectArgs::new(36, 100);
        assert_eq!(bytemuck::bytes_of(&args).len(), 16);
    }

    #[test]
    fn test_structured_detection() {
        let desc = BufferDescriptor::structured(256, BufferUsage::STRUCTURED_READ_WRITE, 16);
        assert!(desc.is_structured());
        assert!(!BufferDescriptor::new(64, BufferUsage::UNIFORM).is_structured());
    }
}
