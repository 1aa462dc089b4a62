//! Resource layout and resource set descriptions.
//!
//! A layout is an ordered list of elements describing what a shader expects.
//! Layouts are shared via `Arc`; the slot table is compiled once when the
//! layout is created (see [`ResourceLayout`]).

use std::sync::Arc;

use bitflags::bitflags;

use crate::resources::{Buffer, ResourceLayout, Sampler, Texture, TextureView};

bitflags! {
    /// Shader stages that can access a binding.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ShaderStages: u32 {
        /// Vertex shader stage.
        const VERTEX = 1 << 0;
        /// Geometry shader stage.
        const GEOMETRY = 1 << 1;
        /// Tessellation control (hull) stage.
        const TESSELLATION_CONTROL = 1 << 2;
        /// Tessellation evaluation (domain) stage.
        const TESSELLATION_EVALUATION = 1 << 3;
        /// Fragment shader stage.
        const FRAGMENT = 1 << 4;
        /// Compute shader stage.
        const COMPUTE = 1 << 5;
        /// Every graphics stage.
        const ALL_GRAPHICS = Self::VERTEX.bits()
            | Self::GEOMETRY.bits()
            | Self::TESSELLATION_CONTROL.bits()
            | Self::TESSELLATION_EVALUATION.bits()
            | Self::FRAGMENT.bits();
    }
}

impl ShaderStages {
    /// Individual stages in pipeline order.
    pub const EACH: [ShaderStages; 6] = [
        Self::VERTEX,
        Self::GEOMETRY,
        Self::TESSELLATION_CONTROL,
        Self::TESSELLATION_EVALUATION,
        Self::FRAGMENT,
        Self::COMPUTE,
    ];
}

/// Kind of resource a layout element accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    /// Uniform (constant) buffer.
    UniformBuffer,
    /// Structured buffer bound through a read view.
    StructuredBufferReadOnly,
    /// Structured buffer bound through a read-write view.
    StructuredBufferReadWrite,
    /// Texture bound through a read view.
    TextureReadOnly,
    /// Texture bound through a read-write view.
    TextureReadWrite,
    /// Sampler.
    Sampler,
}

/// Native slot space a [`ResourceKind`] is allocated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotClass {
    /// Uniform buffer slots.
    Uniform,
    /// Read-view slots, shared by textures and read-only structured buffers.
    ReadView,
    /// Read-write-view slots, shared by buffers and textures.
    ReadWriteView,
    /// Sampler slots.
    Sampler,
}

impl ResourceKind {
    /// Slot space this kind is allocated from.
    pub fn slot_class(self) -> SlotClass {
        match self {
            Self::UniformBuffer => SlotClass::Uniform,
            Self::StructuredBufferReadOnly | Self::TextureReadOnly => SlotClass::ReadView,
            Self::StructuredBufferReadWrite | Self::TextureReadWrite => SlotClass::ReadWriteView,
            Self::Sampler => SlotClass::Sampler,
        }
    }
}

bitflags! {
    /// Per-element layout options.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ResourceLayoutElementOptions: u32 {
        /// The element takes a dynamic offset at bind time.
        const DYNAMIC_BINDING = 1 << 0;
        /// Padding element: occupies a position but no slot.
        const UNUSED = 1 << 1;
    }
}

/// One element of a resource layout.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceLayoutElementDescription {
    /// Shader-side name. Not used for slot assignment.
    pub name: String,
    /// Accepted resource kind.
    pub kind: ResourceKind,
    /// Stages the resource is visible to.
    pub stages: ShaderStages,
    /// Element options.
    pub options: ResourceLayoutElementOptions,
}

impl ResourceLayoutElementDescription {
    /// Create an element with no options.
    pub fn new(name: impl Into<String>, kind: ResourceKind, stages: ShaderStages) -> Self {
        Self {
            name: name.into(),
            kind,
            stages,
            options: ResourceLayoutElementOptions::empty(),
        }
    }

    /// Set the element options.
    pub fn with_options(mut self, options: ResourceLayoutElementOptions) -> Self {
        self.options = options;
        self
    }

    /// Returns true if the element takes a dynamic offset.
    pub fn is_dynamic(&self) -> bool {
        self.options
            .contains(ResourceLayoutElementOptions::DYNAMIC_BINDING)
    }

    /// Returns true for padding elements.
    pub fn is_unused(&self) -> bool {
        self.options.contains(ResourceLayoutElementOptions::UNUSED)
    }
}

/// Description of a resource layout.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct ResourceLayoutDescription {
    /// Debug label.
    pub label: Option<String>,
    /// Elements in declaration order.
    pub elements: Vec<ResourceLayoutElementDescription>,
}

impl ResourceLayoutDescription {
    /// Create a layout description from elements.
    pub fn new(elements: Vec<ResourceLayoutElementDescription>) -> Self {
        Self {
            label: None,
            elements,
        }
    }

    /// Set the debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Append an element.
    pub fn with_element(mut self, element: ResourceLayoutElementDescription) -> Self {
        self.elements.push(element);
        self
    }
}

// ============================================================================
// Bindable resources
// ============================================================================

/// A sub-range of a buffer.
#[derive(Debug, Clone)]
pub struct BufferRange {
    /// The buffer.
    pub buffer: Arc<Buffer>,
    /// Byte offset.
    pub offset: u64,
    /// Byte size.
    pub size: u64,
}

impl BufferRange {
    /// Create a range.
    pub fn new(buffer: Arc<Buffer>, offset: u64, size: u64) -> Self {
        Self {
            buffer,
            offset,
            size,
        }
    }

    /// A range covering the whole buffer.
    pub fn whole(buffer: Arc<Buffer>) -> Self {
        let size = buffer.size();
        Self::new(buffer, 0, size)
    }
}

/// A resource placed at one position of a resource set.
#[derive(Debug, Clone)]
pub enum BindableResource {
    /// A whole buffer.
    Buffer(Arc<Buffer>),
    /// A buffer sub-range.
    BufferRange(BufferRange),
    /// A texture, bound through its cached full view.
    Texture(Arc<Texture>),
    /// A texture view.
    TextureView(Arc<TextureView>),
    /// A sampler.
    Sampler(Arc<Sampler>),
    /// Placeholder for an `UNUSED` layout element.
    Empty,
}

impl BindableResource {
    /// Short name of the variant, for error messages.
    pub fn variant_name(&self) -> &'static str {
        match self {
            Self::Buffer(_) => "buffer",
            Self::BufferRange(_) => "buffer range",
            Self::Texture(_) => "texture",
            Self::TextureView(_) => "texture view",
            Self::Sampler(_) => "sampler",
            Self::Empty => "empty",
        }
    }

    /// View as a buffer range, if this is a buffer or buffer range.
    pub fn as_buffer_range(&self) -> Option<BufferRange> {
        match self {
            Self::Buffer(buffer) => Some(BufferRange::whole(Arc::clone(buffer))),
            Self::BufferRange(range) => Some(range.clone()),
            _ => None,
        }
    }
}

impl From<Arc<Buffer>> for BindableResource {
    fn from(buffer: Arc<Buffer>) -> Self {
        Self::Buffer(buffer)
    }
}

impl From<BufferRange> for BindableResource {
    fn from(range: BufferRange) -> Self {
        Self::BufferRange(range)
    }
}

impl From<Arc<Texture>> for BindableResource {
    fn from(texture: Arc<Texture>) -> Self {
        Self::Texture(texture)
    }
}

impl From<Arc<TextureView>> for BindableResource {
    fn from(view: Arc<TextureView>) -> Self {
        Self::TextureView(view)
    }
}

impl From<Arc<Sampler>> for BindableResource {
    fn from(sampler: Arc<Sampler>) -> Self {
        Self::Sampler(sampler)
    }
}

/// Descriptor for creating a resource set.
#[derive(Debug, Clone)]
pub struct ResourceSetDescriptor {
    /// Debug label.
    pub label: Option<String>,
    /// Layout the resources match, position by position.
    pub layout: Arc<ResourceLayout>,
    /// Resources in layout order.
    pub resources: Vec<BindableResource>,
}

impl ResourceSetDescriptor {
    /// Create a resource set descriptor.
    pub fn new(layout: Arc<ResourceLayout>, resources: Vec<BindableResource>) -> Self {
        Self {
            label: None,
            layout,
            resources,
        }
    }

    /// Set the debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_classes() {
        assert_eq!(ResourceKind::TextureReadOnly.slot_class(), SlotClass::ReadView);
        assert_eq!(
            ResourceKind::StructuredBufferReadOnly.slot_class(),
            SlotClass::ReadView
        );
        assert_eq!(
            ResourceKind::TextureReadWrite.slot_class(),
            SlotClass::ReadWriteView
        );
        assert_eq!(ResourceKind::Sampler.slot_class(), SlotClass::Sampler);
    }

    #[test]
    fn test_element_options() {
        let element = ResourceLayoutElementDescription::new(
            "Camera",
            ResourceKind::UniformBuffer,
            ShaderStages::VERTEX,
        )
        .with_options(ResourceLayoutElementOptions::DYNAMIC_BINDING);
        assert!(element.is_dynamic());
        assert!(!element.is_unused());
    }
}
