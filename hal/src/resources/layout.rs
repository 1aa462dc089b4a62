//! Resource layouts, their compiled slot tables, and resource sets.
//!
//! The native model has four flat slot spaces per shader stage: uniform
//! buffers, read views, read-write views and samplers. A layout is compiled
//! once into a [`SlotTable`] that assigns each element a slot inside its
//! space, in declaration order. A pipeline concatenates the tables of its
//! layouts with [`slot_bases`], so set `i` starts where set `i - 1` ended.
//!
//! Slot assignment depends only on the sequence of element kinds and
//! options. Names and stage masks never move a slot.

use std::sync::Arc;

use super::{DeviceResource, ResourceCore, ResourceId};
use crate::error::{GraphicsError, GraphicsResult};
use crate::types::{
    BindableResource, BufferUsage, ResourceKind, ResourceLayoutDescription, ShaderStages,
    SlotClass, TextureUsage,
};

/// Number of slots used per native slot space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SlotCounts {
    /// Uniform buffer slots.
    pub uniform_buffers: u32,
    /// Read-view slots.
    pub read_views: u32,
    /// Read-write-view slots.
    pub read_write_views: u32,
    /// Sampler slots.
    pub samplers: u32,
}

impl SlotCounts {
    /// Count for one slot space.
    pub fn get(&self, class: SlotClass) -> u32 {
        match class {
            SlotClass::Uniform => self.uniform_buffers,
            SlotClass::ReadView => self.read_views,
            SlotClass::ReadWriteView => self.read_write_views,
            SlotClass::Sampler => self.samplers,
        }
    }

    /// Post-increment the counter for `class`, returning the slot it held.
    fn take(&mut self, class: SlotClass) -> u32 {
        let counter = match class {
            SlotClass::Uniform => &mut self.uniform_buffers,
            SlotClass::ReadView => &mut self.read_views,
            SlotClass::ReadWriteView => &mut self.read_write_views,
            SlotClass::Sampler => &mut self.samplers,
        };
        let slot = *counter;
        *counter += 1;
        slot
    }

    /// Component-wise sum.
    pub fn add(self, other: SlotCounts) -> SlotCounts {
        SlotCounts {
            uniform_buffers: self.uniform_buffers + other.uniform_buffers,
            read_views: self.read_views + other.read_views,
            read_write_views: self.read_write_views + other.read_write_views,
            samplers: self.samplers + other.samplers,
        }
    }
}

/// Compiled binding information for one layout element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceBindingInfo {
    /// Accepted resource kind.
    pub kind: ResourceKind,
    /// Slot inside the kind's slot space; `None` for `UNUSED` elements.
    pub slot: Option<u32>,
    /// Stages the resource is bound to.
    pub stages: ShaderStages,
    /// Takes a dynamic offset at bind time.
    pub dynamic: bool,
}

/// Slot assignments of one layout.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct SlotTable {
    bindings: Vec<ResourceBindingInfo>,
    counts: SlotCounts,
    dynamic_count: usize,
}

impl SlotTable {
    /// Compile a layout description.
    pub fn build(description: &ResourceLayoutDescription) -> Self {
        let mut counts = SlotCounts::default();
        let mut dynamic_count = 0;
        let bindings = description
            .elements
            .iter()
            .map(|element| {
                if element.is_unused() {
                    return ResourceBindingInfo {
                        kind: element.kind,
                        slot: None,
                        stages: element.stages,
                        dynamic: false,
                    };
                }
                let dynamic = element.is_dynamic();
                if dynamic {
                    dynamic_count += 1;
                }
                ResourceBindingInfo {
                    kind: element.kind,
                    slot: Some(counts.take(element.kind.slot_class())),
                    stages: element.stages,
                    dynamic,
                }
            })
            .collect();

        Self {
            bindings,
            counts,
            dynamic_count,
        }
    }

    /// Per-element binding information, in declaration order.
    pub fn bindings(&self) -> &[ResourceBindingInfo] {
        &self.bindings
    }

    /// Slots used per slot space.
    pub fn counts(&self) -> SlotCounts {
        self.counts
    }

    /// Number of elements that take a dynamic offset.
    pub fn dynamic_count(&self) -> usize {
        self.dynamic_count
    }
}

/// Per-set slot bases of a pipeline: entry `i` is the sum of the slot counts
/// of layouts `0..i`.
pub fn slot_bases(layouts: &[Arc<ResourceLayout>]) -> Vec<SlotCounts> {
    let mut base = SlotCounts::default();
    layouts
        .iter()
        .map(|layout| {
            let current = base;
            base = base.add(layout.counts());
            current
        })
        .collect()
}

// ============================================================================
// ResourceLayout
// ============================================================================

/// A compiled resource layout.
///
/// Holds no native objects; disposing it only marks it unusable.
pub struct ResourceLayout {
    core: ResourceCore,
    description: ResourceLayoutDescription,
    table: SlotTable,
}

impl ResourceLayout {
    pub(crate) fn new(core: ResourceCore, description: ResourceLayoutDescription) -> Self {
        let table = SlotTable::build(&description);
        log::debug!(
            "ResourceLayout {:?}: {} elements compiled to {:?}",
            description.label,
            description.elements.len(),
            table.counts()
        );
        Self {
            core,
            description,
            table,
        }
    }

    /// Device-unique id.
    pub fn id(&self) -> ResourceId {
        self.core.id()
    }

    /// The description this layout was compiled from.
    pub fn description(&self) -> &ResourceLayoutDescription {
        &self.description
    }

    /// Get the layout label, if set.
    pub fn label(&self) -> Option<&str> {
        self.description.label.as_deref()
    }

    /// Compiled slot table.
    pub fn table(&self) -> &SlotTable {
        &self.table
    }

    /// Per-element binding information.
    pub fn bindings(&self) -> &[ResourceBindingInfo] {
        self.table.bindings()
    }

    /// Slots used per slot space.
    pub fn counts(&self) -> SlotCounts {
        self.table.counts()
    }

    /// Number of elements that take a dynamic offset.
    pub fn dynamic_count(&self) -> usize {
        self.table.dynamic_count()
    }

    /// Returns true if sets of `other` can be bound where this layout is
    /// expected: same kinds, stages, options and slots, element by element.
    pub fn is_compatible(&self, other: &ResourceLayout) -> bool {
        self.id() == other.id() || self.table.bindings == other.table.bindings
    }

    /// Returns true once [`dispose`](Self::dispose) has run.
    pub fn is_disposed(&self) -> bool {
        self.core.is_disposed()
    }

    /// Mark the layout disposed.
    pub fn dispose(&self) {
        self.core.mark_disposed();
    }

    pub(crate) fn check_alive(&self) -> GraphicsResult<()> {
        self.core.check("resource layout", self.label())
    }
}

impl DeviceResource for ResourceLayout {
    fn dispose(&self) {
        ResourceLayout::dispose(self);
    }

    fn is_disposed(&self) -> bool {
        ResourceLayout::is_disposed(self)
    }
}

impl std::fmt::Debug for ResourceLayout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceLayout")
            .field("id", &self.id())
            .field("counts", &self.counts())
            .field("label", &self.description.label)
            .finish()
    }
}

// ============================================================================
// ResourceSet
// ============================================================================

/// Resources matching a layout, position by position. Immutable.
///
/// A set keeps its resources alive as `Arc`s but does not stop them from
/// being disposed.
pub struct ResourceSet {
    core: ResourceCore,
    label: Option<String>,
    layout: Arc<ResourceLayout>,
    resources: Vec<BindableResource>,
}

impl ResourceSet {
    pub(crate) fn new(
        core: ResourceCore,
        label: Option<String>,
        layout: Arc<ResourceLayout>,
        resources: Vec<BindableResource>,
    ) -> Self {
        Self {
            core,
            label,
            layout,
            resources,
        }
    }

    /// Checks that `resources` match `layout` element by element.
    pub(crate) fn validate(layout: &ResourceLayout, resources: &[BindableResource]) -> GraphicsResult<()> {
        let bindings = layout.bindings();
        if resources.len() != bindings.len() {
            return Err(GraphicsError::usage(format!(
                "resource set has {} resources but layout {:?} has {} elements",
                resources.len(),
                layout.label(),
                bindings.len()
            )));
        }

        for (index, (binding, resource)) in bindings.iter().zip(resources).enumerate() {
            if binding.slot.is_none() {
                continue;
            }
            check_element(index, binding.kind, resource)?;
        }
        Ok(())
    }

    /// Device-unique id.
    pub fn id(&self) -> ResourceId {
        self.core.id()
    }

    /// Get the set label, if set.
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// The layout the set was created against.
    pub fn layout(&self) -> &Arc<ResourceLayout> {
        &self.layout
    }

    /// Resources in layout order.
    pub fn resources(&self) -> &[BindableResource] {
        &self.resources
    }

    /// Returns true once [`dispose`](Self::dispose) has run.
    pub fn is_disposed(&self) -> bool {
        self.core.is_disposed()
    }

    /// Mark the set disposed. Its resources are untouched.
    pub fn dispose(&self) {
        self.core.mark_disposed();
    }

    pub(crate) fn check_alive(&self) -> GraphicsResult<()> {
        self.core.check("resource set", self.label())?;
        self.layout.check_alive()
    }
}

fn check_element(index: usize, kind: ResourceKind, resource: &BindableResource) -> GraphicsResult<()> {
    let mismatch = || {
        GraphicsError::usage(format!(
            "resource set element {index} expects {kind:?}, got {}",
            resource.variant_name()
        ))
    };

    match kind {
        ResourceKind::UniformBuffer
        | ResourceKind::StructuredBufferReadOnly
        | ResourceKind::StructuredBufferReadWrite => {
            let range = resource.as_buffer_range().ok_or_else(mismatch)?;
            let required = match kind {
                ResourceKind::UniformBuffer => BufferUsage::UNIFORM,
                ResourceKind::StructuredBufferReadOnly => {
                    BufferUsage::STRUCTURED_READ_ONLY | BufferUsage::STRUCTURED_READ_WRITE
                }
                _ => BufferUsage::STRUCTURED_READ_WRITE,
            };
            if !range.buffer.usage().intersects(required) {
                return Err(GraphicsError::usage(format!(
                    "resource set element {index} ({kind:?}) needs a buffer with {required:?} \
                     usage, got {:?}",
                    range.buffer.usage()
                )));
            }
            if range.offset + range.size > range.buffer.size() {
                return Err(GraphicsError::usage(format!(
                    "resource set element {index}: range {}+{} exceeds buffer size {}",
                    range.offset,
                    range.size,
                    range.buffer.size()
                )));
            }
        }
        ResourceKind::TextureReadOnly | ResourceKind::TextureReadWrite => {
            let texture = match resource {
                BindableResource::Texture(texture) => texture,
                BindableResource::TextureView(view) => view.target(),
                _ => return Err(mismatch()),
            };
            let required = if kind == ResourceKind::TextureReadOnly {
                TextureUsage::SAMPLED
            } else {
                TextureUsage::STORAGE
            };
            if !texture.usage().contains(required) {
                return Err(GraphicsError::usage(format!(
                    "resource set element {index} ({kind:?}) needs a texture with {required:?} \
                     usage, got {:?}",
                    texture.usage()
                )));
            }
        }
        ResourceKind::Sampler => {
            if !matches!(resource, BindableResource::Sampler(_)) {
                return Err(mismatch());
            }
        }
    }
    Ok(())
}

impl DeviceResource for ResourceSet {
    fn dispose(&self) {
        ResourceSet::dispose(self);
    }

    fn is_disposed(&self) -> bool {
        ResourceSet::is_disposed(self)
    }
}

impl std::fmt::Debug for ResourceSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceSet")
            .field("id", &self.id())
            .field("layout", &self.layout.id())
            .field("resources", &self.resources.len())
            .field("label", &self.label)
            .finish()
    }
}

static_assertions::assert_impl_all!(ResourceLayout: Send, Sync);
static_assertions::assert_impl_all!(ResourceSet: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ResourceLayoutElementDescription as Element, ResourceLayoutElementOptions};

    fn element(kind: ResourceKind) -> Element {
        Element::new("x", kind, ShaderStages::FRAGMENT)
    }

    #[test]
    fn test_slots_follow_declaration_order_per_class() {
        let description = ResourceLayoutDescription::new(vec![
            element(ResourceKind::UniformBuffer),
            element(ResourceKind::TextureReadOnly),
            element(ResourceKind::Sampler),
            element(ResourceKind::StructuredBufferReadOnly),
            element(ResourceKind::UniformBuffer),
            element(ResourceKind::TextureReadWrite),
            element(ResourceKind::StructuredBufferReadWrite),
        ]);
        let table = SlotTable::build(&description);
        let slots: Vec<_> = table.bindings().iter().map(|b| b.slot).collect();
        assert_eq!(
            slots,
            vec![Some(0), Some(0), Some(0), Some(1), Some(1), Some(0), Some(1)]
        );
        assert_eq!(
            table.counts(),
            SlotCounts {
                uniform_buffers: 2,
                read_views: 2,
                read_write_views: 2,
                samplers: 1,
            }
        );
    }

    #[test]
    fn test_unused_elements_take_no_slot() {
        let description = ResourceLayoutDescription::new(vec![
            element(ResourceKind::TextureReadOnly)
                .with_options(ResourceLayoutElementOptions::UNUSED),
            element(ResourceKind::TextureReadOnly),
        ]);
        let table = SlotTable::build(&description);
        assert_eq!(table.bindings()[0].slot, None);
        assert_eq!(table.bindings()[1].slot, Some(0));
        assert_eq!(table.counts().read_views, 1);
    }

    #[test]
    fn test_names_and_stages_do_not_move_slots() {
        let a = ResourceLayoutDescription::new(vec![
            Element::new("a", ResourceKind::UniformBuffer, ShaderStages::VERTEX),
            Element::new("b", ResourceKind::Sampler, ShaderStages::FRAGMENT),
        ]);
        let b = ResourceLayoutDescription::new(vec![
            Element::new("other", ResourceKind::UniformBuffer, ShaderStages::ALL_GRAPHICS),
            Element::new("names", ResourceKind::Sampler, ShaderStages::COMPUTE),
        ]);
        let slots = |d: &ResourceLayoutDescription| -> Vec<_> {
            SlotTable::build(d).bindings().iter().map(|b| b.slot).collect()
        };
        assert_eq!(slots(&a), slots(&b));
        assert_eq!(SlotTable::build(&a), SlotTable::build(&a.clone()));
    }

    #[test]
    fn test_dynamic_count() {
        let description = ResourceLayoutDescription::new(vec![
            element(ResourceKind::UniformBuffer)
                .with_options(ResourceLayoutElementOptions::DYNAMIC_BINDING),
            element(ResourceKind::UniformBuffer),
            element(ResourceKind::StructuredBufferReadOnly)
                .with_options(ResourceLayoutElementOptions::DYNAMIC_BINDING),
        ]);
        assert_eq!(SlotTable::build(&description).dynamic_count(), 2);
    }

    #[test]
    fn test_slot_counts_add() {
        let a = SlotCounts {
            uniform_buffers: 1,
            read_views: 2,
            read_write_views: 0,
            samplers: 1,
        };
        assert_eq!(a.add(a).read_views, 4);
        assert_eq!(a.get(SlotClass::Sampler), 1);
    }
}
