//! Resource-set activation and read/write hazard tracking.
//!
//! A resource set is not bound to native slots when the caller binds it: it
//! is recorded as *pending* and activated by the pre-draw (or pre-dispatch)
//! flush, which walks the pending and invalidated sets once, in set order.
//!
//! The native model forbids a resource from being visible through a read
//! view and a read-write view at the same time. Binding one kind of view
//! therefore unbinds every slot that exposes the same resource through the
//! other kind. When such a slot belonged to another set, that set is marked
//! *invalidated* so the next flush binds it again; it is never re-walked
//! eagerly. Conflicts inside the set being activated simply unbind (the
//! later element wins).

use std::collections::HashMap;
use std::sync::Arc;

use crate::backend::{NativeCommand, NativeView};
use crate::error::{GraphicsError, GraphicsResult};
use crate::resources::{ResourceBindingInfo, ResourceId, ResourceSet, SlotCounts};
use crate::types::{BindableResource, ResourceKind, ShaderStages};

/// Alignment of uniform buffer range offsets.
pub const UNIFORM_OFFSET_ALIGNMENT: u64 = 16;
/// Alignment of uniform buffer offsets that include a dynamic offset.
pub const DYNAMIC_UNIFORM_OFFSET_ALIGNMENT: u64 = 256;

/// Which set of slots a resource set was bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindPoint {
    /// Graphics stages.
    Graphics,
    /// The compute stage.
    Compute,
}

impl BindPoint {
    fn stage_mask(self) -> ShaderStages {
        match self {
            Self::Graphics => ShaderStages::ALL_GRAPHICS,
            Self::Compute => ShaderStages::COMPUTE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum ViewClass {
    Read,
    ReadWrite,
}

impl ViewClass {
    fn opposite(self) -> Self {
        match self {
            Self::Read => Self::ReadWrite,
            Self::ReadWrite => Self::Read,
        }
    }

    fn command(self, stage: ShaderStages, slot: u32, view: Option<NativeView>) -> NativeCommand {
        match self {
            Self::Read => NativeCommand::SetReadView { stage, slot, view },
            Self::ReadWrite => NativeCommand::SetReadWriteView { stage, slot, view },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct SlotKey {
    class: ViewClass,
    stage: ShaderStages,
    slot: u32,
}

type Owner = (BindPoint, usize);

#[derive(Debug, Clone, Copy)]
struct SlotEntry {
    resource: ResourceId,
    owner: Owner,
}

/// Activation state of a bound set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetState {
    /// Bound by the caller, not yet activated.
    Pending,
    /// Activated; every slot it owns is live.
    Clean,
    /// Activated, then partly unbound by a conflicting view.
    Invalidated,
}

#[derive(Debug, Clone)]
struct BoundSet {
    set: Arc<ResourceSet>,
    offsets: Vec<u32>,
    state: SetState,
}

/// Bound resource sets and the view slots they occupy.
#[derive(Debug, Default)]
pub struct BindingState {
    graphics: Vec<Option<BoundSet>>,
    compute: Vec<Option<BoundSet>>,
    views: HashMap<SlotKey, SlotEntry>,
    reverse: HashMap<(ViewClass, ResourceId), Vec<SlotKey>>,
}

impl BindingState {
    /// Create an empty binding state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget every binding.
    pub fn clear(&mut self) {
        self.graphics.clear();
        self.compute.clear();
        self.views.clear();
        self.reverse.clear();
    }

    fn sets_mut(&mut self, bind_point: BindPoint) -> &mut Vec<Option<BoundSet>> {
        match bind_point {
            BindPoint::Graphics => &mut self.graphics,
            BindPoint::Compute => &mut self.compute,
        }
    }

    fn sets(&self, bind_point: BindPoint) -> &[Option<BoundSet>] {
        match bind_point {
            BindPoint::Graphics => &self.graphics,
            BindPoint::Compute => &self.compute,
        }
    }

    /// Record `set` at `index`; it is activated by the next flush.
    pub fn bind_set(&mut self, bind_point: BindPoint, index: usize, set: Arc<ResourceSet>, offsets: &[u32]) {
        let sets = self.sets_mut(bind_point);
        if sets.len() <= index {
            sets.resize(index + 1, None);
        }
        sets[index] = Some(BoundSet {
            set,
            offsets: offsets.to_vec(),
            state: SetState::Pending,
        });
    }

    /// A pipeline change: drop sets beyond `layout_count` and re-activate
    /// the rest, since their slot bases may have moved.
    pub fn invalidate_all(&mut self, bind_point: BindPoint, layout_count: usize) {
        let sets = self.sets_mut(bind_point);
        sets.truncate(layout_count);
        for bound in sets.iter_mut().flatten() {
            if bound.state == SetState::Clean {
                bound.state = SetState::Invalidated;
            }
        }
    }

    /// Activation state of the set at `index`, if one is bound.
    pub fn set_state(&self, bind_point: BindPoint, index: usize) -> Option<SetState> {
        self.sets(bind_point)
            .get(index)
            .and_then(|slot| slot.as_ref())
            .map(|bound| bound.state)
    }

    /// Activate every pending or invalidated set, in set order, single pass.
    ///
    /// Every set index below `bases.len()` must be bound.
    pub fn flush(
        &mut self,
        bind_point: BindPoint,
        bases: &[SlotCounts],
        out: &mut Vec<NativeCommand>,
    ) -> GraphicsResult<()> {
        for (index, base) in bases.iter().enumerate() {
            let (set, offsets) = match self.sets(bind_point).get(index).and_then(|slot| slot.as_ref()) {
                None => {
                    return Err(GraphicsError::usage(format!(
                        "resource set {index} required by the pipeline is not bound"
                    )));
                }
                Some(bound) if bound.state == SetState::Clean => continue,
                Some(bound) => (Arc::clone(&bound.set), bound.offsets.clone()),
            };
            self.activate(bind_point, index, &set, &offsets, *base, out)?;
            if let Some(Some(bound)) = self.sets_mut(bind_point).get_mut(index) {
                bound.state = SetState::Clean;
            }
        }
        Ok(())
    }

    /// Bind every element of `set` to its slots.
    pub fn activate(
        &mut self,
        bind_point: BindPoint,
        index: usize,
        set: &ResourceSet,
        dynamic_offsets: &[u32],
        base: SlotCounts,
        out: &mut Vec<NativeCommand>,
    ) -> GraphicsResult<()> {
        set.check_alive()?;
        let layout = set.layout();
        if dynamic_offsets.len() != layout.dynamic_count() {
            return Err(GraphicsError::usage(format!(
                "resource set {index} takes {} dynamic offsets, got {}",
                layout.dynamic_count(),
                dynamic_offsets.len()
            )));
        }

        let owner = (bind_point, index);
        let mut offsets = dynamic_offsets.iter().copied();
        for (binding, resource) in layout.bindings().iter().zip(set.resources()) {
            let Some(slot) = binding.slot else {
                continue;
            };
            let dynamic_offset = if binding.dynamic {
                u64::from(offsets.next().unwrap_or_default())
            } else {
                0
            };
            let stages = binding.stages & bind_point.stage_mask();
            self.activate_element(binding, resource, slot, stages, dynamic_offset, base, owner, out)?;
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn activate_element(
        &mut self,
        binding: &ResourceBindingInfo,
        resource: &BindableResource,
        slot: u32,
        stages: ShaderStages,
        dynamic_offset: u64,
        base: SlotCounts,
        owner: Owner,
        out: &mut Vec<NativeCommand>,
    ) -> GraphicsResult<()> {
        match binding.kind {
            ResourceKind::UniformBuffer => {
                let range = resource
                    .as_buffer_range()
                    .ok_or_else(|| GraphicsError::usage("uniform buffer element holds no buffer"))?;
                let offset = range.offset + dynamic_offset;
                let alignment = if binding.dynamic {
                    DYNAMIC_UNIFORM_OFFSET_ALIGNMENT
                } else {
                    UNIFORM_OFFSET_ALIGNMENT
                };
                if offset % alignment != 0 {
                    return Err(GraphicsError::usage(format!(
                        "uniform buffer offset {offset} is not {alignment}-byte aligned"
                    )));
                }
                check_range(offset, range.size, range.buffer.size())?;
                let buffer = range.buffer.native()?;
                for stage in each_stage(stages) {
                    out.push(NativeCommand::SetUniformBuffer {
                        stage,
                        slot: base.uniform_buffers + slot,
                        buffer: Some(buffer),
                        offset,
                        size: range.size,
                    });
                }
            }
            ResourceKind::StructuredBufferReadOnly | ResourceKind::StructuredBufferReadWrite => {
                let range = resource
                    .as_buffer_range()
                    .ok_or_else(|| GraphicsError::usage("structured buffer element holds no buffer"))?;
                let offset = range.offset + dynamic_offset;
                check_range(offset, range.size, range.buffer.size())?;
                let read_write = binding.kind == ResourceKind::StructuredBufferReadWrite;
                let view = range.buffer.range_view(offset, range.size, read_write)?;
                let (class, slot) = if read_write {
                    (ViewClass::ReadWrite, base.read_write_views + slot)
                } else {
                    (ViewClass::Read, base.read_views + slot)
                };
                self.bind_view(class, range.buffer.id(), view, stages, slot, owner, out);
            }
            ResourceKind::TextureReadOnly | ResourceKind::TextureReadWrite => {
                let read_write = binding.kind == ResourceKind::TextureReadWrite;
                let (id, view) = match resource {
                    BindableResource::Texture(texture) if read_write => {
                        (texture.id(), texture.full_read_write_view()?)
                    }
                    BindableResource::Texture(texture) => (texture.id(), texture.full_read_view()?),
                    BindableResource::TextureView(view) if read_write => {
                        (view.target().id(), view.read_write_view()?)
                    }
                    BindableResource::TextureView(view) => (view.target().id(), view.read_view()?),
                    other => {
                        return Err(GraphicsError::usage(format!(
                            "texture element holds a {}",
                            other.variant_name()
                        )));
                    }
                };
                let (class, slot) = if read_write {
                    (ViewClass::ReadWrite, base.read_write_views + slot)
                } else {
                    (ViewClass::Read, base.read_views + slot)
                };
                self.bind_view(class, id, view, stages, slot, owner, out);
            }
            ResourceKind::Sampler => {
                let BindableResource::Sampler(sampler) = resource else {
                    return Err(GraphicsError::usage(format!(
                        "sampler element holds a {}",
                        resource.variant_name()
                    )));
                };
                let native = sampler.native()?;
                for stage in each_stage(stages) {
                    out.push(NativeCommand::SetSampler {
                        stage,
                        slot: base.samplers + slot,
                        sampler: native,
                    });
                }
            }
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn bind_view(
        &mut self,
        class: ViewClass,
        resource: ResourceId,
        view: NativeView,
        stages: ShaderStages,
        slot: u32,
        owner: Owner,
        out: &mut Vec<NativeCommand>,
    ) {
        self.unbind_resource(class.opposite(), resource, Some(owner), out);

        for stage in each_stage(stages) {
            let key = SlotKey { class, stage, slot };
            let previous = self.views.insert(key, SlotEntry { resource, owner });
            if let Some(previous) = previous {
                if previous.resource != resource {
                    self.forget_reverse(class, previous.resource, key);
                }
            }
            let keys = self.reverse.entry((class, resource)).or_default();
            if !keys.contains(&key) {
                keys.push(key);
            }
            out.push(class.command(stage, slot, Some(view)));
        }
    }

    /// Unbind `resource` from every `class` slot. Owners other than `current`
    /// are invalidated.
    fn unbind_resource(
        &mut self,
        class: ViewClass,
        resource: ResourceId,
        current: Option<Owner>,
        out: &mut Vec<NativeCommand>,
    ) {
        let Some(keys) = self.reverse.remove(&(class, resource)) else {
            return;
        };
        for key in keys {
            let Some(entry) = self.views.remove(&key) else {
                continue;
            };
            if Some(entry.owner) != current {
                self.invalidate(entry.owner);
            }
            out.push(class.command(key.stage, key.slot, None));
        }
    }

    fn forget_reverse(&mut self, class: ViewClass, resource: ResourceId, key: SlotKey) {
        if let Some(keys) = self.reverse.get_mut(&(class, resource)) {
            keys.retain(|k| *k != key);
            if keys.is_empty() {
                self.reverse.remove(&(class, resource));
            }
        }
    }

    fn invalidate(&mut self, (bind_point, index): Owner) {
        if let Some(Some(bound)) = self.sets_mut(bind_point).get_mut(index) {
            if bound.state == SetState::Clean {
                log::trace!("BindingState: {bind_point:?} set {index} invalidated by a conflicting view");
                bound.state = SetState::Invalidated;
            }
        }
    }

    /// Unbind `resources` from every read view, invalidating their owners.
    /// Used when the resources become render targets.
    pub fn unbind_reads(&mut self, resources: &[ResourceId], out: &mut Vec<NativeCommand>) {
        for resource in resources {
            self.unbind_resource(ViewClass::Read, *resource, None, out);
        }
    }

    /// Number of read-view slots currently exposing `resource`.
    pub fn read_bindings(&self, resource: ResourceId) -> usize {
        self.reverse
            .get(&(ViewClass::Read, resource))
            .map_or(0, Vec::len)
    }

    /// Number of read-write-view slots currently exposing `resource`.
    pub fn read_write_bindings(&self, resource: ResourceId) -> usize {
        self.reverse
            .get(&(ViewClass::ReadWrite, resource))
            .map_or(0, Vec::len)
    }
}

fn each_stage(stages: ShaderStages) -> impl Iterator<Item = ShaderStages> {
    ShaderStages::EACH
        .into_iter()
        .filter(move |stage| stages.contains(*stage))
}

fn check_range(offset: u64, size: u64, buffer_size: u64) -> GraphicsResult<()> {
    if offset + size > buffer_size {
        return Err(GraphicsError::usage(format!(
            "range {offset}+{size} exceeds buffer size {buffer_size}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::test_device;
    use crate::resources::Texture;
    use crate::types::{
        BufferDescriptor, BufferRange, BufferUsage, ResourceLayoutDescription,
        ResourceLayoutElementDescription as Element, ResourceLayoutElementOptions,
        ResourceSetDescriptor, TextureDescriptor, TextureFormat, TextureUsage,
    };
    use crate::GraphicsDevice;

    fn storage_texture(device: &Arc<GraphicsDevice>) -> Arc<Texture> {
        device
            .create_texture(&TextureDescriptor::new_2d(
                16,
                16,
                TextureFormat::Rgba8Unorm,
                TextureUsage::SAMPLED | TextureUsage::STORAGE,
            ))
            .unwrap()
    }

    fn single_set(
        device: &Arc<GraphicsDevice>,
        kind: ResourceKind,
        stages: ShaderStages,
        resource: BindableResource,
    ) -> Arc<ResourceSet> {
        let layout = device
            .create_resource_layout(&ResourceLayoutDescription::new(vec![Element::new(
                "t", kind, stages,
            )]))
            .unwrap();
        device
            .create_resource_set(&ResourceSetDescriptor::new(layout, vec![resource]))
            .unwrap()
    }

    fn count_unbinds(commands: &[NativeCommand]) -> usize {
        commands
            .iter()
            .filter(|c| {
                matches!(
                    c,
                    NativeCommand::SetReadView { view: None, .. }
                        | NativeCommand::SetReadWriteView { view: None, .. }
                )
            })
            .count()
    }

    #[test]
    fn test_read_write_bind_unbinds_reads_and_invalidates_owner() {
        let device = test_device();
        let texture = storage_texture(&device);
        let read = single_set(
            &device,
            ResourceKind::TextureReadOnly,
            ShaderStages::FRAGMENT,
            texture.clone().into(),
        );
        let write = single_set(
            &device,
            ResourceKind::TextureReadWrite,
            ShaderStages::FRAGMENT,
            texture.clone().into(),
        );

        let mut state = BindingState::new();
        let mut out = Vec::new();
        let base = SlotCounts::default();
        state.bind_set(BindPoint::Graphics, 0, read, &[]);
        state.flush(BindPoint::Graphics, &[base], &mut out).unwrap();
        assert_eq!(state.read_bindings(texture.id()), 1);

        state.bind_set(BindPoint::Graphics, 1, write, &[]);
        out.clear();
        state
            .flush(BindPoint::Graphics, &[base, base.add(base)], &mut out)
            .unwrap();
        assert_eq!(state.read_bindings(texture.id()), 0);
        assert_eq!(state.read_write_bindings(texture.id()), 1);
        assert_eq!(count_unbinds(&out), 1);
        assert_eq!(state.set_state(BindPoint::Graphics, 0), Some(SetState::Invalidated));
        assert_eq!(state.set_state(BindPoint::Graphics, 1), Some(SetState::Clean));
    }

    #[test]
    fn test_conflict_inside_one_set_keeps_it_clean() {
        let device = test_device();
        let texture = storage_texture(&device);
        let layout = device
            .create_resource_layout(&ResourceLayoutDescription::new(vec![
                Element::new("r", ResourceKind::TextureReadOnly, ShaderStages::COMPUTE),
                Element::new("w", ResourceKind::TextureReadWrite, ShaderStages::COMPUTE),
            ]))
            .unwrap();
        let set = device
            .create_resource_set(&ResourceSetDescriptor::new(
                layout,
                vec![texture.clone().into(), texture.clone().into()],
            ))
            .unwrap();

        let mut state = BindingState::new();
        let mut out = Vec::new();
        state.bind_set(BindPoint::Compute, 0, set, &[]);
        state
            .flush(BindPoint::Compute, &[SlotCounts::default()], &mut out)
            .unwrap();
        assert_eq!(state.read_bindings(texture.id()), 0);
        assert_eq!(state.read_write_bindings(texture.id()), 1);
        assert_eq!(state.set_state(BindPoint::Compute, 0), Some(SetState::Clean));
    }

    #[test]
    fn test_overwritten_slot_drops_stale_reverse_entry() {
        let device = test_device();
        let a = storage_texture(&device);
        let b = storage_texture(&device);
        let set_a = single_set(&device, ResourceKind::TextureReadOnly, ShaderStages::FRAGMENT, a.clone().into());
        let set_b = single_set(&device, ResourceKind::TextureReadOnly, ShaderStages::FRAGMENT, b.clone().into());

        let mut state = BindingState::new();
        let mut out = Vec::new();
        let bases = [SlotCounts::default()];
        state.bind_set(BindPoint::Graphics, 0, set_a, &[]);
        state.flush(BindPoint::Graphics, &bases, &mut out).unwrap();
        state.bind_set(BindPoint::Graphics, 0, set_b, &[]);
        state.flush(BindPoint::Graphics, &bases, &mut out).unwrap();
        assert_eq!(state.read_bindings(a.id()), 0);
        assert_eq!(state.read_bindings(b.id()), 1);
    }

    #[test]
    fn test_dynamic_uniform_offset_alignment() {
        let device = test_device();
        let buffer = device
            .create_buffer(&BufferDescriptor::new(1024, BufferUsage::UNIFORM | BufferUsage::DYNAMIC))
            .unwrap();
        let layout = device
            .create_resource_layout(&ResourceLayoutDescription::new(vec![Element::new(
                "u",
                ResourceKind::UniformBuffer,
                ShaderStages::VERTEX,
            )
            .with_options(ResourceLayoutElementOptions::DYNAMIC_BINDING)]))
            .unwrap();
        let set = device
            .create_resource_set(&ResourceSetDescriptor::new(
                layout,
                vec![BufferRange::new(buffer, 0, 256).into()],
            ))
            .unwrap();

        let mut state = BindingState::new();
        let mut out = Vec::new();
        let base = SlotCounts::default();
        assert!(state
            .activate(BindPoint::Graphics, 0, &set, &[256], base, &mut out)
            .is_ok());
        assert!(matches!(
            out.last(),
            Some(NativeCommand::SetUniformBuffer { offset: 256, .. })
        ));
        assert!(matches!(
            state.activate(BindPoint::Graphics, 0, &set, &[16], base, &mut out),
            Err(GraphicsError::Usage(_))
        ));
        assert!(matches!(
            state.activate(BindPoint::Graphics, 0, &set, &[], base, &mut out),
            Err(GraphicsError::Usage(_))
        ));
    }

    #[test]
    fn test_unbound_required_set_is_an_error() {
        let mut state = BindingState::new();
        let mut out = Vec::new();
        assert!(matches!(
            state.flush(BindPoint::Graphics, &[SlotCounts::default()], &mut out),
            Err(GraphicsError::Usage(_))
        ));
    }
}
