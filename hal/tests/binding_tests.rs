//! Slot allocation and resource-set activation through the public API.
//!
//! # Test Categories
//!
//! - **Slot Tests**: layouts compile to deterministic per-kind slots
//! - **Hazard Tests**: a resource is never readable and writable at once
//! - **Dynamic Offset Tests**: offset counts and alignment are checked at bind time

mod common;

use std::sync::Arc;

use rstest::rstest;

use common::TestContext;
use redlilium_hal::resources::{slot_bases, SlotCounts};
use redlilium_hal::{
    BindPoint, BindableResource, BufferRange, BufferUsage, GraphicsError, ResourceKind,
    ResourceLayoutDescription, ResourceLayoutElementDescription, ResourceLayoutElementOptions,
    SamplerDescriptor, SetState, ShaderStages, Texture, TextureDescriptor, TextureFormat,
    TextureUsage,
};

fn storage_texture(ctx: &TestContext) -> Arc<Texture> {
    ctx.device
        .create_texture(&TextureDescriptor::new_2d(
            16,
            16,
            TextureFormat::Rgba8Unorm,
            TextureUsage::SAMPLED | TextureUsage::STORAGE,
        ))
        .unwrap()
}

// ============================================================================
// Slot Tests
// ============================================================================

#[rstest]
#[case::vertex_only(ShaderStages::VERTEX)]
#[case::fragment_only(ShaderStages::FRAGMENT)]
#[case::all_graphics(ShaderStages::ALL_GRAPHICS)]
fn test_slots_depend_only_on_kind_sequence(#[case] stages: ShaderStages) {
    let ctx = TestContext::new();
    let kinds = [
        ResourceKind::UniformBuffer,
        ResourceKind::TextureReadOnly,
        ResourceKind::Sampler,
        ResourceKind::StructuredBufferReadOnly,
        ResourceKind::UniformBuffer,
        ResourceKind::TextureReadWrite,
        ResourceKind::StructuredBufferReadWrite,
    ];
    let named: Vec<_> = kinds
        .iter()
        .enumerate()
        .map(|(i, &kind)| (format!("element_{i}"), kind))
        .collect();
    let elements: Vec<_> = named
        .iter()
        .map(|(name, kind)| (name.as_str(), *kind, stages))
        .collect();
    let layout = ctx.layout(&elements);
    let again = ctx.layout(&elements);

    let slots: Vec<_> = layout.bindings().iter().map(|b| b.slot).collect();
    assert_eq!(
        slots,
        vec![Some(0), Some(0), Some(0), Some(1), Some(1), Some(0), Some(1)]
    );
    assert_eq!(layout.bindings(), again.bindings());
    assert_eq!(
        layout.counts(),
        SlotCounts {
            uniform_buffers: 2,
            read_views: 2,
            read_write_views: 2,
            samplers: 1,
        }
    );
}

#[test]
fn test_unused_elements_keep_position_but_take_no_slot() {
    let ctx = TestContext::new();
    let layout = ctx
        .device
        .create_resource_layout(&ResourceLayoutDescription::new(vec![
            ResourceLayoutElementDescription::new("a", ResourceKind::TextureReadOnly, ShaderStages::FRAGMENT),
            ResourceLayoutElementDescription::new("pad", ResourceKind::TextureReadOnly, ShaderStages::empty())
                .with_options(ResourceLayoutElementOptions::UNUSED),
            ResourceLayoutElementDescription::new("b", ResourceKind::TextureReadOnly, ShaderStages::FRAGMENT),
        ]))
        .unwrap();
    let slots: Vec<_> = layout.bindings().iter().map(|b| b.slot).collect();
    assert_eq!(slots, vec![Some(0), None, Some(1)]);
    assert_eq!(layout.counts().read_views, 2);
}

#[test]
fn test_pipeline_slot_bases_concatenate_sets() {
    let ctx = TestContext::new();
    let first = ctx.layout(&[
        ("globals", ResourceKind::UniformBuffer, ShaderStages::VERTEX),
        ("shadow", ResourceKind::TextureReadOnly, ShaderStages::FRAGMENT),
    ]);
    let second = ctx.layout(&[
        ("material", ResourceKind::UniformBuffer, ShaderStages::FRAGMENT),
        ("albedo", ResourceKind::TextureReadOnly, ShaderStages::FRAGMENT),
        ("linear", ResourceKind::Sampler, ShaderStages::FRAGMENT),
    ]);
    let pipeline = ctx.graphics_pipeline(vec![Arc::clone(&first), Arc::clone(&second)]);

    assert_eq!(pipeline.slot_bases(), slot_bases(&[first, second]).as_slice());
    assert_eq!(pipeline.slot_bases()[0], SlotCounts::default());
    assert_eq!(
        pipeline.slot_bases()[1],
        SlotCounts {
            uniform_buffers: 1,
            read_views: 1,
            read_write_views: 0,
            samplers: 0,
        }
    );
}

#[test]
fn test_duplicate_element_names_are_rejected() {
    let ctx = TestContext::new();
    let result = ctx.device.create_resource_layout(&ResourceLayoutDescription::new(vec![
        ResourceLayoutElementDescription::new("x", ResourceKind::UniformBuffer, ShaderStages::VERTEX),
        ResourceLayoutElementDescription::new("x", ResourceKind::Sampler, ShaderStages::VERTEX),
    ]));
    assert!(matches!(result, Err(GraphicsError::InvalidParameter(_))));
}

// ============================================================================
// Hazard Tests
// ============================================================================

#[test]
fn test_read_and_write_views_are_exclusive_across_sets() {
    let ctx = TestContext::new();
    let texture = storage_texture(&ctx);
    let write_layout = ctx.layout(&[("out", ResourceKind::TextureReadWrite, ShaderStages::COMPUTE)]);
    let read_layout = ctx.layout(&[("in", ResourceKind::TextureReadOnly, ShaderStages::COMPUTE)]);
    let pipeline = ctx.compute_pipeline(vec![Arc::clone(&write_layout), Arc::clone(&read_layout)]);
    let write_set = ctx.set(&write_layout, vec![BindableResource::Texture(Arc::clone(&texture))]);
    let read_set = ctx.set(&read_layout, vec![BindableResource::Texture(Arc::clone(&texture))]);

    let mut list = ctx.device.create_command_list().unwrap();
    list.begin().unwrap();
    list.set_pipeline(&pipeline).unwrap();
    list.set_compute_resource_set(0, &write_set, &[]).unwrap();
    list.set_compute_resource_set(1, &read_set, &[]).unwrap();
    assert_eq!(list.resource_set_state(BindPoint::Compute, 0), Some(SetState::Pending));

    list.dispatch(1, 1, 1).unwrap();
    // Set 1 activates last and takes the texture away from set 0
    assert_eq!(list.read_bindings(texture.id()), 1);
    assert_eq!(list.read_write_bindings(texture.id()), 0);
    assert_eq!(list.resource_set_state(BindPoint::Compute, 0), Some(SetState::Invalidated));
    assert_eq!(list.resource_set_state(BindPoint::Compute, 1), Some(SetState::Clean));

    // Set 0 is re-activated first, then set 1 again in the same pass
    list.dispatch(1, 1, 1).unwrap();
    assert_eq!(list.read_bindings(texture.id()), 1);
    assert_eq!(list.read_write_bindings(texture.id()), 0);
    assert_eq!(list.resource_set_state(BindPoint::Compute, 0), Some(SetState::Invalidated));
    assert_eq!(list.resource_set_state(BindPoint::Compute, 1), Some(SetState::Clean));

    // Rebinding set 1 with a different texture leaves set 0 the only user
    let other = storage_texture(&ctx);
    let other_set = ctx.set(&read_layout, vec![BindableResource::Texture(other)]);
    list.set_compute_resource_set(1, &other_set, &[]).unwrap();
    list.dispatch(1, 1, 1).unwrap();
    assert_eq!(list.read_bindings(texture.id()), 0);
    assert_eq!(list.read_write_bindings(texture.id()), 1);
    assert_eq!(list.resource_set_state(BindPoint::Compute, 0), Some(SetState::Clean));

    list.end().unwrap();
    ctx.device.submit_commands(&mut list, None).unwrap();
    assert_eq!(ctx.stats().dispatches, 3);
}

#[test]
fn test_binding_a_framebuffer_unbinds_its_textures_from_reads() {
    let ctx = TestContext::new();
    let (first_texture, first_target) = ctx.color_target();
    let (second_texture, second_target) = ctx.color_target();
    let layout = ctx.layout(&[("previous", ResourceKind::TextureReadOnly, ShaderStages::FRAGMENT)]);
    let pipeline = ctx.graphics_pipeline(vec![Arc::clone(&layout)]);
    let set = ctx.set(&layout, vec![BindableResource::Texture(Arc::clone(&first_texture))]);

    let mut list = ctx.device.create_command_list().unwrap();
    list.begin().unwrap();
    list.set_framebuffer(&second_target).unwrap();
    list.set_pipeline(&pipeline).unwrap();
    list.set_graphics_resource_set(0, &set, &[]).unwrap();
    list.draw(3, 1, 0, 0).unwrap();
    assert_eq!(list.read_bindings(first_texture.id()), 1);

    list.set_framebuffer(&first_target).unwrap();
    assert_eq!(list.read_bindings(first_texture.id()), 0);
    assert_eq!(list.read_bindings(second_texture.id()), 0);
    assert_eq!(list.resource_set_state(BindPoint::Graphics, 0), Some(SetState::Invalidated));
}

#[test]
fn test_changing_pipeline_reactivates_bound_sets() {
    let ctx = TestContext::new();
    let (_, target) = ctx.color_target();
    let layout = ctx.layout(&[("globals", ResourceKind::UniformBuffer, ShaderStages::VERTEX)]);
    let first = ctx.graphics_pipeline(vec![Arc::clone(&layout)]);
    let second = ctx.graphics_pipeline(vec![Arc::clone(&layout)]);
    let buffer = ctx.buffer(64, BufferUsage::UNIFORM);
    let set = ctx.set(&layout, vec![BindableResource::Buffer(buffer)]);

    let mut list = ctx.device.create_command_list().unwrap();
    list.begin().unwrap();
    list.set_framebuffer(&target).unwrap();
    list.set_pipeline(&first).unwrap();
    list.set_graphics_resource_set(0, &set, &[]).unwrap();
    list.draw(3, 1, 0, 0).unwrap();
    assert_eq!(list.resource_set_state(BindPoint::Graphics, 0), Some(SetState::Clean));

    list.set_pipeline(&second).unwrap();
    assert_ne!(list.resource_set_state(BindPoint::Graphics, 0), Some(SetState::Clean));
    list.draw(3, 1, 0, 0).unwrap();
    assert_eq!(list.resource_set_state(BindPoint::Graphics, 0), Some(SetState::Clean));
}

// ============================================================================
// Dynamic Offset Tests
// ============================================================================

fn dynamic_uniform_context() -> (TestContext, Arc<redlilium_hal::Pipeline>, Arc<redlilium_hal::ResourceSet>) {
    let ctx = TestContext::new();
    let layout = ctx
        .device
        .create_resource_layout(&ResourceLayoutDescription::new(vec![
            ResourceLayoutElementDescription::new("object", ResourceKind::UniformBuffer, ShaderStages::VERTEX)
                .with_options(ResourceLayoutElementOptions::DYNAMIC_BINDING),
            ResourceLayoutElementDescription::new("sampler", ResourceKind::Sampler, ShaderStages::FRAGMENT),
        ]))
        .unwrap();
    assert_eq!(layout.dynamic_count(), 1);
    let pipeline = ctx.graphics_pipeline(vec![Arc::clone(&layout)]);
    let buffer = ctx.buffer(1024, BufferUsage::UNIFORM);
    let sampler = ctx.device.create_sampler(&SamplerDescriptor::linear()).unwrap();
    let set = ctx.set(
        &layout,
        vec![
            BindableResource::BufferRange(BufferRange::new(buffer, 0, 256)),
            BindableResource::Sampler(sampler),
        ],
    );
    (ctx, pipeline, set)
}

#[rstest]
#[case::none(&[])]
#[case::too_many(&[0, 256])]
fn test_dynamic_offset_count_mismatch_fails_at_bind(#[case] offsets: &[u32]) {
    let (ctx, pipeline, set) = dynamic_uniform_context();
    let mut list = ctx.device.create_command_list().unwrap();
    list.begin().unwrap();
    list.set_pipeline(&pipeline).unwrap();
    assert!(matches!(
        list.set_graphics_resource_set(0, &set, offsets),
        Err(GraphicsError::Usage(_))
    ));
    assert_eq!(list.resource_set_state(BindPoint::Graphics, 0), None);
}

#[rstest]
#[case::aligned(512, true)]
#[case::unaligned(16, false)]
fn test_dynamic_offset_alignment(#[case] offset: u32, #[case] ok: bool) {
    let (ctx, pipeline, set) = dynamic_uniform_context();
    let (_, target) = ctx.color_target();
    let mut list = ctx.device.create_command_list().unwrap();
    list.begin().unwrap();
    list.set_framebuffer(&target).unwrap();
    list.set_pipeline(&pipeline).unwrap();
    list.set_graphics_resource_set(0, &set, &[offset]).unwrap();
    let result = list.draw(3, 1, 0, 0);
    if ok {
        result.unwrap();
    } else {
        assert!(matches!(result, Err(GraphicsError::Usage(_))));
    }
}

#[test]
fn test_set_with_wrong_layout_is_rejected() {
    let ctx = TestContext::new();
    let expected = ctx.layout(&[("a", ResourceKind::UniformBuffer, ShaderStages::VERTEX)]);
    let other = ctx.layout(&[("a", ResourceKind::Sampler, ShaderStages::VERTEX)]);
    let pipeline = ctx.graphics_pipeline(vec![expected]);
    let sampler = ctx.device.create_sampler(&SamplerDescriptor::nearest()).unwrap();
    let set = ctx.set(&other, vec![BindableResource::Sampler(sampler)]);

    let mut list = ctx.device.create_command_list().unwrap();
    list.begin().unwrap();
    list.set_pipeline(&pipeline).unwrap();
    assert!(matches!(
        list.set_graphics_resource_set(0, &set, &[]),
        Err(GraphicsError::Usage(_))
    ));
    assert!(matches!(
        list.set_graphics_resource_set(1, &set, &[]),
        Err(GraphicsError::Usage(_))
    ));
}
