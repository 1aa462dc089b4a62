//! Pipeline creation and fixed-function state sharing.

mod common;

use std::sync::Arc;

use rstest::rstest;

use common::TestContext;
use redlilium_hal::backend::NativeCommand;
use redlilium_hal::{
    BlendStateDescription, DepthStencilStateDescription, GraphicsError, PolygonFillMode,
    RasterizerStateDescription, RgbaFloat, ShaderDescriptor, ShaderSetDescription, ShaderStages,
    TextureSampleCount, VertexElementDescription, VertexElementFormat, VertexLayoutDescription,
};

fn position_layout() -> VertexLayoutDescription {
    VertexLayoutDescription::new(vec![
        VertexElementDescription::new("position", VertexElementFormat::Float3),
        VertexElementDescription::new("uv", VertexElementFormat::Float2),
    ])
}

#[test]
fn test_identical_fixed_function_state_is_shared() {
    let ctx = TestContext::new();
    let descriptor = ctx.graphics_descriptor(vec![]);
    let first = ctx.device.create_graphics_pipeline(&descriptor).unwrap();
    let second = ctx.device.create_graphics_pipeline(&descriptor).unwrap();

    let a = first.graphics_state().unwrap();
    let b = second.graphics_state().unwrap();
    assert_eq!(a.blend_state, b.blend_state);
    assert_eq!(a.depth_stencil_state, b.depth_stencil_state);
    assert_eq!(a.rasterizer_state, b.rasterizer_state);

    let stats = ctx.device.pipeline_cache_stats();
    assert_eq!(stats.blend_states, 1);
    assert_eq!(stats.depth_stencil_states, 1);
    assert_eq!(stats.rasterizer_states, 1);
    assert_eq!(stats.input_layouts, 0);
    assert_eq!(stats.misses, 3);
    assert_eq!(stats.hits, 3);
}

#[test]
fn test_fill_mode_only_difference_creates_one_rasterizer_state() {
    let ctx = TestContext::new();
    let solid = ctx.graphics_descriptor(vec![]);
    let wireframe = solid.clone().with_rasterizer_state(RasterizerStateDescription {
        fill_mode: PolygonFillMode::Wireframe,
        ..solid.rasterizer_state
    });
    let before = ctx.stats().state_objects_created;
    let solid = ctx.device.create_graphics_pipeline(&solid).unwrap();
    let wireframe = ctx.device.create_graphics_pipeline(&wireframe).unwrap();

    // Blend, depth/stencil and two rasterizer states
    assert_eq!(ctx.stats().state_objects_created - before, 4);
    let stats = ctx.device.pipeline_cache_stats();
    assert_eq!(stats.rasterizer_states, 2);
    assert_eq!(stats.blend_states, 1);
    assert_eq!(stats.depth_stencil_states, 1);

    // Switching between them only rebinds the rasterizer state
    let (_, target) = ctx.color_target();
    let mut list = ctx.device.create_command_list().unwrap();
    list.begin().unwrap();
    list.set_framebuffer(&target).unwrap();
    list.set_pipeline(&solid).unwrap();
    let before_switch = list.recorded_command_count();
    list.set_pipeline(&wireframe).unwrap();
    let commands = list.recorded_commands();
    let switch = &commands[before_switch..];
    assert_eq!(switch.len(), 1);
    assert!(matches!(switch[0], NativeCommand::SetRasterizerState(_)));
}

#[test]
fn test_blend_factor_and_stencil_reference_split_state_objects() {
    let ctx = TestContext::new();
    let base = ctx.graphics_descriptor(vec![]);
    let tinted = base
        .clone()
        .with_blend_state(BlendStateDescription {
            blend_factor: RgbaFloat::new(0.5, 0.25, 1.0, 1.0),
            ..BlendStateDescription::single_alpha_blend()
        })
        .with_depth_stencil_state(DepthStencilStateDescription {
            stencil_reference: 7,
            ..base.depth_stencil_state.clone()
        });
    let plain = base
        .clone()
        .with_blend_state(BlendStateDescription::single_alpha_blend());

    let tinted = ctx.device.create_graphics_pipeline(&tinted).unwrap();
    let plain = ctx.device.create_graphics_pipeline(&plain).unwrap();
    let (t, p) = (tinted.graphics_state().unwrap(), plain.graphics_state().unwrap());
    assert_ne!(t.blend_state, p.blend_state);
    assert_ne!(t.depth_stencil_state, p.depth_stencil_state);
    assert_eq!(t.rasterizer_state, p.rasterizer_state);
    assert_eq!(t.stencil_reference, 7);
    assert_eq!(p.stencil_reference, 0);
    assert_ne!(t.blend_factor, p.blend_factor);
}

#[rstest]
#[case::same_bytecode(b"vs_main".as_slice(), 1)]
#[case::other_bytecode(b"vs_other".as_slice(), 2)]
fn test_input_layout_key_includes_vertex_bytecode(#[case] second_bytecode: &[u8], #[case] expected: usize) {
    let ctx = TestContext::new();
    let make = |bytecode: &[u8]| {
        let mut descriptor = ctx.graphics_descriptor(vec![]);
        let vs = ctx
            .device
            .create_shader(&ShaderDescriptor::new(ShaderStages::VERTEX, bytecode.to_vec()))
            .unwrap();
        let fs = Arc::clone(&descriptor.shader_set.shaders[1]);
        descriptor.shader_set = ShaderSetDescription::new(vec![position_layout()], vec![vs, fs]);
        ctx.device.create_graphics_pipeline(&descriptor).unwrap()
    };
    let first = make(b"vs_main");
    let second = make(second_bytecode);

    assert_eq!(ctx.device.pipeline_cache_stats().input_layouts, expected);
    assert_eq!(first.graphics_state().unwrap().vertex_strides, vec![20]);
    let shared = first.graphics_state().unwrap().input_layout == second.graphics_state().unwrap().input_layout;
    assert_eq!(shared, expected == 1);
}

#[test]
fn test_multisampled_outputs_use_another_rasterizer_state() {
    let ctx = TestContext::new();
    let single = ctx.graphics_descriptor(vec![]);
    let mut multi = single.clone();
    multi.outputs.sample_count = TextureSampleCount::Count4;
    ctx.device.create_graphics_pipeline(&single).unwrap();
    ctx.device.create_graphics_pipeline(&multi).unwrap();
    assert_eq!(ctx.device.pipeline_cache_stats().rasterizer_states, 2);
}

#[test]
fn test_graphics_pipeline_requires_vertex_shader() {
    let ctx = TestContext::new();
    let mut descriptor = ctx.graphics_descriptor(vec![]);
    descriptor.shader_set.shaders.remove(0);
    assert!(matches!(
        ctx.device.create_graphics_pipeline(&descriptor),
        Err(GraphicsError::InvalidParameter(_))
    ));
}

#[test]
fn test_compute_pipeline_rejects_graphics_shader() {
    let ctx = TestContext::new();
    let shader = ctx
        .device
        .create_shader(&ShaderDescriptor::new(ShaderStages::FRAGMENT, b"fs".to_vec()))
        .unwrap();
    let result = ctx
        .device
        .create_compute_pipeline(&redlilium_hal::ComputePipelineDescriptor::new(shader, vec![]));
    assert!(matches!(result, Err(GraphicsError::InvalidParameter(_))));
}

#[test]
fn test_device_dispose_destroys_cached_state() {
    let ctx = TestContext::new();
    ctx.graphics_pipeline(vec![]);
    let live_before = ctx.dummy().live_object_count();
    ctx.device.dispose();
    assert!(ctx.dummy().live_object_count() < live_before);
    assert_eq!(ctx.device.pipeline_cache_stats().total_entries(), 0);
}
