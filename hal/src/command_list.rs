//! Command recording.
//!
//! A [`CommandList`] validates every call, tracks bound state and records a
//! list of [`NativeCommand`]s that the device replays on submission.
//!
//! # State machine
//!
//! ```text
//! Empty --begin--> Recording --end--> ReadyToExecute --submit--> Empty
//!                     ^                     |
//!                     +-------begin---------+
//! ```
//!
//! Any state except `Disposed` may `begin()` again, which discards what was
//! recorded. A swapchain resize forces every list that bound the swapchain's
//! framebuffer back to an empty `Recording` state.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::backend::{
    NativeBlendState, NativeBuffer, NativeCommand, NativeDepthStencilState, NativeInputLayout,
    NativeRasterizerState, NativeShader, VertexBufferBinding,
};
use crate::binding::{BindPoint, BindingState, SetState};
use crate::device::{GraphicsDevice, GraphicsDeviceFeatures};
use crate::error::{GraphicsError, GraphicsResult};
use crate::resources::{
    Buffer, ComputePipelineState, Framebuffer, GraphicsPipelineState, Pipeline, PipelineKind,
    ResourceCore, ResourceId, ResourceSet, Texture,
};
use crate::swapchain::RecorderRegistry;
use crate::types::{
    BufferUsage, DispatchIndirectArgs, DrawIndexedIndirectArgs, DrawIndirectArgs, Extent3d,
    IndexFormat, LoadAction, PrimitiveTopology, RenderPassDescriptor, RgbaFloat, ScissorRect,
    ShaderStages, TextureLocation, TextureUsage, Viewport,
};
use crate::upload::{self, StagingBuffer, UploadPath};

/// Lifecycle state of a command list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandListState {
    /// Created or submitted; call `begin()` to record.
    Empty,
    /// Accepting commands.
    Recording,
    /// Ended; ready for submission.
    ReadyToExecute,
    /// Disposed; unusable.
    Disposed,
}

/// The part of a command list a swapchain can reset from another thread.
#[derive(Debug)]
pub(crate) struct RecordingShared {
    state: CommandListState,
    commands: Vec<NativeCommand>,
    epoch: u64,
    forced_reset: bool,
}

impl RecordingShared {
    fn new() -> Self {
        Self {
            state: CommandListState::Empty,
            commands: Vec::new(),
            epoch: 0,
            forced_reset: false,
        }
    }

    /// Drop recorded commands and return to an empty `Recording` state.
    /// Returns the number of commands discarded.
    pub(crate) fn force_reset(&mut self) -> usize {
        match self.state {
            CommandListState::Recording | CommandListState::ReadyToExecute => {
                let discarded = self.commands.len();
                self.commands.clear();
                self.state = CommandListState::Recording;
                self.epoch += 1;
                self.forced_reset = true;
                discarded
            }
            CommandListState::Empty | CommandListState::Disposed => 0,
        }
    }
}

/// What a submission takes out of a list.
#[derive(Debug)]
pub(crate) struct Submission {
    pub(crate) commands: Vec<NativeCommand>,
    pub(crate) staging: Vec<StagingBuffer>,
}

// ============================================================================
// Local recording state
// ============================================================================

/// Fixed-function state last emitted, so unchanged state is not re-emitted.
#[derive(Debug, Default)]
struct AppliedState {
    blend: Option<(NativeBlendState, RgbaFloat)>,
    depth_stencil: Option<(NativeDepthStencilState, u32)>,
    rasterizer: Option<NativeRasterizerState>,
    input_layout: Option<Option<NativeInputLayout>>,
    topology: Option<PrimitiveTopology>,
    shaders: [Option<NativeShader>; 6],
}

impl AppliedState {
    fn apply_shader(&mut self, index: usize, stage: ShaderStages, shader: Option<NativeShader>, out: &mut Vec<NativeCommand>) {
        if self.shaders[index] != shader {
            self.shaders[index] = shader;
            out.push(NativeCommand::SetShader { stage, shader });
        }
    }

    fn apply_graphics(&mut self, state: &GraphicsPipelineState, out: &mut Vec<NativeCommand>) {
        let blend = (state.blend_state, state.blend_factor);
        if self.blend != Some(blend) {
            self.blend = Some(blend);
            out.push(NativeCommand::SetBlendState {
                state: state.blend_state,
                blend_factor: state.blend_factor,
            });
        }
        let depth_stencil = (state.depth_stencil_state, state.stencil_reference);
        if self.depth_stencil != Some(depth_stencil) {
            self.depth_stencil = Some(depth_stencil);
            out.push(NativeCommand::SetDepthStencilState {
                state: state.depth_stencil_state,
                stencil_reference: state.stencil_reference,
            });
        }
        if self.rasterizer != Some(state.rasterizer_state) {
            self.rasterizer = Some(state.rasterizer_state);
            out.push(NativeCommand::SetRasterizerState(state.rasterizer_state));
        }
        if self.input_layout != Some(state.input_layout) {
            self.input_layout = Some(state.input_layout);
            out.push(NativeCommand::SetInputLayout(state.input_layout));
        }
        if self.topology != Some(state.topology) {
            self.topology = Some(state.topology);
            out.push(NativeCommand::SetPrimitiveTopology(state.topology));
        }
        for (index, stage) in ShaderStages::EACH.into_iter().enumerate() {
            if stage == ShaderStages::COMPUTE {
                continue;
            }
            let shader = state
                .shaders
                .iter()
                .find(|(s, _)| *s == stage)
                .map(|(_, shader)| *shader);
            self.apply_shader(index, stage, shader, out);
        }
    }

    fn apply_compute(&mut self, state: &ComputePipelineState, out: &mut Vec<NativeCommand>) {
        let index = ShaderStages::EACH.len() - 1;
        self.apply_shader(index, ShaderStages::COMPUTE, Some(state.shader), out);
    }
}

#[derive(Debug, Clone)]
struct BoundVertexBuffer {
    buffer: Arc<Buffer>,
    offset: u64,
}

#[derive(Debug, Clone)]
struct BoundIndexBuffer {
    buffer: Arc<Buffer>,
    format: IndexFormat,
    offset: u64,
}

/// Bound state cleared by `begin()` and by a forced reset.
#[derive(Debug, Default)]
struct Recorder {
    bindings: BindingState,
    applied: AppliedState,
    graphics_pipeline: Option<Arc<Pipeline>>,
    compute_pipeline: Option<Arc<Pipeline>>,
    framebuffer: Option<Arc<Framebuffer>>,
    vertex_buffers: Vec<Option<BoundVertexBuffer>>,
    vertex_dirty: Option<(usize, usize)>,
    index_buffer: Option<BoundIndexBuffer>,
    index_dirty: bool,
    viewports: Vec<Viewport>,
    viewports_dirty: bool,
    scissors: Vec<ScissorRect>,
    scissors_dirty: bool,
    render_pass_open: bool,
    debug_depth: u32,
}

impl Recorder {
    fn mark_vertex_dirty(&mut self, slot: usize) {
        self.vertex_dirty = Some(match self.vertex_dirty {
            Some((lo, hi)) => (lo.min(slot), hi.max(slot)),
            None => (slot, slot),
        });
    }

    fn set_full_viewports(&mut self) {
        if let Some(framebuffer) = &self.framebuffer {
            let count = framebuffer.color_targets().len().max(1);
            self.viewports = vec![Viewport::from_dimensions(framebuffer.width(), framebuffer.height()); count];
            self.viewports_dirty = true;
        }
    }

    fn set_full_scissor_rects(&mut self) {
        if let Some(framebuffer) = &self.framebuffer {
            let count = framebuffer.color_targets().len().max(1);
            self.scissors = vec![ScissorRect::from_dimensions(framebuffer.width(), framebuffer.height()); count];
            self.scissors_dirty = true;
        }
    }

    /// Emit dirty vertex buffers in `0..required`. Every slot below
    /// `required` must be bound.
    fn flush_vertex_buffers(&mut self, strides: &[u32], out: &mut Vec<NativeCommand>) -> GraphicsResult<()> {
        let required = strides.len();
        for slot in 0..required {
            if self.vertex_buffers.get(slot).is_none_or(Option::is_none) {
                return Err(GraphicsError::usage(format!(
                    "vertex buffer {slot} required by the pipeline is not bound"
                )));
            }
        }
        let Some((lo, hi)) = self.vertex_dirty else {
            return Ok(());
        };
        if lo >= required {
            return Ok(());
        }
        let end = hi.min(required - 1);
        let bindings = self.vertex_buffers[lo..=end]
            .iter()
            .zip(&strides[lo..=end])
            .filter_map(|(bound, stride)| {
                bound.as_ref().map(|bound| (bound, *stride))
            })
            .map(|(bound, stride)| {
                Ok(VertexBufferBinding {
                    buffer: bound.buffer.native()?,
                    stride,
                    offset: bound.offset,
                })
            })
            .collect::<GraphicsResult<Vec<_>>>()?;
        out.push(NativeCommand::SetVertexBuffers {
            first_slot: lo as u32,
            bindings,
        });
        self.vertex_dirty = (hi > end).then_some((end + 1, hi));
        Ok(())
    }

    fn flush_index_buffer(&mut self, out: &mut Vec<NativeCommand>) -> GraphicsResult<()> {
        let bound = self
            .index_buffer
            .as_ref()
            .ok_or_else(|| GraphicsError::usage("indexed draw without an index buffer"))?;
        if self.index_dirty {
            out.push(NativeCommand::SetIndexBuffer {
                buffer: bound.buffer.native()?,
                format: bound.format,
                offset: bound.offset,
            });
            self.index_dirty = false;
        }
        Ok(())
    }

    fn flush_viewports_and_scissors(&mut self, out: &mut Vec<NativeCommand>) {
        if self.viewports_dirty {
            out.push(NativeCommand::SetViewports(self.viewports.clone()));
            self.viewports_dirty = false;
        }
        if self.scissors_dirty {
            out.push(NativeCommand::SetScissorRects(self.scissors.clone()));
            self.scissors_dirty = false;
        }
    }
}

// ============================================================================
// CommandList
// ============================================================================

/// Records GPU commands for later submission.
///
/// Created by [`GraphicsDevice::create_command_list`]. A list is used from
/// one thread at a time; separate lists can record concurrently.
///
/// # Example
///
/// ```ignore
/// let mut list = device.create_command_list()?;
/// list.begin()?;
/// list.set_framebuffer(&swapchain.framebuffer()?)?;
/// list.begin_render_pass(&RenderPassDescriptor::clear_all(RgbaFloat::BLACK, 1.0))?;
/// list.set_pipeline(&pipeline)?;
/// list.set_graphics_resource_set(0, &set, &[])?;
/// list.set_vertex_buffer(0, &vertices, 0)?;
/// list.draw(3, 1, 0, 0)?;
/// list.end_render_pass()?;
/// list.end()?;
/// device.submit_commands(&mut list, None)?;
/// ```
pub struct CommandList {
    core: ResourceCore,
    label: Option<String>,
    features: GraphicsDeviceFeatures,
    shared: Arc<Mutex<RecordingShared>>,
    epoch: u64,
    recorder: Recorder,
    staging: Vec<StagingBuffer>,
    registries: Vec<Arc<RecorderRegistry>>,
}

impl CommandList {
    pub(crate) fn new(core: ResourceCore, label: Option<String>, features: GraphicsDeviceFeatures) -> Self {
        Self {
            core,
            label,
            features,
            shared: Arc::new(Mutex::new(RecordingShared::new())),
            epoch: 0,
            recorder: Recorder::default(),
            staging: Vec::new(),
            registries: Vec::new(),
        }
    }

    /// Device-unique id.
    pub fn id(&self) -> ResourceId {
        self.core.id()
    }

    /// Get the command list label, if set.
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> CommandListState {
        self.shared.lock().state
    }

    /// Number of native commands recorded so far.
    pub fn recorded_command_count(&self) -> usize {
        self.shared.lock().commands.len()
    }

    /// A copy of the native commands recorded so far.
    pub fn recorded_commands(&self) -> Vec<NativeCommand> {
        self.shared.lock().commands.clone()
    }

    /// Read-view slots currently exposing `resource`.
    pub fn read_bindings(&self, resource: ResourceId) -> usize {
        self.recorder.bindings.read_bindings(resource)
    }

    /// Read-write-view slots currently exposing `resource`.
    pub fn read_write_bindings(&self, resource: ResourceId) -> usize {
        self.recorder.bindings.read_write_bindings(resource)
    }

    /// Activation state of the resource set bound at `index`.
    pub fn resource_set_state(&self, bind_point: BindPoint, index: usize) -> Option<SetState> {
        self.recorder.bindings.set_state(bind_point, index)
    }

    /// Staging buffers checked out by this list and not yet returned.
    pub fn staging_buffer_count(&self) -> usize {
        self.staging.len()
    }

    // ------------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------------

    /// Start recording, discarding anything recorded and not submitted.
    pub fn begin(&mut self) -> GraphicsResult<()> {
        {
            let mut shared = self.shared.lock();
            if shared.state == CommandListState::Disposed {
                return Err(self.disposed_error());
            }
            shared.commands.clear();
            shared.state = CommandListState::Recording;
            shared.forced_reset = false;
            shared.epoch += 1;
            self.epoch = shared.epoch;
        }
        self.reset_local();
        log::trace!("CommandList {:?}: begin", self.label);
        Ok(())
    }

    /// Finish recording.
    ///
    /// Fails if a render pass or debug group is still open, or if a swapchain
    /// resize emptied the list and nothing was recorded since.
    pub fn end(&mut self) -> GraphicsResult<()> {
        self.check_recording()?;
        if self.recorder.render_pass_open {
            return Err(GraphicsError::usage("end() called inside a render pass"));
        }
        if self.recorder.debug_depth > 0 {
            return Err(GraphicsError::usage(format!(
                "end() called with {} open debug groups",
                self.recorder.debug_depth
            )));
        }
        let mut shared = self.shared.lock();
        if shared.epoch != self.epoch {
            return Err(reset_while_recording());
        }
        if shared.forced_reset && shared.commands.is_empty() {
            return Err(GraphicsError::usage(
                "command list was reset by a swapchain resize and holds no commands",
            ));
        }
        shared.state = CommandListState::ReadyToExecute;
        log::trace!(
            "CommandList {:?}: end with {} commands",
            self.label,
            shared.commands.len()
        );
        Ok(())
    }

    /// Take the recorded commands for execution. `ReadyToExecute -> Empty`.
    pub(crate) fn take_submission(&mut self) -> GraphicsResult<Submission> {
        let commands = {
            let mut shared = self.shared.lock();
            match shared.state {
                CommandListState::ReadyToExecute => {}
                CommandListState::Disposed => return Err(self.disposed_error()),
                state => {
                    return Err(GraphicsError::usage(format!(
                        "command list must be ended before submission (state {state:?})"
                    )));
                }
            }
            shared.state = CommandListState::Empty;
            std::mem::take(&mut shared.commands)
        };
        self.unregister_all();
        Ok(Submission {
            commands,
            staging: std::mem::take(&mut self.staging),
        })
    }

    /// Returns true once [`dispose`](Self::dispose) has run.
    pub fn is_disposed(&self) -> bool {
        self.core.is_disposed()
    }

    /// Discard recorded commands and release checked-out staging buffers.
    pub fn dispose(&mut self) {
        if !self.core.mark_disposed() {
            return;
        }
        {
            let mut shared = self.shared.lock();
            shared.state = CommandListState::Disposed;
            shared.commands.clear();
        }
        self.reset_local();
    }

    // ------------------------------------------------------------------------
    // Pipeline and resource state
    // ------------------------------------------------------------------------

    /// Bind a graphics or compute pipeline.
    ///
    /// Only fixed-function state that differs from the current state is
    /// emitted. Every bound resource set of the pipeline's bind point is
    /// re-activated before the next draw or dispatch.
    pub fn set_pipeline(&mut self, pipeline: &Arc<Pipeline>) -> GraphicsResult<()> {
        self.check_recording()?;
        pipeline.check_alive()?;
        let mut out = Vec::new();
        let recorder = &mut self.recorder;
        match pipeline.kind() {
            PipelineKind::Graphics(state) => {
                if recorder
                    .graphics_pipeline
                    .as_ref()
                    .is_some_and(|current| Arc::ptr_eq(current, pipeline))
                {
                    return Ok(());
                }
                let strides_changed = recorder
                    .graphics_pipeline
                    .as_ref()
                    .and_then(|current| current.graphics_state())
                    .is_none_or(|current| current.vertex_strides != state.vertex_strides);
                if strides_changed && !recorder.vertex_buffers.is_empty() {
                    recorder.vertex_dirty = Some((0, recorder.vertex_buffers.len() - 1));
                }
                recorder.applied.apply_graphics(state, &mut out);
                recorder
                    .bindings
                    .invalidate_all(BindPoint::Graphics, pipeline.resource_layouts().len());
                recorder.graphics_pipeline = Some(Arc::clone(pipeline));
            }
            PipelineKind::Compute(state) => {
                if !self.features.compute_shader {
                    return Err(GraphicsError::Unsupported(
                        "compute shaders are not supported by this device".to_string(),
                    ));
                }
                if recorder
                    .compute_pipeline
                    .as_ref()
                    .is_some_and(|current| Arc::ptr_eq(current, pipeline))
                {
                    return Ok(());
                }
                recorder.applied.apply_compute(state, &mut out);
                recorder
                    .bindings
                    .invalidate_all(BindPoint::Compute, pipeline.resource_layouts().len());
                recorder.compute_pipeline = Some(Arc::clone(pipeline));
            }
        }
        self.commit(out)
    }

    /// Bind a resource set for graphics stages at `index`.
    ///
    /// The set is activated by the next draw. The layout must match the
    /// graphics pipeline's layout at `index`, and one dynamic offset must be
    /// given per dynamic element.
    pub fn set_graphics_resource_set(
        &mut self,
        index: u32,
        set: &Arc<ResourceSet>,
        dynamic_offsets: &[u32],
    ) -> GraphicsResult<()> {
        self.set_resource_set(BindPoint::Graphics, index, set, dynamic_offsets)
    }

    /// Bind a resource set for the compute stage at `index`.
    pub fn set_compute_resource_set(
        &mut self,
        index: u32,
        set: &Arc<ResourceSet>,
        dynamic_offsets: &[u32],
    ) -> GraphicsResult<()> {
        self.set_resource_set(BindPoint::Compute, index, set, dynamic_offsets)
    }

    fn set_resource_set(
        &mut self,
        bind_point: BindPoint,
        index: u32,
        set: &Arc<ResourceSet>,
        dynamic_offsets: &[u32],
    ) -> GraphicsResult<()> {
        self.check_recording()?;
        set.check_alive()?;
        let pipeline = match bind_point {
            BindPoint::Graphics => self.recorder.graphics_pipeline.as_ref(),
            BindPoint::Compute => self.recorder.compute_pipeline.as_ref(),
        }
        .ok_or_else(|| {
            GraphicsError::usage(format!(
                "bind a {bind_point:?} pipeline before binding resource sets"
            ))
        })?;
        let layouts = pipeline.resource_layouts();
        let layout = layouts.get(index as usize).ok_or_else(|| {
            GraphicsError::usage(format!(
                "resource set index {index} out of range: pipeline has {} layouts",
                layouts.len()
            ))
        })?;
        if !layout.is_compatible(set.layout()) {
            return Err(GraphicsError::usage(format!(
                "resource set {:?} does not match the pipeline's layout at index {index}",
                set.label()
            )));
        }
        let expected = set.layout().dynamic_count();
        if dynamic_offsets.len() != expected {
            return Err(GraphicsError::usage(format!(
                "resource set {index} takes {expected} dynamic offsets, got {}",
                dynamic_offsets.len()
            )));
        }
        self.recorder
            .bindings
            .bind_set(bind_point, index as usize, Arc::clone(set), dynamic_offsets);
        Ok(())
    }

    /// Bind a vertex buffer to a slot.
    pub fn set_vertex_buffer(&mut self, slot: u32, buffer: &Arc<Buffer>, offset: u64) -> GraphicsResult<()> {
        self.check_recording()?;
        buffer.check_alive()?;
        buffer.require_usage(BufferUsage::VERTEX, "set_vertex_buffer")?;
        if offset > buffer.size() {
            return Err(GraphicsError::usage(format!(
                "vertex buffer offset {offset} exceeds buffer size {}",
                buffer.size()
            )));
        }
        let slot = slot as usize;
        let recorder = &mut self.recorder;
        if recorder.vertex_buffers.len() <= slot {
            recorder.vertex_buffers.resize(slot + 1, None);
        }
        let unchanged = recorder.vertex_buffers[slot]
            .as_ref()
            .is_some_and(|bound| Arc::ptr_eq(&bound.buffer, buffer) && bound.offset == offset);
        if !unchanged {
            recorder.vertex_buffers[slot] = Some(BoundVertexBuffer {
                buffer: Arc::clone(buffer),
                offset,
            });
            recorder.mark_vertex_dirty(slot);
        }
        Ok(())
    }

    /// Bind the index buffer.
    pub fn set_index_buffer(
        &mut self,
        buffer: &Arc<Buffer>,
        format: IndexFormat,
        offset: u64,
    ) -> GraphicsResult<()> {
        self.check_recording()?;
        buffer.check_alive()?;
        buffer.require_usage(BufferUsage::INDEX, "set_index_buffer")?;
        if offset % u64::from(format.size()) != 0 || offset > buffer.size() {
            return Err(GraphicsError::usage(format!(
                "index buffer offset {offset} is misaligned or out of range for {format:?}"
            )));
        }
        let unchanged = self.recorder.index_buffer.as_ref().is_some_and(|bound| {
            Arc::ptr_eq(&bound.buffer, buffer) && bound.format == format && bound.offset == offset
        });
        if !unchanged {
            self.recorder.index_buffer = Some(BoundIndexBuffer {
                buffer: Arc::clone(buffer),
                format,
                offset,
            });
            self.recorder.index_dirty = true;
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Framebuffer, render passes, viewports
    // ------------------------------------------------------------------------

    /// Bind a framebuffer.
    ///
    /// Attachment textures are unbound from every read view, and viewports
    /// and scissors are reset to the full framebuffer. Binding a swapchain
    /// framebuffer registers this list with the swapchain.
    pub fn set_framebuffer(&mut self, framebuffer: &Arc<Framebuffer>) -> GraphicsResult<()> {
        self.check_recording()?;
        framebuffer.check_alive()?;
        if self.recorder.render_pass_open {
            return Err(GraphicsError::usage(
                "cannot change the framebuffer inside a render pass",
            ));
        }
        if let Some(registry) = framebuffer.recorders() {
            registry.register(&self.shared);
            if !self.registries.iter().any(|r| Arc::ptr_eq(r, registry)) {
                self.registries.push(Arc::clone(registry));
            }
        }

        let mut out = Vec::new();
        self.recorder
            .bindings
            .unbind_reads(&framebuffer.attachment_ids(), &mut out);
        out.push(NativeCommand::SetRenderTargets {
            colors: framebuffer.color_views().to_vec(),
            depth: framebuffer.depth_view(),
        });
        self.recorder.framebuffer = Some(Arc::clone(framebuffer));
        self.recorder.set_full_viewports();
        self.recorder.set_full_scissor_rects();
        self.commit(out)
    }

    /// Begin a render pass on the bound framebuffer.
    ///
    /// `Clear` attachments are cleared and `DontCare` attachments discarded.
    /// Viewports and scissors are reset to the full framebuffer.
    pub fn begin_render_pass(&mut self, descriptor: &RenderPassDescriptor) -> GraphicsResult<()> {
        self.check_recording()?;
        if self.recorder.render_pass_open {
            return Err(GraphicsError::usage("a render pass is already open"));
        }
        let framebuffer = self.bound_framebuffer()?;
        if descriptor.color_attachments.len() > framebuffer.color_views().len() {
            return Err(GraphicsError::usage(format!(
                "render pass describes {} color attachments, framebuffer has {}",
                descriptor.color_attachments.len(),
                framebuffer.color_views().len()
            )));
        }

        let mut out = Vec::new();
        for (index, view) in framebuffer.color_views().iter().enumerate() {
            let ops = descriptor.color_ops(index);
            match ops.load {
                LoadAction::Clear => out.push(NativeCommand::ClearRenderTarget {
                    view: *view,
                    color: ops.clear_color,
                }),
                LoadAction::DontCare => out.push(NativeCommand::DiscardView(*view)),
                LoadAction::Load => {}
            }
        }
        if let Some(view) = framebuffer.depth_view() {
            let ops = descriptor.depth_stencil.unwrap_or_default();
            match ops.load {
                LoadAction::Clear => out.push(NativeCommand::ClearDepthStencil {
                    view,
                    depth: ops.clear_depth,
                    stencil: ops.clear_stencil,
                }),
                LoadAction::DontCare => out.push(NativeCommand::DiscardView(view)),
                LoadAction::Load => {}
            }
        }

        self.recorder.render_pass_open = true;
        self.recorder.set_full_viewports();
        self.recorder.set_full_scissor_rects();
        self.commit(out)
    }

    /// End the open render pass.
    pub fn end_render_pass(&mut self) -> GraphicsResult<()> {
        self.check_recording()?;
        if !self.recorder.render_pass_open {
            return Err(GraphicsError::usage("no render pass is open"));
        }
        self.recorder.render_pass_open = false;
        Ok(())
    }

    /// Clear one color attachment of the bound framebuffer.
    pub fn clear_color_target(&mut self, index: u32, color: RgbaFloat) -> GraphicsResult<()> {
        self.check_recording()?;
        let framebuffer = self.bound_framebuffer()?;
        let view = *framebuffer
            .color_views()
            .get(index as usize)
            .ok_or_else(|| {
                GraphicsError::usage(format!(
                    "color attachment {index} out of range: framebuffer has {}",
                    framebuffer.color_views().len()
                ))
            })?;
        self.commit(vec![NativeCommand::ClearRenderTarget { view, color }])
    }

    /// Clear the depth/stencil attachment of the bound framebuffer.
    pub fn clear_depth_stencil(&mut self, depth: f32, stencil: u8) -> GraphicsResult<()> {
        self.check_recording()?;
        let framebuffer = self.bound_framebuffer()?;
        let view = framebuffer
            .depth_view()
            .ok_or_else(|| GraphicsError::usage("framebuffer has no depth attachment"))?;
        self.commit(vec![NativeCommand::ClearDepthStencil {
            view,
            depth,
            stencil,
        }])
    }

    /// Set one viewport. Indices above 0 need `multiple_viewports`.
    pub fn set_viewport(&mut self, index: u32, viewport: Viewport) -> GraphicsResult<()> {
        self.check_recording()?;
        self.check_viewport_index(index)?;
        let index = index as usize;
        let recorder = &mut self.recorder;
        if recorder.viewports.len() <= index {
            recorder.viewports.resize(index + 1, Viewport::default());
        }
        if recorder.viewports[index] != viewport {
            recorder.viewports[index] = viewport;
            recorder.viewports_dirty = true;
        }
        Ok(())
    }

    /// Reset every viewport to cover the bound framebuffer.
    pub fn set_full_viewports(&mut self) -> GraphicsResult<()> {
        self.check_recording()?;
        self.bound_framebuffer()?;
        self.recorder.set_full_viewports();
        Ok(())
    }

    /// Set one scissor rectangle. Indices above 0 need `multiple_viewports`.
    pub fn set_scissor_rect(&mut self, index: u32, rect: ScissorRect) -> GraphicsResult<()> {
        self.check_recording()?;
        self.check_viewport_index(index)?;
        let index = index as usize;
        let recorder = &mut self.recorder;
        if recorder.scissors.len() <= index {
            recorder.scissors.resize(index + 1, ScissorRect::default());
        }
        if recorder.scissors[index] != rect {
            recorder.scissors[index] = rect;
            recorder.scissors_dirty = true;
        }
        Ok(())
    }

    /// Reset every scissor rectangle to cover the bound framebuffer.
    pub fn set_full_scissor_rects(&mut self) -> GraphicsResult<()> {
        self.check_recording()?;
        self.bound_framebuffer()?;
        self.recorder.set_full_scissor_rects();
        Ok(())
    }

    fn check_viewport_index(&self, index: u32) -> GraphicsResult<()> {
        if index > 0 && !self.features.multiple_viewports {
            return Err(GraphicsError::Unsupported(format!(
                "viewport index {index} needs multiple viewport support"
            )));
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Draws and dispatches
    // ------------------------------------------------------------------------

    /// Non-indexed draw.
    pub fn draw(
        &mut self,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    ) -> GraphicsResult<()> {
        self.check_recording()?;
        self.check_base_instance(first_instance)?;
        let mut out = self.prepare_draw(false)?;
        out.push(NativeCommand::Draw {
            vertex_count,
            instance_count,
            first_vertex,
            first_instance,
        });
        self.commit(out)
    }

    /// Indexed draw.
    pub fn draw_indexed(
        &mut self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        base_vertex: i32,
        first_instance: u32,
    ) -> GraphicsResult<()> {
        self.check_recording()?;
        self.check_base_instance(first_instance)?;
        if base_vertex != 0 && !self.features.draw_base_vertex {
            return Err(GraphicsError::Unsupported(
                "non-zero base vertex is not supported by this device".to_string(),
            ));
        }
        let mut out = self.prepare_draw(true)?;
        if let Some(bound) = &self.recorder.index_buffer {
            let available = (bound.buffer.size() - bound.offset) / u64::from(bound.format.size());
            if u64::from(first_index) + u64::from(index_count) > available {
                return Err(GraphicsError::usage(format!(
                    "draw reads indices {first_index}..{} but the index buffer holds {available}",
                    u64::from(first_index) + u64::from(index_count)
                )));
            }
        }
        out.push(NativeCommand::DrawIndexed {
            index_count,
            instance_count,
            first_index,
            base_vertex,
            first_instance,
        });
        self.commit(out)
    }

    /// Draws with [`DrawIndirectArgs`] read from `buffer`.
    pub fn draw_indirect(
        &mut self,
        buffer: &Arc<Buffer>,
        offset: u64,
        draw_count: u32,
        stride: u32,
    ) -> GraphicsResult<()> {
        self.check_recording()?;
        self.check_indirect_draws()?;
        let native = self.check_indirect(buffer, offset, draw_count, stride, DrawIndirectArgs::SIZE)?;
        let mut out = self.prepare_draw(false)?;
        out.push(NativeCommand::DrawIndirect {
            buffer: native,
            offset,
            draw_count,
            stride,
        });
        self.commit(out)
    }

    /// Indexed draws with [`DrawIndexedIndirectArgs`] read from `buffer`.
    pub fn draw_indexed_indirect(
        &mut self,
        buffer: &Arc<Buffer>,
        offset: u64,
        draw_count: u32,
        stride: u32,
    ) -> GraphicsResult<()> {
        self.check_recording()?;
        self.check_indirect_draws()?;
        let native =
            self.check_indirect(buffer, offset, draw_count, stride, DrawIndexedIndirectArgs::SIZE)?;
        let mut out = self.prepare_draw(true)?;
        out.push(NativeCommand::DrawIndexedIndirect {
            buffer: native,
            offset,
            draw_count,
            stride,
        });
        self.commit(out)
    }

    /// Dispatch compute work groups.
    pub fn dispatch(&mut self, x: u32, y: u32, z: u32) -> GraphicsResult<()> {
        self.check_recording()?;
        let mut out = self.prepare_dispatch()?;
        out.push(NativeCommand::Dispatch { x, y, z });
        self.commit(out)
    }

    /// Dispatch with [`DispatchIndirectArgs`] read from `buffer`.
    pub fn dispatch_indirect(&mut self, buffer: &Arc<Buffer>, offset: u64) -> GraphicsResult<()> {
        self.check_recording()?;
        let size = DispatchIndirectArgs::SIZE as u32;
        let native = self.check_indirect(buffer, offset, 1, size, DispatchIndirectArgs::SIZE)?;
        let mut out = self.prepare_dispatch()?;
        out.push(NativeCommand::DispatchIndirect {
            buffer: native,
            offset,
        });
        self.commit(out)
    }

    fn check_base_instance(&self, first_instance: u32) -> GraphicsResult<()> {
        if first_instance != 0 && !self.features.draw_base_instance {
            return Err(GraphicsError::Unsupported(
                "non-zero first instance is not supported by this device".to_string(),
            ));
        }
        Ok(())
    }

    fn check_indirect_draws(&self) -> GraphicsResult<()> {
        if !self.features.draw_indirect {
            return Err(GraphicsError::Unsupported(
                "indirect draws are not supported by this device".to_string(),
            ));
        }
        Ok(())
    }

    fn check_indirect(
        &self,
        buffer: &Buffer,
        offset: u64,
        draw_count: u32,
        stride: u32,
        args_size: u64,
    ) -> GraphicsResult<NativeBuffer> {
        buffer.check_alive()?;
        buffer.require_usage(BufferUsage::INDIRECT, "indirect argument buffer")?;
        if offset % 4 != 0 {
            return Err(GraphicsError::usage(format!(
                "indirect offset {offset} is not 4-byte aligned"
            )));
        }
        if draw_count > 1 && u64::from(stride) < args_size {
            return Err(GraphicsError::usage(format!(
                "indirect stride {stride} is smaller than the {args_size}-byte argument struct"
            )));
        }
        let end = match draw_count {
            0 => offset,
            count => offset + u64::from(count - 1) * u64::from(stride) + args_size,
        };
        if end > buffer.size() {
            return Err(GraphicsError::usage(format!(
                "indirect arguments end at byte {end}, buffer holds {}",
                buffer.size()
            )));
        }
        buffer.native()
    }

    /// Validate draw state and flush everything a draw depends on.
    fn prepare_draw(&mut self, indexed: bool) -> GraphicsResult<Vec<NativeCommand>> {
        let pipeline = self
            .recorder
            .graphics_pipeline
            .clone()
            .ok_or_else(|| GraphicsError::usage("draw without a graphics pipeline"))?;
        let framebuffer = self.bound_framebuffer()?;
        pipeline.check_alive()?;
        framebuffer.check_alive()?;
        let state = pipeline
            .graphics_state()
            .ok_or_else(|| GraphicsError::usage("bound graphics pipeline has no graphics state"))?;
        if &state.outputs != framebuffer.outputs() {
            return Err(GraphicsError::usage(format!(
                "pipeline {:?} renders to {:?}, framebuffer {:?} provides {:?}",
                pipeline.label(),
                state.outputs,
                framebuffer.label(),
                framebuffer.outputs()
            )));
        }

        let mut out = Vec::new();
        let recorder = &mut self.recorder;
        recorder
            .bindings
            .flush(BindPoint::Graphics, pipeline.slot_bases(), &mut out)?;
        recorder.flush_vertex_buffers(&state.vertex_strides, &mut out)?;
        if indexed {
            recorder.flush_index_buffer(&mut out)?;
        }
        recorder.flush_viewports_and_scissors(&mut out);
        Ok(out)
    }

    fn prepare_dispatch(&mut self) -> GraphicsResult<Vec<NativeCommand>> {
        if !self.features.compute_shader {
            return Err(GraphicsError::Unsupported(
                "compute shaders are not supported by this device".to_string(),
            ));
        }
        let pipeline = self
            .recorder
            .compute_pipeline
            .clone()
            .ok_or_else(|| GraphicsError::usage("dispatch without a compute pipeline"))?;
        pipeline.check_alive()?;
        let mut out = Vec::new();
        self.recorder
            .bindings
            .flush(BindPoint::Compute, pipeline.slot_bases(), &mut out)?;
        Ok(out)
    }

    // ------------------------------------------------------------------------
    // Transfers
    // ------------------------------------------------------------------------

    /// Copy `size` bytes between buffers.
    pub fn copy_buffer(
        &mut self,
        source: &Arc<Buffer>,
        source_offset: u64,
        destination: &Arc<Buffer>,
        destination_offset: u64,
        size: u64,
    ) -> GraphicsResult<()> {
        self.check_recording()?;
        source.check_alive()?;
        destination.check_alive()?;
        for (buffer, offset, role) in [(source, source_offset, "source"), (destination, destination_offset, "destination")] {
            if offset.checked_add(size).is_none_or(|end| end > buffer.size()) {
                return Err(GraphicsError::usage(format!(
                    "copy {role} range {offset}+{size} exceeds buffer {:?} of size {}",
                    buffer.label(),
                    buffer.size()
                )));
            }
        }
        if Arc::ptr_eq(source, destination)
            && source_offset < destination_offset + size
            && destination_offset < source_offset + size
        {
            return Err(GraphicsError::usage("overlapping copy within one buffer"));
        }
        if size == 0 {
            return Ok(());
        }
        self.commit(vec![NativeCommand::CopyBufferRegion {
            source: source.native()?,
            source_offset,
            destination: destination.native()?,
            destination_offset,
            size,
        }])
    }

    /// Copy a region between texture subresources.
    pub fn copy_texture(
        &mut self,
        source: &Arc<Texture>,
        source_location: TextureLocation,
        destination: &Arc<Texture>,
        destination_location: TextureLocation,
        extent: Extent3d,
    ) -> GraphicsResult<()> {
        self.check_recording()?;
        source.check_alive()?;
        destination.check_alive()?;
        if source.format().block_size() != destination.format().block_size() {
            return Err(GraphicsError::usage(format!(
                "cannot copy between {:?} and {:?}",
                source.format(),
                destination.format()
            )));
        }
        if source.sample_count() != destination.sample_count() {
            return Err(GraphicsError::usage(
                "texture copies need matching sample counts; use resolve_texture",
            ));
        }
        let source_subresource = upload::texture_region(source, source_location, extent)?;
        let destination_subresource = upload::texture_region(destination, destination_location, extent)?;
        self.commit(vec![NativeCommand::CopyTextureRegion {
            source: source.native()?,
            source_subresource,
            source_origin: source_location.origin,
            destination: destination.native()?,
            destination_subresource,
            destination_origin: destination_location.origin,
            extent,
        }])
    }

    /// Write `data` into a buffer at `offset`.
    ///
    /// The write happens in command order; see [`UploadPath`] for how it
    /// reaches the buffer. Staging buffers used here return to the device
    /// pool after submission.
    pub fn update_buffer(&mut self, buffer: &Arc<Buffer>, offset: u64, data: &[u8]) -> GraphicsResult<()> {
        self.check_recording()?;
        buffer.check_alive()?;
        let size = data.len() as u64;
        let path = upload::choose_buffer_upload(buffer.descriptor(), offset, size)?;
        log::trace!(
            "CommandList {:?}: update {size} bytes of {:?} via {path:?}",
            self.label,
            buffer.label()
        );
        let command = match path {
            UploadPath::Skip => return Ok(()),
            UploadPath::DirectUpdate => NativeCommand::UpdateBuffer {
                buffer: buffer.native()?,
                offset,
                data: data.to_vec(),
            },
            UploadPath::MapDiscard => NativeCommand::WriteDiscard {
                buffer: buffer.native()?,
                data: data.to_vec(),
            },
            UploadPath::StagingCopy => {
                let device = self.device()?;
                let staging = device.acquire_staging(size)?;
                let source = staging.buffer().native();
                let staging_buffer = Arc::clone(staging.buffer());
                self.staging.push(staging);
                device.write_buffer_now(&staging_buffer, 0, data)?;
                NativeCommand::CopyBufferRegion {
                    source: source?,
                    source_offset: 0,
                    destination: buffer.native()?,
                    destination_offset: offset,
                    size,
                }
            }
        };
        self.commit(vec![command])
    }

    /// Typed variant of [`update_buffer`](Self::update_buffer).
    pub fn update_buffer_typed<T: bytemuck::Pod>(
        &mut self,
        buffer: &Arc<Buffer>,
        offset: u64,
        data: &[T],
    ) -> GraphicsResult<()> {
        self.update_buffer(buffer, offset, bytemuck::cast_slice(data))
    }

    /// Write a region of one texture subresource.
    ///
    /// `row_pitch` and `depth_pitch` describe the layout of `data`.
    pub fn update_texture(
        &mut self,
        texture: &Arc<Texture>,
        location: TextureLocation,
        extent: Extent3d,
        data: &[u8],
        row_pitch: u32,
        depth_pitch: u32,
    ) -> GraphicsResult<()> {
        self.check_recording()?;
        texture.check_alive()?;
        let subresource = upload::texture_region(texture, location, extent)?;
        let row_bytes = extent.width * texture.format().block_size();
        upload::check_source_layout(data.len(), row_bytes, row_pitch, depth_pitch, extent)?;
        self.commit(vec![NativeCommand::UpdateTexture {
            texture: texture.native()?,
            subresource,
            origin: location.origin,
            extent,
            data: data.to_vec(),
            row_pitch,
            depth_pitch,
        }])
    }

    /// Generate the mip chain of a texture from its top level.
    pub fn generate_mipmaps(&mut self, texture: &Arc<Texture>) -> GraphicsResult<()> {
        self.check_recording()?;
        texture.check_alive()?;
        if !texture.usage().contains(TextureUsage::GENERATE_MIPMAPS) {
            return Err(GraphicsError::usage(format!(
                "texture {:?} was not created with GENERATE_MIPMAPS",
                texture.label()
            )));
        }
        if texture.mip_level_count() <= 1 {
            return Ok(());
        }
        let view = texture.full_read_view()?;
        self.commit(vec![NativeCommand::GenerateMips(view)])
    }

    /// Resolve a multisampled texture into a single-sampled one.
    pub fn resolve_texture(&mut self, source: &Arc<Texture>, destination: &Arc<Texture>) -> GraphicsResult<()> {
        self.check_recording()?;
        source.check_alive()?;
        destination.check_alive()?;
        if !source.sample_count().is_multisampled() {
            return Err(GraphicsError::usage(format!(
                "resolve source {:?} is not multisampled",
                source.label()
            )));
        }
        if destination.sample_count().is_multisampled() {
            return Err(GraphicsError::usage(format!(
                "resolve destination {:?} is multisampled",
                destination.label()
            )));
        }
        if source.format() != destination.format() || source.size() != destination.size() {
            return Err(GraphicsError::usage(
                "resolve needs textures of the same format and size",
            ));
        }
        self.commit(vec![NativeCommand::ResolveSubresource {
            source: source.native()?,
            source_subresource: 0,
            destination: destination.native()?,
            destination_subresource: 0,
        }])
    }

    // ------------------------------------------------------------------------
    // Debug annotations
    // ------------------------------------------------------------------------

    /// Open a named debug group.
    pub fn push_debug_group(&mut self, name: &str) -> GraphicsResult<()> {
        self.check_recording()?;
        self.commit(vec![NativeCommand::BeginEvent(name.to_string())])?;
        self.recorder.debug_depth += 1;
        Ok(())
    }

    /// Close the innermost debug group.
    pub fn pop_debug_group(&mut self) -> GraphicsResult<()> {
        self.check_recording()?;
        if self.recorder.debug_depth == 0 {
            return Err(GraphicsError::usage("pop_debug_group without an open group"));
        }
        self.commit(vec![NativeCommand::EndEvent])?;
        self.recorder.debug_depth -= 1;
        Ok(())
    }

    /// Insert a named marker.
    pub fn insert_debug_marker(&mut self, name: &str) -> GraphicsResult<()> {
        self.check_recording()?;
        self.commit(vec![NativeCommand::SetMarker(name.to_string())])
    }

    // ------------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------------

    fn device(&self) -> GraphicsResult<Arc<GraphicsDevice>> {
        self.core
            .device()
            .ok_or_else(|| GraphicsError::Disposed("graphics device".to_string()))
    }

    fn disposed_error(&self) -> GraphicsError {
        GraphicsError::Disposed(format!("command list {:?}", self.label))
    }

    fn bound_framebuffer(&self) -> GraphicsResult<Arc<Framebuffer>> {
        self.recorder
            .framebuffer
            .clone()
            .ok_or_else(|| GraphicsError::usage("no framebuffer is bound"))
    }

    /// Catch up with a forced reset, then require `Recording`.
    fn check_recording(&mut self) -> GraphicsResult<()> {
        let (state, epoch) = {
            let shared = self.shared.lock();
            (shared.state, shared.epoch)
        };
        if epoch != self.epoch {
            log::debug!("CommandList {:?}: dropping state after a forced reset", self.label);
            self.epoch = epoch;
            self.reset_local();
        }
        match state {
            CommandListState::Recording => Ok(()),
            CommandListState::Disposed => Err(self.disposed_error()),
            state => Err(GraphicsError::usage(format!(
                "command list is {state:?}; call begin() before recording"
            ))),
        }
    }

    /// Append commands unless a forced reset happened since the last check.
    fn commit(&mut self, commands: Vec<NativeCommand>) -> GraphicsResult<()> {
        let mut shared = self.shared.lock();
        if shared.epoch != self.epoch {
            return Err(reset_while_recording());
        }
        if !commands.is_empty() {
            shared.forced_reset = false;
            shared.commands.extend(commands);
        }
        Ok(())
    }

    fn reset_local(&mut self) {
        self.recorder = Recorder::default();
        self.release_staging();
        self.unregister_all();
    }

    fn release_staging(&mut self) {
        if self.staging.is_empty() {
            return;
        }
        let staging = std::mem::take(&mut self.staging);
        match self.core.device() {
            Some(device) => device.release_staging(staging),
            None => staging.iter().for_each(|s| s.buffer().dispose()),
        }
    }

    fn unregister_all(&mut self) {
        for registry in self.registries.drain(..) {
            registry.unregister(&self.shared);
        }
    }
}

fn reset_while_recording() -> GraphicsError {
    GraphicsError::usage("command list was reset by a swapchain resize while recording")
}

impl Drop for CommandList {
    fn drop(&mut self) {
        self.release_staging();
        self.unregister_all();
    }
}

impl std::fmt::Debug for CommandList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandList")
            .field("id", &self.id())
            .field("label", &self.label)
            .field("state", &self.state())
            .field("commands", &self.recorded_command_count())
            .finish()
    }
}

// Ensure CommandList is Send
static_assertions::assert_impl_all!(CommandList: Send);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::test_device;
    use crate::types::{
        BufferDescriptor, FramebufferAttachmentDescription, FramebufferDescriptor,
        OutputAttachmentDescription, OutputDescription, ShaderDescriptor, ShaderSetDescription,
        TextureDescriptor, TextureFormat, TextureSampleCount, GraphicsPipelineDescriptor,
    };
    use crate::GraphicsDevice;

    fn color_target(device: &Arc<GraphicsDevice>) -> Arc<Framebuffer> {
        let texture = device
            .create_texture(&TextureDescriptor::new_2d(
                64,
                32,
                TextureFormat::Rgba8Unorm,
                TextureUsage::RENDER_TARGET | TextureUsage::SAMPLED,
            ))
            .unwrap();
        device
            .create_framebuffer(&FramebufferDescriptor::new(
                vec![FramebufferAttachmentDescription::new(texture)],
                None,
            ))
            .unwrap()
    }

    fn pipeline(device: &Arc<GraphicsDevice>) -> Arc<Pipeline> {
        let vs = device
            .create_shader(&ShaderDescriptor::new(ShaderStages::VERTEX, b"vs".to_vec()))
            .unwrap();
        let fs = device
            .create_shader(&ShaderDescriptor::new(ShaderStages::FRAGMENT, b"fs".to_vec()))
            .unwrap();
        let outputs = OutputDescription {
            depth_attachment: None,
            color_attachments: vec![OutputAttachmentDescription {
                format: TextureFormat::Rgba8Unorm,
            }],
            sample_count: TextureSampleCount::Count1,
        };
        device
            .create_graphics_pipeline(&GraphicsPipelineDescriptor::new(
                ShaderSetDescription::new(vec![], vec![vs, fs]),
                vec![],
                outputs,
            ))
            .unwrap()
    }

    #[test]
    fn test_state_machine() {
        let device = test_device();
        let mut list = device.create_command_list().unwrap();
        assert_eq!(list.state(), CommandListState::Empty);
        assert!(matches!(list.insert_debug_marker("x"), Err(GraphicsError::Usage(_))));

        list.begin().unwrap();
        assert_eq!(list.state(), CommandListState::Recording);
        list.insert_debug_marker("x").unwrap();
        list.end().unwrap();
        assert_eq!(list.state(), CommandListState::ReadyToExecute);
        assert!(list.end().is_err());

        device.submit_commands(&mut list, None).unwrap();
        assert_eq!(list.state(), CommandListState::Empty);
        assert_eq!(list.recorded_command_count(), 0);
    }

    #[test]
    fn test_begin_discards_recorded_commands() {
        let device = test_device();
        let mut list = device.create_command_list().unwrap();
        list.begin().unwrap();
        list.insert_debug_marker("a").unwrap();
        list.end().unwrap();
        list.begin().unwrap();
        assert_eq!(list.recorded_command_count(), 0);
    }

    #[test]
    fn test_end_rejects_open_scopes() {
        let device = test_device();
        let framebuffer = color_target(&device);
        let mut list = device.create_command_list().unwrap();
        list.begin().unwrap();
        list.push_debug_group("frame").unwrap();
        assert!(list.end().is_err());
        list.pop_debug_group().unwrap();
        assert!(list.pop_debug_group().is_err());

        list.set_framebuffer(&framebuffer).unwrap();
        list.begin_render_pass(&RenderPassDescriptor::default()).unwrap();
        assert!(list.end().is_err());
        list.end_render_pass().unwrap();
        list.end().unwrap();
    }

    #[test]
    fn test_draw_validation() {
        let device = test_device();
        let framebuffer = color_target(&device);
        let pipeline = pipeline(&device);
        let mut list = device.create_command_list().unwrap();
        list.begin().unwrap();

        assert!(matches!(list.draw(3, 1, 0, 0), Err(GraphicsError::Usage(_))));
        list.set_pipeline(&pipeline).unwrap();
        assert!(matches!(list.draw(3, 1, 0, 0), Err(GraphicsError::Usage(_))));
        list.set_framebuffer(&framebuffer).unwrap();
        list.draw(3, 1, 0, 0).unwrap();
        assert!(matches!(
            list.draw_indexed(3, 1, 0, 0, 0),
            Err(GraphicsError::Usage(_))
        ));
        assert!(matches!(list.dispatch(1, 1, 1), Err(GraphicsError::Usage(_))));
    }

    #[test]
    fn test_unchanged_pipeline_state_is_not_reemitted() {
        let device = test_device();
        let framebuffer = color_target(&device);
        let pipeline = pipeline(&device);
        let mut list = device.create_command_list().unwrap();
        list.begin().unwrap();
        list.set_framebuffer(&framebuffer).unwrap();
        list.set_pipeline(&pipeline).unwrap();
        let after_first = list.recorded_command_count();
        list.set_pipeline(&pipeline).unwrap();
        assert_eq!(list.recorded_command_count(), after_first);

        list.draw(3, 1, 0, 0).unwrap();
        list.draw(3, 1, 0, 0).unwrap();
        let commands = list.recorded_commands();
        let viewports = commands
            .iter()
            .filter(|c| matches!(c, NativeCommand::SetViewports(_)))
            .count();
        assert_eq!(viewports, 1);
    }

    #[test]
    fn test_render_pass_load_actions() {
        let device = test_device();
        let framebuffer = color_target(&device);
        let mut list = device.create_command_list().unwrap();
        list.begin().unwrap();
        list.set_framebuffer(&framebuffer).unwrap();
        list.begin_render_pass(&RenderPassDescriptor {
            color_attachments: vec![crate::types::ColorAttachmentOps::dont_care()],
            depth_stencil: None,
        })
        .unwrap();
        assert!(matches!(
            list.recorded_commands().last(),
            Some(NativeCommand::DiscardView(_))
        ));
        list.end_render_pass().unwrap();
        list.begin_render_pass(&RenderPassDescriptor::clear_all(RgbaFloat::WHITE, 1.0))
            .unwrap();
        assert!(matches!(
            list.recorded_commands().last(),
            Some(NativeCommand::ClearRenderTarget { color, .. }) if *color == RgbaFloat::WHITE
        ));
    }

    #[test]
    fn test_copy_bounds() {
        let device = test_device();
        let a = device
            .create_buffer(&BufferDescriptor::new(64, BufferUsage::VERTEX))
            .unwrap();
        let b = device
            .create_buffer(&BufferDescriptor::new(32, BufferUsage::VERTEX))
            .unwrap();
        let mut list = device.create_command_list().unwrap();
        list.begin().unwrap();
        list.copy_buffer(&a, 0, &b, 0, 32).unwrap();
        assert!(matches!(
            list.copy_buffer(&a, 0, &b, 16, 32),
            Err(GraphicsError::Usage(_))
        ));
        assert!(matches!(
            list.copy_buffer(&a, 0, &a, 16, 32),
            Err(GraphicsError::Usage(_))
        ));
    }

    #[test]
    fn test_resolve_needs_multisampled_source() {
        let device = test_device();
        let desc = TextureDescriptor::new_2d(8, 8, TextureFormat::Rgba8Unorm, TextureUsage::RENDER_TARGET);
        let single = device.create_texture(&desc).unwrap();
        let single2 = device.create_texture(&desc).unwrap();
        let multi = device
            .create_texture(&desc.clone().with_sample_count(TextureSampleCount::Count4))
            .unwrap();
        let mut list = device.create_command_list().unwrap();
        list.begin().unwrap();
        assert!(matches!(
            list.resolve_texture(&single, &single2),
            Err(GraphicsError::Usage(_))
        ));
        list.resolve_texture(&multi, &single).unwrap();
    }

    #[test]
    fn test_generate_mipmaps_needs_usage() {
        let device = test_device();
        let plain = device
            .create_texture(
                &TextureDescriptor::new_2d(16, 16, TextureFormat::Rgba8Unorm, TextureUsage::SAMPLED)
                    .with_mip_levels(3),
            )
            .unwrap();
        let mipped = device
            .create_texture(
                &TextureDescriptor::new_2d(
                    16,
                    16,
                    TextureFormat::Rgba8Unorm,
                    TextureUsage::SAMPLED | TextureUsage::RENDER_TARGET | TextureUsage::GENERATE_MIPMAPS,
                )
                .with_mip_levels(3),
            )
            .unwrap();
        let mut list = device.create_command_list().unwrap();
        list.begin().unwrap();
        assert!(matches!(list.generate_mipmaps(&plain), Err(GraphicsError::Usage(_))));
        list.generate_mipmaps(&mipped).unwrap();
    }

    #[test]
    fn test_indirect_needs_indirect_usage() {
        let device = test_device();
        let framebuffer = color_target(&device);
        let pipeline = pipeline(&device);
        let args = device
            .create_buffer(&BufferDescriptor::new(DrawIndirectArgs::SIZE, BufferUsage::VERTEX))
            .unwrap();
        let mut list = device.create_command_list().unwrap();
        list.begin().unwrap();
        list.set_framebuffer(&framebuffer).unwrap();
        list.set_pipeline(&pipeline).unwrap();
        assert!(matches!(
            list.draw_indirect(&args, 0, 1, DrawIndirectArgs::SIZE as u32),
            Err(GraphicsError::Usage(_))
        ));
    }
}
