//! Swapchains and the framebuffer each one owns.
//!
//! A swapchain owns exactly one [`Framebuffer`] whose color attachment is the
//! current backbuffer, plus an optional depth attachment. Resizing destroys
//! and recreates both. Command lists that recorded against the old
//! framebuffer cannot be submitted any more: every list that bound it is
//! registered with the swapchain and is forced back to an empty recording
//! state by [`Swapchain::resize`].

use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::backend::{NativeObject, NativeSwapchain};
use crate::command_list::RecordingShared;
use crate::error::{GraphicsError, GraphicsResult};
use crate::format;
use crate::resources::{DeviceResource, Framebuffer, ResourceCore, ResourceId, Texture};
use crate::types::{
    FramebufferAttachmentDescription, FramebufferDescriptor, SwapchainDescriptor,
    TextureDescriptor, TextureFormat, TextureUsage,
};

/// Command lists that recorded against a swapchain framebuffer.
#[derive(Debug, Default)]
pub struct RecorderRegistry {
    recorders: Mutex<Vec<Weak<Mutex<RecordingShared>>>>,
}

impl RecorderRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a recorder. Registering twice is a no-op.
    pub(crate) fn register(&self, recorder: &Arc<Mutex<RecordingShared>>) {
        let mut recorders = self.recorders.lock();
        recorders.retain(|weak| weak.strong_count() > 0);
        let weak = Arc::downgrade(recorder);
        if !recorders.iter().any(|existing| existing.ptr_eq(&weak)) {
            recorders.push(weak);
        }
    }

    /// Forget a recorder, e.g. once its list was submitted.
    pub(crate) fn unregister(&self, recorder: &Arc<Mutex<RecordingShared>>) {
        let weak = Arc::downgrade(recorder);
        self.recorders
            .lock()
            .retain(|existing| existing.strong_count() > 0 && !existing.ptr_eq(&weak));
    }

    /// Force every registered recorder back to an empty recording state and
    /// clear the registry. Returns the number of commands discarded.
    pub fn reset_all(&self) -> usize {
        let recorders = std::mem::take(&mut *self.recorders.lock());
        recorders
            .iter()
            .filter_map(Weak::upgrade)
            .map(|recorder| recorder.lock().force_reset())
            .sum()
    }

    /// Number of live registered recorders.
    pub fn len(&self) -> usize {
        self.recorders
            .lock()
            .iter()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }

    /// Returns true if no live recorder is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug)]
struct Targets {
    framebuffer: Arc<Framebuffer>,
    backbuffer: Arc<Texture>,
    depth: Option<Arc<Texture>>,
}

impl Targets {
    fn dispose(&self) {
        self.framebuffer.dispose();
        self.backbuffer.dispose();
        if let Some(depth) = &self.depth {
            depth.dispose();
        }
    }
}

#[derive(Debug)]
struct SwapchainState {
    targets: Option<Targets>,
    width: u32,
    height: u32,
    sync_to_vertical_blank: bool,
}

/// A presentable chain of backbuffers.
///
/// Created by [`GraphicsDevice::create_swapchain`](crate::GraphicsDevice::create_swapchain).
pub struct Swapchain {
    core: ResourceCore,
    label: Option<String>,
    native: NativeSwapchain,
    color_format: TextureFormat,
    depth_format: Option<TextureFormat>,
    state: Mutex<SwapchainState>,
    recorders: Arc<RecorderRegistry>,
}

impl Swapchain {
    pub(crate) fn create(core: ResourceCore, descriptor: &SwapchainDescriptor) -> GraphicsResult<Self> {
        if descriptor.width == 0 || descriptor.height == 0 {
            return Err(GraphicsError::InvalidParameter(format!(
                "swapchain size {}x{} must be non-zero",
                descriptor.width, descriptor.height
            )));
        }
        if let Some(depth) = descriptor.depth_format {
            if !depth.is_depth_stencil() {
                return Err(GraphicsError::InvalidParameter(format!(
                    "{depth:?} is not a depth format"
                )));
            }
        }

        let native = core.backend().create_swapchain(descriptor)?;
        let swapchain = Self {
            core,
            label: descriptor.label.clone(),
            native,
            color_format: descriptor.color_format,
            depth_format: descriptor.depth_format,
            state: Mutex::new(SwapchainState {
                targets: None,
                width: descriptor.width,
                height: descriptor.height,
                sync_to_vertical_blank: descriptor.sync_to_vertical_blank,
            }),
            recorders: Arc::new(RecorderRegistry::new()),
        };
        {
            let mut state = swapchain.state.lock();
            state.targets = Some(swapchain.create_targets(state.width, state.height)?);
        }
        log::debug!(
            "Swapchain {:?} created ({}x{}, depth {:?})",
            swapchain.label,
            descriptor.width,
            descriptor.height,
            descriptor.depth_format
        );
        Ok(swapchain)
    }

    fn create_targets(&self, width: u32, height: u32) -> GraphicsResult<Targets> {
        let backend = self.core.backend();
        let backbuffer_native = backend.swapchain_backbuffer(self.native)?;
        let backbuffer = Arc::new(Texture::borrowed(
            self.core.sibling(),
            TextureDescriptor::new_2d(width, height, self.color_format, TextureUsage::RENDER_TARGET)
                .with_label("backbuffer"),
            backbuffer_native,
        ));

        let depth = match self.depth_format {
            Some(depth_format) => {
                let descriptor = TextureDescriptor::new_2d(
                    width,
                    height,
                    depth_format,
                    TextureUsage::DEPTH_STENCIL,
                )
                .with_label("swapchain depth");
                let native = backend.create_texture(&descriptor, format::texture_storage_format(&descriptor))?;
                Some(Arc::new(Texture::new(self.core.sibling(), descriptor, native)))
            }
            None => None,
        };

        let descriptor = FramebufferDescriptor::new(
            vec![FramebufferAttachmentDescription::new(Arc::clone(&backbuffer))],
            depth.clone().map(FramebufferAttachmentDescription::new),
        )
        .with_label("swapchain framebuffer");
        let framebuffer = match Framebuffer::create(
            self.core.sibling(),
            &descriptor,
            Some(Arc::clone(&self.recorders)),
        ) {
            Ok(framebuffer) => Arc::new(framebuffer),
            Err(err) => {
                if let Some(depth) = &depth {
                    depth.dispose();
                }
                return Err(err);
            }
        };

        Ok(Targets {
            framebuffer,
            backbuffer,
            depth,
        })
    }

    /// Device-unique id.
    pub fn id(&self) -> ResourceId {
        self.core.id()
    }

    /// Get the swapchain label, if set.
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// The framebuffer whose color attachment is the current backbuffer.
    pub fn framebuffer(&self) -> GraphicsResult<Arc<Framebuffer>> {
        self.core.check("swapchain", self.label())?;
        self.state
            .lock()
            .targets
            .as_ref()
            .map(|targets| Arc::clone(&targets.framebuffer))
            .ok_or_else(|| GraphicsError::Disposed(format!("swapchain {:?}", self.label)))
    }

    /// Current backbuffer size.
    pub fn size(&self) -> (u32, u32) {
        let state = self.state.lock();
        (state.width, state.height)
    }

    /// Backbuffer format.
    pub fn color_format(&self) -> TextureFormat {
        self.color_format
    }

    /// Depth attachment format, if the swapchain has one.
    pub fn depth_format(&self) -> Option<TextureFormat> {
        self.depth_format
    }

    /// Whether presentation waits for vertical blank.
    pub fn sync_to_vertical_blank(&self) -> bool {
        self.state.lock().sync_to_vertical_blank
    }

    /// Change vertical-blank synchronization for future presents.
    pub fn set_sync_to_vertical_blank(&self, sync: bool) {
        self.state.lock().sync_to_vertical_blank = sync;
    }

    /// Command lists currently registered against the framebuffer.
    pub fn registered_recorders(&self) -> usize {
        self.recorders.len()
    }

    /// Resize the backbuffers.
    ///
    /// The framebuffer and depth attachment are recreated; previously
    /// returned framebuffers become disposed. Every command list that bound
    /// the old framebuffer loses its recorded commands.
    pub fn resize(&self, width: u32, height: u32) -> GraphicsResult<()> {
        self.core.check("swapchain", self.label())?;
        if width == 0 || height == 0 {
            return Err(GraphicsError::InvalidParameter(format!(
                "swapchain size {width}x{height} must be non-zero"
            )));
        }

        let device = self.core.device();
        let _context = device.as_ref().map(|device| device.lock_context());
        let mut state = self.state.lock();

        let discarded = self.recorders.reset_all();
        if discarded > 0 {
            log::warn!(
                "Swapchain {:?} resize discarded {discarded} recorded commands",
                self.label
            );
        }

        if let Some(targets) = state.targets.take() {
            targets.dispose();
        }
        self.core
            .backend()
            .resize_swapchain(self.native, width, height)?;
        state.targets = Some(self.create_targets(width, height)?);
        state.width = width;
        state.height = height;
        log::debug!("Swapchain {:?} resized to {width}x{height}", self.label);
        Ok(())
    }

    /// Present the current backbuffer (called by the device under its lock).
    pub(crate) fn present(&self) -> GraphicsResult<()> {
        self.core.check("swapchain", self.label())?;
        let sync_interval = u32::from(self.sync_to_vertical_blank());
        self.core.backend().present(self.native, sync_interval)
    }

    /// Returns true once [`dispose`](Self::dispose) has run.
    pub fn is_disposed(&self) -> bool {
        self.core.is_disposed()
    }

    /// Release the framebuffer, depth attachment and native swapchain.
    pub fn dispose(&self) {
        if !self.core.mark_disposed() {
            return;
        }
        self.recorders.reset_all();
        if let Some(targets) = self.state.lock().targets.take() {
            targets.dispose();
        }
        self.core
            .backend()
            .destroy(NativeObject::Swapchain(self.native));
    }
}

impl DeviceResource for Swapchain {
    fn dispose(&self) {
        Swapchain::dispose(self);
    }

    fn is_disposed(&self) -> bool {
        Swapchain::is_disposed(self)
    }
}

impl std::fmt::Debug for Swapchain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (width, height) = self.size();
        f.debug_struct("Swapchain")
            .field("id", &self.id())
            .field("width", &width)
            .field("height", &height)
            .field("color_format", &self.color_format)
            .field("depth_format", &self.depth_format)
            .field("label", &self.label)
            .finish()
    }
}

static_assertions::assert_impl_all!(Swapchain: Send, Sync);
static_assertions::assert_impl_all!(RecorderRegistry: Send, Sync);
