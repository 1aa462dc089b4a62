//! Framebuffers: color and depth attachments rendered to together.

use std::sync::Arc;

use super::{DeviceResource, ResourceCore, ResourceId, Texture};
use crate::backend::{NativeObject, NativeView};
use crate::error::{GraphicsError, GraphicsResult};
use crate::swapchain::RecorderRegistry;
use crate::types::{
    FramebufferAttachmentDescription, FramebufferDescriptor, OutputAttachmentDescription,
    OutputDescription, TextureSampleCount, TextureUsage,
};

/// A set of render targets.
///
/// Every attachment has the same width, height and sample count, taken from
/// the attached mip level. Swapchain framebuffers additionally carry the
/// registry of command lists that recorded against them.
pub struct Framebuffer {
    core: ResourceCore,
    label: Option<String>,
    color_targets: Vec<FramebufferAttachmentDescription>,
    depth_target: Option<FramebufferAttachmentDescription>,
    color_views: Vec<NativeView>,
    depth_view: Option<NativeView>,
    width: u32,
    height: u32,
    sample_count: TextureSampleCount,
    outputs: OutputDescription,
    recorders: Option<Arc<RecorderRegistry>>,
}

impl Framebuffer {
    /// Validate a descriptor and create the attachment views.
    pub(crate) fn create(
        core: ResourceCore,
        descriptor: &FramebufferDescriptor,
        recorders: Option<Arc<RecorderRegistry>>,
    ) -> GraphicsResult<Self> {
        let (width, height, sample_count) = validate(descriptor)?;

        let mut color_views = Vec::with_capacity(descriptor.color_targets.len());
        for attachment in &descriptor.color_targets {
            match attachment
                .target
                .create_attachment_view(attachment.mip_level, attachment.array_layer)
            {
                Ok(view) => color_views.push(view),
                Err(err) => {
                    destroy_views(&core, color_views.drain(..));
                    return Err(err);
                }
            }
        }
        let depth_view = match &descriptor.depth_target {
            Some(attachment) => match attachment
                .target
                .create_attachment_view(attachment.mip_level, attachment.array_layer)
            {
                Ok(view) => Some(view),
                Err(err) => {
                    destroy_views(&core, color_views.drain(..));
                    return Err(err);
                }
            },
            None => None,
        };

        let outputs = OutputDescription {
            depth_attachment: descriptor
                .depth_target
                .as_ref()
                .map(|attachment| OutputAttachmentDescription {
                    format: attachment.target.format(),
                }),
            color_attachments: descriptor
                .color_targets
                .iter()
                .map(|attachment| OutputAttachmentDescription {
                    format: attachment.target.format(),
                })
                .collect(),
            sample_count,
        };

        Ok(Self {
            core,
            label: descriptor.label.clone(),
            color_targets: descriptor.color_targets.clone(),
            depth_target: descriptor.depth_target.clone(),
            color_views,
            depth_view,
            width,
            height,
            sample_count,
            outputs,
            recorders,
        })
    }

    /// Device-unique id.
    pub fn id(&self) -> ResourceId {
        self.core.id()
    }

    /// Get the framebuffer label, if set.
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Attachment width.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Attachment height.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Sample count shared by all attachments.
    pub fn sample_count(&self) -> TextureSampleCount {
        self.sample_count
    }

    /// Color attachments, in order.
    pub fn color_targets(&self) -> &[FramebufferAttachmentDescription] {
        &self.color_targets
    }

    /// Depth attachment, if any.
    pub fn depth_target(&self) -> Option<&FramebufferAttachmentDescription> {
        self.depth_target.as_ref()
    }

    /// Output signature pipelines must match to render here.
    pub fn outputs(&self) -> &OutputDescription {
        &self.outputs
    }

    /// Returns true for a swapchain-owned framebuffer.
    pub fn is_swapchain_framebuffer(&self) -> bool {
        self.recorders.is_some()
    }

    /// Ids of every attached texture.
    pub fn attachment_ids(&self) -> Vec<ResourceId> {
        self.color_targets
            .iter()
            .chain(self.depth_target.iter())
            .map(|attachment| attachment.target.id())
            .collect()
    }

    /// Returns true once [`dispose`](Self::dispose) has run.
    pub fn is_disposed(&self) -> bool {
        self.core.is_disposed()
    }

    /// Release the attachment views. Attached textures are untouched.
    pub fn dispose(&self) {
        if self.core.mark_disposed() {
            destroy_views(
                &self.core,
                self.color_views.iter().chain(self.depth_view.iter()).copied(),
            );
        }
    }

    pub(crate) fn check_alive(&self) -> GraphicsResult<()> {
        self.core.check("framebuffer", self.label())
    }

    pub(crate) fn color_views(&self) -> &[NativeView] {
        &self.color_views
    }

    pub(crate) fn depth_view(&self) -> Option<NativeView> {
        self.depth_view
    }

    pub(crate) fn recorders(&self) -> Option<&Arc<RecorderRegistry>> {
        self.recorders.as_ref()
    }
}

fn destroy_views(core: &ResourceCore, views: impl Iterator<Item = NativeView>) {
    for view in views {
        core.backend().destroy(NativeObject::View(view));
    }
}

/// Returns the shared width, height and sample count.
fn validate(descriptor: &FramebufferDescriptor) -> GraphicsResult<(u32, u32, TextureSampleCount)> {
    let mut shared: Option<(u32, u32, TextureSampleCount)> = None;
    let attachments = descriptor
        .color_targets
        .iter()
        .map(|attachment| (attachment, false))
        .chain(descriptor.depth_target.iter().map(|attachment| (attachment, true)));

    for (attachment, is_depth) in attachments {
        let texture: &Texture = &attachment.target;
        texture.check_alive()?;
        texture.subresource(attachment.mip_level, attachment.array_layer)?;

        if is_depth {
            if !texture.usage().contains(TextureUsage::DEPTH_STENCIL) || !texture.format().is_depth_stencil() {
                return Err(GraphicsError::usage(format!(
                    "depth attachment {:?} needs DEPTH_STENCIL usage and a depth format",
                    texture.label()
                )));
            }
        } else if !texture.usage().contains(TextureUsage::RENDER_TARGET) || texture.format().is_depth_stencil() {
            return Err(GraphicsError::usage(format!(
                "color attachment {:?} needs RENDER_TARGET usage and a color format",
                texture.label()
            )));
        }

        let extent = texture.descriptor().mip_extent(attachment.mip_level);
        let current = (extent.width, extent.height, texture.sample_count());
        match shared {
            None => shared = Some(current),
            Some(expected) if expected != current => {
                return Err(GraphicsError::usage(format!(
                    "framebuffer attachments disagree: {}x{} {:?} vs {}x{} {:?}",
                    expected.0, expected.1, expected.2, current.0, current.1, current.2
                )));
            }
            Some(_) => {}
        }
    }

    shared.ok_or_else(|| GraphicsError::usage("framebuffer needs at least one attachment"))
}

impl DeviceResource for Framebuffer {
    fn dispose(&self) {
        Framebuffer::dispose(self);
    }

    fn is_disposed(&self) -> bool {
        Framebuffer::is_disposed(self)
    }
}

impl std::fmt::Debug for Framebuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Framebuffer")
            .field("id", &self.id())
            .field("width", &self.width)
            .field("height", &self.height)
            .field("colors", &self.color_targets.len())
            .field("depth", &self.depth_target.is_some())
            .field("label", &self.label)
            .finish()
    }
}

static_assertions::assert_impl_all!(Framebuffer: Send, Sync);
