//! Framebuffer and render pass descriptions.

use std::sync::Arc;

use super::RgbaFloat;
use crate::resources::Texture;

/// One attachment of a framebuffer.
#[derive(Debug, Clone)]
pub struct FramebufferAttachmentDescription {
    /// Target texture.
    pub target: Arc<Texture>,
    /// Mip level rendered to.
    pub mip_level: u32,
    /// Array layer rendered to.
    pub array_layer: u32,
}

impl FramebufferAttachmentDescription {
    /// Attach mip 0, layer 0 of a texture.
    pub fn new(target: Arc<Texture>) -> Self {
        Self {
            target,
            mip_level: 0,
            array_layer: 0,
        }
    }

    /// Attach a specific mip level and array layer.
    pub fn with_subresource(mut self, mip_level: u32, array_layer: u32) -> Self {
        self.mip_level = mip_level;
        self.array_layer = array_layer;
        self
    }
}

/// Descriptor for creating a framebuffer.
#[derive(Debug, Clone, Default)]
pub struct FramebufferDescriptor {
    /// Debug label.
    pub label: Option<String>,
    /// Optional depth/stencil attachment.
    pub depth_target: Option<FramebufferAttachmentDescription>,
    /// Color attachments in order.
    pub color_targets: Vec<FramebufferAttachmentDescription>,
}

impl FramebufferDescriptor {
    /// Create a framebuffer descriptor.
    pub fn new(
        color_targets: Vec<FramebufferAttachmentDescription>,
        depth_target: Option<FramebufferAttachmentDescription>,
    ) -> Self {
        Self {
            label: None,
            depth_target,
            color_targets,
        }
    }

    /// Set the debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

// ============================================================================
// Render pass
// ============================================================================

/// What happens to an attachment's contents when a render pass begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LoadAction {
    /// Clear to the given value.
    Clear,
    /// Preserve existing contents.
    #[default]
    Load,
    /// Contents are undefined; the attachment is discarded.
    DontCare,
}

/// Load operation for one color attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ColorAttachmentOps {
    /// Load action.
    pub load: LoadAction,
    /// Clear color used with [`LoadAction::Clear`].
    pub clear_color: RgbaFloat,
}

impl ColorAttachmentOps {
    /// Clear to a color.
    pub fn clear(color: RgbaFloat) -> Self {
        Self {
            load: LoadAction::Clear,
            clear_color: color,
        }
    }

    /// Preserve contents.
    pub fn load() -> Self {
        Self::default()
    }

    /// Discard contents.
    pub fn dont_care() -> Self {
        Self {
            load: LoadAction::DontCare,
            clear_color: RgbaFloat::CLEAR,
        }
    }
}

/// Load operation for the depth/stencil attachment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthStencilOps {
    /// Load action.
    pub load: LoadAction,
    /// Clear depth used with [`LoadAction::Clear`].
    pub clear_depth: f32,
    /// Clear stencil used with [`LoadAction::Clear`].
    pub clear_stencil: u8,
}

impl DepthStencilOps {
    /// Clear depth and stencil.
    pub fn clear(depth: f32, stencil: u8) -> Self {
        Self {
            load: LoadAction::Clear,
            clear_depth: depth,
            clear_stencil: stencil,
        }
    }
}

impl Default for DepthStencilOps {
    fn default() -> Self {
        Self {
            load: LoadAction::Load,
            clear_depth: 1.0,
            clear_stencil: 0,
        }
    }
}

/// Load actions for every attachment of a framebuffer.
///
/// Missing color entries default to [`LoadAction::Load`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RenderPassDescriptor {
    /// Per color attachment, in framebuffer order.
    pub color_attachments: Vec<ColorAttachmentOps>,
    /// Depth/stencil attachment.
    pub depth_stencil: Option<DepthStencilOps>,
}

impl RenderPassDescriptor {
    /// Clear the first color attachment and the depth attachment.
    pub fn clear_all(color: RgbaFloat, depth: f32) -> Self {
        Self {
            color_attachments: vec![ColorAttachmentOps::clear(color)],
            depth_stencil: Some(DepthStencilOps::clear(depth, 0)),
        }
    }

    /// Load action for color attachment `index`.
    pub fn color_ops(&self, index: usize) -> ColorAttachmentOps {
        self.color_attachments
            .get(index)
            .copied()
            .unwrap_or_default()
    }
}
