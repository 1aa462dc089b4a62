//! GPU texture resource and texture views.

use std::sync::Arc;

use parking_lot::Mutex;

use super::{DeviceResource, ResourceCore, ResourceId};
use crate::backend::{NativeObject, NativeTexture, NativeView, NativeViewDescriptor};
use crate::device::GraphicsDevice;
use crate::error::{GraphicsError, GraphicsResult};
use crate::format::{self, NativeFormat};
use crate::types::{
    Extent3d, TextureDescriptor, TextureFormat, TextureSampleCount, TextureType, TextureUsage,
    TextureViewDescriptor,
};

/// Lazily created native views covering a texture range.
#[derive(Debug, Default)]
struct NativeViews {
    read: Option<NativeView>,
    read_write: Option<NativeView>,
}

impl NativeViews {
    fn destroy(&mut self, core: &ResourceCore) {
        for view in [self.read.take(), self.read_write.take()].into_iter().flatten() {
            core.backend().destroy(NativeObject::View(view));
        }
    }
}

/// A resolved mip/array range and view format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ViewRange {
    base_mip_level: u32,
    mip_levels: u32,
    base_array_layer: u32,
    array_layers: u32,
    format: TextureFormat,
}

/// A GPU texture resource.
///
/// Textures are created by [`GraphicsDevice::create_texture`] and are reference-counted.
/// They hold a weak reference back to their parent device.
///
/// Binding a texture directly in a resource set goes through its *full view*,
/// created on first use and cached until the texture is disposed.
///
/// # Example
///
/// ```ignore
/// let texture = device.create_texture(&TextureDescriptor::new_2d(
///     1920, 1080,
///     TextureFormat::Rgba8Unorm,
///     TextureUsage::RENDER_TARGET | TextureUsage::SAMPLED,
/// ))?;
/// println!("Texture size: {}x{}", texture.width(), texture.height());
/// ```
pub struct Texture {
    core: ResourceCore,
    descriptor: TextureDescriptor,
    native: NativeTexture,
    owned: bool,
    views: Mutex<NativeViews>,
}

impl Texture {
    /// Create a new texture (called by GraphicsDevice).
    pub(crate) fn new(core: ResourceCore, descriptor: TextureDescriptor, native: NativeTexture) -> Self {
        Self {
            core,
            descriptor,
            native,
            owned: true,
            views: Mutex::new(NativeViews::default()),
        }
    }

    /// Wrap a texture owned by someone else, e.g. a swapchain backbuffer.
    pub(crate) fn borrowed(core: ResourceCore, descriptor: TextureDescriptor, native: NativeTexture) -> Self {
        Self {
            owned: false,
            ..Self::new(core, descriptor, native)
        }
    }

    /// Device-unique id.
    pub fn id(&self) -> ResourceId {
        self.core.id()
    }

    /// Get the parent device, if it still exists.
    pub fn device(&self) -> Option<Arc<GraphicsDevice>> {
        self.core.device()
    }

    /// Get the texture descriptor.
    pub fn descriptor(&self) -> &TextureDescriptor {
        &self.descriptor
    }

    /// Get the texture size.
    pub fn size(&self) -> Extent3d {
        self.descriptor.size
    }

    /// Get the texture width.
    pub fn width(&self) -> u32 {
        self.descriptor.size.width
    }

    /// Get the texture height.
    pub fn height(&self) -> u32 {
        self.descriptor.size.height
    }

    /// Get the texture depth.
    pub fn depth(&self) -> u32 {
        self.descriptor.size.depth
    }

    /// Get the texture format.
    pub fn format(&self) -> TextureFormat {
        self.descriptor.format
    }

    /// Get the usage flags.
    pub fn usage(&self) -> TextureUsage {
        self.descriptor.usage
    }

    /// Get the texture dimensionality.
    pub fn texture_type(&self) -> TextureType {
        self.descriptor.texture_type
    }

    /// Get the mip level count.
    pub fn mip_level_count(&self) -> u32 {
        self.descriptor.mip_level_count
    }

    /// Get the array layer count, counting cube faces individually.
    pub fn array_layers(&self) -> u32 {
        self.descriptor.effective_array_layers()
    }

    /// Get the sample count.
    pub fn sample_count(&self) -> TextureSampleCount {
        self.descriptor.sample_count
    }

    /// Get the texture label, if set.
    pub fn label(&self) -> Option<&str> {
        self.descriptor.label.as_deref()
    }

    /// Returns true once [`dispose`](Self::dispose) has run.
    pub fn is_disposed(&self) -> bool {
        self.core.is_disposed()
    }

    /// Release the cached views and, unless a swapchain owns it, the texture.
    pub fn dispose(&self) {
        if !self.core.mark_disposed() {
            return;
        }
        self.views.lock().destroy(&self.core);
        if self.owned {
            self.core.backend().destroy(NativeObject::Texture(self.native));
        }
        log::trace!("Texture {:?} disposed", self.label());
    }

    pub(crate) fn check_alive(&self) -> GraphicsResult<()> {
        self.core.check("texture", self.label())
    }

    pub(crate) fn native(&self) -> GraphicsResult<NativeTexture> {
        self.check_alive()?;
        Ok(self.native)
    }

    fn full_range(&self) -> ViewRange {
        ViewRange {
            base_mip_level: 0,
            mip_levels: self.descriptor.mip_level_count,
            base_array_layer: 0,
            array_layers: self.descriptor.effective_array_layers(),
            format: self.descriptor.format,
        }
    }

    /// Cached read view over every subresource.
    pub(crate) fn full_read_view(&self) -> GraphicsResult<NativeView> {
        self.check_alive()?;
        let mut views = self.views.lock();
        read_view(&self.core, self, &mut views, self.full_range())
    }

    /// Cached read-write view over mip 0 and every layer.
    pub(crate) fn full_read_write_view(&self) -> GraphicsResult<NativeView> {
        self.check_alive()?;
        let mut views = self.views.lock();
        read_write_view(&self.core, self, &mut views, self.full_range())
    }

    /// A new render-target or depth-stencil view. The caller owns it.
    pub(crate) fn create_attachment_view(&self, mip_level: u32, array_layer: u32) -> GraphicsResult<NativeView> {
        self.check_alive()?;
        let format = format::texture_format_to_native(self.format(), false);
        let descriptor = if self.format().is_depth_stencil() {
            NativeViewDescriptor::DepthStencil {
                texture: self.native,
                format,
                mip_level,
                array_layer,
            }
        } else {
            NativeViewDescriptor::RenderTarget {
                texture: self.native,
                format,
                mip_level,
                array_layer,
            }
        };
        self.core.backend().create_view(&descriptor)
    }

    /// Linear subresource index, validated against the texture.
    pub(crate) fn subresource(&self, mip_level: u32, array_layer: u32) -> GraphicsResult<u32> {
        if mip_level >= self.mip_level_count() || array_layer >= self.array_layers() {
            return Err(GraphicsError::usage(format!(
                "subresource (mip {mip_level}, layer {array_layer}) is outside texture {:?} \
                 with {} mips and {} layers",
                self.label(),
                self.mip_level_count(),
                self.array_layers()
            )));
        }
        Ok(self.descriptor.subresource_index(mip_level, array_layer))
    }
}

fn read_view(
    core: &ResourceCore,
    texture: &Texture,
    views: &mut NativeViews,
    range: ViewRange,
) -> GraphicsResult<NativeView> {
    if let Some(view) = views.read {
        return Ok(view);
    }
    if !texture
        .usage()
        .intersects(TextureUsage::SAMPLED | TextureUsage::GENERATE_MIPMAPS)
    {
        return Err(GraphicsError::usage(format!(
            "texture {:?} needs SAMPLED usage to be bound through a read view",
            texture.label()
        )));
    }
    let format = view_format(texture, range.format, false)?;
    let view = core.backend().create_view(&NativeViewDescriptor::TextureRead {
        texture: texture.native,
        format,
        base_mip_level: range.base_mip_level,
        mip_levels: range.mip_levels,
        base_array_layer: range.base_array_layer,
        array_layers: range.array_layers,
    })?;
    views.read = Some(view);
    Ok(view)
}

fn read_write_view(
    core: &ResourceCore,
    texture: &Texture,
    views: &mut NativeViews,
    range: ViewRange,
) -> GraphicsResult<NativeView> {
    if let Some(view) = views.read_write {
        return Ok(view);
    }
    if !texture.usage().contains(TextureUsage::STORAGE) {
        return Err(GraphicsError::usage(format!(
            "texture {:?} needs STORAGE usage to be bound through a read-write view",
            texture.label()
        )));
    }
    let format = view_format(texture, range.format, true)?;
    let view = core
        .backend()
        .create_view(&NativeViewDescriptor::TextureReadWrite {
            texture: texture.native,
            format,
            mip_level: range.base_mip_level,
            base_array_layer: range.base_array_layer,
            array_layers: range.array_layers,
        })?;
    views.read_write = Some(view);
    Ok(view)
}

fn view_format(texture: &Texture, format: TextureFormat, read_write: bool) -> GraphicsResult<NativeFormat> {
    if format.is_depth_stencil() && !format::needs_typeless_storage(texture.format(), texture.usage()) {
        return Err(GraphicsError::Unsupported(format!(
            "depth texture {:?} was not created SAMPLED and has no read format",
            texture.label()
        )));
    }
    format::view_format_to_native(format, read_write)
}

impl DeviceResource for Texture {
    fn dispose(&self) {
        Texture::dispose(self);
    }

    fn is_disposed(&self) -> bool {
        Texture::is_disposed(self)
    }
}

impl std::fmt::Debug for Texture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Texture")
            .field("id", &self.id())
            .field("size", &self.descriptor.size)
            .field("format", &self.descriptor.format)
            .field("usage", &self.descriptor.usage)
            .field("label", &self.descriptor.label)
            .finish()
    }
}

// ============================================================================
// TextureView
// ============================================================================

/// A view onto a mip/array sub-range of a texture.
///
/// Hazard tracking keys on the viewed texture, so a read view and a
/// read-write view onto different ranges of one texture still conflict.
pub struct TextureView {
    core: ResourceCore,
    target: Arc<Texture>,
    label: Option<String>,
    range: ViewRange,
    views: Mutex<NativeViews>,
}

impl TextureView {
    /// Create a view (called by GraphicsDevice, after validation).
    pub(crate) fn new(core: ResourceCore, target: Arc<Texture>, descriptor: &TextureViewDescriptor) -> Self {
        let range = ViewRange {
            base_mip_level: descriptor.base_mip_level,
            mip_levels: descriptor.mip_levels,
            base_array_layer: descriptor.base_array_layer,
            array_layers: descriptor.array_layers,
            format: descriptor.format.unwrap_or(target.format()),
        };
        Self {
            core,
            target,
            label: descriptor.label.clone(),
            range,
            views: Mutex::new(NativeViews::default()),
        }
    }

    /// Checks a view descriptor against its target texture.
    pub(crate) fn validate(target: &Texture, descriptor: &TextureViewDescriptor) -> GraphicsResult<()> {
        if descriptor.mip_levels == 0 || descriptor.array_layers == 0 {
            return Err(GraphicsError::InvalidParameter(
                "texture view must cover at least one mip level and array layer".into(),
            ));
        }
        if descriptor.base_mip_level + descriptor.mip_levels > target.mip_level_count()
            || descriptor.base_array_layer + descriptor.array_layers > target.array_layers()
        {
            return Err(GraphicsError::InvalidParameter(format!(
                "view range mips {}+{} layers {}+{} exceeds texture {:?}",
                descriptor.base_mip_level,
                descriptor.mip_levels,
                descriptor.base_array_layer,
                descriptor.array_layers,
                target.label()
            )));
        }
        if let Some(format) = descriptor.format {
            if format.block_size() != target.format().block_size()
                || format.is_depth_stencil() != target.format().is_depth_stencil()
            {
                return Err(GraphicsError::InvalidParameter(format!(
                    "{format:?} cannot reinterpret {:?}",
                    target.format()
                )));
            }
        }
        Ok(())
    }

    /// Device-unique id of the view itself.
    pub fn id(&self) -> ResourceId {
        self.core.id()
    }

    /// The viewed texture.
    pub fn target(&self) -> &Arc<Texture> {
        &self.target
    }

    /// Get the view label, if set.
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// First visible mip level.
    pub fn base_mip_level(&self) -> u32 {
        self.range.base_mip_level
    }

    /// Number of visible mip levels.
    pub fn mip_levels(&self) -> u32 {
        self.range.mip_levels
    }

    /// First visible array layer.
    pub fn base_array_layer(&self) -> u32 {
        self.range.base_array_layer
    }

    /// Number of visible array layers.
    pub fn array_layers(&self) -> u32 {
        self.range.array_layers
    }

    /// Format the view reads and writes through.
    pub fn format(&self) -> TextureFormat {
        self.range.format
    }

    /// Returns true once [`dispose`](Self::dispose) has run.
    pub fn is_disposed(&self) -> bool {
        self.core.is_disposed()
    }

    /// Release the view's native objects. The texture is untouched.
    pub fn dispose(&self) {
        if self.core.mark_disposed() {
            self.views.lock().destroy(&self.core);
        }
    }

    pub(crate) fn check_alive(&self) -> GraphicsResult<()> {
        self.core.check("texture view", self.label())?;
        self.target.check_alive()
    }

    pub(crate) fn read_view(&self) -> GraphicsResult<NativeView> {
        self.check_alive()?;
        let mut views = self.views.lock();
        read_view(&self.core, &self.target, &mut views, self.range)
    }

    pub(crate) fn read_write_view(&self) -> GraphicsResult<NativeView> {
        self.check_alive()?;
        let mut views = self.views.lock();
        read_write_view(&self.core, &self.target, &mut views, self.range)
    }
}

impl DeviceResource for TextureView {
    fn dispose(&self) {
        TextureView::dispose(self);
    }

    fn is_disposed(&self) -> bool {
        TextureView::is_disposed(self)
    }
}

impl std::fmt::Debug for TextureView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextureView")
            .field("id", &self.id())
            .field("target", &self.target.id())
            .field("range", &self.range)
            .finish()
    }
}

// Ensure Texture and TextureView are Send + Sync
static_assertions::assert_impl_all!(Texture: Send, Sync);
static_assertions::assert_impl_all!(TextureView: Send, Sync);

#[cfg(test)]
mod tests {
    use crate::device::test_device;
    use crate::types::{TextureDescriptor, TextureFormat, TextureUsage, TextureViewDescriptor};
    use crate::GraphicsError;

    #[test]
    fn test_full_view_is_cached() {
        let device = test_device();
        let texture = device
            .create_texture(&TextureDescriptor::new_2d(
                64,
                64,
                TextureFormat::Rgba8Unorm,
                TextureUsage::SAMPLED,
            ))
            .unwrap();
        let first = texture.full_read_view().unwrap();
        let second = texture.full_read_view().unwrap();
        assert_eq!(first, second);
        assert!(matches!(
            texture.full_read_write_view(),
            Err(GraphicsError::Usage(_))
        ));
    }

    #[test]
    fn test_view_range_validation() {
        let device = test_device();
        let texture = device
            .create_texture(
                &TextureDescriptor::new_2d(32, 32, TextureFormat::Rgba8Unorm, TextureUsage::SAMPLED)
                    .with_mip_levels(3),
            )
            .unwrap();
        let full = TextureViewDescriptor::full(texture.descriptor());
        assert!(device.create_texture_view(&texture, &full.clone().with_mips(1, 2)).is_ok());
        assert!(matches!(
            device.create_texture_view(&texture, &full.clone().with_mips(2, 2)),
            Err(GraphicsError::InvalidParameter(_))
        ));
        assert!(matches!(
            device.create_texture_view(&texture, &full.with_format(TextureFormat::R16Float)),
            Err(GraphicsError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_sampled_depth_reads_through_typeless_storage() {
        let device = test_device();
        let depth = device
            .create_texture(&TextureDescriptor::new_2d(
                16,
                16,
                TextureFormat::Depth32Float,
                TextureUsage::DEPTH_STENCIL | TextureUsage::SAMPLED,
            ))
            .unwrap();
        assert!(depth.full_read_view().is_ok());
    }
}
