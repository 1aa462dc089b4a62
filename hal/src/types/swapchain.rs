//! Swapchain descriptions.

use raw_window_handle::{HasDisplayHandle, HasWindowHandle, RawDisplayHandle, RawWindowHandle};

use super::TextureFormat;
use crate::error::{GraphicsError, GraphicsResult};

/// Raw window and display handles of a presentation surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowHandles {
    window: RawWindowHandle,
    display: RawDisplayHandle,
}

// SAFETY: the handles are opaque identifiers that are only passed to the
// native API on the device's execution timeline, which is serialized by the
// device context lock. They are never dereferenced on the Rust side.
unsafe impl Send for WindowHandles {}
unsafe impl Sync for WindowHandles {}

impl WindowHandles {
    /// Wrap raw handles. The window must outlive every swapchain created from them.
    pub fn new(window: RawWindowHandle, display: RawDisplayHandle) -> Self {
        Self { window, display }
    }

    /// Raw window handle.
    pub fn window(&self) -> RawWindowHandle {
        self.window
    }

    /// Raw display handle.
    pub fn display(&self) -> RawDisplayHandle {
        self.display
    }
}

/// Surface a swapchain presents to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapchainSource {
    /// A platform window.
    Window(WindowHandles),
    /// Offscreen presentation; backbuffers are never shown.
    Headless,
}

impl SwapchainSource {
    /// Capture the raw handles of a window.
    ///
    /// The window must outlive the swapchain created from this source.
    pub fn from_window<W>(window: &W) -> GraphicsResult<Self>
    where
        W: HasWindowHandle + HasDisplayHandle,
    {
        let display = window.display_handle().map_err(|e| {
            GraphicsError::InvalidParameter(format!("failed to get display handle: {e}"))
        })?;
        let window = window.window_handle().map_err(|e| {
            GraphicsError::InvalidParameter(format!("failed to get window handle: {e}"))
        })?;
        Ok(Self::Window(WindowHandles::new(
            window.as_raw(),
            display.as_raw(),
        )))
    }
}

/// Descriptor for creating a swapchain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapchainDescriptor {
    /// Debug label.
    pub label: Option<String>,
    /// Presentation surface.
    pub source: SwapchainSource,
    /// Initial width in pixels.
    pub width: u32,
    /// Initial height in pixels.
    pub height: u32,
    /// Backbuffer format.
    pub color_format: TextureFormat,
    /// Depth attachment format; `None` for no depth attachment.
    pub depth_format: Option<TextureFormat>,
    /// Wait for vertical blank when presenting.
    pub sync_to_vertical_blank: bool,
}

impl SwapchainDescriptor {
    /// Create a descriptor with a `Bgra8Unorm` backbuffer and no depth.
    pub fn new(source: SwapchainSource, width: u32, height: u32) -> Self {
        Self {
            label: None,
            source,
            width,
            height,
            color_format: TextureFormat::Bgra8Unorm,
            depth_format: None,
            sync_to_vertical_blank: true,
        }
    }

    /// Add a depth attachment.
    pub fn with_depth_format(mut self, format: TextureFormat) -> Self {
        self.depth_format = Some(format);
        self
    }

    /// Set the backbuffer format.
    pub fn with_color_format(mut self, format: TextureFormat) -> Self {
        self.color_format = format;
        self
    }

    /// Set vertical sync.
    pub fn with_sync_to_vertical_blank(mut self, sync: bool) -> Self {
        self.sync_to_vertical_blank = sync;
        self
    }

    /// Set the debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

// Ensure SwapchainDescriptor is Send + Sync
static_assertions::assert_impl_all!(SwapchainDescriptor: Send, Sync);

#[cfg(test)]
mod tests {
    use raw_window_handle::{WebDisplayHandle, WebWindowHandle};

    use super::*;

    #[test]
    fn test_window_source_moves_across_threads() {
        let handles = WindowHandles::new(
            RawWindowHandle::Web(WebWindowHandle::new(7)),
            RawDisplayHandle::Web(WebDisplayHandle::new()),
        );
        let descriptor = SwapchainDescriptor::new(SwapchainSource::Window(handles), 16, 16);

        let received = std::thread::spawn(move || descriptor.source).join().unwrap();
        let SwapchainSource::Window(received) = received else {
            panic!("expected a window source");
        };
        assert_eq!(received.window(), RawWindowHandle::Web(WebWindowHandle::new(7)));
        assert_eq!(received, handles);
    }
}
