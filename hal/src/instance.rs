//! Graphics instance.
//!
//! The [`GraphicsInstance`] is the top-level entry point. It selects the
//! native backend and creates [`GraphicsDevice`]s on it.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::backend::{self, BackendType, GpuBackend};
use crate::device::{GraphicsDevice, GraphicsDeviceOptions};
use crate::error::{GraphicsError, GraphicsResult};
use crate::swapchain::Swapchain;
use crate::types::SwapchainDescriptor;

/// Environment variable selecting the backend by name.
pub const BACKEND_ENV: &str = "REDLILIUM_HAL_BACKEND";
/// Environment variable enabling debug validation (`1` or `true`).
pub const DEBUG_ENV: &str = "REDLILIUM_HAL_DEBUG";

/// Parameters for creating a graphics instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InstanceParameters {
    /// Backend to create devices on.
    pub backend: BackendType,
    /// Enable debug validation on every device of the instance.
    pub debug: bool,
}

impl InstanceParameters {
    /// Create default parameters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Select the backend.
    pub fn with_backend(mut self, backend: BackendType) -> Self {
        self.backend = backend;
        self
    }

    /// Enable or disable debug validation.
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Read parameters from `REDLILIUM_HAL_BACKEND` and `REDLILIUM_HAL_DEBUG`.
    ///
    /// Unset variables keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns `InvalidParameter` for an unknown backend name.
    pub fn from_env() -> GraphicsResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> GraphicsResult<Self> {
        let mut parameters = Self::default();
        if let Some(name) = lookup(BACKEND_ENV) {
            parameters.backend = BackendType::from_name(&name).ok_or_else(|| {
                GraphicsError::InvalidParameter(format!("{BACKEND_ENV}: unknown backend '{name}'"))
            })?;
        }
        if let Some(value) = lookup(DEBUG_ENV) {
            parameters.debug = matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true");
        }
        Ok(parameters)
    }
}

/// The graphics instance creates devices on one backend.
///
/// # Thread Safety
///
/// `GraphicsInstance` is `Send + Sync` and can be safely shared across threads.
///
/// # Example
///
/// ```ignore
/// let instance = GraphicsInstance::new(InstanceParameters::from_env()?)?;
/// let device = instance.create_device(GraphicsDeviceOptions::default())?;
/// ```
pub struct GraphicsInstance {
    parameters: InstanceParameters,
    backend: Arc<dyn GpuBackend>,
    /// Devices created by this instance.
    devices: RwLock<Vec<Arc<GraphicsDevice>>>,
}

impl GraphicsInstance {
    /// Create a new graphics instance.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be initialized.
    pub fn new(parameters: InstanceParameters) -> GraphicsResult<Arc<Self>> {
        log::info!(
            "Creating GraphicsInstance (backend: {:?}, debug: {})",
            parameters.backend,
            parameters.debug
        );
        let backend = backend::create_backend(parameters.backend)?;
        Ok(Arc::new(Self {
            parameters,
            backend,
            devices: RwLock::new(Vec::new()),
        }))
    }

    /// Parameters the instance was created with.
    pub fn parameters(&self) -> InstanceParameters {
        self.parameters
    }

    /// Name of the active backend.
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Create a graphics device.
    ///
    /// Debug validation is on if either the instance or `options` enable it.
    ///
    /// # Errors
    ///
    /// Returns an error if device creation fails.
    pub fn create_device(&self, options: GraphicsDeviceOptions) -> GraphicsResult<Arc<GraphicsDevice>> {
        let options = GraphicsDeviceOptions {
            debug: options.debug || self.parameters.debug,
            ..options
        };
        let name = format!("{} device {}", self.backend.name(), self.device_count());
        log::info!("Creating device '{name}'");
        let device = GraphicsDevice::new(name, Arc::clone(&self.backend), options);
        self.devices.write().push(Arc::clone(&device));
        Ok(device)
    }

    /// Create a graphics device with a main swapchain.
    ///
    /// The swapchain is available through [`GraphicsDevice::main_swapchain`].
    ///
    /// # Errors
    ///
    /// Returns an error if device or swapchain creation fails.
    pub fn create_device_with_swapchain(
        &self,
        options: GraphicsDeviceOptions,
        swapchain: &SwapchainDescriptor,
    ) -> GraphicsResult<(Arc<GraphicsDevice>, Arc<Swapchain>)> {
        let device = self.create_device(options)?;
        let swapchain = match device.create_swapchain(swapchain) {
            Ok(swapchain) => swapchain,
            Err(err) => {
                self.destroy_device(&device);
                return Err(err);
            }
        };
        device.set_main_swapchain(Arc::clone(&swapchain));
        Ok((device, swapchain))
    }

    /// Get all devices created by this instance.
    pub fn devices(&self) -> Vec<Arc<GraphicsDevice>> {
        self.devices.read().clone()
    }

    /// Get the number of devices created by this instance.
    pub fn device_count(&self) -> usize {
        self.devices.read().len()
    }

    /// Dispose a device and stop tracking it.
    pub fn destroy_device(&self, device: &Arc<GraphicsDevice>) {
        device.dispose();
        self.devices.write().retain(|d| !Arc::ptr_eq(d, device));
    }
}

impl Drop for GraphicsInstance {
    fn drop(&mut self) {
        for device in self.devices.get_mut().drain(..) {
            device.dispose();
        }
        log::info!("GraphicsInstance dropped");
    }
}

impl std::fmt::Debug for GraphicsInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphicsInstance")
            .field("backend", &self.backend.name())
            .field("debug", &self.parameters.debug)
            .field("device_count", &self.device_count())
            .finish()
    }
}

// Ensure GraphicsInstance is Send + Sync
static_assertions::assert_impl_all!(GraphicsInstance: Send, Sync);
