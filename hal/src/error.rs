//! Graphics error types.

use thiserror::Error;

/// Errors that can occur in the hardware abstraction layer.
///
/// Errors fall into three groups:
/// - contract violations by the caller ([`Usage`](Self::Usage),
///   [`Disposed`](Self::Disposed), [`InvalidParameter`](Self::InvalidParameter)),
///   raised synchronously by the call that broke the contract;
/// - capability errors ([`Unsupported`](Self::Unsupported)), raised when a
///   resource is created, never on first use;
/// - native failures, which are fatal for the device. Nothing is retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphicsError {
    /// The caller violated an API contract.
    #[error("usage error: {0}")]
    Usage(String),
    /// A format, usage or sample-count combination is not supported.
    #[error("unsupported: {0}")]
    Unsupported(String),
    /// A resource was used after it was disposed.
    #[error("use of disposed resource: {0}")]
    Disposed(String),
    /// An invalid parameter was provided.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    /// Failed to initialize the graphics system.
    #[error("initialization failed: {0}")]
    InitializationFailed(String),
    /// The native layer failed to create a resource.
    #[error("resource creation failed: {0}")]
    ResourceCreationFailed(String),
    /// Out of GPU memory.
    #[error("out of GPU memory")]
    OutOfMemory,
    /// The GPU device was lost.
    #[error("GPU device lost")]
    DeviceLost,
    /// A native call failed.
    #[error("backend error: {0}")]
    Backend(String),
}

impl GraphicsError {
    pub(crate) fn usage(msg: impl Into<String>) -> Self {
        Self::Usage(msg.into())
    }

    /// Returns true if the device must be rebuilt after this error.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::OutOfMemory | Self::DeviceLost | Self::Backend(_) | Self::ResourceCreationFailed(_)
        )
    }
}

/// Result alias used throughout the crate.
pub type GraphicsResult<T> = Result<T, GraphicsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = GraphicsError::OutOfMemory;
        assert_eq!(err.to_string(), "out of GPU memory");

        let err = GraphicsError::Usage("no index buffer bound".to_string());
        assert_eq!(err.to_string(), "usage error: no index buffer bound");
    }

    #[test]
    fn test_fatal_classification() {
        assert!(GraphicsError::DeviceLost.is_fatal());
        assert!(!GraphicsError::usage("x").is_fatal());
        assert!(!GraphicsError::Unsupported("msaa".into()).is_fatal());
    }
}
