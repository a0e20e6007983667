//! Backend error types.

use super::BackendHandle;
use crate::error::GraphicsError;

/// Errors that can occur in backend operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// The requested feature is not supported.
    Unsupported(String),
    /// Out of GPU memory.
    OutOfMemory,
    /// The device was lost.
    DeviceLost(String),
    /// The handle does not name a live backend object.
    InvalidHandle(BackendHandle),
    /// A transfer touched bytes outside the backend object.
    OutOfRange { handle: BackendHandle, end: u64, size: u64 },
    /// Internal backend error.
    Internal(String),
}

impl std::fmt::Display for BackendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unsupported(msg) => write!(f, "feature not supported: {msg}"),
            Self::OutOfMemory => write!(f, "out of GPU memory"),
            Self::DeviceLost(msg) => write!(f, "GPU device lost: {msg}"),
            Self::InvalidHandle(handle) => write!(f, "invalid backend handle {}", handle.0),
            Self::OutOfRange { handle, end, size } => write!(
                f,
                "transfer up to byte {end} exceeds object {} of {size} bytes",
                handle.0
            ),
            Self::Internal(msg) => write!(f, "internal backend error: {msg}"),
        }
    }
}

impl std::error::Error for BackendError {}

impl From<BackendError> for GraphicsError {
    fn from(err: BackendError) -> Self {
        GraphicsError::BackendFatal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(BackendError::OutOfMemory.to_string(), "out of GPU memory");
        assert_eq!(
            BackendError::InvalidHandle(BackendHandle(4)).to_string(),
            "invalid backend handle 4"
        );
    }

    #[test]
    fn test_converts_to_backend_fatal() {
        let err: GraphicsError = BackendError::DeviceLost("injected".into()).into();
        assert_eq!(
            err,
            GraphicsError::BackendFatal("GPU device lost: injected".to_string())
        );
    }
}
