//! Errors delivered to the session's error callback.

use crate::platform::PlatformError;
use thiserror::Error;

/// A platform failure, tagged with the session operation it interrupted.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The camera provider could not be acquired.
    #[error("camera provider unavailable: {0}")]
    ProviderUnavailable(#[source] PlatformError),
    /// Binding use cases failed.
    #[error("failed to bind camera use cases: {0}")]
    Bind(#[source] PlatformError),
    /// A still capture failed.
    #[error("still capture failed: {0}")]
    Capture(#[source] PlatformError),
    /// A recording failed to start or finalize.
    #[error("recording failed: {0}")]
    Recording(#[source] PlatformError),
}

impl SessionError {
    /// The underlying platform error.
    pub fn platform_error(&self) -> &PlatformError {
        match self {
            SessionError::ProviderUnavailable(e)
            | SessionError::Bind(e)
            | SessionError::Capture(e)
            | SessionError::Recording(e) => e,
        }
    }
}
