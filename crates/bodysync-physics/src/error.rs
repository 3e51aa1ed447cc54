//! Error types for bodysync-physics

use bodysync_core::BodyId;
use thiserror::Error;

/// Result type for bodysync-physics operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in bodysync-physics
#[derive(Debug, Error)]
pub enum Error {
    /// The bridge does not know the body
    #[error("rigid body {0} is not registered with the bridge")]
    UnknownBody(BodyId),

    /// Core error (configuration)
    #[error("core error: {0}")]
    Core(#[from] bodysync_core::Error),
}

// Compile-time check that Error is Send + Sync for thread-safe error propagation.
fn _assert_error_send_sync<T: Send + Sync>() {}
fn _error_is_send_sync() {
    _assert_error_send_sync::<Error>();
}
