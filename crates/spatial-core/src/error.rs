//! Workspace-wide error code.
//!
//! Mirrors the kinds named in the engine's error-handling design: every
//! condition the audio path can hit is a recoverable, local event, never a
//! panic or exception.

/// Error codes shared by every `spatial-*` crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, thiserror::Error)]
pub enum CoreError {
    /// A buffer length did not match what the caller configured.
    #[error("bad size: expected {expected}, got {actual}")]
    BadSize { expected: usize, actual: usize },

    /// A query was made against a service before it finished setup.
    #[error("query against a service that has not completed setup")]
    NotSet,

    /// A stateful component was used before its `setup`/`new` call.
    #[error("component used before initialization")]
    NotInitialized,

    /// A ring or stack collection could not grow to the requested capacity.
    #[error("allocation failed: requested capacity {0}")]
    BadAlloc(usize),
}

/// Result type alias used throughout the workspace.
pub type Result<T> = core::result::Result<T, CoreError>;
