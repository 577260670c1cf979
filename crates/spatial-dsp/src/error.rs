//! Error kinds and the audio-path diagnostic side-channel.
//!
//! Every condition named in the engine's error-handling design is handled
//! locally: setup-time code propagates a [`SpatialError`] with `?`, while
//! audio-path code reports through an [`ErrorSink`] and falls back to
//! silence or pass-through. Nothing in this crate panics or unwinds on a
//! malformed query.

use std::fmt;

/// Error kinds produced by the spatial-audio engine.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SpatialError {
    /// Buffer length does not match the configured block size, or an IR
    /// length does not match a service's expectation.
    #[error("bad size: expected {expected}, got {actual}")]
    BadSize { expected: usize, actual: usize },

    /// Query against a service before `EndSetup`/`Builder::finish`.
    #[error("service queried before setup was finished")]
    NotSet,

    /// Component used (e.g. `Process`) before its `Setup`.
    #[error("component used before Setup")]
    NotInitialized,

    /// Direction query from coincident source and listener.
    #[error("direction undefined: source and listener are coincident")]
    DivByZero,

    /// Out-of-range azimuth/distance, or an unrecognised Ambisonic
    /// normalisation string.
    #[error("invalid parameter `{name}`: {detail}")]
    InvalidParam { name: &'static str, detail: String },

    /// Ring/history buffer resize failed.
    #[error("allocation failed: requested {0} elements")]
    BadAlloc(usize),

    /// Unrecognised axis tag.
    #[error("axis case not defined: {0}")]
    CaseNotDefined(String),

    /// SOFA-style measurement indexing inconsistency.
    #[error("measurement index out of range: {0}")]
    OutOfRange(String),
}

/// Result type alias used for setup-time (fallible) operations.
pub type Result<T> = std::result::Result<T, SpatialError>;

/// Side-channel consulted by audio-path code instead of returning `Result`.
///
/// Implementors must not allocate or block; the default [`LogErrorSink`]
/// forwards to the `log` facade so a host application routes diagnostics
/// through whatever logger it installs.
pub trait ErrorSink: fmt::Debug {
    fn report(&self, err: &SpatialError);
}

/// Forwards every error to the `log` facade at a severity matching the kind.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogErrorSink;

impl ErrorSink for LogErrorSink {
    fn report(&self, err: &SpatialError) {
        match err {
            SpatialError::DivByZero => log::debug!("{err}"),
            SpatialError::BadSize { .. } | SpatialError::NotInitialized | SpatialError::NotSet => {
                log::warn!("{err}")
            }
            _ => log::error!("{err}"),
        }
    }
}

/// Discards every error. Used by benches and tests that expect the boundary
/// conditions without wanting log noise.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullErrorSink;

impl ErrorSink for NullErrorSink {
    fn report(&self, _err: &SpatialError) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_sink_is_inert() {
        NullErrorSink.report(&SpatialError::NotSet);
    }

    #[test]
    fn bad_size_display() {
        let err = SpatialError::BadSize { expected: 512, actual: 256 };
        assert_eq!(err.to_string(), "bad size: expected 512, got 256");
    }
}
